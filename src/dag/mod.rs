// src/dag/mod.rs

//! Dependency graph and task registry.
//!
//! - [`graph`] holds the acyclic graph of task dependencies and produces
//!   stable topological orders.
//! - [`registry`] pairs the graph with the tasks themselves and implements
//!   readiness checks and cancellation sweeps.

pub mod graph;
pub mod registry;

pub use graph::DependencyGraph;
pub use registry::{CancelSweep, TaskRegistry};
