// src/config/mod.rs

//! Plan file loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a plan file from disk (`loader.rs`).
//! - Validate it, including DAG correctness (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, parse_plan};
pub use model::{EngineSection, MonitorConfig, PlanFile, RawPlanFile, StoreSection, TaskConfig};
