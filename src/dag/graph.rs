// src/dag/graph.rs

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::has_path_connecting;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use tracing::debug;

use crate::errors::{BackupError, Result};
use crate::task::TaskId;

/// Per-node payload: the task id plus its insertion sequence number.
#[derive(Debug, Clone, Copy)]
struct DagNode {
    id: TaskId,
    seq: u64,
}

/// Directed acyclic graph of task dependencies.
///
/// Tasks live in a petgraph arena; an edge `B -> A` means "A depends on B"
/// (dependency points at dependent, the same direction the config validator
/// uses). Every insertion is checked before it happens, so the graph is
/// acyclic at all times.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: StableDiGraph<DagNode, ()>,
    index: HashMap<TaskId, NodeIndex>,
    next_seq: u64,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.index.contains_key(&id)
    }

    /// Register a task node.
    pub fn add_task(&mut self, id: TaskId) -> Result<()> {
        if self.index.contains_key(&id) {
            return Err(BackupError::DuplicateTask(id));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        let node = self.graph.add_node(DagNode { id, seq });
        self.index.insert(id, node);
        Ok(())
    }

    /// Remove a task and every edge touching it.
    pub fn remove_task(&mut self, id: TaskId) -> Result<()> {
        let node = self.index.remove(&id).ok_or(BackupError::TaskNotFound(id))?;
        self.graph.remove_node(node);
        Ok(())
    }

    /// Record that `task` depends on `depends_on`.
    ///
    /// Rejected with `CircularDependency` if `depends_on` already (directly or
    /// transitively) depends on `task`. Nothing is modified on error.
    pub fn add_dependency(&mut self, task: TaskId, depends_on: TaskId) -> Result<()> {
        let task_node = self.node(task)?;
        let dep_node = self.node(depends_on)?;

        if self.graph.find_edge(dep_node, task_node).is_some() {
            return Ok(());
        }

        // A path task -> ... -> depends_on means depends_on waits on task.
        if task == depends_on || has_path_connecting(&self.graph, task_node, dep_node, None) {
            debug!(task = %task, depends_on = %depends_on, "rejecting edge that would close a cycle");
            return Err(BackupError::CircularDependency { task, depends_on });
        }

        self.graph.add_edge(dep_node, task_node, ());
        Ok(())
    }

    /// Add several dependencies for one task, all or nothing.
    pub fn add_dependencies(&mut self, task: TaskId, deps: &[TaskId]) -> Result<()> {
        let task_node = self.node(task)?;
        for dep in deps {
            self.node(*dep)?;
        }

        let mut inserted = Vec::new();
        for dep in deps {
            let dep_node = self.node(*dep)?;
            let existed = self.graph.find_edge(dep_node, task_node).is_some();
            if let Err(err) = self.add_dependency(task, *dep) {
                for edge in inserted {
                    self.graph.remove_edge(edge);
                }
                return Err(err);
            }
            if !existed {
                if let Some(edge) = self.graph.find_edge(dep_node, task_node) {
                    inserted.push(edge);
                }
            }
        }
        Ok(())
    }

    /// All task ids in insertion order.
    pub fn tasks(&self) -> Vec<TaskId> {
        let mut nodes: Vec<DagNode> = self.graph.node_weights().copied().collect();
        nodes.sort_by_key(|n| n.seq);
        nodes.into_iter().map(|n| n.id).collect()
    }

    /// Direct dependencies of a task, in insertion order.
    pub fn dependencies_of(&self, id: TaskId) -> Result<Vec<TaskId>> {
        self.neighbours(id, Direction::Incoming)
    }

    /// Direct dependents of a task, in insertion order.
    pub fn dependents_of(&self, id: TaskId) -> Result<Vec<TaskId>> {
        self.neighbours(id, Direction::Outgoing)
    }

    /// Every task that directly or transitively depends on `id`.
    pub fn transitive_dependents(&self, id: TaskId) -> Result<Vec<TaskId>> {
        self.closure(&[id], Direction::Outgoing, false)
    }

    /// Every task `id` directly or transitively depends on.
    pub fn transitive_dependencies(&self, id: TaskId) -> Result<Vec<TaskId>> {
        self.closure(&[id], Direction::Incoming, false)
    }

    /// Snapshot of all edges as `(task, depends_on)` pairs, sorted.
    pub fn edges(&self) -> Vec<(TaskId, TaskId)> {
        let mut edges: Vec<(TaskId, TaskId)> = self
            .graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(dep, task)| (self.graph[task].id, self.graph[dep].id))
            .collect();
        edges.sort();
        edges
    }

    /// Every task after all of its dependencies; ties keep insertion order.
    pub fn topological_order(&self) -> Result<Vec<TaskId>> {
        let all: HashSet<NodeIndex> = self.graph.node_indices().collect();
        self.kahn(&all)
    }

    /// Topological order restricted to `roots` and everything they depend on.
    pub fn topological_order_for(&self, roots: &[TaskId]) -> Result<Vec<TaskId>> {
        let scope = self.closure(roots, Direction::Incoming, true)?;
        let scope: HashSet<NodeIndex> = scope.iter().map(|id| self.index[id]).collect();
        self.kahn(&scope)
    }

    fn node(&self, id: TaskId) -> Result<NodeIndex> {
        self.index
            .get(&id)
            .copied()
            .ok_or(BackupError::TaskNotFound(id))
    }

    fn neighbours(&self, id: TaskId, dir: Direction) -> Result<Vec<TaskId>> {
        let node = self.node(id)?;
        let mut nodes: Vec<DagNode> = self
            .graph
            .neighbors_directed(node, dir)
            .map(|n| self.graph[n])
            .collect();
        nodes.sort_by_key(|n| n.seq);
        Ok(nodes.into_iter().map(|n| n.id).collect())
    }

    /// Nodes reachable from `start` along `dir`, sorted by insertion.
    fn closure(&self, start: &[TaskId], dir: Direction, include_start: bool) -> Result<Vec<TaskId>> {
        let mut stack = Vec::new();
        for id in start {
            stack.push(self.node(*id)?);
        }

        let start_nodes: HashSet<NodeIndex> = stack.iter().copied().collect();
        let mut visited: HashSet<NodeIndex> = HashSet::new();

        while let Some(node) = stack.pop() {
            if !visited.insert(node) {
                continue;
            }
            stack.extend(self.graph.neighbors_directed(node, dir));
        }

        let mut nodes: Vec<DagNode> = visited
            .into_iter()
            .filter(|n| include_start || !start_nodes.contains(n))
            .map(|n| self.graph[n])
            .collect();
        nodes.sort_by_key(|n| n.seq);
        Ok(nodes.into_iter().map(|n| n.id).collect())
    }

    /// Kahn's algorithm over `scope`, with a min-heap on insertion sequence.
    fn kahn(&self, scope: &HashSet<NodeIndex>) -> Result<Vec<TaskId>> {
        let mut in_degree: HashMap<NodeIndex, usize> = HashMap::with_capacity(scope.len());
        let mut ready = BinaryHeap::new();

        for &node in scope {
            let degree = self
                .graph
                .neighbors_directed(node, Direction::Incoming)
                .filter(|dep| scope.contains(dep))
                .count();
            in_degree.insert(node, degree);
            if degree == 0 {
                ready.push(Reverse((self.graph[node].seq, node)));
            }
        }

        let mut order = Vec::with_capacity(scope.len());
        while let Some(Reverse((_, node))) = ready.pop() {
            order.push(self.graph[node].id);
            for dependent in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if let Some(degree) = in_degree.get_mut(&dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse((self.graph[dependent].seq, dependent)));
                    }
                }
            }
        }

        if order.len() != scope.len() {
            let stuck: Vec<String> = in_degree
                .iter()
                .filter(|(_, d)| **d > 0)
                .map(|(n, _)| self.graph[*n].id.to_string())
                .collect();
            return Err(BackupError::CycleDetected(format!(
                "tasks left unordered: {}",
                stuck.join(", ")
            )));
        }

        Ok(order)
    }
}
