//! Dependency graph engine.
//!
//! The graph is never cached: every algorithm here reads through a
//! [`GraphView`], which the store implements on top of a SQLite connection or
//! an open transaction. Inside a write transaction the view therefore sees the
//! edges already written by that transaction.
//!
//! Edges point from a task to the task it depends on. Adding `a -> b` closes a
//! cycle exactly when `a` is already reachable from `b`.

use crate::error::TaskError;
use crate::types::{Status, TaskId};
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Read access to tasks and their direct dependencies.
pub trait GraphView {
    /// Whether a task with this id exists.
    fn task_exists(&self, id: TaskId) -> Result<bool>;

    /// Direct dependencies of `id`, in edge insertion order.
    fn dependencies_of(&self, id: TaskId) -> Result<Vec<TaskId>>;

    /// Id, title and status of a task.
    fn summary(&self, id: TaskId) -> Result<Option<TaskSummary>>;

    /// All task ids in ascending order.
    fn task_ids(&self) -> Result<Vec<TaskId>>;
}

/// The parts of a task the diagnostics need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub title: String,
    pub status: Status,
}

/// One dependency in a chain, expanded recursively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainNode {
    pub id: TaskId,
    pub title: String,
    pub status: Status,
    pub sub_dependencies: SubChain,
}

/// Children of a chain node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubChain {
    Expanded(Vec<ChainNode>),
    /// The node is already on the path from the root; only reachable when the
    /// stored edges contain a cycle.
    Circular {
        #[serde(rename = "CIRCULAR_DEPENDENCY_DETECTED")]
        task_id: TaskId,
    },
}

impl SubChain {
    pub fn children(&self) -> &[ChainNode] {
        match self {
            SubChain::Expanded(nodes) => nodes,
            SubChain::Circular { .. } => &[],
        }
    }

    pub fn is_circular(&self) -> bool {
        matches!(self, SubChain::Circular { .. })
    }
}

/// A task that may not be added as a dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForbiddenCandidate {
    pub id: TaskId,
    pub title: String,
    pub status: Status,
    pub reason: ForbiddenReason,
}

/// Why a candidate is forbidden.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ForbiddenReason {
    /// A task cannot depend on itself.
    SelfReference,
    /// The candidate already depends on the task along `path`.
    WouldCycle { path: Vec<TaskId> },
}

/// Check whether adding `task_id -> candidate` would create a cycle.
pub fn would_create_cycle<G: GraphView + ?Sized>(graph: &G, task_id: TaskId, candidate: TaskId) -> Result<bool> {
    if task_id == candidate {
        return Ok(true);
    }

    // BFS from the candidate looking for the task.
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([candidate]);

    while let Some(current) = queue.pop_front() {
        if !visited.insert(current) {
            continue;
        }
        for dep in graph.dependencies_of(current)? {
            if dep == task_id {
                return Ok(true);
            }
            if !visited.contains(&dep) {
                queue.push_back(dep);
            }
        }
    }

    Ok(false)
}

/// Find a path from `candidate` back to `task_id`, both ends included.
///
/// Returns `None` when adding `task_id -> candidate` would not cycle. The path
/// is the first one reached in breadth-first order, with neighbours visited in
/// edge insertion order.
pub fn find_cycle_path<G: GraphView + ?Sized>(
    graph: &G,
    task_id: TaskId,
    candidate: TaskId,
) -> Result<Option<Vec<TaskId>>> {
    if task_id == candidate {
        return Ok(Some(vec![task_id]));
    }

    let mut parent: HashMap<TaskId, TaskId> = HashMap::new();
    let mut visited = HashSet::from([candidate]);
    let mut queue = VecDeque::from([candidate]);

    while let Some(current) = queue.pop_front() {
        for dep in graph.dependencies_of(current)? {
            if !visited.insert(dep) {
                continue;
            }
            parent.insert(dep, current);
            if dep == task_id {
                return Ok(Some(unwind(&parent, candidate, task_id)));
            }
            queue.push_back(dep);
        }
    }

    Ok(None)
}

fn unwind(parent: &HashMap<TaskId, TaskId>, start: TaskId, end: TaskId) -> Vec<TaskId> {
    let mut path = vec![end];
    let mut node = end;
    while node != start {
        match parent.get(&node) {
            Some(&prev) => {
                path.push(prev);
                node = prev;
            }
            None => break,
        }
    }
    path.reverse();
    path
}

/// Expand the dependencies of `task_id` into a tree.
pub fn build_dependency_chain<G: GraphView + ?Sized>(graph: &G, task_id: TaskId) -> Result<Vec<ChainNode>> {
    if !graph.task_exists(task_id)? {
        return Err(TaskError::NotFound(task_id).into());
    }

    let mut path = Vec::new();
    match expand(graph, task_id, &mut path)? {
        SubChain::Expanded(nodes) => Ok(nodes),
        SubChain::Circular { .. } => Ok(Vec::new()),
    }
}

fn expand<G: GraphView + ?Sized>(graph: &G, task_id: TaskId, path: &mut Vec<TaskId>) -> Result<SubChain> {
    if path.contains(&task_id) {
        log::warn!("Circular dependency detected at task {} (path {:?})", task_id, path);
        return Ok(SubChain::Circular { task_id });
    }

    path.push(task_id);
    let mut nodes = Vec::new();
    for dep in graph.dependencies_of(task_id)? {
        let Some(summary) = graph.summary(dep)? else {
            log::warn!("Task {} depends on missing task {}", task_id, dep);
            continue;
        };
        let sub_dependencies = expand(graph, dep, path)?;
        nodes.push(ChainNode {
            id: summary.id,
            title: summary.title,
            status: summary.status,
            sub_dependencies,
        });
    }
    path.pop();

    Ok(SubChain::Expanded(nodes))
}

/// List every task that cannot become a dependency of `task_id`.
///
/// The task itself comes first, followed by cycle-forming candidates in id
/// order, each with the path that would close the loop.
pub fn forbidden_dependency_candidates<G: GraphView + ?Sized>(
    graph: &G,
    task_id: TaskId,
) -> Result<Vec<ForbiddenCandidate>> {
    let Some(own) = graph.summary(task_id)? else {
        return Err(TaskError::NotFound(task_id).into());
    };

    let mut forbidden = vec![ForbiddenCandidate {
        id: own.id,
        title: own.title,
        status: own.status,
        reason: ForbiddenReason::SelfReference,
    }];

    for candidate in graph.task_ids()? {
        if candidate == task_id {
            continue;
        }
        let Some(path) = find_cycle_path(graph, task_id, candidate)? else {
            continue;
        };
        if let Some(summary) = graph.summary(candidate)? {
            forbidden.push(ForbiddenCandidate {
                id: summary.id,
                title: summary.title,
                status: summary.status,
                reason: ForbiddenReason::WouldCycle { path },
            });
        }
    }

    Ok(forbidden)
}

/// Direct dependencies of `task_id` that are not completed.
pub fn pending_dependencies<G: GraphView + ?Sized>(graph: &G, task_id: TaskId) -> Result<Vec<TaskId>> {
    let mut pending = Vec::new();
    for dep in graph.dependencies_of(task_id)? {
        let status = graph.summary(dep)?.map(|s| s.status);
        if status != Some(Status::Completed) {
            pending.push(dep);
        }
    }
    Ok(pending)
}

/// Whether every direct dependency of `task_id` is completed.
pub fn can_complete<G: GraphView + ?Sized>(graph: &G, task_id: TaskId) -> Result<bool> {
    Ok(pending_dependencies(graph, task_id)?.is_empty())
}
