//! Task dependency graph.
//!
//! Two adjacency maps are maintained: `dependencies` (task -> what it waits
//! on) and the inverse `dependents` (task -> who waits on it). Every edge
//! insertion runs a depth-first reachability check so the relation stays
//! acyclic; there is no batch-validation mode.

use cadre_core::{CadreResult, TaskId, ValidationError};
use std::collections::{HashMap, HashSet};

/// Acyclic task-to-task dependency relation.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    dependencies: HashMap<TaskId, HashSet<TaskId>>,
    dependents: HashMap<TaskId, HashSet<TaskId>>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edge meaning `task` depends on `dep`.
    ///
    /// Rejects self-dependencies and any edge that would close a cycle,
    /// detected by walking from `dep` back toward `task` before inserting.
    pub fn add_dependency(&mut self, task: TaskId, dep: TaskId) -> CadreResult<()> {
        if task == dep {
            return Err(ValidationError::SelfDependency { task_id: task }.into());
        }
        if self.reaches(dep, task) {
            return Err(ValidationError::CircularDependency { task, dep }.into());
        }
        self.dependencies.entry(task).or_default().insert(dep);
        self.dependents.entry(dep).or_default().insert(task);
        Ok(())
    }

    /// Remove a single dependency edge. Returns whether it existed.
    pub fn remove_dependency(&mut self, task: TaskId, dep: TaskId) -> bool {
        let removed = self
            .dependencies
            .get_mut(&task)
            .is_some_and(|deps| deps.remove(&dep));
        if removed {
            if let Some(deps) = self.dependents.get_mut(&dep) {
                deps.remove(&task);
            }
        }
        removed
    }

    /// Remove a task from both maps. Status changes for dependents are the
    /// scheduler's job; nothing cascades here.
    pub fn remove_task(&mut self, task: TaskId) {
        if let Some(deps) = self.dependencies.remove(&task) {
            for dep in deps {
                if let Some(set) = self.dependents.get_mut(&dep) {
                    set.remove(&task);
                }
            }
        }
        if let Some(dependents) = self.dependents.remove(&task) {
            for dependent in dependents {
                if let Some(set) = self.dependencies.get_mut(&dependent) {
                    set.remove(&task);
                }
            }
        }
    }

    /// Tasks that `task` waits on.
    pub fn dependencies_of(&self, task: TaskId) -> HashSet<TaskId> {
        self.dependencies.get(&task).cloned().unwrap_or_default()
    }

    /// Tasks waiting on `task`.
    pub fn dependents_of(&self, task: TaskId) -> HashSet<TaskId> {
        self.dependents.get(&task).cloned().unwrap_or_default()
    }

    /// True iff every dependency of `task` is in `completed`.
    pub fn dependencies_met(&self, task: TaskId, completed: &HashSet<TaskId>) -> bool {
        match self.dependencies.get(&task) {
            Some(deps) => deps.iter().all(|d| completed.contains(d)),
            None => true,
        }
    }

    /// Dependencies of `task` not yet in `completed`.
    pub fn missing_dependencies(&self, task: TaskId, completed: &HashSet<TaskId>) -> Vec<TaskId> {
        match self.dependencies.get(&task) {
            Some(deps) => {
                let mut missing: Vec<TaskId> =
                    deps.iter().filter(|d| !completed.contains(d)).copied().collect();
                missing.sort();
                missing
            }
            None => Vec::new(),
        }
    }

    /// Depth-first reachability from `from` along dependency edges.
    fn reaches(&self, from: TaskId, target: TaskId) -> bool {
        if from == target {
            return true;
        }
        let mut visited = HashSet::new();
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(deps) = self.dependencies.get(&current) {
                for dep in deps {
                    if *dep == target {
                        return true;
                    }
                    stack.push(*dep);
                }
            }
        }
        false
    }
}

// ============================================================================
// TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
