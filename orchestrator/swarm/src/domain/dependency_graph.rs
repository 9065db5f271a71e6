// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Dependency Graph
//!
//! Directed graph of "task X depends on task Y" edges with forward
//! (`dependencies`) and reverse (`dependents`) adjacency. The graph is kept
//! acyclic: [`DependencyGraph::add_dependency`] rolls an edge back if it
//! would close a cycle.
//!
//! Adjacency is stored in ordered maps, so every traversal (cycle search,
//! ready set, dependent closure, topological order) is deterministic for a
//! given graph.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use thiserror::Error;

use hivemind_core::domain::task::TaskStatus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    #[error("unknown task in dependency graph: {0}")]
    UnknownTask(String),

    #[error("dependency cycle detected: {}", .cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct DependencyGraph<K> {
    dependencies: BTreeMap<K, BTreeSet<K>>,
    dependents: BTreeMap<K, BTreeSet<K>>,
}

impl<K> Default for DependencyGraph<K> {
    fn default() -> Self {
        Self {
            dependencies: BTreeMap::new(),
            dependents: BTreeMap::new(),
        }
    }
}

impl<K> DependencyGraph<K>
where
    K: Ord + Clone + fmt::Display,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn contains(&self, task: &K) -> bool {
        self.dependencies.contains_key(task)
    }

    /// Returns `false` if the task was already present.
    pub fn add_task(&mut self, task: K) -> bool {
        if self.contains(&task) {
            return false;
        }
        self.dependencies.insert(task.clone(), BTreeSet::new());
        self.dependents.insert(task, BTreeSet::new());
        true
    }

    /// Record that `task` cannot start before `depends_on` completes.
    pub fn add_dependency(&mut self, task: &K, depends_on: &K) -> Result<(), DependencyError> {
        for node in [task, depends_on] {
            if !self.contains(node) {
                return Err(DependencyError::UnknownTask(node.to_string()));
            }
        }

        let inserted = self
            .dependencies
            .get_mut(task)
            .map(|deps| deps.insert(depends_on.clone()))
            .unwrap_or(false);
        if !inserted {
            return Ok(());
        }
        if let Some(reverse) = self.dependents.get_mut(depends_on) {
            reverse.insert(task.clone());
        }

        if let Some(cycle) = self.detect_cycle() {
            self.remove_edge(task, depends_on);
            return Err(DependencyError::Cycle {
                cycle: cycle.iter().map(ToString::to_string).collect(),
            });
        }
        Ok(())
    }

    fn remove_edge(&mut self, task: &K, depends_on: &K) {
        if let Some(deps) = self.dependencies.get_mut(task) {
            deps.remove(depends_on);
        }
        if let Some(reverse) = self.dependents.get_mut(depends_on) {
            reverse.remove(task);
        }
    }

    /// Remove a task and every edge touching it.
    pub fn remove_task(&mut self, task: &K) -> bool {
        let Some(deps) = self.dependencies.remove(task) else {
            return false;
        };
        for dep in &deps {
            if let Some(reverse) = self.dependents.get_mut(dep) {
                reverse.remove(task);
            }
        }
        if let Some(children) = self.dependents.remove(task) {
            for child in &children {
                if let Some(forward) = self.dependencies.get_mut(child) {
                    forward.remove(task);
                }
            }
        }
        true
    }

    pub fn dependencies_of(&self, task: &K) -> Vec<K> {
        self.dependencies
            .get(task)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn dependents_of(&self, task: &K) -> Vec<K> {
        self.dependents
            .get(task)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Depth-first search with a recursion stack. Returns the offending path,
    /// closed on itself (`[a, b, c, a]`), or `None` for an acyclic graph.
    pub fn detect_cycle(&self) -> Option<Vec<K>> {
        let mut visited = BTreeSet::new();
        let mut rec_stack = BTreeSet::new();
        let mut path = Vec::new();

        for node in self.dependencies.keys() {
            if self.dfs_cycle(node, &mut visited, &mut rec_stack, &mut path) {
                let start = path.last().cloned()?;
                let first = path.iter().position(|n| *n == start)?;
                return Some(path.split_off(first));
            }
        }
        None
    }

    fn dfs_cycle(
        &self,
        node: &K,
        visited: &mut BTreeSet<K>,
        rec_stack: &mut BTreeSet<K>,
        path: &mut Vec<K>,
    ) -> bool {
        if rec_stack.contains(node) {
            path.push(node.clone());
            return true;
        }
        if visited.contains(node) {
            return false;
        }

        visited.insert(node.clone());
        rec_stack.insert(node.clone());
        path.push(node.clone());

        if let Some(deps) = self.dependencies.get(node) {
            for dep in deps {
                if self.dfs_cycle(dep, visited, rec_stack, path) {
                    return true;
                }
            }
        }

        rec_stack.remove(node);
        path.pop();
        false
    }

    pub fn has_cycle(&self) -> bool {
        self.detect_cycle().is_some()
    }

    /// Every dependency of `task` has completed.
    pub fn is_ready(&self, task: &K, status_of: impl Fn(&K) -> Option<TaskStatus>) -> bool {
        match self.dependencies.get(task) {
            Some(deps) => deps
                .iter()
                .all(|dep| status_of(dep) == Some(TaskStatus::Completed)),
            None => false,
        }
    }

    /// Tasks that have not started yet and whose dependencies all completed.
    pub fn ready_tasks(&self, status_of: impl Fn(&K) -> Option<TaskStatus>) -> Vec<K> {
        self.dependencies
            .keys()
            .filter(|task| {
                matches!(
                    status_of(*task),
                    Some(TaskStatus::Created | TaskStatus::Queued | TaskStatus::Retrying)
                )
            })
            .filter(|task| self.is_ready(*task, &status_of))
            .cloned()
            .collect()
    }

    /// Every task that directly or indirectly depends on `task`, in key order.
    pub fn transitive_dependents(&self, task: &K) -> Vec<K> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<K> = self.dependents_of(task).into();
        while let Some(next) = queue.pop_front() {
            if seen.insert(next.clone()) {
                queue.extend(self.dependents_of(&next));
            }
        }
        seen.into_iter().collect()
    }

    /// Kahn's algorithm; dependencies come before their dependents and ties
    /// break by key order.
    pub fn topological_order(&self) -> Result<Vec<K>, DependencyError> {
        let mut remaining: BTreeMap<&K, usize> = self
            .dependencies
            .iter()
            .map(|(task, deps)| (task, deps.len()))
            .collect();
        let mut ready: BTreeSet<&K> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(task, _)| *task)
            .collect();
        let mut order = Vec::with_capacity(self.len());

        while let Some(task) = ready.pop_first() {
            order.push(task.clone());
            remaining.remove(task);
            if let Some(children) = self.dependents.get(task) {
                for child in children {
                    if let Some(count) = remaining.get_mut(child) {
                        *count -= 1;
                        if *count == 0 {
                            ready.insert(child);
                        }
                    }
                }
            }
        }

        if order.len() != self.len() {
            let cycle = self
                .detect_cycle()
                .map(|c| c.iter().map(ToString::to_string).collect())
                .unwrap_or_default();
            return Err(DependencyError::Cycle { cycle });
        }
        Ok(order)
    }
}
