// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Objectives
//!
//! A **SwarmObjective** is the top-level goal that gets decomposed into a set
//! of dependent tasks. Progress is a projection of its tasks' statuses and is
//! recomputed by the coordinator whenever one of them reaches a terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::domain::agent::{AgentType, ResourceUsage};
use crate::domain::task::{PlannedTask, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectiveId(pub Uuid);

impl ObjectiveId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObjectiveId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "objective-{}", self.0)
    }
}

/// How an objective is decomposed when the caller does not supply tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwarmStrategy {
    #[default]
    Auto,
    Research,
    Development,
    Analysis,
    Testing,
    Optimization,
    Maintenance,
}

impl SwarmStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwarmStrategy::Auto => "auto",
            SwarmStrategy::Research => "research",
            SwarmStrategy::Development => "development",
            SwarmStrategy::Analysis => "analysis",
            SwarmStrategy::Testing => "testing",
            SwarmStrategy::Optimization => "optimization",
            SwarmStrategy::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for SwarmStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveStatus {
    Planning,
    Executing,
    Completed,
    Failed,
}

impl ObjectiveStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ObjectiveStatus::Completed | ObjectiveStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveRequirements {
    #[serde(default)]
    pub agent_types: Vec<AgentType>,
    #[serde(default = "default_min_agents")]
    pub min_agents: u32,
    #[serde(default = "default_max_agents")]
    pub max_agents: u32,
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,
    #[serde(default)]
    pub review_required: bool,
    #[serde(default)]
    pub testing_required: bool,
}

fn default_min_agents() -> u32 {
    1
}

fn default_max_agents() -> u32 {
    10
}

fn default_quality_threshold() -> f64 {
    0.8
}

impl Default for ObjectiveRequirements {
    fn default() -> Self {
        Self {
            agent_types: Vec::new(),
            min_agents: default_min_agents(),
            max_agents: default_max_agents(),
            quality_threshold: default_quality_threshold(),
            review_required: false,
            testing_required: false,
        }
    }
}

/// Status counts and accumulated cost of an objective's tasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwarmProgress {
    pub total_tasks: u32,
    pub created_tasks: u32,
    pub queued_tasks: u32,
    pub running_tasks: u32,
    pub completed_tasks: u32,
    pub failed_tasks: u32,
    pub cancelled_tasks: u32,
    pub percent_complete: f64,
    pub average_quality: f64,
    pub total_execution_time_ms: u64,
    pub resource_usage: ResourceUsage,
    pub cost_units: f64,
}

impl SwarmProgress {
    pub fn terminal_tasks(&self) -> u32 {
        self.completed_tasks + self.failed_tasks + self.cancelled_tasks
    }

    pub fn is_finished(&self) -> bool {
        self.total_tasks > 0 && self.terminal_tasks() == self.total_tasks
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmObjective {
    pub id: ObjectiveId,
    pub name: String,
    pub description: String,
    pub strategy: SwarmStrategy,
    pub requirements: ObjectiveRequirements,
    /// Tasks in plan order.
    pub tasks: Vec<TaskId>,
    pub dependencies: BTreeMap<TaskId, Vec<TaskId>>,
    pub status: ObjectiveStatus,
    pub progress: SwarmProgress,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl SwarmObjective {
    pub fn new(id: ObjectiveId, spec: &ObjectiveSpec, strategy: SwarmStrategy) -> Self {
        Self {
            id,
            name: spec.name.clone(),
            description: spec.description.clone(),
            strategy,
            requirements: spec.requirements.clone(),
            tasks: Vec::new(),
            dependencies: BTreeMap::new(),
            status: ObjectiveStatus::Planning,
            progress: SwarmProgress::default(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }
}

/// Caller-supplied objective. An empty `tasks` list asks for decomposition by
/// `strategy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectiveSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub strategy: SwarmStrategy,
    #[serde(default)]
    pub requirements: ObjectiveRequirements,
    #[serde(default)]
    pub tasks: Vec<PlannedTask>,
}

impl ObjectiveSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            strategy: SwarmStrategy::Auto,
            requirements: ObjectiveRequirements::default(),
            tasks: Vec::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: SwarmStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_task(mut self, task: PlannedTask) -> Self {
        self.tasks.push(task);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_finished() {
        let mut progress = SwarmProgress {
            total_tasks: 3,
            completed_tasks: 2,
            ..Default::default()
        };
        assert!(!progress.is_finished());
        progress.cancelled_tasks = 1;
        assert!(progress.is_finished());
        assert!(!SwarmProgress::default().is_finished());
    }

    #[test]
    fn test_spec_defaults_from_yaml() {
        let spec: ObjectiveSpec =
            serde_yaml::from_str("name: docs\ndescription: write the guide\n").unwrap();
        assert_eq!(spec.strategy, SwarmStrategy::Auto);
        assert_eq!(spec.requirements.max_agents, 10);
        assert!(spec.tasks.is_empty());
    }
}
