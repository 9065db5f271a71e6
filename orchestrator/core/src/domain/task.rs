// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Task Domain Model
//!
//! A **Task** is a unit of work with requirements, constraints, dependencies
//! and a status lifecycle. Tasks never mutate their own status directly; every
//! change goes through [`TaskDefinition::transition_to`], which rejects edges
//! outside the lifecycle graph and appends exactly one history record.
//!
//! ```text
//! created → queued → assigned → running → completed
//!                        ↑          ↓
//!                        └─ retrying ┘
//! queued | assigned | running → failed
//! any non-terminal            → cancelled
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::agent::{AgentId, AgentType};
use crate::domain::objective::ObjectiveId;
use crate::domain::swarm::SwarmId;

// ============================================================================
// Identifiers & Classification
// ============================================================================

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Background,
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Critical => "critical",
            TaskPriority::High => "high",
            TaskPriority::Normal => "normal",
            TaskPriority::Low => "low",
            TaskPriority::Background => "background",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task identifier.
///
/// Ordering compares `sequence` first, so sorted collections of `TaskId`
/// iterate in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId {
    pub sequence: u64,
    pub priority: TaskPriority,
    pub swarm_id: SwarmId,
    pub uuid: Uuid,
}

impl TaskId {
    pub fn new(swarm_id: SwarmId, sequence: u64, priority: TaskPriority) -> Self {
        Self {
            sequence,
            priority,
            swarm_id,
            uuid: Uuid::new_v4(),
        }
    }

    #[cfg(test)]
    pub(crate) fn test_id(sequence: u64) -> Self {
        Self::new(SwarmId::new(), sequence, TaskPriority::Normal)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.sequence)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Research,
    Analysis,
    Coding,
    Testing,
    Review,
    Documentation,
    Coordination,
    Custom(String),
}

impl TaskType {
    pub fn as_str(&self) -> &str {
        match self {
            TaskType::Research => "research",
            TaskType::Analysis => "analysis",
            TaskType::Coding => "coding",
            TaskType::Testing => "testing",
            TaskType::Review => "review",
            TaskType::Documentation => "documentation",
            TaskType::Coordination => "coordination",
            TaskType::Custom(name) => name,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Created,
    Queued,
    Assigned,
    Running,
    Completed,
    Failed,
    Cancelled,
    Retrying,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Created, Queued)
                | (Queued, Assigned)
                | (Assigned, Running)
                | (Running, Completed)
                | (Running, Retrying)
                | (Retrying, Assigned)
                | (Queued, Failed)
                | (Assigned, Failed)
                | (Running, Failed)
                | (Created, Cancelled)
                | (Queued, Cancelled)
                | (Assigned, Cancelled)
                | (Running, Cancelled)
                | (Retrying, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Created => "created",
            TaskStatus::Queued => "queued",
            TaskStatus::Assigned => "assigned",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Retrying => "retrying",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("task {task_id}: invalid transition {from} -> {to}")]
pub struct TaskTransitionError {
    pub task_id: TaskId,
    pub from: TaskStatus,
    pub to: TaskStatus,
}

/// One entry of the append-only status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: TaskStatus,
    pub to: TaskStatus,
    pub reason: String,
    pub triggered_by: String,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Requirements, Constraints & Results
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRequirements {
    /// Abstract capability tags, e.g. `code-generation` or `rust`.
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub agent_type: Option<AgentType>,
    #[serde(default)]
    pub min_reliability: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskConstraints {
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub dependents: Vec<TaskId>,
    #[serde(default)]
    pub conflicts_with: Vec<TaskId>,
    /// Retry budget; the swarm's `default_max_retries` applies when unset.
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Per-attempt limit; falls back to the swarm default when unset.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub output: Value,
    #[serde(default)]
    pub artifacts: HashMap<String, Value>,
    /// Quality score in [0, 1].
    pub quality: f64,
    #[serde(default)]
    pub cost_units: f64,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl TaskResult {
    pub fn new(output: Value, quality: f64) -> Self {
        Self {
            output,
            artifacts: HashMap::new(),
            quality: quality.clamp(0.0, 1.0),
            cost_units: 0.0,
            metadata: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: String,
    pub message: String,
    pub retryable: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// A single execution attempt. Appended when execution starts, never before.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAttempt {
    pub attempt_number: u32,
    pub agent_id: AgentId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: AttemptStatus,
    pub result: Option<TaskResult>,
    pub error: Option<TaskError>,
}

// ============================================================================
// Aggregate
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: TaskId,
    pub objective_id: Option<ObjectiveId>,
    pub task_type: TaskType,
    pub name: String,
    pub description: String,
    pub instructions: String,
    pub input: Value,
    pub requirements: TaskRequirements,
    pub constraints: TaskConstraints,
    pub priority: TaskPriority,

    status: TaskStatus,
    status_history: Vec<StatusTransition>,

    pub attempts: Vec<TaskAttempt>,
    pub assigned_to: Option<AgentId>,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_after: Option<DateTime<Utc>>,
    pub result: Option<TaskResult>,
    pub error: Option<TaskError>,
}

impl TaskDefinition {
    pub fn new(id: TaskId, spec: TaskSpec) -> Self {
        Self {
            id,
            objective_id: spec.objective_id,
            task_type: spec.task_type,
            name: spec.name,
            description: spec.description,
            instructions: spec.instructions,
            input: spec.input,
            requirements: spec.requirements,
            constraints: spec.constraints,
            priority: id.priority,
            status: TaskStatus::Created,
            status_history: Vec::new(),
            attempts: Vec::new(),
            assigned_to: None,
            created_at: Utc::now(),
            assigned_at: None,
            started_at: None,
            completed_at: None,
            retry_after: None,
            result: None,
            error: None,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn status_history(&self) -> &[StatusTransition] {
        &self.status_history
    }

    /// Move to `to`, recording why and who asked for it.
    pub fn transition_to(
        &mut self,
        to: TaskStatus,
        reason: impl Into<String>,
        triggered_by: impl Into<String>,
    ) -> Result<TaskStatus, TaskTransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TaskTransitionError {
                task_id: self.id,
                from: self.status,
                to,
            });
        }
        let now = Utc::now();
        let from = self.status;
        self.status_history.push(StatusTransition {
            from,
            to,
            reason: reason.into(),
            triggered_by: triggered_by.into(),
            timestamp: now,
        });
        self.status = to;
        match to {
            TaskStatus::Assigned => self.assigned_at = Some(now),
            TaskStatus::Running => self.started_at = Some(now),
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => {
                self.completed_at = Some(now);
                self.retry_after = None;
            }
            _ => {}
        }
        Ok(from)
    }

    pub fn current_attempt(&self) -> Option<&TaskAttempt> {
        self.attempts.last()
    }

    pub fn current_attempt_mut(&mut self) -> Option<&mut TaskAttempt> {
        self.attempts.last_mut()
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }

    /// Attempts that count against the retry budget. Attempts torn down
    /// because their agent went away end `cancelled` and are not charged.
    pub fn charged_attempt_count(&self) -> u32 {
        self.attempts
            .iter()
            .filter(|attempt| attempt.status != AttemptStatus::Cancelled)
            .count() as u32
    }

    /// Whether the task is queued and waiting on nobody but the scheduler.
    pub fn is_pending(&self) -> bool {
        matches!(self.status, TaskStatus::Queued | TaskStatus::Retrying)
    }
}

// ============================================================================
// Construction
// ============================================================================

/// Caller-supplied description of a task; the coordinator assigns identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_type: TaskType,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub requirements: TaskRequirements,
    #[serde(default)]
    pub constraints: TaskConstraints,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub objective_id: Option<ObjectiveId>,
}

impl TaskSpec {
    pub fn new(task_type: TaskType, name: impl Into<String>) -> Self {
        Self {
            task_type,
            name: name.into(),
            description: String::new(),
            instructions: String::new(),
            input: Value::Null,
            requirements: TaskRequirements::default(),
            constraints: TaskConstraints::default(),
            priority: TaskPriority::Normal,
            objective_id: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.requirements.capabilities.push(capability.into());
        self
    }

    pub fn with_agent_type(mut self, agent_type: AgentType) -> Self {
        self.requirements.agent_type = Some(agent_type);
        self
    }

    pub fn with_min_reliability(mut self, min: f64) -> Self {
        self.requirements.min_reliability = Some(min);
        self
    }

    pub fn depends_on(mut self, task: TaskId) -> Self {
        self.constraints.dependencies.push(task);
        self
    }

    pub fn conflicts_with(mut self, task: TaskId) -> Self {
        self.constraints.conflicts_with.push(task);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.constraints.max_retries = Some(max_retries);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.constraints.timeout = Some(timeout);
        self
    }
}

/// A task inside an objective plan, wired to its siblings by local key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedTask {
    pub key: String,
    pub spec: TaskSpec,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl PlannedTask {
    pub fn new(key: impl Into<String>, spec: TaskSpec) -> Self {
        Self {
            key: key.into(),
            spec,
            depends_on: Vec::new(),
        }
    }

    pub fn after(mut self, key: impl Into<String>) -> Self {
        self.depends_on.push(key.into());
        self
    }
}
