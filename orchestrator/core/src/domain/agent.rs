// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Domain Model
//!
//! An **Agent** is a schedulable worker with capabilities, health and
//! workload. Agents are owned exclusively by the swarm coordinator; nothing in
//! this module is mutated by the agents themselves.
//!
//! # Agent Lifecycle
//!
//! ```text
//! initializing → idle ⇄ busy ⇄ paused → terminating → terminated
//!        \________\______\______\__________\
//!                                             → error   (from any non-terminal state)
//! ```
//!
//! An agent in `error` can be stopped (`terminating`) or, once it heartbeats
//! again with no task in hand, recover to `idle`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::task::TaskId;

// ============================================================================
// Identifiers
// ============================================================================

/// Role an agent plays in the swarm. Seeds its default capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Coordinator,
    Developer,
    Researcher,
    Analyzer,
    Reviewer,
    Tester,
    Documenter,
    Monitor,
    Specialist,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Coordinator => "coordinator",
            AgentType::Developer => "developer",
            AgentType::Researcher => "researcher",
            AgentType::Analyzer => "analyzer",
            AgentType::Reviewer => "reviewer",
            AgentType::Tester => "tester",
            AgentType::Documenter => "documenter",
            AgentType::Monitor => "monitor",
            AgentType::Specialist => "specialist",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable agent identifier.
///
/// `instance` is a per-type counter allocated by the coordinator; it only ever
/// grows, so `developer-3` is never handed out twice by the same swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId {
    pub agent_type: AgentType,
    pub instance: u32,
    pub uuid: Uuid,
}

impl AgentId {
    pub fn new(agent_type: AgentType, instance: u32) -> Self {
        Self {
            agent_type,
            instance,
            uuid: Uuid::new_v4(),
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.agent_type, self.instance)
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Initializing,
    Idle,
    Busy,
    Paused,
    Error,
    Terminating,
    Terminated,
}

impl AgentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentStatus::Terminated)
    }

    /// Statuses subject to heartbeat supervision.
    pub fn is_supervised(&self) -> bool {
        matches!(
            self,
            AgentStatus::Initializing | AgentStatus::Idle | AgentStatus::Busy | AgentStatus::Paused
        )
    }

    pub fn can_transition_to(&self, next: AgentStatus) -> bool {
        use AgentStatus::*;
        if *self == next {
            return false;
        }
        match self {
            Terminated => false,
            _ if next == Error => true,
            Initializing => matches!(next, Idle | Terminating),
            Idle => matches!(next, Busy | Paused | Terminating),
            Busy => matches!(next, Idle | Paused | Terminating),
            Paused => matches!(next, Idle | Busy | Terminating),
            Error => matches!(next, Idle | Terminating),
            Terminating => matches!(next, Terminated),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Initializing => "initializing",
            AgentStatus::Idle => "idle",
            AgentStatus::Busy => "busy",
            AgentStatus::Paused => "paused",
            AgentStatus::Error => "error",
            AgentStatus::Terminating => "terminating",
            AgentStatus::Terminated => "terminated",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("agent {agent_id}: invalid transition {from} -> {to}")]
pub struct AgentTransitionError {
    pub agent_id: AgentId,
    pub from: AgentStatus,
    pub to: AgentStatus,
}

// ============================================================================
// Capabilities
// ============================================================================

/// What an agent can do.
///
/// Abstract capability names used in task requirements resolve against the
/// boolean flags first (see [`AgentCapabilities::has_capability`]) and fall back
/// to the free-form lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCapabilities {
    pub code_generation: bool,
    pub code_review: bool,
    pub testing: bool,
    pub documentation: bool,
    pub research: bool,
    pub analysis: bool,
    pub web_search: bool,
    pub api_integration: bool,
    pub file_system: bool,
    pub terminal_access: bool,

    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub frameworks: Vec<String>,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,

    /// Slots an agent offers: one running task plus reserved backlog.
    pub max_concurrent_tasks: u32,

    pub reliability: f64,
    pub speed: f64,
    pub quality: f64,
}

impl Default for AgentCapabilities {
    fn default() -> Self {
        Self {
            code_generation: false,
            code_review: false,
            testing: false,
            documentation: false,
            research: false,
            analysis: false,
            web_search: false,
            api_integration: false,
            file_system: true,
            terminal_access: true,
            languages: Vec::new(),
            frameworks: Vec::new(),
            domains: Vec::new(),
            tools: Vec::new(),
            max_concurrent_tasks: 3,
            reliability: 0.8,
            speed: 1.0,
            quality: 0.8,
        }
    }
}

impl AgentCapabilities {
    /// Default capability profile for an agent type.
    pub fn for_type(agent_type: AgentType) -> Self {
        let mut caps = Self::default();
        match agent_type {
            AgentType::Coordinator => {
                caps.analysis = true;
                caps.research = true;
                caps.documentation = true;
                caps.web_search = true;
                caps.domains = vec!["coordination".into(), "planning".into()];
            }
            AgentType::Developer => {
                caps.code_generation = true;
                caps.code_review = true;
                caps.testing = true;
                caps.api_integration = true;
                caps.languages = vec![
                    "typescript".into(),
                    "javascript".into(),
                    "python".into(),
                    "rust".into(),
                ];
                caps.tools = vec!["git".into(), "editor".into()];
            }
            AgentType::Researcher => {
                caps.research = true;
                caps.analysis = true;
                caps.web_search = true;
                caps.documentation = true;
                caps.tools = vec!["web-browser".into(), "search-engine".into()];
            }
            AgentType::Analyzer => {
                caps.analysis = true;
                caps.research = true;
                caps.documentation = true;
                caps.domains = vec!["data-analysis".into(), "performance".into()];
            }
            AgentType::Reviewer => {
                caps.code_review = true;
                caps.analysis = true;
                caps.testing = true;
                caps.documentation = true;
                caps.quality = 0.9;
            }
            AgentType::Tester => {
                caps.testing = true;
                caps.code_review = true;
                caps.analysis = true;
                caps.tools = vec!["test-runner".into(), "coverage".into()];
            }
            AgentType::Documenter => {
                caps.documentation = true;
                caps.research = true;
            }
            AgentType::Monitor => {
                caps.analysis = true;
                caps.domains = vec!["monitoring".into()];
            }
            AgentType::Specialist => {
                caps.analysis = true;
                caps.code_generation = true;
            }
        }
        caps
    }

    /// Resolve an abstract capability tag against this profile.
    ///
    /// Tags are matched case-insensitively and `_`/` ` are treated as `-`, so
    /// `code_generation`, `Code Generation` and `code-generation` agree.
    pub fn has_capability(&self, capability: &str) -> bool {
        let normalized = capability.trim().to_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "code-generation" | "coding" => self.code_generation,
            "code-review" | "review" => self.code_review,
            "testing" => self.testing,
            "documentation" => self.documentation,
            "research" => self.research,
            "analysis" => self.analysis,
            "web-search" => self.web_search,
            "api-integration" => self.api_integration,
            "file-system" => self.file_system,
            "terminal-access" => self.terminal_access,
            other => [&self.languages, &self.frameworks, &self.domains, &self.tools]
                .iter()
                .any(|list| list.iter().any(|entry| entry.eq_ignore_ascii_case(other))),
        }
    }

    /// Fraction of `required` tags this profile satisfies. No requirements is a
    /// perfect match.
    pub fn match_ratio(&self, required: &[String]) -> f64 {
        if required.is_empty() {
            return 1.0;
        }
        let present = required.iter().filter(|c| self.has_capability(c)).count();
        present as f64 / required.len() as f64
    }
}

// ============================================================================
// Metrics & History
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub memory_mb: f64,
    pub cpu_cores: f64,
    pub disk_mb: f64,
}

/// Smoothing factor for the execution-time moving average.
pub const EXECUTION_TIME_SMOOTHING: f64 = 0.2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    /// Exponential moving average, milliseconds.
    pub average_execution_time_ms: f64,
    pub success_rate: f64,
    pub total_execution_time_ms: u64,
    pub resource_usage: ResourceUsage,
    pub last_activity: DateTime<Utc>,
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self {
            tasks_completed: 0,
            tasks_failed: 0,
            average_execution_time_ms: 0.0,
            success_rate: 1.0,
            total_execution_time_ms: 0,
            resource_usage: ResourceUsage::default(),
            last_activity: Utc::now(),
        }
    }
}

impl AgentMetrics {
    pub fn record_success(&mut self, execution_time_ms: u64) {
        self.tasks_completed += 1;
        self.total_execution_time_ms += execution_time_ms;
        let sample = execution_time_ms as f64;
        self.average_execution_time_ms = if self.tasks_completed == 1 {
            sample
        } else {
            self.average_execution_time_ms * (1.0 - EXECUTION_TIME_SMOOTHING)
                + sample * EXECUTION_TIME_SMOOTHING
        };
        self.refresh_success_rate();
        self.last_activity = Utc::now();
    }

    pub fn record_failure(&mut self) {
        self.tasks_failed += 1;
        self.refresh_success_rate();
        self.last_activity = Utc::now();
    }

    fn refresh_success_rate(&mut self) {
        let total = self.tasks_completed + self.tasks_failed;
        self.success_rate = if total == 0 {
            1.0
        } else {
            self.tasks_completed as f64 / total as f64
        };
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub message: String,
    pub task_id: Option<TaskId>,
}

/// Cap on retained error records per agent.
pub const AGENT_ERROR_HISTORY_LIMIT: usize = 50;

// ============================================================================
// Aggregate
// ============================================================================

/// Coordinator-owned view of a single agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub id: AgentId,
    pub name: String,
    pub agent_type: AgentType,
    pub status: AgentStatus,
    pub capabilities: AgentCapabilities,
    pub metrics: AgentMetrics,
    /// Derived by the coordinator, never written by the agent.
    pub workload: f64,
    pub health: f64,
    pub current_task: Option<TaskId>,
    /// Queued tasks reserved for this agent, oldest first.
    pub queued_tasks: Vec<TaskId>,
    pub last_heartbeat: DateTime<Utc>,
    pub task_history: Vec<TaskId>,
    pub error_history: Vec<AgentErrorRecord>,
    /// Registration order within the swarm; ties in scheduling resolve by it.
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
}

impl AgentState {
    pub fn new(
        id: AgentId,
        name: impl Into<String>,
        capabilities: AgentCapabilities,
        sequence: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            agent_type: id.agent_type,
            status: AgentStatus::Initializing,
            capabilities,
            metrics: AgentMetrics::default(),
            workload: 0.0,
            health: 1.0,
            current_task: None,
            queued_tasks: Vec::new(),
            last_heartbeat: now,
            task_history: Vec::new(),
            error_history: Vec::new(),
            sequence,
            created_at: now,
        }
    }

    pub fn transition_to(&mut self, next: AgentStatus) -> Result<AgentStatus, AgentTransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(AgentTransitionError {
                agent_id: self.id,
                from: self.status,
                to: next,
            });
        }
        let previous = self.status;
        self.status = next;
        Ok(previous)
    }

    /// Workload if `extra` more tasks were placed on this agent.
    pub fn projected_workload(&self, extra: usize) -> f64 {
        let capacity = self.capabilities.max_concurrent_tasks.max(1) as f64;
        let occupied = usize::from(self.current_task.is_some()) + self.queued_tasks.len() + extra;
        occupied as f64 / capacity
    }

    pub fn recompute_workload(&mut self) {
        self.workload = self.projected_workload(0).min(1.0);
    }

    pub fn record_error(&mut self, kind: impl Into<String>, message: impl Into<String>, task_id: Option<TaskId>) {
        self.error_history.push(AgentErrorRecord {
            timestamp: Utc::now(),
            kind: kind.into(),
            message: message.into(),
            task_id,
        });
        if self.error_history.len() > AGENT_ERROR_HISTORY_LIMIT {
            let overflow = self.error_history.len() - AGENT_ERROR_HISTORY_LIMIT;
            self.error_history.drain(..overflow);
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == AgentStatus::Idle && self.current_task.is_none()
    }
}
