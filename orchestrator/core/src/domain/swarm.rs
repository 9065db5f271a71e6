// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Identity and Lifecycle
//!
//! A **Swarm** is the full pool of agents and tasks under one coordinator for
//! one run. This module holds the swarm identifier and the top-level lifecycle
//! state machine driven by the coordinator:
//!
//! ```text
//! planning → initializing → executing ⇄ paused → completed | failed
//! ```
//!
//! `failed` is also reachable from `initializing` (configuration rejected) and
//! from `paused`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a swarm run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SwarmId(pub Uuid);

impl SwarmId {
    /// Generate a new random `SwarmId`.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SwarmId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SwarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "swarm-{}", self.0)
    }
}

/// Top-level lifecycle of a swarm coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwarmStatus {
    Planning,
    Initializing,
    Executing,
    Paused,
    Completed,
    Failed,
}

impl SwarmStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SwarmStatus::Completed | SwarmStatus::Failed)
    }

    /// Whether the lifecycle graph has an edge from `self` to `next`.
    pub fn can_transition_to(&self, next: SwarmStatus) -> bool {
        use SwarmStatus::*;
        matches!(
            (self, next),
            (Planning, Initializing)
                | (Initializing, Executing)
                | (Initializing, Failed)
                | (Executing, Paused)
                | (Paused, Executing)
                | (Executing, Completed)
                | (Executing, Failed)
                | (Paused, Completed)
                | (Paused, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SwarmStatus::Planning => "planning",
            SwarmStatus::Initializing => "initializing",
            SwarmStatus::Executing => "executing",
            SwarmStatus::Paused => "paused",
            SwarmStatus::Completed => "completed",
            SwarmStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SwarmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid swarm transition {from} -> {to}")]
pub struct SwarmTransitionError {
    pub from: SwarmStatus,
    pub to: SwarmStatus,
}

/// Point-in-time aggregate computed by the metrics pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwarmMetrics {
    pub total_agents: usize,
    pub active_agents: usize,
    pub idle_agents: usize,
    pub errored_agents: usize,
    pub total_tasks: usize,
    pub pending_tasks: usize,
    pub running_tasks: usize,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub cancelled_tasks: u64,
    /// Completed tasks per minute since the swarm started executing.
    pub throughput_per_minute: f64,
    pub success_rate: f64,
    pub average_execution_time_ms: f64,
    /// Mean agent workload across non-terminated agents.
    pub agent_utilization: f64,
    pub uptime_ms: u64,
}
