// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # State Persistence Interface
//!
//! The coordinator saves one [`SwarmSnapshot`] at shutdown and loads it back
//! during initialize. Nothing is written in between, so an implementation only
//! needs whole-snapshot semantics.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `StatePersistence` | `SwarmSnapshot` | `InMemoryStatePersistence` |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::domain::agent::{AgentState, AgentType};
use crate::domain::objective::SwarmObjective;
use crate::domain::swarm::{SwarmId, SwarmStatus};
use crate::domain::task::TaskDefinition;

/// Serializable image of a coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmSnapshot {
    pub swarm_id: SwarmId,
    pub name: String,
    pub status: SwarmStatus,
    pub agents: Vec<AgentState>,
    pub tasks: Vec<TaskDefinition>,
    pub objectives: Vec<SwarmObjective>,
    pub next_task_sequence: u64,
    pub next_agent_sequence: u64,
    #[serde(default)]
    pub agent_instances: HashMap<AgentType, u32>,
    pub taken_at: DateTime<Utc>,
}

#[async_trait]
pub trait StatePersistence: Send + Sync {
    async fn save_state(&self, snapshot: &SwarmSnapshot) -> Result<(), RepositoryError>;

    /// `None` when nothing has been saved yet.
    async fn load_state(&self) -> Result<Option<SwarmSnapshot>, RepositoryError>;
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
