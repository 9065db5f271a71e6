// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use thiserror::Error;

use hivemind_core::domain::agent::{AgentId, AgentTransitionError};
use hivemind_core::domain::config::ConfigError;
use hivemind_core::domain::executor::TaskExecutionError;
use hivemind_core::domain::objective::ObjectiveId;
use hivemind_core::domain::repository::RepositoryError;
use hivemind_core::domain::swarm::SwarmTransitionError;
use hivemind_core::domain::task::{TaskId, TaskTransitionError};

use crate::domain::circuit_breaker::CircuitOpenError;
use crate::domain::conflict::ConflictError;
use crate::domain::dependency_graph::DependencyError;

pub type SwarmResult<T> = Result<T, SwarmError>;

#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("configuration validation failed: {0}")]
    ConfigurationValidation(#[from] ConfigError),

    #[error("dependency cycle detected: {}", .cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    #[error("unknown dependency: {0}")]
    UnknownDependency(String),

    #[error("agent {agent_id} missed its heartbeat deadline")]
    AgentHeartbeatTimeout { agent_id: AgentId },

    #[error("task execution failed: {0}")]
    TaskExecution(#[from] TaskExecutionError),

    #[error("conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    #[error("agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("objective not found: {0}")]
    ObjectiveNotFound(ObjectiveId),

    #[error(transparent)]
    InvalidTaskTransition(#[from] TaskTransitionError),

    #[error(transparent)]
    InvalidAgentTransition(#[from] AgentTransitionError),

    #[error(transparent)]
    InvalidSwarmTransition(#[from] SwarmTransitionError),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("agent limit reached ({max})")]
    AgentLimitReached { max: usize },

    #[error("task limit reached ({max})")]
    TaskLimitReached { max: usize },

    #[error("agent {agent_id} cannot take more work (workload would be {workload:.2})")]
    AgentOverloaded { agent_id: AgentId, workload: f64 },

    #[error("persistence error: {0}")]
    Persistence(#[from] RepositoryError),
}

impl From<DependencyError> for SwarmError {
    fn from(err: DependencyError) -> Self {
        match err {
            DependencyError::Cycle { cycle } => SwarmError::DependencyCycle { cycle },
            DependencyError::UnknownTask(task) => SwarmError::UnknownDependency(task),
        }
    }
}
