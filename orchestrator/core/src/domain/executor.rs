// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Task Executor - the seam between the coordinator and whatever actually runs
// a task's payload. The coordinator never inspects the payload; it hands the
// executor a task, the agent chosen for it and a cancellation token, then
// settles the task from the returned Result.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::agent::AgentState;
use crate::domain::task::{TaskDefinition, TaskId, TaskResult};

#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Run one attempt of `task` on `agent`. Implementations should return
    /// promptly with a `Cancelled` error once `cancel` fires.
    async fn execute(
        &self,
        task: &TaskDefinition,
        agent: &AgentState,
        cancel: CancellationToken,
    ) -> Result<TaskResult, TaskExecutionError>;

    /// Out-of-band cancellation hint, sent in addition to the token.
    async fn cancel(&self, task_id: &TaskId) -> Result<(), TaskExecutionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorKind {
    Failed,
    Timeout,
    Cancelled,
    AgentUnavailable,
}

impl fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionErrorKind::Failed => "failed",
            ExecutionErrorKind::Timeout => "timeout",
            ExecutionErrorKind::Cancelled => "cancelled",
            ExecutionErrorKind::AgentUnavailable => "agent_unavailable",
        };
        f.write_str(name)
    }
}

/// Failure of a single attempt.
///
/// `retryable` decides whether the attempt is retried; `recoverable` tells the
/// coordinator whether the agent itself is still fit for work.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct TaskExecutionError {
    pub kind: ExecutionErrorKind,
    pub message: String,
    pub retryable: bool,
    pub recoverable: bool,
}

impl TaskExecutionError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            kind: ExecutionErrorKind::Failed,
            message: message.into(),
            retryable: true,
            recoverable: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ExecutionErrorKind::Failed,
            message: message.into(),
            retryable: false,
            recoverable: true,
        }
    }

    pub fn timeout(after: std::time::Duration) -> Self {
        Self {
            kind: ExecutionErrorKind::Timeout,
            message: format!("attempt exceeded {}ms", after.as_millis()),
            retryable: true,
            recoverable: true,
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self {
            kind: ExecutionErrorKind::Cancelled,
            message: reason.into(),
            retryable: false,
            recoverable: true,
        }
    }

    pub fn agent_unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: ExecutionErrorKind::AgentUnavailable,
            message: message.into(),
            retryable: true,
            recoverable: false,
        }
    }
}
