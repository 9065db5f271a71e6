// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Events
//!
//! Every observable state change in a swarm produces one [`SwarmEvent`]. The
//! payload is a closed enum; [`SwarmEventPayload::event_type`] maps it to a
//! [`SwarmEventType`] whose dotted name (`task.assigned`, `swarm.completed`, …)
//! is stable and safe to match on from sinks and dashboards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::agent::{AgentId, AgentStatus, AgentType};
use crate::domain::objective::ObjectiveId;
use crate::domain::swarm::{SwarmId, SwarmMetrics};
use crate::domain::task::{TaskId, TaskType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Emitting component, e.g. `coordinator` or `work-stealer`.
    pub source: String,
    /// Non-broadcast events are recorded in history and handed to sinks but
    /// not pushed to subscribers.
    pub broadcast: bool,
    pub payload: SwarmEventPayload,
}

impl SwarmEvent {
    pub fn new(source: impl Into<String>, payload: SwarmEventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            broadcast: true,
            payload,
        }
    }

    pub fn local(source: impl Into<String>, payload: SwarmEventPayload) -> Self {
        Self {
            broadcast: false,
            ..Self::new(source, payload)
        }
    }

    pub fn event_type(&self) -> SwarmEventType {
        self.payload.event_type()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SwarmEventPayload {
    // Swarm lifecycle
    SwarmStarted {
        swarm_id: SwarmId,
        name: String,
    },
    SwarmPaused {
        swarm_id: SwarmId,
    },
    SwarmResumed {
        swarm_id: SwarmId,
    },
    SwarmCompleted {
        swarm_id: SwarmId,
        tasks_completed: u64,
        tasks_failed: u64,
        tasks_cancelled: u64,
    },
    SwarmFailed {
        swarm_id: SwarmId,
        reason: String,
    },
    SwarmMetrics {
        swarm_id: SwarmId,
        metrics: SwarmMetrics,
    },

    // Agents
    AgentCreated {
        agent_id: AgentId,
        name: String,
        agent_type: AgentType,
    },
    AgentStarted {
        agent_id: AgentId,
    },
    AgentStatusChanged {
        agent_id: AgentId,
        from: AgentStatus,
        to: AgentStatus,
    },
    AgentHeartbeatTimeout {
        agent_id: AgentId,
        last_heartbeat: DateTime<Utc>,
        current_task: Option<TaskId>,
    },
    AgentRemoved {
        agent_id: AgentId,
    },

    // Tasks
    TaskCreated {
        task_id: TaskId,
        name: String,
        task_type: TaskType,
    },
    TaskQueued {
        task_id: TaskId,
    },
    TaskAssigned {
        task_id: TaskId,
        agent_id: AgentId,
    },
    TaskStarted {
        task_id: TaskId,
        agent_id: AgentId,
        attempt: u32,
    },
    TaskCompleted {
        task_id: TaskId,
        agent_id: AgentId,
        quality: f64,
        execution_time_ms: u64,
    },
    TaskFailed {
        task_id: TaskId,
        agent_id: Option<AgentId>,
        error: String,
    },
    TaskRetried {
        task_id: TaskId,
        attempt: u32,
        delay_ms: u64,
        retry_after: DateTime<Utc>,
    },
    TaskCancelled {
        task_id: TaskId,
        reason: String,
    },
    TaskReassigned {
        task_id: TaskId,
        from: AgentId,
        to: AgentId,
    },
    TaskQualityWarning {
        task_id: TaskId,
        quality: f64,
        threshold: f64,
    },

    // Objectives
    ObjectiveCreated {
        objective_id: ObjectiveId,
        name: String,
        task_count: usize,
    },
    ObjectiveStarted {
        objective_id: ObjectiveId,
    },
    ObjectiveCompleted {
        objective_id: ObjectiveId,
    },
    ObjectiveFailed {
        objective_id: ObjectiveId,
        reason: String,
    },

    // Circuit breakers
    CircuitOpened {
        key: String,
        consecutive_failures: u32,
    },
    CircuitHalfOpened {
        key: String,
    },
    CircuitClosed {
        key: String,
    },

    // Conflicts
    ConflictResolved {
        resource: String,
        winner: AgentId,
        strategy: String,
        requeued: Vec<AgentId>,
    },
}

impl SwarmEventPayload {
    pub fn event_type(&self) -> SwarmEventType {
        use SwarmEventPayload as P;
        use SwarmEventType as T;
        match self {
            P::SwarmStarted { .. } => T::SwarmStarted,
            P::SwarmPaused { .. } => T::SwarmPaused,
            P::SwarmResumed { .. } => T::SwarmResumed,
            P::SwarmCompleted { .. } => T::SwarmCompleted,
            P::SwarmFailed { .. } => T::SwarmFailed,
            P::SwarmMetrics { .. } => T::SwarmMetrics,
            P::AgentCreated { .. } => T::AgentCreated,
            P::AgentStarted { .. } => T::AgentStarted,
            P::AgentStatusChanged { .. } => T::AgentStatusChanged,
            P::AgentHeartbeatTimeout { .. } => T::AgentHeartbeatTimeout,
            P::AgentRemoved { .. } => T::AgentRemoved,
            P::TaskCreated { .. } => T::TaskCreated,
            P::TaskQueued { .. } => T::TaskQueued,
            P::TaskAssigned { .. } => T::TaskAssigned,
            P::TaskStarted { .. } => T::TaskStarted,
            P::TaskCompleted { .. } => T::TaskCompleted,
            P::TaskFailed { .. } => T::TaskFailed,
            P::TaskRetried { .. } => T::TaskRetried,
            P::TaskCancelled { .. } => T::TaskCancelled,
            P::TaskReassigned { .. } => T::TaskReassigned,
            P::TaskQualityWarning { .. } => T::TaskQualityWarning,
            P::ObjectiveCreated { .. } => T::ObjectiveCreated,
            P::ObjectiveStarted { .. } => T::ObjectiveStarted,
            P::ObjectiveCompleted { .. } => T::ObjectiveCompleted,
            P::ObjectiveFailed { .. } => T::ObjectiveFailed,
            P::CircuitOpened { .. } => T::CircuitOpened,
            P::CircuitHalfOpened { .. } => T::CircuitHalfOpened,
            P::CircuitClosed { .. } => T::CircuitClosed,
            P::ConflictResolved { .. } => T::ConflictResolved,
        }
    }

    /// The task this event is about, if any.
    pub fn task_id(&self) -> Option<TaskId> {
        use SwarmEventPayload as P;
        match self {
            P::TaskCreated { task_id, .. }
            | P::TaskQueued { task_id }
            | P::TaskAssigned { task_id, .. }
            | P::TaskStarted { task_id, .. }
            | P::TaskCompleted { task_id, .. }
            | P::TaskFailed { task_id, .. }
            | P::TaskRetried { task_id, .. }
            | P::TaskCancelled { task_id, .. }
            | P::TaskReassigned { task_id, .. }
            | P::TaskQualityWarning { task_id, .. } => Some(*task_id),
            _ => None,
        }
    }

    /// The agent this event is about, if any.
    pub fn agent_id(&self) -> Option<AgentId> {
        use SwarmEventPayload as P;
        match self {
            P::AgentCreated { agent_id, .. }
            | P::AgentStarted { agent_id }
            | P::AgentStatusChanged { agent_id, .. }
            | P::AgentHeartbeatTimeout { agent_id, .. }
            | P::AgentRemoved { agent_id }
            | P::TaskAssigned { agent_id, .. }
            | P::TaskStarted { agent_id, .. }
            | P::TaskCompleted { agent_id, .. } => Some(*agent_id),
            P::TaskFailed { agent_id, .. } => *agent_id,
            P::TaskReassigned { to, .. } => Some(*to),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwarmEventType {
    SwarmStarted,
    SwarmPaused,
    SwarmResumed,
    SwarmCompleted,
    SwarmFailed,
    SwarmMetrics,
    AgentCreated,
    AgentStarted,
    AgentStatusChanged,
    AgentHeartbeatTimeout,
    AgentRemoved,
    TaskCreated,
    TaskQueued,
    TaskAssigned,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    TaskRetried,
    TaskCancelled,
    TaskReassigned,
    TaskQualityWarning,
    ObjectiveCreated,
    ObjectiveStarted,
    ObjectiveCompleted,
    ObjectiveFailed,
    CircuitOpened,
    CircuitHalfOpened,
    CircuitClosed,
    ConflictResolved,
}

impl SwarmEventType {
    pub fn as_str(&self) -> &'static str {
        use SwarmEventType as T;
        match self {
            T::SwarmStarted => "swarm.started",
            T::SwarmPaused => "swarm.paused",
            T::SwarmResumed => "swarm.resumed",
            T::SwarmCompleted => "swarm.completed",
            T::SwarmFailed => "swarm.failed",
            T::SwarmMetrics => "swarm.metrics",
            T::AgentCreated => "agent.created",
            T::AgentStarted => "agent.started",
            T::AgentStatusChanged => "agent.status_changed",
            T::AgentHeartbeatTimeout => "agent.heartbeat_timeout",
            T::AgentRemoved => "agent.removed",
            T::TaskCreated => "task.created",
            T::TaskQueued => "task.queued",
            T::TaskAssigned => "task.assigned",
            T::TaskStarted => "task.started",
            T::TaskCompleted => "task.completed",
            T::TaskFailed => "task.failed",
            T::TaskRetried => "task.retried",
            T::TaskCancelled => "task.cancelled",
            T::TaskReassigned => "task.reassigned",
            T::TaskQualityWarning => "task.quality_warning",
            T::ObjectiveCreated => "objective.created",
            T::ObjectiveStarted => "objective.started",
            T::ObjectiveCompleted => "objective.completed",
            T::ObjectiveFailed => "objective.failed",
            T::CircuitOpened => "circuit.opened",
            T::CircuitHalfOpened => "circuit.half_opened",
            T::CircuitClosed => "circuit.closed",
            T::ConflictResolved => "conflict.resolved",
        }
    }
}

impl fmt::Display for SwarmEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
