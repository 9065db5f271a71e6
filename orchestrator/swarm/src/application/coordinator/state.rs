// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Coordinator state - the agent, task and objective maps owned by one
// coordinator, plus the bookkeeping helpers every use case shares.
//
// Everything here runs under the coordinator's state mutex and never awaits.
// Events are pushed to `outbox` and published by the caller after the lock is
// released.

use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use hivemind_core::domain::agent::{AgentId, AgentState, AgentStatus, AgentType};
use hivemind_core::domain::config::FailurePolicy;
use hivemind_core::domain::events::{SwarmEvent, SwarmEventPayload};
use hivemind_core::domain::objective::{ObjectiveId, ObjectiveStatus, SwarmObjective, SwarmProgress};
use hivemind_core::domain::swarm::{SwarmStatus, SwarmTransitionError};
use hivemind_core::domain::task::{AttemptStatus, TaskDefinition, TaskError, TaskId, TaskStatus};

use crate::domain::dependency_graph::DependencyGraph;
use crate::domain::error::{SwarmError, SwarmResult};

pub(crate) const EVENT_SOURCE: &str = "coordinator";

/// An attempt currently handed to the executor.
pub(crate) struct RunningAttempt {
    pub task_id: TaskId,
    pub agent_id: AgentId,
    pub attempt: u32,
    pub cancel: CancellationToken,
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Counters {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_cancelled: u64,
    pub total_execution_time_ms: u64,
}

pub(crate) struct CoordinatorState {
    pub status: SwarmStatus,
    /// Set once shutdown begins; no new attempts start afterwards.
    pub draining: bool,
    pub agents: HashMap<AgentId, AgentState>,
    pub tasks: BTreeMap<TaskId, TaskDefinition>,
    pub objectives: BTreeMap<ObjectiveId, SwarmObjective>,
    pub graph: DependencyGraph<TaskId>,
    pub running: HashMap<TaskId, RunningAttempt>,
    /// Monotonic backoff deadlines for tasks in `retrying`.
    pub retry_at: HashMap<TaskId, Instant>,
    /// Monotonic time of each agent's last heartbeat.
    pub heartbeats: HashMap<AgentId, Instant>,
    pub counters: Counters,
    pub next_task_sequence: u64,
    pub next_agent_sequence: u64,
    pub agent_instances: HashMap<AgentType, u32>,
    pub executing_since: Option<Instant>,
    pub outbox: Vec<SwarmEvent>,
}

impl CoordinatorState {
    pub fn new() -> Self {
        Self {
            status: SwarmStatus::Planning,
            draining: false,
            agents: HashMap::new(),
            tasks: BTreeMap::new(),
            objectives: BTreeMap::new(),
            graph: DependencyGraph::new(),
            running: HashMap::new(),
            retry_at: HashMap::new(),
            heartbeats: HashMap::new(),
            counters: Counters::default(),
            next_task_sequence: 1,
            next_agent_sequence: 0,
            agent_instances: HashMap::new(),
            executing_since: None,
            outbox: Vec::new(),
        }
    }

    pub fn emit(&mut self, payload: SwarmEventPayload) {
        self.outbox.push(SwarmEvent::new(EVENT_SOURCE, payload));
    }

    pub fn set_status(&mut self, to: SwarmStatus) -> Result<SwarmStatus, SwarmTransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(SwarmTransitionError {
                from: self.status,
                to,
            });
        }
        let from = self.status;
        self.status = to;
        debug!(from = %from, to = %to, "Swarm status changed");
        Ok(from)
    }

    /// Whether new attempts may start.
    pub fn is_dispatching(&self) -> bool {
        self.status == SwarmStatus::Executing && !self.draining
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    pub fn task(&self, task_id: &TaskId) -> SwarmResult<&TaskDefinition> {
        self.tasks.get(task_id).ok_or(SwarmError::TaskNotFound(*task_id))
    }

    pub fn task_mut(&mut self, task_id: &TaskId) -> SwarmResult<&mut TaskDefinition> {
        self.tasks
            .get_mut(task_id)
            .ok_or(SwarmError::TaskNotFound(*task_id))
    }

    pub fn agent(&self, agent_id: &AgentId) -> SwarmResult<&AgentState> {
        self.agents
            .get(agent_id)
            .ok_or(SwarmError::AgentNotFound(*agent_id))
    }

    pub fn agent_mut(&mut self, agent_id: &AgentId) -> SwarmResult<&mut AgentState> {
        self.agents
            .get_mut(agent_id)
            .ok_or(SwarmError::AgentNotFound(*agent_id))
    }

    pub fn status_of(&self, task_id: &TaskId) -> Option<TaskStatus> {
        self.tasks.get(task_id).map(TaskDefinition::status)
    }

    pub fn is_ready(&self, task_id: &TaskId) -> bool {
        self.graph.is_ready(task_id, |id| self.status_of(id))
    }

    /// Queued or retrying tasks whose dependencies completed and whose
    /// backoff (if any) has elapsed at `now`, in creation order.
    pub fn ready_pending(&self, now: Instant) -> Vec<TaskId> {
        self.graph
            .ready_tasks(|id| self.status_of(id))
            .into_iter()
            .filter(|id| self.tasks.get(id).is_some_and(TaskDefinition::is_pending))
            .filter(|id| self.retry_at.get(id).map_or(true, |at| *at <= now))
            .collect()
    }

    /// Agents in registration order.
    pub fn agents_by_sequence(&self) -> Vec<&AgentState> {
        let mut agents: Vec<&AgentState> = self.agents.values().collect();
        agents.sort_by_key(|agent| agent.sequence);
        agents
    }

    pub fn live_agent_count(&self) -> usize {
        self.agents
            .values()
            .filter(|agent| !agent.status.is_terminal())
            .count()
    }

    pub fn open_task_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|task| !task.status().is_terminal())
            .count()
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    pub fn transition_task(
        &mut self,
        task_id: &TaskId,
        to: TaskStatus,
        reason: impl Into<String>,
        triggered_by: impl Into<String>,
    ) -> SwarmResult<TaskStatus> {
        let from = self.task_mut(task_id)?.transition_to(to, reason, triggered_by)?;
        debug!(task_id = %task_id, from = %from, to = %to, "Task status changed");
        Ok(from)
    }

    pub fn set_agent_status(&mut self, agent_id: &AgentId, to: AgentStatus) -> SwarmResult<()> {
        let from = self.agent_mut(agent_id)?.transition_to(to)?;
        self.emit(SwarmEventPayload::AgentStatusChanged {
            agent_id: *agent_id,
            from,
            to,
        });
        Ok(())
    }

    /// Clear an agent's current task after an attempt ends. Busy agents go
    /// back to idle; paused, errored and terminating agents keep their status.
    pub fn release_agent(&mut self, agent_id: &AgentId, task_id: &TaskId) {
        let Some(agent) = self.agents.get_mut(agent_id) else {
            return;
        };
        if agent.current_task == Some(*task_id) {
            agent.current_task = None;
        }
        agent.recompute_workload();
        if agent.status == AgentStatus::Busy && agent.current_task.is_none() {
            if let Err(err) = self.set_agent_status(agent_id, AgentStatus::Idle) {
                warn!(agent_id = %agent_id, error = %err, "Failed to release agent");
            }
        }
    }

    /// Drop a backlog reservation, leaving the task unassigned in the queue.
    pub fn unreserve(&mut self, task_id: &TaskId) {
        let Some(holder) = self.tasks.get_mut(task_id).and_then(|t| t.assigned_to.take()) else {
            return;
        };
        if let Some(agent) = self.agents.get_mut(&holder) {
            agent.queued_tasks.retain(|queued| queued != task_id);
            agent.recompute_workload();
        }
    }

    /// Hold a queued task in an agent's backlog, taking it off any previous
    /// holder. Refused when one more task would push the agent's workload
    /// past 1.0. Reserving a task the agent already holds is a no-op.
    pub fn reserve(&mut self, task_id: &TaskId, agent_id: &AgentId) -> SwarmResult<()> {
        self.task(task_id)?;
        let agent = self.agent(agent_id)?;
        if agent.queued_tasks.contains(task_id) {
            return Ok(());
        }
        let projected = agent.projected_workload(1);
        if projected > 1.0 {
            return Err(SwarmError::AgentOverloaded {
                agent_id: *agent_id,
                workload: projected,
            });
        }

        self.unreserve(task_id);
        let agent = self.agent_mut(agent_id)?;
        agent.queued_tasks.push(*task_id);
        agent.recompute_workload();
        self.task_mut(task_id)?.assigned_to = Some(*agent_id);
        Ok(())
    }

    /// Move a task to `failed` or `cancelled` from wherever it is, tearing
    /// down any running attempt or reservation. Returns the running attempt,
    /// if there was one, so the caller can signal the executor.
    pub fn finish_task(
        &mut self,
        task_id: &TaskId,
        to: TaskStatus,
        reason: &str,
        triggered_by: &str,
    ) -> Option<RunningAttempt> {
        let status = self.status_of(task_id)?;
        if status.is_terminal() {
            return None;
        }
        if let Err(err) = self.transition_task(task_id, to, reason, triggered_by) {
            warn!(task_id = %task_id, error = %err, "Cannot finish task");
            return None;
        }

        let running = self.running.remove(task_id);
        self.retry_at.remove(task_id);
        let now = Utc::now();
        let mut objective = None;
        if let Some(task) = self.tasks.get_mut(task_id) {
            if to == TaskStatus::Failed {
                task.error = Some(TaskError {
                    kind: "dependency".to_string(),
                    message: reason.to_string(),
                    retryable: false,
                    timestamp: now,
                });
            }
            if let Some(attempt) = task.current_attempt_mut() {
                if attempt.status == AttemptStatus::Running {
                    attempt.status = AttemptStatus::Cancelled;
                    attempt.ended_at = Some(now);
                }
            }
            objective = task.objective_id;
        }

        match &running {
            Some(attempt) => self.release_agent(&attempt.agent_id, task_id),
            None => self.unreserve(task_id),
        }

        match to {
            TaskStatus::Failed => {
                self.counters.tasks_failed += 1;
                metrics::counter!("hivemind_tasks_failed_total").increment(1);
                self.emit(SwarmEventPayload::TaskFailed {
                    task_id: *task_id,
                    agent_id: running.as_ref().map(|r| r.agent_id),
                    error: reason.to_string(),
                });
            }
            _ => {
                self.counters.tasks_cancelled += 1;
                metrics::counter!("hivemind_tasks_cancelled_total").increment(1);
                self.emit(SwarmEventPayload::TaskCancelled {
                    task_id: *task_id,
                    reason: reason.to_string(),
                });
            }
        }

        if let Some(objective) = objective {
            self.refresh_objective(&objective);
        }
        running
    }

    /// Apply the failure policy to every transitive dependent of `root`.
    ///
    /// A dependent with any failed prerequisite can never become ready, so it
    /// is finished even if its other prerequisites completed.
    pub fn cascade_failure(&mut self, root: &TaskId, policy: FailurePolicy) -> Vec<RunningAttempt> {
        let reason = format!("dependency {root} failed");
        let mut signalled = Vec::new();
        for dependent in self.graph.transitive_dependents(root) {
            let Some(status) = self.status_of(&dependent) else {
                continue;
            };
            let to = match policy {
                FailurePolicy::Continue if status.can_transition_to(TaskStatus::Failed) => {
                    TaskStatus::Failed
                }
                _ => TaskStatus::Cancelled,
            };
            signalled.extend(self.finish_task(&dependent, to, &reason, EVENT_SOURCE));
        }
        signalled
    }

    pub fn cascade_cancel(&mut self, root: &TaskId) -> Vec<RunningAttempt> {
        let reason = format!("dependency {root} cancelled");
        let mut signalled = Vec::new();
        for dependent in self.graph.transitive_dependents(root) {
            signalled.extend(self.finish_task(&dependent, TaskStatus::Cancelled, &reason, EVENT_SOURCE));
        }
        signalled
    }

    // ========================================================================
    // Objectives
    // ========================================================================

    /// Recompute progress from task statuses and close the objective once
    /// every task is terminal.
    pub fn refresh_objective(&mut self, objective_id: &ObjectiveId) {
        let Some(objective) = self.objectives.get(objective_id) else {
            return;
        };

        let mut progress = SwarmProgress {
            total_tasks: objective.tasks.len() as u32,
            ..Default::default()
        };
        let mut quality_sum = 0.0;
        for task in objective.tasks.iter().filter_map(|id| self.tasks.get(id)) {
            match task.status() {
                TaskStatus::Created => progress.created_tasks += 1,
                TaskStatus::Queued | TaskStatus::Retrying => progress.queued_tasks += 1,
                TaskStatus::Assigned | TaskStatus::Running => progress.running_tasks += 1,
                TaskStatus::Completed => progress.completed_tasks += 1,
                TaskStatus::Failed => progress.failed_tasks += 1,
                TaskStatus::Cancelled => progress.cancelled_tasks += 1,
            }
            if let Some(result) = &task.result {
                quality_sum += result.quality;
                progress.cost_units += result.cost_units;
            }
            for attempt in &task.attempts {
                if let Some(ended) = attempt.ended_at {
                    let elapsed = (ended - attempt.started_at).num_milliseconds().max(0);
                    progress.total_execution_time_ms += elapsed as u64;
                }
            }
            if let Some(agent_id) = task.assigned_to {
                if let Some(agent) = self.agents.get(&agent_id) {
                    if agent.current_task == Some(task.id) {
                        let usage = agent.metrics.resource_usage;
                        progress.resource_usage.memory_mb += usage.memory_mb;
                        progress.resource_usage.cpu_cores += usage.cpu_cores;
                        progress.resource_usage.disk_mb += usage.disk_mb;
                    }
                }
            }
        }
        if progress.completed_tasks > 0 {
            progress.average_quality = quality_sum / progress.completed_tasks as f64;
        }
        if progress.total_tasks > 0 {
            progress.percent_complete =
                progress.terminal_tasks() as f64 / progress.total_tasks as f64 * 100.0;
        }

        let finished = progress.is_finished();
        let all_completed = progress.completed_tasks == progress.total_tasks;
        let unsuccessful = progress.failed_tasks + progress.cancelled_tasks;

        let Some(objective) = self.objectives.get_mut(objective_id) else {
            return;
        };
        objective.progress = progress;
        if objective.status != ObjectiveStatus::Executing || !finished {
            return;
        }

        objective.completed_at = Some(Utc::now());
        if all_completed {
            objective.status = ObjectiveStatus::Completed;
            self.emit(SwarmEventPayload::ObjectiveCompleted {
                objective_id: *objective_id,
            });
        } else {
            let reason = format!("{unsuccessful} task(s) failed or were cancelled");
            objective.status = ObjectiveStatus::Failed;
            objective.error = Some(reason.clone());
            self.emit(SwarmEventPayload::ObjectiveFailed {
                objective_id: *objective_id,
                reason,
            });
        }
    }
}
