// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Swarm lifecycle - initialize (with state restore), pause/resume, failure
// and graceful shutdown.

use chrono::Utc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

use hivemind_core::domain::agent::{AgentId, AgentStatus};
use hivemind_core::domain::events::SwarmEventPayload;
use hivemind_core::domain::repository::SwarmSnapshot;
use hivemind_core::domain::swarm::SwarmStatus;
use hivemind_core::domain::task::{AttemptStatus, TaskError, TaskId, TaskStatus};

use super::state::{CoordinatorState, Counters, RunningAttempt, EVENT_SOURCE};
use super::{Inner, SwarmCoordinator};
use crate::application::scheduler::breaker_key;
use crate::domain::error::{SwarmError, SwarmResult};

const RECOVERY_SOURCE: &str = "recovery";

impl Inner {
    /// Move the swarm to `failed`, cancelling every open task. Returns the
    /// attempts that must be signalled.
    pub(super) fn fail_swarm_locked(
        &self,
        state: &mut CoordinatorState,
        reason: &str,
    ) -> Vec<RunningAttempt> {
        if state.status.is_terminal() {
            return Vec::new();
        }
        if let Err(err) = state.set_status(SwarmStatus::Failed) {
            warn!(error = %err, "Cannot fail swarm");
            return Vec::new();
        }
        state.draining = true;
        let interrupted = cancel_open_tasks(self, state, reason);
        state.emit(SwarmEventPayload::SwarmFailed {
            swarm_id: self.swarm_id,
            reason: reason.to_string(),
        });
        error!(swarm_id = %self.swarm_id, reason, "Swarm failed");
        interrupted
    }
}

fn cancel_open_tasks(inner: &Inner, state: &mut CoordinatorState, reason: &str) -> Vec<RunningAttempt> {
    let open: Vec<TaskId> = state
        .tasks
        .values()
        .filter(|task| !task.status().is_terminal())
        .map(|task| task.id)
        .collect();
    let mut interrupted = Vec::new();
    for task_id in open {
        interrupted.extend(state.finish_task(&task_id, TaskStatus::Cancelled, reason, EVENT_SOURCE));
    }
    for attempt in &interrupted {
        inner.breakers.abandon_trial(&breaker_key(&attempt.agent_id));
    }
    interrupted
}

/// Load a persisted image into a fresh state. Agents are not restored; they
/// re-register and get fresh instance numbers. Returns pending retry timers.
fn restore(state: &mut CoordinatorState, snapshot: SwarmSnapshot) -> Vec<(TaskId, Duration)> {
    let now = Utc::now();
    let mut retries = Vec::new();
    let mut lost: Vec<TaskId> = Vec::new();

    for mut task in snapshot.tasks {
        let task_id = task.id;
        match task.status() {
            TaskStatus::Running => {
                if let Some(attempt) = task.current_attempt_mut() {
                    attempt.status = AttemptStatus::Failed;
                    attempt.ended_at = Some(now);
                    attempt.error = Some(TaskError {
                        kind: "interrupted".to_string(),
                        message: "interrupted by restart".to_string(),
                        retryable: true,
                        timestamp: now,
                    });
                }
                if task
                    .transition_to(TaskStatus::Retrying, "interrupted by restart", RECOVERY_SOURCE)
                    .is_ok()
                {
                    task.assigned_to = None;
                    task.retry_after = Some(now);
                    state.retry_at.insert(task_id, Instant::now());
                }
            }
            TaskStatus::Retrying => {
                task.assigned_to = None;
                let remaining = task
                    .retry_after
                    .and_then(|at| (at - now).to_std().ok())
                    .unwrap_or_default();
                state.retry_at.insert(task_id, Instant::now() + remaining);
                if !remaining.is_zero() {
                    retries.push((task_id, remaining));
                }
            }
            TaskStatus::Queued => task.assigned_to = None,
            TaskStatus::Assigned => lost.push(task_id),
            _ => {}
        }
        state.graph.add_task(task_id);
        state.tasks.insert(task_id, task);
    }

    let edges: Vec<(TaskId, TaskId)> = state
        .tasks
        .values()
        .flat_map(|task| {
            task.constraints
                .dependencies
                .iter()
                .map(move |dependency| (task.id, *dependency))
        })
        .collect();
    for (task_id, dependency) in edges {
        if let Err(err) = state.graph.add_dependency(&task_id, &dependency) {
            warn!(task_id = %task_id, error = %err, "Dropping dependency edge from snapshot");
        }
    }

    let mut counters = Counters::default();
    for task in state.tasks.values() {
        match task.status() {
            TaskStatus::Completed => {
                counters.tasks_completed += 1;
                if let Some(attempt) = task.current_attempt() {
                    if let Some(ended) = attempt.ended_at {
                        counters.total_execution_time_ms +=
                            (ended - attempt.started_at).num_milliseconds().max(0) as u64;
                    }
                }
            }
            TaskStatus::Failed => counters.tasks_failed += 1,
            TaskStatus::Cancelled => counters.tasks_cancelled += 1,
            _ => {}
        }
    }
    state.counters = counters;

    for objective in snapshot.objectives {
        state.objectives.insert(objective.id, objective);
    }
    state.next_task_sequence = state.next_task_sequence.max(snapshot.next_task_sequence);
    state.next_agent_sequence = state.next_agent_sequence.max(snapshot.next_agent_sequence);
    state.agent_instances = snapshot.agent_instances;

    // An assignment without a running attempt cannot be resumed.
    for task_id in lost {
        state.finish_task(&task_id, TaskStatus::Cancelled, "assignment lost on restart", RECOVERY_SOURCE);
        state.cascade_cancel(&task_id);
    }
    let objective_ids: Vec<_> = state.objectives.keys().copied().collect();
    for objective_id in objective_ids {
        state.refresh_objective(&objective_id);
    }
    retries
}

impl SwarmCoordinator {
    /// Validate configuration, restore persisted state, start the monitors
    /// and begin executing.
    pub async fn initialize(&self) -> SwarmResult<()> {
        self.with_state(|_, state| state.set_status(SwarmStatus::Initializing))?;

        if let Err(err) = self.inner.config.validate() {
            self.with_state(|inner, state| {
                if state.set_status(SwarmStatus::Failed).is_ok() {
                    state.emit(SwarmEventPayload::SwarmFailed {
                        swarm_id: inner.swarm_id,
                        reason: err.to_string(),
                    });
                }
            });
            error!(swarm_id = %self.inner.swarm_id, error = %err, "Swarm configuration is invalid");
            return Err(SwarmError::ConfigurationValidation(err));
        }

        let snapshot = match &self.inner.persistence {
            Some(persistence) => match persistence.load_state().await {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!(error = %err, "Failed to load persisted swarm state, starting empty");
                    None
                }
            },
            None => None,
        };

        let retries = self.with_state(|inner, state| {
            let mut retries = Vec::new();
            if let Some(snapshot) = snapshot {
                if snapshot.swarm_id != inner.swarm_id {
                    warn!(
                        snapshot_swarm_id = %snapshot.swarm_id,
                        swarm_id = %inner.swarm_id,
                        "Restoring a snapshot taken by another swarm"
                    );
                }
                info!(
                    tasks = snapshot.tasks.len(),
                    objectives = snapshot.objectives.len(),
                    taken_at = %snapshot.taken_at,
                    "Restoring swarm state"
                );
                retries = restore(state, snapshot);
            }
            state.set_status(SwarmStatus::Executing)?;
            state.executing_since = Some(Instant::now());
            state.emit(SwarmEventPayload::SwarmStarted {
                swarm_id: inner.swarm_id,
                name: inner.config.name.clone(),
            });
            Ok::<_, SwarmError>(retries)
        })?;

        self.start_monitors();
        for (task_id, delay) in retries {
            self.schedule_retry(task_id, delay);
        }
        info!(
            swarm_id = %self.inner.swarm_id,
            name = %self.inner.config.name,
            max_agents = self.inner.config.max_agents,
            max_concurrency = self.inner.config.performance.max_concurrency,
            "Swarm started"
        );
        self.schedule_pending();
        Ok(())
    }

    /// Stop starting new attempts. Busy agents are paused; their running
    /// attempts keep going and settle normally.
    pub fn pause(&self) -> SwarmResult<()> {
        self.with_state(|inner, state| {
            state.set_status(SwarmStatus::Paused)?;
            let busy: Vec<AgentId> = agents_with_status(state, AgentStatus::Busy);
            for agent_id in busy {
                state.set_agent_status(&agent_id, AgentStatus::Paused)?;
            }
            state.emit(SwarmEventPayload::SwarmPaused {
                swarm_id: inner.swarm_id,
            });
            Ok::<_, SwarmError>(())
        })?;
        info!(swarm_id = %self.inner.swarm_id, "Swarm paused");
        Ok(())
    }

    pub fn resume(&self) -> SwarmResult<()> {
        self.with_state(|inner, state| {
            state.set_status(SwarmStatus::Executing)?;
            let paused: Vec<AgentId> = agents_with_status(state, AgentStatus::Paused);
            for agent_id in paused {
                let next = match state.agent(&agent_id)?.current_task {
                    Some(_) => AgentStatus::Busy,
                    None => AgentStatus::Idle,
                };
                state.set_agent_status(&agent_id, next)?;
            }
            state.emit(SwarmEventPayload::SwarmResumed {
                swarm_id: inner.swarm_id,
            });
            Ok::<_, SwarmError>(())
        })?;
        info!(swarm_id = %self.inner.swarm_id, "Swarm resumed");
        self.schedule_pending();
        Ok(())
    }

    /// Fail the swarm: open tasks are cancelled and the monitors stop.
    pub async fn fail_swarm(&self, reason: &str) {
        let interrupted = self.with_state(|inner, state| inner.fail_swarm_locked(state, reason));
        self.inner.shutdown.cancel();
        self.interrupt(interrupted).await;
    }

    /// Graceful shutdown: stop the monitors, drain running attempts for up to
    /// `shutdown_grace_period`, force-cancel the rest, persist a final
    /// snapshot and complete the swarm.
    pub async fn shutdown(&self) -> SwarmResult<()> {
        let status = self.with_state(|_, state| {
            if matches!(state.status, SwarmStatus::Executing | SwarmStatus::Paused) {
                state.draining = true;
                let stopping: Vec<AgentId> = state
                    .agents_by_sequence()
                    .into_iter()
                    .filter(|agent| agent.status.can_transition_to(AgentStatus::Terminating))
                    .map(|agent| agent.id)
                    .collect();
                for agent_id in stopping {
                    if let Err(err) = state.set_agent_status(&agent_id, AgentStatus::Terminating) {
                        warn!(agent_id = %agent_id, error = %err, "Cannot stop agent");
                    }
                }
            }
            state.status
        });
        match status {
            SwarmStatus::Executing | SwarmStatus::Paused => {}
            status if status.is_terminal() => {
                self.inner.shutdown.cancel();
                self.join_background().await;
                return Ok(());
            }
            status => {
                return Err(SwarmError::InvalidState(format!(
                    "cannot shut down a swarm that is {status}"
                )));
            }
        }

        self.inner.shutdown.cancel();
        let grace = self.inner.config.performance.shutdown_grace_period;
        info!(
            swarm_id = %self.inner.swarm_id,
            grace_period_ms = grace.as_millis() as u64,
            "Swarm shutting down, draining running tasks"
        );
        self.drain(grace).await;

        let interrupted = self.with_state(|inner, state| {
            cancel_open_tasks(inner, state, "swarm shutdown")
        });
        if !interrupted.is_empty() {
            warn!(count = interrupted.len(), "Force-cancelling tasks still running after grace period");
        }
        self.interrupt(interrupted).await;

        self.with_state(|_, state| {
            for agent_id in agents_with_status(state, AgentStatus::Terminating) {
                if let Err(err) = state.set_agent_status(&agent_id, AgentStatus::Terminated) {
                    warn!(agent_id = %agent_id, error = %err, "Cannot terminate agent");
                }
            }
        });

        if let Some(persistence) = &self.inner.persistence {
            let snapshot = self.snapshot();
            if let Err(err) = persistence.save_state(&snapshot).await {
                warn!(error = %err, "Failed to persist final swarm state");
            }
        }
        self.join_background().await;

        self.with_state(|inner, state| {
            state.set_status(SwarmStatus::Completed)?;
            let counters = state.counters;
            state.emit(SwarmEventPayload::SwarmCompleted {
                swarm_id: inner.swarm_id,
                tasks_completed: counters.tasks_completed,
                tasks_failed: counters.tasks_failed,
                tasks_cancelled: counters.tasks_cancelled,
            });
            Ok::<_, SwarmError>(())
        })?;
        info!(swarm_id = %self.inner.swarm_id, "Swarm shut down");
        Ok(())
    }

    /// Wait until no attempt is running or `grace` elapses.
    async fn drain(&self, grace: Duration) {
        let deadline = Instant::now() + grace;
        loop {
            let notified = self.inner.settled.notified();
            tokio::pin!(notified);
            // Register before checking so a settle in between is not missed.
            notified.as_mut().enable();
            if self.inner.state.lock().running.is_empty() {
                return;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return;
            }
        }
    }

    async fn join_background(&self) {
        let handles = std::mem::take(&mut *self.inner.background.lock());
        for result in futures::future::join_all(handles).await {
            if let Err(err) = result {
                warn!(error = %err, "Swarm background task ended abnormally");
            }
        }
    }

    /// Serializable image of the current state.
    pub fn snapshot(&self) -> SwarmSnapshot {
        let state = self.inner.state.lock();
        SwarmSnapshot {
            swarm_id: self.inner.swarm_id,
            name: self.inner.config.name.clone(),
            status: state.status,
            agents: state.agents_by_sequence().into_iter().cloned().collect(),
            tasks: state.tasks.values().cloned().collect(),
            objectives: state.objectives.values().cloned().collect(),
            next_task_sequence: state.next_task_sequence,
            next_agent_sequence: state.next_agent_sequence,
            agent_instances: state.agent_instances.clone(),
            taken_at: Utc::now(),
        }
    }
}

fn agents_with_status(state: &CoordinatorState, status: AgentStatus) -> Vec<AgentId> {
    state
        .agents_by_sequence()
        .into_iter()
        .filter(|agent| agent.status == status)
        .map(|agent| agent.id)
        .collect()
}
