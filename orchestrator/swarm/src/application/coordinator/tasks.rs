// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Task use cases - creation, queueing, explicit assignment, cancellation and
// out-of-band completion reports.

use std::time::Duration;
use tracing::{debug, info};

use hivemind_core::domain::agent::{AgentId, AgentStatus};
use hivemind_core::domain::config::FailurePolicy;
use hivemind_core::domain::events::SwarmEventPayload;
use hivemind_core::domain::executor::TaskExecutionError;
use hivemind_core::domain::swarm::SwarmStatus;
use hivemind_core::domain::task::{TaskDefinition, TaskId, TaskResult, TaskSpec, TaskStatus};

use super::state::{CoordinatorState, RunningAttempt, EVENT_SOURCE};
use super::{Inner, SwarmCoordinator};
use crate::application::scheduler::breaker_key;
use crate::domain::error::{SwarmError, SwarmResult};

impl Inner {
    /// Register a task in `created` and wire its dependency edges.
    pub(super) fn register_task(
        &self,
        state: &mut CoordinatorState,
        spec: TaskSpec,
    ) -> SwarmResult<TaskId> {
        for dependency in &spec.constraints.dependencies {
            if !state.tasks.contains_key(dependency) {
                return Err(SwarmError::UnknownDependency(dependency.to_string()));
            }
        }

        let task_id = TaskId::new(self.swarm_id, state.next_task_sequence, spec.priority);
        state.next_task_sequence += 1;
        let dependencies = spec.constraints.dependencies.clone();
        let task = TaskDefinition::new(task_id, spec);
        let name = task.name.clone();
        let task_type = task.task_type.clone();

        state.graph.add_task(task_id);
        for dependency in &dependencies {
            // A brand-new task has no dependents, so this edge cannot close a
            // cycle.
            state.graph.add_dependency(&task_id, dependency)?;
            if let Some(upstream) = state.tasks.get_mut(dependency) {
                upstream.constraints.dependents.push(task_id);
            }
        }
        state.tasks.insert(task_id, task);
        state.emit(SwarmEventPayload::TaskCreated {
            task_id,
            name,
            task_type,
        });
        metrics::counter!("hivemind_tasks_created_total").increment(1);
        Ok(task_id)
    }

    /// `created → queued`. A task whose prerequisites already failed or were
    /// cancelled is finished on the spot according to the failure policy.
    pub(super) fn enqueue(
        &self,
        state: &mut CoordinatorState,
        task_id: &TaskId,
    ) -> SwarmResult<Vec<RunningAttempt>> {
        state.transition_task(task_id, TaskStatus::Queued, "queued", EVENT_SOURCE)?;
        state.emit(SwarmEventPayload::TaskQueued { task_id: *task_id });

        let dead_dependency = state
            .graph
            .dependencies_of(task_id)
            .into_iter()
            .find(|dependency| {
                matches!(
                    state.status_of(dependency),
                    Some(TaskStatus::Failed | TaskStatus::Cancelled)
                )
            });
        let Some(dependency) = dead_dependency else {
            return Ok(Vec::new());
        };

        let reason = format!("dependency {dependency} did not complete");
        let to = match (state.status_of(&dependency), self.config.scheduling.failure_policy) {
            (Some(TaskStatus::Failed), FailurePolicy::Continue) => TaskStatus::Failed,
            _ => TaskStatus::Cancelled,
        };
        let mut interrupted: Vec<RunningAttempt> =
            state.finish_task(task_id, to, &reason, EVENT_SOURCE).into_iter().collect();
        interrupted.extend(match to {
            TaskStatus::Failed => state.cascade_failure(task_id, FailurePolicy::Continue),
            _ => state.cascade_cancel(task_id),
        });
        Ok(interrupted)
    }
}

impl SwarmCoordinator {
    /// Register a task without queueing it.
    pub fn create_task(&self, spec: TaskSpec) -> SwarmResult<TaskId> {
        let task_id = self.with_state(|inner, state| {
            if state.status.is_terminal() || state.draining {
                return Err(SwarmError::InvalidState(format!(
                    "cannot create tasks while the swarm is {}",
                    state.status
                )));
            }
            if state.open_task_count() >= inner.config.max_tasks {
                return Err(SwarmError::TaskLimitReached {
                    max: inner.config.max_tasks,
                });
            }
            inner.register_task(state, spec)
        })?;
        debug!(task_id = %task_id, "Task created");
        Ok(task_id)
    }

    /// Move a created task into the scheduling queue.
    pub fn queue_task(&self, task_id: TaskId) -> SwarmResult<()> {
        let dispatches = self.with_state(|inner, state| {
            let interrupted = inner.enqueue(state, &task_id)?;
            // Nothing downstream of a task that never ran can be running.
            debug_assert!(interrupted.is_empty());
            Ok::<_, SwarmError>(inner.plan_dispatches(state))
        })?;
        self.dispatch_all(dispatches);
        Ok(())
    }

    /// Create, queue and schedule in one step.
    pub fn submit_task(&self, spec: TaskSpec) -> SwarmResult<TaskId> {
        let task_id = self.create_task(spec)?;
        self.queue_task(task_id)?;
        info!(task_id = %task_id, "Task submitted");
        Ok(task_id)
    }

    /// Assign a task, optionally to a specific agent.
    ///
    /// With an explicit agent that is available, the task starts immediately
    /// if it is ready and a concurrency slot is free; otherwise it is reserved
    /// in the agent's backlog, provided that keeps the agent's workload at or
    /// below 1.0. Without an agent the scheduler selects one. Returns the
    /// agent now holding the task, or `None` if it stays in the shared queue.
    pub fn assign_task(
        &self,
        task_id: TaskId,
        agent_id: Option<AgentId>,
    ) -> SwarmResult<Option<AgentId>> {
        let (holder, dispatch) = self.with_state(|inner, state| {
            if state.status != SwarmStatus::Executing {
                return Err(SwarmError::InvalidState(format!(
                    "cannot assign tasks while the swarm is {}",
                    state.status
                )));
            }
            if state.task(&task_id)?.status() == TaskStatus::Created {
                let interrupted = inner.enqueue(state, &task_id)?;
                debug_assert!(interrupted.is_empty());
            }
            let status = state.task(&task_id)?.status();
            if status != TaskStatus::Queued {
                return Err(SwarmError::InvalidState(format!(
                    "task {task_id} is {status}, expected queued"
                )));
            }

            let ready = state.is_ready(&task_id);
            let slot_free = state.running.len() < inner.scheduler.max_concurrency();

            match agent_id {
                Some(agent_id) => {
                    let agent = state.agent(&agent_id)?;
                    if agent.is_available() && ready && slot_free && !state.draining {
                        let dispatch = inner.start_attempt(state, task_id, agent_id)?;
                        return Ok((Some(agent_id), Some(dispatch)));
                    }
                    if matches!(
                        agent.status,
                        AgentStatus::Error | AgentStatus::Terminating | AgentStatus::Terminated
                    ) {
                        return Err(SwarmError::InvalidState(format!(
                            "agent {agent_id} is {}",
                            agent.status
                        )));
                    }
                    state.reserve(&task_id, &agent_id)?;
                    debug!(task_id = %task_id, agent_id = %agent_id, "Task reserved in agent backlog");
                    Ok((Some(agent_id), None))
                }
                None => {
                    if !ready || !slot_free || !state.is_dispatching() {
                        return Ok((None, None));
                    }
                    let selected = {
                        let task = state.task(&task_id)?;
                        let agents = state.agents_by_sequence();
                        inner
                            .scheduler
                            .select(&agents, task, &inner.scheduling_context(), &inner.breakers)
                    };
                    match selected {
                        Some(agent_id) => {
                            let dispatch = inner.start_attempt(state, task_id, agent_id)?;
                            Ok((Some(agent_id), Some(dispatch)))
                        }
                        None => Ok((None, None)),
                    }
                }
            }
        })?;

        if let Some(dispatch) = dispatch {
            self.launch(dispatch);
        }
        Ok(holder)
    }

    /// Cancel a task and everything downstream of it. Idempotent: cancelling
    /// a terminal task is a no-op.
    pub async fn cancel_task(&self, task_id: TaskId, reason: &str) -> SwarmResult<()> {
        let (dispatches, interrupted) = self.with_state(|inner, state| {
            let status = state.task(&task_id)?.status();
            if status.is_terminal() {
                return Ok((Vec::new(), Vec::new()));
            }
            let mut interrupted: Vec<RunningAttempt> = Vec::new();
            interrupted.extend(state.finish_task(&task_id, TaskStatus::Cancelled, reason, EVENT_SOURCE));
            interrupted.extend(state.cascade_cancel(&task_id));
            for attempt in &interrupted {
                inner
                    .breakers
                    .abandon_trial(&breaker_key(&attempt.agent_id));
            }
            Ok::<_, SwarmError>((inner.plan_dispatches(state), interrupted))
        })?;

        info!(task_id = %task_id, reason, "Task cancelled");
        self.interrupt(interrupted).await;
        self.dispatch_all(dispatches);
        Ok(())
    }

    /// Report a successful result for the task's running attempt from outside
    /// the executor. The in-flight executor call is cancelled and its own
    /// outcome ignored.
    pub async fn complete_task(&self, task_id: TaskId, result: TaskResult) -> SwarmResult<()> {
        let (dispatches, superseded) = self.with_state(|inner, state| {
            let running = take_running(state, &task_id)?;
            let elapsed = attempt_elapsed(state, &task_id);
            inner.complete(state, &task_id, &running.agent_id, result, elapsed);
            Ok::<_, SwarmError>((inner.plan_dispatches(state), running))
        })?;

        self.inner.settled.notify_waiters();
        superseded.cancel.cancel();
        self.dispatch_all(dispatches);
        Ok(())
    }

    /// Report a failure for the task's running attempt from outside the
    /// executor; the usual retry-or-fail rules apply.
    pub async fn fail_task(&self, task_id: TaskId, error: TaskExecutionError) -> SwarmResult<()> {
        let (dispatches, retry, interrupted, superseded) = self.with_state(|inner, state| {
            let running = take_running(state, &task_id)?;
            let (retry, interrupted) = inner.fail(state, &task_id, &running.agent_id, error);
            Ok::<_, SwarmError>((inner.plan_dispatches(state), retry, interrupted, running))
        })?;

        self.inner.settled.notify_waiters();
        superseded.cancel.cancel();
        if let Some(delay) = retry {
            self.schedule_retry(task_id, delay);
        }
        self.interrupt(interrupted).await;
        self.dispatch_all(dispatches);
        Ok(())
    }

    /// The agent the scheduler would pick for `task_id` right now, without
    /// assigning anything.
    pub fn select_agent_for_task(&self, task_id: &TaskId) -> SwarmResult<Option<AgentId>> {
        let state = self.inner.state.lock();
        let task = state.task(task_id)?;
        let agents = state.agents_by_sequence();
        Ok(self.inner.scheduler.select(
            &agents,
            task,
            &self.inner.scheduling_context(),
            &self.inner.breakers,
        ))
    }

    /// Pending tasks whose prerequisites have all completed.
    pub fn ready_tasks(&self) -> Vec<TaskId> {
        self.inner
            .state
            .lock()
            .ready_pending(tokio::time::Instant::now())
    }

    pub fn get_task(&self, task_id: &TaskId) -> Option<TaskDefinition> {
        self.inner.state.lock().tasks.get(task_id).cloned()
    }

    /// Tasks in creation order.
    pub fn list_tasks(&self) -> Vec<TaskDefinition> {
        self.inner.state.lock().tasks.values().cloned().collect()
    }
}

fn take_running(state: &mut CoordinatorState, task_id: &TaskId) -> SwarmResult<RunningAttempt> {
    let status = state.task(task_id)?.status();
    state.running.remove(task_id).ok_or_else(|| {
        SwarmError::InvalidState(format!("task {task_id} is {status}, not running"))
    })
}

fn attempt_elapsed(state: &CoordinatorState, task_id: &TaskId) -> Duration {
    state
        .tasks
        .get(task_id)
        .and_then(|task| task.current_attempt())
        .and_then(|attempt| (chrono::Utc::now() - attempt.started_at).to_std().ok())
        .unwrap_or_default()
}
