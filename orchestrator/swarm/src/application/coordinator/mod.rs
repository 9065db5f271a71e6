// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Swarm Coordinator
//!
//! Central state machine of a swarm: owns every agent, task and objective,
//! decides which agent runs which task next, and settles attempt outcomes
//! reported by the [`TaskExecutor`].
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Compose scheduling, breakers, work stealing and conflict
//!   resolution behind one cloneable handle
//!
//! # Concurrency
//!
//! [`SwarmCoordinator`] is a cheap `Arc` handle. All agent/task/objective
//! maps sit behind one `parking_lot::Mutex`, which is never held across an
//! `.await`: bookkeeping transitions are serialized while executor calls run
//! concurrently on spawned tokio tasks. Events produced under the lock go to
//! an outbox and are published after the lock is released, so event sinks
//! never run under it.
//!
//! Methods that may start attempts spawn onto the current tokio runtime and
//! must be called from within one.

mod agents;
mod lifecycle;
mod monitor;
mod objectives;
mod resources;
mod state;
mod tasks;

pub use agents::AgentSpec;

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hivemind_core::domain::agent::{AgentId, AgentState, AgentStatus};
use hivemind_core::domain::config::SwarmConfig;
use hivemind_core::domain::events::{SwarmEvent, SwarmEventPayload, SwarmEventType};
use hivemind_core::domain::executor::{ExecutionErrorKind, TaskExecutionError, TaskExecutor};
use hivemind_core::domain::repository::StatePersistence;
use hivemind_core::domain::swarm::{SwarmId, SwarmStatus};
use hivemind_core::domain::task::{
    AttemptStatus, TaskAttempt, TaskDefinition, TaskError, TaskId, TaskResult, TaskStatus,
};
use hivemind_core::infrastructure::{EventBus, EventReceiver, TaskEventReceiver};

use crate::application::scheduler::{breaker_key, AdvancedTaskScheduler};
use crate::application::strategy::{AffinityIndex, SchedulingContext};
use crate::application::work_stealing::{WorkStealingCoordinator, WorkStealingStats};
use crate::domain::circuit_breaker::{CircuitBreakerManager, CircuitBreakerMetrics, CircuitTransition};
use crate::domain::conflict::{ConflictResolver, OptimisticLockManager};
use crate::domain::error::{SwarmError, SwarmResult};

use state::{CoordinatorState, RunningAttempt, EVENT_SOURCE};

/// Backoff before retry number `attempts`: `2^attempts × 1000 ms`.
pub fn retry_delay(attempts: u32) -> Duration {
    Duration::from_millis(1000u64.saturating_mul(1u64 << attempts.min(20)))
}

// ============================================================================
// Construction
// ============================================================================

pub struct SwarmCoordinatorBuilder {
    config: SwarmConfig,
    executor: Option<Arc<dyn TaskExecutor>>,
    persistence: Option<Arc<dyn StatePersistence>>,
    event_bus: Option<EventBus>,
    swarm_id: Option<SwarmId>,
}

impl SwarmCoordinatorBuilder {
    pub fn new(config: SwarmConfig) -> Self {
        Self {
            config,
            executor: None,
            persistence: None,
            event_bus: None,
            swarm_id: None,
        }
    }

    /// Reuse the identity of a swarm being restored from persistence.
    pub fn with_swarm_id(mut self, swarm_id: SwarmId) -> Self {
        self.swarm_id = Some(swarm_id);
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn StatePersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Share an existing bus instead of creating one sized by
    /// `monitoring.event_history_limit`.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// The configuration is validated by [`SwarmCoordinator::initialize`], not
    /// here.
    pub fn build(self) -> SwarmResult<SwarmCoordinator> {
        let executor = self
            .executor
            .ok_or_else(|| SwarmError::InvalidState("a task executor is required".to_string()))?;
        let config = self.config;
        let event_bus = self
            .event_bus
            .unwrap_or_else(|| EventBus::new(config.monitoring.event_history_limit));

        let inner = Inner {
            swarm_id: self.swarm_id.unwrap_or_default(),
            executor,
            persistence: self.persistence,
            event_bus,
            state: Mutex::new(CoordinatorState::new()),
            breakers: CircuitBreakerManager::new(config.circuit_breaker.clone()),
            scheduler: AdvancedTaskScheduler::new(
                config.scheduling.strategy,
                config.performance.max_concurrency,
            ),
            affinity: AffinityIndex::new(),
            work_stealer: WorkStealingCoordinator::new(config.work_stealing.clone()),
            conflicts: Mutex::new(ConflictResolver::new(config.conflict.clone())),
            resources: OptimisticLockManager::default(),
            shutdown: CancellationToken::new(),
            settled: Notify::new(),
            background: Mutex::new(Vec::new()),
            config,
        };
        info!(
            swarm_id = %inner.swarm_id,
            name = %inner.config.name,
            strategy = inner.config.scheduling.strategy.as_str(),
            "Swarm coordinator created"
        );
        Ok(SwarmCoordinator {
            inner: Arc::new(inner),
        })
    }
}

pub(crate) struct Inner {
    swarm_id: SwarmId,
    config: SwarmConfig,
    executor: Arc<dyn TaskExecutor>,
    persistence: Option<Arc<dyn StatePersistence>>,
    event_bus: EventBus,
    state: Mutex<CoordinatorState>,
    breakers: CircuitBreakerManager,
    scheduler: AdvancedTaskScheduler,
    affinity: AffinityIndex,
    work_stealer: WorkStealingCoordinator,
    conflicts: Mutex<ConflictResolver>,
    resources: OptimisticLockManager,
    /// Stops background loops and pending retry timers.
    shutdown: CancellationToken,
    /// Notified whenever an attempt settles.
    settled: Notify,
    background: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct SwarmCoordinator {
    inner: Arc<Inner>,
}

/// Everything a spawned attempt needs, cloned out of the state lock.
struct Dispatch {
    task: TaskDefinition,
    agent: AgentState,
    attempt: u32,
    cancel: CancellationToken,
    timeout: Duration,
}

impl SwarmCoordinator {
    pub fn new(config: SwarmConfig, executor: Arc<dyn TaskExecutor>) -> SwarmResult<Self> {
        SwarmCoordinatorBuilder::new(config)
            .with_executor(executor)
            .build()
    }

    pub fn builder(config: SwarmConfig) -> SwarmCoordinatorBuilder {
        SwarmCoordinatorBuilder::new(config)
    }

    pub fn swarm_id(&self) -> SwarmId {
        self.inner.swarm_id
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.inner.config
    }

    pub fn status(&self) -> SwarmStatus {
        self.inner.state.lock().status
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.event_bus
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.inner.event_bus.subscribe()
    }

    pub fn subscribe_task(&self, task_id: TaskId) -> TaskEventReceiver {
        self.inner.event_bus.subscribe_task(task_id)
    }

    pub fn event_history(&self) -> Vec<SwarmEvent> {
        self.inner.event_bus.history()
    }

    pub fn events_of(&self, event_type: SwarmEventType) -> Vec<SwarmEvent> {
        self.inner.event_bus.history_of(event_type)
    }

    pub fn breaker_metrics(&self) -> Vec<CircuitBreakerMetrics> {
        self.inner.breakers.metrics()
    }

    pub fn circuit_breakers(&self) -> &CircuitBreakerManager {
        &self.inner.breakers
    }

    pub fn work_stealing_stats(&self) -> WorkStealingStats {
        self.inner.work_stealer.stats()
    }

    // ========================================================================
    // Lock discipline
    // ========================================================================

    /// Run `f` under the state lock, then publish whatever it emitted.
    fn with_state<R>(&self, f: impl FnOnce(&Inner, &mut CoordinatorState) -> R) -> R {
        let (result, events) = {
            let mut state = self.inner.state.lock();
            let result = f(&self.inner, &mut state);
            (result, std::mem::take(&mut state.outbox))
        };
        self.inner.event_bus.publish_all(events);
        result
    }

    /// Start whatever the scheduler can place right now.
    pub fn schedule_pending(&self) {
        let dispatches = self.with_state(|inner, state| inner.plan_dispatches(state));
        self.dispatch_all(dispatches);
    }

    fn dispatch_all(&self, dispatches: Vec<Dispatch>) {
        for dispatch in dispatches {
            self.launch(dispatch);
        }
    }

    fn launch(&self, dispatch: Dispatch) {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let Dispatch {
                task,
                agent,
                attempt,
                cancel,
                timeout,
            } = dispatch;
            let executor = Arc::clone(&coordinator.inner.executor);
            let started = Instant::now();

            let outcome = tokio::select! {
                _ = cancel.cancelled() => Err(TaskExecutionError::cancelled("attempt cancelled")),
                result = tokio::time::timeout(timeout, executor.execute(&task, &agent, cancel.clone())) => {
                    match result {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            cancel.cancel();
                            Err(TaskExecutionError::timeout(timeout))
                        }
                    }
                }
            };

            coordinator
                .settle(task.id, attempt, outcome, started.elapsed())
                .await;
        });
    }

    /// Apply an attempt's outcome. Outcomes of attempts that were already
    /// torn down (cancelled, reclaimed, agent removed) are ignored.
    async fn settle(
        &self,
        task_id: TaskId,
        attempt: u32,
        outcome: Result<TaskResult, TaskExecutionError>,
        elapsed: Duration,
    ) {
        let (dispatches, retry, interrupted) = self.with_state(|inner, state| {
            let current = state
                .running
                .get(&task_id)
                .is_some_and(|running| running.attempt == attempt);
            if !current {
                debug!(task_id = %task_id, attempt, "Ignoring outcome of a superseded attempt");
                return (Vec::new(), None, Vec::new());
            }
            let Some(running) = state.running.remove(&task_id) else {
                return (Vec::new(), None, Vec::new());
            };

            let (retry, interrupted) = match outcome {
                Ok(result) => {
                    inner.complete(state, &task_id, &running.agent_id, result, elapsed);
                    (None, Vec::new())
                }
                Err(error) => inner.fail(state, &task_id, &running.agent_id, error),
            };
            (inner.plan_dispatches(state), retry, interrupted)
        });

        self.inner.settled.notify_waiters();
        if let Some(delay) = retry {
            self.schedule_retry(task_id, delay);
        }
        self.interrupt(interrupted).await;
        self.dispatch_all(dispatches);
    }

    fn schedule_retry(&self, task_id: TaskId, delay: Duration) {
        let coordinator = self.clone();
        let shutdown = self.inner.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    debug!(task_id = %task_id, "Retry backoff elapsed");
                    coordinator.schedule_pending();
                }
            }
        });
    }

    /// Signal torn-down attempts: fire their token, then tell the executor.
    async fn interrupt(&self, attempts: Vec<RunningAttempt>) {
        for attempt in attempts {
            attempt.cancel.cancel();
            if let Err(err) = self.inner.executor.cancel(&attempt.task_id).await {
                warn!(task_id = %attempt.task_id, error = %err, "Executor failed to cancel task");
            }
        }
        self.inner.settled.notify_waiters();
    }
}

// ============================================================================
// Attempt bookkeeping (runs under the state lock)
// ============================================================================

fn circuit_event(state: &mut CoordinatorState, key: &str, transition: CircuitTransition) {
    let key = key.to_string();
    let payload = match transition {
        CircuitTransition::Opened {
            consecutive_failures,
        } => SwarmEventPayload::CircuitOpened {
            key,
            consecutive_failures,
        },
        CircuitTransition::HalfOpened => SwarmEventPayload::CircuitHalfOpened { key },
        CircuitTransition::Closed => SwarmEventPayload::CircuitClosed { key },
    };
    state.emit(payload);
}

impl Inner {
    fn scheduling_context(&self) -> SchedulingContext<'_> {
        SchedulingContext {
            affinity: &self.affinity,
        }
    }

    fn plan_dispatches(&self, state: &mut CoordinatorState) -> Vec<Dispatch> {
        if !state.is_dispatching() {
            return Vec::new();
        }
        let ready_ids = state.ready_pending(Instant::now());
        if ready_ids.is_empty() {
            return Vec::new();
        }

        let plan = {
            let ready: Vec<&TaskDefinition> =
                ready_ids.iter().filter_map(|id| state.tasks.get(id)).collect();
            let agents = state.agents_by_sequence();
            self.scheduler.plan(
                &ready,
                &agents,
                state.running.len(),
                &self.scheduling_context(),
                &self.breakers,
            )
        };

        plan.into_iter()
            .filter_map(|assignment| {
                match self.start_attempt(state, assignment.task_id, assignment.agent_id) {
                    Ok(dispatch) => Some(dispatch),
                    Err(err) => {
                        debug!(
                            task_id = %assignment.task_id,
                            agent_id = %assignment.agent_id,
                            error = %err,
                            "Planned assignment skipped"
                        );
                        None
                    }
                }
            })
            .collect()
    }

    /// Assign a pending task to an available agent and open a new attempt.
    fn start_attempt(
        &self,
        state: &mut CoordinatorState,
        task_id: TaskId,
        agent_id: AgentId,
    ) -> SwarmResult<Dispatch> {
        let task = state.task(&task_id)?;
        if !task.is_pending() {
            return Err(SwarmError::InvalidState(format!(
                "task {task_id} is {}",
                task.status()
            )));
        }
        let agent = state.agent(&agent_id)?;
        if !agent.is_available() {
            return Err(SwarmError::InvalidState(format!(
                "agent {agent_id} is {}",
                agent.status
            )));
        }
        let key = breaker_key(&agent_id);
        if let Some(transition) = self.breakers.try_acquire(&key)? {
            circuit_event(state, &key, transition);
        }

        state.unreserve(&task_id);
        state.transition_task(&task_id, TaskStatus::Assigned, "agent selected", EVENT_SOURCE)?;
        state.retry_at.remove(&task_id);
        state.task_mut(&task_id)?.assigned_to = Some(agent_id);
        {
            let agent = state.agent_mut(&agent_id)?;
            agent.current_task = Some(task_id);
            agent.task_history.push(task_id);
            agent.recompute_workload();
        }
        state.set_agent_status(&agent_id, AgentStatus::Busy)?;
        state.emit(SwarmEventPayload::TaskAssigned { task_id, agent_id });

        let attempt = {
            let task = state.task_mut(&task_id)?;
            let number = task.attempt_count() + 1;
            task.attempts.push(TaskAttempt {
                attempt_number: number,
                agent_id,
                started_at: chrono::Utc::now(),
                ended_at: None,
                status: AttemptStatus::Running,
                result: None,
                error: None,
            });
            number
        };
        state.transition_task(
            &task_id,
            TaskStatus::Running,
            format!("attempt {attempt} started"),
            agent_id.to_string(),
        )?;
        state.emit(SwarmEventPayload::TaskStarted {
            task_id,
            agent_id,
            attempt,
        });

        let cancel = CancellationToken::new();
        state.running.insert(
            task_id,
            RunningAttempt {
                task_id,
                agent_id,
                attempt,
                cancel: cancel.clone(),
            },
        );
        metrics::counter!("hivemind_task_attempts_total").increment(1);

        let task = state.task(&task_id)?.clone();
        let agent = state.agent(&agent_id)?.clone();
        let timeout = task
            .constraints
            .timeout
            .unwrap_or(self.config.performance.default_timeout);
        info!(
            task_id = %task_id,
            agent_id = %agent_id,
            attempt,
            timeout_ms = timeout.as_millis() as u64,
            "Task attempt started"
        );
        Ok(Dispatch {
            task,
            agent,
            attempt,
            cancel,
            timeout,
        })
    }

    fn complete(
        &self,
        state: &mut CoordinatorState,
        task_id: &TaskId,
        agent_id: &AgentId,
        result: TaskResult,
        elapsed: Duration,
    ) {
        let elapsed_ms = elapsed.as_millis() as u64;
        if let Err(err) = state.transition_task(
            task_id,
            TaskStatus::Completed,
            "execution succeeded",
            agent_id.to_string(),
        ) {
            warn!(task_id = %task_id, error = %err, "Cannot complete task");
            return;
        }

        let now = chrono::Utc::now();
        let quality = result.quality;
        let (objective_id, task_type) = match state.tasks.get_mut(task_id) {
            Some(task) => {
                if let Some(attempt) = task.current_attempt_mut() {
                    attempt.status = AttemptStatus::Completed;
                    attempt.ended_at = Some(now);
                    attempt.result = Some(result.clone());
                }
                task.result = Some(result);
                (task.objective_id, task.task_type.clone())
            }
            None => return,
        };

        if let Some(agent) = state.agents.get_mut(agent_id) {
            agent.metrics.record_success(elapsed_ms);
        }
        state.release_agent(agent_id, task_id);
        self.affinity.record(objective_id, task_type, *agent_id);

        let key = breaker_key(agent_id);
        if let Some(transition) = self.breakers.record_success(&key) {
            circuit_event(state, &key, transition);
        }

        state.counters.tasks_completed += 1;
        state.counters.total_execution_time_ms += elapsed_ms;
        metrics::counter!("hivemind_tasks_completed_total").increment(1);
        metrics::histogram!("hivemind_task_duration_seconds").record(elapsed.as_secs_f64());

        state.emit(SwarmEventPayload::TaskCompleted {
            task_id: *task_id,
            agent_id: *agent_id,
            quality,
            execution_time_ms: elapsed_ms,
        });
        info!(
            task_id = %task_id,
            agent_id = %agent_id,
            quality,
            execution_time_ms = elapsed_ms,
            "Task completed"
        );

        let threshold = objective_id
            .and_then(|id| state.objectives.get(&id))
            .map(|objective| objective.requirements.quality_threshold)
            .unwrap_or(self.config.quality_threshold);
        if quality < threshold {
            warn!(task_id = %task_id, quality, threshold, "Task result below quality threshold");
            state.emit(SwarmEventPayload::TaskQualityWarning {
                task_id: *task_id,
                quality,
                threshold,
            });
        }

        if let Some(objective_id) = objective_id {
            state.refresh_objective(&objective_id);
        }
    }

    /// Take a running task away from an agent that can no longer run it. The
    /// attempt ends `cancelled` without touching the retry budget and the task
    /// goes back to `retrying` with no backoff, so the caller's next dispatch
    /// plan can hand it to another agent.
    fn reclaim(
        &self,
        state: &mut CoordinatorState,
        task_id: &TaskId,
        agent_id: &AgentId,
        reason: &str,
    ) {
        let now = chrono::Utc::now();
        if let Err(err) =
            state.transition_task(task_id, TaskStatus::Retrying, reason, agent_id.to_string())
        {
            warn!(task_id = %task_id, error = %err, "Cannot reclaim task");
            return;
        }
        let (attempt, objective_id) = match state.tasks.get_mut(task_id) {
            Some(task) => {
                if let Some(attempt) = task.current_attempt_mut() {
                    attempt.status = AttemptStatus::Cancelled;
                    attempt.ended_at = Some(now);
                    attempt.error = Some(TaskError {
                        kind: ExecutionErrorKind::AgentUnavailable.to_string(),
                        message: reason.to_string(),
                        retryable: true,
                        timestamp: now,
                    });
                }
                task.assigned_to = None;
                task.retry_after = Some(now);
                (task.attempt_count(), task.objective_id)
            }
            None => return,
        };

        state.release_agent(agent_id, task_id);
        state.retry_at.remove(task_id);
        self.breakers.abandon_trial(&breaker_key(agent_id));
        metrics::counter!("hivemind_tasks_reclaimed_total").increment(1);
        state.emit(SwarmEventPayload::TaskRetried {
            task_id: *task_id,
            attempt,
            delay_ms: 0,
            retry_after: now,
        });
        warn!(task_id = %task_id, agent_id = %agent_id, attempt, reason, "Task reclaimed for reassignment");
        if let Some(objective_id) = objective_id {
            state.refresh_objective(&objective_id);
        }
    }

    /// Settle a failed attempt: retry with backoff while the budget allows,
    /// otherwise fail the task and apply the failure policy to its
    /// dependents. Returns the retry delay and any attempts the cascade tore
    /// down.
    fn fail(
        &self,
        state: &mut CoordinatorState,
        task_id: &TaskId,
        agent_id: &AgentId,
        error: TaskExecutionError,
    ) -> (Option<Duration>, Vec<RunningAttempt>) {
        let now = chrono::Utc::now();
        let task_error = TaskError {
            kind: error.kind.to_string(),
            message: error.message.clone(),
            retryable: error.retryable,
            timestamp: now,
        };

        let (attempts, max_retries, objective_id) = match state.tasks.get_mut(task_id) {
            Some(task) => {
                if let Some(attempt) = task.current_attempt_mut() {
                    attempt.status = if error.kind == ExecutionErrorKind::Cancelled {
                        AttemptStatus::Cancelled
                    } else {
                        AttemptStatus::Failed
                    };
                    attempt.ended_at = Some(now);
                    attempt.error = Some(task_error.clone());
                }
                let budget = task
                    .constraints
                    .max_retries
                    .unwrap_or(self.config.scheduling.default_max_retries);
                (task.charged_attempt_count(), budget, task.objective_id)
            }
            None => return (None, Vec::new()),
        };

        if let Some(agent) = state.agents.get_mut(agent_id) {
            agent.metrics.record_failure();
            agent.record_error(error.kind.to_string(), error.message.clone(), Some(*task_id));
        }
        state.release_agent(agent_id, task_id);
        if !error.recoverable {
            let unfit = state
                .agents
                .get(agent_id)
                .is_some_and(|agent| agent.status == AgentStatus::Idle);
            if unfit && state.set_agent_status(agent_id, AgentStatus::Error).is_ok() {
                if let Some(agent) = state.agents.get_mut(agent_id) {
                    agent.health = 0.0;
                }
            }
        }

        let key = breaker_key(agent_id);
        if error.kind == ExecutionErrorKind::Cancelled {
            self.breakers.abandon_trial(&key);
        } else if let Some(transition) = self.breakers.record_failure(&key) {
            circuit_event(state, &key, transition);
        }

        if error.retryable && attempts < max_retries {
            if let Err(err) =
                state.transition_task(task_id, TaskStatus::Retrying, error.to_string(), agent_id.to_string())
            {
                warn!(task_id = %task_id, error = %err, "Cannot retry task");
                return (None, Vec::new());
            }
            let delay = retry_delay(attempts);
            let delay_ms = delay.as_millis() as u64;
            let retry_after = now + chrono::Duration::milliseconds(delay_ms as i64);
            if let Some(task) = state.tasks.get_mut(task_id) {
                task.retry_after = Some(retry_after);
                task.assigned_to = None;
                task.error = Some(task_error);
            }
            state.retry_at.insert(*task_id, Instant::now() + delay);
            metrics::counter!("hivemind_task_retries_total").increment(1);
            state.emit(SwarmEventPayload::TaskRetried {
                task_id: *task_id,
                attempt: attempts,
                delay_ms,
                retry_after,
            });
            warn!(
                task_id = %task_id,
                agent_id = %agent_id,
                attempt = attempts,
                max_retries,
                delay_ms,
                error = %error,
                "Task attempt failed, retrying after backoff"
            );
            if let Some(objective_id) = objective_id {
                state.refresh_objective(&objective_id);
            }
            return (Some(delay), Vec::new());
        }

        if let Err(err) =
            state.transition_task(task_id, TaskStatus::Failed, error.to_string(), agent_id.to_string())
        {
            warn!(task_id = %task_id, error = %err, "Cannot fail task");
            return (None, Vec::new());
        }
        if let Some(task) = state.tasks.get_mut(task_id) {
            task.error = Some(task_error);
        }
        state.counters.tasks_failed += 1;
        metrics::counter!("hivemind_tasks_failed_total").increment(1);
        state.emit(SwarmEventPayload::TaskFailed {
            task_id: *task_id,
            agent_id: Some(*agent_id),
            error: error.to_string(),
        });
        warn!(
            task_id = %task_id,
            agent_id = %agent_id,
            attempts,
            error = %error,
            "Task failed permanently"
        );

        let interrupted = state.cascade_failure(task_id, self.config.scheduling.failure_policy);
        if let Some(objective_id) = objective_id {
            state.refresh_objective(&objective_id);
        }
        (None, interrupted)
    }
}
