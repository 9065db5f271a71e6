// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Background monitors
//!
//! Periodic passes that keep a running swarm healthy: the heartbeat scan, the
//! metrics pass, the health pass that reclaims work stuck on errored agents
//! and the work-stealing rebalancer.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Timer-driven maintenance of coordinator state
//!
//! Every pass is also a public method, so callers and tests can drive one
//! deterministically instead of waiting on the timers. The loops hold only a
//! weak reference to the coordinator and stop on the shutdown token.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

use hivemind_core::domain::agent::{AgentId, AgentStatus};
use hivemind_core::domain::events::{SwarmEvent, SwarmEventPayload};
use hivemind_core::domain::swarm::{SwarmMetrics, SwarmStatus};
use hivemind_core::domain::task::{TaskId, TaskStatus};

use super::state::{CoordinatorState, EVENT_SOURCE};
use super::{Inner, SwarmCoordinator};
use crate::application::scheduler::breaker_key;
use crate::application::strategy::is_capability_admissible;
use crate::application::work_stealing::AgentLoad;

impl SwarmCoordinator {
    /// Spawn the monitor loops. Called once by `initialize`.
    pub(super) fn start_monitors(&self) {
        let monitoring = &self.inner.config.monitoring;
        let mut handles = Vec::new();

        handles.push(self.spawn_loop("heartbeat monitor", monitoring.heartbeat_interval, |swarm| async move {
            let timed_out = swarm.check_heartbeats();
            if !timed_out.is_empty() {
                debug!(count = timed_out.len(), "Heartbeat scan marked agents as errored");
            }
        }));
        handles.push(self.spawn_loop("metrics collector", monitoring.metrics_interval, |swarm| async move {
            swarm.collect_metrics();
        }));
        handles.push(self.spawn_loop("health check", monitoring.health_check_interval, |swarm| async move {
            let reclaimed = swarm.run_health_check().await;
            if reclaimed > 0 {
                info!(reclaimed, "Health check reclaimed tasks from errored agents");
            }
        }));
        if self.inner.work_stealer.is_enabled() {
            handles.push(self.spawn_loop(
                "work stealer",
                self.inner.config.work_stealing.interval,
                |swarm| async move {
                    swarm.rebalance();
                },
            ));
        }

        self.inner.background.lock().extend(handles);
    }

    fn spawn_loop<F, Fut>(
        &self,
        name: &'static str,
        period: Duration,
        job: F,
    ) -> tokio::task::JoinHandle<()>
    where
        F: Fn(SwarmCoordinator) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let shutdown = self.inner.shutdown.clone();
        tokio::spawn(async move {
            info!(
                task = name,
                interval_ms = period.as_millis() as u64,
                "Starting swarm background task"
            );
            let mut tick = interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            tick.tick().await;

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let Some(inner) = weak.upgrade() else {
                            break;
                        };
                        job(SwarmCoordinator { inner }).await;
                    }
                    _ = shutdown.cancelled() => {
                        info!(task = name, "Shutdown signal received, stopping swarm background task");
                        break;
                    }
                }
            }

            info!(task = name, "Swarm background task stopped");
        })
    }

    // ========================================================================
    // Metrics
    // ========================================================================

    pub fn metrics(&self) -> SwarmMetrics {
        compute_metrics(&self.inner.state.lock(), Instant::now())
    }

    /// Publish swarm metrics as gauges and as a local `swarm.metrics` event.
    pub fn collect_metrics(&self) -> SwarmMetrics {
        let metrics = self.metrics();

        metrics::gauge!("hivemind_agents_total").set(metrics.total_agents as f64);
        metrics::gauge!("hivemind_agents_active").set(metrics.active_agents as f64);
        metrics::gauge!("hivemind_agents_idle").set(metrics.idle_agents as f64);
        metrics::gauge!("hivemind_agents_errored").set(metrics.errored_agents as f64);
        metrics::gauge!("hivemind_tasks_pending").set(metrics.pending_tasks as f64);
        metrics::gauge!("hivemind_tasks_running").set(metrics.running_tasks as f64);
        metrics::gauge!("hivemind_throughput_per_minute").set(metrics.throughput_per_minute);
        metrics::gauge!("hivemind_success_rate").set(metrics.success_rate);
        metrics::gauge!("hivemind_agent_utilization").set(metrics.agent_utilization);

        self.inner.event_bus.publish(SwarmEvent::local(
            EVENT_SOURCE,
            SwarmEventPayload::SwarmMetrics {
                swarm_id: self.inner.swarm_id,
                metrics: metrics.clone(),
            },
        ));
        debug!(
            running = metrics.running_tasks,
            pending = metrics.pending_tasks,
            success_rate = metrics.success_rate,
            "Swarm metrics collected"
        );
        metrics
    }

    // ========================================================================
    // Health
    // ========================================================================

    pub async fn run_health_check(&self) -> usize {
        self.run_health_check_at(Instant::now()).await
    }

    /// Reclaim running tasks held by errored agents so other agents can take
    /// them, release their backlogs, and fail the swarm once it has run longer
    /// than `max_duration`. Returns the number of reclaimed tasks.
    pub async fn run_health_check_at(&self, now: Instant) -> usize {
        let (reclaimed, dispatches, interrupted, expired) = self.with_state(|inner, state| {
            let mut interrupted = Vec::new();

            let mut stuck: Vec<(TaskId, AgentId)> = state
                .running
                .values()
                .filter(|running| {
                    state
                        .agents
                        .get(&running.agent_id)
                        .map_or(true, |agent| agent.status == AgentStatus::Error)
                })
                .map(|running| (running.task_id, running.agent_id))
                .collect();
            stuck.sort();

            for (task_id, agent_id) in &stuck {
                let Some(running) = state.running.remove(task_id) else {
                    continue;
                };
                let reason = format!("agent {agent_id} is in error");
                inner.reclaim(state, task_id, agent_id, &reason);
                interrupted.push(running);
            }

            let errored_backlogs: Vec<TaskId> = state
                .agents
                .values()
                .filter(|agent| agent.status == AgentStatus::Error)
                .flat_map(|agent| agent.queued_tasks.iter().copied())
                .collect();
            for task_id in errored_backlogs {
                state.unreserve(&task_id);
            }

            let expired = matches!(state.status, SwarmStatus::Executing | SwarmStatus::Paused)
                && state
                    .executing_since
                    .is_some_and(|since| now.saturating_duration_since(since) > inner.config.max_duration);
            if expired {
                let reason = format!(
                    "swarm exceeded its maximum duration of {}s",
                    inner.config.max_duration.as_secs()
                );
                interrupted.extend(inner.fail_swarm_locked(state, &reason));
            }

            (stuck.len(), inner.plan_dispatches(state), interrupted, expired)
        });

        self.interrupt(interrupted).await;
        self.dispatch_all(dispatches);
        if expired {
            self.inner.shutdown.cancel();
        }
        reclaimed
    }

    // ========================================================================
    // Work stealing
    // ========================================================================

    /// One work-stealing cycle. Returns the number of tasks moved.
    pub fn rebalance(&self) -> usize {
        if !self.inner.work_stealer.is_enabled() {
            return 0;
        }
        let (applied, dispatches) = self.with_state(|inner, state| {
            if !state.is_dispatching() {
                return (0, Vec::new());
            }
            let applied = apply_steals(inner, state);
            (applied, inner.plan_dispatches(state))
        });
        if applied > 0 {
            info!(moved = applied, "Work stealing rebalanced backlog");
        }
        self.dispatch_all(dispatches);
        applied
    }
}

fn apply_steals(inner: &Inner, state: &mut CoordinatorState) -> usize {
    let plans = {
        let loads: Vec<AgentLoad> = state
            .agents_by_sequence()
            .into_iter()
            .map(|agent| {
                AgentLoad::from_agent(agent, |task_id| {
                    state.tasks.get(task_id).is_some_and(|task| {
                        task.status() == TaskStatus::Queued && task.assigned_to == Some(agent.id)
                    })
                })
            })
            .collect();
        inner.work_stealer.plan(&loads, |thief, task_id| {
            let (Some(agent), Some(task)) = (state.agents.get(&thief), state.tasks.get(&task_id))
            else {
                return false;
            };
            is_capability_admissible(agent, task) && inner.breakers.is_call_permitted(&breaker_key(&thief))
        })
    };

    let mut applied = 0;
    for plan in plans {
        let still_reserved = state.tasks.get(&plan.task_id).is_some_and(|task| {
            task.status() == TaskStatus::Queued && task.assigned_to == Some(plan.from)
        });
        let thief_free = state
            .agents
            .get(&plan.to)
            .is_some_and(|agent| agent.is_available() && agent.queued_tasks.is_empty());
        if !still_reserved || !thief_free {
            debug!(task_id = %plan.task_id, "Steal skipped, task or thief changed");
            continue;
        }

        if let Err(err) = state.reserve(&plan.task_id, &plan.to) {
            debug!(task_id = %plan.task_id, error = %err, "Steal skipped, thief refused the task");
            continue;
        }
        state.emit(SwarmEventPayload::TaskReassigned {
            task_id: plan.task_id,
            from: plan.from,
            to: plan.to,
        });
        metrics::counter!("hivemind_work_steals_total").increment(1);
        applied += 1;
    }
    inner.work_stealer.record_applied(applied);
    applied
}

fn compute_metrics(state: &CoordinatorState, now: Instant) -> SwarmMetrics {
    let live: Vec<_> = state
        .agents
        .values()
        .filter(|agent| !agent.status.is_terminal())
        .collect();
    let count = |status: AgentStatus| live.iter().filter(|agent| agent.status == status).count();

    let pending_tasks = state
        .tasks
        .values()
        .filter(|task| {
            matches!(
                task.status(),
                TaskStatus::Created | TaskStatus::Queued | TaskStatus::Retrying
            )
        })
        .count();
    let counters = state.counters;
    let uptime = state
        .executing_since
        .map(|since| now.saturating_duration_since(since))
        .unwrap_or_default();

    let settled = counters.tasks_completed + counters.tasks_failed;
    let minutes = uptime.as_secs_f64() / 60.0;
    SwarmMetrics {
        total_agents: live.len(),
        active_agents: count(AgentStatus::Busy),
        idle_agents: count(AgentStatus::Idle),
        errored_agents: count(AgentStatus::Error),
        total_tasks: state.tasks.len(),
        pending_tasks,
        running_tasks: state.running.len(),
        completed_tasks: counters.tasks_completed,
        failed_tasks: counters.tasks_failed,
        cancelled_tasks: counters.tasks_cancelled,
        throughput_per_minute: if minutes > 0.0 {
            counters.tasks_completed as f64 / minutes
        } else {
            0.0
        },
        success_rate: if settled > 0 {
            counters.tasks_completed as f64 / settled as f64
        } else {
            1.0
        },
        average_execution_time_ms: if counters.tasks_completed > 0 {
            counters.total_execution_time_ms as f64 / counters.tasks_completed as f64
        } else {
            0.0
        },
        agent_utilization: if live.is_empty() {
            0.0
        } else {
            live.iter().map(|agent| agent.workload).sum::<f64>() / live.len() as f64
        },
        uptime_ms: uptime.as_millis() as u64,
    }
}
