// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Agent registry - registration, removal, heartbeats and the heartbeat
// timeout scan.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use hivemind_core::domain::agent::{
    AgentCapabilities, AgentId, AgentState, AgentStatus, AgentType, ResourceUsage,
};
use hivemind_core::domain::config::ResourceLimits;
use hivemind_core::domain::events::SwarmEventPayload;

use super::state::EVENT_SOURCE;
use super::SwarmCoordinator;
use crate::application::scheduler::breaker_key;
use crate::domain::error::{SwarmError, SwarmResult};

/// Missed intervals before an agent is considered dead.
pub const HEARTBEAT_TIMEOUT_MULTIPLIER: u32 = 3;

/// Registration request. Capabilities default to the agent type's profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub agent_type: AgentType,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub capabilities: Option<AgentCapabilities>,
}

impl AgentSpec {
    pub fn new(agent_type: AgentType) -> Self {
        Self {
            agent_type,
            name: None,
            capabilities: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_capabilities(mut self, capabilities: AgentCapabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }
}

/// Health implied by a usage report: 1.0 within limits, otherwise the worst
/// limit/usage ratio.
fn health_for(usage: &ResourceUsage, limits: &ResourceLimits) -> f64 {
    let ratio = |limit: f64, used: f64| if used > limit && used > 0.0 { limit / used } else { 1.0 };
    ratio(limits.memory_mb, usage.memory_mb)
        .min(ratio(limits.cpu_cores, usage.cpu_cores))
        .min(ratio(limits.disk_mb, usage.disk_mb))
        .clamp(0.0, 1.0)
}

impl SwarmCoordinator {
    pub fn register_agent(&self, spec: AgentSpec) -> SwarmResult<AgentId> {
        let agent_id = self.with_state(|inner, state| {
            if state.status.is_terminal() || state.draining {
                return Err(SwarmError::InvalidState(format!(
                    "cannot register agents while the swarm is {}",
                    state.status
                )));
            }
            if state.live_agent_count() >= inner.config.max_agents {
                return Err(SwarmError::AgentLimitReached {
                    max: inner.config.max_agents,
                });
            }

            let instance = {
                let counter = state.agent_instances.entry(spec.agent_type).or_insert(0);
                *counter += 1;
                *counter
            };
            let sequence = state.next_agent_sequence;
            state.next_agent_sequence += 1;

            let agent_id = AgentId::new(spec.agent_type, instance);
            let name = spec.name.clone().unwrap_or_else(|| agent_id.to_string());
            let capabilities = spec
                .capabilities
                .clone()
                .unwrap_or_else(|| AgentCapabilities::for_type(spec.agent_type));
            let mut agent = AgentState::new(agent_id, name.clone(), capabilities, sequence);
            agent.transition_to(AgentStatus::Idle)?;
            state.agents.insert(agent_id, agent);
            state.heartbeats.insert(agent_id, Instant::now());

            state.emit(SwarmEventPayload::AgentCreated {
                agent_id,
                name,
                agent_type: spec.agent_type,
            });
            state.emit(SwarmEventPayload::AgentStarted { agent_id });
            metrics::counter!("hivemind_agents_registered_total").increment(1);
            Ok(agent_id)
        })?;

        info!(agent_id = %agent_id, agent_type = %spec.agent_type, "Agent registered");
        self.schedule_pending();
        Ok(agent_id)
    }

    /// Stop and remove an agent. A running task is cancelled without being
    /// charged against its retry budget and is handed to another agent;
    /// backlog reservations go back to the shared queue.
    pub async fn unregister_agent(&self, agent_id: AgentId) -> SwarmResult<()> {
        let (dispatches, interrupted) = self.with_state(|inner, state| {
            let status = state.agent(&agent_id)?.status;
            if status != AgentStatus::Terminating {
                state.set_agent_status(&agent_id, AgentStatus::Terminating)?;
            }

            let mut interrupted = Vec::new();
            let current = state
                .running
                .iter()
                .find(|(_, running)| running.agent_id == agent_id)
                .map(|(task_id, _)| *task_id);
            if let Some(task_id) = current {
                if let Some(running) = state.running.remove(&task_id) {
                    let reason = format!("agent {agent_id} was unregistered");
                    inner.reclaim(state, &task_id, &agent_id, &reason);
                    interrupted.push(running);
                }
            }

            let backlog = state
                .agent(&agent_id)
                .map(|agent| agent.queued_tasks.clone())
                .unwrap_or_default();
            for task_id in backlog {
                state.unreserve(&task_id);
            }

            state.set_agent_status(&agent_id, AgentStatus::Terminated)?;
            state.agents.remove(&agent_id);
            state.heartbeats.remove(&agent_id);
            inner.breakers.remove(&breaker_key(&agent_id));
            inner.conflicts.lock().forget_agent(agent_id);
            inner.affinity.forget_agent(agent_id);
            state.emit(SwarmEventPayload::AgentRemoved { agent_id });
            metrics::counter!("hivemind_agents_removed_total").increment(1);

            Ok::<_, SwarmError>((inner.plan_dispatches(state), interrupted))
        })?;

        info!(agent_id = %agent_id, "Agent unregistered");
        self.interrupt(interrupted).await;
        self.dispatch_all(dispatches);
        Ok(())
    }

    /// Record a liveness signal, optionally with a resource usage report.
    pub fn heartbeat(&self, agent_id: AgentId, usage: Option<ResourceUsage>) -> SwarmResult<()> {
        let recovered = self.with_state(|inner, state| {
            let now = Instant::now();
            let agent = state.agent_mut(&agent_id)?;
            if matches!(agent.status, AgentStatus::Terminating | AgentStatus::Terminated) {
                debug!(agent_id = %agent_id, "Ignoring heartbeat from a stopping agent");
                return Ok(false);
            }

            agent.last_heartbeat = chrono::Utc::now();
            agent.metrics.last_activity = agent.last_heartbeat;
            let mut health = 1.0;
            if let Some(usage) = usage {
                health = health_for(&usage, &inner.config.resource_limits);
                if health < 1.0 {
                    warn!(
                        agent_id = %agent_id,
                        memory_mb = usage.memory_mb,
                        cpu_cores = usage.cpu_cores,
                        disk_mb = usage.disk_mb,
                        health,
                        "Agent exceeds resource limits"
                    );
                }
                agent.metrics.resource_usage = usage;
            }

            let recovering = agent.status == AgentStatus::Error && agent.current_task.is_none();
            if agent.status != AgentStatus::Error || recovering {
                agent.health = health;
            }
            state.heartbeats.insert(agent_id, now);

            if recovering {
                state.set_agent_status(&agent_id, AgentStatus::Idle)?;
                info!(agent_id = %agent_id, "Agent recovered after heartbeat");
            }
            Ok::<_, SwarmError>(recovering)
        })?;

        if recovered {
            self.schedule_pending();
        }
        Ok(())
    }

    /// Heartbeat scan at the current instant.
    pub fn check_heartbeats(&self) -> Vec<AgentId> {
        self.check_heartbeats_at(Instant::now())
    }

    /// Force every supervised agent that has been silent for longer than
    /// three heartbeat intervals into `error`. Running tasks are left alone;
    /// the health pass reclaims them.
    pub fn check_heartbeats_at(&self, now: Instant) -> Vec<AgentId> {
        let limit: Duration = self.inner.config.monitoring.heartbeat_interval * HEARTBEAT_TIMEOUT_MULTIPLIER;
        self.with_state(|_, state| {
            let mut candidates: Vec<(u64, AgentId)> = state
                .agents
                .values()
                .filter(|agent| agent.status.is_supervised() && agent.status != AgentStatus::Error)
                .filter(|agent| {
                    state
                        .heartbeats
                        .get(&agent.id)
                        .is_some_and(|last| now.saturating_duration_since(*last) > limit)
                })
                .map(|agent| (agent.sequence, agent.id))
                .collect();
            candidates.sort();

            let mut timed_out = Vec::new();
            for (_, agent_id) in candidates {
                if let Err(err) = state.set_agent_status(&agent_id, AgentStatus::Error) {
                    warn!(agent_id = %agent_id, error = %err, "Cannot mark agent as errored");
                    continue;
                }
                let Some(agent) = state.agents.get_mut(&agent_id) else {
                    continue;
                };
                agent.health = 0.0;
                agent.record_error(
                    "heartbeat_timeout",
                    format!("no heartbeat for more than {}ms", limit.as_millis()),
                    agent.current_task,
                );
                let last_heartbeat = agent.last_heartbeat;
                let current_task = agent.current_task;
                state.emit(SwarmEventPayload::AgentHeartbeatTimeout {
                    agent_id,
                    last_heartbeat,
                    current_task,
                });
                warn!(
                    agent_id = %agent_id,
                    source = EVENT_SOURCE,
                    current_task = ?current_task,
                    "Agent missed its heartbeat deadline"
                );
                timed_out.push(agent_id);
            }
            timed_out
        })
    }

    pub fn get_agent(&self, agent_id: &AgentId) -> Option<AgentState> {
        self.inner.state.lock().agents.get(agent_id).cloned()
    }

    /// Agents in registration order.
    pub fn list_agents(&self) -> Vec<AgentState> {
        self.inner
            .state
            .lock()
            .agents_by_sequence()
            .into_iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_within_limits() {
        let limits = ResourceLimits::default();
        let usage = ResourceUsage {
            memory_mb: 100.0,
            cpu_cores: 1.0,
            disk_mb: 10.0,
        };
        assert_eq!(health_for(&usage, &limits), 1.0);
    }

    #[test]
    fn test_health_drops_with_worst_overrun() {
        let limits = ResourceLimits {
            memory_mb: 1000.0,
            cpu_cores: 4.0,
            disk_mb: 1000.0,
        };
        let usage = ResourceUsage {
            memory_mb: 2000.0,
            cpu_cores: 8.0 / 0.75,
            disk_mb: 10.0,
        };
        let health = health_for(&usage, &limits);
        assert!((health - 0.375).abs() < 1e-9, "{health}");
    }
}
