// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Shared resources - claim arbitration between agents and versioned state
// guarded by optimistic locks.

use serde_json::Value;
use tracing::{debug, info};

use hivemind_core::domain::agent::{AgentId, AgentStatus};
use hivemind_core::domain::config::ConflictStrategy;
use hivemind_core::domain::events::SwarmEventPayload;
use hivemind_core::domain::task::{TaskId, TaskPriority};

use super::SwarmCoordinator;
use crate::domain::conflict::{Ballot, ConflictResolution, ResourceClaim, Versioned};
use crate::domain::error::{SwarmError, SwarmResult};

fn strategy_name(strategy: ConflictStrategy) -> &'static str {
    match strategy {
        ConflictStrategy::Priority => "priority",
        ConflictStrategy::Timestamp => "timestamp",
        ConflictStrategy::Voting => "voting",
    }
}

impl SwarmCoordinator {
    /// File a claim on `resource`. The claim inherits the priority of the task
    /// it is made for, or `normal` without one.
    pub fn claim_resource(
        &self,
        resource: &str,
        agent_id: AgentId,
        task_id: Option<TaskId>,
    ) -> SwarmResult<()> {
        let priority = {
            let state = self.inner.state.lock();
            state.agent(&agent_id)?;
            match task_id {
                Some(task_id) => state.task(&task_id)?.priority,
                None => TaskPriority::Normal,
            }
        };
        let mut claim = ResourceClaim::new(resource, agent_id, priority);
        if let Some(task_id) = task_id {
            claim = claim.for_task(task_id);
        }
        self.inner.conflicts.lock().claim(claim);
        debug!(resource, agent_id = %agent_id, priority = priority.as_str(), "Resource claimed");
        Ok(())
    }

    /// Resolve the pending claims on one resource. Under voting, ballots are
    /// counted from the configured arbiters, or from every live agent when
    /// none are configured.
    pub fn resolve_conflict(
        &self,
        resource: &str,
        ballots: &[Ballot],
    ) -> SwarmResult<ConflictResolution> {
        let arbiters = self.arbiters();
        let resolution = self
            .inner
            .conflicts
            .lock()
            .resolve(resource, ballots, &arbiters)?;

        self.with_state(|_, state| {
            state.emit(SwarmEventPayload::ConflictResolved {
                resource: resolution.resource.clone(),
                winner: resolution.winner.agent_id,
                strategy: strategy_name(resolution.strategy).to_string(),
                requeued: resolution.requeued.iter().map(|claim| claim.agent_id).collect(),
            });
        });
        metrics::counter!("hivemind_conflicts_resolved_total").increment(1);
        info!(
            resource,
            winner = %resolution.winner.agent_id,
            strategy = strategy_name(resolution.strategy),
            requeued = resolution.requeued.len(),
            "Resource conflict resolved"
        );
        Ok(resolution)
    }

    /// One resolution round over every contested resource. Resources that
    /// cannot be decided this round (no quorum) keep their claims.
    pub fn resolve_conflicts(&self, ballots: &[Ballot]) -> Vec<ConflictResolution> {
        let contested = self.inner.conflicts.lock().contested_resources();
        contested
            .into_iter()
            .filter_map(|resource| {
                match self.resolve_conflict(&resource, ballots) {
                    Ok(resolution) => Some(resolution),
                    Err(err) => {
                        debug!(resource = %resource, error = %err, "Conflict left pending");
                        None
                    }
                }
            })
            .collect()
    }

    /// Give up a held resource so the next round can award it.
    pub fn release_resource(&self, resource: &str, agent_id: AgentId) -> bool {
        self.inner.conflicts.lock().release(resource, agent_id)
    }

    pub fn resource_holder(&self, resource: &str) -> Option<ResourceClaim> {
        self.inner.conflicts.lock().holder(resource).cloned()
    }

    pub fn read_resource(&self, resource: &str) -> Option<Versioned<Value>> {
        self.inner.resources.read(resource)
    }

    /// Compare-and-set write; `expected_version` is the version the caller
    /// read (0 to create).
    pub fn write_resource(
        &self,
        resource: &str,
        value: Value,
        expected_version: u64,
        updated_by: &str,
    ) -> SwarmResult<u64> {
        Ok(self
            .inner
            .resources
            .write(resource, value, expected_version, updated_by)?)
    }

    /// Bounded read-modify-write retry loop over a shared resource.
    pub fn update_resource<F>(
        &self,
        resource: &str,
        updated_by: &str,
        update: F,
    ) -> SwarmResult<Versioned<Value>>
    where
        F: FnMut(Option<&Value>) -> Value,
    {
        self.inner
            .resources
            .update_with(resource, updated_by, update)
            .map_err(SwarmError::from)
    }

    fn arbiters(&self) -> Vec<String> {
        let configured = &self.inner.config.conflict.arbiters;
        if !configured.is_empty() {
            return configured.clone();
        }
        self.inner
            .state
            .lock()
            .agents_by_sequence()
            .into_iter()
            .filter(|agent| !matches!(agent.status, AgentStatus::Terminating | AgentStatus::Terminated))
            .map(|agent| agent.name.clone())
            .collect()
    }
}
