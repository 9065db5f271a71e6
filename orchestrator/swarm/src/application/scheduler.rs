// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Task Scheduler
//!
//! Turns the set of ready tasks and the current agent pool into a list of
//! assignments for one scheduling pass.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Admissibility filtering, strategy dispatch and queue ordering
//!
//! [`TaskScheduler`] answers "which agent for this task?". The
//! [`AdvancedTaskScheduler`] answers "which tasks go out in this pass?": tasks
//! reserved in an agent's backlog are served by that agent first, the rest
//! are ordered by priority then creation order, each agent takes at most one
//! task, and the swarm-wide `max_concurrency` is never exceeded.

use parking_lot::RwLock;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use hivemind_core::domain::agent::{AgentId, AgentState, AgentStatus};
use hivemind_core::domain::config::SchedulingStrategyKind;
use hivemind_core::domain::objective::ObjectiveId;
use hivemind_core::domain::task::{TaskDefinition, TaskId};

use crate::application::strategy::{
    is_capability_admissible, strategy_for, SchedulingContext, SchedulingStrategy,
};
use crate::domain::circuit_breaker::CircuitBreakerManager;

/// Circuit breakers are keyed by the agent's display id (`developer-3`).
pub fn breaker_key(agent_id: &AgentId) -> String {
    agent_id.to_string()
}

pub struct TaskScheduler {
    kind: SchedulingStrategyKind,
    strategy: Box<dyn SchedulingStrategy>,
}

impl TaskScheduler {
    pub fn new(kind: SchedulingStrategyKind) -> Self {
        Self {
            kind,
            strategy: strategy_for(kind),
        }
    }

    pub fn kind(&self) -> SchedulingStrategyKind {
        self.kind
    }

    /// Agents that may take `task` right now: capability admissible and not
    /// isolated by an open circuit breaker.
    pub fn eligible<'a>(
        &self,
        agents: &[&'a AgentState],
        task: &TaskDefinition,
        breakers: &CircuitBreakerManager,
    ) -> Vec<&'a AgentState> {
        agents
            .iter()
            .copied()
            .filter(|agent| is_capability_admissible(agent, task))
            .filter(|agent| breakers.is_call_permitted(&breaker_key(&agent.id)))
            .collect()
    }

    pub fn select(
        &self,
        agents: &[&AgentState],
        task: &TaskDefinition,
        ctx: &SchedulingContext<'_>,
        breakers: &CircuitBreakerManager,
    ) -> Option<AgentId> {
        let eligible = self.eligible(agents, task, breakers);
        if eligible.is_empty() {
            return None;
        }
        self.strategy.select(&eligible, task, ctx)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedAssignment {
    pub task_id: TaskId,
    pub agent_id: AgentId,
}

pub struct AdvancedTaskScheduler {
    default: TaskScheduler,
    overrides: RwLock<HashMap<ObjectiveId, TaskScheduler>>,
    max_concurrency: usize,
}

impl AdvancedTaskScheduler {
    pub fn new(kind: SchedulingStrategyKind, max_concurrency: usize) -> Self {
        Self {
            default: TaskScheduler::new(kind),
            overrides: RwLock::new(HashMap::new()),
            max_concurrency,
        }
    }

    pub fn default_strategy(&self) -> SchedulingStrategyKind {
        self.default.kind()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn set_objective_strategy(&self, objective: ObjectiveId, kind: SchedulingStrategyKind) {
        self.overrides
            .write()
            .insert(objective, TaskScheduler::new(kind));
    }

    pub fn clear_objective_strategy(&self, objective: &ObjectiveId) -> bool {
        self.overrides.write().remove(objective).is_some()
    }

    pub fn strategy_for_objective(&self, objective: Option<ObjectiveId>) -> SchedulingStrategyKind {
        objective
            .and_then(|id| self.overrides.read().get(&id).map(TaskScheduler::kind))
            .unwrap_or_else(|| self.default.kind())
    }

    /// Pick an agent for a single task using the scheduler responsible for
    /// its objective.
    pub fn select(
        &self,
        agents: &[&AgentState],
        task: &TaskDefinition,
        ctx: &SchedulingContext<'_>,
        breakers: &CircuitBreakerManager,
    ) -> Option<AgentId> {
        if let Some(objective) = task.objective_id {
            if let Some(scheduler) = self.overrides.read().get(&objective) {
                return scheduler.select(agents, task, ctx, breakers);
            }
        }
        self.default.select(agents, task, ctx, breakers)
    }

    /// Plan one pass over `ready` tasks.
    ///
    /// `running` is the number of attempts currently executing; the plan never
    /// brings that above `max_concurrency`.
    pub fn plan(
        &self,
        ready: &[&TaskDefinition],
        agents: &[&AgentState],
        running: usize,
        ctx: &SchedulingContext<'_>,
        breakers: &CircuitBreakerManager,
    ) -> Vec<PlannedAssignment> {
        let mut slots = self.max_concurrency.saturating_sub(running);
        let mut plan = Vec::new();
        if slots == 0 || ready.is_empty() {
            return plan;
        }

        let ready_ids: HashSet<TaskId> = ready.iter().map(|task| task.id).collect();
        let mut busy: HashSet<AgentId> = HashSet::new();
        let mut taken: HashSet<TaskId> = HashSet::new();

        // Reserved work first, in registration order.
        let mut ordered_agents = agents.to_vec();
        ordered_agents.sort_by_key(|agent| agent.sequence);
        for agent in &ordered_agents {
            if slots == 0 {
                break;
            }
            if agent.status != AgentStatus::Idle || agent.current_task.is_some() {
                continue;
            }
            if !breakers.is_call_permitted(&breaker_key(&agent.id)) {
                continue;
            }
            if let Some(task_id) = agent
                .queued_tasks
                .iter()
                .find(|task_id| ready_ids.contains(task_id))
            {
                plan.push(PlannedAssignment {
                    task_id: *task_id,
                    agent_id: agent.id,
                });
                busy.insert(agent.id);
                taken.insert(*task_id);
                slots -= 1;
            }
        }

        let mut open: Vec<&TaskDefinition> = ready
            .iter()
            .copied()
            .filter(|task| task.assigned_to.is_none() && !taken.contains(&task.id))
            .collect();
        open.sort_by_key(|task| (Reverse(task.priority), task.id.sequence));

        for task in open {
            if slots == 0 {
                break;
            }
            let free: Vec<&AgentState> = ordered_agents
                .iter()
                .copied()
                .filter(|agent| !busy.contains(&agent.id))
                .collect();
            if free.is_empty() {
                break;
            }
            match self.select(&free, task, ctx, breakers) {
                Some(agent_id) => {
                    plan.push(PlannedAssignment {
                        task_id: task.id,
                        agent_id,
                    });
                    busy.insert(agent_id);
                    slots -= 1;
                }
                None => {
                    debug!(task_id = %task.id, "No eligible agent, task stays queued");
                }
            }
        }

        plan
    }
}
