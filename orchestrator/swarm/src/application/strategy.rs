// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Selection Strategies
//!
//! A [`SchedulingStrategy`] picks one agent out of an already-filtered pool of
//! admissible candidates. Strategies never mutate agents; they only rank them.
//!
//! | Strategy | Picks |
//! |----------|-------|
//! | [`CapabilityStrategy`] | highest weighted capability score |
//! | [`RoundRobinStrategy`] | next agent after a rotating cursor |
//! | [`LeastLoadedStrategy`] | lowest workload, then highest reliability |
//! | [`AffinityStrategy`] | agent that last completed the same task type for the same objective |
//!
//! All ties resolve by registration order, so a given snapshot always yields
//! the same choice.

use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use hivemind_core::domain::agent::{AgentId, AgentState, AgentStatus};
use hivemind_core::domain::config::SchedulingStrategyKind;
use hivemind_core::domain::objective::ObjectiveId;
use hivemind_core::domain::task::{TaskDefinition, TaskType};

pub const WEIGHT_CAPABILITY: f64 = 0.4;
pub const WEIGHT_PERFORMANCE: f64 = 0.3;
pub const WEIGHT_AVAILABILITY: f64 = 0.2;
pub const WEIGHT_QUALITY: f64 = 0.1;

/// Remembers which agent last completed each (objective, task type) pair.
#[derive(Debug, Default)]
pub struct AffinityIndex {
    entries: RwLock<HashMap<(Option<ObjectiveId>, TaskType), AgentId>>,
}

impl AffinityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, objective: Option<ObjectiveId>, task_type: TaskType, agent: AgentId) {
        self.entries.write().insert((objective, task_type), agent);
    }

    pub fn preferred(&self, objective: Option<ObjectiveId>, task_type: &TaskType) -> Option<AgentId> {
        self.entries
            .read()
            .get(&(objective, task_type.clone()))
            .copied()
    }

    pub fn forget_agent(&self, agent: AgentId) {
        self.entries.write().retain(|_, a| *a != agent);
    }
}

pub struct SchedulingContext<'a> {
    pub affinity: &'a AffinityIndex,
}

pub trait SchedulingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `candidates` are admissible agents; `None` leaves the task queued.
    fn select(
        &self,
        candidates: &[&AgentState],
        task: &TaskDefinition,
        ctx: &SchedulingContext<'_>,
    ) -> Option<AgentId>;
}

pub fn strategy_for(kind: SchedulingStrategyKind) -> Box<dyn SchedulingStrategy> {
    match kind {
        SchedulingStrategyKind::Capability => Box::new(CapabilityStrategy),
        SchedulingStrategyKind::RoundRobin => Box::new(RoundRobinStrategy::default()),
        SchedulingStrategyKind::LeastLoaded => Box::new(LeastLoadedStrategy),
        SchedulingStrategyKind::Affinity => Box::new(AffinityStrategy),
    }
}

// ============================================================================
// Admissibility & scoring
// ============================================================================

/// Agent-side checks that do not depend on circuit breakers: idle, type pin,
/// every required capability and tool present, reliability floor, spare
/// capacity.
pub fn is_capability_admissible(agent: &AgentState, task: &TaskDefinition) -> bool {
    if agent.status != AgentStatus::Idle || agent.current_task.is_some() {
        return false;
    }
    let req = &task.requirements;
    if let Some(pinned) = req.agent_type {
        if agent.agent_type != pinned {
            return false;
        }
    }
    let caps = &agent.capabilities;
    if !req.capabilities.iter().all(|c| caps.has_capability(c)) {
        return false;
    }
    if !req.tools.iter().all(|t| caps.has_capability(t)) {
        return false;
    }
    if let Some(min) = req.min_reliability {
        if caps.reliability < min {
            return false;
        }
    }
    agent.workload < 1.0
}

/// `0.4·match + 0.3·(success_rate·reliability) + 0.2·(1 − workload) + 0.1·quality`
pub fn capability_score(agent: &AgentState, task: &TaskDefinition) -> f64 {
    let caps = &agent.capabilities;
    let capability_match = caps.match_ratio(&task.requirements.capabilities);
    let performance = agent.metrics.success_rate * caps.reliability;
    let availability = 1.0 - agent.workload.clamp(0.0, 1.0);
    WEIGHT_CAPABILITY * capability_match
        + WEIGHT_PERFORMANCE * performance
        + WEIGHT_AVAILABILITY * availability
        + WEIGHT_QUALITY * caps.quality
}

fn by_registration<'a>(candidates: &[&'a AgentState]) -> Vec<&'a AgentState> {
    let mut ordered = candidates.to_vec();
    ordered.sort_by_key(|agent| agent.sequence);
    ordered
}

// ============================================================================
// Strategies
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct CapabilityStrategy;

impl SchedulingStrategy for CapabilityStrategy {
    fn name(&self) -> &'static str {
        "capability"
    }

    fn select(
        &self,
        candidates: &[&AgentState],
        task: &TaskDefinition,
        _ctx: &SchedulingContext<'_>,
    ) -> Option<AgentId> {
        let mut best: Option<(&AgentState, f64)> = None;
        for agent in by_registration(candidates) {
            let score = capability_score(agent, task);
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((agent, score)),
            }
        }
        best.map(|(agent, _)| agent.id)
    }
}

#[derive(Debug, Default)]
pub struct RoundRobinStrategy {
    cursor: AtomicUsize,
}

impl SchedulingStrategy for RoundRobinStrategy {
    fn name(&self) -> &'static str {
        "round-robin"
    }

    fn select(
        &self,
        candidates: &[&AgentState],
        _task: &TaskDefinition,
        _ctx: &SchedulingContext<'_>,
    ) -> Option<AgentId> {
        if candidates.is_empty() {
            return None;
        }
        let ordered = by_registration(candidates);
        let index = self.cursor.fetch_add(1, AtomicOrdering::Relaxed) % ordered.len();
        Some(ordered[index].id)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LeastLoadedStrategy;

impl SchedulingStrategy for LeastLoadedStrategy {
    fn name(&self) -> &'static str {
        "least-loaded"
    }

    fn select(
        &self,
        candidates: &[&AgentState],
        _task: &TaskDefinition,
        _ctx: &SchedulingContext<'_>,
    ) -> Option<AgentId> {
        candidates
            .iter()
            .min_by(|a, b| {
                a.workload
                    .partial_cmp(&b.workload)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| {
                        b.capabilities
                            .reliability
                            .partial_cmp(&a.capabilities.reliability)
                            .unwrap_or(Ordering::Equal)
                    })
                    .then_with(|| a.sequence.cmp(&b.sequence))
            })
            .map(|agent| agent.id)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AffinityStrategy;

impl SchedulingStrategy for AffinityStrategy {
    fn name(&self) -> &'static str {
        "affinity"
    }

    fn select(
        &self,
        candidates: &[&AgentState],
        task: &TaskDefinition,
        ctx: &SchedulingContext<'_>,
    ) -> Option<AgentId> {
        if let Some(preferred) = ctx.affinity.preferred(task.objective_id, &task.task_type) {
            if candidates.iter().any(|agent| agent.id == preferred) {
                return Some(preferred);
            }
        }
        CapabilityStrategy.select(candidates, task, ctx)
    }
}
