// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Work Stealing
//!
//! Moves reserved-but-not-started work from overloaded agents to idle ones.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Plan steals from a load snapshot; the coordinator applies them
//!
//! Planning is pure: [`WorkStealingCoordinator::plan`] reads an
//! [`AgentLoad`] snapshot and proposes [`StealPlan`]s. The coordinator applies
//! each plan only if the task is still queued and still reserved by the
//! victim, so a task that started in the meantime is never touched.
//!
//! Per cycle a task is stolen at most once and an idle agent takes at most
//! one task. No idle/overloaded pair means an empty plan.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;

use hivemind_core::domain::agent::{AgentId, AgentState, AgentStatus};
use hivemind_core::domain::config::WorkStealingConfig;
use hivemind_core::domain::task::TaskId;

/// Load view of one agent at planning time.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentLoad {
    pub agent_id: AgentId,
    pub sequence: u64,
    pub status: AgentStatus,
    pub workload: f64,
    pub capacity: u32,
    pub current_task: Option<TaskId>,
    /// Movable backlog, oldest first.
    pub reserved: Vec<TaskId>,
}

impl AgentLoad {
    /// `movable` filters the backlog down to tasks that have not started.
    pub fn from_agent(agent: &AgentState, movable: impl Fn(&TaskId) -> bool) -> Self {
        Self {
            agent_id: agent.id,
            sequence: agent.sequence,
            status: agent.status,
            workload: agent.workload,
            capacity: agent.capabilities.max_concurrent_tasks.max(1),
            current_task: agent.current_task,
            reserved: agent.queued_tasks.iter().copied().filter(|t| movable(t)).collect(),
        }
    }

    fn is_thief(&self) -> bool {
        self.status == AgentStatus::Idle && self.current_task.is_none() && self.reserved.is_empty()
    }

    fn occupied(&self) -> usize {
        usize::from(self.current_task.is_some()) + self.reserved.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StealPlan {
    pub task_id: TaskId,
    pub from: AgentId,
    pub to: AgentId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkStealingStats {
    pub cycles: u64,
    pub steals_planned: u64,
    pub steals_applied: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

pub struct WorkStealingCoordinator {
    config: WorkStealingConfig,
    stats: Mutex<WorkStealingStats>,
}

impl WorkStealingCoordinator {
    pub fn new(config: WorkStealingConfig) -> Self {
        Self {
            config,
            stats: Mutex::new(WorkStealingStats::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn high_water_mark(&self) -> f64 {
        self.config.high_water_mark
    }

    /// Propose steals for one cycle.
    ///
    /// `can_take(thief, task)` lets the caller veto pairs, e.g. when the thief
    /// lacks a capability the task requires.
    pub fn plan(
        &self,
        loads: &[AgentLoad],
        can_take: impl Fn(AgentId, TaskId) -> bool,
    ) -> Vec<StealPlan> {
        let mut thieves: Vec<&AgentLoad> = loads.iter().filter(|l| l.is_thief()).collect();
        thieves.sort_by_key(|load| load.sequence);

        let mut victims: Vec<AgentLoad> = loads
            .iter()
            .filter(|l| l.workload > self.config.high_water_mark && !l.reserved.is_empty())
            .cloned()
            .collect();
        victims.sort_by(|a, b| {
            b.workload
                .partial_cmp(&a.workload)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.sequence.cmp(&b.sequence))
        });

        let mut plans = Vec::new();
        let mut stolen: HashSet<TaskId> = HashSet::new();
        if thieves.is_empty() || victims.is_empty() {
            return plans;
        }

        for thief in thieves {
            'victims: for victim in victims.iter_mut() {
                if victim.workload <= self.config.high_water_mark {
                    continue;
                }
                // Newest reservation first: it would wait the longest.
                for index in (0..victim.reserved.len()).rev() {
                    let task_id = victim.reserved[index];
                    if stolen.contains(&task_id) || !can_take(thief.agent_id, task_id) {
                        continue;
                    }
                    victim.reserved.remove(index);
                    victim.workload = victim.occupied() as f64 / victim.capacity as f64;
                    stolen.insert(task_id);
                    plans.push(StealPlan {
                        task_id,
                        from: victim.agent_id,
                        to: thief.agent_id,
                    });
                    break 'victims;
                }
            }
        }

        debug!(steals = plans.len(), "Work stealing cycle planned");
        let mut stats = self.stats.lock();
        stats.cycles += 1;
        stats.steals_planned += plans.len() as u64;
        stats.last_cycle_at = Some(Utc::now());
        plans
    }

    pub fn record_applied(&self, applied: usize) {
        self.stats.lock().steals_applied += applied as u64;
    }

    pub fn stats(&self) -> WorkStealingStats {
        self.stats.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hivemind_core::domain::agent::AgentType;
    use hivemind_core::domain::swarm::SwarmId;
    use hivemind_core::domain::task::TaskPriority;

    fn task(swarm: SwarmId, sequence: u64) -> TaskId {
        TaskId::new(swarm, sequence, TaskPriority::Normal)
    }

    fn load(
        instance: u32,
        status: AgentStatus,
        current: Option<TaskId>,
        reserved: Vec<TaskId>,
    ) -> AgentLoad {
        let occupied = usize::from(current.is_some()) + reserved.len();
        AgentLoad {
            agent_id: AgentId::new(AgentType::Developer, instance),
            sequence: instance as u64,
            status,
            workload: (occupied as f64 / 3.0).min(1.0),
            capacity: 3,
            current_task: current,
            reserved,
        }
    }

    fn coordinator() -> WorkStealingCoordinator {
        WorkStealingCoordinator::new(WorkStealingConfig::default())
    }

    #[test]
    fn test_idle_agent_steals_newest_reservation() {
        let swarm = SwarmId::new();
        let (running, r1, r2) = (task(swarm, 1), task(swarm, 2), task(swarm, 3));
        let victim = load(1, AgentStatus::Busy, Some(running), vec![r1, r2]);
        let thief = load(2, AgentStatus::Idle, None, vec![]);

        let ws = coordinator();
        let plans = ws.plan(&[victim.clone(), thief.clone()], |_, _| true);
        assert_eq!(
            plans,
            vec![StealPlan {
                task_id: r2,
                from: victim.agent_id,
                to: thief.agent_id
            }]
        );
        assert_eq!(ws.stats().steals_planned, 1);
    }

    #[test]
    fn test_each_thief_takes_one_and_victim_rechecked() {
        let swarm = SwarmId::new();
        let (running, r1, r2) = (task(swarm, 1), task(swarm, 2), task(swarm, 3));
        let victim = load(1, AgentStatus::Busy, Some(running), vec![r1, r2]);
        let thieves: Vec<_> = (2..=4).map(|n| load(n, AgentStatus::Idle, None, vec![])).collect();

        let mut loads = vec![victim];
        loads.extend(thieves);
        let plans = coordinator().plan(&loads, |_, _| true);

        // After one steal the victim sits at 2/3, still above 0.6; after the
        // second it is at 1/3 and stops being a victim.
        assert_eq!(plans.len(), 2);
        let tasks: HashSet<_> = plans.iter().map(|p| p.task_id).collect();
        assert_eq!(tasks.len(), 2);
        let to: HashSet<_> = plans.iter().map(|p| p.to).collect();
        assert_eq!(to.len(), 2);
    }

    #[test]
    fn test_no_pair_is_a_noop() {
        let swarm = SwarmId::new();
        let light = load(1, AgentStatus::Busy, Some(task(swarm, 1)), vec![]);
        let idle = load(2, AgentStatus::Idle, None, vec![]);
        assert!(coordinator().plan(&[light, idle], |_, _| true).is_empty());

        let heavy = load(3, AgentStatus::Busy, Some(task(swarm, 2)), vec![task(swarm, 3)]);
        assert!(coordinator().plan(&[heavy], |_, _| true).is_empty());
    }

    #[test]
    fn test_veto_skips_task() {
        let swarm = SwarmId::new();
        let (running, r1, r2) = (task(swarm, 1), task(swarm, 2), task(swarm, 3));
        let victim = load(1, AgentStatus::Busy, Some(running), vec![r1, r2]);
        let thief = load(2, AgentStatus::Idle, None, vec![]);

        let plans = coordinator().plan(&[victim, thief], |_, t| t != r2);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].task_id, r1);
    }
}
