// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Objective use cases - planning an objective into tasks and driving it.

use std::collections::{HashMap, HashSet};
use tracing::info;

use hivemind_core::domain::config::SchedulingStrategyKind;
use hivemind_core::domain::events::SwarmEventPayload;
use hivemind_core::domain::objective::{
    ObjectiveId, ObjectiveSpec, ObjectiveStatus, SwarmObjective, SwarmStrategy,
};
use hivemind_core::domain::task::{PlannedTask, TaskId, TaskStatus};

use super::SwarmCoordinator;
use crate::application::decomposition::{decompose, infer_strategy};
use crate::domain::dependency_graph::DependencyGraph;
use crate::domain::error::{SwarmError, SwarmResult};

/// Plan indices ordered so every task comes after its prerequisites,
/// otherwise keeping plan order. Expects a validated plan.
fn registration_order(planned: &[PlannedTask]) -> Vec<usize> {
    let mut placed: HashSet<&str> = HashSet::new();
    let mut order = Vec::with_capacity(planned.len());
    while order.len() < planned.len() {
        let next = planned.iter().enumerate().find(|(index, task)| {
            !order.contains(index)
                && task
                    .depends_on
                    .iter()
                    .all(|dependency| placed.contains(dependency.as_str()))
        });
        let Some((index, task)) = next else {
            break;
        };
        placed.insert(task.key.as_str());
        order.push(index);
    }
    order
}

/// Check the plan's local keys before anything is registered.
fn validate_plan(planned: &[PlannedTask]) -> SwarmResult<()> {
    let mut graph: DependencyGraph<String> = DependencyGraph::new();
    for task in planned {
        if !graph.add_task(task.key.clone()) {
            return Err(SwarmError::InvalidState(format!(
                "duplicate task key '{}' in objective plan",
                task.key
            )));
        }
    }
    for task in planned {
        for dependency in &task.depends_on {
            graph.add_dependency(&task.key, dependency)?;
        }
    }
    Ok(())
}

impl SwarmCoordinator {
    /// Register an objective in `planning` with its tasks in `created`.
    ///
    /// An objective without tasks is decomposed by its strategy. The plan is
    /// rejected as a whole on a dependency cycle, an unknown key, an unknown
    /// task id or a missing capacity, so nothing is registered in that case.
    pub fn create_objective(&self, spec: ObjectiveSpec) -> SwarmResult<ObjectiveId> {
        let strategy = match spec.strategy {
            SwarmStrategy::Auto if self.inner.config.strategy != SwarmStrategy::Auto => {
                self.inner.config.strategy
            }
            SwarmStrategy::Auto => infer_strategy(&spec.description),
            concrete => concrete,
        };
        let planned = if spec.tasks.is_empty() {
            decompose(&spec, strategy)
        } else {
            spec.tasks.clone()
        };
        validate_plan(&planned)?;

        let objective_id = ObjectiveId::new();
        let task_count = planned.len();
        self.with_state(|inner, state| {
            if state.status.is_terminal() || state.draining {
                return Err(SwarmError::InvalidState(format!(
                    "cannot create objectives while the swarm is {}",
                    state.status
                )));
            }
            if state.open_task_count() + task_count > inner.config.max_tasks {
                return Err(SwarmError::TaskLimitReached {
                    max: inner.config.max_tasks,
                });
            }

            // Explicit task ids must already exist; checked up front so a bad
            // reference cannot leave part of the plan registered.
            if let Some(unknown) = planned
                .iter()
                .flat_map(|task| &task.spec.constraints.dependencies)
                .find(|dependency| !state.tasks.contains_key(*dependency))
            {
                return Err(SwarmError::UnknownDependency(unknown.to_string()));
            }

            let mut objective = SwarmObjective::new(objective_id, &spec, strategy);
            let mut ids: HashMap<String, TaskId> = HashMap::new();
            for index in registration_order(&planned) {
                let task = &planned[index];
                let mut task_spec = task.spec.clone();
                task_spec.objective_id = Some(objective_id);
                for dependency in &task.depends_on {
                    if let Some(id) = ids.get(dependency) {
                        task_spec.constraints.dependencies.push(*id);
                    }
                }
                let dependencies = task_spec.constraints.dependencies.clone();
                let task_id = inner.register_task(state, task_spec)?;
                ids.insert(task.key.clone(), task_id);
                objective.dependencies.insert(task_id, dependencies);
            }
            // Plan order, not registration order.
            objective.tasks = planned
                .iter()
                .filter_map(|task| ids.get(&task.key).copied())
                .collect();

            state.objectives.insert(objective_id, objective);
            state.refresh_objective(&objective_id);
            state.emit(SwarmEventPayload::ObjectiveCreated {
                objective_id,
                name: spec.name.clone(),
                task_count,
            });
            Ok(())
        })?;

        info!(
            objective_id = %objective_id,
            strategy = strategy.as_str(),
            task_count,
            "Objective created"
        );
        Ok(objective_id)
    }

    /// `planning → executing`: queue every task of the objective and schedule.
    pub fn execute_objective(&self, objective_id: ObjectiveId) -> SwarmResult<()> {
        let dispatches = self.with_state(|inner, state| {
            let objective = state
                .objectives
                .get_mut(&objective_id)
                .ok_or(SwarmError::ObjectiveNotFound(objective_id))?;
            if objective.status != ObjectiveStatus::Planning {
                return Err(SwarmError::InvalidState(format!(
                    "objective {objective_id} is already {:?}",
                    objective.status
                )));
            }
            objective.status = ObjectiveStatus::Executing;
            objective.started_at = Some(chrono::Utc::now());
            let mut tasks = objective.tasks.clone();
            tasks.sort();
            state.emit(SwarmEventPayload::ObjectiveStarted { objective_id });

            for task_id in tasks {
                if state.status_of(&task_id) == Some(TaskStatus::Created) {
                    inner.enqueue(state, &task_id)?;
                }
            }
            state.refresh_objective(&objective_id);
            Ok::<_, SwarmError>(inner.plan_dispatches(state))
        })?;

        info!(objective_id = %objective_id, "Objective executing");
        self.dispatch_all(dispatches);
        Ok(())
    }

    /// Schedule this objective's tasks with a different strategy than the
    /// swarm default.
    pub fn set_objective_strategy(
        &self,
        objective_id: ObjectiveId,
        kind: SchedulingStrategyKind,
    ) -> SwarmResult<()> {
        if !self.inner.state.lock().objectives.contains_key(&objective_id) {
            return Err(SwarmError::ObjectiveNotFound(objective_id));
        }
        self.inner.scheduler.set_objective_strategy(objective_id, kind);
        info!(objective_id = %objective_id, strategy = ?kind, "Objective strategy overridden");
        Ok(())
    }

    pub fn get_objective(&self, objective_id: &ObjectiveId) -> Option<SwarmObjective> {
        self.inner.state.lock().objectives.get(objective_id).cloned()
    }

    pub fn list_objectives(&self) -> Vec<SwarmObjective> {
        self.inner.state.lock().objectives.values().cloned().collect()
    }
}
