// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

mod common;

use hivemind_core::domain::agent::AgentType;
use hivemind_core::domain::config::{FailurePolicy, SchedulingStrategyKind};
use hivemind_core::domain::events::{SwarmEventPayload, SwarmEventType};
use hivemind_core::domain::executor::TaskExecutionError;
use hivemind_core::domain::objective::{ObjectiveId, ObjectiveSpec, ObjectiveStatus, SwarmStrategy};
use hivemind_core::domain::swarm::SwarmId;
use hivemind_core::domain::task::{PlannedTask, TaskId, TaskPriority, TaskSpec, TaskStatus, TaskType};
use hivemind_swarm::{AgentSpec, SwarmCoordinator, SwarmError};

use common::{eventually, quiet_config, started, status_of, wait_for_status, ScriptedExecutor, Step};

fn step(key: &str, task_type: TaskType) -> PlannedTask {
    PlannedTask::new(key, TaskSpec::new(task_type, key))
}

async fn wait_for_objective(
    swarm: &SwarmCoordinator,
    objective_id: ObjectiveId,
    status: ObjectiveStatus,
) -> anyhow::Result<()> {
    eventually(&format!("objective to be {status:?}"), || {
        swarm
            .get_objective(&objective_id)
            .is_some_and(|objective| objective.status == status)
    })
    .await
}

#[tokio::test]
async fn test_objective_without_tasks_is_decomposed_and_runs_in_order() -> anyhow::Result<()> {
    let executor = ScriptedExecutor::new();
    let swarm = started(quiet_config(), executor.clone()).await?;
    swarm.register_agent(AgentSpec::new(AgentType::Developer))?;
    swarm.register_agent(AgentSpec::new(AgentType::Reviewer))?;

    let objective_id = swarm.create_objective(ObjectiveSpec::new("login", "Implement OAuth login"))?;
    let objective = swarm.get_objective(&objective_id).expect("objective");
    assert_eq!(objective.status, ObjectiveStatus::Planning);
    assert_eq!(objective.strategy, SwarmStrategy::Development);
    assert_eq!(objective.tasks.len(), 5);
    for task_id in &objective.tasks {
        assert_eq!(status_of(&swarm, task_id), Some(TaskStatus::Created));
    }
    assert!(executor.calls().is_empty());

    swarm.execute_objective(objective_id)?;
    wait_for_objective(&swarm, objective_id, ObjectiveStatus::Completed).await?;

    let order: Vec<TaskType> = executor
        .calls()
        .iter()
        .filter_map(|call| swarm.get_task(&call.task_id))
        .map(|task| task.task_type)
        .collect();
    assert_eq!(
        order,
        vec![
            TaskType::Coordination,
            TaskType::Coding,
            TaskType::Testing,
            TaskType::Review,
            TaskType::Documentation
        ]
    );

    let objective = swarm.get_objective(&objective_id).expect("objective");
    assert_eq!(objective.progress.completed_tasks, 5);
    assert_eq!(objective.progress.percent_complete, 100.0);
    assert!(objective.completed_at.is_some());
    assert_eq!(swarm.events_of(SwarmEventType::ObjectiveCompleted).len(), 1);
    assert!(swarm.execute_objective(objective_id).is_err());
    Ok(())
}

#[tokio::test]
async fn test_continue_policy_fails_dependents_and_keeps_independent_branch() -> anyhow::Result<()> {
    let executor = ScriptedExecutor::new();
    executor.script("root", [Step::Fail(TaskExecutionError::permanent("bad plan"))]);
    let mut config = quiet_config();
    config.scheduling.failure_policy = FailurePolicy::Continue;
    let swarm = started(config, executor.clone()).await?;
    swarm.register_agent(AgentSpec::new(AgentType::Developer))?;

    let spec = ObjectiveSpec::new("partial", "mixed outcome")
        .with_strategy(SwarmStrategy::Development)
        .with_task(step("root", TaskType::Coding))
        .with_task(step("child", TaskType::Testing).after("root"))
        .with_task(step("grandchild", TaskType::Review).after("child"))
        .with_task(step("side", TaskType::Coding));
    let objective_id = swarm.create_objective(spec)?;
    swarm.execute_objective(objective_id)?;
    wait_for_objective(&swarm, objective_id, ObjectiveStatus::Failed).await?;

    let objective = swarm.get_objective(&objective_id).expect("objective");
    let [root, child, grandchild, side] = objective.tasks[..] else {
        panic!("expected four tasks, got {}", objective.tasks.len());
    };
    assert_eq!(status_of(&swarm, &root), Some(TaskStatus::Failed));
    assert_eq!(status_of(&swarm, &child), Some(TaskStatus::Failed));
    assert_eq!(status_of(&swarm, &grandchild), Some(TaskStatus::Failed));
    assert_eq!(status_of(&swarm, &side), Some(TaskStatus::Completed));
    assert_eq!(executor.calls_for("child"), 0);
    assert_eq!(objective.progress.failed_tasks, 3);
    assert!(objective.error.is_some());

    match &swarm.events_of(SwarmEventType::ObjectiveFailed)[..] {
        [event] => assert!(matches!(event.payload, SwarmEventPayload::ObjectiveFailed { .. })),
        events => panic!("expected one objective.failed event, got {}", events.len()),
    }
    Ok(())
}

#[tokio::test]
async fn test_cyclic_plan_is_rejected_before_registration() -> anyhow::Result<()> {
    let swarm = started(quiet_config(), ScriptedExecutor::new()).await?;
    let spec = ObjectiveSpec::new("loop", "circular")
        .with_task(step("a", TaskType::Coding).after("c"))
        .with_task(step("b", TaskType::Testing).after("a"))
        .with_task(step("c", TaskType::Review).after("b"));

    match swarm.create_objective(spec) {
        Err(SwarmError::DependencyCycle { cycle }) => {
            for key in ["a", "b", "c"] {
                assert!(cycle.iter().any(|k| k == key), "cycle {cycle:?} misses {key}");
            }
        }
        other => panic!("expected a dependency cycle, got {other:?}"),
    }
    assert!(swarm.list_tasks().is_empty());
    assert!(swarm.list_objectives().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_plan_with_unknown_task_id_registers_nothing() -> anyhow::Result<()> {
    let swarm = started(quiet_config(), ScriptedExecutor::new()).await?;
    let missing = TaskId::new(SwarmId::new(), 999, TaskPriority::Normal);
    let spec = ObjectiveSpec::new("dangling", "refers to a task that never existed")
        .with_task(step("ok", TaskType::Coding))
        .with_task(PlannedTask::new(
            "bad",
            TaskSpec::new(TaskType::Testing, "bad").depends_on(missing),
        ));

    match swarm.create_objective(spec) {
        Err(SwarmError::UnknownDependency(id)) => assert_eq!(id, missing.to_string()),
        other => panic!("expected an unknown dependency, got {other:?}"),
    }
    assert!(swarm.list_tasks().is_empty());
    assert!(swarm.list_objectives().is_empty());
    assert!(swarm.events_of(SwarmEventType::TaskCreated).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_objective_larger_than_task_limit_is_rejected() -> anyhow::Result<()> {
    let mut config = quiet_config();
    config.max_tasks = 3;
    let swarm = started(config, ScriptedExecutor::new()).await?;

    let result = swarm.create_objective(
        ObjectiveSpec::new("big", "anything").with_strategy(SwarmStrategy::Development),
    );
    assert!(matches!(result, Err(SwarmError::TaskLimitReached { max: 3 })));
    assert!(swarm.list_tasks().is_empty());

    let small = swarm.create_objective(
        ObjectiveSpec::new("small", "anything").with_strategy(SwarmStrategy::Testing),
    )?;
    assert_eq!(swarm.get_objective(&small).expect("objective").tasks.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_objective_strategy_override_requires_known_objective() -> anyhow::Result<()> {
    let swarm = started(quiet_config(), ScriptedExecutor::new()).await?;
    let unknown = ObjectiveId::new();
    assert!(matches!(
        swarm.set_objective_strategy(unknown, SchedulingStrategyKind::RoundRobin),
        Err(SwarmError::ObjectiveNotFound(id)) if id == unknown
    ));

    let objective_id = swarm.create_objective(
        ObjectiveSpec::new("docs", "write the handbook").with_strategy(SwarmStrategy::Research),
    )?;
    swarm.set_objective_strategy(objective_id, SchedulingStrategyKind::LeastLoaded)?;
    Ok(())
}

#[tokio::test]
async fn test_low_quality_result_raises_warning() -> anyhow::Result<()> {
    let executor = ScriptedExecutor::new();
    executor.script("sloppy", [Step::Succeed(0.4)]);
    let swarm = started(quiet_config(), executor).await?;
    swarm.register_agent(AgentSpec::new(AgentType::Developer))?;

    let task = swarm.submit_task(TaskSpec::new(TaskType::Coding, "sloppy"))?;
    wait_for_status(&swarm, task, TaskStatus::Completed).await?;

    let warnings = swarm.events_of(SwarmEventType::TaskQualityWarning);
    assert_eq!(warnings.len(), 1);
    match &warnings[0].payload {
        SwarmEventPayload::TaskQualityWarning { quality, threshold, .. } => {
            assert_eq!(*quality, 0.4);
            assert_eq!(*threshold, 0.8);
        }
        other => panic!("unexpected payload {other:?}"),
    }
    Ok(())
}
