// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use hivemind_core::domain::agent::{AgentStatus, AgentType};
use hivemind_core::domain::events::{SwarmEventPayload, SwarmEventType};
use hivemind_core::domain::repository::StatePersistence;
use hivemind_core::domain::swarm::SwarmStatus;
use hivemind_core::domain::task::{AttemptStatus, TaskSpec, TaskStatus, TaskType};
use hivemind_core::infrastructure::InMemoryStatePersistence;
use hivemind_swarm::{AgentSpec, SwarmCoordinator, SwarmError};

use common::{eventually, quiet_config, started, status_of, wait_for_status, ScriptedExecutor, Step};

#[tokio::test]
async fn test_invalid_configuration_fails_the_swarm() -> anyhow::Result<()> {
    let mut config = quiet_config();
    config.name = "  ".to_string();
    let swarm = SwarmCoordinator::new(config, ScriptedExecutor::new())?;
    assert_eq!(swarm.status(), SwarmStatus::Planning);

    let err = swarm.initialize().await.expect_err("blank name must be rejected");
    assert!(matches!(err, SwarmError::ConfigurationValidation(_)), "got {err:?}");
    assert_eq!(swarm.status(), SwarmStatus::Failed);
    assert_eq!(swarm.events_of(SwarmEventType::SwarmFailed).len(), 1);
    assert!(swarm.events_of(SwarmEventType::SwarmStarted).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_builder_requires_an_executor() {
    let result = SwarmCoordinator::builder(quiet_config()).build();
    assert!(matches!(result, Err(SwarmError::InvalidState(_))));
}

#[tokio::test]
async fn test_pause_holds_new_work_and_resume_restores_agents() -> anyhow::Result<()> {
    let executor = ScriptedExecutor::new();
    executor.script("long", [Step::Block]);
    let swarm = started(quiet_config(), executor.clone()).await?;
    assert_eq!(swarm.status(), SwarmStatus::Executing);

    let busy = swarm.register_agent(AgentSpec::new(AgentType::Developer))?;
    let long = swarm.submit_task(TaskSpec::new(TaskType::Coding, "long"))?;
    wait_for_status(&swarm, long, TaskStatus::Running).await?;

    swarm.pause()?;
    assert_eq!(swarm.status(), SwarmStatus::Paused);
    let paused = swarm.get_agent(&busy).expect("agent");
    assert_eq!(paused.status, AgentStatus::Paused);
    assert_eq!(paused.current_task, Some(long));

    let idle = swarm.register_agent(AgentSpec::new(AgentType::Developer))?;
    let waiting = swarm.submit_task(TaskSpec::new(TaskType::Coding, "waiting"))?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(status_of(&swarm, &waiting), Some(TaskStatus::Queued));
    assert_eq!(executor.calls_for("waiting"), 0);

    swarm.resume()?;
    assert_eq!(swarm.status(), SwarmStatus::Executing);
    assert_eq!(swarm.get_agent(&busy).expect("agent").status, AgentStatus::Busy);
    wait_for_status(&swarm, waiting, TaskStatus::Completed).await?;
    let definition = swarm.get_task(&waiting).expect("task");
    assert_eq!(definition.attempts[0].agent_id, idle);

    assert_eq!(swarm.events_of(SwarmEventType::SwarmPaused).len(), 1);
    assert_eq!(swarm.events_of(SwarmEventType::SwarmResumed).len(), 1);
    assert!(swarm.resume().is_err());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_drains_running_work_and_persists() -> anyhow::Result<()> {
    let executor = ScriptedExecutor::new();
    executor.script("quick", [Step::Delay(Duration::from_millis(100))]);
    let persistence = Arc::new(InMemoryStatePersistence::new());
    let swarm = SwarmCoordinator::builder(quiet_config())
        .with_executor(executor.clone())
        .with_persistence(persistence.clone())
        .build()?;
    swarm.initialize().await?;

    let agent = swarm.register_agent(AgentSpec::new(AgentType::Developer))?;
    let quick = swarm.submit_task(TaskSpec::new(TaskType::Coding, "quick"))?;
    wait_for_status(&swarm, quick, TaskStatus::Running).await?;

    swarm.shutdown().await?;
    assert_eq!(swarm.status(), SwarmStatus::Completed);
    assert_eq!(status_of(&swarm, &quick), Some(TaskStatus::Completed));
    assert_eq!(swarm.get_agent(&agent).expect("agent").status, AgentStatus::Terminated);
    assert!(executor.cancels().is_empty());

    let completed = swarm.events_of(SwarmEventType::SwarmCompleted);
    assert_eq!(completed.len(), 1);
    match &completed[0].payload {
        SwarmEventPayload::SwarmCompleted { tasks_completed, tasks_cancelled, .. } => {
            assert_eq!((*tasks_completed, *tasks_cancelled), (1, 0));
        }
        other => panic!("unexpected payload {other:?}"),
    }

    let saved = persistence.load_state().await?.expect("final snapshot");
    assert_eq!(saved.swarm_id, swarm.swarm_id());
    assert_eq!(saved.tasks.len(), 1);

    // Idempotent once completed; no new work accepted.
    swarm.shutdown().await?;
    assert!(swarm.submit_task(TaskSpec::new(TaskType::Coding, "late")).is_err());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_force_cancels_stragglers() -> anyhow::Result<()> {
    let executor = ScriptedExecutor::new();
    executor.script("stuck", [Step::Block]);
    let swarm = started(quiet_config(), executor.clone()).await?;
    swarm.register_agent(AgentSpec::new(AgentType::Developer))?;

    let stuck = swarm.submit_task(TaskSpec::new(TaskType::Coding, "stuck"))?;
    let pending = swarm.submit_task(TaskSpec::new(TaskType::Coding, "pending").depends_on(stuck))?;
    wait_for_status(&swarm, stuck, TaskStatus::Running).await?;

    let began = Instant::now();
    swarm.shutdown().await?;
    assert!(began.elapsed() >= swarm.config().performance.shutdown_grace_period);

    assert_eq!(status_of(&swarm, &stuck), Some(TaskStatus::Cancelled));
    assert_eq!(status_of(&swarm, &pending), Some(TaskStatus::Cancelled));
    assert_eq!(executor.cancels(), vec![stuck]);
    let definition = swarm.get_task(&stuck).expect("task");
    assert_eq!(definition.attempts[0].status, AttemptStatus::Cancelled);
    assert_eq!(swarm.metrics().cancelled_tasks, 2);
    Ok(())
}

#[tokio::test]
async fn test_restart_restores_tasks_and_retries_interrupted_work() -> anyhow::Result<()> {
    let persistence = Arc::new(InMemoryStatePersistence::new());
    let executor = ScriptedExecutor::new();
    executor.script("interrupted", [Step::Block]);
    let first = SwarmCoordinator::builder(quiet_config())
        .with_executor(executor.clone())
        .with_persistence(persistence.clone())
        .build()?;
    first.initialize().await?;
    first.register_agent(AgentSpec::new(AgentType::Developer))?;

    let done = first.submit_task(TaskSpec::new(TaskType::Research, "done"))?;
    wait_for_status(&first, done, TaskStatus::Completed).await?;
    let interrupted = first.submit_task(TaskSpec::new(TaskType::Coding, "interrupted"))?;
    wait_for_status(&first, interrupted, TaskStatus::Running).await?;
    let follow_up = first.submit_task(TaskSpec::new(TaskType::Testing, "follow-up").depends_on(interrupted))?;

    // Simulate a crash: the snapshot is taken mid-flight.
    persistence.save_state(&first.snapshot()).await?;
    first.fail_swarm("simulated crash").await;

    let second = SwarmCoordinator::builder(quiet_config())
        .with_swarm_id(first.swarm_id())
        .with_executor(ScriptedExecutor::new())
        .with_persistence(persistence.clone())
        .build()?;
    second.initialize().await?;

    assert_eq!(second.list_tasks().len(), 3);
    assert_eq!(status_of(&second, &done), Some(TaskStatus::Completed));
    let restored = second.get_task(&interrupted).expect("restored task");
    assert_eq!(restored.status(), TaskStatus::Retrying);
    assert_eq!(restored.attempts.last().map(|a| a.status), Some(AttemptStatus::Failed));
    assert!(restored.assigned_to.is_none());
    assert_eq!(status_of(&second, &follow_up), Some(TaskStatus::Queued));
    assert!(second.list_agents().is_empty());
    assert_eq!(second.metrics().completed_tasks, 1);

    second.register_agent(AgentSpec::new(AgentType::Developer))?;
    wait_for_status(&second, follow_up, TaskStatus::Completed).await?;
    assert_eq!(second.get_task(&interrupted).expect("task").attempts.len(), 2);

    let fresh = second.submit_task(TaskSpec::new(TaskType::Review, "fresh"))?;
    assert!(fresh.sequence > follow_up.sequence);
    second.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_fail_swarm_cancels_open_work() -> anyhow::Result<()> {
    let executor = ScriptedExecutor::new();
    executor.script("long", [Step::Block]);
    let swarm = started(quiet_config(), executor.clone()).await?;
    swarm.register_agent(AgentSpec::new(AgentType::Developer))?;
    let long = swarm.submit_task(TaskSpec::new(TaskType::Coding, "long"))?;
    wait_for_status(&swarm, long, TaskStatus::Running).await?;

    swarm.fail_swarm("operator abort").await;
    assert_eq!(swarm.status(), SwarmStatus::Failed);
    assert_eq!(status_of(&swarm, &long), Some(TaskStatus::Cancelled));
    assert_eq!(executor.cancels(), vec![long]);
    eventually("the executor call to unwind", || executor.active() == 0).await?;

    match &swarm.events_of(SwarmEventType::SwarmFailed)[..] {
        [event] => match &event.payload {
            SwarmEventPayload::SwarmFailed { reason, .. } => assert_eq!(reason, "operator abort"),
            other => panic!("unexpected payload {other:?}"),
        },
        events => panic!("expected one swarm.failed event, got {}", events.len()),
    }
    assert!(swarm.register_agent(AgentSpec::new(AgentType::Tester)).is_err());
    Ok(())
}

#[tokio::test]
async fn test_swarm_fails_after_max_duration() -> anyhow::Result<()> {
    let mut config = quiet_config();
    config.max_duration = Duration::from_secs(5);
    let swarm = started(config, ScriptedExecutor::new()).await?;
    let queued = swarm.submit_task(TaskSpec::new(TaskType::Coding, "never-runs"))?;

    assert_eq!(swarm.run_health_check_at(Instant::now() + Duration::from_secs(4)).await, 0);
    assert_eq!(swarm.status(), SwarmStatus::Executing);

    swarm.run_health_check_at(Instant::now() + Duration::from_secs(6)).await;
    assert_eq!(swarm.status(), SwarmStatus::Failed);
    assert_eq!(status_of(&swarm, &queued), Some(TaskStatus::Cancelled));
    Ok(())
}

#[tokio::test]
async fn test_metrics_pass_reports_counts_and_rates() -> anyhow::Result<()> {
    let executor = ScriptedExecutor::new();
    executor.script(
        "broken",
        [Step::Fail(hivemind_core::domain::executor::TaskExecutionError::permanent("nope"))],
    );
    let swarm = started(quiet_config(), executor.clone()).await?;
    swarm.register_agent(AgentSpec::new(AgentType::Developer))?;
    swarm.register_agent(AgentSpec::new(AgentType::Tester))?;

    let ok = swarm.submit_task(TaskSpec::new(TaskType::Coding, "ok"))?;
    let broken = swarm.submit_task(TaskSpec::new(TaskType::Coding, "broken"))?;
    wait_for_status(&swarm, ok, TaskStatus::Completed).await?;
    wait_for_status(&swarm, broken, TaskStatus::Failed).await?;

    let metrics = swarm.collect_metrics();
    assert_eq!(metrics.total_agents, 2);
    assert_eq!(metrics.idle_agents, 2);
    assert_eq!(metrics.total_tasks, 2);
    assert_eq!((metrics.completed_tasks, metrics.failed_tasks), (1, 1));
    assert!((metrics.success_rate - 0.5).abs() < 1e-9);
    assert_eq!(metrics.agent_utilization, 0.0);

    let events = swarm.events_of(SwarmEventType::SwarmMetrics);
    assert_eq!(events.len(), 1);
    assert!(!events[0].broadcast);
    Ok(())
}
