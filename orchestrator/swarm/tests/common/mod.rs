// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use hivemind_core::domain::agent::{AgentId, AgentState};
use hivemind_core::domain::config::SwarmConfig;
use hivemind_core::domain::events::{SwarmEvent, SwarmEventType};
use hivemind_core::domain::executor::{TaskExecutionError, TaskExecutor};
use hivemind_core::domain::task::{TaskDefinition, TaskId, TaskResult, TaskStatus};
use hivemind_swarm::SwarmCoordinator;

/// What the executor does for one call.
#[derive(Debug, Clone)]
pub enum Step {
    Succeed(f64),
    Fail(TaskExecutionError),
    /// Park until the attempt is cancelled or reported out of band.
    Block,
    Delay(Duration),
}

#[derive(Debug, Clone)]
pub struct Call {
    pub task_id: TaskId,
    pub task_name: String,
    pub agent_id: AgentId,
}

/// Executor driven by per-task-name scripts. Unscripted calls succeed with
/// quality 0.9.
#[derive(Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<Call>>,
    cancels: Mutex<Vec<TaskId>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, task_name: &str, steps: impl IntoIterator<Item = Step>) {
        self.scripts
            .lock()
            .entry(task_name.to_string())
            .or_default()
            .extend(steps);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, task_name: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.task_name == task_name)
            .count()
    }

    pub fn cancels(&self) -> Vec<TaskId> {
        self.cancels.lock().clone()
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn next_step(&self, task_name: &str) -> Step {
        self.scripts
            .lock()
            .get_mut(task_name)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Step::Succeed(0.9))
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        task: &TaskDefinition,
        agent: &AgentState,
        cancel: CancellationToken,
    ) -> Result<TaskResult, TaskExecutionError> {
        self.calls.lock().push(Call {
            task_id: task.id,
            task_name: task.name.clone(),
            agent_id: agent.id,
        });
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        match self.next_step(&task.name) {
            Step::Succeed(quality) => Ok(TaskResult::new(
                serde_json::json!({ "task": task.name }),
                quality,
            )),
            Step::Fail(error) => Err(error),
            Step::Block => {
                cancel.cancelled().await;
                Err(TaskExecutionError::cancelled("cancelled by coordinator"))
            }
            Step::Delay(delay) => {
                tokio::select! {
                    _ = cancel.cancelled() => Err(TaskExecutionError::cancelled("cancelled by coordinator")),
                    _ = tokio::time::sleep(delay) => Ok(TaskResult::new(serde_json::Value::Null, 0.9)),
                }
            }
        }
    }

    async fn cancel(&self, task_id: &TaskId) -> Result<(), TaskExecutionError> {
        self.cancels.lock().push(*task_id);
        Ok(())
    }
}

/// Defaults with every background timer pushed far out, so tests drive the
/// monitor passes explicitly.
pub fn quiet_config() -> SwarmConfig {
    let mut config = SwarmConfig::default();
    config.name = "test-swarm".to_string();
    config.max_duration = Duration::from_secs(24 * 60 * 60);
    config.monitoring.heartbeat_interval = Duration::from_secs(60 * 60);
    config.monitoring.metrics_interval = Duration::from_secs(60 * 60);
    config.monitoring.health_check_interval = Duration::from_secs(60 * 60);
    config.work_stealing.interval = Duration::from_secs(60 * 60);
    config.performance.default_timeout = Duration::from_secs(60);
    config.performance.shutdown_grace_period = Duration::from_millis(200);
    config
}

pub async fn started(
    config: SwarmConfig,
    executor: Arc<ScriptedExecutor>,
) -> anyhow::Result<SwarmCoordinator> {
    let coordinator = SwarmCoordinator::new(config, executor)?;
    coordinator.initialize().await?;
    Ok(coordinator)
}

/// Poll `condition` until it holds. Under a paused clock the deadline is
/// virtual, so it also covers multi-second backoffs.
pub async fn eventually(what: &str, mut condition: impl FnMut() -> bool) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    Ok(())
}

pub async fn wait_for_status(
    coordinator: &SwarmCoordinator,
    task_id: TaskId,
    status: TaskStatus,
) -> anyhow::Result<()> {
    eventually(&format!("task {task_id} to be {status}"), || {
        coordinator
            .get_task(&task_id)
            .is_some_and(|task| task.status() == status)
    })
    .await
}

pub fn status_of(coordinator: &SwarmCoordinator, task_id: &TaskId) -> Option<TaskStatus> {
    coordinator.get_task(task_id).map(|task| task.status())
}

pub fn events_for(
    coordinator: &SwarmCoordinator,
    event_type: SwarmEventType,
    task_id: TaskId,
) -> Vec<SwarmEvent> {
    coordinator
        .events_of(event_type)
        .into_iter()
        .filter(|event| event.payload.task_id() == Some(task_id))
        .collect()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
