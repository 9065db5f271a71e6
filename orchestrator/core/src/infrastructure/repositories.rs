// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::domain::repository::{RepositoryError, StatePersistence, SwarmSnapshot};

/// Keeps the last saved snapshot as JSON in memory, so a save/load cycle goes
/// through the same serialization a durable backend would.
#[derive(Clone, Default)]
pub struct InMemoryStatePersistence {
    snapshot: Arc<RwLock<Option<String>>>,
}

impl InMemoryStatePersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot.read().is_some()
    }

    pub fn clear(&self) {
        *self.snapshot.write() = None;
    }
}

#[async_trait]
impl StatePersistence for InMemoryStatePersistence {
    async fn save_state(&self, snapshot: &SwarmSnapshot) -> Result<(), RepositoryError> {
        let encoded = serde_json::to_string(snapshot)?;
        *self.snapshot.write() = Some(encoded);
        Ok(())
    }

    async fn load_state(&self) -> Result<Option<SwarmSnapshot>, RepositoryError> {
        let guard = self.snapshot.read();
        match guard.as_deref() {
            Some(encoded) => Ok(Some(serde_json::from_str(encoded)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{AgentCapabilities, AgentId, AgentState, AgentType};
    use crate::domain::swarm::{SwarmId, SwarmStatus};
    use crate::domain::task::{TaskDefinition, TaskId, TaskPriority, TaskSpec, TaskType};
    use chrono::Utc;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_save_and_load() {
        let store = InMemoryStatePersistence::new();
        assert!(store.load_state().await.unwrap().is_none());

        let swarm_id = SwarmId::new();
        let agent_id = AgentId::new(AgentType::Tester, 1);
        let task_id = TaskId::new(swarm_id, 1, TaskPriority::High);
        let snapshot = SwarmSnapshot {
            swarm_id,
            name: "persisted".into(),
            status: SwarmStatus::Completed,
            agents: vec![AgentState::new(
                agent_id,
                "tester-1",
                AgentCapabilities::for_type(AgentType::Tester),
                0,
            )],
            tasks: vec![TaskDefinition::new(
                task_id,
                TaskSpec::new(TaskType::Testing, "suite"),
            )],
            objectives: Vec::new(),
            next_task_sequence: 2,
            next_agent_sequence: 1,
            agent_instances: HashMap::from([(AgentType::Tester, 1)]),
            taken_at: Utc::now(),
        };

        store.save_state(&snapshot).await.unwrap();
        assert!(store.has_snapshot());

        let loaded = store.load_state().await.unwrap().unwrap();
        assert_eq!(loaded.swarm_id, swarm_id);
        assert_eq!(loaded.tasks[0].id, task_id);
        assert_eq!(loaded.agents[0].id, agent_id);
        assert_eq!(loaded.agent_instances.get(&AgentType::Tester), Some(&1));

        store.clear();
        assert!(store.load_state().await.unwrap().is_none());
    }
}
