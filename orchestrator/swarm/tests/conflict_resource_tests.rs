// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

mod common;

use serde_json::json;

use hivemind_core::domain::agent::{AgentId, AgentType};
use hivemind_core::domain::config::ConflictStrategy;
use hivemind_core::domain::events::{SwarmEventPayload, SwarmEventType};
use hivemind_core::domain::task::{TaskPriority, TaskSpec, TaskType};
use hivemind_swarm::domain::conflict::{Ballot, ConflictError};
use hivemind_swarm::{AgentSpec, SwarmError};

use common::{quiet_config, started, ScriptedExecutor};

#[tokio::test]
async fn test_priority_conflict_awards_highest_priority_claim() -> anyhow::Result<()> {
    let swarm = started(quiet_config(), ScriptedExecutor::new()).await?;
    let low = swarm.register_agent(AgentSpec::new(AgentType::Developer).with_name("low"))?;
    let high = swarm.register_agent(AgentSpec::new(AgentType::Developer).with_name("high"))?;
    let urgent = swarm.create_task(
        TaskSpec::new(TaskType::Coding, "hotfix").with_priority(TaskPriority::High),
    )?;

    swarm.claim_resource("src/auth.rs", low, None)?;
    swarm.claim_resource("src/auth.rs", high, Some(urgent))?;
    let resolution = swarm.resolve_conflict("src/auth.rs", &[])?;

    assert_eq!(resolution.strategy, ConflictStrategy::Priority);
    assert_eq!(resolution.winner.agent_id, high);
    assert_eq!(resolution.winner.task_id, Some(urgent));
    assert_eq!(resolution.requeued.len(), 1);
    assert_eq!(resolution.requeued[0].agent_id, low);
    assert_eq!(swarm.resource_holder("src/auth.rs").map(|c| c.agent_id), Some(high));

    match &swarm.events_of(SwarmEventType::ConflictResolved)[..] {
        [event] => match &event.payload {
            SwarmEventPayload::ConflictResolved { resource, winner, requeued, .. } => {
                assert_eq!(resource, "src/auth.rs");
                assert_eq!(*winner, high);
                assert_eq!(requeued, &vec![low]);
            }
            other => panic!("unexpected payload {other:?}"),
        },
        events => panic!("expected one conflict.resolved event, got {}", events.len()),
    }

    // The requeued claim wins the next round once the holder lets go.
    assert!(swarm.release_resource("src/auth.rs", high));
    let next = swarm.resolve_conflict("src/auth.rs", &[])?;
    assert_eq!(next.winner.agent_id, low);
    assert!(next.requeued.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_held_resource_is_not_reawarded_until_released() -> anyhow::Result<()> {
    let mut config = quiet_config();
    config.conflict.strategy = ConflictStrategy::Timestamp;
    let swarm = started(config, ScriptedExecutor::new()).await?;
    let first = swarm.register_agent(AgentSpec::new(AgentType::Developer))?;
    let second = swarm.register_agent(AgentSpec::new(AgentType::Developer))?;

    swarm.claim_resource("r", first, None)?;
    swarm.claim_resource("r", second, None)?;
    assert_eq!(swarm.resolve_conflict("r", &[])?.winner.agent_id, first);

    match swarm.resolve_conflict("r", &[]) {
        Err(SwarmError::Conflict(ConflictError::Held { resource, holder })) => {
            assert_eq!(resource, "r");
            assert_eq!(holder, first);
        }
        other => panic!("expected the resource to be held, got {other:?}"),
    }
    assert!(swarm.resolve_conflicts(&[]).is_empty());
    assert_eq!(swarm.resource_holder("r").map(|c| c.agent_id), Some(first));
    assert_eq!(swarm.events_of(SwarmEventType::ConflictResolved).len(), 1);

    assert!(!swarm.release_resource("r", second));
    assert!(swarm.release_resource("r", first));
    let next = swarm.resolve_conflicts(&[]);
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].winner.agent_id, second);
    assert_eq!(swarm.resource_holder("r").map(|c| c.agent_id), Some(second));
    Ok(())
}

#[tokio::test]
async fn test_claims_are_validated_and_empty_resources_cannot_be_resolved() -> anyhow::Result<()> {
    let swarm = started(quiet_config(), ScriptedExecutor::new()).await?;
    let agent = swarm.register_agent(AgentSpec::new(AgentType::Developer))?;

    assert!(matches!(
        swarm.claim_resource("db", AgentId::new(AgentType::Tester, 99), None),
        Err(SwarmError::AgentNotFound(_))
    ));
    assert!(matches!(
        swarm.resolve_conflict("db", &[]),
        Err(SwarmError::Conflict(ConflictError::NoClaims { .. }))
    ));

    swarm.claim_resource("db", agent, None)?;
    assert_eq!(swarm.resolve_conflicts(&[]).len(), 1);
    assert!(swarm.resolve_conflicts(&[]).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_voting_needs_quorum_of_configured_arbiters() -> anyhow::Result<()> {
    let mut config = quiet_config();
    config.conflict.strategy = ConflictStrategy::Voting;
    config.conflict.arbiters = vec!["alice".into(), "bob".into(), "carol".into()];
    config.conflict.quorum = 0.6;
    let swarm = started(config, ScriptedExecutor::new()).await?;
    let first = swarm.register_agent(AgentSpec::new(AgentType::Developer).with_name("first"))?;
    let second = swarm.register_agent(AgentSpec::new(AgentType::Developer).with_name("second"))?;

    swarm.claim_resource("deploy-lock", first, None)?;
    swarm.claim_resource("deploy-lock", second, None)?;

    let ballot = |voter: &str, candidate| Ballot {
        voter: voter.to_string(),
        candidate,
    };
    // Outsiders and repeat ballots do not count.
    let weak = [
        ballot("alice", second),
        ballot("alice", second),
        ballot("mallory", second),
    ];
    match swarm.resolve_conflict("deploy-lock", &weak) {
        Err(SwarmError::Conflict(ConflictError::NoQuorum { votes, required, .. })) => {
            assert_eq!(votes, 1);
            assert_eq!(required, 2);
        }
        other => panic!("expected no quorum, got {other:?}"),
    }
    assert!(swarm.resource_holder("deploy-lock").is_none());
    assert!(swarm.resolve_conflicts(&weak).is_empty());

    let strong = [ballot("alice", second), ballot("carol", second), ballot("bob", first)];
    let resolution = swarm.resolve_conflict("deploy-lock", &strong)?;
    assert_eq!(resolution.winner.agent_id, second);
    assert_eq!(resolution.requeued[0].agent_id, first);
    Ok(())
}

#[tokio::test]
async fn test_voting_falls_back_to_registered_agents_as_arbiters() -> anyhow::Result<()> {
    let mut config = quiet_config();
    config.conflict.strategy = ConflictStrategy::Voting;
    let swarm = started(config, ScriptedExecutor::new()).await?;
    let a = swarm.register_agent(AgentSpec::new(AgentType::Developer).with_name("a"))?;
    let b = swarm.register_agent(AgentSpec::new(AgentType::Reviewer).with_name("b"))?;

    swarm.claim_resource("schema", a, None)?;
    swarm.claim_resource("schema", b, None)?;
    let resolution = swarm.resolve_conflict(
        "schema",
        &[Ballot {
            voter: "b".into(),
            candidate: a,
        }],
    )?;
    assert_eq!(resolution.winner.agent_id, a);
    Ok(())
}

#[tokio::test]
async fn test_stale_write_is_rejected_with_versions() -> anyhow::Result<()> {
    let swarm = started(quiet_config(), ScriptedExecutor::new()).await?;

    assert_eq!(swarm.write_resource("plan", json!({"steps": 1}), 0, "a")?, 1);
    assert!(matches!(
        swarm.write_resource("plan", json!({"steps": 9}), 0, "b"),
        Err(SwarmError::Conflict(ConflictError::VersionMismatch { expected: 0, actual: 1, .. }))
    ));
    assert_eq!(swarm.write_resource("plan", json!({"steps": 2}), 1, "b")?, 2);

    let stored = swarm.read_resource("plan").expect("stored value");
    assert_eq!(stored.version, 2);
    assert_eq!(stored.value, json!({"steps": 2}));
    assert_eq!(stored.updated_by, "b");
    Ok(())
}

#[tokio::test]
async fn test_update_retries_after_interleaved_write() -> anyhow::Result<()> {
    let swarm = started(quiet_config(), ScriptedExecutor::new()).await?;
    swarm.write_resource("counter", json!(10), 0, "seed")?;

    let mut calls = 0;
    let updated = swarm.update_resource("counter", "incrementer", |current| {
        calls += 1;
        if calls == 1 {
            // Another writer sneaks in between our read and our write.
            let _ = swarm.write_resource("counter", json!(100), 1, "intruder");
        }
        json!(current.and_then(|v| v.as_u64()).unwrap_or(0) + 1)
    })?;

    assert_eq!(calls, 2);
    assert_eq!(updated.value, json!(101));
    assert_eq!(updated.version, 3);
    assert_eq!(updated.updated_by, "incrementer");

    let created = swarm.update_resource("fresh", "incrementer", |current| {
        assert!(current.is_none());
        json!(1)
    })?;
    assert_eq!(created.version, 1);
    Ok(())
}
