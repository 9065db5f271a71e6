// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Conflict Resolution
//!
//! Two mechanisms keep shared state consistent when several agents want the
//! same thing:
//!
//! - [`ConflictResolver`] arbitrates competing **claims** on a task or
//!   resource. Exactly one claim wins per round; the others stay pending and
//!   are considered again in the next round.
//! - [`OptimisticLockManager`] stamps every shared value with a version.
//!   Writers present the version they read; a stale version is rejected with
//!   [`ConflictError::VersionMismatch`] instead of silently overwriting.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

use hivemind_core::domain::agent::AgentId;
use hivemind_core::domain::config::{ConflictConfig, ConflictStrategy};
use hivemind_core::domain::task::{TaskId, TaskPriority};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConflictError {
    #[error("no pending claims for {resource}")]
    NoClaims { resource: String },

    #[error("{resource} is still held by {holder}")]
    Held { resource: String, holder: AgentId },

    #[error("no quorum for {resource}: best candidate has {votes} of {required} required votes")]
    NoQuorum {
        resource: String,
        votes: usize,
        required: usize,
    },

    #[error("version mismatch on {resource}: expected {expected}, found {actual}")]
    VersionMismatch {
        resource: String,
        expected: u64,
        actual: u64,
    },

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    #[error("gave up updating {resource} after {attempts} conflicting attempts")]
    RetriesExhausted { resource: String, attempts: u32 },
}

// ============================================================================
// Claims
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceClaim {
    pub resource: String,
    pub agent_id: AgentId,
    pub task_id: Option<TaskId>,
    pub priority: TaskPriority,
    pub claimed_at: DateTime<Utc>,
    /// Arrival order, assigned by the resolver.
    #[serde(default)]
    pub sequence: u64,
}

impl ResourceClaim {
    pub fn new(resource: impl Into<String>, agent_id: AgentId, priority: TaskPriority) -> Self {
        Self {
            resource: resource.into(),
            agent_id,
            task_id: None,
            priority,
            claimed_at: Utc::now(),
            sequence: 0,
        }
    }

    pub fn for_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }
}

/// A vote cast by an arbiter for one of the claiming agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub voter: String,
    pub candidate: AgentId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictResolution {
    pub resource: String,
    pub strategy: ConflictStrategy,
    pub winner: ResourceClaim,
    /// Losing claims, still pending for the next round.
    pub requeued: Vec<ResourceClaim>,
}

pub struct ConflictResolver {
    config: ConflictConfig,
    pending: BTreeMap<String, Vec<ResourceClaim>>,
    holders: HashMap<String, ResourceClaim>,
    next_sequence: u64,
}

impl ConflictResolver {
    pub fn new(config: ConflictConfig) -> Self {
        Self {
            config,
            pending: BTreeMap::new(),
            holders: HashMap::new(),
            next_sequence: 0,
        }
    }

    pub fn strategy(&self) -> ConflictStrategy {
        self.config.strategy
    }

    /// Configured arbiter names; empty means the caller decides who votes.
    pub fn arbiters(&self) -> &[String] {
        &self.config.arbiters
    }

    pub fn claim(&mut self, mut claim: ResourceClaim) {
        claim.sequence = self.next_sequence;
        self.next_sequence += 1;
        self.pending.entry(claim.resource.clone()).or_default().push(claim);
    }

    pub fn pending_claims(&self, resource: &str) -> &[ResourceClaim] {
        self.pending.get(resource).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Resources with at least one pending claim and no current holder, in
    /// name order.
    pub fn contested_resources(&self) -> Vec<String> {
        self.pending
            .keys()
            .filter(|resource| !self.holders.contains_key(*resource))
            .cloned()
            .collect()
    }

    pub fn holder(&self, resource: &str) -> Option<&ResourceClaim> {
        self.holders.get(resource)
    }

    pub fn release(&mut self, resource: &str, agent_id: AgentId) -> bool {
        match self.holders.get(resource) {
            Some(holder) if holder.agent_id == agent_id => {
                self.holders.remove(resource);
                true
            }
            _ => false,
        }
    }

    /// Drop every pending claim and holding of an agent.
    pub fn forget_agent(&mut self, agent_id: AgentId) {
        for claims in self.pending.values_mut() {
            claims.retain(|claim| claim.agent_id != agent_id);
        }
        self.pending.retain(|_, claims| !claims.is_empty());
        self.holders.retain(|_, claim| claim.agent_id != agent_id);
    }

    /// Pick one winner among the pending claims on `resource`.
    ///
    /// `ballots` and `arbiters` are only consulted by the voting strategy. A
    /// failed vote leaves every claim pending, and so does a resource whose
    /// holder has not released it yet.
    pub fn resolve(
        &mut self,
        resource: &str,
        ballots: &[Ballot],
        arbiters: &[String],
    ) -> Result<ConflictResolution, ConflictError> {
        if let Some(holder) = self.holders.get(resource) {
            return Err(ConflictError::Held {
                resource: resource.to_string(),
                holder: holder.agent_id,
            });
        }
        let claims = self.pending_claims(resource);
        if claims.is_empty() {
            return Err(ConflictError::NoClaims {
                resource: resource.to_string(),
            });
        }

        let winner_index = match self.config.strategy {
            ConflictStrategy::Priority => by_priority(claims),
            ConflictStrategy::Timestamp => by_timestamp(claims),
            ConflictStrategy::Voting => {
                by_vote(resource, claims, ballots, arbiters, self.config.quorum)?
            }
        };

        let mut claims = self.pending.remove(resource).unwrap_or_default();
        let winner = claims.remove(winner_index);
        if !claims.is_empty() {
            self.pending.insert(resource.to_string(), claims.clone());
        }
        self.holders.insert(resource.to_string(), winner.clone());

        debug!(
            resource,
            winner = %winner.agent_id,
            requeued = claims.len(),
            "Conflict resolved"
        );

        Ok(ConflictResolution {
            resource: resource.to_string(),
            strategy: self.config.strategy,
            winner,
            requeued: claims,
        })
    }
}

fn by_priority(claims: &[ResourceClaim]) -> usize {
    claims
        .iter()
        .enumerate()
        .max_by_key(|(_, c)| (c.priority, Reverse(c.claimed_at), Reverse(c.sequence)))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn by_timestamp(claims: &[ResourceClaim]) -> usize {
    claims
        .iter()
        .enumerate()
        .min_by_key(|(_, c)| (c.claimed_at, Reverse(c.priority), c.sequence))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn by_vote(
    resource: &str,
    claims: &[ResourceClaim],
    ballots: &[Ballot],
    arbiters: &[String],
    quorum: f64,
) -> Result<usize, ConflictError> {
    let eligible: HashSet<&str> = arbiters.iter().map(String::as_str).collect();
    let mut voted = HashSet::new();
    let mut tally: HashMap<AgentId, usize> = HashMap::new();
    for ballot in ballots {
        if !eligible.contains(ballot.voter.as_str()) || !voted.insert(ballot.voter.as_str()) {
            continue;
        }
        if claims.iter().any(|c| c.agent_id == ballot.candidate) {
            *tally.entry(ballot.candidate).or_default() += 1;
        }
    }

    let required = ((eligible.len() as f64) * quorum).ceil().max(1.0) as usize;
    let best = claims
        .iter()
        .enumerate()
        .max_by_key(|(_, c)| (tally.get(&c.agent_id).copied().unwrap_or(0), Reverse(c.sequence)));

    match best {
        Some((index, claim)) => {
            let votes = tally.get(&claim.agent_id).copied().unwrap_or(0);
            if votes >= required {
                Ok(index)
            } else {
                Err(ConflictError::NoQuorum {
                    resource: resource.to_string(),
                    votes,
                    required,
                })
            }
        }
        None => Err(ConflictError::NoClaims {
            resource: resource.to_string(),
        }),
    }
}

// ============================================================================
// Optimistic locking
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Versioned<T> {
    pub value: T,
    /// Starts at 1 on creation; 0 means "does not exist yet".
    pub version: u64,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

pub const DEFAULT_UPDATE_RETRIES: u32 = 5;

pub struct OptimisticLockManager<T = serde_json::Value> {
    entries: RwLock<HashMap<String, Versioned<T>>>,
    max_retries: u32,
}

impl<T: Clone> Default for OptimisticLockManager<T> {
    fn default() -> Self {
        Self::new(DEFAULT_UPDATE_RETRIES)
    }
}

impl<T: Clone> OptimisticLockManager<T> {
    pub fn new(max_retries: u32) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_retries: max_retries.max(1),
        }
    }

    pub fn read(&self, resource: &str) -> Option<Versioned<T>> {
        self.entries.read().get(resource).cloned()
    }

    pub fn version(&self, resource: &str) -> u64 {
        self.entries
            .read()
            .get(resource)
            .map(|entry| entry.version)
            .unwrap_or(0)
    }

    /// Write `value` if the stored version still equals `expected_version`.
    /// Version 0 creates a resource that must not exist yet.
    pub fn write(
        &self,
        resource: &str,
        value: T,
        expected_version: u64,
        updated_by: &str,
    ) -> Result<u64, ConflictError> {
        let mut entries = self.entries.write();
        let actual = entries.get(resource).map(|e| e.version).unwrap_or(0);
        if actual != expected_version {
            return Err(ConflictError::VersionMismatch {
                resource: resource.to_string(),
                expected: expected_version,
                actual,
            });
        }
        let version = actual + 1;
        entries.insert(
            resource.to_string(),
            Versioned {
                value,
                version,
                updated_at: Utc::now(),
                updated_by: updated_by.to_string(),
            },
        );
        Ok(version)
    }

    pub fn create(&self, resource: &str, value: T, created_by: &str) -> Result<u64, ConflictError> {
        self.write(resource, value, 0, created_by).map_err(|err| match err {
            ConflictError::VersionMismatch { resource, .. } => ConflictError::AlreadyExists(resource),
            other => other,
        })
    }

    /// Bounded read-modify-write loop. `update` may run more than once.
    pub fn update_with<F>(
        &self,
        resource: &str,
        updated_by: &str,
        mut update: F,
    ) -> Result<Versioned<T>, ConflictError>
    where
        F: FnMut(Option<&T>) -> T,
    {
        for attempt in 1..=self.max_retries {
            let current = self.read(resource);
            let expected = current.as_ref().map(|c| c.version).unwrap_or(0);
            let next = update(current.as_ref().map(|c| &c.value));
            match self.write(resource, next, expected, updated_by) {
                Ok(_) => {
                    return self
                        .read(resource)
                        .ok_or_else(|| ConflictError::ResourceNotFound(resource.to_string()));
                }
                Err(ConflictError::VersionMismatch { .. }) => {
                    debug!(resource, attempt, "Optimistic update conflicted, retrying");
                }
                Err(other) => return Err(other),
            }
        }
        Err(ConflictError::RetriesExhausted {
            resource: resource.to_string(),
            attempts: self.max_retries,
        })
    }

    pub fn remove(&self, resource: &str, expected_version: u64) -> Result<T, ConflictError> {
        let mut entries = self.entries.write();
        let actual = match entries.get(resource) {
            Some(entry) => entry.version,
            None => return Err(ConflictError::ResourceNotFound(resource.to_string())),
        };
        if actual != expected_version {
            return Err(ConflictError::VersionMismatch {
                resource: resource.to_string(),
                expected: expected_version,
                actual,
            });
        }
        entries
            .remove(resource)
            .map(|entry| entry.value)
            .ok_or_else(|| ConflictError::ResourceNotFound(resource.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use hivemind_core::domain::agent::AgentType;
    use serde_json::json;
    use std::sync::Arc;

    fn resolver(strategy: ConflictStrategy) -> ConflictResolver {
        ConflictResolver::new(ConflictConfig {
            strategy,
            arbiters: Vec::new(),
            quorum: 0.5,
        })
    }

    fn agent(n: u32) -> AgentId {
        AgentId::new(AgentType::Developer, n)
    }

    #[test]
    fn test_priority_wins_and_losers_requeue() {
        let mut resolver = resolver(ConflictStrategy::Priority);
        let now = Utc::now();
        let (a, b, c) = (agent(1), agent(2), agent(3));
        for (id, priority, offset) in [
            (a, TaskPriority::Normal, 0),
            (b, TaskPriority::Critical, 5),
            (c, TaskPriority::Critical, 10),
        ] {
            let mut claim = ResourceClaim::new("repo", id, priority);
            claim.claimed_at = now + ChronoDuration::seconds(offset);
            resolver.claim(claim);
        }

        let round1 = resolver.resolve("repo", &[], &[]).unwrap();
        assert_eq!(round1.winner.agent_id, b);
        assert_eq!(round1.requeued.len(), 2);
        assert_eq!(resolver.holder("repo").map(|h| h.agent_id), Some(b));

        assert!(resolver.release("repo", b));
        let round2 = resolver.resolve("repo", &[], &[]).unwrap();
        assert_eq!(round2.winner.agent_id, c);
        assert_eq!(resolver.pending_claims("repo").len(), 1);
    }

    #[test]
    fn test_timestamp_earliest_wins() {
        let mut resolver = resolver(ConflictStrategy::Timestamp);
        let now = Utc::now();
        let (first, second) = (agent(1), agent(2));
        let mut late = ResourceClaim::new("db", first, TaskPriority::Critical);
        late.claimed_at = now + ChronoDuration::seconds(3);
        let mut early = ResourceClaim::new("db", second, TaskPriority::Low);
        early.claimed_at = now;
        resolver.claim(late);
        resolver.claim(early);

        let resolution = resolver.resolve("db", &[], &[]).unwrap();
        assert_eq!(resolution.winner.agent_id, second);
        assert_eq!(resolution.requeued[0].agent_id, first);
    }

    #[test]
    fn test_voting_requires_quorum() {
        let mut resolver = resolver(ConflictStrategy::Voting);
        let (a, b) = (agent(1), agent(2));
        resolver.claim(ResourceClaim::new("lock", a, TaskPriority::Normal));
        resolver.claim(ResourceClaim::new("lock", b, TaskPriority::Normal));

        let arbiters: Vec<String> = ["r1", "r2", "r3", "r4"].iter().map(|s| s.to_string()).collect();
        let ballot = |voter: &str, candidate| Ballot {
            voter: voter.into(),
            candidate,
        };

        let thin = vec![ballot("r1", b), ballot("r1", b), ballot("outsider", b)];
        let err = resolver.resolve("lock", &thin, &arbiters).unwrap_err();
        assert_eq!(
            err,
            ConflictError::NoQuorum {
                resource: "lock".into(),
                votes: 1,
                required: 2
            }
        );
        assert_eq!(resolver.pending_claims("lock").len(), 2);

        let enough = vec![ballot("r1", b), ballot("r2", b), ballot("r3", a)];
        let resolution = resolver.resolve("lock", &enough, &arbiters).unwrap();
        assert_eq!(resolution.winner.agent_id, b);
        assert_eq!(resolution.requeued[0].agent_id, a);
    }

    #[test]
    fn test_held_resource_is_not_reawarded() {
        let mut resolver = resolver(ConflictStrategy::Timestamp);
        let (a, b) = (agent(1), agent(2));
        resolver.claim(ResourceClaim::new("r", a, TaskPriority::Normal));
        resolver.claim(ResourceClaim::new("r", b, TaskPriority::Normal));
        assert_eq!(resolver.resolve("r", &[], &[]).unwrap().winner.agent_id, a);
        assert!(resolver.contested_resources().is_empty());

        assert_eq!(
            resolver.resolve("r", &[], &[]).unwrap_err(),
            ConflictError::Held {
                resource: "r".into(),
                holder: a
            }
        );
        assert_eq!(resolver.holder("r").map(|h| h.agent_id), Some(a));
        assert_eq!(resolver.pending_claims("r").len(), 1);

        assert!(!resolver.release("r", b));
        assert!(resolver.release("r", a));
        assert_eq!(resolver.contested_resources(), vec!["r".to_string()]);
        assert_eq!(resolver.resolve("r", &[], &[]).unwrap().winner.agent_id, b);
    }

    #[test]
    fn test_no_claims() {
        let mut resolver = resolver(ConflictStrategy::Priority);
        assert!(matches!(
            resolver.resolve("nothing", &[], &[]),
            Err(ConflictError::NoClaims { .. })
        ));
    }

    #[test]
    fn test_version_mismatch() {
        let locks: OptimisticLockManager = OptimisticLockManager::default();
        assert_eq!(locks.create("config", json!({"x": 1}), "a").unwrap(), 1);
        assert!(matches!(
            locks.create("config", json!({}), "b"),
            Err(ConflictError::AlreadyExists(_))
        ));

        let read = locks.read("config").unwrap();
        assert_eq!(locks.write("config", json!({"x": 2}), read.version, "a").unwrap(), 2);

        let stale = locks.write("config", json!({"x": 3}), read.version, "b");
        assert_eq!(
            stale,
            Err(ConflictError::VersionMismatch {
                resource: "config".into(),
                expected: 1,
                actual: 2
            })
        );
        assert_eq!(locks.read("config").unwrap().value, json!({"x": 2}));

        assert!(locks.remove("config", 1).is_err());
        assert_eq!(locks.remove("config", 2).unwrap(), json!({"x": 2}));
        assert!(locks.is_empty());
    }

    #[test]
    fn test_concurrent_update_with_loses_no_increments() {
        let locks: Arc<OptimisticLockManager<u64>> = Arc::new(OptimisticLockManager::new(1000));
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let locks = Arc::clone(&locks);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        locks
                            .update_with("counter", &format!("w{worker}"), |v| v.copied().unwrap_or(0) + 1)
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let counter = locks.read("counter").unwrap();
        assert_eq!(counter.value, 200);
        assert_eq!(counter.version, 200);
    }
}
