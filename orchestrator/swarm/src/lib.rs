// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `hivemind-swarm`: Swarm Coordination Engine
//!
//! Runs a pool of agents against a dependency-ordered task set: admission,
//! scheduling, retries with backoff, circuit breaking, heartbeat supervision,
//! work stealing and conflict arbitration over shared resources.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `DependencyGraph`, circuit breakers, conflict resolution, `SwarmError` |
//! | [`application`] | Application | `SwarmCoordinator`, schedulers, decomposition, work stealing |
//!
//! Entity types, configuration, events and the executor/persistence ports
//! live in `hivemind-orchestrator-core`.
//!
//! ## Usage
//!
//! ```ignore
//! let coordinator = SwarmCoordinator::builder(config)
//!     .with_executor(executor)
//!     .build()?;
//! coordinator.initialize().await?;
//! let agent = coordinator.register_agent(AgentSpec::new(AgentType::Developer))?;
//! let task = coordinator.submit_task(TaskSpec::new(TaskType::Coding, "implement parser"))?;
//! coordinator.shutdown().await?;
//! ```

pub mod application;
pub mod domain;

pub use application::{AgentSpec, SwarmCoordinator, SwarmCoordinatorBuilder};
pub use domain::{SwarmError, SwarmResult};
