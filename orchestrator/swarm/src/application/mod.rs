// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application
//!
//! Use cases of a running swarm: the coordinator and the scheduling,
//! decomposition and load-balancing services it drives.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Orchestrates domain components over the core ports

pub mod coordinator;
pub mod decomposition;
pub mod scheduler;
pub mod strategy;
pub mod work_stealing;

pub use coordinator::{retry_delay, AgentSpec, SwarmCoordinator, SwarmCoordinatorBuilder};
pub use scheduler::{AdvancedTaskScheduler, PlannedAssignment, TaskScheduler};
pub use strategy::{
    AffinityIndex, AffinityStrategy, CapabilityStrategy, LeastLoadedStrategy, RoundRobinStrategy,
    SchedulingContext, SchedulingStrategy,
};
pub use work_stealing::{AgentLoad, StealPlan, WorkStealingCoordinator, WorkStealingStats};
