// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Pure coordination building blocks with no I/O: the dependency graph,
//! circuit breakers, conflict arbitration and the crate error type.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Leaf components composed by the swarm coordinator

pub mod circuit_breaker;
pub mod conflict;
pub mod dependency_graph;
pub mod error;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerManager, CircuitBreakerMetrics, CircuitState, CircuitTransition,
};
pub use conflict::{
    Ballot, ConflictError, ConflictResolution, ConflictResolver, OptimisticLockManager,
    ResourceClaim, Versioned,
};
pub use dependency_graph::{DependencyError, DependencyGraph};
pub use error::{SwarmError, SwarmResult};
