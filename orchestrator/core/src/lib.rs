// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Hivemind Core
//!
//! Domain model, event bus and persistence adapters for the Hivemind swarm
//! orchestrator. Scheduling and coordination live in `hivemind_swarm`.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Types and seams shared by every swarm component

pub mod domain;
pub mod infrastructure;

pub use domain::*;
