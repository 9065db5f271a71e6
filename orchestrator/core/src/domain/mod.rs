// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Pure swarm types: identities, lifecycles, configuration and the
//! collaborator seams the coordinator depends on.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Data model shared by the coordination engine and its adapters

pub mod agent;
pub mod config;
pub mod events;
pub mod executor;
pub mod objective;
pub mod repository;
pub mod swarm;
pub mod task;
