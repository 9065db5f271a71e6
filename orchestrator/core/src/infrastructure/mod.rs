// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod repositories;

pub use event_bus::{ChannelSink, EventBus, EventBusError, EventReceiver, EventSink, TaskEventReceiver};
pub use repositories::InMemoryStatePersistence;
