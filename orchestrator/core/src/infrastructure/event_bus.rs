// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Swarm Events
//
// Every published event is appended to a bounded in-memory history, handed to
// each registered sink, and (unless marked local) broadcast to subscribers
// over a tokio broadcast channel. Slow subscribers lag and lose events; they
// never block the publisher. A panicking sink is logged and skipped.

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::domain::events::{SwarmEvent, SwarmEventType};
use crate::domain::task::TaskId;

/// Synchronous, best-effort observer. Called after the event is recorded and
/// never while coordinator state is locked, but inline on the publishing
/// task: `on_event` must return quickly and must not block. Sinks that do real
/// work should hand the event off, as [`ChannelSink`] does.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &SwarmEvent);
}

/// Forwards every event to an unbounded channel so a consumer can process
/// them on its own task.
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<SwarmEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SwarmEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelSink {
    fn on_event(&self, event: &SwarmEvent) {
        if self.sender.send(event.clone()).is_err() {
            debug!("Channel sink receiver dropped");
        }
    }
}

/// Handle returned by [`EventBus::add_sink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(u64);

#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<SwarmEvent>>,
    history: Arc<RwLock<VecDeque<SwarmEvent>>>,
    history_limit: usize,
    sinks: Arc<RwLock<Vec<(SinkId, Arc<dyn EventSink>)>>>,
    next_sink: Arc<AtomicU64>,
}

impl EventBus {
    /// `capacity` bounds both the broadcast buffer and the retained history.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
            history: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            history_limit: capacity,
            sinks: Arc::new(RwLock::new(Vec::new())),
            next_sink: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish(&self, event: SwarmEvent) {
        debug!(
            event_type = %event.event_type(),
            source = %event.source,
            "Publishing event"
        );

        {
            let mut history = self.history.write();
            if history.len() == self.history_limit {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        let sinks: Vec<Arc<dyn EventSink>> =
            self.sinks.read().iter().map(|(_, sink)| Arc::clone(sink)).collect();
        for sink in sinks {
            if catch_unwind(AssertUnwindSafe(|| sink.on_event(&event))).is_err() {
                warn!(event_type = %event.event_type(), "Event sink panicked");
            }
        }

        if event.broadcast {
            let receiver_count = self.sender.send(event).unwrap_or(0);
            if receiver_count == 0 {
                debug!("No subscribers listening to event");
            }
        }
    }

    pub fn publish_all(&self, events: impl IntoIterator<Item = SwarmEvent>) {
        for event in events {
            self.publish(event);
        }
    }

    /// Subscribe to all broadcast events.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to the events of one task only.
    pub fn subscribe_task(&self, task_id: TaskId) -> TaskEventReceiver {
        TaskEventReceiver {
            receiver: self.sender.subscribe(),
            task_id,
        }
    }

    pub fn add_sink(&self, sink: Arc<dyn EventSink>) -> SinkId {
        let id = SinkId(self.next_sink.fetch_add(1, Ordering::Relaxed));
        self.sinks.write().push((id, sink));
        id
    }

    /// Returns whether the sink was registered.
    pub fn remove_sink(&self, id: SinkId) -> bool {
        let mut sinks = self.sinks.write();
        let before = sinks.len();
        sinks.retain(|(sink_id, _)| *sink_id != id);
        sinks.len() != before
    }

    /// Snapshot of the retained history, oldest first.
    pub fn history(&self) -> Vec<SwarmEvent> {
        self.history.read().iter().cloned().collect()
    }

    pub fn history_of(&self, event_type: SwarmEventType) -> Vec<SwarmEvent> {
        self.history
            .read()
            .iter()
            .filter(|event| event.event_type() == event_type)
            .cloned()
            .collect()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all broadcast events
pub struct EventReceiver {
    receiver: broadcast::Receiver<SwarmEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<SwarmEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<SwarmEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered to a single task
pub struct TaskEventReceiver {
    receiver: broadcast::Receiver<SwarmEvent>,
    task_id: TaskId,
}

impl TaskEventReceiver {
    pub async fn recv(&mut self) -> Result<SwarmEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.payload.task_id() == Some(self.task_id) {
                return Ok(event);
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{AgentId, AgentType};
    use crate::domain::events::SwarmEventPayload;
    use crate::domain::swarm::{SwarmId, SwarmMetrics};
    use crate::domain::task::TaskPriority;
    use parking_lot::Mutex;

    struct RecordingSink(Mutex<Vec<SwarmEventType>>);

    impl EventSink for RecordingSink {
        fn on_event(&self, event: &SwarmEvent) {
            self.0.lock().push(event.event_type());
        }
    }

    fn started() -> SwarmEvent {
        SwarmEvent::new(
            "test",
            SwarmEventPayload::SwarmStarted {
                swarm_id: SwarmId::new(),
                name: "test".into(),
            },
        )
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        event_bus.publish(started());

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.event_type(), SwarmEventType::SwarmStarted);
    }

    #[tokio::test]
    async fn test_task_event_filtering() {
        let event_bus = EventBus::new(10);
        let swarm = SwarmId::new();
        let task_id = TaskId::new(swarm, 1, TaskPriority::Normal);
        let other_task = TaskId::new(swarm, 2, TaskPriority::Normal);

        let mut receiver = event_bus.subscribe_task(task_id);

        event_bus.publish(SwarmEvent::new(
            "test",
            SwarmEventPayload::TaskQueued { task_id: other_task },
        ));
        event_bus.publish(SwarmEvent::new(
            "test",
            SwarmEventPayload::TaskAssigned {
                task_id,
                agent_id: AgentId::new(AgentType::Developer, 1),
            },
        ));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.payload.task_id(), Some(task_id));
        assert_eq!(received.event_type(), SwarmEventType::TaskAssigned);
    }

    #[test]
    fn test_history_is_bounded() {
        let event_bus = EventBus::new(3);
        for _ in 0..5 {
            event_bus.publish(started());
        }
        event_bus.publish(SwarmEvent::new(
            "test",
            SwarmEventPayload::SwarmPaused {
                swarm_id: SwarmId::new(),
            },
        ));

        let history = event_bus.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].event_type(), SwarmEventType::SwarmPaused);
        assert_eq!(event_bus.history_of(SwarmEventType::SwarmStarted).len(), 2);
    }

    #[test]
    fn test_sinks_see_local_events_and_can_be_removed() {
        let event_bus = EventBus::new(10);
        let sink = Arc::new(RecordingSink(Mutex::new(Vec::new())));
        let id = event_bus.add_sink(sink.clone());
        let mut receiver = event_bus.subscribe();

        event_bus.publish(SwarmEvent::local(
            "test",
            SwarmEventPayload::SwarmMetrics {
                swarm_id: SwarmId::new(),
                metrics: SwarmMetrics::default(),
            },
        ));

        assert_eq!(sink.0.lock().as_slice(), &[SwarmEventType::SwarmMetrics]);
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));

        assert!(event_bus.remove_sink(id));
        assert!(!event_bus.remove_sink(id));
        event_bus.publish(started());
        assert_eq!(sink.0.lock().len(), 1);
    }

    struct PanickingSink;

    impl EventSink for PanickingSink {
        fn on_event(&self, _event: &SwarmEvent) {
            panic!("sink failure");
        }
    }

    #[tokio::test]
    async fn test_panicking_sink_does_not_stop_delivery() {
        let event_bus = EventBus::new(10);
        event_bus.add_sink(Arc::new(PanickingSink));
        let recording = Arc::new(RecordingSink(Mutex::new(Vec::new())));
        event_bus.add_sink(recording.clone());
        let mut receiver = event_bus.subscribe();

        event_bus.publish(started());

        assert_eq!(recording.0.lock().as_slice(), &[SwarmEventType::SwarmStarted]);
        assert_eq!(event_bus.history().len(), 1);
        assert_eq!(receiver.recv().await.unwrap().event_type(), SwarmEventType::SwarmStarted);
    }

    #[tokio::test]
    async fn test_channel_sink_hands_events_off() {
        let event_bus = EventBus::new(10);
        let (sink, mut events) = ChannelSink::new();
        event_bus.add_sink(Arc::new(sink));

        event_bus.publish(started());
        assert_eq!(events.recv().await.unwrap().event_type(), SwarmEventType::SwarmStarted);

        drop(events);
        event_bus.publish(started());
        assert_eq!(event_bus.history().len(), 2);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();

        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus.publish(started());

        let _ = receiver1.recv().await.unwrap();
        let _ = receiver2.recv().await.unwrap();
    }
}
