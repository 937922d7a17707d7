//! Public event stream and its synchronous, multi-subscriber bus.
//!
//! The reference stack broadcasts a runtime-typed event over an async
//! `tokio::sync::broadcast` channel. The mixer pump here is a plain
//! `std::thread`, not an async task, and must never stall waiting on a slow
//! subscriber, so events are a closed sum type and the bus publishes with a
//! non-blocking `try_send` per subscriber, dropping the event for anyone
//! whose channel is full rather than blocking the publisher.

use crate::source::SourceState;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::time::SystemTime;
use uuid::Uuid;

/// Per-subscriber channel capacity. A subscriber that falls this far behind
/// loses events rather than stalling the mixer.
const SUBSCRIBER_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum Event {
    StateChanged {
        source_id: Uuid,
        old: SourceState,
        new: SourceState,
        timestamp: SystemTime,
    },
    BufferUnderrun {
        source_id: Uuid,
        missed_frames: u64,
        frame_position: u64,
        timestamp: SystemTime,
    },
    TrackDropout {
        source_id: Uuid,
        track_name: String,
        master_timestamp: SystemTime,
        master_sample_position: u64,
        missed_frames: u64,
        reason: String,
        timestamp: SystemTime,
    },
    AudioError {
        message: String,
        timestamp: SystemTime,
    },
}

/// Multi-subscriber, non-blocking-publish event bus.
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<Event>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register a new subscriber and get its receiving end. Dropping the
    /// `Receiver` is enough to unsubscribe — the next publish that notices
    /// the channel is disconnected removes it from the subscriber list.
    pub fn subscribe(&self) -> Receiver<Event> {
        let (tx, rx) = crossbeam_channel::bounded(SUBSCRIBER_CAPACITY);
        self.subscribers.lock().push(tx);
        rx
    }

    /// Publish an event to all live subscribers. Never blocks: a full
    /// channel means the event is dropped for that subscriber, a
    /// disconnected channel means the subscriber is pruned.
    pub fn publish(&self, event: Event) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(crossbeam_channel::TrySendError::Full(_)) => true,
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> Event {
        Event::StateChanged {
            source_id: Uuid::nil(),
            old: SourceState::Idle,
            new: SourceState::Playing,
            timestamp: SystemTime::now(),
        }
    }

    #[test]
    fn delivers_to_all_live_subscribers() {
        let bus = EventBus::new();
        let rx1 = bus.subscribe();
        let rx2 = bus.subscribe();

        bus.publish(sample_event());

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn prunes_dropped_subscribers_without_blocking() {
        let bus = EventBus::new();
        {
            let _rx = bus.subscribe();
        } // dropped immediately
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish(sample_event());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn full_subscriber_channel_does_not_block_publish() {
        let bus = EventBus::new();
        let rx = bus.subscribe();

        for _ in 0..(SUBSCRIBER_CAPACITY + 10) {
            bus.publish(sample_event());
        }

        // Publisher returned without blocking; subscriber still connected.
        assert!(rx.try_recv().is_ok());
        assert_eq!(bus.subscriber_count(), 1);
    }
}
