//! Event system for reading session changes
//!
//! Emits typed events to every subscriber over its own channel.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use serde::Serialize;
use std::time::Instant;
use tracing::trace;

use crate::session::{ReadEntry, ReadingSource, SessionState};

/// Types of events raised by a `ReadingSession`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SessionEvent {
    /// Live detection text changed
    DisplayTextChanged {
        old_value: Option<String>,
        new_value: String,
    },
    /// A confident detection appeared after a non-confident stretch
    DetectionConfirmed {
        place: usize,
        digits: String,
    },
    /// A reading was accepted for an entry
    ReadingRecorded {
        place: usize,
        meter_id: u64,
        value: u64,
        source: ReadingSource,
    },
    /// Error threshold crossed, operator must enter the reading by hand
    OutOfRange {
        place: usize,
        entry: Option<ReadEntry>,
        error_count: u32,
        ceiling: u32,
    },
    /// Current entry index moved
    PlaceChanged {
        place: usize,
        entry: Option<ReadEntry>,
    },
    /// Session state transition
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    /// Torch toggled
    FlashChanged {
        on: bool,
    },
}

/// A timestamped session event
#[derive(Debug, Clone)]
pub struct TimestampedEvent {
    /// The event
    pub event: SessionEvent,
    /// When it occurred
    pub timestamp: Instant,
}

#[derive(Debug)]
struct Subscriber {
    sender: Sender<TimestampedEvent>,
    /// Emitter-side handle of a bounded channel, used to discard the oldest event
    overflow: Option<Receiver<TimestampedEvent>>,
}

impl Subscriber {
    /// Returns `false` once the receiving side is gone
    fn deliver(&self, stamped: TimestampedEvent) -> bool {
        let stamped = match self.sender.try_send(stamped) {
            Ok(()) => return true,
            Err(TrySendError::Disconnected(_)) => return false,
            Err(TrySendError::Full(stamped)) => stamped,
        };

        if let Some(overflow) = &self.overflow {
            if let Ok(oldest) = overflow.try_recv() {
                trace!("Subscriber lagging, dropped {:?}", oldest.event);
            }
        }
        !matches!(self.sender.try_send(stamped), Err(TrySendError::Disconnected(_)))
    }
}

/// Event emitter for broadcasting session events
#[derive(Debug, Default)]
pub struct EventEmitter {
    subscribers: Vec<Subscriber>,
}

impl EventEmitter {
    /// Create a new event emitter
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Dropping the receiver unsubscribes.
    pub fn subscribe(&mut self) -> Receiver<TimestampedEvent> {
        let (sender, receiver) = unbounded();
        self.subscribers.push(Subscriber { sender, overflow: None });
        receiver
    }

    /// Register a subscriber holding at most `capacity` undelivered events.
    ///
    /// When full, the oldest pending event is discarded. The emitter keeps the
    /// channel open, so a dropped receiver costs `capacity` events until the
    /// emitter itself is dropped.
    pub fn subscribe_bounded(&mut self, capacity: usize) -> Receiver<TimestampedEvent> {
        let (sender, receiver) = bounded(capacity.max(1));
        self.subscribers.push(Subscriber {
            sender,
            overflow: Some(receiver.clone()),
        });
        receiver
    }

    /// Emit an event to all subscribers
    pub fn emit(&mut self, event: SessionEvent) {
        trace!("Session event: {:?}", event);
        let stamped = TimestampedEvent {
            event,
            timestamp: Instant::now(),
        };
        self.subscribers.retain(|s| s.deliver(stamped.clone()));
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
