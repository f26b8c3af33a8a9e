//! Conversion lifecycle events.
//!
//! [`EventBus`] fans events out over a `tokio::sync::broadcast` channel and
//! keeps the last [`MAX_RECENT_EVENTS`] so a new subscriber can be handed a
//! backlog with no gap between it and the live feed.

use std::collections::VecDeque;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use convertforge_common::RequestId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::FailureKind;

/// Events retained for replay.
pub const MAX_RECENT_EVENTS: usize = 100;

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Started {
        request_id: RequestId,
        tool: String,
        target: String,
    },
    Completed {
        request_id: RequestId,
        size: u64,
        elapsed_ms: u64,
    },
    Failed {
        request_id: RequestId,
        kind: FailureKind,
        message: String,
        elapsed_ms: u64,
    },
    CleanupFailed {
        path: PathBuf,
        error: String,
    },
}

impl EventPayload {
    /// The serialized `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            EventPayload::Started { .. } => "started",
            EventPayload::Completed { .. } => "completed",
            EventPayload::Failed { .. } => "failed",
            EventPayload::CleanupFailed { .. } => "cleanup_failed",
        }
    }
}

/// A timestamped event with its position in the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionEvent {
    /// Monotonic per bus, starting at 1.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

struct History {
    next_seq: u64,
    recent: VecDeque<ConversionEvent>,
}

/// Broadcast channel plus replay history.
pub struct EventBus {
    tx: broadcast::Sender<ConversionEvent>,
    history: Mutex<History>,
}

impl EventBus {
    /// `capacity` bounds how far a live subscriber may lag before it starts
    /// missing events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            history: Mutex::new(History {
                next_seq: 1,
                recent: VecDeque::with_capacity(MAX_RECENT_EVENTS),
            }),
        }
    }

    /// Live events only.
    pub fn subscribe(&self) -> broadcast::Receiver<ConversionEvent> {
        self.tx.subscribe()
    }

    /// Up to `n` retained events, oldest first, and a receiver that continues
    /// exactly where the backlog ends.
    pub fn subscribe_with_backlog(
        &self,
        n: usize,
    ) -> (Vec<ConversionEvent>, broadcast::Receiver<ConversionEvent>) {
        let history = self.history.lock();
        let skip = history.recent.len().saturating_sub(n);
        let backlog = history.recent.iter().skip(skip).cloned().collect();
        (backlog, self.tx.subscribe())
    }

    /// Record and broadcast an event.
    pub fn publish(&self, payload: EventPayload) {
        let mut history = self.history.lock();
        let event = ConversionEvent {
            seq: history.next_seq,
            timestamp: Utc::now(),
            payload,
        };
        history.next_seq += 1;
        if history.recent.len() >= MAX_RECENT_EVENTS {
            history.recent.pop_front();
        }
        history.recent.push_back(event.clone());

        // Sent under the lock so a concurrent backlog snapshot cannot miss it
        // or see it twice. No subscribers is fine.
        let _ = self.tx.send(event);
    }

    /// Currently connected live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// The `n` most recent events, newest first.
    pub fn recent_events(&self, n: usize) -> Vec<ConversionEvent> {
        let history = self.history.lock();
        history.recent.iter().rev().take(n).cloned().collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
