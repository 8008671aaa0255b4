//! Channel-backed event sink.

use super::EventSink;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::warn;

/// An event as delivered to a channel consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Event type, e.g. `step.progress`.
    pub event_type: String,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    pub data: Option<serde_json::Value>,
}

impl PipelineEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(event_type: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: Utc::now(),
            data,
        }
    }
}

/// Forwards events into a bounded tokio channel.
///
/// Emission never waits for the consumer: when the channel is full or the
/// receiver is gone the event is dropped and counted.
#[derive(Debug)]
pub struct ChannelEventSink {
    tx: mpsc::Sender<PipelineEvent>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl ChannelEventSink {
    /// Creates a sink and the receiver that consumes its events.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PipelineEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                delivered: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Number of events handed to the channel.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Number of events dropped because the channel was full or closed.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn send(&self, event_type: &str, data: Option<serde_json::Value>) {
        match self.tx.try_send(PipelineEvent::new(event_type, data)) {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(event_type = %event.event_type, dropped, "event channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.send(event_type, data);
    }

    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.send(event_type, data);
    }
}
