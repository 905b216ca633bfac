//! Domain event system: decoupled notifications between components.
//!
//! Events are published when something interesting happens (a turn is
//! answered, a tool runs, speech starts or stops). The front-end and logs
//! subscribe without the publishers knowing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Whether the assistant is currently speaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechStatus {
    Speaking,
    Idle,
}

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A reasoning turn finished and its response was persisted
    TurnCompleted {
        turn_id: Option<i64>,
        tool_calls: usize,
        failed: bool,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A playback session started or ended
    SpeechStatusChanged {
        status: SpeechStatus,
        session_id: String,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Short event name, used as the SSE event type.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::TurnCompleted { .. } => "turn_completed",
            DomainEvent::ToolExecuted { .. } => "tool_executed",
            DomainEvent::SpeechStatusChanged { .. } => "speech_status",
            DomainEvent::ErrorOccurred { .. } => "error",
        }
    }
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. Delivery is
/// fire-and-forget: slow subscribers lag and lose events, and publishing
/// never blocks the caller.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // Ignore send errors (no subscribers = that's fine)
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
