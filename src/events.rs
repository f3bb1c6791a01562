//! Engine events for real-time observation.
//!
//! A typical sequence for one conversation:
//! 1. `Start`
//! 2. `Text` / `ActionStart` / `ActionEnd` per reasoning step
//! 3. `TurnComplete` after each reasoning step
//! 4. `Done`, or `Error` on a fatal failure

use crate::types::{ActionOutcome, ConversationId, TokenUsage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::mpsc;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Start {
        conversation_id: ConversationId,
        provider: String,
    },

    /// Text produced by a reasoning step.
    Text { text: String },

    ActionStart {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    ActionEnd {
        id: String,
        name: String,
        outcome: ActionOutcome,
    },

    /// One reasoning step finished.
    TurnComplete { iteration: usize, usage: TokenUsage },

    Done {
        conversation_id: ConversationId,
        iterations: usize,
        total_usage: TokenUsage,
        duration: Duration,
    },

    Error {
        message: String,
        kind: String,
        recoverable: bool,
    },
}

impl AgentEvent {
    #[must_use]
    pub fn start(conversation_id: ConversationId, provider: impl Into<String>) -> Self {
        Self::Start {
            conversation_id,
            provider: provider.into(),
        }
    }

    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    #[must_use]
    pub fn action_start(
        id: impl Into<String>,
        name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Self::ActionStart {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    #[must_use]
    pub fn action_end(id: impl Into<String>, name: impl Into<String>, outcome: ActionOutcome) -> Self {
        Self::ActionEnd {
            id: id.into(),
            name: name.into(),
            outcome,
        }
    }

    #[must_use]
    pub const fn done(
        conversation_id: ConversationId,
        iterations: usize,
        total_usage: TokenUsage,
        duration: Duration,
    ) -> Self {
        Self::Done {
            conversation_id,
            iterations,
            total_usage,
            duration,
        }
    }

    #[must_use]
    pub fn error(err: &crate::AgentError) -> Self {
        Self::Error {
            message: err.to_string(),
            kind: err.kind().to_owned(),
            recoverable: err.is_recoverable(),
        }
    }
}

/// Monotonically increasing per-conversation counter for event ordering.
///
/// `Ordering::Relaxed` is enough because the channel orders sender and
/// receiver.
#[derive(Clone, Debug, Default)]
pub struct SequenceCounter(Arc<AtomicU64>);

impl SequenceCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// Envelope carrying an [`AgentEvent`] with id, sequence and timestamp.
///
/// The event is flattened so its `type` sits beside the envelope fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentEventEnvelope {
    pub event_id: uuid::Uuid,
    pub sequence: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(flatten)]
    pub event: AgentEvent,
}

impl AgentEventEnvelope {
    #[must_use]
    pub fn wrap(event: AgentEvent, seq: &SequenceCounter) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4(),
            sequence: seq.next(),
            timestamp: OffsetDateTime::now_utc(),
            event,
        }
    }
}

/// Optional event channel. Without a receiver, emitting is a no-op.
#[derive(Clone, Debug, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<AgentEventEnvelope>>,
    seq: SequenceCounter,
}

impl EventSink {
    #[must_use]
    pub fn new(tx: mpsc::Sender<AgentEventEnvelope>) -> Self {
        Self {
            tx: Some(tx),
            seq: SequenceCounter::new(),
        }
    }

    /// A connected sink and its receiver.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AgentEventEnvelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Send without stalling the engine on a slow or vanished consumer.
    ///
    /// A full channel gets a bounded wait; a closed one is ignored.
    pub async fn emit(&self, event: AgentEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        let envelope = AgentEventEnvelope::wrap(event, &self.seq);

        match tx.try_send(envelope) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(envelope)) => {
                log::debug!("event channel full, waiting for consumer");
                match tokio::time::timeout(Duration::from_secs(30), tx.send(envelope)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => log::warn!("event channel closed while sending"),
                    Err(_) => log::error!("timed out waiting to send event"),
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::debug!("event channel closed, consumer disconnected");
            }
        }
    }
}
