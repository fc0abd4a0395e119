//! Envelope types for the pub/sub bus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// String metadata attached to an envelope (tool name, highlight flags, ...)
pub type Metadata = HashMap<String, String>;

/// Sequence number carried by per-subscriber notices.
///
/// Channel sequences start at 1, so 0 never collides with a published envelope.
pub const NOTICE_SEQUENCE: u64 = 0;

/// What an envelope carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    AssistantMessage,
    UserMessage,
    ToolCall,
    ToolResult,
    Status,
    InputRequest,
}

impl MessageKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::AssistantMessage => "assistant_message",
            MessageKind::UserMessage => "user_message",
            MessageKind::ToolCall => "tool_call",
            MessageKind::ToolResult => "tool_result",
            MessageKind::Status => "status",
            MessageKind::InputRequest => "input_request",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable, sequenced unit of published data
///
/// Envelopes are shared between the history buffer and every delivery
/// queue behind an `Arc`, so they are never mutated after publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Channel the envelope was published on
    pub channel_id: String,
    /// Position in the channel's total order (0 for per-subscriber notices)
    pub sequence: u64,
    /// Publication time
    pub timestamp: DateTime<Utc>,
    /// Payload discriminator
    pub kind: MessageKind,
    /// Free-form string metadata
    #[serde(default)]
    pub metadata: Metadata,
    /// Kind-specific content
    pub payload: serde_json::Value,
}

impl MessageEnvelope {
    /// Build a per-subscriber status notice that is not part of the channel order
    pub fn notice(channel_id: impl Into<String>, event: &StatusEvent) -> Self {
        Self {
            channel_id: channel_id.into(),
            sequence: NOTICE_SEQUENCE,
            timestamp: Utc::now(),
            kind: MessageKind::Status,
            metadata: Metadata::new(),
            payload: event.to_payload(),
        }
    }

    /// Whether this is a synthetic notice (gap or drop report) rather than
    /// a published envelope
    pub fn is_notice(&self) -> bool {
        self.sequence == NOTICE_SEQUENCE
    }

    /// Decode the payload of a `status` envelope
    pub fn status_event(&self) -> Option<StatusEvent> {
        if self.kind != MessageKind::Status {
            return None;
        }
        serde_json::from_value(self.payload.clone()).ok()
    }

    /// Encode as a single JSON line for hand-off to a transport
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Metadata lookup
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Payload schema of `status` envelopes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusEvent {
    /// Requested replay range is no longer retained
    Gap {
        requested_after: u64,
        oldest_retained: u64,
        latest: u64,
    },
    /// Envelopes dropped from a full delivery queue, oldest first
    Dropped {
        count: u64,
        first_dropped: u64,
        last_dropped: u64,
    },
    /// Channel has been closed; nothing follows
    Closed { channel_id: String },
    /// No remote input arrived in time; the default prompt was used
    InputTimeout {
        default_prompt: String,
        waited_secs: u64,
    },
    /// Remote input was abandoned for another reason; the default prompt was used
    InputFallback {
        default_prompt: String,
        reason: String,
    },
}

impl StatusEvent {
    /// Serialize into an envelope payload
    pub fn to_payload(&self) -> serde_json::Value {
        // Tagged enum of plain fields; serialization cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Input sent by a subscriber in answer to an `input_request`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSubmission {
    /// Subscriber session that sent the input
    pub session_id: String,
    /// The submitted user turn
    pub content: String,
    /// Receive time
    pub submitted_at: DateTime<Utc>,
}

impl InputSubmission {
    /// Create a new submission stamped with the current time
    pub fn new(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            content: content.into(),
            submitted_at: Utc::now(),
        }
    }
}

/// What happened to a submitted input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDisposition {
    /// Resolved the pending input request
    Accepted,
    /// No request was pending, or another submission already won this cycle
    Discarded,
}
