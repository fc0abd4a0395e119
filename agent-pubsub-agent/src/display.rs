//! Publisher-side display adapter
//!
//! Every display operation is rendered on the console (when enabled) and,
//! independently, translated into one envelope and published (when pub/sub
//! is enabled). The two paths share no state: a bus failure never stops
//! console output.

use agent_pubsub_core::bus::{Channel, MessageKind, Metadata};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// Longest tool result, in bytes, shown or published before it is elided
pub const MAX_RESULT_LEN: usize = 2000;

/// One semantic display operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DisplayEvent {
    AssistantMessage {
        content: String,
        /// Tool the message refers to, rendered highlighted
        highlighted_tool: Option<String>,
    },
    UserMessage {
        content: String,
        model: Option<String>,
        chat_turn: u32,
    },
    ToolCall {
        tool_name: String,
        arguments: serde_json::Value,
    },
    ToolResult {
        tool_name: Option<String>,
        result: serde_json::Value,
        is_error: bool,
    },
}

/// Envelope contents produced from a display event
#[derive(Debug, Clone, PartialEq)]
pub struct Translated {
    pub kind: MessageKind,
    pub payload: serde_json::Value,
    pub metadata: Metadata,
}

/// Tool result body exactly as the console shows it
pub fn tool_result_text(result: &serde_json::Value) -> String {
    let body = match result {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    agent_pubsub_core::utils::truncate(&body, MAX_RESULT_LEN)
}

/// Map a display event to the envelope subscribers receive
pub fn translate(event: &DisplayEvent) -> Translated {
    let mut metadata = Metadata::new();
    let (kind, payload) = match event {
        DisplayEvent::AssistantMessage {
            content,
            highlighted_tool,
        } => {
            if let Some(tool) = highlighted_tool {
                metadata.insert("highlighted_tool".to_string(), tool.clone());
            }
            (MessageKind::AssistantMessage, json!({ "content": content }))
        }
        DisplayEvent::UserMessage {
            content,
            model,
            chat_turn,
        } => {
            if let Some(model) = model {
                metadata.insert("model".to_string(), model.clone());
            }
            metadata.insert("chat_turn".to_string(), chat_turn.to_string());
            (
                MessageKind::UserMessage,
                json!({ "content": content, "chat_turn": chat_turn }),
            )
        }
        DisplayEvent::ToolCall {
            tool_name,
            arguments,
        } => {
            metadata.insert("tool_name".to_string(), tool_name.clone());
            (
                MessageKind::ToolCall,
                json!({ "tool": tool_name, "arguments": arguments }),
            )
        }
        DisplayEvent::ToolResult {
            tool_name,
            result,
            is_error,
        } => {
            if let Some(tool) = tool_name {
                metadata.insert("tool_name".to_string(), tool.clone());
            }
            metadata.insert("is_error".to_string(), is_error.to_string());
            (
                MessageKind::ToolResult,
                json!({ "result": tool_result_text(result), "is_error": is_error }),
            )
        }
    };

    Translated {
        kind,
        payload,
        metadata,
    }
}

/// Local renderer for display events (the terminal)
pub trait DisplaySink: Send + Sync {
    fn render(&self, event: &DisplayEvent);
}

/// Dual-write display: console sink plus channel publication
#[derive(Clone, Default)]
pub struct PublishingDisplay {
    console: Option<Arc<dyn DisplaySink>>,
    channel: Option<Channel>,
}

impl PublishingDisplay {
    /// Create a display writing to `console` and/or publishing on `channel`
    pub fn new(console: Option<Arc<dyn DisplaySink>>, channel: Option<Channel>) -> Self {
        Self { console, channel }
    }

    /// Channel this display publishes on, if pub/sub is enabled
    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    /// Whether display events are published
    pub fn is_publishing(&self) -> bool {
        self.channel.is_some()
    }

    /// Render and publish one event; returns the published sequence, if any
    pub fn show(&self, event: DisplayEvent) -> Option<u64> {
        if let Some(console) = &self.console {
            console.render(&event);
        }

        let channel = self.channel.as_ref()?;
        let Translated {
            kind,
            payload,
            metadata,
        } = translate(&event);
        match channel.publish(kind, payload, metadata) {
            Ok(sequence) => Some(sequence),
            Err(e) => {
                warn!(channel = %channel.id(), kind = %kind, "Failed to publish display event: {}", e);
                None
            }
        }
    }

    pub fn show_assistant_message(
        &self,
        content: impl Into<String>,
        highlighted_tool: Option<String>,
    ) -> Option<u64> {
        self.show(DisplayEvent::AssistantMessage {
            content: content.into(),
            highlighted_tool,
        })
    }

    pub fn show_user_message(
        &self,
        content: impl Into<String>,
        model: Option<String>,
        chat_turn: u32,
    ) -> Option<u64> {
        self.show(DisplayEvent::UserMessage {
            content: content.into(),
            model,
            chat_turn,
        })
    }

    pub fn show_tool_call(
        &self,
        tool_name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Option<u64> {
        self.show(DisplayEvent::ToolCall {
            tool_name: tool_name.into(),
            arguments,
        })
    }

    pub fn show_tool_result(
        &self,
        tool_name: Option<String>,
        result: serde_json::Value,
        is_error: bool,
    ) -> Option<u64> {
        self.show(DisplayEvent::ToolResult {
            tool_name,
            result,
            is_error,
        })
    }
}
