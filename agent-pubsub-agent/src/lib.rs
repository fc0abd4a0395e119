//! Agent side of agent-pubsub
//!
//! This crate provides the publisher-side display adapter, the terminal
//! renderer, the interactive input bridge and the session wiring that ties
//! them to a channel.

pub mod console;
pub mod display;
pub mod input;
pub mod session;

pub use console::ConsoleRenderer;
pub use display::{
    tool_result_text, translate, DisplayEvent, DisplaySink, PublishingDisplay, Translated,
};
pub use input::{BridgeState, InputBridge, LineReader, StdinLineReader};
pub use session::AgentSession;
