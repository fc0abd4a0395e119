//! Channel-based pub/sub bus
//!
//! Each agent session publishes onto its own [`Channel`]. Any number of
//! [`SubscriberSession`]s attach to a channel, receive a replay of recent
//! history followed by live envelopes, and may submit the next user turn
//! back to the agent. Channels are looked up through a [`ChannelRegistry`].
//!
//! Ordering: within a channel every envelope gets the next sequence number
//! at the moment it enters the history buffer, and each subscriber sees
//! envelopes in that order. Slow subscribers lose their oldest undelivered
//! envelopes (reported with a `dropped` status notice) rather than slowing
//! the publisher.

pub mod channel;
pub mod envelope;
mod queue;
pub mod registry;
pub mod subscriber;

pub use channel::{Channel, ChannelOptions, ChannelStats, InputWaiter};
pub use envelope::{
    InputDisposition, InputSubmission, MessageEnvelope, MessageKind, Metadata, StatusEvent,
    NOTICE_SEQUENCE,
};
pub use registry::ChannelRegistry;
pub use subscriber::SubscriberSession;
