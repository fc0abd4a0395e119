//! Subscriber side of a channel

use super::channel::{Channel, ChannelInner};
use super::envelope::{InputDisposition, MessageEnvelope};
use super::queue::{DeliveryQueue, Pop};
use std::sync::{Arc, Weak};

/// One observer/controller attached to a channel
///
/// Receives replayed history followed by live envelopes through its own
/// bounded queue, so a slow session never holds up the publisher or other
/// sessions. Dropping the session detaches it.
#[derive(Debug)]
pub struct SubscriberSession {
    session_id: String,
    channel_id: String,
    replay_cursor: u64,
    queue: Arc<DeliveryQueue>,
    channel: Weak<ChannelInner>,
}

impl SubscriberSession {
    pub(crate) fn new(
        session_id: String,
        channel_id: String,
        replay_cursor: u64,
        queue: Arc<DeliveryQueue>,
        channel: Weak<ChannelInner>,
    ) -> Self {
        Self {
            session_id,
            channel_id,
            replay_cursor,
            queue,
            channel,
        }
    }

    /// Session identifier, stable across [`Channel::resume`]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Channel this session is attached to
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Sequence of the last published envelope delivered to this session
    ///
    /// Never decreases. Pass it to [`Channel::resume`] after a reconnect.
    pub fn replay_cursor(&self) -> u64 {
        self.replay_cursor
    }

    /// Wait for the next envelope
    ///
    /// Returns `None` once the session is detached, or once the channel is
    /// closed and the final `closed` status has been delivered.
    pub async fn recv(&mut self) -> Option<Arc<MessageEnvelope>> {
        let envelope = self.queue.pop().await?;
        self.advance(&envelope);
        Some(envelope)
    }

    /// Take the next envelope if one is already queued
    pub fn try_recv(&mut self) -> Option<Arc<MessageEnvelope>> {
        match self.queue.try_pop() {
            Pop::Item(envelope) => {
                self.advance(&envelope);
                Some(envelope)
            }
            Pop::Empty | Pop::Closed => None,
        }
    }

    fn advance(&mut self, envelope: &MessageEnvelope) {
        if !envelope.is_notice() {
            self.replay_cursor = self.replay_cursor.max(envelope.sequence);
        }
    }

    /// Submit the next user turn for the session's agent
    pub fn submit_input(&self, content: impl Into<String>) -> crate::Result<InputDisposition> {
        self.channel()
            .ok_or_else(|| crate::Error::ChannelClosed(self.channel_id.clone()))?
            .submit_input(&self.session_id, content)
    }

    /// The channel, if it is still alive
    pub fn channel(&self) -> Option<Channel> {
        self.channel.upgrade().map(Channel::from_inner)
    }

    /// Envelopes queued but not yet received
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Total envelopes dropped for this session due to backpressure
    pub fn dropped(&self) -> u64 {
        self.queue.total_dropped()
    }

    /// Whether the channel stopped delivering to this session
    pub fn is_detached(&self) -> bool {
        self.queue.is_closed()
    }
}

impl Drop for SubscriberSession {
    fn drop(&mut self) {
        match self.channel.upgrade() {
            Some(inner) => inner.detach(&self.session_id, &self.queue),
            None => self.queue.detach(),
        }
    }
}
