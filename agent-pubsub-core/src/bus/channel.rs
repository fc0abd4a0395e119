//! Ordered, replayable message stream for one agent session

use super::envelope::{
    InputDisposition, InputSubmission, MessageEnvelope, MessageKind, Metadata, StatusEvent,
};
use super::queue::DeliveryQueue;
use super::subscriber::SubscriberSession;
use crate::config::PubSubConfig;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Capacities applied to every channel a registry creates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOptions {
    /// Envelopes retained for replay
    pub history_capacity: usize,
    /// Per-subscriber delivery queue bound
    pub queue_capacity: usize,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self::from(&PubSubConfig::default())
    }
}

impl From<&PubSubConfig> for ChannelOptions {
    fn from(config: &PubSubConfig) -> Self {
        Self {
            history_capacity: config.history_capacity,
            queue_capacity: config.queue_capacity,
        }
    }
}

/// Point-in-time diagnostics for a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    pub channel_id: String,
    /// Sequence of the most recent envelope, 0 if none was published
    pub last_sequence: u64,
    /// Envelopes currently held in history
    pub retained: usize,
    /// Oldest sequence still replayable
    pub oldest_retained: Option<u64>,
    /// Attached subscriber sessions
    pub subscribers: usize,
    pub closed: bool,
}

#[derive(Debug, Default)]
struct ChannelState {
    last_sequence: u64,
    history: VecDeque<Arc<MessageEnvelope>>,
    subscribers: HashMap<String, Arc<DeliveryQueue>>,
    closed: bool,
}

/// Slot holding the sender side of the pending input request, if any
#[derive(Debug, Default)]
struct InputSlot {
    generation: u64,
    sender: Option<oneshot::Sender<InputSubmission>>,
    /// Set by `close`; submissions and new cycles are refused from then on
    closed: bool,
}

#[derive(Debug)]
pub(crate) struct ChannelInner {
    id: String,
    options: ChannelOptions,
    state: Mutex<ChannelState>,
    input: Mutex<InputSlot>,
    closed: CancellationToken,
}

/// Handle to a channel
///
/// Cloning is cheap; all clones address the same stream. Subscribers keep
/// only a weak reference, so a channel's lifetime is governed by the
/// registry and the publishing side.
#[derive(Debug, Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    /// Create a standalone channel
    pub fn new(id: impl Into<String>, options: ChannelOptions) -> Self {
        let options = ChannelOptions {
            history_capacity: options.history_capacity.max(1),
            queue_capacity: options.queue_capacity.max(1),
        };
        Self {
            inner: Arc::new(ChannelInner {
                id: id.into(),
                options,
                state: Mutex::new(ChannelState::default()),
                input: Mutex::new(InputSlot::default()),
                closed: CancellationToken::new(),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ChannelInner>) -> Self {
        Self { inner }
    }

    /// Channel identifier
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Publish an envelope to history and every attached subscriber
    ///
    /// Returns the assigned sequence once the envelope is enqueued. Full
    /// subscriber queues shed their oldest entries instead of blocking.
    pub fn publish(
        &self,
        kind: MessageKind,
        payload: serde_json::Value,
        metadata: Metadata,
    ) -> crate::Result<u64> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(crate::Error::ChannelClosed(self.inner.id.clone()));
        }

        let envelope = self.inner.append(&mut state, kind, payload, metadata);
        for queue in state.subscribers.values() {
            queue.push(Arc::clone(&envelope));
        }

        debug!(
            channel = %self.inner.id,
            sequence = envelope.sequence,
            kind = %kind,
            subscribers = state.subscribers.len(),
            "Published envelope"
        );
        Ok(envelope.sequence)
    }

    /// Publish a `status` envelope
    pub fn publish_status(&self, event: &StatusEvent) -> crate::Result<u64> {
        self.publish(MessageKind::Status, event.to_payload(), Metadata::new())
    }

    /// Attach a new subscriber session
    ///
    /// With `replay_from = Some(k)` the envelopes after `k` are delivered
    /// first; if that range has been evicted a single `gap` notice is
    /// delivered instead. `None` attaches for live envelopes only.
    pub fn subscribe(&self, replay_from: Option<u64>) -> crate::Result<SubscriberSession> {
        self.attach(uuid::Uuid::new_v4().to_string(), replay_from)
    }

    /// Reattach under an existing session id after a reconnect
    ///
    /// Any session currently attached under the same id is detached.
    pub fn resume(
        &self,
        session_id: impl Into<String>,
        cursor: u64,
    ) -> crate::Result<SubscriberSession> {
        self.attach(session_id.into(), Some(cursor))
    }

    fn attach(
        &self,
        session_id: String,
        replay_from: Option<u64>,
    ) -> crate::Result<SubscriberSession> {
        let queue = Arc::new(DeliveryQueue::new(
            self.inner.id.clone(),
            self.inner.options.queue_capacity,
        ));

        let (cursor, replaced) = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(crate::Error::ChannelClosed(self.inner.id.clone()));
            }

            let latest = state.last_sequence;
            let cursor = match replay_from {
                Some(from) if from < latest => {
                    let oldest = state
                        .history
                        .front()
                        .map(|e| e.sequence)
                        .unwrap_or(latest + 1);
                    if from + 1 < oldest {
                        queue.set_lead(MessageEnvelope::notice(
                            self.inner.id.clone(),
                            &StatusEvent::Gap {
                                requested_after: from,
                                oldest_retained: oldest,
                                latest,
                            },
                        ));
                        latest
                    } else {
                        queue.preload(
                            state
                                .history
                                .iter()
                                .filter(|e| e.sequence > from)
                                .cloned(),
                        );
                        from
                    }
                }
                _ => latest,
            };

            let replaced = state
                .subscribers
                .insert(session_id.clone(), Arc::clone(&queue));
            (cursor, replaced)
        };

        if let Some(previous) = replaced {
            previous.detach();
            debug!(channel = %self.inner.id, session = %session_id, "Replaced previous attachment");
        }

        info!(
            channel = %self.inner.id,
            session = %session_id,
            replay_from = ?replay_from,
            cursor,
            "Subscriber attached"
        );

        Ok(SubscriberSession::new(
            session_id,
            self.inner.id.clone(),
            cursor,
            queue,
            Arc::downgrade(&self.inner),
        ))
    }

    /// Detach a subscriber session; returns whether it was attached
    pub fn unsubscribe(&self, session_id: &str) -> bool {
        let removed = self.inner.state.lock().subscribers.remove(session_id);
        match removed {
            Some(queue) => {
                queue.detach();
                info!(channel = %self.inner.id, session = %session_id, "Subscriber detached");
                true
            }
            None => false,
        }
    }

    /// Close the channel
    ///
    /// Every attached subscriber receives one final `closed` status after
    /// whatever is already queued for it, then its stream ends. A pending
    /// input wait is released. Returns `false` if already closed.
    pub fn close(&self) -> bool {
        let subscribers = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return false;
            }

            let event = StatusEvent::Closed {
                channel_id: self.inner.id.clone(),
            };
            let envelope = self.inner.append(
                &mut state,
                MessageKind::Status,
                event.to_payload(),
                Metadata::new(),
            );
            for queue in state.subscribers.values() {
                queue.push(Arc::clone(&envelope));
            }
            state.closed = true;
            std::mem::take(&mut state.subscribers)
        };

        for queue in subscribers.values() {
            queue.close();
        }
        {
            let mut slot = self.inner.input.lock();
            slot.closed = true;
            slot.sender = None;
        }
        self.inner.closed.cancel();

        info!(
            channel = %self.inner.id,
            subscribers = subscribers.len(),
            "Channel closed"
        );
        true
    }

    /// Whether the channel has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Resolves once the channel is closed
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await
    }

    /// Offer input for the pending input request
    ///
    /// The first submission of a cycle resolves the request; later ones,
    /// and any sent while no request is pending, are discarded.
    pub fn submit_input(
        &self,
        session_id: &str,
        content: impl Into<String>,
    ) -> crate::Result<InputDisposition> {
        let submission = InputSubmission::new(session_id, content);
        let mut slot = self.inner.input.lock();
        if slot.closed {
            return Err(crate::Error::ChannelClosed(self.inner.id.clone()));
        }
        let disposition = match slot.sender.take() {
            Some(sender) => match sender.send(submission) {
                Ok(()) => InputDisposition::Accepted,
                Err(_) => InputDisposition::Discarded,
            },
            None => InputDisposition::Discarded,
        };
        drop(slot);

        debug!(
            channel = %self.inner.id,
            session = %session_id,
            disposition = ?disposition,
            "Input submitted"
        );
        Ok(disposition)
    }

    /// Open an input cycle; the returned waiter resolves with the first
    /// submission. Opening a new cycle abandons any previous one.
    pub fn wait_for_input(&self) -> crate::Result<InputWaiter> {
        let (tx, rx) = oneshot::channel();
        let generation = {
            let mut slot = self.inner.input.lock();
            if slot.closed {
                return Err(crate::Error::ChannelClosed(self.inner.id.clone()));
            }
            slot.generation += 1;
            slot.sender = Some(tx);
            slot.generation
        };
        Ok(InputWaiter {
            rx,
            channel: self.clone(),
            generation,
        })
    }

    /// Snapshot of the retained history, oldest first
    pub fn history(&self) -> Vec<Arc<MessageEnvelope>> {
        self.inner.state.lock().history.iter().cloned().collect()
    }

    /// Point-in-time diagnostics
    pub fn stats(&self) -> ChannelStats {
        let state = self.inner.state.lock();
        ChannelStats {
            channel_id: self.inner.id.clone(),
            last_sequence: state.last_sequence,
            retained: state.history.len(),
            oldest_retained: state.history.front().map(|e| e.sequence),
            subscribers: state.subscribers.len(),
            closed: state.closed,
        }
    }
}

impl ChannelInner {
    /// Assign the next sequence and insert into history under the state lock
    fn append(
        &self,
        state: &mut ChannelState,
        kind: MessageKind,
        payload: serde_json::Value,
        metadata: Metadata,
    ) -> Arc<MessageEnvelope> {
        state.last_sequence += 1;
        let envelope = Arc::new(MessageEnvelope {
            channel_id: self.id.clone(),
            sequence: state.last_sequence,
            timestamp: Utc::now(),
            kind,
            metadata,
            payload,
        });

        state.history.push_back(Arc::clone(&envelope));
        while state.history.len() > self.options.history_capacity {
            state.history.pop_front();
        }
        envelope
    }

    /// Remove `queue` if it is still the attachment registered for `session_id`.
    pub(crate) fn detach(&self, session_id: &str, queue: &Arc<DeliveryQueue>) {
        let removed = {
            let mut state = self.state.lock();
            match state.subscribers.get(session_id) {
                Some(current) if Arc::ptr_eq(current, queue) => {
                    state.subscribers.remove(session_id)
                }
                _ => None,
            }
        };
        queue.detach();
        if removed.is_some() {
            info!(channel = %self.id, session = %session_id, "Subscriber detached");
        }
    }

    fn clear_input(&self, generation: u64) {
        let mut slot = self.input.lock();
        if slot.generation == generation {
            slot.sender = None;
        }
    }
}

/// Receiving side of one input cycle
///
/// Dropping the waiter ends the cycle; submissions arriving afterwards are
/// discarded.
#[derive(Debug)]
pub struct InputWaiter {
    rx: oneshot::Receiver<InputSubmission>,
    channel: Channel,
    generation: u64,
}

impl InputWaiter {
    /// Wait for the winning submission; `None` if the cycle was abandoned
    /// (channel closed or a newer cycle opened).
    pub async fn recv(&mut self) -> Option<InputSubmission> {
        (&mut self.rx).await.ok()
    }

    /// End the cycle, returning a submission that won the race against
    /// cancellation, if any.
    pub fn cancel(mut self) -> Option<InputSubmission> {
        self.channel.inner.clear_input(self.generation);
        self.rx.try_recv().ok()
    }
}

impl Drop for InputWaiter {
    fn drop(&mut self) {
        self.channel.inner.clear_input(self.generation);
    }
}
