//! Bounded per-subscriber delivery queue
//!
//! Pushing never blocks. When the queue is full the oldest undelivered
//! envelope is evicted and the run of evictions is reported to the
//! consumer as a single `dropped` notice ahead of the surviving envelopes.
//! Replay backlog loaded at attach time is held on top of the live bound,
//! so a subscriber recovering from drops gets the whole retained range.

use super::envelope::{MessageEnvelope, StatusEvent};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

/// Contiguous run of envelopes evicted since the consumer last drained
#[derive(Debug, Clone, Copy)]
struct DropRun {
    count: u64,
    first: u64,
    last: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    /// Notice delivered before anything else (replay gap)
    lead: Option<Arc<MessageEnvelope>>,
    /// Evictions not yet reported
    pending_drop: Option<DropRun>,
    items: VecDeque<Arc<MessageEnvelope>>,
    /// Replayed envelopes still at the front of `items`
    backlog: usize,
    total_dropped: u64,
    closed: bool,
}

/// Result of a non-blocking pop
#[derive(Debug)]
pub(crate) enum Pop {
    Item(Arc<MessageEnvelope>),
    Empty,
    Closed,
}

/// Single-consumer queue between a channel and one subscriber session
#[derive(Debug)]
pub(crate) struct DeliveryQueue {
    channel_id: String,
    capacity: usize,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl DeliveryQueue {
    pub(crate) fn new(channel_id: impl Into<String>, capacity: usize) -> Self {
        Self {
            channel_id: channel_id.into(),
            capacity: capacity.max(1),
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    /// Enqueue an envelope, evicting the oldest one if the queue is full.
    pub(crate) fn push(&self, envelope: Arc<MessageEnvelope>) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }

        if state.items.len() >= self.capacity + state.backlog {
            if let Some(evicted) = state.items.pop_front() {
                state.backlog = state.backlog.saturating_sub(1);
                let sequence = evicted.sequence;
                state.total_dropped += 1;
                state.pending_drop = Some(match state.pending_drop {
                    Some(run) => DropRun {
                        count: run.count + 1,
                        first: run.first,
                        last: sequence,
                    },
                    None => DropRun {
                        count: 1,
                        first: sequence,
                        last: sequence,
                    },
                });
                debug!(
                    channel = %self.channel_id,
                    sequence,
                    "Delivery queue full, dropped oldest envelope"
                );
            }
        }

        state.items.push_back(envelope);
        drop(state);
        self.notify.notify_one();
    }

    /// Load replayed envelopes ahead of live traffic, outside the live bound.
    pub(crate) fn preload(&self, envelopes: impl IntoIterator<Item = Arc<MessageEnvelope>>) {
        let mut state = self.state.lock();
        let before = state.items.len();
        state.items.extend(envelopes);
        state.backlog += state.items.len() - before;
        drop(state);
        self.notify.notify_one();
    }

    /// Set the notice delivered before any queued envelope.
    pub(crate) fn set_lead(&self, notice: MessageEnvelope) {
        self.state.lock().lead = Some(Arc::new(notice));
        self.notify.notify_one();
    }

    pub(crate) fn try_pop(&self) -> Pop {
        let mut state = self.state.lock();

        if let Some(lead) = state.lead.take() {
            return Pop::Item(lead);
        }
        if let Some(run) = state.pending_drop.take() {
            let event = StatusEvent::Dropped {
                count: run.count,
                first_dropped: run.first,
                last_dropped: run.last,
            };
            return Pop::Item(Arc::new(MessageEnvelope::notice(
                self.channel_id.clone(),
                &event,
            )));
        }
        match state.items.pop_front() {
            Some(envelope) => {
                state.backlog = state.backlog.saturating_sub(1);
                Pop::Item(envelope)
            }
            None if state.closed => Pop::Closed,
            None => Pop::Empty,
        }
    }

    /// Wait for the next envelope; `None` once closed and drained.
    pub(crate) async fn pop(&self) -> Option<Arc<MessageEnvelope>> {
        loop {
            match self.try_pop() {
                Pop::Item(envelope) => return Some(envelope),
                Pop::Closed => return None,
                // notify_one leaves a permit when nobody waits, so a push
                // racing with this branch is never missed.
                Pop::Empty => self.notify.notified().await,
            }
        }
    }

    /// Stop accepting envelopes; already queued ones remain deliverable.
    pub(crate) fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_one();
    }

    /// Stop accepting envelopes and discard everything still queued.
    pub(crate) fn detach(&self) {
        {
            let mut state = self.state.lock();
            state.closed = true;
            state.lead = None;
            state.pending_drop = None;
            state.items.clear();
            state.backlog = 0;
        }
        self.notify.notify_one();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub(crate) fn total_dropped(&self) -> u64 {
        self.state.lock().total_dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::envelope::{MessageKind, Metadata};
    use chrono::Utc;

    fn envelope(sequence: u64) -> Arc<MessageEnvelope> {
        Arc::new(MessageEnvelope {
            channel_id: "test".to_string(),
            sequence,
            timestamp: Utc::now(),
            kind: MessageKind::AssistantMessage,
            metadata: Metadata::new(),
            payload: serde_json::json!(sequence),
        })
    }

    fn drain(queue: &DeliveryQueue) -> Vec<Arc<MessageEnvelope>> {
        let mut out = Vec::new();
        while let Pop::Item(envelope) = queue.try_pop() {
            out.push(envelope);
        }
        out
    }

    #[test]
    fn test_fifo_within_capacity() {
        let queue = DeliveryQueue::new("test", 4);
        for seq in 1..=3 {
            queue.push(envelope(seq));
        }
        let seqs: Vec<u64> = drain(&queue).iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn test_overflow_drops_oldest_and_reports_once() {
        let queue = DeliveryQueue::new("test", 2);
        for seq in 1..=5 {
            queue.push(envelope(seq));
        }

        let out = drain(&queue);
        assert_eq!(out.len(), 3);
        assert_eq!(
            out[0].status_event(),
            Some(StatusEvent::Dropped {
                count: 3,
                first_dropped: 1,
                last_dropped: 3,
            })
        );
        assert_eq!(out[1].sequence, 4);
        assert_eq!(out[2].sequence, 5);
        assert_eq!(queue.total_dropped(), 3);
    }

    #[test]
    fn test_preloaded_backlog_survives_live_traffic() {
        let queue = DeliveryQueue::new("test", 2);
        queue.preload((1..=5).map(envelope));
        queue.push(envelope(6));
        queue.push(envelope(7));

        let seqs: Vec<u64> = drain(&queue).iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(queue.total_dropped(), 0);
    }

    #[test]
    fn test_live_overflow_after_backlog_drops_oldest() {
        let queue = DeliveryQueue::new("test", 2);
        queue.preload((1..=3).map(envelope));
        for seq in 4..=6 {
            queue.push(envelope(seq));
        }

        let out = drain(&queue);
        assert_eq!(
            out[0].status_event(),
            Some(StatusEvent::Dropped {
                count: 1,
                first_dropped: 1,
                last_dropped: 1,
            })
        );
        let seqs: Vec<u64> = out[1..].iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_lead_comes_first() {
        let queue = DeliveryQueue::new("test", 2);
        queue.push(envelope(9));
        queue.set_lead(MessageEnvelope::notice(
            "test",
            &StatusEvent::Gap {
                requested_after: 1,
                oldest_retained: 5,
                latest: 8,
            },
        ));

        let out = drain(&queue);
        assert!(out[0].is_notice());
        assert_eq!(out[1].sequence, 9);
    }

    #[test]
    fn test_close_flushes_then_ends() {
        let queue = DeliveryQueue::new("test", 4);
        queue.push(envelope(1));
        queue.close();
        queue.push(envelope(2));

        assert!(matches!(queue.try_pop(), Pop::Item(e) if e.sequence == 1));
        assert!(matches!(queue.try_pop(), Pop::Closed));
    }

    #[test]
    fn test_detach_discards() {
        let queue = DeliveryQueue::new("test", 4);
        queue.push(envelope(1));
        queue.detach();
        assert!(matches!(queue.try_pop(), Pop::Closed));
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let queue = Arc::new(DeliveryQueue::new("test", 4));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::task::yield_now().await;
        queue.push(envelope(1));

        let received = consumer.await.unwrap().unwrap();
        assert_eq!(received.sequence, 1);
    }
}
