//! Process-wide channel lookup

use super::channel::{Channel, ChannelOptions};
use super::envelope::{InputDisposition, MessageKind, Metadata};
use super::subscriber::SubscriberSession;
use crate::config::PubSubConfig;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::info;

/// Maps channel ids to live channels
///
/// Construct one per process and share it (`Arc<ChannelRegistry>`) with
/// whatever builds agent sessions and whatever bridges subscribers in.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: RwLock<HashMap<String, Channel>>,
    options: ChannelOptions,
}

impl ChannelRegistry {
    /// Create a registry whose channels use the capacities in `config`
    pub fn new(config: &PubSubConfig) -> Self {
        Self::with_options(ChannelOptions::from(config))
    }

    /// Create a registry with explicit channel options
    pub fn with_options(options: ChannelOptions) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            options,
        }
    }

    /// Return the channel for `channel_id`, creating it if needed
    ///
    /// Concurrent callers for the same id always get the same channel. A
    /// channel that was closed behind the registry's back is replaced.
    pub fn get_or_create(&self, channel_id: &str) -> Channel {
        if let Some(channel) = self.channels.read().get(channel_id) {
            if !channel.is_closed() {
                return channel.clone();
            }
        }

        let mut channels = self.channels.write();
        if let Some(channel) = channels.get(channel_id) {
            if !channel.is_closed() {
                return channel.clone();
            }
        }

        let channel = Channel::new(channel_id, self.options);
        channels.insert(channel_id.to_string(), channel.clone());
        info!(channel = %channel_id, "Created new channel");
        channel
    }

    /// Return the channel for `channel_id` if it exists
    pub fn get_channel(&self, channel_id: &str) -> Option<Channel> {
        self.channels
            .read()
            .get(channel_id)
            .filter(|channel| !channel.is_closed())
            .cloned()
    }

    /// Ids of all live channels, sorted
    pub fn list_channels(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .channels
            .read()
            .iter()
            .filter(|(_, channel)| !channel.is_closed())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of channels held
    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    /// Whether the registry holds no channels
    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }

    /// Publish on `channel_id`, creating the channel if needed
    pub fn publish(
        &self,
        channel_id: &str,
        kind: MessageKind,
        payload: serde_json::Value,
        metadata: Metadata,
    ) -> crate::Result<u64> {
        self.get_or_create(channel_id).publish(kind, payload, metadata)
    }

    /// Subscribe to `channel_id`, creating the channel if needed
    pub fn subscribe(
        &self,
        channel_id: &str,
        replay_from: Option<u64>,
    ) -> crate::Result<SubscriberSession> {
        self.get_or_create(channel_id).subscribe(replay_from)
    }

    /// Subscribe to an existing channel only
    ///
    /// Transports use this for reconnects so a retired session is not
    /// resurrected as an empty channel.
    pub fn attach(
        &self,
        channel_id: &str,
        replay_from: Option<u64>,
    ) -> crate::Result<SubscriberSession> {
        self.existing(channel_id)?.subscribe(replay_from)
    }

    /// Reattach `session_id` to an existing channel after a reconnect
    pub fn resume(
        &self,
        channel_id: &str,
        session_id: &str,
        cursor: u64,
    ) -> crate::Result<SubscriberSession> {
        self.existing(channel_id)?.resume(session_id, cursor)
    }

    /// Detach `session_id` from `channel_id`; idempotent
    pub fn unsubscribe(&self, channel_id: &str, session_id: &str) -> bool {
        self.get_channel(channel_id)
            .is_some_and(|channel| channel.unsubscribe(session_id))
    }

    /// Offer input on an existing channel
    pub fn submit_input(
        &self,
        channel_id: &str,
        session_id: &str,
        content: impl Into<String>,
    ) -> crate::Result<InputDisposition> {
        self.existing(channel_id)?.submit_input(session_id, content)
    }

    /// Close `channel_id` and retire it from the registry
    ///
    /// A later [`get_or_create`](Self::get_or_create) for the same id starts a
    /// fresh channel with sequence numbering restarted.
    pub fn close(&self, channel_id: &str) -> crate::Result<()> {
        let channel = self
            .channels
            .write()
            .remove(channel_id)
            .ok_or_else(|| crate::Error::ChannelNotFound(channel_id.to_string()))?;
        channel.close();
        info!(channel = %channel_id, "Removed channel");
        Ok(())
    }

    /// Close and retire every channel; returns how many were held
    pub fn close_all(&self) -> usize {
        let channels: Vec<Channel> = self.channels.write().drain().map(|(_, c)| c).collect();
        for channel in &channels {
            channel.close();
        }
        channels.len()
    }

    fn existing(&self, channel_id: &str) -> crate::Result<Channel> {
        self.get_channel(channel_id)
            .ok_or_else(|| crate::Error::ChannelNotFound(channel_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::StatusEvent;
    use serde_json::json;
    use std::sync::Arc;

    fn registry() -> ChannelRegistry {
        ChannelRegistry::new(&PubSubConfig::default())
    }

    #[test]
    fn test_get_or_create_returns_same_channel() {
        let registry = registry();
        let a = registry.get_or_create("agent_1");
        a.publish(MessageKind::UserMessage, json!("hi"), Metadata::new())
            .unwrap();

        let b = registry.get_or_create("agent_1");
        assert_eq!(b.stats().last_sequence, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_concurrent_creation_has_single_winner() {
        let registry = Arc::new(registry());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry
                        .get_or_create("agent_1")
                        .publish(MessageKind::Status, json!({}), Metadata::new())
                        .unwrap()
                })
            })
            .collect();

        let mut seqs: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        seqs.sort();
        assert_eq!(seqs, (1..=8).collect::<Vec<_>>());
        assert_eq!(registry.list_channels(), vec!["agent_1".to_string()]);
    }

    #[test]
    fn test_close_retires_and_restarts_numbering() {
        let registry = registry();
        registry
            .publish("agent_1", MessageKind::AssistantMessage, json!("a"), Metadata::new())
            .unwrap();
        let mut session = registry.subscribe("agent_1", None).unwrap();

        registry.close("agent_1").unwrap();
        let last = session.try_recv().unwrap();
        assert!(matches!(last.status_event(), Some(StatusEvent::Closed { .. })));
        assert!(registry.get_channel("agent_1").is_none());

        let seq = registry
            .publish("agent_1", MessageKind::AssistantMessage, json!("b"), Metadata::new())
            .unwrap();
        assert_eq!(seq, 1);
    }

    #[test]
    fn test_close_unknown_channel() {
        let registry = registry();
        assert!(matches!(
            registry.close("missing"),
            Err(crate::Error::ChannelNotFound(_))
        ));
    }

    #[test]
    fn test_attach_requires_existing_channel() {
        let registry = registry();
        assert!(matches!(
            registry.attach("agent_1", None),
            Err(crate::Error::ChannelNotFound(_))
        ));
        assert!(registry.is_empty());

        registry.get_or_create("agent_1");
        assert!(registry.attach("agent_1", None).is_ok());
    }

    #[test]
    fn test_submit_input_unknown_channel() {
        let registry = registry();
        assert!(matches!(
            registry.submit_input("agent_1", "s1", "hello"),
            Err(crate::Error::ChannelNotFound(_))
        ));
    }

    #[test]
    fn test_channel_closed_directly_is_replaced() {
        let registry = registry();
        let channel = registry.get_or_create("agent_1");
        channel.close();

        assert!(registry.list_channels().is_empty());
        let fresh = registry.get_or_create("agent_1");
        assert!(!fresh.is_closed());
    }

    #[test]
    fn test_close_all() {
        let registry = registry();
        let a = registry.get_or_create("a");
        let b = registry.get_or_create("b");

        assert_eq!(registry.close_all(), 2);
        assert!(a.is_closed());
        assert!(b.is_closed());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unsubscribe_through_registry() {
        let registry = registry();
        let session = registry.subscribe("agent_1", None).unwrap();
        let id = session.session_id().to_string();

        assert!(registry.unsubscribe("agent_1", &id));
        assert!(!registry.unsubscribe("agent_1", &id));
        assert!(!registry.unsubscribe("other", &id));
    }
}
