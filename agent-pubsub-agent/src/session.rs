//! Agent session wiring

use crate::display::{DisplaySink, PublishingDisplay};
use crate::input::{InputBridge, LineReader};
use agent_pubsub_core::bus::{Channel, ChannelRegistry};
use agent_pubsub_core::config::PubSubConfig;
use agent_pubsub_core::utils::channel_id_for;
use std::sync::Arc;
use tracing::{debug, info};

/// One agent conversation and its channel
///
/// The pub/sub flags are read once here; changing the configuration later
/// does not affect an existing session.
pub struct AgentSession {
    name: String,
    channel_id: String,
    channel: Option<Channel>,
    display: PublishingDisplay,
    input: InputBridge,
    registry: Arc<ChannelRegistry>,
}

impl AgentSession {
    pub fn new(
        name: impl Into<String>,
        config: &PubSubConfig,
        registry: Arc<ChannelRegistry>,
        console: Arc<dyn DisplaySink>,
        reader: Arc<dyn LineReader>,
    ) -> Self {
        let name = name.into();
        let channel_id = channel_id_for(&name);

        let channel = config
            .enabled
            .then(|| registry.get_or_create(&channel_id));
        let console = config.console_enabled.then_some(console);

        let input = match &channel {
            Some(channel) => InputBridge::remote(channel.clone(), config.input_timeout()),
            None => InputBridge::local(reader),
        };
        let display = PublishingDisplay::new(console, channel.clone());

        info!(
            session = %name,
            channel = %channel_id,
            pubsub = config.enabled,
            console = config.console_enabled,
            "Agent session started"
        );

        Self {
            name,
            channel_id,
            channel,
            display,
            input,
            registry,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// The session's channel when pub/sub is enabled
    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    pub fn display(&self) -> &PublishingDisplay {
        &self.display
    }

    pub fn input(&self) -> &InputBridge {
        &self.input
    }

    /// Obtain the next user turn from the terminal or from subscribers
    pub async fn request_input(&self, default_prompt: &str) -> agent_pubsub_core::Result<String> {
        self.input.request_input(default_prompt).await
    }

    /// Retire the session's channel; subscribers get a final `closed` status
    pub fn end(&self) {
        if self.channel.is_none() {
            return;
        }
        match self.registry.close(&self.channel_id) {
            Ok(()) => info!(session = %self.name, channel = %self.channel_id, "Agent session ended"),
            Err(e) => debug!(channel = %self.channel_id, "Channel already retired: {}", e),
        }
    }
}
