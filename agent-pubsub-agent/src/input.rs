//! Interactive input bridge
//!
//! Decides where the agent's next user turn comes from: the local terminal,
//! or (in pub/sub mode) the first subscriber that answers an
//! `input_request` envelope before the timeout.

use agent_pubsub_core::bus::{Channel, MessageKind, Metadata, StatusEvent};
use async_trait::async_trait;
use console::style;
use parking_lot::Mutex;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{debug, info, warn};

/// Source of local user input
#[async_trait]
pub trait LineReader: Send + Sync {
    /// Read one line; `Ok(None)` at end of input.
    async fn read_line(&self, default_prompt: &str) -> agent_pubsub_core::Result<Option<String>>;
}

/// Reads lines from the process's stdin
pub struct StdinLineReader {
    lines: tokio::sync::Mutex<Lines<BufReader<Stdin>>>,
}

impl StdinLineReader {
    pub fn new() -> Self {
        Self {
            lines: tokio::sync::Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

impl Default for StdinLineReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LineReader for StdinLineReader {
    async fn read_line(&self, default_prompt: &str) -> agent_pubsub_core::Result<Option<String>> {
        if default_prompt.is_empty() {
            print!("{} ", style(">").bold().green());
        } else {
            print!("{} [{}] ", style(">").bold().green(), style(default_prompt).dim());
        }
        std::io::stdout().flush()?;

        let mut lines = self.lines.lock().await;
        match lines.next_line().await? {
            Some(line) if line.trim().is_empty() => Ok(Some(default_prompt.to_string())),
            Some(line) => Ok(Some(line)),
            None => Ok(None),
        }
    }
}

/// Where the bridge is in its request cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    AwaitingLocalInput,
    AwaitingRemoteInput,
}

enum InputSource {
    Local(Arc<dyn LineReader>),
    Remote { channel: Channel, timeout: Duration },
}

/// Per-session input bridge
pub struct InputBridge {
    source: InputSource,
    state: Arc<Mutex<BridgeState>>,
}

/// Puts the bridge back to idle however the request ends (including when
/// the request future is dropped)
struct StateGuard {
    state: Arc<Mutex<BridgeState>>,
}

impl Drop for StateGuard {
    fn drop(&mut self) {
        *self.state.lock() = BridgeState::Idle;
    }
}

enum RemoteOutcome {
    Received(String),
    TimedOut,
    Abandoned,
}

impl InputBridge {
    /// Bridge that reads from a local line reader
    pub fn local(reader: Arc<dyn LineReader>) -> Self {
        Self {
            source: InputSource::Local(reader),
            state: Arc::new(Mutex::new(BridgeState::Idle)),
        }
    }

    /// Bridge that waits for input submitted on `channel`
    pub fn remote(channel: Channel, timeout: Duration) -> Self {
        Self {
            source: InputSource::Remote { channel, timeout },
            state: Arc::new(Mutex::new(BridgeState::Idle)),
        }
    }

    /// Current state
    pub fn state(&self) -> BridgeState {
        *self.state.lock()
    }

    /// Whether input comes from subscribers
    pub fn is_remote(&self) -> bool {
        matches!(self.source, InputSource::Remote { .. })
    }

    fn enter(&self, next: BridgeState) -> agent_pubsub_core::Result<StateGuard> {
        let mut state = self.state.lock();
        if *state != BridgeState::Idle {
            return Err(agent_pubsub_core::Error::InputPending(format!(
                "bridge is {:?}",
                *state
            )));
        }
        *state = next;
        Ok(StateGuard {
            state: Arc::clone(&self.state),
        })
    }

    /// Obtain the next user turn
    ///
    /// Remote mode never fails: timeouts and closed channels resolve to
    /// `default_prompt`. Local mode fails if the terminal reaches end of input.
    pub async fn request_input(&self, default_prompt: &str) -> agent_pubsub_core::Result<String> {
        match &self.source {
            InputSource::Local(reader) => {
                let _guard = self.enter(BridgeState::AwaitingLocalInput)?;
                match reader.read_line(default_prompt).await? {
                    Some(line) => Ok(line),
                    None => Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "input stream closed",
                    )
                    .into()),
                }
            }
            InputSource::Remote { channel, timeout } => {
                let _guard = self.enter(BridgeState::AwaitingRemoteInput)?;
                Ok(request_remote(channel, *timeout, default_prompt).await)
            }
        }
    }
}

async fn request_remote(channel: &Channel, timeout: Duration, default_prompt: &str) -> String {
    // Open the cycle before announcing it so an immediate answer is not lost.
    let mut waiter = match channel.wait_for_input() {
        Ok(waiter) => waiter,
        Err(e) => {
            warn!(channel = %channel.id(), "Remote input unavailable, using default prompt: {}", e);
            return default_prompt.to_string();
        }
    };

    let request = json!({
        "default_prompt": default_prompt,
        "timeout_secs": timeout.as_secs(),
    });
    if let Err(e) = channel.publish(MessageKind::InputRequest, request, Metadata::new()) {
        warn!(channel = %channel.id(), "Failed to publish input request, using default prompt: {}", e);
        return default_prompt.to_string();
    }
    debug!(channel = %channel.id(), timeout_secs = timeout.as_secs(), "Awaiting remote input");

    let outcome = tokio::select! {
        biased;
        submission = waiter.recv() => match submission {
            Some(submission) => RemoteOutcome::Received(submission.content),
            None => RemoteOutcome::Abandoned,
        },
        _ = channel.closed() => RemoteOutcome::Abandoned,
        _ = tokio::time::sleep(timeout) => RemoteOutcome::TimedOut,
    };

    match outcome {
        RemoteOutcome::Received(content) => {
            info!(channel = %channel.id(), "Remote input received");
            content
        }
        RemoteOutcome::TimedOut => {
            if let Some(submission) = waiter.cancel() {
                info!(channel = %channel.id(), "Remote input received at timeout");
                return submission.content;
            }
            info!(
                channel = %channel.id(),
                timeout_secs = timeout.as_secs(),
                "Remote input timed out, using default prompt"
            );
            let event = StatusEvent::InputTimeout {
                default_prompt: default_prompt.to_string(),
                waited_secs: timeout.as_secs(),
            };
            if let Err(e) = channel.publish_status(&event) {
                warn!(channel = %channel.id(), "Failed to publish input timeout: {}", e);
            }
            default_prompt.to_string()
        }
        RemoteOutcome::Abandoned => {
            let reason = if channel.is_closed() {
                "channel closed"
            } else {
                "input request superseded"
            };
            warn!(channel = %channel.id(), reason, "Remote input abandoned, using default prompt");
            let event = StatusEvent::InputFallback {
                default_prompt: default_prompt.to_string(),
                reason: reason.to_string(),
            };
            if let Err(e) = channel.publish_status(&event) {
                debug!(channel = %channel.id(), "Input fallback not published: {}", e);
            }
            default_prompt.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_pubsub_core::bus::{ChannelOptions, InputDisposition, MessageEnvelope};
    use std::collections::VecDeque;

    struct ScriptedReader {
        lines: Mutex<VecDeque<String>>,
    }

    impl ScriptedReader {
        fn new(lines: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                lines: Mutex::new(lines.iter().map(|l| l.to_string()).collect()),
            })
        }
    }

    #[async_trait]
    impl LineReader for ScriptedReader {
        async fn read_line(&self, _default: &str) -> agent_pubsub_core::Result<Option<String>> {
            Ok(self.lines.lock().pop_front())
        }
    }

    fn statuses(envelopes: &[Arc<MessageEnvelope>]) -> Vec<StatusEvent> {
        envelopes.iter().filter_map(|e| e.status_event()).collect()
    }

    #[tokio::test]
    async fn test_local_reads_terminal() {
        let bridge = InputBridge::local(ScriptedReader::new(&["hello"]));
        assert!(!bridge.is_remote());

        assert_eq!(bridge.request_input("").await.unwrap(), "hello");
        assert_eq!(bridge.state(), BridgeState::Idle);

        let err = bridge.request_input("").await.unwrap_err();
        assert!(matches!(err, agent_pubsub_core::Error::Io(_)));
        assert_eq!(bridge.state(), BridgeState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_timeout_returns_default_with_one_status() {
        let channel = Channel::new("agent_1", ChannelOptions::default());
        let mut observer = channel.subscribe(None).unwrap();
        let bridge = InputBridge::remote(channel.clone(), Duration::from_secs(30));

        let line = bridge.request_input("continue").await.unwrap();
        assert_eq!(line, "continue");
        assert_eq!(bridge.state(), BridgeState::Idle);

        let mut received = Vec::new();
        while let Some(envelope) = observer.try_recv() {
            received.push(envelope);
        }
        assert_eq!(received[0].kind, MessageKind::InputRequest);
        assert_eq!(received[0].payload["default_prompt"], "continue");
        assert_eq!(
            statuses(&received),
            vec![StatusEvent::InputTimeout {
                default_prompt: "continue".to_string(),
                waited_secs: 30,
            }]
        );
    }

    #[tokio::test]
    async fn test_remote_first_submission_wins() {
        let channel = Channel::new("agent_1", ChannelOptions::default());
        let mut controller = channel.subscribe(None).unwrap();
        let bridge = Arc::new(InputBridge::remote(channel.clone(), Duration::from_secs(60)));

        let task = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.request_input("").await })
        };

        let request = controller.recv().await.unwrap();
        assert_eq!(request.kind, MessageKind::InputRequest);
        assert_eq!(bridge.state(), BridgeState::AwaitingRemoteInput);

        assert_eq!(
            controller.submit_input("summarize").unwrap(),
            InputDisposition::Accepted
        );
        assert_eq!(
            controller.submit_input("ignored").unwrap(),
            InputDisposition::Discarded
        );

        assert_eq!(task.await.unwrap().unwrap(), "summarize");
        assert_eq!(bridge.state(), BridgeState::Idle);
    }

    #[tokio::test]
    async fn test_publishing_continues_while_waiting() {
        let channel = Channel::new("agent_1", ChannelOptions::default());
        let mut observer = channel.subscribe(None).unwrap();
        let bridge = Arc::new(InputBridge::remote(channel.clone(), Duration::from_secs(60)));

        let task = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.request_input("").await })
        };
        observer.recv().await.unwrap();

        let seq = channel
            .publish(MessageKind::Status, json!({"progress": 50}), Metadata::new())
            .unwrap();
        assert_eq!(observer.recv().await.unwrap().sequence, seq);

        observer.submit_input("go").unwrap();
        assert_eq!(task.await.unwrap().unwrap(), "go");
    }

    #[tokio::test]
    async fn test_remote_close_falls_back() {
        let channel = Channel::new("agent_1", ChannelOptions::default());
        let mut observer = channel.subscribe(None).unwrap();
        let bridge = Arc::new(InputBridge::remote(channel.clone(), Duration::from_secs(60)));

        let task = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.request_input("fallback").await })
        };
        observer.recv().await.unwrap();
        channel.close();

        assert_eq!(task.await.unwrap().unwrap(), "fallback");
        assert_eq!(bridge.state(), BridgeState::Idle);
    }

    #[tokio::test]
    async fn test_remote_on_closed_channel_returns_default() {
        let channel = Channel::new("agent_1", ChannelOptions::default());
        channel.close();
        let bridge = InputBridge::remote(channel, Duration::from_secs(60));

        assert_eq!(bridge.request_input("default").await.unwrap(), "default");
    }

    #[tokio::test]
    async fn test_concurrent_request_is_rejected() {
        let channel = Channel::new("agent_1", ChannelOptions::default());
        let mut observer = channel.subscribe(None).unwrap();
        let bridge = Arc::new(InputBridge::remote(channel.clone(), Duration::from_secs(60)));

        let task = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.request_input("").await })
        };
        observer.recv().await.unwrap();

        assert!(matches!(
            bridge.request_input("").await,
            Err(agent_pubsub_core::Error::InputPending(_))
        ));

        observer.submit_input("done").unwrap();
        assert_eq!(task.await.unwrap().unwrap(), "done");
    }
}
