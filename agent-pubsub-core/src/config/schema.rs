//! Configuration schema definitions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration for agent-pubsub
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Pub/sub bus configuration
    #[serde(default)]
    pub pubsub: PubSubConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Pub/sub bus configuration
///
/// Read once when an agent session is constructed; toggling these at
/// runtime has no effect on sessions that already exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubSubConfig {
    /// Publish display events and redirect input to remote subscribers
    #[serde(default)]
    pub enabled: bool,
    /// Render display events on the local console
    #[serde(default = "default_true")]
    pub console_enabled: bool,
    /// Number of recent envelopes each channel retains for replay
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Per-subscriber delivery queue bound
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Seconds to wait for remote input before falling back to the default prompt
    #[serde(default = "default_input_timeout_secs")]
    pub input_timeout_secs: u64,
}

/// Default history buffer size per channel
pub const DEFAULT_HISTORY_CAPACITY: usize = 200;

/// Default delivery queue size per subscriber
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Default remote input timeout (5 minutes)
pub const DEFAULT_INPUT_TIMEOUT_SECS: u64 = 5 * 60;

fn default_true() -> bool {
    true
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_input_timeout_secs() -> u64 {
    DEFAULT_INPUT_TIMEOUT_SECS
}

impl PubSubConfig {
    /// Remote input timeout as a [`Duration`]
    pub fn input_timeout(&self) -> Duration {
        Duration::from_secs(self.input_timeout_secs)
    }
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            console_enabled: true,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            input_timeout_secs: DEFAULT_INPUT_TIMEOUT_SECS,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Module-specific overrides
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            dir: default_log_dir(),
            overrides: HashMap::new(),
        }
    }
}
