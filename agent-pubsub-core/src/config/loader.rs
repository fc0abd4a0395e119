//! Configuration loading and management

use super::schema::Config;
use super::validate::validate_config;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Prefix for path-style environment overrides, e.g.
/// `AGENT_PUBSUB__PUBSUB__QUEUE_CAPACITY=64`
const ENV_PATH_PREFIX: &str = "AGENT_PUBSUB__";

/// Configuration loader
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// Create a new config loader with the default config directory
    pub fn new() -> Self {
        let config_dir = dirs::home_dir()
            .map(|h| h.join(".agent-pubsub"))
            .unwrap_or_else(|| PathBuf::from(".agent-pubsub"));

        Self { config_dir }
    }

    /// Create a new config loader with a custom config directory
    pub fn with_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            config_dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Load configuration from file and environment
    pub fn load(&self) -> crate::Result<Config> {
        let config_path = self.config_path();
        let mut merged = serde_json::to_value(Config::default())?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let file_value: Value = serde_json::from_str(&content).map_err(|e| {
                crate::Error::Config(format!("{}: {}", config_path.display(), e))
            })?;
            merge_values(&mut merged, file_value);
        }

        apply_alias_overrides(&mut merged);
        apply_path_overrides(&mut merged);

        let config: Config = serde_json::from_value(merged)?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, config: &Config) -> crate::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(self.config_path(), content)?;
        Ok(())
    }

    /// Get the config directory path
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                if let Some(existing) = base_map.get_mut(&key) {
                    merge_values(existing, value);
                } else {
                    base_map.insert(key, value);
                }
            }
        }
        (base_value, overlay_value) => {
            *base_value = overlay_value;
        }
    }
}

fn parse_env_value(raw: &str) -> Value {
    if let Ok(v) = serde_json::from_str::<Value>(raw) {
        return v;
    }
    if raw.eq_ignore_ascii_case("true") || raw.eq_ignore_ascii_case("on") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") || raw.eq_ignore_ascii_case("off") {
        return Value::Bool(false);
    }
    Value::String(raw.to_string())
}

fn set_path_value(root: &mut Value, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        *root = value;
        return;
    };

    let mut current = root;
    for segment in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        current = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Some(map) = current.as_object_mut() {
        map.insert(last.clone(), value);
    }
}

fn apply_alias_overrides(config: &mut Value) {
    let aliases = [
        ("AGENT_PUBSUB_ENABLED", "pubsub.enabled"),
        ("AGENT_PUBSUB_CONSOLE", "pubsub.console_enabled"),
        ("AGENT_PUBSUB_INPUT_TIMEOUT", "pubsub.input_timeout_secs"),
    ];

    for (env_key, target_path) in aliases {
        if let Ok(value) = std::env::var(env_key) {
            let path: Vec<String> = target_path.split('.').map(ToString::to_string).collect();
            set_path_value(config, &path, parse_env_value(&value));
        }
    }
}

fn apply_path_overrides(config: &mut Value) {
    for (key, value) in std::env::vars() {
        let Some(suffix) = key.strip_prefix(ENV_PATH_PREFIX) else {
            continue;
        };
        let segments: Vec<String> = suffix
            .split("__")
            .filter(|s| !s.is_empty())
            .map(|s| s.to_ascii_lowercase())
            .collect();
        if segments.is_empty() {
            continue;
        }
        set_path_value(config, &segments, parse_env_value(&value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use std::sync::{Mutex, MutexGuard};
    use tempfile::TempDir;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    struct EnvVarGuard {
        key: String,
        original: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &str, value: &str) -> Self {
            let original = std::env::var(key).ok();
            std::env::set_var(key, value);
            Self {
                key: key.to_string(),
                original,
            }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.original {
                std::env::set_var(&self.key, value);
            } else {
                std::env::remove_var(&self.key);
            }
        }
    }

    fn lock_env() -> MutexGuard<'static, ()> {
        ENV_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[test]
    fn test_load_default_config() {
        let _lock = lock_env();
        let temp_dir = TempDir::new().unwrap();
        let loader = ConfigLoader::with_dir(temp_dir.path());
        let config = loader.load().unwrap();

        assert!(!config.pubsub.enabled);
        assert_eq!(config.pubsub.history_capacity, 200);
    }

    #[test]
    fn test_save_and_load_config() {
        let _lock = lock_env();
        let temp_dir = TempDir::new().unwrap();
        let loader = ConfigLoader::with_dir(temp_dir.path());

        let mut config = Config::default();
        config.pubsub.enabled = true;
        config.pubsub.queue_capacity = 32;

        loader.save(&config).unwrap();
        let loaded = loader.load().unwrap();

        assert!(loaded.pubsub.enabled);
        assert_eq!(loaded.pubsub.queue_capacity, 32);
    }

    #[test]
    fn test_load_applies_alias_env_overrides() {
        let _lock = lock_env();
        let _enabled_guard = EnvVarGuard::set("AGENT_PUBSUB_ENABLED", "true");
        let _timeout_guard = EnvVarGuard::set("AGENT_PUBSUB_INPUT_TIMEOUT", "45");

        let temp_dir = TempDir::new().unwrap();
        let loader = ConfigLoader::with_dir(temp_dir.path());
        let config = loader.load().unwrap();

        assert!(config.pubsub.enabled);
        assert_eq!(config.pubsub.input_timeout_secs, 45);
    }

    #[test]
    fn test_path_env_overrides_file() {
        let _lock = lock_env();
        let _queue_guard = EnvVarGuard::set("AGENT_PUBSUB__PUBSUB__QUEUE_CAPACITY", "64");
        let _format_guard = EnvVarGuard::set("AGENT_PUBSUB__LOGGING__FORMAT", "json");

        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("config.json"),
            r#"{"pubsub":{"queue_capacity":8,"history_capacity":50}}"#,
        )
        .unwrap();

        let config = ConfigLoader::with_dir(temp_dir.path()).load().unwrap();
        assert_eq!(config.pubsub.queue_capacity, 64);
        assert_eq!(config.pubsub.history_capacity, 50);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let _lock = lock_env();
        let _timeout_guard = EnvVarGuard::set("AGENT_PUBSUB__PUBSUB__INPUT_TIMEOUT_SECS", "0");

        let temp_dir = TempDir::new().unwrap();
        let err = ConfigLoader::with_dir(temp_dir.path()).load().unwrap_err();
        assert!(err.to_string().contains("input_timeout_secs"));
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let _lock = lock_env();
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("config.json"), "{ not json").unwrap();

        let err = ConfigLoader::with_dir(temp_dir.path()).load().unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
        assert!(err.to_string().contains("config.json"));
    }

    #[test]
    fn test_set_path_value_creates_parents() {
        let mut root = serde_json::json!({"pubsub": 1});
        set_path_value(
            &mut root,
            &["pubsub".to_string(), "enabled".to_string()],
            Value::Bool(true),
        );
        assert_eq!(root["pubsub"]["enabled"], Value::Bool(true));
    }
}
