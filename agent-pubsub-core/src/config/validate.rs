//! Configuration validation rules.

use super::schema::Config;

/// Validate configuration and return aggregated validation errors.
pub fn validate_config(config: &Config) -> crate::Result<()> {
    let mut errors = Vec::new();
    let pubsub = &config.pubsub;

    if pubsub.history_capacity == 0 {
        errors.push("pubsub.history_capacity must be > 0".to_string());
    }
    if pubsub.queue_capacity == 0 {
        errors.push("pubsub.queue_capacity must be > 0".to_string());
    }
    if pubsub.input_timeout_secs == 0 {
        errors.push("pubsub.input_timeout_secs must be > 0".to_string());
    }
    if !pubsub.enabled && !pubsub.console_enabled {
        errors.push(
            "pubsub.console_enabled must be true when pubsub is disabled".to_string(),
        );
    }

    let format = config.logging.format.to_ascii_lowercase();
    if format != "text" && format != "json" {
        errors.push(format!(
            "logging.format must be \"text\" or \"json\", got \"{}\"",
            config.logging.format
        ));
    }
    if config.logging.level.trim().is_empty() {
        errors.push("logging.level must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(crate::Error::Validation(errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_defaults() {
        validate_config(&Config::default()).unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_capacities() {
        let mut config = Config::default();
        config.pubsub.history_capacity = 0;
        config.pubsub.queue_capacity = 0;

        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("pubsub.history_capacity"));
        assert!(err.contains("pubsub.queue_capacity"));
    }

    #[test]
    fn test_validate_requires_some_output() {
        let mut config = Config::default();
        config.pubsub.console_enabled = false;

        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("pubsub.console_enabled"));

        config.pubsub.enabled = true;
        validate_config(&config).unwrap();
    }

    #[test]
    fn test_validate_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();

        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("logging.format"));
    }
}
