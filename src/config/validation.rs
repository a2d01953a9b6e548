//! Configuration error type and parsing helpers.

use std::time::Duration;

use thiserror::Error;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse YAML configuration.
    #[error("failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation failed.
    #[error("config validation error: {0}")]
    ValidationError(String),
}

impl ConfigError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }
}

/// Expand environment variables in a string.
/// Supports ${VAR} and ${VAR:-default} syntax.
pub fn expand_env_vars(input: &str) -> String {
    static ENV_VAR_REGEX: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();

    let regex = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("failed to compile env var regex")
    });

    regex
        .replace_all(input, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(var_name).unwrap_or_else(|_| default_value.to_string())
        })
        .into_owned()
}

/// Reject intervals below one second.
pub(crate) fn require_min_interval(
    value: Duration,
    what: &str,
    owner: &str,
) -> Result<(), ConfigError> {
    if value < Duration::from_secs(1) {
        return Err(ConfigError::invalid(format!(
            "{owner}: {what} must be at least 1s, got {}",
            humantime::format_duration(value)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars_no_vars() {
        assert_eq!(expand_env_vars("plain-password"), "plain-password");
    }

    #[test]
    fn test_expand_env_vars_with_default() {
        let result = expand_env_vars("${MTIK_NONEXISTENT_PASSWORD_4242:-fallback}");
        assert_eq!(result, "fallback");
    }

    #[test]
    fn test_expand_env_vars_from_env() {
        // SAFETY: This test only touches a variable no other test reads.
        unsafe {
            std::env::set_var("MTIK_TEST_ROUTER_PASSWORD", "s3cret");
        }
        assert_eq!(expand_env_vars("${MTIK_TEST_ROUTER_PASSWORD}"), "s3cret");
        // SAFETY: Cleanup test variable.
        unsafe {
            std::env::remove_var("MTIK_TEST_ROUTER_PASSWORD");
        }
    }

    #[test]
    fn test_require_min_interval() {
        assert!(require_min_interval(Duration::from_secs(1), "polling_interval", "r1").is_ok());
        let err = require_min_interval(Duration::from_millis(500), "polling_interval", "r1")
            .unwrap_err();
        assert!(err.to_string().contains("at least 1s"));
        assert!(err.to_string().ends_with("got 500ms"));
    }
}
