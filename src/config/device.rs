//! Per-device configuration.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::validation::{ConfigError, expand_env_vars, require_min_interval};

/// Default fast-cadence polling interval (10 seconds).
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(10);

/// Default slow-cadence polling interval (60 seconds).
pub const DEFAULT_SLOW_POLLING_INTERVAL: Duration = Duration::from_secs(60);

fn default_enabled() -> bool {
    true
}

fn default_certificate_verify() -> bool {
    true
}

fn default_polling_interval() -> Duration {
    DEFAULT_POLLING_INTERVAL
}

fn default_slow_polling_interval() -> Duration {
    DEFAULT_SLOW_POLLING_INTERVAL
}

/// Connection and polling settings for one RouterOS device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Poll this device (default: true).
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Device hostname or IP address.
    pub hostname: String,

    /// API port; the scheme default is used when absent.
    #[serde(default)]
    pub port: Option<u16>,

    /// API user.
    pub username: String,

    /// API password. `${VAR}` and `${VAR:-default}` are expanded.
    #[serde(default)]
    pub password: String,

    /// Use HTTPS for the REST API.
    #[serde(default)]
    pub use_ssl: bool,

    /// Verify the device certificate (default: true).
    #[serde(default = "default_certificate_verify")]
    pub ssl_certificate_verify: bool,

    /// Per-device socket timeout; falls back to the system value.
    #[serde(default, with = "humantime_serde::option")]
    pub socket_timeout: Option<Duration>,

    /// Fast cadence interval (default: 10s).
    #[serde(default = "default_polling_interval", with = "humantime_serde")]
    pub polling_interval: Duration,

    /// Slow cadence interval (default: 60s).
    #[serde(default = "default_slow_polling_interval", with = "humantime_serde")]
    pub slow_polling_interval: Duration,

    /// Metric groups polled on the fast cadence.
    #[serde(default)]
    pub collectors: Vec<String>,

    /// Metric groups polled on the slow cadence.
    #[serde(default)]
    pub slow_collectors: Vec<String>,
}

impl DeviceConfig {
    /// Create a device configuration with default intervals and no collectors.
    pub fn new(hostname: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            enabled: true,
            hostname: hostname.into(),
            port: None,
            username: username.into(),
            password: String::new(),
            use_ssl: false,
            ssl_certificate_verify: true,
            socket_timeout: None,
            polling_interval: DEFAULT_POLLING_INTERVAL,
            slow_polling_interval: DEFAULT_SLOW_POLLING_INTERVAL,
            collectors: Vec::new(),
            slow_collectors: Vec::new(),
        }
    }

    /// Set the API port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set both cadence intervals.
    pub fn with_intervals(mut self, fast: Duration, slow: Duration) -> Self {
        self.polling_interval = fast;
        self.slow_polling_interval = slow;
        self
    }

    /// Set the fast cadence metric groups.
    pub fn with_collectors<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collectors = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the slow cadence metric groups.
    pub fn with_slow_collectors<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.slow_collectors = names.into_iter().map(Into::into).collect();
        self
    }

    /// Password with environment references resolved.
    pub fn resolved_password(&self) -> String {
        expand_env_vars(&self.password)
    }

    /// Validate this device entry.
    ///
    /// `known_collector` decides whether a metric group name exists.
    pub fn validate(
        &self,
        name: &str,
        known_collector: impl Fn(&str) -> bool,
    ) -> Result<(), ConfigError> {
        let owner = format!("device '{name}'");

        if self.hostname.trim().is_empty() {
            return Err(ConfigError::invalid(format!("{owner}: hostname cannot be empty")));
        }
        if self.username.trim().is_empty() {
            return Err(ConfigError::invalid(format!("{owner}: username cannot be empty")));
        }
        if self.port == Some(0) {
            return Err(ConfigError::invalid(format!("{owner}: port must be non-zero")));
        }

        require_min_interval(self.polling_interval, "polling_interval", &owner)?;
        require_min_interval(self.slow_polling_interval, "slow_polling_interval", &owner)?;
        if let Some(timeout) = self.socket_timeout {
            if timeout.is_zero() {
                return Err(ConfigError::invalid(format!(
                    "{owner}: socket_timeout must be positive"
                )));
            }
        }

        for (cadence, names) in [
            ("collectors", &self.collectors),
            ("slow_collectors", &self.slow_collectors),
        ] {
            let mut seen = HashSet::new();
            for collector in names {
                if !known_collector(collector) {
                    return Err(ConfigError::invalid(format!(
                        "{owner}: unknown collector '{collector}' in {cadence}"
                    )));
                }
                if !seen.insert(collector) {
                    return Err(ConfigError::invalid(format!(
                        "{owner}: collector '{collector}' listed twice in {cadence}"
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(name: &str) -> bool {
        matches!(name, "interface" | "health" | "identity")
    }

    #[test]
    fn test_device_config_defaults() {
        let yaml = "hostname: 10.0.0.1\nusername: prometheus\n";
        let config: DeviceConfig = serde_yaml::from_str(yaml).unwrap();

        assert!(config.enabled);
        assert!(config.ssl_certificate_verify);
        assert!(!config.use_ssl);
        assert_eq!(config.port, None);
        assert_eq!(config.polling_interval, DEFAULT_POLLING_INTERVAL);
        assert_eq!(config.slow_polling_interval, DEFAULT_SLOW_POLLING_INTERVAL);
        assert!(config.collectors.is_empty());
    }

    #[test]
    fn test_device_config_humantime_intervals() {
        let yaml = r#"
hostname: 10.0.0.1
username: prometheus
polling_interval: 15s
slow_polling_interval: 5m
socket_timeout: 3s
collectors: [interface]
"#;
        let config: DeviceConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.polling_interval, Duration::from_secs(15));
        assert_eq!(config.slow_polling_interval, Duration::from_secs(300));
        assert_eq!(config.socket_timeout, Some(Duration::from_secs(3)));
        assert_eq!(config.collectors, vec!["interface".to_string()]);
    }

    #[test]
    fn test_validate_unknown_collector() {
        let config = DeviceConfig::new("10.0.0.1", "prometheus").with_collectors(["bogus"]);
        let err = config.validate("r1", known).unwrap_err();
        assert!(err.to_string().contains("unknown collector 'bogus'"));
    }

    #[test]
    fn test_validate_duplicate_collector() {
        let config = DeviceConfig::new("10.0.0.1", "prometheus")
            .with_slow_collectors(["identity", "identity"]);
        let err = config.validate("r1", known).unwrap_err();
        assert!(err.to_string().contains("listed twice"));
    }

    #[test]
    fn test_validate_same_group_on_both_cadences_is_allowed() {
        let config = DeviceConfig::new("10.0.0.1", "prometheus")
            .with_collectors(["interface"])
            .with_slow_collectors(["interface"]);
        assert!(config.validate("r1", known).is_ok());
    }

    #[test]
    fn test_validate_rejects_sub_second_interval() {
        let config = DeviceConfig::new("10.0.0.1", "prometheus")
            .with_intervals(Duration::from_millis(200), Duration::from_secs(60));
        assert!(config.validate("r1", known).is_err());
    }

    #[test]
    fn test_validate_empty_hostname() {
        let config = DeviceConfig::new(" ", "prometheus");
        let err = config.validate("r1", known).unwrap_err();
        assert!(err.to_string().contains("hostname cannot be empty"));
    }
}
