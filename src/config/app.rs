//! Application configuration structures.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::device::DeviceConfig;
use super::validation::{ConfigError, require_min_interval};
use crate::collector::catalog;
use crate::device::BackoffPolicy;

// =============================================================================
// Constants
// =============================================================================

/// Default exposition bind address (all interfaces, dual stack).
pub const DEFAULT_EXPORT_ADDRESS: &str = "::";

/// Default exposition port.
pub const DEFAULT_EXPORT_PORT: u16 = 49090;

/// Default prefix for every exported metric name.
pub const DEFAULT_METRIC_PREFIX: &str = "mtik_exporter";

/// Default socket timeout for device API calls.
pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(2);

/// Default first backoff delay after a connection failure.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(120);

/// Default backoff ceiling.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(900);

/// Default backoff growth divisor.
pub const DEFAULT_DELAY_INC_DIV: u32 = 5;

/// Default delay before a job for a disconnected device is retried.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Default spacing between initial job fire times.
pub const DEFAULT_STARTUP_STAGGER: Duration = Duration::from_secs(1);

/// Default bounded join on shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default interval for process-global collectors.
pub const DEFAULT_SYSTEM_INTERVAL: Duration = Duration::from_secs(3600);

fn default_export_address() -> String {
    DEFAULT_EXPORT_ADDRESS.to_string()
}

fn default_export_port() -> u16 {
    DEFAULT_EXPORT_PORT
}

fn default_metric_prefix() -> String {
    DEFAULT_METRIC_PREFIX.to_string()
}

fn default_update_channels() -> Vec<String> {
    vec!["stable".to_string()]
}

// =============================================================================
// System Configuration
// =============================================================================

/// Process-wide settings (the `system` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Exposition bind address (default: "::").
    #[serde(default = "default_export_address")]
    pub export_address: String,

    /// Exposition port (default: 49090).
    #[serde(default = "default_export_port")]
    pub export_port: u16,

    /// Metric name prefix (default: "mtik_exporter").
    #[serde(default = "default_metric_prefix")]
    pub metric_prefix: String,

    /// Socket timeout for device calls (default: 2s).
    #[serde(with = "humantime_serde")]
    pub socket_timeout: Duration,

    /// First reconnect delay after a failure (default: 120s).
    #[serde(with = "humantime_serde")]
    pub initial_delay_on_failure: Duration,

    /// Reconnect delay ceiling (default: 900s).
    #[serde(with = "humantime_serde")]
    pub max_delay_on_failure: Duration,

    /// Backoff growth divisor (default: 5).
    pub delay_inc_div: u32,

    /// Retry delay for jobs whose device is disconnected (default: 3s).
    #[serde(with = "humantime_serde")]
    pub reconnect_delay: Duration,

    /// Spacing of initial job fire times (default: 1s).
    #[serde(with = "humantime_serde")]
    pub startup_stagger: Duration,

    /// Bounded join for the scheduler and HTTP listener on shutdown (default: 5s).
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Poll the RouterOS release feed.
    pub check_for_updates: bool,

    /// Release channels to check (default: ["stable"]).
    #[serde(default = "default_update_channels")]
    pub check_for_updates_channels: Vec<String>,

    /// Interval for process-global collectors (default: 1h).
    #[serde(with = "humantime_serde")]
    pub system_interval: Duration,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            export_address: default_export_address(),
            export_port: DEFAULT_EXPORT_PORT,
            metric_prefix: default_metric_prefix(),
            socket_timeout: DEFAULT_SOCKET_TIMEOUT,
            initial_delay_on_failure: DEFAULT_INITIAL_DELAY,
            max_delay_on_failure: DEFAULT_MAX_DELAY,
            delay_inc_div: DEFAULT_DELAY_INC_DIV,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            startup_stagger: DEFAULT_STARTUP_STAGGER,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            check_for_updates: false,
            check_for_updates_channels: default_update_channels(),
            system_interval: DEFAULT_SYSTEM_INTERVAL,
        }
    }
}

impl SystemConfig {
    /// Backoff parameters derived from this section.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            self.initial_delay_on_failure,
            self.delay_inc_div,
            self.max_delay_on_failure,
        )
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.export_address.parse::<IpAddr>().map_err(|_| {
            ConfigError::invalid(format!(
                "invalid export address: '{}'",
                self.export_address
            ))
        })?;

        if self.export_port == 0 {
            return Err(ConfigError::invalid("export port must be non-zero"));
        }

        if self.metric_prefix.is_empty()
            || !self
                .metric_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConfigError::invalid(format!(
                "invalid metric prefix: '{}'",
                self.metric_prefix
            )));
        }

        if self.delay_inc_div == 0 {
            return Err(ConfigError::invalid("delay_inc_div must be positive"));
        }

        if self.initial_delay_on_failure > self.max_delay_on_failure {
            return Err(ConfigError::invalid(
                "initial_delay_on_failure cannot exceed max_delay_on_failure",
            ));
        }

        if self.socket_timeout.is_zero() {
            return Err(ConfigError::invalid("socket_timeout must be positive"));
        }

        require_min_interval(self.reconnect_delay, "reconnect_delay", "system")?;
        require_min_interval(self.system_interval, "system_interval", "system")?;

        if self.check_for_updates && self.check_for_updates_channels.is_empty() {
            return Err(ConfigError::invalid(
                "check_for_updates requires at least one channel",
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Process-wide settings.
    #[serde(default)]
    pub system: SystemConfig,

    /// Devices keyed by name. The name becomes the `device_name` label.
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceConfig>,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.system.validate()?;

        for (name, device) in &self.devices {
            if name.trim().is_empty() {
                return Err(ConfigError::invalid("device name cannot be empty"));
            }
            device.validate(name, catalog::is_known)?;
        }

        Ok(())
    }

    /// Enabled devices in name order.
    pub fn enabled_devices(&self) -> impl Iterator<Item = (&String, &DeviceConfig)> {
        self.devices.iter().filter(|(_, device)| device.enabled)
    }
}
