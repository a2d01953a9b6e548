//! Configuration module for the exporter.
//!
//! Provides YAML-based configuration loading and validation for:
//! - System settings (exposition address, backoff constants, timeouts)
//! - Device entries (connection parameters, cadences, metric groups)

mod app;
mod device;
mod validation;

pub use app::{AppConfig, SystemConfig};
pub use device::DeviceConfig;
pub use validation::{ConfigError, expand_env_vars};

// Re-export constants
pub use app::{
    DEFAULT_DELAY_INC_DIV, DEFAULT_EXPORT_ADDRESS, DEFAULT_EXPORT_PORT, DEFAULT_INITIAL_DELAY,
    DEFAULT_MAX_DELAY, DEFAULT_METRIC_PREFIX, DEFAULT_RECONNECT_DELAY, DEFAULT_SHUTDOWN_TIMEOUT,
    DEFAULT_SOCKET_TIMEOUT, DEFAULT_STARTUP_STAGGER, DEFAULT_SYSTEM_INTERVAL,
};
pub use device::{DEFAULT_POLLING_INTERVAL, DEFAULT_SLOW_POLLING_INTERVAL};
