//! mtik_exporter - RouterOS Metrics Exporter Library
//!
//! This crate polls MikroTik RouterOS devices on fixed cadences and exposes
//! the results as Prometheus metrics. It can be used as a library by other
//! Rust projects, or run as a standalone binary with the `mtik_exporter`
//! executable.
//!
//! # Architecture
//!
//! - **Config**: YAML configuration with env expansion and validation
//! - **Device**: transport seam, REST transport, connection state with backoff
//! - **Store**: record normalization and staleness-aware metric snapshots
//! - **Collector**: metric groups that fetch, translate and store records
//! - **Scheduler**: priority-queue driven polling with per-collector statistics
//! - **Exposition / Server**: Prometheus text format over HTTP
//!
//! # Example
//!
//! ```rust,ignore
//! use mtik_exporter::{AppConfig, Exposition, LoadStats, Scheduler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load("mtik_exporter.yaml")?;
//!     let stats = std::sync::Arc::new(LoadStats::new(&config.system.metric_prefix)?);
//!     let scheduler = Scheduler::new(stats.clone());
//!     // Register device jobs, spawn `scheduler.run(shutdown)`, serve `/metrics`
//!     Ok(())
//! }
//! ```

pub mod collector;
pub mod config;
pub mod device;
pub mod exposition;
pub mod scheduler;
pub mod server;
pub mod store;

pub use collector::{Collector, CollectorError};
pub use config::{AppConfig, ConfigError, DeviceConfig, SystemConfig};
pub use device::{DeviceConnection, DeviceEntry, DeviceIdentity, RestTransport, Transport};
pub use exposition::{Exposition, ExpositionError};
pub use scheduler::{Job, LoadStats, Scheduler};
pub use store::{MetricKind, MetricSeries, MetricStore};
