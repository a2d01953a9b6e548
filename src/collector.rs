//! Collector Layer
//!
//! Metric groups that fetch records from a device, normalize them into a
//! [`MetricStore`](crate::store::MetricStore) and project them into series on
//! demand. Loading is driven by the scheduler; collecting is pull-only.
//!
//! # Architecture
//!
//! - [`Collector`]: Core trait (`load` + `collect`)
//! - [`RecordSource`]: Where a group's raw records come from
//! - [`MetricGroup`] / [`GroupCollector`]: Data-driven group definition and its collector
//! - [`catalog`]: The device metric groups addressable from config
//! - [`latest_version`]: Process-global RouterOS release check
//!
//! # Example
//!
//! ```rust
//! use mtik_exporter::collector::{Collector, catalog};
//! use std::time::Duration;
//!
//! let identity = vec![("device_name".to_string(), "core".to_string())];
//! let collector = catalog::build("interface", identity, Duration::from_secs(10)).unwrap();
//! assert_eq!(collector.name(), "interface");
//! // Nothing loaded yet, so nothing to export
//! assert!(collector.collect().is_empty());
//! ```

pub mod catalog;
mod group;
pub mod latest_version;
pub mod parse;
mod source;
mod traits;

pub use group::{BatchFn, GroupCollector, MetricGroup, RecordFn, StageSpec};
pub use latest_version::LatestVersionSource;
pub use source::{MonitorSource, PathSource, RecordSource};
pub use traits::{Collector, CollectorError, RecordError};
