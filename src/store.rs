//! Metric Store Layer
//!
//! Turns loosely typed device records into typed, staleness-aware series.
//!
//! # Architecture
//!
//! - [`RawRecord`] / [`Record`]: records before and after normalization
//! - [`SeriesDefinition`]: declared Info/Gauge/Counter series
//! - [`MetricStore`]: last snapshot for one metric group plus its series
//! - [`MetricSeries`]: samples projected from a snapshot at collect time

mod error;
mod metric_store;
mod record;
mod series;

pub use error::StoreError;
pub use metric_store::{MetricStore, Snapshot};
pub use record::{
    RawRecord, Record, Translation, TranslateFn, is_disabled, label_value, normalize_key,
    numeric_value,
};
pub use series::{MetricKind, MetricSeries, Sample, SeriesDefinition};
