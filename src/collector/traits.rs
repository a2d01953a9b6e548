//! Core collector traits and types.

use thiserror::Error;

use crate::device::{DeviceEntry, FetchError, TransportError};
use crate::store::MetricSeries;

/// A record-level shape problem. The record is dropped, the batch proceeds.
#[derive(Debug, Error)]
#[error("{reason}")]
pub struct RecordError {
    pub reason: String,
}

impl RecordError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Error for a required field that is absent.
    pub fn missing(field: &str) -> Self {
        Self::new(format!("missing field '{field}'"))
    }
}

/// Errors that can occur during a load.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// The device connection is down; nothing was fetched.
    #[error("skipped: device not connected")]
    Skipped,

    /// The fetch failed; the previous snapshot is kept.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A record could not be processed.
    #[error("record error: {0}")]
    Record(#[from] RecordError),

    /// The collector is misconfigured.
    #[error("config error: {0}")]
    Config(String),
}

impl From<FetchError> for CollectorError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::NotConnected => Self::Skipped,
            FetchError::Transport(e) => Self::Transport(e),
        }
    }
}

/// Core collector trait.
///
/// A collector pairs one metric group's fetch/normalize logic with its
/// metric store(s).
///
/// # Error Handling
///
/// - `Ok(())`: records were fetched and the snapshot replaced.
/// - `Err(CollectorError::Skipped)`: the connection was down; a no-op cycle.
/// - `Err(_)` otherwise: nothing was stored; the previous snapshot stays in
///   place and ages out through the staleness window.
#[async_trait::async_trait]
pub trait Collector: Send + Sync + 'static {
    /// Metric group name.
    fn name(&self) -> &str;

    /// Fetch records and replace the snapshot.
    ///
    /// `device` is `None` for process-global collectors.
    async fn load(&self, device: Option<&DeviceEntry>) -> Result<(), CollectorError>;

    /// Current series. Pull-only, cheap, and safe to call during a `load`.
    fn collect(&self) -> Vec<MetricSeries>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_mapping() {
        assert!(matches!(
            CollectorError::from(FetchError::NotConnected),
            CollectorError::Skipped
        ));
        assert!(matches!(
            CollectorError::from(FetchError::Transport(TransportError::Timeout)),
            CollectorError::Transport(TransportError::Timeout)
        ));
    }

    #[test]
    fn test_record_error_display() {
        let err = CollectorError::from(RecordError::missing("bytes"));
        assert_eq!(err.to_string(), "record error: missing field 'bytes'");
    }
}
