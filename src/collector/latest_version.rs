//! Latest published RouterOS release per channel.
//!
//! A process-global group: it talks to the MikroTik upgrade server rather than
//! to a device, so its series carry no device labels.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use super::group::{GroupCollector, MetricGroup, StageSpec};
use super::parse::parse_release_line;
use super::source::RecordSource;
use super::traits::{Collector, CollectorError};
use crate::device::DeviceEntry;
use crate::store::{RawRecord, SeriesDefinition};

/// Release feed prefix; the channel is appended as `.<channel>`.
pub const DEFAULT_RELEASE_URL: &str = "https://upgrade.mikrotik.com/routeros/NEWESTa7";

/// Version reported for a channel whose feed could not be read.
pub const UNKNOWN_VERSION: &str = "N/A";

/// Fetches `<base>.<channel>` for each configured channel.
#[derive(Debug, Clone)]
pub struct LatestVersionSource {
    client: Client,
    base_url: String,
    channels: Vec<String>,
}

impl LatestVersionSource {
    pub fn new(channels: Vec<String>, timeout: Duration) -> Result<Self, CollectorError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollectorError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: DEFAULT_RELEASE_URL.to_string(),
            channels,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn release(&self, channel: &str) -> Result<(String, String), String> {
        let url = format!("{}.{}", self.base_url, channel);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| e.to_string())?;
        let body = response.text().await.map_err(|e| e.to_string())?;
        parse_release_line(&body).ok_or_else(|| format!("unexpected release feed body: {body:?}"))
    }
}

#[async_trait::async_trait]
impl RecordSource for LatestVersionSource {
    async fn fetch(&self, _: Option<&DeviceEntry>) -> Result<Vec<RawRecord>, CollectorError> {
        let mut records = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            let (version, build_time) = match self.release(channel).await {
                Ok(release) => release,
                Err(e) => {
                    tracing::warn!(channel = %channel, error = %e, "Failed to fetch latest RouterOS version");
                    (UNKNOWN_VERSION.to_string(), String::new())
                }
            };

            let mut record = RawRecord::new();
            record.insert("channel".into(), Value::String(channel.clone()));
            record.insert("version".into(), Value::String(version));
            record.insert("ts".into(), Value::String(build_time));
            records.push(record);
        }
        Ok(records)
    }
}

/// Build time as unix seconds; anything else is null so no sample is emitted.
fn build_time(value: Option<&str>) -> Option<Value> {
    Some(
        value
            .and_then(|v| v.trim().parse::<i64>().ok())
            .map_or(Value::Null, Value::from),
    )
}

pub fn group(source: LatestVersionSource) -> MetricGroup {
    MetricGroup::new("latest_version").stage(
        StageSpec::new(source, &["channel", "version"])
            .translate("ts", build_time)
            .series(SeriesDefinition::info("latest_routeros", "Latest RouterOS versions"))
            .series(
                SeriesDefinition::gauge(
                    "latest_routeros_published",
                    "Latest RouterOS version publish timestamp",
                    "ts",
                )
                .with_labels(["channel"]),
            ),
    )
}

/// Process-global collector polled every `interval`.
pub fn collector(source: LatestVersionSource, interval: Duration) -> Arc<dyn Collector> {
    Arc::new(GroupCollector::new(group(source), Vec::new(), interval))
}
