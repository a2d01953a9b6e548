//! Per-collector load statistics, exported alongside device metrics.

use std::time::Duration;

use chrono::{DateTime, Utc};
use prometheus::proto::MetricFamily;
use prometheus::{CounterVec, GaugeVec, IntCounter, IntCounterVec, Opts, Registry};
use strum_macros::{AsRefStr, Display};

use crate::device::DeviceIdentity;

/// Label names of every statistics series.
pub const STATS_LABELS: [&str; 3] = ["name", "device_name", "device_address"];

/// Result of one `load` as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum LoadOutcome {
    Loaded,
    /// The device connection was down; nothing was fetched.
    Skipped,
    Failed,
    Panicked,
}

/// Load counters keyed by collector name and device identity, plus one
/// unlabelled total of load attempts.
pub struct LoadStats {
    registry: Registry,
    loads_total: IntCounter,
    load_time: CounterVec,
    load_count: IntCounterVec,
    load_errors: IntCounterVec,
    last_run: GaugeVec,
}

impl std::fmt::Debug for LoadStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadStats").finish_non_exhaustive()
    }
}

impl LoadStats {
    /// Create the statistics vectors and the load total under `prefix`.
    pub fn new(prefix: &str) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let loads_total = IntCounter::new(
            format!("{prefix}_data_loads_total"),
            "Load attempts across all collectors and devices",
        )?;

        let load_time = CounterVec::new(
            Opts::new(
                format!("{prefix}_data_load_time"),
                "Time spent loading metrics in seconds",
            ),
            &STATS_LABELS,
        )?;
        let load_count = IntCounterVec::new(
            Opts::new(
                format!("{prefix}_data_load_count"),
                "Total count of metrics loads since start",
            ),
            &STATS_LABELS,
        )?;
        let load_errors = IntCounterVec::new(
            Opts::new(format!("{prefix}_data_load_errors"), "Data load error count"),
            &STATS_LABELS,
        )?;
        let last_run = GaugeVec::new(
            Opts::new(
                format!("{prefix}_data_load_last_run"),
                "Last run timestamp of metrics load",
            ),
            &STATS_LABELS,
        )?;

        registry.register(Box::new(loads_total.clone()))?;
        registry.register(Box::new(load_time.clone()))?;
        registry.register(Box::new(load_count.clone()))?;
        registry.register(Box::new(load_errors.clone()))?;
        registry.register(Box::new(last_run.clone()))?;

        Ok(Self {
            registry,
            loads_total,
            load_time,
            load_count,
            load_errors,
            last_run,
        })
    }

    /// Record one finished load.
    ///
    /// Skipped loads only add their (near zero) time. Every other outcome
    /// also bumps the unlabelled total.
    pub fn record(
        &self,
        collector: &str,
        device: Option<&DeviceIdentity>,
        elapsed: Duration,
        outcome: LoadOutcome,
        at: DateTime<Utc>,
    ) {
        let (device_name, address) = device
            .map(|d| (d.device_name.as_str(), d.address.as_str()))
            .unwrap_or_default();
        let labels = [collector, device_name, address];

        self.load_time
            .with_label_values(&labels)
            .inc_by(elapsed.as_secs_f64());

        match outcome {
            LoadOutcome::Skipped => return,
            LoadOutcome::Loaded => self.load_count.with_label_values(&labels).inc(),
            LoadOutcome::Failed | LoadOutcome::Panicked => {
                self.load_errors.with_label_values(&labels).inc()
            }
        }
        self.loads_total.inc();
        self.last_run
            .with_label_values(&labels)
            .set(at.timestamp_millis() as f64 / 1000.0);
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family<'a>(families: &'a [MetricFamily], name: &str) -> &'a MetricFamily {
        families.iter().find(|f| f.get_name() == name).unwrap()
    }

    fn label<'a>(metric: &'a prometheus::proto::Metric, name: &str) -> &'a str {
        metric
            .get_label()
            .iter()
            .find(|l| l.get_name() == name)
            .map(|l| l.get_value())
            .unwrap()
    }

    #[test]
    fn test_record_outcomes() {
        let stats = LoadStats::new("mtik_exporter").unwrap();
        let device = DeviceIdentity::new("r1", "10.0.0.1");
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        stats.record("interface", Some(&device), Duration::from_millis(250), LoadOutcome::Loaded, at);
        stats.record("interface", Some(&device), Duration::from_millis(250), LoadOutcome::Failed, at);
        stats.record("interface", Some(&device), Duration::from_millis(500), LoadOutcome::Skipped, at);

        let families = stats.gather();
        let time = family(&families, "mtik_exporter_data_load_time");
        assert_eq!(time.get_metric()[0].get_counter().get_value(), 1.0);
        assert_eq!(label(&time.get_metric()[0], "device_name"), "r1");

        let count = family(&families, "mtik_exporter_data_load_count");
        assert_eq!(count.get_metric()[0].get_counter().get_value(), 1.0);
        let errors = family(&families, "mtik_exporter_data_load_errors");
        assert_eq!(errors.get_metric()[0].get_counter().get_value(), 1.0);
        let last = family(&families, "mtik_exporter_data_load_last_run");
        assert_eq!(last.get_metric()[0].get_gauge().get_value(), 1_700_000_000.0);
    }

    #[test]
    fn test_loads_total_spans_collectors_and_devices() {
        let stats = LoadStats::new("mtik_exporter").unwrap();
        let r1 = DeviceIdentity::new("r1", "10.0.0.1");
        let r2 = DeviceIdentity::new("r2", "10.0.0.2");
        let at = DateTime::from_timestamp(0, 0).unwrap();

        stats.record("interface", Some(&r1), Duration::ZERO, LoadOutcome::Loaded, at);
        stats.record("dhcp", Some(&r2), Duration::ZERO, LoadOutcome::Failed, at);
        stats.record("latest_version", None, Duration::ZERO, LoadOutcome::Panicked, at);
        stats.record("interface", Some(&r2), Duration::ZERO, LoadOutcome::Skipped, at);

        let families = stats.gather();
        let total = family(&families, "mtik_exporter_data_loads_total");
        assert_eq!(total.get_field_type(), prometheus::proto::MetricType::COUNTER);
        assert!(total.get_metric()[0].get_label().is_empty());
        assert_eq!(total.get_metric()[0].get_counter().get_value(), 3.0);
    }

    #[test]
    fn test_global_jobs_have_empty_device_labels() {
        let stats = LoadStats::new("x").unwrap();
        let at = DateTime::from_timestamp(0, 0).unwrap();
        stats.record("latest_version", None, Duration::ZERO, LoadOutcome::Panicked, at);

        let families = stats.gather();
        let errors = family(&families, "x_data_load_errors");
        let metric = &errors.get_metric()[0];
        assert_eq!(label(metric, "name"), "latest_version");
        assert_eq!(label(metric, "device_address"), "");
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(LoadOutcome::Panicked.to_string(), "panicked");
        assert_eq!(LoadOutcome::Loaded.as_ref(), "loaded");
    }
}
