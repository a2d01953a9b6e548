//! Exposition Layer
//!
//! Turns collector series and load statistics into Prometheus metric
//! families and renders the text format on each scrape.
//!
//! # Naming
//!
//! - `Info` series become gauges named `<prefix>_<name>_info` with value 1
//! - `Gauge` series become `<prefix>_<name>`
//! - `Counter` series become `<prefix>_<name>_total`
//!
//! Families with the same name (one per device) are merged.

use std::collections::BTreeMap;
use std::sync::Arc;

use prometheus::proto::{Counter, Gauge, LabelPair, Metric, MetricFamily, MetricType};
use prometheus::{Encoder, TextEncoder};
use thiserror::Error;

use crate::collector::Collector;
use crate::scheduler::LoadStats;
use crate::store::{MetricKind, MetricSeries};

/// Errors rendering the exposition text.
#[derive(Debug, Error)]
pub enum ExpositionError {
    #[error("encode error: {0}")]
    Encode(#[from] prometheus::Error),

    #[error("encoded output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Everything exported on `/metrics`.
#[derive(Clone)]
pub struct Exposition {
    prefix: String,
    collectors: Vec<Arc<dyn Collector>>,
    stats: Option<Arc<LoadStats>>,
}

impl std::fmt::Debug for Exposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exposition")
            .field("prefix", &self.prefix)
            .field("collectors", &self.collectors.len())
            .finish_non_exhaustive()
    }
}

impl Exposition {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            collectors: Vec::new(),
            stats: None,
        }
    }

    pub fn with_collectors(mut self, collectors: impl IntoIterator<Item = Arc<dyn Collector>>) -> Self {
        self.collectors.extend(collectors);
        self
    }

    pub fn with_stats(mut self, stats: Arc<LoadStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn collector_count(&self) -> usize {
        self.collectors.len()
    }

    /// Exported family name of `series`.
    pub fn family_name(&self, series: &MetricSeries) -> String {
        match series.kind {
            MetricKind::Info => format!("{}_{}_info", self.prefix, series.name),
            MetricKind::Gauge => format!("{}_{}", self.prefix, series.name),
            MetricKind::Counter if series.name.ends_with("_total") => {
                format!("{}_{}", self.prefix, series.name)
            }
            MetricKind::Counter => format!("{}_{}_total", self.prefix, series.name),
        }
    }

    /// Collect every collector and the load statistics, sorted by family name.
    ///
    /// Series without samples are left out.
    pub fn gather(&self) -> Vec<MetricFamily> {
        let mut families: BTreeMap<String, MetricFamily> = BTreeMap::new();

        for series in self.collectors.iter().flat_map(|c| c.collect()) {
            if series.samples.is_empty() {
                continue;
            }
            let name = self.family_name(&series);
            let kind = match series.kind {
                MetricKind::Counter => MetricType::COUNTER,
                MetricKind::Info | MetricKind::Gauge => MetricType::GAUGE,
            };

            let family = families.entry(name.clone()).or_insert_with(|| {
                let mut family = MetricFamily::default();
                family.set_name(name.clone());
                family.set_help(series.help.clone());
                family.set_field_type(kind);
                family
            });
            if family.get_field_type() != kind {
                tracing::warn!(family = %name, "Conflicting metric types, series dropped");
                continue;
            }
            for metric in to_metrics(&series) {
                family.mut_metric().push(metric);
            }
        }

        if let Some(stats) = &self.stats {
            for family in stats.gather() {
                families.entry(family.get_name().to_string()).or_insert(family);
            }
        }

        families.into_values().collect()
    }

    /// Render [`gather`](Self::gather) in the Prometheus text format.
    pub fn render(&self) -> Result<String, ExpositionError> {
        let families = self.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn to_metrics(series: &MetricSeries) -> Vec<Metric> {
    series
        .samples
        .iter()
        .map(|sample| {
            let labels: Vec<LabelPair> = series
                .label_names
                .iter()
                .zip(&sample.label_values)
                .map(|(name, value)| {
                    let mut pair = LabelPair::default();
                    pair.set_name(name.clone());
                    pair.set_value(value.clone());
                    pair
                })
                .collect();

            let mut metric = Metric::default();
            metric.set_label(labels.into());
            match series.kind {
                MetricKind::Counter => {
                    let mut counter = Counter::default();
                    counter.set_value(sample.value);
                    metric.set_counter(counter);
                }
                MetricKind::Info | MetricKind::Gauge => {
                    let mut gauge = Gauge::default();
                    gauge.set_value(sample.value);
                    metric.set_gauge(gauge);
                }
            }
            metric
        })
        .collect()
}
