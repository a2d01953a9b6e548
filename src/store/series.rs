//! Series definitions and emitted samples.

use strum_macros::{AsRefStr, Display, EnumString};

/// Kind of a metric series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum MetricKind {
    /// Constant 1 carrying information in labels.
    Info,
    /// Point-in-time value.
    Gauge,
    /// Monotonic value as reported by the device.
    Counter,
}

/// A declared series. Immutable once the owning store is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesDefinition {
    pub kind: MetricKind,
    /// Name without the exporter prefix.
    pub name: String,
    pub help: String,
    /// Record field holding the sample value; `None` for Info.
    pub value_field: Option<String>,
    /// Label fields; `None` uses the store's default labels. Identity labels
    /// are always appended.
    pub label_fields: Option<Vec<String>>,
}

impl SeriesDefinition {
    /// Info series over the store's default labels.
    pub fn info(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            kind: MetricKind::Info,
            name: name.into(),
            help: help.into(),
            value_field: None,
            label_fields: None,
        }
    }

    /// Gauge series reading `value_field`.
    pub fn gauge(
        name: impl Into<String>,
        help: impl Into<String>,
        value_field: impl Into<String>,
    ) -> Self {
        Self {
            kind: MetricKind::Gauge,
            name: name.into(),
            help: help.into(),
            value_field: Some(value_field.into()),
            label_fields: None,
        }
    }

    /// Counter series reading `value_field`.
    pub fn counter(
        name: impl Into<String>,
        help: impl Into<String>,
        value_field: impl Into<String>,
    ) -> Self {
        Self {
            kind: MetricKind::Counter,
            name: name.into(),
            help: help.into(),
            value_field: Some(value_field.into()),
            label_fields: None,
        }
    }

    /// Override the label fields for this series.
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.label_fields = Some(labels.into_iter().map(Into::into).collect());
        self
    }
}

/// One sample: label values in `MetricSeries::label_names` order.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub label_values: Vec<String>,
    pub value: f64,
}

/// Samples of one series at collect time.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSeries {
    pub kind: MetricKind,
    pub name: String,
    pub help: String,
    pub label_names: Vec<String>,
    pub samples: Vec<Sample>,
}

impl MetricSeries {
    /// Label value of `label` in `sample`, if the series declares it.
    pub fn label<'a>(&self, sample: &'a Sample, label: &str) -> Option<&'a str> {
        let idx = self.label_names.iter().position(|n| n == label)?;
        sample.label_values.get(idx).map(String::as_str)
    }

    /// First sample whose `label` equals `value`.
    pub fn find(&self, label: &str, value: &str) -> Option<&Sample> {
        self.samples
            .iter()
            .find(|s| self.label(s, label) == Some(value))
    }
}
