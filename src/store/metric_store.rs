//! Staleness-aware metric store for one metric group.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;

use super::error::StoreError;
use super::record::{RawRecord, Record, Translation, is_disabled, label_value, normalize_key, numeric_value};
use super::series::{MetricKind, MetricSeries, Sample, SeriesDefinition};

/// Records held by a store at one point in time.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub records: Vec<Record>,
    /// `None` until the first `set_metrics`.
    pub last_update: Option<DateTime<Utc>>,
}

/// Last successfully fetched records of one metric group and their series.
///
/// Snapshots are replaced wholesale behind an `Arc` swap, so a reader in
/// [`collect`](Self::collect) never sees a partially updated record list.
pub struct MetricStore {
    identity: Vec<(String, String)>,
    default_labels: Vec<String>,
    translations: Vec<Translation>,
    definitions: Vec<SeriesDefinition>,
    interval: Duration,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl std::fmt::Debug for MetricStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricStore")
            .field("identity", &self.identity)
            .field("series", &self.definitions.len())
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl MetricStore {
    /// Create an empty store.
    ///
    /// `identity` label pairs are merged into every record and appended to
    /// every series' labels. `interval` is the polling interval of the job
    /// that feeds the store.
    pub fn new<I, S>(identity: Vec<(String, String)>, default_labels: I, interval: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identity,
            default_labels: default_labels.into_iter().map(Into::into).collect(),
            translations: Vec::new(),
            definitions: Vec::new(),
            interval,
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
        }
    }

    /// Set field translations, applied in order.
    pub fn with_translations(mut self, translations: Vec<Translation>) -> Self {
        self.translations = translations;
        self
    }

    /// Set the declared series.
    pub fn with_series(mut self, definitions: Vec<SeriesDefinition>) -> Self {
        self.definitions = definitions;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn definitions(&self) -> &[SeriesDefinition] {
        &self.definitions
    }

    /// Age beyond which the snapshot is no longer emitted.
    pub fn staleness_window(&self) -> Duration {
        self.interval * 3 / 2
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read())
    }

    /// Replace the snapshot with `records`, stamped now.
    ///
    /// An empty list clears the snapshot. Callers skip this entirely on a
    /// failed fetch to keep the last good snapshot and its clock.
    pub fn set_metrics(&self, records: Vec<RawRecord>) {
        self.set_metrics_at(records, Utc::now());
    }

    pub fn set_metrics_at(&self, records: Vec<RawRecord>, now: DateTime<Utc>) {
        let records: Vec<Record> = records
            .into_iter()
            .filter_map(|raw| self.normalize(raw))
            .collect();

        let snapshot = Arc::new(Snapshot {
            records,
            last_update: Some(now),
        });
        *self.snapshot.write() = snapshot;
    }

    /// Normalize one record; `None` when it is disabled.
    pub fn normalize(&self, raw: RawRecord) -> Option<Record> {
        if is_disabled(&raw) {
            return None;
        }

        let mut record: Record = raw
            .into_iter()
            .map(|(key, value)| (normalize_key(&key), value))
            .collect();

        for (name, value) in &self.identity {
            record.insert(name.clone(), serde_json::Value::String(value.clone()));
        }

        for translation in &self.translations {
            let prior = record.get(translation.field).map(|v| label_value(Some(v)));
            if let Some(value) = (translation.func)(prior.as_deref()) {
                record.insert(translation.field.to_string(), value);
            }
        }

        Some(record)
    }

    /// Non-empty and younger than the staleness window.
    pub fn have_metrics(&self) -> bool {
        self.have_metrics_at(Utc::now())
    }

    pub fn have_metrics_at(&self, now: DateTime<Utc>) -> bool {
        self.is_fresh(&self.snapshot(), now)
    }

    fn is_fresh(&self, snapshot: &Snapshot, now: DateTime<Utc>) -> bool {
        let Some(last_update) = snapshot.last_update else {
            return false;
        };
        if snapshot.records.is_empty() {
            return false;
        }
        let window = TimeDelta::from_std(self.staleness_window()).unwrap_or(TimeDelta::MAX);
        now.signed_duration_since(last_update) < window
    }

    /// Project `snapshot` into one declared series.
    ///
    /// Records without the value field are skipped. Missing label fields
    /// render as empty strings.
    ///
    /// # Errors
    /// `StoreError::Coercion` if a value field is present but not numeric.
    pub fn emit(
        &self,
        definition: &SeriesDefinition,
        snapshot: &Snapshot,
    ) -> Result<MetricSeries, StoreError> {
        let label_fields = definition
            .label_fields
            .as_deref()
            .unwrap_or(&self.default_labels);

        let label_names: Vec<String> = label_fields
            .iter()
            .cloned()
            .chain(self.identity.iter().map(|(name, _)| name.clone()))
            .collect();

        let mut samples = Vec::with_capacity(snapshot.records.len());
        for record in &snapshot.records {
            let value = match (definition.kind, definition.value_field.as_deref()) {
                (MetricKind::Info, _) | (_, None) => 1.0,
                (_, Some(field)) => match record.get(field) {
                    None | Some(serde_json::Value::Null) => continue,
                    Some(raw) => numeric_value(raw).ok_or_else(|| StoreError::Coercion {
                        series: definition.name.clone(),
                        field: field.to_string(),
                        value: label_value(Some(raw)),
                    })?,
                },
            };

            let label_values = label_names
                .iter()
                .map(|name| label_value(record.get(name)))
                .collect();
            samples.push(Sample {
                label_values,
                value,
            });
        }

        Ok(MetricSeries {
            kind: definition.kind,
            name: definition.name.clone(),
            help: definition.help.clone(),
            label_names,
            samples,
        })
    }

    /// Current series; empty when the snapshot is stale.
    pub fn collect(&self) -> Vec<MetricSeries> {
        self.collect_at(Utc::now())
    }

    /// Series whose coercion fails are omitted and logged.
    pub fn collect_at(&self, now: DateTime<Utc>) -> Vec<MetricSeries> {
        let snapshot = self.snapshot();
        if !self.is_fresh(&snapshot, now) {
            return Vec::new();
        }

        self.definitions
            .iter()
            .filter_map(|definition| match self.emit(definition, &snapshot) {
                Ok(series) => Some(series),
                Err(e) => {
                    tracing::warn!(series = %definition.name, error = %e, "Series emission failed");
                    None
                }
            })
            .collect()
    }
}
