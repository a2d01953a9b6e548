//! Generic collector driven by a metric group definition.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::source::RecordSource;
use super::traits::{Collector, CollectorError, RecordError};
use crate::device::DeviceEntry;
use crate::store::{MetricSeries, MetricStore, RawRecord, SeriesDefinition, Translation};

/// Per-record post-processing. `Ok(None)` drops the record silently.
pub type RecordFn = fn(RawRecord, Option<&DeviceEntry>) -> Result<Option<RawRecord>, RecordError>;

/// Whole-batch post-processing, run after the per-record step.
pub type BatchFn = fn(Vec<RawRecord>, Option<&DeviceEntry>) -> Vec<RawRecord>;

/// One record source feeding one metric store.
pub struct StageSpec {
    source: Arc<dyn RecordSource>,
    labels: Vec<&'static str>,
    translations: Vec<Translation>,
    per_record: Option<RecordFn>,
    batch: Option<BatchFn>,
    series: Vec<SeriesDefinition>,
}

impl StageSpec {
    pub fn new(source: impl RecordSource, labels: &[&'static str]) -> Self {
        Self {
            source: Arc::new(source),
            labels: labels.to_vec(),
            translations: Vec::new(),
            per_record: None,
            batch: None,
            series: Vec::new(),
        }
    }

    pub fn translate(mut self, field: &'static str, func: crate::store::TranslateFn) -> Self {
        self.translations.push(Translation::new(field, func));
        self
    }

    pub fn per_record(mut self, func: RecordFn) -> Self {
        self.per_record = Some(func);
        self
    }

    pub fn batch(mut self, func: BatchFn) -> Self {
        self.batch = Some(func);
        self
    }

    pub fn series(mut self, definition: SeriesDefinition) -> Self {
        self.series.push(definition);
        self
    }
}

/// A metric group: a name plus one or more stages.
pub struct MetricGroup {
    pub name: &'static str,
    pub stages: Vec<StageSpec>,
}

impl MetricGroup {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            stages: Vec::new(),
        }
    }

    pub fn stage(mut self, stage: StageSpec) -> Self {
        self.stages.push(stage);
        self
    }
}

struct Stage {
    source: Arc<dyn RecordSource>,
    per_record: Option<RecordFn>,
    batch: Option<BatchFn>,
    store: MetricStore,
}

/// Collector for any [`MetricGroup`].
pub struct GroupCollector {
    name: String,
    stages: Vec<Stage>,
}

impl std::fmt::Debug for GroupCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupCollector")
            .field("name", &self.name)
            .field("stages", &self.stages.len())
            .finish()
    }
}

impl GroupCollector {
    /// Build the collector, creating one store per stage.
    ///
    /// `identity` labels are attached to every record; `interval` is the
    /// polling interval of the job that will run this collector.
    pub fn new(group: MetricGroup, identity: Vec<(String, String)>, interval: Duration) -> Self {
        let stages = group
            .stages
            .into_iter()
            .map(|spec| Stage {
                source: spec.source,
                per_record: spec.per_record,
                batch: spec.batch,
                store: MetricStore::new(identity.clone(), spec.labels, interval)
                    .with_translations(spec.translations)
                    .with_series(spec.series),
            })
            .collect();

        Self {
            name: group.name.to_string(),
            stages,
        }
    }

    /// Stores in stage order.
    pub fn stores(&self) -> impl Iterator<Item = &MetricStore> {
        self.stages.iter().map(|s| &s.store)
    }

    /// Run every stage, stamping snapshots with `now`.
    ///
    /// A fetch error stops the load; stores of unfinished stages keep their
    /// previous snapshot.
    pub async fn load_at(
        &self,
        device: Option<&DeviceEntry>,
        now: DateTime<Utc>,
    ) -> Result<(), CollectorError> {
        for stage in &self.stages {
            let raw = stage.source.fetch(device).await?;

            let mut records = Vec::with_capacity(raw.len());
            for record in raw {
                match stage.per_record {
                    None => records.push(record),
                    Some(func) => match func(record, device) {
                        Ok(Some(record)) => records.push(record),
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(
                                collector = %self.name,
                                device = device.map(DeviceEntry::name).unwrap_or_default(),
                                error = %e,
                                "Dropping record"
                            );
                        }
                    },
                }
            }

            if let Some(batch) = stage.batch {
                records = batch(records, device);
            }

            stage.store.set_metrics_at(records, now);
        }
        Ok(())
    }

    pub fn collect_at(&self, now: DateTime<Utc>) -> Vec<MetricSeries> {
        self.stages
            .iter()
            .flat_map(|stage| stage.store.collect_at(now))
            .collect()
    }
}

#[async_trait::async_trait]
impl Collector for GroupCollector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self, device: Option<&DeviceEntry>) -> Result<(), CollectorError> {
        self.load_at(device, Utc::now()).await
    }

    fn collect(&self) -> Vec<MetricSeries> {
        self.collect_at(Utc::now())
    }
}
