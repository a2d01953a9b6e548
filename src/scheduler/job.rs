//! Scheduled jobs and their queue ordering.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use strum_macros::{AsRefStr, Display};
use tokio::time::Instant;

use crate::collector::Collector;
use crate::device::DeviceEntry;

/// Priority tier of a job. Lower tiers win when fire times tie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, AsRefStr, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Cadence {
    Fast = 1,
    Slow = 2,
    /// Process-global collectors.
    System = 3,
}

/// A set of collectors loaded together on a fixed interval.
pub struct Job {
    pub device: Option<Arc<DeviceEntry>>,
    pub collectors: Vec<Arc<dyn Collector>>,
    pub interval: Duration,
    pub cadence: Cadence,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("device", &self.device_name())
            .field("collectors", &self.collectors.len())
            .field("interval", &self.interval)
            .field("cadence", &self.cadence)
            .finish()
    }
}

impl Job {
    /// The device's fast-cadence collectors, or `None` if it has none.
    pub fn fast(device: &Arc<DeviceEntry>) -> Option<Self> {
        Self::for_device(
            device,
            device.fast_collectors(),
            device.config().polling_interval,
            Cadence::Fast,
        )
    }

    /// The device's slow-cadence collectors, or `None` if it has none.
    pub fn slow(device: &Arc<DeviceEntry>) -> Option<Self> {
        Self::for_device(
            device,
            device.slow_collectors(),
            device.config().slow_polling_interval,
            Cadence::Slow,
        )
    }

    /// Process-global collectors.
    pub fn system(collectors: Vec<Arc<dyn Collector>>, interval: Duration) -> Self {
        Self {
            device: None,
            collectors,
            interval,
            cadence: Cadence::System,
        }
    }

    fn for_device(
        device: &Arc<DeviceEntry>,
        collectors: &[Arc<dyn Collector>],
        interval: Duration,
        cadence: Cadence,
    ) -> Option<Self> {
        if collectors.is_empty() {
            return None;
        }
        Some(Self {
            device: Some(Arc::clone(device)),
            collectors: collectors.to_vec(),
            interval,
            cadence,
        })
    }

    pub fn device_name(&self) -> &str {
        self.device.as_deref().map(DeviceEntry::name).unwrap_or("")
    }
}

/// Heap entry. `BinaryHeap` is a max-heap, so ordering is reversed: the
/// earliest fire time, then the lowest tier, then the oldest entry is greatest.
#[derive(Debug)]
pub(crate) struct QueuedJob {
    pub(crate) fire_at: Instant,
    pub(crate) seq: u64,
    pub(crate) job: Job,
}

impl QueuedJob {
    fn key(&self) -> (Instant, Cadence, u64) {
        (self.fire_at, self.job.cadence, self.seq)
    }
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}
