//! Device entry: identity, config, connection and assigned collectors.

use std::sync::Arc;

use parking_lot::RwLock;

use super::connection::DeviceConnection;
use crate::collector::Collector;
use crate::config::DeviceConfig;
use crate::store::{RawRecord, Record, normalize_key};

/// Label names carried by every series from a device.
pub const DEVICE_LABELS: [&str; 2] = ["device_name", "device_address"];

/// Immutable identity of a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub device_name: String,
    pub address: String,
}

impl DeviceIdentity {
    pub fn new(device_name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            address: address.into(),
        }
    }

    /// Identity as `(label, value)` pairs in [`DEVICE_LABELS`] order.
    pub fn labels(&self) -> Vec<(String, String)> {
        vec![
            (DEVICE_LABELS[0].to_string(), self.device_name.clone()),
            (DEVICE_LABELS[1].to_string(), self.address.clone()),
        ]
    }
}

/// Everything the scheduler needs for one device.
pub struct DeviceEntry {
    identity: DeviceIdentity,
    config: DeviceConfig,
    connection: DeviceConnection,
    fast_collectors: Vec<Arc<dyn Collector>>,
    slow_collectors: Vec<Arc<dyn Collector>>,
    dhcp_leases: RwLock<Vec<Record>>,
}

impl std::fmt::Debug for DeviceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceEntry")
            .field("identity", &self.identity)
            .field("connection", &self.connection)
            .field("fast_collectors", &self.fast_collectors.len())
            .field("slow_collectors", &self.slow_collectors.len())
            .finish_non_exhaustive()
    }
}

impl DeviceEntry {
    pub fn new(identity: DeviceIdentity, config: DeviceConfig, connection: DeviceConnection) -> Self {
        Self {
            identity,
            config,
            connection,
            fast_collectors: Vec::new(),
            slow_collectors: Vec::new(),
            dhcp_leases: RwLock::new(Vec::new()),
        }
    }

    /// Assign the collectors for both cadences.
    pub fn with_collectors(
        mut self,
        fast: Vec<Arc<dyn Collector>>,
        slow: Vec<Arc<dyn Collector>>,
    ) -> Self {
        self.fast_collectors = fast;
        self.slow_collectors = slow;
        self
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.identity.device_name
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn connection(&self) -> &DeviceConnection {
        &self.connection
    }

    pub fn fast_collectors(&self) -> &[Arc<dyn Collector>] {
        &self.fast_collectors
    }

    pub fn slow_collectors(&self) -> &[Arc<dyn Collector>] {
        &self.slow_collectors
    }

    /// Fast then slow collectors.
    pub fn collectors(&self) -> impl Iterator<Item = &Arc<dyn Collector>> {
        self.fast_collectors.iter().chain(self.slow_collectors.iter())
    }

    /// Replace the DHCP lease side table.
    pub fn set_dhcp_leases(&self, leases: &[RawRecord]) {
        let normalized = leases
            .iter()
            .map(|lease| {
                lease
                    .iter()
                    .map(|(k, v)| (normalize_key(k), v.clone()))
                    .collect::<Record>()
            })
            .collect();
        *self.dhcp_leases.write() = normalized;
    }

    /// First lease whose normalized field `key` equals `value`.
    pub fn dhcp_lease(&self, key: &str, value: &str) -> Option<Record> {
        self.dhcp_leases
            .read()
            .iter()
            .find(|lease| lease.get(key).and_then(|v| v.as_str()) == Some(value))
            .cloned()
    }
}
