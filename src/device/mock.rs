//! Scripted transport for tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::connection::{BackoffPolicy, DeviceConnection};
use super::entry::{DeviceEntry, DeviceIdentity};
use super::transport::{Params, Transport, TransportError, Verb};
use crate::config::DeviceConfig;
use crate::store::RawRecord;

/// Converts a JSON object literal into a record.
pub(crate) fn record(value: serde_json::Value) -> RawRecord {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("record literal must be an object, got {other}"),
    }
}

#[derive(Default)]
struct Inner {
    responses: Mutex<HashMap<String, Result<Vec<RawRecord>, u16>>>,
    handshake_fails: AtomicBool,
    handshakes: AtomicUsize,
    calls: Mutex<Vec<(String, Verb, Params)>>,
    delay: Mutex<Option<Duration>>,
}

/// Cloneable handle; clones share the same script.
#[derive(Clone, Default)]
pub(crate) struct MockTransport {
    inner: Arc<Inner>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Responses for `path` (any verb). Keys are `path` or `path/command`.
    pub(crate) fn set_records(&self, path: &str, values: Vec<serde_json::Value>) {
        let records = values.into_iter().map(record).collect();
        self.inner
            .responses
            .lock()
            .insert(path.to_string(), Ok(records));
    }

    pub(crate) fn fail_path(&self, path: &str, status: u16) {
        self.inner
            .responses
            .lock()
            .insert(path.to_string(), Err(status));
    }

    pub(crate) fn set_handshake_ok(&self, ok: bool) {
        self.inner.handshake_fails.store(!ok, Ordering::SeqCst);
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.inner.delay.lock() = Some(delay);
    }

    pub(crate) fn handshake_count(&self) -> usize {
        self.inner.handshakes.load(Ordering::SeqCst)
    }

    pub(crate) fn calls(&self) -> Vec<(String, Verb, Params)> {
        self.inner.calls.lock().clone()
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn handshake(&self) -> Result<(), TransportError> {
        self.inner.handshakes.fetch_add(1, Ordering::SeqCst);
        if self.inner.handshake_fails.load(Ordering::SeqCst) {
            Err(TransportError::Connect("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    async fn call(
        &self,
        path: &str,
        verb: &Verb,
        params: &Params,
    ) -> Result<Vec<RawRecord>, TransportError> {
        self.inner
            .calls
            .lock()
            .push((path.to_string(), verb.clone(), params.clone()));

        let delay = *self.inner.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let key = match verb {
            Verb::Print => path.to_string(),
            Verb::Command(cmd) => format!("{path}/{cmd}"),
        };
        match self.inner.responses.lock().get(&key) {
            Some(Ok(records)) => Ok(records.clone()),
            Some(Err(status)) => Err(TransportError::Status(*status)),
            None => Ok(Vec::new()),
        }
    }
}

/// Disconnected device `r1` at `10.0.0.1` backed by `transport`.
pub(crate) fn test_entry(transport: MockTransport) -> DeviceEntry {
    let config = DeviceConfig::new("10.0.0.1", "prometheus");
    let connection = DeviceConnection::new(
        "r1",
        "10.0.0.1",
        transport,
        BackoffPolicy::new(Duration::from_secs(120), 5, Duration::from_secs(900)),
    );
    DeviceEntry::new(DeviceIdentity::new("r1", "10.0.0.1"), config, connection)
}

/// Like [`test_entry`] but already connected.
pub(crate) async fn connected_entry(transport: MockTransport) -> DeviceEntry {
    let entry = test_entry(transport);
    entry.connection().connect().await;
    entry
}
