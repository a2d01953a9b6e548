//! Record sources: where a metric group's raw records come from.

use serde_json::Value;

use super::traits::CollectorError;
use crate::device::{DeviceEntry, Params, Verb};
use crate::store::RawRecord;

/// Produces the raw records of one metric group.
#[async_trait::async_trait]
pub trait RecordSource: Send + Sync + 'static {
    /// Fetch records. `device` is `None` for process-global sources.
    async fn fetch(&self, device: Option<&DeviceEntry>) -> Result<Vec<RawRecord>, CollectorError>;
}

fn require_device(device: Option<&DeviceEntry>) -> Result<&DeviceEntry, CollectorError> {
    device.ok_or_else(|| CollectorError::Config("source requires a device".to_string()))
}

fn params<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Params {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}

/// `print` on one API path.
#[derive(Debug, Clone)]
pub struct PathSource {
    path: &'static str,
    query: Vec<(&'static str, &'static str)>,
}

impl PathSource {
    pub fn new(path: &'static str) -> Self {
        Self {
            path,
            query: Vec::new(),
        }
    }

    /// Add a query filter (e.g. `status=reachable`).
    pub fn with_query(mut self, key: &'static str, value: &'static str) -> Self {
        self.query.push((key, value));
        self
    }
}

#[async_trait::async_trait]
impl RecordSource for PathSource {
    async fn fetch(&self, device: Option<&DeviceEntry>) -> Result<Vec<RawRecord>, CollectorError> {
        let device = require_device(device)?;
        let records = device
            .connection()
            .call(self.path, &Verb::Print, &params(self.query.iter().copied()))
            .await?;
        Ok(records)
    }
}

fn item_id(record: &RawRecord) -> Option<&str> {
    record
        .get(".id")
        .or_else(|| record.get("id"))
        .and_then(Value::as_str)
}

/// Lists items on a path, then runs `monitor once` over them.
///
/// Each monitor result is merged with the `id`, `name` and `comment` of the
/// item it belongs to. With `idle_link_down`, items that are not running or
/// are disabled skip the monitor call and report `status: link-down`.
/// With `item_fields`, every listed field is carried over instead.
#[derive(Debug, Clone)]
pub struct MonitorSource {
    list_path: &'static str,
    proplist: Option<&'static str>,
    idle_link_down: bool,
    item_fields: bool,
}

impl MonitorSource {
    pub fn new(list_path: &'static str) -> Self {
        Self {
            list_path,
            proplist: None,
            idle_link_down: false,
            item_fields: false,
        }
    }

    pub fn with_proplist(mut self, proplist: &'static str) -> Self {
        self.proplist = Some(proplist);
        self
    }

    pub fn with_idle_link_down(mut self) -> Self {
        self.idle_link_down = true;
        self
    }

    pub fn with_item_fields(mut self) -> Self {
        self.item_fields = true;
        self
    }

    fn is_idle(record: &RawRecord) -> bool {
        let flag = |key: &str, default: &str| {
            record
                .get(key)
                .and_then(Value::as_str)
                .map_or(default == "true", |v| v == "true")
        };
        !flag("running", "true") || flag("disabled", "false")
    }
}

#[async_trait::async_trait]
impl RecordSource for MonitorSource {
    async fn fetch(&self, device: Option<&DeviceEntry>) -> Result<Vec<RawRecord>, CollectorError> {
        let device = require_device(device)?;
        let connection = device.connection();

        let list_params = params(self.proplist.map(|p| (".proplist", p)));
        let items = connection
            .call(self.list_path, &Verb::Print, &list_params)
            .await?;

        let mut records = Vec::with_capacity(items.len());
        let mut monitored = Vec::with_capacity(items.len());
        for item in items {
            let mut head = if self.item_fields {
                item.clone()
            } else {
                RawRecord::new()
            };
            head.remove(".id");
            head.insert("id".into(), Value::String(item_id(&item).unwrap_or_default().to_string()));
            for key in ["name", "comment"] {
                head.insert(key.into(), item.get(key).cloned().unwrap_or(Value::String(String::new())));
            }

            if self.idle_link_down && Self::is_idle(&item) {
                head.insert("status".into(), Value::String("link-down".into()));
                records.push(head);
            } else {
                monitored.push(head);
            }
        }

        if monitored.is_empty() {
            return Ok(records);
        }

        let ids = monitored
            .iter()
            .filter_map(|head| head.get("id").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(",");
        let monitor_params = params([("once", "true"), (".id", ids.as_str())]);
        let results = connection
            .call(self.list_path, &Verb::command("monitor"), &monitor_params)
            .await?;

        for (mut head, result) in monitored.into_iter().zip(results) {
            head.extend(result.into_iter().filter(|(k, _)| k != "name" && k != ".id"));
            records.push(head);
        }
        Ok(records)
    }
}
