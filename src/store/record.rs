//! Record types and normalization primitives.

use std::collections::BTreeMap;

use serde_json::Value;

/// One item as returned by the transport.
pub type RawRecord = serde_json::Map<String, Value>;

/// A record after key normalization, filtering, labelling and translation.
pub type Record = BTreeMap<String, Value>;

/// Field translation: receives the prior value as text (`None` when the field
/// is absent) and returns a replacement, or `None` for "no change".
pub type TranslateFn = fn(Option<&str>) -> Option<Value>;

/// A named field translation.
#[derive(Clone, Copy)]
pub struct Translation {
    /// Normalized field name.
    pub field: &'static str,
    /// Translation function.
    pub func: TranslateFn,
}

impl Translation {
    pub const fn new(field: &'static str, func: TranslateFn) -> Self {
        Self { field, func }
    }
}

impl std::fmt::Debug for Translation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Translation")
            .field("field", &self.field)
            .finish_non_exhaustive()
    }
}

fn is_separator(c: char) -> bool {
    matches!(c, '.' | '_' | '-')
}

/// Normalize a record key.
///
/// Strips one leading and one trailing `.`, `_` or `-`, then replaces every
/// remaining `.` and `-` with `_`.
///
/// ```
/// use mtik_exporter::store::normalize_key;
///
/// assert_eq!(normalize_key(".id"), "id");
/// assert_eq!(normalize_key("dst-address"), "dst_address");
/// assert_eq!(normalize_key("rx-byte_"), "rx_byte");
/// ```
pub fn normalize_key(key: &str) -> String {
    let mut trimmed = key;
    if let Some(c) = trimmed.chars().next().filter(|&c| is_separator(c)) {
        trimmed = &trimmed[c.len_utf8()..];
    }
    if let Some(c) = trimmed.chars().next_back().filter(|&c| is_separator(c)) {
        trimmed = &trimmed[..trimmed.len() - c.len_utf8()];
    }
    trimmed.replace(['.', '-'], "_")
}

/// True when the record carries `disabled == "true"`.
pub fn is_disabled(record: &RawRecord) -> bool {
    match record.get("disabled") {
        Some(Value::String(s)) => s == "true",
        Some(Value::Bool(b)) => *b,
        _ => false,
    }
}

/// Render a value as a label: strings verbatim, null as empty.
pub fn label_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Read a value as a number.
///
/// Numbers pass through, strings are parsed, booleans map to 1/0.
/// `None` means the value cannot be coerced.
pub fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.trim() {
            "true" => Some(1.0),
            "false" => Some(0.0),
            text => text.parse::<f64>().ok(),
        },
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
