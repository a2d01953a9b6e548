//! Parsers for RouterOS value formats.

use std::sync::OnceLock;

use chrono::{NaiveDateTime, TimeZone, Utc};
use regex::Regex;

fn duration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "ms" and "us" must be tried before "m" and "s"
    RE.get_or_init(|| Regex::new(r"^(\d+)(ms|us|w|d|h|m|s)").expect("duration regex is valid"))
}

fn rate_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d*(?:\.\d*)?)([GgMmKk]?)bps").expect("rate regex is valid"))
}

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(.+)\s[\[|\(]?([a-z]+)?[\]|\)]?").expect("version regex is valid")
    })
}

/// Parse a RouterOS duration (`1w2d3h4m5s6ms7us`) into seconds.
///
/// Parsing stops at the first unrecognised component; an unparseable value is 0.
pub fn parse_timedelta(text: &str) -> f64 {
    let mut rest = text.trim();
    let mut seconds = 0.0;
    while let Some(caps) = duration_regex().captures(rest) {
        let amount = caps[1].parse::<f64>().unwrap_or(0.0);
        seconds += amount
            * match &caps[2] {
                "w" => 604_800.0,
                "d" => 86_400.0,
                "h" => 3_600.0,
                "m" => 60.0,
                "s" => 1.0,
                "ms" => 1e-3,
                _ => 1e-6,
            };
        rest = &rest[caps[0].len()..];
    }
    seconds
}

/// Parse a link rate (`1Gbps`, `100Mbps`, `2.5Gbps`) into bits per second.
///
/// `None` maps to 0; unparseable input maps to -1.
pub fn parse_rates(rate: Option<&str>) -> f64 {
    let Some(rate) = rate else {
        return 0.0;
    };
    let Some(caps) = rate_regex().captures(rate) else {
        return -1.0;
    };
    let Ok(base) = caps[1].parse::<f64>() else {
        return -1.0;
    };
    let exponent = match &caps[2] {
        "G" | "g" => 9,
        "M" | "m" => 6,
        "K" | "k" => 3,
        _ => -1,
    };
    base * 10f64.powi(exponent)
}

/// Parse a RouterOS timestamp into unix seconds, treating it as UTC.
///
/// Accepts `2024-01-15 10:20:30`, ISO `2024-01-15T10:20:30` and the v6 style
/// `jan/15/2024 10:20:30`.
pub fn parse_datetime(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    const FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%b/%d/%Y %H:%M:%S"];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive).timestamp() as f64)
}

/// Split `"7.16.2 (stable)"` into version and channel.
///
/// Returns `None` when the text has no channel suffix.
pub fn parse_ros_version(text: &str) -> Option<(String, String)> {
    let caps = version_regex().captures(text)?;
    let version = caps.get(1)?.as_str().trim().to_string();
    let channel = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
    Some((version, channel))
}

/// Parse the release feed body (`"7.16.2 1733140320"`) into version and build time.
pub fn parse_release_line(text: &str) -> Option<(String, String)> {
    let mut parts = text.split_whitespace();
    let version = parts.next()?;
    let build = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((version.to_string(), build.to_string()))
}
