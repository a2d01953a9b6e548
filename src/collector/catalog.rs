//! Catalog of device metric groups.
//!
//! Every group is data: a record source, default labels, field translations,
//! optional post-processing and the series it exports. [`build`] turns a
//! catalog name into a ready collector.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::group::{GroupCollector, MetricGroup, StageSpec};
use super::parse::{parse_datetime, parse_rates, parse_ros_version, parse_timedelta};
use super::source::{MonitorSource, PathSource};
use super::traits::{Collector, CollectorError, RecordError};
use crate::device::DeviceEntry;
use crate::store::{RawRecord, SeriesDefinition as S};

/// Names usable in a device's `collectors` / `slow_collectors` lists.
pub const NAMES: &[&str] = &[
    "interface",
    "interface_monitor",
    "dhcp",
    "system_resource",
    "health",
    "identity",
    "pool",
    "route",
    "ipv6_route",
    "firewall",
    "ipv6_firewall",
    "ipv6_neighbor",
    "arp",
    "bridge_hosts",
    "netwatch",
    "public_ip",
    "installed_packages",
    "wifi",
    "wifi_clients",
    "queue_tree",
    "queue_simple",
    "wireguard",
    "wireguard_peers",
    "poe",
    "user",
    "bgp",
    "capsman",
    "kid_control_devices",
];

pub fn is_known(name: &str) -> bool {
    NAMES.contains(&name)
}

/// Build the collector for catalog entry `name`.
///
/// # Errors
/// `CollectorError::Config` if the name is not in the catalog.
pub fn build(
    name: &str,
    identity: Vec<(String, String)>,
    interval: Duration,
) -> Result<Arc<dyn Collector>, CollectorError> {
    let group =
        group(name).ok_or_else(|| CollectorError::Config(format!("unknown collector '{name}'")))?;
    Ok(Arc::new(GroupCollector::new(group, identity, interval)))
}

/// Definition of catalog entry `name`.
pub fn group(name: &str) -> Option<MetricGroup> {
    let group = match name {
        "interface" => interface(),
        "interface_monitor" => interface_monitor(),
        "dhcp" => dhcp(),
        "system_resource" => system_resource(),
        "health" => health(),
        "identity" => MetricGroup::new("identity").stage(
            StageSpec::new(PathSource::new("system/identity"), &["name"])
                .series(S::info("system_identity", "System identity")),
        ),
        "pool" => MetricGroup::new("pool").stage(
            StageSpec::new(PathSource::new("ip/pool/used"), &["pool", "address", "owner", "info"])
                .series(S::info("ip_pool_device", "IP pool used addresses")),
        ),
        "route" => routes("route", "ip/route", "routes"),
        "ipv6_route" => routes("ipv6_route", "ipv6/route", "ipv6_routes"),
        "firewall" => firewall(
            "firewall",
            ["ip/firewall/filter", "ip/firewall/mangle", "ip/firewall/raw"],
            "",
        ),
        "ipv6_firewall" => firewall(
            "ipv6_firewall",
            ["ipv6/firewall/filter", "ipv6/firewall/mangle", "ipv6/firewall/raw"],
            "_ipv6",
        ),
        "ipv6_neighbor" => ipv6_neighbor(),
        "arp" => arp(),
        "bridge_hosts" => bridge_hosts(),
        "netwatch" => netwatch(),
        "public_ip" => public_ip(),
        "installed_packages" => MetricGroup::new("installed_packages").stage(
            StageSpec::new(
                PathSource::new("system/package"),
                &["name", "version", "build_time", "disabled"],
            )
            .series(S::info("installed_packages", "Installed packages")),
        ),
        "wifi" => wifi(),
        "wifi_clients" => wifi_clients(),
        "queue_tree" => queue_tree(),
        "queue_simple" => queue_simple(),
        "wireguard" => MetricGroup::new("wireguard").stage(
            StageSpec::new(
                PathSource::new("interface/wireguard"),
                &["name", "mtu", "listen_port", "public_key", "comment", "running"],
            )
            .series(S::info("wireguard_interfaces", "Wireguard interfaces")),
        ),
        "wireguard_peers" => wireguard_peers(),
        "poe" => MetricGroup::new("poe").stage(
            StageSpec::new(
                MonitorSource::new("interface/ethernet/poe")
                    .with_idle_link_down()
                    .with_item_fields(),
                &[
                    "id", "name", "comment", "poe_out", "poe_priority", "poe_voltage",
                    "poe_out_status", "poe_out_voltage", "poe_out_current", "poe_out_power",
                ],
            )
            .series(S::info("poe", "PoE port state")),
        ),
        "user" => MetricGroup::new("user").stage(
            StageSpec::new(PathSource::new("user/active"), &["name", "address", "via", "group"])
                .translate("when", datetime)
                .batch(collapse_sessions)
                .series(S::gauge("active_users_last_login", "Active users last login", "when"))
                .series(S::gauge("active_users_count", "Active users session count", "count")),
        ),
        "bgp" => bgp(),
        "capsman" => MetricGroup::new("capsman").stage(
            StageSpec::new(
                PathSource::new("interface/wifi/capsman/remote-cap"),
                &["identity", "version", "base_mac", "board"],
            )
            .series(S::info("capsman_remote_caps", "CAPsMAN remote caps")),
        ),
        "kid_control_devices" => kid_control_devices(),
        _ => return None,
    };
    Some(group)
}

// ============================================================================
// Translations
// ============================================================================

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn link_status(value: Option<&str>) -> Option<Value> {
    Some(Value::from(u8::from(value == Some("link-ok"))))
}

fn up_status(value: Option<&str>) -> Option<Value> {
    Some(Value::from(u8::from(value == Some("up"))))
}

fn rate(value: Option<&str>) -> Option<Value> {
    Some(Value::from(parse_rates(value)))
}

fn rate_if_present(value: Option<&str>) -> Option<Value> {
    present(value).map(|v| Value::from(parse_rates(Some(v))))
}

fn flag(value: Option<&str>) -> Option<Value> {
    Some(Value::from(u8::from(value == Some("true"))))
}

fn full_duplex(value: Option<&str>) -> Option<Value> {
    value.map(|v| Value::from(u8::from(v == "true")))
}

fn duration_or_zero(value: Option<&str>) -> Option<Value> {
    Some(Value::from(present(value).map_or(0.0, parse_timedelta)))
}

fn duration(value: Option<&str>) -> Option<Value> {
    present(value).map(|v| Value::from(parse_timedelta(v)))
}

/// Unparseable timestamps become null so the sample is skipped.
fn datetime(value: Option<&str>) -> Option<Value> {
    present(value).map(|v| parse_datetime(v).map_or(Value::Null, Value::from))
}

fn percent(value: Option<&str>) -> Option<Value> {
    match present(value) {
        Some(v) => Some(Value::String(v.trim_end_matches('%').to_string())),
        None => Some(Value::Null),
    }
}

fn ddns_name(value: Option<&str>) -> Option<Value> {
    Some(Value::String(present(value).unwrap_or("ddns_disabled").to_string()))
}

fn empty_if_absent(value: Option<&str>) -> Option<Value> {
    Some(Value::String(value.unwrap_or_default().to_string()))
}

// ============================================================================
// Record post-processing
// ============================================================================

fn text<'a>(record: &'a RawRecord, key: &str) -> Option<&'a str> {
    record.get(key).and_then(Value::as_str)
}

fn set(record: &mut RawRecord, key: &str, value: impl Into<String>) {
    record.insert(key.to_string(), Value::String(value.into()));
}

/// Cross-reference the device's DHCP leases by MAC address.
///
/// With `lease_type`, also records whether the lease is `dynamic` or `static`.
fn add_dhcp_info(record: &mut RawRecord, device: Option<&DeviceEntry>, lease_type: bool) {
    let lease = text(record, "mac-address")
        .zip(device)
        .and_then(|(mac, device)| device.dhcp_lease("mac_address", mac));

    let field = |key: &str| {
        lease
            .as_ref()
            .and_then(|l| l.get(key))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let (name, comment, address) = match lease {
        Some(_) => (field("host_name"), field("comment"), field("address")),
        None => (String::new(), String::new(), "No DHCP Record".to_string()),
    };
    let kind = match &lease {
        Some(l) if l.get("dynamic").and_then(Value::as_str) == Some("true") => "dynamic",
        Some(_) => "static",
        None => "",
    };

    set(record, "dhcp_name", name);
    set(record, "dhcp_comment", comment);
    set(record, "dhcp_address", address);
    if lease_type {
        set(record, "dhcp_lease_type", kind);
    }
}

fn with_dhcp_info(
    mut record: RawRecord,
    device: Option<&DeviceEntry>,
) -> Result<Option<RawRecord>, RecordError> {
    add_dhcp_info(&mut record, device, false);
    Ok(Some(record))
}

fn with_dhcp_lease_type(
    mut record: RawRecord,
    device: Option<&DeviceEntry>,
) -> Result<Option<RawRecord>, RecordError> {
    add_dhcp_info(&mut record, device, true);
    Ok(Some(record))
}

fn running_only(
    record: RawRecord,
    _: Option<&DeviceEntry>,
) -> Result<Option<RawRecord>, RecordError> {
    Ok((text(&record, "running") == Some("true")).then_some(record))
}

fn with_user(
    record: RawRecord,
    _: Option<&DeviceEntry>,
) -> Result<Option<RawRecord>, RecordError> {
    Ok(present(text(&record, "user")).is_some().then_some(record))
}

fn publish_leases(records: Vec<RawRecord>, device: Option<&DeviceEntry>) -> Vec<RawRecord> {
    if let Some(device) = device {
        device.set_dhcp_leases(&records);
    }
    records
}

/// RouterOS v7 reports health as `{name, value}` rows.
fn fold_health_row(
    mut record: RawRecord,
    _: Option<&DeviceEntry>,
) -> Result<Option<RawRecord>, RecordError> {
    if let Some(name) = text(&record, "name").map(str::to_string) {
        let value = record.get("value").cloned().unwrap_or(Value::Null);
        record.insert(name, value);
    }
    Ok(Some(record))
}

fn split_version(
    mut record: RawRecord,
    _: Option<&DeviceEntry>,
) -> Result<Option<RawRecord>, RecordError> {
    if let Some((version, channel)) = text(&record, "version").and_then(parse_ros_version) {
        if !channel.is_empty() {
            set(&mut record, "current_version", version);
            set(&mut record, "channel", channel);
        }
    }
    Ok(Some(record))
}

const RTT_FIELDS: [&str; 5] = ["rtt-avg", "rtt-jitter", "rtt-max", "rtt-min", "rtt-stdev"];

fn drop_lossy_rtt(
    mut record: RawRecord,
    _: Option<&DeviceEntry>,
) -> Result<Option<RawRecord>, RecordError> {
    if text(&record, "type") == Some("icmp") {
        let loss = text(&record, "loss-percent")
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(100.0);
        if loss > 40.0 {
            for key in RTT_FIELDS {
                record.remove(key);
            }
        }
    }
    Ok(Some(record))
}

fn split_client_bytes(
    mut record: RawRecord,
    device: Option<&DeviceEntry>,
) -> Result<Option<RawRecord>, RecordError> {
    let bytes = text(&record, "bytes").ok_or_else(|| RecordError::missing("bytes"))?;
    let (tx, rx) = bytes
        .split_once(',')
        .ok_or_else(|| RecordError::new(format!("malformed bytes '{bytes}'")))?;
    let (tx, rx) = (tx.to_string(), rx.to_string());
    set(&mut record, "tx_bytes", tx);
    set(&mut record, "rx_bytes", rx);
    add_dhcp_info(&mut record, device, false);
    Ok(Some(record))
}

/// Queue values of the form `up/down` become `<key>_up` and `<key>_down`.
fn split_up_down(
    record: RawRecord,
    _: Option<&DeviceEntry>,
) -> Result<Option<RawRecord>, RecordError> {
    let mut split = RawRecord::new();
    for (key, value) in record {
        match value.as_str().and_then(|v| v.split_once('/')) {
            Some((up, down)) => {
                set(&mut split, &format!("{key}_up"), up);
                set(&mut split, &format!("{key}_down"), down);
            }
            None => {
                split.insert(key, value);
            }
        }
    }
    Ok(Some(split))
}

/// One record per address, name and service, keeping the latest login.
fn collapse_sessions(records: Vec<RawRecord>, _: Option<&DeviceEntry>) -> Vec<RawRecord> {
    let mut sessions: Vec<(String, RawRecord)> = Vec::new();
    for record in records {
        let field = |key: &str| text(&record, key).unwrap_or_default().to_string();
        let key = format!("{}-{}-{}", field("address"), field("name"), field("via"));
        let when = field("when");

        if let Some((_, existing)) = sessions.iter_mut().find(|(k, _)| *k == key) {
            if text(existing, "when").is_none_or(|w| when.as_str() > w) {
                set(existing, "when", when);
            }
            let count = existing.get("count").and_then(Value::as_u64).unwrap_or(0);
            existing.insert("count".into(), Value::from(count + 1));
            continue;
        }

        let mut session = RawRecord::new();
        set(&mut session, "address", text(&record, "address").unwrap_or("unknown"));
        set(&mut session, "name", text(&record, "name").unwrap_or("unknown"));
        set(&mut session, "via", field("via"));
        set(&mut session, "group", field("group"));
        set(&mut session, "when", when);
        session.insert("count".into(), Value::from(1u64));
        sessions.push((key, session));
    }
    sessions.into_iter().map(|(_, s)| s).collect()
}

// ============================================================================
// Groups
// ============================================================================

fn interface() -> MetricGroup {
    let mut stage = StageSpec::new(
        PathSource::new("interface"),
        &["id", "name", "comment", "type", "mtu", "mac_address", "running"],
    )
    .per_record(running_only);
    for (name, help, field) in [
        ("interface_rx_byte", "Number of received bytes", "rx_byte"),
        ("interface_tx_byte", "Number of transmitted bytes", "tx_byte"),
        ("interface_rx_packet", "Number of packets received", "rx_packet"),
        ("interface_tx_packet", "Number of transmitted packets", "tx_packet"),
        ("interface_rx_error", "Number of packets received with an error", "rx_error"),
        ("interface_tx_error", "Number of packets transmitted with an error", "tx_error"),
        ("interface_rx_drop", "Number of received packets being dropped", "rx_drop"),
        ("interface_tx_drop", "Number of transmitted packets being dropped", "tx_drop"),
        ("link_downs", "Number of times link went down", "link_downs"),
    ] {
        stage = stage.series(S::counter(name, help, field));
    }
    MetricGroup::new("interface").stage(stage)
}

fn interface_monitor() -> MetricGroup {
    MetricGroup::new("interface_monitor").stage(
        StageSpec::new(
            MonitorSource::new("interface/ethernet")
                .with_proplist(".id,name,comment,running,disabled")
                .with_idle_link_down(),
            &["id", "name", "comment"],
        )
        .translate("status", link_status)
        .translate("rate", rate)
        .translate("full_duplex", full_duplex)
        .series(S::gauge("interface_status", "Current interface link status", "status"))
        .series(S::gauge("interface_rate", "Actual interface connection data rate", "rate"))
        .series(S::gauge("interface_full_duplex", "Full duplex data transmission", "full_duplex"))
        .series(S::gauge("interface_sfp_temperature", "Current SFP temperature", "sfp_temperature")),
    )
}

fn dhcp() -> MetricGroup {
    let per_lease = ["mac_address", "comment", "client_id"];
    MetricGroup::new("dhcp").stage(
        StageSpec::new(
            PathSource::new("ip/dhcp-server/lease"),
            &[
                "active_address", "address", "mac_address", "host_name", "comment", "server",
                "dynamic", "client_id", "status", "address_lists",
            ],
        )
        .translate("expires_after", duration)
        .translate("last_seen", duration)
        .batch(publish_leases)
        .series(S::info("dhcp_lease", "DHCP active leases"))
        .series(
            S::gauge("dhcp_lease_expiry", "DHCP active lease expiry", "expires_after")
                .with_labels(per_lease),
        )
        .series(
            S::gauge("dhcp_lease_last_seen", "DHCP active lease last seen", "last_seen")
                .with_labels(per_lease),
        ),
    )
}

fn system_resource() -> MetricGroup {
    let board = ["board_name", "cpu", "architecture_name"];
    let mut stage = StageSpec::new(
        PathSource::new("system/resource"),
        &["version", "channel", "current_version", "cpu", "architecture_name", "board_name"],
    )
    .per_record(split_version)
    .translate("uptime", duration_or_zero)
    .translate("bad_blocks", percent)
    .series(S::info("system", "System resource information"))
    .series(S::counter("system_uptime", "Time interval since boot-up", "uptime").with_labels(board));
    for (name, help, field) in [
        ("system_free_memory", "Unused amount of RAM", "free_memory"),
        ("system_total_memory", "Amount of installed RAM", "total_memory"),
        ("system_free_hdd_space", "Free space on hard drive or NAND", "free_hdd_space"),
        ("system_total_hdd_space", "Size of the hard drive or NAND", "total_hdd_space"),
        ("system_cpu_load", "Percentage of used CPU resources", "cpu_load"),
        ("system_cpu_count", "Number of CPUs present on the system", "cpu_count"),
        ("system_cpu_frequency", "Current CPU frequency", "cpu_frequency"),
        ("system_hdd_bad_blocks_percent", "HDD bad block percentage", "bad_blocks"),
    ] {
        stage = stage.series(S::gauge(name, help, field).with_labels(board));
    }
    stage = stage.series(
        S::counter("system_hdd_write_sector_count", "HDD written sector count", "write_sect_total")
            .with_labels(board),
    );
    MetricGroup::new("system_resource").stage(stage)
}

fn health() -> MetricGroup {
    let mut stage =
        StageSpec::new(PathSource::new("system/health"), &[]).per_record(fold_health_row);
    for (name, help, field) in [
        ("system_routerboard_voltage", "Supplied routerboard voltage", "voltage"),
        ("system_routerboard_temperature", "Routerboard current temperature", "temperature"),
        ("system_routerboard_phy_temperature", "Routerboard PHY temperature", "phy_temperature"),
        ("system_cpu_temperature", "CPU current temperature", "cpu_temperature"),
        ("system_switch_temperature", "Switch chip current temperature", "switch_temperature"),
        ("system_fan_one_speed", "System fan 1 current speed", "fan1_speed"),
        ("system_fan_two_speed", "System fan 2 current speed", "fan2_speed"),
        ("system_fan_three_speed", "System fan 3 current speed", "fan3_speed"),
        ("system_fan_four_speed", "System fan 4 current speed", "fan4_speed"),
        ("system_power_consumption", "System power consumption", "power_consumption"),
    ] {
        stage = stage.series(S::gauge(name, help, field));
    }
    MetricGroup::new("health").stage(stage)
}

fn routes(name: &'static str, path: &'static str, series: &str) -> MetricGroup {
    MetricGroup::new(name).stage(
        StageSpec::new(
            PathSource::new(path),
            &[
                "comment", "type", "dst_address", "gateway", "distance", "connect", "dynamic",
                "bgp", "ospf", "active",
            ],
        )
        .series(S::info(series, "Routing table entries")),
    )
}

fn firewall(name: &'static str, tables: [&'static str; 3], suffix: &str) -> MetricGroup {
    let mut group = MetricGroup::new(name);
    for path in tables {
        let table = path.rsplit('/').next().unwrap_or(path);
        group = group.stage(
            StageSpec::new(PathSource::new(path), &["chain", "action", "comment"])
                .series(S::counter(
                    format!("firewall_{table}{suffix}_bytes"),
                    format!("Bytes matched by {table} rules"),
                    "bytes",
                ))
                .series(S::counter(
                    format!("firewall_{table}{suffix}_packets"),
                    format!("Packets matched by {table} rules"),
                    "packets",
                )),
        );
    }
    group
}

fn ipv6_neighbor() -> MetricGroup {
    MetricGroup::new("ipv6_neighbor").stage(
        StageSpec::new(
            PathSource::new("ipv6/neighbor").with_query("status", "reachable"),
            &[
                "address", "interface", "mac_address", "status", "router", "dhcp_name",
                "dhcp_address", "dhcp_comment",
            ],
        )
        .per_record(with_dhcp_info)
        .series(S::info("ipv6_neighbor", "Reachable IPv6 neighbors")),
    )
}

fn arp() -> MetricGroup {
    MetricGroup::new("arp").stage(
        StageSpec::new(
            PathSource::new("ip/arp"),
            &[
                "mac_address", "address", "interface", "status", "dynamic", "dhcp_name",
                "dhcp_comment", "dhcp_lease_type",
            ],
        )
        .per_record(with_dhcp_lease_type)
        .series(S::info("arp_entry", "ARP entry")),
    )
}

fn bridge_hosts() -> MetricGroup {
    MetricGroup::new("bridge_hosts").stage(
        StageSpec::new(
            PathSource::new("interface/bridge/host")
                .with_query("local", "false")
                .with_query("external", "true"),
            &[
                "mac_address", "vid", "bridge", "interface", "on_interface", "dhcp_name",
                "dhcp_comment", "dhcp_address",
            ],
        )
        .per_record(with_dhcp_info)
        .series(S::info("bridge_host", "Bridge host table entries")),
    )
}

fn netwatch() -> MetricGroup {
    let mut stage = StageSpec::new(
        PathSource::new("tool/netwatch").with_query("disabled", "false"),
        &["name", "host", "comment", "timeout", "interval", "type"],
    )
    .per_record(drop_lossy_rtt)
    .translate("status", up_status)
    .translate("since", datetime);
    for field in [
        "rtt_avg",
        "rtt_jitter",
        "rtt_max",
        "rtt_min",
        "rtt_stdev",
        "http_resp_time",
        "tcp_connect_time",
    ] {
        stage = stage.translate(field, duration);
    }
    for (name, help, field) in [
        ("netwatch_status", "Netwatch status", "status"),
        ("netwatch_since", "Netwatch status since", "since"),
        ("netwatch_icmp_loss_count", "Netwatch ICMP loss count", "loss_count"),
        ("netwatch_icmp_response_count", "Netwatch ICMP response count", "response_count"),
        ("netwatch_icmp_sent_count", "Netwatch ICMP sent count", "sent_count"),
        ("netwatch_icmp_rtt_avg", "Netwatch ICMP RTT average", "rtt_avg"),
        ("netwatch_icmp_rtt_jitter", "Netwatch ICMP RTT jitter", "rtt_jitter"),
        ("netwatch_icmp_rtt_max", "Netwatch ICMP RTT max", "rtt_max"),
        ("netwatch_icmp_rtt_min", "Netwatch ICMP RTT min", "rtt_min"),
        ("netwatch_icmp_rtt_stdev", "Netwatch ICMP RTT standard deviation", "rtt_stdev"),
        ("netwatch_http_status_code", "Netwatch HTTP status code", "http_status_code"),
        ("netwatch_http_response_time", "Netwatch HTTP response time", "http_resp_time"),
        ("netwatch_tcp_connect_time", "Netwatch TCP connect time", "tcp_connect_time"),
    ] {
        stage = stage.series(S::gauge(name, help, field));
    }
    MetricGroup::new("netwatch").stage(stage)
}

fn public_ip() -> MetricGroup {
    MetricGroup::new("public_ip").stage(
        StageSpec::new(
            PathSource::new("ip/cloud"),
            &["public_address", "dns_name", "public_address_ipv6"],
        )
        .translate("dns_name", ddns_name)
        .translate("public_address_ipv6", empty_if_absent)
        .series(S::info("public_ip_address", "Public IP address")),
    )
}

fn wifi() -> MetricGroup {
    let per_interface = ["id", "name", "comment"];
    MetricGroup::new("wifi")
        .stage(
            StageSpec::new(
                PathSource::new("interface/wifi"),
                &[
                    "id", "name", "comment", "configuration", "configuration_mode",
                    "configuration_ssid", "mac_address", "master",
                ],
            )
            .series(S::info("wifi_interfaces", "Wifi interfaces")),
        )
        .stage(
            StageSpec::new(
                MonitorSource::new("interface/wifi"),
                &["id", "name", "comment", "state", "channel", "tx_power"],
            )
            .series(S::info("wifi_interfaces_monitor", "Wifi interfaces monitor"))
            .series(
                S::gauge("wifi_interface_registered_peers", "Wifi interface registered peers", "registered_peers")
                    .with_labels(per_interface),
            )
            .series(
                S::gauge("wifi_interface_authorized_peers", "Wifi interface authorized peers", "authorized_peers")
                    .with_labels(per_interface),
            ),
        )
}

fn wifi_clients() -> MetricGroup {
    let per_client = ["mac_address", "dhcp_name", "dhcp_comment"];
    let mut stage = StageSpec::new(
        PathSource::new("interface/wifi/registration-table"),
        &["interface", "ssid", "mac_address", "dhcp_name", "dhcp_comment", "dhcp_address"],
    )
    .per_record(split_client_bytes)
    .translate("uptime", duration_or_zero)
    .translate("tx_rate", rate_if_present)
    .translate("rx_rate", rate_if_present)
    .series(S::info("wifi_clients_devices", "Registered client devices info"))
    .series(S::counter("wifi_clients_tx_bytes", "Number of sent packet bytes", "tx_bytes").with_labels(per_client))
    .series(S::counter("wifi_clients_rx_bytes", "Number of received packet bytes", "rx_bytes").with_labels(per_client));
    for (name, help, field) in [
        ("wifi_clients_signal_strength", "Client devices signal strength", "signal"),
        ("wifi_clients_uptime", "Client devices uptime", "uptime"),
        ("wifi_clients_rx_rate", "Client devices RX bitrate", "rx_rate"),
        ("wifi_clients_tx_rate", "Client devices TX bitrate", "tx_rate"),
    ] {
        stage = stage.series(S::gauge(name, help, field).with_labels(per_client));
    }
    MetricGroup::new("wifi_clients").stage(stage)
}

fn queue_tree() -> MetricGroup {
    let mut stage = StageSpec::new(
        PathSource::new("queue/tree"),
        &["name", "parent", "packet_mark", "limit_at", "max_limit", "priority", "disabled"],
    )
    .series(S::info("queue_tree", "Queue tree info"));
    for (name, help, field) in [
        ("queue_tree_rates", "Average passing data rate in bytes per second", "rate"),
        ("queue_tree_bytes", "Number of processed bytes", "bytes"),
        ("queue_tree_queued_bytes", "Number of queued bytes", "queued_bytes"),
        ("queue_tree_dropped", "Number of dropped bytes", "dropped"),
    ] {
        stage = stage.series(S::counter(name, help, field).with_labels(["name"]));
    }
    MetricGroup::new("queue_tree").stage(stage)
}

fn queue_simple() -> MetricGroup {
    let mut stage = StageSpec::new(
        PathSource::new("queue/simple"),
        &["name", "parent", "packet_mark", "limit_at", "max_limit", "priority", "disabled"],
    )
    .per_record(split_up_down)
    .series(S::info("queue_simple", "Simple queue info"));
    for (name, help, field) in [
        ("queue_simple_bytes_upload", "Number of upload processed bytes", "bytes_up"),
        ("queue_simple_bytes_download", "Number of download processed bytes", "bytes_down"),
        ("queue_simple_queued_bytes_upload", "Number of upload queued bytes", "queued_bytes_up"),
        ("queue_simple_queued_bytes_download", "Number of download queued bytes", "queued_bytes_down"),
        ("queue_simple_dropped_upload", "Number of upload dropped bytes", "dropped_up"),
        ("queue_simple_dropped_download", "Number of download dropped bytes", "dropped_down"),
    ] {
        stage = stage.series(S::counter(name, help, field).with_labels(["name"]));
    }
    MetricGroup::new("queue_simple").stage(stage)
}

fn wireguard_peers() -> MetricGroup {
    let per_peer = ["interface", "name", "comment"];
    MetricGroup::new("wireguard_peers").stage(
        StageSpec::new(
            PathSource::new("interface/wireguard/peers"),
            &[
                "name", "interface", "public_key", "endpoint_address", "endpoint_port",
                "current_endpoint_address", "current_endpoint_port", "allowed_address", "comment",
            ],
        )
        .translate("last_handshake", duration_or_zero)
        .series(S::info("wireguard_peer", "Wireguard peer info"))
        .series(
            S::gauge("wireguard_peer_last_handshake", "Seconds since the last handshake", "last_handshake")
                .with_labels(per_peer),
        )
        .series(S::counter("wireguard_peer_tx_bytes", "Wireguard peer TX bytes", "tx").with_labels(per_peer))
        .series(S::counter("wireguard_peer_rx_bytes", "Wireguard peer RX bytes", "rx").with_labels(per_peer)),
    )
}

fn bgp() -> MetricGroup {
    let mut stage = StageSpec::new(
        PathSource::new("routing/bgp/session"),
        &["name", "remote_address", "remote_as", "local_as", "remote_afi", "local_afi"],
    )
    .translate("established", flag)
    .translate("uptime", duration)
    .series(S::info("bgp_sessions_info", "BGP sessions info"));
    for (name, help, field) in [
        ("bgp_remote_messages", "Number of remote messages", "remote_messages"),
        ("bgp_local_messages", "Number of local messages", "local_messages"),
        ("bgp_remote_bytes", "Number of remote bytes", "remote_bytes"),
        ("bgp_local_bytes", "Number of local bytes", "local_bytes"),
    ] {
        stage = stage.series(S::counter(name, help, field).with_labels(["name"]));
    }
    for (name, help, field) in [
        ("bgp_prefix_count", "BGP prefix count", "prefix_count"),
        ("bgp_established", "BGP established", "established"),
        ("bgp_uptime", "BGP uptime in seconds", "uptime"),
    ] {
        stage = stage.series(S::gauge(name, help, field).with_labels(["name"]));
    }
    MetricGroup::new("bgp").stage(stage)
}

fn kid_control_devices() -> MetricGroup {
    let per_device = ["name", "mac_address", "user"];
    let mut stage = StageSpec::new(
        PathSource::new("ip/kid-control/device"),
        &["name", "user", "mac_address", "ip_address"],
    )
    .per_record(with_user)
    .translate("rate_up", rate)
    .translate("rate_down", rate)
    .translate("idle_time", duration_or_zero)
    .series(S::info("kid_control_device", "Kid-control device Info"));
    for (name, help, field) in [
        ("kid_control_device_bytes_down", "Number of received bytes", "bytes_down"),
        ("kid_control_device_bytes_up", "Number of transmitted bytes", "bytes_up"),
        ("kid_control_device_rate_down", "Device rate down", "rate_down"),
        ("kid_control_device_rate_up", "Device rate up", "rate_up"),
        ("kid_control_device_idle_time", "Device idle time", "idle_time"),
    ] {
        stage = stage.series(S::gauge(name, help, field).with_labels(per_device));
    }
    MetricGroup::new("kid_control_devices").stage(stage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::{MockTransport, connected_entry, record};
    use crate::store::MetricSeries;
    use chrono::{DateTime, Utc};
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    async fn load(name: &str, transport: &MockTransport) -> (DeviceEntry, Vec<MetricSeries>) {
        let entry = connected_entry(transport.clone()).await;
        let collector = GroupCollector::new(
            group(name).unwrap(),
            entry.identity().labels(),
            Duration::from_secs(10),
        );
        collector.load_at(Some(&entry), at(0)).await.unwrap();
        let series = collector.collect_at(at(1));
        (entry, series)
    }

    fn series<'a>(all: &'a [MetricSeries], name: &str) -> &'a MetricSeries {
        all.iter().find(|s| s.name == name).unwrap()
    }

    #[test]
    fn test_every_name_builds() {
        for name in NAMES {
            let group = group(name).unwrap_or_else(|| panic!("{name} missing"));
            assert_eq!(group.name, *name);
            assert!(!group.stages.is_empty());
            assert!(build(name, Vec::new(), Duration::from_secs(10)).is_ok());
        }
        assert!(!is_known("latest_version"));
        assert!(matches!(
            build("nope", Vec::new(), Duration::from_secs(10)),
            Err(CollectorError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_interface_keeps_running_only() {
        let transport = MockTransport::new();
        transport.set_records(
            "interface",
            vec![
                json!({".id": "*1", "name": "ether1", "running": "true", "rx-byte": "10"}),
                json!({".id": "*2", "name": "ether2", "running": "false", "rx-byte": "20"}),
            ],
        );
        let (_, all) = load("interface", &transport).await;
        let rx = series(&all, "interface_rx_byte");
        assert_eq!(rx.samples.len(), 1);
        assert_eq!(rx.label(&rx.samples[0], "name"), Some("ether1"));
    }

    #[tokio::test]
    async fn test_interface_monitor_translations() {
        let transport = MockTransport::new();
        transport.set_records(
            "interface/ethernet",
            vec![
                json!({".id": "*1", "name": "ether1", "running": "true"}),
                json!({".id": "*2", "name": "ether2", "running": "false"}),
            ],
        );
        transport.set_records(
            "interface/ethernet/monitor",
            vec![json!({"name": "ether1", "status": "link-ok", "rate": "1Gbps", "full-duplex": "true"})],
        );
        let (_, all) = load("interface_monitor", &transport).await;

        let status = series(&all, "interface_status");
        assert_eq!(status.find("name", "ether1").unwrap().value, 1.0);
        assert_eq!(status.find("name", "ether2").unwrap().value, 0.0);
        assert_eq!(series(&all, "interface_rate").find("name", "ether1").unwrap().value, 1e9);
        // The idle port has no rate field, which parses as 0
        assert_eq!(series(&all, "interface_rate").find("name", "ether2").unwrap().value, 0.0);
        let duplex = series(&all, "interface_full_duplex");
        assert_eq!(duplex.samples.len(), 1);
        assert_eq!(duplex.samples[0].value, 1.0);
    }

    #[tokio::test]
    async fn test_dhcp_publishes_leases_for_arp() {
        let transport = MockTransport::new();
        transport.set_records(
            "ip/dhcp-server/lease",
            vec![json!({
                "address": "10.0.0.50", "mac-address": "AA:BB", "host-name": "laptop",
                "comment": "desk", "dynamic": "true", "expires-after": "5m",
            })],
        );
        let (entry, all) = load("dhcp", &transport).await;
        assert_eq!(series(&all, "dhcp_lease_expiry").samples[0].value, 300.0);
        assert!(entry.dhcp_lease("mac_address", "AA:BB").is_some());

        let mut arp = record(json!({"mac-address": "AA:BB", "address": "10.0.0.50"}));
        add_dhcp_info(&mut arp, Some(&entry), true);
        assert_eq!(arp["dhcp_name"], "laptop");
        assert_eq!(arp["dhcp_comment"], "desk");
        assert_eq!(arp["dhcp_address"], "10.0.0.50");
        assert_eq!(arp["dhcp_lease_type"], "dynamic");

        let mut unknown = record(json!({"mac-address": "CC:DD"}));
        add_dhcp_info(&mut unknown, Some(&entry), false);
        assert_eq!(unknown["dhcp_address"], "No DHCP Record");
        assert_eq!(unknown["dhcp_name"], "");
        assert!(!unknown.contains_key("dhcp_lease_type"));
    }

    #[tokio::test]
    async fn test_system_resource_splits_version() {
        let transport = MockTransport::new();
        transport.set_records(
            "system/resource",
            vec![json!({
                "version": "7.16.2 (stable)", "board-name": "RB5009", "cpu": "ARM64",
                "architecture-name": "arm64", "uptime": "1d2h", "bad-blocks": "0.5%",
                "free-memory": "1024",
            })],
        );
        let (_, all) = load("system_resource", &transport).await;

        let info = series(&all, "system");
        assert_eq!(info.label(&info.samples[0], "current_version"), Some("7.16.2"));
        assert_eq!(info.label(&info.samples[0], "channel"), Some("stable"));
        assert_eq!(series(&all, "system_uptime").samples[0].value, 93_600.0);
        assert_eq!(series(&all, "system_hdd_bad_blocks_percent").samples[0].value, 0.5);
        let memory = series(&all, "system_free_memory");
        assert_eq!(memory.label(&memory.samples[0], "board_name"), Some("RB5009"));
    }

    #[tokio::test]
    async fn test_health_folds_rows() {
        let transport = MockTransport::new();
        transport.set_records(
            "system/health",
            vec![
                json!({"name": "temperature", "value": "41", "type": "C"}),
                json!({"name": "voltage", "value": "24.1", "type": "V"}),
            ],
        );
        let (_, all) = load("health", &transport).await;
        assert_eq!(series(&all, "system_routerboard_temperature").samples[0].value, 41.0);
        assert_eq!(series(&all, "system_routerboard_voltage").samples[0].value, 24.1);
        assert!(series(&all, "system_cpu_temperature").samples.is_empty());
    }

    #[tokio::test]
    async fn test_netwatch_drops_rtt_on_heavy_loss() {
        let transport = MockTransport::new();
        transport.set_records(
            "tool/netwatch",
            vec![
                json!({"host": "1.1.1.1", "type": "icmp", "status": "up", "loss-percent": "0", "rtt-avg": "12ms"}),
                json!({"host": "8.8.8.8", "type": "icmp", "status": "down", "loss-percent": "80", "rtt-avg": "900ms"}),
            ],
        );
        let (_, all) = load("netwatch", &transport).await;

        let status = series(&all, "netwatch_status");
        assert_eq!(status.find("host", "1.1.1.1").unwrap().value, 1.0);
        assert_eq!(status.find("host", "8.8.8.8").unwrap().value, 0.0);
        let rtt = series(&all, "netwatch_icmp_rtt_avg");
        assert_eq!(rtt.samples.len(), 1);
        assert!((rtt.samples[0].value - 0.012).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_wifi_clients_drops_malformed_rows() {
        let transport = MockTransport::new();
        transport.set_records(
            "interface/wifi/registration-table",
            vec![
                json!({"mac-address": "AA:01", "bytes": "100,200", "uptime": "1m", "signal": "-60"}),
                json!({"mac-address": "AA:02", "bytes": "garbled", "uptime": "1m"}),
            ],
        );
        let (_, all) = load("wifi_clients", &transport).await;

        let tx = series(&all, "wifi_clients_tx_bytes");
        assert_eq!(tx.samples.len(), 1);
        assert_eq!(tx.samples[0].value, 100.0);
        assert_eq!(series(&all, "wifi_clients_rx_bytes").samples[0].value, 200.0);
        assert_eq!(series(&all, "wifi_clients_uptime").samples[0].value, 60.0);
        let info = series(&all, "wifi_clients_devices");
        assert_eq!(info.label(&info.samples[0], "dhcp_address"), Some("No DHCP Record"));
    }

    #[tokio::test]
    async fn test_public_ip_defaults() {
        let transport = MockTransport::new();
        transport.set_records("ip/cloud", vec![json!({"public-address": "203.0.113.7"})]);
        let (_, all) = load("public_ip", &transport).await;
        let info = series(&all, "public_ip_address");
        assert_eq!(info.label(&info.samples[0], "dns_name"), Some("ddns_disabled"));
        assert_eq!(info.label(&info.samples[0], "public_address_ipv6"), Some(""));
    }

    #[tokio::test]
    async fn test_firewall_reads_all_tables() {
        let transport = MockTransport::new();
        transport.set_records("ipv6/firewall/mangle", vec![json!({"chain": "forward", "packets": "7"})]);
        let (_, all) = load("ipv6_firewall", &transport).await;
        assert_eq!(series(&all, "firewall_mangle_ipv6_packets").samples[0].value, 7.0);

        let paths: Vec<_> = transport.calls().into_iter().map(|c| c.0).collect();
        assert_eq!(
            paths,
            vec!["ipv6/firewall/filter", "ipv6/firewall/mangle", "ipv6/firewall/raw"]
        );
    }

    #[tokio::test]
    async fn test_bgp_sessions() {
        let transport = MockTransport::new();
        transport.set_records(
            "routing/bgp/session",
            vec![
                json!({".id": "*1", "name": "upstream-1", "remote.address": "192.0.2.1", "remote.as": "64500",
                       "established": "true", "uptime": "1d2h", "prefix-count": "950000", "remote.messages": "12"}),
                json!({".id": "*2", "name": "upstream-2", "established": "false"}),
            ],
        );
        let (_, all) = load("bgp", &transport).await;

        let info = series(&all, "bgp_sessions_info");
        assert_eq!(info.samples.len(), 2);
        assert_eq!(info.label(&info.samples[0], "remote_as"), Some("64500"));

        let established = series(&all, "bgp_established");
        assert_eq!(established.find("name", "upstream-1").unwrap().value, 1.0);
        assert_eq!(established.find("name", "upstream-2").unwrap().value, 0.0);
        let uptime = series(&all, "bgp_uptime");
        assert_eq!(uptime.samples.len(), 1);
        assert_eq!(uptime.samples[0].value, 93_600.0);
        assert_eq!(series(&all, "bgp_remote_messages").samples[0].value, 12.0);
        assert_eq!(series(&all, "bgp_prefix_count").samples[0].value, 950_000.0);
    }

    #[tokio::test]
    async fn test_capsman_remote_caps() {
        let transport = MockTransport::new();
        transport.set_records(
            "interface/wifi/capsman/remote-cap",
            vec![json!({"identity": "ap-lobby", "version": "7.16", "base-mac": "AA:BB:CC:00:00:01", "board": "cAP ax"})],
        );
        let (_, all) = load("capsman", &transport).await;
        let paths: Vec<_> = transport.calls().into_iter().map(|c| c.0).collect();
        assert_eq!(paths, vec!["interface/wifi/capsman/remote-cap"]);
        let caps = series(&all, "capsman_remote_caps");
        assert_eq!(caps.samples.len(), 1);
        assert_eq!(caps.label(&caps.samples[0], "base_mac"), Some("AA:BB:CC:00:00:01"));
        assert_eq!(caps.label(&caps.samples[0], "device_name"), Some("r1"));
    }

    #[tokio::test]
    async fn test_kid_control_devices_need_a_user() {
        let transport = MockTransport::new();
        transport.set_records(
            "ip/kid-control/device",
            vec![
                json!({"name": "tablet", "user": "kid", "mac-address": "AA:00:00:00:00:01",
                       "rate-up": "2Mbps", "rate-down": "10Mbps", "idle-time": "5m", "bytes-down": "4096"}),
                json!({"name": "printer", "user": "", "mac-address": "AA:00:00:00:00:02"}),
                json!({"name": "tv", "mac-address": "AA:00:00:00:00:03"}),
            ],
        );
        let (_, all) = load("kid_control_devices", &transport).await;
        let paths: Vec<_> = transport.calls().into_iter().map(|c| c.0).collect();
        assert_eq!(paths, vec!["ip/kid-control/device"]);

        let info = series(&all, "kid_control_device");
        assert_eq!(info.samples.len(), 1);
        assert_eq!(info.label(&info.samples[0], "name"), Some("tablet"));
        assert_eq!(series(&all, "kid_control_device_rate_up").samples[0].value, 2e6);
        assert_eq!(series(&all, "kid_control_device_rate_down").samples[0].value, 1e7);
        assert_eq!(series(&all, "kid_control_device_idle_time").samples[0].value, 300.0);
        assert_eq!(series(&all, "kid_control_device_bytes_down").samples[0].value, 4096.0);
        assert!(series(&all, "kid_control_device_bytes_up").samples.is_empty());
    }

    #[test]
    fn test_split_up_down() {
        let raw = record(json!({"name": "q1", "bytes": "10/20", "max-limit": "0/0", "priority": "8"}));
        let split = split_up_down(raw, None).unwrap().unwrap();
        assert_eq!(split["bytes_up"], "10");
        assert_eq!(split["bytes_down"], "20");
        assert_eq!(split["max-limit_up"], "0");
        assert_eq!(split["priority"], "8");
        assert!(!split.contains_key("bytes"));
    }

    #[test]
    fn test_collapse_sessions() {
        let records = vec![
            record(json!({"name": "admin", "address": "10.0.0.2", "via": "ssh", "when": "2024-01-15 10:00:00"})),
            record(json!({"name": "admin", "address": "10.0.0.2", "via": "ssh", "when": "2024-01-15 11:00:00"})),
            record(json!({"name": "admin", "address": "10.0.0.3", "via": "web", "when": "2024-01-15 09:00:00"})),
        ];
        let sessions = collapse_sessions(records, None);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0]["count"], 2);
        assert_eq!(sessions[0]["when"], "2024-01-15 11:00:00");
        assert_eq!(sessions[1]["count"], 1);
        assert_eq!(sessions[1]["group"], "");
    }
}
