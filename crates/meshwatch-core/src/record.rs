//! Typed records produced by the parser and persisted by the store.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Column layout
// ---------------------------------------------------------------------------

pub const TIMESTAMP_COLUMN: &str = "timestamp";
pub const NODE_COLUMN: &str = "node_id";

pub const BATTERY_PCT: &str = "battery_pct";
pub const VOLTAGE_V: &str = "voltage_v";
pub const CHANNEL_UTIL_PCT: &str = "channel_util_pct";
pub const AIR_TX_PCT: &str = "air_tx_pct";
pub const UPTIME_S: &str = "uptime_s";

/// Columns every telemetry file starts with, in order.
pub const BASE_TELEMETRY_COLUMNS: [&str; 7] = [
    TIMESTAMP_COLUMN,
    NODE_COLUMN,
    BATTERY_PCT,
    VOLTAGE_V,
    CHANNEL_UTIL_PCT,
    AIR_TX_PCT,
    UPTIME_S,
];

/// Optional sensor columns declared up front when a telemetry file is created.
/// Metrics outside this list widen the header when first seen.
pub const OPTIONAL_TELEMETRY_COLUMNS: [&str; 14] = [
    "temperature_c",
    "humidity_pct",
    "pressure_hpa",
    "iaq",
    "lux",
    "current_ma",
    "ch1_voltage_v",
    "ch1_current_ma",
    "ch2_voltage_v",
    "ch2_current_ma",
    "ch3_voltage_v",
    "ch3_current_ma",
    "ch4_voltage_v",
    "ch4_current_ma",
];

pub const TRACEROUTE_COLUMNS: [&str; 6] = [
    "timestamp",
    "source",
    "destination",
    "forward_path",
    "backward_path",
    "success",
];

/// Separator between node ids inside a path column.
pub const PATH_SEPARATOR: char = '>';

/// Declared telemetry header: base columns followed by the known optional ones.
pub fn default_telemetry_columns() -> Vec<String> {
    BASE_TELEMETRY_COLUMNS
        .iter()
        .chain(OPTIONAL_TELEMETRY_COLUMNS.iter())
        .map(|c| c.to_string())
        .collect()
}

pub fn traceroute_columns() -> Vec<String> {
    TRACEROUTE_COLUMNS.iter().map(|c| c.to_string()).collect()
}

/// Format a timestamp the way every row stores it: `2025-01-01T12:00:00Z`.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ---------------------------------------------------------------------------
// Node id
// ---------------------------------------------------------------------------

/// Opaque node identifier, stable per physical node.
///
/// Hex ids are normalised to `!` plus lowercase, whether or not the `!` was
/// given, so `A1B2C3D4` and `!a1b2c3d4` name the same node. All-digit ids are
/// decimal node numbers and other alphanumeric ids are kept as written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        let (bang, body) = match trimmed.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        if body.is_empty() || !body.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(format!("invalid node id '{raw}'"));
        }
        let decimal = body.chars().all(|c| c.is_ascii_digit());
        let hex = body.chars().all(|c| c.is_ascii_hexdigit());
        if bang || (hex && !decimal) {
            Ok(Self(format!("!{}", body.to_ascii_lowercase())))
        } else {
            Ok(Self(body.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NodeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

/// Bring a metric value into its valid range. Only battery percent is bounded.
pub fn clamp_metric(name: &str, value: f64) -> f64 {
    if name == BATTERY_PCT {
        value.clamp(0.0, 100.0)
    } else {
        value
    }
}

/// One row of telemetry for one node in one cycle.
///
/// Missing metrics are absent from `metrics`, never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Utc>,
    pub node_id: NodeId,
    pub metrics: BTreeMap<String, f64>,
}

impl TelemetryRecord {
    pub fn new(timestamp: DateTime<Utc>, node_id: NodeId) -> Self {
        Self {
            timestamp,
            node_id,
            metrics: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn get(&self, metric: &str) -> Option<f64> {
        self.metrics.get(metric).copied()
    }

    /// Store a metric, clamping bounded ones. Non-finite values are refused.
    pub fn insert(&mut self, metric: impl Into<String>, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        let metric = metric.into();
        let value = clamp_metric(&metric, value);
        self.metrics.insert(metric, value);
        true
    }

    /// Merge metrics from another probe of the same node. Values already
    /// present win, so device metrics are never overwritten by a sensor probe.
    /// Returns how many new metrics were added.
    pub fn merge(&mut self, metrics: &BTreeMap<String, f64>) -> usize {
        let mut added = 0;
        for (name, value) in metrics {
            if !self.metrics.contains_key(name) && self.insert(name.clone(), *value) {
                added += 1;
            }
        }
        added
    }

    /// Render this record against a header. Columns without a value are empty.
    pub fn to_row(&self, columns: &[String]) -> Vec<String> {
        columns
            .iter()
            .map(|col| match col.as_str() {
                TIMESTAMP_COLUMN => format_timestamp(&self.timestamp),
                NODE_COLUMN => self.node_id.to_string(),
                metric => self
                    .metrics
                    .get(metric)
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Traceroute
// ---------------------------------------------------------------------------

/// One traceroute result from the local radio to a destination node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracerouteRecord {
    pub timestamp: DateTime<Utc>,
    pub source: NodeId,
    pub destination: NodeId,
    /// Intermediate hops towards the destination, endpoints excluded.
    pub forward: Vec<NodeId>,
    /// Intermediate hops on the way back, endpoints excluded.
    pub backward: Vec<NodeId>,
    /// Per-link SNR in dB along the forward chain.
    pub forward_snr_db: Vec<f64>,
    /// Per-link SNR in dB along the backward chain.
    pub backward_snr_db: Vec<f64>,
    pub success: bool,
}

impl TracerouteRecord {
    pub fn to_row(&self) -> Vec<String> {
        vec![
            format_timestamp(&self.timestamp),
            self.source.to_string(),
            self.destination.to_string(),
            format_path(&self.forward),
            format_path(&self.backward),
            self.success.to_string(),
        ]
    }
}

pub fn format_path(path: &[NodeId]) -> String {
    let mut out = String::new();
    for (i, node) in path.iter().enumerate() {
        if i > 0 {
            out.push(PATH_SEPARATOR);
        }
        out.push_str(node.as_str());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    fn node(s: &str) -> NodeId {
        NodeId::parse(s).unwrap()
    }

    // -----------------------------------------------------------------------
    // NodeId
    // -----------------------------------------------------------------------

    #[test]
    fn node_id_normalises_hex() {
        assert_eq!(node("!BA4BF9D0").as_str(), "!ba4bf9d0");
        assert_eq!(node("  !a1 ").as_str(), "!a1");
    }

    #[test]
    fn node_id_keeps_decimal_ids() {
        assert_eq!(node("1828779180").as_str(), "1828779180");
    }

    #[test]
    fn bare_hex_id_matches_prefixed_form() {
        assert_eq!(node("A1B2C3D4"), node("!a1b2c3d4"));
        assert_eq!(node("a1b2c3d4").as_str(), "!a1b2c3d4");
        assert_eq!(node("Gateway7").as_str(), "Gateway7");
    }

    #[test]
    fn node_id_rejects_garbage() {
        assert!(NodeId::parse("").is_err());
        assert!(NodeId::parse("!").is_err());
        assert!(NodeId::parse("!ab-cd").is_err());
        assert!(NodeId::parse("a b").is_err());
    }

    // -----------------------------------------------------------------------
    // TelemetryRecord
    // -----------------------------------------------------------------------

    #[test]
    fn battery_is_clamped_on_insert() {
        let mut rec = TelemetryRecord::new(ts(), node("!a"));
        rec.insert(BATTERY_PCT, 142.0);
        assert_eq!(rec.get(BATTERY_PCT), Some(100.0));
        rec.insert(BATTERY_PCT, -5.0);
        assert_eq!(rec.get(BATTERY_PCT), Some(0.0));
    }

    #[test]
    fn non_finite_values_are_refused() {
        let mut rec = TelemetryRecord::new(ts(), node("!a"));
        assert!(!rec.insert(VOLTAGE_V, f64::NAN));
        assert!(!rec.insert(VOLTAGE_V, f64::INFINITY));
        assert!(rec.is_empty());
    }

    #[test]
    fn merge_keeps_existing_values() {
        let mut rec = TelemetryRecord::new(ts(), node("!a"));
        rec.insert(VOLTAGE_V, 4.1);
        let mut probe = BTreeMap::new();
        probe.insert(VOLTAGE_V.to_string(), 3.3);
        probe.insert("temperature_c".to_string(), 21.5);
        assert_eq!(rec.merge(&probe), 1);
        assert_eq!(rec.get(VOLTAGE_V), Some(4.1));
        assert_eq!(rec.get("temperature_c"), Some(21.5));
    }

    #[test]
    fn to_row_leaves_missing_metrics_empty() {
        let mut rec = TelemetryRecord::new(ts(), node("!a"));
        rec.insert(BATTERY_PCT, 87.0);
        rec.insert(UPTIME_S, 3600.0);
        let cols = default_telemetry_columns();
        let row = rec.to_row(&cols);
        assert_eq!(row.len(), cols.len());
        assert_eq!(row[0], "2025-01-01T12:00:00Z");
        assert_eq!(row[1], "!a");
        assert_eq!(row[2], "87");
        assert_eq!(row[3], "");
        assert_eq!(row[6], "3600");
        assert!(row[7..].iter().all(String::is_empty));
    }

    // -----------------------------------------------------------------------
    // TracerouteRecord
    // -----------------------------------------------------------------------

    #[test]
    fn traceroute_row_joins_paths() {
        let rec = TracerouteRecord {
            timestamp: ts(),
            source: node("!0001"),
            destination: node("!0004"),
            forward: vec![node("!0002"), node("!0003")],
            backward: vec![node("!0003")],
            forward_snr_db: vec![6.0, 2.5, -1.0],
            backward_snr_db: vec![1.0, 4.0],
            success: true,
        };
        assert_eq!(
            rec.to_row(),
            vec![
                "2025-01-01T12:00:00Z",
                "!0001",
                "!0004",
                "!0002>!0003",
                "!0003",
                "true"
            ]
        );
    }

    #[test]
    fn empty_path_formats_empty() {
        assert_eq!(format_path(&[]), "");
    }
}
