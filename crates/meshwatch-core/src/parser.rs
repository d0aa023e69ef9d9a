//! Response parser: raw query text → typed telemetry and traceroute records.
//!
//! Parsing is pattern-based and total. No input makes these functions panic
//! or return an error; text that yields nothing comes back as an empty result
//! carrying [`Diagnostic`]s that say why ("no match", "out of range",
//! "truncated", "invalid number"). A metric whose number fails to parse is
//! dropped on its own and the rest of the record survives.
//!
//! Several sensor probes answer for the same node within one cycle. Each
//! probe's [`TelemetryParse`] is merged into a single [`TelemetryRecord`] so
//! the store writes one row per node per cycle.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::record::{
    AIR_TX_PCT, BATTERY_PCT, CHANNEL_UTIL_PCT, NodeId, TelemetryRecord, TracerouteRecord,
    UPTIME_S, VOLTAGE_V, clamp_metric,
};

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Why a metric (or a whole response) produced nothing, or was altered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseReason {
    /// No known pattern matched.
    NoMatch,
    /// A value was outside its valid range and was clamped.
    OutOfRange,
    /// A label was present but the text ended before its value.
    Truncated,
    /// The matched text was not a usable number.
    InvalidNumber,
}

impl fmt::Display for ParseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMatch => write!(f, "no match"),
            Self::OutOfRange => write!(f, "out of range"),
            Self::Truncated => write!(f, "truncated"),
            Self::InvalidNumber => write!(f, "invalid number"),
        }
    }
}

/// One parser finding.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// Metric concerned, or `None` for the response as a whole.
    pub metric: Option<String>,
    pub reason: ParseReason,
    pub detail: String,
}

impl Diagnostic {
    fn new(metric: Option<&str>, reason: ParseReason, detail: impl Into<String>) -> Self {
        Self {
            metric: metric.map(str::to_string),
            reason,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.metric {
            Some(m) => write!(f, "{m}: {} ({})", self.reason, self.detail),
            None => write!(f, "{} ({})", self.reason, self.detail),
        }
    }
}

// ---------------------------------------------------------------------------
// Telemetry patterns
// ---------------------------------------------------------------------------

/// How a captured unit string rescales the value into the column's unit.
#[derive(Clone, Copy)]
enum Unit {
    Plain,
    /// Column is milliamps; `A` readings are scaled by 1000.
    Milliamps,
    /// Column is Celsius; `F` readings are converted.
    Celsius,
}

impl Unit {
    fn apply(self, value: f64, unit: Option<&str>) -> f64 {
        match (self, unit) {
            (Self::Milliamps, Some("A")) => value * 1000.0,
            (Self::Celsius, Some("F")) => (value - 32.0) * 5.0 / 9.0,
            _ => value,
        }
    }
}

struct MetricPattern {
    name: &'static str,
    /// Literal label preceding the value; used to detect truncated replies.
    label: &'static str,
    regex: Regex,
    unit: Unit,
}

fn pattern(name: &'static str, label: &'static str, re: &str, unit: Unit) -> MetricPattern {
    MetricPattern {
        name,
        label,
        regex: Regex::new(re).expect("metric pattern is a valid regex"),
        unit,
    }
}

static METRIC_PATTERNS: LazyLock<Vec<MetricPattern>> = LazyLock::new(|| {
    vec![
        // Device metrics
        pattern(BATTERY_PCT, "Battery level:", r"Battery level:\s*(-?[0-9.]+)\s*%", Unit::Plain),
        pattern(VOLTAGE_V, "Voltage:", r"Voltage:\s*(-?[0-9.]+)\s*V", Unit::Plain),
        pattern(
            CHANNEL_UTIL_PCT,
            "Total channel utilization:",
            r"Total channel utilization:\s*([0-9.]+)\s*%",
            Unit::Plain,
        ),
        pattern(
            AIR_TX_PCT,
            "Transmit air utilization:",
            r"Transmit air utilization:\s*([0-9.]+)\s*%",
            Unit::Plain,
        ),
        pattern(UPTIME_S, "Uptime:", r"Uptime:\s*([0-9]+)\s*s", Unit::Plain),
        // Environment sensors
        pattern(
            "temperature_c",
            "Temperature:",
            r"Temperature:\s*(-?[0-9.]+)\s*°?\s*([CF])?",
            Unit::Celsius,
        ),
        pattern("humidity_pct", "Humidity:", r"Humidity:\s*([0-9.]+)\s*%", Unit::Plain),
        pattern(
            "pressure_hpa",
            "Pressure:",
            r"Pressure:\s*([0-9.]+)\s*(?:hPa|mbar|mb)",
            Unit::Plain,
        ),
        pattern("iaq", "IAQ:", r"IAQ:\s*([0-9]+)", Unit::Plain),
        pattern("lux", "Lux:", r"Lux:\s*([0-9.]+)", Unit::Plain),
        // Power sensors
        pattern("current_ma", "Current:", r"Current:\s*(-?[0-9.]+)\s*(mA|A)", Unit::Milliamps),
    ]
});

static RE_CH_VOLT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Channel\s*(\d+)\s*voltage:\s*(-?[0-9.]+)\s*V").expect("valid regex")
});
static RE_CH_CURR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Channel\s*(\d+)\s*current:\s*(-?[0-9.]+)\s*(mA|A)").expect("valid regex")
});

// ---------------------------------------------------------------------------
// Telemetry parsing
// ---------------------------------------------------------------------------

/// Metrics extracted from one response, plus what went wrong along the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryParse {
    pub metrics: BTreeMap<String, f64>,
    pub diagnostics: Vec<Diagnostic>,
}

impl TelemetryParse {
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Reason the parse produced nothing, if it did.
    pub fn empty_reason(&self) -> Option<ParseReason> {
        if !self.is_empty() {
            return None;
        }
        Some(
            self.diagnostics
                .iter()
                .map(|d| d.reason)
                .find(|r| *r != ParseReason::NoMatch)
                .unwrap_or(ParseReason::NoMatch),
        )
    }

    /// Merge this probe's metrics into a node's record for the cycle.
    pub fn merge_into(&self, record: &mut TelemetryRecord) -> usize {
        record.merge(&self.metrics)
    }

    /// Build a record from this parse alone. `None` when nothing parsed.
    pub fn into_record(self, node_id: NodeId, timestamp: DateTime<Utc>) -> Option<TelemetryRecord> {
        if self.is_empty() {
            return None;
        }
        let mut record = TelemetryRecord::new(timestamp, node_id);
        record.merge(&self.metrics);
        Some(record)
    }

    fn push_value(&mut self, name: &str, raw: &str, unit: Unit, unit_text: Option<&str>) {
        let value = match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => unit.apply(v, unit_text),
            _ => {
                self.diagnostics.push(Diagnostic::new(
                    Some(name),
                    ParseReason::InvalidNumber,
                    format!("'{raw}'"),
                ));
                return;
            }
        };
        let clamped = clamp_metric(name, value);
        if clamped != value {
            self.diagnostics.push(Diagnostic::new(
                Some(name),
                ParseReason::OutOfRange,
                format!("{value} clamped to {clamped}"),
            ));
        }
        self.metrics.insert(name.to_string(), clamped);
    }
}

/// Parse a telemetry reply (device metrics or any sensor probe).
pub fn parse_telemetry(raw: &str) -> TelemetryParse {
    let mut out = TelemetryParse::default();
    if raw.trim().is_empty() {
        out.diagnostics
            .push(Diagnostic::new(None, ParseReason::NoMatch, "empty response"));
        return out;
    }

    for p in METRIC_PATTERNS.iter() {
        match p.regex.captures(raw) {
            Some(caps) => {
                let value = caps.get(1).map_or("", |m| m.as_str());
                let unit = caps.get(2).map(|m| m.as_str());
                out.push_value(p.name, value, p.unit, unit);
            }
            None => {
                if let Some(pos) = raw.rfind(p.label) {
                    out.diagnostics.push(label_without_value(p.name, raw, pos + p.label.len()));
                }
            }
        }
    }

    for caps in RE_CH_VOLT.captures_iter(raw) {
        match caps[1].parse::<u32>() {
            Ok(ch) => out.push_value(&format!("ch{ch}_voltage_v"), &caps[2], Unit::Plain, None),
            Err(_) => out.diagnostics.push(Diagnostic::new(
                None,
                ParseReason::InvalidNumber,
                format!("channel '{}'", &caps[1]),
            )),
        }
    }
    for caps in RE_CH_CURR.captures_iter(raw) {
        match caps[1].parse::<u32>() {
            Ok(ch) => {
                let unit = caps.get(3).map(|m| m.as_str());
                out.push_value(&format!("ch{ch}_current_ma"), &caps[2], Unit::Milliamps, unit);
            }
            Err(_) => out.diagnostics.push(Diagnostic::new(
                None,
                ParseReason::InvalidNumber,
                format!("channel '{}'", &caps[1]),
            )),
        }
    }

    if out.is_empty() && out.diagnostics.is_empty() {
        out.diagnostics.push(Diagnostic::new(
            None,
            ParseReason::NoMatch,
            "no known metric in response",
        ));
    }
    out
}

/// A label was found but its pattern did not match. If nothing but
/// whitespace follows on the final line, the reply was cut short.
fn label_without_value(metric: &str, raw: &str, after_label: usize) -> Diagnostic {
    let rest = raw.get(after_label..).unwrap_or("");
    let line_rest = rest.split('\n').next().unwrap_or("");
    let on_last_line = !rest.contains('\n');
    if on_last_line && line_rest.trim().len() < 2 {
        Diagnostic::new(Some(metric), ParseReason::Truncated, "value missing at end of response")
    } else {
        Diagnostic::new(
            Some(metric),
            ParseReason::NoMatch,
            format!("unrecognised value '{}'", line_rest.trim()),
        )
    }
}

/// Parse and merge several probe replies for one node into a single record.
pub fn merge_probe_replies<'a>(
    node_id: &NodeId,
    timestamp: DateTime<Utc>,
    replies: impl IntoIterator<Item = &'a str>,
) -> (Option<TelemetryRecord>, Vec<Diagnostic>) {
    let mut record = TelemetryRecord::new(timestamp, node_id.clone());
    let mut diagnostics = Vec::new();
    for raw in replies {
        let parsed = parse_telemetry(raw);
        parsed.merge_into(&mut record);
        diagnostics.extend(parsed.diagnostics);
    }
    let record = (!record.is_empty()).then_some(record);
    (record, diagnostics)
}

// ---------------------------------------------------------------------------
// Traceroute parsing
// ---------------------------------------------------------------------------

static RE_FWD_HDR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)route traced towards destination").expect("valid regex"));
static RE_BWD_HDR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)route traced back to us").expect("valid regex"));
static RE_HOP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(!?[0-9A-Za-z]+)\s*(?:\(\s*([+-]?[0-9.]+|\?)\s*dB\s*\))?\s*$")
        .expect("valid regex")
});

/// Records extracted from one traceroute reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TracerouteParse {
    pub records: Vec<TracerouteRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

impl TracerouteParse {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Forward,
    Backward,
}

/// A parsed `a --> b (x dB) --> c (y dB)` chain.
struct Chain {
    nodes: Vec<NodeId>,
    snr_db: Vec<f64>,
}

impl Chain {
    fn intermediates(&self) -> Vec<NodeId> {
        if self.nodes.len() <= 2 {
            return Vec::new();
        }
        self.nodes[1..self.nodes.len() - 1].to_vec()
    }
}

fn parse_chain(text: &str) -> Result<Chain, Diagnostic> {
    let segments: Vec<&str> = text.split("-->").collect();
    let mut chain = Chain {
        nodes: Vec::with_capacity(segments.len()),
        snr_db: Vec::new(),
    };
    for (i, seg) in segments.iter().enumerate() {
        let last = i + 1 == segments.len();
        let Some(caps) = RE_HOP.captures(seg) else {
            let reason = if last {
                ParseReason::Truncated
            } else {
                ParseReason::NoMatch
            };
            return Err(Diagnostic::new(None, reason, format!("bad hop '{}'", seg.trim())));
        };
        let node = NodeId::parse(&caps[1])
            .map_err(|e| Diagnostic::new(None, ParseReason::NoMatch, e))?;
        if i > 0 {
            // Unknown SNR ("? dB") is kept as NaN so link indices stay aligned.
            let snr = caps
                .get(2)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .unwrap_or(f64::NAN);
            chain.snr_db.push(snr);
        }
        chain.nodes.push(node);
    }
    Ok(chain)
}

/// Parse a traceroute reply for `destination`.
pub fn parse_traceroute(
    raw: &str,
    destination: &NodeId,
    timestamp: DateTime<Utc>,
) -> TracerouteParse {
    let mut out = TracerouteParse::default();
    let mut section = Section::Forward;
    let mut current: Option<TracerouteRecord> = None;

    for line in raw.lines() {
        let mut body = line;
        if RE_FWD_HDR.is_match(line) {
            section = Section::Forward;
            body = line.rsplit(':').next().unwrap_or("");
        } else if RE_BWD_HDR.is_match(line) {
            section = Section::Backward;
            body = line.rsplit(':').next().unwrap_or("");
        }
        if !body.contains("-->") {
            continue;
        }

        let chain = match parse_chain(body) {
            Ok(c) => c,
            Err(d) => {
                out.diagnostics.push(d);
                continue;
            }
        };

        match section {
            Section::Forward => {
                if let Some(done) = current.take() {
                    out.records.push(done);
                }
                let source = chain.nodes[0].clone();
                let reached = chain.nodes.last() == Some(destination);
                current = Some(TracerouteRecord {
                    timestamp,
                    source,
                    destination: destination.clone(),
                    forward: chain.intermediates(),
                    backward: Vec::new(),
                    forward_snr_db: chain.snr_db,
                    backward_snr_db: Vec::new(),
                    success: reached,
                });
            }
            Section::Backward => {
                let record = current.get_or_insert_with(|| TracerouteRecord {
                    timestamp,
                    source: chain.nodes.last().cloned().unwrap_or_else(|| destination.clone()),
                    destination: destination.clone(),
                    forward: Vec::new(),
                    backward: Vec::new(),
                    forward_snr_db: Vec::new(),
                    backward_snr_db: Vec::new(),
                    success: false,
                });
                record.backward = chain.intermediates();
                record.backward_snr_db = chain.snr_db;
            }
        }
    }

    if let Some(done) = current.take() {
        out.records.push(done);
    }
    if out.records.is_empty() && out.diagnostics.is_empty() {
        out.diagnostics.push(Diagnostic::new(
            None,
            ParseReason::NoMatch,
            "no route chain in response",
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const DEVICE_REPLY: &str = "\
Connected to radio
Sending telemetry request to !a1b2c3d4 on channelIndex:0 (this could take a while)
Telemetry received:
Battery level: 87.00%
Voltage: 4.07 V
Total channel utilization: 12.34%
Transmit air utilization: 1.25%
Uptime: 86400 s
";

    const BME280_REPLY: &str = "\
Telemetry received:
Temperature: 21.5°C
Humidity: 48.2%
Pressure: 1013.25 hPa
";

    const INA_REPLY: &str = "\
Telemetry received:
Channel 1 voltage: 5.02 V
Channel 1 current: 120.5 mA
Channel 2 voltage: 3.31 V
Channel 2 current: 0.25 A
";

    const TRACE_REPLY: &str = "\
Connected to radio
Sending traceroute request to !0000000d on channelIndex:0 (this could take a while)
Route traced towards destination:
!0000000a --> !0000000b (6.25dB) --> !0000000c (-2.5dB) --> !0000000d (3.0dB)
Route traced back to us:
!0000000d --> !0000000c (4.0dB) --> !0000000a (? dB)
";

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 0).unwrap()
    }

    fn node(s: &str) -> NodeId {
        NodeId::parse(s).unwrap()
    }

    // -----------------------------------------------------------------------
    // Device metrics
    // -----------------------------------------------------------------------

    #[test]
    fn parses_all_device_metrics() {
        let p = parse_telemetry(DEVICE_REPLY);
        assert_eq!(p.metrics.get(BATTERY_PCT), Some(&87.0));
        assert_eq!(p.metrics.get(VOLTAGE_V), Some(&4.07));
        assert_eq!(p.metrics.get(CHANNEL_UTIL_PCT), Some(&12.34));
        assert_eq!(p.metrics.get(AIR_TX_PCT), Some(&1.25));
        assert_eq!(p.metrics.get(UPTIME_S), Some(&86400.0));
        assert!(p.diagnostics.is_empty(), "{:?}", p.diagnostics);
    }

    #[test]
    fn battery_above_range_is_clamped_with_diagnostic() {
        let p = parse_telemetry("Battery level: 142%\n");
        assert_eq!(p.metrics.get(BATTERY_PCT), Some(&100.0));
        assert_eq!(p.diagnostics.len(), 1);
        assert_eq!(p.diagnostics[0].reason, ParseReason::OutOfRange);
    }

    #[test]
    fn battery_below_range_is_clamped() {
        let p = parse_telemetry("Battery level: -5%\n");
        assert_eq!(p.metrics.get(BATTERY_PCT), Some(&0.0));
    }

    #[test]
    fn missing_metrics_are_absent_not_zero() {
        let p = parse_telemetry("Voltage: 3.9 V\n");
        assert_eq!(p.metrics.len(), 1);
        assert!(!p.metrics.contains_key(BATTERY_PCT));
    }

    #[test]
    fn bad_number_discards_only_that_metric() {
        let p = parse_telemetry("Battery level: 1.2.3%\nVoltage: 4.1 V\n");
        assert!(!p.metrics.contains_key(BATTERY_PCT));
        assert_eq!(p.metrics.get(VOLTAGE_V), Some(&4.1));
        assert!(
            p.diagnostics
                .iter()
                .any(|d| d.reason == ParseReason::InvalidNumber)
        );
    }

    // -----------------------------------------------------------------------
    // Empty / malformed input
    // -----------------------------------------------------------------------

    #[test]
    fn empty_input_yields_no_match() {
        let p = parse_telemetry("");
        assert!(p.is_empty());
        assert_eq!(p.empty_reason(), Some(ParseReason::NoMatch));
    }

    #[test]
    fn unrelated_text_yields_no_match() {
        let p = parse_telemetry("Error: timed out waiting for response\n");
        assert!(p.is_empty());
        assert_eq!(p.empty_reason(), Some(ParseReason::NoMatch));
        assert_eq!(p.diagnostics[0].reason.to_string(), "no match");
    }

    #[test]
    fn reply_cut_after_label_is_truncated() {
        let p = parse_telemetry("Telemetry received:\nBattery level:");
        assert!(p.is_empty());
        assert_eq!(p.empty_reason(), Some(ParseReason::Truncated));
    }

    #[test]
    fn arbitrary_bytes_never_panic() {
        let inputs = [
            "\u{0}\u{1}\u{2}",
            "Battery level: %%%%",
            "Channel 99999999999999999999 voltage: 1 V",
            "Uptime: 99999999999999999999999999999999999999 s",
            "Temperature: -.-°F",
            "-->-->-->",
            "Voltage: ",
            "日本語 Battery level: 50%",
        ];
        for raw in inputs {
            let _ = parse_telemetry(raw);
            let _ = parse_traceroute(raw, &node("!a"), ts());
        }
    }

    // -----------------------------------------------------------------------
    // Sensor probes
    // -----------------------------------------------------------------------

    #[test]
    fn parses_environment_probe() {
        let p = parse_telemetry(BME280_REPLY);
        assert_eq!(p.metrics.get("temperature_c"), Some(&21.5));
        assert_eq!(p.metrics.get("humidity_pct"), Some(&48.2));
        assert_eq!(p.metrics.get("pressure_hpa"), Some(&1013.25));
    }

    #[test]
    fn fahrenheit_is_converted() {
        let p = parse_telemetry("Temperature: 212 °F\n");
        let t = p.metrics["temperature_c"];
        assert!((t - 100.0).abs() < 1e-9);
    }

    #[test]
    fn multi_channel_power_probe() {
        let p = parse_telemetry(INA_REPLY);
        assert_eq!(p.metrics.get("ch1_voltage_v"), Some(&5.02));
        assert_eq!(p.metrics.get("ch1_current_ma"), Some(&120.5));
        assert_eq!(p.metrics.get("ch2_voltage_v"), Some(&3.31));
        assert_eq!(p.metrics.get("ch2_current_ma"), Some(&250.0));
        // channel lines must not leak into the single-channel columns
        assert!(!p.metrics.contains_key(VOLTAGE_V));
        assert!(!p.metrics.contains_key("current_ma"));
    }

    #[test]
    fn probes_merge_into_one_record() {
        let id = node("!a1b2c3d4");
        let (record, _) = merge_probe_replies(&id, ts(), [DEVICE_REPLY, BME280_REPLY, "garbage"]);
        let record = record.unwrap();
        assert_eq!(record.node_id, id);
        assert_eq!(record.get(BATTERY_PCT), Some(87.0));
        assert_eq!(record.get("temperature_c"), Some(21.5));
        assert_eq!(record.metrics.len(), 8);
    }

    #[test]
    fn merge_of_only_garbage_is_none() {
        let (record, diags) = merge_probe_replies(&node("!a"), ts(), ["nope", ""]);
        assert!(record.is_none());
        assert_eq!(diags.len(), 2);
    }

    // -----------------------------------------------------------------------
    // Traceroute
    // -----------------------------------------------------------------------

    #[test]
    fn parses_forward_and_backward_paths() {
        let dest = node("!0000000d");
        let p = parse_traceroute(TRACE_REPLY, &dest, ts());
        assert_eq!(p.records.len(), 1);
        let r = &p.records[0];
        assert_eq!(r.source, node("!0000000a"));
        assert_eq!(r.destination, dest);
        assert_eq!(r.forward, vec![node("!0000000b"), node("!0000000c")]);
        assert_eq!(r.backward, vec![node("!0000000c")]);
        assert_eq!(r.forward_snr_db, vec![6.25, -2.5, 3.0]);
        assert_eq!(r.backward_snr_db.len(), 2);
        assert!(r.backward_snr_db[1].is_nan());
        assert!(r.success);
    }

    #[test]
    fn direct_neighbour_has_empty_paths() {
        let dest = node("!b");
        let p = parse_traceroute(
            "Route traced towards destination:\n!a --> !b (5.0dB)\n",
            &dest,
            ts(),
        );
        assert_eq!(p.records.len(), 1);
        assert!(p.records[0].forward.is_empty());
        assert!(p.records[0].success);
    }

    #[test]
    fn headerless_chain_defaults_to_forward() {
        let dest = node("!c");
        let p = parse_traceroute("!a --> !b (1.0dB) --> !c (2.0dB)\n", &dest, ts());
        assert_eq!(p.records[0].forward, vec![node("!b")]);
    }

    #[test]
    fn chain_not_reaching_destination_is_unsuccessful() {
        let dest = node("!d");
        let p = parse_traceroute("!a --> !b (1.0dB)\n", &dest, ts());
        assert_eq!(p.records.len(), 1);
        assert!(!p.records[0].success);
    }

    #[test]
    fn truncated_chain_is_reported() {
        let dest = node("!d");
        let p = parse_traceroute("Route traced towards destination:\n!a --> !b (1.0d", &dest, ts());
        assert!(p.is_empty());
        assert_eq!(p.diagnostics[0].reason, ParseReason::Truncated);
    }

    #[test]
    fn timeout_text_has_no_records() {
        let p = parse_traceroute("Timed out waiting for traceroute\n", &node("!d"), ts());
        assert!(p.is_empty());
        assert_eq!(p.diagnostics[0].reason, ParseReason::NoMatch);
    }
}
