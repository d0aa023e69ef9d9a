//! Property-based tests for the reply parsers.
//!
//! Covers totality of the telemetry, traceroute and node-table parsers on
//! arbitrary input, battery clamping, and node id normalisation.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use meshwatch_core::{NodeId, parse_node_table, parse_telemetry, parse_traceroute};

// =============================================================================
// Strategies
// =============================================================================

fn ts() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
}

/// Text built from fragments the parsers look for, glued with noise, so
/// generated input reaches the interesting branches rather than only the
/// "no match" path.
fn arb_reply() -> impl Strategy<Value = String> {
    let keyword = prop::sample::select(vec![
        "Battery level: ",
        "Voltage: ",
        "Temperature: ",
        "Current: ",
        "Channel 2 current: ",
        "Uptime: ",
        "Route traced towards destination:",
        "Route traced back to us:",
        " --> ",
        " (",
        "dB)",
        "%",
        "\n",
        "│",
    ])
    .prop_map(str::to_string);
    let fragment = prop_oneof![
        4 => keyword,
        2 => "-?[0-9]{0,6}(\\.[0-9]{0,4})?",
        2 => "!?[0-9a-fA-F]{1,8}",
        1 => "\\PC{0,12}",
    ];
    prop::collection::vec(fragment, 0..24).prop_map(|parts| parts.concat())
}

fn arb_node_id() -> impl Strategy<Value = String> {
    "!?[0-9A-Za-z]{1,10}"
}

// =============================================================================
// Telemetry
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn telemetry_parse_is_total(raw in arb_reply()) {
        let parsed = parse_telemetry(&raw);
        // Something was said about every input that yielded nothing.
        if parsed.is_empty() {
            prop_assert!(!parsed.diagnostics.is_empty());
            prop_assert!(parsed.empty_reason().is_some());
        } else {
            prop_assert!(parsed.empty_reason().is_none());
        }
    }

    #[test]
    fn telemetry_parse_survives_any_text(raw in "\\PC{0,200}") {
        let _ = parse_telemetry(&raw);
    }

    #[test]
    fn battery_always_in_range(raw in arb_reply()) {
        if let Some(b) = parse_telemetry(&raw).metrics.get("battery_pct") {
            prop_assert!((0.0..=100.0).contains(b), "battery {} out of range", b);
        }
    }

    #[test]
    fn battery_value_is_clamped(pct in -500i32..500) {
        let parsed = parse_telemetry(&format!("Battery level: {pct}%\n"));
        let expected = f64::from(pct).clamp(0.0, 100.0);
        prop_assert_eq!(parsed.metrics.get("battery_pct"), Some(&expected));
    }
}

// =============================================================================
// Traceroute and node table
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn traceroute_parse_is_total(raw in arb_reply()) {
        let dest = NodeId::parse("!0000000d").unwrap();
        let parsed = parse_traceroute(&raw, &dest, ts());
        prop_assert!(!parsed.records.is_empty() || !parsed.diagnostics.is_empty());
        for record in &parsed.records {
            prop_assert_eq!(&record.destination, &dest);
            // One SNR per link; a record seen only on the way back has none.
            if !record.forward_snr_db.is_empty() {
                prop_assert_eq!(record.forward_snr_db.len(), record.forward.len() + 1);
            }
        }
    }

    #[test]
    fn node_table_parse_survives_any_text(raw in arb_reply()) {
        for id in parse_node_table(&raw) {
            prop_assert_eq!(NodeId::parse(id.as_str()), Ok(id.clone()));
        }
    }
}

// =============================================================================
// Node ids
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn node_id_normalisation_is_idempotent(raw in arb_node_id()) {
        let id = NodeId::parse(&raw).unwrap();
        prop_assert_eq!(NodeId::parse(id.as_str()), Ok(id.clone()));
    }

    #[test]
    fn hex_case_does_not_split_a_node(hex in "[0-9a-f]{8}") {
        let lower = NodeId::parse(&format!("!{hex}")).unwrap();
        let upper = NodeId::parse(&hex.to_ascii_uppercase()).unwrap();
        if hex.chars().all(|c| c.is_ascii_digit()) {
            prop_assert_eq!(upper.as_str(), hex.as_str());
        } else {
            prop_assert_eq!(upper, lower);
        }
    }
}
