//! `meshwatch inspect`: per-node summary of a telemetry CSV.

use std::collections::BTreeMap;
use std::path::Path;

use meshwatch_core::record::{BATTERY_PCT, NODE_COLUMN, TIMESTAMP_COLUMN, VOLTAGE_V};
use meshwatch_core::{Table, read_table};

/// Rows and latest readings for one node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeSummary {
    pub rows: usize,
    pub first_seen: Option<String>,
    pub last_seen: Option<String>,
    pub last_battery: Option<f64>,
    pub last_voltage: Option<f64>,
}

/// Run the inspect command.
pub fn run(path: &Path) {
    let table = match read_table(path) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    println!("{}", path.display());
    println!("  Columns: {}", table.columns.len());
    println!("  Rows:    {}", table.rows.len());
    println!();

    let summary = summarize(&table);
    if summary.is_empty() {
        println!("No telemetry rows yet.");
        return;
    }

    println!(
        "{:<12} {:>6} {:>9} {:>9}  {:<22} {:<22}",
        "Node", "Rows", "Battery%", "Voltage", "First", "Last"
    );
    println!("{}", "-".repeat(86));
    for (node, s) in &summary {
        println!(
            "{:<12} {:>6} {:>9} {:>9}  {:<22} {:<22}",
            node,
            s.rows,
            s.last_battery.map_or_else(|| "-".into(), |v| format!("{v:.0}")),
            s.last_voltage.map_or_else(|| "-".into(), |v| format!("{v:.2}")),
            s.first_seen.as_deref().unwrap_or("-"),
            s.last_seen.as_deref().unwrap_or("-"),
        );
    }
}

/// Group rows by node. Rows are in append order, so the last value seen
/// for a metric is the latest reading.
pub fn summarize(table: &Table) -> BTreeMap<String, NodeSummary> {
    let mut out: BTreeMap<String, NodeSummary> = BTreeMap::new();
    for row in &table.rows {
        let Some(node) = row.get(NODE_COLUMN) else {
            continue;
        };
        let entry = out.entry(node.to_string()).or_default();
        entry.rows += 1;
        if let Some(ts) = row.get(TIMESTAMP_COLUMN) {
            if entry.first_seen.is_none() {
                entry.first_seen = Some(ts.to_string());
            }
            entry.last_seen = Some(ts.to_string());
        }
        if let Some(v) = row.get_f64(BATTERY_PCT) {
            entry.last_battery = Some(v);
        }
        if let Some(v) = row.get_f64(VOLTAGE_V) {
            entry.last_voltage = Some(v);
        }
    }
    out
}
