pub mod discover;
pub mod inspect;
pub mod run;
pub mod stats;

use std::time::Duration;

use meshwatch_core::SensorProbe;

/// Parse a duration string like "5m", "30s", "1h", "800ms". A bare number
/// is seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    let (numeric, multiplier) = if let Some(rest) = s.strip_suffix("ms") {
        (rest, 1u64)
    } else if let Some(rest) = s.strip_suffix('s') {
        (rest, 1000)
    } else if let Some(rest) = s.strip_suffix('m') {
        (rest, 60_000)
    } else if let Some(rest) = s.strip_suffix('h') {
        (rest, 3_600_000)
    } else {
        (s, 1000)
    };

    let value: u64 = numeric
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration '{s}' (expected e.g. 30s, 5m, 1h, 800ms)"))?;
    value
        .checked_mul(multiplier)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}

/// Parse a comma-separated probe list. "all" selects every known probe,
/// "none" or an empty string selects none.
pub fn parse_probes(s: &str) -> Result<Vec<SensorProbe>, String> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("all") {
        return Ok(SensorProbe::ALL.to_vec());
    }
    if s.is_empty() || s.eq_ignore_ascii_case("none") {
        return Ok(Vec::new());
    }
    let mut probes = Vec::new();
    for name in s.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let probe: SensorProbe = name.parse()?;
        if !probes.contains(&probe) {
            probes.push(probe);
        }
    }
    Ok(probes)
}
