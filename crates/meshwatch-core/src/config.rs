//! Collector configuration.
//!
//! A run is configured once and the configuration is immutable for its
//! lifetime. The CLI fills a [`CollectorConfig`] from its arguments, then
//! [`CollectorConfig::apply_env`] overlays environment variables and
//! [`CollectorConfig::validate`] rejects anything unusable before the first
//! cycle.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::record::NodeId;
use crate::request::{RequestKind, SensorProbe};
use crate::tracker::CompletionPolicy;

/// Upper bound for any exponential retry delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Delay schedule between attempts of one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Always wait `retry_delay`.
    #[default]
    Fixed,
    /// Double the delay after every failed attempt, capped at [`MAX_BACKOFF`].
    Exponential,
}

impl Backoff {
    /// Delay before retry number `retry` (1-based).
    pub fn delay(self, base: Duration, retry: u32) -> Duration {
        match self {
            Self::Fixed => base,
            Self::Exponential => {
                let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(MAX_BACKOFF)
            }
        }
    }
}

impl std::str::FromStr for Backoff {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "exponential" | "exp" => Ok(Self::Exponential),
            other => Err(format!("unknown backoff '{other}' (expected fixed or exponential)")),
        }
    }
}

/// Configuration of a collection run.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorConfig {
    /// Explicitly requested nodes. Unioned with discovery results.
    pub targets: Vec<String>,
    /// Consult node discovery at the start of every cycle.
    pub discover_all: bool,
    /// Serial device passed to the executor.
    pub port: Option<String>,
    pub interval: Duration,
    pub run_once: bool,
    pub max_cycles: Option<u64>,
    pub query_timeout: Duration,
    pub traceroute_timeout: Duration,
    /// Extra attempts after the first one.
    pub retries: u32,
    pub retry_delay: Duration,
    pub backoff: Backoff,
    pub probes: Vec<SensorProbe>,
    pub traceroute: bool,
    pub min_samples: u64,
    pub idle_timeout: Duration,
    pub stop_when_all_complete: bool,
    pub telemetry_csv: PathBuf,
    pub traceroute_csv: PathBuf,
    pub stats_path: PathBuf,
    pub plot_dir: PathBuf,
    /// `None` disables interval-based renders.
    pub plot_interval: Option<Duration>,
    pub plot_on_completion: bool,
    pub plot_every_cycle: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            discover_all: false,
            port: None,
            interval: Duration::from_secs(300),
            run_once: false,
            max_cycles: None,
            query_timeout: Duration::from_secs(30),
            traceroute_timeout: Duration::from_secs(45),
            retries: 1,
            retry_delay: Duration::from_millis(800),
            backoff: Backoff::Fixed,
            probes: Vec::new(),
            traceroute: true,
            min_samples: 3,
            idle_timeout: Duration::from_secs(1800),
            stop_when_all_complete: false,
            telemetry_csv: PathBuf::from("telemetry.csv"),
            traceroute_csv: PathBuf::from("traceroute.csv"),
            stats_path: PathBuf::from("run_stats.json"),
            plot_dir: PathBuf::from("plots"),
            plot_interval: Some(Duration::from_secs(900)),
            plot_on_completion: true,
            plot_every_cycle: false,
        }
    }
}

impl CollectorConfig {
    /// Place the CSV files, statistics file and plot directory under `dir`.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.telemetry_csv = dir.join("telemetry.csv");
        self.traceroute_csv = dir.join("traceroute.csv");
        self.stats_path = dir.join("run_stats.json");
        self.plot_dir = dir.join("plots");
        self
    }

    pub fn completion_policy(&self) -> CompletionPolicy {
        CompletionPolicy {
            min_samples: self.min_samples,
            idle_timeout: self.idle_timeout,
        }
    }

    /// Timeout for one attempt of `kind`.
    pub fn timeout_for(&self, kind: RequestKind) -> Duration {
        match kind {
            RequestKind::Traceroute => self.traceroute_timeout,
            _ => self.query_timeout,
        }
    }

    /// Parsed, de-duplicated target ids. Invalid ids are an error.
    pub fn target_nodes(&self) -> Result<BTreeSet<NodeId>> {
        self.targets
            .iter()
            .map(|t| NodeId::parse(t).map_err(Error::Configuration))
            .collect()
    }

    /// Overlay settings from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Overlay settings from `lookup`. Empty values are ignored.
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("MESHTASTIC_PORT") {
            self.port = Some(v);
        }
        if let Some(v) = get("MESHTASTIC_TIMEOUT") {
            self.query_timeout = Duration::from_secs(parse_env("MESHTASTIC_TIMEOUT", &v)?);
        }
        if let Some(v) = get("MESHTASTIC_RETRIES") {
            self.retries = parse_env("MESHTASTIC_RETRIES", &v)?;
        }
        if let Some(v) = get("TELEMETRY_CSV") {
            self.telemetry_csv = PathBuf::from(v);
        }
        if let Some(v) = get("TRACEROUTE_CSV") {
            self.traceroute_csv = PathBuf::from(v);
        }
        if let Some(v) = get("PLOT_OUTPUT_DIR") {
            self.plot_dir = PathBuf::from(v);
        }
        if let Some(v) = get("LOGGER_INTERVAL") {
            self.interval = Duration::from_secs(parse_env("LOGGER_INTERVAL", &v)?);
        }
        if let Some(v) = get("LOGGER_RUN_ONCE") {
            self.run_once = parse_flag("LOGGER_RUN_ONCE", &v)?;
        }
        if let Some(v) = get("ENABLE_TRACEROUTE") {
            self.traceroute = parse_flag("ENABLE_TRACEROUTE", &v)?;
        }
        if let Some(v) = get("DISCOVER_ALL_NODES") {
            self.discover_all = parse_flag("DISCOVER_ALL_NODES", &v)?;
        }
        Ok(())
    }

    /// Check the configuration, reporting every problem at once.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.targets.is_empty() && !self.discover_all {
            problems.push("no target nodes and discovery disabled".to_string());
        }
        for t in &self.targets {
            if let Err(e) = NodeId::parse(t) {
                problems.push(e);
            }
        }
        if self.interval.is_zero() && !self.run_once {
            problems.push("interval must be greater than zero".to_string());
        }
        if self.query_timeout.is_zero() {
            problems.push("query timeout must be greater than zero".to_string());
        }
        if self.traceroute && self.traceroute_timeout.is_zero() {
            problems.push("traceroute timeout must be greater than zero".to_string());
        }
        if self.min_samples == 0 {
            problems.push("min samples must be at least 1".to_string());
        }
        if self.max_cycles == Some(0) {
            problems.push("max cycles must be at least 1".to_string());
        }
        if self.telemetry_csv == self.traceroute_csv {
            problems.push(format!(
                "telemetry and traceroute files are the same path ({})",
                self.telemetry_csv.display()
            ));
        }
        if self.stats_path == self.telemetry_csv || self.stats_path == self.traceroute_csv {
            problems.push("statistics file collides with a CSV file".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Configuration(problems.join("; ")))
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Configuration(format!("{key}: invalid value '{value}'")))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Configuration(format!("{key}: expected a boolean, got '{value}'"))),
    }
}
