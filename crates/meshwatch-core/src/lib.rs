//! # meshwatch-core
//!
//! **Unattended telemetry and traceroute collection for mesh radio nodes.**
//!
//! `meshwatch-core` polls a set of nodes through a slow, single-channel
//! command executor, parses the replies into typed records, appends them to
//! CSV files, and decides per node when enough data has been gathered.
//!
//! ## Quick Start
//!
//! ```no_run
//! use meshwatch_core::{CollectorConfig, MeshtasticCli, Scheduler, SystemClock};
//!
//! let config = CollectorConfig {
//!     targets: vec!["!a1b2c3d4".into()],
//!     run_once: true,
//!     ..CollectorConfig::default()
//! };
//! let mut scheduler = Scheduler::new(config, MeshtasticCli::default(), SystemClock)?;
//! let summary = scheduler.run()?;
//! println!("{} ok, {} failed", summary.total_successes, summary.total_failures);
//! # Ok::<(), meshwatch_core::Error>(())
//! ```
//!
//! ## Architecture
//!
//! Scheduler → Orchestrator → (Executor → Parser → Store) per node → Tracker → Renderer
//!
//! - The [`Scheduler`] repeats cycles at the configured interval and watches
//!   the stop conditions.
//! - The [`Orchestrator`] runs one cycle. Nodes are queried one at a time
//!   with retries. A node that fails never prevents the others from being
//!   sampled.
//! - The [`NodeTracker`] marks a node completed once it has `min_samples`
//!   samples and has been quiet for `idle_timeout`.
//! - The [`RecordStore`] keeps exactly one header row per file and only ever
//!   widens it.

pub mod clock;
pub mod config;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod parser;
pub mod record;
pub mod render;
pub mod request;
pub mod scheduler;
pub mod stats;
pub mod store;
pub mod tracker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Backoff, CollectorConfig};
pub use discovery::{NodeDiscovery, NodeTableDiscovery, StaticNodes, parse_node_table};
pub use error::{Error, Result};
pub use executor::{CommandExecutor, MeshtasticCli};
pub use orchestrator::{CycleReport, Orchestrator, RunContext};
pub use parser::{
    Diagnostic, ParseReason, TelemetryParse, TracerouteParse, merge_probe_replies,
    parse_telemetry, parse_traceroute,
};
pub use record::{NodeId, TelemetryRecord, TracerouteRecord};
pub use render::{CommandRenderer, RenderRequest, Renderer, TriggerReason};
pub use request::{RequestKind, SensorProbe};
pub use scheduler::{RunState, RunSummary, Scheduler, StopReason, StopSignal};
pub use stats::RunStatistics;
pub use store::{RecordSink, RecordStore, Table, TableRow, read_table};
pub use tracker::{CompletionPolicy, NodeState, NodeTracker};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
