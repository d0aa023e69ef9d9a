//! Run statistics, rewritten atomically at every cycle boundary.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::record::NodeId;
use crate::tracker::NodeTracker;

/// Statistics format version written to `run_stats.json`.
pub const STATS_VERSION: u32 = 1;

/// Progress of one run. Created at scheduler start, updated after every
/// cycle, written at cycle boundaries and at shutdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub version: u32,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    /// Monotonically non-decreasing.
    pub last_activity: DateTime<Utc>,
    pub cycle_count: u64,
    /// Nodes that yielded a telemetry record, summed over cycles.
    pub total_successes: u64,
    /// Nodes that yielded nothing, summed over cycles.
    pub total_failures: u64,
    pub total_traceroutes: u64,
    pub persistence_failures: u64,
    pub samples_per_node: BTreeMap<NodeId, u64>,
    pub discovered_nodes: BTreeSet<NodeId>,
    pub completed_nodes: BTreeSet<NodeId>,
    pub completion_times: BTreeMap<NodeId, DateTime<Utc>>,
    pub meshwatch_version: String,
}

impl RunStatistics {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            version: STATS_VERSION,
            run_id: Uuid::new_v4().to_string(),
            started_at,
            last_activity: started_at,
            cycle_count: 0,
            total_successes: 0,
            total_failures: 0,
            total_traceroutes: 0,
            persistence_failures: 0,
            samples_per_node: BTreeMap::new(),
            discovered_nodes: BTreeSet::new(),
            completed_nodes: BTreeSet::new(),
            completion_times: BTreeMap::new(),
            meshwatch_version: crate::VERSION.to_string(),
        }
    }

    /// Advance `last_activity`; earlier timestamps are ignored.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    /// Copy per-node counts and completion state out of the tracker.
    pub fn sync_nodes(&mut self, tracker: &NodeTracker) {
        for state in tracker.states() {
            self.discovered_nodes.insert(state.node_id.clone());
            self.samples_per_node
                .insert(state.node_id.clone(), state.sample_count);
            if state.completed {
                self.completed_nodes.insert(state.node_id.clone());
                if let Some(at) = state.completed_at {
                    self.completion_times.insert(state.node_id.clone(), at);
                }
            }
        }
    }

    /// Write as pretty JSON via a temp file in the same directory and a
    /// rename, so readers never see a partial file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(d) => {
                fs::create_dir_all(d).map_err(|e| Error::persistence(d, e))?;
                d
            }
            None => Path::new("."),
        };
        let write = || -> std::io::Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
            tmp.write_all(json.as_bytes())?;
            tmp.write_all(b"\n")?;
            tmp.as_file().sync_all()?;
            tmp.persist(path).map_err(|e| e.error)?;
            Ok(())
        };
        write().map_err(|e| Error::persistence(path, e))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| Error::persistence(path, e))?;
        Ok(serde_json::from_str(&raw)?)
    }
}
