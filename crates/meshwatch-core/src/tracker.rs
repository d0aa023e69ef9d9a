//! Per-node sampling state and completion detection.
//!
//! A node is *completed* once it has at least `min_samples` successful
//! samples **and** has been quiet (no new sample) for `idle_timeout`. Both
//! conditions are needed: volume alone would complete a node that is still
//! yielding fresh data. Completion latches. Within one tracker it never
//! reverts, even if the node answers again later.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::record::{NodeId, TelemetryRecord};

/// Thresholds for [`NodeTracker::is_completed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionPolicy {
    pub min_samples: u64,
    pub idle_timeout: Duration,
}

impl CompletionPolicy {
    fn idle(&self) -> TimeDelta {
        TimeDelta::from_std(self.idle_timeout).unwrap_or(TimeDelta::MAX)
    }
}

/// Mutable state for one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub node_id: NodeId,
    pub discovered_at: DateTime<Utc>,
    pub last_sample_at: Option<DateTime<Utc>>,
    /// Successful samples; never decreases.
    pub sample_count: u64,
    /// Cycles in which the node produced nothing.
    pub failed_cycles: u64,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl NodeState {
    pub fn new(node_id: NodeId, discovered_at: DateTime<Utc>) -> Self {
        Self {
            node_id,
            discovered_at,
            last_sample_at: None,
            sample_count: 0,
            failed_cycles: 0,
            completed: false,
            completed_at: None,
        }
    }

    fn meets(&self, policy: &CompletionPolicy, now: DateTime<Utc>) -> bool {
        let Some(last) = self.last_sample_at else {
            return false;
        };
        self.sample_count >= policy.min_samples && now - last >= policy.idle()
    }
}

/// All known nodes of a run.
#[derive(Debug, Clone, Default)]
pub struct NodeTracker {
    nodes: BTreeMap<NodeId, NodeState>,
}

impl NodeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `node` if it is new. Returns `true` when it was added.
    pub fn register(&mut self, node: &NodeId, now: DateTime<Utc>) -> bool {
        if self.nodes.contains_key(node) {
            return false;
        }
        self.nodes
            .insert(node.clone(), NodeState::new(node.clone(), now));
        true
    }

    /// Record the outcome of one cycle for `node`.
    ///
    /// Only a non-empty record counts as a sample. A failed cycle leaves
    /// `sample_count` and `last_sample_at` untouched.
    pub fn observe(&mut self, node: &NodeId, record: Option<&TelemetryRecord>, now: DateTime<Utc>) {
        self.register(node, now);
        let Some(state) = self.nodes.get_mut(node) else {
            return;
        };
        match record.filter(|r| !r.is_empty()) {
            Some(r) => {
                state.sample_count += 1;
                let at = r.timestamp;
                state.last_sample_at = Some(state.last_sample_at.map_or(at, |prev| prev.max(at)));
            }
            None => state.failed_cycles += 1,
        }
    }

    /// Whether `node` is completed at `now`. The first `true` is latched.
    pub fn is_completed(&mut self, node: &NodeId, policy: &CompletionPolicy, now: DateTime<Utc>) -> bool {
        let Some(state) = self.nodes.get_mut(node) else {
            return false;
        };
        if !state.completed && state.meets(policy, now) {
            state.completed = true;
            state.completed_at = Some(now);
        }
        state.completed
    }

    /// Evaluate every node and return those that completed just now.
    pub fn evaluate(&mut self, policy: &CompletionPolicy, now: DateTime<Utc>) -> Vec<NodeId> {
        let pending: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|s| !s.completed)
            .map(|s| s.node_id.clone())
            .collect();
        pending
            .into_iter()
            .filter(|id| self.is_completed(id, policy, now))
            .collect()
    }

    /// True iff at least one node is known and every known node is completed.
    pub fn all_completed(&self) -> bool {
        !self.nodes.is_empty() && self.nodes.values().all(|s| s.completed)
    }

    pub fn get(&self, node: &NodeId) -> Option<&NodeState> {
        self.nodes.get(node)
    }

    pub fn states(&self) -> impl Iterator<Item = &NodeState> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn completed_count(&self) -> usize {
        self.nodes.values().filter(|s| s.completed).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::BATTERY_PCT;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_750_000_000 + secs, 0).unwrap()
    }

    fn node(s: &str) -> NodeId {
        NodeId::parse(s).unwrap()
    }

    fn sample(id: &NodeId, secs: i64) -> TelemetryRecord {
        let mut r = TelemetryRecord::new(t(secs), id.clone());
        r.insert(BATTERY_PCT, 90.0);
        r
    }

    fn policy(min_samples: u64, idle_secs: u64) -> CompletionPolicy {
        CompletionPolicy {
            min_samples,
            idle_timeout: Duration::from_secs(idle_secs),
        }
    }

    #[test]
    fn volume_and_quiet_period_both_required() {
        let mut tracker = NodeTracker::new();
        let a = node("!a");
        let p = policy(3, 1800);
        tracker.register(&a, t(0));
        for secs in [0, 100, 200] {
            tracker.observe(&a, Some(&sample(&a, secs)), t(secs));
        }
        assert!(!tracker.is_completed(&a, &p, t(300)));
        assert!(tracker.is_completed(&a, &p, t(2001)));
    }

    #[test]
    fn completion_is_latched() {
        let mut tracker = NodeTracker::new();
        let a = node("!a");
        let p = policy(1, 10);
        tracker.observe(&a, Some(&sample(&a, 0)), t(0));
        assert!(tracker.is_completed(&a, &p, t(10)));
        // A fresh sample would un-idle the node, but completion holds.
        tracker.observe(&a, Some(&sample(&a, 11)), t(11));
        assert!(tracker.is_completed(&a, &p, t(12)));
        assert_eq!(tracker.get(&a).unwrap().completed_at, Some(t(10)));
    }

    #[test]
    fn never_completes_without_samples() {
        let mut tracker = NodeTracker::new();
        let a = node("!a");
        tracker.register(&a, t(0));
        for secs in [10, 20, 30] {
            tracker.observe(&a, None, t(secs));
        }
        assert!(!tracker.is_completed(&a, &policy(0, 0), t(1_000_000)));
        assert_eq!(tracker.get(&a).unwrap().failed_cycles, 3);
    }

    #[test]
    fn failures_do_not_reset_progress() {
        let mut tracker = NodeTracker::new();
        let a = node("!a");
        tracker.observe(&a, Some(&sample(&a, 0)), t(0));
        tracker.observe(&a, Some(&sample(&a, 60)), t(60));
        tracker.observe(&a, None, t(120));
        let s = tracker.get(&a).unwrap();
        assert_eq!(s.sample_count, 2);
        assert_eq!(s.last_sample_at, Some(t(60)));
    }

    #[test]
    fn empty_record_is_not_a_sample() {
        let mut tracker = NodeTracker::new();
        let a = node("!a");
        let empty = TelemetryRecord::new(t(0), a.clone());
        tracker.observe(&a, Some(&empty), t(0));
        assert_eq!(tracker.get(&a).unwrap().sample_count, 0);
    }

    #[test]
    fn node_discovered_mid_run_starts_fresh() {
        let mut tracker = NodeTracker::new();
        let a = node("!a");
        let b = node("!b");
        tracker.observe(&a, Some(&sample(&a, 0)), t(0));
        assert!(tracker.register(&b, t(500)));
        assert!(!tracker.register(&b, t(600)));
        let s = tracker.get(&b).unwrap();
        assert_eq!(s.sample_count, 0);
        assert_eq!(s.discovered_at, t(500));
        assert!(!tracker.is_completed(&b, &policy(0, 0), t(10_000)));
    }

    #[test]
    fn evaluate_reports_each_transition_once() {
        let mut tracker = NodeTracker::new();
        let a = node("!a");
        let b = node("!b");
        let p = policy(1, 100);
        tracker.observe(&a, Some(&sample(&a, 0)), t(0));
        tracker.observe(&b, Some(&sample(&b, 50)), t(50));

        assert_eq!(tracker.evaluate(&p, t(120)), vec![a.clone()]);
        assert!(!tracker.all_completed());
        assert_eq!(tracker.evaluate(&p, t(160)), vec![b.clone()]);
        assert!(tracker.evaluate(&p, t(500)).is_empty());
        assert!(tracker.all_completed());
        assert_eq!(tracker.completed_count(), 2);
    }

    #[test]
    fn empty_tracker_is_not_all_completed() {
        assert!(!NodeTracker::new().all_completed());
    }
}
