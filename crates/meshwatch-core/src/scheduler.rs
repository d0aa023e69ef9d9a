//! Run scheduler: repeats collection cycles until a stop condition holds.
//!
//! ```text
//! Idle ──run()──▶ Running ──stop condition──▶ Stopping ──▶ Stopped
//! ```
//!
//! Stops are cooperative. An interrupt sets the [`StopSignal`]; the current
//! node finishes, the cycle persists what it has, run statistics are written
//! and a final render is requested before the scheduler reports `Stopped`.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::TimeDelta;

use crate::clock::Clock;
use crate::config::CollectorConfig;
use crate::discovery::NodeDiscovery;
use crate::error::Result;
use crate::executor::CommandExecutor;
use crate::orchestrator::{Orchestrator, RunContext};
use crate::record::NodeId;
use crate::render::{Renderer, TriggerReason};
use crate::store::RecordStore;

/// Longest single sleep between stop checks while waiting for the next cycle.
const WAIT_SLICE: Duration = Duration::from_secs(1);

/// Cooperative stop flag, shared with signal handlers.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// The underlying flag, for handlers that only accept an `AtomicBool`.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    RunOnce,
    MaxCycles,
    AllCompleted,
    Interrupted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunOnce => write!(f, "single cycle finished"),
            Self::MaxCycles => write!(f, "cycle limit reached"),
            Self::AllCompleted => write!(f, "all nodes completed"),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Final report of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: String,
    pub cycles: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_traceroutes: u64,
    pub persistence_failures: u64,
    pub known_nodes: usize,
    pub completed_nodes: usize,
    pub stop_reason: StopReason,
}

pub struct Scheduler<E, C> {
    orchestrator: Orchestrator<E, C>,
    discovery: Option<Box<dyn NodeDiscovery>>,
    targets: BTreeSet<NodeId>,
    stop: StopSignal,
    state: RunState,
}

impl<E: CommandExecutor, C: Clock> Scheduler<E, C> {
    /// Validate `config` and open the record store. Any error here is fatal
    /// and happens before the first query.
    pub fn new(config: CollectorConfig, executor: E, clock: C) -> Result<Self> {
        config.validate()?;
        let targets = config.target_nodes()?;
        let store = RecordStore::open(&config.telemetry_csv, &config.traceroute_csv)?;
        Ok(Self {
            orchestrator: Orchestrator::new(config, executor, store, clock),
            discovery: None,
            targets,
            stop: StopSignal::new(),
            state: RunState::Idle,
        })
    }

    pub fn with_discovery(mut self, discovery: Box<dyn NodeDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.orchestrator = self.orchestrator.with_renderer(renderer);
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn orchestrator(&self) -> &Orchestrator<E, C> {
        &self.orchestrator
    }

    /// Run cycles until a stop condition holds and return the summary.
    pub fn run(&mut self) -> Result<RunSummary> {
        let config = self.orchestrator.config().clone();
        let mut ctx = RunContext::new(self.orchestrator.clock().now());
        self.state = RunState::Running;
        log::info!(
            "run {} started: {} target(s), discovery {}, interval {}s",
            ctx.stats.run_id,
            self.targets.len(),
            if config.discover_all { "on" } else { "off" },
            config.interval.as_secs()
        );

        let reason = loop {
            let cycle_started = self.orchestrator.clock().now();
            let nodes = self.nodes_for_cycle(&mut ctx, &config);
            if nodes.is_empty() {
                log::warn!("no nodes to poll this cycle");
            }

            self.orchestrator.run_cycle(&mut ctx, &nodes, &self.stop);
            self.save_stats(&ctx, &config);

            if let Some(reason) = self.stop_condition(&ctx, &config) {
                break reason;
            }

            let interval = TimeDelta::from_std(config.interval).unwrap_or(TimeDelta::MAX);
            let next_at = cycle_started.checked_add_signed(interval).unwrap_or(cycle_started);
            if !self.wait_until(next_at) {
                break StopReason::Interrupted;
            }
        };

        self.state = RunState::Stopping;
        log::info!("stopping: {reason}");
        if self.orchestrator.has_renderer() {
            self.orchestrator.render(&mut ctx, TriggerReason::Shutdown);
        }
        ctx.stats.touch(self.orchestrator.clock().now());
        self.save_stats(&ctx, &config);
        self.state = RunState::Stopped;

        Ok(RunSummary {
            run_id: ctx.stats.run_id.clone(),
            cycles: ctx.stats.cycle_count,
            total_successes: ctx.stats.total_successes,
            total_failures: ctx.stats.total_failures,
            total_traceroutes: ctx.stats.total_traceroutes,
            persistence_failures: ctx.stats.persistence_failures,
            known_nodes: ctx.tracker.len(),
            completed_nodes: ctx.tracker.completed_count(),
            stop_reason: reason,
        })
    }

    /// Explicit targets plus, in all-nodes mode, whatever discovery finds.
    fn nodes_for_cycle(&mut self, ctx: &mut RunContext, config: &CollectorConfig) -> BTreeSet<NodeId> {
        let mut nodes = self.targets.clone();
        if config.discover_all {
            if let Some(discovery) = self.discovery.as_mut() {
                nodes.extend(discovery.discover());
            }
        }
        let now = self.orchestrator.clock().now();
        for node in &nodes {
            if ctx.tracker.register(node, now) && ctx.stats.cycle_count > 0 {
                log::info!("[{node}] discovered");
            }
        }
        nodes
    }

    fn stop_condition(&self, ctx: &RunContext, config: &CollectorConfig) -> Option<StopReason> {
        if self.stop.is_requested() {
            Some(StopReason::Interrupted)
        } else if config.run_once {
            Some(StopReason::RunOnce)
        } else if config.max_cycles.is_some_and(|max| ctx.stats.cycle_count >= max) {
            Some(StopReason::MaxCycles)
        } else if config.stop_when_all_complete && ctx.tracker.all_completed() {
            Some(StopReason::AllCompleted)
        } else {
            None
        }
    }

    /// Sleep until `deadline` in short slices. Returns `false` if a stop was
    /// requested while waiting.
    fn wait_until(&self, deadline: chrono::DateTime<chrono::Utc>) -> bool {
        let clock = self.orchestrator.clock();
        loop {
            if self.stop.is_requested() {
                return false;
            }
            let remaining = deadline - clock.now();
            let Ok(remaining) = remaining.to_std() else {
                return true;
            };
            if remaining.is_zero() {
                return true;
            }
            clock.sleep(remaining.min(WAIT_SLICE));
        }
    }

    fn save_stats(&self, ctx: &RunContext, config: &CollectorConfig) {
        if let Err(e) = ctx.stats.save(&config.stats_path) {
            log::warn!("{e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_signal_is_shared_between_clones() {
        let a = StopSignal::new();
        let b = a.clone();
        assert!(!b.is_requested());
        a.request();
        assert!(b.is_requested());
        assert!(a.flag().load(Ordering::SeqCst));
    }

    #[test]
    fn stop_reason_display() {
        assert_eq!(StopReason::AllCompleted.to_string(), "all nodes completed");
    }
}
