//! Collection orchestrator: one cycle over a node list.
//!
//! A cycle queries every node in turn, one request at a time, retrying
//! transport failures up to the configured limit. Parsed records are buffered
//! and persisted after the last node, the tracker is updated for every node
//! that was attempted, completion is evaluated, and a render is requested if
//! a trigger condition holds.
//!
//! Failures are isolated: a node that never answers is recorded as failed
//! for the cycle, a record that cannot be written is counted and skipped,
//! and neither stops the remaining work.

use std::collections::BTreeSet;

use chrono::{DateTime, TimeDelta, Utc};

use crate::clock::Clock;
use crate::config::CollectorConfig;
use crate::error::Error;
use crate::executor::CommandExecutor;
use crate::parser::{TracerouteParse, merge_probe_replies, parse_telemetry, parse_traceroute};
use crate::record::{NodeId, TelemetryRecord, TracerouteRecord};
use crate::render::{RenderRequest, Renderer, TriggerReason};
use crate::request::RequestKind;
use crate::scheduler::StopSignal;
use crate::stats::RunStatistics;
use crate::store::RecordSink;
use crate::tracker::NodeTracker;

/// Mutable state of one run, passed into every cycle.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub tracker: NodeTracker,
    pub stats: RunStatistics,
    pub last_render_at: Option<DateTime<Utc>>,
}

impl RunContext {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            tracker: NodeTracker::new(),
            stats: RunStatistics::new(started_at),
            last_render_at: None,
        }
    }
}

/// What happened during one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    /// Nodes that were queried, in order.
    pub attempted: Vec<NodeId>,
    /// Nodes whose telemetry record was persisted.
    pub succeeded: Vec<NodeId>,
    /// Nodes that yielded no persisted record.
    pub failed: Vec<NodeId>,
    /// Already completed nodes that were not queried.
    pub skipped: Vec<NodeId>,
    pub traceroutes: usize,
    pub persistence_failures: usize,
    pub newly_completed: Vec<NodeId>,
    pub trigger: Option<TriggerReason>,
    /// A stop was requested before every node had been attempted.
    pub interrupted: bool,
}

/// Outcome of querying one node.
struct NodeOutcome {
    node: NodeId,
    telemetry: Option<TelemetryRecord>,
    traceroutes: Vec<TracerouteRecord>,
}

pub struct Orchestrator<E, C> {
    config: CollectorConfig,
    executor: E,
    renderer: Option<Box<dyn Renderer>>,
    store: Box<dyn RecordSink>,
    clock: C,
}

impl<E: CommandExecutor, C: Clock> Orchestrator<E, C> {
    pub fn new(
        config: CollectorConfig,
        executor: E,
        store: impl RecordSink + 'static,
        clock: C,
    ) -> Self {
        Self {
            config,
            executor,
            renderer: None,
            store: Box::new(store),
            clock,
        }
    }

    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn has_renderer(&self) -> bool {
        self.renderer.is_some()
    }

    /// Run one collection cycle over `nodes`.
    ///
    /// `stop` is checked before each node. Once it is set no further node is
    /// queried, but everything gathered so far is still persisted and
    /// accounted for.
    pub fn run_cycle(
        &mut self,
        ctx: &mut RunContext,
        nodes: &BTreeSet<NodeId>,
        stop: &StopSignal,
    ) -> CycleReport {
        let mut report = CycleReport {
            cycle: ctx.stats.cycle_count + 1,
            ..CycleReport::default()
        };
        log::info!("cycle {} starting with {} node(s)", report.cycle, nodes.len());

        let mut outcomes = Vec::with_capacity(nodes.len());
        for node in nodes {
            ctx.tracker.register(node, self.clock.now());
            if ctx.tracker.get(node).is_some_and(|s| s.completed) {
                log::debug!("[{node}] completed, not polling");
                report.skipped.push(node.clone());
                continue;
            }
            if stop.is_requested() {
                log::info!("stop requested, leaving remaining nodes for a later run");
                report.interrupted = true;
                break;
            }
            report.attempted.push(node.clone());
            outcomes.push(self.poll_node(node));
        }

        self.persist(ctx, outcomes, &mut report);

        let now = self.clock.now();
        let policy = self.config.completion_policy();
        report.newly_completed = ctx.tracker.evaluate(&policy, now);
        for node in &report.newly_completed {
            let samples = ctx.tracker.get(node).map_or(0, |s| s.sample_count);
            log::info!("[{node}] completed after {samples} sample(s)");
        }

        report.trigger = self.trigger_reason(ctx, &report, now);
        if let Some(reason) = report.trigger.clone() {
            self.render(ctx, reason);
        }

        ctx.stats.cycle_count = report.cycle;
        ctx.stats.total_successes += report.succeeded.len() as u64;
        ctx.stats.total_failures += report.failed.len() as u64;
        ctx.stats.total_traceroutes += report.traceroutes as u64;
        ctx.stats.persistence_failures += report.persistence_failures as u64;
        ctx.stats.sync_nodes(&ctx.tracker);
        ctx.stats.touch(now);

        log::info!(
            "cycle {} done: {} ok, {} failed, {} skipped, {}/{} node(s) completed",
            report.cycle,
            report.succeeded.len(),
            report.failed.len(),
            report.skipped.len(),
            ctx.tracker.completed_count(),
            ctx.tracker.len()
        );
        report
    }

    /// Request a render outside the cycle triggers, e.g. at shutdown.
    /// Returns `false` when no renderer is configured.
    pub fn render(&mut self, ctx: &mut RunContext, reason: TriggerReason) -> bool {
        let Some(renderer) = self.renderer.as_mut() else {
            return false;
        };
        let request = RenderRequest {
            reason,
            telemetry_csv: self.config.telemetry_csv.clone(),
            traceroute_csv: self.config.traceroute_csv.clone(),
            output_dir: self.config.plot_dir.clone(),
        };
        log::info!("render triggered: {}", request.reason);
        ctx.last_render_at = Some(self.clock.now());
        match renderer.render(&request) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("{e}");
                false
            }
        }
    }

    fn poll_node(&mut self, node: &NodeId) -> NodeOutcome {
        let timestamp = self.clock.now();

        let mut replies = Vec::new();
        if let Some(raw) = self.query(node, RequestKind::DeviceMetrics, |raw| {
            parse_telemetry(raw).is_empty()
        }) {
            replies.push(raw);
        }
        for probe in self.config.probes.clone() {
            if let Some(raw) = self.query(node, RequestKind::Sensor(probe), |_| false) {
                replies.push(raw);
            }
        }

        let telemetry = if replies.is_empty() {
            None
        } else {
            let (record, diagnostics) =
                merge_probe_replies(node, timestamp, replies.iter().map(String::as_str));
            for d in &diagnostics {
                log::debug!("[{node}] {d}");
            }
            if record.is_none() {
                let reason = diagnostics
                    .first()
                    .map_or_else(|| "no known metric".to_string(), |d| d.to_string());
                log::warn!("[{node}] {}", Error::ParseFailure { reason });
            }
            record
        };

        let mut traceroutes = Vec::new();
        if self.config.traceroute {
            let parse = |raw: &str| parse_traceroute(raw, node, timestamp);
            if let Some(raw) = self.query(node, RequestKind::Traceroute, |raw| parse(raw).is_empty()) {
                let TracerouteParse {
                    records,
                    diagnostics,
                } = parse(&raw);
                for d in &diagnostics {
                    log::debug!("[{node}] traceroute {d}");
                }
                traceroutes = records;
            }
        }

        NodeOutcome {
            node: node.clone(),
            telemetry,
            traceroutes,
        }
    }

    /// Issue `kind` to `node` with retries. Returns the last reply whose
    /// transport succeeded, or `None` if every attempt failed.
    ///
    /// For request kinds that retry on empty output, a reply for which
    /// `is_empty` holds is retried like a transport failure; if the attempts
    /// run out it is still returned so its diagnostics can be reported.
    fn query(
        &mut self,
        node: &NodeId,
        kind: RequestKind,
        is_empty: impl Fn(&str) -> bool,
    ) -> Option<String> {
        let attempts = self.config.retries.saturating_add(1);
        let timeout = self.config.timeout_for(kind);
        let mut last_reply = None;

        for attempt in 1..=attempts {
            match self.executor.execute(node, kind, timeout) {
                Ok(raw) => {
                    if !(kind.retry_on_empty() && is_empty(&raw)) {
                        return Some(raw);
                    }
                    log::warn!("[{node}] {kind}: attempt {attempt}/{attempts} returned nothing usable");
                    last_reply = Some(raw);
                }
                Err(e) => {
                    log::warn!("[{node}] attempt {attempt}/{attempts}: {e}");
                }
            }
            if attempt < attempts {
                let delay = self.config.backoff.delay(self.config.retry_delay, attempt);
                log::info!("[{node}] {kind}: retrying in {}ms", delay.as_millis());
                self.clock.sleep(delay);
            }
        }

        if last_reply.is_none() {
            log::warn!("[{node}] {kind}: giving up after {attempts} attempt(s)");
        }
        last_reply
    }

    fn persist(&mut self, ctx: &mut RunContext, outcomes: Vec<NodeOutcome>, report: &mut CycleReport) {
        let now = self.clock.now();
        for outcome in outcomes {
            let node = &outcome.node;
            let persisted = match &outcome.telemetry {
                Some(record) => match self.store.append_telemetry(record) {
                    Ok(()) => true,
                    Err(e) => {
                        log::error!("[{node}] {e}");
                        report.persistence_failures += 1;
                        false
                    }
                },
                None => false,
            };
            if persisted {
                ctx.tracker.observe(node, outcome.telemetry.as_ref(), now);
                report.succeeded.push(node.clone());
            } else {
                ctx.tracker.observe(node, None, now);
                report.failed.push(node.clone());
            }

            for record in &outcome.traceroutes {
                match self.store.append_traceroute(record) {
                    Ok(()) => report.traceroutes += 1,
                    Err(e) => {
                        log::error!("[{node}] {e}");
                        report.persistence_failures += 1;
                    }
                }
            }
        }
    }

    fn trigger_reason(
        &self,
        ctx: &RunContext,
        report: &CycleReport,
        now: DateTime<Utc>,
    ) -> Option<TriggerReason> {
        if self.config.stop_when_all_complete
            && !report.newly_completed.is_empty()
            && ctx.tracker.all_completed()
        {
            return Some(TriggerReason::AllCompleted);
        }
        if self.config.plot_on_completion && !report.newly_completed.is_empty() {
            return Some(TriggerReason::NodesCompleted(report.newly_completed.clone()));
        }
        if self.config.plot_every_cycle && (!report.succeeded.is_empty() || report.traceroutes > 0) {
            return Some(TriggerReason::EveryCycle);
        }
        let interval = self.config.plot_interval?;
        let since = ctx.last_render_at.unwrap_or(ctx.stats.started_at);
        let elapsed = now - since;
        (elapsed >= TimeDelta::from_std(interval).unwrap_or(TimeDelta::MAX))
            .then_some(TriggerReason::IntervalElapsed)
    }
}
