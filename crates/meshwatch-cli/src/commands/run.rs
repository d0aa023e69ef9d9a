//! `meshwatch run`: the collection loop.

use std::path::PathBuf;
use std::time::Duration;

use meshwatch_core::{
    Backoff, CollectorConfig, CommandRenderer, MeshtasticCli, NodeTableDiscovery, RunSummary,
    Scheduler, StopSignal, SystemClock,
};

/// Arguments of the run command, as parsed by clap.
pub struct RunCommandConfig {
    pub nodes: Vec<String>,
    pub all_nodes: bool,
    pub port: Option<String>,
    pub host: Option<String>,
    pub meshtastic: String,
    pub outdir: PathBuf,
    pub interval: Option<Duration>,
    pub once: bool,
    pub max_cycles: Option<u64>,
    pub timeout: Option<Duration>,
    pub traceroute_timeout: Option<Duration>,
    pub retries: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub backoff: Backoff,
    pub probes: Option<String>,
    pub no_traceroute: bool,
    pub min_samples: Option<u64>,
    pub idle_timeout: Option<Duration>,
    pub stop_when_complete: bool,
    pub plot_command: Option<String>,
    pub plot_interval: Option<Duration>,
    pub plot_every_cycle: bool,
    pub plot_on_completion: bool,
    pub regenerate_charts: bool,
}

/// Run the collection loop.
pub fn run(cmd: RunCommandConfig) {
    let config = match build_config(&cmd, |key| std::env::var(key).ok()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let cli = MeshtasticCli::new(&cmd.meshtastic)
        .with_port(config.port.clone())
        .with_host(cmd.host.clone());

    let mut scheduler = match Scheduler::new(config.clone(), cli.clone(), SystemClock) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    if config.discover_all {
        scheduler = scheduler.with_discovery(Box::new(NodeTableDiscovery::new(
            cli,
            config.query_timeout,
        )));
    }
    if let Some(renderer) = cmd.plot_command.as_deref().and_then(|c| renderer(c, cmd.regenerate_charts)) {
        scheduler = scheduler.with_renderer(Box::new(renderer));
    }

    // Set up Ctrl+C handler
    let stop = StopSignal::new();
    let s = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || s.request()) {
        log::warn!("cannot install Ctrl+C handler: {e}");
    }
    scheduler = scheduler.with_stop_signal(stop);

    println!("Collecting telemetry");
    if config.targets.is_empty() {
        println!("  Nodes:      discovered");
    } else {
        println!(
            "  Nodes:      {}{}",
            config.targets.join(", "),
            if config.discover_all { " + discovered" } else { "" }
        );
    }
    if config.run_once {
        println!("  Interval:   single cycle");
    } else {
        println!("  Interval:   {}s", config.interval.as_secs());
    }
    println!(
        "  Completion: {} samples, {}s idle",
        config.min_samples,
        config.idle_timeout.as_secs()
    );
    println!("  Output:     {}", cmd.outdir.display());
    println!();

    match scheduler.run() {
        Ok(summary) => print_summary(&summary),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

/// Defaults, overlaid by environment variables, overlaid by explicit flags.
fn build_config(
    cmd: &RunCommandConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<CollectorConfig, String> {
    let mut config = CollectorConfig::default().with_output_dir(&cmd.outdir);
    config.apply_vars(env).map_err(|e| e.to_string())?;

    config.targets.extend(cmd.nodes.iter().cloned());
    config.discover_all |= cmd.all_nodes;
    config.run_once |= cmd.once;
    config.traceroute &= !cmd.no_traceroute;
    config.stop_when_all_complete = cmd.stop_when_complete;
    config.plot_every_cycle = cmd.plot_every_cycle;
    config.plot_on_completion = cmd.plot_on_completion;
    config.backoff = cmd.backoff;
    config.max_cycles = cmd.max_cycles;

    if let Some(port) = &cmd.port {
        config.port = Some(port.clone());
    }
    if let Some(v) = cmd.interval {
        config.interval = v;
    }
    if let Some(v) = cmd.timeout {
        config.query_timeout = v;
    }
    if let Some(v) = cmd.traceroute_timeout {
        config.traceroute_timeout = v;
    }
    if let Some(v) = cmd.retries {
        config.retries = v;
    }
    if let Some(v) = cmd.retry_delay {
        config.retry_delay = v;
    }
    if let Some(v) = cmd.min_samples {
        config.min_samples = v;
    }
    if let Some(v) = cmd.idle_timeout {
        config.idle_timeout = v;
    }
    if let Some(v) = cmd.plot_interval {
        config.plot_interval = (!v.is_zero()).then_some(v);
    }
    if let Some(list) = &cmd.probes {
        config.probes = super::parse_probes(list)?;
    }
    Ok(config)
}

/// Split a shell-style command string into program and leading arguments.
fn renderer(command: &str, regenerate_charts: bool) -> Option<CommandRenderer> {
    let mut parts = command.split_whitespace().map(str::to_string);
    let program = parts.next()?;
    Some(
        CommandRenderer::new(program)
            .with_args(parts.collect())
            .regenerate_charts(regenerate_charts),
    )
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("Run {} finished: {}", summary.run_id, summary.stop_reason);
    println!("  Cycles:      {}", summary.cycles);
    println!("  Successes:   {}", summary.total_successes);
    println!("  Failures:    {}", summary.total_failures);
    println!("  Traceroutes: {}", summary.total_traceroutes);
    if summary.persistence_failures > 0 {
        println!("  Write errors: {}", summary.persistence_failures);
    }
    println!(
        "  Completed:   {}/{} node(s)",
        summary.completed_nodes, summary.known_nodes
    );
}
