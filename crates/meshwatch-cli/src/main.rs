//! CLI for meshwatch: unattended telemetry collection for mesh radio nodes.

mod commands;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use meshwatch_core::Backoff;

use commands::parse_duration;

#[derive(Parser)]
#[command(name = "meshwatch")]
#[command(about = "meshwatch: poll mesh nodes, log telemetry, stop when every node is done")]
#[command(version = meshwatch_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect telemetry and traceroutes in cycles until a stop condition holds.
    /// Settings fall back to environment variables (MESHTASTIC_PORT, LOGGER_INTERVAL, ...)
    /// and then to built-in defaults.
    Run {
        /// Node id to poll (repeatable, or comma-separated)
        #[arg(long = "node", value_delimiter = ',')]
        nodes: Vec<String>,

        /// Also poll every node listed by the radio's node table
        #[arg(long)]
        all_nodes: bool,

        /// Serial device of the local radio
        #[arg(long)]
        port: Option<String>,

        /// TCP host of a network-attached radio
        #[arg(long)]
        host: Option<String>,

        /// Path or name of the meshtastic executable
        #[arg(long, default_value = "meshtastic")]
        meshtastic: String,

        /// Output directory for telemetry.csv, traceroute.csv, run_stats.json and plots/
        #[arg(long, default_value = "monitoring")]
        outdir: PathBuf,

        /// Time between cycle starts (e.g. 300s, 5m, 1h)
        #[arg(long, value_parser = parse_duration)]
        interval: Option<Duration>,

        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,

        /// Stop after this many cycles
        #[arg(long)]
        max_cycles: Option<u64>,

        /// Timeout for one telemetry request
        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,

        /// Timeout for one traceroute request
        #[arg(long, value_parser = parse_duration)]
        traceroute_timeout: Option<Duration>,

        /// Extra attempts after a failed request
        #[arg(long)]
        retries: Option<u32>,

        /// Delay before the first retry
        #[arg(long, value_parser = parse_duration)]
        retry_delay: Option<Duration>,

        /// Retry delay schedule: fixed or exponential
        #[arg(long, default_value = "fixed")]
        backoff: Backoff,

        /// Comma-separated sensor probes (e.g. BME280,INA219), or "all"
        #[arg(long)]
        probes: Option<String>,

        /// Skip traceroute requests
        #[arg(long)]
        no_traceroute: bool,

        /// Samples required before a node can complete
        #[arg(long)]
        min_samples: Option<u64>,

        /// Quiet period after the last sample before a node completes
        #[arg(long, value_parser = parse_duration)]
        idle_timeout: Option<Duration>,

        /// Exit once every known node has completed
        #[arg(long)]
        stop_when_complete: bool,

        /// Plot command run on render triggers; receives --telemetry, --traceroute and --outdir
        #[arg(long)]
        plot_command: Option<String>,

        /// Render at least this often (0 disables interval renders)
        #[arg(long, value_parser = parse_duration)]
        plot_interval: Option<Duration>,

        /// Render after every cycle that wrote data
        #[arg(long)]
        plot_every_cycle: bool,

        /// Do not render when a node completes
        #[arg(long)]
        no_plot_on_completion: bool,

        /// Pass --regenerate-charts to the plot command
        #[arg(long)]
        regenerate_charts: bool,
    },

    /// List the nodes the local radio currently knows about
    Discover {
        /// Serial device of the local radio
        #[arg(long)]
        port: Option<String>,

        /// TCP host of a network-attached radio
        #[arg(long)]
        host: Option<String>,

        /// Path or name of the meshtastic executable
        #[arg(long, default_value = "meshtastic")]
        meshtastic: String,

        /// Timeout for the node listing
        #[arg(long, default_value = "30s", value_parser = parse_duration)]
        timeout: Duration,
    },

    /// Show a run statistics file
    Stats {
        /// Path to run_stats.json
        #[arg(default_value = "monitoring/run_stats.json")]
        path: PathBuf,

        /// Print the raw JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Summarise a telemetry CSV per node
    Inspect {
        /// Path to telemetry.csv
        #[arg(default_value = "monitoring/telemetry.csv")]
        path: PathBuf,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            nodes,
            all_nodes,
            port,
            host,
            meshtastic,
            outdir,
            interval,
            once,
            max_cycles,
            timeout,
            traceroute_timeout,
            retries,
            retry_delay,
            backoff,
            probes,
            no_traceroute,
            min_samples,
            idle_timeout,
            stop_when_complete,
            plot_command,
            plot_interval,
            plot_every_cycle,
            no_plot_on_completion,
            regenerate_charts,
        } => commands::run::run(commands::run::RunCommandConfig {
            nodes,
            all_nodes,
            port,
            host,
            meshtastic,
            outdir,
            interval,
            once,
            max_cycles,
            timeout,
            traceroute_timeout,
            retries,
            retry_delay,
            backoff,
            probes,
            no_traceroute,
            min_samples,
            idle_timeout,
            stop_when_complete,
            plot_command,
            plot_interval,
            plot_every_cycle,
            plot_on_completion: !no_plot_on_completion,
            regenerate_charts,
        }),
        Commands::Discover {
            port,
            host,
            meshtastic,
            timeout,
        } => commands::discover::run(&meshtastic, port, host, timeout),
        Commands::Stats { path, json } => commands::stats::run(&path, json),
        Commands::Inspect { path } => commands::inspect::run(&path),
    }
}
