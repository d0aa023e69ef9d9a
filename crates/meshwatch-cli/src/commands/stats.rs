//! `meshwatch stats`: show a run statistics file.

use std::path::Path;

use meshwatch_core::RunStatistics;

/// Run the stats command.
pub fn run(path: &Path, json: bool) {
    let stats = match RunStatistics::load(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if json {
        match serde_json::to_string_pretty(&stats) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    println!("Run {}", stats.run_id);
    println!("  Started:       {}", stats.started_at.to_rfc3339());
    println!("  Last activity: {}", stats.last_activity.to_rfc3339());
    println!("  Cycles:        {}", stats.cycle_count);
    println!(
        "  Queries:       {} ok, {} failed, {} traceroute(s)",
        stats.total_successes, stats.total_failures, stats.total_traceroutes
    );
    if stats.persistence_failures > 0 {
        println!("  Write errors:  {}", stats.persistence_failures);
    }
    println!(
        "  Completed:     {}/{} node(s)",
        stats.completed_nodes.len(),
        stats.discovered_nodes.len()
    );
    println!();
    println!("{:<14} {:>8}  {}", "Node", "Samples", "Completed at");
    println!("{}", "-".repeat(50));
    for node in &stats.discovered_nodes {
        let samples = stats.samples_per_node.get(node).copied().unwrap_or(0);
        let completed = stats
            .completion_times
            .get(node)
            .map_or_else(|| "-".to_string(), |t| t.to_rfc3339());
        println!("{:<14} {:>8}  {}", node.as_str(), samples, completed);
    }
}
