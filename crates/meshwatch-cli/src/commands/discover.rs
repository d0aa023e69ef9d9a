//! `meshwatch discover`: list nodes known to the local radio.

use std::time::Duration;

use meshwatch_core::{MeshtasticCli, parse_node_table};

/// Run the discover command.
pub fn run(program: &str, port: Option<String>, host: Option<String>, timeout: Duration) {
    let cli = MeshtasticCli::new(program).with_port(port).with_host(host);
    let raw = match cli.list_nodes(timeout) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("Error: node listing failed: {e}");
            std::process::exit(1);
        }
    };

    let nodes = parse_node_table(&raw);
    if nodes.is_empty() {
        println!("No nodes found.");
        return;
    }
    println!("{} node(s):", nodes.len());
    for node in &nodes {
        println!("  {node}");
    }
}
