//! Node discovery.
//!
//! Discovery is consulted once per cycle when all-nodes mode is enabled. It
//! never errors: an unreachable radio yields an empty set.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::executor::MeshtasticCli;
use crate::record::NodeId;

/// Source of node ids to poll.
pub trait NodeDiscovery {
    fn discover(&mut self) -> BTreeSet<NodeId>;
}

impl<D: NodeDiscovery + ?Sized> NodeDiscovery for Box<D> {
    fn discover(&mut self) -> BTreeSet<NodeId> {
        (**self).discover()
    }
}

/// A fixed list of nodes.
#[derive(Debug, Clone, Default)]
pub struct StaticNodes(pub BTreeSet<NodeId>);

impl NodeDiscovery for StaticNodes {
    fn discover(&mut self) -> BTreeSet<NodeId> {
        self.0.clone()
    }
}

/// Extract node ids from the box-drawn table printed by `meshtastic --nodes`.
///
/// The id column is located from the header row. Tables without a
/// recognisable header fall back to the third column, where the id sits in
/// the stock layout (`│ N │ User │ ID │ …`). Rows whose cell is not a valid
/// node id are skipped.
pub fn parse_node_table(raw: &str) -> BTreeSet<NodeId> {
    let mut id_col: Option<usize> = None;
    let mut nodes = BTreeSet::new();

    for line in raw.lines() {
        if !line.contains('│') {
            continue;
        }
        let cells: Vec<&str> = line.split('│').map(str::trim).collect();
        if id_col.is_none() {
            if let Some(pos) = cells.iter().position(|c| c.eq_ignore_ascii_case("id")) {
                id_col = Some(pos);
                continue;
            }
        }
        let Some(cell) = cells.get(id_col.unwrap_or(3)) else {
            continue;
        };
        if let Ok(id) = NodeId::parse(cell) {
            nodes.insert(id);
        }
    }
    nodes
}

/// Discovery through the `meshtastic --nodes` listing.
#[derive(Debug, Clone)]
pub struct NodeTableDiscovery {
    cli: MeshtasticCli,
    timeout: Duration,
}

impl NodeTableDiscovery {
    pub fn new(cli: MeshtasticCli, timeout: Duration) -> Self {
        Self { cli, timeout }
    }
}

impl NodeDiscovery for NodeTableDiscovery {
    fn discover(&mut self) -> BTreeSet<NodeId> {
        match self.cli.list_nodes(self.timeout) {
            Ok(raw) => {
                let nodes = parse_node_table(&raw);
                log::debug!("node table listed {} node(s)", nodes.len());
                nodes
            }
            Err(e) => {
                log::warn!("node discovery failed: {e}");
                BTreeSet::new()
            }
        }
    }
}
