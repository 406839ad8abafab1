//! Topological analysis of the active network.
//!
//! The solved system must be a single electrical island containing exactly
//! one reference bus. These checks run before any solve; a network that
//! fails them is a configuration error, not a numerical one.

use crate::{BusId, ModelError, ModelResult, Network};
use petgraph::prelude::*;
use std::collections::{HashMap, HashSet, VecDeque};

/// Electrically connected groups of active buses.
#[derive(Debug)]
pub struct IslandAnalysis {
    /// Each island's member bus numbers, ascending; islands ordered by their
    /// lowest member
    pub islands: Vec<Vec<BusId>>,
}

/// Labels connected components (breadth-first search) over the active buses
/// and active branches.
///
/// Branches whose endpoints are inactive contribute no connectivity, so
/// deactivating every branch incident to a bus leaves that bus in an island
/// of its own.
pub fn find_islands(network: &Network) -> IslandAnalysis {
    let mut graph: UnGraph<BusId, ()> = UnGraph::new_undirected();
    let mut index_of: HashMap<BusId, NodeIndex> = HashMap::new();

    for bus in network.active_buses() {
        index_of.insert(bus.number, graph.add_node(bus.number));
    }
    for branch in network.active_branches() {
        if let (Some(&a), Some(&b)) = (index_of.get(&branch.from), index_of.get(&branch.to)) {
            graph.add_edge(a, b, ());
        }
    }

    let mut visited: HashSet<NodeIndex> = HashSet::new();
    let mut islands = Vec::new();
    for start in graph.node_indices() {
        if visited.contains(&start) {
            continue;
        }
        let mut queue = VecDeque::new();
        queue.push_back(start);
        let mut members = Vec::new();
        while let Some(node) = queue.pop_front() {
            if !visited.insert(node) {
                continue;
            }
            members.push(graph[node]);
            for neighbor in graph.neighbors(node) {
                if !visited.contains(&neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }
        members.sort();
        islands.push(members);
    }
    islands.sort_by_key(|members| members[0]);

    IslandAnalysis { islands }
}

/// Check the solve-time topology invariants: a non-empty active bus set,
/// exactly one active reference bus, and every active bus connected to it.
pub fn check_connectivity(network: &Network) -> ModelResult<()> {
    if network.active_buses().next().is_none() {
        return Err(ModelError::EmptyNetwork);
    }

    let reference = network.reference_bus()?;

    let analysis = find_islands(network);
    for island in &analysis.islands {
        if !island.contains(&reference) {
            return Err(ModelError::IslandedBus(island[0]));
        }
    }
    Ok(())
}
