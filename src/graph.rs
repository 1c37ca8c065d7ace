//! Drivable road-network graph.
//!
//! Built once by a [`GraphProvider`](crate::traits::GraphProvider) and then
//! owned by the network cache; pathfinding only ever reads it.

use std::collections::HashMap;

use crate::geo::{self, GeoPoint};

/// Graph node identifier (OSM-style numeric id).
pub type NodeId = i64;

/// A directed weighted edge.
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    pub to: NodeId,
    pub length_m: f64,
}

/// Immutable directed road network with forward and reverse adjacency.
#[derive(Debug, Default)]
pub struct RoadNetworkGraph {
    nodes: HashMap<NodeId, GeoPoint>,
    outgoing: HashMap<NodeId, Vec<Edge>>,
    incoming: HashMap<NodeId, Vec<Edge>>,
}

impl RoadNetworkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: NodeId, location: GeoPoint) {
        self.nodes.insert(id, location);
    }

    /// Add a directed edge. Edges referencing unknown nodes are ignored;
    /// negative lengths are clamped to zero.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, length_m: f64) {
        if !self.nodes.contains_key(&from) || !self.nodes.contains_key(&to) {
            return;
        }
        let length_m = length_m.max(0.0);
        self.outgoing.entry(from).or_default().push(Edge { to, length_m });
        self.incoming.entry(to).or_default().push(Edge { to: from, length_m });
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.outgoing.values().map(Vec::len).sum()
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node_location(&self, id: NodeId) -> Option<GeoPoint> {
        self.nodes.get(&id).copied()
    }

    /// Outgoing edges of `id` (successors).
    pub fn successors(&self, id: NodeId) -> &[Edge] {
        self.outgoing.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Incoming edges of `id`, expressed as edges pointing at the
    /// predecessor (for backward expansion).
    pub fn predecessors(&self, id: NodeId) -> &[Edge] {
        self.incoming.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Node closest to `point` by great-circle distance, `None` on an
    /// empty graph. Linear scan; graphs here are area-bounded.
    pub fn nearest_node(&self, point: GeoPoint) -> Option<NodeId> {
        let mut best: Option<(NodeId, f64)> = None;
        for (&id, &location) in &self.nodes {
            let dist = geo::great_circle_km(point, location);
            match best {
                Some((_, best_dist)) if dist >= best_dist => {}
                _ => best = Some((id, dist)),
            }
        }
        best.map(|(id, _)| id)
    }
}
