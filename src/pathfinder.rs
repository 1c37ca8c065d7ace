//! Bidirectional Dijkstra shortest-path search.
//!
//! Runs a forward expansion from the source over outgoing edges and a
//! backward expansion from the target over incoming edges, meeting in the
//! middle. Termination uses the frontier-sum stopping rule: stop only once
//! a meeting node exists and the sum of both frontiers' minimum keys can no
//! longer beat the best known total. Stopping at the first meeting point
//! can return a suboptimal distance, so it is deliberately not done here.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use tracing::debug;

use crate::graph::{Edge, NodeId, RoadNetworkGraph};
use crate::traits::RouteError;

/// Min-heap entry ordered by tentative distance.
#[derive(Debug, Clone, Copy)]
struct FrontierEntry {
    dist: f64,
    node: NodeId,
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrontierEntry {}

impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the std max-heap pops the smallest distance first.
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One direction of the search.
struct SearchState {
    dist: HashMap<NodeId, f64>,
    prev: HashMap<NodeId, NodeId>,
    heap: BinaryHeap<FrontierEntry>,
    settled: HashSet<NodeId>,
}

impl SearchState {
    fn new(origin: NodeId) -> Self {
        let mut dist = HashMap::new();
        dist.insert(origin, 0.0);
        let mut heap = BinaryHeap::new();
        heap.push(FrontierEntry { dist: 0.0, node: origin });
        Self {
            dist,
            prev: HashMap::new(),
            heap,
            settled: HashSet::new(),
        }
    }

    /// Current minimum frontier key. Stale entries only under-report,
    /// which delays termination but never breaks optimality.
    fn min_key(&self) -> Option<f64> {
        self.heap.peek().map(|entry| entry.dist)
    }
}

/// Shortest path from `source` to `target` over `graph`.
///
/// Returns the node sequence (source first, target last) and the total
/// distance in meters. `source == target` short-circuits to a single-node
/// path with distance 0.
pub fn shortest_path(
    graph: &RoadNetworkGraph,
    source: NodeId,
    target: NodeId,
) -> Result<(Vec<NodeId>, f64), RouteError> {
    if !graph.contains_node(source) {
        return Err(RouteError::NodeLookup(format!("unknown source node {source}")));
    }
    if !graph.contains_node(target) {
        return Err(RouteError::NodeLookup(format!("unknown target node {target}")));
    }
    if source == target {
        return Ok((vec![source], 0.0));
    }

    let mut forward = SearchState::new(source);
    let mut backward = SearchState::new(target);

    let mut best_total = f64::INFINITY;
    let mut meeting: Option<NodeId> = None;

    loop {
        let front = forward.min_key();
        let back = backward.min_key();

        if meeting.is_some() {
            let bound = match (front, back) {
                (Some(f), Some(b)) => f + b,
                // One side exhausted: future candidates cost at least the
                // surviving frontier's minimum.
                (Some(f), None) => f,
                (None, Some(b)) => b,
                (None, None) => f64::INFINITY,
            };
            if bound >= best_total {
                break;
            }
        }

        // Expand the direction with the smaller frontier key.
        let expand_forward = match (front, back) {
            (Some(f), Some(b)) => f <= b,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };

        if expand_forward {
            step(&mut forward, &backward, graph, Direction::Forward, &mut best_total, &mut meeting);
        } else {
            step(&mut backward, &forward, graph, Direction::Backward, &mut best_total, &mut meeting);
        }
    }

    let Some(meet) = meeting else {
        debug!(
            source,
            target,
            settled_forward = forward.settled.len(),
            settled_backward = backward.settled.len(),
            "no connecting path"
        );
        return Err(RouteError::NoPathFound);
    };

    debug!(
        source,
        target,
        meeting = meet,
        distance_m = best_total,
        settled_forward = forward.settled.len(),
        settled_backward = backward.settled.len(),
        "bidirectional search complete"
    );

    Ok((reconstruct(&forward.prev, &backward.prev, source, meet), best_total))
}

#[derive(Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}

/// Settle one node in `own` and relax its neighbors, tracking meeting
/// candidates against the opposite direction.
fn step(
    own: &mut SearchState,
    other: &SearchState,
    graph: &RoadNetworkGraph,
    direction: Direction,
    best_total: &mut f64,
    meeting: &mut Option<NodeId>,
) {
    let Some(FrontierEntry { dist, node }) = own.heap.pop() else {
        return;
    };
    if !own.settled.insert(node) {
        return;
    }

    if let Some(&other_dist) = other.dist.get(&node) {
        let total = dist + other_dist;
        if total < *best_total {
            *best_total = total;
            *meeting = Some(node);
        }
    }

    let neighbors: &[Edge] = match direction {
        Direction::Forward => graph.successors(node),
        Direction::Backward => graph.predecessors(node),
    };

    for edge in neighbors {
        if own.settled.contains(&edge.to) {
            continue;
        }
        let candidate = dist + edge.length_m;
        let improved = own
            .dist
            .get(&edge.to)
            .is_none_or(|&current| candidate < current);
        if improved {
            own.dist.insert(edge.to, candidate);
            own.prev.insert(edge.to, node);
            own.heap.push(FrontierEntry { dist: candidate, node: edge.to });
        }

        if let Some(&other_dist) = other.dist.get(&edge.to) {
            let total = candidate + other_dist;
            if total < *best_total {
                *best_total = total;
                *meeting = Some(edge.to);
            }
        }
    }
}

/// Walk forward predecessors from the meeting node back to the source,
/// then backward predecessors from the meeting node out to the target,
/// without duplicating the meeting node.
fn reconstruct(
    forward_prev: &HashMap<NodeId, NodeId>,
    backward_prev: &HashMap<NodeId, NodeId>,
    source: NodeId,
    meeting: NodeId,
) -> Vec<NodeId> {
    let mut path = Vec::new();
    let mut node = meeting;
    path.push(node);
    while node != source {
        match forward_prev.get(&node) {
            Some(&prev) => {
                node = prev;
                path.push(node);
            }
            None => break,
        }
    }
    path.reverse();

    let mut node = meeting;
    while let Some(&next) = backward_prev.get(&node) {
        path.push(next);
        node = next;
    }

    path
}
