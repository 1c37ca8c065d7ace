//! Route computation results.
//!
//! Produced fresh per request by the orchestrator; only the underlying
//! road networks are cached, never these.

use serde::Serialize;

use crate::geo::GeoPoint;
use crate::graph::NodeId;

/// How a route's distance was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteMode {
    /// Shortest path over the drivable road network.
    Graph,
    /// Haversine estimate; used in fast mode and as the network-failure
    /// fallback.
    StraightLine,
}

/// A computed route from a facility to the case location.
#[derive(Debug, Clone, Serialize)]
pub struct RouteResult {
    /// Graph node sequence; empty for straight-line routes.
    pub path_nodes: Vec<NodeId>,
    /// Ordered route geometry, facility first.
    pub coordinates: Vec<GeoPoint>,
    pub distance_m: f64,
    pub mode: RouteMode,
}

impl RouteResult {
    /// Two-point straight-line route between `from` and `to`.
    pub fn straight_line(from: GeoPoint, to: GeoPoint, distance_m: f64) -> Self {
        Self {
            path_nodes: Vec::new(),
            coordinates: vec![from, to],
            distance_m,
            mode: RouteMode::StraightLine,
        }
    }

    pub fn distance_km(&self) -> f64 {
        self.distance_m / 1000.0
    }
}
