//! Collaborator traits for the dispatch core.
//!
//! These are intentionally minimal. Concrete apps implement them for their
//! own data sources (CSV, database, HTTP); tests use in-memory mocks.

use thiserror::Error;

use crate::geo::GeoPoint;
use crate::graph::RoadNetworkGraph;

/// Routing-level failures.
#[derive(Debug, Clone, Error)]
pub enum RouteError {
    /// Graph provider could not deliver a network (HTTP failure, timeout,
    /// malformed response). Recoverable: callers fall back to
    /// straight-line estimation.
    #[error("road network unavailable: {0}")]
    NetworkUnavailable(String),

    /// The graph holds no connecting path between the two endpoints.
    #[error("no path found between nodes")]
    NoPathFound,

    /// An endpoint could not be snapped to a graph node.
    #[error("could not locate node: {0}")]
    NodeLookup(String),
}

/// Builds a drivable road network around a center point.
///
/// Implementations must surface network/timeout failures as
/// [`RouteError::NetworkUnavailable`]; "no route" is never the provider's
/// verdict, it belongs to the pathfinder.
pub trait GraphProvider {
    fn build_drive_network(
        &self,
        center: GeoPoint,
        radius_m: u32,
    ) -> Result<RoadNetworkGraph, RouteError>;
}

/// Coarse emergency-responsiveness signal carried by richer datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessTier {
    High,
    Medium,
    Low,
}

/// Optional dataset columns (ICU availability, readiness) that may or may
/// not exist in a given source. Presence is a typed flag, not a column
/// probe: scoring applies the bonuses only when extras are carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FacilityExtras {
    pub emergency_24x7: bool,
    pub icu_available: bool,
    pub readiness: ReadinessTier,
}

/// One facility row as delivered by a dataset provider.
#[derive(Debug, Clone)]
pub struct FacilityRow {
    pub name: String,
    pub category: String,
    pub address: String,
    pub phone: String,
    pub location: GeoPoint,
    pub extras: Option<FacilityExtras>,
}

/// Supplies candidate facilities near a point.
///
/// Implementations handle category filtering and the optional 24x7
/// restriction; the orchestrator still applies its own straight-line
/// radius pre-filter on top.
pub trait FacilityDataset {
    fn facilities_within(
        &self,
        center: GeoPoint,
        max_radius_km: f64,
        category: &str,
        require_24x7: bool,
    ) -> Vec<FacilityRow>;
}
