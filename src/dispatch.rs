//! Case dispatch orchestration.
//!
//! Composes the dataset provider, network cache, pathfinder, ranker and
//! rating ledger into a single "assign the best facility to this case"
//! operation. Per-candidate routing is independent work and runs in
//! parallel; the network cache is the only shared read.

use chrono::Utc;
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::cache::NetworkCache;
use crate::geo::{self, GeoPoint};
use crate::pathfinder;
use crate::ranker;
use crate::ratings::{DEFAULT_RATING, RatingStore};
use crate::route::{RouteMode, RouteResult};
use crate::traits::{FacilityDataset, FacilityRow, GraphProvider, RouteError};

/// Routing strategy for a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Straight-line estimation only; no network fetch.
    Fast,
    /// Road-network shortest paths, falling back to straight-line per
    /// candidate when the network is unavailable.
    Routed,
}

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub mode: DispatchMode,
    /// Number of nearest candidates carried into routing and ranking.
    pub max_candidates: usize,
    pub max_radius_km: f64,
    /// Restrict to facilities flagged as 24x7-capable.
    pub require_24x7: bool,
    /// Dataset category to dispatch to.
    pub category: String,
    /// Radius of the road network fetched around each candidate pair.
    pub network_radius_m: u32,
    /// Caller-supplied case identifier; derived from the clock if absent.
    pub case_id: Option<String>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            mode: DispatchMode::Routed,
            max_candidates: 5,
            max_radius_km: 15.0,
            require_24x7: false,
            category: "Hospital".to_string(),
            network_radius_m: 5000,
            case_id: None,
        }
    }
}

/// A candidate that could not be routed, kept for diagnostics.
#[derive(Debug, Clone)]
pub struct RoutingDiagnostic {
    pub facility_name: String,
    pub error: RouteError,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// No candidate routed successfully; the per-candidate failures are
    /// attached for the caller.
    #[error("no candidate facility could be routed")]
    NoRouteAvailable(Vec<RoutingDiagnostic>),
}

/// The assigned facility, as reported to collaborators.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedFacility {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub lat: f64,
    pub lon: f64,
    pub current_rating: f64,
    pub total_cases: u32,
}

/// Winning route summary in the output contract's shape.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteInfo {
    pub distance_km: f64,
    pub distance_meters: f64,
    pub coordinates: Vec<GeoPoint>,
}

/// A near-miss candidate surfaced alongside the winner.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alternate {
    pub name: String,
    pub distance_km: f64,
    pub current_rating: f64,
}

/// Outcome of a successful dispatch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    pub case_id: String,
    pub accident_location: GeoPoint,
    pub selected_facility: SelectedFacility,
    pub route: RouteInfo,
    /// Next two routed candidates in nearest-first order, excluding the
    /// winner. Ordered by distance, not score: genuinely closer backups
    /// are surfaced even if they scored lower.
    pub alternates: Vec<Alternate>,
    pub timestamp: String,
    /// Candidates dropped because routing failed.
    #[serde(skip)]
    pub diagnostics: Vec<RoutingDiagnostic>,
}

impl DispatchResult {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Dispatch orchestrator over explicit cache and ledger instances.
///
/// No global state: independent dispatchers with independent caches and
/// stores can coexist in one process.
pub struct Dispatcher<'a> {
    cache: &'a NetworkCache,
    store: &'a RatingStore,
}

impl<'a> Dispatcher<'a> {
    pub fn new(cache: &'a NetworkCache, store: &'a RatingStore) -> Self {
        Self { cache, store }
    }

    /// Assign the best-suited facility to a case at `location`.
    pub fn handle_case<D, P>(
        &self,
        location: GeoPoint,
        dataset: &D,
        graph_provider: &P,
        opts: &DispatchOptions,
    ) -> Result<DispatchResult, DispatchError>
    where
        D: FacilityDataset,
        P: GraphProvider + Sync,
    {
        let case_id = opts
            .case_id
            .clone()
            .unwrap_or_else(|| format!("case_{}", Utc::now().format("%Y%m%d_%H%M%S")));

        let rows = dataset.facilities_within(
            location,
            opts.max_radius_km,
            &opts.category,
            opts.require_24x7,
        );

        // Straight-line pre-filter: bound the candidate set before any
        // routing work, nearest first.
        let mut prefiltered: Vec<(FacilityRow, f64)> = rows
            .into_iter()
            .filter(|row| row.location.is_valid())
            .map(|row| {
                let straight_km = geo::great_circle_km(location, row.location);
                (row, straight_km)
            })
            .filter(|(_, straight_km)| *straight_km <= opts.max_radius_km)
            .collect();
        prefiltered.sort_by(|a, b| a.1.total_cmp(&b.1));
        prefiltered.truncate(opts.max_candidates.max(1));

        let outcomes: Vec<(FacilityRow, Result<RouteResult, RouteError>)> = prefiltered
            .into_par_iter()
            .map(|(row, _)| {
                let route = self.route_candidate(location, &row, graph_provider, opts);
                (row, route)
            })
            .collect();

        let mut routed: Vec<(FacilityRow, RouteResult)> = Vec::new();
        let mut diagnostics = Vec::new();
        for (row, outcome) in outcomes {
            match outcome {
                Ok(route) => routed.push((row, route)),
                Err(error) => {
                    warn!(facility = %row.name, %error, "candidate excluded: routing failed");
                    diagnostics.push(RoutingDiagnostic { facility_name: row.name, error });
                }
            }
        }

        routed.sort_by(|a, b| a.1.distance_m.total_cmp(&b.1.distance_m));
        if routed.is_empty() {
            return Err(DispatchError::NoRouteAvailable(diagnostics));
        }

        // A ledger hiccup must not kill an active dispatch; unseen
        // facilities just rank with the default rating.
        for (row, _) in &routed {
            if let Err(error) =
                self.store
                    .register(&row.name, &row.address, Some(row.location), &row.phone)
            {
                warn!(facility = %row.name, %error, "facility registration failed");
            }
        }

        let rating_of = |name: &str| {
            self.store
                .current_rating(name)
                .ok()
                .flatten()
                .unwrap_or(DEFAULT_RATING)
        };

        let winner = ranker::select_best(&routed, rating_of)
            .unwrap_or(0);
        let alternates = routed
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != winner)
            .take(2)
            .map(|(_, (row, route))| Alternate {
                name: row.name.clone(),
                distance_km: route.distance_km(),
                current_rating: rating_of(&row.name),
            })
            .collect();

        let (winner_row, winner_route) = &routed[winner];
        let (current_rating, total_cases) = match self.store.get_rating(&winner_row.name) {
            Ok(Some(view)) => (view.current_rating, view.total_cases),
            _ => (DEFAULT_RATING, 0),
        };

        info!(
            case_id = %case_id,
            facility = %winner_row.name,
            distance_km = winner_route.distance_km(),
            mode = ?winner_route.mode,
            "facility assigned"
        );

        Ok(DispatchResult {
            case_id,
            accident_location: location,
            selected_facility: SelectedFacility {
                name: winner_row.name.clone(),
                address: winner_row.address.clone(),
                phone: winner_row.phone.clone(),
                lat: winner_row.location.lat,
                lon: winner_row.location.lon,
                current_rating,
                total_cases,
            },
            route: RouteInfo {
                distance_km: winner_route.distance_km(),
                distance_meters: winner_route.distance_m,
                coordinates: winner_route.coordinates.clone(),
            },
            alternates,
            timestamp: Utc::now().to_rfc3339(),
            diagnostics,
        })
    }

    /// Route one candidate from the facility to the case location.
    fn route_candidate<P: GraphProvider>(
        &self,
        case: GeoPoint,
        row: &FacilityRow,
        graph_provider: &P,
        opts: &DispatchOptions,
    ) -> Result<RouteResult, RouteError> {
        if opts.mode == DispatchMode::Fast {
            return Ok(straight_route(row.location, case));
        }

        let center = row.location.midpoint(&case);
        let graph = match self.cache.get_or_build(graph_provider, center, opts.network_radius_m) {
            Ok(graph) => graph,
            Err(RouteError::NetworkUnavailable(cause)) => {
                warn!(facility = %row.name, %cause, "network unavailable, using straight-line fallback");
                return Ok(straight_route(row.location, case));
            }
            Err(other) => return Err(other),
        };

        let facility_node = graph
            .nearest_node(row.location)
            .ok_or_else(|| RouteError::NodeLookup("empty road network".to_string()))?;
        let case_node = graph
            .nearest_node(case)
            .ok_or_else(|| RouteError::NodeLookup("empty road network".to_string()))?;

        let (path_nodes, distance_m) = pathfinder::shortest_path(&graph, facility_node, case_node)?;
        let coordinates = path_nodes
            .iter()
            .filter_map(|id| graph.node_location(*id))
            .collect();

        Ok(RouteResult {
            path_nodes,
            coordinates,
            distance_m,
            mode: RouteMode::Graph,
        })
    }
}

fn straight_route(from: GeoPoint, to: GeoPoint) -> RouteResult {
    RouteResult::straight_line(from, to, geo::great_circle_m(from, to))
}
