//! End-to-end dispatch tests
//!
//! Exercise handle_case across fast mode, routed mode, fallback, and the
//! output contract, with in-memory dataset and graph-provider mocks.

use ems_dispatch::cache::NetworkCache;
use ems_dispatch::dispatch::{DispatchError, DispatchMode, DispatchOptions, Dispatcher};
use ems_dispatch::geo::GeoPoint;
use ems_dispatch::graph::RoadNetworkGraph;
use ems_dispatch::ratings::{OutcomeKind, RatingStore};
use ems_dispatch::traits::{
    FacilityDataset, FacilityExtras, FacilityRow, GraphProvider, ReadinessTier, RouteError,
};

// ============================================================================
// Test Fixtures
// ============================================================================

/// Case location all tests dispatch from.
const CASE: GeoPoint = GeoPoint { lat: 13.0000, lon: 80.0000 };

/// Builder for dataset rows with sensible defaults.
#[derive(Clone)]
struct TestFacility {
    row: FacilityRow,
}

impl TestFacility {
    fn new(name: &str, lat: f64, lon: f64) -> Self {
        Self {
            row: FacilityRow {
                name: name.to_string(),
                category: "Hospital".to_string(),
                address: format!("{name} Street"),
                phone: "044-0000".to_string(),
                location: GeoPoint::new(lat, lon),
                extras: None,
            },
        }
    }

    fn extras(mut self, icu: bool, readiness: ReadinessTier) -> Self {
        self.row.extras = Some(FacilityExtras {
            emergency_24x7: true,
            icu_available: icu,
            readiness,
        });
        self
    }

    fn not_24x7(mut self) -> Self {
        self.row.extras = Some(FacilityExtras {
            emergency_24x7: false,
            icu_available: false,
            readiness: ReadinessTier::Medium,
        });
        self
    }
}

/// In-memory dataset provider.
struct TestDataset {
    rows: Vec<FacilityRow>,
}

impl TestDataset {
    fn new(facilities: Vec<TestFacility>) -> Self {
        Self {
            rows: facilities.into_iter().map(|f| f.row).collect(),
        }
    }
}

impl FacilityDataset for TestDataset {
    fn facilities_within(
        &self,
        _center: GeoPoint,
        _max_radius_km: f64,
        category: &str,
        require_24x7: bool,
    ) -> Vec<FacilityRow> {
        self.rows
            .iter()
            .filter(|row| row.category == category)
            .filter(|row| {
                !require_24x7 || row.extras.map_or(false, |extras| extras.emergency_24x7)
            })
            .cloned()
            .collect()
    }
}

/// Graph provider returning a fixed north-south corridor through the case
/// location, regardless of the requested center.
struct CorridorProvider;

impl GraphProvider for CorridorProvider {
    fn build_drive_network(
        &self,
        _center: GeoPoint,
        _radius_m: u32,
    ) -> Result<RoadNetworkGraph, RouteError> {
        let mut g = RoadNetworkGraph::new();
        // Nodes every 0.005 degrees of latitude from 12.99 to 13.03.
        for i in 0..9 {
            let lat = 12.99 + 0.005 * f64::from(i);
            g.add_node(i64::from(i), GeoPoint::new(lat, 80.0));
        }
        for i in 0..8u8 {
            let a = GeoPoint::new(12.99 + 0.005 * f64::from(i), 80.0);
            let b = GeoPoint::new(12.99 + 0.005 * f64::from(i + 1), 80.0);
            let length = ems_dispatch::geo::great_circle_m(a, b);
            g.add_edge(i64::from(i), i64::from(i + 1), length);
            g.add_edge(i64::from(i + 1), i64::from(i), length);
        }
        Ok(g)
    }
}

/// Graph provider that always fails (network outage).
struct OutageProvider;

impl GraphProvider for OutageProvider {
    fn build_drive_network(
        &self,
        _center: GeoPoint,
        _radius_m: u32,
    ) -> Result<RoadNetworkGraph, RouteError> {
        Err(RouteError::NetworkUnavailable("connection refused".to_string()))
    }
}

/// Graph provider returning two isolated nodes, so endpoints snap but no
/// path connects them.
struct DisconnectedProvider;

impl GraphProvider for DisconnectedProvider {
    fn build_drive_network(
        &self,
        _center: GeoPoint,
        _radius_m: u32,
    ) -> Result<RoadNetworkGraph, RouteError> {
        let mut g = RoadNetworkGraph::new();
        g.add_node(1, CASE);
        g.add_node(2, GeoPoint::new(13.02, 80.0));
        Ok(g)
    }
}

fn fast_opts() -> DispatchOptions {
    DispatchOptions {
        mode: DispatchMode::Fast,
        ..DispatchOptions::default()
    }
}

// ============================================================================
// Fast mode
// ============================================================================

#[test]
fn fast_mode_selects_nearest_facility() {
    let dataset = TestDataset::new(vec![
        TestFacility::new("Near", 13.01, 80.00),
        TestFacility::new("Far", 13.08, 80.00),
    ]);
    let cache = NetworkCache::new();
    let store = RatingStore::open_in_memory().unwrap();
    let dispatcher = Dispatcher::new(&cache, &store);

    let result = dispatcher
        .handle_case(CASE, &dataset, &CorridorProvider, &fast_opts())
        .unwrap();

    assert_eq!(result.selected_facility.name, "Near");
    assert_eq!(result.alternates.len(), 1);
    assert_eq!(result.alternates[0].name, "Far");
    // Fast mode routes are two-point straight lines.
    assert_eq!(result.route.coordinates.len(), 2);
    assert!(cache.is_empty(), "fast mode must not touch the network cache");
}

#[test]
fn fast_mode_equal_distance_tie_keeps_dataset_order() {
    // Same distance east and west of the case.
    let dataset = TestDataset::new(vec![
        TestFacility::new("First", 13.00, 80.02),
        TestFacility::new("Second", 13.00, 79.98),
    ]);
    let cache = NetworkCache::new();
    let store = RatingStore::open_in_memory().unwrap();
    let dispatcher = Dispatcher::new(&cache, &store);

    let result = dispatcher
        .handle_case(CASE, &dataset, &CorridorProvider, &fast_opts())
        .unwrap();
    assert_eq!(result.selected_facility.name, "First");
}

#[test]
fn radius_filter_excludes_distant_facilities() {
    let dataset = TestDataset::new(vec![
        TestFacility::new("InRange", 13.01, 80.00),
        // ~55 km north, well past the 15 km default radius.
        TestFacility::new("OutOfRange", 13.50, 80.00),
    ]);
    let cache = NetworkCache::new();
    let store = RatingStore::open_in_memory().unwrap();
    let dispatcher = Dispatcher::new(&cache, &store);

    let result = dispatcher
        .handle_case(CASE, &dataset, &CorridorProvider, &fast_opts())
        .unwrap();
    assert_eq!(result.selected_facility.name, "InRange");
    assert!(result.alternates.is_empty());
}

#[test]
fn empty_dataset_is_no_route_available() {
    let dataset = TestDataset::new(vec![]);
    let cache = NetworkCache::new();
    let store = RatingStore::open_in_memory().unwrap();
    let dispatcher = Dispatcher::new(&cache, &store);

    let err = dispatcher
        .handle_case(CASE, &dataset, &CorridorProvider, &fast_opts())
        .unwrap_err();
    assert!(matches!(err, DispatchError::NoRouteAvailable(_)));
}

#[test]
fn require_24x7_restricts_candidates() {
    let dataset = TestDataset::new(vec![
        TestFacility::new("DayClinic", 13.005, 80.00).not_24x7(),
        TestFacility::new("AllNight", 13.02, 80.00).extras(false, ReadinessTier::Medium),
    ]);
    let cache = NetworkCache::new();
    let store = RatingStore::open_in_memory().unwrap();
    let dispatcher = Dispatcher::new(&cache, &store);

    let opts = DispatchOptions {
        require_24x7: true,
        ..fast_opts()
    };
    let result = dispatcher
        .handle_case(CASE, &dataset, &CorridorProvider, &opts)
        .unwrap();
    assert_eq!(result.selected_facility.name, "AllNight");
}

// ============================================================================
// Routed mode
// ============================================================================

#[test]
fn routed_mode_uses_graph_distances() {
    let dataset = TestDataset::new(vec![TestFacility::new("Corridor North", 13.02, 80.00)]);
    let cache = NetworkCache::new();
    let store = RatingStore::open_in_memory().unwrap();
    let dispatcher = Dispatcher::new(&cache, &store);

    let result = dispatcher
        .handle_case(CASE, &dataset, &CorridorProvider, &DispatchOptions::default())
        .unwrap();

    // ~2.2 km along the corridor; the path geometry follows graph nodes.
    assert!(result.route.distance_km > 1.8 && result.route.distance_km < 2.6);
    assert!(result.route.coordinates.len() > 2);
    assert!(!cache.is_empty());
}

#[test]
fn network_outage_falls_back_to_straight_line() {
    let dataset = TestDataset::new(vec![TestFacility::new("Anywhere", 13.01, 80.00)]);
    let cache = NetworkCache::new();
    let store = RatingStore::open_in_memory().unwrap();
    let dispatcher = Dispatcher::new(&cache, &store);

    let result = dispatcher
        .handle_case(CASE, &dataset, &OutageProvider, &DispatchOptions::default())
        .unwrap();

    assert_eq!(result.route.coordinates.len(), 2);
    assert!(cache.is_empty(), "failed builds must not be cached");
}

#[test]
fn disconnected_graph_yields_no_route_with_diagnostics() {
    let dataset = TestDataset::new(vec![
        TestFacility::new("Island A", 13.02, 80.00),
        TestFacility::new("Island B", 13.015, 80.00),
    ]);
    let cache = NetworkCache::new();
    let store = RatingStore::open_in_memory().unwrap();
    let dispatcher = Dispatcher::new(&cache, &store);

    let err = dispatcher
        .handle_case(CASE, &dataset, &DisconnectedProvider, &DispatchOptions::default())
        .unwrap_err();

    let DispatchError::NoRouteAvailable(diagnostics) = err;
    assert_eq!(diagnostics.len(), 2);
    assert!(diagnostics
        .iter()
        .all(|d| matches!(d.error, RouteError::NoPathFound)));
}

// ============================================================================
// Ratings integration
// ============================================================================

#[test]
fn dispatch_auto_registers_unseen_facilities() {
    let dataset = TestDataset::new(vec![TestFacility::new("Fresh Hospital", 13.01, 80.00)]);
    let cache = NetworkCache::new();
    let store = RatingStore::open_in_memory().unwrap();
    let dispatcher = Dispatcher::new(&cache, &store);

    assert!(store.get_rating("Fresh Hospital").unwrap().is_none());
    dispatcher
        .handle_case(CASE, &dataset, &CorridorProvider, &fast_opts())
        .unwrap();

    let view = store.get_rating("Fresh Hospital").unwrap().unwrap();
    assert_eq!(view.current_rating, 2.5);
    assert_eq!(view.total_cases, 0);
}

#[test]
fn strong_track_record_outweighs_short_distance_gap() {
    let dataset = TestDataset::new(vec![
        TestFacility::new("Near Mediocre", 13.036, 80.00),
        TestFacility::new("Proven", 13.040, 80.00),
    ]);
    let cache = NetworkCache::new();
    let store = RatingStore::open_in_memory().unwrap();

    // Give "Proven" a 5.0-star history; drag "Near Mediocre" to the floor.
    for i in 0..4 {
        store
            .record_outcome("Proven", &format!("p{i}"), OutcomeKind::Successful, 100.0, 0.0, "")
            .unwrap();
        store
            .record_outcome(
                "Near Mediocre",
                &format!("m{i}"),
                OutcomeKind::Unsuccessful,
                0.0,
                180.0,
                "",
            )
            .unwrap();
    }

    let dispatcher = Dispatcher::new(&cache, &store);
    let result = dispatcher
        .handle_case(CASE, &dataset, &CorridorProvider, &fast_opts())
        .unwrap();

    assert_eq!(result.selected_facility.name, "Proven");
    assert_eq!(result.selected_facility.current_rating, 5.0);
    // The nearer loser is still the first alternate (distance order).
    assert_eq!(result.alternates[0].name, "Near Mediocre");
}

// ============================================================================
// Output contract
// ============================================================================

#[test]
fn dispatch_result_matches_json_contract() {
    let dataset = TestDataset::new(vec![
        TestFacility::new("Winner", 13.01, 80.00),
        TestFacility::new("Backup One", 13.02, 80.00),
        TestFacility::new("Backup Two", 13.03, 80.00),
    ]);
    let cache = NetworkCache::new();
    let store = RatingStore::open_in_memory().unwrap();
    let dispatcher = Dispatcher::new(&cache, &store);

    let opts = DispatchOptions {
        case_id: Some("case_20260826_101500".to_string()),
        ..fast_opts()
    };
    let result = dispatcher
        .handle_case(CASE, &dataset, &CorridorProvider, &opts)
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();

    assert_eq!(value["caseId"], "case_20260826_101500");
    assert_eq!(value["accidentLocation"]["lat"], 13.0);
    assert_eq!(value["accidentLocation"]["lon"], 80.0);
    assert_eq!(value["selectedFacility"]["name"], "Winner");
    assert!(value["selectedFacility"]["currentRating"].is_number());
    assert!(value["selectedFacility"]["totalCases"].is_number());
    assert!(value["route"]["distanceKm"].is_number());
    assert!(value["route"]["distanceMeters"].is_number());
    assert!(value["route"]["coordinates"].is_array());
    let alternates = value["alternates"].as_array().unwrap();
    assert_eq!(alternates.len(), 2);
    assert_eq!(alternates[0]["name"], "Backup One");
    assert_eq!(alternates[1]["name"], "Backup Two");
    assert!(value["timestamp"].is_string());
    assert!(value.get("diagnostics").is_none(), "diagnostics are not exported");
}

#[test]
fn default_case_id_is_timestamp_derived() {
    let dataset = TestDataset::new(vec![TestFacility::new("Solo", 13.01, 80.00)]);
    let cache = NetworkCache::new();
    let store = RatingStore::open_in_memory().unwrap();
    let dispatcher = Dispatcher::new(&cache, &store);

    let result = dispatcher
        .handle_case(CASE, &dataset, &CorridorProvider, &fast_opts())
        .unwrap();
    assert!(result.case_id.starts_with("case_"));
    // case_YYYYMMDD_HHMMSS
    assert_eq!(result.case_id.len(), "case_".len() + 15);
}
