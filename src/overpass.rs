//! Overpass HTTP adapter for drive-network graphs.
//!
//! Fetches highway ways around a center point and assembles them into a
//! [`RoadNetworkGraph`]. Any transport or decode failure surfaces as
//! [`RouteError::NetworkUnavailable`] so callers can fall back to
//! straight-line estimation.

use serde::Deserialize;

use crate::geo::{self, GeoPoint};
use crate::graph::RoadNetworkGraph;
use crate::traits::{GraphProvider, RouteError};

#[derive(Debug, Clone)]
pub struct OverpassConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for OverpassConfig {
    fn default() -> Self {
        Self {
            base_url: "https://overpass-api.de/api/interpreter".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OverpassClient {
    config: OverpassConfig,
    client: reqwest::blocking::Client,
}

impl OverpassClient {
    pub fn new(config: OverpassConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn drive_query(center: GeoPoint, radius_m: u32) -> String {
        format!(
            "[out:json];(way[\"highway\"](around:{},{:.6},{:.6});>;);out body;",
            radius_m, center.lat, center.lon
        )
    }
}

impl GraphProvider for OverpassClient {
    fn build_drive_network(
        &self,
        center: GeoPoint,
        radius_m: u32,
    ) -> Result<RoadNetworkGraph, RouteError> {
        let response = self
            .client
            .post(&self.config.base_url)
            .body(Self::drive_query(center, radius_m))
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<OverpassResponse>())
            .map_err(|err| RouteError::NetworkUnavailable(err.to_string()))?;

        Ok(assemble_graph(response))
    }
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum OverpassElement {
    Node {
        id: i64,
        lat: f64,
        lon: f64,
    },
    Way {
        nodes: Vec<i64>,
        #[serde(default)]
        tags: WayTags,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct WayTags {
    oneway: Option<String>,
}

impl WayTags {
    /// Overpass oneway semantics: "yes"-like values restrict travel to the
    /// way's direction, "-1" reverses it, anything else is two-way.
    fn direction(&self) -> WayDirection {
        match self.oneway.as_deref() {
            Some("yes") | Some("true") | Some("1") => WayDirection::Forward,
            Some("-1") => WayDirection::Reverse,
            _ => WayDirection::Both,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WayDirection {
    Forward,
    Reverse,
    Both,
}

fn assemble_graph(response: OverpassResponse) -> RoadNetworkGraph {
    let mut graph = RoadNetworkGraph::new();

    for element in &response.elements {
        if let OverpassElement::Node { id, lat, lon } = element {
            let point = GeoPoint::new(*lat, *lon);
            if point.is_valid() {
                graph.add_node(*id, point);
            }
        }
    }

    for element in &response.elements {
        let OverpassElement::Way { nodes, tags } = element else {
            continue;
        };
        let direction = tags.direction();
        for pair in nodes.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            let (Some(a), Some(b)) = (graph.node_location(from), graph.node_location(to)) else {
                continue;
            };
            let length_m = geo::great_circle_m(a, b);
            match direction {
                WayDirection::Forward => graph.add_edge(from, to, length_m),
                WayDirection::Reverse => graph.add_edge(to, from, length_m),
                WayDirection::Both => {
                    graph.add_edge(from, to, length_m);
                    graph.add_edge(to, from, length_m);
                }
            }
        }
    }

    graph
}
