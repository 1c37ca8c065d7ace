//! Memoized road-network graphs, keyed by area.
//!
//! Building a network is a slow external fetch; dispatching repeatedly in
//! the same area must not refetch. Entries are immutable once inserted and
//! handed out as shared references. The cache is bounded: least-recently
//! used entries are evicted once capacity is reached, so a long-lived
//! process does not accumulate graphs without limit.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::geo::GeoPoint;
use crate::graph::RoadNetworkGraph;
use crate::traits::{GraphProvider, RouteError};

/// Default maximum number of cached area graphs.
pub const DEFAULT_CAPACITY: usize = 32;

struct CacheEntry {
    graph: Arc<RoadNetworkGraph>,
    last_used: u64,
}

/// Bounded LRU cache of per-area road networks.
///
/// Safe for concurrent use: lookups and insertions synchronize on an
/// internal lock, and the graphs themselves are read-only after insertion.
pub struct NetworkCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    capacity: usize,
    ticks: Mutex<u64>,
}

impl NetworkCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Capacity below 1 is treated as 1.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            ticks: Mutex::new(0),
        }
    }

    /// Return the cached graph for this area, or build it via `provider`.
    ///
    /// Provider failures (including timeouts) are returned as
    /// [`RouteError::NetworkUnavailable`] and never cached; only complete
    /// graphs enter the cache.
    pub fn get_or_build<P: GraphProvider>(
        &self,
        provider: &P,
        center: GeoPoint,
        radius_m: u32,
    ) -> Result<Arc<RoadNetworkGraph>, RouteError> {
        let key = cache_key(center, radius_m);

        if let Some(graph) = self.touch(&key) {
            debug!(key = %key, "road network cache hit");
            return Ok(graph);
        }

        debug!(key = %key, radius_m, "road network cache miss, building");
        let graph = match provider.build_drive_network(center, radius_m) {
            Ok(graph) => Arc::new(graph),
            Err(err) => {
                warn!(key = %key, error = %err, "road network build failed");
                return Err(err);
            }
        };

        debug!(
            key = %key,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "road network built"
        );
        self.insert(key, Arc::clone(&graph));
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn tick(&self) -> u64 {
        let mut ticks = self.ticks.lock();
        *ticks += 1;
        *ticks
    }

    fn touch(&self, key: &str) -> Option<Arc<RoadNetworkGraph>> {
        let stamp = self.tick();
        let mut entries = self.entries.lock();
        entries.get_mut(key).map(|entry| {
            entry.last_used = stamp;
            Arc::clone(&entry.graph)
        })
    }

    fn insert(&self, key: String, graph: Arc<RoadNetworkGraph>) {
        let stamp = self.tick();
        let mut entries = self.entries.lock();
        entries.insert(key, CacheEntry { graph, last_used: stamp });

        while entries.len() > self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    debug!(key = %key, "evicting least-recently-used road network");
                    entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

impl Default for NetworkCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Area key: center rounded to 4 decimal places plus the radius.
fn cache_key(center: GeoPoint, radius_m: u32) -> String {
    format!("{:.4}_{:.4}_{}", center.lat, center.lon, radius_m)
}
