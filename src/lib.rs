//! ems-dispatch core
//!
//! Assigns an emergency case to the best-suited facility: road-network
//! shortest paths (bidirectional Dijkstra) over cached area graphs,
//! multi-criteria candidate ranking, and an audited facility-performance
//! rating ledger. Inputs (case coordinates, facility datasets, road
//! networks) arrive through collaborator traits.

pub mod cache;
pub mod dispatch;
pub mod geo;
pub mod graph;
pub mod overpass;
pub mod pathfinder;
pub mod ranker;
pub mod ratings;
pub mod route;
pub mod traits;
