//! Multi-criteria candidate scoring and selection.
//!
//! Candidates arrive sorted nearest-first by route distance. Only the
//! nearest few are scored at all: proximity-first triage deliberately
//! excludes a far facility no matter how well rated it is.

use crate::route::RouteResult;
use crate::traits::{FacilityRow, ReadinessTier};

/// Only the nearest this-many routed candidates are scored.
pub const MAX_SCORED_CANDIDATES: usize = 5;

const ROUTE_WEIGHT: f64 = 0.55;
const RATING_WEIGHT: f64 = 0.35;
const ICU_BONUS: f64 = 0.10;
const HIGH_READINESS_BONUS: f64 = 0.05;

/// One scored candidate; `index` refers to the caller's nearest-first
/// candidate order.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub index: usize,
    pub score: f64,
    pub distance_km: f64,
}

/// Composite score for a single candidate.
///
/// Distance dominates (0.55), then the star rating (0.35); ICU capability
/// and high readiness add small bonuses when the dataset carries those
/// columns at all.
pub fn score_candidate(row: &FacilityRow, distance_km: f64, rating: f64) -> f64 {
    let route_score = 1.0 / (distance_km + 0.1);
    let rating_score = rating / 5.0;

    let mut extra = 0.0;
    if let Some(extras) = &row.extras {
        if extras.icu_available {
            extra += ICU_BONUS;
        }
        if extras.readiness == ReadinessTier::High {
            extra += HIGH_READINESS_BONUS;
        }
    }

    ROUTE_WEIGHT * route_score + RATING_WEIGHT * rating_score + extra
}

/// Score the nearest candidates and return them ordered best-first.
///
/// `candidates` must already be sorted ascending by route distance.
/// The sort is stable, so equal scores keep the nearer candidate first.
pub fn rank(
    candidates: &[(FacilityRow, RouteResult)],
    rating_of: impl Fn(&str) -> f64,
) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .iter()
        .take(MAX_SCORED_CANDIDATES)
        .enumerate()
        .map(|(index, (row, route))| ScoredCandidate {
            index,
            score: score_candidate(row, route.distance_km(), rating_of(&row.name)),
            distance_km: route.distance_km(),
        })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored
}

/// Index of the winning candidate in nearest-first order.
///
/// Scans nearest-first and replaces the leader only on a strictly greater
/// score, so ties keep the nearer candidate. Returns `None` for an empty
/// candidate list.
pub fn select_best(
    candidates: &[(FacilityRow, RouteResult)],
    rating_of: impl Fn(&str) -> f64,
) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, (row, route)) in candidates.iter().take(MAX_SCORED_CANDIDATES).enumerate() {
        let score = score_candidate(row, route.distance_km(), rating_of(&row.name));
        let improves = match best {
            Some((_, best_score)) => score > best_score,
            None => true,
        };
        if improves {
            best = Some((index, score));
        }
    }
    best.map(|(index, _)| index)
}
