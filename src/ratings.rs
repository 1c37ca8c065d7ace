//! Facility performance ledger with derived star ratings.
//!
//! A durable SQLite-backed store keyed by facility name. Outcome records
//! are append-only; the current rating is recomputed from the full history
//! on every report, and significant changes are written to an audit table.
//! Mutations run as single transactions serialized through the connection
//! lock, so concurrent reports never lose counter updates.

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use tracing::{debug, info};

use crate::geo::GeoPoint;

/// Rating assigned to a facility before any outcome is recorded.
pub const DEFAULT_RATING: f64 = 2.5;

/// Minimum rating delta that triggers an audit record for automatic
/// recomputation. Manual overrides are always audited.
const AUDIT_THRESHOLD: f64 = 0.1;

pub type FacilityId = i64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persistence failure: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Outcome of a dispatched case, as reported after resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Successful,
    Partial,
    Unsuccessful,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Successful => "successful",
            Self::Partial => "partial",
            Self::Unsuccessful => "unsuccessful",
        }
    }
}

/// Read-only aggregate view of one facility's performance.
#[derive(Debug, Clone)]
pub struct FacilityAggregate {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub current_rating: f64,
    pub total_cases: u32,
    pub successful_outcomes: u32,
    pub success_rate_percent: f64,
    pub average_quality_score: f64,
    pub average_response_time_minutes: f64,
}

/// One entry of the rating audit trail.
#[derive(Debug, Clone)]
pub struct RatingChange {
    pub old_rating: f64,
    pub new_rating: f64,
    pub reason: String,
    pub created_at: String,
}

/// Durable facility rating ledger.
pub struct RatingStore {
    conn: Mutex<Connection>,
}

impl RatingStore {
    /// Open (and initialize if needed) a ledger at `path`.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    /// In-memory ledger, used by tests and short-lived tools.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS facilities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL,
                address TEXT NOT NULL DEFAULT '',
                phone TEXT NOT NULL DEFAULT '',
                latitude REAL,
                longitude REAL,
                current_rating REAL NOT NULL DEFAULT 2.5,
                total_cases INTEGER NOT NULL DEFAULT 0,
                successful_outcomes INTEGER NOT NULL DEFAULT 0,
                total_response_minutes REAL NOT NULL DEFAULT 0.0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS outcome_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                facility_id INTEGER NOT NULL REFERENCES facilities(id),
                case_id TEXT NOT NULL,
                outcome TEXT NOT NULL,
                quality_score REAL NOT NULL,
                response_minutes REAL NOT NULL,
                notes TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS rating_changes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                facility_id INTEGER NOT NULL REFERENCES facilities(id),
                old_rating REAL NOT NULL,
                new_rating REAL NOT NULL,
                reason TEXT NOT NULL,
                created_at TEXT NOT NULL
            );",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Register a facility by name. Idempotent: an existing facility keeps
    /// its id, rating, and counters untouched.
    pub fn register(
        &self,
        name: &str,
        address: &str,
        location: Option<GeoPoint>,
        phone: &str,
    ) -> Result<FacilityId, StoreError> {
        let conn = self.conn.lock();
        register_in(&conn, name, address, location, phone)
    }

    /// Record one case outcome for a facility, auto-registering by name if
    /// unseen, then update counters and recompute the rating. The whole
    /// report commits or rolls back as one transaction.
    pub fn record_outcome(
        &self,
        name: &str,
        case_id: &str,
        outcome: OutcomeKind,
        quality_score: f64,
        response_minutes: f64,
        notes: &str,
    ) -> Result<(), StoreError> {
        let quality_score = quality_score.clamp(0.0, 100.0);
        let response_minutes = response_minutes.max(0.0);
        let now = Utc::now().to_rfc3339();

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let facility_id = register_in(&tx, name, "", None, "")?;

        tx.execute(
            "INSERT INTO outcome_records
                (facility_id, case_id, outcome, quality_score, response_minutes, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                facility_id,
                case_id,
                outcome.as_str(),
                quality_score,
                response_minutes,
                notes,
                now
            ],
        )?;

        let successful = i64::from(outcome == OutcomeKind::Successful);
        tx.execute(
            "UPDATE facilities
             SET total_cases = total_cases + 1,
                 successful_outcomes = successful_outcomes + ?1,
                 total_response_minutes = total_response_minutes + ?2,
                 updated_at = ?3
             WHERE id = ?4",
            params![successful, response_minutes, now, facility_id],
        )?;

        recompute_rating(&tx, facility_id, &now)?;

        tx.commit()?;
        Ok(())
    }

    /// Aggregate view for one facility, `None` if the name is unknown.
    pub fn get_rating(&self, name: &str) -> Result<Option<FacilityAggregate>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, name, address, phone, current_rating, total_cases,
                        successful_outcomes, total_response_minutes
                 FROM facilities WHERE name = ?1",
                params![name],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, f64>(4)?,
                        row.get::<_, u32>(5)?,
                        row.get::<_, u32>(6)?,
                        row.get::<_, f64>(7)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, name, address, phone, rating, cases, successful, total_minutes)) = row else {
            return Ok(None);
        };

        let avg_quality: Option<f64> = conn.query_row(
            "SELECT AVG(quality_score) FROM outcome_records WHERE facility_id = ?1",
            params![id],
            |row| row.get(0),
        )?;

        Ok(Some(aggregate(
            name,
            address,
            phone,
            rating,
            cases,
            successful,
            total_minutes,
            avg_quality.unwrap_or(0.0),
        )))
    }

    /// Current rating only; `None` for unknown facilities.
    pub fn current_rating(&self, name: &str) -> Result<Option<f64>, StoreError> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                "SELECT current_rating FROM facilities WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Proven facilities ranked best-first: rating descending, then case
    /// volume descending. Facilities with no recorded cases are excluded.
    pub fn get_top(&self, limit: u32) -> Result<Vec<FacilityAggregate>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT f.name, f.address, f.phone, f.current_rating, f.total_cases,
                    f.successful_outcomes, f.total_response_minutes,
                    (SELECT AVG(quality_score) FROM outcome_records WHERE facility_id = f.id)
             FROM facilities f
             WHERE f.total_cases > 0
             ORDER BY f.current_rating DESC, f.total_cases DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit], |row| {
            Ok(aggregate(
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get::<_, Option<f64>>(7)?.unwrap_or(0.0),
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Administrative rating override. Always audited, regardless of the
    /// change magnitude. Returns `false` for an unknown facility.
    pub fn manual_override(
        &self,
        name: &str,
        new_rating: f64,
        reason: &str,
    ) -> Result<bool, StoreError> {
        let new_rating = round_half_star(new_rating.clamp(0.0, 5.0));
        let now = Utc::now().to_rfc3339();

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let row: Option<(i64, f64)> = tx
            .query_row(
                "SELECT id, current_rating FROM facilities WHERE name = ?1",
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((facility_id, old_rating)) = row else {
            return Ok(false);
        };

        tx.execute(
            "UPDATE facilities SET current_rating = ?1, updated_at = ?2 WHERE id = ?3",
            params![new_rating, now, facility_id],
        )?;
        let reason = if reason.is_empty() { "Manual update" } else { reason };
        tx.execute(
            "INSERT INTO rating_changes (facility_id, old_rating, new_rating, reason, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![facility_id, old_rating, new_rating, reason, now],
        )?;

        tx.commit()?;
        info!(facility = name, old_rating, new_rating, "manual rating override");
        Ok(true)
    }

    /// Most recent audit entries for a facility, newest first.
    pub fn rating_history(&self, name: &str, limit: u32) -> Result<Vec<RatingChange>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT c.old_rating, c.new_rating, c.reason, c.created_at
             FROM rating_changes c
             JOIN facilities f ON f.id = c.facility_id
             WHERE f.name = ?1
             ORDER BY c.id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![name, limit], |row| {
            Ok(RatingChange {
                old_rating: row.get(0)?,
                new_rating: row.get(1)?,
                reason: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn register_in(
    conn: &Connection,
    name: &str,
    address: &str,
    location: Option<GeoPoint>,
    phone: &str,
) -> Result<FacilityId, StoreError> {
    let now = Utc::now().to_rfc3339();
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO facilities
            (name, address, phone, latitude, longitude, current_rating, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            name,
            address,
            phone,
            location.map(|p| p.lat),
            location.map(|p| p.lon),
            DEFAULT_RATING,
            now
        ],
    )?;
    if inserted > 0 {
        debug!(facility = name, "registered new facility");
    }

    Ok(conn.query_row(
        "SELECT id FROM facilities WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )?)
}

/// Recompute the star rating from the facility's full outcome history and
/// write an audit record when the change is significant.
fn recompute_rating(conn: &Connection, facility_id: FacilityId, now: &str) -> Result<(), StoreError> {
    let (name, total_cases, successful, total_minutes, old_rating): (String, u32, u32, f64, f64) =
        conn.query_row(
            "SELECT name, total_cases, successful_outcomes, total_response_minutes, current_rating
             FROM facilities WHERE id = ?1",
            params![facility_id],
            |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            },
        )?;

    let avg_quality: Option<f64> = conn.query_row(
        "SELECT AVG(quality_score) FROM outcome_records WHERE facility_id = ?1",
        params![facility_id],
        |row| row.get(0),
    )?;
    let avg_quality = avg_quality.unwrap_or(50.0);
    let avg_response = if total_cases > 0 {
        total_minutes / f64::from(total_cases)
    } else {
        60.0
    };

    let new_rating = compute_rating(total_cases, successful, avg_quality, avg_response);

    conn.execute(
        "UPDATE facilities SET current_rating = ?1 WHERE id = ?2",
        params![new_rating, facility_id],
    )?;

    if (new_rating - old_rating).abs() >= AUDIT_THRESHOLD {
        let reason = format!(
            "Updated based on {total_cases} cases: {successful} successful, \
             avg quality {avg_quality:.1}, avg response {avg_response:.1} min"
        );
        conn.execute(
            "INSERT INTO rating_changes (facility_id, old_rating, new_rating, reason, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![facility_id, old_rating, new_rating, reason, now],
        )?;
        info!(facility = %name, old_rating, new_rating, "facility rating changed");
    }

    Ok(())
}

/// Star rating from aggregate performance: 40% success rate, 35% treatment
/// quality, 25% response speed, scaled to 0..5 and rounded to a half star.
pub fn compute_rating(
    total_cases: u32,
    successful_outcomes: u32,
    avg_quality: f64,
    avg_response_minutes: f64,
) -> f64 {
    if total_cases == 0 {
        return DEFAULT_RATING;
    }

    let success_rate = f64::from(successful_outcomes) / f64::from(total_cases);
    // 60 minutes is treated as the reference response time.
    let response_score = (100.0 - (avg_response_minutes / 60.0) * 50.0).clamp(0.0, 100.0);
    let overall = success_rate * 0.40 + (avg_quality / 100.0) * 0.35 + (response_score / 100.0) * 0.25;

    round_half_star(overall * 5.0)
}

fn round_half_star(rating: f64) -> f64 {
    (rating * 2.0).round() / 2.0
}

fn aggregate(
    name: String,
    address: String,
    phone: String,
    current_rating: f64,
    total_cases: u32,
    successful_outcomes: u32,
    total_response_minutes: f64,
    average_quality_score: f64,
) -> FacilityAggregate {
    let (success_rate_percent, average_response_time_minutes) = if total_cases > 0 {
        (
            f64::from(successful_outcomes) / f64::from(total_cases) * 100.0,
            total_response_minutes / f64::from(total_cases),
        )
    } else {
        (0.0, 0.0)
    };
    FacilityAggregate {
        name,
        address,
        phone,
        current_rating,
        total_cases,
        successful_outcomes,
        success_rate_percent,
        average_quality_score,
        average_response_time_minutes,
    }
}
