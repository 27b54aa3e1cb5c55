//! libSQL backend: async `ProfileStore` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::profile::{CityCount, ProfilePatch, ProfileStats, UserProfile, normalize_city};
use crate::store::migrations;
use crate::store::traits::{AccrualCandidate, ProfileStore};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    // Try RFC 3339 first (our canonical write format)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

/// Decode a JSON array column; malformed values read as absent.
fn parse_tags(s: Option<String>) -> Option<Vec<String>> {
    s.and_then(|raw| serde_json::from_str(&raw).ok())
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_int(n: Option<i64>) -> libsql::Value {
    match n {
        Some(n) => libsql::Value::Integer(n),
        None => libsql::Value::Null,
    }
}

fn opt_tags(tags: Option<&Vec<String>>) -> Result<libsql::Value, DatabaseError> {
    match tags {
        Some(tags) => serde_json::to_string(tags)
            .map(libsql::Value::Text)
            .map_err(|e| DatabaseError::Serialization(e.to_string())),
        None => Ok(libsql::Value::Null),
    }
}

/// Read an integer column; NULL or a non-integer value reads as absent.
///
/// `Row::get::<i64>` panics on a REAL, so the raw value is matched instead.
fn opt_int_col(row: &libsql::Row, idx: i32) -> Option<i64> {
    match row.get_value(idx) {
        Ok(libsql::Value::Integer(n)) => Some(n),
        _ => None,
    }
}

/// Map a libsql Row to a UserProfile.
///
/// Column order matches PROFILE_COLUMNS.
fn row_to_profile(row: &libsql::Row) -> Result<UserProfile, libsql::Error> {
    let last_update: Option<String> = row.get(11).ok();

    Ok(UserProfile {
        identity: row.get(0)?,
        handle: row.get(1).ok(),
        first_name: row.get(2).ok(),
        last_name: row.get(3).ok(),
        age: opt_int_col(row, 4),
        city: row.get(5).ok(),
        stack: parse_tags(row.get(6).ok()),
        experience_months: opt_int_col(row, 7),
        salary: opt_int_col(row, 8),
        company: row.get(9).ok(),
        interests: parse_tags(row.get(10).ok()),
        last_experience_update: parse_optional_datetime(&last_update),
    })
}

async fn collect_profiles(
    mut rows: libsql::Rows,
    op: &str,
) -> Result<Vec<UserProfile>, DatabaseError> {
    let mut profiles = Vec::new();
    loop {
        match rows.next().await {
            Ok(Some(row)) => {
                let profile = row_to_profile(&row)
                    .map_err(|e| DatabaseError::Query(format!("{op} row parse: {e}")))?;
                profiles.push(profile);
            }
            Ok(None) => break,
            Err(e) => return Err(DatabaseError::Query(format!("{op}: {e}"))),
        }
    }
    Ok(profiles)
}

// ── Trait implementation ────────────────────────────────────────────

const PROFILE_COLUMNS: &str = "identity, handle, first_name, last_name, age, city, stack, experience_months, salary, company, interests, last_experience_update";

#[async_trait]
impl ProfileStore for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Lookups ─────────────────────────────────────────────────────

    async fn get_profile(&self, identity: &str) -> Result<Option<UserProfile>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE identity = ?1"),
                params![identity],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_profile: {e}")))?;

        Ok(collect_profiles(rows, "get_profile").await?.into_iter().next())
    }

    async fn find_by_handle(&self, handle: &str) -> Result<Option<UserProfile>, DatabaseError> {
        let handle = handle.trim().trim_start_matches('@');
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PROFILE_COLUMNS} FROM profiles WHERE lower(handle) = lower(?1)
                     ORDER BY updated_at DESC LIMIT 1"
                ),
                params![handle],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_by_handle: {e}")))?;

        Ok(collect_profiles(rows, "find_by_handle")
            .await?
            .into_iter()
            .next())
    }

    async fn find_by_city(&self, city: &str) -> Result<Vec<UserProfile>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PROFILE_COLUMNS} FROM profiles WHERE city = ?1
                     ORDER BY identity"
                ),
                // Cities are stored normalized; SQLite's lower() is ASCII-only.
                params![normalize_city(city)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_by_city: {e}")))?;

        collect_profiles(rows, "find_by_city").await
    }

    // ── Writes ──────────────────────────────────────────────────────

    async fn upsert_profile(
        &self,
        identity: &str,
        patch: &ProfilePatch,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let last_update = patch.last_experience_update.map(|t| t.to_rfc3339());

        // COALESCE keeps the stored value wherever the patch has NULL.
        self.conn()
            .execute(
                "INSERT INTO profiles (identity, handle, first_name, last_name, age, city, stack,
                    experience_months, salary, company, interests, last_experience_update,
                    created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
                 ON CONFLICT (identity) DO UPDATE SET
                    handle = COALESCE(excluded.handle, profiles.handle),
                    first_name = COALESCE(excluded.first_name, profiles.first_name),
                    last_name = COALESCE(excluded.last_name, profiles.last_name),
                    age = COALESCE(excluded.age, profiles.age),
                    city = COALESCE(excluded.city, profiles.city),
                    stack = COALESCE(excluded.stack, profiles.stack),
                    experience_months = COALESCE(excluded.experience_months, profiles.experience_months),
                    salary = COALESCE(excluded.salary, profiles.salary),
                    company = COALESCE(excluded.company, profiles.company),
                    interests = COALESCE(excluded.interests, profiles.interests),
                    last_experience_update = COALESCE(excluded.last_experience_update, profiles.last_experience_update),
                    updated_at = excluded.updated_at",
                params![
                    identity,
                    opt_text(patch.handle.as_deref()),
                    opt_text(patch.first_name.as_deref()),
                    opt_text(patch.last_name.as_deref()),
                    opt_int(patch.age),
                    opt_text(patch.city.as_deref().map(normalize_city).as_deref()),
                    opt_tags(patch.stack.as_ref())?,
                    opt_int(patch.experience_months),
                    opt_int(patch.salary),
                    opt_text(patch.company.as_deref()),
                    opt_tags(patch.interests.as_ref())?,
                    opt_text(last_update.as_deref()),
                    now,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_profile: {e}")))?;

        debug!(user_id = %identity, "Profile upserted");
        Ok(())
    }

    // ── Aggregates ──────────────────────────────────────────────────

    async fn stats(&self) -> Result<ProfileStats, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*), COALESCE(AVG(salary), 0.0) FROM profiles",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("stats: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(ProfileStats {
                total: row.get::<i64>(0).unwrap_or(0),
                average_salary: row.get::<f64>(1).unwrap_or(0.0),
            }),
            Ok(None) => Ok(ProfileStats {
                total: 0,
                average_salary: 0.0,
            }),
            Err(e) => Err(DatabaseError::Query(format!("stats: {e}"))),
        }
    }

    async fn top_cities(&self, limit: usize) -> Result<Vec<CityCount>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT lower(trim(city)) AS name, COUNT(*) AS n FROM profiles
                 WHERE city IS NOT NULL AND trim(city) != ''
                 GROUP BY name ORDER BY n DESC, name ASC LIMIT ?1",
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("top_cities: {e}")))?;

        let mut cities = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => {
                    let city: String = row
                        .get(0)
                        .map_err(|e| DatabaseError::Query(format!("top_cities row parse: {e}")))?;
                    let count: i64 = row.get(1).unwrap_or(0);
                    cities.push(CityCount { city, count });
                }
                Ok(None) => break,
                Err(e) => return Err(DatabaseError::Query(format!("top_cities: {e}"))),
            }
        }
        Ok(cities)
    }

    // ── Accrual ─────────────────────────────────────────────────────

    async fn list_accrual_candidates(&self) -> Result<Vec<AccrualCandidate>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT identity, experience_months, last_experience_update FROM profiles
                 WHERE typeof(experience_months) = 'integer' ORDER BY identity",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_accrual_candidates: {e}")))?;

        let mut candidates = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => {
                    let identity: String = row.get(0).map_err(|e| {
                        DatabaseError::Query(format!("list_accrual_candidates row parse: {e}"))
                    })?;
                    let last_update: Option<String> = row.get(2).ok();
                    candidates.push(AccrualCandidate {
                        identity,
                        experience_months: opt_int_col(&row, 1).unwrap_or(0),
                        last_experience_update: parse_optional_datetime(&last_update),
                    });
                }
                Ok(None) => break,
                Err(e) => {
                    return Err(DatabaseError::Query(format!("list_accrual_candidates: {e}")));
                }
            }
        }
        Ok(candidates)
    }

    async fn advance_experience(
        &self,
        identity: &str,
        months: i64,
        expected_last_update: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let now = now.to_rfc3339();
        // Rows where the addition would overflow are left alone.
        let ceiling = i64::MAX - months.max(0);
        let changed = match expected_last_update {
            Some(expected) => {
                self.conn()
                    .execute(
                        "UPDATE profiles
                         SET experience_months = experience_months + ?1,
                             last_experience_update = ?2, updated_at = ?2
                         WHERE identity = ?3 AND last_experience_update = ?4
                           AND experience_months <= ?5",
                        params![months, now, identity, expected.to_rfc3339(), ceiling],
                    )
                    .await
            }
            None => {
                self.conn()
                    .execute(
                        "UPDATE profiles
                         SET experience_months = experience_months + ?1,
                             last_experience_update = ?2, updated_at = ?2
                         WHERE identity = ?3 AND last_experience_update IS NULL
                           AND experience_months <= ?4",
                        params![months, now, identity, ceiling],
                    )
                    .await
            }
        }
        .map_err(|e| DatabaseError::Query(format!("advance_experience: {e}")))?;

        debug!(user_id = %identity, months, changed, "Experience advanced");
        Ok(changed > 0)
    }
}
