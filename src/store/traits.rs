//! `ProfileStore` trait: single async interface for profile persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::profile::{CityCount, ProfilePatch, ProfileStats, UserProfile};

/// A profile whose experience may need advancing by the accrual job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccrualCandidate {
    pub identity: String,
    pub experience_months: i64,
    pub last_experience_update: Option<DateTime<Utc>>,
}

/// Backend-agnostic profile store.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Lookups ─────────────────────────────────────────────────────

    /// Get a profile by its identity.
    async fn get_profile(&self, identity: &str) -> Result<Option<UserProfile>, DatabaseError>;

    /// Find a profile by handle (without the leading `@`).
    ///
    /// Handles are not unique; the most recently updated match wins.
    async fn find_by_handle(&self, handle: &str) -> Result<Option<UserProfile>, DatabaseError>;

    /// All profiles whose city equals `city`, compared case-insensitively.
    async fn find_by_city(&self, city: &str) -> Result<Vec<UserProfile>, DatabaseError>;

    // ── Writes ──────────────────────────────────────────────────────

    /// Insert a profile, or merge `patch` into the stored one.
    ///
    /// Fields that are `None` in the patch keep their stored values. The city
    /// is stored trimmed and lowercased.
    async fn upsert_profile(
        &self,
        identity: &str,
        patch: &ProfilePatch,
    ) -> Result<(), DatabaseError>;

    // ── Aggregates ──────────────────────────────────────────────────

    /// Total profile count and mean salary.
    async fn stats(&self) -> Result<ProfileStats, DatabaseError>;

    /// Cities grouped case-insensitively, most common first.
    async fn top_cities(&self, limit: usize) -> Result<Vec<CityCount>, DatabaseError>;

    // ── Accrual ─────────────────────────────────────────────────────

    /// Every profile that has an experience value.
    async fn list_accrual_candidates(&self) -> Result<Vec<AccrualCandidate>, DatabaseError>;

    /// Add `months` to a profile's experience and stamp `now`.
    ///
    /// Only applies when the stored `last_experience_update` still equals
    /// `expected_last_update`. Returns whether the row changed.
    async fn advance_experience(
        &self,
        identity: &str,
        months: i64,
        expected_last_update: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;
}
