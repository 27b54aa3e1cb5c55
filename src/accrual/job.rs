//! One accrual pass over every profile with an experience value.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use tracing::{debug, error, info, warn};

use crate::error::AccrualError;
use crate::store::ProfileStore;

/// Whole calendar months between two instants, ignoring the day of month.
///
/// 2024-01-31 to 2024-02-01 is one month; 2024-03-01 to 2024-03-31 is none.
pub fn months_elapsed(last_update: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let years = i64::from(now.year() - last_update.year());
    let months = i64::from(now.month()) - i64::from(last_update.month());
    years * 12 + months
}

/// Outcome counts of one accrual pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccrualReport {
    pub scanned: usize,
    pub advanced: usize,
    pub unchanged: usize,
    /// Profiles that had experience but no timestamp; stamped without increment.
    pub repaired: usize,
    pub failed: usize,
}

pub struct AccrualJob {
    store: Arc<dyn ProfileStore>,
}

impl AccrualJob {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    /// Run one pass as of `now`.
    ///
    /// Failing to load the batch aborts the pass. A failed record is logged
    /// and counted, and the scan moves on.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<AccrualReport, AccrualError> {
        let candidates = self.store.list_accrual_candidates().await.map_err(|e| {
            error!(error = %e, "Accrual batch could not be loaded");
            AccrualError::Batch(e)
        })?;

        let mut report = AccrualReport {
            scanned: candidates.len(),
            ..Default::default()
        };

        for candidate in candidates {
            let identity = candidate.identity.as_str();
            let (months, expected) = match candidate.last_experience_update {
                Some(last) => {
                    let months = months_elapsed(last, now);
                    if months < 1 {
                        report.unchanged += 1;
                        continue;
                    }
                    (months, Some(last))
                }
                None => (0, None),
            };

            if candidate.experience_months.checked_add(months).is_none() {
                error!(
                    user_id = %identity,
                    experience_months = candidate.experience_months,
                    months,
                    "Experience would overflow, skipped"
                );
                report.failed += 1;
                continue;
            }

            match self
                .store
                .advance_experience(identity, months, expected, now)
                .await
            {
                Ok(true) if expected.is_none() => {
                    warn!(user_id = %identity, "Experience had no timestamp; stamped without increment");
                    report.repaired += 1;
                }
                Ok(true) => {
                    debug!(
                        user_id = %identity,
                        months,
                        from = candidate.experience_months,
                        "Experience advanced"
                    );
                    report.advanced += 1;
                }
                Ok(false) => {
                    // Someone else moved the timestamp since the batch was read.
                    debug!(user_id = %identity, "Experience changed concurrently, skipped");
                    report.unchanged += 1;
                }
                Err(e) => {
                    error!(user_id = %identity, error = %e, "Failed to advance experience");
                    report.failed += 1;
                }
            }
        }

        info!(
            scanned = report.scanned,
            advanced = report.advanced,
            unchanged = report.unchanged,
            repaired = report.repaired,
            failed = report.failed,
            "Accrual pass finished"
        );
        Ok(report)
    }
}
