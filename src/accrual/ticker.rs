//! Calendar trigger for the accrual job.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tracing::{error, info, warn};

use crate::error::AccrualError;

use super::job::AccrualJob;

/// Parse a six-field cron expression (`sec min hour dom month dow`).
pub fn parse_schedule(expression: &str) -> Result<Schedule, AccrualError> {
    Schedule::from_str(expression).map_err(|e| AccrualError::InvalidSchedule {
        schedule: expression.to_string(),
        reason: e.to_string(),
    })
}

/// Next fire time strictly after `after`.
pub fn next_fire(schedule: &Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}

/// Run the accrual job on every fire of `schedule` until the task is aborted.
///
/// A failed run is logged; the next fire starts from scratch.
pub fn spawn_accrual_ticker(
    job: Arc<AccrualJob>,
    schedule: Schedule,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let Some(fire_at) = next_fire(&schedule, Utc::now()) else {
                warn!("Accrual schedule has no upcoming fire time, ticker stopped");
                return;
            };
            info!(next_run = %fire_at, "Accrual scheduled");

            let wait = (fire_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;

            if let Err(e) = job.run_once(Utc::now()).await {
                error!(error = %e, "Accrual run failed");
            }
        }
    })
}
