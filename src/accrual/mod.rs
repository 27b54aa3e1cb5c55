//! Experience accrual: advances stored experience by elapsed calendar months.

pub mod job;
pub mod ticker;

pub use job::{AccrualJob, AccrualReport, months_elapsed};
pub use ticker::{next_fire, parse_schedule, spawn_accrual_ticker};
