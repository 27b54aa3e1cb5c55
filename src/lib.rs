//! Devfolio: a chat bot that collects developer profiles.

pub mod accrual;
pub mod bot;
pub mod channels;
pub mod config;
pub mod error;
pub mod flows;
pub mod profile;
pub mod store;
pub mod wizard;
