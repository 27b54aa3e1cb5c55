//! Error types for the profile bot.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Flow error: {0}")]
    Flow(#[from] FlowError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Errors raised while finishing a conversational flow.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("Failed to commit {flow} for {user_id}: {source}")]
    Commit {
        flow: &'static str,
        user_id: String,
        #[source]
        source: DatabaseError,
    },
}

/// Experience accrual errors.
#[derive(Debug, thiserror::Error)]
pub enum AccrualError {
    #[error("Failed to load accrual candidates: {0}")]
    Batch(#[source] DatabaseError),

    #[error("Invalid accrual schedule '{schedule}': {reason}")]
    InvalidSchedule { schedule: String, reason: String },
}
