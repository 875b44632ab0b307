//! # Pulselog - Running Workout Telemetry Store
//!
//! Local persistence and reactive-invalidation layer for running workouts:
//! discrete sessions plus the time series of heart-rate samples captured
//! during each one.
//!
//! Pulselog provides:
//! - SQLite-backed storage with transactional write paths
//! - Cascading deletes from a session to all of its samples
//! - Live queries that re-deliver fresh results whenever a write touches
//!   the tables they read
//! - Repository APIs consumed by the capture pipeline and the history screen

pub mod model;
pub mod storage;
pub mod tracker;
pub mod repo;
pub mod db;

// Re-exports for convenient access
pub use model::{ConnectionState, HrSample, RunnerSession};
pub use storage::Store;
pub use tracker::{InvalidationTracker, LiveQuery};
pub use repo::{SampleRepository, SessionRepository};
pub use db::Database;

/// Result type alias for pulselog operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for pulselog operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unwritable location, or an existing schema whose structural
    /// fingerprint disagrees with the expected one. Fatal, never auto-healed.
    #[error("Cannot open store: {0}")]
    StoreOpen(String),

    /// Insert with an explicit key that already exists.
    #[error("Row with id {0} already exists")]
    Conflict(i64),

    /// Foreign-key violation, e.g. a sample referencing a missing session.
    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
