//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - sessions(id, startTime, endTime, durationSeconds, avgBpm, maxBpm, timeInTargetZoneSeconds)
//! - hr_samples(id, sessionId, elapsedSeconds, rawBpm, smoothedBpm, connectionState)
//!
//! `hr_samples.sessionId` cascades on session delete.

pub mod schema;
pub mod sqlite;

pub use sqlite::Store;
