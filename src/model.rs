//! Persisted record types - workout sessions and heart-rate samples
//!
//! Records are plain data: every read materializes fresh rows from the store,
//! and nothing here caches entity state across calls.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One completed (or in-progress) workout.
///
/// `id == 0` means "not yet assigned" - the store generates a key on insert.
/// All timestamps are epoch seconds. The writer is responsible for keeping
/// `duration_seconds` consistent with `end_time - start_time`; the store does
/// not enforce it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerSession {
    pub id: i64,
    pub start_time: i64,
    pub end_time: i64,
    pub duration_seconds: i64,
    pub avg_bpm: i64,
    pub max_bpm: i64,
    pub time_in_target_zone_seconds: i64,
}

/// One heart-rate reading captured during a session.
///
/// `smoothed_bpm` is computed before persistence; this layer treats it as an
/// opaque input alongside the raw reading. Samples are never updated and are
/// deleted only transitively when their session is deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HrSample {
    pub id: i64,
    pub session_id: i64,
    /// Offset from session start, in seconds.
    pub elapsed_seconds: i64,
    pub raw_bpm: i64,
    pub smoothed_bpm: i64,
    pub connection_state: ConnectionState,
}

/// Sensor-link quality at capture time, stored as text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionState {
    /// Live readings from a paired sensor
    #[default]
    Connected,
    /// Scanning or reconnecting, no usable readings
    Searching,
    /// Link dropped mid-session
    Lost,
}

impl ConnectionState {
    /// Get the string representation stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Searching => "SEARCHING",
            ConnectionState::Lost => "LOST",
        }
    }

    /// Get all connection states
    pub fn all() -> &'static [ConnectionState] {
        &[
            ConnectionState::Connected,
            ConnectionState::Searching,
            ConnectionState::Lost,
        ]
    }
}

impl FromStr for ConnectionState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "CONNECTED" => Ok(ConnectionState::Connected),
            "SEARCHING" | "SCANNING" => Ok(ConnectionState::Searching),
            "LOST" | "DISCONNECTED" => Ok(ConnectionState::Lost),
            _ => Err(Error::InvalidValue(format!(
                "Unknown connection state: {}",
                s
            ))),
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_roundtrip() {
        for state in ConnectionState::all() {
            let parsed: ConnectionState = state.as_str().parse().unwrap();
            assert_eq!(parsed, *state);
        }
    }

    #[test]
    fn test_connection_state_tolerates_case_and_synonyms() {
        assert_eq!(
            "connected".parse::<ConnectionState>().unwrap(),
            ConnectionState::Connected
        );
        assert_eq!(
            "Scanning".parse::<ConnectionState>().unwrap(),
            ConnectionState::Searching
        );
        assert_eq!(
            "DISCONNECTED".parse::<ConnectionState>().unwrap(),
            ConnectionState::Lost
        );
    }

    #[test]
    fn test_connection_state_rejects_unknown() {
        assert!("warming-up".parse::<ConnectionState>().is_err());
    }
}
