//! Sample repository - insert and ordered retrieval of heart-rate samples

use std::str::FromStr;

use rusqlite::params;

use super::{insert_violation, Violation};
use crate::model::{ConnectionState, HrSample};
use crate::storage::schema;
use crate::storage::Store;
use crate::tracker::{InvalidationTracker, LiveQuery};
use crate::{Error, Result};

const SAMPLE_COLUMNS: &str = "id, sessionId, elapsedSeconds, rawBpm, smoothedBpm, connectionState";

/// Insert and ordered retrieval of samples scoped to a session
#[derive(Clone)]
pub struct SampleRepository {
    store: Store,
    tracker: InvalidationTracker,
}

impl SampleRepository {
    pub(crate) fn new(store: Store, tracker: InvalidationTracker) -> Self {
        Self { store, tracker }
    }

    /// Insert a sample and return its id.
    ///
    /// Same id-generation/abort-on-conflict rule as sessions. A `session_id`
    /// that references no existing session fails with [`Error::Constraint`]
    /// and persists nothing.
    pub fn insert_sample(&self, sample: &HrSample) -> Result<i64> {
        let id = self.store.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO hr_samples (id, sessionId, elapsedSeconds, rawBpm, smoothedBpm, connectionState)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    (sample.id != 0).then_some(sample.id),
                    sample.session_id,
                    sample.elapsed_seconds,
                    sample.raw_bpm,
                    sample.smoothed_bpm,
                    sample.connection_state.as_str(),
                ],
            )
            .map_err(|e| match insert_violation(&e) {
                Some(Violation::PrimaryKey) => Error::Conflict(sample.id),
                Some(Violation::ForeignKey) => Error::Constraint(format!(
                    "session {} does not exist",
                    sample.session_id
                )),
                None => Error::Storage(e),
            })?;
            Ok(if sample.id != 0 {
                sample.id
            } else {
                tx.last_insert_rowid()
            })
        })?;
        self.tracker.notify(&[schema::HR_SAMPLES_TABLE]);
        Ok(id)
    }

    /// All samples of one session, ordered by elapsed seconds ascending
    pub fn samples_for_session(&self, session_id: i64) -> Result<Vec<HrSample>> {
        self.store.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM hr_samples WHERE sessionId = ?1 ORDER BY elapsedSeconds ASC",
                SAMPLE_COLUMNS
            ))?;
            let samples = stmt
                .query_map([session_id], row_to_sample)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(samples)
        })
    }

    /// Live form of [`SampleRepository::samples_for_session`].
    ///
    /// Registered at table granularity: a write for an unrelated session
    /// re-runs the filtered query and re-delivers a correct (if redundant)
    /// snapshot.
    pub fn watch_samples(&self, session_id: i64) -> LiveQuery<Vec<HrSample>> {
        let repo = self.clone();
        self.tracker.register(&[schema::HR_SAMPLES_TABLE], move || {
            repo.samples_for_session(session_id)
        })
    }
}

fn row_to_sample(row: &rusqlite::Row) -> rusqlite::Result<HrSample> {
    let state_str: String = row.get(5)?;
    let connection_state = ConnectionState::from_str(&state_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(HrSample {
        id: row.get(0)?,
        session_id: row.get(1)?,
        elapsed_seconds: row.get(2)?,
        raw_bpm: row.get(3)?,
        smoothed_bpm: row.get(4)?,
        connection_state,
    })
}
