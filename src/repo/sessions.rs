//! Session repository - CRUD operations over workout sessions

use rusqlite::{params, OptionalExtension};

use super::{insert_violation, Violation};
use crate::model::RunnerSession;
use crate::storage::schema;
use crate::storage::Store;
use crate::tracker::{InvalidationTracker, LiveQuery};
use crate::{Error, Result};

/// Default window for the history screen
pub const DEFAULT_RECENT_LIMIT: usize = 20;

/// Sessions shorter than this are treated as aborted, not completed
const MIN_COMPLETED_DURATION_SECS: i64 = 120;

const SESSION_COLUMNS: &str =
    "id, startTime, endTime, durationSeconds, avgBpm, maxBpm, timeInTargetZoneSeconds";

/// CRUD operations over the session entity
#[derive(Clone)]
pub struct SessionRepository {
    store: Store,
    tracker: InvalidationTracker,
}

impl SessionRepository {
    pub(crate) fn new(store: Store, tracker: InvalidationTracker) -> Self {
        Self { store, tracker }
    }

    /// Insert a session and return its id.
    ///
    /// With `session.id == 0` a new key is generated; an explicit id that
    /// already exists fails with [`Error::Conflict`] - insertion is
    /// abort-on-conflict, never a silent overwrite.
    pub fn insert_session(&self, session: &RunnerSession) -> Result<i64> {
        let id = self.store.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO sessions (id, startTime, endTime, durationSeconds, avgBpm, maxBpm, timeInTargetZoneSeconds)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    (session.id != 0).then_some(session.id),
                    session.start_time,
                    session.end_time,
                    session.duration_seconds,
                    session.avg_bpm,
                    session.max_bpm,
                    session.time_in_target_zone_seconds,
                ],
            )
            .map_err(|e| match insert_violation(&e) {
                Some(Violation::PrimaryKey) => Error::Conflict(session.id),
                _ => Error::Storage(e),
            })?;
            Ok(if session.id != 0 {
                session.id
            } else {
                tx.last_insert_rowid()
            })
        })?;
        self.tracker.notify(&[schema::SESSIONS_TABLE]);
        Ok(id)
    }

    /// Update all mutable fields of the row matching `session.id`.
    ///
    /// Returns the number of affected rows; 0 means no such row, which is a
    /// no-op for the store and the caller's to check.
    pub fn update_session(&self, session: &RunnerSession) -> Result<usize> {
        let affected = self.store.with_transaction(|tx| {
            Ok(tx.execute(
                "UPDATE sessions
                 SET startTime = ?2, endTime = ?3, durationSeconds = ?4,
                     avgBpm = ?5, maxBpm = ?6, timeInTargetZoneSeconds = ?7
                 WHERE id = ?1",
                params![
                    session.id,
                    session.start_time,
                    session.end_time,
                    session.duration_seconds,
                    session.avg_bpm,
                    session.max_bpm,
                    session.time_in_target_zone_seconds,
                ],
            )?)
        })?;
        if affected > 0 {
            self.tracker.notify(&[schema::SESSIONS_TABLE]);
        }
        Ok(affected)
    }

    /// Point lookup; absent is `None`, not an error
    pub fn get_session(&self, id: i64) -> Result<Option<RunnerSession>> {
        self.store.with_connection(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM sessions WHERE id = ?1", SESSION_COLUMNS),
                [id],
                row_to_session,
            )
            .optional()
            .map_err(Into::into)
        })
    }

    /// Delete a session; its samples go with it (cascade).
    ///
    /// Returns the number of deleted sessions (0 or 1).
    pub fn delete_session(&self, id: i64) -> Result<usize> {
        let affected = self
            .store
            .with_transaction(|tx| Ok(tx.execute("DELETE FROM sessions WHERE id = ?1", [id])?))?;
        if affected > 0 {
            // The cascade touched samples too.
            self.tracker
                .notify(&[schema::SESSIONS_TABLE, schema::HR_SAMPLES_TABLE]);
        }
        Ok(affected)
    }

    /// Delete several sessions in one transaction
    pub fn delete_sessions(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let affected = self.store.with_transaction(|tx| {
            let mut stmt = tx.prepare("DELETE FROM sessions WHERE id = ?1")?;
            let mut affected = 0;
            for id in ids {
                affected += stmt.execute([id])?;
            }
            Ok(affected)
        })?;
        if affected > 0 {
            self.tracker
                .notify(&[schema::SESSIONS_TABLE, schema::HR_SAMPLES_TABLE]);
        }
        Ok(affected)
    }

    /// The most recent sessions, ordered by start time descending
    pub fn recent_sessions(&self, limit: usize) -> Result<Vec<RunnerSession>> {
        self.store.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM sessions ORDER BY startTime DESC LIMIT ?1",
                SESSION_COLUMNS
            ))?;
            let sessions = stmt
                .query_map([limit as i64], row_to_session)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(sessions)
        })
    }

    /// Recent sessions that actually finished and ran long enough to count
    pub fn recent_completed_sessions(&self, limit: usize) -> Result<Vec<RunnerSession>> {
        self.store.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM sessions
                 WHERE endTime > 0 AND durationSeconds > ?2
                 ORDER BY startTime DESC LIMIT ?1",
                SESSION_COLUMNS
            ))?;
            let sessions = stmt
                .query_map(
                    params![limit as i64, MIN_COMPLETED_DURATION_SECS],
                    row_to_session,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(sessions)
        })
    }

    /// Live form of [`SessionRepository::recent_sessions`].
    ///
    /// Delivers an initial snapshot, then re-delivers whenever a committed
    /// write touches the sessions table.
    pub fn watch_recent_sessions(&self, limit: usize) -> LiveQuery<Vec<RunnerSession>> {
        let repo = self.clone();
        self.tracker
            .register(&[schema::SESSIONS_TABLE], move || repo.recent_sessions(limit))
    }

    /// Live point lookup; delivers `None` snapshots once the row is gone
    pub fn watch_session(&self, id: i64) -> LiveQuery<Option<RunnerSession>> {
        let repo = self.clone();
        self.tracker
            .register(&[schema::SESSIONS_TABLE], move || repo.get_session(id))
    }
}

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<RunnerSession> {
    Ok(RunnerSession {
        id: row.get(0)?,
        start_time: row.get(1)?,
        end_time: row.get(2)?,
        duration_seconds: row.get(3)?,
        avg_bpm: row.get(4)?,
        max_bpm: row.get(5)?,
        time_in_target_zone_seconds: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConnectionState, HrSample};
    use crate::repo::SampleRepository;

    fn repos() -> (SessionRepository, SampleRepository) {
        let store = Store::open_in_memory().unwrap();
        let tracker = InvalidationTracker::new();
        (
            SessionRepository::new(store.clone(), tracker.clone()),
            SampleRepository::new(store, tracker),
        )
    }

    fn session_starting_at(start_time: i64) -> RunnerSession {
        RunnerSession {
            start_time,
            end_time: start_time + 1800,
            duration_seconds: 1800,
            avg_bpm: 145,
            max_bpm: 172,
            time_in_target_zone_seconds: 900,
            ..Default::default()
        }
    }

    fn sample_at(session_id: i64, elapsed_seconds: i64) -> HrSample {
        HrSample {
            session_id,
            elapsed_seconds,
            raw_bpm: 130,
            smoothed_bpm: 128,
            connection_state: ConnectionState::Connected,
            ..Default::default()
        }
    }

    #[test]
    fn test_insert_assigns_fresh_id() {
        let (sessions, _) = repos();

        let first = sessions.insert_session(&session_starting_at(10)).unwrap();
        let second = sessions.insert_session(&session_starting_at(20)).unwrap();

        assert!(first > 0);
        assert!(second > first);

        let fetched = sessions.get_session(first).unwrap().unwrap();
        assert_eq!(fetched.start_time, 10);
        assert_eq!(fetched.id, first);
    }

    #[test]
    fn test_insert_explicit_id_kept() {
        let (sessions, _) = repos();

        let mut session = session_starting_at(10);
        session.id = 77;
        assert_eq!(sessions.insert_session(&session).unwrap(), 77);
    }

    #[test]
    fn test_insert_existing_id_conflicts() {
        let (sessions, _) = repos();

        let mut session = session_starting_at(10);
        session.id = 5;
        sessions.insert_session(&session).unwrap();

        let result = sessions.insert_session(&session);
        assert!(matches!(result, Err(Error::Conflict(5))));
    }

    #[test]
    fn test_update_session() {
        let (sessions, _) = repos();

        let id = sessions.insert_session(&session_starting_at(10)).unwrap();
        let mut updated = session_starting_at(10);
        updated.id = id;
        updated.avg_bpm = 150;

        assert_eq!(sessions.update_session(&updated).unwrap(), 1);
        assert_eq!(sessions.get_session(id).unwrap().unwrap().avg_bpm, 150);
    }

    #[test]
    fn test_update_nonexistent_is_noop() {
        let (sessions, _) = repos();

        let mut session = session_starting_at(10);
        session.id = 9999;
        assert_eq!(sessions.update_session(&session).unwrap(), 0);
    }

    #[test]
    fn test_get_absent_returns_none() {
        let (sessions, _) = repos();
        assert!(sessions.get_session(1).unwrap().is_none());
    }

    #[test]
    fn test_recent_sessions_order_and_limit() {
        let (sessions, _) = repos();

        for start_time in [10, 30, 20] {
            sessions
                .insert_session(&session_starting_at(start_time))
                .unwrap();
        }

        let recent = sessions.recent_sessions(2).unwrap();
        let starts: Vec<i64> = recent.iter().map(|s| s.start_time).collect();
        assert_eq!(starts, vec![30, 20]);
    }

    #[test]
    fn test_delete_cascades_to_samples() {
        let (sessions, samples) = repos();

        let kept = sessions.insert_session(&session_starting_at(10)).unwrap();
        let doomed = sessions.insert_session(&session_starting_at(20)).unwrap();
        samples.insert_sample(&sample_at(kept, 0)).unwrap();
        samples.insert_sample(&sample_at(doomed, 0)).unwrap();
        samples.insert_sample(&sample_at(doomed, 30)).unwrap();

        assert_eq!(sessions.delete_session(doomed).unwrap(), 1);

        assert!(samples.samples_for_session(doomed).unwrap().is_empty());
        assert_eq!(samples.samples_for_session(kept).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_sessions_bulk() {
        let (sessions, _) = repos();

        let a = sessions.insert_session(&session_starting_at(10)).unwrap();
        let b = sessions.insert_session(&session_starting_at(20)).unwrap();
        let c = sessions.insert_session(&session_starting_at(30)).unwrap();

        assert_eq!(sessions.delete_sessions(&[a, c]).unwrap(), 2);
        assert!(sessions.get_session(a).unwrap().is_none());
        assert!(sessions.get_session(b).unwrap().is_some());
        assert_eq!(sessions.delete_sessions(&[]).unwrap(), 0);
    }

    #[test]
    fn test_recent_completed_excludes_aborted() {
        let (sessions, _) = repos();

        sessions.insert_session(&session_starting_at(10)).unwrap();

        let mut unfinished = session_starting_at(20);
        unfinished.end_time = 0;
        sessions.insert_session(&unfinished).unwrap();

        let mut too_short = session_starting_at(30);
        too_short.duration_seconds = 60;
        sessions.insert_session(&too_short).unwrap();

        let completed = sessions.recent_completed_sessions(3).unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].start_time, 10);
    }

    #[tokio::test]
    async fn test_watch_recent_sessions_redelivers() {
        let (sessions, _) = repos();
        let mut live = sessions.watch_recent_sessions(DEFAULT_RECENT_LIMIT);

        assert!(live.recv().await.unwrap().is_empty());

        sessions.insert_session(&session_starting_at(10)).unwrap();
        let snapshot = live.recv().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].start_time, 10);
    }

    #[tokio::test]
    async fn test_watch_session_sees_delete() {
        let (sessions, _) = repos();

        let id = sessions.insert_session(&session_starting_at(10)).unwrap();
        let mut live = sessions.watch_session(id);

        assert!(live.recv().await.unwrap().is_some());

        sessions.delete_session(id).unwrap();
        assert!(live.recv().await.unwrap().is_none());
    }
}
