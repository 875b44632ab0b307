//! SQLite store implementation
//!
//! The store owns the single database connection. Writers serialize on the
//! connection mutex and mutate rows only inside [`Store::with_transaction`];
//! readers borrow the connection briefly through [`Store::with_connection`]
//! and always observe the latest committed state (WAL journal).

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::{Connection, Transaction};

use super::schema;
use crate::{Error, Result};

const BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// SQLite-backed store for sessions and heart-rate samples
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open a database file (creates if doesn't exist).
    ///
    /// Enables foreign-key enforcement and WAL journaling, creates missing
    /// tables, then validates the structural fingerprint of any existing
    /// schema. A mismatch is fatal: the store refuses to serve rather than
    /// silently migrate.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| Error::StoreOpen(format!("{}: {}", path.display(), e)))?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::StoreOpen(format!("in-memory: {}", e)))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        configure(&conn)?;
        initialize_schema(&conn)?;
        verify_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` inside a write transaction.
    ///
    /// The transaction commits only if `f` returns `Ok`; any error rolls back
    /// every change. Only one write transaction proceeds at a time.
    pub fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Run `f` against the latest committed state
    pub fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock();
        f(&conn)
    }

    /// Delete all rows from both tables atomically, then reclaim storage.
    ///
    /// Foreign-key checks are deferred for the duration so deletion order
    /// does not matter. Test/reset paths only.
    pub fn clear_all(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(
            "BEGIN;
             PRAGMA defer_foreign_keys = ON;
             DELETE FROM hr_samples;
             DELETE FROM sessions;
             COMMIT;",
        )?;
        conn.execute_batch("VACUUM")?;
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A poisoned lock means a writer panicked mid-borrow; the transaction
        // it held has already rolled back, so the connection stays usable.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;",
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}

fn initialize_schema(conn: &Connection) -> Result<()> {
    for stmt in schema::all_schema_statements() {
        conn.execute(stmt, [])?;
    }
    Ok(())
}

/// One column as reported by `PRAGMA table_info`
#[derive(Debug)]
struct ColumnInfo {
    name: String,
    decl_type: String,
    not_null: bool,
    primary_key: bool,
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns = stmt
        .query_map([], |row| {
            Ok(ColumnInfo {
                name: row.get(1)?,
                decl_type: row.get(2)?,
                not_null: row.get::<_, i64>(3)? != 0,
                primary_key: row.get::<_, i64>(5)? != 0,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

/// Compare the physical schema against the expected fingerprint.
///
/// Checks column name, declared type, NOT NULL and primary-key flags for both
/// tables, plus the ON DELETE CASCADE rule on `hr_samples.sessionId`.
fn verify_schema(conn: &Connection) -> Result<()> {
    for table in [schema::SESSIONS_TABLE, schema::HR_SAMPLES_TABLE] {
        let expected = schema::expected_columns(table)
            .ok_or_else(|| Error::StoreOpen(format!("No fingerprint for table {}", table)))?;
        let actual = table_columns(conn, table)?;

        if actual.len() != expected.len() {
            return Err(Error::StoreOpen(format!(
                "Table {} has {} columns, expected {}",
                table,
                actual.len(),
                expected.len()
            )));
        }
        for (col, (name, decl_type, not_null, primary_key)) in actual.iter().zip(expected) {
            if col.name != *name
                || !col.decl_type.eq_ignore_ascii_case(decl_type)
                || col.not_null != *not_null
                || col.primary_key != *primary_key
            {
                return Err(Error::StoreOpen(format!(
                    "Table {} column {:?} does not match the expected definition",
                    table, col.name
                )));
            }
        }
    }

    // Cascade rule: row layout of PRAGMA foreign_key_list is
    // (id, seq, table, from, to, on_update, on_delete, match).
    let mut stmt = conn.prepare(&format!(
        "PRAGMA foreign_key_list({})",
        schema::HR_SAMPLES_TABLE
    ))?;
    let cascades = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(2)?, row.get::<_, String>(6)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let cascade_ok = cascades
        .iter()
        .any(|(parent, on_delete)| parent == schema::SESSIONS_TABLE && on_delete == "CASCADE");
    if !cascade_ok {
        return Err(Error::StoreOpen(format!(
            "{}.sessionId must reference {}(id) ON DELETE CASCADE",
            schema::HR_SAMPLES_TABLE,
            schema::SESSIONS_TABLE
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    fn count(store: &Store, table: &str) -> i64 {
        store
            .with_connection(|conn| {
                let n = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
                Ok(n)
            })
            .unwrap()
    }

    fn insert_session_row(store: &Store, start_time: i64) -> i64 {
        store
            .with_transaction(|tx| {
                tx.execute(
                    "INSERT INTO sessions (startTime, endTime, durationSeconds, avgBpm, maxBpm, timeInTargetZoneSeconds)
                     VALUES (?1, ?1 + 600, 600, 140, 160, 300)",
                    params![start_time],
                )?;
                Ok(tx.last_insert_rowid())
            })
            .unwrap()
    }

    #[test]
    fn test_open_creates_schema() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(count(&store, "sessions"), 0);
        assert_eq!(count(&store, "hr_samples"), 0);
    }

    #[test]
    fn test_reopen_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.db");

        let store = Store::open(&path).unwrap();
        insert_session_row(&store, 100);
        drop(store);

        let reopened = Store::open(&path).unwrap();
        assert_eq!(count(&reopened, "sessions"), 1);
    }

    #[test]
    fn test_open_unwritable_location_fails() {
        let result = Store::open(Path::new("/nonexistent-dir/telemetry.db"));
        assert!(matches!(result, Err(Error::StoreOpen(_))));
    }

    #[test]
    fn test_open_rejects_mismatched_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.db");

        // A sessions table from some earlier, incompatible layout.
        let conn = Connection::open(&path).unwrap();
        conn.execute(
            "CREATE TABLE sessions (id INTEGER PRIMARY KEY AUTOINCREMENT, startTime INTEGER NOT NULL)",
            [],
        )
        .unwrap();
        drop(conn);

        let result = Store::open(&path);
        assert!(matches!(result, Err(Error::StoreOpen(_))));
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let store = Store::open_in_memory().unwrap();

        let result: Result<()> = store.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO sessions (startTime, endTime, durationSeconds, avgBpm, maxBpm, timeInTargetZoneSeconds)
                 VALUES (1, 2, 1, 0, 0, 0)",
                [],
            )?;
            Err(Error::InvalidValue("boom".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(count(&store, "sessions"), 0);
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let store = Store::open_in_memory().unwrap();

        let result = store.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO hr_samples (sessionId, elapsedSeconds, rawBpm, smoothedBpm, connectionState)
                 VALUES (999, 0, 120, 118, 'CONNECTED')",
                [],
            )?;
            Ok(())
        });

        assert!(result.is_err());
        assert_eq!(count(&store, "hr_samples"), 0);
    }

    #[test]
    fn test_clear_all_empties_both_tables() {
        let store = Store::open_in_memory().unwrap();
        let session_id = insert_session_row(&store, 100);
        store
            .with_transaction(|tx| {
                tx.execute(
                    "INSERT INTO hr_samples (sessionId, elapsedSeconds, rawBpm, smoothedBpm, connectionState)
                     VALUES (?1, 0, 120, 118, 'CONNECTED')",
                    params![session_id],
                )?;
                Ok(())
            })
            .unwrap();

        store.clear_all().unwrap();

        assert_eq!(count(&store, "sessions"), 0);
        assert_eq!(count(&store, "hr_samples"), 0);
    }
}
