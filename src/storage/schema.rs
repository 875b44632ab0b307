//! Database schema definitions
//!
//! The column set here is the authoritative structural fingerprint: the store
//! refuses to open a database whose physical schema disagrees with it.

/// Table holding one row per workout session
pub const SESSIONS_TABLE: &str = "sessions";

/// Table holding one row per heart-rate reading
pub const HR_SAMPLES_TABLE: &str = "hr_samples";

/// SQL to create the sessions table
pub const CREATE_SESSIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    startTime INTEGER NOT NULL,
    endTime INTEGER NOT NULL,
    durationSeconds INTEGER NOT NULL,
    avgBpm INTEGER NOT NULL,
    maxBpm INTEGER NOT NULL,
    timeInTargetZoneSeconds INTEGER NOT NULL
)
"#;

/// SQL to create the hr_samples table
pub const CREATE_HR_SAMPLES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS hr_samples (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sessionId INTEGER NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    elapsedSeconds INTEGER NOT NULL,
    rawBpm INTEGER NOT NULL,
    smoothedBpm INTEGER NOT NULL,
    connectionState TEXT NOT NULL
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_hr_samples_session ON hr_samples(sessionId)",
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![CREATE_SESSIONS_TABLE, CREATE_HR_SAMPLES_TABLE];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}

/// Expected column fingerprint: (name, declared type, not null, primary key)
pub type ColumnFingerprint = (&'static str, &'static str, bool, bool);

/// Expected columns of the sessions table, in declaration order
pub const SESSIONS_COLUMNS: &[ColumnFingerprint] = &[
    ("id", "INTEGER", false, true),
    ("startTime", "INTEGER", true, false),
    ("endTime", "INTEGER", true, false),
    ("durationSeconds", "INTEGER", true, false),
    ("avgBpm", "INTEGER", true, false),
    ("maxBpm", "INTEGER", true, false),
    ("timeInTargetZoneSeconds", "INTEGER", true, false),
];

/// Expected columns of the hr_samples table, in declaration order
pub const HR_SAMPLES_COLUMNS: &[ColumnFingerprint] = &[
    ("id", "INTEGER", false, true),
    ("sessionId", "INTEGER", true, false),
    ("elapsedSeconds", "INTEGER", true, false),
    ("rawBpm", "INTEGER", true, false),
    ("smoothedBpm", "INTEGER", true, false),
    ("connectionState", "TEXT", true, false),
];

/// Expected columns for a table name, or None for an unknown table
pub fn expected_columns(table: &str) -> Option<&'static [ColumnFingerprint]> {
    match table {
        t if t == SESSIONS_TABLE => Some(SESSIONS_COLUMNS),
        t if t == HR_SAMPLES_TABLE => Some(HR_SAMPLES_COLUMNS),
        _ => None,
    }
}
