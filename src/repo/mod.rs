//! Repository Layer - CRUD over sessions and samples
//!
//! Repositories never cache entity state across calls: every operation runs a
//! transaction or a read against the store, and each committed write notifies
//! the invalidation tracker with the set of tables it touched.

pub mod samples;
pub mod sessions;

pub use samples::SampleRepository;
pub use sessions::SessionRepository;

/// Constraint class of a failed abort-on-conflict INSERT
pub(crate) enum Violation {
    PrimaryKey,
    ForeignKey,
}

pub(crate) fn insert_violation(err: &rusqlite::Error) -> Option<Violation> {
    let rusqlite::Error::SqliteFailure(code, _) = err else {
        return None;
    };
    match code.extended_code {
        rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => Some(Violation::PrimaryKey),
        rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Some(Violation::ForeignKey),
        _ => None,
    }
}
