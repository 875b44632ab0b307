//! Database handle - one store plus its invalidation tracker
//!
//! Process wiring lives with the caller; this type only ties the pieces
//! together and hands out repository handles that share them.

use std::path::Path;

use crate::repo::{SampleRepository, SessionRepository};
use crate::storage::{schema, Store};
use crate::tracker::InvalidationTracker;
use crate::Result;

/// One open telemetry database
pub struct Database {
    store: Store,
    tracker: InvalidationTracker,
}

impl Database {
    /// Open (or create) the database file at `path`
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_store(Store::open(path)?))
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_store(Store::open_in_memory()?))
    }

    fn from_store(store: Store) -> Self {
        Self {
            store,
            tracker: InvalidationTracker::new(),
        }
    }

    /// Repository handle for sessions; cheap to create and to clone
    pub fn sessions(&self) -> SessionRepository {
        SessionRepository::new(self.store.clone(), self.tracker.clone())
    }

    /// Repository handle for heart-rate samples
    pub fn samples(&self) -> SampleRepository {
        SampleRepository::new(self.store.clone(), self.tracker.clone())
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn tracker(&self) -> &InvalidationTracker {
        &self.tracker
    }

    /// Delete every row from both tables and reclaim storage.
    ///
    /// Live queries on either table re-deliver their (now empty) results.
    /// Test/reset paths only, never normal operation.
    pub fn clear_all(&self) -> Result<()> {
        self.store.clear_all()?;
        self.tracker
            .notify(&[schema::SESSIONS_TABLE, schema::HR_SAMPLES_TABLE]);
        Ok(())
    }
}
