//! StateStore — redb-backed timer persistence.
//!
//! Provides string get/set/delete over the `timers` table plus the
//! [`StoreConnector`] seam the autoscaler uses to acquire a store at the
//! start of each tick. The store supports both on-disk and in-memory
//! backends (the latter for testing and embedding).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, DatabaseError, ReadableDatabase};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::TIMERS;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Key/value operations the hysteresis controller needs.
pub trait TimerStore: Send + Sync {
    fn get(&self, key: &str) -> StateResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> StateResult<()>;

    /// Remove a key. Returns true if it existed.
    fn delete(&self, key: &str) -> StateResult<bool>;
}

/// Acquires a [`TimerStore`] for one tick.
///
/// An `Err` here means the store is unavailable for the whole tick.
pub trait StoreConnector: Send + Sync {
    fn connect(&self) -> StateResult<Box<dyn TimerStore>>;
}

/// Thread-safe timer store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    ///
    /// Fails with [`StateError::Busy`] while another handle holds the file.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(|e| match e {
            DatabaseError::DatabaseAlreadyOpen => StateError::Busy(path.display().to_string()),
            other => StateError::Open(other.to_string()),
        })?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(TIMERS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

impl TimerStore for StateStore {
    fn get(&self, key: &str) -> StateResult<Option<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(TIMERS).map_err(map_err!(Table))?;
        let value = table
            .get(key)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value().to_string());
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(TIMERS).map_err(map_err!(Table))?;
            table.insert(key, value).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, %value, "timer stored");
        Ok(())
    }

    fn delete(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(TIMERS).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "timer deleted");
        Ok(existed)
    }
}

/// A shared store hands out clones of itself; every tick sees the same data.
impl StoreConnector for StateStore {
    fn connect(&self) -> StateResult<Box<dyn TimerStore>> {
        Ok(Box::new(self.clone()))
    }
}

/// Opens the redb file fresh on every tick.
///
/// redb holds an exclusive file lock while the database is open, so a
/// second process evaluating at the same moment (or an operator running
/// `qscale timer show`) gets [`StateError::Busy`] instead of racing on the
/// timer key.
#[derive(Debug, Clone)]
pub struct DiskConnector {
    path: PathBuf,
}

impl DiskConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StoreConnector for DiskConnector {
    fn connect(&self) -> StateResult<Box<dyn TimerStore>> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| StateError::Unavailable(format!("{}: {e}", parent.display())))?;
        }
        let store = StateStore::open(&self.path)?;
        Ok(Box::new(store))
    }
}
