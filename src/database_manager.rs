//! DatabaseManager - thread-safe registry of open databases
//!
//! # Architecture
//!
//! - `DatabaseManager` holds a thread-safe HashMap of databases
//! - Each [`SharedDatabase`] owns one append-only log behind a mutex
//!   (the append lock) and the current committed [`Database`] snapshot
//!   behind an `RwLock`
//! - Readers clone the snapshot and never wait on commits
//! - Connection tracking via atomic counters enables safe cleanup
//! - Ephemeral databases keep their log in memory and are removed when
//!   all connections close
//!
//! # Usage
//!
//! ```no_run
//! use sdb::database_manager::DatabaseManager;
//! use std::path::PathBuf;
//!
//! let manager = DatabaseManager::new(PathBuf::from("/data"));
//!
//! // Create a persistent database
//! manager.create_database("production", false).unwrap();
//!
//! // Create an ephemeral (in-memory) database for testing
//! manager.create_database("test-123", true).unwrap();
//!
//! // Get database and track connection
//! let db = manager.get_database("test-123").unwrap();
//! db.add_connection();
//!
//! // When done
//! db.remove_connection();
//! manager.cleanup_ephemeral_if_unused("test-123");
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::catalog::{DbObject, UidMap};
use crate::config::EngineConfig;
use crate::database::Database;
use crate::error::{DbError, Result};
use crate::log::{decode_all, LogFile, Reader, Writer, HEADER_LEN};
use crate::metrics::Metrics;
use crate::transaction::Transaction;
use crate::uid::Uid;

/// Unique identifier for a client connection
pub type ClientId = usize;

/// Access mode for sessions
///
/// This is per-session state, not database-level locking: several
/// read-write sessions may use one database, and optimistic commit
/// sorts out their conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Read-only access - write statements are rejected
    ReadOnly,
    /// Read-write access (default)
    ReadWrite,
}

impl AccessMode {
    /// Parse access mode from string
    pub fn from_str(s: &str) -> Self {
        match s {
            "ro" | "readonly" | "read-only" => AccessMode::ReadOnly,
            _ => AccessMode::ReadWrite,
        }
    }

    /// Convert to wire protocol string
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::ReadOnly => "ro",
            AccessMode::ReadWrite => "rw",
        }
    }

    /// Check if write operations are allowed
    pub fn is_write(&self) -> bool {
        matches!(self, AccessMode::ReadWrite)
    }
}

/// One open database: its log and its latest committed snapshot.
pub struct SharedDatabase {
    pub name: String,
    /// The append lock. Held for the whole of validate-and-append.
    log: Mutex<LogFile>,
    current: RwLock<Database>,
    pub ephemeral: bool,
    connection_count: AtomicUsize,
    config: EngineConfig,
    metrics: Option<Arc<Metrics>>,
}

impl SharedDatabase {
    fn from_parts(
        name: &str,
        log: LogFile,
        db: Database,
        config: EngineConfig,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            name: name.to_string(),
            ephemeral: log.is_ephemeral(),
            log: Mutex::new(log),
            current: RwLock::new(db),
            connection_count: AtomicUsize::new(0),
            config,
            metrics,
        }
    }

    /// Start a new log file at `path`.
    pub fn create(
        name: &str,
        path: &Path,
        config: EngineConfig,
        metrics: Option<Arc<Metrics>>,
    ) -> Result<Self> {
        let log = LogFile::create(path)?;
        let db = Database::new(name, log.len());
        Ok(Self::from_parts(name, log, db, config, metrics))
    }

    /// Open an existing log and rebuild the snapshot by replaying it.
    pub fn open(
        name: &str,
        path: &Path,
        config: EngineConfig,
        metrics: Option<Arc<Metrics>>,
    ) -> Result<Self> {
        let log = LogFile::open(path)?;
        let db = Self::replay(name, &log)?;
        Ok(Self::from_parts(name, log, db, config, metrics))
    }

    /// A database whose log lives in memory.
    pub fn ephemeral(name: &str, config: EngineConfig, metrics: Option<Arc<Metrics>>) -> Self {
        let log = LogFile::in_memory();
        let db = Database::new(name, log.len());
        Self::from_parts(name, log, db, config, metrics)
    }

    /// Standalone in-memory database without metrics and without fsync.
    pub fn in_memory(name: &str) -> Arc<Self> {
        let config = EngineConfig {
            sync_on_commit: false,
            ..EngineConfig::default()
        };
        Arc::new(Self::ephemeral(name, config, None))
    }

    fn replay(name: &str, log: &LogFile) -> Result<Database> {
        let started = Instant::now();
        let bytes = log.read_all()?;
        let body = bytes.get(HEADER_LEN as usize..).unwrap_or_default();
        let mut reader = Reader::new(body, HEADER_LEN);
        let mut db = Database::new(name, HEADER_LEN);
        let mut count = 0usize;
        while !reader.at_end() {
            let obj = reader.get_object()?;
            db = db.install(&obj)?;
            count += 1;
        }
        debug!(
            database = name,
            objects = count,
            bytes = reader.offset(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "replayed log"
        );
        Ok(db.with_position(reader.offset()))
    }

    /// Begin a transaction on the latest committed snapshot.
    pub fn begin(self: &Arc<Self>, auto_commit: bool) -> Transaction {
        Transaction::new(Arc::clone(self), self.current(), auto_commit)
    }

    pub fn current(&self) -> Database {
        self.current.read().unwrap().clone()
    }

    /// Current log length in bytes.
    pub fn log_len(&self) -> u64 {
        self.log.lock().unwrap().len()
    }

    /// Every object committed before `upto`, in log order.
    pub fn log_objects(&self, upto: u64) -> Result<Vec<DbObject>> {
        let log = self.log.lock().unwrap();
        let upto = upto.min(log.len());
        if upto <= HEADER_LEN {
            return Ok(Vec::new());
        }
        let bytes = log.read_range(HEADER_LEN, upto)?;
        decode_all(&bytes, HEADER_LEN)
    }

    /// Validate `tr` against everything committed since it began and
    /// append its pending objects.
    pub fn commit(&self, tr: &Transaction) -> Result<Database> {
        if tr.pending_count() == 0 {
            return Ok(self.current());
        }
        let started = Instant::now();
        let mut log = self.log.lock().unwrap();
        let end = log.len();
        let start = tr.start_position();

        if end > start {
            let newer = decode_all(&log.read_range(start, end)?, start)?;
            self.check_conflicts(tr, &newer)?;
        }

        let mut db = self.current();
        let mut map = UidMap::new();
        let mut w = Writer::new();
        let mut records = 0u64;
        for obj in tr.pending() {
            let uid = Uid::at_offset(end + w.len() as u64);
            map = map.with(obj.uid(), uid);
            let fixed = obj.fix(&map);
            w.put_object(&fixed)?;
            db = db.install(&fixed).inspect_err(|e| {
                if e.is_structural() {
                    self.note(|m| m.record_structural_violation());
                }
            })?;
            records += 1;
        }

        log.append(w.as_bytes())?;
        if self.config.sync_on_commit {
            log.sync()?;
        }
        let db = db.with_position(log.len());
        *self.current.write().unwrap() = db.clone();
        drop(log);

        let elapsed = started.elapsed();
        let slow = self
            .metrics
            .as_ref()
            .filter(|_| self.config.metrics_enabled)
            .is_some_and(|m| {
                m.record_commit(&self.name, elapsed.as_micros() as u64, records, w.len() as u64)
            });
        if slow || elapsed.as_millis() as u64 >= self.config.slow_commit_threshold_ms {
            warn!(
                database = %self.name,
                elapsed_ms = elapsed.as_millis() as u64,
                records,
                "slow commit"
            );
        }
        debug!(
            database = %self.name,
            records,
            bytes = w.len(),
            position = db.position(),
            "commit"
        );
        Ok(db)
    }

    fn check_conflicts(&self, tr: &Transaction, newer: &[DbObject]) -> Result<()> {
        for committed in newer {
            if committed.check(tr.read_set()) {
                self.note(|m| m.record_read_conflict());
                warn!(database = %self.name, uid = %committed.uid(), "read conflict");
                return Err(DbError::ReadConflict(committed.uid()));
            }
            for pending in tr.pending() {
                if committed.conflicts(pending) {
                    self.note(|m| m.record_write_conflict());
                    warn!(
                        database = %self.name,
                        committed = %committed.uid(),
                        pending = %pending.uid(),
                        "write conflict"
                    );
                    return Err(DbError::WriteConflict(committed.uid(), pending.uid()));
                }
            }
        }
        Ok(())
    }

    fn note(&self, f: impl FnOnce(&Metrics)) {
        if self.config.metrics_enabled {
            if let Some(m) = &self.metrics {
                f(m);
            }
        }
    }

    pub(crate) fn note_rollback(&self) {
        self.note(|m| m.record_rollback());
    }

    /// Increment connection count when a client opens the database
    pub fn add_connection(&self) {
        self.connection_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement connection count when a client closes the database
    pub fn remove_connection(&self) {
        self.connection_count.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn connection_count(&self) -> usize {
        self.connection_count.load(Ordering::SeqCst)
    }

    /// Check if database is in use (has any connections)
    pub fn is_in_use(&self) -> bool {
        self.connection_count() > 0
    }

    /// Number of user tables (for stats)
    pub fn table_count(&self) -> usize {
        self.current.read().unwrap().tables().count()
    }
}

/// Database information for listings
#[derive(Debug, Clone)]
pub struct DatabaseInfo {
    pub name: String,
    pub ephemeral: bool,
    pub table_count: usize,
    pub log_bytes: u64,
    pub connection_count: usize,
}

/// Registry of open databases.
///
/// Supports both persistent and ephemeral (in-memory) databases.
/// Persistent databases live in `base_path` as `<name>.sdb`.
pub struct DatabaseManager {
    databases: RwLock<HashMap<String, Arc<SharedDatabase>>>,
    base_path: PathBuf,
    config: EngineConfig,
    metrics: Arc<Metrics>,
}

impl DatabaseManager {
    pub fn new(base_path: PathBuf) -> Self {
        Self::with_config(base_path, EngineConfig::default())
    }

    pub fn with_config(base_path: PathBuf, config: EngineConfig) -> Self {
        let metrics = Arc::new(Metrics::with_slow_threshold(config.slow_commit_threshold_ms));
        Self {
            databases: RwLock::new(HashMap::new()),
            base_path,
            config,
            metrics,
        }
    }

    /// Use the config file in `base_path` when there is one.
    pub fn from_dir(base_path: PathBuf) -> Result<Self> {
        let config = EngineConfig::read_from(&base_path)?.unwrap_or_default();
        Ok(Self::with_config(base_path, config))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Validate database name
    ///
    /// Allowed characters: [a-zA-Z0-9_-]
    /// Length: 1-128 characters
    fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() || name.len() > 128 {
            return Err(DbError::InvalidDatabaseName(
                "Name must be 1-128 characters".to_string(),
            ));
        }
        let valid = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(DbError::InvalidDatabaseName(
                "Name can only contain a-z, A-Z, 0-9, _, -".to_string(),
            ));
        }
        Ok(())
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.base_path.join(format!("{}.sdb", name))
    }

    fn metrics_handle(&self) -> Option<Arc<Metrics>> {
        self.config
            .metrics_enabled
            .then(|| Arc::clone(&self.metrics))
    }

    /// Create a new database
    ///
    /// # Arguments
    /// * `name` - Database name (alphanumeric, _, -)
    /// * `ephemeral` - If true, the log is kept in memory only
    pub fn create_database(&self, name: &str, ephemeral: bool) -> Result<Arc<SharedDatabase>> {
        Self::validate_name(name)?;
        let mut databases = self.databases.write().unwrap();
        if databases.contains_key(name) {
            return Err(DbError::DatabaseExists(name.to_string()));
        }
        let config = self.config.clone();
        let database = if ephemeral {
            SharedDatabase::ephemeral(name, config, self.metrics_handle())
        } else {
            let path = self.path_of(name);
            if path.exists() {
                return Err(DbError::DatabaseExists(name.to_string()));
            }
            SharedDatabase::create(name, &path, config, self.metrics_handle())?
        };
        let database = Arc::new(database);
        databases.insert(name.to_string(), Arc::clone(&database));
        info!(database = name, ephemeral, "created database");
        Ok(database)
    }

    /// Open a persistent database from its log, or return it if it is
    /// already open.
    pub fn open_database(&self, name: &str) -> Result<Arc<SharedDatabase>> {
        Self::validate_name(name)?;
        let mut databases = self.databases.write().unwrap();
        if let Some(db) = databases.get(name) {
            return Ok(Arc::clone(db));
        }
        let path = self.path_of(name);
        if !path.exists() {
            return Err(DbError::DatabaseNotFound(name.to_string()));
        }
        let database = Arc::new(SharedDatabase::open(
            name,
            &path,
            self.config.clone(),
            self.metrics_handle(),
        )?);
        databases.insert(name.to_string(), Arc::clone(&database));
        info!(database = name, bytes = database.log_len(), "opened database");
        Ok(database)
    }

    /// Get an open database by name
    pub fn get_database(&self, name: &str) -> Result<Arc<SharedDatabase>> {
        let databases = self.databases.read().unwrap();
        databases
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::DatabaseNotFound(name.to_string()))
    }

    /// Check if a database is open
    pub fn database_exists(&self, name: &str) -> bool {
        self.databases.read().unwrap().contains_key(name)
    }

    /// Drop a database (must not be in use). The log file is deleted.
    pub fn drop_database(&self, name: &str) -> Result<()> {
        let mut databases = self.databases.write().unwrap();
        let db = databases
            .get(name)
            .ok_or_else(|| DbError::DatabaseNotFound(name.to_string()))?;
        if db.is_in_use() {
            return Err(DbError::DatabaseInUse(name.to_string()));
        }
        if !db.ephemeral {
            let path = self.path_of(name);
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
        }
        databases.remove(name);
        info!(database = name, "dropped database");
        Ok(())
    }

    /// List all open databases
    pub fn list_databases(&self) -> Vec<DatabaseInfo> {
        let databases = self.databases.read().unwrap();
        databases
            .values()
            .map(|db| DatabaseInfo {
                name: db.name.clone(),
                ephemeral: db.ephemeral,
                table_count: db.table_count(),
                log_bytes: db.log_len(),
                connection_count: db.connection_count(),
            })
            .collect()
    }

    /// Cleanup ephemeral database if it has no connections
    ///
    /// Called after `remove_connection()` to automatically clean up
    /// ephemeral databases when the last client disconnects.
    pub fn cleanup_ephemeral_if_unused(&self, name: &str) {
        let mut databases = self.databases.write().unwrap();
        if let Some(db) = databases.get(name) {
            if db.ephemeral && !db.is_in_use() {
                databases.remove(name);
                debug!(database = name, "removed unused ephemeral database");
            }
        }
    }
}

#[cfg(test)]
mod database_tests {
    use super::*;
    use crate::value::{DataType, Value};
    use tempfile::tempdir;

    fn quiet() -> EngineConfig {
        EngineConfig {
            sync_on_commit: false,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_database_connection_tracking() {
        let db = SharedDatabase::in_memory("test");
        assert_eq!(db.connection_count(), 0);
        assert!(!db.is_in_use());

        db.add_connection();
        db.add_connection();
        assert_eq!(db.connection_count(), 2);
        assert!(db.is_in_use());

        db.remove_connection();
        db.remove_connection();
        assert!(!db.is_in_use());
    }

    #[test]
    fn test_database_concurrent_connection_tracking() {
        use std::thread;

        let db = SharedDatabase::in_memory("test");
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let db = Arc::clone(&db);
                thread::spawn(move || {
                    db.add_connection();
                    thread::sleep(std::time::Duration::from_millis(1));
                    db.remove_connection();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(db.connection_count(), 0);
    }

    #[test]
    fn test_empty_commit_appends_nothing() {
        let db = SharedDatabase::in_memory("test");
        let before = db.log_len();
        let snap = db.begin(false).commit().unwrap();
        assert_eq!(db.log_len(), before);
        assert_eq!(snap.position(), HEADER_LEN);
    }

    #[test]
    fn test_commit_assigns_offsets() {
        let db = SharedDatabase::in_memory("test");
        let (tr, t) = db.begin(false).create_table("t").unwrap();
        let (tr, _) = tr.add_column(t, "a", DataType::Integer, vec![]).unwrap();
        let snap = tr.commit().unwrap();

        let table = snap.lookup_table("t").unwrap();
        assert_eq!(table.uid, Uid::at_offset(HEADER_LEN));
        let col = table.ordered_columns().next().unwrap();
        assert!(col.uid.is_committed());
        assert_eq!(col.table, table.uid);
        assert_eq!(snap.position(), db.log_len());
        assert_eq!(db.current().position(), snap.position());
    }

    #[test]
    fn test_cross_references_are_translated() {
        let db = SharedDatabase::in_memory("test");
        let (tr, t) = db.begin(false).create_table("t").unwrap();
        let (tr, a) = tr.add_column(t, "a", DataType::Integer, vec![]).unwrap();
        let (tr, _) = tr.create_index(t, true, vec![a], Uid::NONE).unwrap();
        let (tr, row) = tr.insert(t, vec![(a, Value::int(7))]).unwrap();
        let tr = tr.update(t, row, vec![(a, Value::int(8))]).unwrap();
        let snap = tr.commit().unwrap();

        let table = snap.lookup_table("t").unwrap();
        let pk = snap.primary_index(table.uid).unwrap();
        assert!(pk.columns.iter().all(|c| c.is_committed()));
        let (defpos, version) = table.rows.iter().next().unwrap();
        assert!(defpos.is_committed() && version.is_committed());
        assert_eq!(pk.rows.lookup(&[Value::int(8)]), Some(defpos.raw()));
    }

    #[test]
    fn test_reopen_replays_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r.sdb");
        let committed = {
            let db = Arc::new(SharedDatabase::create("r", &path, quiet(), None).unwrap());
            let (tr, t) = db.begin(false).create_table("t").unwrap();
            let (tr, a) = tr.add_column(t, "a", DataType::String, vec![]).unwrap();
            let (tr, _) = tr.insert(t, vec![(a, Value::str("x"))]).unwrap();
            tr.commit().unwrap()
        };

        let db = SharedDatabase::open("r", &path, quiet(), None).unwrap();
        let replayed = db.current();
        assert_eq!(replayed.position(), committed.position());
        let t = replayed.lookup_table("t").unwrap();
        assert_eq!(t.rows.len(), 1);
        assert_eq!(t.uid, committed.lookup_table("t").unwrap().uid);
    }

    #[test]
    fn test_log_objects_respects_bound() {
        let db = SharedDatabase::in_memory("test");
        let (tr, _) = db.begin(false).create_table("a").unwrap();
        let first = tr.commit().unwrap().position();
        let (tr, _) = db.begin(false).create_table("b").unwrap();
        tr.commit().unwrap();

        assert_eq!(db.log_objects(first).unwrap().len(), 1);
        assert_eq!(db.log_objects(u64::MAX).unwrap().len(), 2);
    }

    #[test]
    fn test_conflicts_feed_metrics() {
        let metrics = Arc::new(Metrics::new());
        let db = Arc::new(SharedDatabase::ephemeral("m", quiet(), Some(Arc::clone(&metrics))));
        let a = db.begin(false).create_table("x").unwrap().0;
        let b = db.begin(false).create_table("x").unwrap().0;
        a.commit().unwrap();
        assert!(matches!(b.commit(), Err(DbError::WriteConflict(..))));

        let snap = metrics.snapshot();
        assert_eq!(snap.commit_count, 1);
        assert_eq!(snap.write_conflicts, 1);
        assert_eq!(snap.read_conflicts, 0);
    }
}
