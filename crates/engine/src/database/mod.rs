//! Store: the top-level handle
//!
//! A `Store` owns the log, the writer (transaction manager + WAL) and the
//! configuration. Mutations go through [`Store::transactor`]; reads go
//! through [`Store::current_database`]; compaction goes through
//! [`Store::exclusive`].
//!
//! # Files
//!
//! ```text
//! <data dir>/
//!   freezer.toml   configuration (written with defaults on first open)
//!   freezer.wal    write-ahead log
//!   .lock          exclusive lock held while the store is open
//! ```

pub mod config;

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{info, warn};

use freezer_concurrency::{RecoveryCoordinator, RetractMode, TransactionManager};
use freezer_core::{FreezerError, FreezerResult};
use freezer_durability::{cleanup_stale_rewrite, DurabilityMode, WAL_FILE_NAME};
use freezer_storage::{LogStats, LogStore};

use crate::coordinator::{TransactionCoordinator, TransactionMetrics};
use crate::snapshot::Database;
use crate::transactor::Transactor;
use crate::trim::ExclusiveAccess;
pub use config::{FreezerConfig, CONFIG_FILE_NAME};

/// Lock file name placed in the data directory
pub const LOCK_FILE_NAME: &str = ".lock";

/// Embedded fact store
pub struct Store {
    /// Data directory; None for a cache store
    data_dir: Option<PathBuf>,
    /// Configuration (mirrors freezer.toml)
    config: FreezerConfig,
    pub(crate) durability_mode: Option<DurabilityMode>,
    pub(crate) retract_mode: RetractMode,
    /// The log; replaced wholesale by trim
    pub(crate) log: Arc<LogStore>,
    pub(crate) coordinator: TransactionCoordinator,
    /// Periodic fsync for batched durability
    flusher: Option<BackgroundFlush>,
    /// Exclusive lock file preventing concurrent process access.
    ///
    /// Held for the lifetime of the Store. None for cache stores.
    _lock_file: Option<File>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("data_dir", &self.data_dir)
            .field("config", &self.config)
            .field("head", &self.log.head())
            .finish()
    }
}

impl Store {
    /// Open the store at `path` with automatic recovery
    ///
    /// Reads `freezer.toml` from the data directory, creating it with
    /// defaults if missing.
    ///
    /// # Flow
    ///
    /// 1. Create data directory if needed
    /// 2. Read or create `freezer.toml`
    /// 3. Acquire the exclusive lock file
    /// 4. Remove any stale WAL rewrite left by an interrupted trim
    /// 5. Replay the WAL
    pub fn open<P: AsRef<Path>>(path: P) -> FreezerResult<Self> {
        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        let config_path = data_dir.join(CONFIG_FILE_NAME);
        FreezerConfig::write_default_if_missing(&config_path)?;
        let config = FreezerConfig::from_file(&config_path)?;

        Self::open_at(data_dir, config)
    }

    /// Open the store at `path` with an explicit configuration
    ///
    /// The supplied config is written to `freezer.toml` so that later
    /// `Store::open()` calls pick up the same settings.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: FreezerConfig) -> FreezerResult<Self> {
        config.validate()?;
        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;
        config.write_to_file(&data_dir.join(CONFIG_FILE_NAME))?;
        Self::open_at(data_dir, config)
    }

    fn open_at(data_dir: PathBuf, config: FreezerConfig) -> FreezerResult<Self> {
        let durability_mode = config.durability_mode()?;
        let retract_mode = config.retract_mode()?;

        let lock_file = acquire_lock(&data_dir)?;

        let wal_path = data_dir.join(WAL_FILE_NAME);
        cleanup_stale_rewrite(&wal_path)?;

        let result = RecoveryCoordinator::new(wal_path, durability_mode).recover()?;
        if result.stats.discarded_bytes > 0 {
            warn!(
                target: "freezer::db",
                discarded = result.stats.discarded_bytes,
                "Torn WAL tail discarded during recovery"
            );
        }
        info!(
            target: "freezer::db",
            path = %data_dir.display(),
            head = %result.stats.final_tx,
            txns_replayed = result.stats.txns_replayed,
            durability = %config.durability,
            "Store opened"
        );

        let manager = TransactionManager::new(Some(result.wal));
        let coordinator = TransactionCoordinator::new(manager);
        let flusher = match durability_mode {
            DurabilityMode::Batched { interval_ms, .. } => Some(BackgroundFlush::spawn(
                Arc::clone(coordinator.manager()),
                Duration::from_millis(interval_ms),
            )?),
            DurabilityMode::Strict => None,
        };

        Ok(Self {
            data_dir: Some(data_dir),
            config,
            durability_mode: Some(durability_mode),
            retract_mode,
            log: Arc::new(result.log),
            coordinator,
            flusher,
            _lock_file: Some(lock_file),
        })
    }

    /// Create an ephemeral store with no files and no WAL
    ///
    /// Everything is lost when the store is dropped.
    pub fn cache() -> Self {
        Self::build_cache(FreezerConfig::default(), RetractMode::default())
    }

    /// Ephemeral store with an explicit configuration
    ///
    /// Only `collection_retract` has an effect; durability is ignored.
    pub fn cache_with_config(config: FreezerConfig) -> FreezerResult<Self> {
        let retract_mode = config.retract_mode()?;
        Ok(Self::build_cache(config, retract_mode))
    }

    fn build_cache(config: FreezerConfig, retract_mode: RetractMode) -> Self {
        Self {
            data_dir: None,
            config,
            durability_mode: None,
            retract_mode,
            log: Arc::new(LogStore::new()),
            coordinator: TransactionCoordinator::new(TransactionManager::new(None)),
            flusher: None,
            _lock_file: None,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Mutation handle
    pub fn transactor(&self) -> Transactor<'_> {
        Transactor::new(&self.log, &self.coordinator, self.retract_mode)
    }

    /// Read-only view as of the last published transaction
    pub fn current_database(&self) -> Database {
        Database::new(self.log.snapshot())
    }

    /// Exclusive access for administrative operations such as trim
    ///
    /// `&mut self` proves no transactor is in use. Fails with `TrimFailed`
    /// while any `Database` obtained from this store is still alive.
    pub fn exclusive(&mut self) -> FreezerResult<ExclusiveAccess<'_>> {
        if Arc::get_mut(&mut self.log).is_none() {
            return Err(FreezerError::trim_failed(format!(
                "{} database snapshot(s) still alive",
                Arc::strong_count(&self.log) - 1
            )));
        }
        Ok(ExclusiveAccess::new(self))
    }

    /// Log size counters
    pub fn stats(&self) -> LogStats {
        self.log.stats()
    }

    /// Transaction counters
    pub fn metrics(&self) -> TransactionMetrics {
        self.coordinator.metrics()
    }

    /// Configuration in effect
    pub fn config(&self) -> &FreezerConfig {
        &self.config
    }

    /// Whether this is an ephemeral store
    pub fn is_cache(&self) -> bool {
        self.data_dir.is_none()
    }

    /// Data directory, None for a cache store
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Path of the WAL file, None for a cache store
    pub fn wal_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join(WAL_FILE_NAME))
    }

    /// Force all batched WAL writes to disk
    ///
    /// For cache stores this is a no-op.
    pub fn flush(&self) -> FreezerResult<()> {
        self.coordinator.flush()
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Some(flusher) = self.flusher.take() {
            flusher.stop();
        }
        if let Err(e) = self.coordinator.flush() {
            warn!(target: "freezer::db", error = %e, "Final WAL flush failed");
        }
    }
}

fn acquire_lock(data_dir: &Path) -> FreezerResult<File> {
    let lock_path = data_dir.join(LOCK_FILE_NAME);
    let lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(&lock_path)?;
    fs2::FileExt::try_lock_exclusive(&lock_file).map_err(|_| {
        FreezerError::Io(std::io::Error::new(
            std::io::ErrorKind::WouldBlock,
            format!(
                "store at '{}' is already in use by another process",
                data_dir.display()
            ),
        ))
    })?;
    Ok(lock_file)
}

// ============================================================================
// Background flush
// ============================================================================

/// Thread that fsyncs batched WAL writes on an interval
///
/// Bounds the window of unsynced commits when writes stop arriving.
struct BackgroundFlush {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundFlush {
    fn spawn(manager: Arc<TransactionManager>, interval: Duration) -> FreezerResult<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&shutdown);
        let handle = std::thread::Builder::new()
            .name("freezer-wal-flush".to_string())
            .spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    std::thread::park_timeout(interval);
                    if stop.load(Ordering::Acquire) {
                        break;
                    }
                    if let Err(e) = manager.flush() {
                        warn!(target: "freezer::wal", error = %e, "Background WAL flush failed");
                    }
                }
            })?;
        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }

    fn stop(mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freezer_core::{EntityId, TxId, Value, ValueType};
    use tempfile::TempDir;

    #[test]
    fn test_cache_store() {
        let store = Store::cache();
        assert!(store.is_cache());
        assert!(store.data_dir().is_none());
        assert!(store.wal_path().is_none());
        assert_eq!(store.current_database().tx_id(), TxId::ZERO);
        store.flush().unwrap();
    }

    #[test]
    fn test_open_creates_files() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        assert!(!store.is_cache());
        assert!(dir.path().join(CONFIG_FILE_NAME).exists());
        assert!(dir.path().join(WAL_FILE_NAME).exists());
        assert!(dir.path().join(LOCK_FILE_NAME).exists());
        assert_eq!(store.config(), &FreezerConfig::default());
    }

    #[test]
    fn test_second_open_is_locked_out() {
        let dir = TempDir::new().unwrap();
        let _store = Store::open(dir.path()).unwrap();
        let err = Store::open(dir.path()).unwrap_err();
        assert!(matches!(err, FreezerError::Io(_)));
    }

    #[test]
    fn test_lock_released_on_drop() {
        let dir = TempDir::new().unwrap();
        drop(Store::open(dir.path()).unwrap());
        assert!(Store::open(dir.path()).is_ok());
    }

    #[test]
    fn test_open_with_bad_config_fails() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "durability = \"never\"\n").unwrap();
        let err = Store::open(dir.path()).unwrap_err();
        assert!(matches!(err, FreezerError::InvalidArgument(_)));
    }

    #[test]
    fn test_open_with_config_persists_settings() {
        let dir = TempDir::new().unwrap();
        let config = FreezerConfig {
            durability: "always".into(),
            collection_retract: "all".into(),
        };
        drop(Store::open_with_config(dir.path(), config.clone()).unwrap());
        let store = Store::open(dir.path()).unwrap();
        assert_eq!(store.config(), &config);
    }

    #[test]
    fn test_exclusive_refused_while_database_alive() {
        let mut store = Store::cache();
        let db = store.current_database();
        let err = store.exclusive().unwrap_err();
        assert!(matches!(err, FreezerError::TrimFailed { .. }));
        drop(db);
        assert!(store.exclusive().is_ok());
    }

    #[test]
    fn test_reopen_recovers_data() {
        let dir = TempDir::new().unwrap();
        let id = {
            let store = Store::open(dir.path()).unwrap();
            let tx = store.transactor();
            tx.add_key("name", ValueType::String, false).unwrap();
            let id = tx.generate_new_id();
            tx.add_value("Alice", "name", id).unwrap();
            id
        };

        let store = Store::open(dir.path()).unwrap();
        let db = store.current_database();
        assert_eq!(db.tx_id(), TxId::new(2));
        assert_eq!(db.value(id, "name"), Some(Value::from("Alice")));
        assert!(!store.current_database().contains(EntityId::new()));
    }
}
