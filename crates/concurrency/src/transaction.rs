//! Transaction context
//!
//! A `TransactionContext` buffers everything one transaction intends to
//! record: key registrations and ordered facts. It reads through a snapshot
//! of the log taken when the transaction began, overlaid with a working set
//! of its own pending changes (read-your-writes).
//!
//! Operations validate eagerly against schema and current values, so by
//! the time a routine asks to commit, every buffered fact is already known
//! to be well-formed. The first failing operation poisons the context and
//! the commit is refused even if the caller ignored that error.

use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use freezer_core::{
    validate_key_name, EntityId, Fact, FreezerError, FreezerResult, KeyDef, SnapshotView,
    Transaction, TxId, Value,
};
use freezer_storage::LogSnapshot;

use crate::validation::{check_added_value, check_entity, check_removed_value};

/// Error type for commit failures
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    /// Commit-time validation found a problem
    #[error("validation failed: {0}")]
    ValidationFailed(crate::validation::ValidationResult),

    /// An operation inside the transaction failed earlier
    #[error("transaction poisoned by earlier failure: {0}")]
    Poisoned(String),

    /// Transaction was not in the correct state for commit
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// WAL write failed; nothing was published
    #[error("WAL error: {0}")]
    Wal(#[source] FreezerError),
}

impl From<CommitError> for FreezerError {
    fn from(e: CommitError) -> Self {
        match e {
            CommitError::ValidationFailed(result) => FreezerError::aborted(format!(
                "validation failed: {} conflict(s)",
                result.conflict_count()
            )),
            CommitError::Poisoned(reason) => FreezerError::aborted(reason),
            CommitError::InvalidState(msg) => FreezerError::aborted(msg),
            CommitError::Wal(inner) => inner,
        }
    }
}

/// How many instances a collection retract removes when the same value is
/// asserted more than once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetractMode {
    /// Remove the earliest matching instance
    #[default]
    One,
    /// Remove every matching instance
    All,
}

/// Transaction lifecycle
///
/// State transitions:
/// - `Active` → `Validating` (begin commit)
/// - `Validating` → `Committed` (validation passed, published)
/// - `Validating` → `Aborted` (validation or WAL failure)
/// - `Active` → `Aborted` (routine failed)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Transaction is executing, can read/write
    Active,
    /// Transaction is being validated for commit
    Validating,
    /// Transaction committed successfully
    Committed,
    /// Transaction was aborted
    Aborted {
        /// Human-readable reason for abort
        reason: String,
    },
}

/// Counts of buffered work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingOperations {
    /// Keys to register
    pub keys: usize,
    /// Add facts
    pub adds: usize,
    /// Retract facts
    pub retracts: usize,
}

impl PendingOperations {
    /// Total number of buffered operations
    pub fn total(&self) -> usize {
        self.keys + self.adds + self.retracts
    }

    /// Whether nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

type WorkingKey = (EntityId, String);

/// Buffered state of one in-flight transaction
pub struct TransactionContext {
    /// Log as of transaction start
    snapshot: LogSnapshot,
    /// Keys registered by this transaction, in order
    pending_keys: Vec<KeyDef>,
    /// Facts to record, in order
    facts: Vec<Fact>,
    /// Current asserted values for every (id, key) this transaction touched
    working: FxHashMap<WorkingKey, SmallVec<[Value; 1]>>,
    retract_mode: RetractMode,
    /// First operation failure, if any
    failure: Option<String>,
    /// Current transaction status
    pub status: TransactionStatus,
    start_time: Instant,
}

impl std::fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionContext")
            .field("start_tx", &self.start_tx())
            .field("pending", &self.pending_operations())
            .field("status", &self.status)
            .finish()
    }
}

impl TransactionContext {
    /// Begin a transaction reading through `snapshot`
    pub fn new(snapshot: LogSnapshot, retract_mode: RetractMode) -> Self {
        Self {
            snapshot,
            pending_keys: Vec::new(),
            facts: Vec::new(),
            working: FxHashMap::default(),
            retract_mode,
            failure: None,
            status: TransactionStatus::Active,
            start_time: Instant::now(),
        }
    }

    /// Transaction id of the snapshot this transaction reads
    pub fn start_tx(&self) -> TxId {
        self.snapshot.tx_id()
    }

    // === Schema ===

    /// Definition of `name`, including keys registered by this transaction
    pub fn key(&self, name: &str) -> Option<KeyDef> {
        self.pending_keys
            .iter()
            .find(|k| k.name == name)
            .cloned()
            .or_else(|| self.snapshot.key(name))
    }

    fn require_key(&self, name: &str) -> FreezerResult<KeyDef> {
        self.key(name).ok_or_else(|| FreezerError::unknown_key(name))
    }

    /// Register a key
    ///
    /// Returns `Ok(false)` when an identical definition already exists, in
    /// which case nothing is recorded.
    pub fn register_key(&mut self, def: KeyDef) -> FreezerResult<bool> {
        self.ensure_active()?;
        let result = self.register_key_inner(def);
        self.note(result)
    }

    fn register_key_inner(&mut self, def: KeyDef) -> FreezerResult<bool> {
        validate_key_name(&def.name)?;
        match self.key(&def.name) {
            Some(existing) if existing.same_shape(&def) => Ok(false),
            Some(existing) => Err(FreezerError::DuplicateKey {
                name: def.name,
                existing_type: existing.value_type,
                existing_collection: existing.collection,
            }),
            None => {
                self.pending_keys.push(def);
                Ok(true)
            }
        }
    }

    // === Reads ===

    /// Values currently asserted for (id, key), including pending changes
    ///
    /// Non-collection keys yield at most one value. Collection keys yield
    /// their values in assertion order.
    pub fn values(&self, id: EntityId, key: &str) -> FreezerResult<Vec<Value>> {
        check_entity(id)?;
        self.require_key(key)?;
        Ok(self.current(id, key).into_vec())
    }

    fn current(&self, id: EntityId, key: &str) -> SmallVec<[Value; 1]> {
        match self.working.get(&(id, key.to_string())) {
            Some(values) => values.clone(),
            None => self.snapshot.values(id, key).into_iter().collect(),
        }
    }

    fn working_entry(&mut self, id: EntityId, key: &str) -> &mut SmallVec<[Value; 1]> {
        let snapshot = &self.snapshot;
        self.working
            .entry((id, key.to_string()))
            .or_insert_with(|| snapshot.values(id, key).into_iter().collect())
    }

    // === Writes ===

    /// Assert `value` for (id, key)
    ///
    /// For a non-collection key any other asserted value is retracted in
    /// the same transaction; re-adding the current value records nothing.
    pub fn add(&mut self, id: EntityId, key: &str, value: Value) -> FreezerResult<()> {
        self.ensure_active()?;
        let result = self.add_inner(id, key, value);
        self.note(result)
    }

    fn add_inner(&mut self, id: EntityId, key: &str, value: Value) -> FreezerResult<()> {
        let def = self.require_key(key)?;
        check_added_value(&def, id, &value)?;

        if !def.collection {
            let current = self.current(id, key);
            if current.len() == 1 && current[0] == value {
                return Ok(());
            }
            for old in current {
                self.facts.push(Fact::retract(id, key, old));
            }
            let entry = self.working_entry(id, key);
            entry.clear();
            entry.push(value.clone());
        } else {
            self.working_entry(id, key).push(value.clone());
        }

        self.facts.push(Fact::add(id, key, value));
        Ok(())
    }

    /// Retract `value` from (id, key) if it is currently asserted
    ///
    /// Fails with `InvalidValue` when no asserted value equals `value`.
    pub fn remove(&mut self, id: EntityId, key: &str, value: Value) -> FreezerResult<()> {
        self.ensure_active()?;
        let result = self.remove_inner(id, key, value);
        self.note(result)
    }

    fn remove_inner(&mut self, id: EntityId, key: &str, value: Value) -> FreezerResult<()> {
        let def = self.require_key(key)?;
        check_removed_value(&def, id, &value)?;

        let mode = self.retract_mode;
        let entry = self.working_entry(id, key);
        let matching = entry.iter().filter(|v| **v == value).count();
        if matching == 0 {
            return Err(FreezerError::InvalidValue {
                key: key.to_string(),
                id,
                reason: if entry.is_empty() {
                    "no value is asserted".to_string()
                } else {
                    format!("{} is not currently asserted", value)
                },
            });
        }

        let removals = match mode {
            RetractMode::One => 1,
            RetractMode::All => matching,
        };
        for _ in 0..removals {
            if let Some(pos) = entry.iter().position(|v| *v == value) {
                entry.remove(pos);
            }
        }
        for _ in 0..removals {
            self.facts.push(Fact::retract(id, key, value.clone()));
        }
        Ok(())
    }

    // === Lifecycle ===

    fn note<T>(&mut self, result: FreezerResult<T>) -> FreezerResult<T> {
        if let Err(e) = &result {
            if self.failure.is_none() {
                self.failure = Some(e.to_string());
            }
        }
        result
    }

    /// First operation failure recorded by this transaction
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Check if transaction can accept operations
    pub fn ensure_active(&self) -> FreezerResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(FreezerError::invalid_argument(format!(
                "transaction is not active: {:?}",
                self.status
            )))
        }
    }

    /// Whether the transaction is still accepting operations
    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    /// Whether the transaction committed
    pub fn is_committed(&self) -> bool {
        self.status == TransactionStatus::Committed
    }

    /// Whether the transaction aborted
    pub fn is_aborted(&self) -> bool {
        matches!(self.status, TransactionStatus::Aborted { .. })
    }

    /// Reason the transaction aborted, if it did
    pub fn abort_reason(&self) -> Option<&str> {
        match &self.status {
            TransactionStatus::Aborted { reason } => Some(reason),
            _ => None,
        }
    }

    /// `Active` → `Validating`
    pub fn mark_validating(&mut self) -> FreezerResult<()> {
        self.ensure_active()?;
        self.status = TransactionStatus::Validating;
        Ok(())
    }

    /// `Validating` → `Committed`
    pub fn mark_committed(&mut self) -> FreezerResult<()> {
        match &self.status {
            TransactionStatus::Validating => {
                self.status = TransactionStatus::Committed;
                Ok(())
            }
            other => Err(FreezerError::invalid_argument(format!(
                "cannot commit transaction from state {:?}",
                other
            ))),
        }
    }

    /// Abort and discard everything buffered
    pub fn mark_aborted(&mut self, reason: impl Into<String>) {
        if matches!(
            self.status,
            TransactionStatus::Committed | TransactionStatus::Aborted { .. }
        ) {
            return;
        }
        self.status = TransactionStatus::Aborted {
            reason: reason.into(),
        };
        self.pending_keys.clear();
        self.facts.clear();
        self.working.clear();
    }

    /// Summary of buffered work
    pub fn pending_operations(&self) -> PendingOperations {
        let adds = self.facts.iter().filter(|f| f.is_add()).count();
        PendingOperations {
            keys: self.pending_keys.len(),
            adds,
            retracts: self.facts.len() - adds,
        }
    }

    /// Whether the transaction would record nothing
    pub fn is_empty(&self) -> bool {
        self.pending_keys.is_empty() && self.facts.is_empty()
    }

    /// Keys registered by this transaction
    pub fn pending_keys(&self) -> &[KeyDef] {
        &self.pending_keys
    }

    /// Facts buffered by this transaction
    pub fn facts(&self) -> &[Fact] {
        &self.facts
    }

    /// Freeze the buffered work into a transaction numbered `tx_id`
    pub fn to_transaction(&self, tx_id: TxId) -> Transaction {
        Transaction::new(tx_id, self.pending_keys.clone(), self.facts.clone())
    }

    /// Time since the transaction began
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}
