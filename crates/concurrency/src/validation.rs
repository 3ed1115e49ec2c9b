//! Validation for transactions
//!
//! Two layers:
//! - **Operation checks** run as each add/remove is buffered: entity id
//!   present, value type matches the key, value usable.
//! - **Commit validation** re-checks the whole buffered transaction against
//!   the live log right before it is assigned an id. Transactions run inside
//!   the writer's critical section, so this normally finds nothing; it
//!   guards the invariant that a transaction is only ever applied on top of
//!   the head it was built against.

use freezer_core::{EntityId, FreezerError, FreezerResult, KeyDef, TxId, Value, ValueType};
use freezer_storage::LogStore;

use crate::transaction::TransactionContext;

// ============================================================================
// Operation checks
// ============================================================================

/// Reject the nil id, which stands for "no entity"
pub fn check_entity(id: EntityId) -> FreezerResult<()> {
    if id.is_nil() {
        return Err(FreezerError::invalid_argument("entity id is missing"));
    }
    Ok(())
}

fn check_type(def: &KeyDef, value: &Value) -> FreezerResult<()> {
    let actual = value.value_type();
    if actual != def.value_type {
        return Err(FreezerError::TypeMismatch {
            key: def.name.clone(),
            expected: def.value_type,
            actual,
        });
    }
    Ok(())
}

/// Checks for a value about to be asserted
pub fn check_added_value(def: &KeyDef, id: EntityId, value: &Value) -> FreezerResult<()> {
    check_entity(id)?;
    check_type(def, value)?;
    match value {
        Value::Real(r) if r.is_nan() => Err(FreezerError::invalid_argument(format!(
            "NaN cannot be stored under '{}'",
            def.name
        ))),
        Value::Ref(target) if target.is_nil() => Err(FreezerError::invalid_argument(format!(
            "reference under '{}' points at no entity",
            def.name
        ))),
        _ => Ok(()),
    }
}

/// Checks for a value about to be retracted
pub fn check_removed_value(def: &KeyDef, id: EntityId, value: &Value) -> FreezerResult<()> {
    check_entity(id)?;
    check_type(def, value)
}

// ============================================================================
// Commit validation
// ============================================================================

/// A problem found at commit time
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictType {
    /// The log advanced after the transaction took its snapshot
    HeadMoved {
        /// Head the transaction was built against
        expected: TxId,
        /// Head at commit time
        actual: TxId,
    },
    /// A fact refers to a key that is neither registered nor pending
    UnregisteredKey {
        /// Key name
        key: String,
    },
    /// A fact's value does not match its key's type
    WrongType {
        /// Key name
        key: String,
        /// Declared type
        expected: ValueType,
        /// Type recorded in the fact
        actual: ValueType,
    },
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictType::HeadMoved { expected, actual } => {
                write!(f, "log moved from {} to {}", expected, actual)
            }
            ConflictType::UnregisteredKey { key } => write!(f, "key '{}' is not registered", key),
            ConflictType::WrongType {
                key,
                expected,
                actual,
            } => write!(f, "key '{}' expects {}, fact holds {}", key, expected, actual),
        }
    }
}

/// Outcome of commit validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResult {
    /// Every problem found
    pub conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// A result with no conflicts
    pub fn ok() -> Self {
        Self::default()
    }

    /// Whether the transaction may commit
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Number of conflicts found
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }
}

impl std::fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.conflicts.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Validate a buffered transaction against the live log
pub fn validate_transaction(txn: &TransactionContext, log: &LogStore) -> ValidationResult {
    let mut result = ValidationResult::ok();

    let head = log.head();
    if head != txn.start_tx() {
        result.conflicts.push(ConflictType::HeadMoved {
            expected: txn.start_tx(),
            actual: head,
        });
    }

    for fact in txn.facts() {
        match txn.key(&fact.key) {
            None => result.conflicts.push(ConflictType::UnregisteredKey {
                key: fact.key.clone(),
            }),
            Some(def) if def.value_type != fact.value.value_type() => {
                result.conflicts.push(ConflictType::WrongType {
                    key: def.name,
                    expected: def.value_type,
                    actual: fact.value.value_type(),
                })
            }
            Some(_) => {}
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::RetractMode;
    use freezer_core::{ErrorKind, Transaction};
    use std::sync::Arc;

    fn real_key() -> KeyDef {
        KeyDef::new("score", ValueType::Real, false)
    }

    #[test]
    fn test_check_added_value() {
        let id = EntityId::new();
        assert!(check_added_value(&real_key(), id, &Value::Real(1.5)).is_ok());
        assert_eq!(
            check_added_value(&real_key(), id, &Value::Real(f64::NAN))
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            check_added_value(&real_key(), id, &Value::Integer(1))
                .unwrap_err()
                .kind(),
            ErrorKind::TypeMismatch
        );
        assert_eq!(
            check_added_value(&real_key(), EntityId::nil(), &Value::Real(1.0))
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn test_nil_reference_rejected() {
        let def = KeyDef::new("friend", ValueType::Ref, true);
        let err = check_added_value(&def, EntityId::new(), &Value::Ref(EntityId::nil()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_check_removed_value_allows_nan() {
        // NaN never matches, so the retract fails later as InvalidValue
        assert!(check_removed_value(&real_key(), EntityId::new(), &Value::Real(f64::NAN)).is_ok());
    }

    #[test]
    fn test_validate_clean_transaction() {
        let log = Arc::new(LogStore::new());
        let mut txn = TransactionContext::new(log.snapshot(), RetractMode::One);
        txn.register_key(real_key()).unwrap();
        txn.add(EntityId::new(), "score", Value::Real(2.0)).unwrap();
        assert!(validate_transaction(&txn, &log).is_valid());
    }

    #[test]
    fn test_validate_detects_moved_head() {
        let log = Arc::new(LogStore::new());
        let txn = TransactionContext::new(log.snapshot(), RetractMode::One);
        log.apply(Transaction::new(TxId::new(1), vec![real_key()], vec![]))
            .unwrap();

        let result = validate_transaction(&txn, &log);
        assert_eq!(result.conflict_count(), 1);
        assert_eq!(
            result.conflicts[0],
            ConflictType::HeadMoved {
                expected: TxId::ZERO,
                actual: TxId::new(1)
            }
        );
    }
}
