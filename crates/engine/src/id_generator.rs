//! Entity identifier generation
//!
//! Ids are random UUID v4 values. A candidate is rejected if it is nil or
//! already appears anywhere in the retained history, so a fresh id never
//! aliases a committed entity. Generation commits nothing and takes no
//! writer lock.

use freezer_core::EntityId;
use freezer_storage::LogStore;

/// Candidates tried before giving up
///
/// Reaching this bound means the random source is broken, not that the
/// id space is actually full.
const MAX_ATTEMPTS: usize = 64;

/// Fresh entity id never seen in `log`
pub fn generate_new_id(log: &LogStore) -> EntityId {
    generate_with(log, EntityId::new)
}

pub(crate) fn generate_with(log: &LogStore, mut source: impl FnMut() -> EntityId) -> EntityId {
    for _ in 0..MAX_ATTEMPTS {
        let candidate = source();
        if !candidate.is_nil() && !log.has_history(candidate) {
            return candidate;
        }
    }
    panic!("entity id space exhausted after {} attempts", MAX_ATTEMPTS);
}
