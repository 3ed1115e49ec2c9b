//! Per-(entity, key) fact chains
//!
//! Every committed fact is appended to the chain for its (entity, key)
//! pair. A chain is ordered by commit, so the asserted set as of any
//! transaction is a fold over the chain's prefix:
//!
//! - `Add` appends one instance
//! - `Retract` removes the earliest equal instance
//!
//! The same rule drives in-memory apply, recovery and compaction, which
//! keeps all three consistent.

use dashmap::DashMap;
use freezer_core::{EntityId, Fact, Polarity, TxId, Value};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// One committed fact as recorded in a chain
#[derive(Debug, Clone, PartialEq)]
pub struct ChainEntry {
    /// Transaction that committed the fact
    pub tx_id: TxId,
    /// Position of the fact within its transaction
    pub seq: u32,
    /// Add or retract
    pub polarity: Polarity,
    /// The value
    pub value: Value,
}

/// Ordered history of facts for one (entity, key) pair
///
/// Alongside the history the chain keeps the asserted values as of its
/// newest entry, so reads at or past that point skip the fold.
#[derive(Debug, Clone, Default)]
pub struct FactChain {
    entries: Vec<ChainEntry>,
    current: SmallVec<[Value; 1]>,
}

impl FactChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a committed fact
    ///
    /// Entries must arrive in commit order.
    pub fn push(&mut self, entry: ChainEntry) {
        debug_assert!(self
            .entries
            .last()
            .map_or(true, |last| (last.tx_id, last.seq) < (entry.tx_id, entry.seq)));
        match entry.polarity {
            Polarity::Add => self.current.push(entry.value.clone()),
            Polarity::Retract => {
                if let Some(pos) = self.current.iter().position(|v| *v == entry.value) {
                    self.current.remove(pos);
                }
            }
        }
        self.entries.push(entry);
    }

    /// Whether `bound` sees every entry, making the cached set exact
    fn covers(&self, bound: TxId) -> bool {
        self.entries.last().map_or(true, |last| last.tx_id <= bound)
    }

    /// Number of recorded facts, adds and retracts alike
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the chain has no facts
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The add entries still asserted as of `bound`, in assertion order
    pub fn asserted_at(&self, bound: TxId) -> SmallVec<[&ChainEntry; 1]> {
        let mut live: SmallVec<[&ChainEntry; 1]> = SmallVec::new();
        for entry in self.entries.iter().take_while(|e| e.tx_id <= bound) {
            match entry.polarity {
                Polarity::Add => live.push(entry),
                Polarity::Retract => {
                    if let Some(pos) = live.iter().position(|e| e.value == entry.value) {
                        live.remove(pos);
                    }
                }
            }
        }
        live
    }

    /// The asserted values as of `bound`
    pub fn values_at(&self, bound: TxId) -> Vec<Value> {
        if self.covers(bound) {
            return self.current.to_vec();
        }
        self.asserted_at(bound)
            .into_iter()
            .map(|e| e.value.clone())
            .collect()
    }

    /// Whether any value is asserted as of `bound`
    pub fn has_values_at(&self, bound: TxId) -> bool {
        if self.covers(bound) {
            return !self.current.is_empty();
        }
        !self.asserted_at(bound).is_empty()
    }
}

/// Entity index: EntityId → key name → chain
///
/// Sharded by entity through `DashMap`, so readers of one entity never
/// wait on the writer touching another.
#[derive(Debug, Default)]
pub struct EntityIndex {
    entities: DashMap<EntityId, FxHashMap<String, FactChain>>,
}

impl EntityIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one committed fact
    pub fn apply_fact(&self, tx_id: TxId, seq: u32, fact: &Fact) {
        let mut chains = self.entities.entry(fact.id).or_default();
        chains.entry(fact.key.clone()).or_default().push(ChainEntry {
            tx_id,
            seq,
            polarity: fact.polarity,
            value: fact.value.clone(),
        });
    }

    /// Asserted values for (id, key) as of `bound`
    pub fn values_at(&self, id: EntityId, key: &str, bound: TxId) -> Vec<Value> {
        self.entities
            .get(&id)
            .and_then(|chains| chains.get(key).map(|chain| chain.values_at(bound)))
            .unwrap_or_default()
    }

    /// Whether the entity has any asserted fact as of `bound`
    pub fn contains_at(&self, id: EntityId, bound: TxId) -> bool {
        self.entities.get(&id).map_or(false, |chains| {
            chains
                .values()
                .any(|chain| chain.has_values_at(bound))
        })
    }

    /// Whether the entity appears anywhere in recorded history
    pub fn has_history(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Entities with at least one asserted fact as of `bound`, sorted
    pub fn entity_ids_at(&self, bound: TxId) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .entities
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .values()
                    .any(|chain| chain.has_values_at(bound))
            })
            .map(|entry| *entry.key())
            .collect();
        ids.sort();
        ids
    }

    /// Keys with at least one asserted value for `id` as of `bound`, sorted
    pub fn keys_of_at(&self, id: EntityId, bound: TxId) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entities
            .get(&id)
            .map(|chains| {
                chains
                    .iter()
                    .filter(|(_, chain)| chain.has_values_at(bound))
                    .map(|(key, _)| key.clone())
                    .collect()
            })
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Number of entities with recorded history
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Visit every chain with its (entity, key)
    pub fn for_each_chain<F>(&self, mut f: F)
    where
        F: FnMut(EntityId, &str, &FactChain),
    {
        for entry in self.entities.iter() {
            for (key, chain) in entry.value() {
                f(*entry.key(), key, chain);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(tx: u64, seq: u32, polarity: Polarity, value: &str) -> ChainEntry {
        ChainEntry {
            tx_id: TxId::new(tx),
            seq,
            polarity,
            value: Value::from(value),
        }
    }

    #[test]
    fn test_chain_add_then_retract() {
        let mut chain = FactChain::new();
        chain.push(entry(1, 0, Polarity::Add, "Alice"));
        chain.push(entry(2, 0, Polarity::Retract, "Alice"));
        chain.push(entry(2, 1, Polarity::Add, "Bob"));

        assert_eq!(chain.values_at(TxId::new(1)), vec![Value::from("Alice")]);
        assert_eq!(chain.values_at(TxId::new(2)), vec![Value::from("Bob")]);
        assert!(chain.values_at(TxId::ZERO).is_empty());
    }

    #[test]
    fn test_chain_retract_removes_earliest_instance() {
        let mut chain = FactChain::new();
        chain.push(entry(1, 0, Polarity::Add, "x"));
        chain.push(entry(2, 0, Polarity::Add, "y"));
        chain.push(entry(3, 0, Polarity::Add, "x"));
        chain.push(entry(4, 0, Polarity::Retract, "x"));

        let live = chain.asserted_at(TxId::new(4));
        let origins: Vec<u64> = live.iter().map(|e| e.tx_id.as_u64()).collect();
        assert_eq!(origins, vec![2, 3]);
    }

    #[test]
    fn test_chain_cached_values_agree_with_history() {
        let mut chain = FactChain::new();
        assert!(chain.values_at(TxId::new(5)).is_empty());
        assert!(!chain.has_values_at(TxId::new(5)));

        chain.push(entry(1, 0, Polarity::Add, "x"));
        chain.push(entry(2, 0, Polarity::Add, "y"));
        chain.push(entry(3, 0, Polarity::Add, "x"));
        chain.push(entry(4, 0, Polarity::Retract, "x"));
        chain.push(entry(4, 1, Polarity::Retract, "y"));

        // Head and beyond read the cached set
        assert_eq!(chain.values_at(TxId::new(4)), vec![Value::from("x")]);
        assert_eq!(chain.values_at(TxId::new(9)), vec![Value::from("x")]);
        assert!(chain.has_values_at(TxId::new(4)));

        // Older bounds still fold the history
        assert_eq!(
            chain.values_at(TxId::new(3)),
            vec![Value::from("x"), Value::from("y"), Value::from("x")]
        );
        assert!(!chain.has_values_at(TxId::ZERO));

        for tx in 0..=5 {
            let bound = TxId::new(tx);
            let folded: Vec<Value> = chain
                .asserted_at(bound)
                .into_iter()
                .map(|e| e.value.clone())
                .collect();
            assert_eq!(chain.values_at(bound), folded, "bound {}", tx);
        }

        chain.push(entry(5, 0, Polarity::Retract, "x"));
        assert!(!chain.has_values_at(TxId::new(5)));
        assert!(chain.has_values_at(TxId::new(4)));
    }

    #[test]
    fn test_index_values_bounded_by_tx() {
        let index = EntityIndex::new();
        let id = EntityId::new();
        index.apply_fact(TxId::new(1), 0, &Fact::add(id, "tag", Value::from("x")));
        index.apply_fact(TxId::new(2), 0, &Fact::add(id, "tag", Value::from("y")));

        assert_eq!(index.values_at(id, "tag", TxId::new(1)).len(), 1);
        assert_eq!(index.values_at(id, "tag", TxId::new(2)).len(), 2);
        assert!(index.values_at(id, "missing", TxId::new(2)).is_empty());
        assert!(index.values_at(EntityId::new(), "tag", TxId::new(2)).is_empty());
    }

    #[test]
    fn test_index_contains_and_history() {
        let index = EntityIndex::new();
        let id = EntityId::new();
        index.apply_fact(TxId::new(1), 0, &Fact::add(id, "name", Value::from("a")));
        index.apply_fact(TxId::new(2), 0, &Fact::retract(id, "name", Value::from("a")));

        assert!(index.contains_at(id, TxId::new(1)));
        assert!(!index.contains_at(id, TxId::new(2)));
        assert!(index.has_history(id));
        assert_eq!(index.entity_ids_at(TxId::new(1)), vec![id]);
        assert!(index.entity_ids_at(TxId::new(2)).is_empty());
        assert_eq!(index.keys_of_at(id, TxId::new(1)), vec!["name".to_string()]);
    }
}
