//! Fact index
//!
//! Provides [`FactIndex`], the read-only lookup built once per run from all
//! source records. Supports:
//! - Exact lookup by `(entity, value, kind)`
//! - Value lookup across entities
//! - Entity-scoped lookup
//! - Known-name scanning for entity claims
//! - Address membership for citation round-trips
//!
//! Iteration order is source order everywhere, so every consumer that
//! takes "the first" candidate is deterministic.

use crate::fact::{Fact, FactKey, FactKind};
use crate::normalize::{contains_words, normalize_text};
use gr_core::{SourceAddress, SourceRecord};
use indexmap::{IndexMap, IndexSet};

/// Text facts longer than this many words are prose, not names
pub const MAX_NAME_WORDS: usize = 6;

/// A name an entity claim can be matched against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownName {
    /// Case-folded name
    pub folded: String,
    /// Case-folded owning entity
    pub entity: String,
    /// Fact that backs the name
    pub fact: usize,
}

/// Build statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Records offered to the builder
    pub records_seen: usize,
    /// Facts produced
    pub facts_indexed: usize,
    /// Records without a comparable value
    pub records_skipped: usize,
}

/// Normalized, addressable lookup of all facts in a run
#[derive(Debug, Clone, Default)]
pub struct FactIndex {
    facts: Vec<Fact>,
    by_key: IndexMap<FactKey, Vec<usize>>,
    by_value: IndexMap<(FactKind, String), Vec<usize>>,
    by_entity: IndexMap<String, Vec<usize>>,
    names: Vec<KnownName>,
    addresses: IndexSet<SourceAddress>,
    stats: IndexStats,
}

impl FactIndex {
    /// Build the index from source records
    ///
    /// One fact per usable record. Collisions (same entity, same value)
    /// stay distinct facts addressable by source.
    #[must_use]
    pub fn build<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a SourceRecord>,
    {
        let mut index = Self::default();

        for record in records {
            index.stats.records_seen += 1;
            let Some(fact) = Fact::from_record(record) else {
                index.stats.records_skipped += 1;
                tracing::warn!(
                    "Skipping record without comparable value: {} ({})",
                    record.field_name,
                    record.address
                );
                continue;
            };
            index.insert(fact);
        }

        index.collect_names();
        index.stats.facts_indexed = index.facts.len();
        tracing::debug!(
            "Built fact index: {} facts, {} entities, {} skipped",
            index.facts.len(),
            index.by_entity.len(),
            index.stats.records_skipped
        );
        index
    }

    fn insert(&mut self, fact: Fact) {
        let id = self.facts.len();
        let entity = normalize_text(&fact.owning_entity);

        self.by_key.entry(fact.key()).or_default().push(id);
        self.by_value
            .entry((fact.kind, fact.normalized_value.clone()))
            .or_default()
            .push(id);
        self.by_entity.entry(entity).or_default().push(id);
        self.addresses.insert(fact.source_address.clone());
        self.facts.push(fact);
    }

    /// Text facts that look like names, then entity names without an
    /// identical text fact. Those are backed by the entity's first text
    /// fact containing the name, else by its first fact.
    fn collect_names(&mut self) {
        let mut seen: IndexSet<(String, String)> = IndexSet::new();

        for (id, fact) in self.facts.iter().enumerate() {
            if fact.kind != FactKind::Text
                || fact.normalized_value.split(' ').count() > MAX_NAME_WORDS
            {
                continue;
            }
            let entity = normalize_text(&fact.owning_entity);
            if seen.insert((fact.normalized_value.clone(), entity.clone())) {
                self.names.push(KnownName {
                    folded: fact.normalized_value.clone(),
                    entity,
                    fact: id,
                });
            }
        }

        for (entity, ids) in &self.by_entity {
            if !seen.insert((entity.clone(), entity.clone())) {
                continue;
            }
            let backing = ids
                .iter()
                .copied()
                .find(|&id| {
                    let fact = &self.facts[id];
                    fact.kind == FactKind::Text && contains_words(&fact.normalized_value, entity)
                })
                .or_else(|| ids.first().copied());
            if let Some(fact) = backing {
                self.names.push(KnownName {
                    folded: entity.clone(),
                    entity: entity.clone(),
                    fact,
                });
            }
        }
    }

    /// All facts in source order
    #[inline]
    #[must_use]
    pub fn facts(&self) -> &[Fact] {
        &self.facts
    }

    /// Fact by position
    #[inline]
    #[must_use]
    pub fn get(&self, id: usize) -> Option<&Fact> {
        self.facts.get(id)
    }

    /// Number of facts
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    /// True when no record produced a fact
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Build statistics
    #[inline]
    #[must_use]
    pub fn stats(&self) -> IndexStats {
        self.stats
    }

    /// Exact lookup
    pub fn lookup(&self, key: &FactKey) -> impl Iterator<Item = &Fact> + '_ {
        self.resolve_ids(self.by_key.get(key))
    }

    /// All facts with the given value, across entities
    pub fn lookup_value(&self, kind: FactKind, normalized_value: &str) -> impl Iterator<Item = &Fact> + '_ {
        self.resolve_ids(self.by_value.get(&(kind, normalized_value.to_string())))
    }

    /// Facts with the given value owned by `entity`
    pub fn lookup_in_entity(
        &self,
        entity: &str,
        kind: FactKind,
        normalized_value: &str,
    ) -> impl Iterator<Item = &Fact> + '_ {
        self.lookup(&FactKey::new(entity, normalized_value, kind))
    }

    /// All facts owned by `entity`
    pub fn facts_for_entity(&self, entity: &str) -> impl Iterator<Item = &Fact> + '_ {
        self.resolve_ids(self.by_entity.get(&normalize_text(entity)))
    }

    /// Names entity claims are matched against
    #[inline]
    #[must_use]
    pub fn known_names(&self) -> &[KnownName] {
        &self.names
    }

    /// True if `address` belongs to an indexed fact
    #[inline]
    #[must_use]
    pub fn contains_address(&self, address: &SourceAddress) -> bool {
        self.addresses.contains(address)
    }

    fn resolve_ids<'a>(&'a self, ids: Option<&'a Vec<usize>>) -> impl Iterator<Item = &'a Fact> + 'a {
        ids.into_iter()
            .flatten()
            .filter_map(move |&id| self.facts.get(id))
    }
}
