//! Dataset-scoped sequential identifiers.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// Local identifier, allocated from 1 upward in first-seen order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(u64);

impl LocalId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Binds database identities (or any value-compared key) to [`LocalId`]s.
///
/// Keys are compared by value, so two separately decoded copies of the same
/// identity resolve to the same local id. There is no eviction: a registry
/// lives as long as its dataset.
#[derive(Debug, Clone)]
pub struct IdentityRegistry<K> {
    ids: AHashMap<K, LocalId>,
    next: u64,
}

impl<K: Eq + Hash + Clone> IdentityRegistry<K> {
    pub fn new() -> Self {
        Self {
            ids: AHashMap::new(),
            next: 1,
        }
    }

    /// Local id for `key`, allocating the next one on first sight.
    pub fn local_id_for(&mut self, key: &K) -> LocalId {
        if let Some(id) = self.ids.get(key) {
            return *id;
        }
        let id = LocalId(self.next);
        self.next += 1;
        self.ids.insert(key.clone(), id);
        id
    }

    /// Look up without allocating.
    pub fn lookup(&self, key: &K) -> Option<LocalId> {
        self.ids.get(key).copied()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.ids.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Forget every binding and restart numbering at 1.
    pub fn clear(&mut self) {
        self.ids.clear();
        self.next = 1;
    }
}

impl<K: Eq + Hash + Clone> Default for IdentityRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}
