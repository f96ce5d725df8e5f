//! Hierarchy-aware slot map.
//!
//! [`AncestorMap`] stores values keyed by member identity and, on a miss,
//! retries the lookup with the key re-owned by each ancestor of the requested
//! owner in [`HierarchyTree::ancestry`] order. An inherited field read through a
//! subclass and a call through an overriding type therefore find the entry
//! registered on the declaring type.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::metadata::{hierarchy::HierarchyTree, identity::Ancestral};

/// A map from [`Ancestral`] keys to values with inherited lookup.
#[derive(Debug, Clone)]
pub struct AncestorMap<K: Ancestral, V> {
    entries: FxHashMap<K, V>,
    hierarchy: Rc<HierarchyTree>,
}

impl<K: Ancestral, V> AncestorMap<K, V> {
    /// Creates an empty map resolving ancestors through `hierarchy`.
    #[must_use]
    pub fn new(hierarchy: Rc<HierarchyTree>) -> Self {
        Self {
            entries: FxHashMap::default(),
            hierarchy,
        }
    }

    /// Inserts an entry for exactly `key`, returning the previous value.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.entries.insert(key, value)
    }

    /// Finds the key under which `key` or its nearest ancestor is registered.
    #[must_use]
    pub fn resolve_key(&self, key: &K) -> Option<K> {
        if self.entries.contains_key(key) {
            return Some(key.clone());
        }
        self.hierarchy
            .ancestry(key.owner())
            .skip(1)
            .map(|owner| key.with_owner(owner))
            .find(|candidate| self.entries.contains_key(candidate))
    }

    /// Looks up `key`, walking up the hierarchy on a miss.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        if let Some(value) = self.entries.get(key) {
            return Some(value);
        }
        let found = self.resolve_key(key)?;
        self.entries.get(&found)
    }

    /// Mutable variant of [`AncestorMap::get`].
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let found = self.resolve_key(key)?;
        self.entries.get_mut(&found)
    }

    /// Returns the entry for `key` or an ancestor, inserting `default()` under
    /// `key` itself when neither exists.
    pub fn get_or_insert_with(&mut self, key: K, default: impl FnOnce() -> V) -> &mut V {
        let found = self.resolve_key(&key).unwrap_or(key);
        self.entries.entry(found).or_insert_with(default)
    }

    /// Returns `true` if `key` or an ancestor key is present.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.resolve_key(key).is_some()
    }

    /// Iterates the directly registered entries.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter()
    }

    /// Number of directly registered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The hierarchy used for ancestor lookups.
    #[must_use]
    pub fn hierarchy(&self) -> &Rc<HierarchyTree> {
        &self.hierarchy
    }
}
