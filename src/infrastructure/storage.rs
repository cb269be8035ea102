//! Concurrent maps backing the registry.
//!
//! Reads never hold a shard guard beyond the call: values are cloned out
//! (they are `Arc`s or small copies), so callers can freely call back into the
//! same map without risking a dead lock on a DashMap shard.

use std::borrow::Borrow;
use std::hash::Hash;

use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Thread-safe sharded storage backed by DashMap with ahash hashing.
#[derive(Debug)]
pub struct ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    map: DashMap<K, V, RandomState>,
}

impl<K, V> ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            map: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Insert or replace a value, returning the previous one.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.map.insert(key, value)
    }

    /// Insert only when the key is vacant. Returns whether the value was stored.
    pub fn insert_if_absent(&self, key: K, value: V) -> bool {
        match self.map.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(value);
                true
            }
        }
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.remove(key).map(|(_, value)| value)
    }

    /// Remove a key only if `predicate` holds for its current value.
    pub fn remove_if<Q>(&self, key: &Q, predicate: impl FnOnce(&V) -> bool) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map
            .remove_if(key, |_, value| predicate(value))
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&self) {
        self.map.clear();
    }

    /// Run `accessor` on the value for `key`, creating it with `factory` first
    /// if needed. The shard stays locked only for the duration of the call.
    pub fn with_entry_mut<R>(
        &self,
        key: K,
        factory: impl FnOnce() -> V,
        accessor: impl FnOnce(&mut V) -> R,
    ) -> R {
        let mut value = self.map.entry(key).or_insert_with(factory);
        accessor(&mut value)
    }

    /// Retain only the elements that satisfy the predicate.
    pub fn retain(&self, f: impl FnMut(&K, &mut V) -> bool) {
        self.map.retain(f);
    }
}

impl<K, V> ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(key).map(|value| value.value().clone())
    }

    /// Get the value for `key`, inserting the one built by `factory` if absent.
    ///
    /// Concurrent callers racing on the same key all receive the same value.
    pub fn get_or_insert_with(&self, key: K, factory: impl FnOnce() -> V) -> V {
        if let Some(value) = self.map.get(&key) {
            return value.value().clone();
        }
        self.map.entry(key).or_insert_with(factory).value().clone()
    }

    /// Snapshot of all values.
    pub fn values(&self) -> Vec<V> {
        self.map.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Snapshot of all entries.
    pub fn entries(&self) -> Vec<(K, V)> {
        self.map
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

impl<K, V> Default for ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
