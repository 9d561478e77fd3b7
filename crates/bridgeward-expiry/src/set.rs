//! The set flavour: an [`ExpiringMap`] with unit values.

use std::fmt;
use std::hash::Hash;
use std::time::{Duration, Instant};

use crate::{ExpiringMap, ExpiryError, ExpiryMode};

/// A set whose members disappear `ttl` after they were last added.
///
/// Used for questions like "which players were reported online recently?".
pub struct ExpiringSet<K> {
    map: ExpiringMap<K, ()>,
}

impl<K> ExpiringSet<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new(ttl: Duration, mode: ExpiryMode) -> Result<Self, ExpiryError> {
        Ok(Self {
            map: ExpiringMap::new(ttl, mode)?,
        })
    }

    pub fn eager(ttl: Duration) -> Result<Self, ExpiryError> {
        Self::new(ttl, ExpiryMode::Eager)
    }

    pub fn lazy(ttl: Duration) -> Result<Self, ExpiryError> {
        Self::new(ttl, ExpiryMode::Lazy)
    }

    pub fn ttl(&self) -> Duration {
        self.map.ttl()
    }

    /// Adds or refreshes `key`.
    pub fn insert(&self, key: K) {
        self.map.insert(key, ());
    }

    pub fn insert_many(&self, keys: impl IntoIterator<Item = K>) {
        self.map.insert_many(keys.into_iter().map(|k| (k, ())));
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.contains(key)
    }

    /// Returns `true` if `key` was a live member.
    pub fn remove(&self, key: &K) -> bool {
        self.map.remove(key).is_some()
    }

    pub fn remove_many<'a>(&self, keys: impl IntoIterator<Item = &'a K>) -> usize
    where
        K: 'a,
    {
        self.map.remove_many(keys)
    }

    /// See [`ExpiringMap::extend`].
    pub fn extend(&self, key: &K, extra: Duration) -> bool {
        self.map.extend(key, extra)
    }

    pub fn time_remaining(&self, key: &K) -> Option<Duration> {
        self.map.time_remaining(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Snapshot of the live members.
    pub fn members(&self) -> Vec<K> {
        self.map.keys()
    }

    pub fn members_with_expiry(&self) -> Vec<(K, Instant)> {
        self.map
            .entries_with_expiry()
            .into_iter()
            .map(|(k, (), at)| (k, at))
            .collect()
    }

    pub fn clear(&self) {
        self.map.clear();
    }

    pub fn compact(&self) {
        self.map.compact();
    }

    pub fn shutdown(&self) {
        self.map.shutdown();
    }
}

impl<K> fmt::Debug for ExpiringSet<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExpiringSet").field(&self.map).finish()
    }
}
