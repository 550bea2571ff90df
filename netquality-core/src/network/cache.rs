use crate::{
    defaults::MAX_NETWORK_QUALITY_CACHE_SIZE,
    network::{CachedNetworkQuality, NetworkId},
};
use std::collections::HashMap;

/// Remembers the last known [`NetworkQuality`] of recently used networks.
///
/// The cache holds at most `capacity` entries (and never more than
/// [`MAX_NETWORK_QUALITY_CACHE_SIZE`]). When a new network is inserted in
/// a full cache, the entry with the oldest update time is evicted first.
/// Updating a network already in the cache never evicts anything.
///
/// Finding the oldest entry is a linear scan, which is fine for the
/// handful of entries this cache is limited to.
///
/// [`NetworkQuality`]: crate::network::NetworkQuality
#[derive(Debug, Clone)]
pub struct NetworkQualityCache {
    entries: HashMap<NetworkId, CachedNetworkQuality>,
    capacity: usize,
}

impl NetworkQualityCache {
    /// create a cache of [`MAX_NETWORK_QUALITY_CACHE_SIZE`] entries
    pub fn new() -> Self {
        Self::with_capacity(MAX_NETWORK_QUALITY_CACHE_SIZE)
    }

    /// create a cache of `capacity` entries
    ///
    /// the capacity is clamped to `1..=MAX_NETWORK_QUALITY_CACHE_SIZE`.
    pub fn with_capacity(capacity: usize) -> Self {
        debug_assert!(
            (1..=MAX_NETWORK_QUALITY_CACHE_SIZE).contains(&capacity),
            "invalid cache capacity {capacity}"
        );
        let capacity = capacity.clamp(1, MAX_NETWORK_QUALITY_CACHE_SIZE);

        Self {
            entries: HashMap::with_capacity(capacity),
            capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, network_id: &NetworkId) -> Option<&CachedNetworkQuality> {
        self.entries.get(network_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NetworkId, &CachedNetworkQuality)> {
        self.entries.iter()
    }

    /// Insert or update the quality of `network_id`.
    ///
    /// Returns the entry that was evicted to make room, if any.
    pub fn insert(
        &mut self,
        network_id: NetworkId,
        cached: CachedNetworkQuality,
    ) -> Option<(NetworkId, CachedNetworkQuality)> {
        debug_assert!(self.entries.len() <= self.capacity);

        let evicted = if !self.entries.contains_key(&network_id)
            && self.entries.len() >= self.capacity
        {
            self.evict_oldest()
        } else {
            None
        };

        self.entries.insert(network_id, cached);

        debug_assert!(self.entries.len() <= self.capacity);
        evicted
    }

    fn evict_oldest(&mut self) -> Option<(NetworkId, CachedNetworkQuality)> {
        let oldest = self
            .iter()
            .reduce(|oldest, entry| {
                if entry.1.older_than(oldest.1) {
                    entry
                } else {
                    oldest
                }
            })
            .map(|(network_id, _)| network_id.clone())?;

        self.entries.remove_entry(&oldest)
    }
}

impl Default for NetworkQualityCache {
    fn default() -> Self {
        Self::new()
    }
}
