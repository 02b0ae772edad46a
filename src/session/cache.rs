//! Per-session object descriptor cache.
//!
//! An arena keyed by the device's own stable integer handles. Callers
//! hold handles across mutations, never references: growing the cache
//! while someone is iterating a listing cannot invalidate anything,
//! which is the failure mode this design exists to rule out.
//!
//! Entries expire after the configured TTL, since a camera keeps
//! creating and deleting objects behind the host's back.

use std::collections::HashMap;

use tokio::time::{Duration, Instant};

use crate::codec::ObjectInfo;
use crate::proto::ObjectHandle;

#[derive(Debug, Clone)]
struct Entry {
    info: ObjectInfo,
    fetched: Instant,
}

/// Object descriptors by handle, with per-entry freshness.
#[derive(Debug)]
pub struct ObjectCache {
    entries: HashMap<ObjectHandle, Entry>,
    ttl: Duration,
}

impl ObjectCache {
    /// An empty cache whose entries stay fresh for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// Number of entries, fresh or stale.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts or refreshes the descriptor for `handle`.
    pub fn insert(&mut self, handle: ObjectHandle, info: ObjectInfo) {
        self.entries.insert(
            handle,
            Entry {
                info,
                fetched: Instant::now(),
            },
        );
    }

    /// The descriptor for `handle`, if cached and still fresh.
    #[must_use]
    pub fn get(&self, handle: ObjectHandle) -> Option<&ObjectInfo> {
        let entry = self.entries.get(&handle)?;
        (entry.fetched.elapsed() <= self.ttl).then_some(&entry.info)
    }

    /// Forgets `handle`, returning its descriptor if one was cached.
    pub fn remove(&mut self, handle: ObjectHandle) -> Option<ObjectInfo> {
        self.entries.remove(&handle).map(|e| e.info)
    }

    /// Drops every entry older than the TTL.
    pub fn prune(&mut self) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.fetched.elapsed() <= ttl);
    }

    /// Drops everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Every cached handle, unordered.
    #[must_use]
    pub fn handles(&self) -> Vec<ObjectHandle> {
        self.entries.keys().copied().collect()
    }

    /// Handles of the fresh entries whose parent edge points at
    /// `parent`, sorted for stable iteration.
    #[must_use]
    pub fn children_of(&self, parent: ObjectHandle) -> Vec<ObjectHandle> {
        let mut children: Vec<ObjectHandle> = self
            .entries
            .iter()
            .filter(|(_, entry)| {
                entry.info.parent_object == parent && entry.fetched.elapsed() <= self.ttl
            })
            .map(|(&handle, _)| handle)
            .collect();
        children.sort();
        children
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_object_info;
    use crate::proto::StorageId;

    fn info(parent: ObjectHandle) -> ObjectInfo {
        let mut info = test_object_info(StorageId(0x0001_0001), "DSC_0001.JPG", 1024);
        info.parent_object = parent;
        info
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_get_remove() {
        let mut cache = ObjectCache::new(Duration::from_secs(2));
        let handle = ObjectHandle(0x1001);

        assert!(cache.get(handle).is_none());
        cache.insert(handle, info(ObjectHandle::ROOT));
        assert_eq!(cache.get(handle).unwrap().filename, "DSC_0001.JPG");

        let removed = cache.remove(handle).unwrap();
        assert_eq!(removed.filename, "DSC_0001.JPG");
        assert!(cache.get(handle).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let mut cache = ObjectCache::new(Duration::from_secs(2));
        let handle = ObjectHandle(0x1001);
        cache.insert(handle, info(ObjectHandle::ROOT));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(cache.get(handle).is_none());

        // Stale entries survive until pruned.
        assert_eq!(cache.len(), 1);
        cache.prune();
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_children_listing_is_sorted_and_fresh() {
        let mut cache = ObjectCache::new(Duration::from_secs(2));
        let folder = ObjectHandle(0x2000);
        cache.insert(ObjectHandle(0x1003), info(folder));
        cache.insert(ObjectHandle(0x1001), info(folder));
        cache.insert(ObjectHandle(0x1002), info(ObjectHandle::ROOT));

        assert_eq!(
            cache.children_of(folder),
            vec![ObjectHandle(0x1001), ObjectHandle(0x1003)]
        );

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(cache.children_of(folder).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handles_stay_valid_across_growth() {
        let mut cache = ObjectCache::new(Duration::from_secs(60));
        let first = ObjectHandle(0x1001);
        cache.insert(first, info(ObjectHandle::ROOT));

        // A handle taken before heavy growth still resolves after it.
        for i in 0..1000u32 {
            cache.insert(ObjectHandle(0x2000 + i), info(ObjectHandle::ROOT));
        }
        assert!(cache.get(first).is_some());
    }
}
