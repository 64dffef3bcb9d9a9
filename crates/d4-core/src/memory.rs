#![allow(clippy::disallowed_types, reason = "synchronous in-memory operations only")]

//! In-memory [`Datastore`] for tests and local development.
//!
//! Backs both the metadata store and the stream store in the test suite; the
//! two are still logically distinct because [`crate::metadata_store::MetadataStore`]
//! and [`crate::stream_store::StreamStore`] each hold their own handle.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use crate::{error::StoreError, store::Datastore};

#[derive(Default)]
struct Inner {
    sets: HashMap<String, HashSet<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
    streams: HashMap<String, Vec<Vec<u8>>>,
    sorted: HashMap<String, HashMap<String, i64>>,
    lists: HashMap<String, VecDeque<String>>,
    strings: HashMap<String, String>,
}

/// In-memory, process-local implementation of [`Datastore`].
///
/// Clones share the same underlying state through an `Arc<Mutex<_>>`, same as
/// a real client handle would.
#[derive(Clone, Default)]
pub struct InMemoryDatastore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryDatastore {
    /// Create a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Datastore for InMemoryDatastore {
    async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.inner.lock().unwrap().sets.entry(key.to_string()).or_default().insert(
            member.to_string(),
        );
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        if let Some(set) = self.inner.lock().unwrap().sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn ismember(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        Ok(self.inner.lock().unwrap().sets.get(key).is_some_and(|s| s.contains(member)))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.lock().unwrap().hashes.get(key).and_then(|h| h.get(field).cloned()))
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<(), StoreError> {
        if let Some(hash) = self.inner.lock().unwrap().hashes.get_mut(key) {
            hash.remove(field);
        }
        Ok(())
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        Ok(self.inner.lock().unwrap().hashes.get(key).is_some_and(|h| h.contains_key(field)))
    }

    async fn xadd(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.inner.lock().unwrap().streams.entry(key.to_string()).or_default().push(value);
        Ok(())
    }

    async fn xlen(&self, key: &str) -> Result<u64, StoreError> {
        Ok(self.inner.lock().unwrap().streams.get(key).map_or(0, |s| s.len() as u64))
    }

    async fn xdel_stream(&self, key: &str) -> Result<(), StoreError> {
        self.inner.lock().unwrap().streams.remove(key);
        Ok(())
    }

    async fn zincrby(&self, key: &str, member: &str) -> Result<(), StoreError> {
        *self
            .inner
            .lock()
            .unwrap()
            .sorted
            .entry(key.to_string())
            .or_default()
            .entry(member.to_string())
            .or_insert(0) += 1;
        Ok(())
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .lists
            .entry(key.to_string())
            .or_default()
            .push_front(value.to_string());
        Ok(())
    }

    async fn ltrim(&self, key: &str, len: usize) -> Result<(), StoreError> {
        if let Some(list) = self.inner.lock().unwrap().lists.get_mut(key) {
            list.truncate(len);
        }
        Ok(())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.lock().unwrap().strings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.lock().unwrap().strings.get(key).cloned())
    }

    async fn hsetnx(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let hash = inner.hashes.entry(key.to_string()).or_default();
        if hash.contains_key(field) {
            return Ok(false);
        }
        hash.insert(field.to_string(), value.to_string());
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.strings.remove(key);
        inner.hashes.remove(key);
        inner.sets.remove(key);
        inner.streams.remove(key);
        inner.sorted.remove(key);
        inner.lists.remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hsetnx_only_writes_once() {
        let store = InMemoryDatastore::new();
        assert!(store.hsetnx("h", "first_seen", "1").await.unwrap());
        assert!(!store.hsetnx("h", "first_seen", "2").await.unwrap());
        assert_eq!(store.hget("h", "first_seen").await.unwrap(), Some("1".to_string()));
    }

    #[tokio::test]
    async fn lpush_ltrim_keeps_most_recent() {
        let store = InMemoryDatastore::new();
        for v in ["a", "b", "c"] {
            store.lpush("k", v).await.unwrap();
            store.ltrim("k", 2).await.unwrap();
        }
        let inner = store.inner.lock().unwrap();
        let list: Vec<_> = inner.lists.get("k").unwrap().iter().cloned().collect();
        assert_eq!(list, vec!["c".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn xadd_xlen_tracks_order() {
        let store = InMemoryDatastore::new();
        store.xadd("s", b"one".to_vec()).await.unwrap();
        store.xadd("s", b"two".to_vec()).await.unwrap();
        assert_eq!(store.xlen("s").await.unwrap(), 2);
        store.xdel_stream("s").await.unwrap();
        assert_eq!(store.xlen("s").await.unwrap(), 0);
    }
}
