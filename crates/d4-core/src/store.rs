//! Capability interface for the external datastores.
//!
//! Section 6 of the protocol names keys and per-key operations, not a
//! storage engine. This trait collects exactly the operations the session
//! pipeline issues - all single-key, none requiring a multi-key transaction -
//! so metadata and stream backends can be swapped independently of the
//! pipeline logic. Tests use [`crate::memory::InMemoryDatastore`]; production
//! wires this to whatever key/stream store operators run.
//!
//! Every method is async because the backing store is the only thing in this
//! crate allowed to suspend (see the connection-level concurrency model);
//! header decoding and HMAC computation stay synchronous.

use async_trait::async_trait;

use crate::error::StoreError;

/// Single-key/stream operations issued against an external datastore.
///
/// Implementations must be cheap to clone (e.g. an `Arc` handle) since a
/// clone is handed to every connection task.
#[async_trait]
pub trait Datastore: Clone + Send + Sync + 'static {
    /// Add `member` to the set at `key`. Idempotent.
    async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError>;

    /// Remove `member` from the set at `key`. Idempotent.
    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError>;

    /// Whether `member` is present in the set at `key`.
    async fn ismember(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Set field `field` of the hash at `key` to `value`.
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;

    /// Read field `field` of the hash at `key`.
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    /// Delete field `field` of the hash at `key`.
    async fn hdel(&self, key: &str, field: &str) -> Result<(), StoreError>;

    /// Whether field `field` exists on the hash at `key`.
    async fn hexists(&self, key: &str, field: &str) -> Result<bool, StoreError>;

    /// Append `value` to the stream at `key`. Returns nothing - ordering is
    /// implied by call order within one connection (see `xlen`).
    async fn xadd(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// Number of entries appended to the stream at `key`.
    async fn xlen(&self, key: &str) -> Result<u64, StoreError>;

    /// Delete the entire stream at `key` (used to discard a rejected
    /// session's partial stream).
    async fn xdel_stream(&self, key: &str) -> Result<(), StoreError>;

    /// Increment the integer score of `member` in the sorted map at `key` by
    /// one.
    async fn zincrby(&self, key: &str, member: &str) -> Result<(), StoreError>;

    /// Push `value` to the front of the list at `key`.
    async fn lpush(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Trim the list at `key` to at most `len` elements, keeping the most
    /// recently pushed ones.
    async fn ltrim(&self, key: &str, len: usize) -> Result<(), StoreError>;

    /// Set the string value at `key`.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Read the string value at `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Set hash field `field` of `key` to `value` only if that field is
    /// currently absent. Returns whether the write happened - the
    /// conditional primitive `first_seen` needs to stay idempotent under
    /// concurrent sensors sharing a sensor-id.
    async fn hsetnx(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError>;

    /// Delete the value at `key` entirely, regardless of its type.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
