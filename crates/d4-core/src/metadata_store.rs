//! Thin typed wrapper over the metadata datastore.
//!
//! Covers blacklist membership, the accepted-type set, per-sensor HMAC key
//! and stream cap overrides, per-sensor/per-day counters, and the sensor
//! `Error` annotation. Every method here is a single-key operation against
//! the [`Datastore`] capability interface - no multi-key transaction is ever
//! required.

use crate::{error::StoreError, store::Datastore};

const KEY_HMAC_DEFAULT: &str = "server:hmac_default_key";
const KEY_ACCEPTED_TYPE: &str = "server:accepted_type";
const KEY_BLACKLIST_IP: &str = "blacklist_ip";
const KEY_BLACKLIST_UUID: &str = "blacklist_uuid";
const KEY_BLACKLIST_IP_BY_UUID: &str = "blacklist_ip_by_uuid";
const KEY_STREAM_MAX_SIZE_BY_UUID: &str = "stream_max_size_by_uuid";

/// Default `stream_max_size` when a sensor has no override.
pub const DEFAULT_STREAM_MAX_SIZE: u64 = 10_000;

fn metadata_key(sensor_id: &str) -> String {
    format!("metadata_uuid:{sensor_id}")
}

fn list_uuid_ip_key(sensor_id: &str) -> String {
    format!("list_uuid_ip:{sensor_id}")
}

/// Typed client for the identity/policy metadata store.
#[derive(Clone)]
pub struct MetadataStore<D> {
    store: D,
}

impl<D: Datastore> MetadataStore<D> {
    /// Wrap a raw datastore handle.
    pub fn new(store: D) -> Self {
        Self { store }
    }

    /// Whether `ip` is in `blacklist_ip`.
    pub async fn is_ip_blacklisted(&self, ip: &str) -> Result<bool, StoreError> {
        self.store.ismember(KEY_BLACKLIST_IP, ip).await
    }

    /// Whether `sensor_id` is in `blacklist_uuid`.
    pub async fn is_sensor_blacklisted(&self, sensor_id: &str) -> Result<bool, StoreError> {
        self.store.ismember(KEY_BLACKLIST_UUID, sensor_id).await
    }

    /// Whether `sensor_id` is in `blacklist_ip_by_uuid`.
    pub async fn is_sensor_ip_blacklisted(&self, sensor_id: &str) -> Result<bool, StoreError> {
        self.store.ismember(KEY_BLACKLIST_IP_BY_UUID, sensor_id).await
    }

    /// Add `ip` to `blacklist_ip` (rule 3 of the admission pipeline: the only
    /// write this store allows to its externally-populated blacklists).
    pub async fn blacklist_ip(&self, ip: &str) -> Result<(), StoreError> {
        self.store.sadd(KEY_BLACKLIST_IP, ip).await
    }

    /// Whether `msg_type` is a member of `server:accepted_type`.
    pub async fn is_type_accepted(&self, msg_type: u8) -> Result<bool, StoreError> {
        self.store.ismember(KEY_ACCEPTED_TYPE, &msg_type.to_string()).await
    }

    /// Reset `server:accepted_type` to exactly `types` (bootstrap only).
    pub async fn reset_accepted_types(&self, types: &[u8]) -> Result<(), StoreError> {
        self.store.delete(KEY_ACCEPTED_TYPE).await?;
        for t in types {
            self.store.sadd(KEY_ACCEPTED_TYPE, &t.to_string()).await?;
        }
        Ok(())
    }

    /// Write the process-wide default HMAC key to the store (advertising to
    /// operators; the in-process copy stays authoritative for signing).
    pub async fn write_default_hmac_key(&self, key: &[u8]) -> Result<(), StoreError> {
        self.store.set(KEY_HMAC_DEFAULT, &hex_encode(key)).await
    }

    /// Per-sensor HMAC key override, if one has been configured.
    pub async fn sensor_hmac_key(&self, sensor_id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let hex = self.store.hget(&metadata_key(sensor_id), "hmac_key").await?;
        Ok(hex.map(|h| hex_decode(&h)))
    }

    /// Per-sensor `stream_max_size` override, falling back to
    /// [`DEFAULT_STREAM_MAX_SIZE`].
    pub async fn stream_max_size(&self, sensor_id: &str) -> Result<u64, StoreError> {
        let value = self.store.hget(KEY_STREAM_MAX_SIZE_BY_UUID, sensor_id).await?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(DEFAULT_STREAM_MAX_SIZE))
    }

    /// Set the sensor's `Error` annotation.
    pub async fn set_error(&self, sensor_id: &str, message: &str) -> Result<(), StoreError> {
        self.store.hset(&metadata_key(sensor_id), "Error", message).await
    }

    /// Clear the sensor's `Error` annotation, if any.
    pub async fn clear_error(&self, sensor_id: &str) -> Result<(), StoreError> {
        self.store.hdel(&metadata_key(sensor_id), "Error").await
    }

    /// Current `Error` annotation, if any.
    pub async fn error(&self, sensor_id: &str) -> Result<Option<String>, StoreError> {
        self.store.hget(&metadata_key(sensor_id), "Error").await
    }

    /// Set `first_seen` for a sensor, only if it is not already set.
    pub async fn touch_first_seen(&self, sensor_id: &str, timestamp: u64) -> Result<(), StoreError> {
        self.store.hsetnx(&metadata_key(sensor_id), "first_seen", &timestamp.to_string()).await?;
        Ok(())
    }

    /// Unconditionally set `last_seen` for a sensor.
    pub async fn set_last_seen(&self, sensor_id: &str, timestamp: u64) -> Result<(), StoreError> {
        self.store.hset(&metadata_key(sensor_id), "last_seen", &timestamp.to_string()).await
    }

    /// Increment the per-day counter `key[member]` by one.
    pub async fn incr_counter(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.store.zincrby(key, member).await
    }

    /// Record `"{peer_ip}-{timestamp}"` in the sensor's recent-connection
    /// list, trimmed to the most recent 16 entries.
    pub async fn push_recent_ip(
        &self,
        sensor_id: &str,
        peer_ip: &str,
        timestamp_label: &str,
    ) -> Result<(), StoreError> {
        let key = list_uuid_ip_key(sensor_id);
        self.store.lpush(&key, &format!("{peer_ip}-{timestamp_label}")).await?;
        self.store.ltrim(&key, 16).await
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(hex: &str) -> Vec<u8> {
    (0..hex.len())
        .step_by(2)
        .filter_map(|i| hex.get(i..i + 2))
        .filter_map(|byte| u8::from_str_radix(byte, 16).ok())
        .collect()
}
