//! Thin typed wrapper over the stream datastore.
//!
//! Covers the append-only per-session stream, active-connection membership,
//! session bookkeeping sets, and the worker-populated rejection marker a
//! session consults on every frame.

use crate::{error::StoreError, store::Datastore};

fn stream_key(msg_type: u8, session_uuid: &str) -> String {
    format!("stream:{msg_type}:{session_uuid}")
}

fn active_connection_by_type_key(msg_type: u8) -> String {
    format!("active_connection:{msg_type}")
}

const KEY_ACTIVE_CONNECTION: &str = "active_connection";
const KEY_ENDED_SESSION: &str = "ended_session";

fn active_connection_member(peer_ip: &str, sensor_id: &str) -> String {
    format!("{peer_ip}:{sensor_id}")
}

fn session_uuid_by_type_key(msg_type: u8) -> String {
    format!("session_uuid:{msg_type}")
}

fn map_type_session_uuid_key(msg_type: u8) -> String {
    format!("map-type:session_uuid-uuid:{msg_type}")
}

fn incorrect_type_marker_key(msg_type: u8) -> String {
    format!("Error:IncorrectType:{msg_type}")
}

/// Typed client for the per-session stream store.
#[derive(Clone)]
pub struct StreamStore<D> {
    store: D,
}

impl<D: Datastore> StreamStore<D> {
    /// Wrap a raw datastore handle.
    pub fn new(store: D) -> Self {
        Self { store }
    }

    /// Append `payload` to `stream:{msg_type}:{session_uuid}`.
    pub async fn append(
        &self,
        msg_type: u8,
        session_uuid: &str,
        payload: Vec<u8>,
    ) -> Result<(), StoreError> {
        self.store.xadd(&stream_key(msg_type, session_uuid), payload).await
    }

    /// Number of entries appended to a session's stream so far.
    pub async fn len(&self, msg_type: u8, session_uuid: &str) -> Result<u64, StoreError> {
        self.store.xlen(&stream_key(msg_type, session_uuid)).await
    }

    /// Discard a session's stream entirely (worker-rejection cleanup path).
    pub async fn discard(&self, msg_type: u8, session_uuid: &str) -> Result<(), StoreError> {
        self.store.xdel_stream(&stream_key(msg_type, session_uuid)).await
    }

    /// Whether `(peer_ip, sensor_id)` already holds an active connection of
    /// `msg_type` - the duplicate-admission check.
    pub async fn is_active(
        &self,
        msg_type: u8,
        peer_ip: &str,
        sensor_id: &str,
    ) -> Result<bool, StoreError> {
        self.store
            .ismember(&active_connection_by_type_key(msg_type), &active_connection_member(peer_ip, sensor_id))
            .await
    }

    /// Record `(peer_ip, sensor_id)` as an active connection of `msg_type`,
    /// and `sensor_id` in the type-agnostic active-connection set.
    pub async fn mark_active(
        &self,
        msg_type: u8,
        peer_ip: &str,
        sensor_id: &str,
    ) -> Result<(), StoreError> {
        self.store
            .sadd(&active_connection_by_type_key(msg_type), &active_connection_member(peer_ip, sensor_id))
            .await?;
        self.store.sadd(KEY_ACTIVE_CONNECTION, sensor_id).await
    }

    /// Remove `(peer_ip, sensor_id)` from both active-connection sets
    /// (teardown).
    pub async fn mark_inactive(
        &self,
        msg_type: u8,
        peer_ip: &str,
        sensor_id: &str,
    ) -> Result<(), StoreError> {
        self.store
            .srem(&active_connection_by_type_key(msg_type), &active_connection_member(peer_ip, sensor_id))
            .await?;
        self.store.srem(KEY_ACTIVE_CONNECTION, sensor_id).await
    }

    /// Mark `session_uuid` as closed, exactly once per connection.
    pub async fn mark_ended(&self, session_uuid: &str) -> Result<(), StoreError> {
        self.store.sadd(KEY_ENDED_SESSION, session_uuid).await
    }

    /// Record a successful first admission: add the session to the
    /// per-type session-uuid set and the type-to-session map used by
    /// downstream workers to discover new sessions.
    pub async fn record_session(
        &self,
        msg_type: u8,
        session_uuid: &str,
        sensor_id: &str,
    ) -> Result<(), StoreError> {
        self.store.sadd(&session_uuid_by_type_key(msg_type), session_uuid).await?;
        self.store.hset(&map_type_session_uuid_key(msg_type), session_uuid, sensor_id).await
    }

    /// Whether a worker has flagged this session's stream as the wrong type.
    pub async fn is_marked_incorrect_type(
        &self,
        msg_type: u8,
        session_uuid: &str,
    ) -> Result<bool, StoreError> {
        self.store.ismember(&incorrect_type_marker_key(msg_type), session_uuid).await
    }

    /// Clear the worker-rejection marker for this session.
    pub async fn clear_incorrect_type_marker(
        &self,
        msg_type: u8,
        session_uuid: &str,
    ) -> Result<(), StoreError> {
        self.store.srem(&incorrect_type_marker_key(msg_type), session_uuid).await
    }
}
