//! Error types for the D4 connection engine.
//!
//! Strongly-typed errors for the two layers that can fail: the datastore
//! clients (metadata/stream stores) and the session pipeline that drives
//! them. We avoid `std::io::Error` here to keep datastore failures distinct
//! from transport failures, which belong to the server crate.

use thiserror::Error;

/// Errors surfaced by a [`crate::store::Datastore`] backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend is unreachable (connection refused, timed out, etc.).
    #[error("datastore unreachable: {0}")]
    Unreachable(String),

    /// The backend rejected the operation (serialization, type mismatch).
    #[error("datastore operation failed: {0}")]
    Operation(String),
}

/// Errors from the per-connection session pipeline.
///
/// Every variant here corresponds to one abort path in the admission
/// pipeline; `reason()` gives the stable log/annotation string for that
/// path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The peer IP is in `blacklist_ip`.
    #[error("blacklisted IP")]
    BlacklistedIp,

    /// The sensor-id is in `blacklist_uuid`.
    #[error("blacklisted sensor")]
    BlacklistedSensor,

    /// The sensor-id is in `blacklist_ip_by_uuid`; the peer IP was just added
    /// to `blacklist_ip`.
    #[error("sensor-derived IP blacklist")]
    SensorDerivedIpBlacklist,

    /// `header.size` exceeds [`d4_proto::DATA_DEFAULT_SIZE_LIMIT`].
    #[error("declared size exceeds limit")]
    OversizeFrame,

    /// A worker marked this session's stream as the wrong type.
    #[error("worker-signalled incorrect type")]
    WorkerIncorrectType,

    /// `(peer_ip, sensor_id, type)` was already active elsewhere.
    #[error("duplicate UUID for type {msg_type}")]
    DuplicateAdmission {
        /// The message type the duplicate was admitted under.
        msg_type: u8,
    },

    /// The session's stream reached `stream_max_size` entries.
    #[error("stream exceed max entries limit")]
    StreamCapExceeded,

    /// A datastore call failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
