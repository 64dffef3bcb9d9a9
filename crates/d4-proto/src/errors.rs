//! Error types for the D4 protocol core.

use thiserror::Error;

/// Result alias for fallible protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors from header/frame decoding.
///
/// Decoding is purely structural: it never inspects `sensor_id` shape,
/// accepted-type membership, or the HMAC tag. Those checks happen in the
/// session layer, against live policy state that the codec has no access to.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Fewer than [`crate::Header::SIZE`] bytes were available to decode a
    /// header.
    #[error("insufficient bytes for header: expected {expected}, got {actual}")]
    InsufficientBytes {
        /// Bytes required.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// The declared payload size exceeds [`crate::DATA_DEFAULT_SIZE_LIMIT`].
    #[error("declared payload size {size} exceeds limit {limit}")]
    PayloadTooLarge {
        /// Declared size.
        size: u32,
        /// Configured limit.
        limit: u32,
    },
}
