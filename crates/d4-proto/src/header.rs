//! Frame header codec.
//!
//! The wire header is a fixed 62-byte structure (little-endian multi-byte
//! fields) carrying routing and authentication metadata for one frame. This
//! module performs structural decoding only: field extraction and the
//! HMAC-zeroed transform used for signature verification. It does not
//! validate field semantics (accepted types, blacklists, HMAC correctness) -
//! that belongs to the session layer.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::{ProtocolError, Result};

/// Maximum payload size accepted for any frame (1,000,000 bytes).
pub const DATA_DEFAULT_SIZE_LIMIT: u32 = 1_000_000;

/// Fixed 62-byte frame header (little-endian).
///
/// # Security
///
/// All 62-byte patterns are valid header bit patterns - `zerocopy` lets us
/// cast untrusted network bytes into this type without risking undefined
/// behavior. No field is validated here; callers must check `sensor_id`
/// shape, `type` membership, `size` ceiling, and the `hmac` field themselves.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, PartialEq, Eq)]
pub struct Header {
    version: u8,
    msg_type: u8,
    sensor_id: [u8; 16],
    timestamp: [u8; 8],
    hmac: [u8; 32],
    size: [u8; 4],
}

impl Header {
    /// Size of the serialized header in bytes.
    pub const SIZE: usize = 62;

    /// Offset of the `hmac` field within the header.
    pub const HMAC_OFFSET: usize = 26;

    /// Width of the `hmac` field.
    pub const HMAC_LEN: usize = 32;

    /// Decode a header from the front of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InsufficientBytes`] if fewer than
    /// [`Header::SIZE`] bytes are available.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::InsufficientBytes {
                expected: Self::SIZE,
                actual: bytes.len(),
            })?
            .0;
        Ok(*header)
    }

    /// Serialize the header back to its 62-byte wire form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let bytes = IntoBytes::as_bytes(self);
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(bytes);
        arr
    }

    /// Protocol version, forwarded opaquely.
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Message type; must be checked against the accepted-type set.
    #[must_use]
    pub fn msg_type(&self) -> u8 {
        self.msg_type
    }

    /// Raw 128-bit sensor identifier bytes (expected to be a UUID v4).
    #[must_use]
    pub fn sensor_id_bytes(&self) -> [u8; 16] {
        self.sensor_id
    }

    /// Sender-supplied timestamp, carried through unvalidated.
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        u64::from_le_bytes(self.timestamp)
    }

    /// Received HMAC-SHA256 tag.
    #[must_use]
    pub fn hmac(&self) -> [u8; 32] {
        self.hmac
    }

    /// Declared payload length in bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        u32::from_le_bytes(self.size)
    }

    /// Total frame length (header + declared payload), if it fits in `usize`.
    #[must_use]
    pub fn declared_total(&self) -> usize {
        Self::SIZE + self.size() as usize
    }
}

/// Returns `frame_bytes` with the 32-byte HMAC slot `[26:58]` zeroed.
///
/// This is the exact input HMAC-SHA256 is computed over: the received bytes
/// with the header's own `hmac` field blanked out and nothing else touched.
/// The frame must be at least [`Header::SIZE`] bytes long.
#[must_use]
pub fn hmac_input(frame_bytes: &[u8]) -> Vec<u8> {
    let mut zeroed = frame_bytes.to_vec();
    let end = (Header::HMAC_OFFSET + Header::HMAC_LEN).min(zeroed.len());
    if Header::HMAC_OFFSET < end {
        zeroed[Header::HMAC_OFFSET..end].fill(0);
    }
    zeroed
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn sample_header(size: u32) -> [u8; Header::SIZE] {
        let mut buf = [0u8; Header::SIZE];
        buf[0] = 1; // version
        buf[1] = 1; // type
        buf[2..18].copy_from_slice(&[0x11; 16]); // sensor_id
        buf[18..26].copy_from_slice(&1u64.to_le_bytes()); // timestamp
        buf[26..58].copy_from_slice(&[0xAA; 32]); // hmac
        buf[58..62].copy_from_slice(&size.to_le_bytes());
        buf
    }

    #[test]
    fn decode_extracts_fields_at_fixed_offsets() {
        let buf = sample_header(5);
        let header = Header::decode(&buf).expect("decode");

        assert_eq!(header.version(), 1);
        assert_eq!(header.msg_type(), 1);
        assert_eq!(header.sensor_id_bytes(), [0x11; 16]);
        assert_eq!(header.timestamp(), 1);
        assert_eq!(header.hmac(), [0xAA; 32]);
        assert_eq!(header.size(), 5);
        assert_eq!(header.declared_total(), Header::SIZE + 5);
    }

    #[test]
    fn decode_rejects_short_buffer() {
        let buf = [0u8; 61];
        let err = Header::decode(&buf).unwrap_err();
        assert_eq!(err, ProtocolError::InsufficientBytes { expected: 62, actual: 61 });
    }

    #[test]
    fn hmac_input_zeroes_only_the_hmac_slot() {
        let buf = sample_header(0);
        let zeroed = hmac_input(&buf);

        assert_eq!(&zeroed[..Header::HMAC_OFFSET], &buf[..Header::HMAC_OFFSET]);
        assert!(
            zeroed[Header::HMAC_OFFSET..Header::HMAC_OFFSET + Header::HMAC_LEN]
                .iter()
                .all(|&b| b == 0)
        );
        assert_eq!(&zeroed[Header::HMAC_OFFSET + Header::HMAC_LEN..], &buf[58..]);
    }

    proptest! {
        #[test]
        fn header_round_trip(size in 0u32..=DATA_DEFAULT_SIZE_LIMIT) {
            let buf = sample_header(size);
            let header = Header::decode(&buf).expect("decode");
            prop_assert_eq!(header.to_bytes(), buf);
        }
    }
}
