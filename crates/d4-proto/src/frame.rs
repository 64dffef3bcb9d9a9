//! Frame type combining header and payload.
//!
//! A `Frame` is a [`Header`] plus exactly `header.size()` bytes of opaque
//! payload. This is a pure data holder produced by the reassembler; the
//! session layer decides whether a frame is admissible.

use bytes::Bytes;

use crate::Header;

/// One complete, structurally valid D4 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Decoded fixed-size header.
    pub header: Header,
    /// Opaque payload bytes, exactly `header.size()` long.
    pub payload: Bytes,
    /// The raw wire bytes this frame was decoded from (header + payload),
    /// kept around because HMAC verification is computed over them.
    pub raw: Bytes,
}

impl Frame {
    /// Build a frame from a decoded header and its exact wire bytes.
    ///
    /// `raw` must be `header.declared_total()` bytes long; the payload slice
    /// is taken from the tail of `raw`.
    #[must_use]
    pub fn from_raw(header: Header, raw: Bytes) -> Self {
        let payload = raw.slice(Header::SIZE..);
        Self { header, payload, raw }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_slices_payload_from_tail() {
        let mut buf = vec![0u8; Header::SIZE];
        buf[58..62].copy_from_slice(&3u32.to_le_bytes());
        buf.extend_from_slice(b"abc");

        let header = Header::decode(&buf).unwrap();
        let frame = Frame::from_raw(header, Bytes::from(buf.clone()));

        assert_eq!(frame.payload, Bytes::from_static(b"abc"));
        assert_eq!(frame.raw, Bytes::from(buf));
    }
}
