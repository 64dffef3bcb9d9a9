//! Frame reassembler: turns arbitrary TCP chunk boundaries into complete
//! frames.
//!
//! This is a pure `(state, bytes) -> (state', frames)` state machine - it
//! owns a byte buffer and nothing else. It never touches the network, a
//! clock, or a datastore; the idle-timeout clear is exposed as an explicit
//! method so the connection driver can call it off its own timer.

use bytes::{Bytes, BytesMut};
use d4_proto::{Frame, Header};

/// Accumulates bytes across reads and slices out complete frames.
///
/// A single TCP `read` can contain zero, one, or many frames, and a frame's
/// bytes can straddle many reads; [`Reassembler::feed`] absorbs both without
/// the caller needing to reason about it.
#[derive(Debug, Default)]
pub struct Reassembler {
    buffer: BytesMut,
}

impl Reassembler {
    /// Create an empty reassembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed newly-read bytes in and drain every frame that is now complete.
    ///
    /// Declared size is not enforced here - a header declaring an oversize
    /// payload is simply buffered and waited on like any other frame, same as
    /// every other field. Size enforcement is the session pipeline's job
    /// (its ordered admission checks must all run before a frame is rejected
    /// for being oversize), not this state machine's.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        loop {
            if self.buffer.len() < Header::SIZE {
                break;
            }

            let header = Header::decode(&self.buffer)
                .expect("buffer already holds at least Header::SIZE bytes");
            let total = header.declared_total();

            if self.buffer.len() < total {
                break;
            }

            let raw: Bytes = self.buffer.split_to(total).freeze();
            frames.push(Frame::from_raw(header, raw));
        }

        frames
    }

    /// Clear any partial frame sitting in the buffer.
    ///
    /// Called when the connection has been idle past the configured
    /// timeout. This only drops buffered bytes - it does not close the
    /// connection or emit an error; a sender that resumes afterwards simply
    /// starts a fresh frame.
    pub fn clear_on_idle(&mut self) {
        self.buffer.clear();
    }

    /// Number of bytes currently buffered, for diagnostics.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_bytes(msg_type: u8, size: u32, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; Header::SIZE + payload.len()];
        buf[0] = 1;
        buf[1] = msg_type;
        buf[2..18].copy_from_slice(&[0x42; 16]);
        buf[18..26].copy_from_slice(&7u64.to_le_bytes());
        buf[26..58].copy_from_slice(&[0xAB; 32]);
        buf[58..62].copy_from_slice(&size.to_le_bytes());
        buf[62..].copy_from_slice(payload);
        buf
    }

    #[test]
    fn single_chunk_with_one_whole_frame_yields_one_frame() {
        let mut reassembler = Reassembler::new();
        let frame = frame_bytes(1, 3, b"abc");

        let frames = reassembler.feed(&frame);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload.as_ref(), b"abc");
        assert_eq!(reassembler.buffered_len(), 0);
    }

    #[test]
    fn frame_split_across_two_chunks_is_reassembled() {
        let mut reassembler = Reassembler::new();
        let frame = frame_bytes(1, 10, b"0123456789");
        let (first, second) = frame.split_at(40);

        assert!(reassembler.feed(first).is_empty());
        let frames = reassembler.feed(second);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload.as_ref(), b"0123456789");
    }

    #[test]
    fn one_chunk_with_two_whole_frames_yields_two_frames() {
        let mut reassembler = Reassembler::new();
        let mut chunk = frame_bytes(1, 1, b"a");
        chunk.extend(frame_bytes(4, 2, b"bc"));

        let frames = reassembler.feed(&chunk);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].payload.as_ref(), b"a");
        assert_eq!(frames[1].payload.as_ref(), b"bc");
    }

    #[test]
    fn oversize_declared_length_is_buffered_rather_than_rejected() {
        // Declaring an oversize payload is not this state machine's concern -
        // it just keeps waiting for the rest, same as any other frame. Size
        // enforcement happens downstream, in the session pipeline, once a
        // complete frame actually arrives.
        let mut reassembler = Reassembler::new();
        let mut header_only = frame_bytes(1, d4_proto::DATA_DEFAULT_SIZE_LIMIT + 1, b"");
        header_only.truncate(Header::SIZE);

        let frames = reassembler.feed(&header_only);

        assert!(frames.is_empty());
        assert_eq!(reassembler.buffered_len(), Header::SIZE);
    }

    #[test]
    fn idle_clear_drops_partial_frame_without_erroring() {
        let mut reassembler = Reassembler::new();
        let frame = frame_bytes(1, 10, b"0123456789");

        reassembler.feed(&frame[..40]);
        assert!(reassembler.buffered_len() > 0);

        reassembler.clear_on_idle();
        assert_eq!(reassembler.buffered_len(), 0);

        let frames = reassembler.feed(&frame[40..]);
        assert!(frames.is_empty(), "second half alone cannot complete a fresh frame");
    }
}
