//! Fuzz target for frame header decoding.
//!
//! # Invariants
//!
//! - Decoding never panics on any byte slice, regardless of length.
//! - A successful decode's `to_bytes()` round-trips to the original 62-byte
//!   prefix.
//! - `declared_total()` is always `Header::SIZE + size()`, with no overflow
//!   within `usize` for any `u32` size value.

#![no_main]

use d4_proto::Header;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(header) = Header::decode(data) {
        let encoded = header.to_bytes();
        assert_eq!(&encoded[..], &data[..Header::SIZE]);
        assert_eq!(header.declared_total(), Header::SIZE + header.size() as usize);

        let zeroed = d4_proto::hmac_input(data);
        assert_eq!(zeroed.len(), data.len());
    }
});
