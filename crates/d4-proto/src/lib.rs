//! Wire-level framing for the D4 sensor ingestion protocol.
//!
//! This crate is pure and synchronous: decoding a header or computing the
//! HMAC-zeroed form of a frame never touches I/O or policy state. Everything
//! stateful (admission, HMAC key lookup, stream caps) lives in `d4-core`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod errors;
mod frame;
mod header;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::{hmac_input, Header, DATA_DEFAULT_SIZE_LIMIT};
