//! Fuzz target for the frame reassembler.
//!
//! Feeds arbitrary chunk sequences (including empty chunks and an idle-clear
//! sentinel) into a single [`Reassembler`] and checks it never panics and
//! never emits a frame whose payload length disagrees with its own header.
//!
//! # Invariants
//!
//! - Every emitted frame's `payload.len()` equals `header.size()`.
//! - A declared size over the limit never panics or truncates a frame - it
//!   is just buffered and left for the session pipeline to reject.

#![no_main]

use arbitrary::Arbitrary;
use d4_core::Reassembler;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Step {
    Feed(Vec<u8>),
    IdleClear,
}

fuzz_target!(|steps: Vec<Step>| {
    let mut reassembler = Reassembler::new();

    for step in steps {
        match step {
            Step::Feed(chunk) => {
                for frame in reassembler.feed(&chunk) {
                    assert_eq!(frame.payload.len(), frame.header.size() as usize);
                }
            },
            Step::IdleClear => reassembler.clear_on_idle(),
        }
    }
});
