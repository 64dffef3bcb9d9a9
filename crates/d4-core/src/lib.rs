//! Connection-level engine for the D4 ingestion server.
//!
//! Ties together frame reassembly, the admission/commit pipeline, and the
//! typed clients over the two external datastores. Transport (TLS accept,
//! socket reads) and process bootstrap live in the server crate; everything
//! here is reachable without a network.

#![warn(missing_docs)]

pub mod clock;
pub mod env;
pub mod error;
pub mod memory;
pub mod metadata_store;
pub mod reassembler;
pub mod session;
pub mod store;
pub mod stream_store;

pub use env::{Environment, SystemEnv};
pub use error::{SessionError, StoreError};
pub use metadata_store::{MetadataStore, DEFAULT_STREAM_MAX_SIZE};
pub use reassembler::Reassembler;
pub use session::{FrameOutcome, Session};
pub use store::Datastore;
pub use stream_store::StreamStore;
