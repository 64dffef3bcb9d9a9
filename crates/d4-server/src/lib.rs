//! D4 sensor ingestion server.
//!
//! Wires the transport (TLS over TCP) to the connection engine in `d4-core`:
//! one task per accepted connection, owning a [`Reassembler`] and a
//! [`Session`], talking to the two datastores through clones of the same
//! handle every other task holds. No state is shared in-process across
//! connections - everything that needs to be is in the datastores.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod redis_store;
mod transport;

use std::sync::Arc;

use d4_core::{Datastore, Environment, FrameOutcome, MetadataStore, Reassembler, Session, StreamStore};
pub use error::ServerError;
pub use redis_store::RedisDatastore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, Duration};
use tracing::{info, warn};
pub use transport::TlsTransport;

/// Accepted message types written to `server:accepted_type` at bootstrap.
///
/// The protocol requires this set to include sensor telemetry (1) and
/// heartbeat (4) by default; operators may widen it via the datastore after
/// bootstrap, but every restart resets it to this baseline.
pub const DEFAULT_ACCEPTED_TYPES: &[u8] = &[1, 4];

/// How long a connection may sit idle before its reassembly buffer is
/// discarded (the connection itself is not closed).
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest single read off the socket per iteration.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Runtime configuration resolved from CLI/config before the accept loop
/// starts.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the TLS listener to (e.g. `0.0.0.0:4443`).
    pub bind_addr: String,
    /// Path to the server's PEM certificate chain.
    pub cert_path: String,
    /// Path to the server's PEM private key.
    pub key_path: String,
    /// Process-wide default HMAC key, used when a sensor has no override.
    pub hmac_default_key: Vec<u8>,
}

/// Verify both datastores are reachable and publish the bootstrap keys the
/// protocol requires on every start: the default HMAC key (advertised, not
/// authoritative - the in-process copy stays authoritative for signing) and a
/// freshly reset accepted-type set.
///
/// # Errors
///
/// Returns [`ServerError::StoreUnreachable`] if either store rejects a basic
/// read probe.
pub async fn bootstrap<D: Datastore>(
    metadata_db: &D,
    stream_db: &D,
    config: &ServerConfig,
) -> Result<(), ServerError> {
    metadata_db
        .get("server:hmac_default_key")
        .await
        .map_err(|e| ServerError::StoreUnreachable(format!("metadata store: {e}")))?;
    stream_db
        .get("server:hmac_default_key")
        .await
        .map_err(|e| ServerError::StoreUnreachable(format!("stream store: {e}")))?;

    let metadata = MetadataStore::new(metadata_db.clone());
    metadata.write_default_hmac_key(&config.hmac_default_key).await?;
    metadata.reset_accepted_types(DEFAULT_ACCEPTED_TYPES).await?;

    info!(bind_addr = %config.bind_addr, "bootstrap complete");
    Ok(())
}

/// Run the accept loop forever; each accepted connection is handled on its
/// own task against clones of the same datastore handles.
pub async fn serve<D, E>(
    transport: Arc<TlsTransport>,
    metadata_db: D,
    stream_db: D,
    env: E,
    hmac_default_key: Vec<u8>,
) -> Result<(), ServerError>
where
    D: Datastore,
    E: Environment,
{
    loop {
        let (tls_stream, peer_addr) = transport.accept().await?;
        let metadata = MetadataStore::new(metadata_db.clone());
        let streams = StreamStore::new(stream_db.clone());
        let env = env.clone();
        let key = hmac_default_key.clone();

        tokio::spawn(async move {
            if let Err(err) = handle_connection(tls_stream, peer_addr, metadata, streams, env, key).await {
                warn!(peer_addr = %peer_addr, error = %err, "connection ended with error");
            }
        });
    }
}

/// Drive one accepted connection from handshake to teardown.
async fn handle_connection<D, E, S>(
    mut stream: S,
    peer_addr: std::net::SocketAddr,
    metadata: MetadataStore<D>,
    streams: StreamStore<D>,
    env: E,
    hmac_default_key: Vec<u8>,
) -> Result<(), ServerError>
where
    D: Datastore,
    E: Environment,
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let peer_ip = peer_addr.ip().to_string();
    let session_uuid = uuid::Uuid::from_u128(env.random_u128()).to_string();
    let mut reassembler = Reassembler::new();
    let mut session = Session::new(metadata, streams, env, hmac_default_key, session_uuid.clone(), peer_ip);

    info!(session_uuid = %session_uuid, peer_addr = %peer_addr, "connection accepted");

    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    let outcome = loop {
        let read = match timeout(IDLE_TIMEOUT, stream.read(&mut buf)).await {
            Ok(Ok(0)) => break Ok(()),
            Ok(Ok(n)) => n,
            Ok(Err(e)) => break Err(ServerError::from(e)),
            Err(_) => {
                reassembler.clear_on_idle();
                continue;
            },
        };

        let frames = reassembler.feed(&buf[..read]);

        let mut aborted = false;
        for frame in &frames {
            match session.process_frame(frame).await? {
                FrameOutcome::Committed => {},
                FrameOutcome::Dropped { reason } => {
                    info!(session_uuid = %session_uuid, reason, "frame dropped");
                },
                FrameOutcome::Aborted(reason) => {
                    warn!(session_uuid = %session_uuid, error = %reason, "session aborted");
                    aborted = true;
                    break;
                },
            }
        }
        if aborted {
            break Ok(());
        }
    };

    session.teardown().await?;
    let _ = stream.shutdown().await;
    info!(session_uuid = %session_uuid, "connection closed");
    outcome
}
