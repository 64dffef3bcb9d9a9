//! D4 sensor ingestion server binary.
//!
//! # Usage
//!
//! ```bash
//! d4-server --bind 0.0.0.0:4443 --cert server.pem --key server.key \
//!     --hmac-key-file hmac.key \
//!     --metadata-store-url redis://127.0.0.1:6379/0 \
//!     --stream-store-url redis://127.0.0.1:6379/1
//! ```

use std::path::PathBuf;

use clap::Parser;
use d4_server::{bootstrap, serve, RedisDatastore, ServerConfig, TlsTransport};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// D4 sensor ingestion server.
#[derive(Parser, Debug)]
#[command(name = "d4-server")]
#[command(about = "D4 sensor telemetry ingestion server")]
#[command(version)]
struct Args {
    /// Address to bind the TLS listener to.
    #[arg(short, long, default_value = "0.0.0.0:4443")]
    bind: String,

    /// Path to the TLS certificate chain (PEM format).
    #[arg(long)]
    cert: PathBuf,

    /// Path to the TLS private key (PEM format).
    #[arg(long)]
    key: PathBuf,

    /// Path to a file holding the process-wide default HMAC key.
    #[arg(long)]
    hmac_key_file: PathBuf,

    /// Redis URL for the identity/policy metadata store.
    #[arg(long, default_value = "redis://127.0.0.1:6379/0")]
    metadata_store_url: String,

    /// Redis URL for the per-session stream store.
    #[arg(long, default_value = "redis://127.0.0.1:6379/1")]
    stream_store_url: String,

    /// Directory logs are rotated into, once per day.
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Verbosity, using Python `logging`-style integer levels: 10=DEBUG,
    /// 20=INFO, 30=WARNING, 40=ERROR, 50=CRITICAL. Lower is more verbose.
    #[arg(short, long, default_value_t = 30)]
    verbose: i32,
}

fn level_filter(verbose: i32) -> &'static str {
    if verbose <= 10 {
        "debug"
    } else if verbose <= 20 {
        "info"
    } else if verbose <= 30 {
        "warn"
    } else {
        "error"
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let file_appender = tracing_appender::rolling::daily(&args.log_dir, "d4-server.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_filter(args.verbose)));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .with(fmt::layer())
        .with(filter)
        .init();

    tracing::info!("D4 server starting");

    let hmac_default_key = std::fs::read(&args.hmac_key_file).map_err(|e| {
        format!("failed to read HMAC key file '{}': {e}", args.hmac_key_file.display())
    })?;

    let metadata_db = RedisDatastore::connect(&args.metadata_store_url).await.map_err(|e| {
        tracing::error!(error = %e, "metadata store unreachable, exiting");
        e
    })?;
    let stream_db = RedisDatastore::connect(&args.stream_store_url).await.map_err(|e| {
        tracing::error!(error = %e, "stream store unreachable, exiting");
        e
    })?;

    let config = ServerConfig {
        bind_addr: args.bind.clone(),
        cert_path: args.cert.display().to_string(),
        key_path: args.key.display().to_string(),
        hmac_default_key: hmac_default_key.clone(),
    };

    bootstrap(&metadata_db, &stream_db, &config).await?;

    let transport = std::sync::Arc::new(
        TlsTransport::bind(&config.bind_addr, &config.cert_path, &config.key_path)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to load TLS certificate, exiting");
                e
            })?,
    );
    tracing::info!("D4 server listening on {}", transport.local_addr()?);

    serve(transport, metadata_db, stream_db, d4_core::SystemEnv, hmac_default_key).await?;

    Ok(())
}
