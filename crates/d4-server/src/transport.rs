//! TLS-over-TCP transport.
//!
//! Replaces Quinn/QUIC with a plain `tokio_rustls::TlsAcceptor` stacked on a
//! `tokio::net::TcpListener`: the protocol is a one-way byte stream inside
//! TLS, not a multiplexed transport, so QUIC's stream semantics buy nothing
//! here.
//!
//! # Security
//!
//! The server presents a certificate loaded from a PEM file at bootstrap; it
//! does not request a client certificate. TLS 1.3 is negotiated via
//! `rustls`'s default provider.

use std::{net::SocketAddr, sync::Arc};

use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::{rustls, server::TlsStream, TlsAcceptor};

use crate::error::ServerError;

/// TCP listener wrapped in a TLS acceptor.
pub struct TlsTransport {
    listener: TcpListener,
    acceptor: TlsAcceptor,
}

impl TlsTransport {
    /// Bind `addr` and load the server certificate/key from the given PEM
    /// files.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if the PEM files are missing or
    /// malformed, and [`ServerError::Transport`] if the bind fails.
    pub async fn bind(addr: &str, cert_path: &str, key_path: &str) -> Result<Self, ServerError> {
        let socket_addr: SocketAddr = addr
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{addr}': {e}")))?;

        let tls_config = load_tls_config(cert_path, key_path)?;
        let acceptor = TlsAcceptor::from(Arc::new(tls_config));

        let listener = TcpListener::bind(socket_addr)
            .await
            .map_err(|e| ServerError::Transport(format!("failed to bind {socket_addr}: {e}")))?;

        tracing::info!(addr = %socket_addr, "TLS transport bound");

        Ok(Self { listener, acceptor })
    }

    /// Accept the next TCP connection and run the TLS handshake on it.
    pub async fn accept(&self) -> Result<(TlsStream<TcpStream>, SocketAddr), ServerError> {
        let (tcp_stream, peer_addr) = self
            .listener
            .accept()
            .await
            .map_err(|e| ServerError::Transport(format!("accept failed: {e}")))?;

        let tls_stream = self
            .acceptor
            .accept(tcp_stream)
            .await
            .map_err(|e| ServerError::Transport(format!("TLS handshake failed: {e}")))?;

        Ok((tls_stream, peer_addr))
    }

    /// Local address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to get local address: {e}")))
    }
}

fn load_tls_config(cert_path: &str, key_path: &str) -> Result<rustls::ServerConfig, ServerError> {
    let cert_pem = std::fs::read(cert_path)
        .map_err(|e| ServerError::Config(format!("failed to read cert '{cert_path}': {e}")))?;
    let key_pem = std::fs::read(key_path)
        .map_err(|e| ServerError::Config(format!("failed to read key '{key_path}': {e}")))?;

    let certs = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Config(format!("failed to parse certificate: {e}")))?;

    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| ServerError::Config(format!("failed to parse private key: {e}")))?
        .ok_or_else(|| ServerError::Config("no private key found in PEM file".to_string()))?;

    rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Config(format!("invalid TLS config: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_rejects_missing_cert_file() {
        let err = TlsTransport::bind("127.0.0.1:0", "/nonexistent/cert.pem", "/nonexistent/key.pem")
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[tokio::test]
    async fn bind_rejects_invalid_address() {
        // A missing cert is caught first regardless of address validity, so
        // use a syntactically invalid address to exercise that path alone
        // would require a valid cert; this just documents the error variant.
        let result = TlsTransport::bind(
            "not-an-address",
            "/nonexistent/cert.pem",
            "/nonexistent/key.pem",
        )
        .await;
        assert!(result.is_err());
    }
}
