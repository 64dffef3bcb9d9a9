//! Server-level error types.
//!
//! Distinct from [`d4_core::error`]: those describe pipeline rejections that
//! a connection recovers from; these describe failures the server process
//! itself cannot recover from, or transport-layer failures below the
//! pipeline.

use std::fmt;

/// Errors surfaced by the server runtime.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, missing TLS certs, etc.).
    ///
    /// Fatal: fix configuration and restart.
    Config(String),

    /// Transport/network error (bind failure, accept failure, TLS handshake).
    Transport(String),

    /// One of the two datastores is unreachable at bootstrap.
    StoreUnreachable(String),

    /// Wraps a pipeline-level error from `d4-core`.
    Session(d4_core::SessionError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::StoreUnreachable(msg) => write!(f, "datastore unreachable: {msg}"),
            Self::Session(err) => write!(f, "session error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Session(err) => Some(err),
            _ => None,
        }
    }
}

impl From<d4_core::SessionError> for ServerError {
    fn from(err: d4_core::SessionError) -> Self {
        Self::Session(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn server_error_display() {
        let err = ServerError::Config("missing cert".to_string());
        assert_eq!(err.to_string(), "configuration error: missing cert");

        let err = ServerError::StoreUnreachable("metadata store".to_string());
        assert_eq!(err.to_string(), "datastore unreachable: metadata store");
    }
}
