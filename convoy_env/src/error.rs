//! Error types for the Convoy environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Network send failed (socket error, hub closed, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Socket could not be bound
    #[error("Bind failed on {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

impl EnvError {
    /// Creates a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkError(msg.into())
    }
}

/// Errors decoding a fixed-layout state datagram.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("wrong datagram length: expected {expected}, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("unknown flag bits: {0:#04x}")]
    UnknownFlags(u8),
}
