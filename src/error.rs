//! Error types for authgate

use std::net::SocketAddr;

/// Errors raised while configuring, binding, or running the listeners.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A listener could not be bound to its address.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The gRPC transport failed while serving or dialing.
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// Configuration could not be loaded or is invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A supervised task panicked or was aborted.
    #[error("Task '{0}' failed: {1}")]
    TaskFailed(&'static str, String),

    /// Generic I/O failure outside of binding.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for Error {
    fn from(e: figment::Error) -> Self {
        Error::Config(e.to_string())
    }
}
