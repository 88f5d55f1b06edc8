use std::path::PathBuf;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The socket path does not exist yet (the consumer has not bound it).
    #[error("endpoint not present: {path}")]
    EndpointMissing { path: PathBuf },

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to bind to the specified address.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection has been closed and cannot be reopened.
    #[error("connection closed")]
    Closed,
}

impl TransportError {
    /// Whether a later attempt against the same endpoint may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::EndpointMissing { .. } | TransportError::Connect { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
