/// Errors that can occur while setting up or driving a capture session.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] framecast_transport::TransportError),

    /// A worker thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },

    /// `start` was called on a session that is already running.
    #[error("session already started")]
    AlreadyStarted,

    /// The session has finished and cannot be started again.
    #[error("session already finished")]
    Finished,
}

pub type Result<T> = std::result::Result<T, UploadError>;
