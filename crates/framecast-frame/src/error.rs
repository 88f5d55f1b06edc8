/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// There is no payload to send.
    #[error("frame payload is empty")]
    EmptyPayload,

    /// The first line of the header block is not an HTTP status line.
    #[error("invalid status line: {0:?}")]
    InvalidStatusLine(String),

    /// A header line has no `name: value` shape.
    #[error("malformed header line: {0:?}")]
    MalformedHeaderLine(String),

    /// A known header carries a value that does not parse.
    #[error("invalid value for {name}: {value:?}")]
    InvalidHeader { name: &'static str, value: String },

    /// The header block has no `Content-Length`.
    #[error("missing Content-Length header")]
    MissingContentLength,

    /// The header block exceeds the configured limit.
    #[error("header block too large ({size} bytes, max {max})")]
    HeaderTooLarge { size: usize, max: usize },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
