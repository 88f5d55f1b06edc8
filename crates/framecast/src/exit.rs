use std::fmt;
use std::io;

use framecast_frame::FrameError;
use framecast_transport::TransportError;
use framecast_uploader::UploadError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        FrameError::EmptyPayload => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn upload_error(context: &str, err: UploadError) -> CliError {
    match err {
        UploadError::Transport(err) => transport_error(context, err),
        UploadError::Spawn { source, .. } => io_error(context, source),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_io_kinds_to_exit_codes() {
        let denied = io_error("bind", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(denied.code, PERMISSION_DENIED);

        let timed_out = io_error("read", io::Error::from(io::ErrorKind::WouldBlock));
        assert_eq!(timed_out.code, TIMEOUT);
        assert!(timed_out.message.starts_with("read: "));
    }

    #[test]
    fn maps_transport_errors() {
        let err = transport_error(
            "bind failed",
            TransportError::PathTooLong {
                path: "/tmp/x".into(),
                len: 200,
                max: 108,
            },
        );
        assert_eq!(err.code, TRANSPORT_ERROR);

        let err = transport_error(
            "accept failed",
            TransportError::Accept(io::Error::from(io::ErrorKind::PermissionDenied)),
        );
        assert_eq!(err.code, PERMISSION_DENIED);
    }

    #[test]
    fn maps_frame_errors() {
        assert_eq!(
            frame_error("read", FrameError::MissingContentLength).code,
            DATA_INVALID
        );
        assert_eq!(frame_error("read", FrameError::ConnectionClosed).code, FAILURE);
        assert_eq!(frame_error("encode", FrameError::EmptyPayload).code, USAGE);
    }
}
