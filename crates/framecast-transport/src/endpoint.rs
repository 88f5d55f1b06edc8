//! The "connect to a local endpoint by path" capability.
//!
//! All raw socket-address concerns live here: path length validation against
//! `sockaddr_un.sun_path`, presence checks, and the connect call itself.

use std::os::unix::net::UnixStream;
use std::path::Path;

use tracing::debug;

use crate::error::{Result, TransportError};

/// Maximum socket path length.
/// Unix `sockaddr_un.sun_path` is 108 bytes on Linux, 104 on macOS, including
/// the trailing NUL.
#[cfg(target_os = "linux")]
pub const MAX_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
pub const MAX_PATH_LEN: usize = 104;

/// Reject paths that cannot fit into `sun_path`.
pub fn check_path_len(path: &Path) -> Result<()> {
    let len = path.as_os_str().len();
    if len >= MAX_PATH_LEN {
        return Err(TransportError::PathTooLong {
            path: path.to_path_buf(),
            len,
            max: MAX_PATH_LEN,
        });
    }
    Ok(())
}

/// Check that `path` is usable and currently present on the filesystem.
///
/// Has no side effects; a missing endpoint is the expected state while the
/// consumer is still starting up.
pub fn ensure_present(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    check_path_len(path)?;
    if !path.exists() {
        return Err(TransportError::EndpointMissing {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Connect to a listening endpoint as a stream socket (blocking connect).
///
/// Failure modes: [`TransportError::PathTooLong`],
/// [`TransportError::EndpointMissing`] and [`TransportError::Connect`]
/// (refused, permission denied, not a socket).
pub fn connect_endpoint(path: impl AsRef<Path>) -> Result<UnixStream> {
    let path = path.as_ref();
    ensure_present(path)?;
    let stream = UnixStream::connect(path).map_err(|e| TransportError::Connect {
        path: path.to_path_buf(),
        source: e,
    })?;
    debug!(?path, "connected to endpoint");
    Ok(stream)
}
