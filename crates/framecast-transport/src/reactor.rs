//! Background readiness loop for an open [`Connection`](crate::Connection).
//!
//! One thread per connection blocks in `poll(2)` on the socket and on a wake
//! socket pair. The inbound side is only a liveness detector: bytes are read
//! and discarded, a zero-length read means the peer closed.

use std::io::{ErrorKind, Read};
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::connection::Shared;
use crate::event::{CloseReason, ConnectionEvent};

const DISCARD_BUFFER_SIZE: usize = 1024;

pub(crate) fn run(shared: Arc<Shared>, mut inbound: UnixStream, mut wake: UnixStream) {
    debug!("reactor started");
    if shared.close_requested() {
        debug!("reactor stopped before open was reported");
        return;
    }
    shared.emit(&ConnectionEvent::OpenCompleted);

    let mut scratch = [0u8; DISCARD_BUFFER_SIZE];
    loop {
        if shared.close_requested() {
            break;
        }

        let mut socket_events = libc::POLLIN;
        if shared.wants_write() {
            socket_events |= libc::POLLOUT;
        }
        let mut fds = [
            libc::pollfd {
                fd: inbound.as_raw_fd(),
                events: socket_events,
                revents: 0,
            },
            libc::pollfd {
                fd: wake.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
        ];

        // SAFETY: `fds` is a valid, writable array of `fds.len()` pollfd entries
        // whose descriptors stay open for the duration of the call.
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                continue;
            }
            shared.finish(CloseReason::Error(Arc::new(err)));
            break;
        }

        if fds[1].revents != 0 {
            drain_wake(&mut wake);
        }
        if shared.close_requested() {
            break;
        }
        if let Some(err) = shared.take_write_error() {
            shared.finish(CloseReason::Error(Arc::new(err)));
            break;
        }

        let revents = fds[0].revents;
        if revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
            let err = inbound
                .take_error()
                .ok()
                .flatten()
                .unwrap_or_else(|| std::io::Error::other("socket reported an error condition"));
            shared.finish(CloseReason::Error(Arc::new(err)));
            break;
        }

        if revents & (libc::POLLIN | libc::POLLHUP) != 0 {
            match inbound.read(&mut scratch) {
                Ok(0) => {
                    shared.finish(CloseReason::PeerClosed);
                    break;
                }
                Ok(n) => trace!(bytes = n, "discarded inbound bytes"),
                Err(err)
                    if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {}
                Err(err) => {
                    shared.finish(CloseReason::Error(Arc::new(err)));
                    break;
                }
            }
        }

        if revents & libc::POLLOUT != 0 && shared.take_write_interest() {
            shared.emit(&ConnectionEvent::SpaceAvailable);
        }
    }
    debug!("reactor stopped");
}

fn drain_wake(wake: &mut UnixStream) {
    let mut buf = [0u8; 64];
    loop {
        match wake.read(&mut buf) {
            Ok(0) => return,
            Ok(_) => continue,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(_) => return,
        }
    }
}
