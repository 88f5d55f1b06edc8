//! Local stream-socket transport for framecast.
//!
//! The producer side opens a [`Connection`] to a Unix domain socket path and
//! writes to it without ever blocking. A background reactor thread watches the
//! socket and pushes [`ConnectionEvent`]s: open completed, space available
//! (the only backpressure signal), and closure by the peer or by an error.
//!
//! The consumer side binds an [`EndpointListener`].

#[cfg(unix)]
pub mod connection;
#[cfg(unix)]
pub mod endpoint;
pub mod error;
pub mod event;
#[cfg(unix)]
mod reactor;
pub mod traits;
#[cfg(unix)]
pub mod uds;

#[cfg(unix)]
pub use connection::{CloseHook, Connection, EventHandler};
#[cfg(unix)]
pub use endpoint::{check_path_len, connect_endpoint, ensure_present, MAX_PATH_LEN};
pub use error::{Result, TransportError};
pub use event::{CloseReason, ConnectionEvent, ConnectionState};
pub use traits::ChunkWriter;
#[cfg(unix)]
pub use uds::EndpointListener;
