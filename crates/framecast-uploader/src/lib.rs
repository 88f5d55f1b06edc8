//! Producer-side frame delivery for framecast.
//!
//! [`Uploader`] sends at most one encoded frame at a time, in bounded chunks,
//! dropping anything offered while a send is still draining. [`Session`]
//! wraps it with the capture lifecycle: announcing start to the host, retrying
//! the connection until the consumer is listening, sampling frames, and
//! ending exactly once with a recorded [`EndReason`].

pub mod error;
pub mod notify;
#[cfg(unix)]
pub mod session;
pub mod uploader;

pub use error::{Result, UploadError};
pub use notify::{LifecycleEvent, LifecycleHandler, LifecycleNotifier, LocalNotifier};
#[cfg(unix)]
pub use session::{
    EndReason, Session, SessionConfig, DEFAULT_CONNECT_INTERVAL, DEFAULT_FRAME_STRIDE,
};
pub use uploader::{Uploader, UploaderConfig, UploaderHandle, UploaderStats, CHUNK_SIZE};
