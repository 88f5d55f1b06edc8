//! Low-latency screen-frame streaming between local processes.
//!
//! A capture producer pushes encoded images to a consumer over a Unix domain
//! socket. Each frame travels as one self-describing message; the producer
//! never queues, so a frame offered while the previous one is still being
//! written is dropped and the consumer always sees the freshest image.
//!
//! # Crate Structure
//!
//! - [`transport`]: non-blocking socket connection with readiness events
//! - [`frame`]: HTTP-response-shaped frame encoding and decoding
//! - [`uploader`]: chunked single-slot uploader and capture session
//!   (behind the `uploader` feature, on by default)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use framecast::frame::FrameInfo;
//! use framecast::uploader::{LocalNotifier, Session, SessionConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let notifier = Arc::new(LocalNotifier::new());
//! let session = Session::new("/tmp/capture.sock", notifier, SessionConfig::default())?;
//! session.on_end(|reason| eprintln!("capture ended: {reason}"));
//! session.start()?;
//!
//! let jpeg: Vec<u8> = std::fs::read("frame.jpg")?;
//! session.process_frame(&jpeg, FrameInfo::new(1170, 2532, 1));
//!
//! session.finish();
//! # Ok(())
//! # }
//! ```

/// Re-export transport types.
pub mod transport {
    pub use framecast_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use framecast_frame::*;
}

/// Re-export uploader and session types (requires `uploader` feature).
#[cfg(feature = "uploader")]
pub mod uploader {
    pub use framecast_uploader::*;
}
