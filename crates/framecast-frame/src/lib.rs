//! Self-describing image frame messages for framecast.
//!
//! Every accepted frame travels as one HTTP-response-shaped message: a status
//! line, `Content-Length` plus the `Buffer-Width`, `Buffer-Height` and
//! `Buffer-Orientation` headers, a blank line, then exactly `Content-Length`
//! bytes of already-encoded image data.
//!
//! The producer only needs [`encode_frame`]. Consumers decode with
//! [`decode_frame`], the blocking [`FrameReader`], or `FrameCodec` behind the
//! `async` feature.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
pub mod reader;

#[cfg(feature = "async")]
pub use async_codec::FrameCodec;
pub use codec::{
    decode_frame, encode_frame, encode_message, parse_header_block, Frame, FrameConfig,
    FrameHeader, FrameInfo, BUFFER_HEIGHT, BUFFER_ORIENTATION, BUFFER_WIDTH, CONTENT_LENGTH,
    DEFAULT_MAX_HEADER_SIZE, DEFAULT_MAX_PAYLOAD, STATUS_LINE,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
