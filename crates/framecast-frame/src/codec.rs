use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::{FrameError, Result};

/// Status line opening every message.
pub const STATUS_LINE: &str = "HTTP/1.1 200 OK";

/// Header carrying the exact number of payload bytes after the blank line.
pub const CONTENT_LENGTH: &str = "Content-Length";
/// Frame width in pixels.
pub const BUFFER_WIDTH: &str = "Buffer-Width";
/// Frame height in pixels.
pub const BUFFER_HEIGHT: &str = "Buffer-Height";
/// Orientation code of the captured buffer.
pub const BUFFER_ORIENTATION: &str = "Buffer-Orientation";

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Default maximum header block size: 8 KiB.
pub const DEFAULT_MAX_HEADER_SIZE: usize = 8 * 1024;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Metadata supplied by the frame producer.
///
/// `orientation` uses the capture source's image orientation code
/// (1 = up, 3 = down, 6 = right, 8 = left, mirrored variants in between);
/// 0 means the source did not report one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    pub orientation: u32,
}

impl FrameInfo {
    pub fn new(width: u32, height: u32, orientation: u32) -> Self {
        Self {
            width,
            height,
            orientation,
        }
    }
}

/// Header fields of one wire message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub content_length: usize,
    pub width: u32,
    pub height: u32,
    pub orientation: u32,
}

impl FrameHeader {
    pub fn new(content_length: usize, info: FrameInfo) -> Self {
        Self {
            content_length,
            width: info.width,
            height: info.height,
            orientation: info.orientation,
        }
    }

    pub fn info(&self) -> FrameInfo {
        FrameInfo::new(self.width, self.height, self.orientation)
    }

    /// Serialized header block, including the terminating blank line.
    pub fn to_header_block(&self) -> String {
        format!(
            "{STATUS_LINE}\r\n\
             {CONTENT_LENGTH}: {}\r\n\
             {BUFFER_WIDTH}: {}\r\n\
             {BUFFER_HEIGHT}: {}\r\n\
             {BUFFER_ORIENTATION}: {}\r\n\
             \r\n",
            self.content_length, self.width, self.height, self.orientation
        )
    }
}

/// A decoded message: header plus exactly `content_length` payload bytes.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame whose content length matches `payload`.
    pub fn new(info: FrameInfo, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        Self {
            header: FrameHeader::new(payload.len(), info),
            payload,
        }
    }

    pub fn info(&self) -> FrameInfo {
        self.header.info()
    }

    /// The total wire size of this frame (header block + payload).
    pub fn wire_size(&self) -> usize {
        self.header.to_header_block().len() + self.payload.len()
    }
}

/// Encode one image frame into the wire format.
///
/// Wire format (CRLF line endings):
/// ```text
/// HTTP/1.1 200 OK
/// Content-Length: <payload bytes>
/// Buffer-Width: <pixels>
/// Buffer-Height: <pixels>
/// Buffer-Orientation: <code>
///
/// <payload, verbatim>
/// ```
///
/// An empty payload is rejected and leaves `dst` untouched.
pub fn encode_frame(info: FrameInfo, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.is_empty() {
        return Err(FrameError::EmptyPayload);
    }
    let head = FrameHeader::new(payload.len(), info).to_header_block();
    dst.reserve(head.len() + payload.len());
    dst.put_slice(head.as_bytes());
    dst.put_slice(payload);
    Ok(())
}

/// Encode one frame into a freshly allocated, immutable message.
pub fn encode_message(info: FrameInfo, payload: &[u8]) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    encode_frame(info, payload, &mut buf)?;
    Ok(buf.freeze())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, config: &FrameConfig) -> Result<Option<Frame>> {
    let Some(block_end) = find_terminator(src) else {
        if src.len() > config.max_header_size {
            return Err(FrameError::HeaderTooLarge {
                size: src.len(),
                max: config.max_header_size,
            });
        }
        return Ok(None);
    };

    let header_len = block_end + HEADER_TERMINATOR.len();
    if header_len > config.max_header_size {
        return Err(FrameError::HeaderTooLarge {
            size: header_len,
            max: config.max_header_size,
        });
    }

    let header = parse_header_block(&src[..block_end])?;
    if header.content_length > config.max_payload_size {
        return Err(FrameError::PayloadTooLarge {
            size: header.content_length,
            max: config.max_payload_size,
        });
    }

    if src.len() < header_len + header.content_length {
        return Ok(None);
    }

    src.advance(header_len);
    let payload = src.split_to(header.content_length).freeze();
    Ok(Some(Frame { header, payload }))
}

/// Parse a header block (status line and header lines, without the blank
/// line). Header names are case-insensitive; unknown headers are ignored and
/// missing `Buffer-*` fields default to 0.
pub fn parse_header_block(block: &[u8]) -> Result<FrameHeader> {
    let text = String::from_utf8_lossy(block);
    let mut lines = text.split("\r\n");

    let status = lines.next().unwrap_or_default();
    if !status.starts_with("HTTP/") {
        return Err(FrameError::InvalidStatusLine(status.to_string()));
    }

    let mut content_length = None;
    let mut info = FrameInfo::default();
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            return Err(FrameError::MalformedHeaderLine(line.to_string()));
        };
        let name = name.trim();
        let value = value.trim();

        if name.eq_ignore_ascii_case(CONTENT_LENGTH) {
            let parsed: usize = parse_field(CONTENT_LENGTH, value)?;
            if content_length.is_some_and(|previous| previous != parsed) {
                return Err(FrameError::InvalidHeader {
                    name: CONTENT_LENGTH,
                    value: value.to_string(),
                });
            }
            content_length = Some(parsed);
        } else if name.eq_ignore_ascii_case(BUFFER_WIDTH) {
            info.width = parse_field(BUFFER_WIDTH, value)?;
        } else if name.eq_ignore_ascii_case(BUFFER_HEIGHT) {
            info.height = parse_field(BUFFER_HEIGHT, value)?;
        } else if name.eq_ignore_ascii_case(BUFFER_ORIENTATION) {
            info.orientation = parse_field(BUFFER_ORIENTATION, value)?;
        } else {
            trace!(header = name, "ignoring unknown header");
        }
    }

    let content_length = content_length.ok_or(FrameError::MissingContentLength)?;
    Ok(FrameHeader::new(content_length, info))
}

fn parse_field<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T> {
    value.parse().map_err(|_| FrameError::InvalidHeader {
        name,
        value: value.to_string(),
    })
}

fn find_terminator(src: &[u8]) -> Option<usize> {
    src.windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
}

/// Configuration for the frame decoder.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum header block size in bytes. Default: 8 KiB.
    pub max_header_size: usize,
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Read timeout for blocking socket reads.
    pub read_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
        }
    }
}
