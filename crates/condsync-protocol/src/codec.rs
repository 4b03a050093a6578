//! Frame codecs for the daemon socket.
//!
//! Requests are framed by a single length character followed by exactly
//! that many characters of body, all UTF-8 encoded:
//!
//! ```text
//! <char L><L characters of body>
//! ```
//!
//! The length character must come from the Basic Multilingual Plane, so
//! no body longer than [`MAX_FRAME_CHARS`] can be sent. Responses are
//! plain newline-terminated lines.

use std::io;

use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::response::Response;

/// Largest body length a single length character can carry.
pub const MAX_FRAME_CHARS: u32 = 0xFFFF;

/// Longest response line a client accepts.
pub const MAX_RESPONSE_LINE: usize = 64 * 1024;

/// Surrogate code points cannot be encoded as a length character.
const SURROGATES: std::ops::RangeInclusive<u32> = 0xD800..=0xDFFF;

/// Number of bytes in the UTF-8 sequence introduced by `lead`.
fn utf8_width(lead: u8) -> Option<usize> {
    match lead {
        0x00..=0x7F => Some(1),
        0xC2..=0xDF => Some(2),
        0xE0..=0xEF => Some(3),
        0xF0..=0xF4 => Some(4),
        _ => None,
    }
}

/// Writes one request frame for `body` into `dst`.
///
/// Fails without writing anything if the body length has no length
/// character.
pub fn encode_frame(body: &str, dst: &mut BytesMut) -> Result<(), FrameError> {
    let len = body.chars().count();
    let prefix = u32::try_from(len)
        .ok()
        .filter(|len| *len <= MAX_FRAME_CHARS && !SURROGATES.contains(len))
        .and_then(char::from_u32)
        .ok_or(FrameError::Unrepresentable {
            len,
            max: MAX_FRAME_CHARS,
        })?;

    let mut utf8 = [0u8; 4];
    let prefix = prefix.encode_utf8(&mut utf8);
    dst.reserve(prefix.len() + body.len());
    dst.put_slice(prefix.as_bytes());
    dst.put_slice(body.as_bytes());
    Ok(())
}

/// Server side: decodes request frames, encodes response lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct ServerCodec;

impl ServerCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for ServerCodec {
    type Item = String;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, FrameError> {
        let Some(&lead) = src.first() else {
            return Ok(None);
        };
        let prefix_width = utf8_width(lead).ok_or(FrameError::InvalidUtf8)?;
        let Some(prefix) = src.get(..prefix_width) else {
            return Ok(None);
        };

        let len = std::str::from_utf8(prefix)
            .ok()
            .and_then(|s| s.chars().next())
            .map(u32::from)
            .ok_or(FrameError::InvalidUtf8)?;
        if len > MAX_FRAME_CHARS {
            return Err(FrameError::InvalidLength(len));
        }

        let mut end = prefix_width;
        for _ in 0..len {
            let Some(&byte) = src.get(end) else {
                return Ok(None);
            };
            end += utf8_width(byte).ok_or(FrameError::InvalidUtf8)?;
        }
        if src.len() < end {
            return Ok(None);
        }

        let frame = src.split_to(end);
        let body = frame.get(prefix_width..).unwrap_or_default();
        let body = std::str::from_utf8(body).map_err(|_| FrameError::InvalidUtf8)?;
        Ok(Some(body.to_string()))
    }
}

impl Encoder<Response> for ServerCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<(), FrameError> {
        let line = item.to_string();
        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

/// Client side: encodes request frames, decodes response lines.
#[derive(Debug, Clone)]
pub struct ClientCodec {
    lines: LinesCodec,
}

impl ClientCodec {
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_RESPONSE_LINE),
        }
    }
}

impl Default for ClientCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Encoder<&'a str> for ClientCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &'a str, dst: &mut BytesMut) -> Result<(), FrameError> {
        encode_frame(item, dst)
    }
}

impl Decoder for ClientCodec {
    type Item = String;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, FrameError> {
        self.lines.decode(src).map_err(FrameError::from)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, FrameError> {
        self.lines.decode_eof(src).map_err(FrameError::from)
    }
}

/// Errors raised while framing socket traffic.
///
/// All of them are terminal for the connection.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Frame is not valid UTF-8")]
    InvalidUtf8,

    #[error("Length prefix {0:#x} is outside the representable range")]
    InvalidLength(u32),

    #[error("Message of {len} characters cannot be framed (max: {max})")]
    Unrepresentable { len: usize, max: u32 },

    #[error("Response line exceeds {max} bytes")]
    LineTooLong { max: usize },
}

impl From<LinesCodecError> for FrameError {
    fn from(err: LinesCodecError) -> Self {
        match err {
            LinesCodecError::MaxLineLengthExceeded => Self::LineTooLong {
                max: MAX_RESPONSE_LINE,
            },
            LinesCodecError::Io(e) => Self::Io(e),
        }
    }
}
