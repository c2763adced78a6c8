//! Command frames.
//!
//! ```text
//! ┌──────────┬──────────────────┬───────────────────┐
//! │ kind: u8 │ len: u32 (LE)    │ payload: len bytes│
//! └──────────┴──────────────────┴───────────────────┘
//! ```
//!
//! The ring itself carries opaque bytes. This is the convention the host and
//! the `sidecar-helper` process agree on when they need message boundaries.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Bytes before the payload: kind plus length.
pub const FRAME_HEADER_LEN: usize = 5;

/// Default upper bound on a payload accepted by [`FrameDecoder`].
pub const MAX_FRAME_PAYLOAD: u32 = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandKind {
    ProcessData = 1,
    Ping = 2,
    Shutdown = 3,
}

impl TryFrom<u8> for CommandKind {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::ProcessData),
            2 => Ok(Self::Ping),
            3 => Ok(Self::Shutdown),
            other => Err(FrameError::UnknownKind(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    UnknownKind(u8),
    /// Declared payload length exceeds the decoder's limit.
    TooLarge { len: u32, max: u32 },
    /// Fewer bytes than the header announces.
    Truncated { needed: usize, available: usize },
    /// Bytes left over after a complete frame.
    TrailingBytes(usize),
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownKind(k) => write!(f, "unknown command kind {}", k),
            Self::TooLarge { len, max } => {
                write!(f, "frame payload of {} bytes exceeds limit {}", len, max)
            }
            Self::Truncated { needed, available } => {
                write!(f, "truncated frame: need {} bytes, have {}", needed, available)
            }
            Self::TrailingBytes(n) => write!(f, "{} trailing bytes after frame", n),
        }
    }
}

impl std::error::Error for FrameError {}

/// A decoded command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub payload: Bytes,
}

impl Command {
    pub fn new(kind: CommandKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    pub fn process_data(payload: impl Into<Bytes>) -> Self {
        Self::new(CommandKind::ProcessData, payload)
    }

    pub fn ping() -> Self {
        Self::new(CommandKind::Ping, Bytes::new())
    }

    pub fn shutdown() -> Self {
        Self::new(CommandKind::Shutdown, Bytes::new())
    }

    /// Header plus payload length.
    pub fn encoded_len(&self) -> usize {
        FRAME_HEADER_LEN + self.payload.len()
    }

    /// Append the encoded frame to `dst`.
    ///
    /// # Panics
    ///
    /// If the payload is longer than `u32::MAX` bytes.
    pub fn encode(&self, dst: &mut BytesMut) {
        let len = u32::try_from(self.payload.len()).expect("payload length exceeds u32");
        dst.reserve(self.encoded_len());
        dst.put_u8(self.kind as u8);
        dst.put_u32_le(len);
        dst.put_slice(&self.payload);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode exactly one frame occupying all of `frame`.
    pub fn decode(frame: &[u8]) -> Result<Self, FrameError> {
        let (kind, len) = parse_header(frame)?;
        let needed = FRAME_HEADER_LEN + len as usize;
        if frame.len() < needed {
            return Err(FrameError::Truncated {
                needed,
                available: frame.len(),
            });
        }
        if frame.len() > needed {
            return Err(FrameError::TrailingBytes(frame.len() - needed));
        }
        Ok(Self {
            kind,
            payload: Bytes::copy_from_slice(&frame[FRAME_HEADER_LEN..]),
        })
    }
}

fn parse_header(buf: &[u8]) -> Result<(CommandKind, u32), FrameError> {
    if buf.len() < FRAME_HEADER_LEN {
        return Err(FrameError::Truncated {
            needed: FRAME_HEADER_LEN,
            available: buf.len(),
        });
    }
    let kind = CommandKind::try_from(buf[0])?;
    let mut len_bytes = &buf[1..FRAME_HEADER_LEN];
    Ok((kind, len_bytes.get_u32_le()))
}

/// Reassembles frames from a byte stream that may split them anywhere.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    max_payload: u32,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_payload(MAX_FRAME_PAYLOAD)
    }

    pub fn with_max_payload(max_payload: u32) -> Self {
        Self {
            buf: BytesMut::new(),
            max_payload,
        }
    }

    /// Buffer more stream bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Take the next complete frame (header included), if one is buffered.
    ///
    /// Headers are validated as soon as they are complete. After an error the
    /// stream position is lost; call [`reset`](Self::reset) before pushing
    /// more bytes.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, FrameError> {
        if self.buf.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }
        let (_, len) = parse_header(&self.buf)?;
        if len > self.max_payload {
            return Err(FrameError::TooLarge {
                len,
                max: self.max_payload,
            });
        }
        let total = FRAME_HEADER_LEN + len as usize;
        if self.buf.len() < total {
            return Ok(None);
        }
        Ok(Some(self.buf.split_to(total).freeze()))
    }

    /// Like [`next_frame`](Self::next_frame) but decoded.
    pub fn next_command(&mut self) -> Result<Option<Command>, FrameError> {
        match self.next_frame()? {
            Some(mut frame) => {
                let kind = CommandKind::try_from(frame[0])?;
                frame.advance(FRAME_HEADER_LEN);
                Ok(Some(Command {
                    kind,
                    payload: frame,
                }))
            }
            None => Ok(None),
        }
    }

    /// Bytes buffered but not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop everything buffered.
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
