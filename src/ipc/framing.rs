//! Wire framing: every message is a 4-byte big-endian length followed by
//! a UTF-8 s-expression payload.

use thiserror::Error;

/// Largest accepted payload (8 MiB). Full-resolution depth frames are
/// the largest messages.
pub const MAX_MESSAGE_SIZE: u32 = 8_388_608;

const HEADER_LEN: usize = 4;

/// Framing violations. The connection cannot be resynchronised after one.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    #[error("message of {len} bytes exceeds limit of {max}")]
    Oversized { len: u32, max: u32 },
}

/// Append `payload` to `out` with its length prefix.
pub fn encode(payload: &str, out: &mut Vec<u8>) {
    let bytes = payload.as_bytes();
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

/// Accumulates bytes from a stream and yields whole payloads.
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(4096),
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes received but not yet returned as a message.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Next complete payload, `Ok(None)` while one is still arriving.
    /// On error the buffer is discarded.
    pub fn next_message(&mut self) -> Result<Option<String>, FramingError> {
        let Some(header) = self.buf.get(..HEADER_LEN) else {
            return Ok(None);
        };
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        if len > MAX_MESSAGE_SIZE {
            self.buf.clear();
            return Err(FramingError::Oversized {
                len,
                max: MAX_MESSAGE_SIZE,
            });
        }
        let end = HEADER_LEN + len as usize;
        if self.buf.len() < end {
            return Ok(None);
        }
        let payload = String::from_utf8_lossy(&self.buf[HEADER_LEN..end]).into_owned();
        self.buf.drain(..end);
        Ok(Some(payload))
    }

    /// Every complete payload currently buffered. Messages decoded before
    /// a framing error are returned along with it.
    pub fn drain_messages(&mut self) -> (Vec<String>, Option<FramingError>) {
        let mut messages = Vec::new();
        loop {
            match self.next_message() {
                Ok(Some(msg)) => messages.push(msg),
                Ok(None) => return (messages, None),
                Err(e) => return (messages, Some(e)),
            }
        }
    }
}
