//! Newline-delimited JSON framing.
//!
//! Each message is a single UTF-8 JSON document followed by `\n`. Blank
//! lines are ignored. A peer that closes the connection with an
//! unterminated document leaves that document as the final frame.

use serde::Serialize;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Upper bound on a single frame, delimiter excluded.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

const FRAME_DELIMITER: u8 = b'\n';
const READ_CHUNK_BYTES: usize = 8 * 1024;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame exceeds {MAX_FRAME_BYTES} bytes")]
    TooLarge,
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Serializes a message as one JSON line.
pub fn encode_frame<T: Serialize>(message: &T) -> serde_json::Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(FRAME_DELIMITER);
    Ok(bytes)
}

/// Incremental decoder that yields the first complete frame.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends received bytes and returns the first complete, non-blank line.
    ///
    /// Bytes following the returned line stay buffered; callers that only
    /// expect one frame simply drop the decoder.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Option<String>, FrameError> {
        self.buffer.extend_from_slice(bytes);

        while let Some(position) = self.buffer.iter().position(|b| *b == FRAME_DELIMITER) {
            let line: Vec<u8> = self.buffer.drain(..=position).collect();
            let text = decode_line(&line[..line.len() - 1])?;
            if !text.is_empty() {
                return Ok(Some(text));
            }
        }

        if self.buffer.len() > MAX_FRAME_BYTES {
            return Err(FrameError::TooLarge);
        }
        Ok(None)
    }

    /// Consumes the decoder at end of stream, returning any unterminated trailing frame.
    pub fn finish(self) -> Result<Option<String>, FrameError> {
        let text = decode_line(&self.buffer)?;
        Ok(if text.is_empty() { None } else { Some(text) })
    }
}

fn decode_line(bytes: &[u8]) -> Result<String, FrameError> {
    let text = std::str::from_utf8(bytes).map_err(|_| FrameError::InvalidUtf8)?;
    Ok(text.trim().to_string())
}

/// Reads from `reader` until the first frame is complete or the peer closes.
///
/// Returns `Ok(None)` when the stream ends without any frame.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<String>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut decoder = FrameDecoder::new();
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];

    loop {
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            return decoder.finish();
        }
        if let Some(frame) = decoder.push(&chunk[..read])? {
            return Ok(Some(frame));
        }
    }
}
