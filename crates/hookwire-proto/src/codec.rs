//! Frame reader for async streams

use crate::frame::END_MARKER;
use crate::FrameError;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Maximum frame size (16MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Size of a single socket read
const CHUNK_SIZE: usize = 1024;

/// Accumulates one inbound frame from a connection
///
/// A frame is complete when the peer closes the connection or when the
/// accumulated bytes end with the hex digits `0A`. The check runs on the
/// still-encoded stream, which is what the agents rely on.
pub struct FrameReader {
    /// Read buffer for incoming data
    read_buf: BytesMut,
    /// Maximum frame size allowed
    max_frame_size: usize,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader {
    /// Create a new frame reader with default settings
    pub fn new() -> Self {
        Self {
            read_buf: BytesMut::with_capacity(8192),
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Create a new frame reader with custom max frame size
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            read_buf: BytesMut::with_capacity(8192),
            max_frame_size,
        }
    }

    /// Read a frame from an async reader
    ///
    /// Returns `None` if the peer closed without sending anything.
    pub async fn read_frame<R>(&mut self, reader: &mut R) -> Result<Option<Bytes>, FrameError>
    where
        R: AsyncRead + Unpin,
    {
        let mut chunk = [0u8; CHUNK_SIZE];
        loop {
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                break;
            }

            self.read_buf.extend_from_slice(&chunk[..n]);

            if self.read_buf.len() > self.max_frame_size {
                return Err(FrameError::FrameTooLarge {
                    size: self.read_buf.len(),
                    max: self.max_frame_size,
                });
            }

            if is_complete(&self.read_buf) {
                break;
            }
        }

        if self.read_buf.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.read_buf.split().freeze()))
    }

    /// Get the current buffer size
    pub fn buffer_size(&self) -> usize {
        self.read_buf.len()
    }
}

/// True when `buf` ends with the encoded newline marker
pub fn is_complete(buf: &[u8]) -> bool {
    buf.ends_with(END_MARKER)
}
