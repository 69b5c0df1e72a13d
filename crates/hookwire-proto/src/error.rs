//! Error types for protocol operations

use bytes::Bytes;
use thiserror::Error;

/// Failure to turn raw bytes into an envelope, or an envelope into bytes.
///
/// Decode variants keep the offending frame so the listener can log what it
/// dropped.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Header block or `Client-Id` header missing
    #[error("Missing header: {name}")]
    MissingHeader {
        /// Name of the header that was expected
        name: &'static str,
        /// Raw frame
        raw: Bytes,
    },

    /// Header present but its value is unusable
    #[error("Invalid header {name}: {value:?}")]
    InvalidHeader {
        /// Header name
        name: &'static str,
        /// Header value as received
        value: String,
        /// Raw frame
        raw: Bytes,
    },

    /// Body is not valid hexadecimal text
    #[error("Invalid hex body: {source}")]
    Hex {
        /// Underlying hex error
        source: hex::FromHexError,
        /// Raw frame
        raw: Bytes,
    },

    /// Body bytes are neither UTF-8 nor GBK
    #[error("Undecodable body text ({len} bytes)")]
    Text {
        /// Length of the un-hexed body
        len: usize,
        /// Raw frame
        raw: Bytes,
    },

    /// Body text is not a valid envelope
    #[error("Malformed JSON body: {source}")]
    Json {
        /// Underlying JSON error
        source: serde_json::Error,
        /// Raw frame
        raw: Bytes,
    },

    /// Payload could not be serialized
    #[error("Serialization error: {0}")]
    Encode(#[source] serde_json::Error),

    /// Frame exceeds the reader's limit
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Bytes accumulated so far
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// Socket read failed
    #[error("Read error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// The raw frame that failed to decode, if this error came from decoding.
    pub fn raw(&self) -> Option<&Bytes> {
        match self {
            Self::MissingHeader { raw, .. }
            | Self::InvalidHeader { raw, .. }
            | Self::Hex { raw, .. }
            | Self::Text { raw, .. }
            | Self::Json { raw, .. } => Some(raw),
            Self::Encode(_) | Self::FrameTooLarge { .. } | Self::Io(_) => None,
        }
    }
}
