//! Frame header/body parsing and body encoding
//!
//! An inbound frame looks like an HTTP request with a hex body:
//!
//! ```text
//! Client-Id: 3\r\n
//! \r\n
//! 7B2274797065223A31313032347D0A
//! ```
//!
//! The body un-hexes to a newline-terminated JSON envelope.

use crate::{Envelope, FrameError};
use bytes::Bytes;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashMap;

/// Separator between the header block and the body
pub const HEADER_DELIMITER: &[u8] = b"\r\n\r\n";

/// Hex encoding of the trailing newline that ends every frame
pub const END_MARKER: &[u8] = b"0A";

/// Header carrying the connection identifier
pub const CLIENT_ID_HEADER: &str = "Client-Id";

/// Decode a complete raw frame and stamp the envelope with its client id
pub fn decode(raw: &[u8]) -> Result<Envelope, FrameError> {
    let raw_bytes = || Bytes::copy_from_slice(raw);

    let split = find(raw, HEADER_DELIMITER).ok_or_else(|| FrameError::MissingHeader {
        name: CLIENT_ID_HEADER,
        raw: raw_bytes(),
    })?;

    let headers = parse_headers(&raw[..split]);
    let value = headers
        .get(CLIENT_ID_HEADER)
        .ok_or_else(|| FrameError::MissingHeader {
            name: CLIENT_ID_HEADER,
            raw: raw_bytes(),
        })?;
    let client_id = value.trim().parse::<u64>().map_err(|_| FrameError::InvalidHeader {
        name: CLIENT_ID_HEADER,
        value: value.clone(),
        raw: raw_bytes(),
    })?;

    // The body is whatever follows the last delimiter.
    let body = rfind(raw, HEADER_DELIMITER)
        .map(|pos| &raw[pos + HEADER_DELIMITER.len()..])
        .unwrap_or_default();

    let mut envelope = decode_body_with_raw(body, raw)?;
    envelope.client_id = client_id;
    Ok(envelope)
}

/// Decode a hex body into an envelope (client id left at zero)
pub fn decode_body(body: &[u8]) -> Result<Envelope, FrameError> {
    decode_body_with_raw(body, body)
}

fn decode_body_with_raw(body: &[u8], raw: &[u8]) -> Result<Envelope, FrameError> {
    let bytes = hex::decode(body).map_err(|source| FrameError::Hex {
        source,
        raw: Bytes::copy_from_slice(raw),
    })?;

    let text = decode_text(&bytes).ok_or_else(|| FrameError::Text {
        len: bytes.len(),
        raw: Bytes::copy_from_slice(raw),
    })?;

    serde_json::from_str(text.trim_end_matches('\n')).map_err(|source| FrameError::Json {
        source,
        raw: Bytes::copy_from_slice(raw),
    })
}

/// UTF-8 first, GBK for agents running on legacy Chinese locales
fn decode_text(bytes: &[u8]) -> Option<Cow<'_, str>> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Some(Cow::Borrowed(text)),
        Err(_) => encoding_rs::GBK.decode_without_bom_handling_and_without_replacement(bytes),
    }
}

/// Encode a payload as the hex text of its JSON
pub fn encode<T: Serialize>(payload: &T) -> Result<String, FrameError> {
    let json = serde_json::to_string(payload).map_err(FrameError::Encode)?;
    Ok(hex::encode(json.as_bytes()))
}

/// Build a complete inbound frame the way an agent does
///
/// The body is newline-terminated and upper-case hex, so it ends with
/// [`END_MARKER`].
pub fn inbound_frame<T: Serialize>(client_id: u64, payload: &T) -> Result<Vec<u8>, FrameError> {
    let mut json = serde_json::to_string(payload).map_err(FrameError::Encode)?;
    json.push('\n');

    let mut frame = format!("POST / HTTP/1.1\r\n{}: {}\r\n\r\n", CLIENT_ID_HEADER, client_id).into_bytes();
    frame.extend_from_slice(hex::encode_upper(json.as_bytes()).as_bytes());
    Ok(frame)
}

fn parse_headers(block: &[u8]) -> HashMap<String, String> {
    String::from_utf8_lossy(block)
        .lines()
        .filter_map(|line| line.split_once(": "))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|window| window == needle)
}
