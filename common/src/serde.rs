//! Shared encoding primitives for record serialization.
//!
//! Record codecs are hand-rolled, length-prefixed binary formats. This module
//! provides the field-level building blocks; each storage crate defines its
//! own record types and composes these helpers into full codecs.
//!
//! Multi-byte integers are little-endian. Variable-length fields carry a
//! `u16` length prefix.

use bytes::BytesMut;

/// Encoding error with a descriptive message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingError {
    pub message: String,
}

impl EncodingError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::error::Error for EncodingError {}

impl std::fmt::Display for EncodingError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Encode a UTF-8 string.
///
/// Format: `len: u16` (little-endian) + `len` bytes of UTF-8
pub fn encode_utf8(s: &str, buf: &mut BytesMut) {
    let bytes = s.as_bytes();
    let len = bytes.len();
    if len > u16::MAX as usize {
        panic!("String too long for UTF-8 encoding: {} bytes", len);
    }
    buf.extend_from_slice(&(len as u16).to_le_bytes());
    buf.extend_from_slice(bytes);
}

/// Decode a UTF-8 string.
///
/// Format: `len: u16` (little-endian) + `len` bytes of UTF-8
pub fn decode_utf8(buf: &mut &[u8]) -> Result<String, EncodingError> {
    if buf.len() < 2 {
        return Err(EncodingError::new("Buffer too short for UTF-8 length"));
    }
    let len = u16::from_le_bytes([buf[0], buf[1]]) as usize;
    *buf = &buf[2..];

    if buf.len() < len {
        return Err(EncodingError::new(format!(
            "Buffer too short for UTF-8 payload: need {} bytes, have {}",
            len,
            buf.len()
        )));
    }

    let bytes = &buf[..len];
    *buf = &buf[len..];

    String::from_utf8(bytes.to_vec())
        .map_err(|e| EncodingError::new(format!("Invalid UTF-8: {}", e)))
}

/// Encode an optional non-empty UTF-8 string.
///
/// Format: Same as Utf8, but `len = 0` means `None`
pub fn encode_optional_utf8(opt: Option<&str>, buf: &mut BytesMut) {
    match opt {
        Some(s) => encode_utf8(s, buf),
        None => {
            buf.extend_from_slice(&0u16.to_le_bytes());
        }
    }
}

/// Decode an optional non-empty UTF-8 string.
///
/// Format: Same as Utf8, but `len = 0` means `None`
pub fn decode_optional_utf8(buf: &mut &[u8]) -> Result<Option<String>, EncodingError> {
    if buf.len() < 2 {
        return Err(EncodingError::new(
            "Buffer too short for optional UTF-8 length",
        ));
    }
    let len = u16::from_le_bytes([buf[0], buf[1]]);
    if len == 0 {
        *buf = &buf[2..];
        return Ok(None);
    }
    decode_utf8(buf).map(Some)
}

/// Encode a u64 as 8 little-endian bytes.
pub fn encode_u64(v: u64, buf: &mut BytesMut) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Decode a u64 from 8 little-endian bytes.
pub fn decode_u64(buf: &mut &[u8]) -> Result<u64, EncodingError> {
    if buf.len() < 8 {
        return Err(EncodingError::new(format!(
            "Buffer too short for u64: need 8 bytes, have {}",
            buf.len()
        )));
    }
    let v = u64::from_le_bytes(buf[..8].try_into().expect("checked length"));
    *buf = &buf[8..];
    Ok(v)
}

/// Encode an optional u64.
///
/// Format: `present: u8` (0 or 1) + 8 bytes when present
pub fn encode_optional_u64(opt: Option<u64>, buf: &mut BytesMut) {
    match opt {
        Some(v) => {
            buf.extend_from_slice(&[1]);
            encode_u64(v, buf);
        }
        None => buf.extend_from_slice(&[0]),
    }
}

/// Decode an optional u64.
pub fn decode_optional_u64(buf: &mut &[u8]) -> Result<Option<u64>, EncodingError> {
    if buf.is_empty() {
        return Err(EncodingError::new("Buffer too short for optional u64 tag"));
    }
    let tag = buf[0];
    *buf = &buf[1..];
    match tag {
        0 => Ok(None),
        1 => decode_u64(buf).map(Some),
        other => Err(EncodingError::new(format!(
            "Invalid optional u64 tag: {}",
            other
        ))),
    }
}

/// Encode a bool as a single byte.
pub fn encode_bool(v: bool, buf: &mut BytesMut) {
    buf.extend_from_slice(&[v as u8]);
}

/// Decode a bool from a single byte. Only 0 and 1 are valid.
pub fn decode_bool(buf: &mut &[u8]) -> Result<bool, EncodingError> {
    if buf.is_empty() {
        return Err(EncodingError::new("Buffer too short for bool"));
    }
    let v = buf[0];
    *buf = &buf[1..];
    match v {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(EncodingError::new(format!("Invalid bool byte: {}", other))),
    }
}

/// Encode the count prefix of an array.
///
/// Panics if the count exceeds u16::MAX.
pub fn encode_array_count(count: usize, buf: &mut BytesMut) {
    if count > u16::MAX as usize {
        panic!("Array too long: {} items", count);
    }
    buf.extend_from_slice(&(count as u16).to_le_bytes());
}

/// Decode the count prefix of an array.
///
/// Returns the count as a usize and advances the buffer past the count bytes.
pub fn decode_array_count(buf: &mut &[u8]) -> Result<usize, EncodingError> {
    if buf.len() < 2 {
        return Err(EncodingError::new("Buffer too short for array count"));
    }
    let count = u16::from_le_bytes([buf[0], buf[1]]) as usize;
    *buf = &buf[2..];
    Ok(count)
}

/// Encode a list of UTF-8 strings as a count prefix followed by each string.
pub fn encode_utf8_array(items: &[String], buf: &mut BytesMut) {
    encode_array_count(items.len(), buf);
    for item in items {
        encode_utf8(item, buf);
    }
}

/// Decode a list of UTF-8 strings.
pub fn decode_utf8_array(buf: &mut &[u8]) -> Result<Vec<String>, EncodingError> {
    let count = decode_array_count(buf)?;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(decode_utf8(buf)?);
    }
    Ok(items)
}
