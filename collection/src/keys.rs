//! Key layout for collections.
//!
//! The key space under a collection prefix is partitioned by the path
//! separator `/`:
//!
//! ```text
//! primary record:  <prefix>/<key>
//! index entry:     <prefix>/<index>/<value>/<key>
//! ```
//!
//! Record keys may not contain the separator, so a key's relative path under
//! the prefix contains `/` if and only if it is an index entry. Scans and
//! watches rely on this to tell the two classes apart without extra state.

use bytes::Bytes;

use crate::error::{Error, Result};

const SEPARATOR: char = '/';

/// Checks the structural rules every record key must satisfy, independent of
/// any per-collection validator.
pub(crate) fn validate_record_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidKey("key must not be empty".to_string()));
    }
    if key.contains(SEPARATOR) {
        return Err(Error::InvalidKey(format!(
            "key must not contain '{}': {}",
            SEPARATOR, key
        )));
    }
    Ok(())
}

/// Joins a base path and a segment with a single separator.
pub fn join_path(base: &str, segment: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches(SEPARATOR),
        segment.trim_start_matches(SEPARATOR)
    )
}

/// The absolute key of a primary record.
pub(crate) fn primary_key(prefix: &str, key: &str) -> Bytes {
    Bytes::from(format!("{}/{}", prefix, key))
}

/// The absolute key of an index entry.
pub(crate) fn index_entry_key(prefix: &str, index: &str, value: &str, key: &str) -> Bytes {
    Bytes::from(format!("{}/{}/{}/{}", prefix, index, value, key))
}

/// The scan prefix covering all entries of one index value.
///
/// The trailing separator makes the value match exact up to longer values
/// that share it as a string prefix; those still land inside the scan and
/// are filtered by the caller via the remaining-tail check.
pub(crate) fn index_scan_prefix(prefix: &str, index: &str, value: &str) -> String {
    format!("{}/{}/{}/", prefix, index, value)
}

/// Strips `strip` from the front of an absolute key, returning the relative
/// remainder as UTF-8.
pub(crate) fn relative_key<'a>(strip: &str, key: &'a [u8]) -> Result<&'a str> {
    let key = std::str::from_utf8(key)
        .map_err(|e| Error::Internal(format!("Key is not valid UTF-8: {}", e)))?;
    key.strip_prefix(strip)
        .ok_or_else(|| Error::Internal(format!("Key {} lies outside prefix {}", key, strip)))
}
