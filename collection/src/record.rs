use bytes::Bytes;
use common::EncodingError;

/// A typed record stored in a [`Collection`](crate::Collection).
///
/// Implementations own their binary codec; the collection layer treats the
/// encoded form as opaque bytes. Decode failures surface to callers as
/// [`Error::Decode`](crate::Error::Decode).
pub trait Record: Clone + Send + Sync + 'static {
    /// Encodes the record to its stored byte form.
    fn encode(&self) -> Bytes;

    /// Decodes a record from its stored byte form.
    fn decode(buf: &[u8]) -> Result<Self, EncodingError>
    where
        Self: Sized;
}
