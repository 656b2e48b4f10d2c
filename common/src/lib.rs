pub mod bytes;
pub mod keystore;
pub mod serde;

pub use bytes::BytesRange;
pub use keystore::{
    Compare, Entry, EntryIterator, EventKind, KeyStore, KeyStoreError, KeyStoreRead,
    KeyStoreResult, TxnOp, WatchEvent, WatchStream,
};
pub use serde::EncodingError;
