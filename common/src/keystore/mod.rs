//! The KeyStore contract: a linearizable, revisioned key-value store.
//!
//! Every committed transaction advances a store-wide revision counter, and
//! every entry carries the revision at which it was last modified. Revisions
//! drive both optimistic concurrency (compare-and-swap preconditions) and
//! watch-event ordering.
//!
//! The production backend is an external distributed store; this crate ships
//! only the [`InMemoryKeyStore`](in_memory::InMemoryKeyStore) used by tests
//! and local tooling, plus a failure-injecting wrapper behind the
//! `test-utils` feature.

pub mod in_memory;

#[cfg(feature = "test-utils")]
pub mod failing;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::BytesRange;

/// A key-value entry together with the revision at which it was last modified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub key: Bytes,
    pub value: Bytes,
    pub revision: u64,
}

impl Entry {
    pub fn new(key: Bytes, value: Bytes, revision: u64) -> Self {
        Self {
            key,
            value,
            revision,
        }
    }
}

/// A transaction precondition, checked atomically against current state
/// before any op is applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Compare {
    /// The key's mod revision must equal `revision`.
    ///
    /// Revision 0 means the key must be absent.
    ModRevision { key: Bytes, revision: u64 },
}

/// A single write staged into a transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxnOp {
    Put { key: Bytes, value: Bytes },
    Delete { key: Bytes },
}

/// The kind of change a watch event reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Put,
    Delete,
}

/// A change notification emitted by [`KeyStoreRead::watch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: EventKind,
    pub key: Bytes,
    /// Present for puts, absent for deletes.
    pub value: Option<Bytes>,
    pub revision: u64,
}

/// Error type for KeyStore operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStoreError {
    /// A transaction precondition failed.
    Conflict,
    /// The store could not be reached or the operation timed out.
    Unavailable(String),
    /// Internal errors indicating bugs or invariant violations.
    Internal(String),
}

impl std::error::Error for KeyStoreError {}

impl std::fmt::Display for KeyStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyStoreError::Conflict => write!(f, "Transaction conflict: a compare failed"),
            KeyStoreError::Unavailable(msg) => write!(f, "Store unavailable: {}", msg),
            KeyStoreError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

/// Result type alias for KeyStore operations.
pub type KeyStoreResult<T> = std::result::Result<T, KeyStoreError>;

/// Iterator over entries returned by a range scan.
#[async_trait]
pub trait EntryIterator {
    async fn next(&mut self) -> KeyStoreResult<Option<Entry>>;
}

/// Common read operations supported by both full store handles and read-only
/// views.
///
/// Scans are snapshot-consistent at the revision they execute against.
#[async_trait]
pub trait KeyStoreRead: Send + Sync {
    async fn get(&self, key: Bytes) -> KeyStoreResult<Option<Entry>>;

    /// Returns an iterator over entries in the given range, in lexicographic
    /// key order.
    ///
    /// The returned iterator is owned and does not borrow from the store,
    /// allowing it to be stored in structs or passed across await points.
    async fn range_iter(
        &self,
        range: BytesRange,
    ) -> KeyStoreResult<Box<dyn EntryIterator + Send + 'static>>;

    /// Collects all entries in the range into a Vec.
    #[tracing::instrument(level = "trace", skip_all)]
    async fn range(&self, range: BytesRange) -> KeyStoreResult<Vec<Entry>> {
        let mut iter = self.range_iter(range).await?;
        let mut entries = Vec::new();
        while let Some(entry) = iter.next().await? {
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Subscribes to changes for keys in `range`.
    ///
    /// With `from_revision == 0` the stream starts at the current revision.
    /// A positive revision replays retained events with revision greater than
    /// or equal to it before streaming live events. Events arrive in revision
    /// order. The stream never ends on its own; dropping it cancels the
    /// subscription with no store-side effects.
    async fn watch(&self, range: BytesRange, from_revision: u64) -> KeyStoreResult<WatchStream>;
}

/// A full KeyStore handle: reads plus atomic multi-op transactions.
///
/// Handles are shared as `Arc<dyn KeyStore>` and are safe for concurrent use;
/// writers contend only inside [`txn`](Self::txn).
#[async_trait]
pub trait KeyStore: KeyStoreRead {
    /// Atomically checks `compares` against current state and, if all hold,
    /// applies `ops` under a single new revision, returning it.
    ///
    /// On a failed compare nothing is applied and the call fails with
    /// [`KeyStoreError::Conflict`]. A transaction with no ops does not bump
    /// the revision; it returns the current one (useful as a pure
    /// precondition check).
    async fn txn(&self, compares: Vec<Compare>, ops: Vec<TxnOp>) -> KeyStoreResult<u64>;

    /// Registers store metrics into the given Prometheus registry.
    ///
    /// The default implementation is a no-op. Backends that expose internal
    /// counters override this to register gauges read on each scrape.
    #[cfg(feature = "metrics")]
    fn register_metrics(&self, _registry: &mut prometheus_client::registry::Registry) {}
}

/// A live stream of [`WatchEvent`]s from a watch subscription.
pub struct WatchStream {
    rx: mpsc::UnboundedReceiver<WatchEvent>,
}

impl WatchStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<WatchEvent>) -> Self {
        Self { rx }
    }

    /// Receives the next event.
    ///
    /// Returns `None` only if the store itself has shut down; an idle
    /// subscription simply waits.
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }
}
