//! A failure-injecting KeyStore wrapper for tests.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use super::{
    Compare, Entry, EntryIterator, KeyStore, KeyStoreError, KeyStoreRead, KeyStoreResult, TxnOp,
    WatchStream,
};
use crate::BytesRange;

/// Injected failure that fires either once or on every call.
#[derive(Clone)]
enum Failure {
    /// Error is returned once, then automatically cleared.
    Once(KeyStoreError),
    /// Error is returned on every subsequent call until explicitly cleared.
    Persistent(KeyStoreError),
}

type FailSlot = arc_swap::ArcSwap<Option<Failure>>;

/// Checks a [`FailSlot`] and returns an error if one is set.
///
/// For [`Failure::Once`], the slot is atomically swapped to `None` so the
/// error fires exactly once. For [`Failure::Persistent`], the slot is left
/// unchanged.
fn check_failure(slot: &FailSlot) -> KeyStoreResult<()> {
    let guard = slot.load();
    match guard.as_ref() {
        None => Ok(()),
        Some(Failure::Persistent(err)) => Err(err.clone()),
        Some(Failure::Once(_)) => {
            // Swap to None; if another thread raced us, one of them gets the
            // error and the others pass through — reasonable for tests.
            let prev = slot.swap(Arc::new(None));
            match prev.as_ref() {
                Some(Failure::Once(err)) => Err(err.clone()),
                _ => Ok(()),
            }
        }
    }
}

/// A KeyStore wrapper that delegates to an inner [`KeyStore`] but can inject
/// failures into `txn`, `get`, `range_iter`, and `watch` on demand.
///
/// Each failure slot is controlled by a lock-free [`ArcSwap`](arc_swap::ArcSwap)
/// so the wrapper adds no synchronisation that could mask concurrency bugs in
/// the code under test.
///
/// Failures can be *persistent* (returned on every call until cleared) or
/// *once* (returned on the next call, then automatically cleared).
///
/// Gated behind the `test-utils` feature.
///
/// # Example
///
/// ```ignore
/// let inner = Arc::new(InMemoryKeyStore::new());
/// let store = FailingKeyStore::wrap(inner);
/// store.fail_txn_once(KeyStoreError::Unavailable("lost quorum".into()));
/// // only the next txn call returns Err(...), then auto-clears
/// ```
pub struct FailingKeyStore {
    inner: Arc<dyn KeyStore>,
    fail_txn: FailSlot,
    fail_get: FailSlot,
    fail_range: FailSlot,
    fail_watch: FailSlot,
}

impl FailingKeyStore {
    /// Wraps an existing store, with all failure injections initially `None`.
    pub fn wrap(inner: Arc<dyn KeyStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_txn: arc_swap::ArcSwap::from_pointee(None),
            fail_get: arc_swap::ArcSwap::from_pointee(None),
            fail_range: arc_swap::ArcSwap::from_pointee(None),
            fail_watch: arc_swap::ArcSwap::from_pointee(None),
        })
    }

    /// Makes `txn` return the given error on every subsequent call.
    pub fn fail_txn(&self, err: KeyStoreError) {
        self.fail_txn.store(Arc::new(Some(Failure::Persistent(err))));
    }

    /// Makes `txn` return the given error on the next call only.
    pub fn fail_txn_once(&self, err: KeyStoreError) {
        self.fail_txn.store(Arc::new(Some(Failure::Once(err))));
    }

    /// Clears any injected `txn` failure.
    pub fn clear_txn_failure(&self) {
        self.fail_txn.store(Arc::new(None));
    }

    /// Makes `get` return the given error on every subsequent call.
    pub fn fail_get(&self, err: KeyStoreError) {
        self.fail_get.store(Arc::new(Some(Failure::Persistent(err))));
    }

    /// Makes `get` return the given error on the next call only.
    pub fn fail_get_once(&self, err: KeyStoreError) {
        self.fail_get.store(Arc::new(Some(Failure::Once(err))));
    }

    /// Makes `range_iter` return the given error on the next call only.
    pub fn fail_range_once(&self, err: KeyStoreError) {
        self.fail_range.store(Arc::new(Some(Failure::Once(err))));
    }

    /// Makes `watch` return the given error on the next call only.
    pub fn fail_watch_once(&self, err: KeyStoreError) {
        self.fail_watch.store(Arc::new(Some(Failure::Once(err))));
    }
}

#[async_trait]
impl KeyStoreRead for FailingKeyStore {
    async fn get(&self, key: Bytes) -> KeyStoreResult<Option<Entry>> {
        check_failure(&self.fail_get)?;
        self.inner.get(key).await
    }

    async fn range_iter(
        &self,
        range: BytesRange,
    ) -> KeyStoreResult<Box<dyn EntryIterator + Send + 'static>> {
        check_failure(&self.fail_range)?;
        self.inner.range_iter(range).await
    }

    async fn watch(&self, range: BytesRange, from_revision: u64) -> KeyStoreResult<WatchStream> {
        check_failure(&self.fail_watch)?;
        self.inner.watch(range, from_revision).await
    }
}

#[async_trait]
impl KeyStore for FailingKeyStore {
    async fn txn(&self, compares: Vec<Compare>, ops: Vec<TxnOp>) -> KeyStoreResult<u64> {
        check_failure(&self.fail_txn)?;
        self.inner.txn(compares, ops).await
    }
}
