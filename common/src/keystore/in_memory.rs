//! In-memory KeyStore used by tests and local tooling.

use std::collections::{BTreeMap, VecDeque};
use std::ops::RangeBounds;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::{
    Compare, Entry, EntryIterator, EventKind, KeyStore, KeyStoreError, KeyStoreRead,
    KeyStoreResult, TxnOp, WatchEvent, WatchStream,
};
use crate::BytesRange;

const DEFAULT_HISTORY_LIMIT: usize = 1024;

/// A value together with the revision of the transaction that wrote it.
#[derive(Clone, Debug)]
struct Versioned {
    value: Bytes,
    revision: u64,
}

struct Watcher {
    range: BytesRange,
    tx: mpsc::UnboundedSender<WatchEvent>,
}

struct Inner {
    data: BTreeMap<Bytes, Versioned>,
    revision: u64,
    watchers: Vec<Watcher>,
    history: VecDeque<WatchEvent>,
}

/// In-memory implementation of the [`KeyStore`] trait using a BTreeMap.
///
/// Every committed transaction advances the revision counter by one, and all
/// of its ops share that revision. A bounded history of recent events is
/// retained so that watches can replay from a past revision.
pub struct InMemoryKeyStore {
    inner: RwLock<Inner>,
    history_limit: usize,
}

impl InMemoryKeyStore {
    /// Creates an empty store at revision 0.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                data: BTreeMap::new(),
                revision: 0,
                watchers: Vec::new(),
                history: VecDeque::new(),
            }),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Sets how many past events are retained for watch replay.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Returns the current store revision.
    pub fn revision(&self) -> KeyStoreResult<u64> {
        Ok(self.read_inner()?.revision)
    }

    fn read_inner(&self) -> KeyStoreResult<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|e| KeyStoreError::Internal(format!("Failed to acquire read lock: {}", e)))
    }

    fn write_inner(&self) -> KeyStoreResult<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|e| KeyStoreError::Internal(format!("Failed to acquire write lock: {}", e)))
    }
}

impl Default for InMemoryKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

struct InMemoryIterator {
    entries: Vec<Entry>,
    index: usize,
}

#[async_trait]
impl EntryIterator for InMemoryIterator {
    async fn next(&mut self) -> KeyStoreResult<Option<Entry>> {
        if self.index >= self.entries.len() {
            Ok(None)
        } else {
            let entry = self.entries[self.index].clone();
            self.index += 1;
            Ok(Some(entry))
        }
    }
}

#[async_trait]
impl KeyStoreRead for InMemoryKeyStore {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn get(&self, key: Bytes) -> KeyStoreResult<Option<Entry>> {
        let inner = self.read_inner()?;
        Ok(inner
            .data
            .get(&key)
            .map(|v| Entry::new(key, v.value.clone(), v.revision)))
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn range_iter(
        &self,
        range: BytesRange,
    ) -> KeyStoreResult<Box<dyn EntryIterator + Send + 'static>> {
        let inner = self.read_inner()?;
        let entries: Vec<Entry> = inner
            .data
            .range((range.start_bound().cloned(), range.end_bound().cloned()))
            .map(|(k, v)| Entry::new(k.clone(), v.value.clone(), v.revision))
            .collect();

        Ok(Box::new(InMemoryIterator { entries, index: 0 }))
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn watch(&self, range: BytesRange, from_revision: u64) -> KeyStoreResult<WatchStream> {
        let mut inner = self.write_inner()?;
        let (tx, rx) = mpsc::unbounded_channel();

        if from_revision > 0 {
            // Replay retained history before going live. Registration and
            // replay happen under one lock acquisition, so no event can slip
            // between the replayed tail and the live stream.
            for event in &inner.history {
                if event.revision >= from_revision && range.contains(&event.key) {
                    // The receiver is still in scope, so send cannot fail.
                    let _ = tx.send(event.clone());
                }
            }
        }

        inner.watchers.push(Watcher { range, tx });
        Ok(WatchStream::new(rx))
    }
}

#[async_trait]
impl KeyStore for InMemoryKeyStore {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn txn(&self, compares: Vec<Compare>, ops: Vec<TxnOp>) -> KeyStoreResult<u64> {
        let mut inner = self.write_inner()?;

        for compare in &compares {
            let Compare::ModRevision { key, revision } = compare;
            let current = inner.data.get(key).map(|v| v.revision).unwrap_or(0);
            if current != *revision {
                return Err(KeyStoreError::Conflict);
            }
        }

        if ops.is_empty() {
            // A pure precondition check does not consume a revision.
            return Ok(inner.revision);
        }

        inner.revision += 1;
        let revision = inner.revision;

        let mut events = Vec::with_capacity(ops.len());
        for op in ops {
            match op {
                TxnOp::Put { key, value } => {
                    inner.data.insert(
                        key.clone(),
                        Versioned {
                            value: value.clone(),
                            revision,
                        },
                    );
                    events.push(WatchEvent {
                        kind: EventKind::Put,
                        key,
                        value: Some(value),
                        revision,
                    });
                }
                TxnOp::Delete { key } => {
                    // Deleting an absent key is a no-op and emits no event.
                    if inner.data.remove(&key).is_some() {
                        events.push(WatchEvent {
                            kind: EventKind::Delete,
                            key,
                            value: None,
                            revision,
                        });
                    }
                }
            }
        }

        inner.watchers.retain(|watcher| {
            for event in &events {
                if watcher.range.contains(&event.key) && watcher.tx.send(event.clone()).is_err() {
                    // Receiver dropped; the subscription is cancelled.
                    return false;
                }
            }
            true
        });

        inner.history.extend(events);
        while inner.history.len() > self.history_limit {
            inner.history.pop_front();
        }

        Ok(revision)
    }
}
