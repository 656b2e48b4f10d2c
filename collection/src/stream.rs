//! Lazy record, index, and change streams.

use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use common::{EntryIterator, EventKind, KeyStoreRead, WatchStream};

use crate::error::{Error, Result};
use crate::record::Record;

/// A lazy, forward-ordered stream of `(key, record)` pairs from a range
/// scan.
///
/// Bounded by store contents at scan time; restart by issuing a new scan.
pub struct RecordStream<R> {
    iter: Box<dyn EntryIterator + Send>,
    /// The collection prefix including its trailing separator.
    prefix: String,
    _marker: PhantomData<R>,
}

impl<R: Record> RecordStream<R> {
    pub(crate) fn new(iter: Box<dyn EntryIterator + Send>, prefix: String) -> Self {
        Self {
            iter,
            prefix,
            _marker: PhantomData,
        }
    }

    /// Returns the next record, or `None` when the scan is exhausted.
    pub async fn next(&mut self) -> Result<Option<(String, R)>> {
        while let Some(entry) = self.iter.next().await? {
            let relative = crate::keys::relative_key(&self.prefix, &entry.key)?;
            // Index entries live under deeper paths; only primary records
            // have a separator-free relative key.
            if relative.contains('/') {
                continue;
            }
            let record = R::decode(&entry.value)?;
            return Ok(Some((relative.to_string(), record)));
        }
        Ok(None)
    }
}

/// A lazy stream of records resolved through a secondary index scan.
pub struct IndexStream<R> {
    iter: Box<dyn EntryIterator + Send>,
    read: Arc<dyn KeyStoreRead>,
    /// The collection prefix including its trailing separator.
    primary_prefix: String,
    /// The index scan prefix including its trailing separator.
    scan_prefix: String,
    _marker: PhantomData<R>,
}

impl<R: Record> IndexStream<R> {
    pub(crate) fn new(
        iter: Box<dyn EntryIterator + Send>,
        read: Arc<dyn KeyStoreRead>,
        primary_prefix: String,
        scan_prefix: String,
    ) -> Self {
        Self {
            iter,
            read,
            primary_prefix,
            scan_prefix,
            _marker: PhantomData,
        }
    }

    /// Resolves and returns the next indexed record.
    ///
    /// Entries whose primary record vanished between the scan and the
    /// resolution are skipped: index retraction commits atomically with the
    /// primary delete, so such an entry is already gone from current state.
    pub async fn next(&mut self) -> Result<Option<(String, R)>> {
        while let Some(entry) = self.iter.next().await? {
            let tail = crate::keys::relative_key(&self.scan_prefix, &entry.key)?;
            // A longer index value sharing the scanned value as a string
            // prefix leaves a separator in the tail; this scan is not for it.
            if tail.contains('/') {
                continue;
            }
            let primary = Bytes::from(format!("{}{}", self.primary_prefix, tail));
            match self.read.get(primary).await? {
                None => continue,
                Some(primary_entry) => {
                    let record = R::decode(&primary_entry.value)?;
                    return Ok(Some((tail.to_string(), record)));
                }
            }
        }
        Ok(None)
    }
}

/// A change observed on a collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeEvent<R> {
    pub kind: EventKind,
    pub key: String,
    /// The decoded record for puts, `None` for deletes.
    pub record: Option<R>,
    pub revision: u64,
}

/// A live stream of [`ChangeEvent`]s for one collection, in revision order.
///
/// The stream never ends on its own; dropping it cancels the subscription
/// with no store-side effects.
pub struct ChangeStream<R> {
    inner: WatchStream,
    /// The collection prefix including its trailing separator.
    prefix: String,
    _marker: PhantomData<R>,
}

impl<R: Record> ChangeStream<R> {
    pub(crate) fn new(inner: WatchStream, prefix: String) -> Self {
        Self {
            inner,
            prefix,
            _marker: PhantomData,
        }
    }

    /// Receives the next change to a primary record.
    ///
    /// Index-entry churn under the same prefix is filtered out. Returns
    /// `Ok(None)` only if the store itself has shut down.
    pub async fn recv(&mut self) -> Result<Option<ChangeEvent<R>>> {
        while let Some(event) = self.inner.recv().await {
            let relative = crate::keys::relative_key(&self.prefix, &event.key)?;
            if relative.contains('/') {
                continue;
            }
            let record = match event.kind {
                EventKind::Put => {
                    let value = event
                        .value
                        .as_ref()
                        .ok_or_else(|| Error::Internal("Put event without a value".to_string()))?;
                    Some(R::decode(value)?)
                }
                EventKind::Delete => None,
            };
            return Ok(Some(ChangeEvent {
                kind: event.kind,
                key: relative.to_string(),
                record,
                revision: event.revision,
            }));
        }
        Ok(None)
    }
}
