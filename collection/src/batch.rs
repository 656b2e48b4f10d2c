//! Atomic write batches spanning one or more collections.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use common::{Compare, KeyStore, KeyStoreError, TxnOp};

use crate::collection::Collection;
use crate::error::{Error, Result};
use crate::keys;
use crate::record::Record;

#[derive(Clone, Debug)]
enum Staged {
    Put(Bytes),
    Delete,
}

/// A set of staged operations committed as one compare-and-swap transaction.
///
/// A batch is opened against a store handle; any collection bound to the
/// same handle may stage puts and deletes on it. Nothing takes effect until
/// [`commit`](Self::commit), which applies every staged operation
/// atomically or none at all.
///
/// # Read set
///
/// Every store read performed through the batch (explicitly via
/// [`get`](Self::get), or internally for index maintenance) records the
/// key's revision as read. Commit validates the whole read set, so a
/// concurrent writer that touches any key this batch depended on turns the
/// commit into a [`Conflict`](Error::Conflict). Callers retry conflicts
/// with fresh reads; writes that never read commit as blind upserts.
///
/// # Example
///
/// ```ignore
/// let mut batch = repos.batch();
/// let mut count = batch.get(&ref_counts, "images").await?;
/// count.0 += 1;
/// batch.put(&ref_counts, "images", &count).await?;
/// batch.put(&repos, "images", &repo_info).await?;
/// batch.commit().await?;
/// ```
pub struct WriteBatch {
    keystore: Arc<dyn KeyStore>,
    staged: BTreeMap<Bytes, Staged>,
    read_set: BTreeMap<Bytes, u64>,
    preconditions: BTreeMap<Bytes, u64>,
}

impl WriteBatch {
    /// Opens an empty batch against a store handle.
    pub fn new(keystore: Arc<dyn KeyStore>) -> Self {
        Self {
            keystore,
            staged: BTreeMap::new(),
            read_set: BTreeMap::new(),
            preconditions: BTreeMap::new(),
        }
    }

    /// Every collection participating in a batch must be bound to the exact
    /// store handle the batch was opened on; a transaction cannot span
    /// stores.
    fn check_same_store<R: Record>(&self, collection: &Collection<R>) -> Result<()> {
        if Arc::ptr_eq(&self.keystore, collection.keystore()) {
            Ok(())
        } else {
            Err(Error::Internal(format!(
                "Collection {} is bound to a different store handle than this batch",
                collection.prefix()
            )))
        }
    }

    /// Reads through staged state; store reads are tracked in the read set
    /// at the revision first observed.
    async fn read(&mut self, key: &Bytes) -> Result<Option<Bytes>> {
        if let Some(staged) = self.staged.get(key) {
            return Ok(match staged {
                Staged::Put(value) => Some(value.clone()),
                Staged::Delete => None,
            });
        }
        match self.keystore.get(key.clone()).await? {
            Some(entry) => {
                self.read_set.entry(key.clone()).or_insert(entry.revision);
                Ok(Some(entry.value))
            }
            None => {
                self.read_set.entry(key.clone()).or_insert(0);
                Ok(None)
            }
        }
    }

    /// Reads a record within the batch, observing this batch's own staged
    /// writes first.
    ///
    /// The read joins the read set, making it a precondition of the commit.
    /// This is the read half of a read-modify-write flow.
    pub async fn get<R: Record>(&mut self, collection: &Collection<R>, key: &str) -> Result<R> {
        self.check_same_store(collection)?;
        keys::validate_record_key(key)?;
        let primary = keys::primary_key(collection.prefix(), key);
        match self.read(&primary).await? {
            Some(value) => Ok(R::decode(&value)?),
            None => Err(Error::NotFound(key.to_string())),
        }
    }

    /// Stages an upsert of `record` at `key`, along with the index entry
    /// creations and retractions it implies.
    ///
    /// For an indexed collection the current record is read within the batch
    /// to compute stale index values; entries for values no longer extracted
    /// are staged for deletion and entries for new values staged for
    /// creation, all committing atomically with the primary write. Any
    /// failure (key validation, decode of the current record) stages
    /// nothing.
    pub async fn put<R: Record>(
        &mut self,
        collection: &Collection<R>,
        key: &str,
        record: &R,
    ) -> Result<()> {
        self.check_same_store(collection)?;
        collection.core().validate_key(key)?;
        let prefix = collection.prefix().to_string();
        let primary = keys::primary_key(&prefix, key);

        // Compute every sub-operation before staging any of them, so a
        // failure never leaves a partial stage behind.
        let mut ops: Vec<(Bytes, Staged)> = Vec::new();
        if !collection.core().indexes().is_empty() {
            let current = match self.read(&primary).await? {
                Some(value) => Some(R::decode(&value)?),
                None => None,
            };
            for index in collection.core().indexes() {
                let old_values = current
                    .as_ref()
                    .map(|record| index.values(record))
                    .unwrap_or_default();
                let new_values = index.values(record);
                for value in old_values.difference(&new_values) {
                    ops.push((
                        keys::index_entry_key(&prefix, index.name(), value, key),
                        Staged::Delete,
                    ));
                }
                for value in new_values.difference(&old_values) {
                    ops.push((
                        keys::index_entry_key(&prefix, index.name(), value, key),
                        Staged::Put(Bytes::copy_from_slice(key.as_bytes())),
                    ));
                }
            }
        }
        ops.push((primary, Staged::Put(record.encode())));

        self.staged.extend(ops);
        Ok(())
    }

    /// Stages deletion of `key` and every index entry derived from its
    /// current record.
    ///
    /// For an indexed collection the current record is read within the batch
    /// to learn which index values to retract. Deleting an absent key stages
    /// only the primary delete.
    pub async fn delete<R: Record>(&mut self, collection: &Collection<R>, key: &str) -> Result<()> {
        self.check_same_store(collection)?;
        keys::validate_record_key(key)?;
        let prefix = collection.prefix().to_string();
        let primary = keys::primary_key(&prefix, key);

        let mut ops: Vec<(Bytes, Staged)> = Vec::new();
        if !collection.core().indexes().is_empty() {
            if let Some(value) = self.read(&primary).await? {
                let current = R::decode(&value)?;
                for index in collection.core().indexes() {
                    for value in index.values(&current) {
                        ops.push((
                            keys::index_entry_key(&prefix, index.name(), &value, key),
                            Staged::Delete,
                        ));
                    }
                }
            }
        }
        ops.push((primary, Staged::Delete));

        self.staged.extend(ops);
        Ok(())
    }

    /// Adds an explicit precondition: the key's mod revision must equal
    /// `revision` at commit. Overrides any revision tracked by an earlier
    /// read of the same key.
    pub fn expect_revision<R: Record>(
        &mut self,
        collection: &Collection<R>,
        key: &str,
        revision: u64,
    ) -> Result<()> {
        self.check_same_store(collection)?;
        keys::validate_record_key(key)?;
        self.preconditions
            .insert(keys::primary_key(collection.prefix(), key), revision);
        Ok(())
    }

    /// Adds an explicit precondition that the key does not exist at commit.
    /// This is how callers get create-only semantics out of upsert puts.
    pub fn expect_absent<R: Record>(
        &mut self,
        collection: &Collection<R>,
        key: &str,
    ) -> Result<()> {
        self.expect_revision(collection, key, 0)
    }

    /// Commits every staged operation as one transaction.
    ///
    /// Preconditions are the explicit ones plus the accumulated read set.
    /// On success every staged operation is applied under the returned
    /// revision; on [`Conflict`](Error::Conflict) or
    /// [`Unavailable`](Error::Unavailable) none are. The batch never retries
    /// internally.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn commit(self) -> Result<u64> {
        let mut compares = self.read_set;
        // Explicit preconditions override tracked read revisions.
        compares.extend(self.preconditions);
        let compares: Vec<Compare> = compares
            .into_iter()
            .map(|(key, revision)| Compare::ModRevision { key, revision })
            .collect();
        let ops: Vec<TxnOp> = self
            .staged
            .into_iter()
            .map(|(key, staged)| match staged {
                Staged::Put(value) => TxnOp::Put { key, value },
                Staged::Delete => TxnOp::Delete { key },
            })
            .collect();

        match self.keystore.txn(compares, ops).await {
            Ok(revision) => Ok(revision),
            Err(KeyStoreError::Conflict) => {
                tracing::debug!("write batch commit lost a revision race");
                Err(Error::Conflict)
            }
            Err(err) => Err(err.into()),
        }
    }
}
