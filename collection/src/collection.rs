//! The [`Collection`] handle and its configuration.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use common::{BytesRange, KeyStore, KeyStoreRead};

use crate::batch::WriteBatch;
use crate::error::{Error, Result};
use crate::index::Index;
use crate::keys;
use crate::reader::{CollectionRead, CollectionReader};
use crate::record::Record;
use crate::stream::{ChangeStream, IndexStream, RecordStream};

/// A predicate applied to candidate record keys on top of the structural
/// rules, rejecting shapes the schema reserves for other key classes.
pub type KeyValidator = Arc<dyn Fn(&str) -> std::result::Result<(), String> + Send + Sync>;

/// Configuration for a [`Collection`].
pub struct CollectionSpec<R> {
    /// Handle to the underlying store, shared across collections.
    pub keystore: Arc<dyn KeyStore>,
    /// Absolute path prefix owning the collection's key space.
    pub prefix: String,
    /// Secondary indexes maintained alongside primary writes.
    pub indexes: Vec<Index<R>>,
    /// Optional domain rules for record keys.
    pub key_validator: Option<KeyValidator>,
}

/// Read-side state shared between [`Collection`] and
/// [`CollectionReader`](crate::CollectionReader).
pub(crate) struct Core<R> {
    read: Arc<dyn KeyStoreRead>,
    prefix: String,
    indexes: Vec<Index<R>>,
    key_validator: Option<KeyValidator>,
}

impl<R: Record> Core<R> {
    pub(crate) fn new(
        read: Arc<dyn KeyStoreRead>,
        prefix: String,
        indexes: Vec<Index<R>>,
        key_validator: Option<KeyValidator>,
    ) -> Self {
        Self {
            read,
            prefix: prefix.trim_end_matches('/').to_string(),
            indexes,
            key_validator,
        }
    }

    pub(crate) fn prefix(&self) -> &str {
        &self.prefix
    }

    pub(crate) fn indexes(&self) -> &[Index<R>] {
        &self.indexes
    }

    /// Checks structural key rules, then the collection's validator.
    pub(crate) fn validate_key(&self, key: &str) -> Result<()> {
        keys::validate_record_key(key)?;
        if let Some(validator) = &self.key_validator {
            validator(key).map_err(Error::InvalidKey)?;
        }
        Ok(())
    }

    fn scan_prefix(&self, sub: &str) -> String {
        if sub.is_empty() {
            format!("{}/", self.prefix)
        } else {
            format!("{}/{}", self.prefix, sub)
        }
    }

    #[tracing::instrument(level = "trace", skip_all)]
    pub(crate) async fn get(&self, key: &str) -> Result<R> {
        keys::validate_record_key(key)?;
        let primary = keys::primary_key(&self.prefix, key);
        match self.read.get(primary).await? {
            Some(entry) => Ok(R::decode(&entry.value)?),
            None => Err(Error::NotFound(key.to_string())),
        }
    }

    #[tracing::instrument(level = "trace", skip_all)]
    pub(crate) async fn list(&self, sub: &str) -> Result<RecordStream<R>> {
        let range = BytesRange::prefix(Bytes::from(self.scan_prefix(sub)));
        let iter = self.read.range_iter(range).await?;
        Ok(RecordStream::new(iter, format!("{}/", self.prefix)))
    }

    #[tracing::instrument(level = "trace", skip_all)]
    pub(crate) async fn get_by_index(&self, name: &str, value: &str) -> Result<IndexStream<R>> {
        let index = self
            .indexes
            .iter()
            .find(|index| index.name() == name)
            .ok_or_else(|| Error::IndexNotFound(name.to_string()))?;
        let scan = keys::index_scan_prefix(&self.prefix, index.name(), value);
        let iter = self
            .read
            .range_iter(BytesRange::prefix(Bytes::from(scan.clone())))
            .await?;
        Ok(IndexStream::new(
            iter,
            self.read.clone(),
            format!("{}/", self.prefix),
            scan,
        ))
    }

    #[tracing::instrument(level = "trace", skip_all)]
    pub(crate) async fn watch(&self, sub: &str) -> Result<ChangeStream<R>> {
        let range = BytesRange::prefix(Bytes::from(self.scan_prefix(sub)));
        let stream = self.read.watch(range, 0).await?;
        Ok(ChangeStream::new(stream, format!("{}/", self.prefix)))
    }
}

/// A typed, indexed, prefix-scoped view over the key-value store.
///
/// A `Collection` is immutable configuration bound to a long-lived store
/// handle: construction performs no I/O, clones are cheap, and a collection
/// is safe to share across tasks without synchronization. All keys it writes
/// lie strictly under its prefix.
///
/// Reads go directly through the collection; writes go through a
/// [`WriteBatch`] so that primary records, their index entries, and writes
/// to other collections commit atomically.
pub struct Collection<R: Record> {
    core: Arc<Core<R>>,
    keystore: Arc<dyn KeyStore>,
}

impl<R: Record> Clone for Collection<R> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            keystore: self.keystore.clone(),
        }
    }
}

impl<R: Record> Collection<R> {
    /// Creates a collection from its configuration. Pure configuration, no
    /// I/O.
    pub fn new(spec: CollectionSpec<R>) -> Self {
        let CollectionSpec {
            keystore,
            prefix,
            indexes,
            key_validator,
        } = spec;
        let read: Arc<dyn KeyStoreRead> = keystore.clone();
        Self {
            core: Arc::new(Core::new(read, prefix, indexes, key_validator)),
            keystore,
        }
    }

    /// The collection's absolute path prefix.
    pub fn prefix(&self) -> &str {
        self.core.prefix()
    }

    /// Opens a new [`WriteBatch`] against the collection's store handle.
    ///
    /// Other collections bound to the same handle may join the batch.
    pub fn batch(&self) -> WriteBatch {
        WriteBatch::new(self.keystore.clone())
    }

    /// Creates a read-only view sharing this collection's configuration.
    pub fn reader(&self) -> CollectionReader<R> {
        CollectionReader::from_core(self.core.clone())
    }

    pub(crate) fn keystore(&self) -> &Arc<dyn KeyStore> {
        &self.keystore
    }

    pub(crate) fn core(&self) -> &Core<R> {
        &self.core
    }
}

#[async_trait]
impl<R: Record> CollectionRead<R> for Collection<R> {
    async fn get(&self, key: &str) -> Result<R> {
        self.core.get(key).await
    }

    async fn list(&self) -> Result<RecordStream<R>> {
        self.core.list("").await
    }

    async fn list_prefix(&self, prefix: &str) -> Result<RecordStream<R>> {
        self.core.list(prefix).await
    }

    async fn get_by_index(&self, index: &str, value: &str) -> Result<IndexStream<R>> {
        self.core.get_by_index(index, value).await
    }

    async fn watch(&self) -> Result<ChangeStream<R>> {
        self.core.watch("").await
    }

    async fn watch_prefix(&self, prefix: &str) -> Result<ChangeStream<R>> {
        self.core.watch(prefix).await
    }
}
