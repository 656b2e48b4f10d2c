//! Read-only collection access and the [`CollectionRead`] trait.

use std::sync::Arc;

use async_trait::async_trait;
use common::KeyStoreRead;

use crate::collection::Core;
use crate::error::Result;
use crate::index::Index;
use crate::record::Record;
use crate::stream::{ChangeStream, IndexStream, RecordStream};

/// Read operations shared by [`Collection`](crate::Collection) and
/// [`CollectionReader`].
///
/// All reads are snapshot-consistent at the revision they execute against.
#[async_trait]
pub trait CollectionRead<R: Record> {
    /// Reads and decodes the record at `key`.
    async fn get(&self, key: &str) -> Result<R>;

    /// Scans every record in the collection, in key order.
    async fn list(&self) -> Result<RecordStream<R>>;

    /// Scans records whose keys start with `prefix`.
    async fn list_prefix(&self, prefix: &str) -> Result<RecordStream<R>>;

    /// Resolves records through a declared secondary index.
    async fn get_by_index(&self, index: &str, value: &str) -> Result<IndexStream<R>>;

    /// Subscribes to changes on the whole collection, from now.
    async fn watch(&self) -> Result<ChangeStream<R>>;

    /// Subscribes to changes on keys starting with `prefix`.
    async fn watch_prefix(&self, prefix: &str) -> Result<ChangeStream<R>>;
}

/// Configuration for a [`CollectionReader`] built directly on a read-only
/// store handle.
pub struct ReaderSpec<R> {
    pub keystore: Arc<dyn KeyStoreRead>,
    pub prefix: String,
    pub indexes: Vec<Index<R>>,
}

/// A read-only view of a collection.
///
/// Useful for consumers that hold a read-only store handle or that should
/// not have write access. Shares all reads with the full collection via
/// [`CollectionRead`].
pub struct CollectionReader<R: Record> {
    core: Arc<Core<R>>,
}

impl<R: Record> Clone for CollectionReader<R> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<R: Record> CollectionReader<R> {
    /// Creates a reader from its configuration. Pure configuration, no I/O.
    pub fn new(spec: ReaderSpec<R>) -> Self {
        Self {
            core: Arc::new(Core::new(spec.keystore, spec.prefix, spec.indexes, None)),
        }
    }

    pub(crate) fn from_core(core: Arc<Core<R>>) -> Self {
        Self { core }
    }

    /// The collection's absolute path prefix.
    pub fn prefix(&self) -> &str {
        self.core.prefix()
    }
}

#[async_trait]
impl<R: Record> CollectionRead<R> for CollectionReader<R> {
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
