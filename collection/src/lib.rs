//! Typed, indexed, prefix-scoped collections over a revisioned key-value store.
//!
//! A [`Collection`] turns a flat key-value store into a set of typed record
//! collections with transactionally maintained secondary indexes. Each
//! collection owns a path prefix; primary records live at
//! `<prefix>/<key>` and index entries at
//! `<prefix>/<index>/<value>/<key>`.
//!
//! # Key Concepts
//!
//! - **Collection**: immutable configuration binding a store handle, a path
//!   prefix, a set of [`Index`] declarations, and an optional key validator.
//!   Constructing one performs no I/O, and clones share the same handle.
//! - **WriteBatch**: stages puts and deletes across one or more collections
//!   and commits them as a single compare-and-swap transaction. Index entries
//!   are maintained inside the same commit, so readers never observe a
//!   record whose index entries disagree with its fields.
//! - **CollectionReader**: a read-only view over a read-only store handle,
//!   sharing the [`CollectionRead`] trait with `Collection`.
//!
//! # Example
//!
//! ```ignore
//! use collection::{Collection, CollectionSpec, Index, WriteBatch};
//!
//! let repos: Collection<RepoInfo> = Collection::new(CollectionSpec {
//!     keystore: keystore.clone(),
//!     prefix: "/pfs/repos".to_string(),
//!     indexes: vec![Index::multi_valued("provenance", |r: &RepoInfo| {
//!         r.provenance.clone()
//!     })],
//!     key_validator: None,
//! });
//!
//! let mut batch = repos.batch();
//! batch.put(&repos, "images", &repo_info).await?;
//! batch.commit().await?;
//!
//! let mut derived = repos.get_by_index("provenance", "images").await?;
//! while let Some((key, repo)) = derived.next().await? {
//!     println!("{key}: {repo:?}");
//! }
//! ```
//!
//! # Concurrency
//!
//! The layer holds no locks. Independent callers prepare batches
//! concurrently; only `commit` contends, and a failed precondition surfaces
//! as [`Error::Conflict`] for the caller to retry with fresh reads.

mod batch;
mod collection;
mod error;
mod index;
mod keys;
mod reader;
mod record;
mod stream;

pub use batch::WriteBatch;
pub use collection::{Collection, CollectionSpec, KeyValidator};
pub use error::{Error, Result};
pub use index::{Index, Multiplicity};
pub use keys::join_path;
pub use reader::{CollectionRead, CollectionReader, ReaderSpec};
pub use record::Record;
pub use stream::{ChangeEvent, ChangeStream, IndexStream, RecordStream};
