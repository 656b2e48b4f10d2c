//! Integration tests for the collection layer against the in-memory store.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use collection::{Collection, CollectionRead, CollectionSpec, Error, Index, Record};
use common::keystore::failing::FailingKeyStore;
use common::keystore::in_memory::InMemoryKeyStore;
use common::serde::{decode_u64, decode_utf8, decode_utf8_array, encode_u64, encode_utf8, encode_utf8_array};
use common::{EncodingError, EventKind, KeyStore, KeyStoreError};

#[derive(Clone, Debug, PartialEq, Eq)]
struct Doc {
    title: String,
    tags: Vec<String>,
}

impl Record for Doc {
    fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        encode_utf8(&self.title, &mut buf);
        encode_utf8_array(&self.tags, &mut buf);
        buf.freeze()
    }

    fn decode(mut buf: &[u8]) -> Result<Self, EncodingError> {
        let buf = &mut buf;
        Ok(Self {
            title: decode_utf8(buf)?,
            tags: decode_utf8_array(buf)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Counter(u64);

impl Record for Counter {
    fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        encode_u64(self.0, &mut buf);
        buf.freeze()
    }

    fn decode(mut buf: &[u8]) -> Result<Self, EncodingError> {
        decode_u64(&mut buf).map(Counter)
    }
}

fn doc(title: &str, tags: &[&str]) -> Doc {
    Doc {
        title: title.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
    }
}

fn docs_collection(keystore: Arc<dyn KeyStore>) -> Collection<Doc> {
    Collection::new(CollectionSpec {
        keystore,
        prefix: "/test/docs".to_string(),
        indexes: vec![Index::multi_valued("tags", |d: &Doc| d.tags.clone())],
        key_validator: None,
    })
}

fn counters_collection(keystore: Arc<dyn KeyStore>) -> Collection<Counter> {
    Collection::new(CollectionSpec {
        keystore,
        prefix: "/test/counters".to_string(),
        indexes: vec![],
        key_validator: None,
    })
}

async fn put_one(collection: &Collection<Doc>, key: &str, record: &Doc) {
    let mut batch = collection.batch();
    batch.put(collection, key, record).await.unwrap();
    batch.commit().await.unwrap();
}

async fn collect_index(collection: &Collection<Doc>, index: &str, value: &str) -> Vec<String> {
    let mut stream = collection.get_by_index(index, value).await.unwrap();
    let mut keys = vec![];
    while let Some((key, _)) = stream.next().await.unwrap() {
        keys.push(key);
    }
    keys
}

#[tokio::test]
async fn test_put_then_get_roundtrip() {
    let store = Arc::new(InMemoryKeyStore::new());
    let docs = docs_collection(store);

    let record = doc("hello", &["greeting"]);
    put_one(&docs, "d1", &record).await;

    assert_eq!(docs.get("d1").await.unwrap(), record);
}

#[tokio::test]
async fn test_get_missing_key_is_not_found() {
    let store = Arc::new(InMemoryKeyStore::new());
    let docs = docs_collection(store);

    let result = docs.get("missing").await;

    assert_eq!(result, Err(Error::NotFound("missing".to_string())));
}

#[tokio::test]
async fn test_put_on_existing_key_is_upsert() {
    let store = Arc::new(InMemoryKeyStore::new());
    let docs = docs_collection(store);

    put_one(&docs, "d1", &doc("first", &[])).await;
    put_one(&docs, "d1", &doc("second", &[])).await;

    assert_eq!(docs.get("d1").await.unwrap().title, "second");
}

#[tokio::test]
async fn test_list_returns_records_in_key_order_without_index_entries() {
    let store = Arc::new(InMemoryKeyStore::new());
    let docs = docs_collection(store);

    // Indexed records create index entries under the same prefix; a list
    // scan must only surface the primary records.
    put_one(&docs, "b", &doc("second", &["x"])).await;
    put_one(&docs, "a", &doc("first", &["x", "y"])).await;

    let mut stream = docs.list().await.unwrap();
    let mut keys = vec![];
    while let Some((key, _)) = stream.next().await.unwrap() {
        keys.push(key);
    }

    assert_eq!(keys, vec!["a", "b"]);
}

#[tokio::test]
async fn test_list_prefix_scopes_the_scan() {
    let store = Arc::new(InMemoryKeyStore::new());
    let docs = docs_collection(store);

    put_one(&docs, "user-1", &doc("u1", &[])).await;
    put_one(&docs, "user-2", &doc("u2", &[])).await;
    put_one(&docs, "admin-1", &doc("a1", &[])).await;

    let mut stream = docs.list_prefix("user-").await.unwrap();
    let mut keys = vec![];
    while let Some((key, _)) = stream.next().await.unwrap() {
        keys.push(key);
    }

    assert_eq!(keys, vec!["user-1", "user-2"]);
}

#[tokio::test]
async fn test_get_by_index_returns_record_in_its_value_bucket_only() {
    let store = Arc::new(InMemoryKeyStore::new());
    let docs = docs_collection(store);

    put_one(&docs, "d1", &doc("tagged", &["red"])).await;
    put_one(&docs, "d2", &doc("other", &["blue"])).await;

    assert_eq!(collect_index(&docs, "tags", "red").await, vec!["d1"]);
    assert_eq!(collect_index(&docs, "tags", "blue").await, vec!["d2"]);
    assert!(collect_index(&docs, "tags", "green").await.is_empty());
}

#[tokio::test]
async fn test_undeclared_index_name_fails() {
    let store = Arc::new(InMemoryKeyStore::new());
    let docs = docs_collection(store);

    let result = docs.get_by_index("authors", "alice").await;

    assert!(matches!(result, Err(Error::IndexNotFound(name)) if name == "authors"));
}

#[tokio::test]
async fn test_index_value_match_is_exact() {
    let store = Arc::new(InMemoryKeyStore::new());
    let docs = docs_collection(store);

    // "redwood" shares "red" as a string prefix but is a different value.
    put_one(&docs, "d1", &doc("short", &["red"])).await;
    put_one(&docs, "d2", &doc("long", &["redwood"])).await;

    assert_eq!(collect_index(&docs, "tags", "red").await, vec!["d1"]);
    assert_eq!(collect_index(&docs, "tags", "redwood").await, vec!["d2"]);
}

#[tokio::test]
async fn test_updating_indexed_field_moves_the_entry() {
    let store = Arc::new(InMemoryKeyStore::new());
    let docs = docs_collection(store);

    put_one(&docs, "d1", &doc("v1", &["red"])).await;
    put_one(&docs, "d1", &doc("v2", &["blue"])).await;

    // The entry moved: exactly one bucket contains the record.
    assert!(collect_index(&docs, "tags", "red").await.is_empty());
    assert_eq!(collect_index(&docs, "tags", "blue").await, vec!["d1"]);
}

#[tokio::test]
async fn test_delete_removes_record_and_all_index_entries() {
    let store = Arc::new(InMemoryKeyStore::new());
    let docs = docs_collection(store);

    put_one(&docs, "d1", &doc("tagged", &["red", "blue"])).await;

    let mut batch = docs.batch();
    batch.delete(&docs, "d1").await.unwrap();
    batch.commit().await.unwrap();

    assert_eq!(docs.get("d1").await, Err(Error::NotFound("d1".to_string())));
    assert!(collect_index(&docs, "tags", "red").await.is_empty());
    assert!(collect_index(&docs, "tags", "blue").await.is_empty());
}

#[tokio::test]
async fn test_delete_of_absent_key_commits_cleanly() {
    let store = Arc::new(InMemoryKeyStore::new());
    let docs = docs_collection(store);

    let mut batch = docs.batch();
    batch.delete(&docs, "never-existed").await.unwrap();

    assert!(batch.commit().await.is_ok());
}

#[tokio::test]
async fn test_multi_valued_index_entries_cover_every_value() {
    let store = Arc::new(InMemoryKeyStore::new());
    let docs = docs_collection(store);

    put_one(&docs, "c1", &doc("provenance", &["a", "b"])).await;

    assert_eq!(collect_index(&docs, "tags", "a").await, vec!["c1"]);
    assert_eq!(collect_index(&docs, "tags", "b").await, vec!["c1"]);

    let mut batch = docs.batch();
    batch.delete(&docs, "c1").await.unwrap();
    batch.commit().await.unwrap();

    assert!(collect_index(&docs, "tags", "a").await.is_empty());
    assert!(collect_index(&docs, "tags", "b").await.is_empty());
}

#[tokio::test]
async fn test_key_validator_rejects_reserved_shapes() {
    let store = Arc::new(InMemoryKeyStore::new());
    let docs: Collection<Doc> = Collection::new(CollectionSpec {
        keystore: store,
        prefix: "/test/docs".to_string(),
        indexes: vec![],
        key_validator: Some(Arc::new(|key: &str| {
            if key.len() == 32 && key.chars().all(|c| c.is_ascii_hexdigit()) {
                Err("key cannot be a UUID without dashes".to_string())
            } else {
                Ok(())
            }
        })),
    });

    let mut batch = docs.batch();
    let rejected = batch
        .put(&docs, "3fa85f6457174562b3fc2c963f66afa6", &doc("bad", &[]))
        .await;
    assert!(matches!(rejected, Err(Error::InvalidKey(_))));

    batch.put(&docs, "main", &doc("good", &[])).await.unwrap();
    batch.commit().await.unwrap();
}

#[tokio::test]
async fn test_structural_key_rules_always_apply() {
    let store = Arc::new(InMemoryKeyStore::new());
    let docs = docs_collection(store);
    let mut batch = docs.batch();

    assert!(matches!(
        batch.put(&docs, "", &doc("d", &[])).await,
        Err(Error::InvalidKey(_))
    ));
    assert!(matches!(
        batch.put(&docs, "a/b", &doc("d", &[])).await,
        Err(Error::InvalidKey(_))
    ));
}

#[tokio::test]
async fn test_concurrent_batches_on_same_key_exactly_one_commits() {
    let store = Arc::new(InMemoryKeyStore::new());
    let docs = docs_collection(store.clone());
    put_one(&docs, "d1", &doc("base", &["red"])).await;

    // Both batches read the current record (tracking its revision) and
    // stage an update.
    let mut first = docs.batch();
    first.get(&docs, "d1").await.unwrap();
    first.put(&docs, "d1", &doc("from-first", &["red"])).await.unwrap();

    let mut second = docs.batch();
    second.get(&docs, "d1").await.unwrap();
    second
        .put(&docs, "d1", &doc("from-second", &["red"]))
        .await
        .unwrap();

    assert!(first.commit().await.is_ok());
    assert_eq!(second.commit().await, Err(Error::Conflict));

    assert_eq!(docs.get("d1").await.unwrap().title, "from-first");
}

#[tokio::test]
async fn test_expect_absent_gives_create_only_semantics() {
    let store = Arc::new(InMemoryKeyStore::new());
    let docs = docs_collection(store);
    put_one(&docs, "d1", &doc("existing", &[])).await;

    let mut batch = docs.batch();
    batch.expect_absent(&docs, "d1").unwrap();
    batch.put(&docs, "d1", &doc("create-only", &[])).await.unwrap();

    assert_eq!(batch.commit().await, Err(Error::Conflict));
    assert_eq!(docs.get("d1").await.unwrap().title, "existing");
}

#[tokio::test]
async fn test_batch_spanning_two_collections_is_atomic() {
    let inner = Arc::new(InMemoryKeyStore::new());
    let store = FailingKeyStore::wrap(inner);
    let docs = docs_collection(store.clone());
    let counters = counters_collection(store.clone());

    let mut batch = docs.batch();
    batch.put(&docs, "d1", &doc("repo", &[])).await.unwrap();
    batch.put(&counters, "d1", &Counter(1)).await.unwrap();

    // Simulated store failure mid-commit: nothing may be applied.
    store.fail_txn_once(KeyStoreError::Unavailable("lost quorum".into()));
    assert_eq!(
        batch.commit().await,
        Err(Error::Unavailable("lost quorum".into()))
    );
    assert!(docs.get("d1").await.is_err());
    assert!(counters.get("d1").await.is_err());

    // A fresh attempt applies both.
    let mut retry = docs.batch();
    retry.put(&docs, "d1", &doc("repo", &[])).await.unwrap();
    retry.put(&counters, "d1", &Counter(1)).await.unwrap();
    retry.commit().await.unwrap();

    assert_eq!(docs.get("d1").await.unwrap().title, "repo");
    assert_eq!(counters.get("d1").await.unwrap(), Counter(1));
}

#[tokio::test]
async fn test_batch_rejects_collection_on_different_store() {
    let docs = docs_collection(Arc::new(InMemoryKeyStore::new()));
    let other = docs_collection(Arc::new(InMemoryKeyStore::new()));

    let mut batch = docs.batch();
    let result = batch.put(&other, "d1", &doc("d", &[])).await;

    assert!(matches!(result, Err(Error::Internal(_))));
}

#[tokio::test]
async fn test_batch_get_observes_its_own_staged_writes() {
    let store = Arc::new(InMemoryKeyStore::new());
    let counters = counters_collection(store.clone());

    let mut batch = counters.batch();
    batch.put(&counters, "c", &Counter(1)).await.unwrap();
    let staged = batch.get(&counters, "c").await.unwrap();
    assert_eq!(staged, Counter(1));

    batch.delete(&counters, "c").await.unwrap();
    assert!(batch.get(&counters, "c").await.is_err());
}

#[tokio::test]
async fn test_read_modify_write_refcount_flow() {
    let store = Arc::new(InMemoryKeyStore::new());
    let counters = counters_collection(store.clone());

    let mut batch = counters.batch();
    batch.put(&counters, "repo", &Counter(0)).await.unwrap();
    batch.commit().await.unwrap();

    let mut increment = counters.batch();
    let current = increment.get(&counters, "repo").await.unwrap();
    increment
        .put(&counters, "repo", &Counter(current.0 + 1))
        .await
        .unwrap();
    increment.commit().await.unwrap();

    assert_eq!(counters.get("repo").await.unwrap(), Counter(1));
}

#[tokio::test]
async fn test_watch_reports_primary_changes_in_revision_order() {
    let store = Arc::new(InMemoryKeyStore::new());
    let docs = docs_collection(store);

    let mut changes = docs.watch().await.unwrap();

    // Indexed writes also churn index entries under the prefix; only the
    // primary record changes may surface.
    put_one(&docs, "d1", &doc("v1", &["red"])).await;
    put_one(&docs, "d1", &doc("v2", &["blue"])).await;
    let mut batch = docs.batch();
    batch.delete(&docs, "d1").await.unwrap();
    batch.commit().await.unwrap();

    let first = changes.recv().await.unwrap().unwrap();
    assert_eq!(first.kind, EventKind::Put);
    assert_eq!(first.key, "d1");
    assert_eq!(first.record.as_ref().unwrap().title, "v1");

    let second = changes.recv().await.unwrap().unwrap();
    assert_eq!(second.kind, EventKind::Put);
    assert_eq!(second.record.as_ref().unwrap().title, "v2");
    assert!(second.revision > first.revision);

    let third = changes.recv().await.unwrap().unwrap();
    assert_eq!(third.kind, EventKind::Delete);
    assert!(third.record.is_none());
    assert!(third.revision > second.revision);
}

#[tokio::test]
async fn test_watch_prefix_scopes_the_subscription() {
    let store = Arc::new(InMemoryKeyStore::new());
    let docs = docs_collection(store);

    let mut changes = docs.watch_prefix("user-").await.unwrap();

    put_one(&docs, "admin-1", &doc("a", &[])).await;
    put_one(&docs, "user-1", &doc("u", &[])).await;

    let event = changes.recv().await.unwrap().unwrap();
    assert_eq!(event.key, "user-1");
}

#[tokio::test]
async fn test_index_stream_skips_concurrently_deleted_records() {
    let store = Arc::new(InMemoryKeyStore::new());
    let docs = docs_collection(store);

    put_one(&docs, "d1", &doc("stays", &["red"])).await;
    put_one(&docs, "d2", &doc("goes", &["red"])).await;

    // The scan snapshot still holds d2's index entry, but its primary
    // record is deleted before the stream resolves it.
    let mut stream = docs.get_by_index("tags", "red").await.unwrap();
    let mut batch = docs.batch();
    batch.delete(&docs, "d2").await.unwrap();
    batch.commit().await.unwrap();

    let mut keys = vec![];
    while let Some((key, _)) = stream.next().await.unwrap() {
        keys.push(key);
    }
    assert_eq!(keys, vec!["d1"]);
}

#[tokio::test]
async fn test_reader_shares_the_collection_view() {
    let store = Arc::new(InMemoryKeyStore::new());
    let docs = docs_collection(store);
    put_one(&docs, "d1", &doc("shared", &["red"])).await;

    let reader = docs.reader();

    assert_eq!(reader.get("d1").await.unwrap().title, "shared");
    let mut stream = reader.get_by_index("tags", "red").await.unwrap();
    let (key, _) = stream.next().await.unwrap().unwrap();
    assert_eq!(key, "d1");
}
