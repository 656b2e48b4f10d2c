//! Collection declarations.

use std::sync::Arc;

use collection::{join_path, Collection, CollectionSpec, Index};
use common::KeyStore;
use uuid::Uuid;

use crate::model::{BranchInfo, Commit, CommitInfo, PutFileRecords, RepoInfo, RepoRefCount};

const REPOS_PREFIX: &str = "repos";
const REPO_REF_COUNTS_PREFIX: &str = "repoRefCounts";
const PUT_FILE_RECORDS_PREFIX: &str = "putFileRecords";
const COMMITS_PREFIX: &str = "commits";
const BRANCHES_PREFIX: &str = "branches";
const OPEN_COMMITS_PREFIX: &str = "openCommits";

/// Name of the provenance index declared on repos and commits.
pub const PROVENANCE_INDEX: &str = "provenance";

/// The collection of repos, indexed by provenance.
pub fn repos(keystore: Arc<dyn KeyStore>, root: &str) -> Collection<RepoInfo> {
    Collection::new(CollectionSpec {
        keystore,
        prefix: join_path(root, REPOS_PREFIX),
        indexes: vec![Index::multi_valued(PROVENANCE_INDEX, |repo: &RepoInfo| {
            repo.provenance.clone()
        })],
        key_validator: None,
    })
}

/// The collection of repo ref counts.
pub fn repo_ref_counts(keystore: Arc<dyn KeyStore>, root: &str) -> Collection<RepoRefCount> {
    Collection::new(CollectionSpec {
        keystore,
        prefix: join_path(root, REPO_REF_COUNTS_PREFIX),
        indexes: vec![],
        key_validator: None,
    })
}

/// The collection of pending put-file records.
pub fn put_file_records(keystore: Arc<dyn KeyStore>, root: &str) -> Collection<PutFileRecords> {
    Collection::new(CollectionSpec {
        keystore,
        prefix: join_path(root, PUT_FILE_RECORDS_PREFIX),
        indexes: vec![],
        key_validator: None,
    })
}

/// The collection of one repo's commits, indexed by provenance.
pub fn commits(keystore: Arc<dyn KeyStore>, root: &str, repo: &str) -> Collection<CommitInfo> {
    Collection::new(CollectionSpec {
        keystore,
        prefix: join_path(&join_path(root, COMMITS_PREFIX), repo),
        indexes: vec![Index::multi_valued(
            PROVENANCE_INDEX,
            |commit: &CommitInfo| commit.provenance.clone(),
        )],
        key_validator: None,
    })
}

/// The collection of one repo's branches.
///
/// Branch names shaped like undashed UUIDs are rejected: commit ids have
/// that shape, and a branch named like one would make `<repo>/<name>`
/// references ambiguous.
pub fn branches(keystore: Arc<dyn KeyStore>, root: &str, repo: &str) -> Collection<BranchInfo> {
    Collection::new(CollectionSpec {
        keystore,
        prefix: join_path(&join_path(root, BRANCHES_PREFIX), repo),
        indexes: vec![],
        key_validator: Some(Arc::new(|key: &str| {
            if is_uuid_without_dashes(key) {
                Err("branch name cannot be a UUID without dashes".to_string())
            } else {
                Ok(())
            }
        })),
    })
}

/// The collection of commits that are open across all repos.
pub fn open_commits(keystore: Arc<dyn KeyStore>, root: &str) -> Collection<Commit> {
    Collection::new(CollectionSpec {
        keystore,
        prefix: join_path(root, OPEN_COMMITS_PREFIX),
        indexes: vec![],
        key_validator: None,
    })
}

fn is_uuid_without_dashes(key: &str) -> bool {
    key.len() == 32 && Uuid::try_parse(key).is_ok()
}
