//! The schema surface of the content-addressed file-system metadata store.
//!
//! This crate declares the named collections the file system keeps in the
//! distributed key-value store: repos, repo ref counts, put-file records,
//! commits and branches per repo, and open commits. Each declaration is a
//! constructor returning a configured [`Collection`](collection::Collection)
//! under the store root:
//!
//! ```text
//! <root>/repos/<repo>
//! <root>/repoRefCounts/<repo>
//! <root>/putFileRecords/<path>
//! <root>/commits/<repo>/<commit>
//! <root>/branches/<repo>/<branch>
//! <root>/openCommits/<commit>
//! ```
//!
//! Repos and commits carry a multi-valued `provenance` index so derived
//! data can be found from what it was derived from. Branch names may not
//! look like undashed UUIDs; that shape is reserved for commit ids.
//!
//! The store handle and root prefix are passed explicitly into every
//! constructor; nothing here is process-global.

mod model;
mod schema;

pub use model::{
    BranchInfo, Commit, CommitInfo, PutFileRecord, PutFileRecords, RepoInfo, RepoRefCount,
};
pub use schema::{
    branches, commits, open_commits, put_file_records, repo_ref_counts, repos, PROVENANCE_INDEX,
};
