//! Record types stored by the file-system metadata collections.

use bytes::{Bytes, BytesMut};
use collection::Record;
use common::serde::{
    decode_bool, decode_optional_u64, decode_optional_utf8, decode_u64, decode_utf8,
    decode_utf8_array, encode_bool, encode_optional_u64, encode_optional_utf8, encode_u64,
    encode_utf8, encode_utf8_array,
};
use common::EncodingError;

/// Metadata of a repository.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RepoInfo {
    pub name: String,
    /// Creation time as milliseconds since the Unix epoch.
    pub created_ms: u64,
    pub size_bytes: u64,
    pub description: String,
    /// Names of the repos this repo was derived from. Indexed.
    pub provenance: Vec<String>,
}

impl Record for RepoInfo {
    fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        encode_utf8(&self.name, &mut buf);
        encode_u64(self.created_ms, &mut buf);
        encode_u64(self.size_bytes, &mut buf);
        encode_utf8(&self.description, &mut buf);
        encode_utf8_array(&self.provenance, &mut buf);
        buf.freeze()
    }

    fn decode(mut buf: &[u8]) -> Result<Self, EncodingError> {
        let buf = &mut buf;
        Ok(Self {
            name: decode_utf8(buf)?,
            created_ms: decode_u64(buf)?,
            size_bytes: decode_u64(buf)?,
            description: decode_utf8(buf)?,
            provenance: decode_utf8_array(buf)?,
        })
    }
}

/// How many branches and commits still reference a repo.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RepoRefCount(pub u64);

impl Record for RepoRefCount {
    fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        encode_u64(self.0, &mut buf);
        buf.freeze()
    }

    fn decode(mut buf: &[u8]) -> Result<Self, EncodingError> {
        decode_u64(&mut buf).map(RepoRefCount)
    }
}

/// One object written by a put-file call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PutFileRecord {
    pub size_bytes: u64,
    /// Content address of the written object.
    pub object_hash: String,
    /// Set when the write replaces a specific existing block.
    pub overwrite_index: Option<u64>,
}

impl PutFileRecord {
    fn encode_into(&self, buf: &mut BytesMut) {
        encode_u64(self.size_bytes, buf);
        encode_utf8(&self.object_hash, buf);
        encode_optional_u64(self.overwrite_index, buf);
    }

    fn decode_from(buf: &mut &[u8]) -> Result<Self, EncodingError> {
        Ok(Self {
            size_bytes: decode_u64(buf)?,
            object_hash: decode_utf8(buf)?,
            overwrite_index: decode_optional_u64(buf)?,
        })
    }
}

/// The pending writes to one path inside an open commit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PutFileRecords {
    /// Whether the file was written in split mode.
    pub split: bool,
    /// Marks the path as deleted.
    pub tombstone: bool,
    pub records: Vec<PutFileRecord>,
}

impl Record for PutFileRecords {
    fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        encode_bool(self.split, &mut buf);
        encode_bool(self.tombstone, &mut buf);
        common::serde::encode_array_count(self.records.len(), &mut buf);
        for record in &self.records {
            record.encode_into(&mut buf);
        }
        buf.freeze()
    }

    fn decode(mut buf: &[u8]) -> Result<Self, EncodingError> {
        let buf = &mut buf;
        let split = decode_bool(buf)?;
        let tombstone = decode_bool(buf)?;
        let count = common::serde::decode_array_count(buf)?;
        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            records.push(PutFileRecord::decode_from(buf)?);
        }
        Ok(Self {
            split,
            tombstone,
            records,
        })
    }
}

/// Metadata of a commit within one repo.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitInfo {
    pub id: String,
    pub parent_id: Option<String>,
    pub started_ms: u64,
    pub finished_ms: u64,
    pub size_bytes: u64,
    /// Keys of the commits this commit was derived from. Indexed.
    pub provenance: Vec<String>,
    /// Content address of the finished commit's file tree, absent while the
    /// commit is open.
    pub tree_hash: Option<String>,
}

impl Record for CommitInfo {
    fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        encode_utf8(&self.id, &mut buf);
        encode_optional_utf8(self.parent_id.as_deref(), &mut buf);
        encode_u64(self.started_ms, &mut buf);
        encode_u64(self.finished_ms, &mut buf);
        encode_u64(self.size_bytes, &mut buf);
        encode_utf8_array(&self.provenance, &mut buf);
        encode_optional_utf8(self.tree_hash.as_deref(), &mut buf);
        buf.freeze()
    }

    fn decode(mut buf: &[u8]) -> Result<Self, EncodingError> {
        let buf = &mut buf;
        Ok(Self {
            id: decode_utf8(buf)?,
            parent_id: decode_optional_utf8(buf)?,
            started_ms: decode_u64(buf)?,
            finished_ms: decode_u64(buf)?,
            size_bytes: decode_u64(buf)?,
            provenance: decode_utf8_array(buf)?,
            tree_hash: decode_optional_utf8(buf)?,
        })
    }
}

/// A branch: a mutable name for a head commit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BranchInfo {
    pub name: String,
    pub head: String,
}

impl Record for BranchInfo {
    fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        encode_utf8(&self.name, &mut buf);
        encode_utf8(&self.head, &mut buf);
        buf.freeze()
    }

    fn decode(mut buf: &[u8]) -> Result<Self, EncodingError> {
        let buf = &mut buf;
        Ok(Self {
            name: decode_utf8(buf)?,
            head: decode_utf8(buf)?,
        })
    }
}

/// A reference to a commit in a repo, stored for commits that are still
/// open.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Commit {
    pub repo: String,
    pub id: String,
}

impl Record for Commit {
    fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        encode_utf8(&self.repo, &mut buf);
        encode_utf8(&self.id, &mut buf);
        buf.freeze()
    }

    fn decode(mut buf: &[u8]) -> Result<Self, EncodingError> {
        let buf = &mut buf;
        Ok(Self {
            repo: decode_utf8(buf)?,
            id: decode_utf8(buf)?,
        })
    }
}
