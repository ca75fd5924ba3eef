// src/store/mod.rs
//! Document store abstraction plus the event record model and the batching writer.

pub mod json_dir;
pub mod memory;
pub mod record;
pub mod writer;

use async_trait::async_trait;
use serde_json::Value;

pub use json_dir::JsonDirStore;
pub use memory::MemoryStore;
pub use record::{event_id, slugify, EventRecord, RecordDraft, Revision};
pub use writer::{Resolution, StoredDoc, StoreWriter, WriteOutcome, WriteStats};

pub type Document = Value;

/// One queued write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOp {
    pub id: String,
    pub doc: Document,
    /// Merge top-level fields into an existing document instead of replacing it.
    pub merge: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store call timed out after {0} ms")]
    Timeout(u64),
    #[error("invalid document id {0:?}")]
    InvalidId(String),
    #[error("batch of {size} exceeds store maximum {max}")]
    BatchTooLarge { size: usize, max: usize },
    #[error("commit failed: {0}")]
    CommitFailed(String),
    #[error("corrupt document {id}: {source}")]
    Corrupt {
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Infrastructure-level failure: the run cannot continue against this store.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn exists(&self, id: &str) -> Result<bool, StoreError>;
    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError>;
    async fn set(&self, id: &str, doc: Document, merge: bool) -> Result<(), StoreError>;
    /// Apply all writes or none.
    async fn batch_commit(&self, writes: Vec<WriteOp>) -> Result<(), StoreError>;
    fn max_batch_size(&self) -> usize;
    /// Cheap reachability probe.
    async fn ping(&self) -> Result<(), StoreError>;
    /// All document ids, sorted.
    async fn list_ids(&self) -> Result<Vec<String>, StoreError>;
}

/// Field marking an alias document: `{"alias_of": "<record id>"}`. Member titles of an
/// event get one of these under their own id so a later run led by any member finds the
/// record.
pub const ALIAS_FIELD: &str = "alias_of";

pub fn alias_document(target: &str) -> Document {
    serde_json::json!({ ALIAS_FIELD: target })
}

/// Target id when `doc` is an alias document.
pub fn alias_target(doc: &Document) -> Option<&str> {
    doc.get(ALIAS_FIELD).and_then(Value::as_str)
}

/// Shallow merge: top-level keys of `patch` overwrite those of `base`. Non-object
/// operands make `patch` replace `base` wholesale.
pub fn merge_documents(base: &mut Document, patch: Document) {
    match (base.as_object_mut(), patch) {
        (Some(b), Value::Object(p)) => {
            for (k, v) in p {
                b.insert(k, v);
            }
        }
        (_, p) => *base = p,
    }
}

/// Ids become file names and map keys; keep them to the slug alphabet.
pub(crate) fn validate_id(id: &str) -> Result<(), StoreError> {
    let ok = !id.is_empty()
        && id.len() <= 200
        && id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_overwrites_top_level_only() {
        let mut base = json!({"a": 1, "b": {"x": 1}});
        merge_documents(&mut base, json!({"b": {"y": 2}, "c": 3}));
        assert_eq!(base, json!({"a": 1, "b": {"y": 2}, "c": 3}));
    }

    #[test]
    fn alias_documents_name_their_target() {
        let doc = alias_document("quake-hits-coast-2024-05-01");
        assert_eq!(alias_target(&doc), Some("quake-hits-coast-2024-05-01"));
        assert_eq!(alias_target(&json!({"id": "x", "title": "t"})), None);
    }

    #[test]
    fn ids_are_restricted() {
        assert!(validate_id("moon-landing-1969-07-20").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("../etc/passwd").is_err());
        assert!(validate_id("a/b").is_err());
    }
}
