// src/store/memory.rs
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{merge_documents, validate_id, Document, DocumentStore, StoreError, WriteOp};

pub const DEFAULT_MAX_BATCH: usize = 500;

/// In-process store with fault injection for tests.
pub struct MemoryStore {
    docs: Mutex<BTreeMap<String, Document>>,
    max_batch: usize,
    available: AtomicBool,
    fail_commits: AtomicUsize,
    commits: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            docs: Mutex::new(BTreeMap::new()),
            max_batch: DEFAULT_MAX_BATCH,
            available: AtomicBool::new(true),
            fail_commits: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
        }
    }

    pub fn with_max_batch_size(mut self, n: usize) -> Self {
        self.max_batch = n.max(1);
        self
    }

    /// Toggle reachability; while unavailable every call fails with `Unavailable`.
    pub fn set_available(&self, up: bool) {
        self.available.store(up, Ordering::SeqCst);
    }

    /// Make the next `n` batch commits fail.
    pub fn fail_next_commits(&self, n: usize) {
        self.fail_commits.store(n, Ordering::SeqCst);
    }

    /// Successful batch commits so far.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Document>> {
        self.docs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store marked down".into()))
        }
    }

    fn apply(docs: &mut BTreeMap<String, Document>, id: String, doc: Document, merge: bool) {
        match docs.get_mut(&id) {
            Some(existing) if merge => merge_documents(existing, doc),
            _ => {
                docs.insert(id, doc);
            }
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        self.check()?;
        Ok(self.lock().contains_key(id))
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        self.check()?;
        Ok(self.lock().get(id).cloned())
    }

    async fn set(&self, id: &str, doc: Document, merge: bool) -> Result<(), StoreError> {
        self.check()?;
        validate_id(id)?;
        Self::apply(&mut self.lock(), id.to_string(), doc, merge);
        Ok(())
    }

    async fn batch_commit(&self, writes: Vec<WriteOp>) -> Result<(), StoreError> {
        self.check()?;
        if writes.len() > self.max_batch {
            return Err(StoreError::BatchTooLarge {
                size: writes.len(),
                max: self.max_batch,
            });
        }
        let injected = self
            .fail_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::CommitFailed("injected failure".into()));
        }
        for w in &writes {
            validate_id(&w.id)?;
        }
        let mut docs = self.lock();
        for w in writes {
            Self::apply(&mut docs, w.id, w.doc, w.merge);
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }

    async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        self.check()?;
        Ok(self.lock().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn op(id: &str, v: i32) -> WriteOp {
        WriteOp {
            id: id.into(),
            doc: json!({ "v": v }),
            merge: false,
        }
    }

    #[tokio::test]
    async fn injected_failure_is_all_or_nothing() {
        let s = MemoryStore::new();
        s.fail_next_commits(1);
        assert!(s.batch_commit(vec![op("a", 1), op("b", 2)]).await.is_err());
        assert!(s.is_empty());
        s.batch_commit(vec![op("a", 1)]).await.unwrap();
        assert_eq!(s.len(), 1);
        assert_eq!(s.commit_count(), 1);
    }

    #[tokio::test]
    async fn respects_max_batch() {
        let s = MemoryStore::new().with_max_batch_size(1);
        let err = s.batch_commit(vec![op("a", 1), op("b", 2)]).await.unwrap_err();
        assert!(matches!(err, StoreError::BatchTooLarge { size: 2, max: 1 }));
    }

    #[tokio::test]
    async fn unavailable_store_fails_everything() {
        let s = MemoryStore::new();
        s.set_available(false);
        assert!(s.ping().await.unwrap_err().is_fatal());
        assert!(s.get("a").await.is_err());
    }

    #[tokio::test]
    async fn merge_set() {
        let s = MemoryStore::new();
        s.set("a", json!({"x": 1, "y": 1}), false).await.unwrap();
        s.set("a", json!({"y": 2}), true).await.unwrap();
        assert_eq!(s.get("a").await.unwrap(), Some(json!({"x": 1, "y": 2})));
        assert!(s.exists("a").await.unwrap());
        assert_eq!(s.list_ids().await.unwrap(), vec!["a".to_string()]);
    }
}
