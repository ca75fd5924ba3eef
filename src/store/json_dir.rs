// src/store/json_dir.rs
//! One pretty-printed JSON file per document under a directory.
//! Writes go to `<id>.json.tmp` and are renamed into place.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use super::{merge_documents, validate_id, Document, DocumentStore, StoreError, WriteOp};

pub const DEFAULT_MAX_BATCH: usize = 500;

pub struct JsonDirStore {
    dir: PathBuf,
    max_batch: usize,
}

impl JsonDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_batch: DEFAULT_MAX_BATCH,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        validate_id(id)?;
        Ok(self.dir.join(format!("{id}.json")))
    }

    async fn read(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let path = self.path_for(id)?;
        match fs::read_to_string(&path).await {
            Ok(s) => serde_json::from_str(&s)
                .map(Some)
                .map_err(|source| StoreError::Corrupt {
                    id: id.to_string(),
                    source,
                }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, id: &str, doc: &Document) -> Result<(), StoreError> {
        let path = self.path_for(id)?;
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(doc)?;
        fs::write(&tmp, body).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn resolve_write(&self, w: &WriteOp) -> Result<Document, StoreError> {
        if !w.merge {
            return Ok(w.doc.clone());
        }
        match self.read(&w.id).await? {
            Some(mut existing) => {
                merge_documents(&mut existing, w.doc.clone());
                Ok(existing)
            }
            None => Ok(w.doc.clone()),
        }
    }
}

#[async_trait]
impl DocumentStore for JsonDirStore {
    async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        Ok(fs::try_exists(self.path_for(id)?).await?)
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        self.read(id).await
    }

    async fn set(&self, id: &str, doc: Document, merge: bool) -> Result<(), StoreError> {
        let w = WriteOp {
            id: id.to_string(),
            doc,
            merge,
        };
        let doc = self.resolve_write(&w).await?;
        self.write(id, &doc).await
    }

    /// Resolves every document before touching disk, so a bad id or unreadable merge
    /// base fails the batch without partial writes. The renames themselves are not
    /// transactional.
    async fn batch_commit(&self, writes: Vec<WriteOp>) -> Result<(), StoreError> {
        if writes.len() > self.max_batch {
            return Err(StoreError::BatchTooLarge {
                size: writes.len(),
                max: self.max_batch,
            });
        }
        let mut resolved = Vec::with_capacity(writes.len());
        for w in &writes {
            resolved.push((w.id.as_str(), self.resolve_write(w).await?));
        }
        for (id, doc) in &resolved {
            self.write(id, doc).await?;
        }
        Ok(())
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch
    }

    async fn ping(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).await.map_err(|e| {
            StoreError::Unavailable(format!("{}: {e}", self.dir.display()))
        })?;
        let meta = fs::metadata(&self.dir)
            .await
            .map_err(|e| StoreError::Unavailable(format!("{}: {e}", self.dir.display())))?;
        if meta.is_dir() {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!(
                "{} is not a directory",
                self.dir.display()
            )))
        }
    }

    async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut out = Vec::new();
        let mut rd = match fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = rd.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = name.strip_suffix(".json") {
                if validate_id(id).is_ok() {
                    out.push(id.to_string());
                }
            }
        }
        out.sort();
        Ok(out)
    }
}
