// src/store/writer.rs
//! Per-run writer: identity resolution, freshness policy and batched commits.
//!
//! Created/updated counts only move after a batch commits. A failed batch adds its
//! record count to `errors` and is not retried. Alias documents ride along in the same
//! batches but are never counted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{alias_document, alias_target, DocumentStore, EventRecord, StoreError, WriteOp};

pub const DEFAULT_BATCH_LIMIT: usize = 400;
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub created: usize,
    pub updated: usize,
    pub errors: usize,
    pub failed_batches: usize,
}

/// What lives under an id.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredDoc {
    Record(EventRecord),
    Alias(String),
}

/// Outcome of [`StoreWriter::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Id the group's record lives (or will live) under.
    pub id: String,
    pub existing: Option<EventRecord>,
    /// Candidate ids with nothing stored under them; they should point at `id`.
    pub unclaimed: Vec<String>,
}

pub struct StoreWriter {
    store: Arc<dyn DocumentStore>,
    batch_limit: usize,
    min_refresh_age: chrono::Duration,
    timeout: Duration,
    /// `None` outcome marks an alias document.
    pending: Vec<(WriteOp, Option<WriteOutcome>)>,
    pending_records: HashMap<String, EventRecord>,
    pending_aliases: HashMap<String, String>,
    stats: WriteStats,
}

impl StoreWriter {
    /// `batch_limit` is clamped to `1..=store.max_batch_size()`.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        batch_limit: usize,
        min_refresh_age: chrono::Duration,
    ) -> Self {
        let batch_limit = batch_limit.clamp(1, store.max_batch_size().max(1));
        Self {
            store,
            batch_limit,
            min_refresh_age,
            timeout: DEFAULT_STORE_TIMEOUT,
            pending: Vec::new(),
            pending_records: HashMap::new(),
            pending_aliases: HashMap::new(),
            stats: WriteStats::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    pub fn stats(&self) -> WriteStats {
        self.stats
    }

    async fn timed<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout.as_millis() as u64))?
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.timed(self.store.ping()).await
    }

    pub async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        self.timed(self.store.list_ids()).await
    }

    /// Whatever is stored under `id`, pending writes first.
    pub async fn fetch(&self, id: &str) -> Result<Option<StoredDoc>, StoreError> {
        if let Some(r) = self.pending_records.get(id) {
            return Ok(Some(StoredDoc::Record(r.clone())));
        }
        if let Some(t) = self.pending_aliases.get(id) {
            return Ok(Some(StoredDoc::Alias(t.clone())));
        }
        let Some(doc) = self.timed(self.store.get(id)).await? else {
            return Ok(None);
        };
        if let Some(t) = alias_target(&doc) {
            return Ok(Some(StoredDoc::Alias(t.to_string())));
        }
        serde_json::from_value(doc)
            .map(|r| Some(StoredDoc::Record(r)))
            .map_err(|source| StoreError::Corrupt {
                id: id.to_string(),
                source,
            })
    }

    /// The record under `id`, following one alias hop.
    pub async fn load(&self, id: &str) -> Result<Option<EventRecord>, StoreError> {
        match self.fetch(id).await? {
            Some(StoredDoc::Record(r)) => Ok(Some(r)),
            Some(StoredDoc::Alias(target)) => match self.fetch(&target).await? {
                Some(StoredDoc::Record(r)) => Ok(Some(r)),
                _ => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// Candidates are probed in order; the first one holding a record, directly or
    /// through an alias, wins. With no hit the first candidate is the new id.
    pub async fn resolve(&self, candidates: &[String]) -> Result<Resolution, StoreError> {
        let mut found: Option<(String, EventRecord)> = None;
        let mut unclaimed = Vec::new();
        for id in candidates {
            match self.fetch(id).await? {
                None => unclaimed.push(id.clone()),
                Some(StoredDoc::Record(r)) => {
                    if found.is_none() {
                        found = Some((id.clone(), r));
                    }
                }
                Some(StoredDoc::Alias(target)) => {
                    if found.is_some() {
                        continue;
                    }
                    match self.fetch(&target).await? {
                        Some(StoredDoc::Record(r)) => found = Some((target, r)),
                        // Dangling alias: free to repoint.
                        _ => unclaimed.push(id.clone()),
                    }
                }
            }
        }

        let (id, existing) = match found {
            Some((id, r)) => (id, Some(r)),
            None => (
                candidates
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "event".to_string()),
                None,
            ),
        };
        unclaimed.retain(|a| *a != id);
        Ok(Resolution {
            id,
            existing,
            unclaimed,
        })
    }

    /// Updated within `min_refresh_age` of `now`. A zero window disables the check.
    pub fn is_fresh(&self, record: &EventRecord, now: DateTime<Utc>) -> bool {
        self.min_refresh_age > chrono::Duration::zero()
            && now - record.updated_at < self.min_refresh_age
    }

    /// Queue a record; commits when the batch is full. A record already pending under
    /// the same id is replaced in place and keeps its original outcome.
    pub async fn stage(&mut self, record: EventRecord, outcome: WriteOutcome) -> Result<(), StoreError> {
        self.stage_with_aliases(record, outcome, &[]).await
    }

    /// Queue a record together with alias documents pointing at it, in one batch.
    pub async fn stage_with_aliases(
        &mut self,
        record: EventRecord,
        outcome: WriteOutcome,
        aliases: &[String],
    ) -> Result<(), StoreError> {
        let mut ops = vec![(
            WriteOp {
                id: record.id.clone(),
                doc: serde_json::to_value(&record)?,
                merge: false,
            },
            Some(outcome),
        )];
        ops.extend(self.alias_ops(&record.id, aliases));
        self.pending_records.insert(record.id.clone(), record);
        self.push(ops).await;
        Ok(())
    }

    /// Queue alias documents only; the record itself is unchanged.
    pub async fn stage_aliases(&mut self, target: &str, aliases: &[String]) {
        let ops = self.alias_ops(target, aliases);
        if !ops.is_empty() {
            self.push(ops).await;
        }
    }

    fn alias_ops(&mut self, target: &str, aliases: &[String]) -> Vec<(WriteOp, Option<WriteOutcome>)> {
        // Leave room for the record in the same batch.
        let room = self.batch_limit.saturating_sub(1);
        if aliases.len() > room {
            tracing::warn!(target: "store", id = %target, aliases = aliases.len(), room, "too many aliases for one batch, truncating");
        }
        let mut ops = Vec::new();
        for a in aliases.iter().filter(|a| a.as_str() != target).take(room) {
            self.pending_aliases.insert(a.clone(), target.to_string());
            ops.push((
                WriteOp {
                    id: a.clone(),
                    doc: alias_document(target),
                    merge: false,
                },
                None,
            ));
        }
        ops
    }

    /// Keep `ops` in one batch: flush first when they would not fit.
    async fn push(&mut self, ops: Vec<(WriteOp, Option<WriteOutcome>)>) {
        let fresh = ops
            .iter()
            .filter(|(op, _)| !self.pending.iter().any(|(p, _)| p.id == op.id))
            .count();
        if !self.pending.is_empty() && self.pending.len() + fresh > self.batch_limit {
            self.flush().await;
        }
        for (op, outcome) in ops {
            match self.pending.iter_mut().find(|(p, _)| p.id == op.id) {
                Some((p, _)) => p.doc = op.doc,
                None => self.pending.push((op, outcome)),
            }
        }
        if self.pending.len() >= self.batch_limit {
            self.flush().await;
        }
    }

    /// Commit everything pending. Never retries; failures land in `stats`.
    pub async fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.pending);
        self.pending_records.clear();
        self.pending_aliases.clear();

        let n = batch.len();
        let created = batch
            .iter()
            .filter(|(_, o)| *o == Some(WriteOutcome::Created))
            .count();
        let updated = batch
            .iter()
            .filter(|(_, o)| *o == Some(WriteOutcome::Updated))
            .count();
        let ops: Vec<WriteOp> = batch.into_iter().map(|(op, _)| op).collect();

        match self.timed(self.store.batch_commit(ops)).await {
            Ok(()) => {
                self.stats.created += created;
                self.stats.updated += updated;
                metrics::counter!("store_commits_total").increment(1);
                metrics::counter!("store_writes_total").increment(n as u64);
                tracing::info!(target: "store", docs = n, created, updated, "batch committed");
            }
            Err(e) => {
                self.stats.errors += created + updated;
                self.stats.failed_batches += 1;
                metrics::counter!("store_commit_failures_total").increment(1);
                tracing::error!(target: "store", docs = n, error = %e, "batch commit failed");
            }
        }
    }
}
