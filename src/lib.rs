// src/lib.rs
//! World event pipeline: collect reports from content providers, group them into
//! events, score credibility, enrich, and persist revision-tracked records.

pub mod config;
pub mod credibility;
pub mod enrich;
pub mod generative;
pub mod grouping;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod reputation;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::pipeline::{MaintenanceMode, Pipeline, RunStage, RunSummary, StageToggles, UnitOfWork};
pub use crate::store::{DocumentStore, EventRecord, JsonDirStore, MemoryStore};
