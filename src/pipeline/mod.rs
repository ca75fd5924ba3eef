// src/pipeline/mod.rs
//! Orchestrator: one unit of work in, one [`RunSummary`] out.
//!
//! Collection runs go Collecting → Grouping → Scoring → Enriching → Writing → Done.
//! Maintenance passes walk stored records instead of collecting. Only infrastructure
//! problems (no providers, store unreachable) end in `Failed`; everything else is
//! counted and the run moves on.

pub mod summary;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::time::Instant;

pub use summary::{RunStage, RunSummary};

use crate::config::{GenerativeConfig, PipelineConfig};
use crate::credibility::{
    CredibilityAssessment, CredibilityPolicy, CredibilityScorer, ScoringInput, SourceRef, Stage,
};
use crate::enrich::{heuristic, BiasAssessment, EnrichInput, Enricher, EnrichmentResult, RetryPolicy};
use crate::generative::{build_generator, DisabledGenerator};
use crate::grouping::{ArticleGroup, EventGrouper};
use crate::ingest::collect;
use crate::ingest::providers::build_providers;
use crate::ingest::types::{ArticleProvider, Query};
use crate::reputation::ReputationTable;
use crate::store::writer::{DEFAULT_BATCH_LIMIT, DEFAULT_STORE_TIMEOUT};
use crate::store::{
    event_id, DocumentStore, EventRecord, RecordDraft, Resolution, StoreError, StoreWriter,
    StoredDoc, WriteOutcome,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceMode {
    /// Cross-verify re-scoring from stored sources; the stored score is the prior.
    Rescore,
    /// Re-run enrichment with the stored description as corroborating text.
    Reenrich,
    /// Bias analysis only.
    BiasAnalyze,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOfWork {
    Date(NaiveDate),
    /// Inclusive; bounds given in reverse are swapped.
    DateRange { start: NaiveDate, end: NaiveDate },
    Topic(String),
    Topics(Vec<String>),
    Maintenance(MaintenanceMode),
}

impl fmt::Display for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitOfWork::Date(d) => write!(f, "date {d}"),
            UnitOfWork::DateRange { start, end } => write!(f, "range {start}..={end}"),
            UnitOfWork::Topic(t) => write!(f, "topic {t:?}"),
            UnitOfWork::Topics(ts) => write!(f, "{} topics", ts.len()),
            UnitOfWork::Maintenance(m) => write!(f, "maintenance {m:?}"),
        }
    }
}

/// Optional steps of a collection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageToggles {
    pub enrich: bool,
    pub analyze_bias: bool,
}

impl Default for StageToggles {
    fn default() -> Self {
        Self {
            enrich: true,
            analyze_bias: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub batch_limit: usize,
    /// Applies to collection runs and the reenrich/bias passes, not to rescore.
    pub min_refresh_age: chrono::Duration,
    pub store_timeout: Duration,
    pub toggles: StageToggles,
    pub inter_unit_delay: Duration,
    pub run_timeout: Option<Duration>,
    pub added_by: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            batch_limit: DEFAULT_BATCH_LIMIT,
            min_refresh_age: chrono::Duration::hours(12),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            toggles: StageToggles::default(),
            inter_unit_delay: Duration::from_millis(250),
            run_timeout: None,
            added_by: "world-events".to_string(),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            batch_limit: cfg.store.batch_size,
            min_refresh_age: cfg.store.min_refresh_age(),
            store_timeout: Duration::from_secs(cfg.store.timeout_secs),
            toggles: StageToggles {
                enrich: cfg.run.enrich,
                analyze_bias: cfg.run.analyze_bias,
            },
            inter_unit_delay: cfg.inter_unit_delay(),
            run_timeout: cfg.run_timeout(),
            added_by: cfg.added_by.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Clock {
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }
}

enum GroupOutcome {
    Staged,
    Skipped,
    Rejected,
}

enum MaintainOutcome {
    Revised,
    Unchanged,
    /// Alias document; not a record of its own.
    Alias,
}

fn past(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

pub struct Pipeline {
    providers: Vec<Box<dyn ArticleProvider>>,
    grouper: EventGrouper,
    scorer: CredibilityScorer,
    enricher: Enricher,
    store: Arc<dyn DocumentStore>,
    settings: PipelineSettings,
    clock: Clock,
}

impl Pipeline {
    /// No providers, AI disabled, default policy and settings.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            providers: Vec::new(),
            grouper: EventGrouper::default(),
            scorer: CredibilityScorer::new(
                CredibilityPolicy::default(),
                ReputationTable::default_seed(),
            ),
            enricher: Enricher::new(Arc::new(DisabledGenerator), RetryPolicy::default()),
            store,
            settings: PipelineSettings::default(),
            clock: Clock::System,
        }
    }

    pub fn from_config(
        cfg: &PipelineConfig,
        ai: &GenerativeConfig,
        store: Arc<dyn DocumentStore>,
    ) -> anyhow::Result<Self> {
        let providers = build_providers(&cfg.providers)?;
        let reputation = ReputationTable::load_from_file(&cfg.reputation_path);
        let enricher = Enricher::new(build_generator(ai), cfg.enrich.retry_policy())
            .with_inter_call_delay(Duration::from_millis(cfg.enrich.inter_call_delay_ms));

        tracing::info!(
            target: "pipeline",
            providers = providers.len(),
            generator = enricher.generator_name(),
            store_dir = %cfg.store.dir.display(),
            "pipeline configured"
        );

        Ok(Self::new(store)
            .with_providers(providers)
            .with_grouper(EventGrouper::with_threshold(cfg.grouping_threshold))
            .with_scorer(CredibilityScorer::new(cfg.credibility.clone(), reputation))
            .with_enricher(enricher)
            .with_settings(PipelineSettings::from_config(cfg)))
    }

    pub fn with_provider(mut self, p: Box<dyn ArticleProvider>) -> Self {
        self.providers.push(p);
        self
    }

    pub fn with_providers(mut self, ps: Vec<Box<dyn ArticleProvider>>) -> Self {
        self.providers.extend(ps);
        self
    }

    pub fn with_grouper(mut self, g: EventGrouper) -> Self {
        self.grouper = g;
        self
    }

    pub fn with_scorer(mut self, s: CredibilityScorer) -> Self {
        self.scorer = s;
        self
    }

    pub fn with_enricher(mut self, e: Enricher) -> Self {
        self.enricher = e;
        self
    }

    pub fn with_settings(mut self, s: PipelineSettings) -> Self {
        self.settings = s;
        self
    }

    /// Pin "now" (record timestamps, recency, freshness).
    pub fn with_fixed_clock(mut self, now: DateTime<Utc>) -> Self {
        self.clock = Clock::Fixed(now);
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub async fn run(&self, unit: &UnitOfWork) -> RunSummary {
        crate::metrics::ensure_described();
        let started = std::time::Instant::now();
        let deadline = self.settings.run_timeout.map(|t| Instant::now() + t);
        tracing::info!(target: "pipeline", unit = %unit, "run started");

        let mut summary = match unit {
            UnitOfWork::Date(d) => self.run_query(Query::Date(*d), deadline).await,
            UnitOfWork::Topic(t) => self.run_query(Query::Topic(t.clone()), deadline).await,
            UnitOfWork::DateRange { start, end } => {
                let (a, b) = if start <= end {
                    (*start, *end)
                } else {
                    (*end, *start)
                };
                let days = a
                    .iter_days()
                    .take_while(|d| *d <= b)
                    .map(Query::Date)
                    .collect();
                self.sweep(days, deadline).await
            }
            UnitOfWork::Topics(ts) => {
                let qs = ts.iter().cloned().map(Query::Topic).collect();
                self.sweep(qs, deadline).await
            }
            UnitOfWork::Maintenance(mode) => self.run_maintenance(*mode, deadline).await,
        };

        summary.duration_seconds = started.elapsed().as_secs_f64();
        metrics::histogram!("pipeline_run_seconds").record(summary.duration_seconds);
        metrics::gauge!("pipeline_last_run_ts").set(self.clock.now().timestamp() as f64);
        tracing::info!(
            target: "pipeline",
            unit = %unit,
            ok = summary.is_success(),
            processed = summary.processed,
            created = summary.created,
            updated = summary.updated,
            skipped = summary.skipped,
            rejected = summary.rejected,
            errors = summary.errors,
            timed_out = summary.timed_out,
            secs = summary.duration_seconds,
            "run finished"
        );
        summary
    }

    fn writer(&self) -> StoreWriter {
        StoreWriter::new(
            self.store.clone(),
            self.settings.batch_limit,
            self.settings.min_refresh_age,
        )
        .with_timeout(self.settings.store_timeout)
    }

    async fn sweep(&self, queries: Vec<Query>, deadline: Option<Instant>) -> RunSummary {
        let mut total = RunSummary {
            stage: RunStage::Done,
            ..Default::default()
        };
        for (i, q) in queries.into_iter().enumerate() {
            if i > 0 && !self.settings.inter_unit_delay.is_zero() {
                tokio::time::sleep(self.settings.inter_unit_delay).await;
            }
            if past(deadline) {
                tracing::warn!(target: "pipeline", "run timeout reached, skipping remaining units");
                total.timed_out = true;
                break;
            }
            let s = self.run_query(q, deadline).await;
            total.merge(&s);
            if total.stage == RunStage::Failed {
                break;
            }
        }
        total
    }

    async fn run_query(&self, query: Query, deadline: Option<Instant>) -> RunSummary {
        let mut s = RunSummary::default();
        if self.providers.is_empty() {
            return s.fail("no content providers configured");
        }
        let mut writer = self.writer();
        if let Err(e) = writer.ping().await {
            return s.fail(format!("store unreachable: {e}"));
        }

        let articles = collect(&query, &self.providers).await;
        s.articles_collected = articles.len();

        s.stage = RunStage::Grouping;
        let groups = self.grouper.group(articles);
        s.groups = groups.len();

        let now = self.clock.now();
        let mut fatal = None;
        for (i, group) in groups.iter().enumerate() {
            if past(deadline) {
                tracing::warn!(
                    target: "pipeline",
                    remaining = groups.len() - i,
                    "run timeout reached, skipping remaining groups"
                );
                s.timed_out = true;
                break;
            }
            s.processed += 1;
            match self.process_group(group, &mut writer, now, &mut s).await {
                Ok(GroupOutcome::Staged) => {}
                Ok(GroupOutcome::Skipped) => s.skipped += 1,
                Ok(GroupOutcome::Rejected) => s.rejected += 1,
                Err(e) if e.is_fatal() => {
                    fatal = Some(e);
                    break;
                }
                Err(e) => {
                    s.errors += 1;
                    tracing::warn!(target: "pipeline", title = %group.lead().title, error = %e, "group failed");
                }
            }
        }

        s.stage = RunStage::Writing;
        writer.flush().await;
        absorb(&mut s, &writer);

        match fatal {
            Some(e) => s.fail(format!("store unreachable: {e}")),
            None => {
                s.stage = RunStage::Done;
                s
            }
        }
    }

    async fn process_group(
        &self,
        group: &ArticleGroup,
        writer: &mut StoreWriter,
        now: DateTime<Utc>,
        s: &mut RunSummary,
    ) -> Result<GroupOutcome, StoreError> {
        s.stage = RunStage::Scoring;

        let mut candidates: Vec<String> = Vec::with_capacity(group.len());
        for a in group.articles() {
            let id = event_id(&a.title, a.published_date);
            if !candidates.contains(&id) {
                candidates.push(id);
            }
        }
        let Resolution {
            id,
            existing,
            unclaimed,
        } = writer.resolve(&candidates).await?;

        if let Some(prev) = &existing {
            if writer.is_fresh(prev, now) {
                tracing::debug!(target: "pipeline", id = %id, "recently refreshed, skipping");
                writer.stage_aliases(&id, &unclaimed).await;
                return Ok(GroupOutcome::Skipped);
            }
        }

        let known = existing
            .as_ref()
            .map(|r| r.sources.clone())
            .unwrap_or_default();
        let input = ScoringInput::from_group(group).with_known_sources(&known);
        let prior = existing.as_ref().map(|r| r.credibility_score);
        let assessment = self
            .scorer
            .assess(&input, prior, Stage::Ingest, now.date_naive());
        if !assessment.accepted {
            if existing.is_some() {
                writer.stage_aliases(&id, &unclaimed).await;
            }
            metrics::counter!("score_rejected_total").increment(1);
            tracing::debug!(target: "pipeline", id = %id, score = assessment.score, "rejected");
            return Ok(GroupOutcome::Rejected);
        }

        s.stage = RunStage::Enriching;
        let toggles = self.settings.toggles;
        let enrichment = if toggles.enrich {
            self.enricher.enrich(&EnrichInput::from_group(group)).await
        } else {
            heuristic::enrichment(&EnrichInput::from_group(group))
        };
        let bias = if toggles.analyze_bias {
            Some(
                self.enricher
                    .analyze_bias(&enrichment.narrative, &group.source_names())
                    .await,
            )
        } else {
            None
        };

        let mut draft = draft_from_group(group, enrichment, bias, &assessment);

        s.stage = RunStage::Writing;
        match existing {
            None => {
                let record = EventRecord::create(id, draft, now, &self.settings.added_by);
                writer
                    .stage_with_aliases(record, WriteOutcome::Created, &unclaimed)
                    .await?;
                Ok(GroupOutcome::Staged)
            }
            Some(prev) => {
                if !toggles.enrich {
                    // Heuristic text must not overwrite a stored narrative.
                    draft.description = prev.description.clone();
                    draft.long_description = prev.long_description.clone();
                    draft.region = prev.region.clone();
                    draft.category = prev.category.clone();
                    draft.key_points = prev.key_points.clone();
                }
                match prev.revise(draft, now) {
                    Some(record) => {
                        writer
                            .stage_with_aliases(record, WriteOutcome::Updated, &unclaimed)
                            .await?;
                        Ok(GroupOutcome::Staged)
                    }
                    None => {
                        writer.stage_aliases(&id, &unclaimed).await;
                        Ok(GroupOutcome::Skipped)
                    }
                }
            }
        }
    }

    async fn run_maintenance(&self, mode: MaintenanceMode, deadline: Option<Instant>) -> RunSummary {
        let mut s = RunSummary {
            stage: RunStage::Scoring,
            ..Default::default()
        };
        let mut writer = self.writer();
        if let Err(e) = writer.ping().await {
            return s.fail(format!("store unreachable: {e}"));
        }
        let ids = match writer.list_ids().await {
            Ok(ids) => ids,
            Err(e) => return s.fail(format!("listing records: {e}")),
        };

        let now = self.clock.now();
        let mut fatal = None;
        for (i, id) in ids.iter().enumerate() {
            if past(deadline) {
                tracing::warn!(target: "pipeline", remaining = ids.len() - i, "run timeout reached, skipping remaining records");
                s.timed_out = true;
                break;
            }
            match self.maintain_one(mode, id, &mut writer, now).await {
                Ok(MaintainOutcome::Alias) => continue,
                Ok(MaintainOutcome::Revised) => s.processed += 1,
                Ok(MaintainOutcome::Unchanged) => {
                    s.processed += 1;
                    s.skipped += 1;
                }
                Err(e) if e.is_fatal() => {
                    fatal = Some(e);
                    break;
                }
                Err(e) => {
                    s.processed += 1;
                    s.errors += 1;
                    tracing::warn!(target: "pipeline", id = %id, error = %e, "maintenance failed for record");
                }
            }
        }

        s.stage = RunStage::Writing;
        writer.flush().await;
        absorb(&mut s, &writer);
        match fatal {
            Some(e) => s.fail(format!("store unreachable: {e}")),
            None => {
                s.stage = RunStage::Done;
                s
            }
        }
    }

    async fn maintain_one(
        &self,
        mode: MaintenanceMode,
        id: &str,
        writer: &mut StoreWriter,
        now: DateTime<Utc>,
    ) -> Result<MaintainOutcome, StoreError> {
        let record = match writer.fetch(id).await? {
            Some(StoredDoc::Record(r)) => r,
            Some(StoredDoc::Alias(_)) => return Ok(MaintainOutcome::Alias),
            None => return Ok(MaintainOutcome::Unchanged),
        };
        // Re-enrichment waits out the refresh window; re-scoring does not.
        if mode != MaintenanceMode::Rescore && writer.is_fresh(&record, now) {
            tracing::debug!(target: "pipeline", id = %id, "recently refreshed, skipping");
            return Ok(MaintainOutcome::Unchanged);
        }
        let mut draft = record.to_draft();

        match mode {
            MaintenanceMode::Rescore => {
                let input = ScoringInput {
                    sources: record.sources.iter().map(SourceRef::named).collect(),
                    event_date: record.date,
                    agreement_ratio: record.agreement_ratio,
                    historical: record.historical,
                };
                let a = self.scorer.assess(
                    &input,
                    Some(record.credibility_score),
                    Stage::CrossVerify,
                    now.date_naive(),
                );
                draft.credibility_score = a.score;
                draft.verified = a.verified;
                draft.flagged = a.flagged;
            }
            MaintenanceMode::Reenrich => {
                let input = EnrichInput::new(&record.title, record.date, &record.long_description)
                    .with_sources(record.sources.clone())
                    .with_corroborating(&record.description);
                let e = self.enricher.enrich(&input).await;
                if e.corroborated == Some(false) {
                    draft.flagged = true;
                }
                apply_enrichment(&mut draft, e);
            }
            MaintenanceMode::BiasAnalyze => {
                let b = self
                    .enricher
                    .analyze_bias(&record.long_description, &record.sources)
                    .await;
                draft.bias = Some(b);
            }
        }

        match record.revise(draft, now) {
            Some(next) => {
                writer.stage(next, WriteOutcome::Updated).await?;
                Ok(MaintainOutcome::Revised)
            }
            None => Ok(MaintainOutcome::Unchanged),
        }
    }
}

fn absorb(s: &mut RunSummary, writer: &StoreWriter) {
    let st = writer.stats();
    s.created += st.created;
    s.updated += st.updated;
    s.errors += st.errors;
    s.failed_batches += st.failed_batches;
}

fn apply_enrichment(draft: &mut RecordDraft, e: EnrichmentResult) {
    draft.description = e.short_summary;
    draft.long_description = e.narrative;
    draft.region = e.region;
    draft.category = e.category;
    if !e.key_points.is_empty() {
        draft.key_points = e.key_points;
    }
}

fn draft_from_group(
    group: &ArticleGroup,
    enrichment: EnrichmentResult,
    bias: Option<BiasAssessment>,
    a: &CredibilityAssessment,
) -> RecordDraft {
    let lead = group.lead();
    let mut draft = RecordDraft {
        title: lead.title.clone(),
        date: lead.published_date,
        description: String::new(),
        long_description: String::new(),
        region: String::new(),
        category: String::new(),
        key_points: Vec::new(),
        sources: group.source_names(),
        links: group.links(),
        image_url: group.image_url(),
        credibility_score: a.score,
        agreement_ratio: a.agreement_ratio,
        verified: a.verified,
        flagged: a.flagged,
        historical: group.is_historical(),
        bias,
    };
    apply_enrichment(&mut draft, enrichment);
    draft
}
