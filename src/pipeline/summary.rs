// src/pipeline/summary.rs
use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    #[default]
    Collecting,
    Grouping,
    Scoring,
    Enriching,
    Writing,
    Done,
    Failed,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStage::Collecting => "collecting",
            RunStage::Grouping => "grouping",
            RunStage::Scoring => "scoring",
            RunStage::Enriching => "enriching",
            RunStage::Writing => "writing",
            RunStage::Done => "done",
            RunStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Result of one unit of work; the only place run counts live.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Groups (or stored records, for maintenance) examined.
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Below the stage's accept threshold. Not errors.
    pub rejected: usize,
    pub errors: usize,
    pub failed_batches: usize,
    pub articles_collected: usize,
    pub groups: usize,
    pub timed_out: bool,
    pub duration_seconds: f64,
    pub stage: RunStage,
    pub failure: Option<String>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.stage == RunStage::Done && self.failure.is_none()
    }

    /// Mark the run failed at the current stage.
    pub fn fail(mut self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        tracing::error!(target: "pipeline", stage = %self.stage, reason = %reason, "run failed");
        self.failure = Some(format!("{}: {reason}", self.stage));
        self.stage = RunStage::Failed;
        self
    }

    /// Fold a sweep unit into the running total. A failed unit fails the total.
    pub fn merge(&mut self, other: &RunSummary) {
        self.processed += other.processed;
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.rejected += other.rejected;
        self.errors += other.errors;
        self.failed_batches += other.failed_batches;
        self.articles_collected += other.articles_collected;
        self.groups += other.groups;
        self.timed_out |= other.timed_out;
        self.duration_seconds += other.duration_seconds;
        if self.stage != RunStage::Failed {
            self.stage = other.stage;
            self.failure = other.failure.clone();
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "run {} in {:.1}s{}",
            if self.is_success() { "ok" } else { "FAILED" },
            self.duration_seconds,
            if self.timed_out { " (timed out)" } else { "" }
        )?;
        writeln!(
            f,
            "  articles: {}  groups: {}  processed: {}",
            self.articles_collected, self.groups, self.processed
        )?;
        writeln!(
            f,
            "  created: {}  updated: {}  skipped: {}  rejected: {}",
            self.created, self.updated, self.skipped, self.rejected
        )?;
        write!(
            f,
            "  errors: {}  failed batches: {}",
            self.errors, self.failed_batches
        )?;
        if let Some(reason) = &self.failure {
            write!(f, "\n  failure: {reason}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn done() -> RunSummary {
        RunSummary {
            stage: RunStage::Done,
            ..Default::default()
        }
    }

    #[test]
    fn merge_sums_counts() {
        let mut total = RunSummary::default();
        let mut a = done();
        a.created = 2;
        a.errors = 1;
        let mut b = done();
        b.created = 1;
        b.skipped = 3;
        total.merge(&a);
        total.merge(&b);
        assert_eq!(total.created, 3);
        assert_eq!(total.skipped, 3);
        assert_eq!(total.errors, 1);
        assert!(total.is_success());
    }

    #[test]
    fn failure_sticks_through_merge() {
        let mut total = done();
        total.merge(&done().fail("store unreachable"));
        total.merge(&done());
        assert!(!total.is_success());
        assert_eq!(total.stage, RunStage::Failed);
        assert_eq!(total.failure.as_deref(), Some("done: store unreachable"));
    }

    #[test]
    fn errors_alone_do_not_fail_a_run() {
        let mut s = done();
        s.errors = 5;
        s.failed_batches = 1;
        assert!(s.is_success());
        assert!(s.to_string().contains("failed batches: 1"));
    }
}
