//! Per-record pipeline: categorize, filter, generate, accumulate
//!
//! Records flow through an order-preserving buffered stream whose width is
//! the rate limiter's concurrency ceiling, so output rows always come out in
//! input order. A cancelled run returns every row finished so far.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classifier::CompanyCategorizer;
use crate::error::{OutreachError, Result};
use crate::generator::EmailGenerator;
use crate::models::{
    ClassificationResult, ClassificationSource, CompanyCategory, EmailSource,
    FallbackReason, OutputRow, SpeakerRecord,
};
use crate::rate_limiter::CallRateLimiter;

/// Invoked once per record that finishes processing (kept or excluded)
pub type ProgressCallback = Arc<dyn Fn() + Send + Sync>;

/// What happened to one record
#[derive(Debug)]
enum RecordOutcome {
    Kept {
        row: OutputRow,
        classification: ClassificationResult,
        email: EmailSource,
        email_fallback: Option<FallbackReason>,
    },
    Excluded(ClassificationResult),
}

/// Result of one pipeline run
#[derive(Debug)]
pub struct RunOutcome {
    pub rows: Vec<OutputRow>,
    pub stats: RunStats,
    pub cancelled: bool,
}

/// Counters collected over a run
#[derive(Debug, Clone)]
pub struct RunStats {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_records: usize,
    pub processed: usize,
    pub category_counts: BTreeMap<CompanyCategory, usize>,
    pub target_count: usize,
    pub excluded_count: usize,
    pub emails_generated: usize,
    pub ai_emails: usize,
    pub fallback_emails: usize,
    pub classification_sources: BTreeMap<ClassificationSource, usize>,
    pub classification_fallbacks: BTreeMap<FallbackReason, usize>,
    pub email_fallbacks: BTreeMap<FallbackReason, usize>,
    pub cancelled: bool,
}

impl RunStats {
    pub fn new(total_records: usize) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            completed_at: None,
            total_records,
            processed: 0,
            category_counts: BTreeMap::new(),
            target_count: 0,
            excluded_count: 0,
            emails_generated: 0,
            ai_emails: 0,
            fallback_emails: 0,
            classification_sources: BTreeMap::new(),
            classification_fallbacks: BTreeMap::new(),
            email_fallbacks: BTreeMap::new(),
            cancelled: false,
        }
    }

    fn record_classification(&mut self, result: &ClassificationResult) {
        self.processed += 1;
        *self.category_counts.entry(result.category).or_insert(0) += 1;
        *self.classification_sources.entry(result.source).or_insert(0) += 1;
        if let Some(reason) = result.fallback {
            *self.classification_fallbacks.entry(reason).or_insert(0) += 1;
        }
        if result.category.is_target() {
            self.target_count += 1;
        } else {
            self.excluded_count += 1;
        }
    }

    fn record_email(&mut self, source: EmailSource, fallback: Option<FallbackReason>) {
        self.emails_generated += 1;
        match source {
            EmailSource::AiModel => self.ai_emails += 1,
            EmailSource::Fallback => self.fallback_emails += 1,
        }
        if let Some(reason) = fallback {
            *self.email_fallbacks.entry(reason).or_insert(0) += 1;
        }
    }

    fn finish(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
        self.completed_at = Some(Utc::now());
    }

    pub fn category_count(&self, category: CompanyCategory) -> usize {
        self.category_counts.get(&category).copied().unwrap_or(0)
    }

    pub fn duration_seconds(&self) -> i64 {
        self.completed_at
            .unwrap_or_else(Utc::now)
            .signed_duration_since(self.started_at)
            .num_seconds()
            .max(0)
    }

    pub fn emails_per_minute(&self) -> f64 {
        let millis = self
            .completed_at
            .unwrap_or_else(Utc::now)
            .signed_duration_since(self.started_at)
            .num_milliseconds();
        if millis <= 0 {
            return 0.0;
        }
        self.emails_generated as f64 * 60_000.0 / millis as f64
    }

    /// Generate Markdown report
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        if self.cancelled {
            md.push_str("# Speaker Outreach Report (CANCELLED)\n\n");
            md.push_str("> Run was cancelled before every speaker was processed. Rows below are partial.\n\n");
        } else {
            md.push_str("# Speaker Outreach Report\n\n");
        }
        md.push_str(&format!(
            "Generated: {}\n\n",
            self.completed_at
                .unwrap_or_else(Utc::now)
                .format("%Y-%m-%d %H:%M:%S")
        ));

        md.push_str("## Summary\n\n");
        md.push_str(&format!("- **Run ID:** {}\n", self.run_id));
        md.push_str(&format!(
            "- **Speakers processed:** {} of {}\n",
            self.processed, self.total_records
        ));
        md.push_str(&format!("- **Target speakers:** {}\n", self.target_count));
        md.push_str(&format!("- **Excluded speakers:** {}\n", self.excluded_count));
        md.push_str(&format!("- **Emails generated:** {}\n", self.emails_generated));
        let duration = self.duration_seconds();
        md.push_str(&format!(
            "- **Processing time:** {} minutes {} seconds\n",
            duration / 60,
            duration % 60
        ));
        md.push_str(&format!(
            "- **Throughput:** {:.1} emails/minute\n\n",
            self.emails_per_minute()
        ));

        md.push_str("## Categories\n\n");
        md.push_str("| Category | Speakers | Share |\n");
        md.push_str("|----------|----------|-------|\n");
        for category in CompanyCategory::ALL {
            let count = self.category_count(category);
            let share = if self.processed == 0 {
                0.0
            } else {
                count as f64 * 100.0 / self.processed as f64
            };
            let marker = if category.is_target() { " (target)" } else { "" };
            md.push_str(&format!(
                "| {}{} | {} | {:.1}% |\n",
                category, marker, count, share
            ));
        }
        md.push('\n');

        md.push_str("## Classification Sources\n\n");
        for (source, count) in &self.classification_sources {
            md.push_str(&format!("- **{:?}:** {}\n", source, count));
        }
        md.push('\n');

        md.push_str("## Email Generation\n\n");
        md.push_str(&format!("- **AI written:** {}\n", self.ai_emails));
        md.push_str(&format!("- **Fallback template:** {}\n\n", self.fallback_emails));

        if !self.classification_fallbacks.is_empty() || !self.email_fallbacks.is_empty() {
            md.push_str("## Fallback Reasons\n\n");
            md.push_str("| Reason | Classification | Email |\n");
            md.push_str("|--------|----------------|-------|\n");
            let mut reasons: Vec<FallbackReason> = self
                .classification_fallbacks
                .keys()
                .chain(self.email_fallbacks.keys())
                .copied()
                .collect();
            reasons.sort();
            reasons.dedup();
            for reason in reasons {
                md.push_str(&format!(
                    "| {:?} | {} | {} |\n",
                    reason,
                    self.classification_fallbacks.get(&reason).copied().unwrap_or(0),
                    self.email_fallbacks.get(&reason).copied().unwrap_or(0)
                ));
            }
            md.push('\n');
        }

        md
    }

    /// Save report to file
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, self.to_markdown()).await?;
        Ok(())
    }
}

/// Drives validated records through categorization and email generation
pub struct Orchestrator {
    categorizer: CompanyCategorizer,
    generator: EmailGenerator,
    limiter: CallRateLimiter,
    progress: Option<ProgressCallback>,
}

impl Orchestrator {
    pub fn new(
        categorizer: CompanyCategorizer,
        generator: EmailGenerator,
        limiter: CallRateLimiter,
    ) -> Self {
        Self {
            categorizer,
            generator,
            limiter,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Process one record while holding a limiter slot
    async fn process_record(
        &self,
        record: &SpeakerRecord,
        cancel: &CancellationToken,
    ) -> Result<RecordOutcome> {
        let _permit = self.limiter.acquire(cancel).await?;

        let classification = self
            .categorizer
            .categorize(record.company(), record.title(), cancel)
            .await;
        if cancel.is_cancelled() {
            return Err(OutreachError::Cancelled);
        }

        if !classification.category.is_target() {
            debug!(
                "Skipping {} ({}): {} is not a target category",
                record.name(),
                record.company(),
                classification.category
            );
            return Ok(RecordOutcome::Excluded(classification));
        }

        let email = self
            .generator
            .generate(record, classification.category, cancel)
            .await;
        if cancel.is_cancelled() {
            return Err(OutreachError::Cancelled);
        }

        let source = email.source;
        let email_fallback = email.fallback;
        Ok(RecordOutcome::Kept {
            row: OutputRow::new(record, classification.category, email),
            classification,
            email: source,
            email_fallback,
        })
    }

    /// Run every record through the pipeline.
    ///
    /// Never fails: per-record problems resolve to fallbacks, and
    /// cancellation ends the run early with `cancelled = true`.
    pub async fn run(&self, records: &[SpeakerRecord], cancel: &CancellationToken) -> RunOutcome {
        let mut stats = RunStats::new(records.len());
        let mut rows = Vec::new();
        let mut cancelled = false;

        info!(
            "Processing {} speakers (max {} concurrent)",
            records.len(),
            self.limiter.max_concurrent()
        );

        let mut outcomes = stream::iter(records)
            .map(|record| self.process_record(record, cancel))
            .buffered(self.limiter.max_concurrent());

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                next = outcomes.next() => Some(next),
            };

            let outcome = match next {
                None => {
                    cancelled = true;
                    break;
                }
                Some(None) => break,
                Some(Some(outcome)) => outcome,
            };

            match outcome {
                Ok(RecordOutcome::Kept {
                    row,
                    classification,
                    email,
                    email_fallback,
                }) => {
                    stats.record_classification(&classification);
                    stats.record_email(email, email_fallback);
                    rows.push(row);
                }
                Ok(RecordOutcome::Excluded(classification)) => {
                    stats.record_classification(&classification);
                }
                Err(OutreachError::Cancelled) => {
                    cancelled = true;
                    break;
                }
                Err(e) => {
                    // Stages are infallible apart from cancellation
                    warn!("Record failed: {}", e);
                }
            }

            if let Some(progress) = &self.progress {
                progress();
            }
        }

        if cancelled {
            warn!(
                "Run cancelled after {} of {} speakers; keeping {} rows",
                stats.processed,
                records.len(),
                rows.len()
            );
        }

        stats.finish(cancelled);
        info!(
            "Run complete: {} target, {} excluded, {} emails ({} AI, {} fallback)",
            stats.target_count,
            stats.excluded_count,
            stats.emails_generated,
            stats.ai_emails,
            stats.fallback_emails
        );

        RunOutcome {
            rows,
            stats,
            cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classified(category: CompanyCategory, source: ClassificationSource) -> ClassificationResult {
        ClassificationResult::new(category, source)
    }

    #[test]
    fn test_stats_counts() {
        let mut stats = RunStats::new(3);

        stats.record_classification(&classified(CompanyCategory::Builder, ClassificationSource::AiModel));
        stats.record_email(EmailSource::AiModel, None);

        let mut fallback = classified(CompanyCategory::Owner, ClassificationSource::Keyword);
        fallback.fallback = Some(FallbackReason::RetriesExhausted);
        stats.record_classification(&fallback);
        stats.record_email(EmailSource::Fallback, Some(FallbackReason::InvalidResponse));

        stats.record_classification(&classified(
            CompanyCategory::Competitor,
            ClassificationSource::ManualList,
        ));

        assert_eq!(stats.processed, 3);
        assert_eq!(stats.target_count, 2);
        assert_eq!(stats.excluded_count, 1);
        assert_eq!(stats.emails_generated, 2);
        assert_eq!(stats.ai_emails, 1);
        assert_eq!(stats.fallback_emails, 1);
        assert_eq!(stats.category_count(CompanyCategory::Competitor), 1);
        assert_eq!(stats.category_count(CompanyCategory::Partner), 0);
        assert_eq!(
            stats.classification_fallbacks.get(&FallbackReason::RetriesExhausted),
            Some(&1)
        );
        assert_eq!(
            stats.email_fallbacks.get(&FallbackReason::InvalidResponse),
            Some(&1)
        );
    }

    #[test]
    fn test_markdown_report() {
        let mut stats = RunStats::new(2);
        stats.record_classification(&classified(CompanyCategory::Builder, ClassificationSource::Keyword));
        stats.record_email(EmailSource::Fallback, Some(FallbackReason::AiDisabled));
        stats.record_classification(&classified(CompanyCategory::Partner, ClassificationSource::ManualList));
        stats.finish(false);

        let md = stats.to_markdown();
        assert!(md.starts_with("# Speaker Outreach Report\n"));
        assert!(md.contains("- **Speakers processed:** 2 of 2"));
        assert!(md.contains("| Builder (target) | 1 | 50.0% |"));
        assert!(md.contains("| Partner | 1 | 50.0% |"));
        assert!(md.contains("| AiDisabled | 0 | 1 |"));
    }

    #[test]
    fn test_markdown_report_cancelled() {
        let mut stats = RunStats::new(5);
        stats.finish(true);

        let md = stats.to_markdown();
        assert!(md.contains("(CANCELLED)"));
        assert!(md.contains("0 of 5"));
        assert!(!md.contains("## Fallback Reasons"));
    }

    #[tokio::test]
    async fn test_save_report_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("run.md");

        let mut stats = RunStats::new(0);
        stats.finish(false);
        stats.save(&path).await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(content.contains(&stats.run_id));
    }
}
