//! Bulk pass over the failure ledger that marks hopeless entries permanent,
//! so later runs stop spending attempts on them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::info;

use super::{needs_escalation, Classification, FailureClassifier};
use crate::app::Result;
use crate::domain::{FailureCategory, FailureStatus};
use crate::ledger::FailureLedger;
use crate::store::LedgerStore;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterReport {
    pub total: usize,
    pub already_permanent: usize,
    pub newly_permanent: usize,
    pub retryable: usize,
    pub by_category: BTreeMap<FailureCategory, usize>,
    pub dry_run: bool,
}

impl FilterReport {
    pub fn permanent(&self) -> usize {
        self.already_permanent + self.newly_permanent
    }

    /// Share of failures that no longer need attempts, in percent.
    pub fn efficiency_gain(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.permanent() as f64 * 100.0 / self.total as f64
    }

    /// Categories sorted by count, largest first.
    pub fn top_categories(&self, limit: usize) -> Vec<(FailureCategory, usize)> {
        let mut sorted: Vec<_> = self.by_category.iter().map(|(c, n)| (*c, *n)).collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        sorted.truncate(limit);
        sorted
    }

    pub fn suggestions(&self) -> Vec<String> {
        let mut out = Vec::new();
        let defects = self
            .by_category
            .get(&FailureCategory::CodeDefect)
            .copied()
            .unwrap_or(0);
        if defects > 0 {
            out.push(format!(
                "{} code-defect failures need a fix in the scraper before they can succeed",
                defects
            ));
        }
        let forbidden = self
            .by_category
            .get(&FailureCategory::Forbidden)
            .copied()
            .unwrap_or(0);
        if forbidden > 0 {
            out.push(format!(
                "{} URLs are blocked (403); consider a different fetch strategy for those sites",
                forbidden
            ));
        }
        if self.newly_permanent > 0 {
            out.push(format!(
                "Filtering saves {} retry attempts per run ({:.1}% of failures are permanent)",
                self.newly_permanent,
                self.efficiency_gain()
            ));
        }
        if self.retryable > 0 {
            out.push(format!(
                "{} failures remain retryable; run `fairway continue` to retry them",
                self.retryable
            ));
        }
        out
    }
}

pub struct FailureFilter {
    classifier: FailureClassifier,
    max_retries: u32,
}

impl FailureFilter {
    pub fn new(classifier: FailureClassifier, max_retries: u32) -> Self {
        Self {
            classifier,
            max_retries,
        }
    }

    /// Classify every entry and mark permanent ones in `ledger`. With
    /// `dry_run` the ledger is only read.
    pub async fn apply<L>(&self, ledger: &L, dry_run: bool) -> Result<FilterReport>
    where
        L: LedgerStore<Document = FailureLedger>,
    {
        let now = Utc::now();
        let report = if dry_run {
            let mut doc = ledger.load()?;
            self.filter_document(&mut doc, now, true)
        } else {
            ledger
                .update(|doc| self.filter_document(doc, now, false))
                .await?
        };

        info!(
            total = report.total,
            newly_permanent = report.newly_permanent,
            retryable = report.retryable,
            dry_run,
            "Failure filter complete"
        );
        Ok(report)
    }

    fn verdict(&self, attempt_count: u32, classification: Classification) -> Classification {
        if !classification.is_permanent() && needs_escalation(attempt_count, self.max_retries) {
            return self.classifier.classify_category(FailureCategory::MaxRetries);
        }
        classification
    }

    fn filter_document(&self, doc: &mut FailureLedger, now: DateTime<Utc>, dry_run: bool) -> FilterReport {
        let mut report = FilterReport {
            dry_run,
            ..Default::default()
        };

        for (_, entry) in doc.iter_mut() {
            report.total += 1;
            if entry.status == FailureStatus::PermanentlyFailed {
                report.already_permanent += 1;
                let category = entry.failure_category.unwrap_or(FailureCategory::Unknown);
                *report.by_category.entry(category).or_default() += 1;
                continue;
            }

            let classification = self.classifier.classify_at(
                &entry.reason,
                entry.attempt_count,
                entry.last_attempt,
                now,
            );
            let verdict = self.verdict(entry.attempt_count, classification);
            *report.by_category.entry(verdict.category).or_default() += 1;

            if verdict.is_permanent() {
                report.newly_permanent += 1;
                if !dry_run {
                    entry.mark_permanent(verdict.category, verdict.description, now);
                }
            } else {
                report.retryable += 1;
                if !dry_run {
                    entry.failure_category = Some(verdict.category);
                    entry.status = FailureStatus::PendingRetry;
                }
            }
        }
        report
    }
}
