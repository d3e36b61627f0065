//! Outcome counters for batch operations with per-item failures.

use serde::Serialize;

/// Counts of items handled by a batch, with one entry per skipped item.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub skipped: usize,
    pub reasons: Vec<SkippedItem>,
}

/// One item a batch refused, identified by position and name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedItem {
    pub index: usize,
    pub name: String,
    pub reason: String,
}

impl BatchReport {
    pub fn record_processed(&mut self) {
        self.processed += 1;
    }

    pub fn record_skipped(&mut self, index: usize, name: impl Into<String>, reason: impl ToString) {
        self.skipped += 1;
        self.reasons.push(SkippedItem {
            index,
            name: name.into(),
            reason: reason.to_string(),
        });
    }

    /// Number of items looked at so far.
    pub fn total(&self) -> usize {
        self.processed + self.skipped
    }

    pub fn is_clean(&self) -> bool {
        self.skipped == 0
    }

    /// Fold `other` into this report, keeping reasons ordered by index.
    pub fn absorb(&mut self, other: BatchReport) {
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.reasons.extend(other.reasons);
        self.reasons.sort_by_key(|item| item.index);
    }

    /// Log every skipped item at `warn`.
    pub fn log_skipped(&self, operation: &str) {
        for item in &self.reasons {
            tracing::warn!(
                "{operation}: skipped #{} {}: {}",
                item.index,
                item.name,
                item.reason
            );
        }
    }
}
