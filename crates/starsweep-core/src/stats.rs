//! Harvest statistics and run summaries.
//!
//! Pure bookkeeping, decoupled from I/O so the orchestration and the CLI can
//! share it.

use serde::Serialize;

use crate::models::ScalarRange;

/// Outcome of upserting a single repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No row with this GitHub id existed.
    Created,
    /// An existing row was overwritten.
    Updated,
}

/// Counters for one persisted batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PersistStats {
    pub created: usize,
    pub updated: usize,
}

impl PersistStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an outcome, incrementing the appropriate counter.
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created => self.created += 1,
            UpsertOutcome::Updated => self.updated += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.created + self.updated
    }

    pub fn merge(&mut self, other: PersistStats) {
        self.created += other.created;
        self.updated += other.updated;
    }
}

/// Result of harvesting a single sub-range.
#[derive(Debug, Clone, Serialize)]
pub struct RangeHarvestResult {
    pub range: ScalarRange,
    /// Total reported by the accepted probe.
    pub total: Option<u64>,
    pub pages: u32,
    /// Items that passed the filter.
    pub collected: usize,
    /// Items dropped as archived, disabled or non-public.
    pub filtered: usize,
    pub persisted: PersistStats,
    /// Error message if the range failed, None if successful.
    pub error: Option<String>,
}

impl RangeHarvestResult {
    /// Creates a successful range result.
    pub fn success(
        range: ScalarRange,
        total: Option<u64>,
        pages: u32,
        filtered: usize,
        persisted: PersistStats,
    ) -> Self {
        Self {
            range,
            total,
            pages,
            collected: persisted.total(),
            filtered,
            persisted,
            error: None,
        }
    }

    /// Creates a failed range result. Nothing from a failed range is persisted.
    pub fn failure(range: ScalarRange, total: Option<u64>, error: String) -> Self {
        Self {
            range,
            total,
            pages: 0,
            collected: 0,
            filtered: 0,
            persisted: PersistStats::default(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregated results of a harvest run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HarvestSummary {
    /// Results for each sub-range, in cursor order.
    pub results: Vec<RangeHarvestResult>,
    /// Error that stopped the run early, if any.
    pub fatal_error: Option<String>,
    /// Cursor position a resumed run should start from, when stopped early.
    pub resume_from: Option<u64>,
}

impl HarvestSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a range result.
    pub fn add(&mut self, result: RangeHarvestResult) {
        self.results.push(result);
    }

    /// Marks the run as stopped by a fatal error at `cursor`.
    pub fn abort(&mut self, cursor: u64, error: String) {
        self.fatal_error = Some(error);
        self.resume_from = Some(cursor);
    }

    pub fn successful_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.is_success()).count()
    }

    pub fn failed_ranges(&self) -> impl Iterator<Item = &RangeHarvestResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    /// Total number of repositories collected across successful ranges.
    pub fn total_collected(&self) -> usize {
        self.results.iter().map(|r| r.collected).sum()
    }

    pub fn total_filtered(&self) -> usize {
        self.results.iter().map(|r| r.filtered).sum()
    }

    pub fn total_pages(&self) -> u64 {
        self.results.iter().map(|r| u64::from(r.pages)).sum()
    }

    pub fn persisted(&self) -> PersistStats {
        let mut stats = PersistStats::new();
        for result in &self.results {
            stats.merge(result.persisted);
        }
        stats
    }

    /// True when every range succeeded and nothing stopped the run.
    pub fn is_success(&self) -> bool {
        self.fatal_error.is_none() && self.failed_count() == 0
    }
}
