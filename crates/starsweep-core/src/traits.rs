//! Seams between the harvest logic and its I/O collaborators.
//!
//! The HTTP client and the database layer implement these traits in their own
//! crates; tests implement them with in-memory simulations.

use std::future::Future;

use crate::error::AppError;
use crate::link::LinkRelation;
use crate::models::{NewRepo, QuotaState, RawRepository, ScalarRange};
use crate::stats::PersistStats;

/// One page of search results.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// Reported total match count; `None` when the response omitted it.
    pub total_count: Option<u64>,
    pub items: Vec<RawRepository>,
    pub links: Vec<LinkRelation>,
}

/// Repository search endpoint.
pub trait SearchClient: Send + Sync {
    /// URL of the first page of the search for `range`.
    fn search_url(&self, range: ScalarRange, per_page: u32) -> Result<String, AppError>;

    /// Fetches a single page. Implementations must not retry.
    fn fetch_page(&self, url: &str) -> impl Future<Output = Result<SearchPage, AppError>> + Send;
}

/// Source of the live search rate limit budget.
pub trait QuotaSource: Send + Sync {
    fn fetch_quota(&self) -> impl Future<Output = Result<QuotaState, AppError>> + Send;
}

/// Create-or-update persistence keyed on the GitHub id.
pub trait RepoStore: Send + Sync {
    /// Upserts all records atomically, overwriting existing rows.
    fn upsert_batch(
        &self,
        records: &[NewRepo],
    ) -> impl Future<Output = Result<PersistStats, AppError>> + Send;
}
