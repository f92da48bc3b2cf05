//! Harvest orchestration: plan a range, walk it, persist it, advance.
//!
//! The run is one sequential flow because the rate limit budget is a single
//! shared external resource. Records are persisted after every range so a
//! late failure keeps everything harvested before it.

use tracing::{error, info, warn};

use crate::collector::PaginatedCollector;
use crate::config::{QuotaConfig, SearchConfig};
use crate::error::AppError;
use crate::governor::RateLimitGovernor;
use crate::planner::{PlannedRange, RangeSearchPlanner};
use crate::stats::{HarvestSummary, PersistStats, RangeHarvestResult};
use crate::traits::{QuotaSource, RepoStore, SearchClient};

/// Drives a harvest over `[floor, ceiling]`.
///
/// # Examples
///
/// ```no_run
/// use starsweep_core::{HarvestService, QuotaConfig, SearchConfig};
/// # use starsweep_core::AppError;
/// # use starsweep_core::traits::{QuotaSource, RepoStore, SearchClient};
/// # async fn example<C, S>(client: C, store: S) -> Result<(), AppError>
/// # where C: SearchClient + QuotaSource, S: RepoStore {
/// let service = HarvestService::new(client, store, SearchConfig::default(), QuotaConfig::default())?;
/// let summary = service.run().await;
/// println!("{} repositories", summary.total_collected());
/// # Ok(())
/// # }
/// ```
pub struct HarvestService<C, S> {
    client: C,
    store: S,
    search: SearchConfig,
    quota: QuotaConfig,
}

impl<C, S> HarvestService<C, S>
where
    C: SearchClient + QuotaSource,
    S: RepoStore,
{
    /// Creates a service after validating `search`.
    pub fn new(
        client: C,
        store: S,
        search: SearchConfig,
        quota: QuotaConfig,
    ) -> Result<Self, AppError> {
        search.validate()?;
        Ok(Self {
            client,
            store,
            search,
            quota,
        })
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs the harvest to completion or until a fatal error.
    ///
    /// Never fails as a whole: failed ranges and the fatal error, if any, are
    /// recorded in the returned summary.
    pub async fn run(&self) -> HarvestSummary {
        let mut summary = HarvestSummary::new();
        let ceiling = self.search.ceiling;
        let mut cursor = Some(self.search.floor);

        info!(
            "Harvesting stars:{}..{} (cap {}, {} per page)",
            self.search.floor, ceiling, self.search.result_cap, self.search.per_page
        );

        while let Some(position) = cursor.filter(|c| *c <= ceiling) {
            match self.harvest_range(position).await {
                Ok(result) => {
                    cursor = result.range.high.checked_add(1);
                    summary.add(result);
                }
                Err(e) => {
                    error!("Harvest stopped at star count {}: {}", position, e);
                    summary.abort(position, e.to_string());
                    break;
                }
            }
        }

        let persisted = summary.persisted();
        info!(
            "Harvest complete: {} ranges ({} failed), {} repositories ({} new, {} updated), {} filtered",
            summary.results.len(),
            summary.failed_count(),
            summary.total_collected(),
            persisted.created,
            persisted.updated,
            summary.total_filtered()
        );
        for failed in summary.failed_ranges() {
            warn!(
                "Failed range {}: {}",
                failed.range,
                failed.error.as_deref().unwrap_or_default()
            );
        }

        summary
    }

    /// Plans every range over `[floor, ceiling]` without collecting anything.
    pub async fn plan_all(&self) -> Result<Vec<PlannedRange>, AppError> {
        let mut plans = Vec::new();
        let mut cursor = Some(self.search.floor);

        while let Some(position) = cursor.filter(|c| *c <= self.search.ceiling) {
            let planned = self.plan_range(position).await?;
            info!(
                "[{}] {} -> {} matches ({} probes)",
                plans.len() + 1,
                planned.range,
                planned
                    .total
                    .map_or_else(|| "unknown".to_string(), |t| t.to_string()),
                planned.probes
            );
            cursor = planned.next_cursor();
            plans.push(planned);
        }

        Ok(plans)
    }

    /// Plans, walks and persists the range starting at `cursor`.
    ///
    /// Returns `Err` only for conditions that must stop the run; a range whose
    /// pages fail is reported as a failed result instead.
    async fn harvest_range(&self, cursor: u64) -> Result<RangeHarvestResult, AppError> {
        let governor = RateLimitGovernor::new(&self.client, &self.quota);
        let collector = PaginatedCollector::new(&self.client, self.search.max_pages());

        let planned = self.plan_range(cursor).await?;
        let range = planned.range;
        let pages = self.search.pages_for(planned.total);
        let url = self.client.search_url(range, self.search.per_page)?;

        let mut attempt = 1;
        loop {
            if let Err(e) = governor.ensure_hard(pages).await {
                error!("Quota check failed before walking {}: {}", range, e);
                return Err(e);
            }

            let collected = match collector.collect(&url).await {
                Ok(collected) => collected,
                Err(failure)
                    if failure.is_rate_limited() && attempt < self.search.max_range_attempts =>
                {
                    warn!("{} hit the rate limit on {}, retrying", range, failure);
                    if let AppError::RateLimitExceeded { reset_at } = failure.source {
                        governor.back_off(reset_at).await;
                    }
                    attempt += 1;
                    continue;
                }
                Err(failure) => {
                    warn!("Skipping {} after failure on {}", range, failure);
                    return Ok(RangeHarvestResult::failure(
                        range,
                        planned.total,
                        failure.to_string(),
                    ));
                }
            };

            let persisted = if collected.records.is_empty() {
                PersistStats::default()
            } else {
                self.store.upsert_batch(&collected.records).await?
            };

            info!(
                "{}: {} matches, {} pages, {} kept ({} new, {} updated), {} filtered",
                range,
                planned
                    .total
                    .map_or_else(|| "?".to_string(), |t| t.to_string()),
                collected.pages,
                collected.records.len(),
                persisted.created,
                persisted.updated,
                collected.filtered
            );

            return Ok(RangeHarvestResult::success(
                range,
                planned.total,
                collected.pages,
                collected.filtered,
                persisted,
            ));
        }
    }

    /// Plans the range at `cursor` behind a soft quota check.
    ///
    /// A rate limit refusal while probing is waited out through the governor
    /// and the same cursor is planned again; refusals never end the run.
    async fn plan_range(&self, cursor: u64) -> Result<PlannedRange, AppError> {
        let governor = RateLimitGovernor::new(&self.client, &self.quota);
        let planner = RangeSearchPlanner::new(&self.client, &self.search);

        loop {
            if let Err(e) = governor.ensure_soft().await {
                error!(
                    "Quota check failed before probing at star count {}: {}",
                    cursor, e
                );
                return Err(e);
            }

            match planner.plan(cursor, self.search.ceiling).await {
                Err(AppError::RateLimitExceeded { reset_at }) => {
                    warn!(
                        "Probing at star count {} hit the rate limit, planning again after the reset",
                        cursor
                    );
                    governor.back_off(reset_at).await;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScalarRange;
    use std::sync::atomic::{AtomicU32, Ordering};
    use crate::testing::{
        quota, MemoryStore, Reply, ScriptedQuota, SimulatedGitHub, SimulatedSearch,
    };

    fn range(low: u64, high: u64) -> ScalarRange {
        ScalarRange::new(low, high).unwrap()
    }

    fn github(search: SimulatedSearch) -> SimulatedGitHub {
        SimulatedGitHub {
            search,
            quota: ScriptedQuota::plentiful(),
        }
    }

    fn search_config(floor: u64, ceiling: u64) -> SearchConfig {
        SearchConfig {
            floor,
            ceiling,
            ..SearchConfig::default()
        }
    }

    /// The documented scenario: 1500 matches for the first candidate, 800
    /// after one shrink, then sparse ranges up to the ceiling.
    fn scenario(r: ScalarRange) -> Reply {
        if r == range(3499, 4498) {
            Reply::Total(1500)
        } else if r == range(3499, 4298) {
            Reply::Total(800)
        } else {
            Reply::Total(r.width() / 10)
        }
    }

    #[tokio::test]
    async fn test_first_iteration_of_scenario() {
        let search = SimulatedSearch::new(1000, scenario).with_archived_every(50);
        let service = HarvestService::new(
            github(search),
            MemoryStore::default(),
            search_config(3499, 6000),
            QuotaConfig::default(),
        )
        .unwrap();

        let first = service.harvest_range(3499).await.unwrap();

        assert_eq!(first.range, range(3499, 4298));
        assert_eq!(first.total, Some(800));
        assert_eq!(first.pages, 8);
        assert_eq!(first.collected + first.filtered, 800);
        assert_eq!(first.filtered, 16);
        assert_eq!(first.range.high + 1, 4299);

        let search = &service.client().search;
        assert_eq!(search.probe_requests().len(), 2);
        assert_eq!(search.page_requests().len(), 8);
        assert_eq!(service.store().len(), 784);
    }

    #[tokio::test]
    async fn test_full_scenario_run() {
        let service = HarvestService::new(
            github(SimulatedSearch::new(1000, scenario)),
            MemoryStore::default(),
            search_config(3499, 6000),
            QuotaConfig::default(),
        )
        .unwrap();

        let summary = service.run().await;

        assert!(summary.is_success());
        let ranges: Vec<ScalarRange> = summary.results.iter().map(|r| r.range).collect();
        assert_eq!(
            ranges,
            vec![range(3499, 4298), range(4299, 5298), range(5299, 6000)]
        );
        // 800 + 100 + 70
        assert_eq!(summary.total_collected(), 970);
        assert_eq!(service.store().len(), 970);
        assert_eq!(service.store().batches(), 3);
        let first = service.store().get(3499 * 10_000).unwrap();
        assert_eq!(first.stargazers_count, 3499);
    }

    #[tokio::test]
    async fn test_run_covers_domain_under_skew() {
        let skewed = |r: ScalarRange| {
            Reply::Total((r.low..=r.high).map(|s| 400_000 / (s * s + 1)).sum())
        };
        let service = HarvestService::new(
            github(SimulatedSearch::new(1000, skewed)),
            MemoryStore::default(),
            search_config(0, 20_000),
            QuotaConfig::default(),
        )
        .unwrap();

        let plans = service.plan_all().await.unwrap();

        assert_eq!(plans.first().unwrap().range.low, 0);
        assert_eq!(plans.last().unwrap().range.high, 20_000);
        for pair in plans.windows(2) {
            assert_eq!(pair[0].range.high + 1, pair[1].range.low);
        }
        // Nothing is collected on a dry run.
        assert!(service.client().search.page_requests().is_empty());
        assert_eq!(service.store().batches(), 0);
    }

    #[tokio::test]
    async fn test_failed_page_skips_range_and_continues() {
        let search = SimulatedSearch::new(1000, |r| Reply::Total(r.width() / 4));
        // Page 2 only exists for the 250-item ranges; the first walk fails there.
        search.fail_page_once(2);
        let service = HarvestService::new(
            github(search),
            MemoryStore::default(),
            search_config(0, 1999),
            QuotaConfig::default(),
        )
        .unwrap();

        let summary = service.run().await;

        assert_eq!(summary.results.len(), 2);
        assert!(!summary.results[0].is_success());
        assert!(summary.results[0]
            .error
            .as_deref()
            .unwrap()
            .starts_with("page 2"));
        assert!(summary.results[1].is_success());
        assert_eq!(summary.total_collected(), 250);
        assert_eq!(service.store().len(), 250);
        assert!(summary.fatal_error.is_none());
        assert!(!summary.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_walk_is_retried() {
        let search = SimulatedSearch::new(1000, |_| Reply::Total(150));
        search.rate_limit_page_once(2);
        let service = HarvestService::new(
            github(search),
            MemoryStore::default(),
            search_config(0, 999),
            QuotaConfig::default(),
        )
        .unwrap();

        let summary = service.run().await;

        assert!(summary.is_success());
        assert_eq!(summary.total_collected(), 150);
        // Two pages with the second refused, then the full walk again.
        assert_eq!(service.client().search.page_requests().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_planning_is_waited_out() {
        let calls = AtomicU32::new(0);
        let search = SimulatedSearch::new(1000, move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                Reply::RateLimited
            } else {
                Reply::Total(10)
            }
        });
        let service = HarvestService::new(
            github(search),
            MemoryStore::default(),
            search_config(0, 4999),
            QuotaConfig::default(),
        )
        .unwrap();

        let started = tokio::time::Instant::now();
        let summary = service.run().await;

        assert!(summary.is_success());
        assert!(summary.fatal_error.is_none());
        assert_eq!(summary.results.len(), 5);
        assert_eq!(summary.results[0].range, range(0, 999));
        assert_eq!(summary.total_collected(), 50);
        // Three refused counts, then one accepted count per range.
        assert_eq!(service.client().search.probe_requests().len(), 8);
        assert!(started.elapsed() >= std::time::Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_quota_failure_records_resume_point() {
        let client = SimulatedGitHub {
            search: SimulatedSearch::new(1000, |_| Reply::Total(10)),
            // Soft and hard checks for the first range, then the soft check
            // for the second range succeed.
            quota: ScriptedQuota::failing_from_call(4),
        };
        let service = HarvestService::new(
            client,
            MemoryStore::default(),
            search_config(0, 4999),
            QuotaConfig::default(),
        )
        .unwrap();

        let summary = service.run().await;

        assert_eq!(summary.results.len(), 1);
        assert_eq!(summary.resume_from, Some(1000));
        assert!(summary
            .fatal_error
            .as_deref()
            .unwrap()
            .contains("HTTP 502"));
        assert_eq!(service.store().len(), 10);
        assert_eq!(service.client().search.probe_requests().len(), 2);
        assert_eq!(service.client().search.page_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_persistence_failure_is_fatal() {
        let service = HarvestService::new(
            github(SimulatedSearch::uniform(1000, 1)),
            MemoryStore::failing_on_batch(2),
            search_config(0, 4999),
            QuotaConfig::default(),
        )
        .unwrap();

        let summary = service.run().await;

        assert_eq!(summary.results.len(), 1);
        assert_eq!(summary.resume_from, Some(1000));
        assert!(summary
            .fatal_error
            .as_deref()
            .unwrap()
            .contains("Database error"));
        // The first range survives the later failure.
        assert_eq!(service.store().len(), 1000);
        assert!(!summary.is_success());
    }

    #[tokio::test]
    async fn test_probe_exhaustion_is_fatal() {
        let search = SimulatedSearch::new(1000, |r| {
            if r.low >= 1000 {
                Reply::Error
            } else {
                Reply::Total(10)
            }
        });
        let service = HarvestService::new(
            github(search),
            MemoryStore::default(),
            search_config(0, 5000),
            QuotaConfig::default(),
        )
        .unwrap();

        let summary = service.run().await;

        assert_eq!(summary.results.len(), 1);
        assert_eq!(summary.resume_from, Some(1000));
        assert!(summary
            .fatal_error
            .as_deref()
            .unwrap()
            .contains("Probe failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_quota_before_probing() {
        let client = SimulatedGitHub {
            search: SimulatedSearch::uniform(1000, 0),
            quota: ScriptedQuota::new(vec![quota(30, 2, 30), quota(30, 30, 60)]),
        };
        let service = HarvestService::new(
            client,
            MemoryStore::default(),
            search_config(0, 999),
            QuotaConfig::default(),
        )
        .unwrap();

        let started = tokio::time::Instant::now();
        let summary = service.run().await;

        assert!(summary.is_success());
        assert!(started.elapsed() >= std::time::Duration::from_secs(30));
        // soft check (twice, with the wait) then the hard check
        assert_eq!(service.client().quota.calls(), 3);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = HarvestService::new(
            github(SimulatedSearch::uniform(1000, 0)),
            MemoryStore::default(),
            search_config(10, 5),
            QuotaConfig::default(),
        );
        assert!(matches!(result, Err(AppError::InvalidConfig(_))));
    }
}
