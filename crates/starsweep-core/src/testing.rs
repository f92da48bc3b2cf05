//! In-memory stand-ins for the search endpoint, quota endpoint and store.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Mutex;

use chrono::{Duration as ChronoDuration, Utc};

use crate::error::AppError;
use crate::link::LinkRelation;
use crate::models::{NewRepo, QuotaState, RawRepository, ScalarRange};
use crate::stats::{PersistStats, UpsertOutcome};
use crate::traits::{QuotaSource, RepoStore, SearchClient, SearchPage};

/// What the simulated endpoint answers for a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Total(u64),
    /// Response without a `total_count`.
    Missing,
    /// Transport failure.
    Error,
    RateLimited,
}

type TotalFn = Box<dyn Fn(ScalarRange) -> Reply + Send + Sync>;

/// Search endpoint serving `sim://search?low=..&high=..&per_page=..&page=..` URLs.
///
/// Serves at most `cap` items per range, like GitHub. Every `archived_every`-th
/// item is archived so filtering is exercised.
pub struct SimulatedSearch {
    totals: TotalFn,
    cap: u64,
    archived_every: Option<u64>,
    failing_pages: Mutex<HashSet<u32>>,
    rate_limited_pages: Mutex<HashSet<u32>>,
    requests: Mutex<Vec<String>>,
}

impl SimulatedSearch {
    pub fn new(cap: u64, totals: impl Fn(ScalarRange) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            totals: Box::new(totals),
            cap,
            archived_every: None,
            failing_pages: Mutex::new(HashSet::new()),
            rate_limited_pages: Mutex::new(HashSet::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Endpoint where every star count holds `per_star` repositories.
    pub fn uniform(cap: u64, per_star: u64) -> Self {
        Self::new(cap, move |range| Reply::Total(range.width().saturating_mul(per_star)))
    }

    pub fn with_archived_every(mut self, n: u64) -> Self {
        self.archived_every = Some(n);
        self
    }

    /// Makes the next request for `page` fail once.
    pub fn fail_page_once(&self, page: u32) {
        self.failing_pages.lock().unwrap().insert(page);
    }

    /// Makes the next request for `page` hit the rate limit once.
    pub fn rate_limit_page_once(&self, page: u32) {
        self.rate_limited_pages.lock().unwrap().insert(page);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests that walked pages (as opposed to count-only probes).
    pub fn page_requests(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|url| !url.contains("per_page=1&"))
            .collect()
    }

    pub fn probe_requests(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|url| url.contains("per_page=1&"))
            .collect()
    }

    fn url(range: ScalarRange, per_page: u32, page: u32) -> String {
        format!(
            "sim://search?low={}&high={}&per_page={}&page={}",
            range.low, range.high, per_page, page
        )
    }

    fn item(range: ScalarRange, index: u64, archived: bool) -> RawRepository {
        let id = (range.low as i64) * 10_000 + index as i64;
        RawRepository {
            id,
            full_name: format!("owner/repo-{}", id),
            html_url: format!("https://github.com/owner/repo-{}", id),
            description: Some(format!("Repository {}", id)),
            language: Some("Rust".to_string()),
            archived,
            disabled: false,
            visibility: Some("public".to_string()),
            forks_count: 1,
            stargazers_count: range.low as i64,
            watchers_count: range.low as i64,
            open_issues_count: 0,
            topics: vec!["simulated".to_string()],
            contributors_url: format!("https://api.github.com/repos/owner/repo-{}/contributors", id),
        }
    }
}

fn query_param(url: &str, name: &str) -> u64 {
    url.split_once('?')
        .map(|(_, query)| query)
        .unwrap_or_default()
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .and_then(|(_, value)| value.parse().ok())
        .unwrap_or_else(|| panic!("missing {} in {}", name, url))
}

impl SearchClient for SimulatedSearch {
    fn search_url(&self, range: ScalarRange, per_page: u32) -> Result<String, AppError> {
        Ok(Self::url(range, per_page, 1))
    }

    async fn fetch_page(&self, url: &str) -> Result<SearchPage, AppError> {
        self.requests.lock().unwrap().push(url.to_string());

        let range = ScalarRange::new(query_param(url, "low"), query_param(url, "high"))
            .expect("simulated range");
        let per_page = query_param(url, "per_page") as u32;
        let page = query_param(url, "page") as u32;

        if self.failing_pages.lock().unwrap().remove(&page) {
            return Err(AppError::ClientError(format!("HTTP 502 from {}", url)));
        }
        if self.rate_limited_pages.lock().unwrap().remove(&page) {
            return Err(AppError::RateLimitExceeded { reset_at: None });
        }

        let total = match (self.totals)(range) {
            Reply::Total(total) => total,
            Reply::Missing => return Ok(SearchPage::default()),
            Reply::Error => return Err(AppError::ClientError("HTTP 500".to_string())),
            Reply::RateLimited => return Err(AppError::RateLimitExceeded { reset_at: None }),
        };

        let served = total.min(self.cap);
        let start = u64::from(page - 1) * u64::from(per_page);
        let end = (start + u64::from(per_page)).min(served);
        let items = (start..end)
            .map(|index| {
                let archived = self
                    .archived_every
                    .is_some_and(|n| (index + 1) % n == 0);
                Self::item(range, index, archived)
            })
            .collect();

        let mut links = Vec::new();
        if end < served {
            links.push(LinkRelation {
                relation: "next".to_string(),
                url: Self::url(range, per_page, page + 1),
            });
        }

        Ok(SearchPage {
            total_count: Some(total),
            items,
            links,
        })
    }
}

/// Quota endpoint replaying scripted states; the last state repeats.
pub struct ScriptedQuota {
    states: Mutex<VecDeque<QuotaState>>,
    calls: Mutex<u32>,
    fail_from_call: Option<u32>,
}

impl ScriptedQuota {
    pub fn new(states: Vec<QuotaState>) -> Self {
        Self {
            states: Mutex::new(states.into()),
            calls: Mutex::new(0),
            fail_from_call: None,
        }
    }

    /// A quota that never runs out.
    pub fn plentiful() -> Self {
        Self::new(vec![quota(30, 30, 60)])
    }

    /// A plentiful quota whose endpoint fails from the `n`-th call (1-based).
    pub fn failing_from_call(n: u32) -> Self {
        Self {
            fail_from_call: Some(n),
            ..Self::plentiful()
        }
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

impl QuotaSource for ScriptedQuota {
    async fn fetch_quota(&self) -> Result<QuotaState, AppError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if self.fail_from_call.is_some_and(|n| call >= n) {
            return Err(AppError::ClientError(
                "HTTP 502 from sim://rate_limit".to_string(),
            ));
        }

        let mut states = self.states.lock().unwrap();
        let state = if states.len() > 1 {
            states.pop_front()
        } else {
            states.front().copied()
        };
        state.ok_or_else(|| AppError::ClientError("quota endpoint unavailable".to_string()))
    }
}

/// Builds a quota state resetting `reset_in_secs` from now.
pub fn quota(limit: u32, remaining: u32, reset_in_secs: i64) -> QuotaState {
    QuotaState {
        limit,
        remaining,
        reset_at: Utc::now() + ChronoDuration::seconds(reset_in_secs),
    }
}

/// Search and quota endpoints behind one handle, like the real client.
pub struct SimulatedGitHub {
    pub search: SimulatedSearch,
    pub quota: ScriptedQuota,
}

impl SearchClient for SimulatedGitHub {
    fn search_url(&self, range: ScalarRange, per_page: u32) -> Result<String, AppError> {
        self.search.search_url(range, per_page)
    }

    async fn fetch_page(&self, url: &str) -> Result<SearchPage, AppError> {
        self.search.fetch_page(url).await
    }
}

impl QuotaSource for SimulatedGitHub {
    async fn fetch_quota(&self) -> Result<QuotaState, AppError> {
        self.quota.fetch_quota().await
    }
}

/// Store keyed by GitHub id, with optional failure injection.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<i64, NewRepo>>,
    batches: Mutex<usize>,
    fail_on_batch: Option<usize>,
}

impl MemoryStore {
    /// Store whose `n`-th batch (1-based) fails.
    pub fn failing_on_batch(n: usize) -> Self {
        Self {
            fail_on_batch: Some(n),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn get(&self, github_id: i64) -> Option<NewRepo> {
        self.rows.lock().unwrap().get(&github_id).cloned()
    }

    pub fn batches(&self) -> usize {
        *self.batches.lock().unwrap()
    }
}

impl RepoStore for MemoryStore {
    async fn upsert_batch(&self, records: &[NewRepo]) -> Result<PersistStats, AppError> {
        let batch = {
            let mut batches = self.batches.lock().unwrap();
            *batches += 1;
            *batches
        };
        if self.fail_on_batch == Some(batch) {
            return Err(AppError::DatabaseError(sqlx::Error::PoolTimedOut));
        }

        let mut rows = self.rows.lock().unwrap();
        let mut stats = PersistStats::new();
        for record in records {
            let outcome = match rows.insert(record.github_id, record.clone()) {
                Some(_) => UpsertOutcome::Updated,
                None => UpsertOutcome::Created,
            };
            stats.record(outcome);
        }
        Ok(stats)
    }
}
