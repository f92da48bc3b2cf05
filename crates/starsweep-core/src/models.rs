//! Domain models shared by the planner, collector and persistence layers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inclusive bounds on the star-count axis.
///
/// Always satisfies `low <= high`; construct with [`ScalarRange::new`].
///
/// # Examples
///
/// ```
/// use starsweep_core::ScalarRange;
///
/// let range = ScalarRange::new(3499, 4298).unwrap();
/// assert_eq!(range.to_string(), "stars:3499..4298");
/// assert_eq!(range.width(), 800);
/// assert!(ScalarRange::new(10, 9).is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScalarRange {
    pub low: u64,
    pub high: u64,
}

impl ScalarRange {
    pub fn new(low: u64, high: u64) -> Option<Self> {
        (low <= high).then_some(Self { low, high })
    }

    /// Number of distinct star counts covered by the range.
    pub fn width(&self) -> u64 {
        (self.high - self.low).saturating_add(1)
    }

    /// The search qualifier for this range, e.g. `stars:10..20`.
    pub fn qualifier(&self) -> String {
        format!("stars:{}..{}", self.low, self.high)
    }

    pub fn contains(&self, value: u64) -> bool {
        self.low <= value && value <= self.high
    }
}

impl fmt::Display for ScalarRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualifier())
    }
}

/// Snapshot of the search API rate limit budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaState {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// A repository item as returned by the search endpoint.
///
/// Only the fields needed for filtering and normalization are declared; the
/// rest of the (large) GitHub payload is ignored during deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRepository {
    pub id: i64,
    pub full_name: String,
    pub html_url: String,
    pub description: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub disabled: bool,
    pub visibility: Option<String>,
    #[serde(default)]
    pub forks_count: i64,
    #[serde(default)]
    pub stargazers_count: i64,
    #[serde(default)]
    pub watchers_count: i64,
    #[serde(default)]
    pub open_issues_count: i64,
    #[serde(default)]
    pub topics: Vec<String>,
    pub contributors_url: String,
}

impl RawRepository {
    /// True for repositories worth cataloguing: public, not archived, not disabled.
    ///
    /// A missing `visibility` field counts as not public.
    pub fn is_catalogable(&self) -> bool {
        !self.archived && !self.disabled && self.visibility.as_deref() == Some("public")
    }

    /// Filters and projects the item, returning `None` for excluded repositories.
    ///
    /// # Examples
    ///
    /// ```
    /// use starsweep_core::RawRepository;
    ///
    /// let raw: RawRepository = serde_json::from_str(r#"{
    ///     "id": 724712,
    ///     "full_name": "rust-lang/rust",
    ///     "html_url": "https://github.com/rust-lang/rust",
    ///     "description": "Empowering everyone to build reliable and efficient software.",
    ///     "language": "Rust",
    ///     "archived": false,
    ///     "disabled": false,
    ///     "visibility": "public",
    ///     "forks_count": 12000,
    ///     "stargazers_count": 95000,
    ///     "watchers_count": 95000,
    ///     "open_issues_count": 9000,
    ///     "topics": ["compiler", "rust"],
    ///     "contributors_url": "https://api.github.com/repos/rust-lang/rust/contributors"
    /// }"#).unwrap();
    ///
    /// let record = raw.normalize().unwrap();
    /// assert_eq!(record.github_id, 724712);
    /// assert_eq!(record.topics, vec!["compiler", "rust"]);
    /// ```
    pub fn normalize(self) -> Option<NewRepo> {
        if !self.is_catalogable() {
            return None;
        }

        Some(NewRepo {
            github_id: self.id,
            full_name: self.full_name,
            html_url: self.html_url,
            description: self.description,
            language: self.language,
            forks_count: self.forks_count,
            stargazers_count: self.stargazers_count,
            watchers_count: self.watchers_count,
            open_issues_count: self.open_issues_count,
            topics: self.topics,
            contributors_url: self.contributors_url,
        })
    }
}

/// Normalized repository ready to be upserted, keyed by `github_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRepo {
    pub github_id: i64,
    pub full_name: String,
    pub html_url: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub forks_count: i64,
    pub stargazers_count: i64,
    pub watchers_count: i64,
    pub open_issues_count: i64,
    pub topics: Vec<String>,
    pub contributors_url: String,
}

/// A stored row of the `repositories` table.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RepoRecord {
    pub id: Uuid,
    pub github_id: i64,
    pub full_name: String,
    pub html_url: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub forks_count: i64,
    pub stargazers_count: i64,
    pub watchers_count: i64,
    pub open_issues_count: i64,
    pub topics: Vec<String>,
    pub contributors_url: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

/// Aggregated statistics over the stored catalogue.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub total_repositories: i64,
    pub min_stars: Option<i64>,
    pub max_stars: Option<i64>,
    pub languages: i64,
    pub last_update: Option<DateTime<Utc>>,
}
