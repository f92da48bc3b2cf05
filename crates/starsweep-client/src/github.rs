use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use starsweep_core::config::HttpConfig;
use starsweep_core::error::AppError;
use starsweep_core::link::parse_link_header;
use starsweep_core::models::{QuotaState, RawRepository, ScalarRange};
use starsweep_core::traits::{QuotaSource, SearchClient, SearchPage};
use tracing::{debug, warn};
use url::Url;

/// Public GitHub REST API root.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// REST API version pinned through the `X-GitHub-Api-Version` header.
const API_VERSION: &str = "2022-11-28";

/// Body of `GET /search/repositories`.
///
/// GitHub reference: <https://docs.github.com/en/rest/search/search#search-repositories>
#[derive(Deserialize, Debug)]
struct SearchResponse {
    total_count: Option<u64>,
    #[serde(default)]
    incomplete_results: bool,
    #[serde(default)]
    items: Vec<RawRepository>,
}

/// Body of `GET /rate_limit`; only the resources we report on are declared.
#[derive(Deserialize, Debug)]
struct RateLimitResponse {
    resources: RateLimitResources,
}

#[derive(Deserialize, Debug)]
struct RateLimitResources {
    core: RateLimitResource,
    search: RateLimitResource,
}

#[derive(Deserialize, Debug)]
struct RateLimitResource {
    limit: u32,
    remaining: u32,
    /// Reset time as a Unix epoch.
    reset: i64,
}

impl RateLimitResource {
    fn into_quota(self) -> QuotaState {
        QuotaState {
            limit: self.limit,
            remaining: self.remaining,
            reset_at: DateTime::from_timestamp(self.reset, 0).unwrap_or_else(Utc::now),
        }
    }
}

/// Current budgets of the rate limit resources relevant to a harvest.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RateLimits {
    /// Budget for search requests (probes and page walks).
    pub search: QuotaState,
    /// Budget for the rest of the REST API.
    pub core: QuotaState,
}

/// HTTP client for the GitHub repository search and rate limit endpoints.
///
/// Requests are never retried here: the harvest decides what a failure means
/// for the range being processed.
///
/// # Examples
///
/// ```no_run
/// use starsweep_client::GitHubClient;
/// use starsweep_core::{HttpConfig, ScalarRange, SearchClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = GitHubClient::new("https://api.github.com", None, &HttpConfig::default())?;
/// let range = ScalarRange::new(100, 200).unwrap();
/// let page = client.fetch_page(&client.search_url(range, 1)?).await?;
/// println!("{:?} repositories", page.total_count);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    base_url: Url,
    timeout_secs: u64,
}

impl GitHubClient {
    /// Creates a client for the API rooted at `api_base`.
    ///
    /// `api_base` may carry a path prefix (GitHub Enterprise serves the API
    /// under `/api/v3`). Without a `token`, requests are anonymous and get
    /// much smaller rate limits.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidUrl` if `api_base` cannot be parsed.
    /// Returns `AppError::InvalidConfig` if the token is not a valid header value.
    /// Returns `AppError::ClientError` if the HTTP client cannot be built.
    pub fn new(api_base: &str, token: Option<&str>, http: &HttpConfig) -> Result<Self, AppError> {
        let normalized = format!("{}/", api_base.trim_end_matches('/'));
        let base_url = Url::parse(&normalized)
            .map_err(|_| AppError::InvalidUrl(format!("Invalid GitHub API URL: {}", api_base)))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
                AppError::InvalidConfig("GitHub token contains invalid characters".to_string())
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .user_agent(http.user_agent.as_str())
            .timeout(http.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            timeout_secs: http.timeout.as_secs(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetches the search and core budgets in one call.
    ///
    /// `GET /rate_limit` does not count against any budget.
    pub async fn fetch_rate_limits(&self) -> Result<RateLimits, AppError> {
        let url = self
            .base_url
            .join("rate_limit")
            .map_err(|e| AppError::InvalidUrl(e.to_string()))?;

        let resp = self.get(&url).await?;
        let body = resp
            .text()
            .await
            .map_err(|e| AppError::ClientError(e.to_string()))?;
        let parsed: RateLimitResponse = serde_json::from_str(&body)?;

        Ok(RateLimits {
            search: parsed.resources.search.into_quota(),
            core: parsed.resources.core.into_quota(),
        })
    }

    /// Sends a GET request, mapping transport failures and non-success
    /// statuses to `AppError`.
    async fn get(&self, url: &Url) -> Result<reqwest::Response, AppError> {
        let resp = match self.client.get(url.clone()).send().await {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => return Err(AppError::Timeout(self.timeout_secs)),
            Err(e) if e.is_connect() => {
                return Err(AppError::NetworkError(format!("Connection failed: {}", e)))
            }
            Err(e) => return Err(AppError::ClientError(e.to_string())),
        };

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        if let Some(err) = rate_limit_error(status, resp.headers(), Utc::now()) {
            warn!("GitHub refused {}: {}", url, err);
            return Err(err);
        }

        Err(AppError::ClientError(format!(
            "HTTP {} from {}",
            status.as_u16(),
            url
        )))
    }
}

/// Recognizes a rate limit refusal.
///
/// GitHub answers 403 or 429 for both the primary limit (remaining budget
/// of zero) and secondary limits (with `retry-after`). Other 403s are
/// permission errors.
fn rate_limit_error(
    status: StatusCode,
    headers: &HeaderMap,
    now: DateTime<Utc>,
) -> Option<AppError> {
    if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }

    let remaining = header(headers, "x-ratelimit-remaining").and_then(|v| v.parse::<u64>().ok());
    let retry_after = header(headers, RETRY_AFTER.as_str()).and_then(|v| v.parse::<i64>().ok());

    if remaining != Some(0) && retry_after.is_none() && status == StatusCode::FORBIDDEN {
        return None;
    }

    let reset_at = match retry_after {
        Some(secs) => Some(now + ChronoDuration::seconds(secs)),
        None => header(headers, "x-ratelimit-reset")
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|epoch| DateTime::from_timestamp(epoch, 0)),
    };

    Some(AppError::RateLimitExceeded { reset_at })
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

impl SearchClient for GitHubClient {
    fn search_url(&self, range: ScalarRange, per_page: u32) -> Result<String, AppError> {
        let mut url = self
            .base_url
            .join("search/repositories")
            .map_err(|e| AppError::InvalidUrl(e.to_string()))?;

        url.query_pairs_mut()
            .append_pair("q", &range.qualifier())
            .append_pair("per_page", &per_page.to_string());

        Ok(url.to_string())
    }

    async fn fetch_page(&self, url: &str) -> Result<SearchPage, AppError> {
        let url = Url::parse(url).map_err(|e| AppError::InvalidUrl(format!("{}: {}", url, e)))?;

        let resp = self.get(&url).await?;
        let links = resp
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .map(parse_link_header)
            .unwrap_or_default();
        let body = resp
            .text()
            .await
            .map_err(|e| AppError::ClientError(e.to_string()))?;
        let parsed: SearchResponse = serde_json::from_str(&body)?;

        if parsed.incomplete_results {
            warn!("GitHub reported incomplete results for {}", url);
        }
        debug!(
            "{}: total {:?}, {} items, {} links",
            url,
            parsed.total_count,
            parsed.items.len(),
            links.len()
        );

        Ok(SearchPage {
            total_count: parsed.total_count,
            items: parsed.items,
            links,
        })
    }
}

impl QuotaSource for GitHubClient {
    async fn fetch_quota(&self) -> Result<QuotaState, AppError> {
        Ok(self.fetch_rate_limits().await?.search)
    }
}
