//! Page walking for a single planned range.

use thiserror::Error;
use tracing::debug;

use crate::error::AppError;
use crate::link::next_link;
use crate::models::NewRepo;
use crate::traits::SearchClient;

/// Everything collected from one range.
#[derive(Debug, Clone, Default)]
pub struct Collected {
    /// Normalized records in page order.
    pub records: Vec<NewRepo>,
    pub pages: u32,
    /// Items dropped as archived, disabled or non-public.
    pub filtered: usize,
}

/// A page request that failed; nothing collected before it is kept.
#[derive(Error, Debug)]
#[error("page {page} ({url}): {source}")]
pub struct CollectError {
    pub page: u32,
    pub url: String,
    pub source: AppError,
}

impl CollectError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self.source, AppError::RateLimitExceeded { .. })
    }
}

/// Walks every page of a search by following `rel="next"` links.
pub struct PaginatedCollector<'a, C> {
    client: &'a C,
    max_pages: u32,
}

impl<'a, C: SearchClient> PaginatedCollector<'a, C> {
    /// `max_pages` bounds the walk in case the server never stops linking.
    pub fn new(client: &'a C, max_pages: u32) -> Self {
        Self {
            client,
            max_pages: max_pages.max(1),
        }
    }

    /// Fetches `initial_url` and every page linked from it.
    ///
    /// All-or-nothing: the first failing page discards everything gathered
    /// so far for this range.
    pub async fn collect(&self, initial_url: &str) -> Result<Collected, CollectError> {
        let mut collected = Collected::default();
        let mut url = initial_url.to_string();

        loop {
            let page_number = collected.pages + 1;
            let page = match self.client.fetch_page(&url).await {
                Ok(page) => page,
                Err(source) => {
                    return Err(CollectError {
                        page: page_number,
                        url,
                        source,
                    })
                }
            };
            collected.pages = page_number;

            let received = page.items.len();
            let before = collected.records.len();
            for item in page.items {
                match item.normalize() {
                    Some(record) => collected.records.push(record),
                    None => collected.filtered += 1,
                }
            }
            debug!(
                "Page {}: {} items, {} kept",
                page_number,
                received,
                collected.records.len() - before
            );

            let Some(next) = next_link(&page.links) else {
                break;
            };
            if page_number >= self.max_pages {
                return Err(CollectError {
                    page: page_number + 1,
                    url: next.to_string(),
                    source: AppError::ClientError(format!(
                        "pagination did not end after {} pages",
                        self.max_pages
                    )),
                });
            }
            url = next.to_string();
        }

        Ok(collected)
    }
}
