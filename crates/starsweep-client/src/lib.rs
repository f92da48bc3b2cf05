//! Starsweep Client - HTTP client for the GitHub REST API
//!
//! This crate provides [`GitHubClient`], which implements the
//! [`SearchClient`](starsweep_core::SearchClient) and
//! [`QuotaSource`](starsweep_core::QuotaSource) seams of `starsweep-core`
//! against:
//!
//! - `GET /search/repositories` - star-range searches, paginated through
//!   `Link` headers
//! - `GET /rate_limit` - the live search and core budgets
//!
//! The client does not retry; rate limit refusals surface as
//! `AppError::RateLimitExceeded` carrying the reset time.

pub mod github;

pub use github::{GitHubClient, RateLimits, DEFAULT_API_URL};
