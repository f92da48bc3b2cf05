use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::ScalarRange;

/// Application-wide error types.
///
/// This enum represents all possible errors that can occur while planning,
/// collecting and persisting a star-range harvest. It uses the `thiserror`
/// crate for ergonomic error handling and automatic conversion from
/// underlying library errors.
///
/// # Error Conversion
///
/// Some errors automatically convert from their source types using the `#[from]` attribute:
/// - `sqlx::Error` → `AppError::DatabaseError`
/// - `serde_json::Error` → `AppError::SerializationError`
///
/// # Examples
///
/// ```no_run
/// use starsweep_core::error::AppError;
///
/// fn example() -> Result<(), AppError> {
///     Err(AppError::Generic("Something went wrong".to_string()))
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Database operation failed.
    ///
    /// Wraps all errors from SQLx database operations, including connection
    /// failures, query errors and constraint violations. Always fatal for a
    /// harvest run: dropping collected data silently is worse than aborting.
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// HTTP request failed or returned a non-success status.
    #[error("API Client error: {0}")]
    ClientError(String),

    /// JSON serialization or deserialization failed.
    ///
    /// Typically raised when a search or rate limit response body does not
    /// match the expected shape.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Network or connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// The API refused the request because the rate limit budget is spent.
    ///
    /// Should not happen when the quota governor is consulted before each
    /// burst, but another consumer of the same token can still drain it.
    #[error("Rate limit exceeded{}", reset_suffix(.reset_at))]
    RateLimitExceeded { reset_at: Option<DateTime<Utc>> },

    /// The planner could not obtain a usable total count for a range.
    #[error("Probe failed {attempts} times for range {range}")]
    ProbeRetriesExhausted { range: ScalarRange, attempts: u32 },

    /// Configuration values are inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be read or parsed.
    #[error("Config file error: {0}")]
    ConfigFile(String),

    /// Generic application error for cases not covered by specific variants.
    ///
    /// Use this sparingly - prefer creating specific error variants
    /// for better error handling and debugging.
    #[error("Error: {0}")]
    Generic(String),
}

fn reset_suffix(reset_at: &Option<DateTime<Utc>>) -> String {
    match reset_at {
        Some(at) => format!(" (resets at {})", at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => String::new(),
    }
}

impl AppError {
    /// Returns a user-friendly error message suitable for CLI output.
    pub fn user_message(&self) -> String {
        match self {
            AppError::DatabaseError(e) => {
                if e.to_string().contains("connection") {
                    "Cannot connect to database. Is PostgreSQL running?\n   Check DATABASE_URL."
                        .to_string()
                } else {
                    format!("Database error: {}", e)
                }
            }
            AppError::ClientError(msg) => {
                if msg.contains("401") || msg.contains("Bad credentials") {
                    "GitHub rejected the token.\n   Check your GITHUB_TOKEN environment variable."
                        .to_string()
                } else if msg.contains("422") {
                    format!(
                        "GitHub rejected the search query: {}\n   Check the configured range bounds.",
                        msg
                    )
                } else {
                    format!("API error: {}", msg)
                }
            }
            AppError::NetworkError(msg) => {
                format!("Network error: {}\n   Check your internet connection.", msg)
            }
            AppError::Timeout(secs) => {
                format!(
                    "Request timed out after {} seconds.\n   GitHub may be slow. Try again later.",
                    secs
                )
            }
            AppError::RateLimitExceeded { .. } => format!(
                "{}.\n   Another process may be using the same token.",
                self
            ),
            AppError::ProbeRetriesExhausted { range, attempts } => format!(
                "Could not size range {} after {} attempts.\n   Resume later with --floor {}.",
                range, attempts, range.low
            ),
            _ => self.to_string(),
        }
    }

    /// Returns true for request or response failures (the transport error class).
    ///
    /// # Examples
    ///
    /// ```
    /// use starsweep_core::error::AppError;
    ///
    /// assert!(AppError::Timeout(30).is_transport());
    /// assert!(!AppError::InvalidConfig("cap".to_string()).is_transport());
    /// ```
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AppError::ClientError(_)
                | AppError::NetworkError(_)
                | AppError::Timeout(_)
                | AppError::SerializationError(_)
                | AppError::InvalidUrl(_)
        )
    }
}
