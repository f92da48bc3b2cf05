//! Rate limit pacing against the live search quota.
//!
//! The quota is shared with anything else using the same token, so it is
//! re-read from the API on every consult and never estimated locally.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::QuotaConfig;
use crate::error::AppError;
use crate::models::QuotaState;
use crate::traits::QuotaSource;

/// Shortest sleep between quota consults, used when the reset time has passed
/// but the API still reports a low budget.
pub const MIN_WAIT: Duration = Duration::from_secs(1);

/// Suspends callers until the search quota allows the next burst.
pub struct RateLimitGovernor<'a, Q> {
    source: &'a Q,
    config: &'a QuotaConfig,
}

impl<'a, Q: QuotaSource> RateLimitGovernor<'a, Q> {
    pub fn new(source: &'a Q, config: &'a QuotaConfig) -> Self {
        Self { source, config }
    }

    /// Returns once at least `minimum_remaining` requests are available,
    /// sleeping until the window resets as often as needed.
    ///
    /// The requirement is clamped to the window's limit so it can always be met.
    pub async fn ensure_quota(&self, minimum_remaining: u32) -> Result<(), AppError> {
        loop {
            let quota = self.source.fetch_quota().await?;
            let needed = minimum_remaining.min(quota.limit);

            if quota.remaining >= needed {
                debug!(
                    "Search quota {}/{} (need {})",
                    quota.remaining, quota.limit, needed
                );
                return Ok(());
            }

            let wait = wait_duration(&quota, Utc::now(), self.config.reset_grace());
            warn!(
                "Search quota at {}/{} (need {}), sleeping {}s until reset",
                quota.remaining,
                quota.limit,
                needed,
                wait.as_secs()
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Check before cheap probe bursts: proceed unless critically low.
    pub async fn ensure_soft(&self) -> Result<(), AppError> {
        self.ensure_quota(self.config.soft_minimum).await
    }

    /// Check before walking `pages` pages of a range.
    pub async fn ensure_hard(&self, pages: u32) -> Result<(), AppError> {
        self.ensure_quota(self.config.hard_minimum.max(pages)).await
    }

    /// Sleeps after the API refused a request for lack of quota.
    ///
    /// Uses the reset time from the refusal when present; the caller re-checks
    /// the live quota afterwards.
    pub async fn back_off(&self, reset_at: Option<DateTime<Utc>>) {
        let wait = match reset_at {
            Some(reset_at) => {
                let snapshot = QuotaState {
                    limit: 0,
                    remaining: 0,
                    reset_at,
                };
                wait_duration(&snapshot, Utc::now(), self.config.reset_grace())
            }
            None => MIN_WAIT,
        };
        warn!("Rate limited by the API, backing off {}s", wait.as_secs());
        tokio::time::sleep(wait).await;
    }
}

/// Time to sleep until `quota` resets, as seen at `now`.
///
/// Reset timestamps have one-second resolution, so the remaining time is
/// rounded up to whole seconds before adding `grace`. Never shorter than
/// [`MIN_WAIT`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use chrono::{TimeZone, Utc};
/// use starsweep_core::governor::wait_duration;
/// use starsweep_core::QuotaState;
///
/// let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
/// let quota = QuotaState {
///     limit: 30,
///     remaining: 0,
///     reset_at: now + chrono::Duration::milliseconds(4_200),
/// };
/// assert_eq!(wait_duration(&quota, now, Duration::ZERO), Duration::from_secs(5));
/// ```
pub fn wait_duration(quota: &QuotaState, now: DateTime<Utc>, grace: Duration) -> Duration {
    let millis = (quota.reset_at - now).num_milliseconds();
    let secs = if millis <= 0 {
        0
    } else {
        (millis as u64).div_ceil(1000)
    };
    (Duration::from_secs(secs) + grace).max(MIN_WAIT)
}
