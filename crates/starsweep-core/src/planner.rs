//! Range sizing by shrink-and-retry probing.
//!
//! The search API only serves the first `result_cap` matches of any query, so
//! every range we walk must report a total at or below the cap. The star
//! distribution is unknown and heavily skewed, so the width is discovered
//! online: start wide, shrink by a fixed decrement while the probe total is
//! too large.

use tracing::{debug, warn};

use crate::config::SearchConfig;
use crate::error::AppError;
use crate::models::ScalarRange;
use crate::traits::SearchClient;

/// Why the planner stopped shrinking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// The probe total is at or below the cap.
    WithinCap,
    /// Shrinking no longer moves the high bound because it sits on the ceiling.
    PinnedAtCeiling,
    /// The step cannot shrink again without reaching zero.
    StepExhausted,
}

/// A range accepted by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedRange {
    pub range: ScalarRange,
    /// Total reported by the last probe of `range`.
    pub total: Option<u64>,
    /// Probe requests issued to find it.
    pub probes: u32,
    pub acceptance: Acceptance,
}

impl PlannedRange {
    /// Where the next range starts, or `None` past `u64::MAX`.
    pub fn next_cursor(&self) -> Option<u64> {
        self.range.high.checked_add(1)
    }
}

enum Shrink {
    To(u64),
    Stuck(Acceptance),
}

/// Finds the widest range starting at a cursor whose total fits the result cap.
pub struct RangeSearchPlanner<'a, C> {
    client: &'a C,
    config: &'a SearchConfig,
}

impl<'a, C: SearchClient> RangeSearchPlanner<'a, C> {
    pub fn new(client: &'a C, config: &'a SearchConfig) -> Self {
        Self { client, config }
    }

    /// Plans the range starting at `cursor`, never extending past `ceiling`.
    ///
    /// Probe failures and responses without a total count as "still too
    /// large" and never lead to acceptance; once an unshrinkable range fails
    /// to probe it is probed again. More than `max_probe_failures` failures
    /// yield [`AppError::ProbeRetriesExhausted`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::RateLimitExceeded` immediately when a probe hits the
    /// rate limit, so the caller can wait for the quota to reset.
    pub async fn plan(&self, cursor: u64, ceiling: u64) -> Result<PlannedRange, AppError> {
        if cursor > ceiling {
            return Err(AppError::Generic(format!(
                "cursor {} is past ceiling {}",
                cursor, ceiling
            )));
        }

        let mut step = self.config.initial_step.max(1);
        let mut probes = 0u32;
        let mut failures = 0u32;

        loop {
            let range = candidate(cursor, step, ceiling);
            probes += 1;

            let total = match self.probe(range).await {
                Ok(Some(total)) if total <= self.config.result_cap => {
                    debug!("Probe {} reported {} matches, accepted", range, total);
                    return Ok(PlannedRange {
                        range,
                        total: Some(total),
                        probes,
                        acceptance: Acceptance::WithinCap,
                    });
                }
                Ok(Some(total)) => {
                    debug!("Probe {} reported {} matches, over cap", range, total);
                    Some(total)
                }
                Ok(None) => {
                    failures += 1;
                    warn!("Probe {} returned no total count", range);
                    None
                }
                Err(e @ AppError::RateLimitExceeded { .. }) => return Err(e),
                Err(e) => {
                    failures += 1;
                    warn!("Probe {} failed: {}", range, e);
                    None
                }
            };

            if total.is_none() && failures > self.config.max_probe_failures {
                return Err(AppError::ProbeRetriesExhausted {
                    range,
                    attempts: failures,
                });
            }

            match self.shrink(cursor, step, ceiling, range) {
                Shrink::To(next) => step = next,
                Shrink::Stuck(acceptance) => {
                    if let Some(total) = total {
                        warn!(
                            "Accepting {} with {} matches over the {} cap ({:?}); only the first {} are reachable",
                            range, total, self.config.result_cap, acceptance, self.config.result_cap
                        );
                        return Ok(PlannedRange {
                            range,
                            total: Some(total),
                            probes,
                            acceptance,
                        });
                    }
                }
            }
        }
    }

    fn shrink(&self, cursor: u64, step: u64, ceiling: u64, current: ScalarRange) -> Shrink {
        if step <= self.config.step_decrement {
            return Shrink::Stuck(Acceptance::StepExhausted);
        }
        let next = step - self.config.step_decrement;
        if candidate(cursor, next, ceiling).high == current.high {
            return Shrink::Stuck(Acceptance::PinnedAtCeiling);
        }
        Shrink::To(next)
    }

    /// Issues a count-only search for `range`.
    async fn probe(&self, range: ScalarRange) -> Result<Option<u64>, AppError> {
        let url = self
            .client
            .search_url(range, self.config.probe_page_size)?;
        let page = self.client.fetch_page(&url).await?;
        Ok(page.total_count)
    }
}

/// `[cursor, min(ceiling, cursor + step - 1)]`.
fn candidate(cursor: u64, step: u64, ceiling: u64) -> ScalarRange {
    let high = cursor.saturating_add(step.max(1) - 1).min(ceiling);
    ScalarRange {
        low: cursor,
        high: high.max(cursor),
    }
}
