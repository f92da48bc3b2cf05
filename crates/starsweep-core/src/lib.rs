//! Starsweep Core - Domain types, range planning, pagination and quota pacing.

pub mod collector;
pub mod config;
pub mod error;
pub mod governor;
pub mod harvest;
pub mod link;
pub mod models;
pub mod planner;
pub mod stats;
pub mod traits;

#[cfg(test)]
mod testing;

pub use collector::{CollectError, Collected, PaginatedCollector};
pub use config::{
    default_config_path, load_config, parse_config, DbConfig, FileConfig, HttpConfig,
    QuotaConfig, SearchConfig, MAX_PAGE_SIZE,
};
pub use error::AppError;
pub use governor::RateLimitGovernor;
pub use harvest::HarvestService;
pub use link::{next_link, parse_link_header, LinkRelation};
pub use models::{DatabaseStats, NewRepo, QuotaState, RawRepository, RepoRecord, ScalarRange};
pub use planner::{Acceptance, PlannedRange, RangeSearchPlanner};
pub use stats::{HarvestSummary, PersistStats, RangeHarvestResult, UpsertOutcome};
pub use traits::{QuotaSource, RepoStore, SearchClient, SearchPage};
