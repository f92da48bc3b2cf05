//! Configuration types for Starsweep components.
//!
//! Values are layered: compiled defaults, then an optional TOML file
//! (see [`load_config`]), then environment variables and CLI flags applied by
//! the binary.
//!
//! ```toml
//! [search]
//! floor = 3499
//! ceiling = 6000
//! initial_step = 1000
//! step_decrement = 200
//!
//! [quota]
//! soft_minimum = 12
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;

/// Hard limit GitHub places on `per_page` for search requests.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Database connection pool configuration.
pub struct DbConfig {
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self { max_connections: 5 }
    }
}

/// HTTP client configuration for GitHub API calls.
pub struct HttpConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("starsweep/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Tunables of the range-partitioning search.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Maximum total a single range query may report.
    pub result_cap: u64,
    /// Items per page when walking a range.
    pub per_page: u32,
    /// Items per page for count-only probes.
    pub probe_page_size: u32,
    /// Width of the first candidate range at each cursor position.
    pub initial_step: u64,
    /// Amount the step shrinks by after an oversized probe.
    pub step_decrement: u64,
    /// Lowest star count to harvest.
    pub floor: u64,
    /// Highest star count to harvest.
    pub ceiling: u64,
    /// Failed or countless probes tolerated while planning one range.
    pub max_probe_failures: u32,
    /// Collection attempts per range when the API reports an exhausted quota.
    pub max_range_attempts: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            result_cap: 1000,
            per_page: MAX_PAGE_SIZE,
            probe_page_size: 1,
            initial_step: 1000,
            step_decrement: 200,
            floor: 100,
            ceiling: 500_000,
            max_probe_failures: 5,
            max_range_attempts: 2,
        }
    }
}

impl SearchConfig {
    /// Checks cross-field constraints.
    ///
    /// # Examples
    ///
    /// ```
    /// use starsweep_core::SearchConfig;
    ///
    /// let config = SearchConfig { floor: 10, ceiling: 5, ..SearchConfig::default() };
    /// assert!(config.validate().is_err());
    /// assert!(SearchConfig::default().validate().is_ok());
    /// ```
    pub fn validate(&self) -> Result<(), AppError> {
        if self.floor > self.ceiling {
            return Err(AppError::InvalidConfig(format!(
                "floor ({}) is above ceiling ({})",
                self.floor, self.ceiling
            )));
        }
        if self.result_cap == 0 {
            return Err(AppError::InvalidConfig(
                "result_cap must be positive".to_string(),
            ));
        }
        if self.initial_step == 0 || self.step_decrement == 0 {
            return Err(AppError::InvalidConfig(
                "initial_step and step_decrement must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("per_page", self.per_page),
            ("probe_page_size", self.probe_page_size),
        ] {
            if value == 0 || value > MAX_PAGE_SIZE {
                return Err(AppError::InvalidConfig(format!(
                    "{} must be between 1 and {}, got {}",
                    name, MAX_PAGE_SIZE, value
                )));
            }
        }
        if self.max_range_attempts == 0 {
            return Err(AppError::InvalidConfig(
                "max_range_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Upper bound on pages walked for one range.
    ///
    /// The search API never serves more than `result_cap` items, so a server
    /// that keeps returning `next` links past this is misbehaving.
    pub fn max_pages(&self) -> u32 {
        let pages = self.result_cap.div_ceil(u64::from(self.per_page.max(1))) + 1;
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    /// Pages a walk of a range reporting `total` matches will need.
    pub fn pages_for(&self, total: Option<u64>) -> u32 {
        let total = total.unwrap_or(self.result_cap).min(self.result_cap);
        let pages = total.div_ceil(u64::from(self.per_page.max(1)));
        u32::try_from(pages).unwrap_or(u32::MAX)
    }
}

/// Rate limit pacing thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuotaConfig {
    /// Remaining requests required before a probe burst.
    pub soft_minimum: u32,
    /// Remaining requests required before a page walk, at minimum.
    pub hard_minimum: u32,
    /// Extra seconds slept past the reported reset time.
    pub reset_grace_secs: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            soft_minimum: 12,
            hard_minimum: 1,
            reset_grace_secs: 1,
        }
    }
}

impl QuotaConfig {
    pub fn reset_grace(&self) -> Duration {
        Duration::from_secs(self.reset_grace_secs)
    }
}

/// Contents of `starsweep.toml`. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub search: SearchConfig,
    pub quota: QuotaConfig,
}

/// Default location of the configuration file, e.g. `~/.config/starsweep/starsweep.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("starsweep").join("starsweep.toml"))
}

/// Loads the configuration file.
///
/// An explicit `path` must exist. Without one the default location is tried
/// and a missing file yields the compiled defaults.
pub fn load_config(path: Option<&Path>) -> Result<FileConfig, AppError> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(FileConfig::default()),
        },
    };

    let contents = std::fs::read_to_string(&path)
        .map_err(|e| AppError::ConfigFile(format!("{}: {}", path.display(), e)))?;

    tracing::debug!("Loaded configuration from {}", path.display());
    parse_config(&contents).map_err(|e| match e {
        AppError::ConfigFile(msg) => AppError::ConfigFile(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

/// Parses TOML configuration text.
pub fn parse_config(contents: &str) -> Result<FileConfig, AppError> {
    toml::from_str(contents).map_err(|e| AppError::ConfigFile(e.to_string()))
}
