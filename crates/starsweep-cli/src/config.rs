use clap::{Args, Parser, Subcommand, ValueEnum};
use starsweep_client::DEFAULT_API_URL;
use starsweep_core::SearchConfig;
use std::path::PathBuf;

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "starsweep")]
#[command(
    author,
    version,
    about = "Catalogue public GitHub repositories by walking star-count ranges"
)]
#[command(after_help = "Examples:
  starsweep harvest --floor 3499 --ceiling 6000
  starsweep harvest --dry-run
  starsweep limits
  starsweep export --format jsonl --min-stars 1000 > repos.jsonl
  starsweep stats")]
pub struct Config {
    /// PostgreSQL database connection URL
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    pub database_url: Option<String>,

    /// GitHub token used for API requests (anonymous when unset)
    #[arg(long, env = "GITHUB_TOKEN", global = true, hide_env_values = true)]
    pub github_token: Option<String>,

    /// GitHub REST API root
    #[arg(long, env = "GITHUB_API_URL", global = true, default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Custom path to the starsweep.toml configuration file
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log debug output (probe totals, quota checks, page details)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Harvest repositories over a star range into the database
    #[command(after_help = "Examples:
  starsweep harvest                              # Defaults and config file
  starsweep harvest --floor 3499 --ceiling 6000  # Explicit range
  starsweep harvest --dry-run                    # Plan sub-ranges only")]
    Harvest {
        #[command(flatten)]
        search: SearchArgs,

        /// Plan and log every sub-range without collecting or persisting
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the current GitHub rate limit budgets
    Limits {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },
    /// Export stored repositories, most starred first
    #[command(after_help = "Examples:
  starsweep export --format jsonl > repos.jsonl
  starsweep export --format csv --min-stars 5000 --limit 100")]
    Export {
        /// Output format for exported data
        #[arg(short, long, default_value = "jsonl")]
        format: ExportFormat,
        /// Only export repositories with at least this many stars
        #[arg(long)]
        min_stars: Option<i64>,
        /// Maximum number of repositories to export
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show database statistics
    Stats,
}

/// Search overrides; each takes precedence over the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct SearchArgs {
    /// Lowest star count to harvest
    #[arg(long, env = "STARSWEEP_FLOOR")]
    pub floor: Option<u64>,

    /// Highest star count to harvest
    #[arg(long, env = "STARSWEEP_CEILING")]
    pub ceiling: Option<u64>,

    /// Maximum total a single range query may report
    #[arg(long, env = "STARSWEEP_CAP")]
    pub cap: Option<u64>,

    /// Items per page when walking a range (1-100)
    #[arg(long, env = "STARSWEEP_PER_PAGE")]
    pub per_page: Option<u32>,

    /// Width of the first candidate range
    #[arg(long, env = "STARSWEEP_INITIAL_STEP")]
    pub initial_step: Option<u64>,

    /// How much the candidate width shrinks per retry
    #[arg(long, env = "STARSWEEP_STEP_DECREMENT")]
    pub step_decrement: Option<u64>,
}

impl SearchArgs {
    /// Applies the given overrides on top of `config`.
    pub fn apply(&self, mut config: SearchConfig) -> SearchConfig {
        if let Some(floor) = self.floor {
            config.floor = floor;
        }
        if let Some(ceiling) = self.ceiling {
            config.ceiling = ceiling;
        }
        if let Some(cap) = self.cap {
            config.result_cap = cap;
        }
        if let Some(per_page) = self.per_page {
            config.per_page = per_page;
        }
        if let Some(step) = self.initial_step {
            config.initial_step = step;
        }
        if let Some(decrement) = self.step_decrement {
            config.step_decrement = decrement;
        }
        config
    }
}

/// Supported export formats
#[derive(Debug, Clone, ValueEnum)]
pub enum ExportFormat {
    /// JSON Lines format (one JSON object per line)
    Jsonl,
    /// Standard JSON array format
    Json,
    /// CSV format (comma-separated values)
    Csv,
}

/// Output format for rate limit display.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Display as a formatted table (default)
    #[default]
    Table,
    /// Display as JSON
    Json,
}
