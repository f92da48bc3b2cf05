use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use starsweep::{Command, Config, ExportFormat, OutputFormat, SearchArgs};
use starsweep_client::{GitHubClient, RateLimits};
use starsweep_core::{
    load_config, AppError, DbConfig, FileConfig, HarvestService, HttpConfig, NewRepo,
    PersistStats, QuotaState, RepoRecord, RepoStore,
};
use starsweep_db::RepoRepository;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    // Parse command line arguments
    let config = Config::parse();

    // Setup logging (stderr to keep stdout clean for exports)
    let level = if config.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install the log subscriber")?;

    let file_config = load_config(config.config.as_deref()).map_err(user_error)?;

    // Execute command
    match &config.command {
        Command::Harvest { search, dry_run } => {
            harvest(&config, file_config, search, *dry_run).await?;
        }
        Command::Limits { format } => {
            limits(&config, *format).await?;
        }
        Command::Export {
            format,
            min_stars,
            limit,
        } => {
            let repo = connect(&config).await?;
            export(&repo, format.clone(), *min_stars, *limit).await?;
        }
        Command::Stats => {
            let repo = connect(&config).await?;
            show_stats(&repo).await?;
        }
    }

    Ok(())
}

/// Logs the friendly form of a library error and converts it for `main`.
fn user_error(e: AppError) -> anyhow::Error {
    error!("{}", e.user_message());
    anyhow::Error::new(e)
}

fn github_client(config: &Config) -> anyhow::Result<GitHubClient> {
    GitHubClient::new(
        &config.api_url,
        config.github_token.as_deref(),
        &HttpConfig::default(),
    )
    .map_err(user_error)
}

async fn connect(config: &Config) -> anyhow::Result<RepoRepository> {
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL is not set (use --database-url or the environment)")?;

    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(DbConfig::default().max_connections)
        .connect(database_url)
        .await
        .context("Failed to connect to database")?;

    Ok(RepoRepository::new(pool))
}

/// Harvest repositories over the configured star range
async fn harvest(
    config: &Config,
    file_config: FileConfig,
    search_args: &SearchArgs,
    dry_run: bool,
) -> anyhow::Result<()> {
    let search = search_args.apply(file_config.search);
    let client = github_client(config)?;

    if config.github_token.is_none() {
        info!("No GITHUB_TOKEN set, using the anonymous search quota");
    }

    if dry_run {
        let service = HarvestService::new(client, DryRunStore, search, file_config.quota)
            .map_err(user_error)?;
        let plans = service.plan_all().await.map_err(user_error)?;
        info!("Dry run complete: {} sub-ranges planned", plans.len());
        return Ok(());
    }

    let repo = connect(config).await?;
    let service =
        HarvestService::new(client, repo, search, file_config.quota).map_err(user_error)?;

    let summary = service.run().await;

    if let Some(fatal) = &summary.fatal_error {
        error!("{}", fatal);
        if let Some(cursor) = summary.resume_from {
            error!("Resume with: starsweep harvest --floor {}", cursor);
        }
    }
    if !summary.is_success() {
        anyhow::bail!(
            "Harvest incomplete: {} of {} sub-ranges failed{}",
            summary.failed_count(),
            summary.results.len(),
            if summary.fatal_error.is_some() {
                ", stopped early"
            } else {
                ""
            }
        );
    }

    Ok(())
}

/// Store for dry runs, which plan without collecting anything.
struct DryRunStore;

impl RepoStore for DryRunStore {
    async fn upsert_batch(&self, _records: &[NewRepo]) -> Result<PersistStats, AppError> {
        Err(AppError::Generic(
            "dry runs do not persist repositories".to_string(),
        ))
    }
}

/// Show the search and core rate limit budgets
async fn limits(config: &Config, format: OutputFormat) -> anyhow::Result<()> {
    let client = github_client(config)?;
    let limits = client.fetch_rate_limits().await.map_err(user_error)?;

    match format {
        OutputFormat::Table => print_limits_table(&limits),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&limits)?),
    }

    Ok(())
}

fn print_limits_table(limits: &RateLimits) {
    println!("\nGitHub Rate Limits\n");
    println!("  {:<10} {:>9} {:>9}  Resets at", "Resource", "Remaining", "Limit");
    for (name, quota) in [("search", &limits.search), ("core", &limits.core)] {
        print_quota_row(name, quota);
    }
    println!();
}

fn print_quota_row(name: &str, quota: &QuotaState) {
    println!(
        "  {:<10} {:>9} {:>9}  {}",
        name,
        quota.remaining,
        quota.limit,
        quota.reset_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
}

/// Show database statistics
async fn show_stats(repo: &RepoRepository) -> anyhow::Result<()> {
    let stats = repo.get_stats().await.map_err(user_error)?;

    println!("\nDatabase Statistics\n");
    println!("  Total repositories:    {}", stats.total_repositories);
    if let (Some(min), Some(max)) = (stats.min_stars, stats.max_stars) {
        println!("  Star range:            {}..{}", min, max);
    }
    println!("  Languages:             {}", stats.languages);
    if let Some(last_update) = stats.last_update {
        println!("  Last update:           {}", last_update);
    }
    println!();

    Ok(())
}

/// Export repositories to various formats
async fn export(
    repo: &RepoRepository,
    format: ExportFormat,
    min_stars: Option<i64>,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    info!("Exporting repositories...");

    let repos = repo.list_all(min_stars, limit).await.map_err(user_error)?;

    if repos.is_empty() {
        eprintln!("No repositories found to export.");
        return Ok(());
    }

    info!("Found {} repositories to export", repos.len());

    match format {
        ExportFormat::Jsonl => {
            export_jsonl(&repos)?;
        }
        ExportFormat::Json => {
            export_json(&repos)?;
        }
        ExportFormat::Csv => {
            export_csv(&repos);
        }
    }

    info!("Export complete: {} repositories", repos.len());
    Ok(())
}

/// Export repositories in JSON Lines format (one JSON object per line)
fn export_jsonl(repos: &[RepoRecord]) -> anyhow::Result<()> {
    for repo in repos {
        println!("{}", serde_json::to_string(repo)?);
    }
    Ok(())
}

/// Export repositories as a JSON array
fn export_json(repos: &[RepoRecord]) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(repos)?);
    Ok(())
}

/// Export repositories in CSV format
fn export_csv(repos: &[RepoRecord]) {
    println!("{}", CSV_HEADER);
    for repo in repos {
        println!("{}", csv_row(repo));
    }
}

const CSV_HEADER: &str = "id,github_id,full_name,html_url,description,language,stargazers_count,forks_count,watchers_count,open_issues_count,topics,contributors_url,first_seen_at,last_updated_at";

fn csv_row(repo: &RepoRecord) -> String {
    let optional = |value: &Option<String>| value.as_deref().map(escape_csv).unwrap_or_default();

    format!(
        "{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
        repo.id,
        repo.github_id,
        escape_csv(&repo.full_name),
        escape_csv(&repo.html_url),
        optional(&repo.description),
        optional(&repo.language),
        repo.stargazers_count,
        repo.forks_count,
        repo.watchers_count,
        repo.open_issues_count,
        escape_csv(&repo.topics.join(";")),
        escape_csv(&repo.contributors_url),
        repo.first_seen_at.format("%Y-%m-%dT%H:%M:%SZ"),
        repo.last_updated_at.format("%Y-%m-%dT%H:%M:%SZ"),
    )
}

/// Escape a string for CSV output
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
