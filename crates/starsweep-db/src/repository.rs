//! Repository catalogue persistence for PostgreSQL.
//!
//! # Testing
//!
//! Tests here only cover row shapes and query constants. The SQL paths
//! (`upsert_batch`, `list_all`, `get_stats`) need a live PostgreSQL instance with
//! `migrations/0001_create_repositories.sql` applied.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use starsweep_core::error::AppError;
use starsweep_core::models::{DatabaseStats, NewRepo, RepoRecord};
use starsweep_core::stats::{PersistStats, UpsertOutcome};
use starsweep_core::traits::RepoStore;
use tracing::debug;

/// Column list for SELECT queries. Must remain a const literal to ensure SQL safety
/// since format!() bypasses sqlx compile-time validation.
const REPO_COLUMNS: &str = "id, github_id, full_name, html_url, description, language, forks_count, stargazers_count, watchers_count, open_issues_count, topics, contributors_url, first_seen_at, last_updated_at";

/// Inserts a repository or overwrites every projected column of the existing
/// row. `xmax = 0` only holds for a freshly inserted tuple.
const UPSERT_SQL: &str = r#"
    INSERT INTO repositories (
        github_id,
        full_name,
        html_url,
        description,
        language,
        forks_count,
        stargazers_count,
        watchers_count,
        open_issues_count,
        topics,
        contributors_url,
        last_updated_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW())
    ON CONFLICT (github_id)
    DO UPDATE SET
        full_name = EXCLUDED.full_name,
        html_url = EXCLUDED.html_url,
        description = EXCLUDED.description,
        language = EXCLUDED.language,
        forks_count = EXCLUDED.forks_count,
        stargazers_count = EXCLUDED.stargazers_count,
        watchers_count = EXCLUDED.watchers_count,
        open_issues_count = EXCLUDED.open_issues_count,
        topics = EXCLUDED.topics,
        contributors_url = EXCLUDED.contributors_url,
        last_updated_at = NOW()
    RETURNING (xmax = 0) AS inserted
"#;

/// Default row cap for [`RepoRepository::list_all`].
pub const DEFAULT_LIST_LIMIT: usize = 10_000;

/// Repository for GitHub repository rows in PostgreSQL.
///
/// # Examples
///
/// ```no_run
/// use sqlx::postgres::PgPoolOptions;
/// use starsweep_db::RepoRepository;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = PgPoolOptions::new()
///     .max_connections(5)
///     .connect("postgresql://localhost/starsweep")
///     .await?;
///
/// let repo = RepoRepository::new(pool);
/// let stats = repo.get_stats().await?;
/// println!("{} repositories", stats.total_repositories);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RepoRepository {
    pool: Pool<Postgres>,
}

impl RepoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upserts a batch in one transaction: either every record is written or
    /// none is.
    pub async fn upsert_batch(&self, repos: &[NewRepo]) -> Result<PersistStats, AppError> {
        let mut tx = self.pool.begin().await?;
        let mut stats = PersistStats::new();

        for repo in repos {
            stats.record(upsert_one(&mut tx, repo).await?);
        }

        tx.commit().await?;
        debug!(
            "Persisted batch of {}: {} new, {} updated",
            repos.len(),
            stats.created,
            stats.updated
        );
        Ok(stats)
    }

    /// Lists repositories ordered by stars, most starred first.
    ///
    /// TODO(performance): stream rows instead of collecting them; exports of
    /// the full catalogue hold every row in memory.
    pub async fn list_all(
        &self,
        min_stars: Option<i64>,
        limit: Option<usize>,
    ) -> Result<Vec<RepoRecord>, AppError> {
        let limit_val = limit.unwrap_or(DEFAULT_LIST_LIMIT) as i64;

        let repos = if let Some(min_stars) = min_stars {
            let query = format!(
                "SELECT {} FROM repositories WHERE stargazers_count >= $1 ORDER BY stargazers_count DESC, github_id LIMIT $2",
                REPO_COLUMNS
            );
            sqlx::query_as::<_, RepoRecord>(&query)
                .bind(min_stars)
                .bind(limit_val)
                .fetch_all(&self.pool)
                .await
                .map_err(AppError::DatabaseError)?
        } else {
            let query = format!(
                "SELECT {} FROM repositories ORDER BY stargazers_count DESC, github_id LIMIT $1",
                REPO_COLUMNS
            );
            sqlx::query_as::<_, RepoRecord>(&query)
                .bind(limit_val)
                .fetch_all(&self.pool)
                .await
                .map_err(AppError::DatabaseError)?
        };

        Ok(repos)
    }

    /// Returns aggregated catalogue statistics.
    pub async fn get_stats(&self) -> Result<DatabaseStats, AppError> {
        let row: StatsRow = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) as total,
                MIN(stargazers_count) as min_stars,
                MAX(stargazers_count) as max_stars,
                COUNT(DISTINCT language) as languages,
                MAX(last_updated_at) as last_update
            FROM repositories
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(DatabaseStats {
            total_repositories: row.total.unwrap_or(0),
            min_stars: row.min_stars,
            max_stars: row.max_stars,
            languages: row.languages.unwrap_or(0),
            last_update: row.last_update,
        })
    }
}

async fn upsert_one(
    conn: &mut sqlx::PgConnection,
    repo: &NewRepo,
) -> Result<UpsertOutcome, AppError> {
    let (inserted,): (bool,) = sqlx::query_as(UPSERT_SQL)
        .bind(repo.github_id)
        .bind(&repo.full_name)
        .bind(&repo.html_url)
        .bind(&repo.description)
        .bind(&repo.language)
        .bind(repo.forks_count)
        .bind(repo.stargazers_count)
        .bind(repo.watchers_count)
        .bind(repo.open_issues_count)
        .bind(&repo.topics)
        .bind(&repo.contributors_url)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::DatabaseError)?;

    Ok(if inserted {
        UpsertOutcome::Created
    } else {
        UpsertOutcome::Updated
    })
}

impl RepoStore for RepoRepository {
    async fn upsert_batch(&self, records: &[NewRepo]) -> Result<PersistStats, AppError> {
        RepoRepository::upsert_batch(self, records).await
    }
}

/// Helper struct for deserializing stats query results
#[derive(sqlx::FromRow)]
struct StatsRow {
    total: Option<i64>,
    min_stars: Option<i64>,
    max_stars: Option<i64>,
    languages: Option<i64>,
    last_update: Option<DateTime<Utc>>,
}
