//! Catalog persistence: candidate selection and the bulk merge write-back.

#[cfg(test)]
pub mod memory;

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use sqlx::{QueryBuilder, Row};
use tracing::info;

use crate::identity::ImdbId;
use crate::util::env::env_flag;

/// One catalog row as read from the movies table.
#[derive(Debug, Clone, PartialEq)]
pub struct MovieRecord {
    pub movie_id: i64,
    pub title: String,
    pub year: Option<i32>,
    pub tmdb_id: Option<i64>,
    pub imdb_id: Option<ImdbId>,
    pub poster_path: Option<String>,
    pub overview: Option<String>,
    pub genres: Option<Vec<String>>,
}

/// Per-field delta to apply to one row. Only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovieUpdate {
    pub movie_id: i64,
    pub tmdb_id: Option<i64>,
    pub imdb_id: Option<ImdbId>,
    pub poster_path: Option<String>,
    pub overview: Option<String>,
    pub year: Option<i32>,
    pub genres: Option<Vec<String>>,
}

impl MovieUpdate {
    pub fn new(movie_id: i64) -> Self {
        Self {
            movie_id,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tmdb_id.is_none()
            && self.imdb_id.is_none()
            && self.poster_path.is_none()
            && self.overview.is_none()
            && self.year.is_none()
            && self.genres.is_none()
    }
}

/// Which slice of the catalog a run works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSelection {
    /// Every row, oldest id first.
    All,
    /// Rows missing at least one enrichable field.
    MissingFields,
    /// Rows that already have a provider id but still lack poster/overview.
    IdsOnlyMissingMedia,
}

impl CandidateSelection {
    pub fn from_flags(only_missing: bool, ids_only: bool) -> Self {
        if ids_only {
            CandidateSelection::IdsOnlyMissingMedia
        } else if only_missing {
            CandidateSelection::MissingFields
        } else {
            CandidateSelection::All
        }
    }
}

/// Storage seam for the pipeline. The live implementation is [`Db`]; tests
/// use [`memory::MemoryStore`].
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn fetch_candidates(
        &self,
        limit: i64,
        selection: CandidateSelection,
    ) -> Result<Vec<MovieRecord>>;

    /// Apply a batch of per-row deltas in one statement. Returns the number
    /// of rows touched.
    async fn bulk_apply(&self, updates: &[MovieUpdate]) -> Result<u64>;
}

pub struct Db {
    pub pool: PgPool,
}

impl Db {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let mut opts =
            PgConnectOptions::from_str(database_url).context("invalid database url")?;
        if database_url.contains("sslmode=require") {
            opts = opts.ssl_mode(PgSslMode::Require);
        }
        // Pgbouncer in transaction mode breaks prepared statements.
        if !env_flag("USE_PREPARED", false) {
            opts = opts.statement_cache_capacity(0);
        }

        let pool = PgPoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(opts)
            .await
            .context("failed to connect to postgres")?;
        info!("connected to db");
        Ok(Self { pool })
    }
}

fn selection_filter(selection: CandidateSelection) -> &'static str {
    match selection {
        CandidateSelection::All => "",
        CandidateSelection::MissingFields => {
            "WHERE (poster_path IS NULL OR poster_path = '' \
             OR overview IS NULL OR overview = '' \
             OR year IS NULL \
             OR array_length(genres, 1) IS NULL)"
        }
        CandidateSelection::IdsOnlyMissingMedia => {
            "WHERE tmdb_id IS NOT NULL \
             AND (poster_path IS NULL OR poster_path = '' \
             OR overview IS NULL OR overview = '')"
        }
    }
}

#[async_trait]
impl CatalogStore for Db {
    async fn fetch_candidates(
        &self,
        limit: i64,
        selection: CandidateSelection,
    ) -> Result<Vec<MovieRecord>> {
        let sql = format!(
            "SELECT movie_id, title, year, tmdb_id, imdb_id, poster_path, overview, genres \
             FROM movies {} ORDER BY movie_id LIMIT $1",
            selection_filter(selection)
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("failed to fetch enrichment candidates")?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let imdb_raw: Option<String> = row.try_get("imdb_id")?;
            out.push(MovieRecord {
                movie_id: row.try_get("movie_id")?,
                title: row.try_get("title")?,
                year: row.try_get("year")?,
                tmdb_id: row.try_get("tmdb_id")?,
                imdb_id: imdb_raw.as_deref().and_then(ImdbId::parse),
                poster_path: row.try_get("poster_path")?,
                overview: row.try_get("overview")?,
                genres: row.try_get("genres")?,
            });
        }
        Ok(out)
    }

    async fn bulk_apply(&self, updates: &[MovieUpdate]) -> Result<u64> {
        if updates.is_empty() {
            return Ok(0);
        }

        let mut qb: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
            "UPDATE movies AS m SET \
             tmdb_id = COALESCE(data.tmdb_id, m.tmdb_id), \
             imdb_id = COALESCE(data.imdb_id, m.imdb_id), \
             poster_path = COALESCE(data.poster_path, m.poster_path), \
             overview = COALESCE(data.overview, m.overview), \
             year = COALESCE(data.year, m.year), \
             genres = COALESCE(data.genres, m.genres), \
             updated_at = now() \
             FROM (",
        );
        qb.push_values(updates, |mut b, u| {
            b.push_bind(u.movie_id)
                .push_bind(u.tmdb_id)
                .push_bind(u.imdb_id.as_ref().map(|id| id.as_str().to_string()))
                .push_bind(u.poster_path.clone())
                .push_bind(u.overview.clone())
                .push_bind(u.year)
                .push_bind(u.genres.clone());
        });
        qb.push(
            ") AS data(movie_id, tmdb_id, imdb_id, poster_path, overview, year, genres) \
             WHERE m.movie_id = data.movie_id",
        );

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .context("bulk update failed")?;
        Ok(result.rows_affected())
    }
}
