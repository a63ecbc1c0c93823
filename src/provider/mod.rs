//! Metadata provider access: typed errors, the outbound TMDB client, and the
//! rate-limit/retry plumbing every call goes through.

pub mod limiter;
pub mod retry;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::identity::ImdbId;
use limiter::ProviderLimiter;
use retry::RetryPolicy;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Timeout, 5xx, or an explicit rate-limit response. Retryable.
    #[error("transient provider failure: {0}")]
    Transient(String),
    /// 404 or an empty result set. A permanent miss for that lookup.
    #[error("not found")]
    NotFound,
    /// Payload did not have the expected shape. A miss, never retried.
    #[error("malformed provider payload: {0}")]
    Malformed(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// Raw fields the provider returns for one resolved identity.
#[derive(Debug, Clone, PartialEq)]
pub struct MovieDetail {
    pub tmdb_id: i64,
    pub imdb_id: Option<ImdbId>,
    pub title: Option<String>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub release_year: Option<i32>,
    pub genres: Vec<String>,
}

/// The three read operations the enrichment pipeline needs from the metadata
/// provider. Behind a trait so runs can be tested against a scripted fake.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// `GET /movie/{id}` — full detail, or NotFound.
    async fn movie_detail(&self, tmdb_id: i64) -> Result<MovieDetail, ProviderError>;
    /// `GET /find/{imdb_id}` — provider ids matching a cross-reference id,
    /// possibly empty.
    async fn find_by_imdb(&self, imdb_id: &ImdbId) -> Result<Vec<i64>, ProviderError>;
    /// `GET /search/movie` — ranked provider ids, first element is the
    /// candidate. Empty means no match for this query.
    async fn search_movie(&self, query: &str, year: Option<i32>)
        -> Result<Vec<i64>, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct TmdbConfig {
    pub base_url: String,
    pub api_key: String,
    pub rps: u32,
    pub retry: RetryPolicy,
    pub timeout_secs: u64,
}

impl TmdbConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.themoviedb.org/3".into(),
            api_key: api_key.into(),
            rps: 4,
            retry: RetryPolicy::default(),
            timeout_secs: 20,
        }
    }
}

pub struct TmdbClient {
    http: reqwest::Client,
    cfg: TmdbConfig,
    limiter: ProviderLimiter,
}

impl TmdbClient {
    pub fn new(cfg: TmdbConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()?;
        let limiter = ProviderLimiter::per_second(cfg.rps);
        Ok(Self { http, cfg, limiter })
    }

    async fn get_json(
        &self,
        path: &str,
        extra: &[(&str, String)],
    ) -> Result<Value, ProviderError> {
        let url = format!("{}{}", self.cfg.base_url.trim_end_matches('/'), path);
        self.cfg.retry.run(|| self.attempt(&url, extra)).await
    }

    /// One rate-limited request. The retry policy re-invokes this, so every
    /// attempt takes a fresh token.
    async fn attempt(&self, url: &str, extra: &[(&str, String)]) -> Result<Value, ProviderError> {
        self.limiter.acquire().await;

        let mut params: Vec<(&str, &str)> = vec![
            ("api_key", self.cfg.api_key.as_str()),
            ("include_adult", "false"),
            ("language", "en-US"),
        ];
        for (k, v) in extra {
            params.push((k, v.as_str()));
        }

        let resp = self
            .http
            .get(url)
            .query(&params)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        let status = resp.status();
        debug!(url, status = status.as_u16(), "provider response");
        if status.as_u16() == 404 {
            return Err(ProviderError::NotFound);
        }
        if status.as_u16() == 429 {
            return Err(ProviderError::Transient("rate limited (429)".into()));
        }
        if status.is_server_error() {
            return Err(ProviderError::Transient(format!("status {}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(ProviderError::Malformed(format!("status {}", status.as_u16())));
        }
        resp.json::<Value>()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl MetadataProvider for TmdbClient {
    async fn movie_detail(&self, tmdb_id: i64) -> Result<MovieDetail, ProviderError> {
        let v = self.get_json(&format!("/movie/{tmdb_id}"), &[]).await?;
        parse_detail(&v)
    }

    async fn find_by_imdb(&self, imdb_id: &ImdbId) -> Result<Vec<i64>, ProviderError> {
        let v = self
            .get_json(
                &format!("/find/{}", imdb_id.as_str()),
                &[("external_source", "imdb_id".to_string())],
            )
            .await?;
        extract_ids(&v, "movie_results")
    }

    async fn search_movie(
        &self,
        query: &str,
        year: Option<i32>,
    ) -> Result<Vec<i64>, ProviderError> {
        let mut extra: Vec<(&str, String)> = vec![("query", query.to_string())];
        if let Some(y) = year {
            extra.push(("year", y.to_string()));
        }
        let v = self.get_json("/search/movie", &extra).await?;
        extract_ids(&v, "results")
    }
}

fn extract_ids(v: &Value, key: &str) -> Result<Vec<i64>, ProviderError> {
    let arr = v
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::Malformed(format!("missing {key} array")))?;
    Ok(arr
        .iter()
        .filter_map(|item| item.get("id").and_then(Value::as_i64))
        .collect())
}

fn parse_detail(v: &Value) -> Result<MovieDetail, ProviderError> {
    let tmdb_id = v
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| ProviderError::Malformed("detail missing id".into()))?;
    let release_year = v
        .get("release_date")
        .and_then(Value::as_str)
        .and_then(|d| d.get(0..4))
        .and_then(|y| y.parse::<i32>().ok());
    let genres = v
        .get("genres")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|g| g.get("name").and_then(Value::as_str))
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default();
    let title = v
        .get("title")
        .or_else(|| v.get("original_title"))
        .and_then(Value::as_str)
        .map(|s| s.to_string());

    Ok(MovieDetail {
        tmdb_id,
        imdb_id: v
            .get("imdb_id")
            .and_then(Value::as_str)
            .and_then(ImdbId::parse),
        title,
        overview: v
            .get("overview")
            .and_then(Value::as_str)
            .map(|s| s.to_string()),
        poster_path: v
            .get("poster_path")
            .and_then(Value::as_str)
            .map(|s| s.to_string()),
        release_year,
        genres,
    })
}
