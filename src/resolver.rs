//! Identity resolution: map a catalog row to a provider identity through a
//! fixed ladder of lookups.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::normalize;
use crate::provider::{MetadataProvider, MovieDetail, ProviderError};
use crate::store::MovieRecord;

/// Resolves one row at a time against the provider:
///
/// 1. existing provider id, fetch detail directly
/// 2. existing IMDb id, cross-reference
/// 3. normalized title search, candidates in order of preference
///
/// A stage that misses falls through to the next. A stage that errors also
/// falls through, but the error is remembered: if no later stage resolves the
/// row, the row counts as failed rather than unmatched.
#[derive(Clone)]
pub struct IdentityResolver {
    provider: Arc<dyn MetadataProvider>,
}

impl IdentityResolver {
    pub fn new(provider: Arc<dyn MetadataProvider>) -> Self {
        Self { provider }
    }

    pub async fn resolve(
        &self,
        record: &MovieRecord,
    ) -> Result<Option<MovieDetail>, ProviderError> {
        let mut stage_error: Option<ProviderError> = None;

        if let Some(tmdb_id) = record.tmdb_id {
            match self.provider.movie_detail(tmdb_id).await {
                Ok(detail) => return Ok(Some(detail)),
                Err(ProviderError::NotFound) => {
                    debug!(movie_id = record.movie_id, tmdb_id, "stale provider id");
                }
                Err(err) => {
                    warn!(movie_id = record.movie_id, error = %err, "direct lookup failed");
                    stage_error = Some(err);
                }
            }
        }

        if let Some(imdb_id) = &record.imdb_id {
            match self.provider.find_by_imdb(imdb_id).await {
                Ok(ids) => {
                    if let Some(first) = ids.first() {
                        match self.provider.movie_detail(*first).await {
                            Ok(detail) => return Ok(Some(detail)),
                            Err(ProviderError::NotFound) => {
                                debug!(movie_id = record.movie_id, "cross-ref hit vanished");
                            }
                            Err(err) => {
                                warn!(movie_id = record.movie_id, error = %err, "cross-ref detail failed");
                                stage_error = Some(err);
                            }
                        }
                    }
                }
                Err(ProviderError::NotFound) => {
                    debug!(movie_id = record.movie_id, imdb = %imdb_id, "no cross-ref match");
                }
                Err(err) => {
                    warn!(movie_id = record.movie_id, error = %err, "cross-ref lookup failed");
                    stage_error = Some(err);
                }
            }
        }

        for (query, year) in normalize::candidates(&record.title, record.year) {
            match self.provider.search_movie(&query, year).await {
                Ok(ids) => {
                    let Some(first) = ids.first() else { continue };
                    match self.provider.movie_detail(*first).await {
                        Ok(detail) => return Ok(Some(detail)),
                        Err(ProviderError::NotFound) => continue,
                        Err(err) => {
                            warn!(movie_id = record.movie_id, query, error = %err, "search detail failed");
                            stage_error = Some(err);
                        }
                    }
                }
                Err(ProviderError::NotFound) => continue,
                Err(err) => {
                    warn!(movie_id = record.movie_id, query, error = %err, "search failed");
                    stage_error = Some(err);
                }
            }
        }

        match stage_error {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ImdbId;
    use crate::provider::testing::{detail, ScriptedProvider};

    fn record(movie_id: i64, title: &str) -> MovieRecord {
        MovieRecord {
            movie_id,
            title: title.to_string(),
            year: Some(1999),
            tmdb_id: None,
            imdb_id: None,
            poster_path: None,
            overview: None,
            genres: None,
        }
    }

    #[tokio::test]
    async fn direct_id_short_circuits() {
        let provider = ScriptedProvider::default().with_detail(detail(603, "The Matrix"));
        let resolver = IdentityResolver::new(Arc::new(provider));

        let mut r = record(1, "Matrix, The (1999)");
        r.tmdb_id = Some(603);
        let resolved = resolver.resolve(&r).await.unwrap().unwrap();
        assert_eq!(resolved.tmdb_id, 603);
    }

    #[tokio::test]
    async fn searches_candidates_in_order() {
        // First variant misses, second hits.
        let provider = ScriptedProvider::default()
            .with_detail(detail(603, "The Matrix"))
            .with_search_hit("The Matrix", None, vec![603]);
        let provider = Arc::new(provider);
        let resolver = IdentityResolver::new(provider.clone());

        let resolved = resolver
            .resolve(&record(1, "Matrix, The (1999)"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.tmdb_id, 603);
        assert_eq!(
            provider.searches(),
            vec![
                ("The Matrix".to_string(), Some(1999)),
                ("The Matrix".to_string(), None),
            ]
        );
    }

    #[tokio::test]
    async fn imdb_miss_falls_through_to_search() {
        let provider = ScriptedProvider::default()
            .with_detail(detail(603, "The Matrix"))
            .with_search_hit("The Matrix", Some(1999), vec![603]);
        let resolver = IdentityResolver::new(Arc::new(provider));

        let mut r = record(1, "Matrix, The (1999)");
        r.imdb_id = ImdbId::parse("tt0133093");
        let resolved = resolver.resolve(&r).await.unwrap().unwrap();
        assert_eq!(resolved.tmdb_id, 603);
    }

    #[tokio::test]
    async fn clean_miss_is_none_not_error() {
        let resolver = IdentityResolver::new(Arc::new(ScriptedProvider::default()));
        let resolved = resolver.resolve(&record(1, "Unknown Film (2001)")).await;
        assert!(matches!(resolved, Ok(None)));
    }

    #[tokio::test]
    async fn stage_error_surfaces_when_unresolved() {
        let mut provider = ScriptedProvider::default();
        provider.cross_refs.insert(
            "tt0133093".to_string(),
            Err(ProviderError::Transient("503".into())),
        );
        let resolver = IdentityResolver::new(Arc::new(provider));

        let mut r = record(1, "Matrix, The (1999)");
        r.imdb_id = ImdbId::parse("tt0133093");
        let resolved = resolver.resolve(&r).await;
        assert!(matches!(resolved, Err(ProviderError::Transient(_))));
    }

    #[tokio::test]
    async fn stage_error_is_forgotten_once_resolved() {
        let mut provider = ScriptedProvider::default()
            .with_detail(detail(603, "The Matrix"))
            .with_search_hit("The Matrix", Some(1999), vec![603]);
        provider.cross_refs.insert(
            "tt0133093".to_string(),
            Err(ProviderError::Transient("503".into())),
        );
        let resolver = IdentityResolver::new(Arc::new(provider));

        let mut r = record(1, "Matrix, The (1999)");
        r.imdb_id = ImdbId::parse("tt0133093");
        let resolved = resolver.resolve(&r).await.unwrap().unwrap();
        assert_eq!(resolved.tmdb_id, 603);
    }
}
