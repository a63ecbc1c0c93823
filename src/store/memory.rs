//! In-memory catalog used by sink and orchestrator tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use super::{CandidateSelection, CatalogStore, MovieRecord, MovieUpdate};

#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<i64, MovieRecord>>,
}

impl MemoryStore {
    pub fn with_rows(rows: Vec<MovieRecord>) -> Self {
        Self {
            rows: Mutex::new(rows.into_iter().map(|r| (r.movie_id, r)).collect()),
        }
    }

    pub fn row(&self, movie_id: i64) -> Option<MovieRecord> {
        self.rows.lock().expect("rows").get(&movie_id).cloned()
    }
}

fn text_missing(v: &Option<String>) -> bool {
    v.as_deref().map(str::is_empty).unwrap_or(true)
}

fn wants(record: &MovieRecord, selection: CandidateSelection) -> bool {
    match selection {
        CandidateSelection::All => true,
        CandidateSelection::MissingFields => {
            text_missing(&record.poster_path)
                || text_missing(&record.overview)
                || record.year.is_none()
                || record.genres.as_ref().map(Vec::is_empty).unwrap_or(true)
        }
        CandidateSelection::IdsOnlyMissingMedia => {
            record.tmdb_id.is_some()
                && (text_missing(&record.poster_path) || text_missing(&record.overview))
        }
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn fetch_candidates(
        &self,
        limit: i64,
        selection: CandidateSelection,
    ) -> Result<Vec<MovieRecord>> {
        Ok(self
            .rows
            .lock()
            .expect("rows")
            .values()
            .filter(|r| wants(r, selection))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn bulk_apply(&self, updates: &[MovieUpdate]) -> Result<u64> {
        let mut rows = self.rows.lock().expect("rows");
        let mut touched = 0u64;
        for u in updates {
            if let Some(row) = rows.get_mut(&u.movie_id) {
                if let Some(v) = u.tmdb_id {
                    row.tmdb_id = Some(v);
                }
                if let Some(v) = &u.imdb_id {
                    row.imdb_id = Some(v.clone());
                }
                if let Some(v) = &u.poster_path {
                    row.poster_path = Some(v.clone());
                }
                if let Some(v) = &u.overview {
                    row.overview = Some(v.clone());
                }
                if let Some(v) = u.year {
                    row.year = Some(v);
                }
                if let Some(v) = &u.genres {
                    row.genres = Some(v.clone());
                }
                touched += 1;
            }
        }
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sparse(movie_id: i64, title: &str) -> MovieRecord {
        MovieRecord {
            movie_id,
            title: title.to_string(),
            year: None,
            tmdb_id: None,
            imdb_id: None,
            poster_path: None,
            overview: None,
            genres: None,
        }
    }

    #[tokio::test]
    async fn selection_filters_match_sql_semantics() {
        let mut full = sparse(1, "Complete");
        full.tmdb_id = Some(603);
        full.year = Some(1999);
        full.poster_path = Some("/p.jpg".into());
        full.overview = Some("plot".into());
        full.genres = Some(vec!["Action".into()]);

        let mut ids_only = sparse(2, "Has Id");
        ids_only.tmdb_id = Some(604);

        let store =
            MemoryStore::with_rows(vec![full, ids_only, sparse(3, "Bare")]);

        let all = store
            .fetch_candidates(10, CandidateSelection::All)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);

        let missing = store
            .fetch_candidates(10, CandidateSelection::MissingFields)
            .await
            .unwrap();
        assert_eq!(
            missing.iter().map(|r| r.movie_id).collect::<Vec<_>>(),
            vec![2, 3]
        );

        let ids = store
            .fetch_candidates(10, CandidateSelection::IdsOnlyMissingMedia)
            .await
            .unwrap();
        assert_eq!(ids.iter().map(|r| r.movie_id).collect::<Vec<_>>(), vec![2]);
    }

    #[tokio::test]
    async fn bulk_apply_only_writes_present_fields() {
        let mut row = sparse(1, "Heat");
        row.overview = Some("existing plot".into());
        let store = MemoryStore::with_rows(vec![row]);

        let mut update = MovieUpdate::new(1);
        update.tmdb_id = Some(949);
        let touched = store.bulk_apply(&[update]).await.unwrap();
        assert_eq!(touched, 1);

        let after = store.row(1).unwrap();
        assert_eq!(after.tmdb_id, Some(949));
        assert_eq!(after.overview.as_deref(), Some("existing plot"));
    }
}
