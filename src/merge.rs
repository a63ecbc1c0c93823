//! Field-level merge policy: decide which provider fields actually land on a
//! catalog row.

use crate::provider::MovieDetail;
use crate::store::{MovieRecord, MovieUpdate};

/// Per-field overwrite switches. Default is fill-only: never replace a
/// non-empty value the catalog already has.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverwriteFlags {
    pub posters: bool,
    pub overview: bool,
    pub year: bool,
    pub genres: bool,
}

fn text_missing(v: &Option<String>) -> bool {
    v.as_deref().map(str::is_empty).unwrap_or(true)
}

fn list_missing(v: &Option<Vec<String>>) -> bool {
    v.as_ref().map(Vec::is_empty).unwrap_or(true)
}

fn pick_text(
    existing: &Option<String>,
    incoming: &Option<String>,
    overwrite: bool,
) -> Option<String> {
    let candidate = incoming.as_deref().filter(|s| !s.is_empty())?;
    if (overwrite || text_missing(existing)) && existing.as_deref() != Some(candidate) {
        return Some(candidate.to_string());
    }
    None
}

/// Compute the delta for one row, or None when nothing would change.
///
/// Content fields obey the overwrite flags. Identity fields (tmdb_id,
/// imdb_id) always take the freshly resolved value when it differs, so a
/// re-resolved row converges on the newest identity.
pub fn merge(
    record: &MovieRecord,
    detail: &MovieDetail,
    flags: OverwriteFlags,
) -> Option<MovieUpdate> {
    let mut update = MovieUpdate::new(record.movie_id);

    if record.tmdb_id != Some(detail.tmdb_id) {
        update.tmdb_id = Some(detail.tmdb_id);
    }
    if let Some(imdb) = &detail.imdb_id {
        if record.imdb_id.as_ref() != Some(imdb) {
            update.imdb_id = Some(imdb.clone());
        }
    }

    update.poster_path = pick_text(&record.poster_path, &detail.poster_path, flags.posters);
    update.overview = pick_text(&record.overview, &detail.overview, flags.overview);

    if let Some(year) = detail.release_year {
        if (flags.year || record.year.is_none()) && record.year != Some(year) {
            update.year = Some(year);
        }
    }
    if !detail.genres.is_empty()
        && (flags.genres || list_missing(&record.genres))
        && record.genres.as_deref() != Some(detail.genres.as_slice())
    {
        update.genres = Some(detail.genres.clone());
    }

    if update.is_empty() {
        None
    } else {
        Some(update)
    }
}
