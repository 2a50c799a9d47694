use crate::calendar::snapshot::CalendarSnapshot;
use crate::common::error::{Result, ScraperError};
use crate::common::types::{ExtractedMovie, ListingRecord, ShowtimeInstant};
use crate::infra::snapshot_store::write_atomic;
use crate::observability::metrics;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// One row of the Letterboxd import CSV
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportRow {
    #[serde(rename = "tmdbID")]
    pub tmdb_id: Option<u64>,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Year")]
    pub year: String,
    #[serde(rename = "Directors")]
    pub directors: String,
    #[serde(rename = "Review")]
    pub review: String,
}

impl ImportRow {
    fn new(listing: &ListingRecord, movie: &ExtractedMovie, next_show: &str) -> Self {
        let review = format!("{}\n{}\n\n{}", listing.title, listing.link, next_show);
        match movie.tmdb.as_ref().and_then(|t| t.matched()) {
            Some(tmdb) => Self {
                tmdb_id: Some(tmdb.id),
                title: tmdb.title.clone(),
                year: tmdb
                    .release_year()
                    .map(str::to_string)
                    .unwrap_or_else(|| movie.year.to_string()),
                directors: movie.directors.clone(),
                review,
            },
            None => Self {
                tmdb_id: None,
                title: movie.title.clone(),
                year: movie.year.to_string(),
                directors: movie.directors.clone(),
                review,
            },
        }
    }
}

/// "Next show August 01 07:00PM" in the theater's zone
pub fn format_next_show(showtime: ShowtimeInstant, tz: Tz) -> String {
    showtime.in_timezone(tz).format("Next show %B %d %I:%M%p").to_string()
}

/// Rows for every extracted movie of every listing still showing at `now`,
/// ordered by each listing's next showtime.
pub fn build_import_rows(snapshot: &CalendarSnapshot, now: DateTime<Utc>, tz: Tz) -> Vec<ImportRow> {
    let mut dated: Vec<(ShowtimeInstant, ImportRow)> = Vec::new();

    for listing in snapshot.iter() {
        let still_showing = listing.last_showtime().map(|s| s.to_utc() >= now).unwrap_or(false);
        if !still_showing {
            continue;
        }
        let Some(next) = listing.next_showtime(now) else { continue };
        let next_show = format_next_show(next, tz);

        for movie in listing.extracted_movies() {
            dated.push((next, ImportRow::new(listing, movie, &next_show)));
        }
    }

    dated.sort_by_key(|(showtime, _)| *showtime);
    dated.into_iter().map(|(_, row)| row).collect()
}

pub fn render_csv(rows: &[ImportRow]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if rows.is_empty() {
        writer.write_record(["tmdbID", "Title", "Year", "Directors", "Review"])?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| ScraperError::Io(e.into_error()))
}

/// Build and write the import CSV for `snapshot`; returns the row count
pub fn write_import_csv(path: &Path, snapshot: &CalendarSnapshot, now: DateTime<Utc>, tz: Tz) -> Result<usize> {
    let rows = build_import_rows(snapshot, now, tz);
    let bytes = render_csv(&rows)?;
    write_atomic(path, &bytes)?;
    metrics::enrich::import_rows_written(rows.len());
    info!(output_file = %path.display(), row_count = rows.len(), "Wrote import file");
    Ok(rows.len())
}
