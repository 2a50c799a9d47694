use crate::common::error::{Result, ScraperError};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical link to a listing's detail page. One key per listing across
/// a run and across merges.
pub type ListingKey = String;

/// An absolute showtime carrying the theater's civil offset.
///
/// Equality and ordering compare the absolute instant, so two values with
/// different offsets but the same moment are equal. Serializes as RFC 3339
/// with offset, e.g. `2024-08-01T19:00:00-07:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShowtimeInstant(DateTime<FixedOffset>);

impl ShowtimeInstant {
    /// Localize a civil date and time in `tz`.
    ///
    /// Ambiguous civil times (the repeated hour when DST ends) take the
    /// earlier instant; times that fall in the DST gap do not exist and are
    /// rejected.
    pub fn localize(date: NaiveDate, time: NaiveTime, tz: Tz) -> Result<Self> {
        let naive = date.and_time(time);
        let local = tz.from_local_datetime(&naive).earliest().ok_or_else(|| {
            ScraperError::InvalidShowtime(format!("{} does not exist in {}", naive, tz.name()))
        })?;
        Ok(Self(local.with_timezone(&local.offset().fix())))
    }

    pub fn to_utc(&self) -> DateTime<Utc> {
        self.0.with_timezone(&Utc)
    }

    pub fn in_timezone(&self, tz: Tz) -> DateTime<Tz> {
        self.0.with_timezone(&tz)
    }
}

impl fmt::Display for ShowtimeInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

/// Data scraped from a listing's detail page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingDetail {
    pub year: Option<i32>,
    pub directors: Option<String>,
    /// Raw inner HTML of the listing's description block
    pub content: Option<String>,
}

/// Structured movies extracted from a listing by the language model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmExtraction {
    pub extracted_movies: Vec<ExtractedMovie>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMovie {
    pub title: String,
    pub directors: String,
    pub year: i32,
    pub is_short_film: bool,
    /// Absent until the identifier search has run for this movie
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmdb: Option<TmdbResolution>,
}

/// Outcome of searching the movie database for an extracted movie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TmdbResolution {
    Matched { movie: TmdbMovie },
    NoMatch,
}

impl TmdbResolution {
    pub fn matched(&self) -> Option<&TmdbMovie> {
        match self {
            TmdbResolution::Matched { movie } => Some(movie),
            TmdbResolution::NoMatch => None,
        }
    }
}

/// The subset of a TMDB search result the export needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TmdbMovie {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub original_title: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
}

impl TmdbMovie {
    /// Four-digit year from `release_date` ("1999-03-31" -> "1999")
    pub fn release_year(&self) -> Option<&str> {
        self.release_date
            .as_deref()
            .and_then(|d| d.get(..4))
            .filter(|y| y.chars().all(|c| c.is_ascii_digit()))
    }
}

/// One calendar listing keyed by its detail-page link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub title: String,
    pub link: String,
    /// Strictly ascending, no duplicate instants
    pub showtimes: Vec<ShowtimeInstant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<ListingDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmExtraction>,
}

impl ListingRecord {
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            showtimes: Vec::new(),
            detail: None,
            llm: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.link
    }

    /// Sort ascending and drop repeated instants
    pub fn normalize_showtimes(&mut self) {
        self.showtimes.sort_unstable();
        self.showtimes.dedup();
    }

    /// Add showtimes not already present, keeping the list normalized.
    /// Existing showtimes are never removed.
    pub fn absorb_showtimes<I>(&mut self, showtimes: I)
    where
        I: IntoIterator<Item = ShowtimeInstant>,
    {
        self.showtimes.extend(showtimes);
        self.normalize_showtimes();
    }

    pub fn last_showtime(&self) -> Option<ShowtimeInstant> {
        self.showtimes.last().copied()
    }

    /// Earliest showtime at or after `now`
    pub fn next_showtime(&self, now: DateTime<Utc>) -> Option<ShowtimeInstant> {
        self.showtimes.iter().copied().find(|s| s.to_utc() >= now)
    }

    pub fn extracted_movies(&self) -> &[ExtractedMovie] {
        self.llm
            .as_ref()
            .map(|l| l.extracted_movies.as_slice())
            .unwrap_or(&[])
    }
}
