use crate::app::lookup::{LookupClient, LookupOutcome};
use crate::app::ports::{HttpRequest, PacingPort};
use crate::calendar::snapshot::CalendarSnapshot;
use crate::common::types::{ExtractedMovie, TmdbMovie, TmdbResolution};
use crate::observability::metrics;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<TmdbMovie>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentifyReport {
    pub listing_count: usize,
    pub movie_count: usize,
    pub searched: usize,
    pub matched: usize,
}

pub struct IdentifyUseCase {
    lookup: Arc<LookupClient>,
    pacing: Arc<dyn PacingPort>,
    search_url: String,
    token: String,
    jitter_ms: (u64, u64),
}

impl IdentifyUseCase {
    pub fn new(
        lookup: Arc<LookupClient>,
        pacing: Arc<dyn PacingPort>,
        search_url: impl Into<String>,
        token: impl Into<String>,
        jitter_ms: (u64, u64),
    ) -> Self {
        Self {
            lookup,
            pacing,
            search_url: search_url.into(),
            token: token.into(),
            jitter_ms,
        }
    }

    /// Search TMDB for one movie; the first result wins.
    /// Any lookup that does not succeed resolves to `NoMatch`.
    pub async fn identify_movie(&self, movie: &ExtractedMovie) -> TmdbResolution {
        let request = HttpRequest::get(self.search_url.as_str())
            .query("query", movie.title.as_str())
            .query("year", movie.year.to_string())
            .bearer(self.token.as_str());

        let response = match self.lookup.execute(&request).await {
            LookupOutcome::Succeeded(response) => response,
            LookupOutcome::Failed { status, reason } => {
                warn!(title = %movie.title, year = movie.year, ?status, error = %reason, "Failed TMDB search");
                return TmdbResolution::NoMatch;
            }
            LookupOutcome::Exhausted { attempts } => {
                warn!(title = %movie.title, year = movie.year, attempts, "Failed TMDB search, retries exhausted");
                return TmdbResolution::NoMatch;
            }
        };

        match response.json::<SearchResponse>() {
            Ok(search) => {
                info!(title = %movie.title, year = movie.year, result_count = search.results.len(), "TMDB search");
                match search.results.into_iter().next() {
                    Some(movie) => TmdbResolution::Matched { movie },
                    None => TmdbResolution::NoMatch,
                }
            }
            Err(e) => {
                warn!(title = %movie.title, error = %e, "Unreadable TMDB search response");
                TmdbResolution::NoMatch
            }
        }
    }

    /// Resolve every extracted movie that has not been searched yet
    pub async fn run(&self, snapshot: &mut CalendarSnapshot) -> IdentifyReport {
        let mut report = IdentifyReport {
            listing_count: snapshot.len(),
            ..IdentifyReport::default()
        };

        let keys: Vec<String> = snapshot.keys().cloned().collect();
        let mut searched_listings = 0usize;
        for (index, key) in keys.iter().enumerate() {
            let Some(record) = snapshot.get(key) else { continue };
            let title = record.title.clone();
            let mut movies = record.extracted_movies().to_vec();
            report.movie_count += movies.len();
            if movies.iter().all(|m| m.tmdb.is_some()) {
                continue;
            }

            if searched_listings > 0 {
                self.pacing.pause(self.jitter_ms).await;
            }
            searched_listings += 1;

            for movie in movies.iter_mut().filter(|m| m.tmdb.is_none()) {
                let resolution = self.identify_movie(movie).await;
                report.searched += 1;
                if resolution.matched().is_some() {
                    metrics::enrich::movie_identified();
                }
                movie.tmdb = Some(resolution);
            }

            let identified = movies.iter().filter(|m| m.tmdb.as_ref().and_then(|t| t.matched()).is_some()).count();
            report.matched += identified;
            info!(listing = %title, index, identified_count = identified, count = movies.len(), "Identified movies");

            if let Some(llm) = snapshot.get_mut(key).and_then(|r| r.llm.as_mut()) {
                llm.extracted_movies = movies;
            }
        }

        info!(
            listing_count = report.listing_count,
            movie_count = report.movie_count,
            searched = report.searched,
            matched = report.matched,
            "Finished identification"
        );
        report
    }
}
