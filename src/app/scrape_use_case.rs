use crate::app::lookup::{LookupClient, LookupOutcome};
use crate::app::ports::{HttpRequest, PacingPort};
use crate::calendar::merge::{merge, MergeDecision};
use crate::calendar::parser::{parse_calendar, parse_detail};
use crate::calendar::snapshot::CalendarSnapshot;
use crate::common::constants::VENUE_NAME;
use crate::common::error::{Result, ScraperError};
use crate::observability::metrics;
use chrono_tz::Tz;
use reqwest::Url;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Counts describing one scrape run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapeReport {
    pub listing_count: usize,
    pub reused: usize,
    pub enriched: usize,
    pub detail_failures: usize,
    pub dropped: usize,
    pub duration_secs: f64,
}

pub struct ScrapeUseCase {
    lookup: Arc<LookupClient>,
    pacing: Arc<dyn PacingPort>,
    calendar_url: Url,
    tz: Tz,
    jitter_ms: (u64, u64),
}

impl ScrapeUseCase {
    pub fn new(
        lookup: Arc<LookupClient>,
        pacing: Arc<dyn PacingPort>,
        calendar_url: &str,
        tz: Tz,
        jitter_ms: (u64, u64),
    ) -> Result<Self> {
        let calendar_url = Url::parse(calendar_url)
            .map_err(|e| ScraperError::Config(format!("Invalid calendar url '{}': {}", calendar_url, e)))?;
        Ok(Self {
            lookup,
            pacing,
            calendar_url,
            tz,
            jitter_ms,
        })
    }

    /// Fetch and parse the calendar page into a fresh snapshot.
    ///
    /// Without the calendar page there is no date baseline, so a failed
    /// lookup here aborts the run.
    #[instrument(skip(self), fields(url = %self.calendar_url))]
    pub async fn fetch_calendar(&self) -> Result<CalendarSnapshot> {
        let request = HttpRequest::get(self.calendar_url.as_str());
        let response = match self.lookup.execute(&request).await {
            LookupOutcome::Succeeded(response) => response,
            LookupOutcome::Failed { status, reason } => {
                return Err(ScraperError::Api {
                    message: format!("calendar fetch failed (status {:?}): {}", status, reason),
                })
            }
            LookupOutcome::Exhausted { attempts } => {
                return Err(ScraperError::Api {
                    message: format!("calendar fetch rate limited {} times", attempts),
                })
            }
        };

        let page = parse_calendar(&response.text(), &self.calendar_url)?;
        let snapshot = page.into_snapshot(self.tz)?;
        metrics::scrape::listings_scraped(snapshot.len());
        info!(listing_count = snapshot.len(), "Scraped calendar");
        Ok(snapshot)
    }

    /// Merge `fresh` with `prior` and fetch detail pages for every listing
    /// the merge schedules for enrichment, in first-seen order.
    pub async fn merge_and_enrich(
        &self,
        fresh: CalendarSnapshot,
        prior: Option<CalendarSnapshot>,
    ) -> (CalendarSnapshot, ScrapeReport) {
        let outcome = merge(fresh, prior);
        let mut report = ScrapeReport {
            listing_count: outcome.snapshot.len(),
            reused: outcome.reused,
            dropped: outcome.dropped,
            ..ScrapeReport::default()
        };
        metrics::scrape::listings_reused(outcome.reused);
        metrics::scrape::listings_dropped(outcome.dropped);

        let decisions: Vec<(String, String, MergeDecision)> = outcome
            .snapshot
            .iter()
            .map(|r| {
                let decision = outcome.decision(&r.link).unwrap_or(MergeDecision::Enrich);
                (r.link.clone(), r.title.clone(), decision)
            })
            .collect();
        let mut snapshot = outcome.snapshot;

        let mut lookups = 0usize;
        for (index, (key, title, decision)) in decisions.into_iter().enumerate() {
            if decision == MergeDecision::Reuse {
                info!(listing = %title, index, decision = "reuse", "Skipping listing in prior output");
                continue;
            }
            info!(listing = %title, index, decision = "enrich", "Fetching listing detail");

            if lookups > 0 {
                self.pacing.pause(self.jitter_ms).await;
            }
            lookups += 1;

            let outcome = self.lookup.execute(&HttpRequest::get(key.as_str())).await;
            match outcome.into_option() {
                Some(response) => {
                    let detail = parse_detail(&response.text());
                    if let Some(record) = snapshot.get_mut(&key) {
                        record.detail = Some(detail);
                    }
                    report.enriched += 1;
                    metrics::scrape::listing_enriched();
                }
                None => {
                    warn!(listing = %title, index, link = %key, "No detail for listing");
                    report.detail_failures += 1;
                }
            }
        }

        (snapshot, report)
    }

    /// Full scrape: calendar, merge with `prior`, detail enrichment
    pub async fn run(&self, prior: Option<CalendarSnapshot>) -> Result<(CalendarSnapshot, ScrapeReport)> {
        let start = Instant::now();
        info!(venue = VENUE_NAME, url = %self.calendar_url, "Starting scrape");

        let fresh = self.fetch_calendar().await?;
        let (snapshot, mut report) = self.merge_and_enrich(fresh, prior).await;
        report.duration_secs = start.elapsed().as_secs_f64();

        info!(
            listing_count = report.listing_count,
            reused = report.reused,
            enriched = report.enriched,
            detail_failures = report.detail_failures,
            dropped = report.dropped,
            duration_secs = report.duration_secs,
            "Finished scrape"
        );
        Ok((snapshot, report))
    }
}
