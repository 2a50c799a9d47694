//! Counters for the scrape and enrichment stages.
//!
//! Recorded through the `metrics` facade; without an installed recorder
//! every call is a no-op, so library users pay nothing unless they opt in.

use std::fmt;

/// Every metric name the crate records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Resilient lookup client
    LookupAttempts,
    LookupSucceeded,
    LookupRateLimited,
    LookupFailed,
    LookupExhausted,

    // Scrape and merge
    ListingsScraped,
    ListingsReused,
    ListingsEnriched,
    ListingsDropped,

    // Downstream enrichment
    MoviesExtracted,
    MoviesIdentified,
    ImportRowsWritten,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::LookupAttempts => "roxie_lookup_attempts_total",
            MetricName::LookupSucceeded => "roxie_lookup_succeeded_total",
            MetricName::LookupRateLimited => "roxie_lookup_rate_limited_total",
            MetricName::LookupFailed => "roxie_lookup_failed_total",
            MetricName::LookupExhausted => "roxie_lookup_exhausted_total",

            MetricName::ListingsScraped => "roxie_listings_scraped_total",
            MetricName::ListingsReused => "roxie_listings_reused_total",
            MetricName::ListingsEnriched => "roxie_listings_enriched_total",
            MetricName::ListingsDropped => "roxie_listings_dropped_total",

            MetricName::MoviesExtracted => "roxie_movies_extracted_total",
            MetricName::MoviesIdentified => "roxie_movies_identified_total",
            MetricName::ImportRowsWritten => "roxie_import_rows_written_total",
        }
    }
}

// ============================================================================
// Lookup Metrics
// ============================================================================

pub mod lookup {
    use super::MetricName;

    pub fn attempt() {
        ::metrics::counter!(MetricName::LookupAttempts.as_str()).increment(1);
    }

    pub fn succeeded() {
        ::metrics::counter!(MetricName::LookupSucceeded.as_str()).increment(1);
    }

    pub fn rate_limited() {
        ::metrics::counter!(MetricName::LookupRateLimited.as_str()).increment(1);
    }

    pub fn failed() {
        ::metrics::counter!(MetricName::LookupFailed.as_str()).increment(1);
    }

    pub fn exhausted() {
        ::metrics::counter!(MetricName::LookupExhausted.as_str()).increment(1);
    }
}

// ============================================================================
// Scrape Metrics
// ============================================================================

pub mod scrape {
    use super::MetricName;

    pub fn listings_scraped(count: usize) {
        ::metrics::counter!(MetricName::ListingsScraped.as_str()).increment(count as u64);
    }

    pub fn listings_reused(count: usize) {
        ::metrics::counter!(MetricName::ListingsReused.as_str()).increment(count as u64);
    }

    pub fn listing_enriched() {
        ::metrics::counter!(MetricName::ListingsEnriched.as_str()).increment(1);
    }

    pub fn listings_dropped(count: usize) {
        ::metrics::counter!(MetricName::ListingsDropped.as_str()).increment(count as u64);
    }
}

// ============================================================================
// Enrichment Metrics
// ============================================================================

pub mod enrich {
    use super::MetricName;

    pub fn movies_extracted(count: usize) {
        ::metrics::counter!(MetricName::MoviesExtracted.as_str()).increment(count as u64);
    }

    pub fn movie_identified() {
        ::metrics::counter!(MetricName::MoviesIdentified.as_str()).increment(1);
    }

    pub fn import_rows_written(count: usize) {
        ::metrics::counter!(MetricName::ImportRowsWritten.as_str()).increment(count as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_prefixed() {
        let names = [
            MetricName::LookupAttempts,
            MetricName::LookupExhausted,
            MetricName::ListingsReused,
            MetricName::ImportRowsWritten,
        ];
        for name in names {
            assert!(name.as_str().starts_with("roxie_"));
            assert_eq!(name.to_string(), name.as_str());
        }
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        lookup::attempt();
        scrape::listings_scraped(3);
        enrich::movies_extracted(2);
    }
}
