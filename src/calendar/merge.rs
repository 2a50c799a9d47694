//! Cross-run merge of a fresh calendar snapshot with a prior enriched one.
//!
//! A listing the prior snapshot already enriched keeps every enrichment
//! field it carried and only gains showtimes. A listing absent from the
//! prior snapshot, or present there without detail, is scheduled for
//! enrichment. Listings that fell off the current calendar window are
//! dropped.

use crate::calendar::snapshot::CalendarSnapshot;
use crate::common::types::ListingKey;
use std::collections::HashMap;

/// What the enrichment pipeline should do with a merged listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    /// Prior enrichment carried forward; no further lookups
    Reuse,
    /// New or never enriched; detail fetch, extraction and identification pending
    Enrich,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub snapshot: CalendarSnapshot,
    /// Keys scheduled for enrichment, in first-seen order
    pub pending: Vec<ListingKey>,
    pub reused: usize,
    /// Prior listings no longer on the calendar
    pub dropped: usize,
    decisions: HashMap<ListingKey, MergeDecision>,
}

impl MergeOutcome {
    pub fn decision(&self, key: &str) -> Option<MergeDecision> {
        self.decisions.get(key).copied()
    }
}

/// Merge `new` with an optional `prior` snapshot.
///
/// The result holds exactly the keys of `new`, in `new`'s order. For a key
/// present in both, the record is `prior`'s with its showtimes replaced by
/// the ascending de-duplicated union of both showtime lists. A prior record
/// without `detail` still contributes its showtimes but is scheduled for
/// enrichment again. Re-merging the result with the same `new` snapshot
/// yields the same snapshot.
pub fn merge(new: CalendarSnapshot, prior: Option<CalendarSnapshot>) -> MergeOutcome {
    let mut merged = CalendarSnapshot::new();
    let mut pending = Vec::new();
    let mut decisions = HashMap::with_capacity(new.len());
    let mut reused = 0;

    let dropped = prior
        .as_ref()
        .map(|p| p.keys().filter(|k| !new.contains_key(k)).count())
        .unwrap_or(0);

    for fresh in new.into_records() {
        let key = fresh.link.clone();
        let decision = match prior.as_ref().and_then(|p| p.get(fresh.key())) {
            Some(carried) => {
                let mut carried = carried.clone();
                carried.absorb_showtimes(fresh.showtimes);
                let decision = if carried.detail.is_some() {
                    MergeDecision::Reuse
                } else {
                    MergeDecision::Enrich
                };
                merged.insert(carried);
                decision
            }
            None => {
                merged.insert(fresh);
                MergeDecision::Enrich
            }
        };

        match decision {
            MergeDecision::Reuse => reused += 1,
            MergeDecision::Enrich => pending.push(key.clone()),
        }
        decisions.insert(key, decision);
    }

    MergeOutcome {
        snapshot: merged,
        pending,
        reused,
        dropped,
        decisions,
    }
}
