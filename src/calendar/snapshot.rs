use crate::calendar::resolver::{DayResolver, MonthHeading, RolloverResolver, ShowtimeResolver};
use crate::common::error::Result;
use crate::common::types::{ListingKey, ListingRecord};
use chrono_tz::Tz;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// One film entry inside a calendar day, in page order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilmEntry {
    pub title: String,
    pub link: String,
    pub showtime: String,
}

/// One calendar day's film entries. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayBucket {
    pub day: u32,
    pub films: Vec<FilmEntry>,
}

/// Listings keyed by link, iterated in first-seen order.
///
/// Serializes as a JSON object whose keys are the listing links.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalendarSnapshot {
    records: Vec<ListingRecord>,
    index: HashMap<ListingKey, usize>,
}

impl CalendarSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&ListingRecord> {
        self.index.get(key).map(|&i| &self.records[i])
    }

    /// Mutable access to a record. Callers must not change `link`.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut ListingRecord> {
        match self.index.get(key) {
            Some(&i) => Some(&mut self.records[i]),
            None => None,
        }
    }

    /// Insert a record under its link. A record already stored under the
    /// same link is replaced in place and returned; its position is kept.
    pub fn insert(&mut self, record: ListingRecord) -> Option<ListingRecord> {
        match self.index.get(record.key()) {
            Some(&i) => Some(std::mem::replace(&mut self.records[i], record)),
            None => {
                self.index.insert(record.link.clone(), self.records.len());
                self.records.push(record);
                None
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ListingRecord> {
        self.records.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ListingKey> {
        self.records.iter().map(|r| &r.link)
    }

    pub fn into_records(self) -> Vec<ListingRecord> {
        self.records
    }
}

impl FromIterator<ListingRecord> for CalendarSnapshot {
    fn from_iter<I: IntoIterator<Item = ListingRecord>>(iter: I) -> Self {
        let mut snapshot = CalendarSnapshot::new();
        for record in iter {
            snapshot.insert(record);
        }
        snapshot
    }
}

impl Serialize for CalendarSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.records.len()))?;
        for record in &self.records {
            map.serialize_entry(&record.link, record)?;
        }
        map.end()
    }
}

struct SnapshotVisitor;

impl<'de> Visitor<'de> for SnapshotVisitor {
    type Value = CalendarSnapshot;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of listing links to listing records")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
        let mut snapshot = CalendarSnapshot::new();
        while let Some((key, record)) = access.next_entry::<String, ListingRecord>()? {
            if key != record.link {
                return Err(serde::de::Error::custom(format!(
                    "listing key '{}' does not match link '{}'",
                    key, record.link
                )));
            }
            snapshot.insert(record);
        }
        Ok(snapshot)
    }
}

impl<'de> Deserialize<'de> for CalendarSnapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(SnapshotVisitor)
    }
}

/// Folds day buckets into a [`CalendarSnapshot`].
///
/// Each bucket's day number goes through the [`DayResolver`]; each film's
/// showtime text is resolved against that date. Repeated links accumulate
/// showtimes on the first-seen record. Showtime lists are sorted and
/// de-duplicated once every bucket has been consumed.
pub struct SnapshotBuilder<R: DayResolver> {
    days: R,
    showtimes: ShowtimeResolver,
}

impl SnapshotBuilder<RolloverResolver> {
    pub fn for_heading(heading: MonthHeading, tz: Tz) -> Self {
        Self::new(RolloverResolver::new(heading), ShowtimeResolver::new(tz))
    }
}

impl<R: DayResolver> SnapshotBuilder<R> {
    pub fn new(days: R, showtimes: ShowtimeResolver) -> Self {
        Self { days, showtimes }
    }

    pub fn build<I>(mut self, buckets: I) -> Result<CalendarSnapshot>
    where
        I: IntoIterator<Item = DayBucket>,
    {
        let mut snapshot = CalendarSnapshot::new();

        for bucket in buckets {
            let date = self.days.resolve_day(bucket.day)?;
            for film in bucket.films {
                let instant = self.showtimes.resolve(date, &film.showtime)?;
                match snapshot.get_mut(&film.link) {
                    Some(record) => record.showtimes.push(instant),
                    None => {
                        let mut record = ListingRecord::new(film.title, film.link);
                        record.showtimes.push(instant);
                        snapshot.insert(record);
                    }
                }
            }
        }

        for record in snapshot.records.iter_mut() {
            record.normalize_showtimes();
        }

        debug!(listing_count = snapshot.len(), "Built calendar snapshot");
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::ScraperError;
    use chrono::{Datelike, NaiveDate};
    use chrono_tz::America::Los_Angeles;

    fn film(title: &str, link: &str, showtime: &str) -> FilmEntry {
        FilmEntry {
            title: title.to_string(),
            link: link.to_string(),
            showtime: showtime.to_string(),
        }
    }

    fn builder() -> SnapshotBuilder<RolloverResolver> {
        SnapshotBuilder::for_heading(MonthHeading::new(2024, 8).unwrap(), Los_Angeles)
    }

    #[test]
    fn test_repeated_link_accumulates_showtimes() {
        let buckets = vec![
            DayBucket { day: 30, films: vec![film("Alien", "/alien", "7:00 PM"), film("Heat", "/heat", "8:00 PM")] },
            DayBucket { day: 31, films: vec![film("Alien", "/alien", "9:30 PM")] },
            DayBucket { day: 1, films: vec![film("Alien", "/alien", "1:00 PM")] },
        ];
        let snapshot = builder().build(buckets).unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["/alien", "/heat"]);

        let alien = snapshot.get("/alien").unwrap();
        let dates: Vec<NaiveDate> = alien
            .showtimes
            .iter()
            .map(|s| s.in_timezone(Los_Angeles).date_naive())
            .collect();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2024, 8, 30).unwrap(),
                NaiveDate::from_ymd_opt(2024, 8, 31).unwrap(),
                NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
            ]
        );
    }

    #[test]
    fn test_showtimes_sorted_and_deduplicated() {
        // same day listed twice with out-of-order and duplicate times
        let buckets = vec![DayBucket {
            day: 10,
            films: vec![
                film("Heat", "/heat", "9:00 PM"),
                film("Heat", "/heat", "2:00 PM"),
                film("Heat", "/heat", "9:00 PM"),
            ],
        }];
        let snapshot = builder().build(buckets).unwrap();
        let heat = snapshot.get("/heat").unwrap();
        assert_eq!(heat.showtimes.len(), 2);
        assert!(heat.showtimes.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_empty_day_still_advances_resolver() {
        let buckets = vec![
            DayBucket { day: 31, films: vec![] },
            DayBucket { day: 1, films: vec![film("Heat", "/heat", "7:00 PM")] },
        ];
        let snapshot = builder().build(buckets).unwrap();
        let heat = snapshot.get("/heat").unwrap();
        assert_eq!(heat.showtimes[0].in_timezone(Los_Angeles).month(), 9);
    }

    #[test]
    fn test_unparsable_showtime_aborts_build() {
        let buckets = vec![DayBucket { day: 1, films: vec![film("Heat", "/heat", "late")] }];
        let err = builder().build(buckets).unwrap_err();
        assert!(matches!(err, ScraperError::InvalidShowtime(_)));
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut snapshot: CalendarSnapshot = vec![
            ListingRecord::new("A", "/a"),
            ListingRecord::new("B", "/b"),
        ]
        .into_iter()
        .collect();
        let old = snapshot.insert(ListingRecord::new("A2", "/a")).unwrap();
        assert_eq!(old.title, "A");
        assert_eq!(snapshot.iter().map(|r| r.title.as_str()).collect::<Vec<_>>(), vec!["A2", "B"]);
    }

    #[test]
    fn test_serializes_as_ordered_object() {
        let snapshot: CalendarSnapshot = ["/z", "/a"]
            .iter()
            .map(|l| ListingRecord::new("t", *l))
            .collect();
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.find("/z").unwrap() < json.find("/a").unwrap());

        let back: CalendarSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_deserialize_rejects_key_link_mismatch() {
        let json = r#"{"/a": {"title": "t", "link": "/b", "showtimes": []}}"#;
        assert!(serde_json::from_str::<CalendarSnapshot>(json).is_err());
    }
}
