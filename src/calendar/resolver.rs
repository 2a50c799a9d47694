//! Date inference for calendar pages that list bare day-of-month numbers.
//!
//! The calendar names a single month and year in its heading and then walks
//! day numbers in page order. A day number smaller than the one before it
//! means the page crossed into the next month. That heuristic lives here
//! behind [`DayResolver`] so a stricter date source can replace it without
//! touching the snapshot builder.

use crate::common::error::{Result, ScraperError};
use crate::common::types::ShowtimeInstant;
use chrono::{Month, NaiveDate, NaiveTime};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use std::str::FromStr;

static HEADING_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z]+)\s+(\d{4})(?:\s|$)").expect("heading regex should compile")
});

// Accepted showtime layouts, tried in order
const SHOWTIME_FORMATS: [&str; 2] = ["%I:%M %p", "%I:%M%p"];

/// Month and year named by the calendar heading, e.g. "August 2024"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthHeading {
    pub year: i32,
    pub month: u32,
}

impl MonthHeading {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(ScraperError::MissingHeading(format!("month {} out of range", month)));
        }
        Ok(Self { year, month })
    }
}

impl FromStr for MonthHeading {
    type Err = ScraperError;

    fn from_str(text: &str) -> Result<Self> {
        let captures = HEADING_PATTERN
            .captures(text)
            .ok_or_else(|| ScraperError::MissingHeading(text.to_string()))?;
        let month = Month::from_str(&captures[1])
            .map_err(|_| ScraperError::MissingHeading(text.to_string()))?;
        let year: i32 = captures[2]
            .parse()
            .map_err(|_| ScraperError::MissingHeading(text.to_string()))?;
        Self::new(year, month.number_from_month())
    }
}

/// Maps each day number, in page order, to a calendar date
pub trait DayResolver {
    fn resolve_day(&mut self, day: u32) -> Result<NaiveDate>;
}

/// Infers month and year rollover from a decreasing day number.
///
/// The first day seen never rolls over. Every later day that is smaller than
/// its predecessor advances the month by one, wrapping December into January
/// of the next year.
#[derive(Debug, Clone)]
pub struct RolloverResolver {
    year: i32,
    month: u32,
    prev_day: Option<u32>,
}

impl RolloverResolver {
    pub fn new(heading: MonthHeading) -> Self {
        Self {
            year: heading.year,
            month: heading.month,
            prev_day: None,
        }
    }

    /// Current `(year, month)` cursor
    pub fn cursor(&self) -> (i32, u32) {
        (self.year, self.month)
    }

    fn advance_month(&mut self) {
        if self.month == 12 {
            self.month = 1;
            self.year += 1;
        } else {
            self.month += 1;
        }
    }
}

impl DayResolver for RolloverResolver {
    fn resolve_day(&mut self, day: u32) -> Result<NaiveDate> {
        if let Some(prev) = self.prev_day {
            if day < prev {
                self.advance_month();
                tracing::debug!(year = self.year, month = self.month, "Calendar rolled into next month");
            }
        }
        self.prev_day = Some(day);

        NaiveDate::from_ymd_opt(self.year, self.month, day).ok_or(ScraperError::InvalidDate {
            year: self.year,
            month: self.month,
            day,
        })
    }
}

/// Combines a resolved date with showtime text in the theater's timezone
#[derive(Debug, Clone, Copy)]
pub struct ShowtimeResolver {
    tz: Tz,
}

impl ShowtimeResolver {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Parse "7:00 PM" style text into a civil time
    pub fn parse_time(text: &str) -> Result<NaiveTime> {
        let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
        SHOWTIME_FORMATS
            .iter()
            .find_map(|format| NaiveTime::parse_from_str(&cleaned, format).ok())
            .ok_or_else(|| ScraperError::InvalidShowtime(text.to_string()))
    }

    pub fn resolve(&self, date: NaiveDate, showtime: &str) -> Result<ShowtimeInstant> {
        let time = Self::parse_time(showtime)?;
        ShowtimeInstant::localize(date, time, self.tz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use chrono_tz::America::Los_Angeles;

    fn resolve_all(heading: MonthHeading, days: &[u32]) -> Vec<NaiveDate> {
        let mut resolver = RolloverResolver::new(heading);
        days.iter().map(|d| resolver.resolve_day(*d).unwrap()).collect()
    }

    #[test]
    fn test_parse_heading() {
        let heading: MonthHeading = "August 2024".parse().unwrap();
        assert_eq!(heading, MonthHeading { year: 2024, month: 8 });

        let padded: MonthHeading = "  December   2025 ".parse().unwrap();
        assert_eq!(padded, MonthHeading { year: 2025, month: 12 });
    }

    #[test]
    fn test_parse_heading_ignores_trailing_words() {
        let heading: MonthHeading = "August 2024 Calendar".parse().unwrap();
        assert_eq!(heading, MonthHeading { year: 2024, month: 8 });
        assert!(matches!("August 20245".parse::<MonthHeading>(), Err(ScraperError::MissingHeading(_))));
    }

    #[test]
    fn test_parse_heading_rejects_garbage() {
        assert!(matches!("".parse::<MonthHeading>(), Err(ScraperError::MissingHeading(_))));
        assert!(matches!("Smarch 2024".parse::<MonthHeading>(), Err(ScraperError::MissingHeading(_))));
        assert!(matches!("August".parse::<MonthHeading>(), Err(ScraperError::MissingHeading(_))));
    }

    #[test]
    fn test_rollover_at_single_decrease() {
        let dates = resolve_all(MonthHeading::new(2024, 8).unwrap(), &[1, 2, 3, 31, 1, 2]);
        let expected: Vec<NaiveDate> = [(8, 1), (8, 2), (8, 3), (8, 31), (9, 1), (9, 2)]
            .iter()
            .map(|(m, d)| NaiveDate::from_ymd_opt(2024, *m, *d).unwrap())
            .collect();
        assert_eq!(dates, expected);
    }

    #[test]
    fn test_first_day_never_rolls_over() {
        let mut resolver = RolloverResolver::new(MonthHeading::new(2024, 8).unwrap());
        let date = resolver.resolve_day(30).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 8, 30).unwrap());
        assert_eq!(resolver.cursor(), (2024, 8));
    }

    #[test]
    fn test_repeated_day_does_not_roll_over() {
        let dates = resolve_all(MonthHeading::new(2024, 8).unwrap(), &[5, 5, 6]);
        assert!(dates.iter().all(|d| d.month() == 8));
    }

    #[test]
    fn test_december_wraps_into_next_year() {
        let dates = resolve_all(MonthHeading::new(2024, 12).unwrap(), &[30, 31, 1]);
        assert_eq!(dates[2], NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
    }

    #[test]
    fn test_month_advances_exactly_once_per_decrease() {
        // one embedded wraparound at every possible position
        for split in 1..10u32 {
            let days: Vec<u32> = (20..20 + split).chain(1..(10 - split + 1)).collect();
            let mut resolver = RolloverResolver::new(MonthHeading::new(2024, 3).unwrap());
            let mut advances = 0;
            let mut last = resolver.cursor();
            for d in days {
                resolver.resolve_day(d).unwrap();
                if resolver.cursor() != last {
                    advances += 1;
                    last = resolver.cursor();
                }
            }
            assert_eq!(advances, 1, "split at {}", split);
            assert_eq!(resolver.cursor(), (2024, 4));
        }
    }

    #[test]
    fn test_impossible_date_is_an_error() {
        let mut resolver = RolloverResolver::new(MonthHeading::new(2024, 9).unwrap());
        let err = resolver.resolve_day(31).unwrap_err();
        assert!(matches!(err, ScraperError::InvalidDate { year: 2024, month: 9, day: 31 }));
    }

    #[test]
    fn test_parse_time_formats() {
        let seven_pm = NaiveTime::from_hms_opt(19, 0, 0).unwrap();
        assert_eq!(ShowtimeResolver::parse_time("7:00 PM").unwrap(), seven_pm);
        assert_eq!(ShowtimeResolver::parse_time(" 07:00  pm ").unwrap(), seven_pm);
        assert_eq!(ShowtimeResolver::parse_time("7:00pm").unwrap(), seven_pm);
        assert_eq!(
            ShowtimeResolver::parse_time("12:15 AM").unwrap(),
            NaiveTime::from_hms_opt(0, 15, 0).unwrap()
        );
        assert!(matches!(
            ShowtimeResolver::parse_time("tba"),
            Err(ScraperError::InvalidShowtime(_))
        ));
    }

    #[test]
    fn test_resolve_localizes_to_theater_zone() {
        let resolver = ShowtimeResolver::new(Los_Angeles);
        let date = NaiveDate::from_ymd_opt(2024, 12, 24).unwrap();
        let showtime = resolver.resolve(date, "6:30 PM").unwrap();
        assert_eq!(showtime.to_string(), "2024-12-24T18:30:00-08:00");
    }
}
