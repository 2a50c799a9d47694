//! Calendar scraping core: date inference, snapshot building, cross-run merge

pub mod merge;
pub mod parser;
pub mod resolver;
pub mod snapshot;

pub use merge::{merge, MergeDecision, MergeOutcome};
pub use parser::{parse_calendar, parse_detail, CalendarPage};
pub use resolver::{DayResolver, MonthHeading, RolloverResolver, ShowtimeResolver};
pub use snapshot::{CalendarSnapshot, DayBucket, FilmEntry, SnapshotBuilder};
