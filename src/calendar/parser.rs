use crate::calendar::resolver::MonthHeading;
use crate::calendar::snapshot::{CalendarSnapshot, DayBucket, FilmEntry, SnapshotBuilder};
use crate::common::error::{Result, ScraperError};
use crate::common::types::ListingDetail;
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector should parse")
}

static MONTH_TITLE: Lazy<Selector> = Lazy::new(|| selector(".calendar-block__month-title"));
static DAY_ITEM: Lazy<Selector> = Lazy::new(|| selector(".calendar-day-item"));
static DAY_NUMBER: Lazy<Selector> = Lazy::new(|| selector(".calendar-day"));
static FILM: Lazy<Selector> = Lazy::new(|| selector(".film"));
static FILM_LINK: Lazy<Selector> = Lazy::new(|| selector("a[href]"));
static FILM_TITLE: Lazy<Selector> = Lazy::new(|| selector(".film-title"));
static FILM_SHOWTIME: Lazy<Selector> = Lazy::new(|| selector(".film-showtime"));

static DETAIL_LABEL: Lazy<Selector> = Lazy::new(|| selector("h5.content-film__film-details-title"));
static DETAIL_CONTENT: Lazy<Selector> = Lazy::new(|| selector("div.content-film__content.content"));

/// A parsed calendar page: its month heading and day buckets in page order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarPage {
    pub heading: MonthHeading,
    pub days: Vec<DayBucket>,
}

impl CalendarPage {
    pub fn into_snapshot(self, tz: Tz) -> Result<CalendarSnapshot> {
        SnapshotBuilder::for_heading(self.heading, tz).build(self.days)
    }
}

fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(parent: &ElementRef, sel: &Selector) -> Option<String> {
    parent
        .select(sel)
        .next()
        .map(|e| element_text(&e))
        .filter(|t| !t.is_empty())
}

/// Resolve `href` against the page URL; absolute links pass through
fn absolutize(base: &Url, href: &str) -> String {
    match Url::parse(href) {
        Ok(url) => url.to_string(),
        Err(_) => base
            .join(href)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| href.to_string()),
    }
}

/// Parse the theater calendar page.
///
/// A missing or unparsable month heading, or a day cell whose number cannot
/// be read, is an input-contract violation. Film entries missing a link,
/// title or showtime are skipped with a warning.
pub fn parse_calendar(html: &str, base: &Url) -> Result<CalendarPage> {
    let document = Html::parse_document(html);

    let heading_text = document
        .select(&MONTH_TITLE)
        .next()
        .map(|e| element_text(&e))
        .ok_or_else(|| ScraperError::MissingHeading("no month title on calendar page".into()))?;
    let heading: MonthHeading = heading_text.parse()?;
    debug!(year = heading.year, month = heading.month, "Parsed calendar heading");

    let mut days = Vec::new();
    for day_item in document.select(&DAY_ITEM) {
        let day_text = first_text(&day_item, &DAY_NUMBER)
            .ok_or_else(|| ScraperError::MissingField("calendar day number".into()))?;
        let day: u32 = day_text
            .parse()
            .map_err(|_| ScraperError::MissingField(format!("unparsable day number '{}'", day_text)))?;

        let mut films = Vec::new();
        for film in day_item.select(&FILM) {
            let link = film
                .select(&FILM_LINK)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(str::trim)
                .filter(|h| !h.is_empty());
            let title = first_text(&film, &FILM_TITLE);
            let showtime = first_text(&film, &FILM_SHOWTIME);

            match (link, title, showtime) {
                (Some(link), Some(title), Some(showtime)) => films.push(FilmEntry {
                    title,
                    link: absolutize(base, link),
                    showtime,
                }),
                (link, title, _) => {
                    warn!(day, ?link, ?title, "Skipping incomplete film entry");
                }
            }
        }

        days.push(DayBucket { day, films });
    }

    debug!(day_count = days.len(), "Parsed calendar days");
    Ok(CalendarPage { heading, days })
}

/// Text node immediately following a labelled `<h5>` on the detail page
fn labelled_value(document: &Html, label: &str) -> Option<String> {
    document
        .select(&DETAIL_LABEL)
        .find(|h5| element_text(h5) == label)
        .and_then(|h5| h5.next_sibling())
        .and_then(|node| node.value().as_text().map(|t| t.trim().to_string()))
        .filter(|t| !t.is_empty())
}

/// Parse a listing's detail page. Missing pieces come back as `None`.
pub fn parse_detail(html: &str) -> ListingDetail {
    let document = Html::parse_document(html);

    let year = labelled_value(&document, "Year").and_then(|y| y.parse::<i32>().ok());
    let directors = labelled_value(&document, "Director");
    let content = document
        .select(&DETAIL_CONTENT)
        .next()
        .map(|e| e.inner_html());

    ListingDetail {
        year,
        directors,
        content,
    }
}
