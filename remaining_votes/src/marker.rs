//! Text extraction from profile pages
//!
//! Profile pages are not parsed as HTML. Vote entries are found by their
//! relative-time span and the daily total by the fragment the top activity
//! tab renders it in.

use once_cell::sync::Lazy;
use regex::Regex;
use time::{Date, OffsetDateTime};

static TODAY_TOTAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<div class="fs-body3 fc-dark">\s*(\d+)\s*</div>\s*today"#)
        .expect("Invalid regex pattern provided")
});

/// The current UTC calendar date.
#[must_use]
pub fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

/// Counts date markers for one calendar day.
#[derive(Debug, Clone)]
pub struct DateMarker {
    date: String,
    pattern: Regex,
}

impl DateMarker {
    /// Create a new `DateMarker` matching `date`.
    ///
    /// # Panics
    ///
    /// Panics if the escaped date does not form a valid pattern.
    #[must_use]
    pub fn new(date: Date) -> Self {
        let date = format!(
            "{year:04}-{month:02}-{day:02}",
            year = date.year(),
            month = u8::from(date.month()),
            day = date.day()
        );
        // The title attribute of a relative-time span begins with the ISO 8601
        // date of the event, e.g. `2026-10-16 09:14:03Z`. The title must not
        // run past its closing quote or an earlier span could swallow a
        // marker of this date.
        let pattern = Regex::new(&format!(
            r#"<span title="{date}[^"]*" class="relativetime">"#,
            date = regex::escape(&date)
        ))
        .expect("Invalid regex pattern provided");
        Self { date, pattern }
    }

    /// The date matched, as `YYYY-MM-DD`.
    #[must_use]
    pub fn date(&self) -> &str {
        &self.date
    }

    /// Count the markers in `body` stamped with this date.
    #[must_use]
    pub fn count(&self, body: &str) -> u32 {
        let count = self.pattern.find_iter(body).count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }
}

/// Extract the number of votes cast today from a top activity page.
///
/// Returns `None` if the fragment is absent or its number does not fit.
#[must_use]
pub fn today_total(body: &str) -> Option<u32> {
    TODAY_TOTAL
        .captures(body)
        .and_then(|caps| caps[1].parse().ok())
}
