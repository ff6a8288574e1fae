//! End-of-serialization heuristic.

use chrono::{NaiveDate, Utc};

use crate::store::{Book, BookStatus};

/// Default completion keywords, simplified and traditional forms.
///
/// Sites can override the list per configuration; the chapter-index
/// end-matter check always uses this fixed set.
pub const DEFAULT_END_KEYWORDS: &[&str] = &[
    "后记", "後記", "大结局", "大結局", "完本", "完结", "完結", "全本", "终章", "終章", "尾声",
    "尾聲", "番外",
];

/// A book whose last parseable update is older than this is stale.
const STALE_AFTER_DAYS: i64 = 365;

/// Decides whether a book has finished serializing.
///
/// Fires when the latest chapter title carries a completion keyword on a
/// fresh update, or when the book has not been updated for over a year.
/// Staleness requires the vendor date to parse under `date_layout`; an
/// unparseable date never triggers it, and a book already archived
/// (`Download` status) is never re-judged stale.
#[must_use]
pub fn should_end(book: &Book, updated: bool, date_layout: &str, keywords: &[String]) -> bool {
    let keyword_match = keywords
        .iter()
        .any(|keyword| !keyword.is_empty() && book.update_chapter.contains(keyword.as_str()));
    if updated && keyword_match {
        return true;
    }

    if book.status != BookStatus::Download
        && let Ok(date) = NaiveDate::parse_from_str(&book.update_date, date_layout)
    {
        let age = Utc::now().date_naive().signed_duration_since(date);
        if age.num_days() > STALE_AFTER_DAYS {
            return true;
        }
    }

    false
}
