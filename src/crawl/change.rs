//! Change detection between a persisted book and freshly fetched metadata.

use crate::store::{Book, BookStatus};
use crate::vendor::BookInfo;

/// Outcome of comparing fetched metadata against the persisted edition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Change {
    /// Title, writer, or kind changed on a healthy book: mint a new edition.
    pub new_edition: bool,
    /// Any of the five vendor fields changed: apply the update.
    pub updated: bool,
}

/// Compares fetched metadata against the persisted book.
///
/// Identity-bearing fields (title, writer, kind) changing on a healthy book
/// fork a new edition. The same change on an `Error`-status book does not:
/// error placeholders recover into their existing edition instead of
/// accumulating spurious forks.
#[must_use]
pub fn detect_change(book: &Book, info: &BookInfo) -> Change {
    let identity_changed = book.title != info.title
        || book.writer_name() != info.writer
        || book.kind != info.kind;
    let updated = identity_changed
        || book.update_date != info.update_date
        || book.update_chapter != info.update_chapter;

    Change {
        new_edition: identity_changed && book.status != BookStatus::Error,
        updated,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::Writer;

    fn tracked_book() -> Book {
        let mut book = Book::discovered("qd", 12);
        book.apply_update(
            &info("诛仙", "萧鼎", "仙侠", "2025-01-01", "第一章"),
            Writer {
                id: 7,
                name: "萧鼎".to_string(),
            },
        );
        book
    }

    fn info(title: &str, writer: &str, kind: &str, date: &str, chapter: &str) -> BookInfo {
        BookInfo {
            title: title.to_string(),
            writer: writer.to_string(),
            kind: kind.to_string(),
            update_date: date.to_string(),
            update_chapter: chapter.to_string(),
        }
    }

    #[test]
    fn test_identical_fields_report_no_change() {
        let book = tracked_book();
        let change = detect_change(&book, &info("诛仙", "萧鼎", "仙侠", "2025-01-01", "第一章"));
        assert!(!change.new_edition);
        assert!(!change.updated);
    }

    #[test]
    fn test_date_or_chapter_change_updates_without_forking() {
        let book = tracked_book();
        let change = detect_change(&book, &info("诛仙", "萧鼎", "仙侠", "2025-02-01", "第二章"));
        assert!(!change.new_edition);
        assert!(change.updated);
    }

    #[test]
    fn test_title_change_on_healthy_book_forks_edition() {
        let book = tracked_book();
        let change = detect_change(
            &book,
            &info("诛仙·新版", "萧鼎", "仙侠", "2025-01-01", "第一章"),
        );
        assert!(change.new_edition);
        assert!(change.updated);
    }

    #[test]
    fn test_writer_change_forks_edition() {
        let book = tracked_book();
        let change = detect_change(&book, &info("诛仙", "耳根", "仙侠", "2025-01-01", "第一章"));
        assert!(change.new_edition);
    }

    #[test]
    fn test_kind_change_forks_edition() {
        let book = tracked_book();
        let change = detect_change(&book, &info("诛仙", "萧鼎", "玄幻", "2025-01-01", "第一章"));
        assert!(change.new_edition);
    }

    #[test]
    fn test_error_status_suppresses_edition_fork() {
        // a discovery placeholder differs in every field from the first
        // successful fetch, but recovers into the same edition
        let book = Book::discovered("qd", 12);
        let change = detect_change(&book, &info("诛仙", "萧鼎", "仙侠", "2025-01-01", "第一章"));
        assert!(!change.new_edition);
        assert!(change.updated);
    }

    #[test]
    fn test_error_status_with_identity_change_still_updates() {
        let mut book = tracked_book();
        book.status = BookStatus::Error;
        let change = detect_change(
            &book,
            &info("诛仙·新版", "萧鼎", "仙侠", "2025-01-01", "第一章"),
        );
        assert!(!change.new_edition);
        assert!(change.updated);
    }
}
