//! Store module for book, writer, and error-record persistence.
//!
//! This module provides `SQLite`-backed tracking of every book edition a
//! site has ever shown, plus the writers they reference and the last error
//! recorded per book.
//!
//! # Overview
//!
//! The store consists of:
//! - [`BookStore`] - Main interface for persistence operations
//! - [`Book`] / [`Writer`] / [`ErrorRecord`] - Persisted entities
//! - [`BookStatus`] - Book lifecycle states
//! - [`SiteSummary`] - Aggregate statistics per site
//! - [`StoreError`] - Operation error types
//!
//! # Example
//!
//! ```no_run
//! use novelkeeper_core::store::{Book, BookStore};
//! use novelkeeper_core::Database;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(Path::new("novelkeeper.db")).await?;
//! let store = BookStore::new(db);
//!
//! // Discovery mints an empty error-status placeholder
//! store.create_book(&Book::discovered("qd", 12)).await?;
//!
//! // Id-only lookups return the current edition
//! if let Some(book) = store.find_book_by_id("qd", 12).await? {
//!     println!("{book}");
//! }
//! # Ok(())
//! # }
//! ```

mod book;
mod error;
mod repository;

pub use book::{Book, BookStatus, ErrorRecord, SiteSummary, Writer};
pub use error::{StoreDbErrorKind, StoreError};
pub use repository::BookRepository;

use std::collections::BTreeMap;

use sqlx::{FromRow, Row};
use tracing::instrument;

use crate::db::Database;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Returns `Ok(())` if at least one row was affected; otherwise
/// [`StoreError::BookNotFound`] for the book's identity.
fn check_affected(book: &Book, rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        Err(StoreError::book_not_found(
            &book.site,
            book.id,
            book.hash_code,
        ))
    } else {
        Ok(())
    }
}

/// Joined projection shared by every book query.
const BOOK_COLUMNS: &str = "b.site, b.id, b.hash_code, b.title, b.writer_id, b.kind, \
     b.update_date, b.update_chapter, b.status, b.is_downloaded, b.created_at, b.updated_at, \
     w.name AS writer_name";

/// Filter selecting only the highest hash code per `(site, id)` slot.
const CURRENT_EDITION: &str = "b.hash_code = (SELECT MAX(b2.hash_code) FROM books b2 \
     WHERE b2.site = b.site AND b2.id = b.id)";

/// Raw row shape of the book/writer join, mapped into [`Book`].
#[derive(Debug, FromRow)]
struct BookRow {
    site: String,
    id: u32,
    hash_code: u32,
    title: String,
    writer_id: Option<i64>,
    kind: String,
    update_date: String,
    update_chapter: String,
    status: String,
    is_downloaded: bool,
    created_at: String,
    updated_at: String,
    writer_name: Option<String>,
}

impl From<BookRow> for Book {
    fn from(row: BookRow) -> Self {
        let writer = match (row.writer_id, row.writer_name) {
            (Some(id), Some(name)) => Some(Writer { id, name }),
            _ => None,
        };
        Self {
            site: row.site,
            id: row.id,
            hash_code: row.hash_code,
            title: row.title,
            writer,
            kind: row.kind,
            update_date: row.update_date,
            update_chapter: row.update_chapter,
            status: row.status.parse().unwrap_or(BookStatus::Error),
            is_downloaded: row.is_downloaded,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Persistence manager for books, writers, and error records.
///
/// Backed by `SQLite` with WAL mode for concurrent access. Every edition a
/// site has ever shown stays in the table; id-only lookups resolve to the
/// current edition (highest hash code).
#[derive(Debug, Clone)]
pub struct BookStore {
    db: Database,
}

impl BookStore {
    /// Creates a new store over the given database connection.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Inserts a new edition row.
    ///
    /// Discovery passes `hash_code = 0`; edition forks pass the freshly
    /// minted value. Inserting an identity that already exists is a
    /// constraint violation, not an upsert.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails, with kind
    /// `ConstraintViolation` on a duplicate `(site, id, hash_code)`.
    #[instrument(skip(self, book), fields(site = %book.site, id = book.id, hash = book.hash_code))]
    pub async fn create_book(&self, book: &Book) -> Result<()> {
        sqlx::query(
            r"INSERT INTO books (
                site, id, hash_code, title, writer_id, kind,
                update_date, update_chapter, status, is_downloaded
              )
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&book.site)
        .bind(book.id)
        .bind(book.hash_code)
        .bind(&book.title)
        .bind(book.writer.as_ref().map(|writer| writer.id))
        .bind(&book.kind)
        .bind(&book.update_date)
        .bind(&book.update_chapter)
        .bind(book.status.as_str())
        .bind(book.is_downloaded)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    /// Updates the mutable fields of an existing edition row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::BookNotFound`] if no row matches the book's
    /// `(site, id, hash_code)` identity.
    /// Returns [`StoreError::Database`] if the update fails.
    #[instrument(skip(self, book), fields(site = %book.site, id = book.id, hash = book.hash_code))]
    pub async fn update_book(&self, book: &Book) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE books
              SET title = ?,
                  writer_id = ?,
                  kind = ?,
                  update_date = ?,
                  update_chapter = ?,
                  status = ?,
                  is_downloaded = ?,
                  updated_at = datetime('now')
              WHERE site = ? AND id = ? AND hash_code = ?",
        )
        .bind(&book.title)
        .bind(book.writer.as_ref().map(|writer| writer.id))
        .bind(&book.kind)
        .bind(&book.update_date)
        .bind(&book.update_chapter)
        .bind(book.status.as_str())
        .bind(book.is_downloaded)
        .bind(&book.site)
        .bind(book.id)
        .bind(book.hash_code)
        .execute(self.db.pool())
        .await?;

        check_affected(book, result.rows_affected())
    }

    /// Finds the current edition of a book, highest hash code first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self), fields(site = %site, id))]
    pub async fn find_book_by_id(&self, site: &str, id: u32) -> Result<Option<Book>> {
        let sql = format!(
            "SELECT {BOOK_COLUMNS}
             FROM books b LEFT JOIN writers w ON w.id = b.writer_id
             WHERE b.site = ? AND b.id = ?
             ORDER BY b.hash_code DESC
             LIMIT 1"
        );
        let row = sqlx::query_as::<_, BookRow>(&sql)
            .bind(site)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.map(Book::from))
    }

    /// Finds one specific edition by its full identity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self), fields(site = %site, id, hash = hash_code))]
    pub async fn find_book_by_id_hash(
        &self,
        site: &str,
        id: u32,
        hash_code: u32,
    ) -> Result<Option<Book>> {
        let sql = format!(
            "SELECT {BOOK_COLUMNS}
             FROM books b LEFT JOIN writers w ON w.id = b.writer_id
             WHERE b.site = ? AND b.id = ? AND b.hash_code = ?"
        );
        let row = sqlx::query_as::<_, BookRow>(&sql)
            .bind(site)
            .bind(id)
            .bind(hash_code)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.map(Book::from))
    }

    /// Returns the current edition of every book on a site, ordered by id.
    ///
    /// This is the working set of a crawl pass; historical editions are
    /// never re-crawled.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self), fields(site = %site))]
    pub async fn find_books_for_update(&self, site: &str) -> Result<Vec<Book>> {
        let sql = format!(
            "SELECT {BOOK_COLUMNS}
             FROM books b LEFT JOIN writers w ON w.id = b.writer_id
             WHERE b.site = ? AND {CURRENT_EDITION}
             ORDER BY b.id ASC"
        );
        let rows = sqlx::query_as::<_, BookRow>(&sql)
            .bind(site)
            .fetch_all(self.db.pool())
            .await?;

        Ok(rows.into_iter().map(Book::from).collect())
    }

    /// Returns current editions that finished serializing but have no
    /// archive yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self), fields(site = %site))]
    pub async fn find_books_for_download(&self, site: &str) -> Result<Vec<Book>> {
        let sql = format!(
            "SELECT {BOOK_COLUMNS}
             FROM books b LEFT JOIN writers w ON w.id = b.writer_id
             WHERE b.site = ? AND b.status = ? AND b.is_downloaded = 0 AND {CURRENT_EDITION}
             ORDER BY b.id ASC"
        );
        let rows = sqlx::query_as::<_, BookRow>(&sql)
            .bind(site)
            .bind(BookStatus::End.as_str())
            .fetch_all(self.db.pool())
            .await?;

        Ok(rows.into_iter().map(Book::from).collect())
    }

    /// Returns the writer with this name, creating it on first reference.
    ///
    /// Writers are shared across books and sites; a second book by the same
    /// writer reuses the existing row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert or lookup fails.
    #[instrument(skip(self), fields(name = %name))]
    pub async fn save_writer(&self, name: &str) -> Result<Writer> {
        sqlx::query(r"INSERT OR IGNORE INTO writers (name) VALUES (?)")
            .bind(name)
            .execute(self.db.pool())
            .await?;

        let writer = sqlx::query_as::<_, Writer>(r"SELECT id, name FROM writers WHERE name = ?")
            .bind(name)
            .fetch_one(self.db.pool())
            .await?;

        Ok(writer)
    }

    /// Records or clears the error message for a book.
    ///
    /// `Some(message)` overwrites any previous record for `(site, id)`;
    /// `None` removes it, marking the book healthy again.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the write fails.
    #[instrument(skip(self, book, error), fields(site = %book.site, id = book.id, clearing = error.is_none()))]
    pub async fn save_error(&self, book: &Book, error: Option<&str>) -> Result<()> {
        match error {
            Some(message) => {
                sqlx::query(
                    r"INSERT INTO book_errors (site, id, message, updated_at)
                      VALUES (?, ?, ?, datetime('now'))
                      ON CONFLICT(site, id) DO UPDATE SET
                          message = excluded.message,
                          updated_at = excluded.updated_at",
                )
                .bind(&book.site)
                .bind(book.id)
                .bind(message)
                .execute(self.db.pool())
                .await?;
            }
            None => {
                sqlx::query(r"DELETE FROM book_errors WHERE site = ? AND id = ?")
                    .bind(&book.site)
                    .bind(book.id)
                    .execute(self.db.pool())
                    .await?;
            }
        }

        Ok(())
    }

    /// Reads the recorded error for a book, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self), fields(site = %site, id))]
    pub async fn find_error(&self, site: &str, id: u32) -> Result<Option<ErrorRecord>> {
        let record = sqlx::query_as::<_, ErrorRecord>(
            r"SELECT site, id, message, updated_at FROM book_errors WHERE site = ? AND id = ?",
        )
        .bind(site)
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(record)
    }

    /// Highest known book id for a site, 0 when the site has no books.
    ///
    /// Discovery starts probing past this id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self), fields(site = %site))]
    pub async fn max_book_id(&self, site: &str) -> Result<u32> {
        let row = sqlx::query(r"SELECT MAX(id) AS max_id FROM books WHERE site = ?")
            .bind(site)
            .fetch_one(self.db.pool())
            .await?;

        Ok(row.get::<Option<u32>, _>("max_id").unwrap_or(0))
    }

    /// Aggregate statistics for a site.
    ///
    /// Counts of downloads, statuses, and the latest-success id are
    /// computed over current editions only; `book_count` includes
    /// historical editions.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if any query fails.
    #[instrument(skip(self), fields(site = %site))]
    pub async fn stats(&self, site: &str) -> Result<SiteSummary> {
        let counts = sqlx::query(
            r"SELECT COUNT(*) AS book_count, COUNT(DISTINCT id) AS unique_book_count
              FROM books WHERE site = ?",
        )
        .bind(site)
        .fetch_one(self.db.pool())
        .await?;

        let error_count =
            sqlx::query(r"SELECT COUNT(*) AS count FROM book_errors WHERE site = ?")
                .bind(site)
                .fetch_one(self.db.pool())
                .await?
                .get("count");

        let sql = format!(
            "SELECT COUNT(*) AS count FROM books b
             WHERE b.site = ? AND b.is_downloaded = 1 AND {CURRENT_EDITION}"
        );
        let download_count = sqlx::query(&sql)
            .bind(site)
            .fetch_one(self.db.pool())
            .await?
            .get("count");

        let writer_count = sqlx::query(
            r"SELECT COUNT(DISTINCT writer_id) AS count FROM books
              WHERE site = ? AND writer_id IS NOT NULL",
        )
        .bind(site)
        .fetch_one(self.db.pool())
        .await?
        .get("count");

        let sql = format!(
            "SELECT b.status AS status, COUNT(*) AS count FROM books b
             WHERE b.site = ? AND {CURRENT_EDITION}
             GROUP BY b.status"
        );
        let status_rows = sqlx::query(&sql)
            .bind(site)
            .fetch_all(self.db.pool())
            .await?;
        let mut status_count = BTreeMap::new();
        for row in status_rows {
            let status = row
                .get::<String, _>("status")
                .parse()
                .unwrap_or(BookStatus::Error);
            status_count.insert(status, row.get("count"));
        }

        let max_book_id = self.max_book_id(site).await?;

        let sql = format!(
            "SELECT MAX(b.id) AS max_id FROM books b
             WHERE b.site = ? AND b.status != ? AND {CURRENT_EDITION}"
        );
        let latest_success_id = sqlx::query(&sql)
            .bind(site)
            .bind(BookStatus::Error.as_str())
            .fetch_one(self.db.pool())
            .await?
            .get::<Option<u32>, _>("max_id")
            .unwrap_or(0);

        Ok(SiteSummary {
            book_count: counts.get("book_count"),
            unique_book_count: counts.get("unique_book_count"),
            error_count,
            download_count,
            writer_count,
            status_count,
            max_book_id,
            latest_success_id,
        })
    }
}
