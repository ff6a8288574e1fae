//! Repository seam for book persistence operations.
//!
//! This trait keeps the concrete `BookStore` APIs intact while letting the
//! crawl engine depend on an abstract data access boundary, swappable for an
//! in-memory fake in lifecycle tests.

use async_trait::async_trait;

use super::{Book, BookStore, Result, SiteSummary, Writer};

/// Data-access contract for book, writer, and error-record operations.
#[async_trait]
pub trait BookRepository: Send + Sync {
    /// Inserts a new edition row with its explicit hash code.
    async fn create_book(&self, book: &Book) -> Result<()>;

    /// Updates the mutable fields of an existing edition row.
    async fn update_book(&self, book: &Book) -> Result<()>;

    /// Finds the current edition for an id.
    async fn find_book_by_id(&self, site: &str, id: u32) -> Result<Option<Book>>;

    /// Finds one specific edition by full identity.
    async fn find_book_by_id_hash(
        &self,
        site: &str,
        id: u32,
        hash_code: u32,
    ) -> Result<Option<Book>>;

    /// Returns the crawl working set: every current edition on a site.
    async fn find_books_for_update(&self, site: &str) -> Result<Vec<Book>>;

    /// Returns finished, unarchived current editions.
    async fn find_books_for_download(&self, site: &str) -> Result<Vec<Book>>;

    /// Returns the writer with this name, creating it on first reference.
    async fn save_writer(&self, name: &str) -> Result<Writer>;

    /// Records (`Some`) or clears (`None`) the error message for a book.
    async fn save_error(&self, book: &Book, error: Option<&str>) -> Result<()>;

    /// Highest known book id for a site, 0 when empty.
    async fn max_book_id(&self, site: &str) -> Result<u32>;

    /// Aggregate statistics for a site.
    async fn stats(&self, site: &str) -> Result<SiteSummary>;
}

#[async_trait]
impl BookRepository for BookStore {
    async fn create_book(&self, book: &Book) -> Result<()> {
        BookStore::create_book(self, book).await
    }

    async fn update_book(&self, book: &Book) -> Result<()> {
        BookStore::update_book(self, book).await
    }

    async fn find_book_by_id(&self, site: &str, id: u32) -> Result<Option<Book>> {
        BookStore::find_book_by_id(self, site, id).await
    }

    async fn find_book_by_id_hash(
        &self,
        site: &str,
        id: u32,
        hash_code: u32,
    ) -> Result<Option<Book>> {
        BookStore::find_book_by_id_hash(self, site, id, hash_code).await
    }

    async fn find_books_for_update(&self, site: &str) -> Result<Vec<Book>> {
        BookStore::find_books_for_update(self, site).await
    }

    async fn find_books_for_download(&self, site: &str) -> Result<Vec<Book>> {
        BookStore::find_books_for_download(self, site).await
    }

    async fn save_writer(&self, name: &str) -> Result<Writer> {
        BookStore::save_writer(self, name).await
    }

    async fn save_error(&self, book: &Book, error: Option<&str>) -> Result<()> {
        BookStore::save_error(self, book, error).await
    }

    async fn max_book_id(&self, site: &str) -> Result<u32> {
        BookStore::max_book_id(self, site).await
    }

    async fn stats(&self, site: &str) -> Result<SiteSummary> {
        BookStore::stats(self, site).await
    }
}
