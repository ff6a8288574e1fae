//! Book lifecycle orchestration.
//!
//! [`BookLifecycleEngine`] is the top-level state machine: it refreshes a
//! book from its vendor info page, decides between in-place update and a
//! forked edition, applies the end-of-serialization heuristic, triggers the
//! chapter download for finished books, and persists every phase through
//! the [`BookRepository`] so a crash mid-cycle loses at most one phase.
//!
//! A crawl pass fans one tokio task out per current-edition book. Outbound
//! request concurrency is bounded by the shared fetch gate, so book-level
//! and chapter-level fan-out draw from one budget.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::change::detect_change;
use super::download::{ChapterDownloadEngine, DownloadError};
use super::ending::should_end;
use crate::config::SiteConfig;
use crate::fetch::{FetchError, Fetcher};
use crate::store::{Book, BookRepository, BookStatus, StoreError};
use crate::vendor::{BookInfo, ParseError, VendorParser};

/// Errors from a book lifecycle operation.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A vendor page could not be fetched.
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// A vendor page fetched but could not be parsed.
    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),

    /// A repository operation failed.
    #[error("storage failed: {0}")]
    Store(#[from] StoreError),

    /// The chapter download failed or its archive was discarded.
    #[error("download failed: {0}")]
    Download(#[from] DownloadError),
}

/// What a single book cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    /// The update phase detected and persisted a change.
    pub changed: bool,
    /// An archive was written this cycle.
    pub downloaded: bool,
}

/// Counters for one crawl pass.
///
/// Updated from concurrent book tasks through atomics; read once the pass
/// has drained.
#[derive(Debug, Default)]
pub struct PassStats {
    processed: AtomicUsize,
    changed: AtomicUsize,
    downloaded: AtomicUsize,
    failed: AtomicUsize,
    deadline_hit: AtomicBool,
}

impl PassStats {
    /// Creates a stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Books whose cycle completed without error.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    /// Books whose update phase persisted a change.
    #[must_use]
    pub fn changed(&self) -> usize {
        self.changed.load(Ordering::SeqCst)
    }

    /// Archives written during the pass.
    #[must_use]
    pub fn downloaded(&self) -> usize {
        self.downloaded.load(Ordering::SeqCst)
    }

    /// Books whose cycle returned an error.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Total books a cycle ran for.
    #[must_use]
    pub fn total(&self) -> usize {
        self.processed() + self.failed()
    }

    /// True when the pass stopped issuing new books at its deadline.
    #[must_use]
    pub fn was_deadline_hit(&self) -> bool {
        self.deadline_hit.load(Ordering::SeqCst)
    }

    fn record_outcome(&self, outcome: CycleOutcome) {
        self.processed.fetch_add(1, Ordering::SeqCst);
        if outcome.changed {
            self.changed.fetch_add(1, Ordering::SeqCst);
        }
        if outcome.downloaded {
            self.downloaded.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn set_deadline_hit(&self) {
        self.deadline_hit.store(true, Ordering::SeqCst);
    }
}

/// State machine driving a book from discovery to archived text.
///
/// Cheap to clone: collaborators are shared behind [`Arc`], so each crawl
/// task carries its own handle.
#[derive(Clone)]
pub struct BookLifecycleEngine {
    config: Arc<SiteConfig>,
    parser: Arc<dyn VendorParser>,
    fetcher: Arc<dyn Fetcher>,
    repo: Arc<dyn BookRepository>,
    downloader: ChapterDownloadEngine,
}

impl std::fmt::Debug for BookLifecycleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookLifecycleEngine")
            .field("site", &self.parser.site())
            .finish_non_exhaustive()
    }
}

impl BookLifecycleEngine {
    /// Creates an engine for one site.
    pub fn new(
        config: Arc<SiteConfig>,
        parser: Arc<dyn VendorParser>,
        fetcher: Arc<dyn Fetcher>,
        repo: Arc<dyn BookRepository>,
    ) -> Self {
        let downloader = ChapterDownloadEngine::from_config(
            &config,
            Arc::clone(&fetcher),
            Arc::clone(&parser),
        );
        Self {
            config,
            parser,
            fetcher,
            repo,
            downloader,
        }
    }

    /// Refreshes `book` from its vendor info page.
    ///
    /// On success the detected change is applied: an identity change on a
    /// healthy book forks a new edition (next hash code), an ordinary change
    /// updates the current edition in place, and either outcome clears the
    /// book's error record. The end-of-serialization heuristic then runs and
    /// may move the book to `End`. Each phase is persisted as it happens.
    ///
    /// Returns whether a change was persisted.
    ///
    /// # Errors
    ///
    /// Fetch and parse failures are returned without mutating a healthy
    /// book; a book already in `Error` status gets its error record
    /// refreshed first. Repository failures propagate as
    /// [`EngineError::Store`].
    #[instrument(skip(self, book), fields(site = %book.site, id = book.id))]
    pub async fn update(&self, book: &mut Book) -> Result<bool, EngineError> {
        let url = self.parser.book_url(book.id);
        let info = match self.fetch_info(&url).await {
            Ok(info) => info,
            Err(error) => {
                if book.status == BookStatus::Error {
                    self.repo
                        .save_error(book, Some(&error.to_string()))
                        .await?;
                }
                return Err(error);
            }
        };

        let change = detect_change(book, &info);
        if change.new_edition {
            let writer = self.repo.save_writer(&info.writer).await?;
            let mut edition = book.new_edition(book.hash_code + 1);
            edition.apply_update(&info, writer);
            self.repo.create_book(&edition).await?;
            info!(
                hash_code = edition.hash_code,
                title = %edition.title,
                "new edition created"
            );
            *book = edition;
        } else if change.updated {
            let writer = self.repo.save_writer(&info.writer).await?;
            book.apply_update(&info, writer);
            self.repo.update_book(book).await?;
            debug!(update_chapter = %book.update_chapter, "book updated");
        }
        self.repo.save_error(book, None).await?;

        if book.status != BookStatus::End
            && should_end(
                book,
                change.updated,
                &self.config.date_layout,
                &self.config.end_keywords,
            )
        {
            book.status = BookStatus::End;
            self.repo.update_book(book).await?;
            info!(update_chapter = %book.update_chapter, "book marked ended");
        }

        Ok(change.updated)
    }

    /// Probes ids past the known maximum to onboard new books.
    ///
    /// Starts at `max(start_id, known max + 1)` and walks upward until
    /// `max_consecutive_errors` probes in a row fail to fetch or parse.
    /// Every hit creates an `Error`-status placeholder that the next update
    /// pass fills in. Returns the number of books discovered.
    ///
    /// # Errors
    ///
    /// Probe failures only advance the error counter; repository failures
    /// abort the walk.
    #[instrument(skip(self))]
    pub async fn explore(
        &self,
        start_id: u32,
        max_consecutive_errors: u32,
    ) -> Result<u32, EngineError> {
        let site = self.parser.site();
        let mut id = start_id.max(self.repo.max_book_id(site).await? + 1);
        let mut discovered = 0u32;
        let mut consecutive = 0u32;

        while consecutive < max_consecutive_errors {
            let url = self.parser.book_url(id);
            match self.fetch_info(&url).await {
                Ok(_) => {
                    consecutive = 0;
                    let book = Book::discovered(site, id);
                    self.repo.create_book(&book).await?;
                    discovered += 1;
                    info!(id, "discovered new book");
                }
                Err(error) => {
                    consecutive += 1;
                    debug!(id, consecutive, error = %error, "probe failed");
                }
            }
            id += 1;
        }

        info!(discovered, next_id = id, "exploration finished");
        Ok(discovered)
    }

    /// Runs the full cycle for one book: update, then download if it just
    /// finished serialization.
    ///
    /// A successful download marks the book `Download`/downloaded and
    /// persists it; a failed download leaves the book `End` and not
    /// downloaded so a later pass retries it.
    ///
    /// # Errors
    ///
    /// Propagates the first failing phase; the phases already persisted
    /// stay persisted.
    #[instrument(skip(self, book), fields(site = %book.site, id = book.id))]
    pub async fn process(&self, book: &mut Book) -> Result<CycleOutcome, EngineError> {
        let changed = self.update(book).await?;
        let mut outcome = CycleOutcome {
            changed,
            downloaded: false,
        };

        if book.status == BookStatus::End && !book.is_downloaded {
            self.downloader.download(book).await?;
            book.is_downloaded = true;
            book.status = BookStatus::Download;
            self.repo.update_book(book).await?;
            outcome.downloaded = true;
        }

        Ok(outcome)
    }

    /// Runs one crawl pass over every current-edition book of the site.
    ///
    /// One task per book; a failing book is counted and logged without
    /// blocking the rest. When `time_budget` is given and elapses, no new
    /// book tasks are issued while in-flight ones drain.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] when the candidate books cannot be
    /// listed; per-book failures are reported through [`PassStats`] instead.
    #[instrument(skip(self))]
    pub async fn run_pass(
        &self,
        time_budget: Option<Duration>,
    ) -> Result<PassStats, EngineError> {
        let books = self.repo.find_books_for_update(self.parser.site()).await?;
        let deadline = time_budget.map(|budget| tokio::time::Instant::now() + budget);
        let stats = Arc::new(PassStats::new());
        let mut handles: Vec<(u32, tokio::task::JoinHandle<()>)> = Vec::new();

        info!(books = books.len(), "starting crawl pass");

        for mut book in books {
            if let Some(deadline) = deadline
                && tokio::time::Instant::now() >= deadline
            {
                stats.set_deadline_hit();
                warn!("pass deadline reached, not issuing further books");
                break;
            }

            // Clone values for the spawned task.
            let engine = self.clone();
            let stats = Arc::clone(&stats);
            handles.push((
                book.id,
                tokio::spawn(async move {
                    match engine.process(&mut book).await {
                        Ok(outcome) => stats.record_outcome(outcome),
                        Err(error) => {
                            warn!(
                                site = %book.site,
                                id = book.id,
                                error = %error,
                                "book cycle failed"
                            );
                            stats.record_failed();
                        }
                    }
                }),
            ));
        }

        // Wait for all tasks; panics are counted but don't fail the pass.
        for (id, handle) in handles {
            if let Err(error) = handle.await {
                warn!(id, error = %error, "book task panicked");
                stats.record_failed();
            }
        }

        info!(
            processed = stats.processed(),
            changed = stats.changed(),
            downloaded = stats.downloaded(),
            failed = stats.failed(),
            "crawl pass finished"
        );

        // All tasks are done, so this Arc should be the sole owner. Fall
        // back to copying the counters if a clone somehow survives.
        match Arc::try_unwrap(stats) {
            Ok(stats) => Ok(stats),
            Err(shared) => {
                let stats = PassStats::new();
                stats
                    .processed
                    .store(shared.processed(), Ordering::SeqCst);
                stats.changed.store(shared.changed(), Ordering::SeqCst);
                stats
                    .downloaded
                    .store(shared.downloaded(), Ordering::SeqCst);
                stats.failed.store(shared.failed(), Ordering::SeqCst);
                if shared.was_deadline_hit() {
                    stats.set_deadline_hit();
                }
                Ok(stats)
            }
        }
    }

    async fn fetch_info(&self, url: &str) -> Result<BookInfo, EngineError> {
        let body = self.fetcher.fetch_text(url).await?;
        Ok(self.parser.parse_book(url, &body)?)
    }
}
