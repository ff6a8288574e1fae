//! Concurrent chapter download and archive serialization.
//!
//! The engine fetches a finished book's full chapter list, pulls every
//! chapter through the shared [`Fetcher`] gate, and writes one plain-text
//! archive per book edition. Individual chapter failures are tolerated up
//! to a bounded fraction; past that the partial archive is discarded so a
//! later cycle can retry the whole book.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use super::chapter::{Chapter, clean_content};
use crate::config::SiteConfig;
use crate::fetch::{FetchError, Fetcher};
use crate::store::Book;
use crate::vendor::{ParseError, VendorParser};

/// Body written in place of a chapter whose fetch or parse failed.
pub const FAILED_CHAPTER_BODY: &str = "本章下载失败";

/// Separator line between archive sections.
const SEPARATOR: &str = "--------------------";

/// Errors from a single book download.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// The chapter listing page could not be fetched.
    #[error("failed to fetch chapter listing: {0}")]
    Fetch(#[from] FetchError),

    /// The listing page fetched but yielded no usable chapters.
    #[error("failed to parse chapter listing: {0}")]
    Parse(#[from] ParseError),

    /// More chapters failed than the archive is allowed to carry.
    #[error(
        "discarded archive {}: {failed} of {total} chapters failed (allowed {allowed})",
        path.display()
    )]
    TooManyFailures {
        /// Path of the removed archive.
        path: PathBuf,
        /// Chapters whose content is the failure sentinel.
        failed: usize,
        /// Total chapters in the listing.
        total: usize,
        /// Failures the archive was allowed to carry.
        allowed: usize,
    },

    /// The archive file could not be written or removed.
    #[error("archive io failure at {}: {source}", path.display())]
    Io {
        /// Path being written or removed.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    /// Creates an io error for an archive path.
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Downloads all chapters of a book and serializes them into one archive.
///
/// Chapters are fetched concurrently in their own tasks; total request
/// concurrency is bounded by the [`Fetcher`]'s own gate, so chapter fan-out
/// and ordinary book fetches share one budget. Order in the archive is
/// deterministic regardless of completion order: chapters are stable-sorted
/// by their title-derived index before writing.
#[derive(Clone)]
pub struct ChapterDownloadEngine {
    fetcher: Arc<dyn Fetcher>,
    parser: Arc<dyn VendorParser>,
    storage_root: PathBuf,
    failure_cap: usize,
}

impl std::fmt::Debug for ChapterDownloadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChapterDownloadEngine")
            .field("storage_root", &self.storage_root)
            .field("failure_cap", &self.failure_cap)
            .finish_non_exhaustive()
    }
}

impl ChapterDownloadEngine {
    /// Creates an engine writing archives under `storage_root`.
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        parser: Arc<dyn VendorParser>,
        storage_root: impl Into<PathBuf>,
        failure_cap: usize,
    ) -> Self {
        Self {
            fetcher,
            parser,
            storage_root: storage_root.into(),
            failure_cap,
        }
    }

    /// Creates an engine from a site configuration.
    pub fn from_config(
        config: &SiteConfig,
        fetcher: Arc<dyn Fetcher>,
        parser: Arc<dyn VendorParser>,
    ) -> Self {
        Self::new(
            fetcher,
            parser,
            config.storage_dir(),
            config.chapter_failure_cap,
        )
    }

    /// Fetches every chapter of `book` and writes its archive file.
    ///
    /// Returns the archive path on success. An empty chapter listing is a
    /// hard failure before any file is touched. After writing, the archive
    /// is removed again and an error returned when more than
    /// `min(failure_cap, 10% of chapters)` bodies are the failure sentinel.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Fetch`] or [`DownloadError::Parse`] when the
    /// listing itself is unusable, [`DownloadError::TooManyFailures`] when
    /// the archive was discarded, and [`DownloadError::Io`] on filesystem
    /// failures.
    #[instrument(
        skip(self, book),
        fields(site = %book.site, id = book.id, hash_code = book.hash_code)
    )]
    pub async fn download(&self, book: &Book) -> Result<PathBuf, DownloadError> {
        let listing_url = self.parser.chapter_list_url(book.id);
        let body = self.fetcher.fetch_text(&listing_url).await?;
        let links = self.parser.parse_chapter_list(&listing_url, &body)?;
        if links.is_empty() {
            return Err(ParseError::empty_chapter_list(&listing_url).into());
        }

        let total = links.len();
        debug!(chapters = total, "fetching chapters");

        // Spawn one task per chapter; the fetcher's gate bounds concurrency.
        let mut handles = Vec::with_capacity(total);
        for link in links {
            let url = self.parser.resolve_chapter_url(&listing_url, &link.fragment);
            let fetcher = Arc::clone(&self.fetcher);
            let parser = Arc::clone(&self.parser);
            let task_url = url.clone();
            let title = link.title.clone();
            handles.push((
                url,
                link.title,
                tokio::spawn(async move {
                    fetch_chapter(fetcher.as_ref(), parser.as_ref(), &task_url, &title).await
                }),
            ));
        }

        // Await in spawn order so ties in the later sort keep listing order.
        let mut chapters = Vec::with_capacity(total);
        for (url, title, handle) in handles {
            let chapter = match handle.await {
                Ok(chapter) => chapter,
                Err(error) => {
                    warn!(%url, error = %error, "chapter task panicked");
                    Chapter::new(url, title, FAILED_CHAPTER_BODY)
                }
            };
            chapters.push(chapter);
        }

        chapters.sort_by_key(|chapter| chapter.index);

        let path = self.storage_root.join(book.archive_file_name());
        fs::create_dir_all(&self.storage_root)
            .await
            .map_err(|e| DownloadError::io(&self.storage_root, e))?;
        fs::write(&path, render_archive(book, &chapters))
            .await
            .map_err(|e| DownloadError::io(&path, e))?;

        let failed = chapters
            .iter()
            .filter(|chapter| chapter.content == FAILED_CHAPTER_BODY)
            .count();
        let allowed = self.failure_cap.min(total / 10);
        if failed > allowed {
            warn!(failed, total, allowed, "too many failed chapters, discarding archive");
            fs::remove_file(&path)
                .await
                .map_err(|e| DownloadError::io(&path, e))?;
            return Err(DownloadError::TooManyFailures {
                path,
                failed,
                total,
                allowed,
            });
        }

        info!(chapters = total, failed, path = %path.display(), "archive written");
        Ok(path)
    }
}

/// Fetches and cleans one chapter, substituting the failure sentinel on error.
async fn fetch_chapter(
    fetcher: &dyn Fetcher,
    parser: &dyn VendorParser,
    url: &str,
    title: &str,
) -> Chapter {
    let body = match fetcher.fetch_text(url).await {
        Ok(body) => body,
        Err(error) => {
            warn!(%url, error = %error, "chapter fetch failed");
            return Chapter::new(url, title, FAILED_CHAPTER_BODY);
        }
    };
    match parser.parse_chapter(url, &body) {
        Ok(content) => Chapter::new(url, title, clean_content(&content)),
        Err(error) => {
            warn!(%url, error = %error, "chapter parse failed");
            Chapter::new(url, title, FAILED_CHAPTER_BODY)
        }
    }
}

/// Renders the archive text: header, then each chapter block in order.
fn render_archive(book: &Book, chapters: &[Chapter]) -> String {
    let mut out = String::new();
    out.push_str(&book.title);
    out.push('\n');
    out.push_str(book.writer_name());
    out.push('\n');
    out.push_str(SEPARATOR);
    out.push_str("\n\n");
    for chapter in chapters {
        out.push_str(&chapter.title);
        out.push('\n');
        out.push_str(SEPARATOR);
        out.push('\n');
        out.push_str(&chapter.content);
        out.push_str("\n\n");
    }
    out
}
