//! Book, writer, and summary types backing the persistence layer.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::vendor::BookInfo;

/// Lifecycle status of a book edition.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum BookStatus {
    /// Placeholder or failed record; discovery creates books in this state.
    Error,
    /// A content change was detected; the book is being tracked.
    InProgress,
    /// Archived to disk after finishing.
    Download,
    /// Judged complete by the end-of-serialization heuristic.
    End,
}

impl BookStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::InProgress => "in_progress",
            Self::Download => "download",
            Self::End => "end",
        }
    }
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BookStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(Self::Error),
            "in_progress" => Ok(Self::InProgress),
            "download" => Ok(Self::Download),
            "end" => Ok(Self::End),
            _ => Err(format!("invalid book status: {s}")),
        }
    }
}

/// A writer, shared across books and created lazily on first reference.
///
/// Never mutated once created; name collisions resolve by reuse.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Writer {
    /// Row id assigned by the store.
    pub id: i64,
    /// Writer name as printed by the vendor.
    pub name: String,
}

/// The last recorded fetch/parse failure for a book, absent when healthy.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ErrorRecord {
    /// Vendor site key.
    pub site: String,
    /// Book id on that site.
    pub id: u32,
    /// Human-readable failure message.
    pub message: String,
    /// When the failure was recorded.
    pub updated_at: String,
}

/// One tracked book edition.
///
/// Identity is `(site, id, hash_code)`. `hash_code` discriminates editions
/// of the same numbered slot: 0 for the first insert, a fresh value minted
/// whenever title/writer/kind change on a healthy book. Id-only lookups
/// return the edition with the highest `hash_code`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    /// Vendor site key.
    pub site: String,
    /// Numeric book id on the vendor site.
    pub id: u32,
    /// Edition discriminator, 0 for the first edition.
    pub hash_code: u32,
    /// Book title.
    pub title: String,
    /// Writer entity, absent until the first successful parse.
    pub writer: Option<Writer>,
    /// Genre or shelf label.
    pub kind: String,
    /// Vendor-supplied update date, opaque and not necessarily parseable.
    pub update_date: String,
    /// Title of the latest known chapter.
    pub update_chapter: String,
    /// Lifecycle status.
    pub status: BookStatus,
    /// Whether this edition's archive has been written successfully.
    pub is_downloaded: bool,
    /// Row creation timestamp, set by the store.
    pub created_at: String,
    /// Last mutation timestamp, set by the store.
    pub updated_at: String,
}

impl Book {
    /// Creates the placeholder record minted by discovery.
    ///
    /// All content fields are empty and the status is [`BookStatus::Error`];
    /// the next crawl pass fills it in via the normal update path.
    #[must_use]
    pub fn discovered(site: impl Into<String>, id: u32) -> Self {
        Self {
            site: site.into(),
            id,
            hash_code: 0,
            title: String::new(),
            writer: None,
            kind: String::new(),
            update_date: String::new(),
            update_chapter: String::new(),
            status: BookStatus::Error,
            is_downloaded: false,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    /// Clones this book as a fresh edition of the same `(site, id)` slot.
    ///
    /// The caller follows up with [`Book::apply_update`] and persists the
    /// result via `create_book`, leaving the previous edition untouched.
    #[must_use]
    pub fn new_edition(&self, hash_code: u32) -> Self {
        Self {
            hash_code,
            created_at: String::new(),
            updated_at: String::new(),
            ..self.clone()
        }
    }

    /// Overwrites the five vendor-supplied fields with freshly fetched ones.
    ///
    /// Moves the book to [`BookStatus::InProgress`] and clears the
    /// downloaded flag, since the archive no longer matches the content.
    pub fn apply_update(&mut self, info: &BookInfo, writer: Writer) {
        self.title = info.title.clone();
        self.writer = Some(writer);
        self.kind = info.kind.clone();
        self.update_date = info.update_date.clone();
        self.update_chapter = info.update_chapter.clone();
        self.status = BookStatus::InProgress;
        self.is_downloaded = false;
    }

    /// Writer name, or an empty string while no writer is attached.
    #[must_use]
    pub fn writer_name(&self) -> &str {
        self.writer.as_ref().map_or("", |writer| writer.name.as_str())
    }

    /// Archive file name for this edition.
    ///
    /// The first edition is plain `{id}.txt`; later editions append the
    /// hash code in base36, e.g. `12-1z.txt`, so editions never collide.
    #[must_use]
    pub fn archive_file_name(&self) -> String {
        if self.hash_code == 0 {
            format!("{}.txt", self.id)
        } else {
            format!("{}-{}.txt", self.id, to_base36(self.hash_code))
        }
    }
}

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Book {{ {}/{}#{}, title: {}, status: {} }}",
            self.site, self.id, self.hash_code, self.title, self.status
        )
    }
}

/// Aggregate statistics for one site, produced by `stats`.
#[derive(Debug, Clone, Serialize)]
pub struct SiteSummary {
    /// Total edition rows, historical editions included.
    pub book_count: i64,
    /// Distinct book ids.
    pub unique_book_count: i64,
    /// Books currently carrying an error record.
    pub error_count: i64,
    /// Current editions with a written archive.
    pub download_count: i64,
    /// Distinct writers referenced by this site's books.
    pub writer_count: i64,
    /// Current editions per status.
    pub status_count: BTreeMap<BookStatus, i64>,
    /// Highest known book id, 0 when the site is empty.
    pub max_book_id: u32,
    /// Highest current-edition id that is not in error status, 0 when none.
    pub latest_success_id: u32,
}

fn to_base36(mut value: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}
