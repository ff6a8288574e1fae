//! Novelkeeper Core Library
//!
//! This library tracks serialized web novels published across third-party
//! vendor sites: it re-checks tracked books for updates, classifies them
//! as ongoing/ended/erroring, and archives finished books as plain-text
//! files, all while treating the vendors as unreliable, rate-sensitive,
//! and inconsistent about how they report errors.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`config`] - Per-site TOML configuration
//! - [`crawl`] - Change detection, ending heuristic, downloads, lifecycle engine
//! - [`db`] - Database connection and schema management
//! - [`fetch`] - Resilient HTTP client with retries and circuit breaking
//! - [`store`] - Book/writer/error persistence and the repository trait
//! - [`vendor`] - Vendor parser interface and shared parse types

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod crawl;
pub mod db;
pub mod fetch;
pub mod store;
pub mod vendor;

#[cfg(test)]
pub mod test_support;

// Re-export commonly used types
pub use config::{ConfigError, SiteConfig};
pub use crawl::{
    BookLifecycleEngine, ChapterDownloadEngine, ClientRegistry, CycleOutcome, EngineError,
    PassStats,
};
pub use db::Database;
pub use fetch::{CircuitBreaker, FetchError, Fetcher, ResilientClient, RetryPlan};
pub use store::{Book, BookRepository, BookStatus, BookStore, SiteSummary, StoreError, Writer};
pub use vendor::{BookInfo, ChapterLink, ParseError, VendorParser};
