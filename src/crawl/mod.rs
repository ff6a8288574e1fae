//! Crawl layer: change detection, ending heuristic, chapter download, and
//! the lifecycle engine that drives them.
//!
//! The submodules compose bottom-up: [`change`] and [`ending`] are pure
//! decisions, [`chapter`] derives ordering and cleans content, [`download`]
//! turns a finished book into an archive file, and [`engine`] runs the
//! whole cycle against a repository. [`ClientRegistry`] hands out one
//! shared HTTP client per site so every task hitting a vendor draws from
//! the same concurrency gate and circuit breaker.

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::SiteConfig;
use crate::fetch::ResilientClient;

pub mod change;
pub mod chapter;
pub mod download;
pub mod ending;
pub mod engine;

pub use change::{Change, detect_change};
pub use chapter::{Chapter, TAIL_INDEX, chapter_index, clean_content};
pub use download::{ChapterDownloadEngine, DownloadError, FAILED_CHAPTER_BODY};
pub use ending::{DEFAULT_END_KEYWORDS, should_end};
pub use engine::{BookLifecycleEngine, CycleOutcome, EngineError, PassStats};

/// One shared [`ResilientClient`] per site.
///
/// The client owns the site's request semaphore and circuit breaker, so
/// handing the same instance to every engine and task is what makes those
/// limits site-wide rather than per-task.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: DashMap<String, Arc<ResilientClient>>,
}

impl ClientRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the site's shared client, building it on first use.
    pub fn client_for(&self, config: &SiteConfig) -> Arc<ResilientClient> {
        self.clients
            .entry(config.site.clone())
            .or_insert_with(|| Arc::new(ResilientClient::from_config(config)))
            .clone()
    }

    /// Number of sites with a client.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// True when no client has been built yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
