//! Resilient page fetching for vendor text sites.
//!
//! # Overview
//!
//! Everything that talks HTTP to a vendor lives here. The module stacks, from
//! the bottom up:
//!
//! - [`FetchError`]: transport and in-band failures, classified for retry
//! - [`RetryPlan`]: weighted retry budgets shared across failure classes
//! - [`CircuitBreaker`]: per-endpoint throttling under sustained failure
//! - [`ResilientClient`]: the client tying the three together behind a
//!   concurrency gate
//!
//! Callers that do not care about the concrete client depend on the
//! [`Fetcher`] trait instead, which is what the crawl engine and the tests
//! plug their fakes into.

mod breaker;
mod client;
mod error;
mod retry;

pub use breaker::{
    CircuitBreaker, DEFAULT_BREAKER_MULTIPLIER, DEFAULT_BREAKER_PAUSE, DEFAULT_BREAKER_THRESHOLD,
};
pub use client::{
    DEFAULT_MAX_CONCURRENT, DEFAULT_TRANSIENT_CODES, ResilientClient, TextDecoder, Utf8Decoder,
};
pub use error::FetchError;
pub use retry::{
    BackoffRule, DEFAULT_RETRY_ERROR, DEFAULT_RETRY_INTERVAL, DEFAULT_RETRY_UNAVAILABLE,
    FailureClass, PauseStyle, RetryDecision, RetryPlan, RetryState, classify_failure,
};

use async_trait::async_trait;

/// Text-fetching seam between the crawl engine and the HTTP stack.
///
/// [`ResilientClient`] is the production implementation; tests substitute
/// scripted fakes to exercise lifecycle logic without sockets.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches the resource at `url` and returns its decoded body text.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] when the fetch fails terminally, after any
    /// retries the implementation performs.
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError>;
}
