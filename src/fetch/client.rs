//! Resilient HTTP client for fetching vendor text pages.
//!
//! This module provides the `ResilientClient` struct, which stacks three
//! concerns on top of a plain reqwest client:
//!
//! - a counting semaphore bounding in-flight requests to the vendor site,
//!   released via owned RAII permits even on error paths
//! - body validation and weighted retries: empty or bare-numeric bodies are
//!   invalid, and each failure class spends against the site's retry budget
//! - a shared circuit breaker that throttles (never skips) dispatch while the
//!   endpoint keeps failing
//!
//! # Example
//!
//! ```no_run
//! use novelkeeper_core::fetch::ResilientClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ResilientClient::new();
//! let body = client.fetch("http://vendor.example/book/12").await?;
//! println!("fetched {} bytes", body.len());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use super::Fetcher;
use super::breaker::CircuitBreaker;
use super::error::FetchError;
use super::retry::{RetryDecision, RetryPlan, classify_failure};
use crate::config::SiteConfig;

/// Default total per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connect timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on concurrent in-flight requests per client.
pub const DEFAULT_MAX_CONCURRENT: usize = 8;

/// Numeric codes treated as vendor-unavailable by default.
pub const DEFAULT_TRANSIENT_CODES: &[&str] = &["502", "503"];

/// User agent sent with every request.
const USER_AGENT: &str = concat!("novelkeeper/", env!("CARGO_PKG_VERSION"));

/// Decodes raw response bytes into text before validation.
///
/// The default decoder is lossy UTF-8, a pass-through for well-formed bodies.
/// Vendors that still serve legacy encodings get a custom decoder injected by
/// the embedder via [`ResilientClient::with_decoder`].
pub trait TextDecoder: Send + Sync {
    /// Converts raw body bytes into a string.
    fn decode(&self, raw: &[u8]) -> String;
}

/// Lossy UTF-8 pass-through decoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct Utf8Decoder;

impl TextDecoder for Utf8Decoder {
    fn decode(&self, raw: &[u8]) -> String {
        String::from_utf8_lossy(raw).into_owned()
    }
}

/// HTTP client wrapper with bounded concurrency, retries, and breaker throttling.
///
/// Designed to be created once per vendor site and shared (via `Arc`) by every
/// task fetching from that site: the semaphore and the breaker are both
/// per-endpoint state, not per-request state.
pub struct ResilientClient {
    client: reqwest::Client,
    gate: Arc<Semaphore>,
    max_concurrent: usize,
    plan: RetryPlan,
    breaker: CircuitBreaker,
    transient_codes: Vec<String>,
    decoder: Arc<dyn TextDecoder>,
}

impl fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientClient")
            .field("max_concurrent", &self.max_concurrent)
            .field("plan", &self.plan)
            .field("breaker", &self.breaker)
            .field("transient_codes", &self.transient_codes)
            .finish_non_exhaustive()
    }
}

impl Default for ResilientClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ResilientClient {
    /// Creates a client with default settings.
    ///
    /// Defaults: 8 concurrent requests, flat retry plan (3 unavailable /
    /// 3 error retries, 2s interval), breaker opening at 10 failures,
    /// transient codes `["502", "503"]`, lossy UTF-8 decoding.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(
            DEFAULT_MAX_CONCURRENT,
            DEFAULT_TIMEOUT,
            RetryPlan::default(),
            CircuitBreaker::default(),
            DEFAULT_TRANSIENT_CODES
                .iter()
                .map(ToString::to_string)
                .collect(),
        )
    }

    /// Creates a client with explicit settings.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_settings(
        max_concurrent: usize,
        timeout: Duration,
        plan: RetryPlan,
        breaker: CircuitBreaker,
        transient_codes: Vec<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(timeout))
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()
            .expect("failed to build HTTP client with static configuration");

        let max_concurrent = max_concurrent.max(1);
        Self {
            client,
            gate: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            plan,
            breaker,
            transient_codes,
            decoder: Arc::new(Utf8Decoder),
        }
    }

    /// Creates a client from a site configuration.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build; validate the
    /// configuration first.
    #[must_use]
    pub fn from_config(config: &SiteConfig) -> Self {
        Self::with_settings(
            config.max_concurrent,
            Duration::from_secs(config.timeout_secs),
            RetryPlan::flat(
                config.retry_unavailable,
                config.retry_error,
                Duration::from_millis(config.retry_interval_ms),
            ),
            CircuitBreaker::new(
                config.breaker_threshold,
                config.breaker_multiplier,
                Duration::from_millis(config.breaker_pause_ms),
            ),
            config.transient_codes.clone(),
        )
    }

    /// Replaces the body decoder.
    #[must_use]
    pub fn with_decoder(mut self, decoder: Arc<dyn TextDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Fetches a text resource, retrying per the site's plan.
    ///
    /// Holds one concurrency permit for the whole logical fetch, retries
    /// included, so a site's retry storms cannot multiply its in-flight load.
    ///
    /// # Errors
    ///
    /// Returns the last [`FetchError`] once the retry budget is exhausted,
    /// identifying the terminal in-band code or transport failure.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let _permit = Arc::clone(&self.gate)
            .acquire_owned()
            .await
            .map_err(|_| FetchError::gate_closed(url))?;

        let mut state = self.plan.state();
        loop {
            self.breaker.throttle().await;
            match self.attempt(url).await {
                Ok(body) => {
                    self.breaker.record_success();
                    return Ok(body);
                }
                Err(error) => {
                    self.breaker.record_failure();
                    let class = classify_failure(&error, &self.transient_codes);
                    match self.plan.decide(class, &mut state) {
                        RetryDecision::Pause { pause, occurrence } => {
                            debug!(%error, ?class, occurrence, "fetch attempt failed, retrying");
                            tokio::time::sleep(pause).await;
                        }
                        RetryDecision::GiveUp { reason } => {
                            warn!(%error, ?class, %reason, "fetch failed terminally");
                            return Err(error);
                        }
                    }
                }
            }
        }
    }

    /// Maximum concurrent in-flight requests.
    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// The breaker shared by all fetches through this client.
    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// One send/validate cycle without retries.
    async fn attempt(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| transport_error(url, source))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url, status.as_u16()));
        }

        let raw = response
            .bytes()
            .await
            .map_err(|source| transport_error(url, source))?;
        validate_body(url, self.decoder.decode(&raw))
    }
}

#[async_trait]
impl Fetcher for ResilientClient {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        self.fetch(url).await
    }
}

fn transport_error(url: &str, source: reqwest::Error) -> FetchError {
    if source.is_timeout() {
        FetchError::timeout(url)
    } else {
        FetchError::network(url, source)
    }
}

/// Applies the in-band validation rules: empty bodies and bare numeric code
/// bodies are invalid.
fn validate_body(url: &str, body: String) -> Result<String, FetchError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(FetchError::empty_body(url));
    }
    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(FetchError::vendor_code(url, trimmed));
    }
    Ok(body)
}
