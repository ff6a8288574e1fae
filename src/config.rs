//! Per-site configuration loading and validation.
//!
//! Each vendor site is described by one TOML file: URL templates, concurrency
//! and retry budgets, breaker thresholds, archive location, and the
//! end-of-serialization knobs. [`SiteConfig`] is the parsed form; everything
//! downstream (client, engine, archive writer) is built from it.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::fetch::{
    DEFAULT_BREAKER_MULTIPLIER, DEFAULT_BREAKER_THRESHOLD, DEFAULT_MAX_CONCURRENT,
    DEFAULT_RETRY_ERROR, DEFAULT_RETRY_UNAVAILABLE, DEFAULT_TRANSIENT_CODES,
};

/// Errors raised while loading or validating a site configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the file from disk failed.
    #[error("failed to read config file '{path}'")]
    Read {
        /// Path that could not be read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or contains unknown keys.
    #[error("failed to parse config: {source}")]
    Parse {
        /// Underlying TOML error.
        #[from]
        source: toml::de::Error,
    },

    /// A field value falls outside its allowed range or shape.
    #[error("invalid config value for `{field}`: {value}. Expected {expected}")]
    Invalid {
        /// Offending field name.
        field: &'static str,
        /// Rejected value, rendered for the message.
        value: String,
        /// Human-readable description of what was expected.
        expected: &'static str,
    },
}

/// Configuration for crawling one vendor site.
///
/// `site`, `info_url`, and `listing_url` are required; every other field has
/// a default. URL templates carry an `{id}` placeholder substituted with the
/// numeric book id.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Vendor key, also the `site` column value in the store.
    pub site: String,
    /// Template for the book info page, e.g. `http://vendor/book/{id}/`.
    pub info_url: String,
    /// Template for the chapter listing page.
    pub listing_url: String,
    /// Base prepended to relative chapter fragments.
    #[serde(default)]
    pub chapter_prefix: String,
    /// Directory receiving archived book files.
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,
    /// Bound on concurrent requests to this site (1..=100).
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Total per-request timeout in seconds (1..=3600).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries granted to the vendor-unavailable failure class.
    #[serde(default = "default_retry_unavailable")]
    pub retry_unavailable: u32,
    /// Retries granted to the general error failure class.
    #[serde(default = "default_retry_error")]
    pub retry_error: u32,
    /// Base pause between retries in milliseconds (0..=60000).
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Numeric body codes treated as vendor-unavailable.
    #[serde(default = "default_transient_codes")]
    pub transient_codes: Vec<String>,
    /// Consecutive failures before the breaker starts throttling.
    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: u32,
    /// Failure ceiling is `breaker_threshold * breaker_multiplier`.
    #[serde(default = "default_breaker_multiplier")]
    pub breaker_multiplier: u32,
    /// Throttle pause while the breaker is open, in milliseconds (0..=120000).
    #[serde(default = "default_breaker_pause_ms")]
    pub breaker_pause_ms: u64,
    /// Failed-chapter ceiling before an archive is discarded.
    #[serde(default = "default_chapter_failure_cap")]
    pub chapter_failure_cap: usize,
    /// chrono format string for parsing vendor update dates.
    #[serde(default = "default_date_layout")]
    pub date_layout: String,
    /// Completion keywords checked against the latest chapter title.
    #[serde(default = "default_end_keywords")]
    pub end_keywords: Vec<String>,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./books")
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retry_unavailable() -> u32 {
    DEFAULT_RETRY_UNAVAILABLE
}

fn default_retry_error() -> u32 {
    DEFAULT_RETRY_ERROR
}

fn default_retry_interval_ms() -> u64 {
    2_000
}

fn default_transient_codes() -> Vec<String> {
    DEFAULT_TRANSIENT_CODES
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_breaker_threshold() -> u32 {
    DEFAULT_BREAKER_THRESHOLD
}

fn default_breaker_multiplier() -> u32 {
    DEFAULT_BREAKER_MULTIPLIER
}

fn default_breaker_pause_ms() -> u64 {
    5_000
}

fn default_chapter_failure_cap() -> usize {
    50
}

fn default_date_layout() -> String {
    "%Y-%m-%d".to_string()
}

fn default_end_keywords() -> Vec<String> {
    crate::crawl::DEFAULT_END_KEYWORDS
        .iter()
        .map(ToString::to_string)
        .collect()
}

impl SiteConfig {
    /// Loads and validates a site configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, is not valid
    /// TOML, or fails validation.
    pub fn from_toml_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parses and validates a site configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] on syntax errors, unknown keys, or
    /// out-of-range values.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates field values against runtime constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.site.trim().is_empty() {
            return Err(invalid("site", &self.site, "a non-empty site key"));
        }
        for (field, template) in [("info_url", &self.info_url), ("listing_url", &self.listing_url)]
        {
            if !template.contains("{id}") {
                return Err(invalid(field, template, "a template containing `{id}`"));
            }
        }
        if !(1..=100).contains(&self.max_concurrent) {
            return Err(invalid(
                "max_concurrent",
                self.max_concurrent,
                "range 1..=100",
            ));
        }
        if !(1..=3600).contains(&self.timeout_secs) {
            return Err(invalid("timeout_secs", self.timeout_secs, "range 1..=3600"));
        }
        if self.retry_interval_ms > 60_000 {
            return Err(invalid(
                "retry_interval_ms",
                self.retry_interval_ms,
                "range 0..=60000",
            ));
        }
        if self.breaker_threshold == 0 {
            return Err(invalid("breaker_threshold", 0_u32, "a value of 1 or more"));
        }
        if self.breaker_multiplier == 0 {
            return Err(invalid("breaker_multiplier", 0_u32, "a value of 1 or more"));
        }
        if self.breaker_pause_ms > 120_000 {
            return Err(invalid(
                "breaker_pause_ms",
                self.breaker_pause_ms,
                "range 0..=120000",
            ));
        }
        if self.date_layout.trim().is_empty() {
            return Err(invalid(
                "date_layout",
                &self.date_layout,
                "a chrono format string",
            ));
        }
        for code in &self.transient_codes {
            if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid("transient_codes", code, "a numeric vendor code"));
            }
        }
        Ok(())
    }

    /// Expands the info-page template for a book id.
    #[must_use]
    pub fn book_url(&self, id: u32) -> String {
        self.info_url.replace("{id}", &id.to_string())
    }

    /// Expands the chapter-listing template for a book id.
    #[must_use]
    pub fn chapter_list_url(&self, id: u32) -> String {
        self.listing_url.replace("{id}", &id.to_string())
    }

    /// Archive path for one book edition under the storage root.
    #[must_use]
    pub fn storage_dir(&self) -> &Path {
        &self.storage_root
    }

    /// A commented starter configuration, written by `novelkeeper init`.
    #[must_use]
    pub fn sample_toml() -> &'static str {
        r#"# novelkeeper site configuration

# Vendor key; also the `site` column in the database.
site = "example"

# Book info page template; {id} is replaced with the numeric book id.
info_url = "http://www.example.com/book/{id}/"

# Chapter listing page template.
listing_url = "http://www.example.com/html/{id}/"

# Base prepended to relative chapter links found in the listing.
chapter_prefix = "http://www.example.com"

# Directory receiving archived book text files.
storage_root = "./books"

# Concurrent request bound for this site (1..=100).
max_concurrent = 8

# Per-request timeout in seconds.
timeout_secs = 30

# Retries per failure class, and the base pause between attempts.
retry_unavailable = 3
retry_error = 3
retry_interval_ms = 2000

# Numeric body codes treated as "vendor temporarily unavailable".
transient_codes = ["502", "503"]

# Circuit breaker: throttle after `threshold` failures, halve the counter
# at `threshold * multiplier`, pause this long while open.
breaker_threshold = 10
breaker_multiplier = 3
breaker_pause_ms = 5000

# Discard an archive when more than min(cap, 10% of chapters) failed.
chapter_failure_cap = 50

# Format of the vendor's update dates, chrono syntax.
date_layout = "%Y-%m-%d"

# Chapter-title keywords that mark a book as finished.
end_keywords = ["后记", "後記", "大结局", "大結局", "完本", "完结", "完結", "全本", "终章", "終章", "尾声", "尾聲", "番外"]
"#
    }
}

fn invalid(
    field: &'static str,
    value: impl ToString,
    expected: &'static str,
) -> ConfigError {
    ConfigError::Invalid {
        field,
        value: value.to_string(),
        expected,
    }
}
