//! Error types for the fetch module.
//!
//! Vendor sites report failures two ways: normal transport-level errors, and
//! HTTP-adjacent numeric codes sent in-band as the response body (a 200
//! response whose entire body is `"503"`). Both surface here as typed errors.

use thiserror::Error;

/// Errors that can occur while fetching a text resource.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed to fetch.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Response body was empty or whitespace-only.
    #[error("empty body fetching {url}")]
    EmptyBody {
        /// The URL that returned nothing usable.
        url: String,
    },

    /// Response body was a bare numeric error code signaled in-band by the vendor.
    #[error("vendor signaled code {code} fetching {url}")]
    VendorCode {
        /// The URL that returned the code.
        url: String,
        /// The numeric code found in the body (e.g. "503").
        code: String,
    },

    /// The concurrency gate was closed while waiting for a slot.
    ///
    /// Only happens during shutdown; the gate is never closed mid-crawl.
    #[error("concurrency gate closed before fetching {url}")]
    GateClosed {
        /// The URL that was waiting for a slot.
        url: String,
    },
}

impl FetchError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an empty body error.
    pub fn empty_body(url: impl Into<String>) -> Self {
        Self::EmptyBody { url: url.into() }
    }

    /// Creates an in-band vendor code error.
    pub fn vendor_code(url: impl Into<String>, code: impl Into<String>) -> Self {
        Self::VendorCode {
            url: url.into(),
            code: code.into(),
        }
    }

    /// Creates a gate-closed error.
    pub fn gate_closed(url: impl Into<String>) -> Self {
        Self::GateClosed { url: url.into() }
    }

    /// Returns the in-band numeric code when the vendor signaled one.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::VendorCode { code, .. } => Some(code),
            _ => None,
        }
    }
}

// Note on From trait implementations:
// We intentionally do NOT implement `From<reqwest::Error>` because the
// variants require the URL context that the source error does not carry.
// The helper constructors are the pattern here.
