//! Capability traits for the blocking request pipeline.
//!
//! [`Transport`] performs one HTTP exchange and [`Sleeper`] realises pauses.
//! Both are injected so the pipeline can be driven by stubs in tests and by
//! the reqwest-backed transport in production.

use std::{fmt, io, thread, time::Duration};

use thiserror::Error;

use crate::QueryParams;

/// HTTP verb used for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// Parameters travel in the query string.
    Get,
    /// Parameters travel as a form-encoded body.
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
        })
    }
}

/// A single outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Verb to use.
    pub method: HttpMethod,
    /// Target URL without the serialised parameters.
    pub url: String,
    /// Query string parameters (GET) or form fields (POST).
    pub params: QueryParams,
}

impl HttpRequest {
    /// A GET request for `url` with `params` in the query string.
    #[must_use]
    pub fn get(url: impl Into<String>, params: QueryParams) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            params,
        }
    }

    /// A POST request for `url` with `params` as the form body.
    #[must_use]
    pub fn post(url: impl Into<String>, params: QueryParams) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            params,
        }
    }

    /// GET-style representation used for logging and cache identity.
    #[must_use]
    pub fn prepared_url(&self) -> String {
        self.params.prepare_url(&self.url)
    }
}

/// A response as received, before any decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// Final URL the response came from.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// Canonical reason phrase for `status`, possibly empty.
    pub reason: String,
    /// Body bytes.
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Whether the status is below 400, matching the usual "ok" notion.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.status < 400
    }

    /// Whether the server asked us to back off (429 or 504).
    #[must_use]
    pub const fn is_server_busy(&self) -> bool {
        matches!(self.status, 429 | 504)
    }

    /// Body decoded lossily as UTF-8.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Failures that prevented any response from being received.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The request did not complete within the configured timeout.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout {
        /// Fully qualified request URL.
        url: String,
        /// Timeout that elapsed.
        timeout_secs: u64,
    },
    /// The connection failed or the body could not be read.
    #[error("network error contacting {url}: {source}")]
    Network {
        /// Fully qualified request URL.
        url: String,
        /// Underlying I/O failure.
        source: io::Error,
    },
}

/// Performs one blocking HTTP exchange.
///
/// Implementations must not interpret status codes: 4xx and 5xx responses
/// are returned as [`RawResponse`] values for the caller to triage.
pub trait Transport: Send + Sync {
    /// Send `request` and return whatever the server answered.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when no response was received.
    fn send(&self, request: &HttpRequest) -> Result<RawResponse, TransportError>;
}

/// Realises a blocking pause on the calling thread.
pub trait Sleeper: Send + Sync {
    /// Block for `duration`.
    fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by [`std::thread::sleep`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(200, true, false)]
    #[case(302, true, false)]
    #[case(400, false, false)]
    #[case(429, false, true)]
    #[case(500, false, false)]
    #[case(504, false, true)]
    fn classifies_status_codes(#[case] status: u16, #[case] ok: bool, #[case] busy: bool) {
        let response = RawResponse {
            url: "https://example.org".to_owned(),
            status,
            reason: String::new(),
            body: Vec::new(),
        };

        assert_eq!(response.is_ok(), ok);
        assert_eq!(response.is_server_busy(), busy);
    }

    #[rstest]
    fn post_requests_prepare_get_style_urls() {
        let request = HttpRequest::post(
            "https://overpass.example/api/interpreter",
            QueryParams::new().with("data", "out;"),
        );

        assert_eq!(request.method.to_string(), "POST");
        assert_eq!(
            request.prepared_url(),
            "https://overpass.example/api/interpreter?data=out%3B"
        );
    }
}
