//! Decoding of raw HTTP responses into JSON.

use log::{error, info, warn};
use serde_json::Value;
use thiserror::Error;

use crate::{RawResponse, hostname_from_url};

const EXCERPT_CHARS: usize = 200;

/// The body of a response could not be decoded as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ResponseError {
    /// The server reported success but sent something other than JSON.
    #[error("{domain} responded {status} {reason} with a non-JSON body: {excerpt}")]
    InsufficientResponse {
        /// Host that answered.
        domain: String,
        /// HTTP status code.
        status: u16,
        /// Reason phrase.
        reason: String,
        /// Leading part of the body.
        excerpt: String,
    },
    /// The server reported failure and the body was not JSON either.
    #[error("{domain} responded {status} {reason}: {excerpt}")]
    ResponseStatusCode {
        /// Host that answered.
        domain: String,
        /// HTTP status code.
        status: u16,
        /// Reason phrase.
        reason: String,
        /// Leading part of the body.
        excerpt: String,
    },
}

impl ResponseError {
    /// HTTP status code of the failed response.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::InsufficientResponse { status, .. } | Self::ResponseStatusCode { status, .. } => {
                *status
            }
        }
    }
}

/// Decode `response` as JSON.
///
/// Every response is logged with its size, domain and status. A decoded body
/// carrying a `remark` is logged as a warning and still returned.
///
/// # Errors
///
/// Returns [`ResponseError::InsufficientResponse`] when the status was
/// successful but the body is not JSON, and
/// [`ResponseError::ResponseStatusCode`] when both the status and the body
/// indicate failure.
pub fn parse_response(response: &RawResponse) -> Result<Value, ResponseError> {
    let domain = hostname_from_url(&response.url);
    let size_kb = response.body.len() as f64 / 1000.0;
    info!(
        "Downloaded {size_kb:.1}kB from {domain} with status {}",
        response.status
    );

    match serde_json::from_slice::<Value>(&response.body) {
        Ok(body) => {
            if let Some(remark) = body.get("remark") {
                warn!("{domain} remarked: {}", remark_text(remark));
            }
            Ok(body)
        }
        Err(err) => {
            let excerpt = excerpt(&response.text());
            error!(
                "{domain} returned {} {} with an undecodable body ({err}): {excerpt}",
                response.status, response.reason
            );
            let status = response.status;
            let reason = response.reason.clone();
            if response.is_ok() {
                Err(ResponseError::InsufficientResponse {
                    domain,
                    status,
                    reason,
                    excerpt,
                })
            } else {
                Err(ResponseError::ResponseStatusCode {
                    domain,
                    status,
                    reason,
                    excerpt,
                })
            }
        }
    }
}

/// Whether a decoded body carries a server `remark`.
#[must_use]
pub fn has_remark(body: &Value) -> bool {
    body.get("remark").is_some()
}

fn remark_text(remark: &Value) -> String {
    remark
        .as_str()
        .map_or_else(|| remark.to_string(), str::to_owned)
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_owned(),
    }
}
