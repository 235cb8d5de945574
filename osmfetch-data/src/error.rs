//! Error types for the I/O adapters.

use std::{io, time::Duration};

use camino::Utf8PathBuf;
use osmfetch_core::{QueryError, ResponseError, TransportError};
use thiserror::Error;

/// Failures reading or writing the response cache.
///
/// A missing entry is not an error; lookups report it as absent.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheError {
    /// The cache directory could not be created.
    #[error("failed to create cache directory {path}: {source}")]
    CreateDir {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        source: io::Error,
    },
    /// An entry exists but could not be read.
    #[error("failed to read cache file {path}: {source}")]
    Read {
        /// Offending cache file.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        source: io::Error,
    },
    /// An entry exists but is not valid JSON.
    #[error("cache file {path} is not valid JSON: {source}")]
    Decode {
        /// Offending cache file.
        path: Utf8PathBuf,
        /// Underlying decode failure.
        source: serde_json::Error,
    },
    /// A body could not be serialised for storage.
    #[error("failed to encode response for caching: {0}")]
    Encode(#[source] serde_json::Error),
    /// An entry could not be written.
    #[error("failed to write cache file {path}: {source}")]
    Write {
        /// Target cache file.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        source: io::Error,
    },
}

/// Terminal failures of a request pipeline.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    /// The request could not be built from the caller's input.
    #[error(transparent)]
    Query(#[from] QueryError),
    /// No response was received.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A response was received but could not be decoded.
    #[error(transparent)]
    Response(#[from] ResponseError),
    /// The server kept answering 429/504 beyond the configured retry cap.
    #[error("giving up on {url} after {attempts} attempts and {waited:?} of backoff")]
    RetriesExhausted {
        /// Prepared URL of the request.
        url: String,
        /// Number of requests sent.
        attempts: u32,
        /// Total backoff slept before giving up.
        waited: Duration,
    },
}

/// Failures constructing the HTTP transport.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientBuildError {
    /// The reqwest client could not be built.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
    /// The Tokio runtime could not be built.
    #[error("failed to build Tokio runtime: {0}")]
    Runtime(#[source] io::Error),
    /// A configured header name or value is not valid HTTP.
    #[error("invalid HTTP header {name:?}")]
    InvalidHeader {
        /// Offending header name.
        name: String,
    },
}
