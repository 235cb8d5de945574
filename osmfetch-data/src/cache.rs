//! Disk-backed response cache keyed by prepared request URL.
//!
//! Each entry is one file named after the SHA-1 digest of the URL and holds
//! the JSON body verbatim. Entries are never expired; clearing the directory
//! is left to the user. Writes replace whole files, so concurrent writers of
//! the same key leave one complete entry behind.

use std::fmt::Write as _;

use camino::{Utf8Path, Utf8PathBuf};
use log::{info, warn};
use osmfetch_core::has_remark;
use serde_json::Value;
use sha1::{Digest, Sha1};

use crate::CacheError;

/// Whether cached bodies carrying a server `remark` may be returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RemarkPolicy {
    /// Treat remarked entries as absent so the request is repeated.
    #[default]
    Strict,
    /// Return remarked entries like any other.
    Relaxed,
}

/// Content-addressed store of JSON response bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStore {
    folder: Utf8PathBuf,
    enabled: bool,
}

impl CacheStore {
    /// Store rooted at `folder`.
    #[must_use]
    pub fn new(folder: impl Into<Utf8PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            enabled: true,
        }
    }

    /// A store that never hits and never writes.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            folder: Utf8PathBuf::new(),
            enabled: false,
        }
    }

    /// Whether lookups and writes are performed.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Directory holding cache files.
    #[must_use]
    pub fn folder(&self) -> &Utf8Path {
        &self.folder
    }

    /// Cache key for `url`: the lowercase hex SHA-1 digest of its bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use osmfetch_data::CacheStore;
    ///
    /// assert_eq!(CacheStore::key("abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    /// ```
    #[must_use]
    pub fn key(url: &str) -> String {
        let digest = Sha1::digest(url.as_bytes());
        digest
            .iter()
            .fold(String::with_capacity(40), |mut hex, byte| {
                let _ = write!(hex, "{byte:02x}");
                hex
            })
    }

    /// File that holds, or would hold, the entry for `url`.
    #[must_use]
    pub fn path_for(&self, url: &str) -> Utf8PathBuf {
        self.folder.join(format!("{}.json", Self::key(url)))
    }

    /// Whether an entry for `url` exists, regardless of its content.
    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        self.enabled && osmfetch_fs::file_is_file(&self.path_for(url)).unwrap_or(false)
    }

    /// Cached body for `url`, if usable under `policy`.
    ///
    /// Unreadable or corrupt entries are logged and reported as absent.
    #[must_use]
    pub fn lookup(&self, url: &str, policy: RemarkPolicy) -> Option<Value> {
        match self.try_lookup(url, policy) {
            Ok(found) => found,
            Err(err) => {
                warn!("Ignoring unusable cache entry: {err}");
                None
            }
        }
    }

    /// Cached body for `url`, surfacing read and decode failures.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Read`] or [`CacheError::Decode`] when an entry
    /// exists but cannot be used.
    pub fn try_lookup(&self, url: &str, policy: RemarkPolicy) -> Result<Option<Value>, CacheError> {
        if !self.enabled {
            return Ok(None);
        }
        let path = self.path_for(url);
        let Some(text) = osmfetch_fs::read_to_string_if_exists(&path).map_err(|source| {
            CacheError::Read {
                path: path.clone(),
                source,
            }
        })?
        else {
            return Ok(None);
        };
        let body: Value = serde_json::from_str(&text).map_err(|source| CacheError::Decode {
            path: path.clone(),
            source,
        })?;

        if policy == RemarkPolicy::Strict && has_remark(&body) {
            info!(
                "Ignoring cache file {path} because it contains a remark: {}",
                body["remark"]
            );
            return Ok(None);
        }
        info!("Retrieved response from cache file {path}");
        Ok(Some(body))
    }

    /// Save `body` for `url` when caching is enabled, the response
    /// `succeeded` and the body is not null.
    ///
    /// Returns whether a file was written. Existing entries are replaced.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the directory or file cannot be written.
    pub fn store(&self, url: &str, body: &Value, succeeded: bool) -> Result<bool, CacheError> {
        if !self.enabled {
            return Ok(false);
        }
        if !succeeded {
            info!("Did not save to cache because response status is not OK");
            return Ok(false);
        }
        if body.is_null() {
            info!("Did not save to cache because the response body is empty");
            return Ok(false);
        }

        osmfetch_fs::create_dir_all(&self.folder).map_err(|source| CacheError::CreateDir {
            path: self.folder.clone(),
            source,
        })?;
        let encoded = serde_json::to_vec(body).map_err(CacheError::Encode)?;
        let path = self.path_for(url);
        osmfetch_fs::replace_file(&path, &encoded).map_err(|source| CacheError::Write {
            path: path.clone(),
            source,
        })?;
        info!("Saved response to cache file {path}");
        Ok(true)
    }
}
