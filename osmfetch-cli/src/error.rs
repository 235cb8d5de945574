//! Error types emitted by the osmfetch CLI.

use std::sync::Arc;

use camino::Utf8PathBuf;
use osmfetch_core::QueryError;
use osmfetch_data::{ClientBuildError, FetchError};
use thiserror::Error;

/// Errors emitted by the osmfetch CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// A referenced input path does not exist on disk.
    #[error("{field} path {path:?} does not exist")]
    MissingSourceFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// Reading the settings file failed.
    #[error("failed to read settings from {path:?}: {source}")]
    ReadSettings {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The settings file is not valid settings JSON.
    #[error("failed to parse settings JSON at {path:?}: {source}")]
    ParseSettings {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// A `--tags` argument is not JSON.
    #[error("tags must be a JSON object: {0}")]
    ParseTags(#[source] serde_json::Error),
    /// A `--field` argument is not of the form `key=value`.
    #[error("structured field {0:?} is not of the form key=value")]
    MalformedField(String),
    /// Query construction rejected an argument.
    #[error(transparent)]
    Query(#[from] QueryError),
    /// Building the HTTP session failed.
    #[error("failed to build HTTP session: {0}")]
    BuildSession(#[from] ClientBuildError),
    /// A request failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Serializing the fetched JSON failed.
    #[error("failed to serialize output: {0}")]
    SerializeOutput(#[source] serde_json::Error),
    /// Writing the output failed.
    #[error("failed to write output: {0}")]
    WriteOutput(#[source] std::io::Error),
}
