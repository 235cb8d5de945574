//! `elevation` subcommand: fetch a caller-built elevation service URL.

use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    ARG_CACHE_FOLDER, ARG_NO_CACHE, ARG_PAUSE, ARG_SETTINGS, ARG_URL, CliError, ENV_ELEVATION_URL,
    session::{Service, SessionBuilder, SessionOverrides},
};

/// CLI arguments for the `elevation` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Fetch an elevation service URL, including any API key and \
                 locations, and print the decoded JSON response.",
    about = "Query an elevation service"
)]
#[ortho_config(prefix = "OSMFETCH")]
pub(crate) struct ElevationArgs {
    /// Complete request URL.
    #[arg(value_name = ARG_URL)]
    #[serde(default)]
    pub(crate) url: Option<String>,
    /// Seconds to wait before sending (default 0).
    #[arg(long = ARG_PAUSE, value_name = "secs")]
    #[serde(default)]
    pub(crate) pause: Option<u64>,
    /// JSON settings file.
    #[arg(long = ARG_SETTINGS, value_name = "path")]
    #[serde(default)]
    pub(crate) settings: Option<Utf8PathBuf>,
    /// Override the response cache directory.
    #[arg(long = ARG_CACHE_FOLDER, value_name = "dir")]
    #[serde(default)]
    pub(crate) cache_folder: Option<Utf8PathBuf>,
    /// Bypass the response cache.
    #[arg(long = ARG_NO_CACHE, num_args = 0..=1, default_missing_value = "true")]
    #[serde(default)]
    pub(crate) no_cache: Option<bool>,
}

impl ElevationArgs {
    pub(crate) fn into_config(self) -> Result<ElevationConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ElevationConfig::try_from(merged)
    }
}

/// Resolved `elevation` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ElevationConfig {
    pub(crate) url: String,
    pub(crate) pause: Duration,
    pub(crate) session: SessionOverrides,
}

impl TryFrom<ElevationArgs> for ElevationConfig {
    type Error = CliError;

    fn try_from(args: ElevationArgs) -> Result<Self, Self::Error> {
        let url = args.url.ok_or(CliError::MissingArgument {
            field: ARG_URL,
            env: ENV_ELEVATION_URL,
        })?;
        Ok(Self {
            url,
            pause: Duration::from_secs(args.pause.unwrap_or(0)),
            session: SessionOverrides {
                settings: args.settings,
                cache_folder: args.cache_folder,
                no_cache: args.no_cache.unwrap_or(false),
                endpoint: None,
            },
        })
    }
}

pub(crate) fn fetch_elevation(
    args: ElevationArgs,
    builder: &dyn SessionBuilder,
) -> Result<Value, CliError> {
    let config = args.into_config()?;
    fetch_with(&config, builder)
}

pub(crate) fn fetch_with(
    config: &ElevationConfig,
    builder: &dyn SessionBuilder,
) -> Result<Value, CliError> {
    let settings = config.session.resolve(Service::Elevation)?;
    let session = builder.build(&settings)?;
    Ok(session.elevation().request(&config.url, config.pause)?)
}
