//! `features` and `network` subcommands: multi-polygon Overpass downloads.

use camino::Utf8PathBuf;
use clap::Parser;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use osmfetch_core::{NetworkFilter, NetworkType, PolygonCoords, TagSpec};
use osmfetch_data::{download_features, download_network};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    ARG_CACHE_FOLDER, ARG_CUSTOM_FILTER, ARG_ENDPOINT, ARG_NETWORK_TYPE, ARG_NO_CACHE,
    ARG_POLYGON, ARG_SETTINGS, ARG_TAGS, CliError, ENV_FEATURES_POLYGON, ENV_FEATURES_TAGS, ENV_NETWORK_POLYGON,
    session::{Service, SessionBuilder, SessionOverrides},
};

/// CLI arguments for the `features` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Download every element carrying one of the requested tags \
                 inside each polygon. Polygons are Overpass `poly:` strings of \
                 space-separated latitude/longitude pairs; tags are a JSON \
                 object mapping keys to true, a value, or a list of values.",
    about = "Download tagged features inside polygons"
)]
#[ortho_config(prefix = "OSMFETCH")]
pub(crate) struct FeaturesArgs {
    /// Polygon coordinate string; repeat for several polygons.
    #[arg(long = ARG_POLYGON, value_name = "coords")]
    #[serde(default)]
    pub(crate) polygon: Vec<String>,
    /// JSON tag specification, e.g. '{"building": true}'.
    #[arg(long = ARG_TAGS, value_name = "json")]
    #[serde(default)]
    pub(crate) tags: Option<String>,
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
    /// Override the Overpass API base URL.
    #[arg(long = ARG_ENDPOINT, value_name = "url")]
    #[serde(default)]
    pub(crate) endpoint: Option<String>,
}

impl FeaturesArgs {
    pub(crate) fn into_config(self) -> Result<FeaturesConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        FeaturesConfig::try_from(merged)
    }
}

/// Resolved `features` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FeaturesConfig {
    pub(crate) polygons: Vec<PolygonCoords>,
    pub(crate) tags: TagSpec,
    pub(crate) session: SessionOverrides,
}

impl TryFrom<FeaturesArgs> for FeaturesConfig {
    type Error = CliError;

    fn try_from(args: FeaturesArgs) -> Result<Self, Self::Error> {
        let polygons = parse_polygons(args.polygon, ENV_FEATURES_POLYGON)?;
        let raw_tags = args.tags.ok_or(CliError::MissingArgument {
            field: ARG_TAGS,
            env: ENV_FEATURES_TAGS,
        })?;
        let tags_json: Value = serde_json::from_str(&raw_tags).map_err(CliError::ParseTags)?;
        let tags = TagSpec::from_json(&tags_json)?;
        Ok(Self {
            polygons,
            tags,
            session: SessionOverrides {
                settings: args.settings,
                cache_folder: args.cache_folder,
                no_cache: args.no_cache.unwrap_or(false),
                endpoint: args.endpoint,
            },
        })
    }
}

/// CLI arguments for the `network` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Download the street network inside each polygon: the ways \
                 matching a network-type preset (drive, drive_service, walk, \
                 bike, all, all_private) or a custom Overpass filter, plus \
                 their nodes.",
    about = "Download street network ways inside polygons"
)]
#[ortho_config(prefix = "OSMFETCH")]
pub(crate) struct NetworkArgs {
    /// Polygon coordinate string; repeat for several polygons.
    #[arg(long = ARG_POLYGON, value_name = "coords")]
    #[serde(default)]
    pub(crate) polygon: Vec<String>,
    /// Network-type preset (default "all").
    #[arg(long = ARG_NETWORK_TYPE, value_name = "type")]
    #[serde(default)]
    pub(crate) network_type: Option<String>,
    /// Overpass way filter used instead of the preset.
    #[arg(long = ARG_CUSTOM_FILTER, value_name = "filter")]
    #[serde(default)]
    pub(crate) custom_filter: Option<String>,
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
    /// Override the Overpass API base URL.
    #[arg(long = ARG_ENDPOINT, value_name = "url")]
    #[serde(default)]
    pub(crate) endpoint: Option<String>,
}

impl NetworkArgs {
    pub(crate) fn into_config(self) -> Result<NetworkConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        NetworkConfig::try_from(merged)
    }
}

/// Resolved `network` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NetworkConfig {
    pub(crate) polygons: Vec<PolygonCoords>,
    pub(crate) filter: NetworkFilter,
    pub(crate) session: SessionOverrides,
}

impl TryFrom<NetworkArgs> for NetworkConfig {
    type Error = CliError;

    fn try_from(args: NetworkArgs) -> Result<Self, Self::Error> {
        let polygons = parse_polygons(args.polygon, ENV_NETWORK_POLYGON)?;
        // A custom filter wins over the preset, which is still validated.
        let preset: NetworkType = args.network_type.as_deref().unwrap_or("all").parse()?;
        let filter = match args.custom_filter {
            Some(custom) => NetworkFilter::Custom(custom),
            None => NetworkFilter::Preset(preset),
        };
        Ok(Self {
            polygons,
            filter,
            session: SessionOverrides {
                settings: args.settings,
                cache_folder: args.cache_folder,
                no_cache: args.no_cache.unwrap_or(false),
                endpoint: args.endpoint,
            },
        })
    }
}

fn parse_polygons(raw: Vec<String>, env: &'static str) -> Result<Vec<PolygonCoords>, CliError> {
    if raw.is_empty() {
        return Err(CliError::MissingArgument {
            field: ARG_POLYGON,
            env,
        });
    }
    Ok(raw
        .into_iter()
        .map(PolygonCoords::new)
        .collect::<Result<Vec<_>, _>>()?)
}

pub(crate) fn fetch_features(
    args: FeaturesArgs,
    builder: &dyn SessionBuilder,
) -> Result<Value, CliError> {
    let config = args.into_config()?;
    fetch_features_with(&config, builder)
}

pub(crate) fn fetch_features_with(
    config: &FeaturesConfig,
    builder: &dyn SessionBuilder,
) -> Result<Value, CliError> {
    let settings = config.session.resolve(Service::Overpass)?;
    let session = builder.build(&settings)?;
    let results = download_features(
        session.overpass(),
        session.query_settings(),
        &config.polygons,
        &config.tags,
    )?;
    Ok(Value::Array(results))
}

pub(crate) fn fetch_network(
    args: NetworkArgs,
    builder: &dyn SessionBuilder,
) -> Result<Value, CliError> {
    let config = args.into_config()?;
    fetch_network_with(&config, builder)
}

pub(crate) fn fetch_network_with(
    config: &NetworkConfig,
    builder: &dyn SessionBuilder,
) -> Result<Value, CliError> {
    let settings = config.session.resolve(Service::Overpass)?;
    let session = builder.build(&settings)?;
    let results = download_network(
        session.overpass(),
        session.query_settings(),
        &config.polygons,
        &config.filter,
        session.default_access(),
    )?;
    Ok(Value::Array(results))
}
