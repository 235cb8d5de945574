//! `geocode` and `lookup` subcommands against a Nominatim geocoder.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use clap::Parser;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use osmfetch_core::NominatimQuery;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    ARG_CACHE_FOLDER, ARG_ENDPOINT, ARG_FIELD, ARG_LIMIT, ARG_NO_CACHE, ARG_OSM_IDS,
    ARG_POLYGON_GEOJSON, ARG_QUERY, ARG_SETTINGS, CliError, ENV_GEOCODE_QUERY, ENV_LOOKUP_OSM_IDS,
    session::{Service, SessionBuilder, SessionOverrides},
};

const DEFAULT_LIMIT: u32 = 1;

/// CLI arguments for the `geocode` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Search Nominatim for places by free text, or by structured \
                 fields such as city and country given as key=value pairs.",
    about = "Geocode a place name"
)]
#[ortho_config(prefix = "OSMFETCH")]
pub(crate) struct GeocodeArgs {
    /// Free-text query, e.g. "Piedmont, California, USA".
    #[arg(value_name = ARG_QUERY)]
    #[serde(default)]
    pub(crate) query: Option<String>,
    /// Structured search field as key=value; repeat for several fields.
    #[arg(long = ARG_FIELD, value_name = "key=value")]
    #[serde(default)]
    pub(crate) field: Vec<String>,
    /// Maximum number of results (default 1).
    #[arg(long = ARG_LIMIT, value_name = "n")]
    #[serde(default)]
    pub(crate) limit: Option<u32>,
    /// Ask for result outlines as GeoJSON (default true).
    #[arg(long = ARG_POLYGON_GEOJSON, value_name = "bool")]
    #[serde(default)]
    pub(crate) polygon_geojson: Option<bool>,
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
    /// Override the Nominatim base URL.
    #[arg(long = ARG_ENDPOINT, value_name = "url")]
    #[serde(default)]
    pub(crate) endpoint: Option<String>,
}

impl GeocodeArgs {
    pub(crate) fn into_config(self) -> Result<NominatimConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        NominatimConfig::try_from(merged)
    }
}

/// CLI arguments for the `lookup` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Look up OSM elements by type-prefixed id, e.g. \
                 R146656,W104393803,N240109189.",
    about = "Look up OSM elements by id"
)]
#[ortho_config(prefix = "OSMFETCH")]
pub(crate) struct LookupArgs {
    /// Comma-separated, type-prefixed OSM ids.
    #[arg(value_name = ARG_OSM_IDS)]
    #[serde(default)]
    pub(crate) osm_ids: Option<String>,
    /// Ask for result outlines as GeoJSON (default true).
    #[arg(long = ARG_POLYGON_GEOJSON, value_name = "bool")]
    #[serde(default)]
    pub(crate) polygon_geojson: Option<bool>,
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
    /// Override the Nominatim base URL.
    #[arg(long = ARG_ENDPOINT, value_name = "url")]
    #[serde(default)]
    pub(crate) endpoint: Option<String>,
}

impl LookupArgs {
    pub(crate) fn into_config(self) -> Result<NominatimConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        NominatimConfig::try_from(merged)
    }
}

/// Resolved `geocode` or `lookup` command configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NominatimConfig {
    pub(crate) query: NominatimQuery,
    pub(crate) limit: u32,
    pub(crate) polygon_geojson: bool,
    pub(crate) session: SessionOverrides,
}

impl TryFrom<GeocodeArgs> for NominatimConfig {
    type Error = CliError;

    fn try_from(args: GeocodeArgs) -> Result<Self, Self::Error> {
        // Structured fields take precedence over free text.
        let query = if args.field.is_empty() {
            let text = args.query.ok_or(CliError::MissingArgument {
                field: ARG_QUERY,
                env: ENV_GEOCODE_QUERY,
            })?;
            NominatimQuery::FreeText(text)
        } else {
            NominatimQuery::Structured(parse_fields(&args.field)?)
        };
        Ok(Self {
            query,
            limit: args.limit.unwrap_or(DEFAULT_LIMIT),
            polygon_geojson: args.polygon_geojson.unwrap_or(true),
            session: SessionOverrides {
                settings: args.settings,
                cache_folder: args.cache_folder,
                no_cache: args.no_cache.unwrap_or(false),
                endpoint: args.endpoint,
            },
        })
    }
}

impl TryFrom<LookupArgs> for NominatimConfig {
    type Error = CliError;

    fn try_from(args: LookupArgs) -> Result<Self, Self::Error> {
        let osm_ids = args.osm_ids.ok_or(CliError::MissingArgument {
            field: ARG_OSM_IDS,
            env: ENV_LOOKUP_OSM_IDS,
        })?;
        Ok(Self {
            query: NominatimQuery::OsmIds(osm_ids),
            limit: DEFAULT_LIMIT,
            polygon_geojson: args.polygon_geojson.unwrap_or(true),
            session: SessionOverrides {
                settings: args.settings,
                cache_folder: args.cache_folder,
                no_cache: args.no_cache.unwrap_or(false),
                endpoint: args.endpoint,
            },
        })
    }
}

fn parse_fields(raw: &[String]) -> Result<BTreeMap<String, String>, CliError> {
    raw.iter()
        .map(|entry| {
            entry
                .split_once('=')
                .filter(|(key, _)| !key.is_empty())
                .map(|(key, value)| (key.to_owned(), value.to_owned()))
                .ok_or_else(|| CliError::MalformedField(entry.clone()))
        })
        .collect()
}

pub(crate) fn fetch_geocode(
    args: GeocodeArgs,
    builder: &dyn SessionBuilder,
) -> Result<Value, CliError> {
    let config = args.into_config()?;
    fetch_with(&config, builder)
}

pub(crate) fn fetch_lookup(args: LookupArgs, builder: &dyn SessionBuilder) -> Result<Value, CliError> {
    let config = args.into_config()?;
    fetch_with(&config, builder)
}

pub(crate) fn fetch_with(
    config: &NominatimConfig,
    builder: &dyn SessionBuilder,
) -> Result<Value, CliError> {
    let settings = config.session.resolve(Service::Nominatim)?;
    let session = builder.build(&settings)?;
    Ok(session.nominatim().retrieve_osm_element(
        &config.query,
        config.limit,
        config.polygon_geojson,
    )?)
}
