//! Command-line interface for fetching OpenStreetMap data.
#![forbid(unsafe_code)]

use std::io::Write;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod elevation;
mod error;
mod nominatim;
mod overpass;
mod session;

pub use error::CliError;

use elevation::ElevationArgs;
use nominatim::{GeocodeArgs, LookupArgs};
use overpass::{FeaturesArgs, NetworkArgs};
use session::{HttpSessionBuilder, SessionBuilder};

const ARG_SETTINGS: &str = "settings";
const ARG_CACHE_FOLDER: &str = "cache-folder";
const ARG_NO_CACHE: &str = "no-cache";
const ARG_ENDPOINT: &str = "endpoint";
const ARG_POLYGON: &str = "polygon";
const ARG_TAGS: &str = "tags";
const ARG_NETWORK_TYPE: &str = "network-type";
const ARG_CUSTOM_FILTER: &str = "custom-filter";
const ARG_QUERY: &str = "query";
const ARG_FIELD: &str = "field";
const ARG_LIMIT: &str = "limit";
const ARG_POLYGON_GEOJSON: &str = "polygon-geojson";
const ARG_OSM_IDS: &str = "osm-ids";
const ARG_URL: &str = "url";
const ARG_PAUSE: &str = "pause";
const ENV_FEATURES_POLYGON: &str = "OSMFETCH_CMDS_FEATURES_POLYGON";
const ENV_FEATURES_TAGS: &str = "OSMFETCH_CMDS_FEATURES_TAGS";
const ENV_NETWORK_POLYGON: &str = "OSMFETCH_CMDS_NETWORK_POLYGON";
const ENV_GEOCODE_QUERY: &str = "OSMFETCH_CMDS_GEOCODE_QUERY";
const ENV_LOOKUP_OSM_IDS: &str = "OSMFETCH_CMDS_LOOKUP_OSM_IDS";
const ENV_ELEVATION_URL: &str = "OSMFETCH_CMDS_ELEVATION_URL";

/// Run the osmfetch CLI with the current process arguments and environment,
/// printing the fetched JSON to stdout.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    let mut stdout = std::io::stdout().lock();
    run_command(cli.command, &HttpSessionBuilder, &mut stdout)
}

/// Install a stderr log subscriber filtered by `RUST_LOG`, defaulting to
/// `info`. Records emitted through the `log` facade are forwarded to it.
///
/// # Errors
///
/// Fails when a global subscriber or logger is already installed.
pub fn init_logging() -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()
}

fn run_command(
    command: Command,
    builder: &dyn SessionBuilder,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let value = match command {
        Command::Features(args) => overpass::fetch_features(args, builder)?,
        Command::Network(args) => overpass::fetch_network(args, builder)?,
        Command::Geocode(args) => nominatim::fetch_geocode(args, builder)?,
        Command::Lookup(args) => nominatim::fetch_lookup(args, builder)?,
        Command::Elevation(args) => elevation::fetch_elevation(args, builder)?,
    };
    write_json(writer, &value)
}

fn write_json(writer: &mut dyn Write, value: &Value) -> Result<(), CliError> {
    let payload = serde_json::to_string_pretty(value).map_err(CliError::SerializeOutput)?;
    writer
        .write_all(payload.as_bytes())
        .map_err(CliError::WriteOutput)?;
    writer.write_all(b"\n").map_err(CliError::WriteOutput)?;
    Ok(())
}

#[derive(Debug, Parser)]
#[command(
    name = "osmfetch",
    about = "Fetch OpenStreetMap data from Overpass, Nominatim and elevation services",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download tagged features inside polygons.
    Features(FeaturesArgs),
    /// Download street network ways inside polygons.
    Network(NetworkArgs),
    /// Geocode a place by free text or structured fields.
    Geocode(GeocodeArgs),
    /// Look up OSM elements by id.
    Lookup(LookupArgs),
    /// Query an elevation service.
    Elevation(ElevationArgs),
}

#[cfg(test)]
mod tests;
