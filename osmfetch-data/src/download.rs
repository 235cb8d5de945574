//! Multi-polygon Overpass downloads.
//!
//! One query is issued per coordinate string, strictly in order, through a
//! single client. The first terminal failure aborts the download.

use log::info;
use osmfetch_core::{
    NetworkFilter, OverpassSettings, PolygonCoords, TagSpec, features_query, network_query,
};
use serde_json::Value;

use crate::{FetchError, OverpassClient};

/// Download street network ways matching `filter` inside each polygon.
///
/// `default_access` is substituted into preset filters.
///
/// # Errors
///
/// Returns the first [`FetchError`] raised by any sub-query.
pub fn download_network(
    client: &OverpassClient,
    settings: &OverpassSettings,
    polygons: &[PolygonCoords],
    filter: &NetworkFilter,
    default_access: &str,
) -> Result<Vec<Value>, FetchError> {
    let filter = filter.resolve(default_access);
    log_request_count(polygons.len());
    polygons
        .iter()
        .map(|polygon| client.request(&network_query(settings, polygon, &filter), None))
        .collect()
}

/// Download elements carrying any of `tags` inside each polygon.
///
/// # Errors
///
/// Returns the first [`FetchError`] raised by any sub-query. An empty tag
/// specification still sends one (empty) query per polygon.
pub fn download_features(
    client: &OverpassClient,
    settings: &OverpassSettings,
    polygons: &[PolygonCoords],
    tags: &TagSpec,
) -> Result<Vec<Value>, FetchError> {
    log_request_count(polygons.len());
    polygons
        .iter()
        .map(|polygon| client.request(&features_query(settings, polygon, tags), None))
        .collect()
}

fn log_request_count(count: usize) {
    let plural = if count == 1 { "" } else { "s" };
    info!("Requesting data from API in {count} request{plural}");
}
