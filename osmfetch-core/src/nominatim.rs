//! Nominatim request types and parameter construction.

use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::{QueryError, QueryParams};

/// Nominatim endpoint selected by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    /// Free-text or structured search.
    Search,
    /// Coordinates to address.
    Reverse,
    /// Details for known OSM ids.
    Lookup,
}

impl RequestType {
    /// Path segment appended to the endpoint.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Reverse => "reverse",
            Self::Lookup => "lookup",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RequestType {
    type Err = QueryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "search" => Ok(Self::Search),
            "reverse" => Ok(Self::Reverse),
            "lookup" => Ok(Self::Lookup),
            other => Err(QueryError::UnsupportedRequestType(other.to_owned())),
        }
    }
}

/// What to ask Nominatim for.
#[derive(Debug, Clone, PartialEq)]
pub enum NominatimQuery {
    /// Free-text search such as `"Berlin, Germany"`.
    FreeText(String),
    /// Structured search fields such as `city` and `country`.
    Structured(BTreeMap<String, String>),
    /// Comma-separated, type-prefixed OSM ids such as `"R146656,W104393803"`.
    OsmIds(String),
    /// Reverse geocoding of a coordinate.
    Reverse {
        /// Latitude in degrees.
        lat: f64,
        /// Longitude in degrees.
        lon: f64,
        /// Optional detail level, 0 (country) to 18 (building).
        zoom: Option<u8>,
    },
}

impl NominatimQuery {
    /// Endpoint this query is sent to.
    #[must_use]
    pub const fn request_type(&self) -> RequestType {
        match self {
            Self::FreeText(_) | Self::Structured(_) => RequestType::Search,
            Self::OsmIds(_) => RequestType::Lookup,
            Self::Reverse { .. } => RequestType::Reverse,
        }
    }

    /// Build the request parameters.
    ///
    /// Every request asks for JSON and carries `polygon_geojson`. Searches add
    /// `dedupe=0` and `limit`; structured fields are added in key order.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::EmptyStructuredQuery`] for a structured search
    /// without fields.
    ///
    /// # Examples
    ///
    /// ```
    /// use osmfetch_core::NominatimQuery;
    ///
    /// let params = NominatimQuery::FreeText("Piedmont, CA".into()).to_params(1, true)?;
    /// assert_eq!(
    ///     params.to_query_string(),
    ///     "dedupe=0&format=json&limit=1&polygon_geojson=1&q=Piedmont%2C+CA"
    /// );
    /// # Ok::<(), osmfetch_core::QueryError>(())
    /// ```
    pub fn to_params(&self, limit: u32, polygon_geojson: bool) -> Result<QueryParams, QueryError> {
        let mut params = QueryParams::new()
            .with("format", "json")
            .with("polygon_geojson", u8::from(polygon_geojson));

        match self {
            Self::FreeText(text) => {
                params.insert("dedupe", 0);
                params.insert("limit", limit);
                params.insert("q", text);
            }
            Self::Structured(fields) => {
                if fields.is_empty() {
                    return Err(QueryError::EmptyStructuredQuery);
                }
                params.insert("dedupe", 0);
                params.insert("limit", limit);
                for (key, value) in fields {
                    params.insert(key.as_str(), value);
                }
            }
            Self::OsmIds(ids) => params.insert("osm_ids", ids),
            Self::Reverse { lat, lon, zoom } => {
                params.insert("lat", lat);
                params.insert("lon", lon);
                if let Some(zoom) = zoom {
                    params.insert("zoom", zoom);
                }
            }
        }
        Ok(params)
    }
}
