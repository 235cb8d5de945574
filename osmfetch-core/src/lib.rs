//! I/O-free building blocks for fetching OpenStreetMap data.
//!
//! This crate turns caller input into requests and raw responses into JSON:
//! tag specifications and Overpass query text, canonical request parameters,
//! slot-status parsing and response decoding. Side effects are expressed as
//! capability traits ([`Transport`], [`Sleeper`], [`NameResolver`]) which the
//! `osmfetch-data` crate implements against the network.

#![cfg_attr(docsrs, feature(doc_cfg))]

mod error;
mod nominatim;
mod params;
mod polygon;
mod query;
mod resolver;
mod response;
mod status;
mod tags;
mod transport;

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-support")))]
pub mod test_support;

pub use error::QueryError;
pub use nominatim::{NominatimQuery, RequestType};
pub use params::{QueryParams, hostname_from_url, join_endpoint};
pub use polygon::PolygonCoords;
pub use query::{
    DEFAULT_ACCESS, DEFAULT_SETTINGS_TEMPLATE, NetworkFilter, NetworkType, OverpassSettings,
    features_query, network_query,
};
pub use resolver::{NameResolver, Pin, PinTable, PinnedResolver, SystemResolver};
pub use response::{ResponseError, has_remark, parse_response};
pub use status::{STATUS_LINE_INDEX, SlotStatus, StatusParseError};
pub use tags::{TagSpec, TagValue};
pub use transport::{
    HttpMethod, HttpRequest, RawResponse, Sleeper, ThreadSleeper, Transport, TransportError,
};
