//! Facade crate for the osmfetch request layer.
//!
//! Re-exports the query building blocks from `osmfetch-core` and the cached,
//! rate-limited clients from `osmfetch-data`. Start from [`Settings`] and
//! [`Session::connect`].

#![forbid(unsafe_code)]

pub use osmfetch_core::{
    DEFAULT_ACCESS, NetworkFilter, NetworkType, NominatimQuery, OverpassSettings, Pin, PinTable,
    PolygonCoords, QueryError, QueryParams, RequestType, ResponseError, TagSpec, TagValue,
    TransportError, features_query, network_query,
};

pub use osmfetch_data::{
    CacheStore, ClientBuildError, ElevationClient, FetchError, NominatimClient, OverpassClient,
    RetryPolicy, Session, Settings, SlotPolicy, download_features, download_network,
};

#[cfg(feature = "test-support")]
pub use osmfetch_core::test_support;
