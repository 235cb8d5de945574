//! Network and disk adapters for fetching OpenStreetMap data.
//!
//! This crate wires the pure building blocks of `osmfetch-core` to the
//! outside world: a SHA-1 keyed response cache on disk, DNS pinning with a
//! DNS-over-HTTPS fallback, a reqwest-backed blocking transport, Overpass
//! slot scheduling and the request clients that combine them.
//!
//! Requests to a service are strictly sequential and every wait is a
//! blocking sleep on the calling thread.

pub mod cache;
pub mod client;
pub mod dns;
pub mod download;
mod error;
pub mod http;
pub mod settings;
pub mod slots;

pub use cache::{CacheStore, RemarkPolicy};
pub use client::{ElevationClient, NominatimClient, OverpassClient, RequestPipeline, RetryPolicy};
pub use dns::{DohResolver, HostResolver};
pub use download::{download_features, download_network};
pub use error::{CacheError, ClientBuildError, FetchError};
pub use http::{HttpConfig, HttpTransport, PinnedDns};
pub use settings::{Session, Settings, TransportOptions};
pub use slots::{SlotPolicy, SlotScheduler};
