//! Errors raised when building requests from caller input.

use thiserror::Error;

/// Invalid caller input detected while building a request.
///
/// These are never retried: they describe a request that cannot be sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum QueryError {
    /// The tag specification was not a JSON object.
    #[error("tags must be a mapping with values of bool, str, or list of str")]
    TagsNotAnObject,
    /// A tag value had an unsupported shape.
    #[error("tag {key:?} must map to a bool, a string, or a list of strings")]
    InvalidTagValue {
        /// Offending tag key.
        key: String,
    },
    /// A polygon coordinate string was empty.
    #[error("polygon coordinate string must not be empty")]
    EmptyPolygon,
    /// An unknown network type label was supplied.
    #[error("unrecognized network type {0:?}")]
    UnknownNetworkType(String),
    /// An unknown Nominatim request type label was supplied.
    #[error("Nominatim request type must be \"search\", \"reverse\", or \"lookup\", got {0:?}")]
    UnsupportedRequestType(String),
    /// A structured Nominatim query carried no fields.
    #[error("structured Nominatim query must contain at least one field")]
    EmptyStructuredQuery,
}
