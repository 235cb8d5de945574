//! Canonical request parameters and prepared URLs.
//!
//! Cache keys are derived from the prepared URL, so parameters are always
//! serialised in sorted key order: two requests carrying the same pairs yield
//! the same URL no matter how the caller assembled them.

use std::collections::BTreeMap;

use url::form_urlencoded;

/// Sorted set of request parameters.
///
/// # Examples
///
/// ```
/// use osmfetch_core::QueryParams;
///
/// let params = QueryParams::new()
///     .with("q", "Berlin, Germany")
///     .with("format", "json");
/// assert_eq!(params.to_query_string(), "format=json&q=Berlin%2C+Germany");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(BTreeMap<String, String>);

impl QueryParams {
    /// Create an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a parameter, returning the updated set.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a parameter in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.insert(key.into(), value.to_string());
    }

    /// Look up a parameter value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Whether no parameters are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Serialise as `application/x-www-form-urlencoded` text.
    #[must_use]
    pub fn to_query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.iter())
            .finish()
    }

    /// GET-style URL for `target` carrying these parameters.
    ///
    /// This is also the cache identity of a POST carrying the same pairs as
    /// its form body.
    #[must_use]
    pub fn prepare_url(&self, target: &str) -> String {
        if self.is_empty() {
            return target.to_owned();
        }
        let separator = if target.contains('?') { '&' } else { '?' };
        format!("{target}{separator}{}", self.to_query_string())
    }
}

impl<K, V> FromIterator<(K, V)> for QueryParams
where
    K: Into<String>,
    V: ToString,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

/// Join a base endpoint and a path segment with exactly one slash.
#[must_use]
pub fn join_endpoint(base: &str, segment: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        segment.trim_start_matches('/')
    )
}

/// Host component of `url`, without port or credentials.
///
/// Falls back to a best-effort split for strings that do not parse as URLs.
#[must_use]
pub fn hostname_from_url(url: &str) -> String {
    if let Some(host) = url::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_owned))
    {
        return host;
    }
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = without_scheme.split('/').next().unwrap_or_default();
    authority.split(':').next().unwrap_or_default().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn insertion_order_does_not_change_the_url() {
        let forward = QueryParams::new().with("a", 1).with("b", 2).with("c", 3);
        let backward: QueryParams = [("c", 3), ("b", 2), ("a", 1)].into_iter().collect();

        assert_eq!(
            forward.prepare_url("https://example.org/search"),
            backward.prepare_url("https://example.org/search")
        );
    }

    #[rstest]
    fn prepare_url_encodes_query_text() {
        let params = QueryParams::new().with("data", "[out:json];node(1);out;");

        assert_eq!(
            params.prepare_url("https://overpass.example/api/interpreter"),
            "https://overpass.example/api/interpreter?data=%5Bout%3Ajson%5D%3Bnode%281%29%3Bout%3B"
        );
    }

    #[rstest]
    fn prepare_url_without_params_is_the_target() {
        assert_eq!(
            QueryParams::new().prepare_url("https://example.org/x"),
            "https://example.org/x"
        );
    }

    #[rstest]
    fn prepare_url_appends_to_existing_query() {
        let params = QueryParams::new().with("b", "2");
        assert_eq!(
            params.prepare_url("https://example.org/x?a=1"),
            "https://example.org/x?a=1&b=2"
        );
    }

    #[rstest]
    #[case("https://overpass-api.de/api", "overpass-api.de")]
    #[case("http://localhost:8080/status", "localhost")]
    #[case("https://user:pw@example.org:443/x", "example.org")]
    #[case("example.org:81/path", "example.org")]
    fn hostname_strips_scheme_port_and_path(#[case] url: &str, #[case] expected: &str) {
        assert_eq!(hostname_from_url(url), expected);
    }

    #[rstest]
    #[case("https://x.org/api/", "/status", "https://x.org/api/status")]
    #[case("https://x.org/api", "interpreter", "https://x.org/api/interpreter")]
    fn join_endpoint_uses_single_slash(
        #[case] base: &str,
        #[case] segment: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(join_endpoint(base, segment), expected);
    }
}
