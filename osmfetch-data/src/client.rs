//! Request clients for Overpass, Nominatim and elevation services.
//!
//! All three share [`RequestPipeline`]: cache lookup, pause, send, retry on
//! 429/504, decode and cache write. The flavours differ in how the pause is
//! chosen and in what happens before the first network access.

use std::{sync::Arc, time::Duration};

use log::{info, warn};
use osmfetch_core::{
    HttpRequest, NominatimQuery, QueryParams, RequestType, Sleeper, Transport, hostname_from_url,
    join_endpoint, parse_response,
};
use serde_json::Value;

use crate::{CacheStore, FetchError, HostResolver, RemarkPolicy, SlotScheduler};

/// Default pause between Nominatim requests, per its usage policy.
pub const DEFAULT_NOMINATIM_PAUSE: Duration = Duration::from_secs(1);

/// Default extra pause after a 429 or 504 response.
pub const DEFAULT_ERROR_PAUSE: Duration = Duration::from_secs(60);

/// Caps on 429/504 retries. Both are unbounded by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: Option<u32>,
    /// Maximum total backoff slept across retries.
    pub max_total_backoff: Option<Duration>,
}

impl RetryPolicy {
    /// Retry until the server stops answering 429/504.
    pub const UNBOUNDED: Self = Self {
        max_retries: None,
        max_total_backoff: None,
    };

    /// Limit the number of retries.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Limit the total backoff.
    #[must_use]
    pub const fn with_max_total_backoff(mut self, limit: Duration) -> Self {
        self.max_total_backoff = Some(limit);
        self
    }

    fn allows_retry(&self, retries_done: u32) -> bool {
        self.max_retries.is_none_or(|max| retries_done < max)
    }

    fn allows_backoff(&self, total_backoff: Duration) -> bool {
        self.max_total_backoff.is_none_or(|limit| total_backoff <= limit)
    }
}

/// The cache/pause/send/retry/decode sequence shared by every client.
#[derive(Clone)]
pub struct RequestPipeline {
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    cache: CacheStore,
    retry: RetryPolicy,
}

impl std::fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("cache", &self.cache)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl RequestPipeline {
    /// Pipeline sending through `transport` and pausing with `sleeper`.
    pub fn new(
        transport: Arc<dyn Transport>,
        sleeper: Arc<dyn Sleeper>,
        cache: CacheStore,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            sleeper,
            cache,
            retry,
        }
    }

    /// Cache consulted and written by this pipeline.
    #[must_use]
    pub const fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Transport used for every exchange.
    #[must_use]
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// Sleeper used for every pause.
    #[must_use]
    pub fn sleeper(&self) -> Arc<dyn Sleeper> {
        Arc::clone(&self.sleeper)
    }

    fn cached(&self, key: &str) -> Option<Value> {
        self.cache.lookup(key, RemarkPolicy::Strict)
    }

    /// Send `request` until it yields a decodable response.
    ///
    /// `pause` is evaluated and slept before every attempt. After a 429 or
    /// 504 response `backoff` is evaluated and slept before the next attempt.
    /// Decoded bodies from successful responses are cached under `key`.
    fn send(
        &self,
        request: &HttpRequest,
        key: &str,
        mut pause: impl FnMut() -> Duration,
        mut backoff: impl FnMut() -> Duration,
    ) -> Result<Value, FetchError> {
        let domain = hostname_from_url(&request.url);
        let prepared = request.prepared_url();
        let mut retries: u32 = 0;
        let mut waited = Duration::ZERO;

        loop {
            let this_pause = pause();
            info!(
                "Pausing {}s before making HTTP {} request to {domain:?}",
                this_pause.as_secs(),
                request.method
            );
            self.sleeper.sleep(this_pause);

            info!("{} {prepared}", request.method);
            let response = self.transport.send(request)?;

            if response.is_server_busy() {
                let exhausted = || FetchError::RetriesExhausted {
                    url: prepared.clone(),
                    attempts: retries + 1,
                    waited,
                };
                // The retry count is checked before `backoff`, which may poll.
                if !self.retry.allows_retry(retries) {
                    return Err(exhausted());
                }
                let delay = backoff();
                if !self.retry.allows_backoff(waited + delay) {
                    return Err(exhausted());
                }
                warn!(
                    "{domain:?} responded {} {}: retrying in {}s",
                    response.status,
                    response.reason,
                    delay.as_secs()
                );
                self.sleeper.sleep(delay);
                waited += delay;
                retries += 1;
                continue;
            }

            let body = parse_response(&response)?;
            if let Err(err) = self.cache.store(key, &body, response.is_ok()) {
                warn!("Failed to cache response for {prepared}: {err}");
            }
            return Ok(body);
        }
    }
}

/// Client for an Overpass interpreter.
#[derive(Debug, Clone)]
pub struct OverpassClient {
    pipeline: RequestPipeline,
    endpoint: String,
    hosts: HostResolver,
    slots: SlotScheduler,
    error_pause: Duration,
}

impl OverpassClient {
    /// Client for the Overpass API rooted at `endpoint`.
    pub fn new(
        pipeline: RequestPipeline,
        endpoint: impl Into<String>,
        hosts: HostResolver,
        slots: SlotScheduler,
    ) -> Self {
        Self {
            pipeline,
            endpoint: endpoint.into(),
            hosts,
            slots,
            error_pause: DEFAULT_ERROR_PAUSE,
        }
    }

    /// Set the extra pause applied after 429/504 responses.
    #[must_use]
    pub const fn with_error_pause(mut self, error_pause: Duration) -> Self {
        self.error_pause = error_pause;
        self
    }

    /// Base endpoint, without `/interpreter`.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Run `query` and return the decoded JSON.
    ///
    /// The query is POSTed as the `data` form field and cached under the
    /// equivalent GET URL. Before any network access the endpoint's host is
    /// pinned so the status poll and the query reach the same server. The
    /// pause before each attempt is `pause_override` when given, else the
    /// slot scheduler's answer.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when no response is received, the response
    /// cannot be decoded, or a configured retry cap is reached.
    pub fn request(&self, query: &str, pause_override: Option<Duration>) -> Result<Value, FetchError> {
        let url = join_endpoint(&self.endpoint, "interpreter");
        let request = HttpRequest::post(url, QueryParams::new().with("data", query));
        let key = request.prepared_url();
        if let Some(body) = self.pipeline.cached(&key) {
            return Ok(body);
        }

        self.hosts.pin(&self.endpoint);
        self.pipeline.send(
            &request,
            &key,
            || pause_override.unwrap_or_else(|| self.slots.pause(&self.endpoint)),
            || self.error_pause + self.slots.pause(&self.endpoint),
        )
    }
}

/// Client for a Nominatim geocoder.
#[derive(Debug, Clone)]
pub struct NominatimClient {
    pipeline: RequestPipeline,
    endpoint: String,
    key: Option<String>,
    pause: Duration,
    error_pause: Duration,
}

impl NominatimClient {
    /// Client for the Nominatim API rooted at `endpoint`.
    pub fn new(pipeline: RequestPipeline, endpoint: impl Into<String>, key: Option<String>) -> Self {
        Self {
            pipeline,
            endpoint: endpoint.into(),
            key,
            pause: DEFAULT_NOMINATIM_PAUSE,
            error_pause: DEFAULT_ERROR_PAUSE,
        }
    }

    /// Set the pause before every request.
    #[must_use]
    pub const fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Set the pause after 429/504 responses.
    #[must_use]
    pub const fn with_error_pause(mut self, error_pause: Duration) -> Self {
        self.error_pause = error_pause;
        self
    }

    /// GET `<endpoint>/<request_type>` with `params`.
    ///
    /// The API key, when configured, is added to the parameters.
    ///
    /// # Errors
    ///
    /// See [`OverpassClient::request`].
    pub fn request(
        &self,
        mut params: QueryParams,
        request_type: RequestType,
        pause_override: Option<Duration>,
    ) -> Result<Value, FetchError> {
        if let Some(key) = &self.key {
            params.insert("key", key);
        }
        let url = join_endpoint(&self.endpoint, request_type.label());
        let request = HttpRequest::get(url, params);
        let key = request.prepared_url();
        if let Some(body) = self.pipeline.cached(&key) {
            return Ok(body);
        }

        let pause = pause_override.unwrap_or(self.pause);
        self.pipeline
            .send(&request, &key, || pause, || self.error_pause)
    }

    /// Like [`NominatimClient::request`], with the request type given as a
    /// label.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Query`] for labels other than `search`,
    /// `reverse` and `lookup`, before any network access.
    pub fn request_labelled(
        &self,
        params: QueryParams,
        request_type: &str,
        pause_override: Option<Duration>,
    ) -> Result<Value, FetchError> {
        let request_type: RequestType = request_type.parse()?;
        self.request(params, request_type, pause_override)
    }

    /// Search for, look up, or reverse-geocode OSM elements.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Query`] for an empty structured query, and
    /// otherwise the errors of [`NominatimClient::request`].
    pub fn retrieve_osm_element(
        &self,
        query: &NominatimQuery,
        limit: u32,
        polygon_geojson: bool,
    ) -> Result<Value, FetchError> {
        let params = query.to_params(limit, polygon_geojson)?;
        self.request(params, query.request_type(), None)
    }
}

/// Client for an elevation service addressed by caller-built URLs.
#[derive(Debug, Clone)]
pub struct ElevationClient {
    pipeline: RequestPipeline,
    error_pause: Duration,
}

impl ElevationClient {
    /// Client sending through `pipeline`.
    pub const fn new(pipeline: RequestPipeline) -> Self {
        Self {
            pipeline,
            error_pause: DEFAULT_ERROR_PAUSE,
        }
    }

    /// Set the pause after 429/504 responses.
    #[must_use]
    pub const fn with_error_pause(mut self, error_pause: Duration) -> Self {
        self.error_pause = error_pause;
        self
    }

    /// GET `url` verbatim after sleeping `pause`.
    ///
    /// # Errors
    ///
    /// See [`OverpassClient::request`].
    pub fn request(&self, url: &str, pause: Duration) -> Result<Value, FetchError> {
        if let Some(body) = self.pipeline.cached(url) {
            return Ok(body);
        }
        let request = HttpRequest::get(url, QueryParams::new());
        self.pipeline
            .send(&request, url, || pause, || self.error_pause)
    }
}
