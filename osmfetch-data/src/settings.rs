//! Configuration surface and session assembly.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use camino::Utf8PathBuf;
use osmfetch_core::{
    DEFAULT_ACCESS, DEFAULT_SETTINGS_TEMPLATE, NameResolver, OverpassSettings, PinTable, Sleeper,
    SystemResolver, ThreadSleeper, Transport,
};
use serde::{Deserialize, Serialize};

use crate::{
    CacheStore, ClientBuildError, DohResolver, ElevationClient, HostResolver, HttpConfig,
    HttpTransport, NominatimClient, OverpassClient, RequestPipeline, RetryPolicy, SlotPolicy,
    SlotScheduler, dns::DEFAULT_DOH_URL_TEMPLATE, http,
};

/// Default Overpass API base URL.
pub const DEFAULT_OVERPASS_ENDPOINT: &str = "https://overpass-api.de/api";

/// Default Nominatim base URL.
pub const DEFAULT_NOMINATIM_ENDPOINT: &str = "https://nominatim.openstreetmap.org/";

/// Transport options beyond the identifying headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportOptions {
    /// Proxy URL for every request.
    pub proxy: Option<String>,
    /// Headers added to every request.
    pub headers: BTreeMap<String, String>,
}

/// Everything the request layer reads from its configuration.
///
/// Every field has a default, so partial configuration files deserialise.
/// Durations are whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Read and write the response cache.
    pub use_cache: bool,
    /// Directory holding cached responses.
    pub cache_folder: Utf8PathBuf,
    /// Request timeout, also sent to Overpass as the query timeout.
    pub timeout: u64,
    /// `User-Agent` header.
    pub user_agent: String,
    /// `Referer` header.
    pub referer: String,
    /// `Accept-Language` header.
    pub accept_language: String,
    /// Overpass API base URL.
    pub overpass_endpoint: String,
    /// Poll the Overpass status endpoint before each query.
    pub overpass_rate_limit: bool,
    /// Overpass settings template with `{timeout}` and `{maxsize}` holes.
    pub overpass_settings: String,
    /// Overpass server-side memory limit in bytes.
    pub memory: Option<u64>,
    /// Access clause inserted into network presets.
    pub default_access: String,
    /// Nominatim base URL.
    pub nominatim_endpoint: String,
    /// Nominatim API key.
    pub nominatim_key: Option<String>,
    /// DNS-over-HTTPS template with a `{hostname}` hole; `None` disables DoH.
    pub doh_url_template: Option<String>,
    /// Proxy and extra headers.
    pub transport: TransportOptions,
    /// Maximum 429/504 retries per request.
    pub max_retries: Option<u32>,
    /// Maximum total 429/504 backoff per request, in seconds.
    pub max_total_backoff: Option<u64>,
    /// Maximum status polls while the Overpass server is busy.
    pub max_busy_polls: Option<u32>,
    /// Pause before each Nominatim request.
    pub nominatim_pause: u64,
    /// Extra pause after a 429/504 response.
    pub error_pause: u64,
    /// Delay between status polls while the Overpass server is busy.
    pub status_recursive_delay: u64,
    /// Pause used when the Overpass status cannot be determined.
    pub status_default_pause: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            use_cache: true,
            cache_folder: Utf8PathBuf::from("./cache"),
            timeout: http::DEFAULT_TIMEOUT_SECS,
            user_agent: http::DEFAULT_USER_AGENT.to_owned(),
            referer: http::DEFAULT_REFERER.to_owned(),
            accept_language: http::DEFAULT_ACCEPT_LANGUAGE.to_owned(),
            overpass_endpoint: DEFAULT_OVERPASS_ENDPOINT.to_owned(),
            overpass_rate_limit: true,
            overpass_settings: DEFAULT_SETTINGS_TEMPLATE.to_owned(),
            memory: None,
            default_access: DEFAULT_ACCESS.to_owned(),
            nominatim_endpoint: DEFAULT_NOMINATIM_ENDPOINT.to_owned(),
            nominatim_key: None,
            doh_url_template: Some(DEFAULT_DOH_URL_TEMPLATE.to_owned()),
            transport: TransportOptions::default(),
            max_retries: None,
            max_total_backoff: None,
            max_busy_polls: None,
            nominatim_pause: crate::client::DEFAULT_NOMINATIM_PAUSE.as_secs(),
            error_pause: crate::client::DEFAULT_ERROR_PAUSE.as_secs(),
            status_recursive_delay: crate::slots::DEFAULT_RECURSIVE_DELAY.as_secs(),
            status_default_pause: crate::slots::DEFAULT_STATUS_PAUSE.as_secs(),
        }
    }
}

impl Settings {
    /// Overpass settings clause built from the template, timeout and memory.
    #[must_use]
    pub fn overpass_query_settings(&self) -> OverpassSettings {
        OverpassSettings::new(self.timeout)
            .with_template(self.overpass_settings.clone())
            .with_memory(self.memory)
    }

    /// HTTP transport configuration.
    #[must_use]
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            timeout: Duration::from_secs(self.timeout),
            user_agent: self.user_agent.clone(),
            referer: self.referer.clone(),
            accept_language: self.accept_language.clone(),
            proxy: self.transport.proxy.clone(),
            extra_headers: self.transport.headers.clone(),
        }
    }

    /// Retry caps for 429/504 responses.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            max_total_backoff: self.max_total_backoff.map(Duration::from_secs),
        }
    }

    /// Slot scheduling policy.
    #[must_use]
    pub const fn slot_policy(&self) -> SlotPolicy {
        SlotPolicy {
            enabled: self.overpass_rate_limit,
            recursive_delay: Duration::from_secs(self.status_recursive_delay),
            default_duration: Duration::from_secs(self.status_default_pause),
            max_busy_polls: self.max_busy_polls,
        }
    }

    /// Response cache, disabled when `use_cache` is off.
    #[must_use]
    pub fn cache(&self) -> CacheStore {
        if self.use_cache {
            CacheStore::new(self.cache_folder.clone())
        } else {
            CacheStore::disabled()
        }
    }
}

/// The three clients sharing one transport, sleeper and cache.
#[derive(Debug, Clone)]
pub struct Session {
    overpass: OverpassClient,
    nominatim: NominatimClient,
    elevation: ElevationClient,
    query_settings: OverpassSettings,
    default_access: String,
}

impl Session {
    /// Connect to the configured services over HTTP, pinning hosts in the
    /// process-wide table.
    ///
    /// # Errors
    ///
    /// Returns [`ClientBuildError`] when the HTTP transport cannot be built.
    pub fn connect(settings: &Settings) -> Result<Self, ClientBuildError> {
        let pins = PinTable::global().clone();
        let transport = Arc::new(HttpTransport::new(&settings.http_config(), pins.clone())?);
        Ok(Self::with_parts(
            settings,
            transport,
            Arc::new(ThreadSleeper),
            Arc::new(SystemResolver),
            pins,
        ))
    }

    /// Assemble a session from explicit capabilities.
    pub fn with_parts(
        settings: &Settings,
        transport: Arc<dyn Transport>,
        sleeper: Arc<dyn Sleeper>,
        resolver: Arc<dyn NameResolver>,
        pins: PinTable,
    ) -> Self {
        let pipeline = RequestPipeline::new(
            Arc::clone(&transport),
            Arc::clone(&sleeper),
            settings.cache(),
            settings.retry_policy(),
        );
        let error_pause = Duration::from_secs(settings.error_pause);
        let doh = settings
            .doh_url_template
            .as_ref()
            .map(|template| DohResolver::new(template.clone(), Arc::clone(&transport)));
        let hosts = HostResolver::new(pins, resolver, doh);
        let slots = SlotScheduler::new(transport, sleeper, settings.slot_policy());

        Self {
            overpass: OverpassClient::new(
                pipeline.clone(),
                settings.overpass_endpoint.clone(),
                hosts,
                slots,
            )
            .with_error_pause(error_pause),
            nominatim: NominatimClient::new(
                pipeline.clone(),
                settings.nominatim_endpoint.clone(),
                settings.nominatim_key.clone(),
            )
            .with_pause(Duration::from_secs(settings.nominatim_pause))
            .with_error_pause(error_pause),
            elevation: ElevationClient::new(pipeline).with_error_pause(error_pause),
            query_settings: settings.overpass_query_settings(),
            default_access: settings.default_access.clone(),
        }
    }

    /// Overpass client.
    #[must_use]
    pub const fn overpass(&self) -> &OverpassClient {
        &self.overpass
    }

    /// Nominatim client.
    #[must_use]
    pub const fn nominatim(&self) -> &NominatimClient {
        &self.nominatim
    }

    /// Elevation client.
    #[must_use]
    pub const fn elevation(&self) -> &ElevationClient {
        &self.elevation
    }

    /// Settings clause prefixed to every Overpass query.
    #[must_use]
    pub const fn query_settings(&self) -> &OverpassSettings {
        &self.query_settings
    }

    /// Access clause inserted into network presets.
    #[must_use]
    pub fn default_access(&self) -> &str {
        &self.default_access
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn defaults_match_the_public_services() {
        let settings = Settings::default();

        assert!(settings.use_cache);
        assert_eq!(settings.timeout, 180);
        assert_eq!(settings.overpass_endpoint, "https://overpass-api.de/api");
        assert_eq!(
            settings.overpass_query_settings().render(),
            "[out:json][timeout:180]"
        );
        assert_eq!(settings.retry_policy(), RetryPolicy::UNBOUNDED);
        assert_eq!(settings.slot_policy(), SlotPolicy::default());
    }

    #[rstest]
    fn partial_configuration_keeps_defaults() {
        let settings: Settings = serde_json::from_str(
            r#"{"timeout": 25, "memory": 1024, "doh_url_template": null, "max_retries": 3}"#,
        )
        .expect("valid settings");

        assert_eq!(
            settings.overpass_query_settings().render(),
            "[out:json][timeout:25][maxsize:1024]"
        );
        assert_eq!(settings.doh_url_template, None);
        assert_eq!(settings.retry_policy().max_retries, Some(3));
        assert_eq!(settings.nominatim_pause, 1);
    }

    #[rstest]
    fn disabling_the_cache_yields_a_disabled_store() {
        let settings = Settings {
            use_cache: false,
            ..Settings::default()
        };
        assert!(!settings.cache().is_enabled());
    }

    #[rstest]
    fn http_config_carries_transport_options() {
        let mut settings = Settings::default();
        settings.transport.proxy = Some("http://proxy.example:3128".to_owned());
        settings
            .transport
            .headers
            .insert("X-Trace".to_owned(), "1".to_owned());

        let config = settings.http_config();

        assert_eq!(config.proxy.as_deref(), Some("http://proxy.example:3128"));
        assert_eq!(config.extra_headers.get("X-Trace").map(String::as_str), Some("1"));
        assert_eq!(config.timeout, Duration::from_secs(180));
    }
}
