//! Blocking HTTP transport backed by reqwest.
//!
//! [`HttpTransport`] implements the synchronous [`Transport`] trait by
//! blocking on asynchronous reqwest calls. It owns a Tokio runtime reused
//! across requests, and resolves hostnames through a [`PinTable`] so pinned
//! hosts always connect to the same address.
//!
//! # Example
//!
//! ```no_run
//! use osmfetch_core::{HttpRequest, PinTable, QueryParams, Transport};
//! use osmfetch_data::{HttpConfig, HttpTransport};
//!
//! let transport = HttpTransport::new(&HttpConfig::default(), PinTable::global().clone())?;
//! let request = HttpRequest::get("https://overpass-api.de/api/status", QueryParams::new());
//! let response = transport.send(&request)?;
//! println!("{}", response.text());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::{collections::BTreeMap, io, net::SocketAddr, sync::Arc, time::Duration};

use log::debug;
use osmfetch_core::{
    HttpMethod, HttpRequest, NameResolver, PinTable, PinnedResolver, RawResponse, SystemResolver,
    Transport, TransportError,
};
use reqwest::{
    Client,
    dns::{Addrs, Name, Resolve, Resolving},
    header::{ACCEPT_LANGUAGE, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, REFERER},
};
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};

use crate::ClientBuildError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Default user agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("osmfetch/", env!("CARGO_PKG_VERSION"));

/// Default referer sent with every request.
pub const DEFAULT_REFERER: &str = concat!("osmfetch/", env!("CARGO_PKG_VERSION"));

/// Default `Accept-Language` header.
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 180;

/// Configuration for [`HttpTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    /// Connect and total request timeout.
    pub timeout: Duration,
    /// `User-Agent` header.
    pub user_agent: String,
    /// `Referer` header.
    pub referer: String,
    /// `Accept-Language` header.
    pub accept_language: String,
    /// Proxy URL applied to every scheme.
    pub proxy: Option<String>,
    /// Additional headers sent with every request.
    pub extra_headers: BTreeMap<String, String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            referer: DEFAULT_REFERER.to_owned(),
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_owned(),
            proxy: None,
            extra_headers: BTreeMap::new(),
        }
    }
}

impl HttpConfig {
    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Add a header sent with every request.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }

    fn default_headers(&self) -> Result<HeaderMap, ClientBuildError> {
        let mut headers = HeaderMap::new();
        headers.insert(REFERER, header_value("Referer", &self.referer)?);
        headers.insert(
            ACCEPT_LANGUAGE,
            header_value("Accept-Language", &self.accept_language)?,
        );
        for (name, value) in &self.extra_headers {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ClientBuildError::InvalidHeader { name: name.clone() })?;
            headers.insert(header, header_value(name, value)?);
        }
        Ok(headers)
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, ClientBuildError> {
    HeaderValue::from_str(value).map_err(|_| ClientBuildError::InvalidHeader {
        name: name.to_owned(),
    })
}

/// reqwest adapter over a [`PinnedResolver`].
///
/// Pinned hosts are answered from the [`PinTable`]; everything else goes
/// through the inner resolver, which defaults to the system one. Lookups run
/// on Tokio's blocking pool.
#[derive(Debug, Clone)]
pub struct PinnedDns<R = SystemResolver> {
    resolver: Arc<PinnedResolver<R>>,
}

impl PinnedDns {
    /// Resolver consulting `table`, then the system resolver.
    #[must_use]
    pub fn new(table: PinTable) -> Self {
        Self::with_resolver(table, SystemResolver)
    }
}

impl<R: NameResolver> PinnedDns<R> {
    /// Resolver consulting `table`, then `inner`.
    #[must_use]
    pub fn with_resolver(table: PinTable, inner: R) -> Self {
        Self {
            resolver: Arc::new(PinnedResolver::new(table, inner)),
        }
    }
}

impl<R: NameResolver + 'static> Resolve for PinnedDns<R> {
    fn resolve(&self, name: Name) -> Resolving {
        let host = name.as_str().to_owned();
        let resolver = Arc::clone(&self.resolver);
        Box::pin(async move {
            let ips = tokio::task::spawn_blocking(move || {
                let ips = resolver.resolve(&host);
                if let Ok(found) = &ips {
                    debug!("Resolved {host} to {found:?}");
                }
                ips
            })
            .await
            .map_err(|err| -> BoxError { Box::new(err) })?
            .map_err(|err| -> BoxError { Box::new(err) })?;
            let addrs: Addrs = Box::new(ips.into_iter().map(|ip| SocketAddr::new(ip, 0)));
            Ok::<Addrs, BoxError>(addrs)
        })
    }
}

/// [`Transport`] sending real HTTP requests.
///
/// When called from within a multi-threaded Tokio runtime the caller's
/// runtime is used through [`tokio::task::block_in_place`]; otherwise the
/// transport's own current-thread runtime drives the request.
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
    runtime: Runtime,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("client", &self.client)
            .field("timeout", &self.timeout)
            .field("runtime", &"<tokio::runtime::Runtime>")
            .finish()
    }
}

impl HttpTransport {
    /// Build a transport resolving hostnames through `pins`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientBuildError`] when a header or proxy is invalid, or
    /// when the HTTP client or Tokio runtime cannot be built.
    pub fn new(config: &HttpConfig, pins: PinTable) -> Result<Self, ClientBuildError> {
        let mut builder = Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(config.default_headers()?)
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .dns_resolver(Arc::new(PinnedDns::new(pins)));
        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy).map_err(ClientBuildError::HttpClient)?);
        }
        let client = builder.build().map_err(ClientBuildError::HttpClient)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ClientBuildError::Runtime)?;
        Ok(Self {
            client,
            timeout: config.timeout,
            runtime,
        })
    }

    async fn send_async(&self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        let prepared = request.prepared_url();
        let builder = match request.method {
            HttpMethod::Get => self.client.get(&prepared),
            HttpMethod::Post => self
                .client
                .post(&request.url)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(request.params.to_query_string()),
        };

        let response = builder
            .send()
            .await
            .map_err(|err| self.convert_reqwest_error(err, &prepared))?;
        let status = response.status();
        let url = response.url().to_string();
        let body = response
            .bytes()
            .await
            .map_err(|err| self.convert_reqwest_error(err, &prepared))?;

        Ok(RawResponse {
            url,
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_owned(),
            body: body.to_vec(),
        })
    }

    fn convert_reqwest_error(&self, error: reqwest::Error, url: &str) -> TransportError {
        if error.is_timeout() {
            return TransportError::Timeout {
                url: url.to_owned(),
                timeout_secs: self.timeout.as_secs(),
            };
        }
        TransportError::Network {
            url: url.to_owned(),
            source: io::Error::other(error),
        }
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        let future = self.send_async(request);
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(future))
            }
            _ => self.runtime.block_on(future),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osmfetch_core::{Pin, QueryParams, test_support::CountingResolver};
    use rstest::rstest;
    use std::net::{IpAddr, Ipv4Addr};

    #[rstest]
    fn default_headers_include_extras() {
        let config = HttpConfig::default().with_header("X-Api-Client", "tests");

        let headers = config.default_headers().expect("valid headers");

        assert_eq!(headers.get(ACCEPT_LANGUAGE).map(HeaderValue::as_bytes), Some(&b"en"[..]));
        assert_eq!(
            headers.get("x-api-client").map(HeaderValue::as_bytes),
            Some(&b"tests"[..])
        );
    }

    #[rstest]
    #[case("Bad Header", "value")]
    #[case("X-Ok", "line\nbreak")]
    fn invalid_headers_are_rejected(#[case] name: &str, #[case] value: &str) {
        let config = HttpConfig::default().with_header(name, value);
        assert!(matches!(
            config.default_headers(),
            Err(ClientBuildError::InvalidHeader { .. })
        ));
    }

    #[rstest]
    fn pinned_names_resolve_to_the_pin() {
        let table = PinTable::new();
        let ip = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 9));
        table.pin("pinned.invalid", Pin::Address(ip));
        let dns = PinnedDns::new(table);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");

        let name: Name = "pinned.invalid".parse().expect("valid name");
        let addrs: Vec<SocketAddr> = runtime
            .block_on(dns.resolve(name))
            .expect("pinned lookup")
            .collect();

        assert_eq!(addrs, vec![SocketAddr::new(ip, 0)]);
    }

    #[rstest]
    fn unpinned_names_go_through_the_inner_resolver() {
        let table = PinTable::new();
        let pinned = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 9));
        let upstream_ip = IpAddr::V4(Ipv4Addr::new(10, 2, 2, 2));
        table.pin("pinned.invalid", Pin::Address(pinned));
        table.pin("failed.invalid", Pin::Unresolved);
        let upstream = CountingResolver::new()
            .with_answer("free.invalid", [upstream_ip])
            .with_answer("failed.invalid", [upstream_ip]);
        let dns = PinnedDns::with_resolver(table, upstream.clone());
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");

        for (host, expected) in [
            ("pinned.invalid", pinned),
            ("free.invalid", upstream_ip),
            ("failed.invalid", upstream_ip),
        ] {
            let name: Name = host.parse().expect("valid name");
            let addrs: Vec<SocketAddr> = runtime
                .block_on(dns.resolve(name))
                .expect("lookup")
                .collect();
            assert_eq!(addrs, vec![SocketAddr::new(expected, 0)], "{host}");
        }
        assert_eq!(upstream.calls("pinned.invalid"), 0);
        assert_eq!(upstream.calls("free.invalid"), 1);
        assert_eq!(upstream.calls("failed.invalid"), 1);
    }

    #[rstest]
    fn unreachable_hosts_are_network_errors() {
        let config = HttpConfig::default().with_timeout(Duration::from_secs(2));
        let transport = HttpTransport::new(&config, PinTable::new()).expect("transport");
        let request = HttpRequest::get("http://127.0.0.1:9/status", QueryParams::new());

        let err = transport.send(&request).expect_err("port 9 is closed");

        assert!(matches!(
            err,
            TransportError::Network { .. } | TransportError::Timeout { .. }
        ));
    }
}
