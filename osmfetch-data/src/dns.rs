//! DNS pinning with a DNS-over-HTTPS fallback.
//!
//! Pinning resolves a service's hostname once and records the answer in a
//! [`PinTable`]. The HTTP transport consults that table, so the slot-status
//! poll and the query that follows reach the same backend even when the
//! service rotates addresses between lookups.

use std::{net::IpAddr, sync::Arc};

use log::{error, info, warn};
use osmfetch_core::{
    HttpRequest, NameResolver, Pin, PinTable, QueryParams, Transport, hostname_from_url,
};
use serde::Deserialize;

/// Default DNS-over-HTTPS JSON endpoint template.
pub const DEFAULT_DOH_URL_TEMPLATE: &str = "https://8.8.8.8/resolve?name={hostname}";

#[derive(Debug, Deserialize)]
struct DohAnswer {
    data: String,
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: i64,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

/// Resolves hostnames through a JSON DNS-over-HTTPS endpoint.
///
/// `{hostname}` in the template is replaced by the name to resolve.
#[derive(Clone)]
pub struct DohResolver {
    template: String,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for DohResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DohResolver")
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}

impl DohResolver {
    /// Resolver querying `template` through `transport`.
    pub fn new(template: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            template: template.into(),
            transport,
        }
    }

    /// Resolve `hostname`, returning `None` on any failure.
    ///
    /// A response counts only when the HTTP status is successful, `Status` is
    /// `0`, and an answer carries an IP address. CNAME records preceding the
    /// address are skipped.
    pub fn resolve(&self, hostname: &str) -> Option<IpAddr> {
        let url = self.template.replace("{hostname}", hostname);
        let response = match self
            .transport
            .send(&HttpRequest::get(url.as_str(), QueryParams::new()))
        {
            Ok(response) => response,
            Err(err) => {
                error!("Failed to resolve {hostname:?} via DoH: {err}");
                return None;
            }
        };
        let parsed = serde_json::from_slice::<DohResponse>(&response.body).ok();
        let ip = parsed
            .filter(|doh| response.is_ok() && doh.status == 0)
            .and_then(|doh| {
                doh.answer
                    .iter()
                    .find_map(|answer| answer.data.parse::<IpAddr>().ok())
            });
        if ip.is_none() {
            error!(
                "Failed to resolve {hostname:?} via DoH: {} returned status {}",
                url, response.status
            );
        }
        ip
    }
}

/// Pins hostnames for the rest of the process.
///
/// Resolution tries the system resolver first, then DNS-over-HTTPS when
/// configured. If both fail the host is pinned as [`Pin::Unresolved`] and
/// requests fall back to ordinary lookups.
#[derive(Clone)]
pub struct HostResolver {
    table: PinTable,
    system: Arc<dyn NameResolver>,
    doh: Option<DohResolver>,
}

impl std::fmt::Debug for HostResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostResolver")
            .field("table", &self.table)
            .field("doh", &self.doh)
            .finish_non_exhaustive()
    }
}

impl HostResolver {
    /// Resolver recording pins in `table`.
    pub fn new(table: PinTable, system: Arc<dyn NameResolver>, doh: Option<DohResolver>) -> Self {
        Self { table, system, doh }
    }

    /// Table receiving the pins.
    #[must_use]
    pub const fn table(&self) -> &PinTable {
        &self.table
    }

    /// Pin the host of `url`, returning the pin in force.
    ///
    /// A host already in the table is returned as-is without any lookup.
    pub fn pin(&self, url: &str) -> Pin {
        let hostname = hostname_from_url(url);
        if let Some(existing) = self.table.get(&hostname) {
            return existing;
        }
        if let Ok(ip) = hostname.trim_matches(['[', ']']).parse::<IpAddr>() {
            return self.table.pin(&hostname, Pin::Address(ip));
        }

        let pin = match self.system.resolve(&hostname) {
            Ok(addresses) => addresses.first().copied().map_or(Pin::Unresolved, Pin::Address),
            Err(err) => {
                error!("Failed to resolve {hostname:?} ({err}), trying again via DoH");
                self.resolve_via_doh(&hostname)
            }
        };
        match pin {
            Pin::Address(ip) => info!("Pinned {hostname:?} to {ip}"),
            Pin::Unresolved => warn!("Requesting {hostname:?} by name; backend may vary"),
        }
        self.table.pin(&hostname, pin)
    }

    fn resolve_via_doh(&self, hostname: &str) -> Pin {
        let Some(doh) = &self.doh else {
            warn!("DoH fallback is disabled, requesting {hostname:?} by name");
            return Pin::Unresolved;
        };
        doh.resolve(hostname).map_or(Pin::Unresolved, Pin::Address)
    }
}
