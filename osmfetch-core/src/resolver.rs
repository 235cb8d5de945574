//! Name resolution and the process-wide pin table.
//!
//! A pin fixes the address of a hostname for the rest of the process so that
//! every request for that host lands on the same backend. Pins are never
//! removed. [`PinnedResolver`] decorates any [`NameResolver`] with the table,
//! and the HTTP transport consults the same table when connecting.

use std::{
    collections::HashMap,
    io,
    net::{IpAddr, ToSocketAddrs},
    sync::{Arc, OnceLock, PoisonError, RwLock},
};

/// Resolves a hostname to candidate addresses.
pub trait NameResolver: Send + Sync {
    /// Return every address known for `host`, in preference order.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the host cannot be resolved.
    fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

impl<R: NameResolver + ?Sized> NameResolver for Arc<R> {
    fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        (**self).resolve(host)
    }
}

/// [`NameResolver`] backed by the operating system's resolver.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl NameResolver for SystemResolver {
    fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addresses: Vec<IpAddr> = (host, 0)
            .to_socket_addrs()?
            .map(|addr| addr.ip())
            .collect();
        if addresses.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses found for {host}"),
            ));
        }
        Ok(addresses)
    }
}

/// Outcome of pinning a hostname.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pin {
    /// The host always resolves to this address.
    Address(IpAddr),
    /// Resolution failed; the host is used as-is and normal lookup applies.
    Unresolved,
}

impl Pin {
    /// The pinned address, if resolution succeeded.
    #[must_use]
    pub const fn address(self) -> Option<IpAddr> {
        match self {
            Self::Address(ip) => Some(ip),
            Self::Unresolved => None,
        }
    }
}

/// Shared mapping from hostname to [`Pin`].
///
/// Clones share the same underlying table. [`PinTable::global`] is the
/// process-wide instance used unless a caller injects its own.
#[derive(Debug, Clone, Default)]
pub struct PinTable {
    pins: Arc<RwLock<HashMap<String, Pin>>>,
}

impl PinTable {
    /// Create an empty, private table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide table.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<PinTable> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }

    /// Current pin for `host`, if any.
    #[must_use]
    pub fn get(&self, host: &str) -> Option<Pin> {
        self.pins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&host.to_ascii_lowercase())
            .copied()
    }

    /// Whether `host` has been pinned.
    #[must_use]
    pub fn contains(&self, host: &str) -> bool {
        self.get(host).is_some()
    }

    /// Record `pin` for `host` unless one already exists.
    ///
    /// Returns the pin in force afterwards, which is the earlier one when the
    /// host was already pinned.
    pub fn pin(&self, host: &str, pin: Pin) -> Pin {
        *self
            .pins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(host.to_ascii_lowercase())
            .or_insert(pin)
    }

    /// Number of pinned hosts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pins.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no host has been pinned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// [`NameResolver`] that answers pinned hosts from a [`PinTable`].
///
/// Hosts without an address pin are delegated to the inner resolver.
#[derive(Debug, Clone)]
pub struct PinnedResolver<R> {
    table: PinTable,
    inner: R,
}

impl<R: NameResolver> PinnedResolver<R> {
    /// Decorate `inner` with `table`.
    pub const fn new(table: PinTable, inner: R) -> Self {
        Self { table, inner }
    }

    /// The table consulted before delegating.
    pub const fn table(&self) -> &PinTable {
        &self.table
    }
}

impl<R: NameResolver> NameResolver for PinnedResolver<R> {
    fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        match self.table.get(host).and_then(Pin::address) {
            Some(ip) => Ok(vec![ip]),
            None => self.inner.resolve(host),
        }
    }
}
