//! Test doubles for the transport, sleeper and resolver capabilities.
//!
//! All doubles are cheap to clone and clones share state, so a test can keep
//! one handle for assertions while the pipeline owns another.

use std::{
    collections::{HashMap, VecDeque},
    io,
    net::IpAddr,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use crate::{HttpRequest, NameResolver, RawResponse, Sleeper, Transport, TransportError};

#[derive(Debug, Clone)]
enum Reply {
    Response { status: u16, body: String },
    Refused,
    Timeout,
}

#[derive(Debug, Default)]
struct Script {
    routes: Vec<(String, VecDeque<Reply>)>,
    requests: Vec<HttpRequest>,
}

/// Scripted [`Transport`] keyed by URL prefix.
///
/// Replies queued for a prefix are consumed in order; the last one repeats
/// once the queue is down to a single entry. The longest matching prefix
/// wins. Requests without a matching prefix fail with a connection error.
///
/// # Examples
///
/// ```
/// use osmfetch_core::{HttpRequest, QueryParams, Transport, test_support::StubTransport};
///
/// let stub = StubTransport::new()
///     .respond("https://svc.example/", 429, "")
///     .respond("https://svc.example/", 200, "{}");
/// let request = HttpRequest::get("https://svc.example/search", QueryParams::new());
///
/// assert_eq!(stub.send(&request).map(|r| r.status).ok(), Some(429));
/// assert_eq!(stub.send(&request).map(|r| r.status).ok(), Some(200));
/// assert_eq!(stub.send(&request).map(|r| r.status).ok(), Some(200));
/// assert_eq!(stub.request_count(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StubTransport {
    script: Arc<Mutex<Script>>,
}

impl StubTransport {
    /// Create a transport with no scripted replies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for URLs starting with `prefix`.
    #[must_use]
    pub fn respond(self, prefix: &str, status: u16, body: impl Into<String>) -> Self {
        self.push(
            prefix,
            Reply::Response {
                status,
                body: body.into(),
            },
        );
        self
    }

    /// Queue a refused connection for URLs starting with `prefix`.
    #[must_use]
    pub fn refuse(self, prefix: &str) -> Self {
        self.push(prefix, Reply::Refused);
        self
    }

    /// Queue a timeout for URLs starting with `prefix`.
    #[must_use]
    pub fn time_out(self, prefix: &str) -> Self {
        self.push(prefix, Reply::Timeout);
        self
    }

    /// Every request sent so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.lock().requests.clone()
    }

    /// Number of requests sent so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    /// Number of requests whose URL starts with `prefix`.
    #[must_use]
    pub fn requests_to(&self, prefix: &str) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|request| request.url.starts_with(prefix))
            .count()
    }

    fn push(&self, prefix: &str, reply: Reply) {
        let mut script = self.lock();
        if let Some((_, queue)) = script
            .routes
            .iter_mut()
            .find(|(existing, _)| existing == prefix)
        {
            queue.push_back(reply);
        } else {
            script
                .routes
                .push((prefix.to_owned(), VecDeque::from([reply])));
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for StubTransport {
    fn send(&self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        let mut script = self.lock();
        script.requests.push(request.clone());

        let reply = script
            .routes
            .iter_mut()
            .filter(|(prefix, _)| request.url.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .and_then(|(_, queue)| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            });

        match reply {
            Some(Reply::Response { status, body }) => Ok(RawResponse {
                url: request.url.clone(),
                status,
                reason: reason_phrase(status).to_owned(),
                body: body.into_bytes(),
            }),
            Some(Reply::Timeout) => Err(TransportError::Timeout {
                url: request.prepared_url(),
                timeout_secs: 0,
            }),
            Some(Reply::Refused) | None => Err(TransportError::Network {
                url: request.prepared_url(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "no scripted reply"),
            }),
        }
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        504 => "Gateway Timeout",
        _ => "",
    }
}

/// [`Sleeper`] that records pauses instead of blocking.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    pauses: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    /// Create a sleeper with no recorded pauses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every requested pause, in order.
    #[must_use]
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Requested pauses as whole seconds.
    #[must_use]
    pub fn pause_secs(&self) -> Vec<u64> {
        self.pauses().iter().map(Duration::as_secs).collect()
    }

    /// Sum of all requested pauses.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.pauses().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.pauses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
    }
}

/// [`NameResolver`] with fixed answers that counts lookups per host.
#[derive(Debug, Clone, Default)]
pub struct CountingResolver {
    answers: HashMap<String, Vec<IpAddr>>,
    calls: Arc<Mutex<HashMap<String, usize>>>,
}

impl CountingResolver {
    /// Create a resolver that knows no hosts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `host` with `addresses`.
    #[must_use]
    pub fn with_answer(
        mut self,
        host: &str,
        addresses: impl IntoIterator<Item = IpAddr>,
    ) -> Self {
        self.answers
            .insert(host.to_owned(), addresses.into_iter().collect());
        self
    }

    /// Number of lookups made for `host`.
    #[must_use]
    pub fn calls(&self, host: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(host)
            .copied()
            .unwrap_or(0)
    }

    /// Number of lookups made for any host.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }
}

impl NameResolver for CountingResolver {
    fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(host.to_owned())
            .or_insert(0) += 1;
        self.answers
            .get(host)
            .filter(|addresses| !addresses.is_empty())
            .cloned()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("unknown host {host}"))
            })
    }
}
