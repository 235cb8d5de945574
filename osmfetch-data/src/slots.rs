//! Overpass slot scheduling.
//!
//! Before each query the scheduler polls `<endpoint>/status` and turns the
//! reported slot state into a pause. Failures never abort a download: an
//! unreachable or unintelligible status endpoint yields the default pause.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use osmfetch_core::{
    HttpRequest, QueryParams, Sleeper, SlotStatus, StatusParseError, Transport, join_endpoint,
};

/// Default delay before re-polling a busy server.
pub const DEFAULT_RECURSIVE_DELAY: Duration = Duration::from_secs(5);

/// Default pause when the status cannot be determined.
pub const DEFAULT_STATUS_PAUSE: Duration = Duration::from_secs(60);

/// Tunables for [`SlotScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotPolicy {
    /// Poll the status endpoint at all; when `false` every pause is zero.
    pub enabled: bool,
    /// Delay between polls while one of our queries is still running.
    pub recursive_delay: Duration,
    /// Pause used when the status is unreachable or unrecognised.
    pub default_duration: Duration,
    /// Give up re-polling a busy server after this many polls.
    pub max_busy_polls: Option<u32>,
}

impl Default for SlotPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            recursive_delay: DEFAULT_RECURSIVE_DELAY,
            default_duration: DEFAULT_STATUS_PAUSE,
            max_busy_polls: None,
        }
    }
}

/// Computes the pause required before the next Overpass query.
#[derive(Clone)]
pub struct SlotScheduler {
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    policy: SlotPolicy,
    clock: fn() -> DateTime<Utc>,
}

impl std::fmt::Debug for SlotScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotScheduler")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl SlotScheduler {
    /// Scheduler polling through `transport` and waiting with `sleeper`.
    pub fn new(transport: Arc<dyn Transport>, sleeper: Arc<dyn Sleeper>, policy: SlotPolicy) -> Self {
        Self {
            transport,
            sleeper,
            policy,
            clock: Utc::now,
        }
    }

    /// Replace the clock used to measure time until a slot frees.
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// Configured policy.
    #[must_use]
    pub const fn policy(&self) -> &SlotPolicy {
        &self.policy
    }

    /// Pause before querying `base_endpoint`, using the configured delays.
    pub fn pause(&self, base_endpoint: &str) -> Duration {
        self.pause_for(
            base_endpoint,
            self.policy.recursive_delay,
            self.policy.default_duration,
        )
    }

    /// Pause before querying `base_endpoint`.
    ///
    /// While the server reports one of our queries as running, sleeps
    /// `recursive_delay` and polls again, up to the configured poll cap.
    /// Returns `default_duration` when the status is unavailable.
    pub fn pause_for(
        &self,
        base_endpoint: &str,
        recursive_delay: Duration,
        default_duration: Duration,
    ) -> Duration {
        if !self.policy.enabled {
            return Duration::ZERO;
        }

        let url = join_endpoint(base_endpoint, "status");
        let request = HttpRequest::get(url.as_str(), QueryParams::new());
        let mut busy_polls: u32 = 0;
        loop {
            let response = match self.transport.send(&request) {
                Ok(response) => response,
                Err(err) => {
                    error!("Unable to query {url}: {err}");
                    return default_duration;
                }
            };

            let status = match SlotStatus::parse(&response.text()) {
                Ok(status) => status,
                Err(StatusParseError::Unrecognized { line }) => {
                    error!("Unrecognized server status: {line:?}");
                    return default_duration;
                }
                Err(err) => {
                    error!(
                        "Unable to parse {url} response (status {}): {err}",
                        response.status
                    );
                    return default_duration;
                }
            };

            if let Some(pause) = status.pause_at((self.clock)()) {
                return pause;
            }

            busy_polls = busy_polls.saturating_add(1);
            if self
                .policy
                .max_busy_polls
                .is_some_and(|limit| busy_polls > limit)
            {
                warn!("{url} still busy after {limit} polls, using default pause", limit = busy_polls - 1);
                return default_duration;
            }
            info!(
                "{url} reports a running query, checking again in {}s",
                recursive_delay.as_secs()
            );
            self.sleeper.sleep(recursive_delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use osmfetch_core::test_support::{RecordingSleeper, StubTransport};
    use rstest::rstest;

    const ENDPOINT: &str = "https://overpass.example/api";
    const STATUS: &str = "https://overpass.example/api/status";

    fn report(line: &str) -> String {
        format!(
            "Connected as: 1\nCurrent time: 2024-01-01T12:00:00Z\nAnnounced endpoint: none\n\
             Rate limit: 2\n{line}\n"
        )
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0)
            .single()
            .unwrap_or_default()
    }

    fn scheduler(stub: &StubTransport, sleeper: &RecordingSleeper, policy: SlotPolicy) -> SlotScheduler {
        SlotScheduler::new(Arc::new(stub.clone()), Arc::new(sleeper.clone()), policy).with_clock(noon)
    }

    #[rstest]
    fn disabled_rate_limiting_skips_the_network() {
        let stub = StubTransport::new();
        let sleeper = RecordingSleeper::new();
        let policy = SlotPolicy {
            enabled: false,
            ..SlotPolicy::default()
        };

        assert_eq!(scheduler(&stub, &sleeper, policy).pause(ENDPOINT), Duration::ZERO);
        assert_eq!(stub.request_count(), 0);
    }

    #[rstest]
    #[case("3 slots available now.", 0)]
    #[case("Slot available after: 2024-01-01T12:00:42Z, in 42 seconds.", 42)]
    #[case("Slot available after: 2023-12-31T23:00:00Z, in 0 seconds.", 1)]
    #[case("Nonsense", 60)]
    fn status_lines_map_to_pauses(#[case] line: &str, #[case] expected: u64) {
        let stub = StubTransport::new().respond(STATUS, 200, report(line));
        let sleeper = RecordingSleeper::new();

        let pause = scheduler(&stub, &sleeper, SlotPolicy::default()).pause(ENDPOINT);

        assert_eq!(pause, Duration::from_secs(expected));
        assert_eq!(stub.requests_to(STATUS), 1);
        assert!(sleeper.pauses().is_empty());
    }

    #[rstest]
    fn busy_server_is_polled_again_after_the_delay() {
        let stub = StubTransport::new()
            .respond(STATUS, 200, report("Currently running queries (pid, space limit, time limit, start time):"))
            .respond(STATUS, 200, report("Currently running queries (pid, space limit, time limit, start time):"))
            .respond(STATUS, 200, report("1 slots available now."));
        let sleeper = RecordingSleeper::new();

        let pause = scheduler(&stub, &sleeper, SlotPolicy::default()).pause(ENDPOINT);

        assert_eq!(pause, Duration::ZERO);
        assert_eq!(stub.requests_to(STATUS), 3);
        assert_eq!(sleeper.pause_secs(), vec![5, 5]);
    }

    #[rstest]
    fn busy_polls_respect_the_cap() {
        let stub = StubTransport::new().respond(
            STATUS,
            200,
            report("Currently running queries (pid, space limit, time limit, start time):"),
        );
        let sleeper = RecordingSleeper::new();
        let policy = SlotPolicy {
            max_busy_polls: Some(2),
            ..SlotPolicy::default()
        };

        let pause = scheduler(&stub, &sleeper, policy).pause(ENDPOINT);

        assert_eq!(pause, DEFAULT_STATUS_PAUSE);
        assert_eq!(stub.requests_to(STATUS), 3);
        assert_eq!(sleeper.pause_secs(), vec![5, 5]);
    }

    #[rstest]
    fn unreachable_status_uses_the_default() {
        let stub = StubTransport::new().refuse(STATUS);
        let sleeper = RecordingSleeper::new();

        let pause = scheduler(&stub, &sleeper, SlotPolicy::default()).pause_for(
            ENDPOINT,
            Duration::from_secs(1),
            Duration::from_secs(7),
        );

        assert_eq!(pause, Duration::from_secs(7));
    }

    #[rstest]
    fn truncated_status_uses_the_default() {
        let stub = StubTransport::new().respond(STATUS, 502, "<html>Bad Gateway</html>");
        let sleeper = RecordingSleeper::new();

        assert_eq!(
            scheduler(&stub, &sleeper, SlotPolicy::default()).pause(ENDPOINT),
            DEFAULT_STATUS_PAUSE
        );
    }
}
