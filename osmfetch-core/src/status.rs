//! Parsing of the Overpass `/status` report.
//!
//! The report is plain text. Its fifth line describes slot availability and
//! takes one of three forms:
//!
//! ```text
//! 2 slots available now.
//! Slot available after: 2024-01-01T12:00:05Z, in 3 seconds.
//! Currently running queries (pid, space limit, time limit, start time):
//! ```

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

/// Zero-based index of the line carrying slot information.
pub const STATUS_LINE_INDEX: usize = 4;

const SLOT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ,";

/// Slot availability reported by an Overpass server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    /// This many slots are free right now.
    Available(i64),
    /// The next slot frees at this instant.
    AvailableAt(DateTime<Utc>),
    /// The server is running one of our queries; ask again later.
    Busy,
}

/// Reasons a status report could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusParseError {
    /// The report had fewer lines than expected.
    #[error("status report has no line {}", STATUS_LINE_INDEX + 1)]
    MissingLine,
    /// A `Slot` line carried no timestamp token.
    #[error("slot line {line:?} carries no timestamp")]
    MissingTimestamp {
        /// The offending status line.
        line: String,
    },
    /// A `Slot` line carried an unparseable timestamp.
    #[error("slot line {line:?} has an invalid timestamp: {source}")]
    InvalidTimestamp {
        /// The offending status line.
        line: String,
        /// Underlying parse failure.
        source: chrono::ParseError,
    },
    /// The first token of the status line was not recognised.
    #[error("unrecognized server status: {line:?}")]
    Unrecognized {
        /// The offending status line.
        line: String,
    },
}

impl SlotStatus {
    /// Interpret a full status report.
    ///
    /// # Errors
    ///
    /// Returns [`StatusParseError`] when the slot line is missing or does not
    /// match any known form.
    ///
    /// # Examples
    ///
    /// ```
    /// use osmfetch_core::SlotStatus;
    ///
    /// let report = "Connected as: 1\nCurrent time: x\nAnnounced endpoint: none\n\
    ///               Rate limit: 2\n2 slots available now.\n";
    /// assert_eq!(SlotStatus::parse(report)?, SlotStatus::Available(2));
    /// # Ok::<(), osmfetch_core::StatusParseError>(())
    /// ```
    pub fn parse(report: &str) -> Result<Self, StatusParseError> {
        let line = report
            .split('\n')
            .nth(STATUS_LINE_INDEX)
            .ok_or(StatusParseError::MissingLine)?
            .trim_end_matches('\r');
        Self::parse_line(line)
    }

    /// Interpret the slot line on its own.
    ///
    /// # Errors
    ///
    /// See [`SlotStatus::parse`].
    pub fn parse_line(line: &str) -> Result<Self, StatusParseError> {
        let mut tokens = line.split(' ');
        let first = tokens.next().unwrap_or_default();

        if let Ok(slots) = first.parse::<i64>() {
            return Ok(Self::Available(slots));
        }

        match first {
            "Slot" => {
                let stamp = tokens
                    .nth(2)
                    .ok_or_else(|| StatusParseError::MissingTimestamp {
                        line: line.to_owned(),
                    })?;
                let naive =
                    NaiveDateTime::parse_from_str(stamp, SLOT_TIMESTAMP_FORMAT).map_err(
                        |source| StatusParseError::InvalidTimestamp {
                            line: line.to_owned(),
                            source,
                        },
                    )?;
                Ok(Self::AvailableAt(naive.and_utc()))
            }
            "Currently" => Ok(Self::Busy),
            _ => Err(StatusParseError::Unrecognized {
                line: line.to_owned(),
            }),
        }
    }

    /// Pause required before the next query, measured from `now`.
    ///
    /// Returns `None` for [`SlotStatus::Busy`], which has no fixed answer.
    /// A pending slot always yields at least one second, rounded up.
    #[must_use]
    pub fn pause_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self {
            Self::Available(_) => Some(Duration::ZERO),
            Self::AvailableAt(at) => {
                let millis = at.signed_duration_since(now).num_milliseconds();
                let whole = millis.div_euclid(1000);
                let seconds = if millis.rem_euclid(1000) > 0 {
                    whole + 1
                } else {
                    whole
                };
                Some(Duration::from_secs(u64::try_from(seconds.max(1)).unwrap_or(1)))
            }
            Self::Busy => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn report_with(line: &str) -> String {
        format!(
            "Connected as: 3232235777\nCurrent time: 2024-01-01T12:00:00Z\n\
             Announced endpoint: none\nRate limit: 2\n{line}\n\
             Currently running queries (pid, space limit, time limit, start time):\n"
        )
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    #[rstest]
    fn available_slots_mean_no_pause() {
        let status = SlotStatus::parse(&report_with("5 slots available now.")).expect("parse");

        assert_eq!(status, SlotStatus::Available(5));
        assert_eq!(status.pause_at(noon()), Some(Duration::ZERO));
    }

    #[rstest]
    fn pending_slot_rounds_up_to_whole_seconds() {
        let status = SlotStatus::parse(&report_with(
            "Slot available after: 2024-01-01T12:00:42Z, in 42 seconds.",
        ))
        .expect("parse");

        let almost_noon = noon() - chrono::Duration::milliseconds(300);
        assert_eq!(status.pause_at(noon()), Some(Duration::from_secs(42)));
        assert_eq!(status.pause_at(almost_noon), Some(Duration::from_secs(43)));
    }

    #[rstest]
    #[case("2024-01-01T11:59:00Z,")]
    #[case("2024-01-01T12:00:00Z,")]
    fn elapsed_slot_still_waits_one_second(#[case] stamp: &str) {
        let status = SlotStatus::parse_line(&format!("Slot available after: {stamp} in 0 seconds."))
            .expect("parse");

        assert_eq!(status.pause_at(noon()), Some(Duration::from_secs(1)));
    }

    #[rstest]
    fn running_query_is_busy() {
        let status = SlotStatus::parse(&report_with(
            "Currently running queries (pid, space limit, time limit, start time):",
        ))
        .expect("parse");

        assert_eq!(status, SlotStatus::Busy);
        assert_eq!(status.pause_at(noon()), None);
    }

    #[rstest]
    fn short_report_is_missing_line() {
        assert_eq!(
            SlotStatus::parse("Connected as: 1\nCurrent time: x\n"),
            Err(StatusParseError::MissingLine)
        );
    }

    #[rstest]
    #[case("Slot available after:")]
    #[case("Slot available after: tomorrow, in 3 seconds.")]
    #[case("Overloaded, come back later")]
    #[case("")]
    fn malformed_lines_are_rejected(#[case] line: &str) {
        assert!(SlotStatus::parse_line(line).is_err());
    }

    #[rstest]
    fn crlf_line_endings_are_tolerated() {
        let report = report_with("2 slots available now.").replace('\n', "\r\n");
        assert_eq!(SlotStatus::parse(&report), Ok(SlotStatus::Available(2)));
    }
}
