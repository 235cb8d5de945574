//! Test helpers wiring CLI commands to scripted services.

use super::*;
use osmfetch_core::PinTable;
use osmfetch_core::test_support::{CountingResolver, RecordingSleeper, StubTransport};
use osmfetch_data::{Session, Settings};
use std::{cell::RefCell, net::IpAddr, sync::Arc};

pub(super) const OVERPASS: &str = "https://overpass.example/api";
pub(super) const STATUS: &str = "https://overpass.example/api/status";
pub(super) const INTERPRETER: &str = "https://overpass.example/api/interpreter";
pub(super) const NOMINATIM: &str = "https://nominatim.example/";
pub(super) const POLYGON_A: &str = "37.80 -122.25 37.80 -122.24 37.81 -122.24 37.80 -122.25";
pub(super) const POLYGON_B: &str = "37.81 -122.25 37.81 -122.24 37.82 -122.24 37.81 -122.25";

pub(super) fn status_report(line: &str) -> String {
    format!(
        "Connected as: 1\nCurrent time: 2024-01-01T12:00:00Z\nAnnounced endpoint: none\n\
         Rate limit: 2\n{line}\n"
    )
}

/// Builds sessions over a scripted transport and records the settings used.
#[derive(Debug, Default)]
pub(super) struct StubSessionBuilder {
    pub(super) stub: StubTransport,
    pub(super) sleeper: RecordingSleeper,
    pub(super) seen: RefCell<Vec<Settings>>,
}

impl StubSessionBuilder {
    pub(super) fn new(stub: StubTransport) -> Self {
        Self {
            stub,
            ..Self::default()
        }
    }

    pub(super) fn last_settings(&self) -> Settings {
        self.seen
            .borrow()
            .last()
            .cloned()
            .expect("a session should have been built")
    }
}

impl SessionBuilder for StubSessionBuilder {
    fn build(&self, settings: &Settings) -> Result<Session, CliError> {
        self.seen.borrow_mut().push(settings.clone());
        let address: IpAddr = "192.0.2.10".parse().expect("valid address");
        let resolver = CountingResolver::new().with_answer("overpass.example", [address]);
        Ok(Session::with_parts(
            settings,
            Arc::new(self.stub.clone()),
            Arc::new(self.sleeper.clone()),
            Arc::new(resolver),
            PinTable::new(),
        ))
    }
}

/// Parse `argv` and run it against `builder`, returning the printed output.
pub(super) fn run_cli(argv: &[&str], builder: &StubSessionBuilder) -> Result<String, CliError> {
    let mut invocation = vec!["osmfetch"];
    invocation.extend_from_slice(argv);
    let cli = Cli::try_parse_from(invocation).map_err(CliError::ArgumentParsing)?;
    let mut output = Vec::new();
    run_command(cli.command, builder, &mut output)?;
    Ok(String::from_utf8(output).expect("utf-8 output"))
}
