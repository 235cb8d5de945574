//! Behavioural tests for the request pipeline.
//!
//! These scenarios drive a [`Session`] through scripted transports, so no
//! network access or real sleeping takes place.

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use osmfetch_core::test_support::{CountingResolver, RecordingSleeper, StubTransport};
use osmfetch_core::{
    HttpRequest, NominatimQuery, PinTable, PolygonCoords, QueryParams, TagSpec, features_query,
};
use osmfetch_data::{FetchError, Session, Settings, download_features};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::{Value, json};
use tempfile::TempDir;

const OVERPASS: &str = "https://overpass.example/api";
const STATUS: &str = "https://overpass.example/api/status";
const INTERPRETER: &str = "https://overpass.example/api/interpreter";
const NOMINATIM: &str = "https://nominatim.example/";
const POLYGON: &str = "37.80 -122.25 37.80 -122.24 37.81 -122.24 37.80 -122.25";

#[derive(Debug)]
struct PipelineWorld {
    dir: TempDir,
    stub: RefCell<StubTransport>,
    sleeper: RecordingSleeper,
    search: RefCell<Option<Result<Value, FetchError>>>,
    downloads: RefCell<Vec<Vec<Value>>>,
}

#[fixture]
fn world() -> PipelineWorld {
    PipelineWorld {
        dir: TempDir::new().expect("create temp dir"),
        stub: RefCell::new(StubTransport::new()),
        sleeper: RecordingSleeper::new(),
        search: RefCell::new(None),
        downloads: RefCell::new(Vec::new()),
    }
}

impl PipelineWorld {
    fn cache_folder(&self) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.dir.path().join("cache")).expect("utf-8 temp path")
    }

    fn settings(&self) -> Settings {
        Settings {
            cache_folder: self.cache_folder(),
            overpass_endpoint: OVERPASS.to_owned(),
            nominatim_endpoint: NOMINATIM.to_owned(),
            doh_url_template: None,
            ..Settings::default()
        }
    }

    fn session(&self) -> Session {
        let resolver = CountingResolver::new().with_answer(
            "overpass.example",
            ["192.0.2.10".parse::<std::net::IpAddr>().expect("valid address")],
        );
        Session::with_parts(
            &self.settings(),
            Arc::new(self.stub.borrow().clone()),
            Arc::new(self.sleeper.clone()),
            Arc::new(resolver),
            PinTable::new(),
        )
    }

    fn tags() -> TagSpec {
        TagSpec::new().with_present("building")
    }

    fn polygon() -> PolygonCoords {
        PolygonCoords::new(POLYGON).expect("valid polygon")
    }

    fn cache_entries(&self) -> usize {
        std::fs::read_dir(self.cache_folder())
            .map(|entries| entries.filter_map(Result::ok).count())
            .unwrap_or(0)
    }
}

fn status_report(line: &str) -> String {
    format!(
        "Connected as: 1\nCurrent time: 2024-01-01T12:00:00Z\nAnnounced endpoint: none\n\
         Rate limit: 2\n{line}\n"
    )
}

// --- Given steps ---

#[given("a Nominatim service answering 429, 429 then 200")]
fn nominatim_busy_twice(world: &PipelineWorld) {
    world.stub.replace(
        StubTransport::new()
            .respond(NOMINATIM, 429, "")
            .respond(NOMINATIM, 429, "")
            .respond(NOMINATIM, 200, r#"[{"osm_id": 2833530, "osm_type": "relation"}]"#),
    );
}

#[given("an Overpass service with free slots")]
fn overpass_free(world: &PipelineWorld) {
    world.stub.replace(
        StubTransport::new()
            .respond(STATUS, 200, status_report("2 slots available now."))
            .respond(
                INTERPRETER,
                200,
                r#"{"elements": [{"type": "way", "id": 10, "tags": {"building": "yes"}}]}"#,
            ),
    );
}

#[given("a cached response with a remark for the query")]
fn cached_remark(world: &PipelineWorld) {
    let settings = world.settings();
    let query = features_query(
        &settings.overpass_query_settings(),
        &PipelineWorld::polygon(),
        &PipelineWorld::tags(),
    );
    let key = HttpRequest::post(INTERPRETER, QueryParams::new().with("data", query)).prepared_url();
    let stored = settings
        .cache()
        .store(
            &key,
            &json!({"elements": [], "remark": "runtime error: Query timed out"}),
            true,
        )
        .expect("write cache entry");
    assert!(stored);
}

// --- When steps ---

#[when("I search Nominatim for {text}")]
fn search(world: &PipelineWorld, text: String) {
    let query = NominatimQuery::FreeText(text.trim_matches('"').to_owned());
    let result = world.session().nominatim().retrieve_osm_element(&query, 1, true);
    world.search.replace(Some(result));
}

#[when("I download features for one small polygon")]
fn download_once(world: &PipelineWorld) {
    let session = world.session();
    let result = download_features(
        session.overpass(),
        session.query_settings(),
        &[PipelineWorld::polygon()],
        &PipelineWorld::tags(),
    )
    .expect("download succeeds");
    world.downloads.borrow_mut().push(result);
}

#[when("I download features for the same polygon again")]
fn download_again(world: &PipelineWorld) {
    download_once(world);
}

// --- Then steps ---

#[then("the search result is returned")]
fn search_returned(world: &PipelineWorld) {
    let search = world.search.borrow();
    let body = search
        .as_ref()
        .expect("search should have run")
        .as_ref()
        .expect("search should succeed");
    assert_eq!(body[0]["osm_id"], 2_833_530);
}

#[then("exactly {count} backoff pauses were slept")]
fn backoff_pauses(world: &PipelineWorld, count: usize) {
    let backoffs = world
        .sleeper
        .pauses()
        .into_iter()
        .filter(|pause| *pause == Duration::from_secs(60))
        .count();
    assert_eq!(backoffs, count, "pauses: {:?}", world.sleeper.pauses());
}

#[then("the service received {count} requests")]
fn request_count(world: &PipelineWorld, count: usize) {
    assert_eq!(world.stub.borrow().request_count(), count);
}

#[then("the service received {polls} status poll and {queries} query")]
fn poll_and_query_count(world: &PipelineWorld, polls: usize, queries: usize) {
    let stub = world.stub.borrow();
    assert_eq!(stub.requests_to(STATUS), polls, "status polls");
    assert_eq!(stub.requests_to(INTERPRETER), queries, "queries");
}

#[then("one cache entry was written")]
fn one_cache_entry(world: &PipelineWorld) {
    assert_eq!(world.cache_entries(), 1);
}

#[then("both downloads returned the same JSON")]
fn same_json(world: &PipelineWorld) {
    let downloads = world.downloads.borrow();
    assert_eq!(downloads.len(), 2);
    assert_eq!(downloads[0], downloads[1]);
    assert_eq!(downloads[0][0]["elements"][0]["id"], 10);
}

// --- Scenario registrations ---

macro_rules! register_scenario {
    ($fn_name:ident, $title:literal) => {
        #[scenario(path = "tests/features/request_pipeline.feature", name = $title)]
        fn $fn_name(world: PipelineWorld) {
            let _ = world;
        }
    };
}

register_scenario!(
    backing_off_until_accepted,
    "backing off until the server accepts the request"
);
register_scenario!(
    fetching_and_reusing_cache,
    "fetching Overpass data for one polygon and reusing the cache"
);
register_scenario!(
    ignoring_remarked_cache,
    "ignoring cached responses that carry a server remark"
);
