//! Behavioural tests for Overpass query construction.

use std::cell::RefCell;

use osmfetch_core::{
    DEFAULT_ACCESS, NetworkType, OverpassSettings, PolygonCoords, QueryError, TagSpec,
    features_query, network_query,
};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

#[derive(Debug, Default)]
struct QueryWorld {
    tags: RefCell<Option<Result<TagSpec, QueryError>>>,
    polygon: RefCell<Option<PolygonCoords>>,
    query: RefCell<Option<String>>,
}

#[fixture]
fn world() -> QueryWorld {
    QueryWorld::default()
}

fn settings() -> OverpassSettings {
    OverpassSettings::new(180)
}

#[given("the tag specification {spec}")]
fn given_tags(world: &QueryWorld, spec: String) {
    let value: serde_json::Value = serde_json::from_str(&spec).expect("feature carries JSON");
    world.tags.replace(Some(TagSpec::from_json(&value)));
}

#[given("a polygon {coords}")]
fn given_polygon(world: &QueryWorld, coords: String) {
    let polygon = PolygonCoords::new(coords.trim_matches('"')).expect("valid polygon");
    world.polygon.replace(Some(polygon));
}

#[when("I build a features query")]
fn when_features(world: &QueryWorld) {
    let tags = world.tags.borrow();
    let tags = tags
        .as_ref()
        .expect("tags should be set")
        .as_ref()
        .expect("tags should be valid");
    let polygon = world.polygon.borrow();
    let polygon = polygon.as_ref().expect("polygon should be set");
    let query = features_query(&settings(), polygon, tags);
    world.query.replace(Some(query));
}

#[when("I build a network query for the walk preset")]
fn when_network(world: &QueryWorld) {
    let polygon = world.polygon.borrow();
    let polygon = polygon.as_ref().expect("polygon should be set");
    let filter = NetworkType::Walk.filter(DEFAULT_ACCESS);
    world
        .query
        .replace(Some(network_query(&settings(), polygon, &filter)));
}

#[then("the query has {count} element clauses")]
fn then_clause_count(world: &QueryWorld, count: usize) {
    let query = world.query.borrow();
    let query = query.as_ref().expect("query should be built");
    assert_eq!(query.matches("(poly:").count(), count, "query: {query}");
}

#[then("the query starts with the settings clause")]
fn then_settings(world: &QueryWorld) {
    let query = world.query.borrow();
    let query = query.as_ref().expect("query should be built");
    assert!(query.starts_with("[out:json][timeout:180];"));
    assert!(query.ends_with(";out;"));
}

#[then("the tag specification is rejected")]
fn then_rejected(world: &QueryWorld) {
    let tags = world.tags.borrow();
    assert!(
        matches!(
            tags.as_ref(),
            Some(Err(QueryError::InvalidTagValue { key })) if key == "amenity"
        ),
        "expected InvalidTagValue, got {tags:?}"
    );
}

#[then("the query selects ways with the private access exclusion")]
fn then_network_filter(world: &QueryWorld) {
    let query = world.query.borrow();
    let query = query.as_ref().expect("query should be built");
    assert!(query.contains(r#"(way["highway"]["area"!~"yes"]["access"!~"private"]"#));
}

#[then("the query recurses down to nodes")]
fn then_recurses(world: &QueryWorld) {
    let query = world.query.borrow();
    let query = query.as_ref().expect("query should be built");
    assert!(query.ends_with(");>;);out;"), "query: {query}");
}

macro_rules! register_scenario {
    ($fn_name:ident, $title:literal) => {
        #[scenario(path = "tests/features/query_builder.feature", name = $title)]
        fn $fn_name(world: QueryWorld) {
            let _ = world;
        }
    };
}

register_scenario!(
    features_query_from_json,
    "building a features query from a JSON tag specification"
);
register_scenario!(
    numeric_tag_rejected,
    "rejecting a tag specification with a numeric value"
);
register_scenario!(network_query_from_preset, "building a network query from a preset");
