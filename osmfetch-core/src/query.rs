//! Overpass QL query construction.
//!
//! Two download modes are supported:
//!
//! - **network**: ways matching a filter predicate inside a polygon, plus the
//!   nodes they reference (`way<filter>(poly:...);>;`);
//! - **features**: nodes, ways and relations carrying any of the requested
//!   tags inside a polygon, each recursed down to their members.
//!
//! Both are prefixed with the global settings clause rendered by
//! [`OverpassSettings`].

use std::str::FromStr;

use crate::{PolygonCoords, QueryError, TagSpec};

/// Default settings template sent at the head of every query.
pub const DEFAULT_SETTINGS_TEMPLATE: &str = "[out:json][timeout:{timeout}]{maxsize}";

/// Default access clause appended to most network presets.
pub const DEFAULT_ACCESS: &str = r#"["access"!~"private"]"#;

const ELEMENT_KINDS: [&str; 3] = ["node", "way", "relation"];

/// Global settings clause for Overpass queries.
///
/// # Examples
///
/// ```
/// use osmfetch_core::OverpassSettings;
///
/// let settings = OverpassSettings::new(180).with_memory(Some(1_073_741_824));
/// assert_eq!(settings.render(), "[out:json][timeout:180][maxsize:1073741824]");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverpassSettings {
    template: String,
    timeout_secs: u64,
    memory: Option<u64>,
}

impl OverpassSettings {
    /// Settings using [`DEFAULT_SETTINGS_TEMPLATE`] and no memory limit.
    #[must_use]
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            template: DEFAULT_SETTINGS_TEMPLATE.to_owned(),
            timeout_secs,
            memory: None,
        }
    }

    /// Override the template; `{timeout}` and `{maxsize}` are substituted.
    #[must_use]
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Set the server-side memory limit in bytes.
    #[must_use]
    pub fn with_memory(mut self, memory: Option<u64>) -> Self {
        self.memory = memory;
        self
    }

    /// Render the settings clause without the trailing semicolon.
    #[must_use]
    pub fn render(&self) -> String {
        let maxsize = self
            .memory
            .map(|bytes| format!("[maxsize:{bytes}]"))
            .unwrap_or_default();
        self.template
            .replace("{timeout}", &self.timeout_secs.to_string())
            .replace("{maxsize}", &maxsize)
    }
}

/// Preset way filters for common street network types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkType {
    /// Drivable public streets, excluding service roads.
    Drive,
    /// Drivable public streets including service roads.
    DriveService,
    /// Everything pedestrians can use.
    Walk,
    /// Everything cyclists can use.
    Bike,
    /// All non-private streets and paths.
    All,
    /// All streets and paths, including private-access ones.
    AllPrivate,
}

impl NetworkType {
    /// Label accepted by [`FromStr`].
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Drive => "drive",
            Self::DriveService => "drive_service",
            Self::Walk => "walk",
            Self::Bike => "bike",
            Self::All => "all",
            Self::AllPrivate => "all_private",
        }
    }

    /// Expand the preset into an Overpass way filter.
    ///
    /// `default_access` is inserted after the area exclusion for every preset
    /// except [`NetworkType::AllPrivate`].
    #[must_use]
    pub fn filter(self, default_access: &str) -> String {
        let base = r#"["highway"]["area"!~"yes"]"#;
        match self {
            Self::Drive => format!(
                "{base}{default_access}\
                 [\"highway\"!~\"abandoned|bridleway|bus_guideway|construction|corridor|cycleway|\
                 elevator|escalator|footway|no|path|pedestrian|planned|platform|proposed|raceway|\
                 razed|service|steps|track\"]\
                 [\"motor_vehicle\"!~\"no\"][\"motorcar\"!~\"no\"]\
                 [\"service\"!~\"alley|driveway|emergency_access|parking|parking_aisle|private\"]"
            ),
            Self::DriveService => format!(
                "{base}{default_access}\
                 [\"highway\"!~\"abandoned|bridleway|bus_guideway|construction|corridor|cycleway|\
                 elevator|escalator|footway|no|path|pedestrian|planned|platform|proposed|raceway|\
                 razed|steps|track\"]\
                 [\"motor_vehicle\"!~\"no\"][\"motorcar\"!~\"no\"]\
                 [\"service\"!~\"emergency_access|parking|parking_aisle|private\"]"
            ),
            Self::Walk => format!(
                "{base}{default_access}\
                 [\"highway\"!~\"abandoned|bus_guideway|construction|cycleway|motor|no|planned|\
                 platform|proposed|raceway|razed\"]\
                 [\"foot\"!~\"no\"][\"service\"!~\"private\"]"
            ),
            Self::Bike => format!(
                "{base}{default_access}\
                 [\"highway\"!~\"abandoned|bus_guideway|construction|corridor|elevator|escalator|\
                 footway|motor|no|planned|platform|proposed|raceway|razed|steps\"]\
                 [\"bicycle\"!~\"no\"][\"service\"!~\"private\"]"
            ),
            Self::All => format!(
                "{base}{default_access}\
                 [\"highway\"!~\"abandoned|construction|no|planned|platform|proposed|raceway|\
                 razed\"]\
                 [\"service\"!~\"private\"]"
            ),
            Self::AllPrivate => format!(
                "{base}\
                 [\"highway\"!~\"abandoned|construction|no|planned|platform|proposed|raceway|\
                 razed\"]"
            ),
        }
    }
}

impl FromStr for NetworkType {
    type Err = QueryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "drive" => Ok(Self::Drive),
            "drive_service" => Ok(Self::DriveService),
            "walk" => Ok(Self::Walk),
            "bike" => Ok(Self::Bike),
            "all" => Ok(Self::All),
            "all_private" => Ok(Self::AllPrivate),
            other => Err(QueryError::UnknownNetworkType(other.to_owned())),
        }
    }
}

/// Way filter used by a network download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkFilter {
    /// A named preset, expanded with the configured access clause.
    Preset(NetworkType),
    /// A caller-supplied filter used verbatim.
    Custom(String),
}

impl NetworkFilter {
    /// Resolve to the filter text sent to the server.
    #[must_use]
    pub fn resolve(&self, default_access: &str) -> String {
        match self {
            Self::Preset(kind) => kind.filter(default_access),
            Self::Custom(filter) => filter.clone(),
        }
    }
}

/// Build the query for ways matching `filter` plus their nodes.
///
/// # Examples
///
/// ```
/// use osmfetch_core::{OverpassSettings, PolygonCoords, network_query};
///
/// let poly = PolygonCoords::new("52.0 13.0 52.0 13.1 52.1 13.1")?;
/// let query = network_query(&OverpassSettings::new(25), &poly, r#"["highway"]"#);
/// assert_eq!(
///     query,
///     r#"[out:json][timeout:25];(way["highway"](poly:'52.0 13.0 52.0 13.1 52.1 13.1');>;);out;"#
/// );
/// # Ok::<(), osmfetch_core::QueryError>(())
/// ```
#[must_use]
pub fn network_query(settings: &OverpassSettings, polygon: &PolygonCoords, filter: &str) -> String {
    format!(
        "{};(way{filter}(poly:{});>;);out;",
        settings.render(),
        quote(polygon.as_str())
    )
}

/// Build the query for every element kind carrying any of `tags`.
///
/// One clause is emitted per element kind, tag and value, in that nesting.
/// Keys with an empty list of values contribute no clauses, and an empty
/// specification yields an empty union.
#[must_use]
pub fn features_query(
    settings: &OverpassSettings,
    polygon: &PolygonCoords,
    tags: &TagSpec,
) -> String {
    let poly = quote(polygon.as_str());
    let mut components = String::new();
    for (key, constraint) in tags.iter() {
        for alternative in constraint.alternatives() {
            let selector = match alternative {
                None => format!("[{}]", quote(key)),
                Some(value) => format!("[{}={}]", quote(key), quote(value)),
            };
            for kind in ELEMENT_KINDS {
                components.push_str(&format!("({kind}{selector}(poly:{poly});(._;>;););"));
            }
        }
    }
    format!("{};({components});out;", settings.render())
}

/// Quote a string literal for Overpass QL.
///
/// Single quotes are preferred; double quotes are used when the text contains
/// a single quote but no double quote. Remaining conflicts are escaped.
fn quote(text: &str) -> String {
    let delimiter = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push(delimiter);
    for ch in text.chars() {
        if ch == '\\' || ch == delimiter {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push(delimiter);
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn poly() -> PolygonCoords {
        PolygonCoords::new("1 2 3 4 5 6").expect("valid polygon")
    }

    #[rstest]
    fn settings_omit_maxsize_without_memory() {
        assert_eq!(
            OverpassSettings::new(180).render(),
            "[out:json][timeout:180]"
        );
    }

    #[rstest]
    fn settings_honour_custom_templates() {
        let settings = OverpassSettings::new(60)
            .with_template("[out:json][timeout:{timeout}]{maxsize}[date:\"2019-10-28T19:20:00Z\"]");
        assert_eq!(
            settings.render(),
            "[out:json][timeout:60][date:\"2019-10-28T19:20:00Z\"]"
        );
    }

    #[rstest]
    fn features_query_expands_kinds_for_each_value(poly: PolygonCoords) {
        let tags = TagSpec::new().with_one_of("amenity", ["cafe", "pub"]);

        let query = features_query(&OverpassSettings::new(25), &poly, &tags);

        let expected_components = [
            "(node['amenity'='cafe'](poly:'1 2 3 4 5 6');(._;>;););",
            "(way['amenity'='cafe'](poly:'1 2 3 4 5 6');(._;>;););",
            "(relation['amenity'='cafe'](poly:'1 2 3 4 5 6');(._;>;););",
            "(node['amenity'='pub'](poly:'1 2 3 4 5 6');(._;>;););",
            "(way['amenity'='pub'](poly:'1 2 3 4 5 6');(._;>;););",
            "(relation['amenity'='pub'](poly:'1 2 3 4 5 6');(._;>;););",
        ]
        .concat();
        assert_eq!(
            query,
            format!("[out:json][timeout:25];({expected_components});out;")
        );
    }

    #[rstest]
    fn features_query_uses_key_only_selector_for_presence(poly: PolygonCoords) {
        let tags = TagSpec::new().with_present("building");

        let query = features_query(&OverpassSettings::new(25), &poly, &tags);

        assert!(query.contains("(node['building'](poly:'1 2 3 4 5 6');(._;>;););"));
        assert_eq!(query.matches("['building']").count(), 3);
    }

    #[rstest]
    fn features_query_renders_empty_specifications(poly: PolygonCoords) {
        let settings = OverpassSettings::new(25);

        assert_eq!(
            features_query(&settings, &poly, &TagSpec::new()),
            "[out:json][timeout:25];();out;"
        );
        let no_values = TagSpec::new().with_one_of("shop", Vec::<String>::new());
        assert_eq!(
            features_query(&settings, &poly, &no_values),
            "[out:json][timeout:25];();out;"
        );
    }

    #[rstest]
    #[case("cafe", "'cafe'")]
    #[case("Joe's", "\"Joe's\"")]
    #[case("a'b\"c", "'a\\'b\"c'")]
    #[case("back\\slash", "'back\\\\slash'")]
    fn quote_mimics_literal_rules(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(quote(input), expected);
    }

    #[rstest]
    #[case(NetworkType::Drive)]
    #[case(NetworkType::DriveService)]
    #[case(NetworkType::Walk)]
    #[case(NetworkType::Bike)]
    #[case(NetworkType::All)]
    #[case(NetworkType::AllPrivate)]
    fn network_type_labels_round_trip(#[case] kind: NetworkType) {
        assert_eq!(kind.label().parse::<NetworkType>(), Ok(kind));
    }

    #[rstest]
    fn presets_include_access_clause_except_all_private() {
        assert!(NetworkType::Walk.filter(DEFAULT_ACCESS).contains(DEFAULT_ACCESS));
        assert!(!NetworkType::AllPrivate
            .filter(DEFAULT_ACCESS)
            .contains(DEFAULT_ACCESS));
    }

    #[rstest]
    fn drive_preset_excludes_service_roads() {
        let filter = NetworkType::Drive.filter(DEFAULT_ACCESS);
        assert!(filter.starts_with(r#"["highway"]["area"!~"yes"]["access"!~"private"]"#));
        assert!(filter.contains("razed|service|steps|track"));
        assert!(!filter.contains(' '));
    }

    #[rstest]
    fn unknown_network_type_is_rejected() {
        assert_eq!(
            "boat".parse::<NetworkType>(),
            Err(QueryError::UnknownNetworkType("boat".to_owned()))
        );
    }

    #[rstest]
    fn custom_filter_is_used_verbatim() {
        let filter = NetworkFilter::Custom(r#"["railway"]"#.to_owned());
        assert_eq!(filter.resolve(DEFAULT_ACCESS), r#"["railway"]"#);
    }
}
