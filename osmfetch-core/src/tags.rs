//! Tag specifications used to select OpenStreetMap features.
//!
//! A specification maps each tag key to one of three shapes: the key merely
//! has to be present, it has to equal one value, or it has to equal any of a
//! list of alternatives. An empty list of alternatives matches nothing. Input arriving as loosely-typed JSON is validated
//! once at the boundary by [`TagSpec::from_json`].

use std::collections::BTreeMap;

use serde_json::Value;

use crate::QueryError;

/// Constraint applied to a single tag key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValue {
    /// The key must be present with any value.
    Present,
    /// The key must equal this value.
    Equals(String),
    /// The key must equal one of these values.
    OneOf(Vec<String>),
}

impl TagValue {
    /// Expand the constraint into the individual values it matches.
    ///
    /// `Present` yields a single `None`, meaning "key only".
    #[must_use]
    pub fn alternatives(&self) -> Vec<Option<&str>> {
        match self {
            Self::Present => vec![None],
            Self::Equals(value) => vec![Some(value.as_str())],
            Self::OneOf(values) => values.iter().map(|value| Some(value.as_str())).collect(),
        }
    }
}

/// Ordered collection of tag constraints.
///
/// Keys are kept sorted so identical specifications always produce identical
/// query text, and therefore identical cache keys.
///
/// # Examples
///
/// ```
/// use osmfetch_core::{TagSpec, TagValue};
///
/// let tags = TagSpec::new()
///     .with_present("building")
///     .with_one_of("amenity", ["cafe", "pub"]);
/// assert_eq!(tags.get("building"), Some(&TagValue::Present));
/// assert_eq!(tags.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSpec {
    tags: BTreeMap<String, TagValue>,
}

impl TagSpec {
    /// Create an empty specification.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` to be present.
    #[must_use]
    pub fn with_present(mut self, key: impl Into<String>) -> Self {
        self.tags.insert(key.into(), TagValue::Present);
        self
    }

    /// Require `key` to equal `value`.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), TagValue::Equals(value.into()));
        self
    }

    /// Require `key` to equal any of `values`.
    #[must_use]
    pub fn with_one_of<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.tags.insert(key.into(), TagValue::OneOf(values));
        self
    }

    /// Look up the constraint for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&TagValue> {
        self.tags.get(key)
    }

    /// Number of constrained keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether no keys are constrained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Iterate over `(key, constraint)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TagValue)> {
        self.tags.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Validate a JSON mapping such as `{"building": true, "amenity": ["cafe"]}`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when the input is not an object or when a value
    /// is not a boolean, string or list of strings. Any boolean, `false`
    /// included, only asks for the key to be present.
    pub fn from_json(value: &Value) -> Result<Self, QueryError> {
        let Value::Object(entries) = value else {
            return Err(QueryError::TagsNotAnObject);
        };
        let mut spec = Self::new();
        for (key, raw) in entries {
            let constraint = match raw {
                Value::Bool(_) => TagValue::Present,
                Value::String(single) => TagValue::Equals(single.clone()),
                Value::Array(items) => {
                    let values = items
                        .iter()
                        .map(|item| item.as_str().map(str::to_owned))
                        .collect::<Option<Vec<_>>>()
                        .ok_or_else(|| QueryError::InvalidTagValue { key: key.clone() })?;
                    TagValue::OneOf(values)
                }
                _ => return Err(QueryError::InvalidTagValue { key: key.clone() }),
            };
            spec.tags.insert(key.clone(), constraint);
        }
        Ok(spec)
    }
}
