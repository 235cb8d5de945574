//! Overpass `poly:` coordinate strings.

use std::fmt;

use geo::Polygon;

use crate::QueryError;

/// Exterior ring of a polygon rendered as `"lat lon lat lon ..."`.
///
/// Subdividing large areas is the caller's concern; each value here becomes
/// exactly one Overpass query.
///
/// # Examples
///
/// ```
/// use geo::polygon;
/// use osmfetch_core::PolygonCoords;
///
/// let square = polygon![
///     (x: 13.0, y: 52.0),
///     (x: 13.1, y: 52.0),
///     (x: 13.1, y: 52.1),
///     (x: 13.0, y: 52.0),
/// ];
/// let coords = PolygonCoords::from_polygon(&square)?;
/// assert!(coords.as_str().starts_with("52.000000 13.000000"));
/// # Ok::<(), osmfetch_core::QueryError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolygonCoords(String);

impl PolygonCoords {
    /// Wrap a pre-built coordinate string.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::EmptyPolygon`] for blank input.
    pub fn new(value: impl Into<String>) -> Result<Self, QueryError> {
        let raw = value.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(QueryError::EmptyPolygon);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Render the exterior ring of `polygon`, latitude first, six decimals.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::EmptyPolygon`] when the ring has no coordinates.
    pub fn from_polygon(polygon: &Polygon<f64>) -> Result<Self, QueryError> {
        let rendered = polygon
            .exterior()
            .coords()
            .map(|coord| format!("{:.6} {:.6}", coord.y, coord.x))
            .collect::<Vec<_>>()
            .join(" ");
        Self::new(rendered)
    }

    /// Borrow the coordinate string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PolygonCoords {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PolygonCoords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use rstest::rstest;

    #[rstest]
    fn renders_latitude_before_longitude() {
        let triangle = polygon![
            (x: -122.5, y: 37.75),
            (x: -122.4, y: 37.75),
            (x: -122.4, y: 37.8),
            (x: -122.5, y: 37.75),
        ];

        let coords = PolygonCoords::from_polygon(&triangle).expect("non-empty ring");

        assert_eq!(
            coords.as_str(),
            "37.750000 -122.500000 37.750000 -122.400000 \
             37.800000 -122.400000 37.750000 -122.500000"
        );
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn rejects_blank_strings(#[case] input: &str) {
        assert_eq!(PolygonCoords::new(input), Err(QueryError::EmptyPolygon));
    }

    #[rstest]
    fn trims_surrounding_whitespace() {
        let coords = PolygonCoords::new(" 1 2 3 4 ").expect("valid");
        assert_eq!(coords.as_str(), "1 2 3 4");
    }
}
