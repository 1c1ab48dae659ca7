//! Spatial reference identifiers.

use std::fmt;
use std::str::FromStr;

use super::ProjectionError;

/// EPSG code of WGS84 longitude/latitude.
pub const EPSG_WGS84: u32 = 4326;

/// EPSG code of spherical Web Mercator.
pub const EPSG_WEB_MERCATOR: u32 = 3857;

/// Identifies the coordinate reference system an [`Extent`](crate::extent::Extent)
/// or raster is expressed in.
///
/// `Simple` is the non-georeferenced plane used when the host map displays a
/// raster in its own pixel space. It never reprojects to or from a
/// georeferenced system.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Srs {
    /// An EPSG registry code, e.g. `EPSG:32633`.
    Epsg(u32),
    /// A literal proj string, e.g. `+proj=utm +zone=33 +datum=WGS84`.
    Proj4(String),
    /// Non-georeferenced pixel plane.
    Simple,
}

impl Srs {
    /// WGS84 longitude/latitude in degrees.
    pub const WGS84: Srs = Srs::Epsg(EPSG_WGS84);

    /// Spherical Web Mercator in metres.
    pub const WEB_MERCATOR: Srs = Srs::Epsg(EPSG_WEB_MERCATOR);

    /// Parse an identifier.
    ///
    /// Accepts `EPSG:<code>` (any case), a bare numeric code, a proj string
    /// starting with `+`, or `simple`.
    pub fn parse(input: &str) -> Result<Self, ProjectionError> {
        let trimmed = input.trim();
        let unsupported = || ProjectionError::UnsupportedProjection {
            projection: input.to_string(),
        };

        if trimmed.eq_ignore_ascii_case("simple") {
            return Ok(Srs::Simple);
        }
        if trimmed.starts_with('+') {
            return Ok(Srs::Proj4(trimmed.to_string()));
        }

        let digits = match trimmed.get(..5) {
            Some(prefix) if prefix.eq_ignore_ascii_case("epsg:") => &trimmed[5..],
            _ => trimmed,
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(unsupported());
        }
        digits.parse::<u32>().map(Srs::Epsg).map_err(|_| unsupported())
    }

    /// The EPSG code, if this is an EPSG identifier.
    pub fn epsg(&self) -> Option<u32> {
        match self {
            Srs::Epsg(code) => Some(*code),
            _ => None,
        }
    }

    /// True for the non-georeferenced plane.
    pub fn is_simple(&self) -> bool {
        matches!(self, Srs::Simple)
    }
}

impl FromStr for Srs {
    type Err = ProjectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Srs::parse(s)
    }
}

impl From<u32> for Srs {
    fn from(code: u32) -> Self {
        Srs::Epsg(code)
    }
}

impl fmt::Display for Srs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Srs::Epsg(code) => write!(f, "EPSG:{}", code),
            Srs::Proj4(def) => write!(f, "{}", def),
            Srs::Simple => write!(f, "simple"),
        }
    }
}
