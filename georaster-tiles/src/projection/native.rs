//! Closed-form projectors that need no definition lookup.

use std::f64::consts::PI;

use super::{Point, ProjectionError, Projector};

/// Radius of the Web Mercator sphere in metres.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Latitude limit of the Web Mercator square.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Passes points through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityProjector;

impl Projector for IdentityProjector {
    fn forward(&self, point: Point) -> Result<Point, ProjectionError> {
        Ok(point)
    }

    fn inverse(&self, point: Point) -> Result<Point, ProjectionError> {
        Ok(point)
    }

    fn is_identity(&self) -> bool {
        true
    }
}

/// Linear map taking one box onto another.
///
/// Used for the simple pixel plane, where map units relate to the raster by
/// scale and offset only.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineProjector {
    from: [f64; 4],
    to: [f64; 4],
}

impl AffineProjector {
    /// Map `from` (xmin, ymin, xmax, ymax) onto `to`.
    pub fn between(from: [f64; 4], to: [f64; 4]) -> Self {
        Self { from, to }
    }

    fn apply(src: &[f64; 4], dst: &[f64; 4], (x, y): Point) -> Point {
        let sx = (dst[2] - dst[0]) / (src[2] - src[0]);
        let sy = (dst[3] - dst[1]) / (src[3] - src[1]);
        (dst[0] + (x - src[0]) * sx, dst[1] + (y - src[1]) * sy)
    }
}

impl Projector for AffineProjector {
    fn forward(&self, point: Point) -> Result<Point, ProjectionError> {
        Ok(Self::apply(&self.from, &self.to, point))
    }

    fn inverse(&self, point: Point) -> Result<Point, ProjectionError> {
        Ok(Self::apply(&self.to, &self.from, point))
    }

    fn is_identity(&self) -> bool {
        self.from == self.to
    }
}

/// Spherical Web Mercator against WGS84 degrees.
///
/// Latitudes are clamped to [`MAX_LATITUDE`] so the poles map to the edges of
/// the square instead of infinity.
#[derive(Debug, Clone, Copy)]
pub struct WebMercatorProjector {
    geographic_source: bool,
}

impl WebMercatorProjector {
    /// WGS84 → Web Mercator.
    pub fn from_geographic() -> Self {
        Self {
            geographic_source: true,
        }
    }

    /// Web Mercator → WGS84.
    pub fn to_geographic() -> Self {
        Self {
            geographic_source: false,
        }
    }

    /// Project longitude/latitude degrees to metres.
    pub fn project((lon, lat): Point) -> Point {
        let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
        let x = EARTH_RADIUS * lon.to_radians();
        let y = EARTH_RADIUS * (PI / 4.0 + lat / 2.0).tan().ln();
        (x, y)
    }

    /// Unproject metres to longitude/latitude degrees.
    pub fn unproject((x, y): Point) -> Point {
        let lon = (x / EARTH_RADIUS).to_degrees();
        let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
        (lon, lat)
    }
}

impl Projector for WebMercatorProjector {
    fn forward(&self, point: Point) -> Result<Point, ProjectionError> {
        Ok(if self.geographic_source {
            Self::project(point)
        } else {
            Self::unproject(point)
        })
    }

    fn inverse(&self, point: Point) -> Result<Point, ProjectionError> {
        Ok(if self.geographic_source {
            Self::unproject(point)
        } else {
            Self::project(point)
        })
    }
}
