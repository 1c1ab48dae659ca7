//! Skew of a raster footprint after reprojection.

use crate::extent::Extent;
use crate::projection::{ProjectionError, Projector};

/// Opposite-edge deltas of a reprojected box.
///
/// `x` is the horizontal drift of the left and right edges, `y` the vertical
/// drift of the top and bottom edges. Both are zero when the transform keeps
/// axis-aligned edges axis-aligned.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Skew {
    pub x: f64,
    pub y: f64,
}

impl Skew {
    pub const NONE: Skew = Skew { x: 0.0, y: 0.0 };

    /// True when both deltas are exactly zero.
    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

/// Project the corners of `bbox` through `projector` and measure the skew.
pub fn measure_skew(bbox: &Extent, projector: &dyn Projector) -> Result<Skew, ProjectionError> {
    let top_left = projector.forward((bbox.xmin, bbox.ymax))?;
    let bottom_left = projector.forward((bbox.xmin, bbox.ymin))?;
    let bottom_right = projector.forward((bbox.xmax, bbox.ymin))?;
    let top_right = projector.forward((bbox.xmax, bbox.ymax))?;

    Ok(Skew {
        x: (top_left.0 - bottom_left.0)
            .abs()
            .max((top_right.0 - bottom_right.0).abs()),
        y: (top_left.1 - top_right.1)
            .abs()
            .max((bottom_left.1 - bottom_right.1).abs()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::{IdentityProjector, Point, Srs, WebMercatorProjector};

    struct Shear;

    impl Projector for Shear {
        fn forward(&self, (x, y): Point) -> Result<Point, ProjectionError> {
            Ok((x + 0.5 * y, y))
        }

        fn inverse(&self, (x, y): Point) -> Result<Point, ProjectionError> {
            Ok((x - 0.5 * y, y))
        }
    }

    fn bbox() -> Extent {
        Extent::new(-10.0, -10.0, 10.0, 10.0, Srs::WGS84)
    }

    #[test]
    fn test_identity_has_no_skew() {
        assert!(measure_skew(&bbox(), &IdentityProjector).unwrap().is_zero());
    }

    #[test]
    fn test_web_mercator_has_no_skew() {
        let skew = measure_skew(&bbox(), &WebMercatorProjector::from_geographic()).unwrap();
        assert!(skew.is_zero());
    }

    #[test]
    fn test_shear_skews_horizontally() {
        let skew = measure_skew(&bbox(), &Shear).unwrap();
        assert_eq!(skew, Skew { x: 10.0, y: 0.0 });
    }
}
