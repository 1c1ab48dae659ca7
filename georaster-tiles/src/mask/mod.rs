//! Polygon clipping masks.
//!
//! A mask hides the parts of a layer on one side of a set of polygons. The
//! polygons are given in their own system and reprojected into the map's
//! system once, when the layer is built. Each tile is then classified:
//!
//! - [`MaskCoverage::Hidden`] tiles are skipped before any read
//! - [`MaskCoverage::Visible`] tiles paint as if there were no mask
//! - [`MaskCoverage::Partial`] tiles test the centre of every sample
//!
//! An automatic mask uses the footprint of each raster, traced with
//! [`AUTO_MASK_DENSITY`] points per edge.

use std::fmt;
use std::str::FromStr;

use geo::{
    BoundingRect, Contains, Coord, Intersects, LineString, MapCoords, MultiPolygon, Polygon, Rect,
};
use tracing::debug;

use crate::extent::Extent;
use crate::projection::{Point, ProjectionError, Projectors, Srs};
use crate::raster::RasterDescriptor;

/// Points per edge when tracing a raster footprint.
pub const AUTO_MASK_DENSITY: usize = 100;

/// Which side of the mask polygons is clipped away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaskStrategy {
    /// Clip everything outside the polygons.
    #[default]
    Outside,
    /// Clip everything inside the polygons.
    Inside,
}

impl FromStr for MaskStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "outside" => Ok(MaskStrategy::Outside),
            "inside" => Ok(MaskStrategy::Inside),
            other => Err(format!("unknown mask strategy '{}'", other)),
        }
    }
}

impl fmt::Display for MaskStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MaskStrategy::Outside => "outside",
            MaskStrategy::Inside => "inside",
        })
    }
}

/// Where the mask polygons come from.
#[derive(Debug, Clone, PartialEq)]
pub enum MaskShape {
    /// Caller polygons, in [`MaskOptions::srs`].
    Polygons(MultiPolygon<f64>),
    /// The footprint of every raster in the layer.
    Auto,
}

/// A mask as configured on a layer.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskOptions {
    pub shape: MaskShape,
    /// System of caller polygons. Ignored by the automatic mask.
    pub srs: Srs,
    pub strategy: MaskStrategy,
}

impl MaskOptions {
    /// Caller polygons in WGS84, clipping outside.
    pub fn polygons(polygons: impl Into<MultiPolygon<f64>>) -> Self {
        Self {
            shape: MaskShape::Polygons(polygons.into()),
            srs: Srs::WGS84,
            strategy: MaskStrategy::default(),
        }
    }

    /// Raster footprints, clipping outside.
    pub fn auto() -> Self {
        Self {
            shape: MaskShape::Auto,
            srs: Srs::WGS84,
            strategy: MaskStrategy::default(),
        }
    }

    /// Axis-aligned box in `extent.srs`.
    pub fn bbox(extent: &Extent) -> Self {
        let rect = Rect::new(
            Coord { x: extent.xmin, y: extent.ymin },
            Coord { x: extent.xmax, y: extent.ymax },
        );
        Self::polygons(rect.to_polygon()).with_srs(extent.srs.clone())
    }

    pub fn with_srs(mut self, srs: Srs) -> Self {
        self.srs = srs;
        self
    }

    pub fn with_strategy(mut self, strategy: MaskStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// How a region of the map relates to a mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskCoverage {
    /// Nothing in the region is clipped.
    Visible,
    /// Everything in the region is clipped.
    Hidden,
    /// The region straddles a mask edge.
    Partial,
}

/// A mask resolved into the map's system.
#[derive(Debug, Clone)]
pub struct ClipMask {
    polygons: MultiPolygon<f64>,
    bounds: Option<Extent>,
    strategy: MaskStrategy,
}

impl ClipMask {
    /// Wrap polygons already in the map's system.
    pub fn new(polygons: MultiPolygon<f64>, map_srs: Srs, strategy: MaskStrategy) -> Self {
        let bounds = polygons.bounding_rect().map(|r| {
            Extent::new(r.min().x, r.min().y, r.max().x, r.max().y, map_srs)
        });
        Self {
            polygons,
            bounds,
            strategy,
        }
    }

    /// Resolve `options` for a layer over `rasters` shown in `map_srs`.
    ///
    /// # Errors
    ///
    /// Any failure to resolve or apply a projector.
    pub fn build(
        options: &MaskOptions,
        rasters: &[RasterDescriptor],
        map_srs: &Srs,
        projectors: &Projectors,
    ) -> Result<Self, ProjectionError> {
        let polygons = match &options.shape {
            MaskShape::Polygons(polygons) => {
                let projector = projectors.get(&options.srs, map_srs)?;
                if projector.is_identity() {
                    polygons.clone()
                } else {
                    let projector = projector.as_ref();
                    polygons.try_map_coords(|c| {
                        projector.forward((c.x, c.y)).map(|(x, y)| Coord { x, y })
                    })?
                }
            }
            MaskShape::Auto => rasters
                .iter()
                .map(|d| footprint(&d.extent(), map_srs, projectors))
                .collect::<Result<Vec<_>, _>>()?
                .into(),
        };

        debug!(
            polygons = polygons.0.len(),
            strategy = %options.strategy,
            map_srs = %map_srs,
            "Built clip mask"
        );
        Ok(Self::new(polygons, map_srs.clone(), options.strategy))
    }

    pub fn strategy(&self) -> MaskStrategy {
        self.strategy
    }

    /// Bounding box of the polygons in map units, if there are any.
    pub fn bounds(&self) -> Option<&Extent> {
        self.bounds.as_ref()
    }

    /// True when a map point is clipped away.
    pub fn hides(&self, point: Point) -> bool {
        let inside = self.bounds.as_ref().is_some_and(|b| b.contains_point(point))
            && self.polygons.contains(&geo::Point::new(point.0, point.1));
        match self.strategy {
            MaskStrategy::Outside => !inside,
            MaskStrategy::Inside => inside,
        }
    }

    /// Classify a map-unit box against the mask.
    ///
    /// A box meeting the polygons only along an edge is partial.
    pub fn classify(&self, extent: &Extent) -> MaskCoverage {
        let rect = Rect::new(
            Coord { x: extent.xmin, y: extent.ymin },
            Coord { x: extent.xmax, y: extent.ymax },
        );
        let inside = if !self.polygons.intersects(&rect) {
            Some(false)
        } else if self.polygons.contains(&rect.to_polygon()) {
            Some(true)
        } else {
            None
        };

        match (inside, self.strategy) {
            (None, _) => MaskCoverage::Partial,
            (Some(true), MaskStrategy::Outside) | (Some(false), MaskStrategy::Inside) => {
                MaskCoverage::Visible
            }
            (Some(false), MaskStrategy::Outside) | (Some(true), MaskStrategy::Inside) => {
                MaskCoverage::Hidden
            }
        }
    }
}

/// Outline of `extent` traced into `map_srs`.
fn footprint(
    extent: &Extent,
    map_srs: &Srs,
    projectors: &Projectors,
) -> Result<Polygon<f64>, ProjectionError> {
    let ring = extent
        .boundary(AUTO_MASK_DENSITY)
        .into_iter()
        .map(|p| {
            projectors
                .forward(&extent.srs, map_srs, p)
                .map(|(x, y)| Coord { x, y })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(LineString::new(ring), vec![]))
}
