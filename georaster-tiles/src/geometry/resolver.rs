//! Tile geometry resolution.
//!
//! Turns a tile address into everything the sampler and the host need:
//!
//! 1. The tile extent in map units
//! 2. The portion of it covered by raster data (the inner extent)
//! 3. That portion snapped outward to whole raster pixels
//! 4. Screen-pixel margins placing the snapped window inside the tile
//! 5. Sample counts bounded by the resolution and the raster's own density

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace, warn};

use super::skew::{measure_skew, Skew};
use super::snap::{snap, Lattice, SampleBudget};
use crate::coord::{MapCrs, TileCoord};
use crate::error::TileError;
use crate::extent::Extent;
use crate::projection::{AffineProjector, ProjectionError, Projector, Projectors, Srs};
use crate::raster::RasterDescriptor;

/// Points sampled along each edge when reprojecting raster footprints.
pub const DENSE_EDGE_POINTS: usize = 100;

/// Screen-pixel offsets of the drawn window from the tile edges.
///
/// Negative values mean the window reaches past the tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Margins {
    pub left: i64,
    pub right: i64,
    pub top: i64,
    pub bottom: i64,
}

impl Margins {
    fn max_magnitude(&self) -> i64 {
        self.left
            .abs()
            .max(self.right.abs())
            .max(self.top.abs())
            .max(self.bottom.abs())
    }
}

/// Where a tile's pixels go on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePlacement {
    pub tile_size: u32,
    pub margins: Margins,
    pub inner_width: u32,
    pub inner_height: u32,
}

/// Why a tile needs no sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The tile does not touch any raster.
    NoOverlap,
    /// Cropping the tile by the layer extent left nothing.
    EmptyCrop,
    /// A projection produced non-finite coordinates.
    NonFiniteGeometry,
    /// The crop covers no whole raster cell.
    EmptyWindow,
    /// Margins leave no visible pixels.
    ZeroSize,
    /// The layer's clip mask hides the whole sample window.
    Masked,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::NoOverlap => "tile does not overlap the raster",
            SkipReason::EmptyCrop => "crop by layer extent is empty",
            SkipReason::NonFiniteGeometry => "geometry is not finite",
            SkipReason::EmptyWindow => "no raster cells in window",
            SkipReason::ZeroSize => "inner tile has zero size",
            SkipReason::Masked => "tile is clipped by the mask",
        };
        f.write_str(text)
    }
}

/// Resolved geometry of a tile that has data to sample.
#[derive(Debug, Clone)]
pub struct TileGeometry {
    /// Address as requested.
    pub coord: TileCoord,
    pub resolution: u32,
    /// Tile extent in map units, shifted by a world width when the raster
    /// was found across the antimeridian.
    pub tile_extent: Extent,
    /// Tile ∩ layer extent in map units.
    pub inner_extent: Extent,
    /// Window sampled, in map units.
    pub sample_extent: Extent,
    /// Window sampled, in the raster's system.
    pub raster_extent: Extent,
    pub samples_across: usize,
    pub samples_down: usize,
    pub placement: TilePlacement,
    pub skew: Skew,
    /// False when snapping was rejected and the inner extent used as is.
    pub snapped: bool,
    /// True when the sample budget reduced the snapped counts.
    pub clamped: bool,
}

/// Outcome of resolving a tile.
#[derive(Debug, Clone)]
pub enum TileGeometryResult {
    Render(TileGeometry),
    Skip(SkipReason),
}

impl TileGeometryResult {
    pub fn geometry(&self) -> Option<&TileGeometry> {
        match self {
            TileGeometryResult::Render(g) => Some(g),
            TileGeometryResult::Skip(_) => None,
        }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            TileGeometryResult::Render(_) => None,
            TileGeometryResult::Skip(reason) => Some(*reason),
        }
    }

    pub fn placement(&self) -> Option<TilePlacement> {
        self.geometry().map(|g| g.placement)
    }
}

/// Raster footprints in one system.
#[derive(Debug)]
struct Footprints {
    merged: Extent,
    parts: Vec<Extent>,
}

/// Resolves tile geometry for one layer.
///
/// Holds the layer's long-lived geometry state: the raster lattice, the
/// footprints of every source, and a per-system memo of those footprints.
pub struct TileGeometryResolver {
    map_crs: MapCrs,
    tile_size: u32,
    wrap: bool,
    raster: RasterDescriptor,
    source_extents: Vec<Extent>,
    simple_extent: Extent,
    projectors: Arc<Projectors>,
    footprints: DashMap<Srs, Arc<Footprints>>,
}

impl TileGeometryResolver {
    /// # Arguments
    ///
    /// * `map_crs` - Host map system
    /// * `tile_size` - Tile edge in screen pixels
    /// * `wrap` - Normalise columns and look across the antimeridian
    /// * `raster` - Shared geometry of the sources
    /// * `source_extents` - Every source's own extent
    /// * `simple_extent` - Footprint used on simple maps
    /// * `projectors` - Layer projector cache
    pub fn new(
        map_crs: MapCrs,
        tile_size: u32,
        wrap: bool,
        raster: RasterDescriptor,
        source_extents: Vec<Extent>,
        simple_extent: Extent,
        projectors: Arc<Projectors>,
    ) -> Self {
        Self {
            map_crs,
            tile_size,
            wrap,
            raster,
            source_extents,
            simple_extent,
            projectors,
            footprints: DashMap::new(),
        }
    }

    pub fn map_crs(&self) -> &MapCrs {
        &self.map_crs
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn raster(&self) -> &RasterDescriptor {
        &self.raster
    }

    pub fn projectors(&self) -> &Arc<Projectors> {
        &self.projectors
    }

    /// Combined raster extent in `srs`, memoised per system.
    pub fn extent_in(&self, srs: &Srs) -> Result<Extent, ProjectionError> {
        Ok(self.footprints_in(srs)?.merged.clone())
    }

    fn footprints_in(&self, srs: &Srs) -> Result<Arc<Footprints>, ProjectionError> {
        if let Some(found) = self.footprints.get(srs) {
            return Ok(Arc::clone(found.value()));
        }

        let parts = if srs.is_simple() {
            vec![self.simple_extent.clone()]
        } else {
            self.source_extents
                .iter()
                .map(|e| e.reproject_dense(srs, &self.projectors, DENSE_EDGE_POINTS))
                .collect::<Result<Vec<_>, _>>()?
        };
        let merged = Extent::merge(&parts).unwrap_or_else(|| self.simple_extent.clone());
        debug!(srs = %srs, extent = %merged, "Computed layer extent");

        let footprints = Arc::new(Footprints { merged, parts });
        self.footprints.insert(srs.clone(), Arc::clone(&footprints));
        Ok(footprints)
    }

    /// Projector carrying map coordinates into the raster's system.
    pub fn map_to_raster(&self) -> Result<Arc<dyn Projector>, ProjectionError> {
        if self.map_crs.is_simple() {
            let s = &self.simple_extent;
            let r = &self.raster;
            return Ok(Arc::new(AffineProjector::between(
                [s.xmin, s.ymin, s.xmax, s.ymax],
                [r.xmin, r.ymin, r.xmax, r.ymax],
            )));
        }
        self.projectors.get(&self.map_crs.srs(), &self.raster.projection)
    }

    /// True when the tile could show raster data.
    ///
    /// Rows outside the world are rejected for wrapping systems, and columns
    /// are also tried one world to either side.
    pub fn is_valid_tile(&self, coord: TileCoord) -> bool {
        let crs = &self.map_crs;
        let Ok(footprints) = self.footprints_in(&crs.srs()) else {
            return false;
        };
        let covers = |c: TileCoord| {
            crs.tile_extent(c, self.tile_size)
                .map(|t| footprints.parts.iter().any(|p| t.overlaps(p, false)))
                .unwrap_or(false)
        };

        if crs.is_simple() {
            return covers(coord);
        }
        if let Some(rows) = crs.tiles_down(coord.z) {
            if coord.y < 0 || coord.y >= rows {
                return false;
            }
        }
        match crs.tiles_across(coord.z) {
            Some(n) if self.wrap => [0, -n, n]
                .into_iter()
                .any(|dx| covers(TileCoord::new(coord.x + dx, coord.y, coord.z))),
            _ => covers(coord),
        }
    }

    /// Resolve the geometry of one tile.
    ///
    /// # Errors
    ///
    /// Projection resolution failures and zooms the map system does not
    /// define. Tiles with nothing to draw are `Ok(Skip(..))`.
    pub fn resolve(
        &self,
        coord: TileCoord,
        resolution: u32,
    ) -> Result<TileGeometryResult, TileError> {
        let skip = |reason: SkipReason| {
            debug!(tile = %coord, reason = %reason, "Skipping tile");
            Ok(TileGeometryResult::Skip(reason))
        };

        let addressed = if self.wrap {
            self.map_crs.wrap(coord)
        } else {
            coord
        };
        let map_srs = self.map_crs.srs();
        let simple = self.map_crs.is_simple();
        let tile = self.map_crs.tile_extent(addressed, self.tile_size)?;
        let footprints = self.footprints_in(&map_srs)?;

        let Some(tile) = self.overlapping_frame(&tile, &footprints) else {
            return skip(SkipReason::NoOverlap);
        };
        let Some(inner) = tile.crop(&footprints.merged) else {
            return skip(SkipReason::EmptyCrop);
        };

        let raster_srs = if simple {
            Srs::Simple
        } else {
            self.raster.projection.clone()
        };
        let inner_raster = inner.reproject(&raster_srs, &self.projectors)?;
        if !inner_raster.is_finite() {
            return skip(SkipReason::NonFiniteGeometry);
        }

        let skew = if simple || raster_srs == map_srs {
            Skew::NONE
        } else {
            let forward = self.projectors.get(&raster_srs, &map_srs)?;
            measure_skew(&self.raster.extent(), forward.as_ref())?
        };

        let budget = SampleBudget::for_tile(self.tile_size, resolution);
        let Some(window) = snap(&inner_raster, &self.lattice(simple), budget) else {
            return skip(SkipReason::EmptyWindow);
        };
        trace!(
            tile = %coord,
            col = window.col,
            row = window.row,
            cols = window.cols,
            rows = window.rows,
            "Snapped window"
        );

        let snapped_map = if raster_srs == map_srs {
            Extent {
                srs: map_srs.clone(),
                ..window.extent.clone()
            }
        } else {
            carry_back(&inner, &inner_raster, &window.extent)
        };

        let tile_px = self.tile_size as f64;
        let (px_w, px_h) = (tile.width() / tile_px, tile.height() / tile_px);
        let limit = 2 * self.tile_size as i64;

        let snapped_margins = snapped_map
            .is_finite()
            .then(|| margins_of(&tile, &snapped_map, px_w, px_h))
            .filter(|m| m.max_magnitude() <= limit);

        let (sample_extent, raster_window, margins, snapped) = match snapped_margins {
            Some(m) => (snapped_map, window.extent.clone(), m, true),
            None => {
                warn!(tile = %coord, "Snapped window implausible, sampling unsnapped extent");
                let m = margins_of(&tile, &inner, px_w, px_h);
                (inner.clone(), inner_raster.clone(), m, false)
            }
        };

        let inner_width = self.tile_size as i64 - margins.left - margins.right;
        let inner_height = self.tile_size as i64 - margins.top - margins.bottom;
        if inner_width <= 0 || inner_height <= 0 {
            return skip(SkipReason::ZeroSize);
        }

        // Never more samples than the window has raster cells, snapped or not.
        let samples_across = ((resolution as f64 * inner.width() / tile.width()).ceil() as usize)
            .min(window.cols)
            .max(1);
        let samples_down = ((resolution as f64 * inner.height() / tile.height()).ceil() as usize)
            .min(window.rows)
            .max(1);

        let raster_extent = if simple {
            self.pixel_plane_to_raster(&raster_window)?
        } else {
            raster_window
        };

        debug!(
            tile = %coord,
            samples_across,
            samples_down,
            left = margins.left,
            top = margins.top,
            snapped,
            "Resolved tile geometry"
        );

        Ok(TileGeometryResult::Render(TileGeometry {
            coord,
            resolution,
            tile_extent: tile,
            inner_extent: inner,
            sample_extent,
            raster_extent,
            samples_across,
            samples_down,
            placement: TilePlacement {
                tile_size: self.tile_size,
                margins,
                inner_width: inner_width as u32,
                inner_height: inner_height as u32,
            },
            skew,
            snapped,
            clamped: snapped && window.clamped,
        }))
    }

    /// The tile itself, or a copy one world away, whichever meets a raster.
    fn overlapping_frame(&self, tile: &Extent, footprints: &Footprints) -> Option<Extent> {
        let hits = |t: &Extent| footprints.parts.iter().any(|p| t.overlaps(p, false));
        if hits(tile) {
            return Some(tile.clone());
        }
        let width = self.map_crs.world_width().filter(|_| self.wrap)?;
        [-width, width]
            .into_iter()
            .map(|dx| tile.shifted(dx, 0.0))
            .find(|t| hits(t))
    }

    fn lattice(&self, simple: bool) -> Lattice {
        if !simple {
            return Lattice::of_raster(&self.raster);
        }
        let s = &self.simple_extent;
        Lattice {
            origin_x: s.xmin,
            origin_y: s.ymax,
            pixel_width: s.width() / self.raster.width as f64,
            pixel_height: s.height() / self.raster.height as f64,
            container: s.clone(),
        }
    }

    fn pixel_plane_to_raster(&self, extent: &Extent) -> Result<Extent, ProjectionError> {
        let affine = self.map_to_raster()?;
        let (x0, y0) = affine.forward((extent.xmin, extent.ymin))?;
        let (x1, y1) = affine.forward((extent.xmax, extent.ymax))?;
        Ok(Extent::new(x0, y0, x1, y1, self.raster.projection.clone()))
    }
}

/// Carry the snapping growth back into map units by scaling, rather than
/// reprojecting the snapped box.
fn carry_back(inner_map: &Extent, inner_raster: &Extent, snapped: &Extent) -> Extent {
    let sx = inner_map.width() / inner_raster.width();
    let sy = inner_map.height() / inner_raster.height();
    Extent::new(
        inner_map.xmin - (inner_raster.xmin - snapped.xmin) * sx,
        inner_map.ymin - (inner_raster.ymin - snapped.ymin) * sy,
        inner_map.xmax + (snapped.xmax - inner_raster.xmax) * sx,
        inner_map.ymax + (snapped.ymax - inner_raster.ymax) * sy,
        inner_map.srs.clone(),
    )
}

/// Round to nearest screen pixel; float residue around integers vanishes.
fn margins_of(tile: &Extent, window: &Extent, px_w: f64, px_h: f64) -> Margins {
    let px = |delta: f64, size: f64| (delta / size).round() as i64;
    Margins {
        left: px(window.xmin - tile.xmin, px_w),
        right: px(tile.xmax - window.xmax, px_w),
        top: px(tile.ymax - window.ymax, px_h),
        bottom: px(window.ymin - tile.ymin, px_h),
    }
}
