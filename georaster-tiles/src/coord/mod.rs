//! Tile coordinates and host map coordinate systems.
//!
//! A map CRS turns an XYZ tile coordinate into an extent in its own units.
//! The built-in systems follow the usual slippy-map conventions:
//!
//! - **Web Mercator**: one tile spans the world square at zoom 0
//! - **Geographic**: two tiles span -180..180 at zoom 0, one tile spans the
//!   latitude range
//! - **Simple**: one map unit is one screen pixel at zoom 0, and y grows
//!   upward so rows above the origin are negative
//! - **Custom**: an origin plus a resolution (map units per pixel) per zoom

use std::f64::consts::PI;
use std::fmt;

use thiserror::Error;

use crate::extent::Extent;
use crate::projection::{Srs, EARTH_RADIUS};

/// Maximum supported zoom level.
pub const MAX_ZOOM: u8 = 30;

/// Errors from tile coordinate arithmetic.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoordError {
    /// Zoom beyond what the map CRS defines.
    #[error("Zoom level {zoom} is not defined for map CRS {crs}")]
    ZoomOutOfRange { zoom: u8, crs: String },
}

/// An XYZ tile address.
///
/// `x` and `y` are signed: hosts emit columns outside the world while panning
/// across the antimeridian, and simple maps place content at negative rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub x: i64,
    pub y: i64,
    pub z: u8,
}

impl TileCoord {
    pub fn new(x: i64, y: i64, z: u8) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// The host map's coordinate system.
#[derive(Debug, Clone, PartialEq)]
pub enum MapCrs {
    WebMercator,
    Geographic,
    Simple,
    Custom {
        srs: Srs,
        /// Top-left corner of tile (0, 0) in map units.
        origin: (f64, f64),
        /// Map units per pixel, indexed by zoom.
        resolutions: Vec<f64>,
    },
}

impl MapCrs {
    /// The spatial reference system map extents are expressed in.
    pub fn srs(&self) -> Srs {
        match self {
            MapCrs::WebMercator => Srs::WEB_MERCATOR,
            MapCrs::Geographic => Srs::WGS84,
            MapCrs::Simple => Srs::Simple,
            MapCrs::Custom { srs, .. } => srs.clone(),
        }
    }

    /// True for systems whose x axis repeats every world width.
    pub fn wraps(&self) -> bool {
        matches!(self, MapCrs::WebMercator | MapCrs::Geographic)
    }

    pub fn is_simple(&self) -> bool {
        matches!(self, MapCrs::Simple)
    }

    /// Width of one world in map units, for wrapping systems.
    pub fn world_width(&self) -> Option<f64> {
        match self {
            MapCrs::WebMercator => Some(2.0 * PI * EARTH_RADIUS),
            MapCrs::Geographic => Some(360.0),
            _ => None,
        }
    }

    /// Number of tile columns spanning one world at `z`.
    pub fn tiles_across(&self, z: u8) -> Option<i64> {
        match self {
            MapCrs::WebMercator => Some(1_i64 << z.min(MAX_ZOOM)),
            MapCrs::Geographic => Some(2_i64 << z.min(MAX_ZOOM)),
            _ => None,
        }
    }

    /// Number of tile rows spanning the world at `z`.
    pub fn tiles_down(&self, z: u8) -> Option<i64> {
        match self {
            MapCrs::WebMercator | MapCrs::Geographic => Some(1_i64 << z.min(MAX_ZOOM)),
            _ => None,
        }
    }

    /// Bring a column back into `[0, tiles_across)` for wrapping systems.
    pub fn wrap(&self, coord: TileCoord) -> TileCoord {
        match self.tiles_across(coord.z) {
            Some(n) => TileCoord {
                x: coord.x.rem_euclid(n),
                ..coord
            },
            None => coord,
        }
    }

    /// Extent of a tile in map units.
    ///
    /// # Arguments
    ///
    /// * `coord` - Tile address
    /// * `tile_size` - Tile edge length in screen pixels
    pub fn tile_extent(&self, coord: TileCoord, tile_size: u32) -> Result<Extent, CoordError> {
        if coord.z > MAX_ZOOM {
            return Err(self.zoom_error(coord.z));
        }
        let n = (1_u64 << coord.z) as f64;
        let (x0, y0) = (coord.x as f64, coord.y as f64);
        let (x1, y1) = (x0 + 1.0, y0 + 1.0);

        let extent = match self {
            MapCrs::WebMercator => {
                let world = 2.0 * PI * EARTH_RADIUS;
                Extent::new(
                    (x0 / n - 0.5) * world,
                    (0.5 - y1 / n) * world,
                    (x1 / n - 0.5) * world,
                    (0.5 - y0 / n) * world,
                    self.srs(),
                )
            }
            MapCrs::Geographic => Extent::new(
                (x0 / n - 1.0) * 180.0,
                (0.5 - y1 / n) * 180.0,
                (x1 / n - 1.0) * 180.0,
                (0.5 - y0 / n) * 180.0,
                self.srs(),
            ),
            MapCrs::Simple => {
                let size = tile_size as f64 / n;
                Extent::new(x0 * size, -y1 * size, x1 * size, -y0 * size, Srs::Simple)
            }
            MapCrs::Custom {
                srs,
                origin,
                resolutions,
            } => {
                let resolution = resolutions
                    .get(coord.z as usize)
                    .copied()
                    .ok_or_else(|| self.zoom_error(coord.z))?;
                let size = tile_size as f64 * resolution;
                Extent::new(
                    origin.0 + x0 * size,
                    origin.1 - y1 * size,
                    origin.0 + x1 * size,
                    origin.1 - y0 * size,
                    srs.clone(),
                )
            }
        };
        Ok(extent)
    }

    fn zoom_error(&self, zoom: u8) -> CoordError {
        CoordError::ZoomOutOfRange {
            zoom,
            crs: self.to_string(),
        }
    }
}

impl fmt::Display for MapCrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapCrs::WebMercator => write!(f, "web-mercator"),
            MapCrs::Geographic => write!(f, "geographic"),
            MapCrs::Simple => write!(f, "simple"),
            MapCrs::Custom { srs, .. } => write!(f, "custom({})", srs),
        }
    }
}
