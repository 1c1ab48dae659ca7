//! georaster-tiles - Georeferenced rasters rendered as map tiles
//!
//! This library resamples raster values into the windows of map tiles,
//! reprojecting on the fly. For each tile it works out how much of the tile
//! the raster covers, how many samples to take, snaps the sampling window to
//! the raster's pixel grid so neighbouring tiles meet without seams, reads the
//! window from a [`raster::RasterSource`] and colours the result.
//!
//! The entry point is [`layer::Layer`], built with [`layer::LayerBuilder`].

pub mod cache;
pub mod color;
pub mod config;
pub mod coord;
pub mod error;
pub mod extent;
pub mod geometry;
pub mod layer;
pub mod mask;
pub mod projection;
pub mod raster;
pub mod render;
pub mod stats;

pub use color::{ColorStrategy, CustomDrawFn, DrawContext, PixelColorFn};
pub use config::{LayerConfig, ResolutionSetting};
pub use coord::{MapCrs, TileCoord};
pub use error::{CallbackError, LayerError, TileError};
pub use extent::Extent;
pub use geometry::{TileGeometry, TileGeometryResult, TilePlacement};
pub use layer::{Layer, LayerBuilder, RecomputeRequest, TileOutcome};
pub use mask::{ClipMask, MaskOptions, MaskStrategy};
pub use projection::Srs;
pub use raster::{MemoryRaster, RasterDescriptor, RasterSource, SampledBands, WindowRequest};
pub use render::RenderedTile;
