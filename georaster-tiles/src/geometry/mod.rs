//! Per-tile sampling geometry.
//!
//! Resolution runs synchronously and decides, before any data is read, where
//! a tile's pixels land on screen and which raster window backs them.

mod resolver;
mod skew;
mod snap;

pub use resolver::{
    Margins, SkipReason, TileGeometry, TileGeometryResolver, TileGeometryResult, TilePlacement,
    DENSE_EDGE_POINTS,
};
pub use skew::{measure_skew, Skew};
pub use snap::{snap, Lattice, SampleBudget, SnappedWindow, CONTAINER_TOLERANCE, LATTICE_EPSILON};
