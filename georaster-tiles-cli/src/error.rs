//! CLI error types.

use std::path::PathBuf;

use georaster_tiles::config::ConfigError;
use georaster_tiles::projection::ProjectionError;
use georaster_tiles::raster::SourceError;
use georaster_tiles::{LayerError, TileError};
use thiserror::Error;

/// Errors surfaced to the command line.
#[derive(Debug, Error)]
pub enum CliError {
    /// Bad or inconsistent arguments.
    #[error("Invalid arguments: {0}")]
    Args(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to open image {}: {source}", path.display())]
    ImageOpen {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to write tile {}: {source}", path.display())]
    ImageSave {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("Invalid raster: {0}")]
    Source(#[from] SourceError),

    #[error(transparent)]
    Layer(#[from] LayerError),

    #[error("Tile failed: {0}")]
    Tile(#[from] TileError),

    #[error("Failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
}
