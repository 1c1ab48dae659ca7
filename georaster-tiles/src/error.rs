//! Error types shared across the crate.

use thiserror::Error;

use crate::config::ConfigError;
use crate::coord::CoordError;
use crate::projection::ProjectionError;
use crate::raster::SourceError;

/// Failure of a caller-supplied colour or draw callback.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CallbackError {
    /// The callback reported an error.
    #[error("Callback failed: {0}")]
    Failed(String),

    /// The callback panicked.
    #[error("Callback panicked: {0}")]
    Panicked(String),
}

impl CallbackError {
    pub fn failed(message: impl Into<String>) -> Self {
        CallbackError::Failed(message.into())
    }
}

/// Errors that prevent a layer from being built.
#[derive(Debug, Error)]
pub enum LayerError {
    /// The combination of options and sources cannot render.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<SourceError> for LayerError {
    fn from(e: SourceError) -> Self {
        LayerError::Configuration(e.to_string())
    }
}

/// Errors that fail a single tile. Other tiles are unaffected.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TileError {
    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error(transparent)]
    Coord(#[from] CoordError),

    #[error("Source read failed: {0}")]
    SourceRead(#[from] SourceError),

    #[error(transparent)]
    Callback(#[from] CallbackError),

    /// The per-zoom resolution table has no entry at or below the zoom.
    #[error("No resolution defined for zoom {zoom}")]
    ResolutionUndefined { zoom: u8 },

    /// The runtime dropped the tile's task before it finished.
    #[error("Tile task aborted: {0}")]
    Aborted(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_error_display() {
        let err = TileError::ResolutionUndefined { zoom: 3 };
        assert_eq!(err.to_string(), "No resolution defined for zoom 3");

        let err: TileError = ProjectionError::MissingProjectionDefinition { code: 2154 }.into();
        assert_eq!(err.to_string(), "Missing projection definition for EPSG:2154");
    }

    #[test]
    fn test_source_error_becomes_configuration() {
        let err: LayerError = SourceError::GeometryMismatch {
            index: 1,
            reason: "extent differs".to_string(),
        }
        .into();
        assert!(matches!(err, LayerError::Configuration(ref m) if m.contains("extent differs")));
    }
}
