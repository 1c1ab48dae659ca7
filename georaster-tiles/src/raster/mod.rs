//! Raster sources and the windowed read contract.
//!
//! The engine never touches raster storage directly. It describes a window
//! through a [`WindowRequest`] and a [`RasterSource`] answers with one array
//! of values per band. Sources may do their own reprojected resampling; the
//! request carries the map → raster projector for that purpose.
//!
//! # Example
//!
//! ```ignore
//! let raster = MemoryRaster::new(descriptor, bands)?;
//! let sampled = raster.read(&request).await?;
//! assert_eq!(sampled.band_count(), raster.descriptor().band_count);
//! ```

mod memory;
mod stack;

pub use memory::MemoryRaster;
pub use stack::RasterStack;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::extent::Extent;
use crate::projection::{ProjectionError, Projector, Srs};

/// A boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors reported by raster sources.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    /// The backing store failed to produce data.
    #[error("Raster read failed: {0}")]
    Read(String),

    /// Descriptor values are unusable.
    #[error("Invalid raster descriptor: {0}")]
    InvalidDescriptor(String),

    /// Band arrays do not match the declared shape.
    #[error("Band {band} has {actual} values, expected {expected}")]
    ShapeMismatch {
        band: usize,
        expected: usize,
        actual: usize,
    },

    /// Sources in a stack disagree on geometry.
    #[error("Raster {index} does not match the first raster: {reason}")]
    GeometryMismatch { index: usize, reason: String },

    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

/// How a storage-backed source is accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceType {
    /// Every value is held in memory.
    #[default]
    InMemory,
    /// Values are fetched window by window (cloud-optimised files, services).
    Streamed,
}

/// Photometric interpretation of the bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Photometric {
    #[default]
    Unknown,
    MinIsWhite,
    MinIsBlack,
    Rgb,
    Palette,
    YCbCr,
}

/// Precomputed value range of one band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandStats {
    pub min: f64,
    pub max: f64,
}

/// Resampling used when a sample falls between source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResampleMethod {
    #[default]
    Nearest,
    Bilinear,
}

impl FromStr for ResampleMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nearest" | "near" => Ok(ResampleMethod::Nearest),
            "bilinear" => Ok(ResampleMethod::Bilinear),
            other => Err(format!("unknown resample method '{}'", other)),
        }
    }
}

impl fmt::Display for ResampleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResampleMethod::Nearest => write!(f, "nearest"),
            ResampleMethod::Bilinear => write!(f, "bilinear"),
        }
    }
}

/// Geometry and metadata of a raster.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterDescriptor {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub width: u32,
    pub height: u32,
    pub projection: Srs,
    pub band_count: usize,
    pub no_data_value: Option<f64>,
    pub stats: Option<Vec<BandStats>>,
    pub palette: Option<Vec<[u8; 4]>>,
    pub source_type: SourceType,
    pub photometric: Photometric,
}

impl RasterDescriptor {
    /// Describe a raster covering `extent` with `width × height` pixels.
    ///
    /// Pixel sizes are derived from the extent. Use the `with_*` methods for
    /// the optional metadata.
    pub fn new(
        extent: &Extent,
        width: u32,
        height: u32,
        band_count: usize,
    ) -> Result<Self, SourceError> {
        if width == 0 || height == 0 {
            return Err(SourceError::InvalidDescriptor(format!(
                "raster dimensions must be non-zero, got {}x{}",
                width, height
            )));
        }
        let descriptor = Self {
            xmin: extent.xmin,
            ymin: extent.ymin,
            xmax: extent.xmax,
            ymax: extent.ymax,
            pixel_width: extent.width() / width as f64,
            pixel_height: extent.height() / height as f64,
            width,
            height,
            projection: extent.srs.clone(),
            band_count,
            no_data_value: None,
            stats: None,
            palette: None,
            source_type: SourceType::InMemory,
            photometric: Photometric::Unknown,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn with_no_data(mut self, value: f64) -> Self {
        self.no_data_value = Some(value);
        self
    }

    pub fn with_stats(mut self, stats: Vec<BandStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn with_palette(mut self, palette: Vec<[u8; 4]>) -> Self {
        self.palette = Some(palette);
        self
    }

    pub fn with_source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = source_type;
        self
    }

    pub fn with_photometric(mut self, photometric: Photometric) -> Self {
        self.photometric = photometric;
        self
    }

    /// Check the invariants every descriptor must satisfy.
    pub fn validate(&self) -> Result<(), SourceError> {
        let invalid = |msg: String| Err(SourceError::InvalidDescriptor(msg));

        if !self.extent().is_finite() {
            return invalid(format!("extent {} is not finite", self.extent()));
        }
        if !(self.pixel_width > 0.0 && self.pixel_height > 0.0) {
            return invalid(format!(
                "pixel size must be positive, got {}x{}",
                self.pixel_width, self.pixel_height
            ));
        }
        if self.band_count == 0 {
            return invalid("a raster needs at least one band".to_string());
        }
        if let Some(stats) = &self.stats {
            if stats.len() != self.band_count {
                return invalid(format!(
                    "{} band statistics for {} bands",
                    stats.len(),
                    self.band_count
                ));
            }
        }
        Ok(())
    }

    /// The raster's bounding box in its own system.
    pub fn extent(&self) -> Extent {
        Extent::new(
            self.xmin,
            self.ymin,
            self.xmax,
            self.ymax,
            self.projection.clone(),
        )
    }

    /// True when `value` is the no-data sentinel or NaN.
    pub fn is_no_data(&self, value: f64) -> bool {
        value.is_nan() || self.no_data_value == Some(value)
    }

    /// Value written for samples with no data.
    pub fn fill_value(&self) -> f64 {
        self.no_data_value.unwrap_or(f64::NAN)
    }
}

/// A windowed read: sample `samples_across × samples_down` points evenly
/// spread over `map_extent`.
///
/// `raster_extent` is the same window snapped to the raster lattice in the
/// raster's own system, for sources that read by pixel window.
#[derive(Clone)]
pub struct WindowRequest {
    pub map_extent: Extent,
    pub raster_extent: Extent,
    pub samples_across: usize,
    pub samples_down: usize,
    pub resample: ResampleMethod,
    pub map_to_raster: Arc<dyn Projector>,
}

impl WindowRequest {
    /// Centre of sample `(col, row)` in map units.
    pub fn sample_center(&self, col: usize, row: usize) -> (f64, f64) {
        let e = &self.map_extent;
        let x = e.xmin + (col as f64 + 0.5) * e.width() / self.samples_across as f64;
        let y = e.ymax - (row as f64 + 0.5) * e.height() / self.samples_down as f64;
        (x, y)
    }

    pub fn sample_count(&self) -> usize {
        self.samples_across * self.samples_down
    }
}

impl fmt::Debug for WindowRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowRequest")
            .field("map_extent", &self.map_extent)
            .field("raster_extent", &self.raster_extent)
            .field("samples_across", &self.samples_across)
            .field("samples_down", &self.samples_down)
            .field("resample", &self.resample)
            .finish()
    }
}

/// Values returned by a read, row-major per band.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledBands {
    pub width: usize,
    pub height: usize,
    pub bands: Vec<Vec<f64>>,
}

impl SampledBands {
    /// Wrap band arrays, checking each has `width * height` values.
    pub fn new(width: usize, height: usize, bands: Vec<Vec<f64>>) -> Result<Self, SourceError> {
        let expected = width * height;
        if let Some((band, values)) = bands.iter().enumerate().find(|(_, b)| b.len() != expected) {
            return Err(SourceError::ShapeMismatch {
                band,
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            width,
            height,
            bands,
        })
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// Value of `band` at `(col, row)`.
    pub fn get(&self, band: usize, col: usize, row: usize) -> Option<f64> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.bands.get(band).map(|b| b[row * self.width + col])
    }

    /// Fill `out` with every band's value at `(col, row)`.
    ///
    /// Positions outside the window read as NaN.
    pub fn pixel_into(&self, col: usize, row: usize, out: &mut Vec<f64>) {
        out.clear();
        out.extend((0..self.band_count()).map(|band| self.get(band, col, row).unwrap_or(f64::NAN)));
    }
}

/// A capability producing band values for a window.
pub trait RasterSource: Send + Sync {
    /// Geometry and metadata, fixed for the source's lifetime.
    fn descriptor(&self) -> &RasterDescriptor;

    /// Read one window.
    fn read<'a>(&'a self, request: &'a WindowRequest)
        -> BoxFuture<'a, Result<SampledBands, SourceError>>;
}
