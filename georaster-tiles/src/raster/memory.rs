//! In-memory raster source.

use image::DynamicImage;
use tracing::trace;

use super::{
    BoxFuture, Photometric, RasterDescriptor, RasterSource, ResampleMethod, SampledBands,
    SourceError, WindowRequest,
};
use crate::extent::Extent;

/// A raster whose band values are all held in memory, row-major.
///
/// Reads sample the window in map space and carry each sample back into the
/// raster's system through the request's projector, so reprojection happens
/// per sample.
#[derive(Debug, Clone)]
pub struct MemoryRaster {
    descriptor: RasterDescriptor,
    bands: Vec<Vec<f64>>,
}

impl MemoryRaster {
    /// Wrap band arrays.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` when any band does not hold `width * height` values,
    /// or `InvalidDescriptor` when the band count disagrees with the
    /// descriptor.
    pub fn new(descriptor: RasterDescriptor, bands: Vec<Vec<f64>>) -> Result<Self, SourceError> {
        descriptor.validate()?;
        if bands.len() != descriptor.band_count {
            return Err(SourceError::InvalidDescriptor(format!(
                "descriptor declares {} bands but {} were supplied",
                descriptor.band_count,
                bands.len()
            )));
        }
        SampledBands::new(
            descriptor.width as usize,
            descriptor.height as usize,
            bands,
        )
        .map(|sampled| Self {
            descriptor,
            bands: sampled.bands,
        })
    }

    /// Build a raster from a decoded image covering `extent`.
    ///
    /// Luma images become one band (two with alpha), colour images three or
    /// four. The photometric interpretation is set to match.
    pub fn from_image(image: &DynamicImage, extent: &Extent) -> Result<Self, SourceError> {
        let (width, height) = (image.width(), image.height());
        let channels = image.color().channel_count() as usize;

        let (bands, photometric) = match channels {
            1 | 2 => (
                split_channels(image.to_luma_alpha8().as_raw(), 2, channels),
                Photometric::MinIsBlack,
            ),
            3 => (split_channels(image.to_rgb8().as_raw(), 3, 3), Photometric::Rgb),
            _ => (split_channels(image.to_rgba8().as_raw(), 4, 4), Photometric::Rgb),
        };

        let descriptor = RasterDescriptor::new(extent, width, height, bands.len())?
            .with_photometric(photometric);
        Self::new(descriptor, bands)
    }

    pub fn bands(&self) -> &[Vec<f64>] {
        &self.bands
    }

    fn value(&self, band: usize, col: i64, row: i64) -> Option<f64> {
        let d = &self.descriptor;
        if col < 0 || row < 0 || col >= d.width as i64 || row >= d.height as i64 {
            return None;
        }
        Some(self.bands[band][row as usize * d.width as usize + col as usize])
    }

    fn sample_nearest(&self, band: usize, fx: f64, fy: f64) -> f64 {
        self.value(band, fx.floor() as i64, fy.floor() as i64)
            .unwrap_or_else(|| self.descriptor.fill_value())
    }

    fn sample_bilinear(&self, band: usize, fx: f64, fy: f64) -> f64 {
        let (gx, gy) = (fx - 0.5, fy - 0.5);
        let (c0, r0) = (gx.floor() as i64, gy.floor() as i64);
        let (tx, ty) = (gx - c0 as f64, gy - r0 as f64);

        let neighbours = [
            self.value(band, c0, r0),
            self.value(band, c0 + 1, r0),
            self.value(band, c0, r0 + 1),
            self.value(band, c0 + 1, r0 + 1),
        ];
        match neighbours {
            [Some(a), Some(b), Some(c), Some(d)]
                if ![a, b, c, d].iter().any(|v| self.descriptor.is_no_data(*v)) =>
            {
                let top = a + (b - a) * tx;
                let bottom = c + (d - c) * tx;
                top + (bottom - top) * ty
            }
            // At the edges or next to no-data, fall back to the covering pixel.
            _ => self.sample_nearest(band, fx, fy),
        }
    }
}

/// Deinterleave the first `keep` channels of a `stride`-channel buffer.
fn split_channels(raw: &[u8], stride: usize, keep: usize) -> Vec<Vec<f64>> {
    (0..keep)
        .map(|c| raw.iter().skip(c).step_by(stride).map(|&v| v as f64).collect())
        .collect()
}

impl RasterSource for MemoryRaster {
    fn descriptor(&self) -> &RasterDescriptor {
        &self.descriptor
    }

    fn read<'a>(
        &'a self,
        request: &'a WindowRequest,
    ) -> BoxFuture<'a, Result<SampledBands, SourceError>> {
        Box::pin(async move {
            let d = &self.descriptor;
            let (across, down) = (request.samples_across, request.samples_down);
            let mut bands = vec![Vec::with_capacity(across * down); d.band_count];

            for row in 0..down {
                for col in 0..across {
                    let center = request.sample_center(col, row);
                    let lattice = request
                        .map_to_raster
                        .forward(center)
                        .ok()
                        .filter(|(x, y)| x.is_finite() && y.is_finite())
                        .map(|(x, y)| {
                            ((x - d.xmin) / d.pixel_width, (d.ymax - y) / d.pixel_height)
                        });

                    for (band, out) in bands.iter_mut().enumerate() {
                        let value = match lattice {
                            None => d.fill_value(),
                            Some((fx, fy)) => match request.resample {
                                ResampleMethod::Nearest => self.sample_nearest(band, fx, fy),
                                ResampleMethod::Bilinear => self.sample_bilinear(band, fx, fy),
                            },
                        };
                        out.push(value);
                    }
                }
            }

            trace!(
                samples_across = across,
                samples_down = down,
                bands = d.band_count,
                "Sampled in-memory raster"
            );
            SampledBands::new(across, down, bands)
        })
    }
}
