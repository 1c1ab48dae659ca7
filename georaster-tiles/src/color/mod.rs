//! Band values to colours.
//!
//! A layer picks one [`ColorStrategy`] when it is built and applies it to
//! every sample of every tile. [`ColorStrategy::select`] chooses the built-in
//! strategy from the raster's metadata in this order:
//!
//! 1. A custom draw callback
//! 2. A custom colour callback
//! 3. The palette of a single paletted raster
//! 4. A running-stats stretch for one to three streamed single-band rasters
//! 5. YCbCr conversion of a single three-band YCbCr raster
//! 6. A stretch against precomputed band statistics
//! 7. Raw RGB(A) for three or four bands
//! 8. A running-stats stretch for anything else with one to three bands

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use image::{Rgba, RgbaImage};

use crate::error::{CallbackError, LayerError};
use crate::raster::{BandStats, Photometric, RasterDescriptor, SampledBands, SourceType};
use crate::stats::RunningStats;

/// Maps one sample's band values to a colour. `None` leaves the pixel clear.
pub type PixelColorFn =
    Arc<dyn Fn(&[f64]) -> Result<Option<Rgba<u8>>, CallbackError> + Send + Sync>;

/// Draws one sample directly, bypassing colour mapping.
pub type CustomDrawFn = Arc<dyn Fn(DrawContext<'_>) -> Result<(), CallbackError> + Send + Sync>;

/// Destination of one sample in the tile image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Everything a custom draw callback sees for one sample.
pub struct DrawContext<'a> {
    pub image: &'a mut RgbaImage,
    pub rect: PixelRect,
    /// Sample column and row.
    pub sample: (usize, usize),
    pub values: &'a [f64],
    /// The whole tile's samples.
    pub sampled: &'a SampledBands,
}

/// Where a stretch gets its value ranges.
#[derive(Debug, Clone, PartialEq)]
pub enum StretchRanges {
    Precomputed(Vec<BandStats>),
    /// The layer's running statistics.
    Running,
}

/// Linear per-band contrast stretch onto 0..=255.
#[derive(Debug, Clone, PartialEq)]
pub struct Stretch {
    pub ranges: StretchRanges,
    /// Invert so the minimum is white.
    pub flip: bool,
}

impl Stretch {
    /// Stretch `value` against `range`. A zero range maps to the low end.
    pub fn apply(&self, value: f64, range: &BandStats) -> u8 {
        let span = range.max - range.min;
        let scaled = if span > 0.0 {
            ((value - range.min) / span * 255.0).clamp(0.0, 255.0)
        } else {
            0.0
        };
        let level = scaled.round() as u8;
        if self.flip {
            255 - level
        } else {
            level
        }
    }
}

/// How sampled values become pixels.
#[derive(Clone)]
pub enum ColorStrategy {
    /// Band 0 indexes a colour table.
    Palette(Arc<Vec<[u8; 4]>>),
    /// One band stretched to grey.
    Grayscale(Stretch),
    /// Two or three bands stretched into red, green and blue.
    MultiBandRgb(Stretch),
    /// Bands are already 8-bit red, green, blue and optional alpha.
    Rgb,
    /// Three 8-bit bands of luma and chroma.
    YCbCr,
    Custom(PixelColorFn),
    CustomDraw(CustomDrawFn),
}

impl ColorStrategy {
    /// Choose the strategy for a set of rasters.
    ///
    /// # Arguments
    ///
    /// * `rasters` - Descriptor of every source, in band order
    /// * `combined` - The flattened descriptor of all sources
    /// * `color_fn` - Caller colour callback
    /// * `custom_draw` - Caller draw callback
    /// * `flip` - Stretch inversion override
    ///
    /// # Errors
    ///
    /// `LayerError::Configuration` when four or more rasters, or more than
    /// four bands, are given without a callback.
    pub fn select(
        rasters: &[RasterDescriptor],
        combined: &RasterDescriptor,
        color_fn: Option<PixelColorFn>,
        custom_draw: Option<CustomDrawFn>,
        flip: Option<bool>,
    ) -> Result<Self, LayerError> {
        if let Some(draw) = custom_draw {
            return Ok(ColorStrategy::CustomDraw(draw));
        }
        if let Some(f) = color_fn {
            return Ok(ColorStrategy::Custom(f));
        }
        if rasters.len() == 1 {
            if let Some(palette) = &rasters[0].palette {
                return Ok(ColorStrategy::Palette(Arc::new(palette.clone())));
            }
        }
        if rasters.len() >= 4 {
            return Err(LayerError::Configuration(format!(
                "a colour function is required to combine {} rasters",
                rasters.len()
            )));
        }

        let bands = combined.band_count;
        if bands > 4 {
            return Err(LayerError::Configuration(format!(
                "a colour function is required to draw {} bands",
                bands
            )));
        }
        let flip = flip.unwrap_or(bands == 1);
        let stretch = |ranges| {
            let s = Stretch { ranges, flip };
            if bands == 1 {
                ColorStrategy::Grayscale(s)
            } else {
                ColorStrategy::MultiBandRgb(s)
            }
        };

        let streamed_single_bands = rasters
            .iter()
            .all(|r| r.source_type == SourceType::Streamed && r.band_count == 1);
        if streamed_single_bands {
            return Ok(stretch(StretchRanges::Running));
        }
        if rasters.len() == 1 && bands == 3 && rasters[0].photometric == Photometric::YCbCr {
            return Ok(ColorStrategy::YCbCr);
        }
        if let Some(stats) = &combined.stats {
            if bands <= 3 {
                return Ok(stretch(StretchRanges::Precomputed(stats.clone())));
            }
        }
        if bands >= 3 {
            return Ok(ColorStrategy::Rgb);
        }
        Ok(stretch(StretchRanges::Running))
    }

    /// True when colouring depends on the layer's running statistics.
    pub fn uses_running_stats(&self) -> bool {
        matches!(
            self,
            ColorStrategy::Grayscale(Stretch { ranges: StretchRanges::Running, .. })
                | ColorStrategy::MultiBandRgb(Stretch { ranges: StretchRanges::Running, .. })
        )
    }

    /// Bind the strategy to the ranges a tile is coloured against.
    pub fn colorizer<'a>(&'a self, running: Option<&RunningStats>) -> Colorizer<'a> {
        let ranges = match self {
            ColorStrategy::Grayscale(s) | ColorStrategy::MultiBandRgb(s) => match &s.ranges {
                StretchRanges::Precomputed(stats) => stats.iter().copied().map(Some).collect(),
                StretchRanges::Running => running
                    .map(|r| {
                        r.mins
                            .iter()
                            .zip(&r.maxs)
                            .map(|(lo, hi)| Some(BandStats { min: (*lo)?, max: (*hi)? }))
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            _ => Vec::new(),
        };
        Colorizer {
            strategy: self,
            ranges,
        }
    }
}

impl From<PixelColorFn> for ColorStrategy {
    fn from(f: PixelColorFn) -> Self {
        ColorStrategy::Custom(f)
    }
}

impl fmt::Debug for ColorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorStrategy::Palette(p) => write!(f, "Palette({} entries)", p.len()),
            ColorStrategy::Grayscale(s) => f.debug_tuple("Grayscale").field(s).finish(),
            ColorStrategy::MultiBandRgb(s) => f.debug_tuple("MultiBandRgb").field(s).finish(),
            ColorStrategy::Rgb => write!(f, "Rgb"),
            ColorStrategy::YCbCr => write!(f, "YCbCr"),
            ColorStrategy::Custom(_) => write!(f, "Custom"),
            ColorStrategy::CustomDraw(_) => write!(f, "CustomDraw"),
        }
    }
}

/// A strategy bound to one tile's stretch ranges.
pub struct Colorizer<'a> {
    strategy: &'a ColorStrategy,
    ranges: Vec<Option<BandStats>>,
}

impl Colorizer<'_> {
    pub fn strategy(&self) -> &ColorStrategy {
        self.strategy
    }

    /// Colour one sample.
    ///
    /// # Errors
    ///
    /// Failures and panics of a custom colour callback.
    pub fn color(&self, values: &[f64]) -> Result<Option<Rgba<u8>>, CallbackError> {
        match self.strategy {
            ColorStrategy::Palette(palette) => {
                let Some(&index) = values.first() else {
                    return Ok(None);
                };
                if index < 0.0 {
                    return Ok(None);
                }
                Ok(palette.get(index as usize).map(|c| Rgba(*c)))
            }
            ColorStrategy::Grayscale(stretch) => {
                let Some(level) = self.stretched(stretch, values, 0) else {
                    return Ok(None);
                };
                Ok(Some(Rgba([level, level, level, 255])))
            }
            ColorStrategy::MultiBandRgb(stretch) => {
                let mut rgb = [0u8; 3];
                for (band, channel) in rgb.iter_mut().enumerate().take(values.len()) {
                    match self.stretched(stretch, values, band) {
                        Some(level) => *channel = level,
                        None => return Ok(None),
                    }
                }
                Ok(Some(Rgba([rgb[0], rgb[1], rgb[2], 255])))
            }
            ColorStrategy::Rgb => {
                if values.len() < 3 {
                    return Ok(None);
                }
                let alpha = values.get(3).map_or(255, |a| to_u8(*a));
                Ok(Some(Rgba([
                    to_u8(values[0]),
                    to_u8(values[1]),
                    to_u8(values[2]),
                    alpha,
                ])))
            }
            ColorStrategy::YCbCr => Ok(ycbcr_to_rgb(values)),
            ColorStrategy::Custom(f) => call_guarded(|| f(values)),
            // Drawn by the callback itself.
            ColorStrategy::CustomDraw(_) => Ok(None),
        }
    }

    fn stretched(&self, stretch: &Stretch, values: &[f64], band: usize) -> Option<u8> {
        let value = *values.get(band)?;
        let range = self.ranges.get(band).copied().flatten()?;
        Some(stretch.apply(value, &range))
    }
}

/// Run a caller callback, turning a panic into an error.
pub fn call_guarded<T>(
    f: impl FnOnce() -> Result<T, CallbackError>,
) -> Result<T, CallbackError> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|panic| {
        Err(CallbackError::Panicked(panic_message(panic.as_ref())))
    })
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// JPEG-style YCbCr to RGB.
pub fn ycbcr_to_rgb(values: &[f64]) -> Option<Rgba<u8>> {
    let &[y, cb, cr] = values.get(..3)? else {
        return None;
    };
    let r = y + 1.402 * (cr - 128.0);
    let g = y - 0.34414 * (cb - 128.0) - 0.71414 * (cr - 128.0);
    let b = y + 1.772 * (cb - 128.0);
    Some(Rgba([to_u8(r), to_u8(g), to_u8(b), 255]))
}

fn to_u8(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}
