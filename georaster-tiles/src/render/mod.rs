//! Painting sampled bands into tile images.
//!
//! The painted image covers only the inner tile: `inner_width ×
//! inner_height` pixels, positioned on the tile by the placement margins.
//! Sample `i` of `n` across spans pixels `⌊i·w/n⌋ .. ⌊(i+1)·w/n⌋`, at least
//! one pixel wide. Samples where any band is no-data, or whose centre a clip
//! mask hides, are left clear.

use image::{imageops, Rgba, RgbaImage};
use tracing::trace;

use crate::color::{call_guarded, Colorizer, ColorStrategy, DrawContext, PixelRect};
use crate::coord::TileCoord;
use crate::error::TileError;
use crate::geometry::{TileGeometry, TilePlacement};
use crate::mask::ClipMask;
use crate::raster::{SampledBands, SourceError};

/// A painted tile.
#[derive(Debug, Clone)]
pub struct RenderedTile {
    pub coord: TileCoord,
    pub resolution: u32,
    pub placement: TilePlacement,
    /// Inner tile pixels.
    pub image: RgbaImage,
    /// Cache generation the tile was started in.
    pub generation: u64,
}

impl RenderedTile {
    /// Bytes of pixel data held.
    pub fn size_bytes(&self) -> usize {
        self.image.as_raw().len()
    }

    /// Full `tile_size` square with the inner image placed at its margins.
    pub fn to_tile_image(&self) -> RgbaImage {
        let size = self.placement.tile_size;
        let mut tile = RgbaImage::new(size, size);
        let m = self.placement.margins;
        imageops::replace(&mut tile, &self.image, m.left, m.top);
        tile
    }
}

/// Paint `bands` into the inner tile described by `geometry`.
///
/// With a `mask`, each sample centre is tested in map units and clipped
/// samples are skipped before colouring.
///
/// # Errors
///
/// `SourceRead` when the bands do not have the geometry's sample shape, and
/// `Callback` when a colour or draw callback fails.
pub fn sample_and_color(
    geometry: &TileGeometry,
    bands: &SampledBands,
    colorizer: &Colorizer<'_>,
    no_data: Option<f64>,
    mask: Option<&ClipMask>,
) -> Result<RgbaImage, TileError> {
    let (across, down) = (geometry.samples_across, geometry.samples_down);
    if bands.width != across || bands.height != down {
        return Err(SourceError::ShapeMismatch {
            band: 0,
            expected: across * down,
            actual: bands.width * bands.height,
        }
        .into());
    }

    let (width, height) = (geometry.placement.inner_width, geometry.placement.inner_height);
    let mut image = RgbaImage::new(width, height);
    let draw = match colorizer.strategy() {
        ColorStrategy::CustomDraw(f) => Some(f),
        _ => None,
    };

    let mut values = Vec::with_capacity(bands.band_count());
    let mut drawn = 0usize;
    let mut masked = 0usize;
    for row in 0..down {
        let (y, h) = span(row, down, height);
        for col in 0..across {
            if mask.is_some_and(|m| m.hides(sample_center(geometry, col, row))) {
                masked += 1;
                continue;
            }
            bands.pixel_into(col, row, &mut values);
            if values.iter().any(|v| v.is_nan() || no_data == Some(*v)) {
                continue;
            }
            let (x, w) = span(col, across, width);
            let rect = PixelRect {
                x,
                y,
                width: w,
                height: h,
            };

            if let Some(draw) = draw {
                call_guarded(|| {
                    draw(DrawContext {
                        image: &mut image,
                        rect,
                        sample: (col, row),
                        values: &values,
                        sampled: bands,
                    })
                })?;
                drawn += 1;
            } else if let Some(color) = colorizer.color(&values)? {
                fill(&mut image, rect, color);
                drawn += 1;
            }
        }
    }

    trace!(tile = %geometry.coord, drawn, masked, total = across * down, "Painted tile");
    Ok(image)
}

/// Centre of sample `(col, row)` in map units.
fn sample_center(geometry: &TileGeometry, col: usize, row: usize) -> (f64, f64) {
    let e = &geometry.sample_extent;
    let x = e.xmin + (col as f64 + 0.5) * e.width() / geometry.samples_across as f64;
    let y = e.ymax - (row as f64 + 0.5) * e.height() / geometry.samples_down as f64;
    (x, y)
}

/// Pixel start and length of sample `index` of `count` over `extent` pixels.
fn span(index: usize, count: usize, extent: u32) -> (u32, u32) {
    let start = (index as u64 * extent as u64 / count as u64) as u32;
    let end = ((index as u64 + 1) * extent as u64 / count as u64) as u32;
    (start, end.saturating_sub(start).max(1))
}

fn fill(image: &mut RgbaImage, rect: PixelRect, color: Rgba<u8>) {
    let x_end = (rect.x + rect.width).min(image.width());
    let y_end = (rect.y + rect.height).min(image.height());
    for y in rect.y..y_end {
        for x in rect.x..x_end {
            image.put_pixel(x, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{CustomDrawFn, Stretch, StretchRanges};
    use crate::error::CallbackError;
    use crate::extent::Extent;
    use crate::geometry::{Margins, Skew};
    use crate::mask::MaskStrategy;
    use crate::projection::Srs;
    use crate::raster::BandStats;
    use std::sync::Arc;

    fn geometry(across: usize, down: usize, inner: u32) -> TileGeometry {
        let extent = Extent::new(0.0, 0.0, 1.0, 1.0, Srs::WGS84);
        TileGeometry {
            coord: TileCoord::new(0, 0, 0),
            resolution: 32,
            tile_extent: extent.clone(),
            inner_extent: extent.clone(),
            sample_extent: extent.clone(),
            raster_extent: extent,
            samples_across: across,
            samples_down: down,
            placement: TilePlacement {
                tile_size: 4,
                margins: Margins {
                    left: 4 - inner as i64,
                    ..Margins::default()
                },
                inner_width: inner,
                inner_height: inner,
            },
            skew: Skew::NONE,
            snapped: true,
            clamped: false,
        }
    }

    fn grey() -> ColorStrategy {
        ColorStrategy::Grayscale(Stretch {
            ranges: StretchRanges::Precomputed(vec![BandStats { min: 0.0, max: 255.0 }]),
            flip: false,
        })
    }

    #[test]
    fn test_samples_fill_their_rects() {
        let bands = SampledBands::new(2, 2, vec![vec![0.0, 255.0, 10.0, 20.0]]).unwrap();
        let strategy = grey();
        let colorizer = strategy.colorizer(None);
        let image =
            sample_and_color(&geometry(2, 2, 4), &bands, &colorizer, None, None).unwrap();

        assert_eq!(image.dimensions(), (4, 4));
        assert_eq!(image.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(image.get_pixel(3, 1), &Rgba([255, 255, 255, 255]));
        assert_eq!(image.get_pixel(1, 3), &Rgba([10, 10, 10, 255]));
        assert_eq!(image.get_pixel(2, 2), &Rgba([20, 20, 20, 255]));
    }

    #[test]
    fn test_no_data_samples_stay_clear() {
        let bands = SampledBands::new(2, 1, vec![vec![-1.0, f64::NAN], vec![5.0, 5.0]]).unwrap();
        let strategy = ColorStrategy::Rgb;
        let colorizer = strategy.colorizer(None);
        let image =
            sample_and_color(&geometry(2, 1, 2), &bands, &colorizer, Some(-1.0), None).unwrap();
        assert_eq!(image.get_pixel(0, 0)[3], 0);
        assert_eq!(image.get_pixel(1, 1)[3], 0);
    }

    #[test]
    fn test_shape_mismatch_is_source_error() {
        let bands = SampledBands::new(3, 1, vec![vec![1.0, 2.0, 3.0]]).unwrap();
        let strategy = grey();
        let colorizer = strategy.colorizer(None);
        let err =
            sample_and_color(&geometry(2, 1, 2), &bands, &colorizer, None, None).unwrap_err();
        assert!(matches!(err, TileError::SourceRead(SourceError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_more_samples_than_pixels() {
        let bands = SampledBands::new(4, 1, vec![vec![1.0, 2.0, 3.0, 4.0]]).unwrap();
        let strategy = grey();
        let colorizer = strategy.colorizer(None);
        let image =
            sample_and_color(&geometry(4, 1, 2), &bands, &colorizer, None, None).unwrap();
        assert_eq!(image.get_pixel(1, 0), &Rgba([4, 4, 4, 255]));
    }

    fn left_half(strategy: MaskStrategy) -> ClipMask {
        let rect = geo::Rect::new(geo::coord! { x: 0.0, y: 0.0 }, geo::coord! { x: 0.5, y: 1.0 });
        ClipMask::new(rect.to_polygon().into(), Srs::WGS84, strategy)
    }

    #[test]
    fn test_mask_outside_clears_samples_beyond_polygon() {
        let bands = SampledBands::new(2, 2, vec![vec![100.0; 4]]).unwrap();
        let strategy = grey();
        let colorizer = strategy.colorizer(None);
        let mask = left_half(MaskStrategy::Outside);
        let image =
            sample_and_color(&geometry(2, 2, 4), &bands, &colorizer, None, Some(&mask)).unwrap();

        assert_eq!(image.get_pixel(0, 0), &Rgba([100, 100, 100, 255]));
        assert_eq!(image.get_pixel(1, 3), &Rgba([100, 100, 100, 255]));
        assert_eq!(image.get_pixel(2, 0)[3], 0);
        assert_eq!(image.get_pixel(3, 3)[3], 0);
    }

    #[test]
    fn test_mask_inside_clears_samples_within_polygon() {
        let bands = SampledBands::new(2, 2, vec![vec![100.0; 4]]).unwrap();
        let strategy = grey();
        let colorizer = strategy.colorizer(None);
        let mask = left_half(MaskStrategy::Inside);
        let image =
            sample_and_color(&geometry(2, 2, 4), &bands, &colorizer, None, Some(&mask)).unwrap();

        assert_eq!(image.get_pixel(0, 0)[3], 0);
        assert_eq!(image.get_pixel(1, 3)[3], 0);
        assert_eq!(image.get_pixel(2, 0), &Rgba([100, 100, 100, 255]));
        assert_eq!(image.get_pixel(3, 3), &Rgba([100, 100, 100, 255]));
    }

    fn shade_by_column(mut ctx: DrawContext<'_>) -> Result<(), CallbackError> {
        let shade = (ctx.sample.0 * 100) as u8;
        for y in ctx.rect.y..ctx.rect.y + ctx.rect.height {
            for x in ctx.rect.x..ctx.rect.x + ctx.rect.width {
                ctx.image.put_pixel(x, y, Rgba([shade, 0, 0, 255]));
            }
        }
        Ok(())
    }

    #[test]
    fn test_custom_draw_receives_sample_indices() {
        let draw: CustomDrawFn = Arc::new(shade_by_column);
        let strategy = ColorStrategy::CustomDraw(draw);
        let bands = SampledBands::new(2, 1, vec![vec![0.0, 0.0]]).unwrap();
        let colorizer = strategy.colorizer(None);
        let image =
            sample_and_color(&geometry(2, 1, 2), &bands, &colorizer, None, None).unwrap();
        assert_eq!(image.get_pixel(1, 0), &Rgba([100, 0, 0, 255]));
    }

    #[test]
    fn test_to_tile_image_applies_margins() {
        let mut image = RgbaImage::new(2, 2);
        image.put_pixel(0, 0, Rgba([1, 2, 3, 255]));
        let tile = RenderedTile {
            coord: TileCoord::new(0, 0, 0),
            resolution: 32,
            placement: geometry(1, 1, 2).placement,
            image,
            generation: 0,
        };
        let full = tile.to_tile_image();
        assert_eq!(full.dimensions(), (4, 4));
        assert_eq!(full.get_pixel(2, 0), &Rgba([1, 2, 3, 255]));
        assert_eq!(full.get_pixel(0, 0)[3], 0);
        assert_eq!(tile.size_bytes(), 16);
    }
}
