//! Snapping sample windows to the raster pixel lattice.
//!
//! Two tiles that meet on a shared edge must agree on which source pixels
//! they cover, otherwise seams appear. The snapper expands a window outward
//! to whole pixels so that every tile lands on the same lattice lines.

use tracing::warn;

use crate::extent::Extent;
use crate::raster::RasterDescriptor;

/// Cell coordinates within this distance of an integer are taken as that
/// integer.
pub const LATTICE_EPSILON: f64 = 1e-9;

/// Fraction of a pixel the container is widened by on its far edges.
pub const CONTAINER_TOLERANCE: f64 = 0.25;

/// A raster's pixel lattice: origin at the top-left corner, rows growing
/// downward.
#[derive(Debug, Clone, PartialEq)]
pub struct Lattice {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    /// Bounds the snapped window may not leave.
    pub container: Extent,
}

impl Lattice {
    /// The lattice of a raster, contained by its own extent.
    pub fn of_raster(descriptor: &RasterDescriptor) -> Self {
        Self {
            origin_x: descriptor.xmin,
            origin_y: descriptor.ymax,
            pixel_width: descriptor.pixel_width,
            pixel_height: descriptor.pixel_height,
            container: descriptor.extent(),
        }
    }

    fn col(&self, x: f64) -> f64 {
        snap_to_integer((x - self.origin_x) / self.pixel_width)
    }

    fn row(&self, y: f64) -> f64 {
        snap_to_integer((self.origin_y - y) / self.pixel_height)
    }
}

/// Upper bound on sample counts per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleBudget {
    pub across: usize,
    pub down: usize,
}

impl SampleBudget {
    /// Three times the larger of the tile's pixel size and the resolution.
    pub fn for_tile(tile_size: u32, resolution: u32) -> Self {
        let limit = 3 * (tile_size.max(resolution) as usize);
        Self {
            across: limit,
            down: limit,
        }
    }
}

/// A window aligned to the lattice.
#[derive(Debug, Clone, PartialEq)]
pub struct SnappedWindow {
    /// Snapped extent in the raster's system.
    pub extent: Extent,
    /// First covered column.
    pub col: i64,
    /// First covered row.
    pub row: i64,
    /// Covered columns, after budget clamping.
    pub cols: usize,
    /// Covered rows, after budget clamping.
    pub rows: usize,
    /// True when the budget reduced either count.
    pub clamped: bool,
}

fn snap_to_integer(value: f64) -> f64 {
    let nearest = value.round();
    if (value - nearest).abs() < LATTICE_EPSILON {
        nearest
    } else {
        value
    }
}

/// Expand `extent` outward to whole pixels of `lattice`.
///
/// Returns `None` for non-finite input or when nothing of the container is
/// covered.
pub fn snap(extent: &Extent, lattice: &Lattice, budget: SampleBudget) -> Option<SnappedWindow> {
    if !extent.is_finite() || !lattice.container.is_finite() {
        return None;
    }

    let c = &lattice.container;
    let min_col = lattice.col(c.xmin).ceil();
    let max_col = lattice
        .col(c.xmax + CONTAINER_TOLERANCE * lattice.pixel_width)
        .floor();
    let min_row = lattice.row(c.ymax).ceil();
    let max_row = lattice
        .row(c.ymin - CONTAINER_TOLERANCE * lattice.pixel_height)
        .floor();

    let col0 = lattice.col(extent.xmin).floor().max(min_col);
    let col1 = lattice.col(extent.xmax).ceil().min(max_col);
    let row0 = lattice.row(extent.ymax).floor().max(min_row);
    let row1 = lattice.row(extent.ymin).ceil().min(max_row);

    if !(col1 > col0 && row1 > row0) {
        return None;
    }

    let snapped = Extent::new(
        lattice.origin_x + col0 * lattice.pixel_width,
        lattice.origin_y - row1 * lattice.pixel_height,
        lattice.origin_x + col1 * lattice.pixel_width,
        lattice.origin_y - row0 * lattice.pixel_height,
        extent.srs.clone(),
    );

    let native_cols = (col1 - col0) as usize;
    let native_rows = (row1 - row0) as usize;
    let cols = native_cols.min(budget.across);
    let rows = native_rows.min(budget.down);
    let clamped = cols != native_cols || rows != native_rows;
    if clamped {
        warn!(
            native_cols,
            native_rows,
            budget_across = budget.across,
            budget_down = budget.down,
            "Clamped runaway sample count"
        );
    }

    Some(SnappedWindow {
        extent: snapped,
        col: col0 as i64,
        row: row0 as i64,
        cols,
        rows,
        clamped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::Srs;

    const BIG: SampleBudget = SampleBudget {
        across: usize::MAX,
        down: usize::MAX,
    };

    /// 0.01° pixels over [-10, -10, 10, 10].
    fn lattice() -> Lattice {
        Lattice {
            origin_x: -10.0,
            origin_y: 10.0,
            pixel_width: 0.01,
            pixel_height: 0.01,
            container: Extent::new(-10.0, -10.0, 10.0, 10.0, Srs::WGS84),
        }
    }

    fn wgs(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Extent {
        Extent::new(xmin, ymin, xmax, ymax, Srs::WGS84)
    }

    #[test]
    fn test_full_raster_snaps_to_itself() {
        let w = snap(&wgs(-10.0, -10.0, 10.0, 10.0), &lattice(), BIG).unwrap();
        assert_eq!((w.col, w.row, w.cols, w.rows), (0, 0, 2000, 2000));
        assert!((w.extent.xmin + 10.0).abs() < 1e-9);
        assert!((w.extent.ymax - 10.0).abs() < 1e-9);
        assert!(!w.clamped);
    }

    #[test]
    fn test_expands_outward() {
        let w = snap(&wgs(-9.995, 9.985, -9.975, 9.995), &lattice(), BIG).unwrap();
        assert_eq!((w.col, w.row), (0, 0));
        assert_eq!((w.cols, w.rows), (3, 2));
    }

    #[test]
    fn test_clamped_to_container() {
        let w = snap(&wgs(-20.0, -20.0, 20.0, 20.0), &lattice(), BIG).unwrap();
        assert_eq!((w.col, w.row, w.cols, w.rows), (0, 0, 2000, 2000));
    }

    #[test]
    fn test_outside_container_is_none() {
        assert!(snap(&wgs(11.0, 0.0, 12.0, 1.0), &lattice(), BIG).is_none());
    }

    #[test]
    fn test_non_finite_is_none() {
        assert!(snap(&wgs(f64::NAN, 0.0, 1.0, 1.0), &lattice(), BIG).is_none());
    }

    #[test]
    fn test_budget_clamps_counts() {
        let budget = SampleBudget::for_tile(256, 32);
        assert_eq!(budget.across, 768);
        let w = snap(&wgs(-10.0, -10.0, 10.0, 10.0), &lattice(), budget).unwrap();
        assert_eq!((w.cols, w.rows), (768, 768));
        assert!(w.clamped);
    }

    #[test]
    fn test_float_noise_does_not_add_a_pixel() {
        // 0.1 + 0.2 is not exactly 0.3 in binary
        let w = snap(&wgs(-10.0, 9.7, -10.0 + (0.1 + 0.2), 10.0), &lattice(), BIG).unwrap();
        assert_eq!(w.cols, 30);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn snapping_is_idempotent(
                x in -10.0f64..9.0, y in -10.0f64..9.0,
                w in 0.001f64..1.0, h in 0.001f64..1.0,
            ) {
                let first = snap(&wgs(x, y, x + w, y + h), &lattice(), BIG).unwrap();
                let second = snap(&first.extent, &lattice(), BIG).unwrap();
                prop_assert_eq!(first.col, second.col);
                prop_assert_eq!(first.row, second.row);
                prop_assert_eq!(first.cols, second.cols);
                prop_assert_eq!(first.rows, second.rows);
            }

            #[test]
            fn adjacent_tiles_leave_no_gap(
                x in -10.0f64..8.0, y in -10.0f64..8.0,
                w in 0.001f64..1.0, h in 0.001f64..1.0,
            ) {
                let left = snap(&wgs(x, y, x + w, y + h), &lattice(), BIG).unwrap();
                let right = snap(&wgs(x + w, y, x + 2.0 * w, y + h), &lattice(), BIG).unwrap();
                let left_end = left.col + left.cols as i64;
                prop_assert!(right.col <= left_end);
                prop_assert!(left_end - right.col <= 1);
                prop_assert_eq!(left.row, right.row);
                prop_assert_eq!(left.rows, right.rows);
            }

            #[test]
            fn lattice_aligned_seams_coincide(
                col in 0i64..1500, row in 0i64..1500,
                span_cols in 1i64..200, span_rows in 1i64..200,
            ) {
                let l = lattice();
                let x0 = l.origin_x + col as f64 * l.pixel_width;
                let seam = l.origin_x + (col + span_cols) as f64 * l.pixel_width;
                let x1 = l.origin_x + (col + 2 * span_cols).min(2000) as f64 * l.pixel_width;
                let ymax = l.origin_y - row as f64 * l.pixel_height;
                let ymin = l.origin_y - (row + span_rows).min(2000) as f64 * l.pixel_height;

                let left = snap(&wgs(x0, ymin, seam, ymax), &l, BIG).unwrap();
                let right = snap(&wgs(seam, ymin, x1.max(seam), ymax), &l, BIG);
                if let Some(right) = right {
                    prop_assert_eq!(left.col + left.cols as i64, right.col);
                    prop_assert_eq!(left.extent.xmax, right.extent.xmin);
                }
            }
        }
    }
}
