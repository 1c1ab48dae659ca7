//! Axis-aligned bounding boxes tagged with a spatial reference system.
//!
//! An [`Extent`] is an immutable value: cropping, shifting and reprojecting
//! all produce new instances. Non-finite coordinates are representable (a
//! projector may legitimately return infinity near a singularity) but every
//! overlap test treats them as "no overlap".

use crate::projection::{Point, ProjectionError, Projectors, Srs};

/// A bounding box `{xmin, ymin, xmax, ymax}` in `srs` units.
#[derive(Debug, Clone, PartialEq)]
pub struct Extent {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
    pub srs: Srs,
}

impl Extent {
    /// Create an extent, normalising swapped corners.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64, srs: Srs) -> Self {
        let (xmin, xmax) = if x1 <= x2 { (x1, x2) } else { (x2, x1) };
        let (ymin, ymax) = if y1 <= y2 { (y1, y2) } else { (y2, y1) };
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
            srs,
        }
    }

    /// Bounding box of a set of points. `None` when the iterator is empty.
    pub fn from_points<I>(points: I, srs: Srs) -> Option<Self>
    where
        I: IntoIterator<Item = Point>,
    {
        let mut iter = points.into_iter();
        let (x0, y0) = iter.next()?;
        let (mut xmin, mut ymin, mut xmax, mut ymax) = (x0, y0, x0, y0);
        let mut any_nan = x0.is_nan() || y0.is_nan();
        for (x, y) in iter {
            any_nan |= x.is_nan() || y.is_nan();
            xmin = xmin.min(x);
            ymin = ymin.min(y);
            xmax = xmax.max(x);
            ymax = ymax.max(y);
        }
        if any_nan {
            // f64::min silently drops NaN, which would hide a failed transform.
            return Some(Self::new(f64::NAN, f64::NAN, f64::NAN, f64::NAN, srs));
        }
        Some(Self::new(xmin, ymin, xmax, ymax, srs))
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// True when every coordinate is finite.
    pub fn is_finite(&self) -> bool {
        self.xmin.is_finite()
            && self.ymin.is_finite()
            && self.xmax.is_finite()
            && self.ymax.is_finite()
    }

    /// True for zero-area boxes.
    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// The four corners, counter-clockwise from bottom-left.
    pub fn corners(&self) -> [Point; 4] {
        [
            (self.xmin, self.ymin),
            (self.xmax, self.ymin),
            (self.xmax, self.ymax),
            (self.xmin, self.ymax),
        ]
    }

    /// True when the point lies inside or on the boundary.
    pub fn contains_point(&self, (x, y): Point) -> bool {
        x >= self.xmin && x <= self.xmax && y >= self.ymin && y <= self.ymax
    }

    /// Translate by `(dx, dy)`.
    pub fn shifted(&self, dx: f64, dy: f64) -> Self {
        Self {
            xmin: self.xmin + dx,
            ymin: self.ymin + dy,
            xmax: self.xmax + dx,
            ymax: self.ymax + dy,
            srs: self.srs.clone(),
        }
    }

    /// Axis-wise intersection with `other`.
    ///
    /// `other` is taken to be in the same system. Returns `None` when either
    /// box is non-finite or either axis resolves to `min > max`. Touching
    /// edges produce a zero-area extent.
    pub fn crop(&self, other: &Extent) -> Option<Extent> {
        if !self.is_finite() || !other.is_finite() {
            return None;
        }
        let xmin = self.xmin.max(other.xmin);
        let ymin = self.ymin.max(other.ymin);
        let xmax = self.xmax.min(other.xmax);
        let ymax = self.ymax.min(other.ymax);
        if xmin > xmax || ymin > ymax {
            return None;
        }
        Some(Extent {
            xmin,
            ymin,
            xmax,
            ymax,
            srs: self.srs.clone(),
        })
    }

    /// Overlap test.
    ///
    /// # Arguments
    ///
    /// * `strict` - Require a positive-area intersection; otherwise touching
    ///   edges count as overlap
    pub fn overlaps(&self, other: &Extent, strict: bool) -> bool {
        if !self.is_finite() || !other.is_finite() {
            return false;
        }
        if strict {
            self.xmin < other.xmax
                && other.xmin < self.xmax
                && self.ymin < other.ymax
                && other.ymin < self.ymax
        } else {
            self.xmin <= other.xmax
                && other.xmin <= self.xmax
                && self.ymin <= other.ymax
                && other.ymin <= self.ymax
        }
    }

    /// Union of several boxes, tagged with the first one's system.
    pub fn merge<'a, I>(extents: I) -> Option<Extent>
    where
        I: IntoIterator<Item = &'a Extent>,
    {
        let mut iter = extents.into_iter();
        let first = iter.next()?.clone();
        Some(iter.fold(first, |acc, e| Extent {
            xmin: acc.xmin.min(e.xmin),
            ymin: acc.ymin.min(e.ymin),
            xmax: acc.xmax.max(e.xmax),
            ymax: acc.ymax.max(e.ymax),
            srs: acc.srs,
        }))
    }

    /// Reproject by transforming the four corners and taking their bounding
    /// box.
    ///
    /// For nonlinear projections the result can be larger than the true
    /// transformed shape. Points whose transform fails numerically become
    /// NaN and the result is non-finite; resolution errors propagate.
    pub fn reproject(
        &self,
        target: &Srs,
        projectors: &Projectors,
    ) -> Result<Extent, ProjectionError> {
        self.reproject_points(target, projectors, &self.corners())
    }

    /// Reproject by sampling `density` extra points along each edge as well
    /// as the corners.
    pub fn reproject_dense(
        &self,
        target: &Srs,
        projectors: &Projectors,
        density: usize,
    ) -> Result<Extent, ProjectionError> {
        self.reproject_points(target, projectors, &self.boundary(density))
    }

    /// Closed-path outline with `density` extra points along each edge,
    /// counter-clockwise from bottom-left. The first point is not repeated.
    pub fn boundary(&self, density: usize) -> Vec<Point> {
        let steps = density + 1;
        let mut points = Vec::with_capacity(4 * steps);
        let edges = [
            ((self.xmin, self.ymin), (self.xmax, self.ymin)),
            ((self.xmax, self.ymin), (self.xmax, self.ymax)),
            ((self.xmax, self.ymax), (self.xmin, self.ymax)),
            ((self.xmin, self.ymax), (self.xmin, self.ymin)),
        ];
        for ((x0, y0), (x1, y1)) in edges {
            for i in 0..steps {
                let t = i as f64 / steps as f64;
                points.push((x0 + t * (x1 - x0), y0 + t * (y1 - y0)));
            }
        }
        points
    }

    fn reproject_points(
        &self,
        target: &Srs,
        projectors: &Projectors,
        points: &[Point],
    ) -> Result<Extent, ProjectionError> {
        let projector = projectors.get(&self.srs, target)?;
        if projector.is_identity() {
            return Ok(Extent {
                srs: target.clone(),
                ..self.clone()
            });
        }

        let transformed = points.iter().map(|&p| match projector.forward(p) {
            Ok(q) => q,
            Err(_) => (f64::NAN, f64::NAN),
        });
        Ok(Extent::from_points(transformed, target.clone())
            .unwrap_or_else(|| Extent::new(f64::NAN, f64::NAN, f64::NAN, f64::NAN, target.clone())))
    }
}

impl std::fmt::Display for Extent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}] ({})",
            self.xmin, self.ymin, self.xmax, self.ymax, self.srs
        )
    }
}
