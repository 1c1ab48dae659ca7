//! Running per-band statistics for dynamic contrast stretching.
//!
//! Rasters without precomputed statistics are stretched against the value
//! range seen so far. That range only ever widens. When it widens by more
//! than [`MATERIALITY_THRESHOLD`] of its previous size, every tile coloured
//! against the narrower range is stale and must be redrawn.
//!
//! A tile goes through three steps:
//!
//! 1. [`StatsTracker::observe`] scans its samples into a [`TileStats`]
//! 2. [`StatsTracker::preview`] merges that summary into a snapshot used for
//!    colouring, without touching shared state
//! 3. [`StatsTracker::commit_snapshot`] folds the summary in once the tile
//!    rendered and reports the statistics it left behind
//!
//! A tile that fails between steps 1 and 3 contributes nothing.

use parking_lot::Mutex;
use tracing::debug;

use crate::raster::{BandStats, SampledBands};

/// Proportional range growth that invalidates rendered tiles.
pub const MATERIALITY_THRESHOLD: f64 = 1.0 / 256.0;

/// Per-band minimum and maximum of one tile's samples.
///
/// Bands with no valid samples are `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TileStats {
    pub mins: Vec<Option<f64>>,
    pub maxs: Vec<Option<f64>>,
}

impl TileStats {
    /// Scan every value, skipping NaN and the no-data sentinel.
    pub fn scan(bands: &SampledBands, no_data: Option<f64>) -> Self {
        let mut stats = TileStats {
            mins: vec![None; bands.band_count()],
            maxs: vec![None; bands.band_count()],
        };
        for (band, values) in bands.bands.iter().enumerate() {
            for &v in values {
                if v.is_nan() || no_data == Some(v) {
                    continue;
                }
                stats.mins[band] = Some(stats.mins[band].map_or(v, |m: f64| m.min(v)));
                stats.maxs[band] = Some(stats.maxs[band].map_or(v, |m: f64| m.max(v)));
            }
        }
        stats
    }
}

/// Result of folding a tile into the running statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsUpdate {
    /// Any band's range grew.
    pub widened: bool,
    /// Some band grew past the materiality threshold.
    pub material: bool,
}

/// Running per-band extremes. Entries stay `None` until a band sees data.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunningStats {
    pub mins: Vec<Option<f64>>,
    pub maxs: Vec<Option<f64>>,
    pub ranges: Vec<Option<f64>>,
}

impl RunningStats {
    pub fn new(band_count: usize) -> Self {
        Self {
            mins: vec![None; band_count],
            maxs: vec![None; band_count],
            ranges: vec![None; band_count],
        }
    }

    pub fn band_count(&self) -> usize {
        self.mins.len()
    }

    /// Fold a tile's summary in.
    pub fn merge(&mut self, tile: &TileStats) -> StatsUpdate {
        let mut update = StatsUpdate::default();
        let bands = self.band_count().min(tile.mins.len());

        for band in 0..bands {
            let old_range = self.ranges[band];
            let min = min_opt(self.mins[band], tile.mins[band]);
            let max = max_opt(self.maxs[band], tile.maxs[band]);
            if min != self.mins[band] || max != self.maxs[band] {
                update.widened = true;
            }
            self.mins[band] = min;
            self.maxs[band] = max;
            let new_range = match (min, max) {
                (Some(lo), Some(hi)) => Some(hi - lo),
                _ => None,
            };
            self.ranges[band] = new_range;

            if is_material(old_range, new_range) {
                update.material = true;
            }
        }
        update
    }

    /// A copy with `tile` folded in.
    pub fn merged(&self, tile: &TileStats) -> RunningStats {
        let mut copy = self.clone();
        copy.merge(tile);
        copy
    }

    /// Extremes as band statistics, once every band has seen data.
    pub fn band_stats(&self) -> Option<Vec<BandStats>> {
        self.mins
            .iter()
            .zip(&self.maxs)
            .map(|(lo, hi)| Some(BandStats { min: (*lo)?, max: (*hi)? }))
            .collect()
    }
}

fn min_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn max_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// An unset prior range is never material; a zero prior grows infinitely.
fn is_material(old: Option<f64>, new: Option<f64>) -> bool {
    match (old, new) {
        (Some(old), Some(new)) if new > old => {
            old == 0.0 || (new - old) / old > MATERIALITY_THRESHOLD
        }
        _ => false,
    }
}

/// Shared running statistics for one layer.
///
/// Merging is monotonic and order-independent, so concurrent tiles may
/// commit in any order.
#[derive(Debug)]
pub struct StatsTracker {
    stats: Mutex<RunningStats>,
    no_data: Option<f64>,
}

impl StatsTracker {
    pub fn new(band_count: usize, no_data: Option<f64>) -> Self {
        Self {
            stats: Mutex::new(RunningStats::new(band_count)),
            no_data,
        }
    }

    /// Current statistics.
    pub fn snapshot(&self) -> RunningStats {
        self.stats.lock().clone()
    }

    /// Summarise one tile's samples.
    pub fn observe(&self, bands: &SampledBands) -> TileStats {
        TileStats::scan(bands, self.no_data)
    }

    /// Current statistics with `tile` folded in, leaving shared state alone.
    pub fn preview(&self, tile: &TileStats) -> RunningStats {
        self.stats.lock().merged(tile)
    }

    /// Fold `tile` into the shared statistics.
    pub fn commit(&self, tile: &TileStats) -> StatsUpdate {
        self.commit_snapshot(tile).0
    }

    /// Fold `tile` in and return the statistics as they stood right after.
    ///
    /// The snapshot is taken under the same lock as the merge, so comparing
    /// it with the tile's [`preview`](Self::preview) tells whether any other
    /// tile committed in between.
    pub fn commit_snapshot(&self, tile: &TileStats) -> (StatsUpdate, RunningStats) {
        let mut stats = self.stats.lock();
        let update = stats.merge(tile);
        if update.widened {
            debug!(
                mins = ?stats.mins,
                maxs = ?stats.maxs,
                material = update.material,
                "Running statistics widened"
            );
        }
        (update, stats.clone())
    }
}
