//! The raster tile layer.
//!
//! [`Layer`] is the host-facing context. It owns everything that outlives a
//! single tile: the geometry resolver and its projector and footprint memos,
//! the raster source, the colour strategy, the clip mask, the running
//! statistics, the render cache, and the set of tiles the host currently
//! shows.
//!
//! # Tile flow
//!
//! ```text
//! submit(coord) ──► cache? ──► resolve geometry ──► placement returned
//!                     │ hit          │
//!                     ▼              ▼ tokio task
//!                  callback   read ──► stats ──► colour ──► cache put ──► callback
//! ```
//!
//! When a tile widens the running statistics materially, the cache is
//! flushed and every other active tile is sent down the recompute channel
//! for the host to resubmit. A tile the cache refuses as stale is sent down
//! the same channel.

mod builder;

pub use builder::LayerBuilder;

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dashmap::DashMap;
use futures::FutureExt;
use image::RgbaImage;
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, instrument, trace};

use crate::cache::{TileCacheKey, TileRenderCache};
use crate::color::{call_guarded, panic_message, ColorStrategy};
use crate::config::LayerConfig;
use crate::coord::{MapCrs, TileCoord};
use crate::error::{CallbackError, TileError};
use crate::extent::Extent;
use crate::geometry::{
    SkipReason, TileGeometry, TileGeometryResolver, TileGeometryResult, TilePlacement,
};
use crate::mask::{ClipMask, MaskCoverage};
use crate::projection::{ProjectionError, Srs};
use crate::raster::{RasterDescriptor, RasterSource, SampledBands, WindowRequest};
use crate::render::{self, RenderedTile};
use crate::stats::{RunningStats, StatsTracker, TileStats};

/// Receives every tile's sampled bands right after the read.
pub type ReadObserver = Arc<dyn Fn(TileCoord, &SampledBands) + Send + Sync>;

/// A shown tile whose pixels are stale and should be resubmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecomputeRequest {
    pub coord: TileCoord,
    pub resolution: u32,
}

/// Result of rendering one tile.
#[derive(Debug, Clone)]
pub enum TileOutcome {
    Rendered(Arc<RenderedTile>),
    /// Nothing to draw; the tile stays transparent.
    Transparent(SkipReason),
}

impl TileOutcome {
    pub fn rendered(&self) -> Option<&Arc<RenderedTile>> {
        match self {
            TileOutcome::Rendered(tile) => Some(tile),
            TileOutcome::Transparent(_) => None,
        }
    }

    pub fn is_transparent(&self) -> bool {
        matches!(self, TileOutcome::Transparent(_))
    }
}

struct LayerInner {
    config: LayerConfig,
    runtime: Handle,
    resolver: TileGeometryResolver,
    source: Arc<dyn RasterSource>,
    raster_count: usize,
    color: RwLock<Arc<ColorStrategy>>,
    stats: StatsTracker,
    cache: Option<TileRenderCache>,
    /// Shown tiles and the resolution they were requested at.
    active: DashMap<TileCoord, u32>,
    recompute_tx: UnboundedSender<RecomputeRequest>,
    recompute_rx: Mutex<Option<UnboundedReceiver<RecomputeRequest>>>,
    on_read: Option<ReadObserver>,
    mask: Option<ClipMask>,
}

/// A tile after the synchronous part of a request.
enum Prepared {
    Cached(Arc<RenderedTile>),
    Resolved(TileGeometryResult),
}

impl Prepared {
    fn placement(&self) -> Option<TilePlacement> {
        match self {
            Prepared::Cached(tile) => Some(tile.placement),
            Prepared::Resolved(geometry) => geometry.placement(),
        }
    }
}

/// A georeferenced raster rendered as map tiles.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Layer {
    inner: Arc<LayerInner>,
}

impl Layer {
    pub fn builder(map_crs: MapCrs) -> LayerBuilder {
        LayerBuilder::new(map_crs)
    }

    pub fn config(&self) -> &LayerConfig {
        &self.inner.config
    }

    pub fn map_crs(&self) -> &MapCrs {
        self.inner.resolver.map_crs()
    }

    /// Combined descriptor of the layer's rasters.
    pub fn descriptor(&self) -> &RasterDescriptor {
        self.inner.resolver.raster()
    }

    pub fn raster_count(&self) -> usize {
        self.inner.raster_count
    }

    pub fn color_strategy(&self) -> Arc<ColorStrategy> {
        Arc::clone(&self.inner.color.read())
    }

    /// Snapshot of the running statistics.
    pub fn stats(&self) -> RunningStats {
        self.inner.stats.snapshot()
    }

    pub fn cache(&self) -> Option<&TileRenderCache> {
        self.inner.cache.as_ref()
    }

    /// The clip mask, in the map's system.
    pub fn mask(&self) -> Option<&ClipMask> {
        self.inner.mask.as_ref()
    }

    /// Tiles rendered and not yet released.
    pub fn active_tiles(&self) -> Vec<TileCoord> {
        let mut tiles: Vec<_> = self.inner.active.iter().map(|e| *e.key()).collect();
        tiles.sort();
        tiles
    }

    /// Raster extent in the map's system.
    pub fn bounds(&self) -> Result<Extent, ProjectionError> {
        self.extent_in(&self.map_crs().srs())
    }

    /// Raster extent reprojected into `srs`.
    pub fn extent_in(&self, srs: &Srs) -> Result<Extent, ProjectionError> {
        self.inner.resolver.extent_in(srs)
    }

    /// True when the tile could show raster data.
    pub fn is_valid_tile(&self, coord: TileCoord) -> bool {
        self.inner.resolver.is_valid_tile(coord)
    }

    /// Samples across a full tile at `zoom`.
    pub fn resolution_for(&self, zoom: u8) -> Result<u32, TileError> {
        self.inner
            .config
            .resolution
            .resolve(zoom)
            .ok_or(TileError::ResolutionUndefined { zoom })
    }

    /// Resolve a tile's geometry without reading any data.
    ///
    /// Tiles the clip mask hides entirely are skipped as
    /// [`SkipReason::Masked`].
    pub fn resolve_tile_geometry(&self, coord: TileCoord) -> Result<TileGeometryResult, TileError> {
        let resolution = self.resolution_for(coord.z)?;
        self.resolve_geometry(coord, resolution)
    }

    /// Colour already-read bands with the current strategy.
    ///
    /// Running statistics are consulted but not updated.
    pub fn sample_and_color(
        &self,
        geometry: &TileGeometry,
        bands: &SampledBands,
    ) -> Result<RgbaImage, TileError> {
        let strategy = self.color_strategy();
        let snapshot = strategy
            .uses_running_stats()
            .then(|| self.inner.stats.preview(&self.inner.stats.observe(bands)));
        render::sample_and_color(
            geometry,
            bands,
            &strategy.colorizer(snapshot.as_ref()),
            self.descriptor().no_data_value,
            self.partial_mask(geometry),
        )
    }

    /// Render a tile and, once it has pixels, mark it shown.
    ///
    /// A cached tile is returned without resolving its geometry again.
    pub async fn render(&self, coord: TileCoord) -> Result<TileOutcome, TileError> {
        let (resolution, prepared) = self.prepare(coord)?;
        self.render_prepared(coord, resolution, prepared).await
    }

    /// Render a tile in the background and, once it has pixels, mark it shown.
    ///
    /// The cache is checked and, on a miss, geometry resolved before
    /// returning, so the placement of a tile with data is known immediately.
    /// `done` is called exactly once, from the layer's runtime, including for
    /// transparent and cached tiles.
    pub fn submit<F>(&self, coord: TileCoord, done: F) -> Option<TilePlacement>
    where
        F: FnOnce(Result<TileOutcome, TileError>) + Send + 'static,
    {
        let prepared = self.prepare(coord);
        let placement = prepared.as_ref().ok().and_then(|(_, p)| p.placement());

        let layer = self.clone();
        self.inner.runtime.spawn(async move {
            let result = match prepared {
                Ok((resolution, prepared)) => {
                    AssertUnwindSafe(layer.render_prepared(coord, resolution, prepared))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| {
                            Err(CallbackError::Panicked(panic_message(panic.as_ref())).into())
                        })
                }
                Err(e) => Err(e),
            };
            done(result);
        });
        placement
    }

    /// Forget a tile the host no longer shows.
    pub fn release_tile(&self, coord: TileCoord) -> bool {
        self.inner.active.remove(&coord).is_some()
    }

    /// The recompute channel. Only the first call gets it.
    pub fn take_recompute_receiver(&self) -> Option<UnboundedReceiver<RecomputeRequest>> {
        self.inner.recompute_rx.lock().take()
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.inner.cache {
            cache.clear();
        }
    }

    /// Swap the colour strategy, then flush and redraw every shown tile.
    pub fn update_colors(&self, strategy: impl Into<ColorStrategy>) -> usize {
        *self.inner.color.write() = Arc::new(strategy.into());
        self.redraw(None).0
    }

    /// Flush the cache and request every shown tile but `except` again.
    ///
    /// Returns the number of requests sent and the new cache generation.
    fn redraw(&self, except: Option<TileCoord>) -> (usize, u64) {
        let generation = self.inner.cache.as_ref().map_or(0, |c| c.clear());
        let mut requested = 0;
        for entry in self.inner.active.iter() {
            if Some(*entry.key()) == except {
                continue;
            }
            let request = RecomputeRequest {
                coord: *entry.key(),
                resolution: *entry.value(),
            };
            if self.inner.recompute_tx.send(request).is_ok() {
                requested += 1;
            }
        }
        info!(tiles = requested, generation, "Redrawing active tiles");
        (requested, generation)
    }

    fn request_recompute(&self, coord: TileCoord, resolution: u32) {
        // A closed channel means the host stopped listening.
        let _ = self
            .inner
            .recompute_tx
            .send(RecomputeRequest { coord, resolution });
    }

    fn generation(&self) -> u64 {
        self.inner.cache.as_ref().map_or(0, |c| c.generation())
    }

    fn prepare(&self, coord: TileCoord) -> Result<(u32, Prepared), TileError> {
        let resolution = self.resolution_for(coord.z)?;
        if let Some(cache) = &self.inner.cache {
            if let Some(hit) = cache.get(&TileCacheKey::new(coord, resolution)) {
                trace!(tile = %coord, resolution, "Render cache hit");
                return Ok((resolution, Prepared::Cached(hit)));
            }
        }
        let geometry = self.resolve_geometry(coord, resolution)?;
        Ok((resolution, Prepared::Resolved(geometry)))
    }

    fn resolve_geometry(
        &self,
        coord: TileCoord,
        resolution: u32,
    ) -> Result<TileGeometryResult, TileError> {
        let result = self.inner.resolver.resolve(coord, resolution)?;
        if let (Some(mask), TileGeometryResult::Render(g)) = (&self.inner.mask, &result) {
            if mask.classify(&g.sample_extent) == MaskCoverage::Hidden {
                debug!(tile = %coord, "Tile hidden by clip mask");
                return Ok(TileGeometryResult::Skip(SkipReason::Masked));
            }
        }
        Ok(result)
    }

    /// The mask, when it cuts through this tile's sample window.
    fn partial_mask(&self, geometry: &TileGeometry) -> Option<&ClipMask> {
        self.inner
            .mask
            .as_ref()
            .filter(|m| m.classify(&geometry.sample_extent) == MaskCoverage::Partial)
    }

    async fn render_prepared(
        &self,
        coord: TileCoord,
        resolution: u32,
        prepared: Prepared,
    ) -> Result<TileOutcome, TileError> {
        let outcome = match prepared {
            Prepared::Cached(tile) => TileOutcome::Rendered(tile),
            Prepared::Resolved(geometry) => {
                self.render_geometry(coord, resolution, geometry).await?
            }
        };
        if !outcome.is_transparent() {
            self.inner.active.insert(coord, resolution);
        }
        Ok(outcome)
    }

    #[instrument(skip_all, fields(tile = %coord, resolution = resolution))]
    async fn render_geometry(
        &self,
        coord: TileCoord,
        resolution: u32,
        geometry: TileGeometryResult,
    ) -> Result<TileOutcome, TileError> {
        let generation = self.generation();

        let geometry = match geometry {
            TileGeometryResult::Render(g) => g,
            TileGeometryResult::Skip(reason) => return Ok(TileOutcome::Transparent(reason)),
        };

        let request = WindowRequest {
            map_extent: geometry.sample_extent.clone(),
            raster_extent: geometry.raster_extent.clone(),
            samples_across: geometry.samples_across,
            samples_down: geometry.samples_down,
            resample: self.inner.config.resample,
            map_to_raster: self.inner.resolver.map_to_raster()?,
        };
        let bands = self.inner.source.read(&request).await?;
        debug!(
            samples_across = bands.width,
            samples_down = bands.height,
            bands = bands.band_count(),
            "Read raster window"
        );

        if let Some(observer) = &self.inner.on_read {
            call_guarded(|| {
                observer(coord, &bands);
                Ok(())
            })?;
        }

        let strategy = self.color_strategy();
        let tile_stats = strategy
            .uses_running_stats()
            .then(|| self.inner.stats.observe(&bands));
        let preview = tile_stats.as_ref().map(|t| self.inner.stats.preview(t));
        let image = render::sample_and_color(
            &geometry,
            &bands,
            &strategy.colorizer(preview.as_ref()),
            self.descriptor().no_data_value,
            self.partial_mask(&geometry),
        )?;

        let generation = match (&tile_stats, &preview) {
            (Some(tile_stats), Some(preview)) => {
                self.settle_stats(coord, tile_stats, preview, generation)
            }
            _ => generation,
        };

        let tile = Arc::new(RenderedTile {
            coord,
            resolution,
            placement: geometry.placement,
            image,
            generation,
        });
        if let Some(cache) = &self.inner.cache {
            if !cache.put(Arc::clone(&tile)) {
                self.request_recompute(coord, resolution);
            }
        }
        Ok(TileOutcome::Rendered(tile))
    }

    /// Commit a tile's statistics and pick the generation to stamp it with.
    ///
    /// A tile that widened the range materially triggers a flush. It keeps
    /// its pixels current across that flush only when nothing else moved
    /// underneath it: the committed snapshot equals the preview it was
    /// coloured with, and no other flush landed since `generation` was read.
    /// Otherwise it keeps `generation` and the cache refuses it.
    fn settle_stats(
        &self,
        coord: TileCoord,
        tile_stats: &TileStats,
        preview: &RunningStats,
        generation: u64,
    ) -> u64 {
        let (update, committed) = self.inner.stats.commit_snapshot(tile_stats);
        if !update.material {
            return generation;
        }
        let (_, flushed) = self.redraw(Some(coord));
        if committed == *preview && flushed == generation + 1 {
            flushed
        } else {
            debug!(tile = %coord, generation, "Tile coloured against superseded statistics");
            generation
        }
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("map_crs", self.map_crs())
            .field("rasters", &self.inner.raster_count)
            .field("bands", &self.descriptor().band_count)
            .field("color", &*self.color_strategy())
            .field("active", &self.inner.active.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolutionSetting;
    use crate::geometry::Margins;
    use crate::mask::{MaskOptions, MaskStrategy};
    use crate::projection::{DefaultProjectionProvider, Point, ProjectionProvider, Projector};
    use crate::raster::{BandStats, MemoryRaster};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts every point transformed by the projectors it hands out.
    struct CountingProvider {
        inner: DefaultProjectionProvider,
        transforms: Arc<AtomicUsize>,
    }

    struct CountingProjector {
        inner: Arc<dyn Projector>,
        transforms: Arc<AtomicUsize>,
    }

    impl Projector for CountingProjector {
        fn forward(&self, point: Point) -> Result<Point, ProjectionError> {
            self.transforms.fetch_add(1, Ordering::SeqCst);
            self.inner.forward(point)
        }

        fn inverse(&self, point: Point) -> Result<Point, ProjectionError> {
            self.transforms.fetch_add(1, Ordering::SeqCst);
            self.inner.inverse(point)
        }

        fn is_identity(&self) -> bool {
            self.inner.is_identity()
        }
    }

    impl ProjectionProvider for CountingProvider {
        fn projector(&self, from: &Srs, to: &Srs) -> Result<Arc<dyn Projector>, ProjectionError> {
            Ok(Arc::new(CountingProjector {
                inner: self.inner.projector(from, to)?,
                transforms: Arc::clone(&self.transforms),
            }))
        }
    }

    fn summary(min: f64, max: f64) -> TileStats {
        TileStats {
            mins: vec![Some(min)],
            maxs: vec![Some(max)],
        }
    }

    fn raster() -> Arc<dyn RasterSource> {
        let extent = Extent::new(-10.0, -10.0, 10.0, 10.0, Srs::WGS84);
        let descriptor = RasterDescriptor::new(&extent, 20, 20, 1)
            .unwrap()
            .with_stats(vec![BandStats { min: 0.0, max: 399.0 }]);
        let values = (0..400).map(|v| v as f64).collect();
        Arc::new(MemoryRaster::new(descriptor, vec![values]).unwrap())
    }

    fn layer(config: LayerConfig) -> Layer {
        Layer::builder(MapCrs::Geographic)
            .with_source(raster())
            .with_config(config)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_render_outside_is_transparent() {
        let layer = layer(LayerConfig::default());
        // Far north-west of the raster at zoom 4.
        let outcome = layer.render(TileCoord::new(0, 0, 4)).await.unwrap();
        assert!(outcome.is_transparent());
    }

    #[tokio::test]
    async fn test_render_paints_inner_tile() {
        let layer = layer(LayerConfig::default());
        let outcome = layer.render(TileCoord::new(0, 0, 0)).await.unwrap();
        let tile = outcome.rendered().unwrap();
        assert!(tile.placement.inner_width > 0);
        assert_eq!(
            tile.image.dimensions(),
            (tile.placement.inner_width, tile.placement.inner_height)
        );
        assert!(tile.image.pixels().any(|p| p[3] == 255));
    }

    #[tokio::test]
    async fn test_second_render_comes_from_cache() {
        let layer = layer(LayerConfig::default());
        let first = layer.render(TileCoord::new(1, 0, 0)).await.unwrap();
        let second = layer.render(TileCoord::new(1, 0, 0)).await.unwrap();
        assert!(Arc::ptr_eq(
            first.rendered().unwrap(),
            second.rendered().unwrap()
        ));
    }

    #[tokio::test]
    async fn test_cache_hit_transforms_no_points() {
        let transforms = Arc::new(AtomicUsize::new(0));
        let provider = CountingProvider {
            inner: DefaultProjectionProvider::new(),
            transforms: Arc::clone(&transforms),
        };
        let layer = Layer::builder(MapCrs::WebMercator)
            .with_source(raster())
            .with_projection_provider(Arc::new(provider))
            .build()
            .unwrap();
        let coord = TileCoord::new(0, 0, 0);

        let first = layer.render(coord).await.unwrap();
        let first = first.rendered().unwrap();
        assert!(transforms.load(Ordering::SeqCst) > 0);
        transforms.store(0, Ordering::SeqCst);

        let second = layer.render(coord).await.unwrap();
        assert!(Arc::ptr_eq(first, second.rendered().unwrap()));

        let (tx, rx) = tokio::sync::oneshot::channel();
        let placement = layer.submit(coord, move |result| {
            let _ = tx.send(result);
        });
        assert_eq!(placement, Some(first.placement));
        let third = rx.await.unwrap().unwrap();
        assert!(Arc::ptr_eq(first, third.rendered().unwrap()));

        assert_eq!(transforms.load(Ordering::SeqCst), 0);
        assert_eq!(layer.active_tiles(), vec![coord]);
    }

    #[tokio::test]
    async fn test_only_rendered_tiles_become_active() {
        let observer: ReadObserver = Arc::new(|coord: TileCoord, _: &SampledBands| {
            if coord.x == 1 {
                panic!("observer failed");
            }
        });
        let layer = Layer::builder(MapCrs::Geographic)
            .with_source(raster())
            .with_on_read(observer)
            .build()
            .unwrap();

        let outcome = layer.render(TileCoord::new(0, 0, 4)).await.unwrap();
        assert!(outcome.is_transparent());
        let err = layer.render(TileCoord::new(1, 0, 0)).await.unwrap_err();
        assert!(matches!(err, TileError::Callback(CallbackError::Panicked(_))));
        assert!(layer.active_tiles().is_empty());

        layer.render(TileCoord::new(0, 0, 0)).await.unwrap();
        assert_eq!(layer.active_tiles(), vec![TileCoord::new(0, 0, 0)]);
    }

    #[tokio::test]
    async fn test_uncontested_widening_is_stamped_current() {
        let layer = layer(LayerConfig::default());
        let stats = &layer.inner.stats;
        stats.commit(&summary(0.0, 50.0));

        let wide = summary(200.0, 200.0);
        let preview = stats.preview(&wide);
        let generation = layer.settle_stats(TileCoord::new(0, 0, 0), &wide, &preview, 0);
        assert_eq!(generation, 1);
        assert_eq!(layer.generation(), 1);
    }

    #[tokio::test]
    async fn test_interleaved_previews_leave_later_commit_stale() {
        let layer = layer(LayerConfig::default());
        let stats = &layer.inner.stats;
        stats.commit(&summary(0.0, 50.0));

        // Both tiles preview before either commits.
        let high = summary(200.0, 200.0);
        let low = summary(-100.0, -100.0);
        let captured = layer.generation();
        let high_preview = stats.preview(&high);
        let low_preview = stats.preview(&low);

        let low_generation =
            layer.settle_stats(TileCoord::new(0, 0, 0), &low, &low_preview, captured);
        let high_generation =
            layer.settle_stats(TileCoord::new(1, 0, 0), &high, &high_preview, captured);
        assert_eq!(low_generation, 1);
        assert_eq!(high_generation, captured);
        assert_eq!(layer.generation(), 2);

        let stale = Arc::new(RenderedTile {
            coord: TileCoord::new(1, 0, 0),
            resolution: 32,
            placement: TilePlacement {
                tile_size: 256,
                margins: Margins::default(),
                inner_width: 1,
                inner_height: 1,
            },
            image: RgbaImage::new(1, 1),
            generation: high_generation,
        });
        assert!(!layer.cache().unwrap().put(stale));
    }

    #[tokio::test]
    async fn test_mask_hides_tiles_before_reading() {
        let reads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reads);
        let observer: ReadObserver = Arc::new(move |_: TileCoord, _: &SampledBands| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        // Keeps the raster west of 1°W.
        let mask = MaskOptions::bbox(&Extent::new(-20.0, -20.0, -1.0, 20.0, Srs::WGS84));
        let layer = Layer::builder(MapCrs::Geographic)
            .with_source(raster())
            .with_on_read(observer)
            .with_mask(mask)
            .build()
            .unwrap();

        // Tile (1, 0, 0) spans [0, 180] and never meets the mask.
        let east = layer.render(TileCoord::new(1, 0, 0)).await.unwrap();
        assert!(matches!(east, TileOutcome::Transparent(SkipReason::Masked)));
        assert_eq!(reads.load(Ordering::SeqCst), 0);

        let west = layer.render(TileCoord::new(0, 0, 0)).await.unwrap();
        let west = west.rendered().unwrap();
        assert!(west.image.pixels().any(|p| p[3] == 255));
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_inside_mask_clears_covered_samples() {
        // Covers the western tile's whole window and the edge of the eastern one.
        let mask = MaskOptions::bbox(&Extent::new(-20.0, -20.0, 0.5, 20.0, Srs::WGS84))
            .with_strategy(MaskStrategy::Inside);
        let layer = Layer::builder(MapCrs::Geographic)
            .with_source(raster())
            .with_mask(mask)
            .build()
            .unwrap();

        let west = layer.render(TileCoord::new(0, 0, 0)).await.unwrap();
        assert!(matches!(west, TileOutcome::Transparent(SkipReason::Masked)));
        let east = layer.render(TileCoord::new(1, 0, 0)).await.unwrap();
        assert!(east.rendered().unwrap().image.pixels().any(|p| p[3] == 255));
    }

    #[tokio::test]
    async fn test_undefined_resolution() {
        let table = BTreeMap::from([(3, 64)]);
        let layer = layer(LayerConfig::default().with_resolutions(table));
        let err = layer.render(TileCoord::new(0, 0, 1)).await.unwrap_err();
        assert_eq!(err, TileError::ResolutionUndefined { zoom: 1 });
        assert_eq!(layer.resolution_for(5).unwrap(), 64);
        assert_eq!(
            layer.config().resolution,
            ResolutionSetting::PerZoom(BTreeMap::from([(3, 64)]))
        );
    }

    #[tokio::test]
    async fn test_release_tile() {
        let layer = layer(LayerConfig::default());
        layer.render(TileCoord::new(1, 0, 0)).await.unwrap();
        assert_eq!(layer.active_tiles(), vec![TileCoord::new(1, 0, 0)]);
        assert!(layer.release_tile(TileCoord::new(1, 0, 0)));
        assert!(!layer.release_tile(TileCoord::new(1, 0, 0)));
        assert!(layer.active_tiles().is_empty());
    }

    #[tokio::test]
    async fn test_recompute_receiver_is_taken_once() {
        let layer = layer(LayerConfig::default());
        assert!(layer.take_recompute_receiver().is_some());
        assert!(layer.take_recompute_receiver().is_none());
    }

    #[tokio::test]
    async fn test_update_colors_requests_active_tiles() {
        let layer = layer(LayerConfig::default());
        let mut rx = layer.take_recompute_receiver().unwrap();
        layer.render(TileCoord::new(0, 0, 0)).await.unwrap();
        layer.render(TileCoord::new(1, 0, 0)).await.unwrap();

        let requested = layer.update_colors(ColorStrategy::Rgb);
        assert_eq!(requested, 2);
        assert!(matches!(*layer.color_strategy(), ColorStrategy::Rgb));

        let mut coords = vec![rx.recv().await.unwrap().coord, rx.recv().await.unwrap().coord];
        coords.sort();
        assert_eq!(coords, vec![TileCoord::new(0, 0, 0), TileCoord::new(1, 0, 0)]);
        assert_eq!(layer.cache().unwrap().generation(), 1);
    }

    #[tokio::test]
    async fn test_bounds_in_map_system() {
        let layer = layer(LayerConfig::default());
        let bounds = layer.bounds().unwrap();
        assert_eq!(bounds.srs, Srs::WGS84);
        assert!((bounds.xmin + 10.0).abs() < 1e-9);
        assert!((bounds.ymax - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_caching_disabled() {
        let layer = layer(LayerConfig::default().with_caching(false));
        assert!(layer.cache().is_none());
        let outcome = layer.render(TileCoord::new(1, 0, 0)).await.unwrap();
        assert_eq!(outcome.rendered().unwrap().generation, 0);
    }
}
