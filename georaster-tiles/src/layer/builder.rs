//! Layer construction and validation.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::info;

use super::{Layer, LayerInner, ReadObserver};
use crate::cache::TileRenderCache;
use crate::color::{ColorStrategy, CustomDrawFn, PixelColorFn};
use crate::config::{LayerConfig, ResolutionSetting};
use crate::coord::MapCrs;
use crate::error::LayerError;
use crate::extent::Extent;
use crate::geometry::TileGeometryResolver;
use crate::mask::{ClipMask, MaskOptions};
use crate::projection::{DefaultProjectionProvider, ProjectionProvider, Projectors, Srs};
use crate::raster::{RasterSource, RasterStack};
use crate::stats::StatsTracker;

/// Builds a [`Layer`].
///
/// # Example
///
/// ```ignore
/// let layer = Layer::builder(MapCrs::WebMercator)
///     .with_source(Arc::new(raster))
///     .with_config(LayerConfig::default().with_resolution(64))
///     .build()?;
/// ```
pub struct LayerBuilder {
    map_crs: MapCrs,
    sources: Vec<Arc<dyn RasterSource>>,
    config: LayerConfig,
    color_fn: Option<PixelColorFn>,
    custom_draw: Option<CustomDrawFn>,
    provider: Option<Arc<dyn ProjectionProvider>>,
    on_read: Option<ReadObserver>,
    runtime: Option<Handle>,
    mask: Option<MaskOptions>,
}

impl LayerBuilder {
    pub fn new(map_crs: MapCrs) -> Self {
        Self {
            map_crs,
            sources: Vec::new(),
            config: LayerConfig::default(),
            color_fn: None,
            custom_draw: None,
            provider: None,
            on_read: None,
            runtime: None,
            mask: None,
        }
    }

    /// Add a raster. Several rasters are read as one, bands in order.
    pub fn with_source(mut self, source: Arc<dyn RasterSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_sources(
        mut self,
        sources: impl IntoIterator<Item = Arc<dyn RasterSource>>,
    ) -> Self {
        self.sources.extend(sources);
        self
    }

    pub fn with_config(mut self, config: LayerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_color_fn(mut self, color_fn: PixelColorFn) -> Self {
        self.color_fn = Some(color_fn);
        self
    }

    pub fn with_custom_draw(mut self, draw: CustomDrawFn) -> Self {
        self.custom_draw = Some(draw);
        self
    }

    /// Replace the default projection provider.
    pub fn with_projection_provider(mut self, provider: Arc<dyn ProjectionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_on_read(mut self, observer: ReadObserver) -> Self {
        self.on_read = Some(observer);
        self
    }

    /// Clip the layer with polygons, or with the rasters' own footprints.
    pub fn with_mask(mut self, mask: MaskOptions) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Runtime tile tasks are spawned on. Defaults to the current one.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// `LayerError::Configuration` when there is no raster, no runtime, the
    /// rasters disagree on geometry, the tile size or resolution is zero, the
    /// mask cannot be projected onto the map, or the rasters cannot be
    /// coloured without a callback.
    pub fn build(self) -> Result<Layer, LayerError> {
        let runtime = self
            .runtime
            .or_else(|| Handle::try_current().ok())
            .ok_or_else(|| LayerError::Configuration("no tokio runtime available".to_string()))?;

        let config = self.config;
        if config.tile_size == 0 {
            return Err(LayerError::Configuration("tile size must be positive".to_string()));
        }
        let zero_resolution = match &config.resolution {
            ResolutionSetting::Fixed(r) => *r == 0,
            ResolutionSetting::PerZoom(table) => table.values().any(|r| *r == 0),
        };
        if zero_resolution {
            return Err(LayerError::Configuration("resolution must be positive".to_string()));
        }

        let descriptors: Vec<_> = self.sources.iter().map(|s| s.descriptor().clone()).collect();
        let raster_count = self.sources.len();
        let source: Arc<dyn RasterSource> = match self.sources.len() {
            0 => return Err(LayerError::Configuration("no rasters supplied".to_string())),
            1 => Arc::clone(&self.sources[0]),
            _ => Arc::new(RasterStack::new(self.sources)?),
        };
        let combined = source.descriptor().clone();

        let strategy = ColorStrategy::select(
            &descriptors,
            &combined,
            self.color_fn,
            self.custom_draw,
            config.flip,
        )?;

        let provider = self
            .provider
            .unwrap_or_else(|| Arc::new(DefaultProjectionProvider::new()));
        let projectors = Arc::new(Projectors::new(provider));

        let mask = self
            .mask
            .map(|options| {
                ClipMask::build(&options, &descriptors, &self.map_crs.srs(), &projectors)
            })
            .transpose()
            .map_err(|e| LayerError::Configuration(format!("mask cannot be projected: {}", e)))?;

        let source_extents = descriptors.iter().map(|d| d.extent()).collect();
        let max_width = descriptors.iter().map(|d| d.width).max().unwrap_or(0);
        let max_height = descriptors.iter().map(|d| d.height).max().unwrap_or(0);
        let simple_extent = Extent::new(0.0, 0.0, max_width as f64, max_height as f64, Srs::Simple);

        let resolver = TileGeometryResolver::new(
            self.map_crs,
            config.tile_size,
            config.wrap,
            combined.clone(),
            source_extents,
            simple_extent,
            projectors,
        );

        let cache = config
            .caching
            .then(|| TileRenderCache::new(config.cache_capacity_bytes));
        let (recompute_tx, recompute_rx) = mpsc::unbounded_channel();

        info!(
            map_crs = %resolver.map_crs(),
            rasters = raster_count,
            bands = combined.band_count,
            projection = %combined.projection,
            color = ?strategy,
            caching = config.caching,
            mask = ?mask.as_ref().map(ClipMask::strategy),
            "Built raster layer"
        );

        Ok(Layer {
            inner: Arc::new(LayerInner {
                stats: StatsTracker::new(combined.band_count, combined.no_data_value),
                config,
                runtime,
                resolver,
                source,
                raster_count,
                color: RwLock::new(Arc::new(strategy)),
                cache,
                active: Default::default(),
                recompute_tx,
                recompute_rx: Mutex::new(Some(recompute_rx)),
                on_read: self.on_read,
                mask,
            }),
        })
    }
}
