//! End-to-end tile rendering through `Layer`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use approx::assert_relative_eq;
use image::Rgba;
use tokio::sync::mpsc;

use georaster_tiles::cache::TileCacheKey;
use georaster_tiles::geometry::SkipReason;
use georaster_tiles::projection::Projectors;
use georaster_tiles::raster::{BoxFuture, SourceError, SourceType};
use georaster_tiles::{
    CallbackError, Extent, Layer, LayerConfig, MapCrs, MemoryRaster, PixelColorFn,
    RasterDescriptor, RasterSource, RecomputeRequest, SampledBands, Srs, TileCoord, TileError,
    TileOutcome, WindowRequest,
};

type Fill = Box<dyn Fn(&WindowRequest) -> Result<Vec<f64>, SourceError> + Send + Sync>;

/// Single-band source that counts reads and fills windows from a script.
struct ScriptedSource {
    descriptor: RasterDescriptor,
    reads: AtomicUsize,
    fill: Fill,
}

impl ScriptedSource {
    fn new(
        descriptor: RasterDescriptor,
        fill: impl Fn(&WindowRequest) -> Result<Vec<f64>, SourceError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            descriptor,
            reads: AtomicUsize::new(0),
            fill: Box::new(fill),
        })
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl RasterSource for ScriptedSource {
    fn descriptor(&self) -> &RasterDescriptor {
        &self.descriptor
    }

    fn read<'a>(
        &'a self,
        request: &'a WindowRequest,
    ) -> BoxFuture<'a, Result<SampledBands, SourceError>> {
        Box::pin(async move {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let values = (self.fill)(request)?;
            SampledBands::new(request.samples_across, request.samples_down, vec![values])
        })
    }
}

/// `count` values evenly spaced from 0 to `max`.
fn ramp(count: usize, max: f64) -> Vec<f64> {
    let last = (count.max(2) - 1) as f64;
    (0..count).map(|i| i as f64 * max / last).collect()
}

fn streamed_descriptor() -> RasterDescriptor {
    let extent = Extent::new(-10.0, -10.0, 10.0, 10.0, Srs::WGS84);
    RasterDescriptor::new(&extent, 20, 20, 1)
        .unwrap()
        .with_source_type(SourceType::Streamed)
}

fn memory_raster() -> Arc<MemoryRaster> {
    let extent = Extent::new(-10.0, -10.0, 10.0, 10.0, Srs::WGS84);
    let descriptor = RasterDescriptor::new(&extent, 20, 20, 1).unwrap();
    let values = (0..400).map(|v| v as f64).collect();
    Arc::new(MemoryRaster::new(descriptor, vec![values]).unwrap())
}

fn color_fn(
    f: impl Fn(&[f64]) -> Result<Option<Rgba<u8>>, CallbackError> + Send + Sync + 'static,
) -> PixelColorFn {
    Arc::new(f)
}

#[tokio::test]
async fn test_fine_raster_sample_counts_stay_bounded() {
    // 0.01° pixels over [-10, 10]².
    let extent = Extent::new(-10.0, -10.0, 10.0, 10.0, Srs::WGS84);
    let descriptor = RasterDescriptor::new(&extent, 2000, 2000, 1).unwrap();
    let source = ScriptedSource::new(descriptor, |r| Ok(vec![1.0; r.sample_count()]));

    for resolution in [32, 256, 1024] {
        let layer = Layer::builder(MapCrs::WebMercator)
            .with_source(source.clone())
            .with_config(LayerConfig::default().with_resolution(resolution))
            .build()
            .unwrap();

        for z in 0..7u8 {
            let n = 1i64 << z;
            for x in 0..n {
                for y in 0..n {
                    let coord = TileCoord::new(x, y, z);
                    if !layer.is_valid_tile(coord) {
                        continue;
                    }
                    let result = layer.resolve_tile_geometry(coord).unwrap();
                    let Some(g) = result.geometry() else {
                        continue;
                    };
                    let bound = (resolution as usize).min(2000);
                    assert!(g.samples_across >= 1 && g.samples_across <= bound, "{coord}");
                    assert!(g.samples_down >= 1 && g.samples_down <= bound, "{coord}");
                    assert!(g.placement.inner_width > 0 && g.placement.inner_height > 0);
                }
            }
        }
    }
    assert_eq!(source.reads(), 0);
}

#[tokio::test]
async fn test_tile_outside_raster_is_transparent_without_read() {
    let source = ScriptedSource::new(
        streamed_descriptor(),
        |r| Ok(vec![1.0; r.sample_count()]),
    );
    let layer = Layer::builder(MapCrs::Geographic)
        .with_source(source.clone())
        .build()
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let placement = layer.submit(TileCoord::new(0, 0, 4), move |result| {
        let _ = tx.send(result);
    });
    assert!(placement.is_none());

    let outcome = rx.recv().await.unwrap().unwrap();
    assert!(matches!(outcome, TileOutcome::Transparent(SkipReason::NoOverlap)));
    assert!(rx.recv().await.is_none());
    assert_eq!(source.reads(), 0);
}

#[tokio::test]
async fn test_submit_completes_exactly_once_per_tile() {
    let source = ScriptedSource::new(
        streamed_descriptor(),
        |r| Ok(ramp(r.sample_count(), 10.0)),
    );
    let layer = Layer::builder(MapCrs::Geographic)
        .with_source(source.clone())
        .build()
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, mut rx) = mpsc::unbounded_channel();
    for coord in [
        TileCoord::new(0, 0, 0),
        TileCoord::new(1, 0, 0),
        TileCoord::new(0, 0, 0),
        TileCoord::new(0, 0, 4),
    ] {
        let calls = calls.clone();
        let tx = tx.clone();
        layer.submit(coord, move |result| {
            calls.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send((coord, result));
        });
    }
    drop(tx);

    let mut completions = Vec::new();
    while let Some(completion) = rx.recv().await {
        completions.push(completion);
    }
    assert_eq!(completions.len(), 4);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert!(completions.iter().all(|(_, r)| r.is_ok()));
}

#[tokio::test]
async fn test_submit_returns_placement_synchronously() {
    let layer = Layer::builder(MapCrs::Geographic)
        .with_source(memory_raster())
        .build()
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let placement = layer
        .submit(TileCoord::new(1, 0, 0), move |r| {
            let _ = tx.send(r);
        })
        .unwrap();

    let tile = rx.recv().await.unwrap().unwrap();
    assert_eq!(tile.rendered().unwrap().placement, placement);
    // [0, 10] of a 180° tile on 256 px.
    assert_eq!(placement.margins.left, 0);
    assert_eq!(placement.inner_width, 14);
}

#[tokio::test]
async fn test_material_widening_flushes_and_requests_redraw() {
    let source = ScriptedSource::new(
        streamed_descriptor(),
        |r| {
            let max = if r.map_extent.xmin < -1.0 { 50.0 } else { 200.0 };
            Ok(ramp(r.sample_count(), max))
        },
    );
    let layer = Layer::builder(MapCrs::Geographic)
        .with_source(source.clone())
        .build()
        .unwrap();
    let mut recompute = layer.take_recompute_receiver().unwrap();
    let first = TileCoord::new(0, 0, 0);
    let second = TileCoord::new(1, 0, 0);

    layer.render(first).await.unwrap();
    assert_eq!(layer.stats().maxs, vec![Some(50.0)]);
    assert!(recompute.try_recv().is_err());

    let cache = layer.cache().unwrap();
    let first_key = TileCacheKey::new(first, 32);
    assert!(cache.get(&first_key).is_some());

    let outcome = layer.render(second).await.unwrap();
    assert_eq!(layer.stats().maxs, vec![Some(200.0)]);
    assert!(cache.get(&first_key).is_none());
    assert_eq!(
        recompute.try_recv().unwrap(),
        RecomputeRequest {
            coord: first,
            resolution: 32
        }
    );
    assert!(recompute.try_recv().is_err());

    // The widening tile itself was coloured against the new range.
    let tile = outcome.rendered().unwrap();
    assert_eq!(tile.generation, cache.generation());
    assert!(cache.get(&TileCacheKey::new(second, 32)).is_some());
}

#[tokio::test]
async fn test_small_widening_keeps_cache() {
    let source = ScriptedSource::new(
        streamed_descriptor(),
        |r| {
            let max = if r.map_extent.xmin < -1.0 { 1000.0 } else { 1001.0 };
            Ok(ramp(r.sample_count(), max))
        },
    );
    let layer = Layer::builder(MapCrs::Geographic)
        .with_source(source)
        .build()
        .unwrap();
    let mut recompute = layer.take_recompute_receiver().unwrap();

    layer.render(TileCoord::new(0, 0, 0)).await.unwrap();
    layer.render(TileCoord::new(1, 0, 0)).await.unwrap();

    assert_eq!(layer.cache().unwrap().generation(), 0);
    assert!(recompute.try_recv().is_err());
}

#[tokio::test]
async fn test_failed_read_surfaces_and_leaves_stats() {
    let source = ScriptedSource::new(
        streamed_descriptor(),
        |_| Err(SourceError::Read("connection reset".to_string())),
    );
    let layer = Layer::builder(MapCrs::Geographic)
        .with_source(source.clone())
        .build()
        .unwrap();

    let err = layer.render(TileCoord::new(0, 0, 0)).await.unwrap_err();
    assert_eq!(
        err,
        TileError::SourceRead(SourceError::Read("connection reset".to_string()))
    );
    assert_eq!(source.reads(), 1);
    assert_eq!(layer.stats().maxs, vec![None]);
}

#[tokio::test]
async fn test_color_fn_panic_fails_only_that_tile() {
    let layer = Layer::builder(MapCrs::Geographic)
        .with_source(memory_raster())
        .with_color_fn(color_fn(|_| panic!("colour fn exploded")))
        .build()
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    layer.submit(TileCoord::new(0, 0, 0), move |r| {
        let _ = tx.send(r);
    });
    let err = rx.recv().await.unwrap().unwrap_err();
    assert_eq!(
        err,
        TileError::Callback(CallbackError::Panicked("colour fn exploded".to_string()))
    );

    let outside = layer.render(TileCoord::new(0, 0, 4)).await.unwrap();
    assert!(outside.is_transparent());
}

#[tokio::test]
async fn test_color_fn_decides_pixels() {
    let layer = Layer::builder(MapCrs::Geographic)
        .with_source(memory_raster())
        .with_color_fn(color_fn(|values| {
            Ok((values[0] >= 200.0).then_some(Rgba([255, 0, 0, 255])))
        }))
        .build()
        .unwrap();

    let outcome = layer.render(TileCoord::new(1, 0, 0)).await.unwrap();
    let image = &outcome.rendered().unwrap().image;
    let red = image.pixels().filter(|p| p[3] == 255).count();
    let clear = image.pixels().filter(|p| p[3] == 0).count();
    assert!(red > 0);
    assert!(clear > 0);
}

#[tokio::test]
async fn test_web_mercator_map_over_geographic_raster() {
    let observed = Arc::new(AtomicUsize::new(0));
    let counter = observed.clone();
    let layer = Layer::builder(MapCrs::WebMercator)
        .with_source(memory_raster())
        .with_on_read(Arc::new(move |_: TileCoord, bands: &SampledBands| {
            counter.fetch_add(bands.width * bands.height, Ordering::SeqCst);
        }))
        .build()
        .unwrap();

    let bounds = layer.bounds().unwrap();
    assert_eq!(bounds.srs, Srs::WEB_MERCATOR);
    assert_relative_eq!(bounds.xmax, 1_113_194.907_932_735_7, epsilon = 1e-3);

    let outcome = layer.render(TileCoord::new(0, 0, 0)).await.unwrap();
    let tile = outcome.rendered().unwrap();
    assert!(tile.image.pixels().any(|p| p[3] == 255));
    assert!(observed.load(Ordering::SeqCst) > 0);

    let full = tile.to_tile_image();
    assert_eq!(full.dimensions(), (256, 256));
    assert_eq!(full.get_pixel(0, 0)[3], 0);
}

#[tokio::test]
async fn test_simple_map_renders_pixel_plane() {
    let extent = Extent::new(500_000.0, 0.0, 502_000.0, 2_000.0, Srs::Epsg(32633));
    let descriptor = RasterDescriptor::new(&extent, 20, 20, 1).unwrap();
    let raster = MemoryRaster::new(descriptor, vec![vec![7.0; 400]]).unwrap();
    let layer = Layer::builder(MapCrs::Simple)
        .with_source(Arc::new(raster))
        .build()
        .unwrap();

    let outcome = layer.render(TileCoord::new(0, -1, 0)).await.unwrap();
    let tile = outcome.rendered().unwrap();
    assert_eq!(tile.placement.inner_width, 20);
    assert_eq!(tile.placement.inner_height, 20);
    assert!(tile.image.pixels().all(|p| p[3] == 255));
}

#[test]
fn test_reprojection_round_trip_geographic_web_mercator() {
    let projectors = Projectors::default();
    let e = Extent::new(-30.0, -20.0, 40.0, 60.0, Srs::WGS84);
    let back = e
        .reproject(&Srs::WEB_MERCATOR, &projectors)
        .unwrap()
        .reproject(&Srs::WGS84, &projectors)
        .unwrap();
    assert_relative_eq!(back.xmin, e.xmin, epsilon = 1e-6);
    assert_relative_eq!(back.ymin, e.ymin, epsilon = 1e-6);
    assert_relative_eq!(back.xmax, e.xmax, epsilon = 1e-6);
    assert_relative_eq!(back.ymax, e.ymax, epsilon = 1e-6);
}
