//! Arguments and helpers shared by the CLI commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, ValueEnum};
use georaster_tiles::{
    Extent, Layer, LayerConfig, MapCrs, MaskOptions, MaskStrategy, MemoryRaster, Srs, TileCoord,
};
use tokio::runtime::{Builder, Runtime};
use tracing::info;

use crate::error::CliError;

/// Host map coordinate system.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum MapCrsArg {
    /// Spherical Web Mercator tiles (EPSG:3857)
    WebMercator,
    /// Plate carrée tiles, two at zoom 0 (EPSG:4326)
    Geographic,
    /// The raster's own pixel plane
    Simple,
}

impl From<MapCrsArg> for MapCrs {
    fn from(arg: MapCrsArg) -> Self {
        match arg {
            MapCrsArg::WebMercator => MapCrs::WebMercator,
            MapCrsArg::Geographic => MapCrs::Geographic,
            MapCrsArg::Simple => MapCrs::Simple,
        }
    }
}

/// The image to read and where it sits on the earth.
#[derive(Debug, Clone, Args)]
pub struct RasterArgs {
    /// Image file (PNG, JPEG or TIFF)
    #[arg(long)]
    pub image: PathBuf,

    /// Image footprint as xmin,ymin,xmax,ymax in --srs units
    #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
    pub bbox: [f64; 4],

    /// Reference system of the footprint, e.g. EPSG:4326 or a proj string
    #[arg(long, default_value = "EPSG:4326")]
    pub srs: Srs,

    /// Host map coordinate system
    #[arg(long, value_enum, default_value = "web-mercator")]
    pub map_crs: MapCrsArg,

    /// Layer settings file ([layer] and [cache] sections)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Samples per tile edge, overriding the config file
    #[arg(long)]
    pub resolution: Option<u32>,

    /// Clip to the image footprint
    #[arg(long, conflicts_with = "mask_bbox")]
    pub auto_mask: bool,

    /// Clip to a box given as xmin,ymin,xmax,ymax in --mask-srs units
    #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
    pub mask_bbox: Option<[f64; 4]>,

    /// Reference system of --mask-bbox
    #[arg(long, default_value = "EPSG:4326")]
    pub mask_srs: Srs,

    /// Side of the mask that is clipped away: outside or inside
    #[arg(long, default_value = "outside")]
    pub mask_strategy: MaskStrategy,
}

impl RasterArgs {
    /// Layer settings: config file first, then command-line overrides.
    pub fn layer_config(&self) -> Result<LayerConfig, CliError> {
        let config = match &self.config {
            Some(path) => LayerConfig::from_ini_file(path)?,
            None => LayerConfig::default(),
        };
        Ok(match self.resolution {
            Some(resolution) => config.with_resolution(resolution),
            None => config,
        })
    }

    /// Load the image and build a layer over it on `runtime`.
    pub fn build_layer(&self, runtime: &Runtime) -> Result<Layer, CliError> {
        let config = self.layer_config()?;
        let raster = load_raster(&self.image, &self.extent())?;

        let mut builder = Layer::builder(self.map_crs.into())
            .with_source(Arc::new(raster))
            .with_config(config)
            .with_runtime(runtime.handle().clone());
        if let Some(mask) = self.mask_options() {
            builder = builder.with_mask(mask);
        }
        Ok(builder.build()?)
    }

    /// The clip mask requested on the command line, if any.
    pub fn mask_options(&self) -> Option<MaskOptions> {
        let options = if self.auto_mask {
            MaskOptions::auto()
        } else {
            let [xmin, ymin, xmax, ymax] = self.mask_bbox?;
            MaskOptions::bbox(&Extent::new(xmin, ymin, xmax, ymax, self.mask_srs.clone()))
        };
        Some(options.with_strategy(self.mask_strategy))
    }

    pub fn extent(&self) -> Extent {
        let [xmin, ymin, xmax, ymax] = self.bbox;
        Extent::new(xmin, ymin, xmax, ymax, self.srs.clone())
    }
}

/// Decode an image into an in-memory raster covering `extent`.
pub fn load_raster(path: &Path, extent: &Extent) -> Result<MemoryRaster, CliError> {
    let image = image::open(path).map_err(|source| CliError::ImageOpen {
        path: path.to_path_buf(),
        source,
    })?;
    info!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        "Loaded image"
    );
    Ok(MemoryRaster::from_image(&image, extent)?)
}

/// Multi-threaded runtime the layer spawns tile tasks on.
pub fn runtime() -> Result<Runtime, CliError> {
    Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)
}

/// Parse `xmin,ymin,xmax,ymax`.
pub fn parse_bbox(s: &str) -> Result<[f64; 4], String> {
    let values = s
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid number in bbox: {}", e))?;

    let [xmin, ymin, xmax, ymax] = values[..] else {
        return Err(format!("bbox needs 4 values, got {}", values.len()));
    };
    if !(xmin < xmax && ymin < ymax) {
        return Err("bbox must satisfy xmin < xmax and ymin < ymax".to_string());
    }
    Ok([xmin, ymin, xmax, ymax])
}

/// Parse a `z/x/y` tile address.
pub fn parse_tile(s: &str) -> Result<TileCoord, String> {
    let parts: Vec<&str> = s.split('/').collect();
    let [z, x, y] = parts[..] else {
        return Err(format!("expected z/x/y, got '{}'", s));
    };
    let z = z.parse::<u8>().map_err(|e| format!("invalid zoom '{}': {}", z, e))?;
    let x = x.parse::<i64>().map_err(|e| format!("invalid x '{}': {}", x, e))?;
    let y = y.parse::<i64>().map_err(|e| format!("invalid y '{}': {}", y, e))?;
    Ok(TileCoord::new(x, y, z))
}
