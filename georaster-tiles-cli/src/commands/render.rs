//! Render command - paint one map tile from an image.

use std::path::PathBuf;

use clap::Args;
use georaster_tiles::{TileCoord, TileOutcome};
use image::RgbaImage;
use tracing::info;

use super::common::{parse_tile, runtime, RasterArgs};
use crate::error::CliError;

/// Arguments for the render command.
#[derive(Debug, Args)]
pub struct RenderArgs {
    #[command(flatten)]
    pub raster: RasterArgs,

    /// Tile to render as z/x/y
    #[arg(long, value_parser = parse_tile, allow_hyphen_values = true)]
    pub tile: TileCoord,

    /// Output PNG
    #[arg(short, long)]
    pub out: PathBuf,
}

/// Run the render command.
pub fn run(args: RenderArgs) -> Result<(), CliError> {
    let runtime = runtime()?;
    let layer = args.raster.build_layer(&runtime)?;
    let tile_size = layer.config().tile_size;

    let outcome = runtime.block_on(layer.render(args.tile))?;

    let image = match &outcome {
        TileOutcome::Rendered(tile) => {
            let p = tile.placement;
            println!(
                "Tile {} at resolution {}: {}x{} px window, margins l{} r{} t{} b{}",
                args.tile,
                tile.resolution,
                p.inner_width,
                p.inner_height,
                p.margins.left,
                p.margins.right,
                p.margins.top,
                p.margins.bottom
            );
            tile.to_tile_image()
        }
        TileOutcome::Transparent(reason) => {
            println!("Tile {} is transparent: {}", args.tile, reason);
            RgbaImage::new(tile_size, tile_size)
        }
    };

    image.save(&args.out).map_err(|source| CliError::ImageSave {
        path: args.out.clone(),
        source,
    })?;
    info!(tile = %args.tile, out = %args.out.display(), "Wrote tile");
    println!("Wrote {}", args.out.display());
    Ok(())
}
