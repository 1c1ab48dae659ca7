//! Info command - describe a layer and, optionally, one tile's geometry.

use clap::Args;
use georaster_tiles::{TileCoord, TileGeometryResult};

use super::common::{parse_tile, runtime, RasterArgs};
use crate::error::CliError;

/// Arguments for the info command.
#[derive(Debug, Args)]
pub struct InfoArgs {
    #[command(flatten)]
    pub raster: RasterArgs,

    /// Also resolve this z/x/y tile
    #[arg(long, value_parser = parse_tile, allow_hyphen_values = true)]
    pub tile: Option<TileCoord>,
}

/// Run the info command.
pub fn run(args: InfoArgs) -> Result<(), CliError> {
    let runtime = runtime()?;
    let layer = args.raster.build_layer(&runtime)?;
    let descriptor = layer.descriptor();

    println!("Raster");
    println!("  Size:       {} x {}", descriptor.width, descriptor.height);
    println!("  Bands:      {}", descriptor.band_count);
    println!("  Projection: {}", descriptor.projection);
    println!("  Pixel size: {} x {}", descriptor.pixel_width, descriptor.pixel_height);
    println!("  Colouring:  {:?}", layer.color_strategy());
    println!();
    println!("Map ({})", layer.map_crs());
    println!("  Bounds:     {}", layer.bounds()?);

    let Some(coord) = args.tile else {
        return Ok(());
    };
    println!();
    println!("Tile {}", coord);
    if !layer.is_valid_tile(coord) {
        println!("  Outside the map's tile grid");
        return Ok(());
    }
    println!("  Resolution: {}", layer.resolution_for(coord.z)?);

    match layer.resolve_tile_geometry(coord)? {
        TileGeometryResult::Skip(reason) => println!("  Skipped:    {}", reason),
        TileGeometryResult::Render(g) => {
            println!("  Tile:       {}", g.tile_extent);
            println!("  Inner:      {}", g.inner_extent);
            println!("  Sampled:    {}", g.sample_extent);
            println!("  In raster:  {}", g.raster_extent);
            println!("  Samples:    {} x {}", g.samples_across, g.samples_down);
            println!(
                "  Window:     {} x {} px, margins l{} r{} t{} b{}",
                g.placement.inner_width,
                g.placement.inner_height,
                g.placement.margins.left,
                g.placement.margins.right,
                g.placement.margins.top,
                g.placement.margins.bottom
            );
            println!("  Snapped:    {}", g.snapped);
            if g.clamped {
                println!("  Sample counts were clamped to the layer resolution");
            }
        }
    }
    Ok(())
}
