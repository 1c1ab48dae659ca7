//! georaster-tiles CLI - render map tiles from georeferenced images
//!
//! A thin host over the georaster-tiles library: it loads an image as an
//! in-memory raster, builds a layer over it and either paints one tile to PNG
//! or prints the layer and tile geometry.

mod commands;
mod error;

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::info::InfoArgs;
use commands::render::RenderArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "georaster-tiles")]
#[command(about = "Render map tiles from georeferenced images", long_about = None)]
#[command(version)]
struct Cli {
    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one tile to a PNG
    Render(RenderArgs),

    /// Describe the layer built over an image
    Info(InfoArgs),
}

fn main() {
    let cli = Cli::parse();
    let _guard = init_logging(cli.log_file.as_deref());

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Render(args) => commands::render::run(args),
        Commands::Info(args) => commands::info::run(args),
    }
}

/// Install the stdout logger and, if asked, a file sink.
///
/// The returned guard flushes the file sink when dropped.
fn init_logging(log_file: Option<&Path>) -> Option<WorkerGuard> {
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .unwrap_or_else(|| OsStr::new("georaster-tiles.log"));
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(file_layer)
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();
    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use georaster_tiles::TileCoord;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_render() {
        let cli = Cli::try_parse_from([
            "georaster-tiles",
            "render",
            "--image",
            "dem.png",
            "--bbox",
            "-10,-10,10,10",
            "--map-crs",
            "geographic",
            "--tile",
            "2/1/1",
            "--out",
            "tile.png",
        ])
        .unwrap();

        let Commands::Render(args) = cli.command else {
            panic!("expected render");
        };
        assert_eq!(args.tile, TileCoord::new(1, 1, 2));
        assert_eq!(args.raster.bbox, [-10.0, -10.0, 10.0, 10.0]);
        assert_eq!(args.raster.srs, georaster_tiles::Srs::WGS84);
        assert_eq!(args.out, PathBuf::from("tile.png"));
    }

    #[test]
    fn test_missing_image_is_reported() {
        let cli = Cli::try_parse_from([
            "georaster-tiles",
            "info",
            "--image",
            "/nonexistent/dem.png",
            "--bbox",
            "0,0,1,1",
        ])
        .unwrap();
        let err = run(cli.command).unwrap_err();
        assert!(matches!(err, CliError::ImageOpen { .. }));
    }
}
