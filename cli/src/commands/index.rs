use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::Result;
use clap::{ArgAction, Args};
use geo::{coord, Rect};
use humantime::format_duration;
use thiserror::Error;
use tileindex_core::{
    formats::DriverRegistry,
    index::{zoom_index_gen, IndexFormats, ZoomIndexOptions, DEFAULT_FIELD_NAME},
    output::TileDirectory,
    tile::ZoomLevels,
};
use tracing::info;
use yansi::{Condition, Paint};

/// Errors of the `index` command
#[derive(Error, Debug)]
pub enum IndexCommandError {
    #[error("No zoom levels found in tile directory `{0}'")]
    NoZoomLevels(String),

    #[error("{failed} index writer(s) could not be closed at zoom level {zoom}")]
    CloseFailed { zoom: u8, failed: usize },
}

/// Create index files for the outputs in a tile directory
#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Tile directory containing a `metadata.json`
    pub tile_dir: String,

    /// Zoom level or range of zoom levels (e.g. `5` or `3,8`). Defaults to
    /// all zoom levels found in the tile directory.
    #[arg(short, long)]
    pub zoom: Option<ZoomLevels>,

    /// Create a GeoJSON index
    #[arg(long)]
    pub geojson: bool,

    /// Create a GeoPackage index
    #[arg(long)]
    pub gpkg: bool,

    /// Create a text file listing all tile paths (not available yet, does
    /// not produce a file)
    #[arg(long)]
    pub txt: bool,

    /// Create a VRT (not implemented yet)
    #[arg(long)]
    pub vrt: bool,

    /// Name of the field holding the tile paths
    #[arg(long, default_value = DEFAULT_FIELD_NAME)]
    pub fieldname: String,

    /// Use this base path for tiles instead of the tile directory
    #[arg(long)]
    pub basepath: Option<String>,

    /// Prefix remote tile paths with `/vsicurl/` so GDAL can open them
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub for_gdal: bool,

    /// Directory to write the index files to. Defaults to the tile directory.
    #[arg(long)]
    pub idx_out_dir: Option<PathBuf>,

    /// Only index tiles intersecting these bounds
    #[arg(
        long,
        num_args = 4,
        value_names = ["MINX", "MINY", "MAXX", "MAXY"],
        allow_negative_numbers = true
    )]
    pub bounds: Option<Vec<f64>>,
}

fn color_condition() -> Condition {
    Condition::from(|| Condition::stderr_is_tty() && Condition::clicolor() && Condition::no_color())
}

/// Run the `index` command
pub fn run_index(args: IndexArgs) -> Result<()> {
    let registry = DriverRegistry::default();
    let tiles = TileDirectory::open(&args.tile_dir, &registry)?;

    let mut grid = tiles.pyramid().clone();
    if let Some(b) = &args.bounds {
        let bounds = Rect::new(coord! { x: b[0], y: b[1] }, coord! { x: b[2], y: b[3] });
        grid = grid.with_area(bounds.to_polygon());
    }

    let zoom_levels = match args.zoom {
        Some(z) => z.iter().collect(),
        None => tiles.zoom_levels()?,
    };
    if zoom_levels.is_empty() {
        return Err(IndexCommandError::NoZoomLevels(args.tile_dir).into());
    }

    let options = ZoomIndexOptions {
        out_dir: args
            .idx_out_dir
            .unwrap_or_else(|| PathBuf::from(&args.tile_dir)),
        formats: IndexFormats {
            geojson: args.geojson,
            gpkg: args.gpkg,
            txt: args.txt,
            vrt: args.vrt,
        },
        field_name: args.fieldname,
        base_path: args.basepath,
        for_gdal: args.for_gdal,
    };

    for zoom in zoom_levels {
        let start = Instant::now();
        info!(zoom, "create index");

        let mut index = zoom_index_gen(&grid, &tiles, zoom, &options)?;
        for tile in index.by_ref() {
            tile?;
        }
        let considered = index.tiles_yielded();
        let existing = index.tiles_existing();
        let summary = index.close();

        eprintln!(
            "{} {} of {} tiles indexed ({} new) in {}",
            format!("zoom {zoom}:").bold().whenever(color_condition()),
            existing.green().whenever(color_condition()),
            considered,
            summary.new_entries,
            format_duration(Duration::from_millis(start.elapsed().as_millis() as u64))
        );

        if summary.failed > 0 {
            return Err(IndexCommandError::CloseFailed {
                zoom,
                failed: summary.failed,
            }
            .into());
        }
    }

    Ok(())
}
