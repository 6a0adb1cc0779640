//! Generates index artifacts for one zoom level of a tile pyramid
//!
//! [`zoom_index_gen`] returns a [`ZoomIndex`], an iterator over all tiles of
//! the area of interest. Tiles are yielded whether their output exists or
//! not, but only existing outputs get an index entry. The writers owned by
//! the iterator are closed exactly once: when the tiles are exhausted, when
//! an error occurs, when [`ZoomIndex::close`] is called, or when the
//! iterator is dropped.

use std::{fs, iter::FusedIterator, path::PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, error};

use crate::{
    error::IndexError,
    output::OutputAccessor,
    tile::{zoom_levels::MAX_ZOOM, Tile, TileGrid},
};

use super::{
    index_file_path, open_writer, path::resolve_tile_path, IndexFormats, IndexWriter,
    DEFAULT_FIELD_NAME,
};

/// Options for generating the index of a zoom level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoomIndexOptions {
    /// Directory the index artifacts are written to
    pub out_dir: PathBuf,

    pub formats: IndexFormats,

    /// Name of the field holding the tile output path
    pub field_name: String,

    /// Replaces the directory part of tile output paths
    pub base_path: Option<String>,

    /// Prefix remote tile paths so GDAL can open them directly
    pub for_gdal: bool,
}

impl ZoomIndexOptions {
    pub fn new(out_dir: impl Into<PathBuf>, formats: IndexFormats) -> Self {
        Self {
            out_dir: out_dir.into(),
            formats,
            field_name: DEFAULT_FIELD_NAME.to_string(),
            base_path: None,
            for_gdal: true,
        }
    }
}

/// Outcome of closing the writers of a [`ZoomIndex`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloseSummary {
    /// Writers closed successfully
    pub closed: usize,

    /// Writers whose close failed. The failures have been logged.
    pub failed: usize,

    /// Entries added by all writers
    pub new_entries: usize,
}

/// The open writers of one run
#[derive(Default)]
struct Writers {
    writers: Vec<Box<dyn IndexWriter>>,
    summary: CloseSummary,
}

impl Writers {
    /// Closes every open writer. A failing writer does not keep the others
    /// from being closed.
    fn close_all(&mut self) {
        for writer in self.writers.drain(..) {
            let name = writer.to_string();
            debug!(writer = %name, "close");
            self.summary.new_entries += writer.new_entries();
            match writer.close() {
                Ok(()) => self.summary.closed += 1,
                Err(err) => {
                    error!(writer = %name, error = ?err, "writer could not be closed");
                    self.summary.failed += 1;
                }
            }
        }
    }
}

impl Drop for Writers {
    fn drop(&mut self) {
        self.close_all();
    }
}

/// Iterator over the tiles of a zoom level that records existing tile
/// outputs in index artifacts
pub struct ZoomIndex<'a> {
    output: &'a dyn OutputAccessor,
    tiles: Box<dyn Iterator<Item = Tile> + 'a>,
    writers: Writers,
    base_path: Option<String>,
    for_gdal: bool,
    tiles_yielded: usize,
    tiles_existing: usize,
    done: bool,
}

/// Opens one writer per requested format and returns an iterator over all
/// tiles of the area of interest at `zoom`.
///
/// Fails with [`IndexError::ZoomOutOfRange`] if `zoom` is deeper than
/// [`MAX_ZOOM`], with [`IndexError::NoFormat`] if none of GeoJSON, GeoPackage, or VRT
/// is requested and with [`IndexError::NotImplemented`] if VRT is
/// requested. In both cases nothing is written. A requested text index is
/// accepted but not written.
pub fn zoom_index_gen<'a>(
    grid: &'a dyn TileGrid,
    output: &'a dyn OutputAccessor,
    zoom: u8,
    options: &ZoomIndexOptions,
) -> Result<ZoomIndex<'a>> {
    if zoom > MAX_ZOOM {
        return Err(IndexError::ZoomOutOfRange {
            zoom,
            max: MAX_ZOOM,
        }
        .into());
    }

    let formats = options.formats;
    if !(formats.geojson || formats.gpkg || formats.vrt) {
        return Err(IndexError::NoFormat.into());
    }
    if formats.vrt {
        return Err(IndexError::NotImplemented("writing VRTs").into());
    }
    if formats.txt {
        debug!("text file index requested, but no writer is available for it");
    }

    fs::create_dir_all(&options.out_dir).with_context(|| {
        format!(
            "Unable to create index directory `{}'",
            options.out_dir.display()
        )
    })?;

    // writers opened so far are closed on drop if opening another one fails
    let mut writers = Writers::default();
    for format in formats.writer_formats() {
        let path = index_file_path(&options.out_dir, zoom, format);
        writers
            .writers
            .push(open_writer(path, grid.crs(), &options.field_name, format)?);
    }
    debug!(
        writers = ?writers.writers.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
        "opened index writers"
    );

    let area = grid.area_at(zoom);
    let tiles = grid.tiles_from_geom(&area, zoom);

    Ok(ZoomIndex {
        output,
        tiles,
        writers,
        base_path: options.base_path.clone(),
        for_gdal: options.for_gdal,
        tiles_yielded: 0,
        tiles_existing: 0,
        done: false,
    })
}

impl ZoomIndex<'_> {
    /// Number of tiles yielded so far
    pub fn tiles_yielded(&self) -> usize {
        self.tiles_yielded
    }

    /// Number of yielded tiles whose output exists
    pub fn tiles_existing(&self) -> usize {
        self.tiles_existing
    }

    /// Stops iterating and closes all writers that are still open
    pub fn close(mut self) -> CloseSummary {
        self.finish();
        self.writers.summary
    }

    fn finish(&mut self) {
        self.done = true;
        self.writers.close_all();
    }

    fn index_tile(&mut self, tile: &Tile) -> Result<()> {
        debug!(%tile, "analyze tile");
        let tile_path = resolve_tile_path(
            &self.output.path_for(tile),
            self.base_path.as_deref(),
            self.for_gdal,
        );

        if self.output.exists(tile)? {
            for writer in self.writers.writers.iter_mut() {
                writer.write(tile, &tile_path)?;
            }
            self.tiles_existing += 1;
        }

        Ok(())
    }
}

impl Iterator for ZoomIndex<'_> {
    type Item = Result<Tile>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let Some(tile) = self.tiles.next() else {
            self.finish();
            return None;
        };

        match self.index_tile(&tile) {
            Ok(()) => {
                self.tiles_yielded += 1;
                Some(Ok(tile))
            }
            Err(err) => {
                // writers are closed before the error reaches the caller
                self.finish();
                Some(Err(err.context(format!("Unable to index {tile}"))))
            }
        }
    }
}

impl FusedIterator for ZoomIndex<'_> {}
