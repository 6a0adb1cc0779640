use std::{
    fmt::{self, Display},
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::Result;
use geo::Polygon;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::{error::IndexError, tile::Crs, tile::Tile};

pub use self::zoom_index::{zoom_index_gen, CloseSummary, ZoomIndex, ZoomIndexOptions};

pub mod geojson;
pub mod gpkg;
pub mod path;
pub mod writer;
pub mod zoom_index;

/// Name of the field holding the tile output path if no other is given
pub const DEFAULT_FIELD_NAME: &str = "location";

/// Fields every index artifact has besides the path field
pub const FIXED_FIELDS: [&str; 4] = ["tile_id", "zoom", "row", "col"];

/// The kinds of index artifacts that can be requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    GeoJson,
    GeoPackage,
    Vrt,
    Text,
}

impl IndexFormat {
    /// The file extension of artifacts in this format
    pub fn extension(&self) -> &'static str {
        match self {
            IndexFormat::GeoJson => "geojson",
            IndexFormat::GeoPackage => "gpkg",
            IndexFormat::Vrt => "vrt",
            IndexFormat::Text => "txt",
        }
    }

    /// The conventional driver name of the format
    pub fn driver_name(&self) -> &'static str {
        match self {
            IndexFormat::GeoJson => "GeoJSON",
            IndexFormat::GeoPackage => "GPKG",
            IndexFormat::Vrt => "VRT",
            IndexFormat::Text => "TXT",
        }
    }
}

impl Display for IndexFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.driver_name())
    }
}

impl FromStr for IndexFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "geojson" => Ok(IndexFormat::GeoJson),
            "gpkg" | "geopackage" => Ok(IndexFormat::GeoPackage),
            "vrt" => Ok(IndexFormat::Vrt),
            "txt" | "text" => Ok(IndexFormat::Text),
            _ => Err(IndexError::UnsupportedFormat(s.to_string()).into()),
        }
    }
}

/// The set of index formats requested for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexFormats {
    pub geojson: bool,
    pub gpkg: bool,

    /// Accepted, but no text file is written
    pub txt: bool,

    /// Rejected as not implemented
    pub vrt: bool,
}

impl IndexFormats {
    /// Formats that are backed by an index writer, in a fixed order
    pub fn writer_formats(&self) -> Vec<IndexFormat> {
        let mut result = Vec::new();
        if self.geojson {
            result.push(IndexFormat::GeoJson);
        }
        if self.gpkg {
            result.push(IndexFormat::GeoPackage);
        }
        result
    }
}

impl FromIterator<IndexFormat> for IndexFormats {
    fn from_iter<T: IntoIterator<Item = IndexFormat>>(iter: T) -> Self {
        let mut formats = IndexFormats::default();
        for f in iter {
            match f {
                IndexFormat::GeoJson => formats.geojson = true,
                IndexFormat::GeoPackage => formats.gpkg = true,
                IndexFormat::Vrt => formats.vrt = true,
                IndexFormat::Text => formats.txt = true,
            }
        }
        formats
    }
}

/// Returns the path of the index artifact for the given zoom level and format
pub fn index_file_path(out_dir: impl AsRef<Path>, zoom: u8, format: IndexFormat) -> PathBuf {
    out_dir
        .as_ref()
        .join(format!("{zoom}.{}", format.extension()))
}

/// One catalog record for a tile. Zoom, row, and column are kept in their
/// string form because that is how they are stored.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub tile_id: String,
    pub zoom: String,
    pub row: String,
    pub col: String,
    pub path: String,
    pub geometry: Polygon,
}

impl IndexEntry {
    pub fn from_tile(tile: &Tile, path: &str) -> Self {
        Self {
            tile_id: tile.id(),
            zoom: tile.zoom.to_string(),
            row: tile.row.to_string(),
            col: tile.col.to_string(),
            path: path.to_string(),
            geometry: tile.bbox(),
        }
    }
}

/// Entries loaded from an index artifact that existed before a run. Keeps
/// the order in which entries were loaded.
#[derive(Debug, Default, Clone)]
pub struct ExistingSnapshot {
    entries: Vec<IndexEntry>,
    positions: FxHashMap<String, usize>,
}

impl ExistingSnapshot {
    /// Adds an entry. If an entry with the same tile ID has been added
    /// before, the new one replaces it at the earlier position.
    pub fn insert(&mut self, entry: IndexEntry) {
        match self.positions.get(&entry.tile_id) {
            Some(&i) => {
                debug!(tile_id = %entry.tile_id, "replacing duplicate entry in existing index");
                self.entries[i] = entry;
            }
            None => {
                self.positions
                    .insert(entry.tile_id.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    pub fn contains(&self, tile_id: &str) -> bool {
        self.positions.contains_key(tile_id)
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<IndexEntry> for ExistingSnapshot {
    fn from_iter<T: IntoIterator<Item = IndexEntry>>(iter: T) -> Self {
        let mut snapshot = ExistingSnapshot::default();
        for e in iter {
            snapshot.insert(e);
        }
        snapshot
    }
}

/// A sink that owns one index artifact for one zoom level
pub trait IndexWriter: Display {
    /// Adds an entry for `tile` pointing to `path`, unless the artifact
    /// already had an entry for the tile when the writer was opened
    fn write(&mut self, tile: &Tile, path: &str) -> Result<()>;

    /// Number of entries added since the writer was opened
    fn new_entries(&self) -> usize;

    /// Flushes the artifact and releases the file
    fn close(self: Box<Self>) -> Result<()>;
}

/// Opens an index writer for the given format
pub fn open_writer(
    path: impl Into<PathBuf>,
    crs: &Crs,
    field_name: &str,
    format: IndexFormat,
) -> Result<Box<dyn IndexWriter>> {
    let path = path.into();
    let writer: Box<dyn IndexWriter> = match format {
        IndexFormat::GeoJson => Box::new(writer::VectorFileWriter::<geojson::GeoJsonSink>::open(
            path, crs, field_name,
        )?),
        IndexFormat::GeoPackage => Box::new(
            writer::VectorFileWriter::<gpkg::GeoPackageSink>::open(path, crs, field_name)?,
        ),
        IndexFormat::Vrt | IndexFormat::Text => {
            return Err(IndexError::UnsupportedFormat(format.to_string()).into())
        }
    };
    Ok(writer)
}
