use std::{fs, io::ErrorKind, path::Path};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::{
    formats::DriverRegistry,
    index::path::path_is_remote,
    tile::{zoom_levels::MAX_ZOOM, Grid, Tile, TilePyramid},
};

use super::OutputAccessor;

/// Name of the file describing a tile directory
pub const METADATA_FILE: &str = "metadata.json";

#[derive(Deserialize)]
struct Metadata {
    driver: DriverParams,
    pyramid: PyramidParams,
}

#[derive(Deserialize)]
struct DriverParams {
    format: String,
}

#[derive(Deserialize)]
struct PyramidParams {
    grid: GridParams,
    #[serde(default = "default_metatiling")]
    metatiling: u32,
}

/// A grid is given either by name or as an object with a `type` key
#[derive(Deserialize)]
#[serde(untagged)]
enum GridParams {
    Name(Grid),
    Object {
        #[serde(rename = "type")]
        kind: Grid,
    },
}

fn default_metatiling() -> u32 {
    1
}

/// Tile outputs stored as `<path>/<zoom>/<row>/<col>.<extension>`
#[derive(Debug, Clone)]
pub struct TileDirectory {
    path: String,
    extension: String,
    pyramid: TilePyramid,
}

impl TileDirectory {
    pub fn new(path: &str, extension: &str, pyramid: TilePyramid) -> Self {
        let trimmed = match path.trim_end_matches('/') {
            "" => path,
            p => p,
        };
        Self {
            path: trimmed.to_string(),
            extension: extension.trim_start_matches('.').to_string(),
            pyramid,
        }
    }

    /// Opens a tile directory described by its `metadata.json`. The driver
    /// named there decides the tile file extension.
    pub fn open(path: &str, registry: &DriverRegistry) -> Result<Self> {
        let metadata_path = Path::new(path).join(METADATA_FILE);
        let metadata = fs::read_to_string(&metadata_path)
            .with_context(|| format!("Unable to read `{}'", metadata_path.display()))?;
        let metadata: Metadata = serde_json::from_str(&metadata)
            .with_context(|| format!("Invalid tile directory metadata `{}'", metadata_path.display()))?;

        let extension = registry.extension_for(&metadata.driver.format)?;
        let grid = match metadata.pyramid.grid {
            GridParams::Name(grid) | GridParams::Object { kind: grid } => grid,
        };
        let pyramid = TilePyramid::new(grid, metadata.pyramid.metatiling)?;

        Ok(Self::new(path, extension, pyramid))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn pyramid(&self) -> &TilePyramid {
        &self.pyramid
    }

    /// Returns the zoom levels up to [`MAX_ZOOM`] that have a sub-directory,
    /// in ascending order
    pub fn zoom_levels(&self) -> Result<Vec<u8>> {
        if path_is_remote(&self.path) {
            bail!("Unable to list remote tile directory `{}'", self.path);
        }
        let mut result = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            match entry.file_name().to_str().and_then(|n| n.parse::<u8>().ok()) {
                Some(zoom) if zoom <= MAX_ZOOM => result.push(zoom),
                Some(zoom) => debug!(zoom, "skipping zoom level directory beyond the maximum"),
                None => {}
            }
        }
        result.sort_unstable();
        Ok(result)
    }
}

impl OutputAccessor for TileDirectory {
    fn exists(&self, tile: &Tile) -> Result<bool> {
        let path = self.path_for(tile);
        if path_is_remote(&path) {
            bail!("Unable to check if remote tile `{path}' exists");
        }
        match fs::metadata(&path) {
            Ok(m) => Ok(m.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Unable to access tile `{path}'")),
        }
    }

    fn path_for(&self, tile: &Tile) -> String {
        format!(
            "{}/{}/{}/{}.{}",
            self.path, tile.zoom, tile.row, tile.col, self.extension
        )
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use assertor::{assert_that, BooleanAssertion, EqualityAssertion, ResultAssertion};
    use pretty_assertions::assert_eq;
    use tempdir::TempDir;

    use crate::{
        formats::DriverRegistry,
        output::OutputAccessor,
        tile::{Grid, TilePyramid},
    };

    use super::TileDirectory;

    #[test]
    fn tile_paths() {
        let pyramid = TilePyramid::new(Grid::Geodetic, 1).unwrap();
        let dir = TileDirectory::new("/data/out/", ".tif", pyramid.clone());
        let tile = pyramid.tile(3, 2, 9).unwrap();
        assert_eq!(dir.path_for(&tile), "/data/out/3/2/9.tif");
    }

    #[test]
    fn exists() {
        let tmp = TempDir::new("tileindex_tile_directory").unwrap();
        let base = tmp.path().to_str().unwrap();
        let pyramid = TilePyramid::new(Grid::Geodetic, 1).unwrap();
        let dir = TileDirectory::new(base, "png", pyramid.clone());

        let tile = pyramid.tile(1, 0, 1).unwrap();
        assert_that!(dir.exists(&tile).unwrap()).is_false();

        fs::create_dir_all(tmp.path().join("1/0")).unwrap();
        fs::write(tmp.path().join("1/0/1.png"), b"").unwrap();
        assert_that!(dir.exists(&tile).unwrap()).is_true();

        // a directory is not a tile
        fs::create_dir_all(tmp.path().join("1/0/2.png")).unwrap();
        let tile = pyramid.tile(1, 0, 2).unwrap();
        assert_that!(dir.exists(&tile).unwrap()).is_false();

        assert_eq!(dir.zoom_levels().unwrap(), vec![1]);
    }

    #[test]
    fn zoom_levels_beyond_maximum_are_skipped() {
        let tmp = TempDir::new("tileindex_tile_directory").unwrap();
        for name in ["0", "30", "31", "255", "256", "tmp"] {
            fs::create_dir_all(tmp.path().join(name)).unwrap();
        }
        let pyramid = TilePyramid::new(Grid::Geodetic, 1).unwrap();
        let dir = TileDirectory::new(tmp.path().to_str().unwrap(), "tif", pyramid);
        assert_eq!(dir.zoom_levels().unwrap(), vec![0, 30]);
    }

    #[test]
    fn remote_exists_fails() {
        let pyramid = TilePyramid::new(Grid::Mercator, 1).unwrap();
        let dir = TileDirectory::new("https://example.com/tiles", "tif", pyramid.clone());
        let tile = pyramid.tile(0, 0, 0).unwrap();
        assert_that!(dir.exists(&tile)).is_err();
    }

    #[test]
    fn open_with_metadata() {
        let tmp = TempDir::new("tileindex_tile_directory").unwrap();
        fs::write(
            tmp.path().join("metadata.json"),
            r#"{
                "driver": {"format": "GTiff", "dtype": "uint8"},
                "pyramid": {"grid": {"type": "mercator"}, "metatiling": 2, "tile_size": 256}
            }"#,
        )
        .unwrap();

        let dir = TileDirectory::open(tmp.path().to_str().unwrap(), &DriverRegistry::default())
            .unwrap();
        assert_that!(dir.extension()).is_equal_to("tif");
        assert_that!(dir.pyramid().grid()).is_equal_to(Grid::Mercator);
        assert_that!(dir.pyramid().metatiling()).is_equal_to(2);
    }

    #[test]
    fn open_with_grid_name() {
        let tmp = TempDir::new("tileindex_tile_directory").unwrap();
        fs::write(
            tmp.path().join("metadata.json"),
            r#"{"driver": {"format": "PNG"}, "pyramid": {"grid": "geodetic"}}"#,
        )
        .unwrap();

        let dir = TileDirectory::open(tmp.path().to_str().unwrap(), &DriverRegistry::default())
            .unwrap();
        assert_that!(dir.extension()).is_equal_to("png");
        assert_that!(dir.pyramid().metatiling()).is_equal_to(1);
    }

    #[test]
    fn open_with_unknown_driver() {
        let tmp = TempDir::new("tileindex_tile_directory").unwrap();
        fs::write(
            tmp.path().join("metadata.json"),
            r#"{"driver": {"format": "JPEG"}, "pyramid": {"grid": "geodetic"}}"#,
        )
        .unwrap();
        assert_that!(TileDirectory::open(
            tmp.path().to_str().unwrap(),
            &DriverRegistry::default()
        ))
        .is_err();
    }
}
