use std::{
    fmt::{self, Display},
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::tile::{Crs, Tile};

use super::{ExistingSnapshot, IndexEntry, IndexFormat, IndexWriter, FIXED_FIELDS};

/// Stores index entries in one vector file format
pub trait FeatureSink: Sized {
    /// The format this sink writes
    const FORMAT: IndexFormat;

    /// Fails if `field_name` cannot hold the tile output path in this format.
    /// Empty names and the fixed fields are always rejected.
    fn validate_field_name(field_name: &str) -> Result<()> {
        if field_name.is_empty() || FIXED_FIELDS.contains(&field_name) {
            bail!("Invalid path field name `{field_name}'");
        }
        Ok(())
    }

    /// Reads all entries of an existing artifact. `field_name` is the name of
    /// the field holding the tile output path.
    fn load(path: &Path, field_name: &str) -> Result<ExistingSnapshot>;

    /// Creates a new, empty artifact
    fn create(path: &Path, crs: &Crs, field_name: &str) -> Result<Self>;

    /// Appends an entry
    fn write_entry(&mut self, entry: &IndexEntry) -> Result<()>;

    /// Completes the artifact and releases the file
    fn finish(self) -> Result<()>;
}

/// An [`IndexWriter`] that merges new entries into a vector file. Entries of
/// an artifact that exists when the writer is opened are kept and never
/// overwritten.
///
/// The artifact is built in a hidden staging directory next to `path` and
/// moved over `path` when the writer is closed. An existing artifact stays
/// in place until then.
pub struct VectorFileWriter<S> {
    path: PathBuf,
    staging_dir: PathBuf,
    staged: PathBuf,
    existing: ExistingSnapshot,
    new_entries: usize,
    sink: S,
}

/// The staging directory of the artifact at `path`, e.g. `.5.gpkg.partial`
/// for `5.gpkg`. The staged file keeps the artifact's file name.
fn staging_paths(path: &Path) -> Result<(PathBuf, PathBuf)> {
    let file_name = path
        .file_name()
        .with_context(|| format!("Index path `{}' has no file name", path.display()))?;
    let staging_dir = path.with_file_name(format!(".{}.partial", file_name.to_string_lossy()));
    let staged = staging_dir.join(file_name);
    Ok((staging_dir, staged))
}

impl<S: FeatureSink> VectorFileWriter<S> {
    /// Opens the artifact at `path`. If it already exists, its entries are
    /// loaded and written to the new artifact before anything else.
    pub fn open(path: impl Into<PathBuf>, crs: &Crs, field_name: &str) -> Result<Self> {
        let path = path.into();
        debug!(format = %S::FORMAT, path = %path.display(), "initialize writer");

        S::validate_field_name(field_name)?;

        let existing = if path.is_file() {
            S::load(&path, field_name)
                .with_context(|| format!("Unable to read existing index `{}'", path.display()))?
        } else {
            ExistingSnapshot::default()
        };

        let (staging_dir, staged) = staging_paths(&path)?;
        if staging_dir.exists() {
            debug!(path = %staging_dir.display(), "removing stale staging directory");
            fs::remove_dir_all(&staging_dir)?;
        }
        fs::create_dir_all(&staging_dir).with_context(|| {
            format!(
                "Unable to create staging directory `{}'",
                staging_dir.display()
            )
        })?;

        let sink = match Self::stage(&staged, crs, field_name, &existing) {
            Ok(sink) => sink,
            Err(err) => {
                if let Err(e) = fs::remove_dir_all(&staging_dir) {
                    debug!(
                        path = %staging_dir.display(),
                        error = %e,
                        "unable to remove staging directory"
                    );
                }
                return Err(err.context(format!("Unable to create index `{}'", path.display())));
            }
        };

        Ok(Self {
            path,
            staging_dir,
            staged,
            existing,
            new_entries: 0,
            sink,
        })
    }

    fn stage(
        staged: &Path,
        crs: &Crs,
        field_name: &str,
        existing: &ExistingSnapshot,
    ) -> Result<S> {
        let mut sink = S::create(staged, crs, field_name)?;
        for entry in existing.entries() {
            sink.write_entry(entry)?;
        }
        Ok(sink)
    }

    /// Checks if the artifact had an entry for the tile when it was opened
    pub fn entry_exists(&self, tile: &Tile) -> bool {
        let exists = self.existing.contains(&tile.id());
        debug!(%tile, exists, "check for existing entry");
        exists
    }

    pub fn existing(&self) -> &ExistingSnapshot {
        &self.existing
    }
}

impl<S> Display for VectorFileWriter<S>
where
    S: FeatureSink,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VectorFileWriter({}, {})", S::FORMAT, self.path.display())
    }
}

impl<S: FeatureSink> IndexWriter for VectorFileWriter<S> {
    fn write(&mut self, tile: &Tile, path: &str) -> Result<()> {
        debug!(path, writer = %self, "write");
        if self.entry_exists(tile) {
            return Ok(());
        }
        self.sink.write_entry(&IndexEntry::from_tile(tile, path))?;
        self.new_entries += 1;
        Ok(())
    }

    fn new_entries(&self) -> usize {
        self.new_entries
    }

    fn close(self: Box<Self>) -> Result<()> {
        debug!(new_entries = self.new_entries, writer = %self, "close");
        let name = self.to_string();
        let VectorFileWriter {
            path,
            staging_dir,
            staged,
            sink,
            ..
        } = *self;

        sink.finish()
            .with_context(|| format!("Unable to finish {name}"))?;
        fs::rename(&staged, &path).with_context(|| {
            format!(
                "Unable to move `{}' to `{}'",
                staged.display(),
                path.display()
            )
        })?;
        fs::remove_dir_all(&staging_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use anyhow::{bail, Result};
    use assertor::{assert_that, BooleanAssertion, EqualityAssertion};
    use geo::{coord, Rect};
    use pretty_assertions::assert_eq;
    use tempdir::TempDir;

    use crate::{
        index::{geojson::GeoJsonSink, ExistingSnapshot, IndexEntry, IndexFormat, IndexWriter},
        tile::{Crs, Tile},
    };

    use super::{FeatureSink, VectorFileWriter};

    /// Loads one entry from any file and cannot create artifacts
    struct ReadOnlySink;

    impl FeatureSink for ReadOnlySink {
        const FORMAT: IndexFormat = IndexFormat::GeoJson;

        fn load(_path: &Path, field_name: &str) -> Result<ExistingSnapshot> {
            Ok(vec![IndexEntry {
                path: format!("{field_name}.tif"),
                ..IndexEntry::from_tile(&tile(0), "")
            }]
            .into_iter()
            .collect())
        }

        fn create(_path: &Path, _crs: &Crs, _field_name: &str) -> Result<Self> {
            bail!("read-only file system")
        }

        fn write_entry(&mut self, _entry: &IndexEntry) -> Result<()> {
            Ok(())
        }

        fn finish(self) -> Result<()> {
            Ok(())
        }
    }

    fn tile(col: u32) -> Tile {
        Tile::new(
            1,
            0,
            col,
            Rect::new(
                coord! { x: col as f64, y: 0.0 },
                coord! { x: col as f64 + 1.0, y: 1.0 },
            ),
        )
    }

    fn open_geojson(path: &Path) -> Box<VectorFileWriter<GeoJsonSink>> {
        Box::new(VectorFileWriter::open(path, &Crs::from_epsg(4326), "location").unwrap())
    }

    #[test]
    fn failed_create_keeps_existing_artifact() {
        let dir = TempDir::new("tileindex_writer").unwrap();
        let path = dir.path().join("1.geojson");
        fs::write(&path, "existing").unwrap();

        let err = VectorFileWriter::<ReadOnlySink>::open(&path, &Crs::from_epsg(4326), "location")
            .err()
            .unwrap();
        assert_that!(format!("{err:#}").contains("read-only file system")).is_true();

        assert_that!(fs::read_to_string(&path).unwrap()).is_equal_to("existing".to_string());
        assert_that!(dir.path().join(".1.geojson.partial").exists()).is_false();
    }

    #[test]
    fn artifact_is_replaced_on_close() {
        let dir = TempDir::new("tileindex_writer").unwrap();
        let path = dir.path().join("1.geojson");

        let mut writer = open_geojson(&path);
        writer.write(&tile(0), "0.tif").unwrap();
        writer.close().unwrap();
        let first = fs::read_to_string(&path).unwrap();

        let mut writer = open_geojson(&path);
        writer.write(&tile(1), "1.tif").unwrap();
        assert_that!(dir.path().join(".1.geojson.partial/1.geojson").is_file()).is_true();
        assert_eq!(fs::read_to_string(&path).unwrap(), first);

        writer.close().unwrap();
        assert_that!(dir.path().join(".1.geojson.partial").exists()).is_false();
        assert_that!(writer_entries(&path)).is_equal_to(2);
    }

    #[test]
    fn stale_staging_directory_is_replaced() {
        let dir = TempDir::new("tileindex_writer").unwrap();
        let path = dir.path().join("1.geojson");
        fs::create_dir_all(dir.path().join(".1.geojson.partial")).unwrap();
        fs::write(dir.path().join(".1.geojson.partial/1.geojson"), "garbage").unwrap();

        open_geojson(&path).close().unwrap();
        assert_that!(writer_entries(&path)).is_equal_to(0);
    }

    fn writer_entries(path: &Path) -> usize {
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        json["features"].as_array().unwrap().len()
    }
}
