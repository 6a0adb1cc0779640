//! Registry of the data formats tile outputs can be stored in
//!
//! The registry is a plain value built from a declared list of drivers. Build
//! one with [`DriverRegistry::default()`] and pass it by reference to
//! whatever needs to look up drivers.

use std::path::Path;

use anyhow::{bail, Context, Result};
use rustc_hash::FxHashMap;
use tracing::warn;

/// What a driver can do with a format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    Write,
    ReadWrite,
}

/// A capability to look drivers up by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Read,
    Write,
}

impl Mode {
    pub fn supports(&self, capability: Capability) -> bool {
        matches!(
            (self, capability),
            (Mode::ReadWrite, _) | (Mode::Read, Capability::Read) | (Mode::Write, Capability::Write)
        )
    }
}

/// Kind of data a driver handles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Raster,
    Vector,
}

/// Describes one driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverMetadata {
    pub name: String,
    pub mode: Mode,
    pub data_type: DataType,
    pub file_extensions: Vec<String>,
}

impl DriverMetadata {
    pub fn new(name: &str, mode: Mode, data_type: DataType, file_extensions: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            mode,
            data_type,
            file_extensions: file_extensions.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Looks up drivers by name, capability, or file extension
#[derive(Debug, Clone)]
pub struct DriverRegistry {
    drivers: Vec<DriverMetadata>,
    by_extension: FxHashMap<String, Vec<usize>>,
}

impl DriverRegistry {
    /// Creates a registry from the given drivers. The order of `drivers`
    /// decides which driver wins when several claim the same extension.
    pub fn new(drivers: Vec<DriverMetadata>) -> Result<Self> {
        if drivers.is_empty() {
            bail!("No drivers could be found");
        }

        for (i, d) in drivers.iter().enumerate() {
            if drivers[..i].iter().any(|other| other.name == d.name) {
                bail!("Driver `{}' is declared more than once", d.name);
            }
        }
        Ok(Self::build(drivers))
    }

    fn build(drivers: Vec<DriverMetadata>) -> Self {
        let mut by_extension: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        for (i, d) in drivers.iter().enumerate() {
            for ext in &d.file_extensions {
                by_extension.entry(ext.to_ascii_lowercase()).or_default().push(i);
            }
        }
        Self {
            drivers,
            by_extension,
        }
    }

    /// All drivers in declaration order
    pub fn drivers(&self) -> &[DriverMetadata] {
        &self.drivers
    }

    /// Returns the driver with the given name
    pub fn driver(&self, name: &str) -> Option<&DriverMetadata> {
        self.drivers.iter().find(|d| d.name == name)
    }

    /// Returns the sorted names of all drivers supporting `capability`
    pub fn formats_supporting(&self, capability: Capability) -> Vec<&str> {
        let mut names = self
            .drivers
            .iter()
            .filter(|d| d.mode.supports(capability))
            .map(|d| d.name.as_str())
            .collect::<Vec<_>>();
        names.sort_unstable();
        names
    }

    pub fn available_input_formats(&self) -> Vec<&str> {
        self.formats_supporting(Capability::Read)
    }

    pub fn available_output_formats(&self) -> Vec<&str> {
        self.formats_supporting(Capability::Write)
    }

    /// Determines the driver for a file from its extension. If several drivers
    /// claim the extension, the first declared one is used.
    pub fn driver_from_file(&self, path: impl AsRef<Path>) -> Result<&DriverMetadata> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .with_context(|| format!("File `{}' has no extension", path.display()))?;

        let candidates = self
            .by_extension
            .get(&ext.to_ascii_lowercase())
            .with_context(|| format!("No driver could be found for file extension `{ext}'"))?;

        let driver = &self.drivers[candidates[0]];
        if candidates.len() > 1 {
            warn!(
                extension = ext,
                driver = %driver.name,
                "more than one driver found for file extension"
            );
        }
        Ok(driver)
    }

    /// Returns the file extension a driver writes tiles with
    pub fn extension_for(&self, name: &str) -> Result<&str> {
        let driver = self
            .driver(name)
            .with_context(|| format!("Unknown driver `{name}'"))?;
        driver
            .file_extensions
            .first()
            .map(|e| e.as_str())
            .with_context(|| format!("Driver `{name}' has no file extension"))
    }
}

impl Default for DriverRegistry {
    /// The built-in drivers
    fn default() -> Self {
        use DataType::*;
        use Mode::*;

        let drivers = vec![
            DriverMetadata::new("Mapchete", Read, Raster, &["mapchete"]),
            DriverMetadata::new("raster_file", Read, Raster, &["tif", "vrt", "png", "jp2"]),
            DriverMetadata::new("vector_file", Read, Vector, &["shp", "geojson", "gpkg"]),
            DriverMetadata::new("GTiff", ReadWrite, Raster, &["tif"]),
            DriverMetadata::new("PNG", Write, Raster, &["png"]),
            DriverMetadata::new("PNG_hillshade", Write, Raster, &["png"]),
            DriverMetadata::new("GeoJSON", ReadWrite, Vector, &["geojson"]),
            DriverMetadata::new("FlatGeobuf", ReadWrite, Vector, &["fgb"]),
        ];

        Self::build(drivers)
    }
}
