use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while setting up or running an index generation that
/// callers may want to tell apart
#[derive(Error, Debug, PartialEq, Eq)]
pub enum IndexError {
    /// None of the index formats producing an artifact was requested
    #[error("one of 'geojson', 'gpkg' or 'vrt' must be provided")]
    NoFormat,

    /// The requested feature exists as a flag but has no implementation
    #[error("{0} is not yet enabled")]
    NotImplemented(&'static str),

    /// The zoom level is deeper than any tile pyramid supports
    #[error("zoom level {zoom} exceeds the maximum of {max}")]
    ZoomOutOfRange { zoom: u8, max: u8 },

    /// An index writer was requested for a format it cannot write
    #[error("unsupported index writer format `{0}'. Only GeoJSON and GPKG are allowed.")]
    UnsupportedFormat(String),

    /// An existing index artifact does not contain a required field
    #[error("existing index `{}' has no field `{field}'", path.display())]
    MissingField { path: PathBuf, field: String },

    /// An existing index artifact could not be interpreted
    #[error("existing index `{}' is invalid: {reason}", path.display())]
    InvalidArtifact { path: PathBuf, reason: String },
}
