use std::fmt::{self, Display};

use geo::{MultiPolygon, Polygon, Rect};

pub use self::pyramid::{Grid, TilePyramid};
pub use self::zoom_levels::ZoomLevels;

pub mod pyramid;
pub mod zoom_levels;

/// Identifies a coordinate reference system, e.g. `EPSG:4326`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Crs(String);

impl Crs {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn from_epsg(code: u32) -> Self {
        Self(format!("EPSG:{code}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the EPSG code if this CRS is given as `EPSG:<code>`
    pub fn epsg(&self) -> Option<u32> {
        let (authority, code) = self.0.split_once(':')?;
        if !authority.eq_ignore_ascii_case("EPSG") {
            return None;
        }
        code.trim().parse().ok()
    }

    /// Renders the CRS as an OGC URN if it has an EPSG code, otherwise
    /// returns the name unchanged
    pub fn to_urn(&self) -> String {
        match self.epsg() {
            Some(code) => format!("urn:ogc:def:crs:EPSG::{code}"),
            None => self.0.clone(),
        }
    }
}

impl Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One cell of a tile pyramid at a zoom level
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tile {
    pub zoom: u8,
    pub row: u32,
    pub col: u32,

    /// The tile's extent in the pyramid's CRS
    pub bounds: Rect,
}

impl Tile {
    pub fn new(zoom: u8, row: u32, col: u32, bounds: Rect) -> Self {
        Self {
            zoom,
            row,
            col,
            bounds,
        }
    }

    /// The tile's canonical identifier, unique per zoom, row, and column
    pub fn id(&self) -> String {
        format!("({}, {}, {})", self.zoom, self.row, self.col)
    }

    /// The tile's bounding polygon
    pub fn bbox(&self) -> Polygon {
        self.bounds.to_polygon()
    }
}

impl Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tile({}, {}, {})", self.zoom, self.row, self.col)
    }
}

/// Enumerates the tiles of a pyramid that cover an area of interest
pub trait TileGrid {
    /// The CRS all tile geometries are expressed in
    fn crs(&self) -> &Crs;

    /// Returns the area of interest at the given zoom level
    fn area_at(&self, zoom: u8) -> MultiPolygon;

    /// Returns all tiles at `zoom` that cover `area`. The order is fixed for
    /// a given grid, area, and zoom level.
    fn tiles_from_geom<'a>(
        &'a self,
        area: &MultiPolygon,
        zoom: u8,
    ) -> Box<dyn Iterator<Item = Tile> + 'a>;
}
