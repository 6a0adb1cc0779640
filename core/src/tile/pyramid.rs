use std::str::FromStr;

use anyhow::{bail, Result};
use geo::{coord, BoundingRect, MultiPolygon, Rect, Relate};
use serde::Deserialize;

use super::{zoom_levels::MAX_ZOOM, Crs, Tile, TileGrid};

/// Half the circumference of the earth in web mercator meters
const MERCATOR_EXTENT: f64 = 20037508.342789244;

/// A standard tile grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grid {
    /// EPSG:4326, two tiles side by side at zoom level 0
    Geodetic,

    /// EPSG:3857, a single square tile at zoom level 0
    Mercator,
}

impl Grid {
    pub fn crs(&self) -> Crs {
        match self {
            Grid::Geodetic => Crs::from_epsg(4326),
            Grid::Mercator => Crs::from_epsg(3857),
        }
    }

    pub fn bounds(&self) -> Rect {
        match self {
            Grid::Geodetic => Rect::new(coord! { x: -180.0, y: -90.0 }, coord! { x: 180.0, y: 90.0 }),
            Grid::Mercator => Rect::new(
                coord! { x: -MERCATOR_EXTENT, y: -MERCATOR_EXTENT },
                coord! { x: MERCATOR_EXTENT, y: MERCATOR_EXTENT },
            ),
        }
    }

    /// Number of rows and columns at zoom level 0
    fn shape(&self) -> (u64, u64) {
        match self {
            Grid::Geodetic => (1, 2),
            Grid::Mercator => (1, 1),
        }
    }
}

impl FromStr for Grid {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "geodetic" => Ok(Grid::Geodetic),
            "mercator" => Ok(Grid::Mercator),
            _ => bail!("Unknown grid `{s}'. Expected `geodetic' or `mercator'."),
        }
    }
}

/// A tile pyramid over one of the standard grids, optionally restricted to
/// an area of interest
#[derive(Debug, Clone)]
pub struct TilePyramid {
    grid: Grid,
    metatiling: u32,
    crs: Crs,
    area: Option<MultiPolygon>,
}

impl TilePyramid {
    /// Creates a pyramid. `metatiling` merges that many tiles per axis into
    /// one and must be one of 1, 2, 4, 8, or 16.
    pub fn new(grid: Grid, metatiling: u32) -> Result<Self> {
        if !matches!(metatiling, 1 | 2 | 4 | 8 | 16) {
            bail!("Invalid metatiling {metatiling}. Must be one of 1, 2, 4, 8, or 16.");
        }
        Ok(Self {
            grid,
            metatiling,
            crs: grid.crs(),
            area: None,
        })
    }

    /// Restricts the area of interest, which otherwise covers the whole
    /// pyramid
    pub fn with_area(mut self, area: impl Into<MultiPolygon>) -> Self {
        self.area = Some(area.into());
        self
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    pub fn metatiling(&self) -> u32 {
        self.metatiling
    }

    pub fn bounds(&self) -> Rect {
        self.grid.bounds()
    }

    /// Number of tile rows at the given zoom level. Zoom levels beyond
    /// [`MAX_ZOOM`] have no tiles.
    pub fn matrix_height(&self, zoom: u8) -> u32 {
        self.matrix_size(self.grid.shape().0, zoom)
    }

    /// Number of tile columns at the given zoom level
    pub fn matrix_width(&self, zoom: u8) -> u32 {
        self.matrix_size(self.grid.shape().1, zoom)
    }

    fn matrix_size(&self, base: u64, zoom: u8) -> u32 {
        if zoom > MAX_ZOOM {
            return 0;
        }
        let cells = base << zoom;
        cells.div_ceil(self.metatiling as u64).max(1) as u32
    }

    /// Width and height of a tile at the given zoom level before clipping to
    /// the pyramid bounds. `zoom` must not exceed [`MAX_ZOOM`].
    fn tile_size(&self, zoom: u8) -> (f64, f64) {
        let bounds = self.bounds();
        let (rows, cols) = self.grid.shape();
        let m = self.metatiling as f64;
        (
            bounds.width() / (cols << zoom) as f64 * m,
            bounds.height() / (rows << zoom) as f64 * m,
        )
    }

    /// Returns the tile at the given position
    pub fn tile(&self, zoom: u8, row: u32, col: u32) -> Result<Tile> {
        if zoom > MAX_ZOOM {
            bail!("Zoom level {zoom} exceeds the maximum of {MAX_ZOOM}");
        }
        if row >= self.matrix_height(zoom) || col >= self.matrix_width(zoom) {
            bail!("Tile ({zoom}, {row}, {col}) is outside of the pyramid");
        }
        Ok(self.tile_unchecked(zoom, row, col))
    }

    fn tile_unchecked(&self, zoom: u8, row: u32, col: u32) -> Tile {
        let bounds = self.bounds();
        let (width, height) = self.tile_size(zoom);
        let left = bounds.min().x + col as f64 * width;
        let top = bounds.max().y - row as f64 * height;
        let right = (left + width).min(bounds.max().x);
        let bottom = (top - height).max(bounds.min().y);
        Tile::new(
            zoom,
            row,
            col,
            Rect::new(coord! { x: left, y: bottom }, coord! { x: right, y: top }),
        )
    }
}

impl TileGrid for TilePyramid {
    fn crs(&self) -> &Crs {
        &self.crs
    }

    fn area_at(&self, _zoom: u8) -> MultiPolygon {
        self.area
            .clone()
            .unwrap_or_else(|| MultiPolygon::new(vec![self.bounds().to_polygon()]))
    }

    fn tiles_from_geom<'a>(
        &'a self,
        area: &MultiPolygon,
        zoom: u8,
    ) -> Box<dyn Iterator<Item = Tile> + 'a> {
        if zoom > MAX_ZOOM {
            return Box::new(std::iter::empty());
        }
        let Some(area_bounds) = area.bounding_rect() else {
            return Box::new(std::iter::empty());
        };

        let bounds = self.bounds();
        let (width, height) = self.tile_size(zoom);
        let rows = self.matrix_height(zoom);
        let cols = self.matrix_width(zoom);

        let clamp = |v: f64, n: u32| v.max(0.0).min((n - 1) as f64) as u32;
        let col_min = clamp(((area_bounds.min().x - bounds.min().x) / width).floor(), cols);
        let col_max = clamp(((area_bounds.max().x - bounds.min().x) / width).ceil() - 1.0, cols);
        let row_min = clamp(((bounds.max().y - area_bounds.max().y) / height).floor(), rows);
        let row_max = clamp(((bounds.max().y - area_bounds.min().y) / height).ceil() - 1.0, rows);

        let area = area.clone();
        Box::new(
            (row_min..=row_max)
                .flat_map(move |row| (col_min..=col_max).map(move |col| (row, col)))
                .map(move |(row, col)| self.tile_unchecked(zoom, row, col))
                .filter(move |tile| {
                    // tiles that only share a border with the area do not cover it
                    let m = tile.bbox().relate(&area);
                    m.is_intersects() && !m.is_touches()
                }),
        )
    }
}

#[cfg(test)]
mod tests {
    use assertor::{assert_that, EqualityAssertion, ResultAssertion};
    use geo::{coord, LineString, MultiPolygon, Polygon, Rect};
    use pretty_assertions::assert_eq;

    use crate::tile::TileGrid;

    use super::{Grid, TilePyramid};

    fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Rect {
        Rect::new(coord! { x: min_x, y: min_y }, coord! { x: max_x, y: max_y })
    }

    #[test]
    fn matrix_shape() {
        let p = TilePyramid::new(Grid::Geodetic, 1).unwrap();
        assert_that!(p.matrix_height(0)).is_equal_to(1);
        assert_that!(p.matrix_width(0)).is_equal_to(2);
        assert_that!(p.matrix_height(3)).is_equal_to(8);
        assert_that!(p.matrix_width(3)).is_equal_to(16);

        let p = TilePyramid::new(Grid::Geodetic, 4).unwrap();
        assert_that!(p.matrix_height(0)).is_equal_to(1);
        assert_that!(p.matrix_width(0)).is_equal_to(1);
        assert_that!(p.matrix_height(3)).is_equal_to(2);
        assert_that!(p.matrix_width(3)).is_equal_to(4);

        let p = TilePyramid::new(Grid::Mercator, 1).unwrap();
        assert_that!(p.matrix_height(2)).is_equal_to(4);
        assert_that!(p.matrix_width(2)).is_equal_to(4);
    }

    #[test]
    fn invalid_metatiling() {
        assert_that!(TilePyramid::new(Grid::Geodetic, 3)).is_err();
        assert_that!(TilePyramid::new(Grid::Geodetic, 0)).is_err();
    }

    #[test]
    fn tile_bounds() {
        let p = TilePyramid::new(Grid::Geodetic, 1).unwrap();
        let t = p.tile(1, 0, 3).unwrap();
        assert_eq!(t.bounds, rect(90.0, 0.0, 180.0, 90.0));

        // metatiles are clipped to the pyramid bounds
        let p = TilePyramid::new(Grid::Geodetic, 2).unwrap();
        let t = p.tile(0, 0, 0).unwrap();
        assert_eq!(t.bounds, rect(-180.0, -90.0, 180.0, 90.0));

        assert_that!(p.tile(0, 1, 0)).is_err();
    }

    #[test]
    fn all_tiles_in_row_major_order() {
        let p = TilePyramid::new(Grid::Geodetic, 1).unwrap();
        let tiles = p
            .tiles_from_geom(&p.area_at(1), 1)
            .map(|t| (t.row, t.col))
            .collect::<Vec<_>>();
        assert_eq!(
            tiles,
            vec![
                (0, 0),
                (0, 1),
                (0, 2),
                (0, 3),
                (1, 0),
                (1, 1),
                (1, 2),
                (1, 3)
            ]
        );
    }

    #[test]
    fn tiles_of_area() {
        let p = TilePyramid::new(Grid::Geodetic, 1)
            .unwrap()
            .with_area(rect(10.0, 10.0, 100.0, 80.0).to_polygon());
        let tiles = p
            .tiles_from_geom(&p.area_at(1), 1)
            .map(|t| (t.row, t.col))
            .collect::<Vec<_>>();
        assert_eq!(tiles, vec![(0, 2), (0, 3)]);
    }

    #[test]
    fn touching_tiles_are_excluded() {
        // the triangle's hypotenuse touches tile (2, 0, 5) in a single corner
        let p = TilePyramid::new(Grid::Geodetic, 1).unwrap();
        let triangle = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (90.0, 0.0), (0.0, 90.0), (0.0, 0.0)]),
            vec![],
        );
        let area = MultiPolygon::new(vec![triangle]);
        let tiles = p
            .tiles_from_geom(&area, 2)
            .map(|t| (t.row, t.col))
            .collect::<Vec<_>>();
        assert_eq!(tiles, vec![(0, 4), (1, 4), (1, 5)]);
    }

    #[test]
    fn empty_area() {
        let p = TilePyramid::new(Grid::Mercator, 1).unwrap();
        let area = MultiPolygon::new(vec![]);
        assert_that!(p.tiles_from_geom(&area, 4).count()).is_equal_to(0);
    }

    #[test]
    fn no_tiles_beyond_max_zoom() {
        let p = TilePyramid::new(Grid::Geodetic, 1).unwrap();
        assert_that!(p.matrix_height(31)).is_equal_to(0);
        assert_that!(p.matrix_width(255)).is_equal_to(0);
        assert_that!(p.tiles_from_geom(&p.area_at(31), 31).count()).is_equal_to(0);
        assert_that!(p.tile(31, 0, 0)).is_err();

        assert_that!(p.matrix_width(30)).is_equal_to(2 << 30);
    }

    #[test]
    fn parse_grid() {
        assert_that!("Geodetic".parse::<Grid>().unwrap()).is_equal_to(Grid::Geodetic);
        assert_that!("mercator".parse::<Grid>().unwrap()).is_equal_to(Grid::Mercator);
        assert_that!("utm".parse::<Grid>()).is_err();
    }
}
