use anyhow::Result;

use crate::tile::Tile;

pub use self::tile_directory::TileDirectory;

pub mod tile_directory;

/// Knows where the output of a tile is stored and whether it exists
pub trait OutputAccessor {
    /// Checks if the output of `tile` has been written
    fn exists(&self, tile: &Tile) -> Result<bool>;

    /// Returns the canonical path of the output of `tile`
    fn path_for(&self, tile: &Tile) -> String;
}
