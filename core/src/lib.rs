pub mod error;
pub mod formats;
pub mod index;
pub mod output;
pub mod tile;
pub mod util;
