pub mod formats;
pub mod index;
