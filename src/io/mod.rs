//! I/O modules for reading DEM tiles and rendering divide trees

pub mod dem;
pub mod kml;
pub mod text;

pub use dem::{DemFormat, DemReader, Tile};
pub use kml::{KmlPeakStyle, KmlWriter};
pub use text::TextWriter;
