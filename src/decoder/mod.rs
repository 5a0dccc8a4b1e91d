pub mod archive;
pub mod kml;
