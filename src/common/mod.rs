mod download;
mod fs;
mod proj;

pub use download::fetch_to_file;
pub use fs::*;
pub use proj::{wgs84_to_utm33, Wgs84ToUtm33};
