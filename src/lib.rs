//! Print microscopy image metadata and, for plates, the files each series is
//! read from.

pub mod config;
pub mod data;
pub mod reader;
pub mod report;

pub use config::RunConfig;
pub use data::loader::open_image;
pub use reader::{ImageReader, OmeXmlReader, ReaderError};
pub use report::run_report;
