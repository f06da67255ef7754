//! Data models

pub mod prediction;
pub mod recognition;
pub mod ocr;
pub mod dish;

pub use prediction::*;
pub use recognition::*;
pub use ocr::*;
pub use dish::*;
