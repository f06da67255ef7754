//! Business logic services

pub mod aggregator;
pub mod assembler;
pub mod dish;
pub mod ocr;
pub mod recognition;

pub use aggregator::{Aggregator, RawConfidencePolicy};
pub use assembler::Limits;
pub use dish::DishService;
pub use ocr::OcrService;
pub use recognition::{LocalPipeline, RecognitionService};
