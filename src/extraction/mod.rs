pub mod buffer;
pub mod extractor;
pub mod labels;
pub mod patterns;

pub use buffer::LogBuffer;
pub use extractor::{extract, EventExtractor, Extraction, ExtractorConfig};
pub use labels::normalize_label;
