pub mod detection;
pub mod interval;
pub mod report;
pub mod score;

pub use detection::{Decision, DetectionEvent, ExtractionStats};
pub use interval::GroundTruthInterval;
pub use report::{LabelBreakdown, SummaryReport, ValueRange};
pub use score::{EventMatch, LabelTally, OffsetStats, SessionScore, TerminationReason};
