use serde::{Deserialize, Serialize};

/// Configuration for matching detections against ground truth.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AlignmentConfig {
    /// Slack added to both ends of every interval to absorb detection latency
    pub tolerance_secs: f64,

    /// Rescale the ground-truth timeline onto the span of accepted detections
    /// before matching (compensates for replay speed drift)
    pub stretch_timeline: bool,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            tolerance_secs: 5.0,
            stretch_timeline: false,
        }
    }
}
