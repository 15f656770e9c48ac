use serde::{Deserialize, Serialize};

use super::OffsetStats;

/// Smallest and largest value seen.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn widen(self, value: f64) -> Self {
        Self {
            min: self.min.min(value),
            max: self.max.max(value),
        }
    }
}

/// Recall/precision for one label, counted over the sessions whose ground
/// truth contains that label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LabelBreakdown {
    pub label: String,
    pub sessions: u32,
    pub true_positives: u32,
    pub false_positives: u32,
    pub false_negatives: u32,
    pub recall: f64,
    pub precision: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SummaryReport {
    pub session_count: u32,
    pub completed_sessions: u32,
    pub timed_out_sessions: u32,
    pub failed_sessions: u32,
    pub total_detections: u32,
    pub accepted_detections: u32,
    pub rejected_detections: u32,
    pub acceptance_rate: f64,
    pub avg_detections_per_session: f64,
    pub true_positives: u32,
    pub false_positives: u32,
    pub false_negatives: u32,
    pub recall: f64,
    pub precision: f64,
    pub f1: f64,
    pub coverage: f64,
    /// Offsets over every match in the batch.
    pub offsets: OffsetStats,
    pub mean_confidence: f64,
    pub mean_latency_seconds: f64,
    pub mean_similarity: f64,
    pub confidence_range: Option<ValueRange>,
    pub latency_range: Option<ValueRange>,
    pub similarity_range: Option<ValueRange>,
    pub extraction_warnings: u32,
    pub per_label: Vec<LabelBreakdown>,
}
