//! Per-video scoring results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{DetectionEvent, ExtractionStats};

/// How a detection session ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Completed,
    TimedOut,
    Failed,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Completed => "completed",
            TerminationReason::TimedOut => "timed_out",
            TerminationReason::Failed => "failed",
        }
    }
}

/// A true positive: an accepted event that claimed a ground-truth interval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventMatch {
    pub event_index: usize,
    pub interval_index: usize,
    pub label: String,
    /// Signed distance from the event to the interval (negative = early).
    pub offset_secs: f64,
}

/// How far matched events landed from their intervals, by magnitude.
/// An event inside its interval has offset 0.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OffsetStats {
    pub mean_secs: f64,
    pub median_secs: f64,
    pub max_secs: f64,
    /// Share of matches that fell inside the interval itself.
    pub within_interval_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LabelTally {
    pub true_positives: u32,
    pub false_positives: u32,
    pub false_negatives: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionScore {
    pub session_id: String,
    pub video_id: String,
    pub termination: TerminationReason,
    pub failure: Option<String>,
    pub events: Vec<DetectionEvent>,
    pub matches: Vec<EventMatch>,
    pub true_positives: u32,
    pub false_positives: u32,
    pub false_negatives: u32,
    pub accepted: u32,
    pub rejected: u32,
    pub recall: f64,
    pub precision: f64,
    pub f1: f64,
    pub coverage: f64,
    pub offsets: OffsetStats,
    /// Ground-truth time scale applied before matching; 1.0 when the
    /// timeline was not stretched.
    pub stretch_factor: f64,
    /// Distinct labels present in this video's ground truth, sorted.
    pub ground_truth_labels: Vec<String>,
    pub label_tallies: BTreeMap<String, LabelTally>,
    pub extraction: ExtractionStats,
}

impl SessionScore {
    pub fn has_ground_truth_label(&self, label: &str) -> bool {
        self.ground_truth_labels
            .binary_search_by(|candidate| candidate.as_str().cmp(label))
            .is_ok()
    }
}
