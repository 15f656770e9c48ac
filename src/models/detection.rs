use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accepted,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Accepted => "accepted",
            Decision::Rejected => "rejected",
        }
    }

    /// Parses the decision word of a block end marker (`ACCEPTED`, `rejected`, ...).
    pub fn from_marker_word(word: &str) -> Option<Self> {
        if word.eq_ignore_ascii_case("accepted") {
            Some(Decision::Accepted)
        } else if word.eq_ignore_ascii_case("rejected") {
            Some(Decision::Rejected)
        } else {
            None
        }
    }
}

/// One detection attempt reported by the classifier, extracted from a single log block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectionEvent {
    /// Seconds from session start.
    pub timestamp: f64,
    pub video_id: String,
    pub predicted_label: String,
    /// Classifier confidence in `[0, 1]`.
    pub confidence: Option<f64>,
    /// Motion template similarity in `[0, 1]`.
    pub motion_similarity: Option<f64>,
    pub decision: Decision,
    pub analysis_latency_seconds: Option<f64>,
    pub motion_duration_seconds: Option<f64>,
}

impl DetectionEvent {
    pub fn is_accepted(&self) -> bool {
        self.decision == Decision::Accepted
    }
}

/// Counters kept while turning log text into events.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionStats {
    pub blocks_seen: u32,
    pub events: u32,
    /// Blocks closed with "no action" or a `(none)` label.
    pub no_action: u32,
    /// Blocks skipped for an unusable timestamp, decision or label.
    pub malformed: u32,
    /// Blocks still open when the stream ended or a new block began.
    pub unterminated: u32,
    /// Events whose clock ran backwards and were clamped.
    pub clamped_timestamps: u32,
    /// Events timed before the session origin, pinned to `t = 0`.
    pub before_origin: u32,
}

impl ExtractionStats {
    pub fn warnings(&self) -> u32 {
        self.malformed + self.unterminated + self.clamped_timestamps + self.before_origin
    }
}
