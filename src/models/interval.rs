use serde::{Deserialize, Serialize};

/// A labeled span of a video during which an action is known to happen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroundTruthInterval {
    pub video_id: String,
    pub label: String,
    pub start_seconds: f64,
    pub end_seconds: f64,
}

impl GroundTruthInterval {
    pub fn midpoint(&self) -> f64 {
        (self.start_seconds + self.end_seconds) / 2.0
    }

    /// Distance from `t` to the interval, zero when `t` lies inside it.
    pub fn distance_to(&self, t: f64) -> f64 {
        if t < self.start_seconds {
            self.start_seconds - t
        } else if t > self.end_seconds {
            t - self.end_seconds
        } else {
            0.0
        }
    }

    pub fn contains_with_tolerance(&self, t: f64, tolerance: f64) -> bool {
        t >= self.start_seconds - tolerance && t <= self.end_seconds + tolerance
    }
}
