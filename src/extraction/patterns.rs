//! The log grammar of the detection service.
//!
//! This is the only place that knows how the detector phrases its output.
//! Everything downstream works on `DetectionEvent`s.

use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, Timelike};
use regex::Regex;

/// A recognized line inside (or opening/closing) a detection block.
#[derive(Debug, Clone, PartialEq)]
pub enum LineKind {
    BlockStart {
        /// Local time of day from an RFC 3339 log prefix, in seconds since
        /// midnight.
        prefix_clock: Option<f64>,
    },
    Clock {
        raw: String,
        motion_duration: Option<f64>,
    },
    Similarity(f64),
    Label(String),
    Confidence(f64),
    AnalysisLatency(f64),
    BlockEnd {
        decision_word: String,
        label: Option<String>,
        confidence: Option<f64>,
    },
    NoAction,
    Other,
}

pub struct LogPatterns {
    block_start: Regex,
    iso_prefix: Regex,
    clock: Regex,
    similarity: Regex,
    label: Regex,
    confidence: Regex,
    analysis_latency: Regex,
    block_end: Regex,
    end_confidence: Regex,
    no_action: Regex,
}

impl LogPatterns {
    pub fn new() -> Self {
        Self {
            block_start: Regex::new(r"={3,}\s*MOTION DETECTED\s*={3,}").unwrap(),
            iso_prefix: Regex::new(
                r"(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:\d{2})?)",
            )
            .unwrap(),
            clock: Regex::new(r"\bTime:\s*([^\s|]+)(?:.*?\bDuration:\s*([\d.]+)\s*s)?").unwrap(),
            similarity: Regex::new(r"(?i)\bSimilarity:\s*([\d.]+)\s*%").unwrap(),
            label: Regex::new(r#"Detected Action:\s*([^{"\n]+)"#).unwrap(),
            confidence: Regex::new(r"(?i)\bConfidence:\s*([\d.]+)\s*%").unwrap(),
            analysis_latency: Regex::new(r"(?i)Analysis Duration:\s*([\d.]+)\s*s").unwrap(),
            // Only a timestamp/level prefix, emoji and punctuation may precede it
            block_end: Regex::new(
                r"(?i)^(?:\d{4}-\d{2}-\d{2}T\S+\s+(?:[a-z]+\s+)?)?[^\p{L}\p{N}]*action\s+(\w+)\s*:\s*(.*)$",
            )
            .unwrap(),
            end_confidence: Regex::new(r"(?i)\(\s*(?:confidence:\s*)?([\d.]+)\s*%").unwrap(),
            no_action: Regex::new(r"(?i)\bno action detected\b").unwrap(),
        }
    }

    /// Classifies one raw log line. Field lines are checked before the end
    /// marker so that `Detected Action:` never reads as a decision.
    pub fn classify(&self, line: &str) -> LineKind {
        if self.block_start.is_match(line) {
            let prefix_clock = self
                .iso_prefix
                .captures(line)
                .and_then(|caps| parse_iso_clock(&caps[1]));
            return LineKind::BlockStart { prefix_clock };
        }

        if self.no_action.is_match(line) {
            return LineKind::NoAction;
        }

        if let Some(caps) = self.label.captures(line) {
            return LineKind::Label(caps[1].trim().to_string());
        }

        if let Some(caps) = self.analysis_latency.captures(line) {
            if let Ok(value) = caps[1].parse() {
                return LineKind::AnalysisLatency(value);
            }
        }

        if let Some(caps) = self.clock.captures(line) {
            return LineKind::Clock {
                raw: caps[1].to_string(),
                motion_duration: caps.get(2).and_then(|m| m.as_str().parse().ok()),
            };
        }

        if let Some(caps) = self.similarity.captures(line) {
            if let Ok(value) = caps[1].parse() {
                return LineKind::Similarity(value);
            }
        }

        if let Some(caps) = self.block_end.captures(line) {
            let rest = caps[2].trim();
            let confidence = self
                .end_confidence
                .captures(rest)
                .and_then(|c| c[1].parse().ok());
            let label = rest
                .split('(')
                .next()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            return LineKind::BlockEnd {
                decision_word: caps[1].to_string(),
                label,
                confidence,
            };
        }

        if let Some(caps) = self.confidence.captures(line) {
            if let Ok(value) = caps[1].parse() {
                return LineKind::Confidence(value);
            }
        }

        LineKind::Other
    }
}

impl Default for LogPatterns {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses `HH:MM:SS[.fff]` into seconds since midnight.
pub fn parse_clock(raw: &str) -> Option<f64> {
    let time = NaiveTime::parse_from_str(raw.trim(), "%H:%M:%S%.f").ok()?;
    Some(seconds_of_day(&time))
}

/// Zoned stamps are converted to local wall time so they share a clock with
/// the `Time:` lines and the session origin. Unzoned stamps are taken as local.
fn parse_iso_clock(raw: &str) -> Option<f64> {
    let time = match DateTime::parse_from_rfc3339(raw) {
        Ok(zoned) => zoned.with_timezone(&Local).time(),
        Err(_) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()?
            .time(),
    };
    Some(seconds_of_day(&time))
}

pub(crate) fn seconds_of_day(time: &NaiveTime) -> f64 {
    // Leap seconds report nanoseconds past 1e9
    time.num_seconds_from_midnight() as f64 + f64::from(time.nanosecond() % 1_000_000_000) / 1e9
}
