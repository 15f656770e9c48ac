use crate::models::{Decision, DetectionEvent, ExtractionStats};

use super::buffer::LogBuffer;
use super::labels::{is_no_action_label, normalize_label};
use super::patterns::{parse_clock, LineKind, LogPatterns};

const SECS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub video_id: String,
    /// Time of day (seconds since midnight) that maps to `t = 0`. When unset,
    /// the first block with a usable clock becomes the origin.
    pub origin_secs: Option<f64>,
}

impl ExtractorConfig {
    pub fn new(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            origin_secs: None,
        }
    }

    pub fn with_origin(mut self, origin_secs: f64) -> Self {
        self.origin_secs = Some(origin_secs);
        self
    }
}

/// Result of running an extractor to the end of its stream.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub events: Vec<DetectionEvent>,
    pub stats: ExtractionStats,
}

/// Fields collected from the lines of a block that has not closed yet.
/// The first occurrence of each field wins.
#[derive(Debug, Default)]
struct OpenBlock {
    prefix_clock: Option<f64>,
    clock: Option<String>,
    motion_duration: Option<f64>,
    similarity: Option<f64>,
    label: Option<String>,
    confidence: Option<f64>,
    latency: Option<f64>,
}

enum BlockOutcome {
    Event(DetectionEvent),
    NoAction,
    Malformed(&'static str),
}

/// Incremental parser from detector log lines to `DetectionEvent`s.
pub struct EventExtractor {
    config: ExtractorConfig,
    patterns: LogPatterns,
    offset: usize,
    open: Option<OpenBlock>,
    origin: Option<f64>,
    last_timestamp: Option<f64>,
    events: Vec<DetectionEvent>,
    stats: ExtractionStats,
}

impl EventExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self::starting_at(config, 0)
    }

    /// Starts consuming a buffer at `offset`, which should sit on a block
    /// boundary (for example an offset previously returned by `offset()`
    /// while no block was open).
    pub fn starting_at(config: ExtractorConfig, offset: usize) -> Self {
        let origin = config.origin_secs;
        Self {
            config,
            patterns: LogPatterns::new(),
            offset,
            open: None,
            origin,
            last_timestamp: None,
            events: Vec::new(),
            stats: ExtractionStats::default(),
        }
    }

    /// Number of buffer lines consumed so far.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn has_open_block(&self) -> bool {
        self.open.is_some()
    }

    /// Consumes every buffered line past the current offset and returns the
    /// events those lines completed.
    pub fn catch_up(&mut self, buffer: &LogBuffer) -> &[DetectionEvent] {
        let first_new = self.events.len();
        for line in buffer.lines_from(self.offset) {
            self.consume_line(line);
            self.offset += 1;
        }
        &self.events[first_new..]
    }

    /// Feeds a single line that is not held in a `LogBuffer`.
    pub fn push_line(&mut self, line: &str) -> Option<&DetectionEvent> {
        let before = self.events.len();
        self.consume_line(line);
        self.offset += 1;
        if self.events.len() > before {
            self.events.last()
        } else {
            None
        }
    }

    /// Ends the stream. A block still open at this point is discarded.
    pub fn finish(mut self) -> Extraction {
        if self.open.take().is_some() {
            self.stats.unterminated += 1;
            log::warn!(
                "[extraction] {}: discarding unterminated block at end of stream",
                self.config.video_id
            );
        }
        Extraction {
            events: self.events,
            stats: self.stats,
        }
    }

    fn consume_line(&mut self, line: &str) {
        let kind = self.patterns.classify(line);

        if let LineKind::BlockStart { prefix_clock } = kind {
            if self.open.is_some() {
                self.stats.unterminated += 1;
                log::warn!(
                    "[extraction] {}: block opened before the previous one closed",
                    self.config.video_id
                );
            }
            self.stats.blocks_seen += 1;
            self.open = Some(OpenBlock {
                prefix_clock,
                ..OpenBlock::default()
            });
            return;
        }

        let Some(block) = self.open.as_mut() else {
            return;
        };

        match kind {
            LineKind::Clock {
                raw,
                motion_duration,
            } => {
                if block.clock.is_none() {
                    block.clock = Some(raw);
                    block.motion_duration = motion_duration;
                }
            }
            LineKind::Similarity(value) => {
                block.similarity.get_or_insert(value);
            }
            LineKind::Label(value) => {
                block.label.get_or_insert(value);
            }
            LineKind::Confidence(value) => {
                block.confidence.get_or_insert(value);
            }
            LineKind::AnalysisLatency(value) => {
                block.latency.get_or_insert(value);
            }
            LineKind::NoAction => {
                self.open = None;
                self.stats.no_action += 1;
            }
            LineKind::BlockEnd {
                decision_word,
                label,
                confidence,
            } => {
                if let Some(block) = self.open.take() {
                    let outcome = self.close_block(block, &decision_word, label, confidence);
                    self.record(outcome);
                }
            }
            LineKind::BlockStart { .. } | LineKind::Other => {}
        }
    }

    fn close_block(
        &mut self,
        block: OpenBlock,
        decision_word: &str,
        end_label: Option<String>,
        end_confidence: Option<f64>,
    ) -> BlockOutcome {
        let Some(decision) = Decision::from_marker_word(decision_word) else {
            return BlockOutcome::Malformed("unknown decision");
        };

        let Some(raw_label) = block.label.or(end_label) else {
            return BlockOutcome::Malformed("missing label");
        };
        let label = normalize_label(&raw_label);
        if label.is_empty() {
            return BlockOutcome::Malformed("missing label");
        }
        if is_no_action_label(&label) {
            return BlockOutcome::NoAction;
        }

        let clock = match block.clock {
            Some(raw) => match parse_clock(&raw) {
                Some(clock) => clock,
                None => return BlockOutcome::Malformed("unparsable timestamp"),
            },
            None => match block.prefix_clock {
                Some(clock) => clock,
                None => return BlockOutcome::Malformed("missing timestamp"),
            },
        };

        let timestamp = self.session_time(clock);

        BlockOutcome::Event(DetectionEvent {
            timestamp,
            video_id: self.config.video_id.clone(),
            predicted_label: label,
            confidence: end_confidence.or(block.confidence).map(percent_to_unit),
            motion_similarity: block.similarity.map(percent_to_unit),
            decision,
            analysis_latency_seconds: block.latency,
            motion_duration_seconds: block.motion_duration,
        })
    }

    fn record(&mut self, outcome: BlockOutcome) {
        match outcome {
            BlockOutcome::Event(mut event) => {
                if let Some(last) = self.last_timestamp {
                    if event.timestamp < last {
                        log::warn!(
                            "[extraction] {}: clock ran backwards ({:.2}s < {:.2}s), clamping",
                            self.config.video_id,
                            event.timestamp,
                            last
                        );
                        event.timestamp = last;
                        self.stats.clamped_timestamps += 1;
                    }
                }
                self.last_timestamp = Some(event.timestamp);
                self.stats.events += 1;
                self.events.push(event);
            }
            BlockOutcome::NoAction => self.stats.no_action += 1,
            BlockOutcome::Malformed(reason) => {
                self.stats.malformed += 1;
                log::warn!(
                    "[extraction] {}: skipping malformed block ({reason})",
                    self.config.video_id
                );
            }
        }
    }

    /// Converts a time of day to seconds from the session origin, wrapping
    /// across midnight. Clocks before the origin are pinned to zero and
    /// counted.
    fn session_time(&mut self, clock: f64) -> f64 {
        let origin = *self.origin.get_or_insert(clock);
        let mut relative = clock - origin;
        if relative < -SECS_PER_DAY / 2.0 {
            relative += SECS_PER_DAY;
        }
        if relative < 0.0 {
            log::warn!(
                "[extraction] {}: clock {:.2}s is {:.2}s before the session origin, pinning to 0",
                self.config.video_id,
                clock,
                -relative
            );
            self.stats.before_origin += 1;
            return 0.0;
        }
        relative
    }
}

/// One-shot extraction over a complete capture.
pub fn extract(text: &str, config: ExtractorConfig) -> Extraction {
    let mut extractor = EventExtractor::new(config);
    for line in text.lines() {
        extractor.push_line(line);
    }
    extractor.finish()
}

fn percent_to_unit(value: f64) -> f64 {
    (value / 100.0).clamp(0.0, 1.0)
}
