//! Batch-level reduction of per-video scores.

use std::collections::BTreeMap;

use crate::alignment::scoring::{
    f1, mean_of_present, offset_stats, precision, range_of_present, ratio, recall,
};
use crate::models::{LabelBreakdown, LabelTally, SessionScore, SummaryReport, TerminationReason};

#[derive(Debug, Default)]
struct LabelAccumulator {
    sessions: u32,
    tally: LabelTally,
}

/// Folds `SessionScore`s into a `SummaryReport`. Recording a score has no
/// side effects beyond the accumulator itself, so the same scores always
/// produce the same report.
#[derive(Debug, Default)]
pub struct Aggregator {
    session_count: u32,
    completed: u32,
    timed_out: u32,
    failed: u32,
    total_detections: u32,
    accepted: u32,
    rejected: u32,
    true_positives: u32,
    false_positives: u32,
    false_negatives: u32,
    extraction_warnings: u32,
    offsets: Vec<f64>,
    confidences: Vec<Option<f64>>,
    latencies: Vec<Option<f64>>,
    similarities: Vec<Option<f64>>,
    labels: BTreeMap<String, LabelAccumulator>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, score: &SessionScore) {
        self.session_count += 1;
        match score.termination {
            TerminationReason::Completed => self.completed += 1,
            TerminationReason::TimedOut => self.timed_out += 1,
            TerminationReason::Failed => self.failed += 1,
        }

        self.total_detections += score.events.len() as u32;
        self.accepted += score.accepted;
        self.rejected += score.rejected;
        self.true_positives += score.true_positives;
        self.false_positives += score.false_positives;
        self.false_negatives += score.false_negatives;
        self.extraction_warnings += score.extraction.warnings();
        self.offsets.extend(score.matches.iter().map(|m| m.offset_secs));

        for event in &score.events {
            self.confidences.push(event.confidence);
            self.latencies.push(event.analysis_latency_seconds);
            self.similarities.push(event.motion_similarity);
        }

        for label in &score.ground_truth_labels {
            let entry = self.labels.entry(label.clone()).or_default();
            entry.sessions += 1;
            if let Some(tally) = score.label_tallies.get(label) {
                entry.tally.true_positives += tally.true_positives;
                entry.tally.false_positives += tally.false_positives;
                entry.tally.false_negatives += tally.false_negatives;
            }
        }
    }

    pub fn snapshot(&self) -> SummaryReport {
        let per_label: Vec<LabelBreakdown> = self
            .labels
            .iter()
            .map(|(label, acc)| LabelBreakdown {
                label: label.clone(),
                sessions: acc.sessions,
                true_positives: acc.tally.true_positives,
                false_positives: acc.tally.false_positives,
                false_negatives: acc.tally.false_negatives,
                recall: recall(acc.tally.true_positives, acc.tally.false_negatives),
                precision: precision(acc.tally.true_positives, acc.tally.false_positives),
            })
            .collect();
        let covered = per_label.iter().filter(|l| l.true_positives > 0).count() as u32;
        let recall = recall(self.true_positives, self.false_negatives);
        let precision = precision(self.true_positives, self.false_positives);

        SummaryReport {
            session_count: self.session_count,
            completed_sessions: self.completed,
            timed_out_sessions: self.timed_out,
            failed_sessions: self.failed,
            total_detections: self.total_detections,
            accepted_detections: self.accepted,
            rejected_detections: self.rejected,
            acceptance_rate: ratio(self.accepted, self.total_detections),
            avg_detections_per_session: ratio(self.total_detections, self.session_count),
            true_positives: self.true_positives,
            false_positives: self.false_positives,
            false_negatives: self.false_negatives,
            recall,
            precision,
            f1: f1(precision, recall),
            coverage: ratio(covered, per_label.len() as u32),
            offsets: offset_stats(self.offsets.iter().copied()),
            mean_confidence: mean_of_present(self.confidences.iter().copied()),
            mean_latency_seconds: mean_of_present(self.latencies.iter().copied()),
            mean_similarity: mean_of_present(self.similarities.iter().copied()),
            confidence_range: range_of_present(self.confidences.iter().copied()),
            latency_range: range_of_present(self.latencies.iter().copied()),
            similarity_range: range_of_present(self.similarities.iter().copied()),
            extraction_warnings: self.extraction_warnings,
            per_label,
        }
    }
}

/// Builds the report for a whole batch in one call.
pub fn summarize(scores: &[SessionScore]) -> SummaryReport {
    let mut aggregator = Aggregator::new();
    for score in scores {
        aggregator.record(score);
    }
    aggregator.snapshot()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Decision, DetectionEvent, EventMatch, ExtractionStats, OffsetStats};

    fn event(confidence: Option<f64>, latency: Option<f64>, decision: Decision) -> DetectionEvent {
        DetectionEvent {
            timestamp: 0.0,
            video_id: "v".into(),
            predicted_label: "stir".into(),
            confidence,
            motion_similarity: None,
            decision,
            analysis_latency_seconds: latency,
            motion_duration_seconds: None,
        }
    }

    fn score(
        termination: TerminationReason,
        tallies: &[(&str, u32, u32, u32)],
        events: Vec<DetectionEvent>,
    ) -> SessionScore {
        let mut label_tallies = BTreeMap::new();
        let (mut tp, mut fp, mut fn_) = (0, 0, 0);
        for &(label, t, f, n) in tallies {
            label_tallies.insert(
                label.to_string(),
                LabelTally {
                    true_positives: t,
                    false_positives: f,
                    false_negatives: n,
                },
            );
            tp += t;
            fp += f;
            fn_ += n;
        }
        let accepted = events.iter().filter(|e| e.is_accepted()).count() as u32;
        SessionScore {
            session_id: "s".into(),
            video_id: "v".into(),
            termination,
            failure: None,
            rejected: events.len() as u32 - accepted,
            accepted,
            events,
            matches: Vec::new(),
            true_positives: tp,
            false_positives: fp,
            false_negatives: fn_,
            recall: recall(tp, fn_),
            precision: precision(tp, fp),
            f1: f1(precision(tp, fp), recall(tp, fn_)),
            coverage: 0.0,
            offsets: OffsetStats::default(),
            stretch_factor: 1.0,
            ground_truth_labels: tallies
                .iter()
                .filter(|(_, t, _, n)| t + n > 0)
                .map(|(label, ..)| label.to_string())
                .collect(),
            label_tallies,
            extraction: ExtractionStats::default(),
        }
    }

    #[test]
    fn test_empty_batch_is_all_zero() {
        let report = summarize(&[]);
        assert_eq!(report, SummaryReport::default());
        assert_eq!(report.recall, 0.0);
        assert_eq!(report.precision, 0.0);
        assert_eq!(report.mean_confidence, 0.0);
    }

    #[test]
    fn test_precision_from_single_session() {
        let report = summarize(&[score(
            TerminationReason::Completed,
            &[("stir", 8, 4, 0)],
            Vec::new(),
        )]);
        assert_eq!(report.true_positives, 8);
        assert_eq!(report.false_positives, 4);
        assert!((report.precision - 0.667).abs() < 1e-3);
        assert_eq!(report.recall, 1.0);
    }

    #[test]
    fn test_means_cover_accepted_and_rejected_detections() {
        let report = summarize(&[score(
            TerminationReason::Completed,
            &[],
            vec![
                event(Some(0.9), Some(2.0), Decision::Accepted),
                event(Some(0.5), None, Decision::Rejected),
                event(None, Some(4.0), Decision::Rejected),
            ],
        )]);
        assert_eq!(report.total_detections, 3);
        assert_eq!(report.accepted_detections, 1);
        assert_eq!(report.rejected_detections, 2);
        assert!((report.mean_confidence - 0.7).abs() < 1e-9);
        assert_eq!(report.mean_latency_seconds, 3.0);
        assert!((report.acceptance_rate - 1.0 / 3.0).abs() < 1e-9);

        let confidence = report.confidence_range.unwrap();
        assert_eq!((confidence.min, confidence.max), (0.5, 0.9));
        let latency = report.latency_range.unwrap();
        assert_eq!((latency.min, latency.max), (2.0, 4.0));
        assert!(report.similarity_range.is_none());
    }

    #[test]
    fn test_f1_and_offsets_pool_every_session() {
        let mut first = score(TerminationReason::Completed, &[("stir", 2, 0, 0)], Vec::new());
        first.matches = [0.0, 4.0]
            .iter()
            .enumerate()
            .map(|(i, offset)| EventMatch {
                event_index: i,
                interval_index: i,
                label: "stir".into(),
                offset_secs: *offset,
            })
            .collect();
        let mut second = score(TerminationReason::Completed, &[("stir", 1, 2, 1)], Vec::new());
        second.matches = vec![EventMatch {
            event_index: 0,
            interval_index: 0,
            label: "stir".into(),
            offset_secs: -2.0,
        }];

        let report = summarize(&[first, second]);
        assert_eq!(report.precision, 0.6);
        assert_eq!(report.recall, 0.75);
        assert!((report.f1 - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(report.offsets.median_secs, 2.0);
        assert_eq!(report.offsets.max_secs, 4.0);
        assert!((report.offsets.within_interval_rate - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_per_label_counts_only_sessions_with_that_label() {
        let report = summarize(&[
            score(TerminationReason::Completed, &[("stir", 1, 0, 1)], Vec::new()),
            // "flip" appears only as a false positive here, so this session
            // does not count towards the flip breakdown.
            score(
                TerminationReason::TimedOut,
                &[("stir", 2, 0, 0), ("flip", 0, 3, 0)],
                Vec::new(),
            ),
            score(TerminationReason::Failed, &[("flip", 0, 1, 2)], Vec::new()),
        ]);

        assert_eq!(report.session_count, 3);
        assert_eq!(report.completed_sessions, 1);
        assert_eq!(report.timed_out_sessions, 1);
        assert_eq!(report.failed_sessions, 1);

        let stir = report.per_label.iter().find(|l| l.label == "stir").unwrap();
        assert_eq!(stir.sessions, 2);
        assert_eq!(stir.true_positives, 3);
        assert_eq!(stir.recall, 0.75);

        let flip = report.per_label.iter().find(|l| l.label == "flip").unwrap();
        assert_eq!(flip.sessions, 1);
        assert_eq!(flip.false_positives, 1);
        assert_eq!(flip.precision, 0.0);

        assert_eq!(report.coverage, 0.5);
    }
}
