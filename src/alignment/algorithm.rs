use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::alignment::config::AlignmentConfig;
use crate::alignment::scoring::{f1, offset_stats, precision, ratio, recall};
use crate::alignment::stretch::stretch_intervals;
use crate::models::{
    DetectionEvent, EventMatch, ExtractionStats, GroundTruthInterval, LabelTally, SessionScore,
    TerminationReason,
};

/// Everything about a session that is known before scoring.
#[derive(Debug, Clone)]
pub struct SessionMeta {
    pub session_id: String,
    pub video_id: String,
    pub termination: TerminationReason,
    pub failure: Option<String>,
    pub extraction: ExtractionStats,
}

/// Candidate interval for one event, ranked by how well it fits.
struct Fit {
    interval_index: usize,
    distance: f64,
    midpoint_distance: f64,
}

impl Fit {
    fn is_better_than(&self, other: &Fit) -> bool {
        self.distance
            .total_cmp(&other.distance)
            .then(self.midpoint_distance.total_cmp(&other.midpoint_distance))
            .then(self.interval_index.cmp(&other.interval_index))
            == Ordering::Less
    }
}

/// Main alignment function: scores one session's events against its
/// ground-truth intervals.
///
/// Accepted events are matched greedily in descending confidence order. Each
/// claims the unclaimed same-label interval whose tolerance window contains
/// it, preferring the interval it is closest to. An interval is claimed at
/// most once.
pub fn align_session(
    meta: SessionMeta,
    events: Vec<DetectionEvent>,
    intervals: &[GroundTruthInterval],
    config: &AlignmentConfig,
) -> SessionScore {
    let (stretched, stretch_factor) = if config.stretch_timeline {
        let (mapped, factor) = stretch_intervals(intervals, &events);
        (Some(mapped), factor)
    } else {
        (None, 1.0)
    };
    let intervals = stretched.as_deref().unwrap_or(intervals);

    let mut claimed = vec![false; intervals.len()];
    let mut matches = Vec::new();
    let mut label_tallies: BTreeMap<String, LabelTally> = BTreeMap::new();
    let mut false_positives = 0u32;

    for event_index in candidates_by_confidence(&events) {
        let event = &events[event_index];
        let tally = label_tallies.entry(event.predicted_label.clone()).or_default();

        match best_fit(event, intervals, &claimed, config.tolerance_secs) {
            Some(fit) => {
                claimed[fit.interval_index] = true;
                tally.true_positives += 1;
                let interval = &intervals[fit.interval_index];
                matches.push(EventMatch {
                    event_index,
                    interval_index: fit.interval_index,
                    label: interval.label.clone(),
                    offset_secs: signed_offset(event.timestamp, interval),
                });
            }
            None => {
                tally.false_positives += 1;
                false_positives += 1;
            }
        }
    }

    let mut false_negatives = 0u32;
    for (interval, _) in intervals.iter().zip(&claimed).filter(|(_, taken)| !**taken) {
        label_tallies
            .entry(interval.label.clone())
            .or_default()
            .false_negatives += 1;
        false_negatives += 1;
    }

    matches.sort_by_key(|m| m.event_index);

    let ground_truth_labels: BTreeSet<&str> = intervals.iter().map(|i| i.label.as_str()).collect();
    let covered = ground_truth_labels
        .iter()
        .filter(|label| {
            label_tallies
                .get(**label)
                .is_some_and(|tally| tally.true_positives > 0)
        })
        .count();

    let true_positives = matches.len() as u32;
    let accepted = events.iter().filter(|e| e.is_accepted()).count() as u32;
    let rejected = events.len() as u32 - accepted;
    let recall = recall(true_positives, false_negatives);
    let precision = precision(true_positives, false_positives);
    let offsets = offset_stats(matches.iter().map(|m| m.offset_secs));

    SessionScore {
        session_id: meta.session_id,
        video_id: meta.video_id,
        termination: meta.termination,
        failure: meta.failure,
        matches,
        true_positives,
        false_positives,
        false_negatives,
        accepted,
        rejected,
        recall,
        precision,
        f1: f1(precision, recall),
        coverage: ratio(covered as u32, ground_truth_labels.len() as u32),
        offsets,
        stretch_factor,
        ground_truth_labels: ground_truth_labels.into_iter().map(str::to_string).collect(),
        label_tallies,
        extraction: meta.extraction,
        events,
    }
}

/// Indices of accepted events, highest confidence first. Absent confidence
/// sorts last; ties go to the earlier event.
fn candidates_by_confidence(events: &[DetectionEvent]) -> Vec<usize> {
    let mut indices: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_accepted())
        .map(|(i, _)| i)
        .collect();

    indices.sort_by(|&a, &b| {
        let conf_a = events[a].confidence.unwrap_or(f64::NEG_INFINITY);
        let conf_b = events[b].confidence.unwrap_or(f64::NEG_INFINITY);
        conf_b
            .total_cmp(&conf_a)
            .then(events[a].timestamp.total_cmp(&events[b].timestamp))
            .then(a.cmp(&b))
    });

    indices
}

fn best_fit(
    event: &DetectionEvent,
    intervals: &[GroundTruthInterval],
    claimed: &[bool],
    tolerance: f64,
) -> Option<Fit> {
    let mut best: Option<Fit> = None;

    for (interval_index, interval) in intervals.iter().enumerate() {
        if claimed[interval_index]
            || interval.label != event.predicted_label
            || !interval.contains_with_tolerance(event.timestamp, tolerance)
        {
            continue;
        }

        let fit = Fit {
            interval_index,
            distance: interval.distance_to(event.timestamp),
            midpoint_distance: (event.timestamp - interval.midpoint()).abs(),
        };
        if best.as_ref().map_or(true, |current| fit.is_better_than(current)) {
            best = Some(fit);
        }
    }

    best
}

fn signed_offset(t: f64, interval: &GroundTruthInterval) -> f64 {
    if t < interval.start_seconds {
        t - interval.start_seconds
    } else if t > interval.end_seconds {
        t - interval.end_seconds
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Decision;

    fn meta() -> SessionMeta {
        SessionMeta {
            session_id: "session".into(),
            video_id: "video".into(),
            termination: TerminationReason::Completed,
            failure: None,
            extraction: ExtractionStats::default(),
        }
    }

    fn event(t: f64, label: &str, confidence: f64, decision: Decision) -> DetectionEvent {
        DetectionEvent {
            timestamp: t,
            video_id: "video".into(),
            predicted_label: label.into(),
            confidence: Some(confidence),
            motion_similarity: None,
            decision,
            analysis_latency_seconds: None,
            motion_duration_seconds: None,
        }
    }

    fn interval(label: &str, start: f64, end: f64) -> GroundTruthInterval {
        GroundTruthInterval {
            video_id: "video".into(),
            label: label.into(),
            start_seconds: start,
            end_seconds: end,
        }
    }

    fn align(events: Vec<DetectionEvent>, intervals: &[GroundTruthInterval]) -> SessionScore {
        align_session(meta(), events, intervals, &AlignmentConfig::default())
    }

    #[test]
    fn test_single_event_inside_interval_is_true_positive() {
        let score = align(
            vec![event(11.0, "stir", 0.9, Decision::Accepted)],
            &[interval("stir", 10.0, 12.0)],
        );
        assert_eq!(score.true_positives, 1);
        assert_eq!(score.false_positives, 0);
        assert_eq!(score.false_negatives, 0);
        assert_eq!(score.recall, 1.0);
        assert_eq!(score.precision, 1.0);
        assert_eq!(score.coverage, 1.0);
        assert_eq!(score.matches[0].offset_secs, 0.0);
    }

    #[test]
    fn test_no_detections_scores_zero_not_nan() {
        let score = align(Vec::new(), &[interval("stir", 10.0, 12.0)]);
        assert_eq!(score.recall, 0.0);
        assert_eq!(score.precision, 0.0);
        assert_eq!(score.false_negatives, 1);
    }

    #[test]
    fn test_no_ground_truth_makes_every_accepted_event_a_false_positive() {
        let score = align(
            vec![
                event(3.0, "flip", 0.8, Decision::Accepted),
                event(4.0, "flip", 0.8, Decision::Rejected),
            ],
            &[],
        );
        assert_eq!(score.false_positives, 1);
        assert_eq!(score.rejected, 1);
        assert_eq!(score.recall, 0.0);
        assert_eq!(score.precision, 0.0);
        assert_eq!(score.coverage, 0.0);
    }

    #[test]
    fn test_higher_confidence_wins_shared_interval() {
        let score = align(
            vec![
                event(9.0, "stir", 0.6, Decision::Accepted),
                event(13.0, "stir", 0.95, Decision::Accepted),
            ],
            &[interval("stir", 10.0, 12.0)],
        );
        assert_eq!(score.true_positives, 1);
        assert_eq!(score.false_positives, 1);
        assert_eq!(score.matches[0].event_index, 1);
        assert_eq!(score.matches[0].offset_secs, 1.0);
    }

    #[test]
    fn test_rejected_events_never_claim_intervals() {
        let score = align(
            vec![event(11.0, "stir", 0.99, Decision::Rejected)],
            &[interval("stir", 10.0, 12.0)],
        );
        assert_eq!(score.true_positives, 0);
        assert_eq!(score.false_positives, 0);
        assert_eq!(score.false_negatives, 1);
        assert_eq!(score.rejected, 1);
    }

    #[test]
    fn test_label_and_tolerance_must_both_match() {
        let score = align(
            vec![
                event(11.0, "flip", 0.9, Decision::Accepted),
                event(30.0, "stir", 0.9, Decision::Accepted),
            ],
            &[interval("stir", 10.0, 12.0)],
        );
        assert_eq!(score.true_positives, 0);
        assert_eq!(score.false_positives, 2);
        assert_eq!(score.false_negatives, 1);
        assert_eq!(score.label_tallies["stir"].false_negatives, 1);
        assert_eq!(score.label_tallies["stir"].false_positives, 1);
        assert_eq!(score.label_tallies["flip"].false_positives, 1);
    }

    #[test]
    fn test_event_prefers_interval_it_falls_inside() {
        let score = align(
            vec![event(20.0, "stir", 0.9, Decision::Accepted)],
            &[interval("stir", 14.0, 17.0), interval("stir", 19.0, 25.0)],
        );
        assert_eq!(score.matches[0].interval_index, 1);
        assert_eq!(score.false_negatives, 1);
    }

    #[test]
    fn test_coverage_counts_distinct_labels() {
        let score = align(
            vec![event(11.0, "stir", 0.9, Decision::Accepted)],
            &[
                interval("stir", 10.0, 12.0),
                interval("stir", 40.0, 42.0),
                interval("flip", 60.0, 61.0),
            ],
        );
        assert_eq!(score.ground_truth_labels, vec!["flip".to_string(), "stir".to_string()]);
        assert_eq!(score.coverage, 0.5);
        assert!((score.recall - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_stretch_timeline_recovers_drifted_replay() {
        let intervals = [interval("stir", 0.0, 2.0), interval("flip", 98.0, 100.0)];
        let events = vec![
            event(10.0, "stir", 0.9, Decision::Accepted),
            event(210.0, "flip", 0.9, Decision::Accepted),
        ];
        let plain = align(events.clone(), &intervals);
        assert_eq!(plain.true_positives, 0);

        let config = AlignmentConfig {
            tolerance_secs: 1.0,
            stretch_timeline: true,
        };
        let stretched = align_session(meta(), events, &intervals, &config);
        assert_eq!(stretched.true_positives, 2);
        assert_eq!(stretched.stretch_factor, 2.0);
        assert_eq!(plain.stretch_factor, 1.0);
    }

    #[test]
    fn test_f1_and_offsets_follow_matches() {
        let score = align(
            vec![
                event(11.0, "stir", 0.9, Decision::Accepted),
                event(23.0, "flip", 0.8, Decision::Accepted),
                event(50.0, "stir", 0.7, Decision::Accepted),
            ],
            &[interval("stir", 10.0, 12.0), interval("flip", 24.0, 26.0)],
        );
        assert_eq!(score.true_positives, 2);
        assert_eq!(score.false_positives, 1);
        assert!((score.f1 - 0.8).abs() < 1e-9);
        assert_eq!(score.offsets.max_secs, 1.0);
        assert_eq!(score.offsets.mean_secs, 0.5);
        assert_eq!(score.offsets.within_interval_rate, 0.5);
    }
}
