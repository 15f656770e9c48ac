use crate::models::{DetectionEvent, GroundTruthInterval};

/// Linearly maps the ground-truth timeline onto the span covered by the
/// accepted detections. Returns the intervals unchanged (factor 1.0) when
/// either span is degenerate.
pub fn stretch_intervals(
    intervals: &[GroundTruthInterval],
    events: &[DetectionEvent],
) -> (Vec<GroundTruthInterval>, f64) {
    let accepted = events.iter().filter(|e| e.is_accepted()).map(|e| e.timestamp);
    let (det_start, det_end) = span(accepted);
    let (gt_start, gt_end) = span(
        intervals
            .iter()
            .flat_map(|i| [i.start_seconds, i.end_seconds]),
    );

    let det_span = det_end - det_start;
    let gt_span = gt_end - gt_start;
    if !(det_span > 0.0 && gt_span > 0.0) {
        return (intervals.to_vec(), 1.0);
    }

    let factor = det_span / gt_span;
    let stretched = intervals
        .iter()
        .map(|interval| GroundTruthInterval {
            start_seconds: (interval.start_seconds - gt_start) * factor + det_start,
            end_seconds: (interval.end_seconds - gt_start) * factor + det_start,
            ..interval.clone()
        })
        .collect();

    log::debug!(
        "[alignment] stretched ground truth {gt_start:.1}..{gt_end:.1}s onto {det_start:.1}..{det_end:.1}s (x{factor:.2})"
    );

    (stretched, factor)
}

fn span(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}
