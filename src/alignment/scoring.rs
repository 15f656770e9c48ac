use crate::models::{OffsetStats, ValueRange};

/// `numerator / denominator`, or 0 when there is nothing to divide by.
pub fn ratio(numerator: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

pub fn recall(true_positives: u32, false_negatives: u32) -> f64 {
    ratio(true_positives, true_positives + false_negatives)
}

pub fn precision(true_positives: u32, false_positives: u32) -> f64 {
    ratio(true_positives, true_positives + false_positives)
}

/// Harmonic mean of precision and recall; 0 when both are.
pub fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    }
}

/// Mean, median and max of the offset magnitudes. All zero without matches.
pub fn offset_stats(offsets: impl Iterator<Item = f64>) -> OffsetStats {
    let mut magnitudes: Vec<f64> = offsets.map(f64::abs).collect();
    if magnitudes.is_empty() {
        return OffsetStats::default();
    }
    magnitudes.sort_by(f64::total_cmp);

    let n = magnitudes.len();
    let median = if n % 2 == 1 {
        magnitudes[n / 2]
    } else {
        (magnitudes[n / 2 - 1] + magnitudes[n / 2]) / 2.0
    };
    let inside = magnitudes.iter().take_while(|m| **m == 0.0).count();

    OffsetStats {
        mean_secs: magnitudes.iter().sum::<f64>() / n as f64,
        median_secs: median,
        max_secs: magnitudes[n - 1],
        within_interval_rate: inside as f64 / n as f64,
    }
}

pub fn range_of_present(values: impl Iterator<Item = Option<f64>>) -> Option<ValueRange> {
    values.flatten().fold(None, |range, value| {
        Some(match range {
            Some(range) => range.widen(value),
            None => ValueRange {
                min: value,
                max: value,
            },
        })
    })
}

/// Mean of the values that are present; 0 when none are.
pub fn mean_of_present(values: impl Iterator<Item = Option<f64>>) -> f64 {
    let (sum, count) = values
        .flatten()
        .fold((0.0, 0u32), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
