//! Error taxonomy for the evaluation pipeline.
//!
//! Only ground-truth loading and session supervision can fail. Extraction
//! problems are counted in `ExtractionStats`, and timeouts are a
//! `TerminationReason`, not an error.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read ground truth {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("ground truth file {path} is empty")]
    Empty { path: PathBuf },
    #[error("ground truth is missing a `{field}` column (accepted names: {accepted})")]
    MissingColumn {
        field: &'static str,
        accepted: String,
    },
    #[error("row {row}: expected at least {expected} fields, found {found}")]
    ShortRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("row {row}: non-numeric {field} value '{value}'")]
    NonNumeric {
        row: usize,
        field: &'static str,
        value: String,
    },
    #[error("row {row}: start {start} is after end {end}")]
    InvertedInterval { row: usize, start: f64, end: f64 },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionFailure {
    #[error("detector failed to start: {0}")]
    StartFailed(String),
    #[error("detector produced no output within {0}ms")]
    NoOutput(u64),
    #[error("detector exited before the end-of-stream marker")]
    UnexpectedExit,
    #[error("detector output stream failed: {0}")]
    Stream(String),
    #[error("replay target could not be configured: {0}")]
    TargetConfiguration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_column_message_names_aliases() {
        let err = DataError::MissingColumn {
            field: "label",
            accepted: "label, action_label".into(),
        };
        assert_eq!(
            err.to_string(),
            "ground truth is missing a `label` column (accepted names: label, action_label)"
        );
    }
}
