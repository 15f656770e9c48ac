use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::DataError;
use crate::extraction::normalize_label;
use crate::models::GroundTruthInterval;

const VIDEO_COLUMNS: &[&str] = &["video_id", "video", "video_name", "video_file"];
const LABEL_COLUMNS: &[&str] = &["label", "action_label", "action"];
const START_COLUMNS: &[&str] = &["start_seconds", "start_time_seconds", "start"];
const END_COLUMNS: &[&str] = &["end_seconds", "end_time_seconds", "end"];

/// Column positions of the four fields the aligner needs.
struct Columns {
    video: Option<usize>,
    label: usize,
    start: usize,
    end: usize,
}

impl Columns {
    fn resolve(header: &[String], has_default_video: bool) -> Result<Self, DataError> {
        let video = find_column(header, VIDEO_COLUMNS);
        if video.is_none() && !has_default_video {
            return Err(missing("video_id", VIDEO_COLUMNS));
        }
        Ok(Self {
            video,
            label: find_column(header, LABEL_COLUMNS).ok_or_else(|| missing("label", LABEL_COLUMNS))?,
            start: find_column(header, START_COLUMNS)
                .ok_or_else(|| missing("start_seconds", START_COLUMNS))?,
            end: find_column(header, END_COLUMNS).ok_or_else(|| missing("end_seconds", END_COLUMNS))?,
        })
    }

    fn width(&self) -> usize {
        [self.video.unwrap_or(0), self.label, self.start, self.end]
            .into_iter()
            .max()
            .unwrap_or(0)
            + 1
    }
}

/// Labeled intervals for every video in a dataset, ordered by start time.
#[derive(Debug, Default)]
pub struct GroundTruthSet {
    by_video: BTreeMap<String, Vec<GroundTruthInterval>>,
    warnings: Vec<DataError>,
}

impl GroundTruthSet {
    /// Loads a CSV dataset. `default_video_id` is used for every row when the
    /// file has no video column.
    pub fn load(path: &Path, default_video_id: Option<&str>) -> Result<Self, DataError> {
        let content = fs::read_to_string(path).map_err(|source| DataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if content.trim().is_empty() {
            return Err(DataError::Empty {
                path: path.to_path_buf(),
            });
        }

        let set = Self::parse(&content, default_video_id)?;
        log::info!(
            "Loaded {} ground truth intervals for {} videos from {} ({} rows skipped)",
            set.len(),
            set.video_count(),
            path.display(),
            set.warnings.len()
        );
        Ok(set)
    }

    pub fn parse(content: &str, default_video_id: Option<&str>) -> Result<Self, DataError> {
        let mut lines = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());

        let Some((_, header_line)) = lines.next() else {
            return Ok(Self::default());
        };
        let header: Vec<String> = split_record(header_line)
            .into_iter()
            .map(|name| name.trim().trim_start_matches('\u{feff}').to_lowercase())
            .collect();
        let columns = Columns::resolve(&header, default_video_id.is_some())?;

        let mut set = Self::default();
        for (index, line) in lines {
            let row = index + 1;
            match parse_row(row, line, &columns, default_video_id) {
                Ok(interval) => set
                    .by_video
                    .entry(interval.video_id.clone())
                    .or_default()
                    .push(interval),
                Err(err) => {
                    log::warn!("Skipping ground truth row: {err}");
                    set.warnings.push(err);
                }
            }
        }

        for intervals in set.by_video.values_mut() {
            intervals.sort_by(|a, b| a.start_seconds.total_cmp(&b.start_seconds));
        }

        Ok(set)
    }

    /// Intervals for `video_id`, ordered by `start_seconds`. Unknown videos
    /// have no intervals.
    pub fn intervals_for(&self, video_id: &str) -> &[GroundTruthInterval] {
        self.by_video
            .get(video_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains_video(&self, video_id: &str) -> bool {
        self.by_video.contains_key(video_id)
    }

    pub fn len(&self) -> usize {
        self.by_video.values().map(Vec::len).sum()
    }

    pub fn video_count(&self) -> usize {
        self.by_video.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows that were skipped while loading.
    pub fn warnings(&self) -> &[DataError] {
        &self.warnings
    }
}

fn parse_row(
    row: usize,
    line: &str,
    columns: &Columns,
    default_video_id: Option<&str>,
) -> Result<GroundTruthInterval, DataError> {
    let fields = split_record(line);
    if fields.len() < columns.width() {
        return Err(DataError::ShortRow {
            row,
            expected: columns.width(),
            found: fields.len(),
        });
    }

    let start = parse_seconds(row, "start_seconds", &fields[columns.start])?;
    let end = parse_seconds(row, "end_seconds", &fields[columns.end])?;
    if start > end {
        return Err(DataError::InvertedInterval { row, start, end });
    }

    let video_id = match columns.video {
        Some(index) => fields[index].trim().to_string(),
        None => default_video_id.unwrap_or_default().to_string(),
    };

    Ok(GroundTruthInterval {
        video_id,
        label: normalize_label(&fields[columns.label]),
        start_seconds: start,
        end_seconds: end,
    })
}

fn parse_seconds(row: usize, field: &'static str, raw: &str) -> Result<f64, DataError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| DataError::NonNumeric {
            row,
            field,
            value: raw.trim().to_string(),
        })
}

fn find_column(header: &[String], aliases: &[&str]) -> Option<usize> {
    aliases
        .iter()
        .find_map(|alias| header.iter().position(|name| name == alias))
}

fn missing(field: &'static str, aliases: &[&str]) -> DataError {
    DataError::MissingColumn {
        field,
        accepted: aliases.join(", "),
    }
}

/// Splits one CSV record, honoring double-quoted fields and `""` escapes.
fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.trim_end_matches('\r').chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATASET: &str = "video_id,action_label,start_time_seconds,end_time_seconds,category_label\n\
                           kitchen_01,Add Food,30.0,34.5,food\n\
                           kitchen_01,stir,10,12,food\n\
                           kitchen_02,\"Remove Lid\",5,7,lid\n";

    #[test]
    fn test_groups_and_orders_by_start() {
        let set = GroundTruthSet::parse(DATASET, None).unwrap();
        assert_eq!(set.len(), 3);
        assert!(set.warnings().is_empty());

        let first = set.intervals_for("kitchen_01");
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].label, "stir");
        assert_eq!(first[1].label, "add-food");
        assert_eq!(first[1].end_seconds, 34.5);

        assert_eq!(set.intervals_for("kitchen_02")[0].label, "remove-lid");
        assert!(set.intervals_for("unknown").is_empty());
    }

    #[test]
    fn test_missing_required_column_fails() {
        let err = GroundTruthSet::parse("video_id,start,end\nv,1,2\n", None).unwrap_err();
        assert!(matches!(err, DataError::MissingColumn { field: "label", .. }));
    }

    #[test]
    fn test_missing_video_column_uses_default() {
        let set = GroundTruthSet::parse("action_label,start_time_seconds,end_time_seconds\nflip,1,2\n", Some("solo")).unwrap();
        assert_eq!(set.intervals_for("solo").len(), 1);

        let err = GroundTruthSet::parse("action_label,start,end\nflip,1,2\n", None).unwrap_err();
        assert!(matches!(err, DataError::MissingColumn { field: "video_id", .. }));
    }

    #[test]
    fn test_bad_rows_are_skipped_with_warnings() {
        let content = "video_id,label,start_seconds,end_seconds\n\
                       v,stir,ten,12\n\
                       v,flip,9,3\n\
                       v,flip\n\
                       v,flip,1,2\n";
        let set = GroundTruthSet::parse(content, None).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.warnings().len(), 3);
        assert!(matches!(
            set.warnings()[0],
            DataError::NonNumeric { row: 2, field: "start_seconds", .. }
        ));
        assert!(matches!(set.warnings()[1], DataError::InvertedInterval { row: 3, .. }));
        assert!(matches!(set.warnings()[2], DataError::ShortRow { row: 4, .. }));
    }

    #[test]
    fn test_split_record_handles_quotes() {
        assert_eq!(
            split_record(r#"a,"b, c","say ""hi""""#),
            vec!["a".to_string(), "b, c".to_string(), r#"say "hi""#.to_string()]
        );
    }
}
