use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::alignment::AlignmentConfig;
use crate::extraction::patterns::parse_clock;
use crate::session::SessionTiming;

/// How to launch the detector. `target_placeholder` is replaced by the
/// video path in every argument that contains it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectorSettings {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub target_placeholder: String,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            program: "python3".into(),
            args: vec!["main.py".into(), "--video".into(), "{video}".into()],
            working_dir: None,
            target_placeholder: "{video}".into(),
        }
    }
}

/// One video to replay. The id defaults to the file stem and must match the
/// ground truth's video column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoSettings {
    pub path: PathBuf,
    #[serde(default)]
    pub video_id: Option<String>,
}

impl VideoSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            video_id: None,
        }
    }

    pub fn id(&self) -> String {
        self.video_id.clone().unwrap_or_else(|| self.stem())
    }

    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".into())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractionSettings {
    /// Wall-clock `HH:MM:SS` at which every video starts playing. When unset
    /// each session starts its timeline at launch.
    pub origin: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EvalSettings {
    pub detector: DetectorSettings,
    pub videos: Vec<VideoSettings>,
    pub ground_truth: Option<PathBuf>,
    /// Video id for ground-truth rows when the CSV has no video column
    pub default_video_id: Option<String>,
    pub output_dir: PathBuf,
    pub session: SessionTiming,
    pub alignment: AlignmentConfig,
    pub extraction: ExtractionSettings,
}

impl Default for EvalSettings {
    fn default() -> Self {
        Self {
            detector: DetectorSettings::default(),
            videos: Vec::new(),
            ground_truth: None,
            default_video_id: None,
            output_dir: PathBuf::from("evaluation_results"),
            session: SessionTiming::default(),
            alignment: AlignmentConfig::default(),
            extraction: ExtractionSettings::default(),
        }
    }
}

impl EvalSettings {
    /// Configured origin in seconds since midnight.
    pub fn origin_secs(&self) -> Result<Option<f64>> {
        match self.extraction.origin.as_deref() {
            None => Ok(None),
            Some(raw) => parse_clock(raw)
                .map(Some)
                .ok_or_else(|| anyhow!("invalid extraction origin '{raw}', expected HH:MM:SS")),
        }
    }
}

/// JSON settings file read once at startup. A missing file yields the
/// defaults.
pub struct SettingsStore {
    path: PathBuf,
    data: EvalSettings,
}

impl SettingsStore {
    pub fn load(path: &Path) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse settings in {}", path.display()))?
        } else {
            log::warn!(
                "Settings file {} not found, using defaults",
                path.display()
            );
            EvalSettings::default()
        };

        Ok(Self {
            path: path.to_path_buf(),
            data,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &EvalSettings {
        &self.data
    }

    pub fn into_settings(self) -> EvalSettings {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("replay-eval-{}-{name}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let store = SettingsStore::load(&temp_path("missing.json")).unwrap();
        let settings = store.settings();
        assert_eq!(settings.session.deadline_ms, 600_000);
        assert_eq!(settings.session.kill_grace_ms, 5_000);
        assert_eq!(settings.alignment.tolerance_secs, 5.0);
        assert_eq!(settings.output_dir, PathBuf::from("evaluation_results"));
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let settings: EvalSettings = serde_json::from_str(
            r#"{
                "videos": [{"path": "/data/pasta_run.mp4"}, {"path": "b.mp4", "videoId": "bravo"}],
                "session": {"deadlineMs": 1000},
                "extraction": {"origin": "15:00:00"}
            }"#,
        )
        .unwrap();
        assert_eq!(settings.videos[0].id(), "pasta_run");
        assert_eq!(settings.videos[1].id(), "bravo");
        assert_eq!(settings.session.deadline_ms, 1000);
        assert_eq!(settings.session.drain_grace_ms, 2_000);
        assert_eq!(settings.origin_secs().unwrap(), Some(54_000.0));
    }

    #[test]
    fn test_invalid_origin_is_an_error() {
        let settings = EvalSettings {
            extraction: ExtractionSettings {
                origin: Some("quarter past".into()),
            },
            ..EvalSettings::default()
        };
        assert!(settings.origin_secs().is_err());
    }

    #[test]
    fn test_file_on_disk_is_read() {
        let path = temp_path("settings.json");
        fs::write(
            &path,
            r#"{"videos": [{"path": "clip.mp4"}], "alignment": {"stretchTimeline": true}}"#,
        )
        .unwrap();

        let store = SettingsStore::load(&path).unwrap();
        assert_eq!(store.path(), path.as_path());
        let settings = store.into_settings();
        assert!(settings.alignment.stretch_timeline);
        assert_eq!(settings.videos, vec![VideoSettings::new("clip.mp4")]);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let path = temp_path("broken.json");
        fs::write(&path, "{ videos: ").unwrap();
        let err = SettingsStore::load(&path).err().unwrap();
        assert!(format!("{err:#}").contains("Failed to parse settings"));
        let _ = fs::remove_file(path);
    }
}
