use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use uuid::Uuid;

use crate::aggregate::Aggregator;
use crate::alignment::{align_session, SessionMeta};
use crate::error::{DataError, SessionFailure};
use crate::extraction::ExtractorConfig;
use crate::ground_truth::GroundTruthSet;
use crate::models::{ExtractionStats, SessionScore, SummaryReport, TerminationReason};
use crate::session::{
    DetectorCommand, DetectorLauncher, SessionMonitor, TokioDetectorLauncher,
};
use crate::settings::{DetectorSettings, EvalSettings, VideoSettings};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Points the replay at one video before its session starts, and puts the
/// environment back once the batch is over.
pub trait TargetConfigurator {
    fn configure(&mut self, video: &VideoSettings, detector: &DetectorSettings)
        -> Result<DetectorCommand>;

    fn restore(&mut self) -> Result<()>;
}

/// Passes the video to the detector on its command line. Arguments holding
/// the placeholder get the video path substituted; without any, the path is
/// appended. Nothing needs restoring.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArgumentTarget;

impl TargetConfigurator for ArgumentTarget {
    fn configure(
        &mut self,
        video: &VideoSettings,
        detector: &DetectorSettings,
    ) -> Result<DetectorCommand> {
        if !video.path.is_file() {
            bail!("video {} not found", video.path.display());
        }
        let target = video.path.to_string_lossy();
        let placeholder = detector.target_placeholder.as_str();

        let mut args: Vec<String> = detector
            .args
            .iter()
            .map(|arg| {
                if placeholder.is_empty() {
                    arg.clone()
                } else {
                    arg.replace(placeholder, &target)
                }
            })
            .collect();
        if placeholder.is_empty() || !detector.args.iter().any(|arg| arg.contains(placeholder)) {
            args.push(target.into_owned());
        }

        Ok(DetectorCommand {
            program: detector.program.clone(),
            args,
            working_dir: detector.working_dir.clone(),
        })
    }

    fn restore(&mut self) -> Result<()> {
        Ok(())
    }
}

/// How the ground truth for a batch was obtained.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroundTruthStatus {
    pub path: Option<PathBuf>,
    pub intervals: usize,
    pub videos: usize,
    /// Set when the file could not be used at all. The batch then scores
    /// every video against no intervals.
    pub error: Option<String>,
    pub skipped_rows: usize,
    /// One message per skipped row.
    pub warnings: Vec<String>,
}

impl GroundTruthStatus {
    fn loaded(path: Option<PathBuf>, set: &GroundTruthSet) -> Self {
        let warnings: Vec<String> = set.warnings().iter().map(ToString::to_string).collect();
        Self {
            path,
            intervals: set.len(),
            videos: set.video_count(),
            error: None,
            skipped_rows: warnings.len(),
            warnings,
        }
    }

    fn unusable(path: &Path, err: &DataError) -> Self {
        Self {
            path: Some(path.to_path_buf()),
            error: Some(err.to_string()),
            ..Self::default()
        }
    }
}

/// Everything a batch needs, owned in one place.
pub struct EvalContext<L, T> {
    pub settings: EvalSettings,
    pub ground_truth: GroundTruthSet,
    pub ground_truth_status: GroundTruthStatus,
    pub monitor: SessionMonitor<L>,
    pub target: T,
    origin_secs: Option<f64>,
}

impl<L: DetectorLauncher, T: TargetConfigurator> EvalContext<L, T> {
    pub fn new(
        settings: EvalSettings,
        ground_truth: GroundTruthSet,
        launcher: L,
        target: T,
    ) -> Result<Self> {
        let status = GroundTruthStatus::loaded(settings.ground_truth.clone(), &ground_truth);
        Self::assemble(settings, ground_truth, status, launcher, target)
    }

    /// Reads the configured ground truth from disk. An unusable file is
    /// logged and recorded, and the batch goes ahead without intervals.
    pub fn load(settings: EvalSettings, launcher: L, target: T) -> Result<Self> {
        let (ground_truth, status) = load_ground_truth(&settings);
        Self::assemble(settings, ground_truth, status, launcher, target)
    }

    fn assemble(
        settings: EvalSettings,
        ground_truth: GroundTruthSet,
        ground_truth_status: GroundTruthStatus,
        launcher: L,
        target: T,
    ) -> Result<Self> {
        let origin_secs = settings.origin_secs()?;
        let monitor = SessionMonitor::new(launcher, settings.session.clone());
        Ok(Self {
            settings,
            ground_truth,
            ground_truth_status,
            monitor,
            target,
            origin_secs,
        })
    }
}

impl EvalContext<TokioDetectorLauncher, ArgumentTarget> {
    /// Context that launches real processes and reads ground truth from disk.
    pub fn from_settings(settings: EvalSettings) -> Result<Self> {
        Self::load(settings, TokioDetectorLauncher, ArgumentTarget)
    }
}

fn load_ground_truth(settings: &EvalSettings) -> (GroundTruthSet, GroundTruthStatus) {
    let Some(path) = &settings.ground_truth else {
        log_warn!("[batch] no ground truth configured, every accepted detection will count as a false positive");
        return (GroundTruthSet::default(), GroundTruthStatus::default());
    };

    let default_video_id = settings.default_video_id.clone().or_else(|| match settings.videos.as_slice() {
        [only] => Some(only.id()),
        _ => None,
    });

    match GroundTruthSet::load(path, default_video_id.as_deref()) {
        Ok(set) => {
            let status = GroundTruthStatus::loaded(Some(path.clone()), &set);
            (set, status)
        }
        Err(err) => {
            log_error!(
                "[batch] ground truth {} is unusable, scoring without it: {err}",
                path.display()
            );
            (GroundTruthSet::default(), GroundTruthStatus::unusable(path, &err))
        }
    }
}

/// Everything written to `evaluation_results_<timestamp>.json`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub timestamp: DateTime<Local>,
    pub ground_truth: GroundTruthStatus,
    pub sessions: Vec<SessionScore>,
    pub summary: SummaryReport,
    #[serde(skip)]
    pub results_path: Option<PathBuf>,
}

pub struct BatchRunner<L, T> {
    context: EvalContext<L, T>,
}

impl<L: DetectorLauncher, T: TargetConfigurator> BatchRunner<L, T> {
    pub fn new(context: EvalContext<L, T>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &EvalContext<L, T> {
        &self.context
    }

    /// Evaluates every configured video, one after another. Individual
    /// failures are recorded in the report; the batch itself always finishes.
    pub async fn run(&mut self) -> BatchReport {
        let videos = self.context.settings.videos.clone();
        log_info!("[batch] evaluating {} videos", videos.len());

        let mut aggregator = Aggregator::new();
        let mut sessions = Vec::with_capacity(videos.len());
        for (index, video) in videos.iter().enumerate() {
            log_info!(
                "[batch] ({}/{}) {}",
                index + 1,
                videos.len(),
                video.path.display()
            );
            let score = self.evaluate_video(video).await;
            log_info!(
                "[batch] {} {}: tp={} fp={} fn={} recall={:.3} precision={:.3}",
                score.video_id,
                score.termination.as_str(),
                score.true_positives,
                score.false_positives,
                score.false_negatives,
                score.recall,
                score.precision
            );
            aggregator.record(&score);
            sessions.push(score);
        }

        if let Err(err) = self.context.target.restore() {
            log_error!("[batch] failed to restore replay target: {err:#}");
        }

        let mut report = BatchReport {
            timestamp: Local::now(),
            ground_truth: self.context.ground_truth_status.clone(),
            sessions,
            summary: aggregator.snapshot(),
            results_path: None,
        };
        log_summary(&report.summary, &report.ground_truth);

        match write_results(&self.context.settings.output_dir, &report) {
            Ok(path) => {
                log_info!("[batch] results written to {}", path.display());
                report.results_path = Some(path);
            }
            Err(err) => log_error!("[batch] failed to write results: {err:#}"),
        }
        report
    }

    async fn evaluate_video(&mut self, video: &VideoSettings) -> SessionScore {
        let video_id = video.id();
        let session_id = Uuid::new_v4().to_string();
        let alignment = self.context.settings.alignment.clone();

        if !self.context.ground_truth.contains_video(&video_id) {
            log_warn!("[batch] no ground truth for {}, scoring against nothing", video_id);
        }
        let intervals = self.context.ground_truth.intervals_for(&video_id).to_vec();

        let command = match self
            .context
            .target
            .configure(video, &self.context.settings.detector)
        {
            Ok(command) => command,
            Err(err) => {
                log_warn!("[batch] could not configure replay for {}: {err:#}", video_id);
                let meta = SessionMeta {
                    session_id,
                    video_id,
                    termination: TerminationReason::Failed,
                    failure: Some(SessionFailure::TargetConfiguration(format!("{err:#}")).to_string()),
                    extraction: ExtractionStats::default(),
                };
                return align_session(meta, Vec::new(), &intervals, &alignment);
            }
        };

        let mut config = ExtractorConfig::new(video_id.clone());
        if let Some(origin) = self.context.origin_secs {
            config = config.with_origin(origin);
        }
        let outcome = self.context.monitor.run(&command, config).await;
        let output_dir = &self.context.settings.output_dir;
        let file_stem = format!(
            "{}_{}",
            video.stem(),
            outcome.started_at.format(FILE_TIMESTAMP_FORMAT)
        );

        if let Err(err) = write_text(output_dir, &format!("{file_stem}.log"), &outcome.log_text()) {
            log_error!("[batch] failed to save log for {}: {err:#}", video_id);
        }

        let meta = SessionMeta {
            session_id,
            video_id,
            termination: outcome.termination,
            failure: outcome.failure.as_ref().map(ToString::to_string),
            extraction: outcome.extraction.stats,
        };
        let score = align_session(meta, outcome.extraction.events, &intervals, &alignment);

        let timeline = render_timeline(&score);
        if let Err(err) = write_text(output_dir, &format!("{file_stem}_timeline.log"), &timeline) {
            log_error!("[batch] failed to save timeline for {}: {err:#}", score.video_id);
        }
        score
    }
}

fn write_text(output_dir: &Path, file_name: &str, text: &str) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let path = output_dir.join(file_name);
    fs::write(&path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// One line per detection in session order, with its match if it had one.
fn render_timeline(score: &SessionScore) -> String {
    let mut text = format!(
        "# {} (session {}, {})\n# {} detections: {} accepted, {} rejected\n",
        score.video_id,
        score.session_id,
        score.termination.as_str(),
        score.events.len(),
        score.accepted,
        score.rejected
    );

    for (index, event) in score.events.iter().enumerate() {
        let percent = |value: Option<f64>| match value {
            Some(v) => format!("{:5.1}%", v * 100.0),
            None => "    -".to_string(),
        };
        let verdict = match score.matches.iter().find(|m| m.event_index == index) {
            Some(m) => format!("match {:+.2}s", m.offset_secs),
            None if event.is_accepted() => "unmatched".to_string(),
            None => String::new(),
        };
        text.push_str(&format!(
            "{:9.2}s  {:<8}  {:<20}  conf {}  sim {}  {}\n",
            event.timestamp,
            event.decision.as_str(),
            event.predicted_label,
            percent(event.confidence),
            percent(event.motion_similarity),
            verdict
        ));
    }
    text
}

fn write_results(output_dir: &Path, report: &BatchReport) -> Result<PathBuf> {
    let serialized = serde_json::to_string_pretty(report)?;
    write_text(
        output_dir,
        &format!(
            "evaluation_results_{}.json",
            report.timestamp.format(FILE_TIMESTAMP_FORMAT)
        ),
        &serialized,
    )
}

fn log_summary(summary: &SummaryReport, ground_truth: &GroundTruthStatus) {
    if let Some(err) = &ground_truth.error {
        log_warn!("[batch] scored without ground truth: {err}");
    }
    if ground_truth.skipped_rows > 0 {
        log_warn!("[batch] {} ground truth rows were skipped", ground_truth.skipped_rows);
    }
    log_info!(
        "[batch] {} sessions ({} completed, {} timed out, {} failed), {} detections ({:.1}% accepted)",
        summary.session_count,
        summary.completed_sessions,
        summary.timed_out_sessions,
        summary.failed_sessions,
        summary.total_detections,
        summary.acceptance_rate * 100.0
    );
    log_info!(
        "[batch] recall={:.3} precision={:.3} f1={:.3} coverage={:.3} mean confidence={:.3} mean latency={:.2}s",
        summary.recall,
        summary.precision,
        summary.f1,
        summary.coverage,
        summary.mean_confidence,
        summary.mean_latency_seconds
    );
    log_info!(
        "[batch] match offsets: mean={:.2}s median={:.2}s max={:.2}s, {:.1}% inside the interval",
        summary.offsets.mean_secs,
        summary.offsets.median_secs,
        summary.offsets.max_secs,
        summary.offsets.within_interval_rate * 100.0
    );
    for label in &summary.per_label {
        log_info!(
            "[batch]   {:<20} sessions={} tp={} fp={} fn={} recall={:.3} precision={:.3}",
            label.label,
            label.sessions,
            label.true_positives,
            label.false_positives,
            label.false_negatives,
            label.recall,
            label.precision
        );
    }
    if summary.extraction_warnings > 0 {
        log_warn!(
            "[batch] {} log blocks could not be fully parsed",
            summary.extraction_warnings
        );
    }
}
