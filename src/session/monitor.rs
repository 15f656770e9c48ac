use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::SessionFailure;
use crate::extraction::patterns::seconds_of_day;
use crate::extraction::{EventExtractor, Extraction, ExtractorConfig, LogBuffer};
use crate::models::TerminationReason;

use super::process::{DetectorCommand, DetectorHandle, DetectorLauncher};
use super::state::{SessionPhase, SessionState};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Time limits and end-of-stream detection for one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionTiming {
    /// How long to wait for the first output line
    pub startup_grace_ms: u64,
    /// Hard limit on a whole session, measured from launch
    pub deadline_ms: u64,
    /// Trailing output collected after the end-of-stream marker
    pub drain_grace_ms: u64,
    /// Time between a graceful stop and a forced kill
    pub kill_grace_ms: u64,
    /// A line containing every one of these ends the session
    pub end_markers: Vec<String>,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            startup_grace_ms: 30_000,
            deadline_ms: 600_000,
            drain_grace_ms: 2_000,
            kill_grace_ms: 5_000,
            end_markers: vec!["End of file".into(), "stopping playback".into()],
        }
    }
}

impl SessionTiming {
    pub fn is_end_marker(&self, line: &str) -> bool {
        !self.end_markers.is_empty() && self.end_markers.iter().all(|m| line.contains(m.as_str()))
    }
}

/// Everything a finished session produced. Always returned, whatever the
/// detector did.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub video_id: String,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub termination: TerminationReason,
    pub failure: Option<SessionFailure>,
    pub log: LogBuffer,
    pub extraction: Extraction,
}

impl SessionOutcome {
    pub fn log_text(&self) -> String {
        self.log.text()
    }
}

/// Runs the detector for one video and watches its output until the
/// end-of-stream marker, the deadline, or the process going away.
pub struct SessionMonitor<L> {
    launcher: L,
    timing: SessionTiming,
}

impl<L: DetectorLauncher> SessionMonitor<L> {
    pub fn new(launcher: L, timing: SessionTiming) -> Self {
        Self { launcher, timing }
    }

    pub async fn run(&self, command: &DetectorCommand, config: ExtractorConfig) -> SessionOutcome {
        let started_at = Local::now();
        let mut state = SessionState::new();
        state.begin(started_at);

        // Without an explicit origin, t = 0 is the moment the detector launched.
        let config = match config.origin_secs {
            Some(_) => config,
            None => config.with_origin(seconds_of_day(&started_at.time())),
        };
        let video_id = config.video_id.clone();
        let mut extractor = EventExtractor::new(config);
        let mut buffer = LogBuffer::new();

        log_info!("[session] starting {} for {}", command.display(), video_id);

        let mut handle = match self.launcher.start(command).await {
            Ok(handle) => handle,
            Err(err) => {
                log_warn!("[session] detector failed to start for {}: {err:#}", video_id);
                state.fail(SessionFailure::StartFailed(format!("{err:#}")));
                return Self::outcome(video_id, &state, buffer, extractor.finish());
            }
        };

        let cancel_token = CancellationToken::new();
        let deadline = spawn_deadline(
            cancel_token.clone(),
            Duration::from_millis(self.timing.deadline_ms),
        );

        self.watch(&mut handle, &mut state, &mut buffer, &mut extractor, &cancel_token)
            .await;
        deadline.abort();

        if state.phase == SessionPhase::Completing {
            self.drain(&mut handle, &mut buffer, &mut extractor).await;
            state.finish();
        }

        self.shutdown(&mut handle).await;

        let extraction = extractor.finish();
        log_info!(
            "[session] {} finished as {} after {} lines, {} drained ({} events)",
            video_id,
            state.termination().as_str(),
            state.lines_seen,
            buffer.len().saturating_sub(state.lines_seen),
            extraction.events.len()
        );
        Self::outcome(video_id, &state, buffer, extraction)
    }

    async fn watch<H: DetectorHandle>(
        &self,
        handle: &mut H,
        state: &mut SessionState,
        buffer: &mut LogBuffer,
        extractor: &mut EventExtractor,
        cancel_token: &CancellationToken,
    ) {
        let startup_grace = Duration::from_millis(self.timing.startup_grace_ms);

        loop {
            let next = if state.phase == SessionPhase::Starting {
                tokio::select! {
                    result = time::timeout(startup_grace, handle.next_line()) => match result {
                        Ok(next) => next,
                        Err(_) => {
                            log_warn!("[session] no output within {}ms", self.timing.startup_grace_ms);
                            state.fail(SessionFailure::NoOutput(self.timing.startup_grace_ms));
                            return;
                        }
                    },
                    _ = cancel_token.cancelled() => {
                        log_warn!("[session] deadline reached before any output");
                        state.fail(SessionFailure::NoOutput(self.timing.deadline_ms));
                        return;
                    }
                }
            } else {
                tokio::select! {
                    next = handle.next_line() => next,
                    _ = cancel_token.cancelled() => {
                        log_warn!("[session] deadline of {}ms reached", self.timing.deadline_ms);
                        state.time_out();
                        return;
                    }
                }
            };

            match next {
                Ok(Some(line)) => {
                    state.record_line();
                    let is_marker = self.timing.is_end_marker(&line);
                    buffer.push_line(line);
                    for event in extractor.catch_up(buffer) {
                        log_debug!(
                            "[session] {} {} at {:.1}s",
                            event.decision.as_str(),
                            event.predicted_label,
                            event.timestamp
                        );
                    }
                    if is_marker {
                        log_info!("[session] end-of-stream marker seen");
                        state.complete();
                        return;
                    }
                }
                Ok(None) => {
                    log_warn!("[session] detector output closed before the end-of-stream marker");
                    state.fail(SessionFailure::UnexpectedExit);
                    return;
                }
                Err(err) => {
                    log_warn!("[session] detector output failed: {err:#}");
                    state.fail(SessionFailure::Stream(format!("{err:#}")));
                    return;
                }
            }
        }
    }

    /// Keeps reading after the marker so a block that closes just after it
    /// is still captured.
    async fn drain<H: DetectorHandle>(
        &self,
        handle: &mut H,
        buffer: &mut LogBuffer,
        extractor: &mut EventExtractor,
    ) {
        let until = Instant::now() + Duration::from_millis(self.timing.drain_grace_ms);
        while let Ok(Ok(Some(line))) = time::timeout_at(until, handle.next_line()).await {
            buffer.push_line(line);
            extractor.catch_up(buffer);
        }
    }

    /// Graceful stop first, forced kill if the process outlives the grace.
    async fn shutdown<H: DetectorHandle>(&self, handle: &mut H) {
        let kill_grace = Duration::from_millis(self.timing.kill_grace_ms);

        if let Err(err) = handle.terminate(true).await {
            log_warn!("[session] graceful stop failed: {err:#}");
        }
        match time::timeout(kill_grace, handle.wait_for_exit()).await {
            Ok(Ok(code)) => {
                log_debug!("[session] detector exited with {:?}", code);
                return;
            }
            Ok(Err(err)) => log_warn!("[session] waiting for detector failed: {err:#}"),
            Err(_) => log_warn!(
                "[session] detector still running {}ms after stop request, killing",
                self.timing.kill_grace_ms
            ),
        }

        if let Err(err) = handle.terminate(false).await {
            log_warn!("[session] kill failed: {err:#}");
        }
        if time::timeout(kill_grace, handle.wait_for_exit()).await.is_err() {
            log_warn!("[session] detector did not exit after kill");
        }
    }

    fn outcome(
        video_id: String,
        state: &SessionState,
        log: LogBuffer,
        extraction: Extraction,
    ) -> SessionOutcome {
        SessionOutcome {
            video_id,
            started_at: state.started_at.unwrap_or_else(Local::now),
            finished_at: Local::now(),
            termination: state.termination(),
            failure: state.failure.clone(),
            log,
            extraction,
        }
    }
}

fn spawn_deadline(cancel_token: CancellationToken, after: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        time::sleep(after).await;
        cancel_token.cancel();
    })
}
