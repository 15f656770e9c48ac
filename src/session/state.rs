use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::SessionFailure;
use crate::models::TerminationReason;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Starting,
    Running,
    Completing,
    Done,
    Failed,
    TimedOut,
}

impl Default for SessionPhase {
    fn default() -> Self {
        SessionPhase::Starting
    }
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Starting => "starting",
            SessionPhase::Running => "running",
            SessionPhase::Completing => "completing",
            SessionPhase::Done => "done",
            SessionPhase::Failed => "failed",
            SessionPhase::TimedOut => "timed_out",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionPhase::Done | SessionPhase::Failed | SessionPhase::TimedOut
        )
    }

    pub fn can_transition_to(&self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, next),
            (Starting, Running)
                | (Starting, Failed)
                | (Running, Completing)
                | (Running, Failed)
                | (Running, TimedOut)
                | (Completing, Done)
        )
    }
}

/// Lifecycle of one detector session. Transitions that the phase graph does
/// not allow are ignored, so a late signal cannot undo a terminal phase.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub started_at: Option<DateTime<Local>>,
    pub lines_seen: usize,
    pub failure: Option<SessionFailure>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, started_at: DateTime<Local>) {
        *self = Self {
            started_at: Some(started_at),
            ..Self::default()
        };
    }

    /// Counts an output line; the first one moves `Starting` to `Running`.
    pub fn record_line(&mut self) {
        self.lines_seen += 1;
        if self.phase == SessionPhase::Starting {
            self.transition(SessionPhase::Running);
        }
    }

    pub fn complete(&mut self) -> bool {
        self.transition(SessionPhase::Completing)
    }

    pub fn finish(&mut self) -> bool {
        self.transition(SessionPhase::Done)
    }

    pub fn time_out(&mut self) -> bool {
        self.transition(SessionPhase::TimedOut)
    }

    pub fn fail(&mut self, failure: SessionFailure) -> bool {
        let moved = self.transition(SessionPhase::Failed);
        if moved {
            self.failure = Some(failure);
        }
        moved
    }

    /// Reason to report for the session. Only meaningful once terminal.
    pub fn termination(&self) -> TerminationReason {
        match self.phase {
            SessionPhase::Done | SessionPhase::Completing => TerminationReason::Completed,
            SessionPhase::TimedOut => TerminationReason::TimedOut,
            SessionPhase::Starting | SessionPhase::Running | SessionPhase::Failed => {
                TerminationReason::Failed
            }
        }
    }

    fn transition(&mut self, next: SessionPhase) -> bool {
        if !self.phase.can_transition_to(next) {
            log::debug!(
                "[session] ignoring transition {} -> {}",
                self.phase.as_str(),
                next.as_str()
            );
            return false;
        }
        self.phase = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_names_match_termination_reasons() {
        assert_eq!(
            serde_json::to_string(&SessionPhase::TimedOut).unwrap(),
            serde_json::to_string(&TerminationReason::TimedOut).unwrap()
        );
        assert_eq!(SessionPhase::TimedOut.as_str(), TerminationReason::TimedOut.as_str());
        assert_eq!(
            serde_json::from_str::<SessionPhase>("\"timed_out\"").unwrap(),
            SessionPhase::TimedOut
        );
    }

    #[test]
    fn test_happy_path_reaches_done() {
        let mut state = SessionState::new();
        state.begin(Local::now());
        assert_eq!(state.phase, SessionPhase::Starting);

        state.record_line();
        state.record_line();
        assert_eq!(state.phase, SessionPhase::Running);
        assert_eq!(state.lines_seen, 2);

        assert!(state.complete());
        assert!(state.finish());
        assert!(state.phase.is_terminal());
        assert_eq!(state.termination(), TerminationReason::Completed);
    }

    #[test]
    fn test_terminal_phase_ignores_late_signals() {
        let mut state = SessionState::new();
        state.record_line();
        assert!(state.time_out());
        assert!(!state.complete());
        assert!(!state.fail(SessionFailure::UnexpectedExit));
        assert_eq!(state.termination(), TerminationReason::TimedOut);
        assert_eq!(state.failure, None);
    }

    #[test]
    fn test_starting_cannot_time_out() {
        let mut state = SessionState::new();
        assert!(!state.time_out());
        assert!(state.fail(SessionFailure::NoOutput(30_000)));
        assert_eq!(state.termination(), TerminationReason::Failed);
        assert_eq!(state.failure, Some(SessionFailure::NoOutput(30_000)));
    }
}
