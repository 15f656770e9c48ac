pub mod monitor;
pub mod process;
pub mod state;

pub use monitor::{SessionMonitor, SessionOutcome, SessionTiming};
pub use process::{DetectorCommand, DetectorHandle, DetectorLauncher, TokioDetectorLauncher};
pub use state::{SessionPhase, SessionState};
