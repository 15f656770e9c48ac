use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Program and arguments for one detector run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl DetectorCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
        }
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Starts detector processes.
#[allow(async_fn_in_trait)]
pub trait DetectorLauncher {
    type Handle: DetectorHandle;

    async fn start(&self, command: &DetectorCommand) -> Result<Self::Handle>;
}

/// A running detector, seen as one merged stream of output lines.
#[allow(async_fn_in_trait)]
pub trait DetectorHandle {
    /// Next output line, or `None` once the process has closed its output.
    async fn next_line(&mut self) -> Result<Option<String>>;

    /// Asks the process to stop. A graceful stop lets it clean up; otherwise
    /// it is killed outright.
    async fn terminate(&mut self, graceful: bool) -> Result<()>;

    /// Waits for the process to exit and returns its exit code when it has one.
    async fn wait_for_exit(&mut self) -> Result<Option<i32>>;
}

/// Launches detectors as child processes. Stdout and stderr are merged line
/// by line, and the child is killed if its handle is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDetectorLauncher;

impl DetectorLauncher for TokioDetectorLauncher {
    type Handle = TokioDetectorHandle;

    async fn start(&self, command: &DetectorCommand) -> Result<TokioDetectorHandle> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn `{}`", command.display()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(stderr, tx.clone())));
        }
        drop(tx);

        log::info!(
            "[session] spawned detector pid={:?}: {}",
            child.id(),
            command.display()
        );

        Ok(TokioDetectorHandle {
            child,
            lines: rx,
            readers,
        })
    }
}

pub struct TokioDetectorHandle {
    child: Child,
    lines: mpsc::UnboundedReceiver<io::Result<String>>,
    readers: Vec<JoinHandle<()>>,
}

impl DetectorHandle for TokioDetectorHandle {
    async fn next_line(&mut self) -> Result<Option<String>> {
        match self.lines.recv().await {
            Some(Ok(line)) => Ok(Some(line)),
            Some(Err(err)) => Err(err).context("failed to read detector output"),
            None => Ok(None),
        }
    }

    async fn terminate(&mut self, graceful: bool) -> Result<()> {
        if self
            .child
            .try_wait()
            .context("failed to poll detector")?
            .is_some()
        {
            return Ok(());
        }

        if graceful {
            return self.request_stop().await;
        }

        self.child.start_kill().context("failed to kill detector")
    }

    async fn wait_for_exit(&mut self) -> Result<Option<i32>> {
        let status = self
            .child
            .wait()
            .await
            .context("failed to wait for detector")?;
        for reader in self.readers.drain(..) {
            reader.abort();
        }
        Ok(status.code())
    }
}

impl TokioDetectorHandle {
    /// Sends SIGTERM so the detector can flush its output before exiting.
    #[cfg(unix)]
    async fn request_stop(&mut self) -> Result<()> {
        match self.child.id() {
            Some(pid) => send_sigterm(pid).await,
            None => self.child.start_kill().context("failed to kill detector"),
        }
    }

    /// No polite stop signal off unix, so this is the forced kill.
    #[cfg(not(unix))]
    async fn request_stop(&mut self) -> Result<()> {
        self.child.start_kill().context("failed to kill detector")
    }
}

impl Drop for TokioDetectorHandle {
    fn drop(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
    }
}

#[cfg(unix)]
async fn send_sigterm(pid: u32) -> Result<()> {
    let status = Command::new("kill")
        .arg("-TERM")
        .arg(pid.to_string())
        .status()
        .await
        .context("failed to run kill")?;
    if !status.success() {
        log::warn!("[session] kill -TERM {pid} exited with {status}");
    }
    Ok(())
}

/// Copies lines from one pipe into the shared channel. Invalid UTF-8 is
/// replaced rather than treated as an error.
async fn forward_lines<R>(stream: R, tx: mpsc::UnboundedSender<io::Result<String>>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(|c| c == '\n' || c == '\r')
                    .to_string();
                if tx.send(Ok(line)).is_err() {
                    break;
                }
            }
            Err(err) => {
                let _ = tx.send(Err(err));
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> DetectorCommand {
        DetectorCommand::new("sh", vec!["-c".into(), script.into()])
    }

    #[tokio::test]
    async fn test_merges_stdout_and_stderr() {
        let mut handle = TokioDetectorLauncher
            .start(&sh("echo out; sleep 0.1; echo err 1>&2"))
            .await
            .unwrap();

        let mut lines = Vec::new();
        while let Some(line) = handle.next_line().await.unwrap() {
            lines.push(line);
        }
        assert_eq!(lines, vec!["out".to_string(), "err".to_string()]);
        assert_eq!(handle.wait_for_exit().await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_graceful_terminate_stops_long_running_child() {
        let mut handle = TokioDetectorLauncher
            .start(&sh("echo ready; exec sleep 30"))
            .await
            .unwrap();
        assert_eq!(handle.next_line().await.unwrap().as_deref(), Some("ready"));

        handle.terminate(true).await.unwrap();
        let exited =
            tokio::time::timeout(std::time::Duration::from_secs(5), handle.wait_for_exit()).await;
        assert!(exited.is_ok());
    }

    #[tokio::test]
    async fn test_graceful_terminate_lets_detector_run_its_term_handler() {
        let mut handle = TokioDetectorLauncher
            .start(&sh("trap 'echo flushed; exit 0' TERM; echo ready; while :; do sleep 0.1; done"))
            .await
            .unwrap();
        assert_eq!(handle.next_line().await.unwrap().as_deref(), Some("ready"));

        handle.terminate(true).await.unwrap();
        let next = tokio::time::timeout(std::time::Duration::from_secs(5), handle.next_line())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.as_deref(), Some("flushed"));
        assert_eq!(handle.wait_for_exit().await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_start() {
        let result = TokioDetectorLauncher
            .start(&DetectorCommand::new("/nonexistent/detector-binary", Vec::new()))
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_display_joins_program_and_args() {
        assert_eq!(sh("echo hi").display(), "sh -c echo hi");
    }
}
