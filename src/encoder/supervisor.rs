//! Encoder process supervision
//!
//! Handles launching, monitoring, and terminating the ffmpeg process. At most
//! one encoder is live at a time; a second spawn is rejected here rather than
//! relying on the interactive surface to prevent it. Lifecycle outcomes are
//! reported back to the controller over a channel.
//!
//! Each spawn gets a generation id, carried in its lifecycle event. A
//! terminated encoder keeps its handle (in a stopping state) until its own
//! event is acknowledged, and events from an earlier generation are rejected,
//! so an outcome arriving late can never be mistaken for the live encoder's.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::command::EncoderCommand;

/// Lifecycle outcome reported by a supervision task
#[derive(Debug, Clone, Copy)]
pub struct EncoderEvent {
    /// Which spawn this outcome belongs to
    pub generation: u64,
    pub outcome: EncoderOutcome,
}

#[derive(Debug, Clone, Copy)]
pub enum EncoderOutcome {
    /// The encoder exited on its own. The exit code is reported for the log
    /// but success and failure are treated the same: the stream is over.
    Exited { code: Option<i32> },
    /// The encoder was terminated on request
    Killed,
}

#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("encoder binary not found: {0:?}")]
    NotFound(PathBuf),

    #[error("an encoder process is already running")]
    AlreadyRunning,

    #[error("failed to start encoder: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Handle to a live (or stopping) encoder process
struct RunningEncoder {
    generation: u64,
    /// Taken on terminate; None means a stop is already in flight
    kill_tx: Option<oneshot::Sender<()>>,
}

/// Supervises the single ffmpeg process
pub struct EncoderSupervisor {
    ffmpeg_path: PathBuf,
    running: Option<RunningEncoder>,
    generation: u64,
}

impl EncoderSupervisor {
    pub fn new(ffmpeg_path: PathBuf) -> Self {
        Self {
            ffmpeg_path,
            running: None,
            generation: 0,
        }
    }

    /// Whether an encoder handle is held, live or still going down
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Spawn the encoder and register a supervision task.
    ///
    /// The task waits on the child and reports the outcome on `events`.
    /// Fails when the binary cannot be located or executed, or when an
    /// encoder handle is still held - including one whose termination has
    /// been requested but not yet confirmed.
    pub fn spawn(
        &mut self,
        cmd: &EncoderCommand,
        events: mpsc::UnboundedSender<EncoderEvent>,
    ) -> Result<(), EncoderError> {
        if self.running.is_some() {
            return Err(EncoderError::AlreadyRunning);
        }

        info!("Launching encoder: {:?} {:?}", self.ffmpeg_path, cmd.args);

        let child = Command::new(&self.ffmpeg_path)
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EncoderError::NotFound(self.ffmpeg_path.clone())
                } else {
                    EncoderError::Spawn(e)
                }
            })?;

        self.generation += 1;
        let generation = self.generation;

        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(supervise(child, generation, kill_rx, events));

        self.running = Some(RunningEncoder {
            generation,
            kill_tx: Some(kill_tx),
        });
        Ok(())
    }

    /// Request termination of the live encoder.
    ///
    /// The handle stays in place until the supervision task's own event is
    /// acknowledged, so a new spawn is rejected while the old process is
    /// still going down. Returns false (a no-op) when nothing is live or a
    /// stop is already in flight.
    pub fn terminate(&mut self) -> bool {
        match self.running.as_mut().and_then(|r| r.kill_tx.take()) {
            Some(kill_tx) => kill_tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Clear the handle if the reported outcome belongs to it.
    ///
    /// Returns false for a stale generation - an earlier encoder's outcome
    /// arriving after a restart - which must not disturb the live handle.
    pub fn acknowledge_exit(&mut self, generation: u64) -> bool {
        match &self.running {
            Some(r) if r.generation == generation => {
                self.running = None;
                true
            }
            _ => false,
        }
    }
}

/// Waits for the encoder to exit, or kills it when asked to
async fn supervise(
    mut child: Child,
    generation: u64,
    kill_rx: oneshot::Receiver<()>,
    events: mpsc::UnboundedSender<EncoderEvent>,
) {
    tokio::select! {
        status = child.wait() => {
            let code = match status {
                Ok(status) => {
                    debug!("Encoder exited with status: {:?}", status);
                    status.code()
                }
                Err(e) => {
                    warn!("Failed to wait on encoder process: {}", e);
                    None
                }
            };
            let _ = events.send(EncoderEvent {
                generation,
                outcome: EncoderOutcome::Exited { code },
            });
        }
        _ = kill_rx => {
            graceful_stop(&mut child).await;
            let _ = events.send(EncoderEvent {
                generation,
                outcome: EncoderOutcome::Killed,
            });
        }
    }
}

/// SIGTERM with a short grace period, then SIGKILL
async fn graceful_stop(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
        match tokio::time::timeout(Duration::from_secs(2), child.wait()).await {
            Ok(_) => return,
            Err(_) => warn!("Encoder did not stop gracefully, killing..."),
        }
    }

    if let Err(e) = child.kill().await {
        warn!("Failed to kill encoder process: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_command(args: &[&str]) -> EncoderCommand {
        EncoderCommand {
            args: args.iter().map(|s| s.to_string()).collect(),
            destination: String::new(),
        }
    }

    #[test]
    fn test_terminate_with_no_process_is_noop() {
        let mut supervisor = EncoderSupervisor::new(PathBuf::from("ffmpeg"));
        assert!(!supervisor.terminate());
        assert!(!supervisor.is_running());
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_reports_not_found() {
        let mut supervisor =
            EncoderSupervisor::new(PathBuf::from("/nonexistent/path/to/ffmpeg"));
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = supervisor.spawn(&dummy_command(&[]), tx).unwrap_err();
        assert!(matches!(err, EncoderError::NotFound(_)));
        assert!(!supervisor.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_second_spawn_rejected_and_terminate_kills() {
        let mut supervisor = EncoderSupervisor::new(PathBuf::from("/bin/sleep"));
        let (tx, mut rx) = mpsc::unbounded_channel();

        supervisor.spawn(&dummy_command(&["30"]), tx.clone()).unwrap();
        assert!(supervisor.is_running());

        let err = supervisor.spawn(&dummy_command(&["30"]), tx).unwrap_err();
        assert!(matches!(err, EncoderError::AlreadyRunning));

        assert!(supervisor.terminate());
        // Only the confirmation clears the handle
        assert!(supervisor.is_running());
        // A second stop while the first is in flight is a no-op
        assert!(!supervisor.terminate());

        let event = rx.recv().await.expect("missing kill confirmation");
        assert!(matches!(event.outcome, EncoderOutcome::Killed));
        assert!(supervisor.acknowledge_exit(event.generation));
        assert!(!supervisor.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_natural_exit_reports_exited() {
        let mut supervisor = EncoderSupervisor::new(PathBuf::from("/bin/sleep"));
        let (tx, mut rx) = mpsc::unbounded_channel();

        supervisor.spawn(&dummy_command(&["0"]), tx).unwrap();

        let event = rx.recv().await.expect("missing exit event");
        match event.outcome {
            EncoderOutcome::Exited { code } => assert_eq!(code, Some(0)),
            other => panic!("expected Exited outcome, got {:?}", other),
        }
        assert!(supervisor.acknowledge_exit(event.generation));
        assert!(!supervisor.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_rejected_until_exit_acknowledged() {
        let mut supervisor = EncoderSupervisor::new(PathBuf::from("/bin/sleep"));
        let (tx, mut rx) = mpsc::unbounded_channel();

        supervisor.spawn(&dummy_command(&["30"]), tx.clone()).unwrap();
        assert!(supervisor.terminate());

        // Restarting before the old process is confirmed down is rejected
        let err = supervisor
            .spawn(&dummy_command(&["30"]), tx.clone())
            .unwrap_err();
        assert!(matches!(err, EncoderError::AlreadyRunning));

        let event = rx.recv().await.expect("missing kill confirmation");
        assert!(supervisor.acknowledge_exit(event.generation));

        // Now the replacement can start
        supervisor.spawn(&dummy_command(&["30"]), tx).unwrap();
        assert!(supervisor.is_running());

        supervisor.terminate();
        let event = rx.recv().await.expect("missing kill confirmation");
        assert!(supervisor.acknowledge_exit(event.generation));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stale_generation_does_not_clear_live_handle() {
        let mut supervisor = EncoderSupervisor::new(PathBuf::from("/bin/sleep"));
        let (tx, mut rx) = mpsc::unbounded_channel();

        supervisor.spawn(&dummy_command(&["0"]), tx.clone()).unwrap();
        let first = rx.recv().await.expect("missing exit event");
        assert!(supervisor.acknowledge_exit(first.generation));

        supervisor.spawn(&dummy_command(&["30"]), tx).unwrap();

        // The old encoder's outcome must not touch the new handle
        assert!(!supervisor.acknowledge_exit(first.generation));
        assert!(supervisor.is_running());

        supervisor.terminate();
        let event = rx.recv().await.expect("missing kill confirmation");
        assert!(supervisor.acknowledge_exit(event.generation));
    }
}
