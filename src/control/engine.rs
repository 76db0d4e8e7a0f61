//! Stream engine
//!
//! Single owner of the form fields, the schedule target, the encoder handle,
//! and the status indicator. Commands arrive on an mpsc channel, status goes
//! out on a broadcast channel, and encoder lifecycle outcomes come back from
//! the supervision task over a channel, so every status update flows through
//! one place. No locks anywhere.

use anyhow::Result;
use chrono::{Local, NaiveTime};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::encoder::{
    build_command, EncoderError, EncoderEvent, EncoderOutcome, EncoderSupervisor, StreamRequest,
};
use crate::probe;

use super::schedule;
use super::{EngineCommand, EngineStatus, StreamStatus};

const STATUS_CHANNEL_CAPACITY: usize = 64;
const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Create the command/status channel pair for the engine
pub fn create_engine_channels() -> (
    mpsc::Sender<EngineCommand>,
    mpsc::Receiver<EngineCommand>,
    broadcast::Sender<EngineStatus>,
    broadcast::Receiver<EngineStatus>,
) {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let (status_tx, status_rx) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
    (cmd_tx, cmd_rx, status_tx, status_rx)
}

/// Validation failures caught before any process is spawned
#[derive(Debug, Error)]
pub enum StartError {
    #[error("Please select a video file first")]
    MissingVideo,

    #[error("Video file does not exist: {0:?}")]
    VideoNotFound(PathBuf),

    #[error("Please enter a stream key first")]
    MissingKey,
}

/// The current form fields, seeded from config and mutated by commands
#[derive(Debug, Clone, Default)]
struct StreamForm {
    video: Option<PathBuf>,
    ticker: Option<PathBuf>,
    stream_key: Option<String>,
}

impl StreamForm {
    /// Build a stream request, or report what is missing
    fn validate(&self) -> Result<StreamRequest, StartError> {
        let video = self.video.clone().ok_or(StartError::MissingVideo)?;
        if !video.is_file() {
            return Err(StartError::VideoNotFound(video));
        }

        let stream_key = self
            .stream_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(StartError::MissingKey)?
            .to_string();

        Ok(StreamRequest {
            video,
            ticker: self.ticker.clone(),
            stream_key,
        })
    }
}

/// The stream engine drives the encoder from commands, the schedule tick,
/// and encoder lifecycle events
pub struct StreamEngine {
    /// Configuration
    config: Config,
    /// Encoder process supervisor
    supervisor: EncoderSupervisor,
    /// Current form fields
    form: StreamForm,
    /// One-shot scheduled start target
    schedule_target: Option<NaiveTime>,
    /// Current indicator state
    status: StreamStatus,
    /// Message shown alongside the indicator
    status_message: String,
    /// Command receiver
    cmd_rx: mpsc::Receiver<EngineCommand>,
    /// Status broadcaster
    status_tx: broadcast::Sender<EngineStatus>,
    /// Encoder lifecycle events (sender cloned into each supervision task)
    encoder_tx: mpsc::UnboundedSender<EncoderEvent>,
    encoder_rx: mpsc::UnboundedReceiver<EncoderEvent>,
}

impl StreamEngine {
    /// Create a new stream engine
    pub fn new(
        config: Config,
        cmd_rx: mpsc::Receiver<EngineCommand>,
        status_tx: broadcast::Sender<EngineStatus>,
    ) -> Self {
        let supervisor = EncoderSupervisor::new(config.encoder.ffmpeg_path.clone());

        let form = StreamForm {
            video: config.stream.video_path.clone(),
            ticker: config.stream.ticker_path.clone(),
            stream_key: config.stream.stream_key.clone(),
        };

        let schedule_target = match config.stream.schedule.as_deref() {
            Some(s) => {
                let parsed = schedule::parse_hhmm(s);
                if parsed.is_none() {
                    warn!("Ignoring invalid schedule time in config: {:?}", s);
                }
                parsed
            }
            None => None,
        };

        let (encoder_tx, encoder_rx) = mpsc::unbounded_channel();

        Self {
            config,
            supervisor,
            form,
            schedule_target,
            status: StreamStatus::Off,
            status_message: "Streaming is off".to_string(),
            cmd_rx,
            status_tx,
            encoder_tx,
            encoder_rx,
        }
    }

    /// Run the engine until shutdown
    pub async fn run(&mut self) -> Result<()> {
        info!("Stream engine started");

        // Off at initialization
        self.broadcast_status();

        if let Some(target) = self.schedule_target {
            self.notice(format!("Streaming scheduled at {}", target.format("%H:%M")));
        }

        let (probe_tx, mut probe_rx) = mpsc::unbounded_channel();
        if self.config.probe.enabled {
            probe::spawn_probe_task(self.config.probe.clone(), probe_tx);
        }

        let mut schedule_tick = tokio::time::interval(Duration::from_secs(1));
        schedule_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if self.handle_command(cmd).await {
                                break;
                            }
                        }
                        None => {
                            info!("Command channel closed, stopping engine");
                            self.shutdown().await;
                            break;
                        }
                    }
                }
                Some(event) = self.encoder_rx.recv() => {
                    self.handle_encoder_event(event);
                }
                Some(update) = probe_rx.recv() => {
                    let _ = self.status_tx.send(EngineStatus::Speed(update));
                }
                _ = schedule_tick.tick() => {
                    self.check_schedule();
                }
            }
        }

        info!("Stream engine stopped");
        Ok(())
    }

    /// Handle a command; returns true when the engine should shut down
    async fn handle_command(&mut self, cmd: EngineCommand) -> bool {
        match cmd {
            EngineCommand::SetVideo(path) => {
                info!("Selected file: {:?}", path);
                self.notice(format!("Selected file: {}", path.display()));
                self.form.video = Some(path);
            }
            EngineCommand::SetTicker(path) => {
                info!("Selected ticker image: {:?}", path);
                self.notice(format!("Selected ticker image: {}", path.display()));
                self.form.ticker = Some(path);
            }
            EngineCommand::ClearTicker => {
                self.notice("Ticker overlay removed".to_string());
                self.form.ticker = None;
            }
            EngineCommand::SetKey(key) => {
                self.notice("Stream key set".to_string());
                self.form.stream_key = Some(key);
            }
            EngineCommand::Start => self.start_stream(),
            EngineCommand::Stop => self.stop_stream(),
            EngineCommand::Schedule(target) => {
                info!("Streaming scheduled at {}", target.format("%H:%M"));
                self.notice(format!("Streaming scheduled at {}", target.format("%H:%M")));
                self.schedule_target = Some(target);
            }
            EngineCommand::ClearSchedule => {
                if self.schedule_target.take().is_some() {
                    self.notice("Schedule cleared".to_string());
                }
            }
            EngineCommand::ReportStatus => self.broadcast_status(),
            EngineCommand::Shutdown => {
                self.shutdown().await;
                return true;
            }
        }
        false
    }

    /// Validate the form and launch the encoder.
    ///
    /// The indicator goes ON before the process is confirmed running; a spawn
    /// failure reverts it. Validation failures leave the status untouched.
    fn start_stream(&mut self) {
        if self.supervisor.is_running() {
            self.notice("Streaming is already running".to_string());
            return;
        }

        let request = match self.form.validate() {
            Ok(request) => request,
            Err(e) => {
                warn!("Cannot start streaming: {}", e);
                self.notice(e.to_string());
                return;
            }
        };

        let cmd = build_command(&request, &self.config.encoder.rtmp_base);
        info!("Starting streaming to {}", cmd.destination);

        // Optimistic transition, mirrored back only if the spawn fails
        self.set_status(StreamStatus::On, "Streaming is on");

        match self.supervisor.spawn(&cmd, self.encoder_tx.clone()) {
            Ok(()) => {}
            Err(EncoderError::NotFound(path)) => {
                self.notice(format!("Encoder binary not found: {}", path.display()));
                self.set_status(StreamStatus::Off, "Streaming is off");
            }
            Err(e) => {
                self.notice(format!("An error occurred: {}", e));
                self.set_status(StreamStatus::Off, "Streaming is off");
            }
        }
    }

    /// Request termination of the live encoder. A no-op when nothing is
    /// running: no status change, no notice.
    fn stop_stream(&mut self) {
        if self.supervisor.terminate() {
            info!("Stop requested, terminating encoder");
        }
    }

    /// Reflect an encoder lifecycle outcome into the indicator, exactly once.
    /// Outcomes from an encoder that is no longer the live one are dropped.
    fn handle_encoder_event(&mut self, event: EncoderEvent) {
        if !self.supervisor.acknowledge_exit(event.generation) {
            debug!(
                "Dropping stale encoder event (generation {})",
                event.generation
            );
            return;
        }

        let message = match event.outcome {
            EncoderOutcome::Killed => {
                info!("Streaming stopped by user");
                "Streaming stopped by user"
            }
            EncoderOutcome::Exited { code } => {
                // Exit code is logged but not distinguished: any exit is a stop
                info!("Encoder exited (code: {:?})", code);
                "Streaming stopped"
            }
        };

        if self.status == StreamStatus::On {
            self.set_status(StreamStatus::Off, message);
        }
    }

    /// Fire the scheduled start when the wall clock reaches the target minute
    fn check_schedule(&mut self) {
        let Some(target) = self.schedule_target else {
            return;
        };

        let now = Local::now().time();
        if schedule::is_due(target, now) {
            // Clear first so it cannot re-fire within the same minute
            self.schedule_target = None;
            info!("Scheduled start time reached ({})", target.format("%H:%M"));
            self.start_stream();
        }
    }

    /// Terminate the encoder (if live) and wait for its confirmation,
    /// skipping over any stale events still queued
    async fn shutdown(&mut self) {
        info!("Shutting down stream engine");
        if !self.supervisor.terminate() {
            return;
        }

        while self.supervisor.is_running() {
            match tokio::time::timeout(Duration::from_secs(5), self.encoder_rx.recv()).await {
                Ok(Some(event)) => self.handle_encoder_event(event),
                _ => {
                    warn!("Timed out waiting for encoder to stop");
                    break;
                }
            }
        }
    }

    fn set_status(&mut self, status: StreamStatus, message: &str) {
        debug!("Status indicator: {} - {}", status.color(), message);
        self.status = status;
        self.status_message = message.to_string();
        self.broadcast_status();
    }

    fn broadcast_status(&self) {
        let _ = self.status_tx.send(EngineStatus::Status {
            status: self.status,
            message: self.status_message.clone(),
        });
    }

    fn notice(&self, message: String) {
        let _ = self.status_tx.send(EngineStatus::Notice(message));
    }
}
