//! Stream controller - owns all mutable state and drives the encoder

mod engine;
mod schedule;

pub use engine::{create_engine_channels, StreamEngine};
pub use schedule::parse_hhmm;

use chrono::NaiveTime;
use std::path::PathBuf;

/// Commands that can be sent to the stream engine
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// Select the video file to stream
    SetVideo(PathBuf),
    /// Select a ticker image to overlay
    SetTicker(PathBuf),
    /// Remove the ticker overlay
    ClearTicker,
    /// Set the stream key
    SetKey(String),
    /// Start streaming with the current form fields
    Start,
    /// Stop the live stream (no-op when nothing is running)
    Stop,
    /// Schedule a one-shot start at the given time of day
    Schedule(NaiveTime),
    /// Clear the scheduled start
    ClearSchedule,
    /// Re-broadcast the current status
    ReportStatus,
    /// Shutdown the engine
    Shutdown,
}

/// The two-state streaming indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamStatus {
    /// Not streaming (red indicator, start available)
    #[default]
    Off,
    /// Streaming (green indicator, stop available)
    On,
}

impl StreamStatus {
    /// Display color associated with the indicator
    pub fn color(&self) -> &'static str {
        match self {
            StreamStatus::Off => "red",
            StreamStatus::On => "green",
        }
    }
}

/// Latest network speed probe result
#[derive(Debug, Clone)]
pub enum SpeedUpdate {
    Measured {
        download_mbps: f64,
        upload_mbps: f64,
    },
    /// Measurement failed; the next interval retries regardless
    Failed,
}

/// Status updates broadcast by the stream engine
#[derive(Debug, Clone)]
pub enum EngineStatus {
    /// Indicator state changed (or was re-requested)
    Status {
        status: StreamStatus,
        message: String,
    },
    /// A one-off message for the user (the modal-dialog analogue)
    Notice(String),
    /// Network speed display update
    Speed(SpeedUpdate),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indicator_colors() {
        assert_eq!(StreamStatus::Off.color(), "red");
        assert_eq!(StreamStatus::On.color(), "green");
        assert_eq!(StreamStatus::default(), StreamStatus::Off);
    }
}
