//! Interactive console surface
//!
//! A line-oriented replacement for the form: commands mutate the engine's
//! form fields and drive start/stop, while a renderer task prints status
//! broadcasts as an indicator dot plus message.

use anyhow::Result;
use std::io::BufRead;
use std::path::PathBuf;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::control::{parse_hhmm, EngineCommand, EngineStatus, SpeedUpdate, StreamStatus};

const GREEN_DOT: &str = "\x1b[32m\u{25cf}\x1b[0m";
const RED_DOT: &str = "\x1b[31m\u{25cf}\x1b[0m";

/// What a parsed input line asks for
#[derive(Debug, Clone)]
pub enum ConsoleAction {
    /// Forward a command to the engine
    Engine(EngineCommand),
    /// Print usage
    Help,
    /// Exit the console
    Quit,
    /// Blank line
    Empty,
    /// Unrecognized or malformed input, with a hint
    Invalid(String),
}

/// Parse one input line into a console action
pub fn parse_line(line: &str) -> ConsoleAction {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleAction::Empty;
    }

    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };

    match cmd {
        "video" => {
            if rest.is_empty() {
                ConsoleAction::Invalid("usage: video <path>".to_string())
            } else {
                ConsoleAction::Engine(EngineCommand::SetVideo(PathBuf::from(rest)))
            }
        }
        "ticker" => match rest {
            "" => ConsoleAction::Invalid("usage: ticker <path> | ticker off".to_string()),
            "off" => ConsoleAction::Engine(EngineCommand::ClearTicker),
            path => ConsoleAction::Engine(EngineCommand::SetTicker(PathBuf::from(path))),
        },
        "key" => {
            if rest.is_empty() {
                ConsoleAction::Invalid("usage: key <stream key>".to_string())
            } else {
                ConsoleAction::Engine(EngineCommand::SetKey(rest.to_string()))
            }
        }
        "start" => ConsoleAction::Engine(EngineCommand::Start),
        "stop" => ConsoleAction::Engine(EngineCommand::Stop),
        "schedule" => match rest {
            "" => ConsoleAction::Invalid("usage: schedule HH:MM | schedule off".to_string()),
            "off" => ConsoleAction::Engine(EngineCommand::ClearSchedule),
            time => match parse_hhmm(time) {
                Some(target) => ConsoleAction::Engine(EngineCommand::Schedule(target)),
                None => ConsoleAction::Invalid(format!("invalid time {:?}, expected HH:MM", time)),
            },
        },
        "status" => ConsoleAction::Engine(EngineCommand::ReportStatus),
        "help" | "?" => ConsoleAction::Help,
        "quit" | "exit" => ConsoleAction::Quit,
        other => ConsoleAction::Invalid(format!("unknown command: {} (try 'help')", other)),
    }
}

/// Render one status broadcast as a console line
pub fn render(status: &EngineStatus) -> String {
    match status {
        EngineStatus::Status { status, message } => {
            let dot = match status {
                StreamStatus::On => GREEN_DOT,
                StreamStatus::Off => RED_DOT,
            };
            format!("{} {}", dot, message)
        }
        EngineStatus::Notice(message) => message.clone(),
        EngineStatus::Speed(SpeedUpdate::Measured {
            download_mbps,
            upload_mbps,
        }) => format!(
            "Download: {:.2} Mbps / Upload: {:.2} Mbps",
            download_mbps, upload_mbps
        ),
        EngineStatus::Speed(SpeedUpdate::Failed) => "Speed test failed".to_string(),
    }
}

/// Renderer task: prints status broadcasts until the engine goes away
pub async fn render_statuses(mut status_rx: broadcast::Receiver<EngineStatus>) {
    loop {
        match status_rx.recv().await {
            Ok(status) => println!("{}", render(&status)),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("Status renderer lagged, skipped {} updates", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// The interactive console, run on the main thread
pub struct Console {
    cmd_tx: mpsc::Sender<EngineCommand>,
}

impl Console {
    pub fn new(cmd_tx: mpsc::Sender<EngineCommand>) -> Self {
        Self { cmd_tx }
    }

    /// Read commands from stdin until quit or EOF
    pub fn run(self) -> Result<()> {
        println!("stream-agent ready (type 'help' for commands)");

        let stdin = std::io::stdin();
        let mut line = String::new();

        loop {
            line.clear();
            if stdin.lock().read_line(&mut line)? == 0 {
                // EOF
                break;
            }

            match parse_line(&line) {
                ConsoleAction::Empty => {}
                ConsoleAction::Help => print_usage(),
                ConsoleAction::Quit => break,
                ConsoleAction::Invalid(hint) => println!("{}", hint),
                ConsoleAction::Engine(cmd) => {
                    if self.cmd_tx.blocking_send(cmd).is_err() {
                        // Engine is gone; nothing left to drive
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

fn print_usage() {
    println!("COMMANDS:");
    println!("    video <path>       Select the video file to stream");
    println!("    ticker <path>      Overlay a ticker image (bottom-left)");
    println!("    ticker off         Remove the ticker overlay");
    println!("    key <stream key>   Set the stream key");
    println!("    start              Start streaming");
    println!("    stop               Stop streaming");
    println!("    schedule HH:MM     Schedule a one-shot start");
    println!("    schedule off       Clear the scheduled start");
    println!("    status             Show the current status");
    println!("    quit               Exit");
}
