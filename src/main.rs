//! stream-agent
//!
//! Pushes a local video file as a live RTMP stream by supervising an external
//! ffmpeg process. An optional ticker image is overlaid on the video, a
//! scheduled start can be armed for a time of day, and a background probe
//! reports network throughput.

mod config;
mod control;
mod crash;
mod encoder;
mod logging;
mod probe;
mod ui;

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use config::Config;
use control::{create_engine_channels, EngineCommand, StreamEngine};

/// Main entry point, runs the console on the main thread
fn main() -> Result<()> {
    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let no_probe = args.iter().any(|a| a == "--no-probe");

    // Initialize logging
    let _log_guard = logging::init_logging()?;

    // Crash reports land next to the logs (best effort - non-fatal if it fails)
    match logging::get_log_dir() {
        Ok(log_dir) => {
            if let Err(e) = crash::init_crash_handler(&log_dir) {
                warn!("Failed to initialize crash handler: {}", e);
            }
        }
        Err(e) => warn!("Failed to resolve log directory for crash handler: {}", e),
    }

    info!("stream-agent starting...");

    // Load configuration
    let mut config = Config::load()?;
    info!("Configuration loaded from {:?}", config.config_path());

    if no_probe {
        config.probe.enabled = false;
    }

    // Create tokio runtime for async operations
    let runtime = Arc::new(tokio::runtime::Runtime::new()?);

    // Create engine channels
    let (cmd_tx, cmd_rx, status_tx, status_rx) = create_engine_channels();

    // Create the stream engine
    let engine = StreamEngine::new(config, cmd_rx, status_tx);

    // Spawn the engine on the tokio runtime
    let engine_done = Arc::new(AtomicBool::new(false));
    let engine_runtime = runtime.clone();
    let engine_done_flag = engine_done.clone();
    let engine_handle = std::thread::spawn(move || {
        engine_runtime.block_on(async move {
            let mut engine = engine;
            if let Err(e) = engine.run().await {
                error!("Stream engine error: {}", e);
            }
        });
        engine_done_flag.store(true, Ordering::SeqCst);
    });

    // Status renderer prints broadcasts to stdout
    runtime.spawn(ui::render_statuses(status_rx));

    // Set up Ctrl+C handler that sends shutdown command
    let ctrl_c_tx = cmd_tx.clone();
    let ctrl_c_runtime = runtime.clone();
    let ctrl_c_done = engine_done.clone();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received, shutting down...");
        let tx = ctrl_c_tx.clone();
        ctrl_c_runtime.spawn(async move {
            let _ = tx.send(EngineCommand::Shutdown).await;
        });

        // Give the engine time to terminate the encoder, then exit; the
        // console is blocked on stdin and cannot be unblocked from here.
        for _ in 0..50 {
            if ctrl_c_done.load(Ordering::SeqCst) {
                break;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        std::process::exit(0);
    })?;

    // Run the console on the main thread
    let console = ui::Console::new(cmd_tx.clone());
    if let Err(e) = console.run() {
        error!("Console error: {}", e);
    }

    info!("Console exited, shutting down...");

    // Send shutdown command to engine (in case the console exited via quit/EOF)
    runtime.block_on(async {
        let _ = cmd_tx.send(EngineCommand::Shutdown).await;
    });

    // Wait for engine thread to finish
    let _ = engine_handle.join();

    info!("Shutdown complete");
    Ok(())
}

fn print_help() {
    println!("stream-agent - Stream a local video file to an RTMP endpoint");
    println!();
    println!("USAGE:");
    println!("    stream-agent [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help     Print this help message");
    println!("        --no-probe Disable the periodic network speed probe");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG                Set log level (e.g., debug, info, warn)");
    println!("    STREAM_AGENT_LOG_PATH   Override the log directory");
}
