//! Periodic network speed probe
//!
//! Measures download and upload throughput against a reference service on a
//! fixed interval and reports the most recent figures to the controller.
//! A failed measurement degrades to a "failed" update; the next interval
//! retries regardless.

use anyhow::{Context, Result};
use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::ProbeConfig;
use crate::control::SpeedUpdate;

/// Spawn the background probe task.
///
/// The first measurement runs immediately, then one per interval. The task
/// exits when the controller drops its receiver.
pub fn spawn_probe_task(config: ProbeConfig, samples: mpsc::UnboundedSender<SpeedUpdate>) {
    tokio::spawn(async move {
        let client = match Client::builder()
            .timeout(Duration::from_secs(config.interval_secs.max(1)))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                warn!("Failed to build HTTP client for speed probe: {}", e);
                return;
            }
        };

        let mut interval =
            tokio::time::interval(Duration::from_secs(config.interval_secs.max(1)));

        loop {
            interval.tick().await;

            let update = match measure(&client, &config).await {
                Ok((download_mbps, upload_mbps)) => {
                    debug!(
                        "Download speed: {:.2} Mbps, Upload speed: {:.2} Mbps",
                        download_mbps, upload_mbps
                    );
                    SpeedUpdate::Measured {
                        download_mbps,
                        upload_mbps,
                    }
                }
                Err(e) => {
                    warn!("Speed test failed: {}", e);
                    SpeedUpdate::Failed
                }
            };

            if samples.send(update).is_err() {
                break;
            }
        }
    });
}

async fn measure(client: &Client, config: &ProbeConfig) -> Result<(f64, f64)> {
    debug!("Starting speed test...");
    let download = measure_download(client, &config.download_url).await?;
    let upload = measure_upload(client, &config.upload_url, config.upload_bytes).await?;
    Ok((download, upload))
}

async fn measure_download(client: &Client, url: &str) -> Result<f64> {
    let started = Instant::now();
    let mut response = client
        .get(url)
        .send()
        .await
        .context("Download request failed")?
        .error_for_status()
        .context("Download returned error status")?;

    let mut bytes: u64 = 0;
    while let Some(chunk) = response
        .chunk()
        .await
        .context("Download body read failed")?
    {
        bytes += chunk.len() as u64;
    }

    Ok(mbps(bytes, started.elapsed()))
}

async fn measure_upload(client: &Client, url: &str, payload_bytes: usize) -> Result<f64> {
    let payload = vec![0u8; payload_bytes];
    let started = Instant::now();
    client
        .post(url)
        .body(payload)
        .send()
        .await
        .context("Upload request failed")?
        .error_for_status()
        .context("Upload returned error status")?;

    Ok(mbps(payload_bytes as u64, started.elapsed()))
}

/// Throughput in megabits per second
fn mbps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    (bytes as f64 * 8.0) / (secs * 1_000_000.0)
}
