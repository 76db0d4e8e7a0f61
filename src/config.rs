//! Configuration management for stream-agent

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Encoder configuration (binary path, destination base)
    #[serde(default)]
    pub encoder: EncoderConfig,

    /// Pre-seeded stream form fields
    #[serde(default)]
    pub stream: StreamConfig,

    /// Network speed probe configuration
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Path to config file (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Path to the ffmpeg binary. A bare name is resolved via PATH.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Base RTMP URL the stream key is appended to
    #[serde(default = "default_rtmp_base")]
    pub rtmp_base: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Video file to stream (can also be set from the console)
    pub video_path: Option<PathBuf>,

    /// Ticker image overlaid at the bottom-left of the frame
    pub ticker_path: Option<PathBuf>,

    /// Stream key appended verbatim to the RTMP base URL
    pub stream_key: Option<String>,

    /// Scheduled start time of day, "HH:MM"
    pub schedule: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Whether to run the periodic network speed probe
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Probe interval in seconds
    #[serde(default = "default_probe_interval")]
    pub interval_secs: u64,

    /// Reference URL for the download measurement
    #[serde(default = "default_download_url")]
    pub download_url: String,

    /// Reference URL for the upload measurement
    #[serde(default = "default_upload_url")]
    pub upload_url: String,

    /// Upload payload size in bytes
    #[serde(default = "default_upload_bytes")]
    pub upload_bytes: usize,
}

// Default value functions
fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_rtmp_base() -> String {
    "rtmp://a.rtmp.youtube.com/live2".to_string()
}

fn default_true() -> bool {
    true
}

fn default_probe_interval() -> u64 {
    60
}

fn default_download_url() -> String {
    "https://speed.cloudflare.com/__down?bytes=10000000".to_string()
}

fn default_upload_url() -> String {
    "https://speed.cloudflare.com/__up".to_string()
}

fn default_upload_bytes() -> usize {
    2_000_000
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            rtmp_base: default_rtmp_base(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_probe_interval(),
            download_url: default_download_url(),
            upload_url: default_upload_url(),
            upload_bytes: default_upload_bytes(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            encoder: EncoderConfig::default(),
            stream: StreamConfig::default(),
            probe: ProbeConfig::default(),
            config_path: None,
        }
    }
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

            let mut config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

            config.config_path = Some(config_path);
            Ok(config)
        } else {
            // Create default config
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = self
            .config_path
            .clone()
            .unwrap_or_else(|| Self::default_config_path().expect("Failed to get config path"));

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Get the config file path
    pub fn config_path(&self) -> PathBuf {
        self.config_path
            .clone()
            .unwrap_or_else(|| Self::default_config_path().expect("Failed to get config path"))
    }

    /// Get default config path
    fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = directories::ProjectDirs::from("dev", "stream-agent", "agent")
            .context("Failed to determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }
}
