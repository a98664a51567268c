use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use crate::encoder::EncoderChoice;

/// Configuration for a batch conversion run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    /// Path to the ffmpeg binary
    pub ffmpeg_bin: PathBuf,
    /// Path to the ffprobe binary
    pub ffprobe_bin: PathBuf,
    /// Output frame width
    pub target_width: u32,
    /// Output frame height
    pub target_height: u32,
    /// Quality target passed to every encoder family (CQ / QP / global_quality / CRF)
    pub quality: u8,
    /// Encoders to try, in order. Software x264 is always the last resort.
    pub encoder_candidates: Vec<EncoderChoice>,
    /// Time allowed for each capability probe
    pub capability_probe_timeout_secs: u64,
    /// Longest time the encode loop waits for output before re-checking for cancellation
    pub poll_interval_ms: u64,
    /// Output directory name used when none is given, relative to the input directory
    pub output_subdir: String,
    /// Prefix for output file names
    pub output_prefix: String,
    /// Number of trailing encoder output lines kept for failure reports
    pub error_tail_lines: usize,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl ConvertConfig {
    /// Create a default configuration with sensible values
    pub fn default_config() -> Self {
        Self {
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            ffprobe_bin: PathBuf::from("ffprobe"),
            target_width: 1920,
            target_height: 1080,
            quality: 23,
            encoder_candidates: EncoderChoice::DEFAULT_CANDIDATES.to_vec(),
            capability_probe_timeout_secs: 5,
            poll_interval_ms: 100,
            output_subdir: "converted".to_string(),
            output_prefix: "converted_".to_string(),
            error_tail_lines: 10,
        }
    }

    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    config = toml::from_str(&content)
                        .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?;
                } else {
                    config = serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?;
                }
            }
        }

        anyhow::ensure!(
            config.target_width > 0 && config.target_height > 0,
            "Target resolution must be non-zero, got {}x{}",
            config.target_width,
            config.target_height
        );

        Ok(config)
    }

    pub fn capability_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.capability_probe_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        // A zero interval would turn the read loop into a busy spin
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Default output directory for an input directory
    pub fn default_output_dir(&self, input_dir: &Path) -> PathBuf {
        input_dir.join(&self.output_subdir)
    }
}
