use std::collections::HashSet;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use log::{debug, info, warn};
use crate::engine::MediaEngine;
use crate::error::{ConvertError, Result};
use crate::supervisor::CancelSignal;

/// H.264 encoder backends in the order we prefer them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncoderChoice {
    #[serde(rename = "h264_nvenc")]
    Nvenc,
    #[serde(rename = "h264_amf")]
    Amf,
    #[serde(rename = "h264_qsv")]
    QuickSync,
    #[serde(rename = "libx264")]
    Software,
}

impl EncoderChoice {
    /// Hardware backends first, software last
    pub const DEFAULT_CANDIDATES: [EncoderChoice; 4] = [
        EncoderChoice::Nvenc,
        EncoderChoice::Amf,
        EncoderChoice::QuickSync,
        EncoderChoice::Software,
    ];

    /// Get the FFmpeg encoder name for this encoder
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            EncoderChoice::Nvenc => "h264_nvenc",
            EncoderChoice::Amf => "h264_amf",
            EncoderChoice::QuickSync => "h264_qsv",
            EncoderChoice::Software => "libx264",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EncoderChoice::Nvenc => "NVIDIA NVENC",
            EncoderChoice::Amf => "AMD AMF",
            EncoderChoice::QuickSync => "Intel QuickSync",
            EncoderChoice::Software => "CPU (libx264)",
        }
    }
}

impl std::fmt::Display for EncoderChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.label(), self.ffmpeg_name())
    }
}

/// Arguments for a one second 320x240 synthetic encode with `encoder`
pub fn capability_probe_args(encoder: EncoderChoice) -> Vec<String> {
    [
        "-hide_banner",
        "-f",
        "lavfi",
        "-i",
        "testsrc=duration=1:size=320x240:rate=1",
        "-c:v",
        encoder.ffmpeg_name(),
        "-f",
        "null",
        "-",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Run the capability probe for `encoder` with ffmpeg
///
/// Accepted only if ffmpeg exits 0 within `timeout`. A probe that runs over
/// is killed and reaped before returning.
pub async fn run_capability_probe(
    ffmpeg_bin: &Path,
    encoder: EncoderChoice,
    timeout: Duration,
) -> Result<()> {
    let mut child = Command::new(ffmpeg_bin)
        .args(capability_probe_args(encoder))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ConvertError::from_spawn(ffmpeg_bin.display().to_string(), e))?;

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => {
            let status = status?;
            if status.success() {
                Ok(())
            } else {
                Err(ConvertError::EncoderProbeNonzero {
                    encoder: encoder.ffmpeg_name().to_string(),
                    code: status.code(),
                })
            }
        }
        Err(_) => {
            // Ignore kill errors: the process may have exited in the meantime
            let _ = child.kill().await;
            Err(ConvertError::EncoderProbeTimeout {
                encoder: encoder.ffmpeg_name().to_string(),
                timeout,
            })
        }
    }
}

/// Pick the first candidate whose capability probe succeeds
///
/// Each candidate is probed at most once, even if listed twice, and probing
/// stops at the first success. When every candidate is rejected the software
/// encoder is returned anyway, so this never fails. Once `cancel` fires no
/// further candidates are spawned and the software encoder is returned.
pub async fn select_encoder<E: MediaEngine>(
    engine: &E,
    candidates: &[EncoderChoice],
    timeout: Duration,
    cancel: &CancelSignal,
) -> EncoderChoice {
    let mut tried = HashSet::new();
    for &candidate in candidates {
        if cancel.is_cancelled() {
            warn!("Interrupt received, skipping remaining encoder probes");
            return EncoderChoice::Software;
        }
        if !tried.insert(candidate) {
            continue;
        }
        debug!("Probing encoder {}", candidate);
        match engine.test_encoder(candidate, timeout).await {
            Ok(()) => {
                info!("✅ Using encoder: {}", candidate);
                return candidate;
            }
            Err(e) => {
                debug!("Rejected encoder {}: {}", candidate, e);
            }
        }
    }

    warn!("⚠️  No GPU encoder found, using {}", EncoderChoice::Software);
    EncoderChoice::Software
}
