use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use log::info;
use crate::config::ConvertConfig;
use crate::encoder::{self, EncoderChoice};
use crate::error::{ConvertError, Result};
use crate::ffprobe::{self, VideoInfo};
use crate::progress::ProgressUpdate;
use crate::supervisor::{self, CancelSignal, EncodeReport, SuperviseOptions};

/// The external media tools, as seen by the batch
#[allow(async_fn_in_trait)]
pub trait MediaEngine {
    /// Read dimensions and duration of `path`
    async fn probe(&self, path: &Path) -> Result<VideoInfo>;

    /// Capability probe: Ok only if a short synthetic encode with `encoder`
    /// succeeds within `timeout`
    async fn test_encoder(&self, encoder: EncoderChoice, timeout: Duration) -> Result<()>;

    /// Run an encode with the given ffmpeg arguments until it is reaped
    async fn encode(
        &self,
        args: &[String],
        total_duration: f64,
        cancel: &CancelSignal,
        on_progress: &mut (dyn FnMut(ProgressUpdate) + Send),
    ) -> Result<EncodeReport>;
}

/// Manager for the FFmpeg and FFprobe binaries
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
    options: SuperviseOptions,
}

impl FfmpegEngine {
    pub fn new(config: &ConvertConfig) -> Self {
        FfmpegEngine {
            ffmpeg_bin: config.ffmpeg_bin.clone(),
            ffprobe_bin: config.ffprobe_bin.clone(),
            options: SuperviseOptions {
                poll_interval: config.poll_interval(),
                tail_lines: config.error_tail_lines,
            },
        }
    }

    /// Make sure both tools run at all before any work starts
    pub async fn verify_tools(&self) -> Result<()> {
        for bin in [&self.ffmpeg_bin, &self.ffprobe_bin] {
            let version = Self::detect_version(bin).await?;
            info!("Found {}", version);
        }
        Ok(())
    }

    /// First line of `<bin> -version`
    async fn detect_version(bin: &Path) -> Result<String> {
        let output = Command::new(bin)
            .arg("-version")
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| ConvertError::from_spawn(bin.display().to_string(), e))?;

        if !output.status.success() {
            return Err(ConvertError::ToolMissing {
                tool: bin.display().to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("`-version` exited with code {:?}", output.status.code()),
                ),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

impl MediaEngine for FfmpegEngine {
    async fn probe(&self, path: &Path) -> Result<VideoInfo> {
        ffprobe::probe_file(&self.ffprobe_bin, path).await
    }

    async fn test_encoder(&self, encoder: EncoderChoice, timeout: Duration) -> Result<()> {
        encoder::run_capability_probe(&self.ffmpeg_bin, encoder, timeout).await
    }

    async fn encode(
        &self,
        args: &[String],
        total_duration: f64,
        cancel: &CancelSignal,
        on_progress: &mut (dyn FnMut(ProgressUpdate) + Send),
    ) -> Result<EncodeReport> {
        supervisor::run_encode(
            &self.ffmpeg_bin,
            args,
            total_duration,
            &self.options,
            cancel,
            on_progress,
        )
        .await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted engine for exercising the batch without ffmpeg installed.

    use super::*;
    use crate::supervisor::CancelHandle;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy)]
    pub enum EncodeScript {
        Exit(i32),
        Interrupt,
    }

    #[derive(Default)]
    pub struct ScriptedEngine {
        rejected: HashSet<EncoderChoice>,
        timed_out: HashSet<EncoderChoice>,
        videos: HashMap<String, VideoInfo>,
        encodes: HashMap<String, EncodeScript>,
        encoder_probes: Mutex<Vec<EncoderChoice>>,
        probes: Mutex<Vec<PathBuf>>,
        encode_calls: Mutex<Vec<Vec<String>>>,
        cancel_on_probe: Option<(EncoderChoice, CancelHandle)>,
    }

    fn file_name(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    impl ScriptedEngine {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reject_encoder(mut self, encoder: EncoderChoice) -> Self {
            self.rejected.insert(encoder);
            self
        }

        pub fn time_out_encoder(mut self, encoder: EncoderChoice) -> Self {
            self.timed_out.insert(encoder);
            self
        }

        /// Fire `handle` as soon as `encoder` has been probed
        pub fn cancel_on_probe(mut self, encoder: EncoderChoice, handle: CancelHandle) -> Self {
            self.cancel_on_probe = Some((encoder, handle));
            self
        }

        /// Files not registered here fail to probe
        pub fn with_video(mut self, name: &str, width: u32, height: u32, duration: f64) -> Self {
            self.videos.insert(name.to_string(), VideoInfo { width, height, duration });
            self
        }

        /// Encodes exit 0 unless scripted otherwise
        pub fn encode_result(mut self, name: &str, script: EncodeScript) -> Self {
            self.encodes.insert(name.to_string(), script);
            self
        }

        pub fn encoder_probes(&self) -> Vec<EncoderChoice> {
            self.encoder_probes.lock().unwrap().clone()
        }

        pub fn probed_files(&self) -> Vec<String> {
            self.probes.lock().unwrap().iter().map(|p| file_name(p)).collect()
        }

        /// Input file names of every encode, in call order
        pub fn encoded_files(&self) -> Vec<String> {
            self.encode_calls
                .lock()
                .unwrap()
                .iter()
                .filter_map(|args| {
                    args.windows(2)
                        .find(|w| w[0] == "-i")
                        .map(|w| file_name(Path::new(&w[1])))
                })
                .collect()
        }
    }

    impl MediaEngine for ScriptedEngine {
        async fn probe(&self, path: &Path) -> Result<VideoInfo> {
            self.probes.lock().unwrap().push(path.to_path_buf());
            self.videos
                .get(&file_name(path))
                .copied()
                .ok_or_else(|| ConvertError::ProbeParse {
                    path: path.to_path_buf(),
                    field: "width",
                })
        }

        async fn test_encoder(&self, encoder: EncoderChoice, timeout: Duration) -> Result<()> {
            self.encoder_probes.lock().unwrap().push(encoder);
            if let Some((trigger, handle)) = &self.cancel_on_probe {
                if *trigger == encoder {
                    handle.cancel();
                }
            }
            if self.timed_out.contains(&encoder) {
                return Err(ConvertError::EncoderProbeTimeout {
                    encoder: encoder.ffmpeg_name().to_string(),
                    timeout,
                });
            }
            if self.rejected.contains(&encoder) {
                return Err(ConvertError::EncoderProbeNonzero {
                    encoder: encoder.ffmpeg_name().to_string(),
                    code: Some(1),
                });
            }
            Ok(())
        }

        async fn encode(
            &self,
            args: &[String],
            total_duration: f64,
            _cancel: &CancelSignal,
            on_progress: &mut (dyn FnMut(ProgressUpdate) + Send),
        ) -> Result<EncodeReport> {
            self.encode_calls.lock().unwrap().push(args.to_vec());
            let input = args
                .windows(2)
                .find(|w| w[0] == "-i")
                .map(|w| file_name(Path::new(&w[1])))
                .unwrap_or_default();

            // ffmpeg creates the output as soon as it starts writing
            if let Some(output) = args.last() {
                let _ = std::fs::write(output, b"partial");
            }

            on_progress(ProgressUpdate {
                elapsed: total_duration / 2.0,
                percent: 50.0,
                fps: 30.0,
            });

            match self.encodes.get(&input).copied().unwrap_or(EncodeScript::Exit(0)) {
                EncodeScript::Interrupt => Err(ConvertError::Interrupted),
                EncodeScript::Exit(code) => Ok(EncodeReport {
                    exit_code: Some(code),
                    success: code == 0,
                    tail: if code == 0 {
                        Vec::new()
                    } else {
                        vec![format!("{}: Invalid data found when processing input", input)]
                    },
                }),
            }
        }
    }
}
