use std::path::Path;
use serde::Deserialize;
use tokio::process::Command;
use log::debug;
use crate::error::{ConvertError, Result};

/// Complete ffprobe output structure (only the parts we read)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FFProbeData {
    #[serde(default)]
    pub streams: Vec<FFProbeStream>,
    pub format: Option<FFProbeFormat>,
}

/// Format-level metadata from ffprobe
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FFProbeFormat {
    pub duration: Option<String>,
}

/// Stream-level metadata from ffprobe
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FFProbeStream {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration: Option<String>,
}

/// Dimensions and length of one input file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    /// Seconds; 0.0 when ffprobe did not report a usable duration
    pub duration: f64,
}

impl VideoInfo {
    pub fn matches_resolution(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }
}

impl FFProbeData {
    /// First stream that carries real picture dimensions
    pub fn picture_stream(&self) -> Option<&FFProbeStream> {
        self.streams
            .iter()
            .find(|s| s.width.unwrap_or(0) > 0 && s.height.unwrap_or(0) > 0)
    }

    /// Extract width, height and duration for `path`
    ///
    /// Duration prefers the container value and falls back to the picture
    /// stream. A missing or unparsable duration becomes 0.0 rather than an error.
    pub fn video_info(&self, path: &Path) -> Result<VideoInfo> {
        let stream = match self.picture_stream() {
            Some(s) => s,
            None => {
                let has_width = self.streams.iter().any(|s| s.width.unwrap_or(0) > 0);
                return Err(ConvertError::ProbeParse {
                    path: path.to_path_buf(),
                    field: if has_width { "height" } else { "width" },
                });
            }
        };

        let duration = self
            .format
            .as_ref()
            .and_then(|f| parse_duration(f.duration.as_deref()))
            .or_else(|| parse_duration(stream.duration.as_deref()))
            .unwrap_or(0.0);

        Ok(VideoInfo {
            width: stream.width.unwrap_or(0),
            height: stream.height.unwrap_or(0),
            duration,
        })
    }
}

fn parse_duration(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
}

/// Parse raw ffprobe JSON into a `VideoInfo`
pub fn parse_video_info(json: &str, path: &Path) -> Result<VideoInfo> {
    let data: FFProbeData = serde_json::from_str(json).map_err(|e| ConvertError::ProbeFailed {
        path: path.to_path_buf(),
        reason: format!("invalid JSON: {}", e),
    })?;
    data.video_info(path)
}

/// Run ffprobe against `file_path` and extract its `VideoInfo`
pub async fn probe_file(ffprobe_bin: &Path, file_path: &Path) -> Result<VideoInfo> {
    debug!("Executing FFprobe for: {}", file_path.display());

    let output = Command::new(ffprobe_bin)
        .arg("-v")
        .arg("quiet")
        .arg("-print_format")
        .arg("json")
        .arg("-show_format")
        .arg("-show_streams")
        .arg(file_path)
        .stdin(std::process::Stdio::null())
        .output()
        .await
        .map_err(|e| ConvertError::from_spawn(ffprobe_bin.display().to_string(), e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ConvertError::ProbeFailed {
            path: file_path.to_path_buf(),
            reason: format!(
                "exit code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ),
        });
    }

    let json_str = String::from_utf8_lossy(&output.stdout);
    parse_video_info(&json_str, file_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "video", "codec_name": "h264",
             "width": 1280, "height": 720, "duration": "9.960000"},
            {"index": 1, "codec_type": "audio", "codec_name": "aac", "duration": "10.005333"}
        ],
        "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "10.005333"}
    }"#;

    #[test]
    fn test_extracts_dimensions_and_container_duration() {
        let info = parse_video_info(SAMPLE, Path::new("a.mp4")).unwrap();
        assert_eq!(info.width, 1280);
        assert_eq!(info.height, 720);
        assert!((info.duration - 10.005333).abs() < 1e-9);
    }

    #[test]
    fn test_audio_first_still_finds_video_stream() {
        let json = r#"{"streams": [
            {"codec_type": "audio"},
            {"codec_type": "video", "width": 640, "height": 480, "duration": "3.5"}
        ]}"#;
        let info = parse_video_info(json, Path::new("b.mp4")).unwrap();
        assert_eq!((info.width, info.height), (640, 480));
        // No format block: falls back to the stream duration
        assert_eq!(info.duration, 3.5);
    }

    #[test]
    fn test_missing_duration_defaults_to_zero() {
        let json = r#"{"streams": [{"width": 1920, "height": 1080}], "format": {}}"#;
        let info = parse_video_info(json, Path::new("c.mp4")).unwrap();
        assert_eq!(info.duration, 0.0);
    }

    #[test]
    fn test_garbage_duration_defaults_to_zero() {
        let json = r#"{"streams": [{"width": 1920, "height": 1080, "duration": "N/A"}],
                       "format": {"duration": "N/A"}}"#;
        let info = parse_video_info(json, Path::new("c.mp4")).unwrap();
        assert_eq!(info.duration, 0.0);
    }

    #[test]
    fn test_missing_width_is_probe_parse_error() {
        let json = r#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "1.0"}}"#;
        let err = parse_video_info(json, Path::new("d.mp4")).unwrap_err();
        assert!(matches!(err, ConvertError::ProbeParse { field: "width", .. }));
    }

    #[test]
    fn test_missing_height_is_probe_parse_error() {
        let json = r#"{"streams": [{"width": 1920}]}"#;
        let err = parse_video_info(json, Path::new("d.mp4")).unwrap_err();
        assert!(matches!(err, ConvertError::ProbeParse { field: "height", .. }));
    }

    #[test]
    fn test_empty_object_is_probe_parse_error() {
        // What `ffprobe -v quiet` prints for unreadable input
        let err = parse_video_info("{}", Path::new("e.mp4")).unwrap_err();
        assert!(matches!(err, ConvertError::ProbeParse { .. }));
    }

    #[test]
    fn test_invalid_json_is_probe_failure() {
        let err = parse_video_info("not json", Path::new("f.mp4")).unwrap_err();
        assert!(matches!(err, ConvertError::ProbeFailed { .. }));
    }

    #[test]
    fn test_matches_resolution() {
        let info = VideoInfo { width: 1920, height: 1080, duration: 5.0 };
        assert!(info.matches_resolution(1920, 1080));
        assert!(!info.matches_resolution(1080, 1920));
    }

    #[tokio::test]
    async fn test_missing_ffprobe_binary_is_tool_missing() {
        let err = probe_file(Path::new("/nonexistent/ffprobe-xyz"), Path::new("a.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::ToolMissing { .. }));
    }

    /// Executable stand-in for ffprobe that runs `body`
    #[cfg(unix)]
    fn fake_ffprobe(dir: &Path, body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("ffprobe");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_file_nonzero_exit_is_probe_failed() {
        let dir = tempfile::tempdir().unwrap();
        let ffprobe = fake_ffprobe(dir.path(), "echo 'moov atom not found' >&2; exit 1");

        let err = probe_file(&ffprobe, Path::new("broken.mp4")).await.unwrap_err();

        match err {
            ConvertError::ProbeFailed { path, reason } => {
                assert_eq!(path, Path::new("broken.mp4"));
                assert!(reason.contains("exit code 1"));
                assert!(reason.contains("moov atom not found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_file_reads_json_from_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let json = r#"{"streams": [{"width": 1280, "height": 720}], "format": {"duration": "4.0"}}"#;
        let ffprobe = fake_ffprobe(dir.path(), &format!("echo '{}'", json));

        let info = probe_file(&ffprobe, Path::new("a.mp4")).await.unwrap();

        assert_eq!(info, VideoInfo { width: 1280, height: 720, duration: 4.0 });
    }
}
