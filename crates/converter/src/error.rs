use std::path::PathBuf;
use std::time::Duration;

/// Result alias for converter operations
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Everything that can go wrong while converting a batch
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// An external executable could not be spawned
    #[error("{tool} not found or not executable: {source}")]
    ToolMissing {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// ffprobe ran but failed, or produced output we could not read
    #[error("ffprobe failed for {}: {reason}", path.display())]
    ProbeFailed { path: PathBuf, reason: String },

    /// ffprobe output did not contain a required field
    #[error("ffprobe output for {} has no {field}", path.display())]
    ProbeParse { path: PathBuf, field: &'static str },

    /// Capability probe did not finish inside its time window
    #[error("encoder {encoder} did not finish its test encode within {timeout:?}")]
    EncoderProbeTimeout { encoder: String, timeout: Duration },

    /// Capability probe exited unsuccessfully
    #[error("encoder {encoder} test encode exited with code {code:?}")]
    EncoderProbeNonzero { encoder: String, code: Option<i32> },

    /// The encode process exited unsuccessfully
    #[error("ffmpeg exited with code {code:?}")]
    EncodeNonzeroExit { code: Option<i32>, tail: Vec<String> },

    /// The user asked us to stop
    #[error("interrupted by user")]
    Interrupted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    /// Map a spawn error: `NotFound`/`PermissionDenied` mean the tool is missing
    pub fn from_spawn(tool: impl Into<String>, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                ConvertError::ToolMissing {
                    tool: tool.into(),
                    source: err,
                }
            }
            _ => ConvertError::Io(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_spawn_not_found_is_tool_missing() {
        let err = ConvertError::from_spawn("ffmpeg", io::Error::new(io::ErrorKind::NotFound, "nope"));
        assert!(matches!(err, ConvertError::ToolMissing { ref tool, .. } if tool == "ffmpeg"));
    }

    #[test]
    fn test_other_spawn_errors_stay_io() {
        let err = ConvertError::from_spawn("ffmpeg", io::Error::new(io::ErrorKind::Other, "boom"));
        assert!(matches!(err, ConvertError::Io(_)));
    }

    #[test]
    fn test_probe_parse_message_names_field() {
        let err = ConvertError::ProbeParse {
            path: PathBuf::from("/videos/a.mp4"),
            field: "width",
        };
        assert_eq!(err.to_string(), "ffprobe output for /videos/a.mp4 has no width");
    }

    #[test]
    fn test_probe_timeout_message_keeps_sub_second_precision() {
        let err = ConvertError::EncoderProbeTimeout {
            encoder: "h264_nvenc".to_string(),
            timeout: Duration::from_millis(300),
        };
        assert_eq!(
            err.to_string(),
            "encoder h264_nvenc did not finish its test encode within 300ms"
        );
    }
}
