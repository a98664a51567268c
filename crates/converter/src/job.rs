use std::fmt;
use std::path::PathBuf;
use chrono::{DateTime, Utc};
use crate::encoder::EncoderChoice;
use crate::ffprobe::VideoInfo;

/// Why a job never reached the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// Something already exists at the output path
    OutputExists,
    /// Source already has the target resolution
    AlreadyTargetResolution,
    /// Metadata could not be read
    ProbeFailed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::OutputExists => "output already exists",
            SkipReason::AlreadyTargetResolution => "already at target resolution",
            SkipReason::ProbeFailed => "could not read video information",
        };
        f.write_str(text)
    }
}

/// Where a job is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped(SkipReason),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed | JobStatus::Skipped(_))
    }

    /// Allowed moves: Pending -> Running | Skipped, Running -> Succeeded | Failed
    pub fn can_advance_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Skipped(_))
                | (JobStatus::Running, JobStatus::Succeeded)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

/// Rejected status change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal job transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// One input file's path through probe, convert and result
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub info: Option<VideoInfo>,
    pub encoder: Option<EncoderChoice>,
    status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Short diagnostic for skips and failures
    pub reason: Option<String>,
    pub exit_code: Option<i32>,
    /// Trailing encoder output kept for failed jobs
    pub output_tail: Vec<String>,
}

impl ConversionJob {
    pub fn new(input: PathBuf, output: PathBuf) -> Self {
        ConversionJob {
            input,
            output,
            info: None,
            encoder: None,
            status: JobStatus::Pending,
            started_at: None,
            finished_at: None,
            reason: None,
            exit_code: None,
            output_tail: Vec::new(),
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Move to `next`, stamping start and finish times
    pub fn advance(&mut self, next: JobStatus) -> Result<(), IllegalTransition> {
        if !self.status.can_advance_to(next) {
            return Err(IllegalTransition {
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        if next == JobStatus::Running {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        self.status = next;
        Ok(())
    }

    pub fn file_name(&self) -> String {
        self.input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.input.display().to_string())
    }

    /// Wall time spent encoding, once finished
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> ConversionJob {
        ConversionJob::new(PathBuf::from("/v/a.mp4"), PathBuf::from("/v/converted/converted_a.mp4"))
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut j = job();
        assert_eq!(j.status(), JobStatus::Pending);
        j.advance(JobStatus::Running).unwrap();
        assert!(j.started_at.is_some());
        j.advance(JobStatus::Succeeded).unwrap();
        assert!(j.finished_at.is_some());
        assert!(j.elapsed().is_some());
    }

    #[test]
    fn test_skip_from_pending() {
        let mut j = job();
        j.advance(JobStatus::Skipped(SkipReason::OutputExists)).unwrap();
        assert!(j.status().is_terminal());
        assert!(j.started_at.is_none());
        assert!(j.elapsed().is_none());
    }

    #[test]
    fn test_statuses_are_never_revisited() {
        let mut j = job();
        j.advance(JobStatus::Running).unwrap();
        assert!(j.advance(JobStatus::Pending).is_err());
        assert!(j.advance(JobStatus::Running).is_err());
        assert!(j.advance(JobStatus::Skipped(SkipReason::ProbeFailed)).is_err());
        j.advance(JobStatus::Failed).unwrap();
        assert!(j.advance(JobStatus::Succeeded).is_err());
        assert_eq!(j.status(), JobStatus::Failed);
    }

    #[test]
    fn test_cannot_finish_without_running() {
        let mut j = job();
        let err = j.advance(JobStatus::Succeeded).unwrap_err();
        assert_eq!(err.from, JobStatus::Pending);
    }

    #[test]
    fn test_file_name() {
        assert_eq!(job().file_name(), "a.mp4");
    }
}
