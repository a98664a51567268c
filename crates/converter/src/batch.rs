//! Sequential batch conversion with per-file failure isolation.

use std::path::{Path, PathBuf};
use log::{debug, error, info, warn};
use crate::command::CommandBuilder;
use crate::config::ConvertConfig;
use crate::encoder::EncoderChoice;
use crate::engine::MediaEngine;
use crate::error::{ConvertError, Result};
use crate::job::{ConversionJob, JobStatus, SkipReason};
use crate::progress::ProgressUpdate;
use crate::scan;
use crate::supervisor::CancelSignal;

/// Whether the batch loop should move on after a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Halt,
}

/// What the batch reports to its caller while it runs
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BatchEvent<'a> {
    /// A throttled progress update for the file being encoded
    Progress { file: &'a str, update: ProgressUpdate },
    /// The encoder for `file` has been reaped; its outcome is logged next
    EncodeFinished { file: &'a str },
}

/// Outcome of a whole batch
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub encoder: EncoderChoice,
    pub jobs: Vec<ConversionJob>,
    /// The user stopped the run; jobs after the interrupted one are still pending
    pub interrupted: bool,
}

impl BatchSummary {
    fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status() == status).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(JobStatus::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(JobStatus::Failed)
    }

    pub fn skipped(&self, reason: SkipReason) -> usize {
        self.count(JobStatus::Skipped(reason))
    }

    pub fn unprocessed(&self) -> usize {
        self.count(JobStatus::Pending)
    }

    /// Log the final tally
    pub fn log(&self) {
        info!("{}", "=".repeat(50));
        if self.interrupted {
            warn!("⚠️  Batch interrupted by user");
        }
        info!("🎛️  Encoder: {}", self.encoder);
        info!(
            "🎬 {} file(s): {} converted, {} failed, {} skipped (output exists), {} skipped (already at target), {} skipped (probe failed), {} not processed",
            self.jobs.len(),
            self.succeeded(),
            self.failed(),
            self.skipped(SkipReason::OutputExists),
            self.skipped(SkipReason::AlreadyTargetResolution),
            self.skipped(SkipReason::ProbeFailed),
            self.unprocessed(),
        );
        for job in self.jobs.iter().filter(|j| j.status() == JobStatus::Failed) {
            error!(
                "   ❌ {}: {}",
                job.file_name(),
                job.reason.as_deref().unwrap_or("unknown error")
            );
        }
    }
}

/// Drives discovery, probing, encoding and classification for one run
pub struct BatchOrchestrator<'a, E: MediaEngine> {
    engine: &'a E,
    config: &'a ConvertConfig,
    builder: CommandBuilder,
    output_dir: PathBuf,
    cancel: CancelSignal,
}

impl<'a, E: MediaEngine> BatchOrchestrator<'a, E> {
    pub fn new(
        engine: &'a E,
        config: &'a ConvertConfig,
        output_dir: PathBuf,
        cancel: CancelSignal,
    ) -> Self {
        BatchOrchestrator {
            engine,
            config,
            builder: CommandBuilder::new(config.target_width, config.target_height, config.quality),
            output_dir,
            cancel,
        }
    }

    /// Find inputs in `input_dir` and turn them into pending jobs
    pub fn discover(&self, input_dir: &Path, fold_case: bool) -> Result<Vec<ConversionJob>> {
        let inputs = scan::discover_inputs(input_dir, fold_case)?;
        Ok(self.plan(inputs))
    }

    /// Pending jobs for already-discovered inputs
    pub fn plan(&self, inputs: Vec<PathBuf>) -> Vec<ConversionJob> {
        inputs
            .into_iter()
            .filter_map(|input| {
                let output =
                    scan::output_path_for(&input, &self.output_dir, &self.config.output_prefix)?;
                Some(ConversionJob::new(input, output))
            })
            .collect()
    }

    /// Process every job in order, one at a time
    ///
    /// Individual failures never stop the loop; only a user interrupt does.
    /// `on_event` sees every throttled progress update and the end of each
    /// encode.
    pub async fn run(
        &self,
        mut jobs: Vec<ConversionJob>,
        encoder: EncoderChoice,
        on_event: &mut (dyn FnMut(BatchEvent<'_>) + Send),
    ) -> BatchSummary {
        let total = jobs.len();
        info!("Found {} MP4 file(s)", total);
        info!("Output directory: {}", self.output_dir.display());
        info!("{}", "-".repeat(50));

        let mut interrupted = false;
        for (i, job) in jobs.iter_mut().enumerate() {
            if self.cancel.is_cancelled() {
                interrupted = true;
                break;
            }

            info!("[{}/{}] Processing: {}", i + 1, total, job.file_name());
            if self.process(job, encoder, on_event).await == Flow::Halt {
                interrupted = true;
                break;
            }
        }

        BatchSummary {
            encoder,
            jobs,
            interrupted,
        }
    }

    async fn process(
        &self,
        job: &mut ConversionJob,
        encoder: EncoderChoice,
        on_event: &mut (dyn FnMut(BatchEvent<'_>) + Send),
    ) -> Flow {
        if job.output.exists() {
            warn!("❌ Output file already exists: {}", job.output.display());
            skip(job, SkipReason::OutputExists, None);
            return Flow::Continue;
        }

        let info = match self.engine.probe(&job.input).await {
            Ok(info) => info,
            Err(e) => {
                warn!("❌ Could not get video information for {}: {}", job.file_name(), e);
                skip(job, SkipReason::ProbeFailed, Some(e.to_string()));
                return Flow::Continue;
            }
        };
        job.info = Some(info);

        info!("📹 Original resolution: {}x{}", info.width, info.height);
        info!("⏱️  Duration: {:.1} seconds", info.duration);

        if info.matches_resolution(self.config.target_width, self.config.target_height) {
            info!("✅ Video already has correct resolution, skipping");
            skip(job, SkipReason::AlreadyTargetResolution, None);
            return Flow::Continue;
        }

        let args = self.builder.build_encode_command(
            &job.input,
            &job.output,
            info.width,
            info.height,
            encoder,
        );

        job.encoder = Some(encoder);
        transition(job, JobStatus::Running);
        info!("🔄 Starting conversion with {}...", encoder);

        let name = job.file_name();
        let mut forward =
            |update: ProgressUpdate| on_event(BatchEvent::Progress { file: &name, update });
        let result = self
            .engine
            .encode(&args, info.duration, &self.cancel, &mut forward)
            .await;
        on_event(BatchEvent::EncodeFinished { file: &name });

        match result {
            Ok(report) if report.success => {
                transition(job, JobStatus::Succeeded);
                job.exit_code = report.exit_code;
                let took = job
                    .elapsed()
                    .map(|d| format!(" in {:.1}s", d.num_milliseconds() as f64 / 1000.0))
                    .unwrap_or_default();
                info!(
                    "✅ Completed: {} -> {}{}",
                    job.file_name(),
                    job.output.display(),
                    took
                );
                Flow::Continue
            }
            Ok(report) => {
                let err = ConvertError::EncodeNonzeroExit {
                    code: report.exit_code,
                    tail: report.tail.clone(),
                };
                error!("❌ Error converting {}: {}", job.file_name(), err);
                if !report.tail.is_empty() {
                    error!("Last output:");
                    for line in &report.tail {
                        error!("   {}", line);
                    }
                }
                job.reason = Some(err.to_string());
                job.exit_code = report.exit_code;
                job.output_tail = report.tail;
                transition(job, JobStatus::Failed);
                self.discard_partial_output(job).await;
                Flow::Continue
            }
            Err(ConvertError::Interrupted) => {
                warn!("⚠️  Conversion interrupted by user: {}", job.file_name());
                job.reason = Some(ConvertError::Interrupted.to_string());
                transition(job, JobStatus::Failed);
                self.discard_partial_output(job).await;
                Flow::Halt
            }
            Err(e) => {
                error!("❌ Unexpected error with {}: {}", job.file_name(), e);
                job.reason = Some(e.to_string());
                transition(job, JobStatus::Failed);
                self.discard_partial_output(job).await;
                Flow::Continue
            }
        }
    }

    /// A half-written output would make the next run skip this file
    async fn discard_partial_output(&self, job: &ConversionJob) {
        match tokio::fs::remove_file(&job.output).await {
            Ok(()) => debug!("Removed partial output {}", job.output.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove partial output {}: {}", job.output.display(), e),
        }
    }
}

fn transition(job: &mut ConversionJob, next: JobStatus) {
    if let Err(e) = job.advance(next) {
        error!("{}: {}", job.file_name(), e);
    }
}

fn skip(job: &mut ConversionJob, reason: SkipReason, detail: Option<String>) {
    job.reason = Some(detail.unwrap_or_else(|| reason.to_string()));
    transition(job, JobStatus::Skipped(reason));
}
