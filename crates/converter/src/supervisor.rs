//! Runs one encode process and follows its output until it is reaped.

use std::collections::VecDeque;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use log::{debug, warn};
use crate::error::{ConvertError, Result};
use crate::progress::{self, ProgressThrottle, ProgressUpdate};

/// Sending half of the user-interrupt signal
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

/// Receiving half of the user-interrupt signal; cheap to clone
#[derive(Debug, Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

/// Create a connected cancel handle and signal
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), CancelSignal(rx))
}

impl CancelHandle {
    pub fn cancel(&self) {
        // send_replace works even if every receiver is gone
        self.0.send_replace(true);
    }
}

impl CancelSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        cancel_pair().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

/// How an encode process ended
#[derive(Debug, Clone)]
pub struct EncodeReport {
    pub exit_code: Option<i32>,
    pub success: bool,
    /// Last lines of combined stdout/stderr, oldest first
    pub tail: Vec<String>,
}

/// Knobs for one supervised run
#[derive(Debug, Clone)]
pub struct SuperviseOptions {
    pub poll_interval: Duration,
    pub tail_lines: usize,
}

/// Splits a byte stream into lines on `\n` or `\r`
///
/// ffmpeg redraws its stats line with bare carriage returns, so `\r` has to
/// end a line too. Empty lines are dropped.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buf: Vec<u8>,
}

impl LineSplitter {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in chunk {
            if b == b'\n' || b == b'\r' {
                self.flush_into(&mut lines);
            } else {
                self.buf.push(b);
            }
        }
        lines
    }

    pub fn finish(&mut self) -> Option<String> {
        let mut lines = Vec::new();
        self.flush_into(&mut lines);
        lines.pop()
    }

    fn flush_into(&mut self, lines: &mut Vec<String>) {
        if !self.buf.is_empty() {
            let line = String::from_utf8_lossy(&self.buf).trim().to_string();
            self.buf.clear();
            if !line.is_empty() {
                lines.push(line);
            }
        }
    }
}

/// Forward lines from `reader` into `tx` until EOF or the receiver goes away
async fn pump_lines<R: AsyncRead + Unpin>(mut reader: R, tx: mpsc::Sender<String>) {
    let mut splitter = LineSplitter::default();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!("Stopped reading encoder output: {}", e);
                break;
            }
        };
        for line in splitter.push(&chunk[..n]) {
            if tx.send(line).await.is_err() {
                return;
            }
        }
    }
    if let Some(line) = splitter.finish() {
        let _ = tx.send(line).await;
    }
}

/// Parse and tail state for the output of one encode
struct OutputFollower<'a> {
    total_duration: f64,
    throttle: ProgressThrottle,
    tail: VecDeque<String>,
    tail_cap: usize,
    on_progress: &'a mut (dyn FnMut(ProgressUpdate) + Send),
}

impl OutputFollower<'_> {
    /// Every line goes through the progress parser before it joins the tail
    fn handle(&mut self, line: String) {
        if let Some(event) = progress::parse_line(&line, self.total_duration) {
            if let Some(update) = self.throttle.observe(event) {
                (self.on_progress)(update);
            }
        }
        if self.tail_cap == 0 {
            return;
        }
        if self.tail.len() == self.tail_cap {
            self.tail.pop_front();
        }
        self.tail.push_back(line);
    }
}

/// Lifecycle of one encode process
enum ExecState {
    Launching,
    Streaming {
        child: Child,
        lines: mpsc::Receiver<String>,
    },
    Reaped {
        status: ExitStatus,
    },
}

/// Run `program args`, feeding its output through the progress parser
///
/// `on_progress` receives throttled updates. Cancellation is checked at
/// least once per `poll_interval`; when it fires the child is killed and
/// reaped and `ConvertError::Interrupted` is returned. A non-zero exit is
/// reported through `EncodeReport::success`, not as an error.
pub async fn run_encode(
    program: &Path,
    args: &[String],
    total_duration: f64,
    options: &SuperviseOptions,
    cancel: &CancelSignal,
    on_progress: &mut (dyn FnMut(ProgressUpdate) + Send),
) -> Result<EncodeReport> {
    let mut follower = OutputFollower {
        total_duration,
        throttle: ProgressThrottle::new(),
        tail: VecDeque::with_capacity(options.tail_lines),
        tail_cap: options.tail_lines,
        on_progress,
    };
    let mut state = ExecState::Launching;

    loop {
        state = match state {
            ExecState::Launching => {
                debug!("Executing: {} {}", program.display(), args.join(" "));
                let mut child = Command::new(program)
                    .args(args)
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .kill_on_drop(true)
                    .spawn()
                    .map_err(|e| ConvertError::from_spawn(program.display().to_string(), e))?;

                let (tx, rx) = mpsc::channel(256);
                if let Some(stdout) = child.stdout.take() {
                    tokio::spawn(pump_lines(stdout, tx.clone()));
                }
                if let Some(stderr) = child.stderr.take() {
                    tokio::spawn(pump_lines(stderr, tx));
                }

                ExecState::Streaming { child, lines: rx }
            }
            ExecState::Streaming { mut child, mut lines } => {
                let status = loop {
                    if cancel.is_cancelled() {
                        warn!("Interrupt received, stopping encoder");
                        let _ = child.kill().await;
                        return Err(ConvertError::Interrupted);
                    }

                    match tokio::time::timeout(options.poll_interval, lines.recv()).await {
                        Ok(Some(line)) => follower.handle(line),
                        // Both pipes closed
                        Ok(None) => break child.wait().await?,
                        // Poll tick: output may stay quiet for a long time
                        Err(_) => {
                            if let Some(status) = child.try_wait()? {
                                // Exited, but keep draining whatever the pipes still hold
                                while let Ok(Some(line)) =
                                    tokio::time::timeout(options.poll_interval, lines.recv()).await
                                {
                                    follower.handle(line);
                                }
                                break status;
                            }
                        }
                    }
                };
                ExecState::Reaped { status }
            }
            ExecState::Reaped { status } => {
                return Ok(EncodeReport {
                    exit_code: status.code(),
                    success: status.success(),
                    tail: follower.tail.into_iter().collect(),
                });
            }
        };
    }
}
