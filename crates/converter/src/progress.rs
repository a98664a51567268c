//! Turns ffmpeg output lines into progress events.
//!
//! Two sources are understood. The `-progress` key=value stream gives
//! `out_time_us=<micros>` and `fps=<rate>` on separate lines. The human
//! readable stats line (`frame= 120 fps= 48 ... time=00:00:05.00 ...`)
//! carries both a timestamp and a frame rate and is used as a fallback.

/// One fact derived from a single line of encoder output
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressEvent {
    /// Position in the output. `percent` is `None` when the total duration is unknown.
    /// `fps` is only present when the line also carried a frame rate (stats line).
    Time {
        elapsed: f64,
        percent: Option<f64>,
        fps: Option<f64>,
    },
    /// Instantaneous encoding speed in frames per second
    Rate { fps: f64 },
}

/// Progress worth showing to the user
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressUpdate {
    pub elapsed: f64,
    pub percent: f64,
    pub fps: f64,
}

/// Parse one line of encoder output
///
/// Never fails: anything that does not parse cleanly yields `None`.
pub fn parse_line(line: &str, total_duration: f64) -> Option<ProgressEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some((key, value)) = line.split_once('=') {
        match key {
            "out_time_us" => {
                let micros = value.trim().parse::<i64>().ok()?;
                let elapsed = micros.max(0) as f64 / 1_000_000.0;
                return Some(ProgressEvent::Time {
                    elapsed,
                    percent: percent_of(elapsed, total_duration),
                    fps: None,
                });
            }
            "fps" => {
                let fps = value.trim().trim_end_matches("fps").trim().parse::<f64>().ok()?;
                return fps.is_finite().then_some(ProgressEvent::Rate { fps });
            }
            _ => {}
        }
    }

    parse_stats_line(line, total_duration)
}

/// `elapsed / total * 100`, or `None` when the total is not positive
pub fn percent_of(elapsed: f64, total_duration: f64) -> Option<f64> {
    if total_duration > 0.0 && total_duration.is_finite() {
        Some(elapsed / total_duration * 100.0)
    } else {
        None
    }
}

fn parse_stats_line(line: &str, total_duration: f64) -> Option<ProgressEvent> {
    if !line.contains("time=") {
        return None;
    }

    // "fps= 48" and "fps=48" both appear depending on padding
    let spaced = line.replace('=', "= ");
    let parts: Vec<&str> = spaced.split_whitespace().collect();

    let mut elapsed = None;
    let mut fps = None;
    for (i, part) in parts.iter().enumerate() {
        let value = parts.get(i + 1).copied();
        match *part {
            "time=" => elapsed = value.and_then(parse_timestamp),
            "fps=" => fps = value.and_then(|v| v.parse::<f64>().ok()).filter(|f| f.is_finite()),
            _ => {}
        }
    }

    let elapsed = elapsed?;
    Some(ProgressEvent::Time {
        elapsed,
        percent: percent_of(elapsed, total_duration),
        fps,
    })
}

/// Parse `HH:MM:SS.ff` into seconds
pub fn parse_timestamp(s: &str) -> Option<f64> {
    let mut parts = s.split(':');
    let hours = parts.next()?.parse::<u64>().ok()?;
    let minutes = parts.next()?.parse::<u64>().ok()?;
    let seconds = parts.next()?.parse::<f64>().ok()?;
    if parts.next().is_some() || !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds)
}

/// Per-job state that decides which events reach the user
///
/// A percentage is surfaced only after it moves more than one point past the
/// last surfaced value. Frame rates are remembered and attached to the next
/// surfaced percentage.
#[derive(Debug, Clone, Default)]
pub struct ProgressThrottle {
    last_percent: f64,
    current_fps: f64,
}

impl ProgressThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, event: ProgressEvent) -> Option<ProgressUpdate> {
        match event {
            ProgressEvent::Rate { fps } => {
                self.current_fps = fps;
                None
            }
            ProgressEvent::Time { elapsed, percent, fps } => {
                if let Some(fps) = fps {
                    self.current_fps = fps;
                }
                let percent = percent?;
                if percent > self.last_percent + 1.0 {
                    self.last_percent = percent;
                    Some(ProgressUpdate {
                        elapsed,
                        percent,
                        fps: self.current_fps,
                    })
                } else {
                    None
                }
            }
        }
    }
}
