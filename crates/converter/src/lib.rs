pub mod config;
pub mod error;
pub mod ffprobe;
pub mod encoder;
pub mod command;
pub mod progress;
pub mod supervisor;
pub mod engine;
pub mod scan;
pub mod job;
pub mod batch;

pub use config::ConvertConfig;
pub use error::{ConvertError, Result};
pub use ffprobe::VideoInfo;
pub use encoder::{select_encoder, EncoderChoice};
pub use command::CommandBuilder;
pub use progress::{ProgressEvent, ProgressUpdate};
pub use supervisor::{cancel_pair, CancelHandle, CancelSignal};
pub use engine::{FfmpegEngine, MediaEngine};
pub use job::{ConversionJob, JobStatus, SkipReason};
pub use batch::{BatchEvent, BatchOrchestrator, BatchSummary};
