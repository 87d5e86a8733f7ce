//! Overlapped-read line/word/byte counting.
//!
//! A fixed arena of `queue_depth` buffers of `block_size` bytes services any
//! number of inputs. The [`Engine`] keeps up to `queue_depth` reads
//! outstanding across all inputs, resubmits the remainder of short reads
//! into the same buffer, and hands each input's chunks to the counter in
//! offset order no matter how completions arrive.

mod arena;
mod engine;
mod job;
mod queue;
mod report;
#[cfg(target_os = "linux")]
mod uring;


use std::io;

use thiserror::Error;
use tracing::{debug, warn};

use crate::common::io::Input;

pub use self::arena::{BufferArena, Slot};
pub use self::engine::{Engine, EngineStats};
pub use self::job::{Job, JobId, JobRegistry, JobSpec, Size};
pub use self::queue::{BlockingQueue, Completion, QueueFull, ReadOp, ReadQueue, Source};
pub use self::report::{JobReport, Report, ShowFlags, TotalMode, write_report};
#[cfg(target_os = "linux")]
pub use self::uring::UringQueue;

/// Default number of reads kept in flight.
pub const DEFAULT_QUEUE_DEPTH: u32 = 16;
/// Default bytes per read.
pub const DEFAULT_BLOCK_SIZE: usize = 16 * 1024;
/// Largest accepted queue depth.
pub const MAX_QUEUE_DEPTH: u32 = 4096;
/// Largest accepted block size; a completion reports its length as an `i32`.
pub const MAX_BLOCK_SIZE: usize = 1 << 30;

/// How the end of an unknown-size stream is recognised.
///
/// `ShortRead` is not the default: a pipe returns whatever is buffered, so
/// treating the first short read as the end would drop the rest of the input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum StreamEof {
    /// A zero-byte read ends the stream; shorter reads are counted and
    /// reading continues. Right for pipes, which deliver what they have.
    #[default]
    EmptyRead,
    /// The first read that delivers less than requested ends the stream.
    ShortRead,
}

/// Fixed for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AioConfig {
    pub queue_depth: u32,
    pub block_size: usize,
    pub stream_eof: StreamEof,
}

impl Default for AioConfig {
    fn default() -> Self {
        Self {
            queue_depth: DEFAULT_QUEUE_DEPTH,
            block_size: DEFAULT_BLOCK_SIZE,
            stream_eof: StreamEof::default(),
        }
    }
}

impl AioConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_depth == 0 || self.queue_depth > MAX_QUEUE_DEPTH {
            return Err(ConfigError::QueueDepth(self.queue_depth));
        }
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(ConfigError::BlockSize(self.block_size));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid queue depth {0} (must be 1..={max})", max = MAX_QUEUE_DEPTH)]
    QueueDepth(u32),
    #[error("invalid block size {0} (must be 1..={max})", max = MAX_BLOCK_SIZE)]
    BlockSize(usize),
}

/// Fatal conditions. Short reads and a full submission queue are handled
/// inside the engine and never show up here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Submitting or waiting on the queue itself failed.
    #[error("read queue: {0}")]
    Io(#[from] io::Error),
    /// A read completed with an error.
    #[error("{}: read error at offset {offset}: {source}", display_label(.label))]
    Read {
        job: JobId,
        label: Option<String>,
        offset: u64,
        source: io::Error,
    },
    /// A regular file ended before its recorded size.
    #[error("{}: unexpected end of file at offset {offset}", display_label(.label))]
    UnexpectedEof {
        job: JobId,
        label: Option<String>,
        offset: u64,
    },
    /// Jobs remain but nothing could be submitted.
    #[error("no reads in flight and none could be submitted")]
    Stalled,
}

fn display_label(label: &Option<String>) -> &str {
    label.as_deref().unwrap_or("standard input")
}

/// Which [`ReadQueue`] implementation [`count_inputs`] uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// io_uring when the kernel allows it, blocking reads otherwise.
    #[default]
    Auto,
    /// io_uring only; fail if it cannot be set up.
    Uring,
    /// Synchronous positioned reads.
    Blocking,
}

/// Count every input with the requested backend.
pub fn count_inputs(
    inputs: Vec<Input>,
    config: AioConfig,
    backend: Backend,
) -> Result<Report, EngineError> {
    let specs: Vec<JobSpec> = inputs.iter().map(Input::spec).collect();
    let engine = Engine::new(config, specs)?;

    #[cfg(target_os = "linux")]
    if backend != Backend::Blocking {
        let fds = inputs.iter().map(Input::raw_fd).collect();
        match UringQueue::new(config.queue_depth, fds) {
            Ok(mut queue) => {
                debug!(depth = config.queue_depth, "using io_uring");
                // `inputs` stays alive, and its descriptors open, until the
                // run has returned.
                let report = engine.run(&mut queue);
                drop(inputs);
                return report;
            }
            Err(e) if backend == Backend::Uring => return Err(EngineError::Io(e)),
            Err(e) => warn!(error = %e, "io_uring unavailable, using blocking reads"),
        }
    }
    #[cfg(not(target_os = "linux"))]
    if backend == Backend::Uring {
        return Err(EngineError::Io(io::Error::new(
            io::ErrorKind::Unsupported,
            "io_uring requires Linux",
        )));
    }

    let sources = inputs.into_iter().map(Input::into_source).collect();
    let mut queue = BlockingQueue::new(config.queue_depth as usize, sources);
    engine.run(&mut queue)
}
