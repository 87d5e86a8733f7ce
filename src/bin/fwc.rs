use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::process;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use fwc_aio::aio::{self, AioConfig, Backend, ShowFlags, StreamEof, TotalMode};
use fwc_aio::common::io::Input;
use fwc_aio::common::{io_error_msg, reset_sigpipe};

#[derive(Parser)]
#[command(
    name = "fwc",
    version,
    about = "Print newline, word, and byte counts for each FILE using overlapped reads"
)]
struct Cli {
    /// Print the byte counts
    #[arg(short = 'c', long = "bytes")]
    bytes: bool,

    /// Print the newline counts
    #[arg(short = 'l', long = "lines")]
    lines: bool,

    /// Print the word counts
    #[arg(short = 'w', long = "words")]
    words: bool,

    /// When to print a line with total counts
    #[arg(long = "total", value_name = "WHEN", value_enum, default_value_t = TotalMode::Auto)]
    total: TotalMode,

    /// Maximum number of reads kept in flight
    #[arg(long = "queue-depth", value_name = "N", default_value_t = aio::DEFAULT_QUEUE_DEPTH)]
    queue_depth: u32,

    /// Bytes requested per read
    #[arg(long = "block-size", value_name = "BYTES", default_value_t = aio::DEFAULT_BLOCK_SIZE)]
    block_size: usize,

    /// Read backend
    #[arg(long = "backend", value_enum, default_value_t = Backend::Auto)]
    backend: Backend,

    /// Use synchronous reads instead of io_uring (same as --backend=blocking)
    #[arg(long = "blocking", conflicts_with = "backend")]
    blocking: bool,

    /// How the end of standard input is detected
    #[arg(long = "stream-eof", value_enum, default_value_t = StreamEof::EmptyRead)]
    stream_eof: StreamEof,

    /// Files to process (reads stdin if none given)
    files: Vec<String>,
}

fn main() {
    reset_sigpipe();
    // Diagnostics go to stderr; RUST_LOG selects the level.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = AioConfig {
        queue_depth: cli.queue_depth,
        block_size: cli.block_size,
        stream_eof: cli.stream_eof,
    };
    if let Err(e) = config.validate() {
        eprintln!("fwc: {}", e);
        eprintln!("Try 'fwc --help' for more information.");
        process::exit(1);
    }

    // Any setup failure is fatal before a single read is issued.
    let inputs: Vec<Input> = if cli.files.is_empty() {
        vec![Input::stdin()]
    } else {
        let mut inputs = Vec::with_capacity(cli.files.len());
        for name in &cli.files {
            match Input::open(Path::new(name)) {
                Ok(input) => inputs.push(input),
                Err(e) => {
                    eprintln!("fwc: {}: {}", name, io_error_msg(&e));
                    process::exit(1);
                }
            }
        }
        inputs
    };

    let backend = if cli.blocking {
        Backend::Blocking
    } else {
        cli.backend
    };

    let report = match aio::count_inputs(inputs, config, backend) {
        Ok(report) => report,
        Err(aio::EngineError::Read { label, source, .. }) => {
            let name = label.as_deref().unwrap_or("standard input");
            eprintln!("fwc: {}: {}", name, io_error_msg(&source));
            process::exit(1);
        }
        Err(e) => {
            eprintln!("fwc: {}", e);
            process::exit(1);
        }
    };

    let show = ShowFlags::from_selection(cli.lines, cli.words, cli.bytes);
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    if let Err(e) = aio::write_report(&mut out, &report, show, cli.total).and_then(|_| out.flush())
    {
        eprintln!("fwc: write error: {}", io_error_msg(&e));
        process::exit(1);
    }
}
