use std::io::{self, Write};

use crate::wc::WcCounts;

use super::engine::EngineStats;
use super::job::Job;

/// Final tallies of one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    /// File name, or `None` for the stream read from stdin.
    pub label: Option<String>,
    pub counts: WcCounts,
    /// Bytes requested for this input, summed over first submissions.
    pub bytes_requested: u64,
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub jobs: Vec<JobReport>,
    /// Sum over all jobs; present when more than one job ran.
    pub total: Option<WcCounts>,
    pub stats: EngineStats,
}

impl Report {
    pub(crate) fn from_jobs(jobs: Vec<Job>, stats: EngineStats) -> Self {
        let jobs: Vec<JobReport> = jobs
            .into_iter()
            .map(|job| JobReport {
                counts: job.counts(),
                bytes_requested: job.bytes_requested,
                label: job.label,
            })
            .collect();
        let total = (jobs.len() > 1).then(|| sum(&jobs));
        Self { jobs, total, stats }
    }

    /// Sum over all jobs, whether or not `total` is populated.
    pub fn grand_total(&self) -> WcCounts {
        self.total.unwrap_or_else(|| sum(&self.jobs))
    }
}

fn sum(jobs: &[JobReport]) -> WcCounts {
    jobs.iter().fold(WcCounts::default(), |mut acc, j| {
        acc += j.counts;
        acc
    })
}

/// Which columns to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShowFlags {
    pub lines: bool,
    pub words: bool,
    pub bytes: bool,
}

impl ShowFlags {
    /// Explicit selections, or all three columns when none was given.
    pub fn from_selection(lines: bool, words: bool, bytes: bool) -> Self {
        if !lines && !words && !bytes {
            return Self::all();
        }
        Self {
            lines,
            words,
            bytes,
        }
    }

    pub fn all() -> Self {
        Self {
            lines: true,
            words: true,
            bytes: true,
        }
    }

    fn columns(&self, c: &WcCounts) -> Vec<u64> {
        let mut v = Vec::with_capacity(3);
        if self.lines {
            v.push(c.lines);
        }
        if self.words {
            v.push(c.words);
        }
        if self.bytes {
            v.push(c.bytes);
        }
        v
    }
}

/// When to print the `total` row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum TotalMode {
    /// Only when more than one input was counted.
    #[default]
    Auto,
    Always,
    Never,
    /// Print the total row and nothing else.
    Only,
}

/// Compute number of decimal digits needed to display a value.
fn num_width(n: u64) -> usize {
    if n == 0 {
        return 1;
    }
    let mut width = 0;
    let mut val = n;
    while val > 0 {
        val /= 10;
        width += 1;
    }
    width
}

/// Print one row per input, then the total row as `mode` asks.
///
/// All columns share the width of the widest value so rows line up.
pub fn write_report<W: Write>(
    out: &mut W,
    report: &Report,
    show: ShowFlags,
    mode: TotalMode,
) -> io::Result<()> {
    let total = report.grand_total();
    let show_total = match mode {
        TotalMode::Auto => report.jobs.len() > 1,
        TotalMode::Always | TotalMode::Only => true,
        TotalMode::Never => false,
    };

    let width = if mode == TotalMode::Only {
        1
    } else {
        // Totals bound every per-job value.
        show.columns(&total)
            .into_iter()
            .map(num_width)
            .max()
            .unwrap_or(1)
    };

    if mode != TotalMode::Only {
        for job in &report.jobs {
            write_row(out, &show.columns(&job.counts), width, job.label.as_deref())?;
        }
    }
    if show_total {
        let label = if mode == TotalMode::Only {
            None
        } else {
            Some("total")
        };
        write_row(out, &show.columns(&total), width, label)?;
    }
    Ok(())
}

fn write_row<W: Write>(out: &mut W, values: &[u64], width: usize, label: Option<&str>) -> io::Result<()> {
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.write_all(b" ")?;
        }
        write!(out, "{:>width$}", v, width = width)?;
    }
    if let Some(label) = label {
        write!(out, " {}", label)?;
    }
    out.write_all(b"\n")
}
