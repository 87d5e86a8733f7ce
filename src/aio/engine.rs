use std::collections::VecDeque;
use std::io;

use tracing::{debug, trace, warn};

use super::arena::{BufferArena, Slot};
use super::job::{JobId, JobRegistry, JobSpec, Parked};
use super::queue::{Completion, ReadOp, ReadQueue};
use super::report::Report;
use super::{AioConfig, EngineError, StreamEof};

/// One outstanding (or about to be resubmitted) read.
///
/// A short read turns into a continuation of the same logical chunk: same
/// slot, same `chunk_offset` and `original_len`, with `filled` bytes already
/// in the slot and `requested_len` bytes still to come from `file_offset`.
#[derive(Debug)]
struct InFlight {
    job: JobId,
    chunk_offset: u64,
    file_offset: u64,
    filled: usize,
    requested_len: usize,
    original_len: usize,
    slot: Slot,
}

/// Outcome of one scheduling pass.
#[derive(Debug, Default)]
struct Scheduled {
    pushed: usize,
    /// The queue turned a request away; it is pushed again next round.
    refused: bool,
}

/// Counters describing how a run went. Not needed for the result, but
/// useful for tuning queue depth and block size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub rounds: u64,
    pub reads_submitted: u64,
    pub short_reads: u64,
    pub queue_rejections: u64,
    pub chunks_parked: u64,
    pub peak_in_flight: usize,
}

/// Single-threaded read scheduler and completion reassembler.
///
/// Each round fills the queue, submits, waits for one completion (only if
/// none is ready yet), then drains whatever else is ready without blocking.
pub struct Engine {
    config: AioConfig,
    jobs: JobRegistry,
    arena: BufferArena,
    /// Submitted reads, indexed by slot (the completion's `user_data`).
    in_flight: Vec<Option<InFlight>>,
    /// Short-read continuations waiting to be resubmitted.
    retry: VecDeque<InFlight>,
    outstanding: usize,
    stats: EngineStats,
}

impl Engine {
    pub fn new(config: AioConfig, specs: Vec<JobSpec>) -> Result<Self, EngineError> {
        config.validate()?;
        let depth = config.queue_depth as usize;
        let arena = BufferArena::new(depth, config.block_size);
        Ok(Self {
            config,
            jobs: JobRegistry::new(specs),
            arena,
            in_flight: (0..depth).map(|_| None).collect(),
            retry: VecDeque::new(),
            outstanding: 0,
            stats: EngineStats::default(),
        })
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    /// Drive every job to completion and fold the results.
    ///
    /// On error nothing is reported. Reads still in the kernel are waited
    /// for before the buffers are dropped.
    pub fn run<Q: ReadQueue>(mut self, queue: &mut Q) -> Result<Report, EngineError> {
        if let Err(e) = self.run_rounds(queue) {
            self.abandon(queue);
            return Err(e);
        }
        debug!(stats = ?self.stats, "all jobs done");
        Ok(Report::from_jobs(self.jobs.into_jobs(), self.stats))
    }

    fn run_rounds<Q: ReadQueue>(&mut self, queue: &mut Q) -> Result<(), EngineError> {
        while !self.jobs.all_done() {
            self.stats.rounds += 1;
            let round = self.schedule(queue);
            if round.pushed > 0 {
                queue.submit()?;
            }
            trace!(
                pushed = round.pushed,
                refused = round.refused,
                outstanding = self.outstanding,
                "round submitted"
            );
            if self.outstanding == 0 {
                // A refused push is retried next round.
                if round.refused {
                    continue;
                }
                return Err(EngineError::Stalled);
            }
            self.drain(queue)?;
        }
        Ok(())
    }

    /// Fill the queue: pending continuations first, then one new chunk per
    /// job per pass in registration order until capacity or work runs out.
    fn schedule<Q: ReadQueue>(&mut self, queue: &mut Q) -> Scheduled {
        let depth = self.config.queue_depth as usize;
        let mut round = Scheduled::default();

        while let Some(req) = self.retry.pop_front() {
            match self.push(queue, req) {
                Ok(()) => round.pushed += 1,
                Err(req) => {
                    self.retry.push_front(req);
                    round.refused = true;
                    return round;
                }
            }
        }

        loop {
            let mut progressed = false;
            for id in 0..self.jobs.len() {
                if self.outstanding >= depth {
                    return round;
                }
                if !self.jobs.get(id).has_more_to_request() {
                    continue;
                }
                // Parked chunks can hold slots while requests are free.
                let Some(slot) = self.arena.acquire() else {
                    return round;
                };
                let job = self.jobs.get(id);
                let len = job.next_request_len(self.config.block_size);
                let req = InFlight {
                    job: id,
                    chunk_offset: job.read_offset,
                    file_offset: job.read_offset,
                    filled: 0,
                    requested_len: len,
                    original_len: len,
                    slot,
                };
                match self.push(queue, req) {
                    Ok(()) => {
                        let job = self.jobs.get_mut(id);
                        job.read_offset += len as u64;
                        job.bytes_requested += len as u64;
                        job.in_flight += 1;
                        round.pushed += 1;
                        progressed = true;
                    }
                    Err(req) => {
                        self.arena.release(req.slot);
                        round.refused = true;
                        return round;
                    }
                }
            }
            if !progressed {
                return round;
            }
        }
    }

    /// Hand one read to the queue. Gives the request back if the queue is
    /// full so the caller can retry next round.
    fn push<Q: ReadQueue>(&mut self, queue: &mut Q, req: InFlight) -> Result<(), InFlight> {
        let stream = self.jobs.get(req.job).is_stream();
        let op = ReadOp {
            source: req.job,
            offset: (!stream).then_some(req.file_offset),
            buf: self.arena.tail_ptr(&req.slot, req.filled, req.requested_len),
            len: req.requested_len,
            user_data: req.slot.index() as u64,
        };
        // SAFETY: the slot stays owned by `self.in_flight` until its
        // completion is reaped, and the arena outlives every outstanding
        // read (see `abandon`).
        if unsafe { queue.push(op) }.is_err() {
            self.stats.queue_rejections += 1;
            return Err(req);
        }
        let index = req.slot.index();
        debug_assert!(self.in_flight[index].is_none());
        self.in_flight[index] = Some(req);
        self.outstanding += 1;
        self.stats.reads_submitted += 1;
        self.stats.peak_in_flight = self.stats.peak_in_flight.max(self.outstanding);
        Ok(())
    }

    /// Reap completions: block for the first only if none is ready, then
    /// take everything else that is ready.
    fn drain<Q: ReadQueue>(&mut self, queue: &mut Q) -> Result<(), EngineError> {
        let first = match queue.peek() {
            Some(c) => c,
            None => queue.wait()?,
        };
        self.reap(first)?;
        while let Some(c) = queue.peek() {
            self.reap(c)?;
        }
        Ok(())
    }

    fn reap(&mut self, c: Completion) -> Result<(), EngineError> {
        let index = c.user_data as usize;
        let mut req = self
            .in_flight
            .get_mut(index)
            .and_then(Option::take)
            .unwrap_or_else(|| panic!("completion for unknown slot {}", index));
        self.outstanding -= 1;
        let job = self.jobs.get_mut(req.job);
        job.in_flight -= 1;

        if c.result < 0 {
            return Err(EngineError::Read {
                job: req.job,
                label: job.label.clone(),
                offset: req.file_offset,
                source: io::Error::from_raw_os_error(-c.result),
            });
        }
        let n = c.result as usize;
        assert!(
            n <= req.requested_len,
            "read delivered {} bytes, {} requested",
            n,
            req.requested_len
        );

        if job.is_stream() {
            return self.reap_stream(req, n);
        }

        if n == req.requested_len {
            let len = req.original_len;
            self.deliver(req.job, req.chunk_offset, len, req.slot);
            return Ok(());
        }
        if n == 0 {
            return Err(EngineError::UnexpectedEof {
                job: req.job,
                label: job.label.clone(),
                offset: req.file_offset,
            });
        }

        // Short read: ask for the rest of the chunk into the same slot.
        self.stats.short_reads += 1;
        trace!(
            job = req.job,
            offset = req.file_offset,
            delivered = n,
            wanted = req.requested_len,
            "short read"
        );
        req.filled += n;
        req.file_offset += n as u64;
        req.requested_len -= n;
        job.in_flight += 1;
        self.retry.push_back(req);
        Ok(())
    }

    fn reap_stream(&mut self, req: InFlight, n: usize) -> Result<(), EngineError> {
        // Nothing else may be reading when the stream's end is decided.
        assert!(
            self.jobs.len() == 1 && self.outstanding == 0 && self.retry.is_empty(),
            "stream end detected with other reads active"
        );
        let job = self.jobs.get_mut(req.job);
        let short = n < req.requested_len;
        if short {
            job.read_offset = req.chunk_offset + n as u64;
            if n == 0 || self.config.stream_eof == StreamEof::ShortRead {
                debug!(job = req.job, bytes = job.read_offset, "end of stream");
                job.eof = true;
            } else {
                self.stats.short_reads += 1;
            }
        }
        if n == 0 {
            self.arena.release(req.slot);
        } else {
            self.deliver(req.job, req.chunk_offset, n, req.slot);
        }
        Ok(())
    }

    /// Count a complete chunk if it is next in line for its job, otherwise
    /// park it until the chunks before it have been counted.
    fn deliver(&mut self, id: JobId, offset: u64, len: usize, slot: Slot) {
        let job = self.jobs.get_mut(id);
        if offset != job.count_offset {
            self.stats.chunks_parked += 1;
            trace!(job = id, offset, expected = job.count_offset, "chunk parked");
            job.park(Parked { offset, len, slot });
            return;
        }
        job.count(self.arena.filled(&slot, len));
        self.arena.release(slot);
        while let Some(next) = job.take_next_parked() {
            job.count(self.arena.filled(&next.slot, next.len));
            self.arena.release(next.slot);
        }
    }

    /// Wait out every read still in the kernel so no buffer is freed under
    /// it. If even waiting fails, the buffers are leaked instead.
    fn abandon<Q: ReadQueue>(&mut self, queue: &mut Q) {
        while self.outstanding > 0 {
            match queue.wait() {
                Ok(_) => self.outstanding -= 1,
                Err(e) => {
                    warn!(
                        error = %e,
                        outstanding = self.outstanding,
                        "cannot drain reads; leaking buffers"
                    );
                    self.arena.leak();
                    return;
                }
            }
        }
    }
}
