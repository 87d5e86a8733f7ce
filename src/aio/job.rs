use crate::wc::{WcCounts, WcState};

use super::arena::Slot;

/// Index of a job in registration order.
pub type JobId = usize;

/// Length of an input as known before reading starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Size {
    /// Regular file of this many bytes.
    Known(u64),
    /// Stream whose end is only discovered by reading it.
    Unknown,
}

/// What the caller provides per input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub label: Option<String>,
    pub size: Size,
}

impl JobSpec {
    pub fn file(label: impl Into<String>, size: u64) -> Self {
        Self {
            label: Some(label.into()),
            size: Size::Known(size),
        }
    }

    pub fn stream() -> Self {
        Self {
            label: None,
            size: Size::Unknown,
        }
    }
}

/// A fully delivered chunk waiting for an earlier chunk of the same job.
#[derive(Debug)]
pub(crate) struct Parked {
    pub offset: u64,
    pub len: usize,
    pub slot: Slot,
}

/// Per-input bookkeeping.
#[derive(Debug)]
pub struct Job {
    pub id: JobId,
    pub label: Option<String>,
    pub size: Size,
    /// Next byte offset to request.
    pub read_offset: u64,
    /// Next byte offset the counter expects.
    pub count_offset: u64,
    /// Bytes not yet counted (known-size jobs).
    pub bytes_remaining: u64,
    /// Bytes asked for across all first submissions of this job's chunks.
    pub bytes_requested: u64,
    pub state: WcState,
    /// Reads submitted or waiting for resubmission.
    pub in_flight: usize,
    /// Stream end observed (unknown-size jobs).
    pub eof: bool,
    pub(crate) parked: Vec<Parked>,
}

impl Job {
    fn new(id: JobId, spec: JobSpec) -> Self {
        let bytes_remaining = match spec.size {
            Size::Known(n) => n,
            Size::Unknown => 0,
        };
        Self {
            id,
            label: spec.label,
            size: spec.size,
            read_offset: 0,
            count_offset: 0,
            bytes_remaining,
            bytes_requested: 0,
            state: WcState::new(),
            in_flight: 0,
            eof: false,
            parked: Vec::new(),
        }
    }

    #[inline]
    pub fn is_stream(&self) -> bool {
        self.size == Size::Unknown
    }

    /// Whether the scheduler may issue another chunk for this job.
    ///
    /// A stream keeps at most one read outstanding: stream reads consume
    /// bytes in submission order, not by offset.
    pub fn has_more_to_request(&self) -> bool {
        match self.size {
            Size::Known(n) => self.read_offset < n,
            Size::Unknown => !self.eof && self.in_flight == 0,
        }
    }

    /// Length of the next chunk: one block, or whatever is left of the file.
    pub fn next_request_len(&self, block_size: usize) -> usize {
        match self.size {
            Size::Known(n) => (n - self.read_offset).min(block_size as u64) as usize,
            Size::Unknown => block_size,
        }
    }

    pub fn is_done(&self) -> bool {
        match self.size {
            Size::Known(_) => self.bytes_remaining == 0,
            Size::Unknown => self.eof && self.in_flight == 0,
        }
    }

    /// Count `chunk`, which must start at `count_offset`.
    pub fn count(&mut self, chunk: &[u8]) -> WcCounts {
        let delta = self.state.feed(chunk);
        self.count_offset += chunk.len() as u64;
        if let Size::Known(_) = self.size {
            debug_assert!(delta.bytes <= self.bytes_remaining);
            self.bytes_remaining -= delta.bytes;
        }
        delta
    }

    pub(crate) fn park(&mut self, chunk: Parked) {
        debug_assert!(chunk.offset > self.count_offset);
        self.parked.push(chunk);
    }

    /// Remove the parked chunk that starts where counting left off, if any.
    pub(crate) fn take_next_parked(&mut self) -> Option<Parked> {
        let pos = self
            .parked
            .iter()
            .position(|p| p.offset == self.count_offset)?;
        Some(self.parked.swap_remove(pos))
    }

    pub fn counts(&self) -> WcCounts {
        self.state.counts()
    }
}

/// All jobs of one run, in registration order.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Vec<Job>,
}

impl JobRegistry {
    /// Build the registry.
    ///
    /// # Panics
    ///
    /// If an unknown-size job is registered alongside any other job. Only a
    /// lone stream can have its end detected from a short read.
    pub fn new(specs: Vec<JobSpec>) -> Self {
        let streams = specs.iter().filter(|s| s.size == Size::Unknown).count();
        assert!(
            streams == 0 || specs.len() == 1,
            "an unknown-size stream must be the only job ({} jobs, {} streams)",
            specs.len(),
            streams
        );
        let jobs = specs
            .into_iter()
            .enumerate()
            .map(|(id, spec)| Job::new(id, spec))
            .collect();
        Self { jobs }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn all_done(&self) -> bool {
        self.jobs.iter().all(Job::is_done)
    }

    pub fn get(&self, id: JobId) -> &Job {
        &self.jobs[id]
    }

    pub fn get_mut(&mut self, id: JobId) -> &mut Job {
        &mut self.jobs[id]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Job> {
        self.jobs.iter()
    }

    pub fn into_jobs(self) -> Vec<Job> {
        self.jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_job_requests_until_size() {
        let mut registry = JobRegistry::new(vec![JobSpec::file("a", 10)]);
        let job = registry.get_mut(0);
        assert_eq!(job.next_request_len(4), 4);
        job.read_offset = 8;
        assert_eq!(job.next_request_len(4), 2);
        job.read_offset = 10;
        assert!(!job.has_more_to_request());
        assert!(!job.is_done(), "nothing counted yet");
    }

    #[test]
    fn test_empty_file_is_done_at_start() {
        let registry = JobRegistry::new(vec![JobSpec::file("empty", 0)]);
        assert!(registry.all_done());
        assert!(!registry.get(0).has_more_to_request());
    }

    #[test]
    fn test_stream_one_read_at_a_time() {
        let mut registry = JobRegistry::new(vec![JobSpec::stream()]);
        let job = registry.get_mut(0);
        assert!(job.has_more_to_request());
        job.in_flight = 1;
        assert!(!job.has_more_to_request());
        job.in_flight = 0;
        job.eof = true;
        assert!(!job.has_more_to_request());
        assert!(job.is_done());
    }

    #[test]
    fn test_count_decrements_remaining() {
        let mut registry = JobRegistry::new(vec![JobSpec::file("a", 6)]);
        let job = registry.get_mut(0);
        job.count(b"ab ");
        job.count(b"cd\n");
        assert_eq!(job.bytes_remaining, 0);
        assert_eq!(job.count_offset, 6);
        assert!(job.is_done());
        assert_eq!(job.counts().words, 2);
    }

    #[test]
    #[should_panic(expected = "only job")]
    fn test_stream_mixed_with_files_panics() {
        JobRegistry::new(vec![JobSpec::file("a", 1), JobSpec::stream()]);
    }
}
