use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read};

use thiserror::Error;

/// One read handed to a [`ReadQueue`].
#[derive(Debug, Clone, Copy)]
pub struct ReadOp {
    /// Index of the input to read from, as the queue was built with.
    pub source: usize,
    /// Absolute file offset, or `None` for "current position" (streams).
    pub offset: Option<u64>,
    pub buf: *mut u8,
    pub len: usize,
    /// Returned unchanged in the matching [`Completion`].
    pub user_data: u64,
}

/// Outcome of one read: bytes delivered, or a negative errno.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub user_data: u64,
    pub result: i32,
}

/// The queue has no room for another read until it is submitted or
/// completions are reaped. Recoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("submission queue full")]
pub struct QueueFull;

/// Submission/completion queue pair in the shape of io_uring.
pub trait ReadQueue {
    /// Queue a read without submitting it.
    ///
    /// # Safety
    ///
    /// `op.buf` must be valid for writes of `op.len` bytes, and not otherwise
    /// accessed, until the completion carrying `op.user_data` has been
    /// returned by [`ReadQueue::wait`] or [`ReadQueue::peek`].
    unsafe fn push(&mut self, op: ReadOp) -> Result<(), QueueFull>;

    /// Hand every queued read to the backend.
    fn submit(&mut self) -> io::Result<()>;

    /// Block until one completion is available and return it.
    fn wait(&mut self) -> io::Result<Completion>;

    /// Return a completion if one is ready, without blocking.
    fn peek(&mut self) -> Option<Completion>;
}

/// Readable input for [`BlockingQueue`].
pub enum Source {
    /// Positioned reads at the requested offset.
    File(File),
    /// Sequential reads; offsets are ignored.
    Stream(Box<dyn Read>),
}

/// Portable fallback that performs each read synchronously on submit.
///
/// Used where io_uring is unavailable (non-Linux, seccomp-filtered
/// containers). Completions come back in submission order.
pub struct BlockingQueue {
    sources: Vec<Source>,
    depth: usize,
    queued: VecDeque<ReadOp>,
    ready: VecDeque<Completion>,
}

impl BlockingQueue {
    pub fn new(depth: usize, sources: Vec<Source>) -> Self {
        Self {
            sources,
            depth,
            queued: VecDeque::with_capacity(depth),
            ready: VecDeque::with_capacity(depth),
        }
    }

    fn perform(&mut self, op: ReadOp) -> Completion {
        // SAFETY: push() callers keep `buf` valid and unaliased for `len`
        // bytes until this completion is reaped.
        let buf = unsafe { std::slice::from_raw_parts_mut(op.buf, op.len) };
        let res = match &mut self.sources[op.source] {
            Source::File(file) => read_at(file, buf, op.offset.unwrap_or(0)),
            Source::Stream(reader) => read_retrying(reader.as_mut(), buf),
        };
        let result = match res {
            Ok(n) => n as i32,
            Err(e) => -e.raw_os_error().unwrap_or(libc::EIO),
        };
        Completion {
            user_data: op.user_data,
            result,
        }
    }
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    loop {
        match file.read_at(buf, offset) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            r => return r,
        }
    }
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

fn read_retrying(reader: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            r => return r,
        }
    }
}

impl ReadQueue for BlockingQueue {
    unsafe fn push(&mut self, op: ReadOp) -> Result<(), QueueFull> {
        if self.queued.len() + self.ready.len() >= self.depth {
            return Err(QueueFull);
        }
        self.queued.push_back(op);
        Ok(())
    }

    fn submit(&mut self) -> io::Result<()> {
        while let Some(op) = self.queued.pop_front() {
            let completion = self.perform(op);
            self.ready.push_back(completion);
        }
        Ok(())
    }

    fn wait(&mut self) -> io::Result<Completion> {
        self.submit()?;
        self.ready
            .pop_front()
            .ok_or_else(|| io::Error::other("wait with no reads in flight"))
    }

    fn peek(&mut self) -> Option<Completion> {
        self.ready.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn op(source: usize, offset: Option<u64>, buf: &mut [u8], user_data: u64) -> ReadOp {
        ReadOp {
            source,
            offset,
            buf: buf.as_mut_ptr(),
            len: buf.len(),
            user_data,
        }
    }

    #[test]
    fn test_blocking_queue_positioned_read() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"hello world").unwrap();
        let mut queue = BlockingQueue::new(2, vec![Source::File(file)]);
        let mut buf = [0u8; 5];
        unsafe { queue.push(op(0, Some(6), &mut buf, 7)).unwrap() };
        let c = queue.wait().unwrap();
        assert_eq!(
            c,
            Completion {
                user_data: 7,
                result: 5
            }
        );
        assert_eq!(&buf, b"world");
    }

    #[test]
    fn test_blocking_queue_rejects_past_depth() {
        let stream = Cursor::new(b"abc".to_vec());
        let mut queue = BlockingQueue::new(1, vec![Source::Stream(Box::new(stream))]);
        let mut a = [0u8; 1];
        let mut b = [0u8; 1];
        unsafe {
            queue.push(op(0, None, &mut a, 0)).unwrap();
            assert_eq!(queue.push(op(0, None, &mut b, 1)), Err(QueueFull));
        }
        assert_eq!(queue.wait().unwrap().result, 1);
        assert!(queue.peek().is_none());
    }

    #[test]
    fn test_blocking_queue_stream_eof_is_zero() {
        let mut queue = BlockingQueue::new(1, vec![Source::Stream(Box::new(io::empty()))]);
        let mut buf = [0u8; 4];
        unsafe { queue.push(op(0, None, &mut buf, 3)).unwrap() };
        queue.submit().unwrap();
        assert_eq!(queue.peek().unwrap().result, 0);
    }

    #[test]
    fn test_blocking_queue_wait_without_reads_errors() {
        let mut queue = BlockingQueue::new(1, Vec::new());
        assert!(queue.wait().is_err());
    }
}
