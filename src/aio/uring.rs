use std::io;
use std::os::unix::io::RawFd;

use io_uring::{IoUring, opcode, types};

use super::queue::{Completion, QueueFull, ReadOp, ReadQueue};

/// Offset io_uring reads from the file's current position with.
const CURRENT_POSITION: u64 = u64::MAX;

/// [`ReadQueue`] backed by a Linux io_uring instance.
///
/// The ring is sized to the queue depth, so the engine's in-flight bound
/// always fits in the submission queue.
pub struct UringQueue {
    ring: IoUring,
    fds: Vec<RawFd>,
}

impl UringQueue {
    /// Create a ring with `entries` SQ entries reading from `fds`, indexed
    /// by [`ReadOp::source`]. The descriptors must outlive the queue.
    pub fn new(entries: u32, fds: Vec<RawFd>) -> io::Result<Self> {
        let ring = IoUring::new(entries)?;
        Ok(Self { ring, fds })
    }
}

impl ReadQueue for UringQueue {
    unsafe fn push(&mut self, op: ReadOp) -> Result<(), QueueFull> {
        let fd = self.fds[op.source];
        let entry = opcode::Read::new(types::Fd(fd), op.buf, op.len as u32)
            .offset(op.offset.unwrap_or(CURRENT_POSITION))
            .build()
            .user_data(op.user_data);
        // SAFETY: the caller keeps `op.buf` valid until the CQE is reaped,
        // and `fd` outlives the ring.
        unsafe { self.ring.submission().push(&entry).map_err(|_| QueueFull) }
    }

    fn submit(&mut self) -> io::Result<()> {
        loop {
            match self.ring.submit() {
                Ok(_) => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn wait(&mut self) -> io::Result<Completion> {
        loop {
            // Drain the CQ before waiting to avoid a syscall when a
            // completion is already there.
            if let Some(c) = self.peek() {
                return Ok(c);
            }
            match self.ring.submit_and_wait(1) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    fn peek(&mut self) -> Option<Completion> {
        self.ring.completion().next().map(|cqe| Completion {
            user_data: cqe.user_data(),
            result: cqe.result(),
        })
    }
}
