/// Handle to one buffer slot of a [`BufferArena`].
///
/// Deliberately neither `Clone` nor `Copy`: whoever holds the handle owns the
/// slot, and giving it back to the arena consumes it. Two requests can never
/// target the same buffer.
#[derive(Debug, PartialEq, Eq)]
pub struct Slot {
    index: u16,
}

impl Slot {
    #[inline]
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

/// Fixed pool of `queue_depth` zeroed buffers of `block_size` bytes each.
///
/// All memory is allocated in [`BufferArena::new`]. Each buffer is its own
/// boxed slice, so its address is stable for as long as the arena lives,
/// which is what the kernel needs while a read into it is outstanding.
pub struct BufferArena {
    buffers: Box<[Box<[u8]>]>,
    free: Vec<u16>,
    block_size: usize,
}

impl BufferArena {
    pub fn new(slots: usize, block_size: usize) -> Self {
        assert!(slots > 0 && slots <= u16::MAX as usize, "slot count out of range");
        let buffers = (0..slots)
            .map(|_| vec![0u8; block_size].into_boxed_slice())
            .collect::<Vec<_>>()
            .into_boxed_slice();
        // Reverse so slot 0 is handed out first.
        let free = (0..slots as u16).rev().collect();
        Self {
            buffers,
            free,
            block_size,
        }
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn acquire(&mut self) -> Option<Slot> {
        self.free.pop().map(|index| Slot { index })
    }

    pub fn release(&mut self, slot: Slot) {
        debug_assert!(
            !self.free.contains(&slot.index),
            "slot {} released twice",
            slot.index
        );
        self.free.push(slot.index);
    }

    /// The first `len` bytes of a slot.
    pub fn filled(&self, slot: &Slot, len: usize) -> &[u8] {
        &self.buffers[slot.index()][..len]
    }

    /// Raw destination for a read of `len` bytes landing at `start` inside
    /// the slot. Short-read continuations pass the already filled prefix as
    /// `start` so the chunk stays contiguous.
    pub fn tail_ptr(&mut self, slot: &Slot, start: usize, len: usize) -> *mut u8 {
        let buf = &mut self.buffers[slot.index()];
        assert!(
            start + len <= buf.len(),
            "read of {len} bytes at {start} overruns a {} byte slot",
            buf.len()
        );
        buf[start..].as_mut_ptr()
    }

    /// Give up the buffers without freeing them. Used when reads may still
    /// land in them and there is no way left to wait for those reads.
    pub fn leak(&mut self) {
        std::mem::forget(std::mem::take(&mut self.buffers));
        self.free.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_hands_out_every_slot_once() {
        let mut arena = BufferArena::new(3, 8);
        let a = arena.acquire().unwrap();
        let b = arena.acquire().unwrap();
        let c = arena.acquire().unwrap();
        assert!(arena.acquire().is_none());
        assert_eq!(
            [a.index(), b.index(), c.index()],
            [0, 1, 2],
            "slots come out in index order"
        );
        arena.release(b);
        let again = arena.acquire().unwrap();
        assert_eq!(again.index(), 1);
        arena.release(a);
        arena.release(c);
        arena.release(again);
        assert_eq!(arena.available(), 3);
    }

    #[test]
    fn test_arena_slots_start_zeroed() {
        let mut arena = BufferArena::new(2, 16);
        let slot = arena.acquire().unwrap();
        assert!(arena.filled(&slot, 16).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_tail_ptr_writes_after_prefix() {
        let mut arena = BufferArena::new(1, 4);
        let slot = arena.acquire().unwrap();
        let p = arena.tail_ptr(&slot, 2, 2);
        unsafe {
            *p = b'x';
            *p.add(1) = b'y';
        }
        assert_eq!(arena.filled(&slot, 4), &[0, 0, b'x', b'y']);
    }

    #[test]
    #[should_panic(expected = "overruns")]
    fn test_tail_ptr_rejects_overrun() {
        let mut arena = BufferArena::new(1, 4);
        let slot = arena.acquire().unwrap();
        arena.tail_ptr(&slot, 3, 2);
    }
}
