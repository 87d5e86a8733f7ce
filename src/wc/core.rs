use std::ops::AddAssign;

use memchr::memchr_iter;

/// Line, word and byte tallies for one input (or a sum of inputs).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WcCounts {
    pub lines: u64,
    pub words: u64,
    pub bytes: u64,
}

impl AddAssign for WcCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.lines += rhs.lines;
        self.words += rhs.words;
        self.bytes += rhs.bytes;
    }
}

/// Word-content lookup table: `WORD_TABLE[byte] == 1` for ASCII letters.
/// Matches C-locale `isalpha()`; everything else (digits, punctuation,
/// whitespace, high bytes) separates words.
const fn make_word_table() -> [u8; 256] {
    let mut t = [0u8; 256];
    let mut b = b'A';
    while b <= b'Z' {
        t[b as usize] = 1;
        t[(b + 32) as usize] = 1;
        b += 1;
    }
    t
}

const WORD_TABLE: [u8; 256] = make_word_table();

/// Count newlines using SIMD-accelerated memchr.
#[inline]
pub fn count_lines(data: &[u8]) -> u64 {
    memchr_iter(b'\n', data).count() as u64
}

/// Count word starts in `data`, given whether the byte before `data` was
/// word content. Returns the number of words started and the trailing state.
///
/// Branchless like a lookup-table scanner: a word starts at each
/// transition from non-letter to letter.
pub fn count_words_from(data: &[u8], in_word: bool) -> (u64, bool) {
    let mut words = 0u64;
    let mut prev = in_word as u8;

    for &b in data {
        let curr = WORD_TABLE[b as usize];
        words += ((prev ^ 1) & curr) as u64;
        prev = curr;
    }
    (words, prev == 1)
}

/// Count words in a standalone buffer.
#[inline]
pub fn count_words(data: &[u8]) -> u64 {
    count_words_from(data, false).0
}

/// Counting state that persists across the chunks of one input.
///
/// Feeding a buffer in any number of pieces, in order, produces the same
/// totals as feeding it whole: the only state crossing a chunk boundary is
/// whether the previous byte was inside a word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WcState {
    pub in_word: bool,
    pub counts: WcCounts,
}

impl WcState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one delivered chunk and return the tallies it contributed.
    pub fn feed(&mut self, chunk: &[u8]) -> WcCounts {
        let (words, in_word) = count_words_from(chunk, self.in_word);
        let delta = WcCounts {
            lines: count_lines(chunk),
            words,
            bytes: chunk.len() as u64,
        };
        self.in_word = in_word;
        self.counts += delta;
        delta
    }

    pub fn counts(&self) -> WcCounts {
        self.counts
    }
}

/// Count a whole buffer in one call.
pub fn count_all(data: &[u8]) -> WcCounts {
    let mut state = WcState::new();
    state.feed(data);
    state.counts
}
