//! Encoder dictionary and match finder.
//!
//! The encoder dictionary is the input window of the codec. Bytes written by
//! the caller are buffered in front of the head; the head advances as
//! operations are emitted, and the `dict_len` bytes behind it are the
//! history that back-references may address.
//!
//! Match candidates come from a [`Matcher`], which indexes the 4-byte words
//! that have passed the head. Candidates are only hints: the encoder
//! re-verifies every distance against the window with [`EncoderDict::match_len`],
//! so a stale or colliding table entry can never produce an invalid stream.

use crate::model::MATCH_LEN_MAX;
use oxilz_core::error::{OxiLzError, Result};
use oxilz_core::ringbuffer::RingBuffer;

/// Length of the words the match finder indexes.
pub const WORD_LEN: usize = 4;

/// Hash table size (64K entries).
const HASH_SIZE: usize = 1 << 16;

/// Sentinel for an unused table slot.
const EMPTY: u32 = u32::MAX;

/// Extra ring capacity in front of the dictionary for buffered input.
const BUF_HEADROOM: usize = 1 << 12;

/// Identifies potential matches for fixed-length words.
///
/// Implementations index every word that has passed the head and report the
/// absolute start positions of earlier occurrences, most recent first.
pub trait Matcher {
    /// Feed bytes that have moved behind the head.
    fn write(&mut self, data: &[u8]);

    /// Length of the indexed words.
    fn word_len(&self) -> usize;

    /// Number of bytes fed so far (the absolute head position).
    fn pos(&self) -> u64;

    /// Absolute start positions of earlier occurrences of `word`.
    fn matches(&self, word: &[u8]) -> Vec<u64>;

    /// Forget all indexed words.
    fn reset(&mut self);
}

/// FNV-1a over the four word bytes.
fn hash_word(word: u32) -> usize {
    let mut h = 2166136261u32;
    for b in word.to_be_bytes() {
        h ^= b as u32;
        h = h.wrapping_mul(16777619);
    }
    (h as usize) & (HASH_SIZE - 1)
}

/// Hash-chain matcher over 4-byte words.
///
/// Positions are stored truncated to 32 bits; past 4 GiB of input the chain
/// may propose stale candidates, which the re-verification in the encoder
/// dictionary filters out.
#[derive(Debug)]
pub struct HashChain {
    /// Most recent word-start position per hash bucket.
    head: Vec<u32>,
    /// Previous position with the same hash, indexed by position.
    chain: Vec<u32>,
    /// Mask for chain indexing (chain length - 1).
    mask: usize,
    /// Window the chain walk stays within.
    window: usize,
    /// Maximum number of candidates returned per query.
    depth: usize,
    /// Bytes fed so far.
    pos: u64,
    /// Rolling accumulator of the last four bytes.
    word: u32,
}

impl HashChain {
    /// Create a matcher for the given window with the given search depth.
    pub fn new(window: usize, depth: usize) -> Self {
        assert!(window > 0, "window must not be empty");
        Self {
            head: vec![EMPTY; HASH_SIZE],
            chain: vec![EMPTY; window.next_power_of_two()],
            mask: window.next_power_of_two() - 1,
            window,
            depth,
            pos: 0,
            word: 0,
        }
    }
}

impl Matcher for HashChain {
    fn write(&mut self, data: &[u8]) {
        for &byte in data {
            self.word = (self.word << 8) | byte as u32;
            self.pos += 1;
            if self.pos >= WORD_LEN as u64 {
                let start = self.pos - WORD_LEN as u64;
                let h = hash_word(self.word);
                self.chain[(start as usize) & self.mask] = self.head[h];
                self.head[h] = start as u32;
            }
        }
    }

    fn word_len(&self) -> usize {
        WORD_LEN
    }

    fn pos(&self) -> u64 {
        self.pos
    }

    fn matches(&self, word: &[u8]) -> Vec<u64> {
        if word.len() != WORD_LEN {
            return Vec::new();
        }
        let w = u32::from_be_bytes([word[0], word[1], word[2], word[3]]);
        let here = self.pos as u32;

        let mut positions = Vec::new();
        let mut entry = self.head[hash_word(w)];
        let mut last_delta = 0u32;

        while entry != EMPTY && positions.len() < self.depth {
            let delta = here.wrapping_sub(entry);
            // Chains run strictly backwards; anything else is a stale slot.
            if delta <= last_delta || delta as usize > self.window {
                break;
            }
            positions.push(self.pos - delta as u64);
            last_delta = delta;
            entry = self.chain[(entry as usize) & self.mask];
        }

        positions
    }

    fn reset(&mut self) {
        self.head.fill(EMPTY);
        self.chain.fill(EMPTY);
        self.pos = 0;
        self.word = 0;
    }
}

/// Encoder dictionary: input window, lookahead buffer and match finder.
pub struct EncoderDict {
    /// Backing storage for history and buffered lookahead.
    ring: RingBuffer,
    /// Dictionary capacity; history beyond this is unreachable.
    dict_cap: usize,
    /// Absolute position of the head.
    head: u64,
    /// Absolute position of the write front.
    written: u64,
    /// Match finder fed by [`EncoderDict::advance`].
    matcher: Box<dyn Matcher>,
}

impl EncoderDict {
    /// Create an encoder dictionary with the given capacity and match search
    /// depth.
    pub fn new(dict_cap: usize, depth: usize) -> Self {
        assert!(dict_cap > 0, "dictionary must not be empty");
        Self {
            ring: RingBuffer::new((dict_cap + BUF_HEADROOM).next_power_of_two()),
            dict_cap,
            head: 0,
            written: 0,
            matcher: Box::new(HashChain::new(dict_cap, depth)),
        }
    }

    /// Absolute position of the head; equals the number of uncompressed
    /// bytes already encoded.
    pub fn pos(&self) -> u64 {
        self.head
    }

    /// Current length of the dictionary, capped at its capacity.
    pub fn dict_len(&self) -> usize {
        if self.head < self.dict_cap as u64 {
            self.head as usize
        } else {
            self.dict_cap
        }
    }

    /// Number of buffered bytes in front of the head.
    pub fn buffered(&self) -> usize {
        (self.written - self.head) as usize
    }

    /// Number of bytes a following `write` call can accept.
    pub fn available(&self) -> usize {
        self.ring.capacity() - self.buffered() - self.dict_len()
    }

    /// Buffer input bytes in front of the head.
    ///
    /// The write is all-or-nothing: if `data` does not fit the remaining
    /// space the dictionary is left untouched and [`OxiLzError::WriteTooBig`]
    /// is returned. The caller recovers by advancing the head (encoding
    /// operations) and writing again.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let available = self.available();
        if data.len() > available {
            return Err(OxiLzError::write_too_big(data.len(), available));
        }
        self.ring.write_bytes(data);
        self.written += data.len() as u64;
        Ok(())
    }

    /// Byte at head offset `offset`, inside the buffered region.
    fn lookahead(&self, offset: usize) -> u8 {
        self.ring
            .read_at_distance(self.buffered() - offset)
            .map_or(0, |b| b)
    }

    /// Byte at the head, or 0 if nothing is buffered.
    pub fn literal(&self) -> u8 {
        if self.buffered() == 0 {
            return 0;
        }
        self.lookahead(0)
    }

    /// Byte at the given positive distance behind the head, or 0 outside the
    /// dictionary.
    pub fn byte_at(&self, distance: usize) -> u8 {
        if distance == 0 || distance > self.dict_len() {
            return 0;
        }
        self.ring
            .read_at_distance(self.buffered() + distance)
            .map_or(0, |b| b)
    }

    /// Candidate distances for the word at the head, most recent first.
    ///
    /// Returns an empty list when fewer than [`WORD_LEN`] bytes are
    /// buffered. Candidates are filtered to the reachable window but not
    /// verified; use [`EncoderDict::match_len`] before encoding.
    pub fn matches(&self) -> Vec<usize> {
        if self.buffered() < self.matcher.word_len() {
            return Vec::new();
        }

        let mut word = [0u8; WORD_LEN];
        for (i, slot) in word.iter_mut().enumerate() {
            *slot = self.lookahead(i);
        }

        let reach = self.dict_len() as u64;
        self.matcher
            .matches(&word)
            .into_iter()
            .filter_map(|p| {
                let d = self.head - p;
                (d > 0 && d <= reach).then_some(d as usize)
            })
            .collect()
    }

    /// Length of the match between the head and the bytes at `dist`, capped
    /// at the buffered lookahead and the maximum match length.
    ///
    /// The comparison runs through the head for `dist` smaller than the
    /// length, matching the decoder's overlapping-copy behaviour.
    pub fn match_len(&self, dist: usize) -> usize {
        if dist == 0 || dist > self.dict_len() {
            return 0;
        }

        let buffered = self.buffered();
        let max = buffered.min(MATCH_LEN_MAX);
        let mut len = 0;

        while len < max {
            let history = self
                .ring
                .read_at_distance(buffered + dist - len)
                .map_or(0, |b| b);
            if self.lookahead(len) != history {
                break;
            }
            len += 1;
        }

        len
    }

    /// Move the head forward by `n` bytes, feeding them to the matcher.
    pub fn advance(&mut self, n: usize) {
        assert!(
            n > 0 && n <= self.buffered(),
            "advance of {} outside buffered range {}",
            n,
            self.buffered()
        );

        let mut fed = Vec::with_capacity(n);
        for i in 0..n {
            fed.push(self.lookahead(i));
        }
        self.matcher.write(&fed);
        self.head += n as u64;
    }
}
