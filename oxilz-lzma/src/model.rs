//! LZMA probability models.
//!
//! LZMA uses context-dependent probability models for:
//! - Literal encoding (context = previous byte + position)
//! - Match length encoding
//! - Distance encoding
//! - State machine transitions
//!
//! All tables start at the probability midpoint and adapt as bits are coded.
//! Table sizes derive from the stream properties and stay fixed for the
//! lifetime of a codec instance.

use crate::range_coder::PROB_INIT;
use oxilz_core::error::{OxiLzError, Result};

/// Default literal context bits.
pub const LC_DEFAULT: u32 = 3;

/// Default literal position bits.
pub const LP_DEFAULT: u32 = 0;

/// Default position bits.
pub const PB_DEFAULT: u32 = 2;

/// Number of bits reserved for the position state in combined contexts.
pub const POS_BITS_MAX: u32 = 4;

/// Maximum number of position states.
pub const POS_STATES_MAX: usize = 1 << POS_BITS_MAX;

/// Number of states in the LZMA state machine.
pub const NUM_STATES: usize = 12;

/// Number of bits for low length coding.
pub const LEN_LOW_BITS: u32 = 3;
/// Number of bits for mid length coding.
pub const LEN_MID_BITS: u32 = 3;
/// Number of bits for high length coding.
pub const LEN_HIGH_BITS: u32 = 8;

/// Number of low length symbols.
pub const LEN_LOW_SYMBOLS: usize = 1 << LEN_LOW_BITS;
/// Number of mid length symbols.
pub const LEN_MID_SYMBOLS: usize = 1 << LEN_MID_BITS;
/// Number of high length symbols.
pub const LEN_HIGH_SYMBOLS: usize = 1 << LEN_HIGH_BITS;

/// Minimum match length.
pub const MATCH_LEN_MIN: usize = 2;

/// Maximum match length.
pub const MATCH_LEN_MAX: usize =
    MATCH_LEN_MIN + LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS + LEN_HIGH_SYMBOLS - 1;

/// Number of distance slots.
pub const DIST_SLOTS: usize = 64;

/// Number of bits in a distance slot.
pub const DIST_SLOT_BITS: u32 = 6;

/// Number of alignment bits for distance encoding.
pub const DIST_ALIGN_BITS: u32 = 4;
/// Size of alignment table.
pub const DIST_ALIGN_SIZE: usize = 1 << DIST_ALIGN_BITS;

/// Number of distances covered entirely by adaptive probabilities.
pub const FULL_DISTANCES: usize = 128;

/// First slot coded with direct bits and the alignment tree.
pub const END_POS_MODEL_INDEX: usize = 14;

/// Size of the shared table for slots 4..14. Entry 0 is never addressed;
/// each slot's reverse tree starts at `dist_base - slot + 1`.
pub const DIST_SPECIAL_SIZE: usize = 1 + FULL_DISTANCES - END_POS_MODEL_INDEX;

/// Coded distance value reserved as the end-of-stream marker.
pub const EOS_DISTANCE: u32 = 0xFFFF_FFFF;

/// Smallest valid dictionary length (4 KiB).
pub const DICT_LEN_MIN: u32 = 1 << 12;

/// LZMA state machine state.
///
/// The twelve states are a digest of the most recent operation kinds; states
/// below 7 follow a literal, states 7 and up follow some form of match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct State(u8);

impl State {
    /// Initial state.
    pub const fn new() -> Self {
        Self(0)
    }

    /// Get state value.
    pub fn value(self) -> usize {
        self.0 as usize
    }

    /// Check if the last operation was a literal.
    pub fn is_literal(self) -> bool {
        self.0 < 7
    }

    /// Update state after a literal.
    pub fn update_literal(&mut self) {
        self.0 = match self.0 {
            0..=3 => 0,
            4..=9 => self.0 - 3,
            _ => self.0 - 6,
        };
    }

    /// Update state after a simple match.
    pub fn update_match(&mut self) {
        self.0 = if self.0 < 7 { 7 } else { 10 };
    }

    /// Update state after a short rep.
    pub fn update_short_rep(&mut self) {
        self.0 = if self.0 < 7 { 9 } else { 11 };
    }

    /// Update state after a long rep.
    pub fn update_long_rep(&mut self) {
        self.0 = if self.0 < 7 { 8 } else { 11 };
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

/// LZMA properties (lc, lp, pb).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LzmaProperties {
    /// Literal context bits.
    pub lc: u32,
    /// Literal position bits.
    pub lp: u32,
    /// Position bits.
    pub pb: u32,
}

impl LzmaProperties {
    /// Create new properties.
    ///
    /// Requires `lc <= 8`, `lp <= 4`, `pb <= 4` and `lc + lp <= 4`.
    pub fn new(lc: u32, lp: u32, pb: u32) -> Result<Self> {
        if lc > 8 {
            return Err(OxiLzError::invalid_properties(format!(
                "lc {} exceeds 8",
                lc
            )));
        }
        if lp > 4 {
            return Err(OxiLzError::invalid_properties(format!(
                "lp {} exceeds 4",
                lp
            )));
        }
        if pb > 4 {
            return Err(OxiLzError::invalid_properties(format!(
                "pb {} exceeds 4",
                pb
            )));
        }
        if lc + lp > 4 {
            return Err(OxiLzError::invalid_properties(format!(
                "lc {} + lp {} exceeds 4",
                lc, lp
            )));
        }
        Ok(Self { lc, lp, pb })
    }

    /// Parse from the packed property byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        let pb = byte as u32 / 45;
        let remaining = byte as u32 - pb * 45;
        let lp = remaining / 9;
        let lc = remaining - lp * 9;
        Self::new(lc, lp, pb)
    }

    /// Encode to the packed property byte.
    pub fn to_byte(&self) -> u8 {
        ((self.pb * 5 + self.lp) * 9 + self.lc) as u8
    }

    /// Get the number of literal context tables.
    pub fn num_lit_states(&self) -> usize {
        1 << (self.lc + self.lp)
    }

    /// Get the number of position states.
    pub fn num_pos_states(&self) -> usize {
        1 << self.pb
    }

    /// Get the position state mask.
    pub fn pos_mask(&self) -> u64 {
        (1 << self.pb) - 1
    }
}

impl Default for LzmaProperties {
    fn default() -> Self {
        Self {
            lc: LC_DEFAULT,
            lp: LP_DEFAULT,
            pb: PB_DEFAULT,
        }
    }
}

/// Parameters shared by the encoder and decoder beyond the properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecParams {
    /// Uncompressed size if known. `None` corresponds to the all-ones size
    /// field in the classic header and makes the end-of-stream marker
    /// mandatory.
    pub unpacked_size: Option<u64>,
    /// Whether the encoder terminates the stream with an explicit marker.
    pub eos_marker: bool,
}

impl Default for CodecParams {
    fn default() -> Self {
        Self {
            unpacked_size: None,
            eos_marker: true,
        }
    }
}

impl CodecParams {
    /// Parameters for a stream of known size without an explicit marker.
    pub fn with_size(size: u64) -> Self {
        Self {
            unpacked_size: Some(size),
            eos_marker: false,
        }
    }
}

/// Length decoder/encoder model.
#[derive(Debug, Clone)]
pub struct LengthModel {
    /// Choice bit (low vs mid+high).
    pub choice: u16,
    /// Choice2 bit (mid vs high).
    pub choice2: u16,
    /// Low length probabilities (per position state).
    pub low: Vec<[u16; LEN_LOW_SYMBOLS]>,
    /// Mid length probabilities (per position state).
    pub mid: Vec<[u16; LEN_MID_SYMBOLS]>,
    /// High length probabilities (shared).
    pub high: [u16; LEN_HIGH_SYMBOLS],
}

impl LengthModel {
    /// Create a new length model.
    pub fn new(num_pos_states: usize) -> Self {
        Self {
            choice: PROB_INIT,
            choice2: PROB_INIT,
            low: vec![[PROB_INIT; LEN_LOW_SYMBOLS]; num_pos_states],
            mid: vec![[PROB_INIT; LEN_MID_SYMBOLS]; num_pos_states],
            high: [PROB_INIT; LEN_HIGH_SYMBOLS],
        }
    }

    /// Reset the model.
    pub fn reset(&mut self) {
        self.choice = PROB_INIT;
        self.choice2 = PROB_INIT;
        for arr in &mut self.low {
            arr.fill(PROB_INIT);
        }
        for arr in &mut self.mid {
            arr.fill(PROB_INIT);
        }
        self.high.fill(PROB_INIT);
    }
}

/// Literal decoder/encoder model.
#[derive(Debug, Clone)]
pub struct LiteralModel {
    /// Probability table for each literal state. The first 0x100 entries
    /// decode an unmatched byte, the remaining 0x200 the matched paths.
    pub probs: Vec<[u16; 0x300]>,
}

impl LiteralModel {
    /// Create a new literal model.
    pub fn new(num_lit_states: usize) -> Self {
        Self {
            probs: vec![[PROB_INIT; 0x300]; num_lit_states],
        }
    }

    /// Reset the model.
    pub fn reset(&mut self) {
        for state in &mut self.probs {
            state.fill(PROB_INIT);
        }
    }

    /// Get the literal state index for a stream position and previous byte.
    pub fn get_state(&self, pos: u64, prev_byte: u8, lc: u32, lp: u32) -> usize {
        let lit_pos = pos & ((1 << lp) - 1);
        let prev_bits = (prev_byte as usize) >> (8 - lc as usize);
        ((lit_pos as usize) << lc as usize) | prev_bits
    }
}

/// Distance model.
#[derive(Debug, Clone)]
pub struct DistanceModel {
    /// Distance slot probabilities (per clamped length state).
    pub slot: [[u16; DIST_SLOTS]; 4],
    /// Shared probabilities for slots 4..14. A slot's reverse tree is rooted
    /// at offset `dist_base - slot`.
    pub special: [u16; DIST_SPECIAL_SIZE],
    /// Alignment probabilities for the low nibble of large distances.
    pub align: [u16; DIST_ALIGN_SIZE],
}

impl DistanceModel {
    /// Create a new distance model.
    pub fn new() -> Self {
        Self {
            slot: [[PROB_INIT; DIST_SLOTS]; 4],
            special: [PROB_INIT; DIST_SPECIAL_SIZE],
            align: [PROB_INIT; DIST_ALIGN_SIZE],
        }
    }

    /// Reset the model.
    pub fn reset(&mut self) {
        for s in &mut self.slot {
            s.fill(PROB_INIT);
        }
        self.special.fill(PROB_INIT);
        self.align.fill(PROB_INIT);
    }
}

impl Default for DistanceModel {
    fn default() -> Self {
        Self::new()
    }
}

/// Complete LZMA model containing all probability tables.
#[derive(Debug, Clone)]
pub struct LzmaModel {
    /// LZMA properties.
    pub props: LzmaProperties,

    /// Is-match probabilities, indexed by state and position state.
    pub is_match: [[u16; POS_STATES_MAX]; NUM_STATES],
    /// Is-rep probabilities.
    pub is_rep: [u16; NUM_STATES],
    /// Is-rep0 probabilities.
    pub is_rep0: [u16; NUM_STATES],
    /// Is-rep1 probabilities.
    pub is_rep1: [u16; NUM_STATES],
    /// Is-rep2 probabilities.
    pub is_rep2: [u16; NUM_STATES],
    /// Is-rep0-long probabilities, indexed by state and position state.
    pub is_rep0_long: [[u16; POS_STATES_MAX]; NUM_STATES],

    /// Match length model.
    pub match_len: LengthModel,
    /// Rep match length model.
    pub rep_len: LengthModel,

    /// Literal model.
    pub literal: LiteralModel,

    /// Distance model.
    pub distance: DistanceModel,
}

impl LzmaModel {
    /// Create a new LZMA model with the given properties.
    pub fn new(props: LzmaProperties) -> Self {
        let num_pos_states = props.num_pos_states();
        let num_lit_states = props.num_lit_states();

        Self {
            props,
            is_match: [[PROB_INIT; POS_STATES_MAX]; NUM_STATES],
            is_rep: [PROB_INIT; NUM_STATES],
            is_rep0: [PROB_INIT; NUM_STATES],
            is_rep1: [PROB_INIT; NUM_STATES],
            is_rep2: [PROB_INIT; NUM_STATES],
            is_rep0_long: [[PROB_INIT; POS_STATES_MAX]; NUM_STATES],
            match_len: LengthModel::new(num_pos_states),
            rep_len: LengthModel::new(num_pos_states),
            literal: LiteralModel::new(num_lit_states),
            distance: DistanceModel::new(),
        }
    }

    /// Reset all probabilities to their initial values.
    pub fn reset(&mut self) {
        for state in &mut self.is_match {
            state.fill(PROB_INIT);
        }
        self.is_rep.fill(PROB_INIT);
        self.is_rep0.fill(PROB_INIT);
        self.is_rep1.fill(PROB_INIT);
        self.is_rep2.fill(PROB_INIT);
        for state in &mut self.is_rep0_long {
            state.fill(PROB_INIT);
        }
        self.match_len.reset();
        self.rep_len.reset();
        self.literal.reset();
        self.distance.reset();
    }
}
