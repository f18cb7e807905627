//! # OxiLz LZMA
//!
//! LZMA (Lempel-Ziv-Markov chain Algorithm) compression and decompression.
//!
//! This crate implements the classic single-stream LZMA format: LZ77-style
//! dictionary matching coded through a carry-propagating range coder over a
//! context-sensitive adaptive probability model.
//!
//! ## Usage
//!
//! ### Decompression
//!
//! ```ignore
//! use oxilz_lzma::decompress;
//!
//! let compressed = std::fs::File::open("data.lzma")?;
//! let decompressed = decompress(compressed)?;
//! ```
//!
//! ### Compression
//!
//! ```ignore
//! use oxilz_lzma::{compress, LzmaLevel};
//!
//! let data = b"Hello, World!";
//! let compressed = compress(data, LzmaLevel::DEFAULT)?;
//! ```
//!
//! ## Stream format
//!
//! A classic LZMA stream consists of:
//! 1. Properties byte (lc, lp, pb packed)
//! 2. Dictionary length (4 bytes, little-endian)
//! 3. Uncompressed size (8 bytes, little-endian; all-ones = unknown, in
//!    which case the stream ends with an explicit marker)
//! 4. Range-coded payload, starting with a zero pad byte
//!
//! The raw constructors on [`LzmaDecoder`] and [`LzmaEncoder`] skip the
//! header for containers that transport it out of band.
//!
//! A codec instance is single-threaded and not reentrant; it suspends only
//! on reads from its byte source or writes to its sink. Memory use is
//! bounded by the dictionary plus the probability tables.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod decoder;
pub mod dict;
pub mod encoder;
pub mod encoder_dict;
pub mod model;
pub mod range_coder;

// Re-exports
pub use decoder::{LzmaDecoder, decompress, decompress_raw};
pub use dict::DecoderDict;
pub use encoder::{LzmaEncoder, compress, compress_raw, write_header};
pub use encoder_dict::{EncoderDict, HashChain, Matcher};
pub use model::{CodecParams, LzmaModel, LzmaProperties, State};
pub use range_coder::{RangeDecoder, RangeEncoder};

use oxilz_core::error::Result;

/// Hash-chain search depth per compression level.
const CHAIN_DEPTH: [usize; 10] = [
    0,    // Level 0: no search
    4,    // Level 1: very fast
    8,    // Level 2: fast
    16,   // Level 3: fast
    32,   // Level 4: normal
    64,   // Level 5: normal
    128,  // Level 6: normal (default)
    256,  // Level 7: maximum
    512,  // Level 8: maximum
    1024, // Level 9: ultra
];

/// LZMA compression level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LzmaLevel(u8);

impl LzmaLevel {
    /// Fastest compression (level 0).
    pub const FAST: Self = Self(0);
    /// Default compression (level 6).
    pub const DEFAULT: Self = Self(6);
    /// Best compression (level 9).
    pub const BEST: Self = Self(9);

    /// Create a new compression level.
    pub fn new(level: u8) -> Self {
        Self(level.min(9))
    }

    /// Get the level value.
    pub fn level(&self) -> u8 {
        self.0
    }

    /// Get the dictionary size for this level.
    pub fn dict_size(&self) -> u32 {
        match self.0 {
            0 => 1 << 16, // 64 KB
            1 => 1 << 18, // 256 KB
            2 => 1 << 19, // 512 KB
            3 => 1 << 20, // 1 MB
            4 => 1 << 21, // 2 MB
            5 => 1 << 22, // 4 MB
            6 => 1 << 23, // 8 MB
            7 => 1 << 24, // 16 MB
            8 => 1 << 25, // 32 MB
            _ => 1 << 26, // 64 MB
        }
    }

    /// Get the match-finder search depth for this level.
    pub fn match_depth(&self) -> usize {
        CHAIN_DEPTH[self.0 as usize]
    }
}

impl Default for LzmaLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Decompress LZMA data from a slice.
///
/// This is a convenience wrapper around [`decompress`].
pub fn decompress_bytes(data: &[u8]) -> Result<Vec<u8>> {
    use std::io::Cursor;
    decompress(Cursor::new(data))
}

/// Compress data to a Vec using default settings.
///
/// This is a convenience wrapper around [`compress`] with the default level.
pub fn compress_bytes(data: &[u8]) -> Result<Vec<u8>> {
    compress(data, LzmaLevel::DEFAULT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level() {
        assert_eq!(LzmaLevel::FAST.level(), 0);
        assert_eq!(LzmaLevel::DEFAULT.level(), 6);
        assert_eq!(LzmaLevel::BEST.level(), 9);
    }

    #[test]
    fn test_level_clamp() {
        assert_eq!(LzmaLevel::new(100).level(), 9);
    }

    #[test]
    fn test_dict_size() {
        assert_eq!(LzmaLevel::FAST.dict_size(), 1 << 16);
        assert_eq!(LzmaLevel::DEFAULT.dict_size(), 1 << 23);
        assert_eq!(LzmaLevel::BEST.dict_size(), 1 << 26);
    }

    #[test]
    fn test_match_depth() {
        assert_eq!(LzmaLevel::FAST.match_depth(), 0);
        assert_eq!(LzmaLevel::DEFAULT.match_depth(), 128);
        assert_eq!(LzmaLevel::BEST.match_depth(), 1024);
    }

    #[test]
    fn test_properties_roundtrip() {
        let props = LzmaProperties::new(3, 0, 2).unwrap();
        let byte = props.to_byte();
        let decoded = LzmaProperties::from_byte(byte).unwrap();

        assert_eq!(decoded.lc, 3);
        assert_eq!(decoded.lp, 0);
        assert_eq!(decoded.pb, 2);
    }

    #[test]
    fn test_compress_decompress_single_byte() {
        let original = b"A";
        let compressed = compress(original, LzmaLevel::DEFAULT).unwrap();
        let decompressed = decompress_bytes(&compressed).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn test_compress_decompress_zero_byte() {
        let original = [0u8];
        let compressed = compress(&original, LzmaLevel::DEFAULT).unwrap();
        let decompressed = decompress_bytes(&compressed).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn test_compress_decompress_few_bytes() {
        let original = b"ABC";
        let compressed = compress(original, LzmaLevel::DEFAULT).unwrap();
        let decompressed = decompress_bytes(&compressed).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn test_compress_decompress_roundtrip() {
        let original = b"Hello, LZMA World! This is a test of compression and decompression.";
        let compressed = compress(original, LzmaLevel::DEFAULT).unwrap();
        let decompressed = decompress_bytes(&compressed).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn test_compress_decompress_empty() {
        let original: &[u8] = b"";
        let compressed = compress(original, LzmaLevel::DEFAULT).unwrap();
        let decompressed = decompress_bytes(&compressed).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn test_compress_decompress_repeated() {
        let original = vec![b'A'; 1000];
        let compressed = compress(&original, LzmaLevel::DEFAULT).unwrap();
        assert!(compressed.len() < original.len());
        let decompressed = decompress_bytes(&compressed).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn test_compress_levels_roundtrip() {
        let original = b"The quick brown fox jumps over the lazy dog. ".repeat(20);
        for level in 0..=9 {
            let compressed = compress(&original, LzmaLevel::new(level)).unwrap();
            let decompressed = decompress_bytes(&compressed).unwrap();
            assert_eq!(decompressed, original, "level {}", level);
        }
    }
}
