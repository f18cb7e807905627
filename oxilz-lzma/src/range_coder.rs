//! Range coder for LZMA compression.
//!
//! The range coder is an entropy coding method similar to arithmetic coding.
//! LZMA uses a specific variant with:
//! - 32-bit range tracking
//! - Normalization when the range drops below 2^24
//! - 11-bit adaptive probability model (1024 = 50%)
//!
//! The decoder renormalises after every decoded bit, so between operations
//! the full coder state has been pulled in from the input. That makes the
//! end-of-stream predicate a plain `code == 0` check.

use oxilz_core::error::{OxiLzError, Result};
use std::io::{Read, Write};

/// Number of bits in the probability model.
pub const PROB_BITS: u32 = 11;

/// Initial probability (50%).
pub const PROB_INIT: u16 = 1 << (PROB_BITS - 1);

/// Maximum probability value.
pub const PROB_MAX: u16 = 1 << PROB_BITS;

/// Number of bits to shift for probability adaptation.
pub const MOVE_BITS: u32 = 5;

/// Top value for range normalization.
const TOP_VALUE: u32 = 1 << 24;

/// Read one byte, mapping a clean EOF to a truncated-stream error.
fn next_byte<R: Read>(reader: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    match reader.read_exact(&mut buf) {
        Ok(()) => Ok(buf[0]),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(OxiLzError::ShortInput),
        Err(e) => Err(e.into()),
    }
}

/// Range decoder for LZMA decompression.
#[derive(Debug)]
pub struct RangeDecoder<R: Read> {
    reader: R,
    range: u32,
    code: u32,
}

impl<R: Read> RangeDecoder<R> {
    /// Create a new range decoder.
    ///
    /// Consumes the five initialisation bytes: one zero pad byte followed by
    /// the big-endian seed of the code register.
    pub fn new(mut reader: R) -> Result<Self> {
        let pad = next_byte(&mut reader)?;
        if pad != 0x00 {
            return Err(OxiLzError::invalid_header(
                "range coder payload must start with a zero byte",
            ));
        }

        let mut code = 0u32;
        for _ in 0..4 {
            code = (code << 8) | next_byte(&mut reader)? as u32;
        }

        Ok(Self {
            reader,
            range: 0xFFFF_FFFF,
            code,
        })
    }

    /// Refill the range after a decode step.
    fn normalize(&mut self) -> Result<()> {
        if self.range < TOP_VALUE {
            let byte = next_byte(&mut self.reader)?;
            self.range <<= 8;
            self.code = (self.code << 8) | byte as u32;
        }
        Ok(())
    }

    /// Decode a single bit with the given adaptive probability.
    pub fn decode_bit(&mut self, prob: &mut u16) -> Result<u32> {
        let bound = (self.range >> PROB_BITS) * (*prob as u32);

        let bit = if self.code < bound {
            self.range = bound;
            *prob += (PROB_MAX - *prob) >> MOVE_BITS;
            0
        } else {
            self.range -= bound;
            self.code -= bound;
            *prob -= *prob >> MOVE_BITS;
            1
        };

        self.normalize()?;
        Ok(bit)
    }

    /// Decode a bit with fixed 50% probability.
    pub fn decode_direct_bit(&mut self) -> Result<u32> {
        self.range >>= 1;
        self.code = self.code.wrapping_sub(self.range);

        let bit = if (self.code as i32) < 0 {
            self.code = self.code.wrapping_add(self.range);
            0
        } else {
            1
        };

        self.normalize()?;
        Ok(bit)
    }

    /// Decode multiple bits with fixed probability, most significant first.
    pub fn decode_direct_bits(&mut self, count: u32) -> Result<u32> {
        let mut result = 0u32;
        for _ in 0..count {
            result = (result << 1) | self.decode_direct_bit()?;
        }
        Ok(result)
    }

    /// Decode a bit tree (normal order).
    pub fn decode_bit_tree(&mut self, probs: &mut [u16], num_bits: u32) -> Result<u32> {
        let mut index = 1usize;

        for _ in 0..num_bits {
            let bit = self.decode_bit(&mut probs[index])?;
            index = (index << 1) | bit as usize;
        }

        Ok((index as u32) - (1 << num_bits))
    }

    /// Decode a bit tree (reverse order).
    pub fn decode_bit_tree_reverse(&mut self, probs: &mut [u16], num_bits: u32) -> Result<u32> {
        let mut result = 0u32;
        let mut index = 1usize;

        for i in 0..num_bits {
            let bit = self.decode_bit(&mut probs[index])?;
            index = (index << 1) | bit as usize;
            result |= bit << i;
        }

        Ok(result)
    }

    /// Check whether the coder could be at the end of a properly terminated
    /// stream. Valid only directly after decoding an end-of-stream marker.
    pub fn is_finished_ok(&self) -> bool {
        self.code == 0
    }
}

/// Range encoder for LZMA compression.
#[derive(Debug)]
pub struct RangeEncoder<W: Write> {
    /// Compressed output sink.
    writer: W,
    /// Current range.
    range: u32,
    /// Low value. Bits 32..40 hold a pending carry.
    low: u64,
    /// Cache byte awaiting carry resolution.
    cache: u8,
    /// Number of pending bytes (the cache plus a run of 0xFF).
    cache_size: u64,
}

impl<W: Write> RangeEncoder<W> {
    /// Create a new range encoder writing to `writer`.
    ///
    /// The leading zero pad byte of the payload is produced by the cache
    /// mechanism on the first byte shifted out.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            range: 0xFFFF_FFFF,
            low: 0,
            cache: 0,
            cache_size: 1,
        }
    }

    /// Shift the top byte out of `low`, resolving carry propagation.
    ///
    /// A pending byte and a run length are buffered until a byte other than
    /// 0xFF is produced; an incoming carry then increments the whole run.
    fn shift_low(&mut self) -> Result<()> {
        if self.low < 0xFF00_0000 || self.low > 0xFFFF_FFFF {
            let mut tmp = self.cache;
            let carry = (self.low >> 32) as u8;

            loop {
                self.writer.write_all(&[tmp.wrapping_add(carry)])?;
                tmp = 0xFF;
                self.cache_size -= 1;
                if self.cache_size == 0 {
                    break;
                }
            }

            self.cache = (self.low >> 24) as u8;
        }

        self.cache_size += 1;
        self.low = (self.low << 8) & 0xFFFF_FFFF;
        Ok(())
    }

    /// Normalize the range.
    fn normalize(&mut self) -> Result<()> {
        if self.range < TOP_VALUE {
            self.range <<= 8;
            self.shift_low()?;
        }
        Ok(())
    }

    /// Encode a single bit with the given adaptive probability.
    pub fn encode_bit(&mut self, prob: &mut u16, bit: u32) -> Result<()> {
        let bound = (self.range >> PROB_BITS) * (*prob as u32);

        if bit == 0 {
            self.range = bound;
            *prob += (PROB_MAX - *prob) >> MOVE_BITS;
        } else {
            self.low += bound as u64;
            self.range -= bound;
            *prob -= *prob >> MOVE_BITS;
        }

        self.normalize()
    }

    /// Encode a bit with fixed 50% probability.
    pub fn encode_direct_bit(&mut self, bit: u32) -> Result<()> {
        self.range >>= 1;
        if bit != 0 {
            self.low += self.range as u64;
        }
        self.normalize()
    }

    /// Encode multiple bits with fixed probability, most significant first.
    pub fn encode_direct_bits(&mut self, value: u32, count: u32) -> Result<()> {
        for i in (0..count).rev() {
            self.encode_direct_bit((value >> i) & 1)?;
        }
        Ok(())
    }

    /// Encode a bit tree (normal order).
    pub fn encode_bit_tree(&mut self, probs: &mut [u16], num_bits: u32, value: u32) -> Result<()> {
        let mut index = 1usize;

        for i in (0..num_bits).rev() {
            let bit = (value >> i) & 1;
            self.encode_bit(&mut probs[index], bit)?;
            index = (index << 1) | bit as usize;
        }

        Ok(())
    }

    /// Encode a bit tree (reverse order).
    pub fn encode_bit_tree_reverse(
        &mut self,
        probs: &mut [u16],
        num_bits: u32,
        value: u32,
    ) -> Result<()> {
        let mut index = 1usize;

        for i in 0..num_bits {
            let bit = (value >> i) & 1;
            self.encode_bit(&mut probs[index], bit)?;
            index = (index << 1) | bit as usize;
        }

        Ok(())
    }

    /// Flush the remaining coder state and return the sink.
    pub fn finish(mut self) -> Result<W> {
        for _ in 0..5 {
            self.shift_low()?;
        }
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_prob_constants() {
        assert_eq!(PROB_INIT, 1024);
        assert_eq!(PROB_MAX, 2048);
    }

    #[test]
    fn test_encoder_emits_zero_pad() {
        let encoder = RangeEncoder::new(Vec::new());
        let out = encoder.finish().unwrap();
        assert_eq!(out[0], 0x00);
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn test_rejects_nonzero_pad() {
        let data = vec![0x01, 0x00, 0x00, 0x00, 0x00];
        assert!(matches!(
            RangeDecoder::new(Cursor::new(data)),
            Err(OxiLzError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn test_truncated_init_is_short_input() {
        let data = vec![0x00, 0x00];
        assert!(matches!(
            RangeDecoder::new(Cursor::new(data)),
            Err(OxiLzError::ShortInput)
        ));
    }

    #[test]
    fn test_encode_decode_bits() {
        let mut encoder = RangeEncoder::new(Vec::new());
        let mut prob = PROB_INIT;

        let bits = [0, 1, 0, 1, 1, 1, 0, 0, 1, 0];
        for &bit in &bits {
            encoder.encode_bit(&mut prob, bit).unwrap();
        }
        let encoded = encoder.finish().unwrap();

        let mut decoder = RangeDecoder::new(Cursor::new(encoded)).unwrap();
        let mut prob = PROB_INIT;

        for &bit in &bits {
            assert_eq!(decoder.decode_bit(&mut prob).unwrap(), bit);
        }
    }

    #[test]
    fn test_encode_decode_direct_bits() {
        let mut encoder = RangeEncoder::new(Vec::new());
        encoder.encode_direct_bits(0x2A5, 10).unwrap();
        encoder.encode_direct_bits(0x3, 2).unwrap();
        let encoded = encoder.finish().unwrap();

        let mut decoder = RangeDecoder::new(Cursor::new(encoded)).unwrap();
        assert_eq!(decoder.decode_direct_bits(10).unwrap(), 0x2A5);
        assert_eq!(decoder.decode_direct_bits(2).unwrap(), 0x3);
    }

    #[test]
    fn test_encode_decode_bit_trees() {
        let mut probs = [PROB_INIT; 64];
        let mut rev_probs = [PROB_INIT; 16];

        let mut encoder = RangeEncoder::new(Vec::new());
        encoder.encode_bit_tree(&mut probs, 6, 47).unwrap();
        encoder.encode_bit_tree_reverse(&mut rev_probs, 4, 0xB).unwrap();
        encoder.encode_bit_tree(&mut probs, 6, 47).unwrap();
        let encoded = encoder.finish().unwrap();

        let mut probs = [PROB_INIT; 64];
        let mut rev_probs = [PROB_INIT; 16];
        let mut decoder = RangeDecoder::new(Cursor::new(encoded)).unwrap();
        assert_eq!(decoder.decode_bit_tree(&mut probs, 6).unwrap(), 47);
        assert_eq!(
            decoder.decode_bit_tree_reverse(&mut rev_probs, 4).unwrap(),
            0xB
        );
        assert_eq!(decoder.decode_bit_tree(&mut probs, 6).unwrap(), 47);
    }

    #[test]
    fn test_adaptation_moves_probability() {
        let mut encoder = RangeEncoder::new(Vec::new());
        let mut prob = PROB_INIT;
        for _ in 0..20 {
            encoder.encode_bit(&mut prob, 0).unwrap();
        }
        assert!(prob > PROB_INIT);

        let mut prob = PROB_INIT;
        for _ in 0..20 {
            encoder.encode_bit(&mut prob, 1).unwrap();
        }
        assert!(prob < PROB_INIT);
        encoder.finish().unwrap();
    }
}
