//! LZMA decompression.
//!
//! The decoder is a pull codec: it implements [`std::io::Read`] and decodes
//! operations into the dictionary only when the consumer asks for bytes. A
//! decoding error poisons the decoder; every later call reports the same
//! error.

use crate::dict::DecoderDict;
use crate::model::{
    CodecParams, DICT_LEN_MIN, DIST_ALIGN_BITS, DIST_SLOT_BITS, DistanceModel, END_POS_MODEL_INDEX,
    EOS_DISTANCE, LEN_HIGH_BITS, LEN_LOW_BITS, LEN_LOW_SYMBOLS, LEN_MID_BITS, LEN_MID_SYMBOLS,
    LengthModel, LzmaModel, LzmaProperties, MATCH_LEN_MAX, MATCH_LEN_MIN, State,
};
use crate::range_coder::RangeDecoder;
use oxilz_core::error::{OxiLzError, Result};
use std::io::{self, Read};

/// Upper bound for decode-ahead inside the dictionary.
const READ_AHEAD_MAX: usize = 1 << 16;

/// Read exactly `buf.len()` bytes, reporting a clean EOF as truncation.
fn read_exact_short<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            OxiLzError::ShortInput
        } else {
            e.into()
        }
    })
}

/// Decode a match length (2..=273).
fn decode_length<R: Read>(
    rc: &mut RangeDecoder<R>,
    len_model: &mut LengthModel,
    pos_state: usize,
) -> Result<usize> {
    if rc.decode_bit(&mut len_model.choice)? == 0 {
        let len = rc.decode_bit_tree(&mut len_model.low[pos_state], LEN_LOW_BITS)?;
        Ok(len as usize + MATCH_LEN_MIN)
    } else if rc.decode_bit(&mut len_model.choice2)? == 0 {
        let len = rc.decode_bit_tree(&mut len_model.mid[pos_state], LEN_MID_BITS)?;
        Ok(len as usize + MATCH_LEN_MIN + LEN_LOW_SYMBOLS)
    } else {
        let len = rc.decode_bit_tree(&mut len_model.high, LEN_HIGH_BITS)?;
        Ok(len as usize + MATCH_LEN_MIN + LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS)
    }
}

/// Decode a coded distance. The actual back-reference distance is one
/// higher; the all-ones value is the end-of-stream marker.
fn decode_distance<R: Read>(
    rc: &mut RangeDecoder<R>,
    dist_model: &mut DistanceModel,
    len: usize,
) -> Result<u32> {
    let len_state = (len - MATCH_LEN_MIN).min(3);

    let slot = rc.decode_bit_tree(&mut dist_model.slot[len_state], DIST_SLOT_BITS)?;
    if slot < 4 {
        return Ok(slot);
    }

    let num_direct = (slot >> 1) - 1;
    let mut dist = (2 | (slot & 1)) << num_direct;

    if slot < END_POS_MODEL_INDEX as u32 {
        // One shared table covers slots 4..14; each slot's reverse tree is
        // rooted at dist_base - slot.
        let base = dist as usize - slot as usize;
        dist += rc.decode_bit_tree_reverse(&mut dist_model.special[base..], num_direct)?;
    } else {
        dist += rc.decode_direct_bits(num_direct - DIST_ALIGN_BITS)? << DIST_ALIGN_BITS;
        dist += rc.decode_bit_tree_reverse(&mut dist_model.align, DIST_ALIGN_BITS)?;
    }

    Ok(dist)
}

/// One decoded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    /// A single decoded byte.
    Literal(u8),
    /// A back-reference; short reps arrive as `len == 1`.
    Match { len: usize, dist: usize },
    /// The explicit end-of-stream marker.
    Eos,
}

/// LZMA decoder over a compressed byte source.
pub struct LzmaDecoder<R: Read> {
    /// Range decoder.
    rc: RangeDecoder<R>,
    /// Probability model.
    model: LzmaModel,
    /// Output window.
    dict: DecoderDict,
    /// State machine register.
    state: State,
    /// The four most recent coded distances.
    rep: [u32; 4],
    /// Declared uncompressed size, if any.
    unpacked_size: Option<u64>,
    /// Decode-ahead target for `fill`.
    read_target: usize,
    /// First fatal error; replayed on every later call.
    fault: Option<OxiLzError>,
}

impl<R: Read> LzmaDecoder<R> {
    /// Create a decoder for a raw stream (no 13-byte header).
    ///
    /// Consumes the five range coder initialisation bytes. Dictionary
    /// lengths below 4 KiB are raised to 4 KiB.
    pub fn new(reader: R, props: LzmaProperties, dict_len: u32, params: CodecParams) -> Result<Self> {
        let props = LzmaProperties::new(props.lc, props.lp, props.pb)?;
        let window = dict_len.max(DICT_LEN_MIN) as usize;
        let dict = DecoderDict::new(window);
        let read_target = (dict.capacity() - MATCH_LEN_MAX).min(READ_AHEAD_MAX);

        Ok(Self {
            rc: RangeDecoder::new(reader)?,
            model: LzmaModel::new(props),
            dict,
            state: State::new(),
            rep: [0; 4],
            unpacked_size: params.unpacked_size,
            read_target,
            fault: None,
        })
    }

    /// Create a decoder from the classic 13-byte stream header.
    pub fn from_header(mut reader: R) -> Result<Self> {
        let mut props_buf = [0u8; 1];
        read_exact_short(&mut reader, &mut props_buf)?;
        let props = LzmaProperties::from_byte(props_buf[0])?;

        let mut dict_buf = [0u8; 4];
        read_exact_short(&mut reader, &mut dict_buf)?;
        let dict_len = u32::from_le_bytes(dict_buf);
        if dict_len < DICT_LEN_MIN {
            return Err(OxiLzError::invalid_properties(format!(
                "dictionary length {} below minimum {}",
                dict_len, DICT_LEN_MIN
            )));
        }

        let mut size_buf = [0u8; 8];
        read_exact_short(&mut reader, &mut size_buf)?;
        let size = u64::from_le_bytes(size_buf);
        let unpacked_size = (size != u64::MAX).then_some(size);

        Self::new(
            reader,
            props,
            dict_len,
            CodecParams {
                unpacked_size,
                eos_marker: unpacked_size.is_none(),
            },
        )
    }

    /// The properties the decoder was constructed with.
    pub fn properties(&self) -> LzmaProperties {
        self.model.props
    }

    /// Declared uncompressed size, if the stream carries one.
    pub fn unpacked_size(&self) -> Option<u64> {
        self.unpacked_size
    }

    /// Decode a literal byte.
    fn decode_literal(&mut self) -> Result<u8> {
        let prev_byte = self.dict.byte_at(1);
        let lit_state = self.model.literal.get_state(
            self.dict.total(),
            prev_byte,
            self.model.props.lc,
            self.model.props.lp,
        );

        if self.state.is_literal() {
            self.decode_literal_normal(lit_state)
        } else {
            let match_byte = self.dict.byte_at(self.rep[0] as usize + 1);
            self.decode_literal_matched(lit_state, match_byte)
        }
    }

    /// Decode a literal without match context.
    fn decode_literal_normal(&mut self, lit_state: usize) -> Result<u8> {
        let mut symbol = 1usize;

        while symbol < 0x100 {
            let bit = self
                .rc
                .decode_bit(&mut self.model.literal.probs[lit_state][symbol])?;
            symbol = (symbol << 1) | bit as usize;
        }

        Ok((symbol - 0x100) as u8)
    }

    /// Decode a literal against the byte at the rep0 distance.
    fn decode_literal_matched(&mut self, lit_state: usize, match_byte: u8) -> Result<u8> {
        let mut symbol = 1usize;
        let mut match_byte = match_byte as usize;

        while symbol < 0x100 {
            let match_bit = (match_byte >> 7) & 1;
            match_byte = (match_byte << 1) & 0xFF;

            let prob_idx = ((1 + match_bit) << 8) + symbol;
            let bit = self
                .rc
                .decode_bit(&mut self.model.literal.probs[lit_state][prob_idx])?;
            symbol = (symbol << 1) | bit as usize;

            if bit as usize != match_bit {
                // Diverged from the match byte; finish on the plain path.
                while symbol < 0x100 {
                    let bit = self
                        .rc
                        .decode_bit(&mut self.model.literal.probs[lit_state][symbol])?;
                    symbol = (symbol << 1) | bit as usize;
                }
                break;
            }
        }

        Ok((symbol - 0x100) as u8)
    }

    /// Decode one operation.
    fn decode_op(&mut self) -> Result<Op> {
        let pos_state = (self.dict.total() & self.model.props.pos_mask()) as usize;
        let state = self.state.value();

        if self
            .rc
            .decode_bit(&mut self.model.is_match[state][pos_state])?
            == 0
        {
            let byte = self.decode_literal()?;
            self.state.update_literal();
            return Ok(Op::Literal(byte));
        }

        if self.rc.decode_bit(&mut self.model.is_rep[state])? == 0 {
            // Simple match: history shifts before the new distance lands in
            // rep0.
            self.rep[3] = self.rep[2];
            self.rep[2] = self.rep[1];
            self.rep[1] = self.rep[0];
            self.state.update_match();

            let len = decode_length(&mut self.rc, &mut self.model.match_len, pos_state)?;
            let dist = decode_distance(&mut self.rc, &mut self.model.distance, len)?;
            self.rep[0] = dist;

            if dist == EOS_DISTANCE {
                if !self.rc.is_finished_ok() {
                    return Err(OxiLzError::WrongTermination);
                }
                return Ok(Op::Eos);
            }

            return Ok(Op::Match {
                len,
                dist: dist as usize + 1,
            });
        }

        let dist = if self.rc.decode_bit(&mut self.model.is_rep0[state])? == 0 {
            if self
                .rc
                .decode_bit(&mut self.model.is_rep0_long[state][pos_state])?
                == 0
            {
                self.state.update_short_rep();
                return Ok(Op::Match {
                    len: 1,
                    dist: self.rep[0] as usize + 1,
                });
            }
            self.rep[0]
        } else if self.rc.decode_bit(&mut self.model.is_rep1[state])? == 0 {
            let d = self.rep[1];
            self.rep[1] = self.rep[0];
            self.rep[0] = d;
            d
        } else if self.rc.decode_bit(&mut self.model.is_rep2[state])? == 0 {
            let d = self.rep[2];
            self.rep[2] = self.rep[1];
            self.rep[1] = self.rep[0];
            self.rep[0] = d;
            d
        } else {
            let d = self.rep[3];
            self.rep[3] = self.rep[2];
            self.rep[2] = self.rep[1];
            self.rep[1] = self.rep[0];
            self.rep[0] = d;
            d
        };

        let len = decode_length(&mut self.rc, &mut self.model.rep_len, pos_state)?;
        self.state.update_long_rep();
        Ok(Op::Match {
            len,
            dist: dist as usize + 1,
        })
    }

    /// Decode operations into the dictionary until the read-ahead target is
    /// met or the stream ends.
    fn fill(&mut self) -> Result<()> {
        if self.dict.is_eof() {
            return Ok(());
        }

        while self.dict.readable() < self.read_target {
            if let Some(declared) = self.unpacked_size {
                if self.dict.total() == declared {
                    self.dict.mark_eof();
                    return Ok(());
                }
            }

            match self.decode_op()? {
                Op::Eos => {
                    if let Some(declared) = self.unpacked_size {
                        if self.dict.total() != declared {
                            return Err(OxiLzError::UnexpectedEos);
                        }
                    }
                    self.dict.mark_eof();
                    return Ok(());
                }
                Op::Literal(byte) => {
                    self.dict.append_literal(byte);
                }
                Op::Match { len, dist } => {
                    if let Some(declared) = self.unpacked_size {
                        if self.dict.total() + len as u64 > declared {
                            return Err(OxiLzError::OverlongStream { declared });
                        }
                    }
                    self.dict.copy_match(len, dist)?;
                }
            }
        }

        Ok(())
    }

    /// Run `fill`, recording the first fatal error and replaying it on
    /// every call after that.
    fn fill_guarded(&mut self) -> Result<()> {
        if let Some(fault) = &self.fault {
            return Err(fault.duplicate());
        }
        match self.fill() {
            Ok(()) => Ok(()),
            Err(e) => {
                let surfaced = e.duplicate();
                self.fault = Some(e);
                Err(surfaced)
            }
        }
    }

    /// Decode the remaining stream into a vector.
    pub fn decompress(mut self) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        let mut chunk = [0u8; 8192];

        loop {
            self.fill_guarded()?;
            while self.dict.readable() > 0 {
                let n = self.dict.read(&mut chunk)?;
                output.extend_from_slice(&chunk[..n]);
            }
            if self.dict.is_eof() {
                return Ok(output);
            }
        }
    }
}

/// Map a codec error onto the `io::Read` surface.
fn into_io_error(e: OxiLzError) -> io::Error {
    match e {
        OxiLzError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::InvalidData, format!("LZMA - {other}")),
    }
}

impl<R: Read> Read for LzmaDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // A poisoned decoder replays its fault and never hands back bytes
        // that were buffered before the error.
        if let Some(fault) = &self.fault {
            return Err(into_io_error(fault.duplicate()));
        }
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if self.dict.readable() > 0 {
                return self.dict.read(buf).map_err(into_io_error);
            }
            if self.dict.is_eof() {
                return Ok(0);
            }
            self.fill_guarded().map_err(into_io_error)?;
        }
    }
}

/// Decompress a classic LZMA stream, header included.
pub fn decompress<R: Read>(reader: R) -> Result<Vec<u8>> {
    LzmaDecoder::from_header(reader)?.decompress()
}

/// Decompress a raw LZMA stream (no header).
pub fn decompress_raw<R: Read>(
    reader: R,
    props: LzmaProperties,
    dict_len: u32,
    params: CodecParams,
) -> Result<Vec<u8>> {
    LzmaDecoder::new(reader, props, dict_len, params)?.decompress()
}
