//! LZMA compression.
//!
//! The encoder is a push codec: it implements [`std::io::Write`], buffers
//! input in the encoder dictionary and emits operations while enough
//! lookahead remains. [`LzmaEncoder::finish`] drains the dictionary, writes
//! the end-of-stream marker when requested and flushes the range encoder.
//!
//! Operation selection is greedy: the longest rep match wins near-ties
//! against fresh matches, rep0 is preferred among equals, and short matches
//! at large distances fall back to literals. Any selector producing valid
//! operations yields a conforming stream; this one trades a little ratio for
//! simplicity.

use crate::LzmaLevel;
use crate::encoder_dict::EncoderDict;
use crate::model::{
    CodecParams, DICT_LEN_MIN, DIST_ALIGN_BITS, DIST_ALIGN_SIZE, DIST_SLOT_BITS, DistanceModel,
    END_POS_MODEL_INDEX, EOS_DISTANCE, LEN_HIGH_BITS, LEN_LOW_BITS, LEN_LOW_SYMBOLS, LEN_MID_BITS,
    LEN_MID_SYMBOLS, LengthModel, LzmaModel, LzmaProperties, MATCH_LEN_MAX, MATCH_LEN_MIN, State,
};
use crate::range_coder::RangeEncoder;
use oxilz_core::error::{OxiLzError, Result};
use std::io::{self, Write};

/// Largest distance still worth a length-2 match.
const SHORT_MATCH_DIST_MAX: usize = 128;

/// Encode a match length (2..=273).
fn encode_length<W: Write>(
    rc: &mut RangeEncoder<W>,
    len_model: &mut LengthModel,
    len: usize,
    pos_state: usize,
) -> Result<()> {
    let len = len - MATCH_LEN_MIN;

    if len < LEN_LOW_SYMBOLS {
        rc.encode_bit(&mut len_model.choice, 0)?;
        rc.encode_bit_tree(&mut len_model.low[pos_state], LEN_LOW_BITS, len as u32)?;
    } else if len < LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS {
        rc.encode_bit(&mut len_model.choice, 1)?;
        rc.encode_bit(&mut len_model.choice2, 0)?;
        rc.encode_bit_tree(
            &mut len_model.mid[pos_state],
            LEN_MID_BITS,
            (len - LEN_LOW_SYMBOLS) as u32,
        )?;
    } else {
        rc.encode_bit(&mut len_model.choice, 1)?;
        rc.encode_bit(&mut len_model.choice2, 1)?;
        rc.encode_bit_tree(
            &mut len_model.high,
            LEN_HIGH_BITS,
            (len - LEN_LOW_SYMBOLS - LEN_MID_SYMBOLS) as u32,
        )?;
    }

    Ok(())
}

/// Get the distance slot for a coded distance.
fn get_dist_slot(dist: u32) -> u32 {
    if dist < 4 {
        return dist;
    }

    let bits = 32 - dist.leading_zeros();
    ((bits - 1) << 1) | ((dist >> (bits - 2)) & 1)
}

/// Encode a coded distance (the back-reference distance minus one).
fn encode_distance<W: Write>(
    rc: &mut RangeEncoder<W>,
    dist_model: &mut DistanceModel,
    dist: u32,
    len: usize,
) -> Result<()> {
    let len_state = (len - MATCH_LEN_MIN).min(3);
    let slot = get_dist_slot(dist);

    rc.encode_bit_tree(&mut dist_model.slot[len_state], DIST_SLOT_BITS, slot)?;

    if slot >= 4 {
        let num_direct = (slot >> 1) - 1;
        let base = (2 | (slot & 1)) << num_direct;
        let reduced = dist - base;

        if slot < END_POS_MODEL_INDEX as u32 {
            let offset = base as usize - slot as usize;
            rc.encode_bit_tree_reverse(&mut dist_model.special[offset..], num_direct, reduced)?;
        } else {
            rc.encode_direct_bits(reduced >> DIST_ALIGN_BITS, num_direct - DIST_ALIGN_BITS)?;
            rc.encode_bit_tree_reverse(
                &mut dist_model.align,
                DIST_ALIGN_BITS,
                reduced & (DIST_ALIGN_SIZE as u32 - 1),
            )?;
        }
    }

    Ok(())
}

/// One selected operation, before encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncodeOp {
    /// Emit the byte at the head.
    Literal,
    /// One byte repeated from the rep0 distance.
    ShortRep,
    /// A match against one of the four most recent distances.
    Rep { idx: usize, len: usize },
    /// A match with a fresh distance.
    Match { dist: usize, len: usize },
}

impl EncodeOp {
    fn len(self) -> usize {
        match self {
            EncodeOp::Literal | EncodeOp::ShortRep => 1,
            EncodeOp::Rep { len, .. } | EncodeOp::Match { len, .. } => len,
        }
    }
}

/// LZMA encoder over a compressed byte sink.
pub struct LzmaEncoder<W: Write> {
    /// Range encoder.
    rc: RangeEncoder<W>,
    /// Probability model.
    model: LzmaModel,
    /// Input window and match finder.
    dict: EncoderDict,
    /// State machine register.
    state: State,
    /// The four most recent coded distances.
    rep: [u32; 4],
    /// Codec parameters the stream was opened with.
    params: CodecParams,
}

impl<W: Write> LzmaEncoder<W> {
    /// Create an encoder for a raw stream (no 13-byte header).
    ///
    /// Dictionary lengths below 4 KiB are raised to 4 KiB.
    pub fn new(
        writer: W,
        props: LzmaProperties,
        dict_len: u32,
        params: CodecParams,
        level: LzmaLevel,
    ) -> Result<Self> {
        let props = LzmaProperties::new(props.lc, props.lp, props.pb)?;
        if params.unpacked_size.is_none() && !params.eos_marker {
            return Err(OxiLzError::invalid_properties(
                "a stream of unknown size requires the end-of-stream marker",
            ));
        }
        let dict_cap = dict_len.max(DICT_LEN_MIN) as usize;

        Ok(Self {
            rc: RangeEncoder::new(writer),
            model: LzmaModel::new(props),
            dict: EncoderDict::new(dict_cap, level.match_depth()),
            state: State::new(),
            rep: [0; 4],
            params,
        })
    }

    /// Create an encoder that first writes the classic 13-byte header.
    pub fn with_header(
        mut writer: W,
        props: LzmaProperties,
        dict_len: u32,
        params: CodecParams,
        level: LzmaLevel,
    ) -> Result<Self> {
        let dict_len = dict_len.max(DICT_LEN_MIN);
        write_header(&mut writer, props, dict_len, params)?;
        Self::new(writer, props, dict_len, params, level)
    }

    /// The properties the encoder was constructed with.
    pub fn properties(&self) -> LzmaProperties {
        self.model.props
    }

    /// Number of uncompressed bytes consumed so far.
    pub fn uncompressed_len(&self) -> u64 {
        self.dict.pos()
    }

    /// Buffer input, emitting operations whenever more than a full match of
    /// lookahead is available.
    fn push(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let n = data.len().min(self.dict.available());
            if n == 0 {
                self.process(false)?;
                continue;
            }
            self.dict.write(&data[..n])?;
            data = &data[n..];
            self.process(false)?;
        }
        Ok(())
    }

    /// Emit operations. Unless flushing, a full match length of lookahead is
    /// kept so matches never get cut short at a buffer seam.
    fn process(&mut self, flush: bool) -> Result<()> {
        let keep = if flush { 0 } else { MATCH_LEN_MAX };
        while self.dict.buffered() > keep {
            let op = self.select_op();
            self.encode_op(op)?;
            self.dict.advance(op.len());
        }
        Ok(())
    }

    /// Pick the operation for the current head position.
    fn select_op(&self) -> EncodeOp {
        let mut best_rep_len = 0;
        let mut best_rep_idx = 0;
        for (idx, &rep) in self.rep.iter().enumerate() {
            let len = self.dict.match_len(rep as usize + 1);
            if len > best_rep_len {
                best_rep_len = len;
                best_rep_idx = idx;
            }
        }

        let mut best_len = 0;
        let mut best_dist = 0;
        for dist in self.dict.matches() {
            let len = self.dict.match_len(dist);
            if len > best_len || (len == best_len && dist < best_dist) {
                best_len = len;
                best_dist = dist;
            }
        }

        if best_rep_len >= MATCH_LEN_MIN
            && (best_rep_len >= best_len || (best_rep_len >= 3 && best_rep_idx == 0))
        {
            return EncodeOp::Rep {
                idx: best_rep_idx,
                len: best_rep_len,
            };
        }

        if best_len > MATCH_LEN_MIN
            || (best_len == MATCH_LEN_MIN && best_dist < SHORT_MATCH_DIST_MAX)
        {
            return EncodeOp::Match {
                dist: best_dist,
                len: best_len,
            };
        }

        if self.dict.match_len(self.rep[0] as usize + 1) >= 1 {
            return EncodeOp::ShortRep;
        }

        EncodeOp::Literal
    }

    /// Encode one operation. The dictionary head is advanced by the caller.
    fn encode_op(&mut self, op: EncodeOp) -> Result<()> {
        let pos_state = (self.dict.pos() & self.model.props.pos_mask()) as usize;
        let state = self.state.value();

        match op {
            EncodeOp::Literal => {
                self.rc
                    .encode_bit(&mut self.model.is_match[state][pos_state], 0)?;
                self.encode_literal()?;
                self.state.update_literal();
            }
            EncodeOp::ShortRep => {
                self.rc
                    .encode_bit(&mut self.model.is_match[state][pos_state], 1)?;
                self.rc.encode_bit(&mut self.model.is_rep[state], 1)?;
                self.rc.encode_bit(&mut self.model.is_rep0[state], 0)?;
                self.rc
                    .encode_bit(&mut self.model.is_rep0_long[state][pos_state], 0)?;
                self.state.update_short_rep();
            }
            EncodeOp::Rep { idx, len } => {
                self.rc
                    .encode_bit(&mut self.model.is_match[state][pos_state], 1)?;
                self.rc.encode_bit(&mut self.model.is_rep[state], 1)?;

                if idx == 0 {
                    self.rc.encode_bit(&mut self.model.is_rep0[state], 0)?;
                    self.rc
                        .encode_bit(&mut self.model.is_rep0_long[state][pos_state], 1)?;
                } else {
                    self.rc.encode_bit(&mut self.model.is_rep0[state], 1)?;
                    if idx == 1 {
                        self.rc.encode_bit(&mut self.model.is_rep1[state], 0)?;
                    } else {
                        self.rc.encode_bit(&mut self.model.is_rep1[state], 1)?;
                        self.rc
                            .encode_bit(&mut self.model.is_rep2[state], (idx != 2) as u32)?;
                    }

                    let dist = self.rep[idx];
                    for j in (1..=idx).rev() {
                        self.rep[j] = self.rep[j - 1];
                    }
                    self.rep[0] = dist;
                }

                encode_length(&mut self.rc, &mut self.model.rep_len, len, pos_state)?;
                self.state.update_long_rep();
            }
            EncodeOp::Match { dist, len } => {
                self.rc
                    .encode_bit(&mut self.model.is_match[state][pos_state], 1)?;
                self.rc.encode_bit(&mut self.model.is_rep[state], 0)?;

                let coded = (dist - 1) as u32;
                encode_length(&mut self.rc, &mut self.model.match_len, len, pos_state)?;
                encode_distance(&mut self.rc, &mut self.model.distance, coded, len)?;

                self.rep[3] = self.rep[2];
                self.rep[2] = self.rep[1];
                self.rep[1] = self.rep[0];
                self.rep[0] = coded;
                self.state.update_match();
            }
        }

        Ok(())
    }

    /// Encode the literal at the head.
    fn encode_literal(&mut self) -> Result<()> {
        let byte = self.dict.literal();
        let prev_byte = self.dict.byte_at(1);
        let lit_state = self.model.literal.get_state(
            self.dict.pos(),
            prev_byte,
            self.model.props.lc,
            self.model.props.lp,
        );

        if self.state.is_literal() {
            self.encode_literal_normal(lit_state, byte)
        } else {
            let match_byte = self.dict.byte_at(self.rep[0] as usize + 1);
            self.encode_literal_matched(lit_state, byte, match_byte)
        }
    }

    /// Encode a literal without match context.
    fn encode_literal_normal(&mut self, lit_state: usize, byte: u8) -> Result<()> {
        let mut symbol = (byte as usize) | 0x100;
        let mut context = 1usize;

        while context < 0x100 {
            let bit = (symbol >> 7) & 1;
            symbol <<= 1;

            self.rc.encode_bit(
                &mut self.model.literal.probs[lit_state][context],
                bit as u32,
            )?;
            context = (context << 1) | bit;
        }

        Ok(())
    }

    /// Encode a literal against the byte at the rep0 distance.
    fn encode_literal_matched(&mut self, lit_state: usize, byte: u8, match_byte: u8) -> Result<()> {
        let mut symbol = (byte as usize) | 0x100;
        let mut match_symbol = (match_byte as usize) << 1;
        let mut context = 1usize;

        while context < 0x100 {
            let match_bit = (match_symbol >> 8) & 1;
            match_symbol = (match_symbol << 1) & 0x1FF;

            let bit = (symbol >> 7) & 1;
            symbol <<= 1;

            let prob_idx = ((1 + match_bit) << 8) + context;
            self.rc.encode_bit(
                &mut self.model.literal.probs[lit_state][prob_idx],
                bit as u32,
            )?;
            context = (context << 1) | bit;

            if bit != match_bit {
                // Diverged from the match byte; finish on the plain path.
                while context < 0x100 {
                    let bit = (symbol >> 7) & 1;
                    symbol <<= 1;
                    self.rc.encode_bit(
                        &mut self.model.literal.probs[lit_state][context],
                        bit as u32,
                    )?;
                    context = (context << 1) | bit;
                }
                break;
            }
        }

        Ok(())
    }

    /// Encode the end-of-stream marker: a simple match with the reserved
    /// all-ones distance.
    fn encode_eos(&mut self) -> Result<()> {
        let pos_state = (self.dict.pos() & self.model.props.pos_mask()) as usize;
        let state = self.state.value();

        self.rc
            .encode_bit(&mut self.model.is_match[state][pos_state], 1)?;
        self.rc.encode_bit(&mut self.model.is_rep[state], 0)?;
        encode_length(
            &mut self.rc,
            &mut self.model.match_len,
            MATCH_LEN_MIN,
            pos_state,
        )?;
        encode_distance(
            &mut self.rc,
            &mut self.model.distance,
            EOS_DISTANCE,
            MATCH_LEN_MIN,
        )
    }

    /// Encode everything still buffered, terminate the stream and return the
    /// sink.
    pub fn finish(mut self) -> Result<W> {
        self.process(true)?;

        if let Some(declared) = self.params.unpacked_size {
            let written = self.dict.pos();
            if written != declared {
                return Err(OxiLzError::DeclaredSizeMismatch { declared, written });
            }
        }

        if self.params.eos_marker {
            self.encode_eos()?;
        }

        self.rc.finish()
    }
}

impl<W: Write> io::Write for LzmaEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.push(buf).map_err(|e| match e {
            OxiLzError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
        })?;
        Ok(buf.len())
    }

    /// Compressed bytes only become final on [`LzmaEncoder::finish`];
    /// flushing is a no-op.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Write the classic 13-byte stream header.
pub fn write_header<W: Write>(
    writer: &mut W,
    props: LzmaProperties,
    dict_len: u32,
    params: CodecParams,
) -> Result<()> {
    let props = LzmaProperties::new(props.lc, props.lp, props.pb)?;
    writer.write_all(&[props.to_byte()])?;
    writer.write_all(&dict_len.to_le_bytes())?;
    writer.write_all(&params.unpacked_size.unwrap_or(u64::MAX).to_le_bytes())?;
    Ok(())
}

/// Pick a dictionary length for a one-shot buffer: big enough to cover the
/// input, capped by the level's dictionary size.
fn one_shot_dict_len(data_len: usize, level: LzmaLevel) -> u32 {
    data_len
        .max(1)
        .next_power_of_two()
        .min(level.dict_size() as usize)
        .max(DICT_LEN_MIN as usize) as u32
}

/// Compress data into a classic LZMA stream, header included.
pub fn compress(data: &[u8], level: LzmaLevel) -> Result<Vec<u8>> {
    let props = LzmaProperties::default();
    let dict_len = one_shot_dict_len(data.len(), level);
    let params = CodecParams::with_size(data.len() as u64);

    let mut encoder = LzmaEncoder::with_header(Vec::new(), props, dict_len, params, level)?;
    encoder.push(data)?;
    encoder.finish()
}

/// Compress data into a raw LZMA stream (no header).
pub fn compress_raw(
    data: &[u8],
    props: LzmaProperties,
    dict_len: u32,
    params: CodecParams,
    level: LzmaLevel,
) -> Result<Vec<u8>> {
    let mut encoder = LzmaEncoder::new(Vec::new(), props, dict_len, params, level)?;
    encoder.push(data)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decompress_raw;
    use std::io::Cursor;

    #[test]
    fn test_dist_slot() {
        assert_eq!(get_dist_slot(0), 0);
        assert_eq!(get_dist_slot(1), 1);
        assert_eq!(get_dist_slot(2), 2);
        assert_eq!(get_dist_slot(3), 3);
        assert_eq!(get_dist_slot(4), 4);
        assert_eq!(get_dist_slot(5), 4);
        assert_eq!(get_dist_slot(6), 5);
        assert_eq!(get_dist_slot(96), 13);
        assert_eq!(get_dist_slot(EOS_DISTANCE), 63);
    }

    #[test]
    fn test_empty_stream_with_marker() {
        let params = CodecParams::default();
        let props = LzmaProperties::default();

        let encoded =
            compress_raw(b"", props, 4096, params, LzmaLevel::DEFAULT).unwrap();
        // Marker plus range coder flush only.
        assert!(encoded.len() <= 16);

        let decoded = decompress_raw(Cursor::new(encoded), props, 4096, params).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_raw_roundtrip_literals_and_matches() {
        let params = CodecParams::default();
        let props = LzmaProperties::default();
        let data = b"abcabcabcabc, and then abcabcabcabc again";

        let encoded = compress_raw(data, props, 4096, params, LzmaLevel::DEFAULT).unwrap();
        let decoded = decompress_raw(Cursor::new(encoded), props, 4096, params).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_raw_roundtrip_rep_runs() {
        let params = CodecParams::default();
        let props = LzmaProperties::default();
        let data = vec![b'a'; 500];

        let encoded = compress_raw(&data, props, 4096, params, LzmaLevel::DEFAULT).unwrap();
        assert!(encoded.len() < data.len() / 4);

        let decoded = decompress_raw(Cursor::new(encoded), props, 4096, params).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_unknown_size_requires_marker() {
        let params = CodecParams {
            unpacked_size: None,
            eos_marker: false,
        };
        assert!(matches!(
            LzmaEncoder::new(
                Vec::new(),
                LzmaProperties::default(),
                4096,
                params,
                LzmaLevel::DEFAULT
            ),
            Err(OxiLzError::InvalidProperties { .. })
        ));
    }

    #[test]
    fn test_declared_size_mismatch() {
        let props = LzmaProperties::default();
        let params = CodecParams::with_size(5);

        let mut encoder =
            LzmaEncoder::new(Vec::new(), props, 4096, params, LzmaLevel::DEFAULT).unwrap();
        encoder.push(b"abc").unwrap();

        assert!(matches!(
            encoder.finish(),
            Err(OxiLzError::DeclaredSizeMismatch {
                declared: 5,
                written: 3
            })
        ));
    }

    #[test]
    fn test_header_layout() {
        let mut header = Vec::new();
        write_header(
            &mut header,
            LzmaProperties::default(),
            1 << 16,
            CodecParams::with_size(42),
        )
        .unwrap();

        assert_eq!(header.len(), 13);
        assert_eq!(header[0], 0x5D);
        assert_eq!(&header[1..5], &(1u32 << 16).to_le_bytes());
        assert_eq!(&header[5..13], &42u64.to_le_bytes());
    }
}
