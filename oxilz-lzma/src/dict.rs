//! Decoder dictionary.
//!
//! The decoder dictionary is the output window of the codec: literals and
//! match copies are appended at the head, back-references address the most
//! recent `dict_len` bytes, and the consumer drains completed bytes through
//! [`DecoderDict::read`].
//!
//! Bytes stay addressable for back-references after they have been read out;
//! reading only moves the delivery position, not the window.

use oxilz_core::error::{OxiLzError, Result};
use oxilz_core::ringbuffer::RingBuffer;

/// Decoder dictionary: a sliding output window with streamed delivery.
#[derive(Debug)]
pub struct DecoderDict {
    /// Backing storage, sized to the next power of two above the window.
    ring: RingBuffer,
    /// Window length; back-references cannot reach further than this.
    window: usize,
    /// Total bytes ever written. Also the position context of the stream.
    total: u64,
    /// Total bytes delivered to the consumer.
    delivered: u64,
    /// Sticky end-of-stream flag.
    eof: bool,
}

impl DecoderDict {
    /// Create a dictionary with the given window length.
    pub fn new(window: usize) -> Self {
        assert!(window > 0, "window must not be empty");
        Self {
            ring: RingBuffer::new(window.next_power_of_two()),
            window,
            total: 0,
            delivered: 0,
            eof: false,
        }
    }

    /// Capacity of the backing buffer.
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Number of history bytes addressable by a back-reference.
    pub fn len(&self) -> usize {
        if self.total < self.window as u64 {
            self.total as usize
        } else {
            self.window
        }
    }

    /// Check whether any history is available.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Total number of bytes written to the dictionary.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Whether the end of the decoded stream has been reached.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Mark the end of the decoded stream.
    pub fn mark_eof(&mut self) {
        self.eof = true;
    }

    /// Return the byte `distance` positions behind the head, or 0 for
    /// positions before the start of the stream.
    pub fn byte_at(&self, distance: usize) -> u8 {
        if distance == 0 || distance > self.len() {
            return 0;
        }
        self.ring.read_at_distance(distance).map_or(0, |b| b)
    }

    /// Append a literal byte.
    pub fn append_literal(&mut self, byte: u8) {
        self.ring.write_byte(byte);
        self.total += 1;
    }

    /// Copy `len` bytes starting `dist` positions behind the head.
    ///
    /// Overlapping copies read bytes written by the copy itself, so
    /// `len > dist` produces a pattern of period `dist`.
    pub fn copy_match(&mut self, len: usize, dist: usize) -> Result<()> {
        if dist == 0 || dist > self.len() {
            return Err(OxiLzError::invalid_distance(dist, self.len()));
        }
        self.ring.copy_from_history(dist, len)?;
        self.total += len as u64;
        Ok(())
    }

    /// Number of decoded bytes not yet delivered to the consumer.
    pub fn readable(&self) -> usize {
        (self.total - self.delivered) as usize
    }

    /// Deliver decoded bytes into `buf`, oldest first.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let pending = self.readable();
        let n = pending.min(buf.len());

        for (i, slot) in buf.iter_mut().enumerate().take(n) {
            *slot = self.ring.read_at_distance(pending - i)?;
        }

        self.delivered += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_append_and_read() {
        let mut dict = DecoderDict::new(64);

        for &b in b"hello" {
            dict.append_literal(b);
        }
        assert_eq!(dict.total(), 5);
        assert_eq!(dict.readable(), 5);

        let mut buf = [0u8; 8];
        let n = dict.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
        assert_eq!(dict.readable(), 0);
    }

    #[test]
    fn test_byte_at_before_start_is_zero() {
        let mut dict = DecoderDict::new(64);
        assert_eq!(dict.byte_at(1), 0);

        dict.append_literal(b'x');
        assert_eq!(dict.byte_at(1), b'x');
        assert_eq!(dict.byte_at(2), 0);
        assert_eq!(dict.byte_at(0), 0);
    }

    #[test]
    fn test_copy_match_overlap() {
        let mut dict = DecoderDict::new(64);
        dict.append_literal(b'a');
        dict.append_literal(b'b');
        dict.copy_match(6, 2).unwrap();

        let mut buf = [0u8; 8];
        let n = dict.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"abababab");
    }

    #[test]
    fn test_copy_match_rle() {
        let mut dict = DecoderDict::new(64);
        dict.append_literal(b'z');
        dict.copy_match(7, 1).unwrap();

        let mut buf = [0u8; 8];
        let n = dict.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"zzzzzzzz");
    }

    #[test]
    fn test_invalid_distance() {
        let mut dict = DecoderDict::new(64);
        dict.append_literal(b'a');

        assert!(matches!(
            dict.copy_match(1, 0),
            Err(OxiLzError::InvalidDistance { .. })
        ));
        assert!(matches!(
            dict.copy_match(1, 2),
            Err(OxiLzError::InvalidDistance { .. })
        ));
    }

    #[test]
    fn test_distance_limited_by_window() {
        // Window of 5 inside an 8-byte ring: bytes older than the window
        // must not be addressable even while still physically present.
        let mut dict = DecoderDict::new(5);
        for &b in b"abcdefg" {
            dict.append_literal(b);
        }

        assert_eq!(dict.len(), 5);
        assert_eq!(dict.byte_at(5), b'c');
        assert_eq!(dict.byte_at(6), 0);
        assert!(dict.copy_match(1, 6).is_err());
    }

    #[test]
    fn test_partial_reads_stay_ordered() {
        let mut dict = DecoderDict::new(64);
        for &b in b"abcdef" {
            dict.append_literal(b);
        }

        let mut buf = [0u8; 2];
        assert_eq!(dict.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"ab");
        assert_eq!(dict.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"cd");

        dict.append_literal(b'g');
        let mut rest = [0u8; 8];
        let n = dict.read(&mut rest).unwrap();
        assert_eq!(&rest[..n], b"efg");
    }

    #[test]
    fn test_eof_is_sticky() {
        let mut dict = DecoderDict::new(64);
        assert!(!dict.is_eof());
        dict.mark_eof();
        assert!(dict.is_eof());
    }
}
