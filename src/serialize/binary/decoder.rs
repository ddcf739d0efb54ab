// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::error::{ProtoError, ProtoResult};

/// This is non-destructive to the inner buffer, b/c for pointer types we need to perform a reverse
///  seek to lookup names.
///
/// All read operations are bounds checked against the remaining slice; a read past the end
///  returns `ProtoError::InsufficientBytes` rather than panicking.
pub struct BinDecoder<'a> {
    buffer: &'a [u8],    // The entire original buffer
    remaining: &'a [u8], // The unread section of the original buffer
}

impl<'a> BinDecoder<'a> {
    /// Creates a new decoder over the byte slice
    ///
    /// # Arguments
    ///
    /// * `buffer` - buffer from which all data will be read
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            remaining: buffer,
        }
    }

    /// Pop one byte from the buffer
    pub fn pop(&mut self) -> ProtoResult<u8> {
        if let Some((first, remaining)) = self.remaining.split_first() {
            self.remaining = remaining;
            return Ok(*first);
        }
        Err(ProtoError::InsufficientBytes)
    }

    /// Returns the number of bytes in the buffer which are still available to read
    pub fn len(&self) -> usize {
        self.remaining.len()
    }

    /// Returns `true` if the buffer is fully consumed
    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Peed one byte forward, without moving the current index forward
    pub fn peek(&self) -> Option<u8> {
        self.remaining.first().copied()
    }

    /// Returns the current index in the buffer
    pub fn index(&self) -> usize {
        self.buffer.len() - self.remaining.len()
    }

    /// This is a pretty efficient clone, as the buffer is never cloned, and only the index is set
    ///  to the value passed in
    pub fn clone(&self, index_at: u16) -> Self {
        let index_at = usize::from(index_at).min(self.buffer.len());
        Self {
            buffer: self.buffer,
            remaining: &self.buffer[index_at..],
        }
    }

    /// Reads a slice of bytes off the buffer
    ///
    /// # Arguments
    ///
    /// * `len` - number of bytes to read from the buffer
    pub fn read_slice(&mut self, len: usize) -> ProtoResult<&'a [u8]> {
        if len > self.remaining.len() {
            return Err(ProtoError::InsufficientBytes);
        }
        let (read, remaining) = self.remaining.split_at(len);
        self.remaining = remaining;
        Ok(read)
    }

    /// Reads a byte from the buffer, equivalent to `Self::pop()`
    pub fn read_u8(&mut self) -> ProtoResult<u8> {
        self.pop()
    }

    /// Reads the next 2 bytes into u16
    ///
    /// This performs a byte-by-byte manipulation, there
    ///  which means endianness is implicitly handled (i.e. no network to little endian (intel), issues)
    pub fn read_u16(&mut self) -> ProtoResult<u16> {
        let b = self.read_slice(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Reads the next four bytes into u32
    ///
    /// This performs a byte-by-byte manipulation, there
    ///  which means endianness is implicitly handled (i.e. no network to little endian (intel), issues)
    pub fn read_u32(&mut self) -> ProtoResult<u32> {
        let b = self.read_slice(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a character-data field: a single length octet followed by that
    ///  number of bytes, per RFC 1035 section 3.3
    pub fn read_character_data(&mut self) -> ProtoResult<&'a [u8]> {
        let length = self.pop()?;
        self.read_slice(usize::from(length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_slice() {
        let deadbeef = b"deadbeef";
        let mut decoder = BinDecoder::new(deadbeef);

        let read = decoder.read_slice(4).expect("failed to read dead");
        assert_eq!(read, b"dead");

        let read = decoder.read_slice(2).expect("failed to read be");
        assert_eq!(read, b"be");

        let read = decoder.read_slice(0).expect("failed to read nothing");
        assert_eq!(read, b"");

        // this should fail
        assert!(decoder.read_slice(3).is_err());
    }

    #[test]
    fn test_read_past_end() {
        let mut decoder = BinDecoder::new(&[0, 1]);
        assert_eq!(decoder.read_u16().unwrap(), 1);
        assert_eq!(decoder.read_u16(), Err(ProtoError::InsufficientBytes));
        assert_eq!(decoder.pop(), Err(ProtoError::InsufficientBytes));
    }

    #[test]
    fn test_clone_resets_index() {
        let bytes = [0u8, 1, 2, 3, 4, 5];
        let mut decoder = BinDecoder::new(&bytes);
        decoder.read_slice(4).expect("failed to skip ahead");
        assert_eq!(decoder.index(), 4);

        let mut jumped = decoder.clone(1);
        assert_eq!(jumped.index(), 1);
        assert_eq!(jumped.pop().unwrap(), 1);

        // the original is unaffected by reads on the clone
        assert_eq!(decoder.index(), 4);
    }

    #[test]
    fn test_read_character_data() {
        let mut decoder = BinDecoder::new(&[3, b'a', b'b', b'c']);
        assert_eq!(decoder.read_character_data().unwrap(), b"abc");
        assert!(decoder.is_empty());

        // declared length runs past the buffer
        let mut decoder = BinDecoder::new(&[4, b'a', b'b', b'c']);
        assert_eq!(
            decoder.read_character_data(),
            Err(ProtoError::InsufficientBytes)
        );
    }
}
