// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::error::{ProtoError, ProtoResult};

/// Encode DNS messages and resource record types.
pub struct BinEncoder<'a> {
    offset: usize,
    buffer: &'a mut Vec<u8>,
    /// start of label pointers with their labels in fully decompressed form for easy comparison
    name_pointers: Vec<(usize, Vec<u8>)>,
    max_size: usize,
}

impl<'a> BinEncoder<'a> {
    /// Create a new encoder with the Vec to fill
    pub fn new(buf: &'a mut Vec<u8>) -> Self {
        if buf.capacity() < 512 {
            let reserve = 512 - buf.capacity();
            buf.reserve(reserve);
        }

        BinEncoder {
            offset: 0,
            buffer: buf,
            name_pointers: Vec::new(),
            max_size: usize::from(u16::MAX),
        }
    }

    /// Sets the maximum size of the buffer
    ///
    /// DNS message lengths are variously bounded: 512 bytes for classic UDP,
    ///  u16::MAX as the absolute limit of the TCP length prefix.
    pub fn set_max_size(&mut self, max: u16) {
        self.max_size = usize::from(max);
    }

    /// Returns the current offset into the buffer
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Sets the current offset into the buffer, to be used with `trim`
    pub fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    /// Returns the current length of the buffer
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if nothing has been written yet
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Trims the buffer down to the current offset
    ///
    /// Any stored label pointers at or beyond the new end are dropped with it.
    pub fn trim(&mut self) {
        let offset = self.offset;
        self.buffer.truncate(offset);
        self.name_pointers.retain(|&(start, _)| start < offset);
    }

    /// Returns a slice of the buffer, the slice must already have been written
    pub fn slice_of(&self, start: usize, end: usize) -> &[u8] {
        debug_assert!(start <= end);
        debug_assert!(end <= self.buffer.len());
        &self.buffer[start..end]
    }

    /// Stores a label pointer to an already written label
    ///
    /// The location is the current position in the buffer
    ///  implicitly, it is expected that the name will be written to the stream after the current index.
    pub fn store_label_pointer(&mut self, start: usize, end: usize) {
        debug_assert!(start <= end);
        // pointers are 14 bits, anything written past that boundary can never be referenced
        if start < 0x3FFF_usize {
            self.name_pointers
                .push((start, self.slice_of(start, end).to_vec()));
        }
    }

    /// Looks up the index of an already written label
    pub fn get_label_pointer(&self, start: usize, end: usize) -> Option<u16> {
        let search = self.slice_of(start, end);

        for (match_start, matcher) in &self.name_pointers {
            if matcher.as_slice() == search {
                debug_assert!(*match_start <= usize::from(u16::MAX));
                return Some(*match_start as u16);
            }
        }

        None
    }

    fn write_slice(&mut self, data: &[u8]) -> ProtoResult<()> {
        if self.offset + data.len() > self.max_size {
            return Err(ProtoError::MaxBufferSizeExceeded(self.max_size));
        }

        debug_assert_eq!(self.offset, self.buffer.len());
        self.buffer.extend_from_slice(data);
        self.offset += data.len();
        Ok(())
    }

    /// Emit one byte into the buffer
    pub fn emit(&mut self, b: u8) -> ProtoResult<()> {
        self.write_slice(&[b])
    }

    /// Writes a u8 to the buffer, equivalent to `Self::emit()`
    pub fn emit_u8(&mut self, data: u8) -> ProtoResult<()> {
        self.emit(data)
    }

    /// Writes a u16 in network byte order to the buffer
    pub fn emit_u16(&mut self, data: u16) -> ProtoResult<()> {
        self.write_slice(&data.to_be_bytes())
    }

    /// Writes a u32 in network byte order to the buffer
    pub fn emit_u32(&mut self, data: u32) -> ProtoResult<()> {
        self.write_slice(&data.to_be_bytes())
    }

    /// Writes a slice of bytes to the buffer
    pub fn emit_vec(&mut self, data: &[u8]) -> ProtoResult<()> {
        self.write_slice(data)
    }

    /// Emit the length-prefixed character-data field, per RFC 1035 section 3.3
    pub fn emit_character_data<S: AsRef<[u8]>>(&mut self, char_data: S) -> ProtoResult<()> {
        let char_bytes = char_data.as_ref();
        if char_bytes.len() > 255 {
            return Err(ProtoError::Form("character data length exceeds 255"));
        }

        self.emit(char_bytes.len() as u8)?;
        self.write_slice(char_bytes)
    }

    /// Reserves a two byte space for a field to be filled in later, e.g. the
    ///  RDLENGTH of a record, which is only known after the rdata is written
    pub fn place_u16(&mut self) -> ProtoResult<Place> {
        let index = self.offset;
        self.emit_u16(0)?;
        Ok(Place { index })
    }

    /// Fills a previously reserved two byte space
    pub fn emit_u16_at(&mut self, place: Place, data: u16) {
        self.buffer[place.index..place.index + 2].copy_from_slice(&data.to_be_bytes());
    }

    /// Returns the number of bytes written since the place was reserved,
    ///  not counting the two reserved bytes themselves
    pub fn len_since(&self, place: &Place) -> usize {
        self.offset - place.index - 2
    }
}

/// A reserved position in the buffer, to be filled via `emit_u16_at`
#[must_use]
pub struct Place {
    index: usize,
}
