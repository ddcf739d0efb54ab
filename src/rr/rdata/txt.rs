// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! text records for storing arbitrary data

use std::fmt;

use crate::error::{ProtoError, ProtoResult};
use crate::serialize::binary::{BinDecoder, BinEncoder};

/// [RFC 1035, DOMAIN NAMES - IMPLEMENTATION AND SPECIFICATION, November 1987](https://tools.ietf.org/html/rfc1035)
///
/// ```text
/// 3.3.14. TXT RDATA format
///
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     /                   TXT-DATA                    /
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///
/// TXT RRs are used to hold descriptive text. The semantics of the text
/// depends on the domain where it is found.
/// ```
///
/// The data is kept as raw byte strings; no character set is assumed.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct TXT {
    txt_data: Box<[Box<[u8]>]>,
}

impl TXT {
    /// Creates a new TXT record data from string slices
    pub fn new(txt_data: Vec<String>) -> Self {
        Self {
            txt_data: txt_data
                .into_iter()
                .map(|s| s.into_bytes().into_boxed_slice())
                .collect::<Vec<_>>()
                .into_boxed_slice(),
        }
    }

    /// Creates a new TXT record data from byte strings
    pub fn from_bytes(txt_data: Vec<&[u8]>) -> Self {
        Self {
            txt_data: txt_data
                .into_iter()
                .map(|s| s.to_vec().into_boxed_slice())
                .collect::<Vec<_>>()
                .into_boxed_slice(),
        }
    }

    /// Returns the raw character strings of this TXT record
    pub fn txt_data(&self) -> &[Box<[u8]>] {
        &self.txt_data
    }

    /// Returns an iterator over the character strings
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.txt_data.iter().map(|d| d.as_ref())
    }
}

/// Read the RData from the given Decoder
///
/// TXT rdata has no count of its own; character strings are read until the
///  declared rdata length is consumed.
pub fn read(decoder: &mut BinDecoder<'_>, rdata_length: u16) -> ProtoResult<TXT> {
    let end = decoder
        .index()
        .checked_add(usize::from(rdata_length))
        .ok_or(ProtoError::InsufficientBytes)?;

    let mut strings = Vec::with_capacity(1);
    while decoder.index() < end {
        let string = decoder.read_character_data()?;
        if decoder.index() > end {
            return Err(ProtoError::Form("txt character string crosses rdata end"));
        }
        strings.push(string.to_vec().into_boxed_slice());
    }

    Ok(TXT {
        txt_data: strings.into_boxed_slice(),
    })
}

/// Write the RData to the given Encoder
pub fn emit(encoder: &mut BinEncoder<'_>, txt: &TXT) -> ProtoResult<()> {
    for string in txt.txt_data() {
        encoder.emit_character_data(string)?;
    }
    Ok(())
}

impl fmt::Display for TXT {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for string in self.txt_data() {
            write!(f, "\"{}\" ", String::from_utf8_lossy(string))?;
        }
        Ok(())
    }
}
