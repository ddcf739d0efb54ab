// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! class of DNS operations, in general always IN for internet

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ProtoResult;
use crate::serialize::binary::{BinDecodable, BinDecoder, BinEncodable, BinEncoder};

/// The DNS record class. Only the Internet class is resolved; anything else
///  is carried as a number and ignored by the query engine.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DnsClass {
    /// Internet
    IN,
    /// Any other class
    Unknown(u16),
}

impl From<u16> for DnsClass {
    fn from(value: u16) -> Self {
        match value {
            1 => Self::IN,
            _ => Self::Unknown(value),
        }
    }
}

impl From<DnsClass> for u16 {
    fn from(class: DnsClass) -> Self {
        match class {
            DnsClass::IN => 1,
            DnsClass::Unknown(code) => code,
        }
    }
}

impl BinEncodable for DnsClass {
    fn emit(&self, encoder: &mut BinEncoder<'_>) -> ProtoResult<()> {
        encoder.emit_u16((*self).into())
    }
}

impl<'r> BinDecodable<'r> for DnsClass {
    fn read(decoder: &mut BinDecoder<'r>) -> ProtoResult<Self> {
        decoder.read_u16().map(Self::from)
    }
}

impl fmt::Display for DnsClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IN => write!(f, "IN"),
            Self::Unknown(code) => write!(f, "CLASS{code}"),
        }
    }
}
