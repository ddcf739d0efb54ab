// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! record type definitions

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ProtoResult;
use crate::serialize::binary::{BinDecodable, BinDecoder, BinEncodable, BinEncoder};

/// The type of the resource record, defined in RFC 1035 and extensions.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum RecordType {
    /// RFC 1035 IPv4 Address
    A,
    /// RFC 3596 IPv6 Address
    AAAA,
    /// RFC 1035 Canonical name record
    CNAME,
    /// RFC 1035 Mail exchange record
    MX,
    /// RFC 1035 Name server record
    NS,
    /// RFC 1035 Pointer record
    PTR,
    /// RFC 1035 Start of authority record
    SOA,
    /// RFC 2782 Service locator
    SRV,
    /// RFC 1035 Text record
    TXT,
    /// Unknown or unsupported record type
    Unknown(u16),
}

impl RecordType {
    /// Returns true if this is an A or AAAA record, i.e. it carries an address itself
    pub fn is_ip_addr(self) -> bool {
        matches!(self, Self::A | Self::AAAA)
    }

    /// Returns true if answers of this type name other hosts which may need address resolution
    pub fn references_host(self) -> bool {
        matches!(self, Self::CNAME | Self::MX | Self::NS | Self::SRV)
    }
}

impl From<u16> for RecordType {
    /// Convert from `u16` to `RecordType`
    ///
    /// ```
    /// use alder_dns::rr::RecordType;
    ///
    /// let var = RecordType::from(1);
    /// assert_eq!(RecordType::A, var);
    /// ```
    fn from(value: u16) -> Self {
        match value {
            1 => Self::A,
            28 => Self::AAAA,
            5 => Self::CNAME,
            15 => Self::MX,
            2 => Self::NS,
            12 => Self::PTR,
            6 => Self::SOA,
            33 => Self::SRV,
            16 => Self::TXT,
            _ => Self::Unknown(value),
        }
    }
}

impl From<RecordType> for u16 {
    /// Convert from `RecordType` to `u16`
    ///
    /// ```
    /// use alder_dns::rr::RecordType;
    ///
    /// let var: u16 = RecordType::A.into();
    /// assert_eq!(1, var);
    /// ```
    fn from(rt: RecordType) -> Self {
        match rt {
            RecordType::A => 1,
            RecordType::AAAA => 28,
            RecordType::CNAME => 5,
            RecordType::MX => 15,
            RecordType::NS => 2,
            RecordType::PTR => 12,
            RecordType::SOA => 6,
            RecordType::SRV => 33,
            RecordType::TXT => 16,
            RecordType::Unknown(code) => code,
        }
    }
}

impl BinEncodable for RecordType {
    fn emit(&self, encoder: &mut BinEncoder<'_>) -> ProtoResult<()> {
        encoder.emit_u16((*self).into())
    }
}

impl<'r> BinDecodable<'r> for RecordType {
    fn read(decoder: &mut BinDecoder<'r>) -> ProtoResult<Self> {
        decoder.read_u16().map(Self::from)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::AAAA => write!(f, "AAAA"),
            Self::CNAME => write!(f, "CNAME"),
            Self::MX => write!(f, "MX"),
            Self::NS => write!(f, "NS"),
            Self::PTR => write!(f, "PTR"),
            Self::SOA => write!(f, "SOA"),
            Self::SRV => write!(f, "SRV"),
            Self::TXT => write!(f, "TXT"),
            Self::Unknown(code) => write!(f, "TYPE{code}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u16_roundtrip() {
        let types = [
            RecordType::A,
            RecordType::AAAA,
            RecordType::CNAME,
            RecordType::MX,
            RecordType::NS,
            RecordType::PTR,
            RecordType::SOA,
            RecordType::SRV,
            RecordType::TXT,
        ];

        for rt in types {
            assert_eq!(RecordType::from(u16::from(rt)), rt);
        }

        assert_eq!(RecordType::from(41), RecordType::Unknown(41));
        assert_eq!(u16::from(RecordType::Unknown(41)), 41);
    }
}
