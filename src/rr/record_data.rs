// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! record data enum variants

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use enum_as_inner::EnumAsInner;

use crate::error::{ProtoError, ProtoResult};
use crate::rr::rdata::{mx, soa, srv, txt, MX, SOA, SRV, TXT};
use crate::rr::{Name, RecordType};
use crate::serialize::binary::{BinDecodable, BinDecoder, BinEncodable, BinEncoder};

/// Record data as a closed enum over the supported record types.
///
/// Address and single-name payloads are inlined; the structured payloads live
/// in [`crate::rr::rdata`].
#[derive(Debug, EnumAsInner, PartialEq, Eq, Hash, Clone)]
#[non_exhaustive]
pub enum RData {
    /// IPv4 address record
    A(Ipv4Addr),
    /// IPv6 address record
    AAAA(Ipv6Addr),
    /// Canonical name record
    CNAME(Name),
    /// Mail exchange record
    MX(MX),
    /// Name server record
    NS(Name),
    /// Pointer record for reverse lookups
    PTR(Name),
    /// Start of authority record
    SOA(SOA),
    /// Service locator record
    SRV(SRV),
    /// Text record
    TXT(TXT),
}

impl RData {
    /// Returns the type code matching this data
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::A(..) => RecordType::A,
            Self::AAAA(..) => RecordType::AAAA,
            Self::CNAME(..) => RecordType::CNAME,
            Self::MX(..) => RecordType::MX,
            Self::NS(..) => RecordType::NS,
            Self::PTR(..) => RecordType::PTR,
            Self::SOA(..) => RecordType::SOA,
            Self::SRV(..) => RecordType::SRV,
            Self::TXT(..) => RecordType::TXT,
        }
    }

    /// Returns the address for A and AAAA data, None otherwise
    pub fn ip_addr(&self) -> Option<IpAddr> {
        match self {
            Self::A(ip) => Some(IpAddr::V4(*ip)),
            Self::AAAA(ip) => Some(IpAddr::V6(*ip)),
            _ => None,
        }
    }

    /// Returns the host this data refers to, for the types that name one
    ///
    /// These are the targets that may need their own address resolution
    /// before the record is useful to a caller. PTR names a host too, but
    /// the name itself is the answer, so it is not a resolution target.
    pub fn target_name(&self) -> Option<&Name> {
        match self {
            Self::CNAME(name) | Self::NS(name) => Some(name),
            Self::MX(mx) => Some(mx.exchange()),
            Self::SRV(srv) => Some(srv.target()),
            _ => None,
        }
    }

    /// Read the RData from the given decoder.
    ///
    /// The decoder must be positioned at the start of the rdata; exactly
    /// `rdata_length` bytes are consumed, anything else is an error.
    pub fn read(
        decoder: &mut BinDecoder<'_>,
        record_type: RecordType,
        rdata_length: u16,
    ) -> ProtoResult<Self> {
        let start_idx = decoder.index();

        let result = match record_type {
            RecordType::A => {
                let bytes = decoder.read_slice(4)?;
                Self::A(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]))
            }
            RecordType::AAAA => {
                let bytes = decoder.read_slice(16)?;
                let mut octets = [0u8; 16];
                octets.copy_from_slice(bytes);
                Self::AAAA(Ipv6Addr::from(octets))
            }
            RecordType::CNAME => Self::CNAME(Name::read(decoder)?),
            RecordType::MX => Self::MX(mx::read(decoder)?),
            RecordType::NS => Self::NS(Name::read(decoder)?),
            RecordType::PTR => Self::PTR(Name::read(decoder)?),
            RecordType::SOA => Self::SOA(soa::read(decoder)?),
            RecordType::SRV => Self::SRV(srv::read(decoder)?),
            RecordType::TXT => Self::TXT(txt::read(decoder, rdata_length)?),
            RecordType::Unknown(..) => {
                return Err(ProtoError::Form("rdata read called for unknown type"))
            }
        };

        // rdata must consume exactly its declared length
        let read = decoder.index() - start_idx;
        if read != usize::from(rdata_length) {
            return Err(ProtoError::IncorrectRDataLengthRead {
                read,
                len: usize::from(rdata_length),
            });
        }

        Ok(result)
    }

    /// Write the RData to the given encoder, without a length prefix
    pub fn emit(&self, encoder: &mut BinEncoder<'_>) -> ProtoResult<()> {
        match self {
            Self::A(ip) => encoder.emit_vec(&ip.octets()),
            Self::AAAA(ip) => encoder.emit_vec(&ip.octets()),
            Self::CNAME(name) | Self::NS(name) | Self::PTR(name) => name.emit(encoder),
            Self::MX(mx) => mx::emit(encoder, mx),
            Self::SOA(soa) => soa::emit(encoder, soa),
            Self::SRV(srv) => srv::emit(encoder, srv),
            Self::TXT(txt) => txt::emit(encoder, txt),
        }
    }
}

impl fmt::Display for RData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A(ip) => write!(f, "{ip}"),
            Self::AAAA(ip) => write!(f, "{ip}"),
            Self::CNAME(name) | Self::NS(name) | Self::PTR(name) => write!(f, "{name}"),
            Self::MX(mx) => write!(f, "{mx}"),
            Self::SOA(soa) => write!(f, "{soa}"),
            Self::SRV(srv) => write!(f, "{srv}"),
            Self::TXT(txt) => write!(f, "{txt}"),
        }
    }
}
