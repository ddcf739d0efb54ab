// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! mail exchange, email, record

use std::fmt;

use crate::error::ProtoResult;
use crate::rr::Name;
use crate::serialize::binary::{BinDecodable, BinDecoder, BinEncodable, BinEncoder};

/// [RFC 1035, DOMAIN NAMES - IMPLEMENTATION AND SPECIFICATION, November 1987](https://tools.ietf.org/html/rfc1035)
///
/// ```text
/// 3.3.9. MX RDATA format
///
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                  PREFERENCE                   |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     /                   EXCHANGE                    /
///     /                                               /
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///
/// MX records cause type A additional section processing for the host
/// specified by EXCHANGE.  The use of MX RRs is explained in detail in
/// [RFC-974].
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct MX {
    preference: u16,
    exchange: Name,
}

impl MX {
    /// Constructs a new MX RData
    ///
    /// # Arguments
    ///
    /// * `preference` - weight of this MX record as opposed to others, lower values have the higher preference
    /// * `exchange` - Name labels for the mail server
    pub fn new(preference: u16, exchange: Name) -> Self {
        Self {
            preference,
            exchange,
        }
    }

    /// A 16 bit integer which specifies the preference given to
    ///  this RR among others at the same owner. Lower values are preferred.
    pub fn preference(&self) -> u16 {
        self.preference
    }

    /// A `<domain-name>` which specifies a host willing to act as
    ///  a mail exchange for the owner name.
    pub fn exchange(&self) -> &Name {
        &self.exchange
    }
}

/// Read the RData from the given Decoder
pub fn read(decoder: &mut BinDecoder<'_>) -> ProtoResult<MX> {
    Ok(MX::new(decoder.read_u16()?, Name::read(decoder)?))
}

/// Write the RData to the given Encoder
pub fn emit(encoder: &mut BinEncoder<'_>, mx: &MX) -> ProtoResult<()> {
    encoder.emit_u16(mx.preference())?;
    mx.exchange().emit(encoder)
}

impl fmt::Display for MX {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.preference, self.exchange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let rdata = MX::new(10, Name::from_ascii("mail.example.com").unwrap());

        let mut bytes = Vec::new();
        let mut encoder = BinEncoder::new(&mut bytes);
        emit(&mut encoder, &rdata).expect("failed to emit");

        let mut decoder = BinDecoder::new(&bytes);
        let read_back = read(&mut decoder).expect("failed to read");
        assert_eq!(read_back, rdata);
    }
}
