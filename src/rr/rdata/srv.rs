// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! service records for identify port mapping for specific services on a host

use std::fmt;

use crate::error::ProtoResult;
use crate::rr::Name;
use crate::serialize::binary::{BinDecodable, BinDecoder, BinEncodable, BinEncoder};

/// [RFC 2782, DNS SRV RR, February 2000](https://tools.ietf.org/html/rfc2782)
///
/// ```text
/// The format of the SRV RR
///
///  _Service._Proto.Name TTL Class SRV Priority Weight Port Target
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct SRV {
    priority: u16,
    weight: u16,
    port: u16,
    target: Name,
}

impl SRV {
    /// Creates a new SRV record data.
    ///
    /// # Arguments
    ///
    /// * `priority` - lower values mean higher priority.
    /// * `weight` - relative weight for entries of the same priority, higher is more likely.
    /// * `port` - the port on the target host of the service.
    /// * `target` - the host serving the service.
    pub fn new(priority: u16, weight: u16, port: u16, target: Name) -> Self {
        Self {
            priority,
            weight,
            port,
            target,
        }
    }

    /// The priority of this target host. A client MUST attempt to
    ///  contact the target host with the lowest-numbered priority it can reach.
    pub fn priority(&self) -> u16 {
        self.priority
    }

    /// A server selection mechanism among entries of equal priority;
    ///  larger weights SHOULD be given a proportionately higher probability
    ///  of being selected.
    pub fn weight(&self) -> u16 {
        self.weight
    }

    /// The port on this target host of this service.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The domain name of the target host, which MUST NOT be an alias.
    pub fn target(&self) -> &Name {
        &self.target
    }
}

/// Read the RData from the given Decoder
pub fn read(decoder: &mut BinDecoder<'_>) -> ProtoResult<SRV> {
    Ok(SRV::new(
        decoder.read_u16()?,
        decoder.read_u16()?,
        decoder.read_u16()?,
        Name::read(decoder)?,
    ))
}

/// Write the RData to the given Encoder
pub fn emit(encoder: &mut BinEncoder<'_>, srv: &SRV) -> ProtoResult<()> {
    encoder.emit_u16(srv.priority())?;
    encoder.emit_u16(srv.weight())?;
    encoder.emit_u16(srv.port())?;
    srv.target().emit(encoder)
}

impl fmt::Display for SRV {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.priority, self.weight, self.port, self.target
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let rdata = SRV::new(10, 60, 5060, Name::from_ascii("sip.example.com").unwrap());

        let mut bytes = Vec::new();
        let mut encoder = BinEncoder::new(&mut bytes);
        emit(&mut encoder, &rdata).expect("failed to emit");

        let mut decoder = BinDecoder::new(&bytes);
        let read_back = read(&mut decoder).expect("failed to read");
        assert_eq!(read_back, rdata);
    }
}
