// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! start of authority record defining ownership and defaults for the zone

use std::fmt;

use crate::error::ProtoResult;
use crate::rr::Name;
use crate::serialize::binary::{BinDecodable, BinDecoder, BinEncodable, BinEncoder};

/// [RFC 1035, DOMAIN NAMES - IMPLEMENTATION AND SPECIFICATION, November 1987](https://tools.ietf.org/html/rfc1035)
///
/// ```text
/// 3.3.13. SOA RDATA format
///
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     /                     MNAME                     /
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     /                     RNAME                     /
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    SERIAL                     |
///     |                                               |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    REFRESH                    |
///     |                                               |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                     RETRY                     |
///     |                                               |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    EXPIRE                     |
///     |                                               |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    MINIMUM                    |
///     |                                               |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///
/// SOA records cause no additional section processing.
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct SOA {
    mname: Name,
    rname: Name,
    serial: u32,
    refresh: i32,
    retry: i32,
    expire: i32,
    minimum: u32,
}

impl SOA {
    /// Creates a new SOA record data.
    ///
    /// # Arguments
    ///
    /// * `mname` - the name of the primary or authority for this zone.
    /// * `rname` - the name of the responsible party for this zone, e.g. an email address.
    /// * `serial` - the serial number of the zone, used for caching purposes.
    /// * `refresh` - the amount of time to wait before a zone is resynched.
    /// * `retry` - the minimum period to wait if there is a failure during refresh.
    /// * `expire` - the time until this primary is no longer authoritative for the zone.
    /// * `minimum` - no zone records should be cached longer than this time.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mname: Name,
        rname: Name,
        serial: u32,
        refresh: i32,
        retry: i32,
        expire: i32,
        minimum: u32,
    ) -> Self {
        Self {
            mname,
            rname,
            serial,
            refresh,
            retry,
            expire,
            minimum,
        }
    }

    /// The `<domain-name>` of the name server that was the
    ///  original or primary source of data for this zone.
    pub fn mname(&self) -> &Name {
        &self.mname
    }

    /// A `<domain-name>` which specifies the mailbox of the
    ///  person responsible for this zone.
    pub fn rname(&self) -> &Name {
        &self.rname
    }

    /// The unsigned 32 bit version number of the original copy of the zone.
    pub fn serial(&self) -> u32 {
        self.serial
    }

    /// A 32 bit time interval before the zone should be refreshed.
    pub fn refresh(&self) -> i32 {
        self.refresh
    }

    /// A 32 bit time interval that should elapse before a failed refresh should be retried.
    pub fn retry(&self) -> i32 {
        self.retry
    }

    /// A 32 bit time value that specifies the upper limit on the time
    ///  interval that can elapse before the zone is no longer authoritative.
    pub fn expire(&self) -> i32 {
        self.expire
    }

    /// The unsigned 32 bit minimum TTL field that should be exported with any
    ///  RR from this zone. Negative responses are cached for up to this long,
    ///  per RFC 2308.
    pub fn minimum(&self) -> u32 {
        self.minimum
    }
}

/// Read the RData from the given Decoder
pub fn read(decoder: &mut BinDecoder<'_>) -> ProtoResult<SOA> {
    Ok(SOA {
        mname: Name::read(decoder)?,
        rname: Name::read(decoder)?,
        serial: decoder.read_u32()?,
        refresh: decoder.read_u32()? as i32,
        retry: decoder.read_u32()? as i32,
        expire: decoder.read_u32()? as i32,
        minimum: decoder.read_u32()?,
    })
}

/// Write the RData to the given Encoder
pub fn emit(encoder: &mut BinEncoder<'_>, soa: &SOA) -> ProtoResult<()> {
    soa.mname.emit(encoder)?;
    soa.rname.emit(encoder)?;
    encoder.emit_u32(soa.serial)?;
    encoder.emit_u32(soa.refresh as u32)?;
    encoder.emit_u32(soa.retry as u32)?;
    encoder.emit_u32(soa.expire as u32)?;
    encoder.emit_u32(soa.minimum)?;
    Ok(())
}

impl fmt::Display for SOA {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {}",
            self.mname, self.rname, self.serial, self.refresh, self.retry, self.expire, self.minimum
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let rdata = SOA::new(
            Name::from_ascii("ns1.example.com").unwrap(),
            Name::from_ascii("hostmaster.example.com").unwrap(),
            2024_01_01,
            7200,
            1800,
            1_209_600,
            300,
        );

        let mut bytes = Vec::new();
        let mut encoder = BinEncoder::new(&mut bytes);
        emit(&mut encoder, &rdata).expect("failed to emit");

        let mut decoder = BinDecoder::new(&bytes);
        let read_back = read(&mut decoder).expect("failed to read");
        assert_eq!(read_back, rdata);
    }
}
