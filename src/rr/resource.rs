// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! resource record implementation

use std::fmt;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use crate::error::ProtoResult;
use crate::rr::{DnsClass, Name, RData, RecordType};
use crate::serialize::binary::{BinDecodable, BinDecoder, BinEncodable, BinEncoder};

/// A resource record carried in the answer, authority or additional section.
///
/// ```text
/// 4.1.3. Resource record format
///
///                                     1  1  1  1  1  1
///       0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                                               |
///     /                                               /
///     /                      NAME                     /
///     |                                               |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                      TYPE                     |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                     CLASS                     |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                      TTL                      |
///     |                                               |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                   RDLENGTH                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--|
///     /                     RDATA                     /
///     /                                               /
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// ```
///
/// The wire TTL is converted to an absolute expiry instant at decode time, so
/// staleness anywhere downstream is a single comparison against `now`. For
/// record types that name another host (NS, MX, SRV, CNAME) the resolved
/// address of that host, once known, is carried alongside in `target_ip`.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    name_labels: Name,
    dns_class: DnsClass,
    expires: Instant,
    target_ip: Option<IpAddr>,
    rdata: RData,
}

impl Record {
    /// Creates a record from its parts, with the expiry already absolute
    pub fn from_rdata(name: Name, expires: Instant, rdata: RData) -> Self {
        Self {
            name_labels: name,
            dns_class: DnsClass::IN,
            expires,
            target_ip: None,
            rdata,
        }
    }

    /// Returns the owner name of the record
    pub fn name(&self) -> &Name {
        &self.name_labels
    }

    /// Returns the type of the record data
    pub fn record_type(&self) -> RecordType {
        self.rdata.record_type()
    }

    /// Returns the class, always IN for records the engine keeps
    pub fn dns_class(&self) -> DnsClass {
        self.dns_class
    }

    /// Returns the instant past which this record must not be used
    pub fn expires(&self) -> Instant {
        self.expires
    }

    /// Clamps the expiry to at most `latest`
    pub fn clamp_expiry(&mut self, latest: Instant) {
        if self.expires > latest {
            self.expires = latest;
        }
    }

    /// Returns true if the record has not expired as of `now`
    pub fn is_current(&self, now: Instant) -> bool {
        now < self.expires
    }

    /// Returns the record data
    pub fn data(&self) -> &RData {
        &self.rdata
    }

    /// Returns the resolved address of the host the data names, if known
    pub fn target_ip(&self) -> Option<IpAddr> {
        self.target_ip
    }

    /// Stores the resolved address of the host the data names
    pub fn set_target_ip(&mut self, ip: Option<IpAddr>) {
        self.target_ip = ip;
    }

    /// The address this record yields: the embedded address for A and AAAA
    ///  data, the resolved target address for the host-naming types
    pub fn ip(&self) -> Option<IpAddr> {
        self.rdata.ip_addr().or(self.target_ip)
    }

    /// The host this record refers to, for data types that name one
    pub fn target_name(&self) -> Option<&Name> {
        self.rdata.target_name()
    }

    /// Returns true when the data names a host whose address is not yet known
    ///  from either the record itself or an attached target address
    pub fn needs_address(&self) -> bool {
        self.target_name().is_some() && self.ip().is_none()
    }

    /// Reads one record off the decoder.
    ///
    /// Records of unknown type or of a class other than IN are consumed
    /// structurally and reported as `None`. TTLs below `ttl_floor` are raised
    /// to the floor before the absolute expiry is computed from `now`.
    pub fn read(
        decoder: &mut BinDecoder<'_>,
        now: Instant,
        ttl_floor: Duration,
    ) -> ProtoResult<Option<Self>> {
        let name = Name::read(decoder)?;
        let record_type = RecordType::from(decoder.read_u16()?);
        let dns_class = DnsClass::from(decoder.read_u16()?);
        let ttl = decoder.read_u32()?;
        let rdata_length = decoder.read_u16()?;

        if matches!(record_type, RecordType::Unknown(..)) || dns_class != DnsClass::IN {
            // structurally skip what we will not interpret
            decoder.read_slice(usize::from(rdata_length))?;
            return Ok(None);
        }

        let rdata = RData::read(decoder, record_type, rdata_length)?;
        let ttl = Duration::from_secs(u64::from(ttl)).max(ttl_floor);

        Ok(Some(Self {
            name_labels: name,
            dns_class,
            expires: now + ttl,
            target_ip: None,
            rdata,
        }))
    }

    /// Steps over one record without decoding its rdata.
    ///
    /// The name is still walked label by label so that compression pointers
    /// stay bounds checked; everything after it is fixed-size plus RDLENGTH.
    pub fn skip(decoder: &mut BinDecoder<'_>) -> ProtoResult<()> {
        let _name = Name::read(decoder)?;
        let _type = decoder.read_u16()?;
        let _class = decoder.read_u16()?;
        let _ttl = decoder.read_u32()?;
        let rdata_length = decoder.read_u16()?;
        decoder.read_slice(usize::from(rdata_length))?;
        Ok(())
    }

    /// Writes the record, deriving the wire TTL from the expiry and `now`
    ///
    /// An already expired record is written with a TTL of zero.
    pub fn emit(&self, encoder: &mut BinEncoder<'_>, now: Instant) -> ProtoResult<()> {
        self.name_labels.emit(encoder)?;
        encoder.emit_u16(self.record_type().into())?;
        encoder.emit_u16(self.dns_class.into())?;

        let ttl = self
            .expires
            .saturating_duration_since(now)
            .as_secs()
            .min(u64::from(u32::MAX)) as u32;
        encoder.emit_u32(ttl)?;

        let rdata_length = encoder.place_u16()?;
        self.rdata.emit(encoder)?;
        let len = encoder.len_since(&rdata_length);
        encoder.emit_u16_at(rdata_length, len as u16);
        Ok(())
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.name_labels,
            self.dns_class,
            self.record_type(),
            self.rdata
        )?;
        if let Some(ip) = self.target_ip {
            write!(f, " [{ip}]")?;
        }
        Ok(())
    }
}
