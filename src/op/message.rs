// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Basic protocol message for DNS

use std::fmt;
use std::time::{Duration, Instant};

use crate::error::ProtoResult;
use crate::op::{Header, Query, ResponseCode};
use crate::rr::Record;
use crate::serialize::binary::{BinDecodable, BinDecoder, BinEncodable, BinEncoder};

/// The sections of a message that carry records
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Section {
    /// Records answering the question
    Answer,
    /// Records pointing toward an authority, e.g. a referral's NS set
    Authority,
    /// Records related to the answer, e.g. addresses for names the answer mentions
    Additional,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Answer => write!(f, "answer"),
            Self::Authority => write!(f, "authority"),
            Self::Additional => write!(f, "additional"),
        }
    }
}

/// Directs [`scan`] after each visited element
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScanControl {
    /// Keep going
    Continue,
    /// Step structurally over the rest of the current section, then continue
    ///  with the next one. Used to cut off a section once enough records have
    ///  been taken from it.
    SkipSection,
    /// Stop scanning entirely; the rest of the message is not decoded
    Abort,
}

/// A visitor over the elements of a message, in wire order.
///
/// Parsing a message this way lets the caller take what it wants and step
/// over the rest without materializing sections it will not use.
pub trait MessageVisitor {
    /// Called once with the decoded header, before anything else
    fn header(&mut self, _header: &Header) -> ScanControl {
        ScanControl::Continue
    }

    /// Called for each entry of the question section
    fn query(&mut self, _index: u16, _total: u16, _query: &Query) -> ScanControl {
        ScanControl::Continue
    }

    /// Called for each record of the answer, authority and additional
    ///  sections. Records of unknown type or class are never surfaced; they
    ///  are consumed structurally.
    fn record(&mut self, _section: Section, _record: Record) -> ScanControl {
        ScanControl::Continue
    }
}

/// Scans a raw message, driving the visitor.
///
/// Record TTLs are converted to absolute expiries against `now`, raised to
/// `ttl_floor` first. Returns the header on success, whether or not the
/// visitor aborted early; structural faults in the portions actually decoded
/// are errors.
pub fn scan<V: MessageVisitor>(
    bytes: &[u8],
    now: Instant,
    ttl_floor: Duration,
    visitor: &mut V,
) -> ProtoResult<Header> {
    let mut decoder = BinDecoder::new(bytes);
    let header = Header::read(&mut decoder)?;

    let mut control = visitor.header(&header);
    if control == ScanControl::Abort {
        return Ok(header);
    }

    let query_count = header.query_count();
    for index in 0..query_count {
        let query = Query::read(&mut decoder)?;
        if control == ScanControl::SkipSection {
            continue;
        }
        match visitor.query(index, query_count, &query) {
            ScanControl::Continue => {}
            ScanControl::SkipSection => control = ScanControl::SkipSection,
            ScanControl::Abort => return Ok(header),
        }
    }

    let sections = [
        (Section::Answer, header.answer_count()),
        (Section::Authority, header.name_server_count()),
        (Section::Additional, header.additional_count()),
    ];

    for (section, count) in sections {
        let mut skip_rest = false;
        for _ in 0..count {
            if skip_rest {
                Record::skip(&mut decoder)?;
                continue;
            }
            let Some(record) = Record::read(&mut decoder, now, ttl_floor)? else {
                continue;
            };
            match visitor.record(section, record) {
                ScanControl::Continue => {}
                ScanControl::SkipSection => skip_rest = true,
                ScanControl::Abort => return Ok(header),
            }
        }
    }

    Ok(header)
}

/// A DNS message: header plus the question, answer, authority and additional
///  sections.
///
/// Outbound queries and test responses are built through this type; inbound
/// packets are normally consumed through [`scan`] instead, which avoids
/// materializing sections the engine will step over.
#[derive(Clone, Debug)]
pub struct Message {
    header: Header,
    queries: Vec<Query>,
    answers: Vec<Record>,
    name_servers: Vec<Record>,
    additionals: Vec<Record>,
}

impl Message {
    /// Creates a query message asking the single question
    pub fn query(id: u16, query: Query, recursion_desired: bool) -> Self {
        let mut message = Self {
            header: Header::query(id, recursion_desired),
            queries: Vec::with_capacity(1),
            answers: Vec::new(),
            name_servers: Vec::new(),
            additionals: Vec::new(),
        };
        message.queries.push(query);
        message
    }

    /// Creates an empty response message, mostly useful for building test
    ///  and tool traffic
    pub fn response(id: u16, code: ResponseCode) -> Self {
        Self {
            header: Header::response(id, code),
            queries: Vec::new(),
            answers: Vec::new(),
            name_servers: Vec::new(),
            additionals: Vec::new(),
        }
    }

    /// Returns the header
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Returns a mutable reference to the header
    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    /// Adds a question to the message
    pub fn add_query(&mut self, query: Query) -> &mut Self {
        self.queries.push(query);
        self
    }

    /// Adds a record to the answer section
    pub fn add_answer(&mut self, record: Record) -> &mut Self {
        self.answers.push(record);
        self
    }

    /// Adds a record to the authority section
    pub fn add_name_server(&mut self, record: Record) -> &mut Self {
        self.name_servers.push(record);
        self
    }

    /// Adds a record to the additional section
    pub fn add_additional(&mut self, record: Record) -> &mut Self {
        self.additionals.push(record);
        self
    }

    /// Returns the question section
    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    /// Returns the answer section
    pub fn answers(&self) -> &[Record] {
        &self.answers
    }

    /// Returns the authority section
    pub fn name_servers(&self) -> &[Record] {
        &self.name_servers
    }

    /// Returns the additional section
    pub fn additionals(&self) -> &[Record] {
        &self.additionals
    }

    /// Emits the message. Section counts are derived from the sections
    ///  themselves; record TTLs are derived from their expiry against `now`.
    pub fn emit(&self, encoder: &mut BinEncoder<'_>, now: Instant) -> ProtoResult<()> {
        let mut header = self.header;
        header.set_counts(
            self.queries.len() as u16,
            self.answers.len() as u16,
            self.name_servers.len() as u16,
            self.additionals.len() as u16,
        );
        header.emit(encoder)?;

        for query in &self.queries {
            query.emit(encoder)?;
        }
        for record in self
            .answers
            .iter()
            .chain(self.name_servers.iter())
            .chain(self.additionals.iter())
        {
            record.emit(encoder, now)?;
        }
        Ok(())
    }

    /// Emits the message into a fresh buffer
    pub fn to_vec(&self, now: Instant) -> ProtoResult<Vec<u8>> {
        let mut bytes = Vec::with_capacity(512);
        let mut encoder = BinEncoder::new(&mut bytes);
        self.emit(&mut encoder, now)?;
        Ok(bytes)
    }

    /// Parses a whole message, materializing every known-typed record
    pub fn read(bytes: &[u8], now: Instant, ttl_floor: Duration) -> ProtoResult<Self> {
        struct Collect {
            queries: Vec<Query>,
            answers: Vec<Record>,
            name_servers: Vec<Record>,
            additionals: Vec<Record>,
        }

        impl MessageVisitor for Collect {
            fn query(&mut self, _index: u16, _total: u16, query: &Query) -> ScanControl {
                self.queries.push(query.clone());
                ScanControl::Continue
            }

            fn record(&mut self, section: Section, record: Record) -> ScanControl {
                match section {
                    Section::Answer => self.answers.push(record),
                    Section::Authority => self.name_servers.push(record),
                    Section::Additional => self.additionals.push(record),
                }
                ScanControl::Continue
            }
        }

        let mut collect = Collect {
            queries: Vec::new(),
            answers: Vec::new(),
            name_servers: Vec::new(),
            additionals: Vec::new(),
        };
        let header = scan(bytes, now, ttl_floor, &mut collect)?;

        Ok(Self {
            header,
            queries: collect.queries,
            answers: collect.answers,
            name_servers: collect.name_servers,
            additionals: collect.additionals,
        })
    }
}
