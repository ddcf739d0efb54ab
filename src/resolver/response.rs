// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Scanning a server response into the pieces the engine acts on.

use std::time::{Duration, Instant};

use crate::error::ProtoResult;
use crate::op::{scan, Header, MessageType, MessageVisitor, Query, ResponseCode, ScanControl, Section};
use crate::rr::{Name, Record, RecordType};

/// The usable pieces of a validated response.
#[derive(Debug)]
pub(crate) struct ScanOutcome {
    pub(crate) header: Header,
    /// Records answering the question: the queried type plus the CNAME
    ///  chain that led to them, in wire order
    pub(crate) answers: Vec<Record>,
    /// NS records from the authority section that do not answer the
    ///  question; with no answers these are a referral
    pub(crate) authority_ns: Vec<Record>,
    /// First SOA from the authority section, for negative TTL derivation
    pub(crate) soa: Option<Record>,
    /// Address records from the additional section, candidate glue
    pub(crate) additionals: Vec<Record>,
}

/// Whether a response counts as an answer to our question at all.
#[derive(Debug)]
pub(crate) enum ScanVerdict {
    /// The response echoes the question; act on it
    Valid(ScanOutcome),
    /// Not ours, or not even a response; drop it without prejudice
    Mismatch(&'static str),
}

/// Scans a response against the question it should echo.
///
/// Accumulation of question-type records stops at `quorum` when one is set;
/// the remainder of the answer section is stepped over structurally. A
/// structural fault anywhere decoded is a `ProtoError`.
pub(crate) fn scan_response(
    payload: &[u8],
    question: &Query,
    quorum: Option<usize>,
    now: Instant,
    ttl_floor: Duration,
) -> ProtoResult<ScanVerdict> {
    let mut visitor = ResponseScan {
        question,
        quorum,
        rcode: ResponseCode::NoError,
        question_ok: false,
        mismatch: None,
        taken: 0,
        chain: vec![question.name().clone()],
        answers: Vec::new(),
        authority_ns: Vec::new(),
        soa: None,
        additionals: Vec::new(),
    };
    let header = scan(payload, now, ttl_floor, &mut visitor)?;

    if let Some(reason) = visitor.mismatch {
        return Ok(ScanVerdict::Mismatch(reason));
    }
    if !visitor.question_ok {
        return Ok(ScanVerdict::Mismatch("missing question"));
    }

    Ok(ScanVerdict::Valid(ScanOutcome {
        header,
        answers: visitor.answers,
        authority_ns: visitor.authority_ns,
        soa: visitor.soa,
        additionals: visitor.additionals,
    }))
}

struct ResponseScan<'q> {
    question: &'q Query,
    quorum: Option<usize>,
    rcode: ResponseCode,
    question_ok: bool,
    mismatch: Option<&'static str>,
    /// question-type records taken so far, for the quorum cap
    taken: usize,
    /// names whose records answer the question: the queried name plus every
    ///  CNAME target seen so far
    chain: Vec<Name>,
    answers: Vec<Record>,
    authority_ns: Vec<Record>,
    soa: Option<Record>,
    additionals: Vec<Record>,
}

impl ResponseScan<'_> {
    fn at_quorum(&self) -> bool {
        self.quorum.is_some_and(|cap| self.taken >= cap)
    }

    fn take_answer(&mut self, record: Record) -> ScanControl {
        if self.at_quorum() {
            return ScanControl::SkipSection;
        }
        self.taken += 1;
        self.answers.push(record);
        if self.at_quorum() {
            return ScanControl::SkipSection;
        }
        ScanControl::Continue
    }
}

impl MessageVisitor for ResponseScan<'_> {
    fn header(&mut self, header: &Header) -> ScanControl {
        if header.message_type() != MessageType::Response {
            self.mismatch = Some("not a response");
            return ScanControl::Abort;
        }
        self.rcode = header.response_code();
        ScanControl::Continue
    }

    fn query(&mut self, _index: u16, total: u16, query: &Query) -> ScanControl {
        if total != 1 {
            self.mismatch = Some("question count");
            return ScanControl::Abort;
        }
        if !query.matches(self.question) {
            self.mismatch = Some("question mismatch");
            return ScanControl::Abort;
        }
        self.question_ok = true;
        // only NoError and NXDomain bodies are worth scanning; any other
        // code settles the exchange from the header alone
        if !matches!(self.rcode, ResponseCode::NoError | ResponseCode::NXDomain) {
            return ScanControl::Abort;
        }
        ScanControl::Continue
    }

    fn record(&mut self, section: Section, record: Record) -> ScanControl {
        if self.rcode == ResponseCode::NXDomain {
            // nothing but the SOA matters on NXDomain
            if section == Section::Authority && record.record_type() == RecordType::SOA {
                self.soa.get_or_insert(record);
            }
            return ScanControl::Continue;
        }

        match section {
            Section::Answer => {
                let rtype = record.record_type();
                if !self.chain.contains(record.name()) {
                    return ScanControl::Continue;
                }
                if rtype == self.question.query_type() {
                    return self.take_answer(record);
                }
                if rtype == RecordType::CNAME {
                    if let Some(target) = record.target_name() {
                        self.chain.push(target.clone());
                    }
                    self.answers.push(record);
                }
                ScanControl::Continue
            }
            Section::Authority => match record.record_type() {
                RecordType::NS => {
                    // an NS query may be answered out of the authority section
                    if self.question.query_type() == RecordType::NS
                        && *record.name() == *self.question.name()
                    {
                        return self.take_answer(record);
                    }
                    self.authority_ns.push(record);
                    ScanControl::Continue
                }
                RecordType::SOA => {
                    self.soa.get_or_insert(record);
                    ScanControl::Continue
                }
                _ => ScanControl::Continue,
            },
            Section::Additional => {
                if record.data().ip_addr().is_some() {
                    self.additionals.push(record);
                }
                ScanControl::Continue
            }
        }
    }
}
