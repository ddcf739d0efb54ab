// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Lookup result types: what a caller asks for and what it gets back.

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use crate::rr::{Name, Record, RecordType};

/// The terminal status of a lookup.
///
/// Every request is answered with exactly one of these; `Ok` is the only one
/// accompanied by records.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResolveStatus {
    /// The lookup succeeded
    Ok,
    /// The name does not exist, or has no data of the requested type.
    ///  Cached negatively.
    NoDomain,
    /// The name failed syntax validation; nothing was sent on the wire
    BadName,
    /// A server responded with something unusable: a refusal, a failure
    ///  code, or a structurally invalid message
    BadResponse,
    /// No server answered within the retry budget
    Timeout,
    /// An internal failure, e.g. the transport could not be used
    Error,
    /// The lookup could not proceed because it would wait on itself
    Deadlock,
    /// The resolver was stopped before the lookup completed
    Shutdown,
}

impl ResolveStatus {
    /// True only for `Ok`
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

impl fmt::Display for ResolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // variant names are the status names
        fmt::Debug::fmt(self, f)
    }
}

/// What a lookup is keyed by: a name for forward lookups, an address for
///  reverse (PTR) lookups.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum QueryTarget {
    /// A domain name
    Name(Name),
    /// An address, resolved through its reverse-lookup name
    Addr(IpAddr),
}

impl fmt::Display for QueryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{name}"),
            Self::Addr(addr) => write!(f, "{addr}"),
        }
    }
}

/// The identity of a lookup: type plus target.
///
/// One key type serves as the cache index, the de-duplication index for
/// in-flight requests, and the identity core of a query handle.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct QueryKey {
    /// The record type being resolved
    pub rtype: RecordType,
    /// The name or address being resolved
    pub target: QueryTarget,
}

impl QueryKey {
    /// A forward lookup key
    pub fn name(rtype: RecordType, name: Name) -> Self {
        Self {
            rtype,
            target: QueryTarget::Name(name),
        }
    }

    /// A reverse lookup key, always type PTR
    pub fn addr(addr: IpAddr) -> Self {
        Self {
            rtype: RecordType::PTR,
            target: QueryTarget::Addr(addr),
        }
    }

    /// The name to put in the question section: the target name itself, or
    ///  the reverse-lookup name derived from the address
    pub fn question_name(&self) -> Name {
        match &self.target {
            QueryTarget::Name(name) => name.clone(),
            QueryTarget::Addr(addr) => Name::from(*addr),
        }
    }

    /// The target as a name, None for reverse lookups
    pub fn target_name(&self) -> Option<&Name> {
        match &self.target {
            QueryTarget::Name(name) => Some(name),
            QueryTarget::Addr(_) => None,
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.rtype, self.target)
    }
}

/// Per-request options, all default off.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LookupOptions {
    /// Answer from cache only; a miss is NoDomain, nothing goes on the wire
    pub no_query: bool,
    /// Validate the name and stop: an Ok answer with no records, or BadName
    pub syntax_only: bool,
    /// Reject single-label names as BadName
    pub must_have_dots: bool,
    /// Do not short-circuit names that parse as IP address literals
    pub no_dotted_ip: bool,
}

impl LookupOptions {
    /// Cache-only lookups, e.g. for diagnostics
    pub fn cache_only() -> Self {
        Self {
            no_query: true,
            ..Self::default()
        }
    }
}

/// The outcome of a lookup delivered to a caller.
///
/// A non-`Ok` status carries no records. `Ok` carries at least one, with one
/// exception: a syntax-only lookup answers `Ok` with none.
#[derive(Clone, Debug)]
pub struct Answer {
    status: ResolveStatus,
    key: QueryKey,
    records: Vec<Record>,
    server: Option<IpAddr>,
    negative_ttl: Option<Duration>,
}

impl Answer {
    /// An `Ok` answer carrying records
    pub fn positive(key: QueryKey, records: Vec<Record>, server: Option<IpAddr>) -> Self {
        Self {
            status: ResolveStatus::Ok,
            key,
            records,
            server,
            negative_ttl: None,
        }
    }

    /// A recordless answer with the given status
    pub fn negative(key: QueryKey, status: ResolveStatus, server: Option<IpAddr>) -> Self {
        Self {
            status,
            key,
            records: Vec::new(),
            server,
            negative_ttl: None,
        }
    }

    /// The recordless `Ok` of a syntax-only lookup
    pub fn validated(key: QueryKey) -> Self {
        Self {
            status: ResolveStatus::Ok,
            key,
            records: Vec::new(),
            server: None,
            negative_ttl: None,
        }
    }

    /// The terminal status
    pub fn status(&self) -> ResolveStatus {
        self.status
    }

    /// True if the lookup succeeded
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    /// The key that was resolved
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// The records of an `Ok` answer, in use-ready order
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// The address of the server that supplied the answer, when one did
    pub fn server(&self) -> Option<IpAddr> {
        self.server
    }

    /// The first usable address in the answer
    pub fn ip(&self) -> Option<IpAddr> {
        self.records.iter().find_map(Record::ip)
    }

    /// Iterates all usable addresses in the answer
    pub fn iter_ips(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.records.iter().filter_map(Record::ip)
    }

    /// How long a NoDomain result may be cached, when the authority said so
    pub fn negative_ttl(&self) -> Option<Duration> {
        self.negative_ttl
    }

    /// Attaches an authority-provided negative TTL
    pub fn set_negative_ttl(&mut self, ttl: Option<Duration>) {
        self.negative_ttl = ttl;
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}", self.key, self.status)?;
        if let Some(server) = self.server {
            write!(f, " (from {server})")?;
        }
        for record in &self.records {
            write!(f, "\n  {record}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rr::RData;
    use std::net::Ipv4Addr;
    use std::time::Instant;

    #[test]
    fn test_key_identity() {
        use std::collections::HashSet;

        let a = QueryKey::name(RecordType::A, Name::from_ascii("Example.COM").unwrap());
        let b = QueryKey::name(RecordType::A, Name::from_ascii("example.com").unwrap());
        let c = QueryKey::name(RecordType::AAAA, Name::from_ascii("example.com").unwrap());

        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&b), "keys must fold case");
        assert!(!set.contains(&c), "type is part of the identity");

        let v4 = QueryKey::addr(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)));
        assert_eq!(v4.rtype, RecordType::PTR);
        assert_eq!(
            v4.question_name().to_string(),
            "1.2.0.192.in-addr.arpa"
        );
        assert_ne!(a, v4);
    }

    #[test]
    fn test_answer_ips() {
        let now = Instant::now();
        let key = QueryKey::name(RecordType::A, Name::from_ascii("example.com").unwrap());
        let records = vec![Record::from_rdata(
            Name::from_ascii("example.com").unwrap(),
            now + Duration::from_secs(60),
            RData::A(Ipv4Addr::new(192, 0, 2, 9)),
        )];

        let answer = Answer::positive(key.clone(), records, None);
        assert!(answer.is_ok());
        assert_eq!(answer.ip(), Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 9))));

        let negative = Answer::negative(key, ResolveStatus::NoDomain, None);
        assert!(!negative.is_ok());
        assert!(negative.records().is_empty());
        assert_eq!(negative.ip(), None);
    }
}
