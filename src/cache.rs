// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! An in-memory record cache over absolute expiry times.
//!
//! Entries are keyed by the same [`QueryKey`] the engine uses for in-flight
//! de-duplication. Confirmed absence is stored explicitly as a negative
//! entry, keyed exactly like the positive answer would have been. Nothing in
//! here performs I/O and nothing in here fails: absence is `None` or
//! [`NsLookup::Unknown`], never an error.

use std::cmp::Reverse;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::config::ResolverOpts;
use crate::lookup::{Answer, QueryKey, ResolveStatus};
use crate::rr::{Name, Record, RecordType};
use crate::transport::server_addr;

/// What the cache knows about the nameservers of a zone
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NsLookup {
    /// A cached NS record with a usable address
    Addr(SocketAddr),
    /// The zone's NS set is confirmed absent
    Negative,
    /// Nothing cached, or nothing with an address
    Unknown,
}

/// One slot of the cache: live records, or confirmed absence.
#[derive(Clone, Debug)]
enum CacheEntry {
    Positive(Vec<Record>),
    Negative { expires: Instant },
}

/// A cache hit richer than the record accessors, for the engine's
/// cache-first step.
#[derive(Clone, Copy, Debug)]
pub(crate) enum CacheHit<'a> {
    /// Records under the key; expired members may remain interleaved,
    ///  callers filter with [`Record::is_current`]
    Records(&'a [Record]),
    /// The key is confirmed absent until the instant
    Negative(Instant),
}

/// Orders records the way answers carry them: MX ascending by preference,
/// SRV by priority then descending weight, everything else untouched.
pub(crate) fn sort_use_order(records: &mut [Record]) {
    match records.first().map(Record::record_type) {
        Some(RecordType::MX) => records.sort_by_key(|record| {
            record
                .data()
                .as_mx()
                .map_or(u16::MAX, |mx| mx.preference())
        }),
        Some(RecordType::SRV) => records.sort_by_key(|record| {
            record
                .data()
                .as_srv()
                .map_or((u16::MAX, Reverse(0)), |srv| {
                    (srv.priority(), Reverse(srv.weight()))
                })
        }),
        _ => {}
    }
}

/// The resolver's record cache.
///
/// TTL policy is fixed at construction from [`ResolverOpts`]: expiries are
/// clamped to `max_ttl`, colliding records keep the sooner or later expiry
/// per `prefer_shorter_ttl`, and negative entries without an authority
/// supplied TTL live for `negative_ttl`.
#[derive(Debug)]
pub struct RecordCache {
    entries: HashMap<QueryKey, CacheEntry>,
    prefer_shorter_ttl: bool,
    max_ttl: Duration,
    negative_ttl: Duration,
}

impl RecordCache {
    /// Creates an empty cache with the options' TTL policy
    pub fn new(opts: &ResolverOpts) -> Self {
        Self {
            entries: HashMap::new(),
            prefer_shorter_ttl: opts.prefer_shorter_ttl,
            max_ttl: opts.max_ttl,
            negative_ttl: opts.negative_ttl,
        }
    }

    /// Returns the first live record under the key
    pub fn lookup(&self, key: &QueryKey, now: Instant) -> Option<&Record> {
        match self.entries.get(key) {
            Some(CacheEntry::Positive(records)) => {
                records.iter().find(|record| record.is_current(now))
            }
            _ => None,
        }
    }

    /// Returns the records under the key in stored order, empty unless at
    ///  least one of them is live. Callers filter individual members with
    ///  [`Record::is_current`].
    pub fn lookup_list(&self, key: &QueryKey, now: Instant) -> &[Record] {
        match self.entries.get(key) {
            Some(CacheEntry::Positive(records))
                if records.iter().any(|record| record.is_current(now)) =>
            {
                records
            }
            _ => &[],
        }
    }

    /// The engine's cache-first probe: live records, confirmed absence, or
    ///  nothing.
    pub(crate) fn hit(&self, key: &QueryKey, now: Instant) -> Option<CacheHit<'_>> {
        match self.entries.get(key)? {
            CacheEntry::Positive(records)
                if records.iter().any(|record| record.is_current(now)) =>
            {
                Some(CacheHit::Records(records))
            }
            CacheEntry::Negative { expires } if now < *expires => {
                Some(CacheHit::Negative(*expires))
            }
            _ => None,
        }
    }

    /// Absorbs a completed answer.
    ///
    /// `Ok` answers merge their records into the cache, grouped per
    /// record-name and type under their own keys, so a CNAME chain feeds the
    /// entries its members belong to. `NoDomain` answers become a negative
    /// entry under the answer's key. Every other status leaves the cache
    /// untouched.
    pub fn store_result(&mut self, answer: &Answer, now: Instant) {
        match answer.status() {
            ResolveStatus::Ok => {
                if answer.records().is_empty() {
                    return;
                }
                let question = answer.key().question_name();
                let mut groups: Vec<(QueryKey, Vec<Record>)> = Vec::new();
                for record in answer.records() {
                    // the group answering the question keeps the answer's own
                    // key, so reverse lookups stay keyed by address
                    let key = if record.record_type() == answer.key().rtype
                        && *record.name() == question
                    {
                        answer.key().clone()
                    } else {
                        QueryKey::name(record.record_type(), record.name().clone())
                    };
                    match groups.iter_mut().find(|(group, _)| *group == key) {
                        Some((_, list)) => list.push(record.clone()),
                        None => groups.push((key, vec![record.clone()])),
                    }
                }
                for (key, records) in groups {
                    trace!("caching {} records under {key}", records.len());
                    self.merge_records(key, records, now);
                }
            }
            ResolveStatus::NoDomain => {
                let ttl = answer
                    .negative_ttl()
                    .unwrap_or(self.negative_ttl)
                    .min(self.max_ttl);
                debug!("caching negative entry for {} ({}s)", answer.key(), ttl.as_secs());
                self.entries.insert(
                    answer.key().clone(),
                    CacheEntry::Negative {
                        expires: now + ttl,
                    },
                );
            }
            _ => {}
        }
    }

    /// Caches one address record on its own, outside a full resolution
    ///  cycle. Non-address data is ignored.
    pub fn store_host_address(&mut self, record: Record, now: Instant) {
        if record.data().ip_addr().is_none() {
            return;
        }
        let key = QueryKey::name(record.record_type(), record.name().clone());
        self.merge_records(key, vec![record], now);
    }

    /// Looks up a usable nameserver for the domain.
    ///
    /// A live NS record yields its resolved address when it carries one, or
    /// the separately cached address of its target otherwise. An explicit
    /// negative NS entry yields [`NsLookup::Negative`].
    pub fn lookup_name_server(&self, domain: &Name, now: Instant) -> NsLookup {
        let key = QueryKey::name(RecordType::NS, domain.clone());
        match self.entries.get(&key) {
            Some(CacheEntry::Negative { expires }) if now < *expires => NsLookup::Negative,
            Some(CacheEntry::Positive(records)) => {
                for record in records.iter().filter(|record| record.is_current(now)) {
                    if let Some(ip) = record.ip() {
                        return NsLookup::Addr(server_addr(ip, None));
                    }
                    let Some(target) = record.target_name() else {
                        continue;
                    };
                    // glue may have been cached apart from the NS record
                    for rtype in [RecordType::A, RecordType::AAAA] {
                        let address_key = QueryKey::name(rtype, target.clone());
                        if let Some(ip) = self.lookup(&address_key, now).and_then(Record::ip) {
                            return NsLookup::Addr(server_addr(ip, None));
                        }
                    }
                }
                NsLookup::Unknown
            }
            _ => NsLookup::Unknown,
        }
    }

    /// Drops everything expired as of `now`, returning how many records and
    ///  negative entries went away. With a report, one line is appended per
    ///  removal.
    pub fn prune(&mut self, now: Instant, mut report: Option<&mut String>) -> usize {
        use fmt::Write;

        let mut removed = 0;
        self.entries.retain(|key, entry| match entry {
            CacheEntry::Positive(records) => {
                records.retain(|record| {
                    if record.is_current(now) {
                        return true;
                    }
                    removed += 1;
                    if let Some(report) = report.as_deref_mut() {
                        let _ = writeln!(report, "expired: {record}");
                    }
                    false
                });
                !records.is_empty()
            }
            CacheEntry::Negative { expires } => {
                if now < *expires {
                    return true;
                }
                removed += 1;
                if let Some(report) = report.as_deref_mut() {
                    let _ = writeln!(report, "expired: {key} (negative)");
                }
                false
            }
        });
        if removed > 0 {
            debug!("pruned {removed} cache entries");
        }
        removed
    }

    /// Writes a diagnostic listing of the whole cache, one line per record
    ///  or negative entry, in key order.
    pub fn dump<W: fmt::Write>(&self, w: &mut W, now: Instant) -> fmt::Result {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by_cached_key(|(key, _)| key.to_string());

        for (key, entry) in entries {
            match entry {
                CacheEntry::Positive(records) => {
                    for record in records {
                        let ttl = record.expires().saturating_duration_since(now).as_secs();
                        writeln!(w, "{key}: {record} ttl={ttl}")?;
                    }
                }
                CacheEntry::Negative { expires } => {
                    let ttl = expires.saturating_duration_since(now).as_secs();
                    writeln!(w, "{key}: negative ttl={ttl}")?;
                }
            }
        }
        Ok(())
    }

    /// Number of keys with an entry, live or not
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Merges records into the entry under `key`, clamping expiries to
    /// `max_ttl` and settling collisions by the TTL conflict policy. A fresh
    /// positive set displaces a negative entry outright.
    fn merge_records(&mut self, key: QueryKey, mut incoming: Vec<Record>, now: Instant) {
        let clamp = now + self.max_ttl;
        for record in &mut incoming {
            record.clamp_expiry(clamp);
        }

        match self.entries.entry(key) {
            Entry::Vacant(slot) => {
                sort_use_order(&mut incoming);
                slot.insert(CacheEntry::Positive(incoming));
            }
            Entry::Occupied(mut slot) => {
                let CacheEntry::Positive(existing) = slot.get_mut() else {
                    sort_use_order(&mut incoming);
                    slot.insert(CacheEntry::Positive(incoming));
                    return;
                };
                existing.retain(|record| record.is_current(now));
                for mut record in incoming {
                    let Some(prior) = existing
                        .iter_mut()
                        .find(|prior| prior.data() == record.data())
                    else {
                        existing.push(record);
                        continue;
                    };
                    // same data seen twice: the policy picks which expiry
                    // survives, and a known target address never gets lost
                    let keep_incoming = if self.prefer_shorter_ttl {
                        record.expires() <= prior.expires()
                    } else {
                        record.expires() >= prior.expires()
                    };
                    if keep_incoming {
                        if record.target_ip().is_none() {
                            record.set_target_ip(prior.target_ip());
                        }
                        *prior = record;
                    } else if prior.target_ip().is_none() {
                        prior.set_target_ip(record.target_ip());
                    }
                }
                sort_use_order(existing);
            }
        }
    }
}
