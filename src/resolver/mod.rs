// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The resolver engine.
//!
//! [`Resolver`] is a single-threaded state machine with no runtime, no
//! sockets and no clock of its own. The host owns all three: it hands
//! inbound datagrams to [`Resolver::handle_udp`] and stream payloads to
//! [`Resolver::handle_tcp`], passes the current instant into every call, and
//! drives retransmission by calling [`Resolver::process_timeouts`] whenever
//! [`Resolver::next_deadline`] falls due. Outbound packets leave through the
//! [`Wire`] implementation the host supplies.
//!
//! Answers come back through [`Caller`] callbacks. A callback runs inside
//! whichever engine call settled the lookup, never inside the `resolve` call
//! that started it: when `resolve` returns `None` the answer arrives
//! strictly later. When `resolve` returns `Some`, the lookup was settled
//! locally and the callback is dropped unused.

mod handle;
mod response;
mod validate;

pub use self::handle::{Caller, CallerId, ResolveCallback};

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::mem;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use rand::Rng;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::cache::{sort_use_order, CacheHit, NsLookup, RecordCache};
use crate::config::{ResolveMode, ResolverConfig, ResolverOpts, ROOT_HINTS};
use crate::lookup::{Answer, LookupOptions, QueryKey, QueryTarget, ResolveStatus};
use crate::op::{Header, Message, MessageType, ResponseCode};
use crate::rr::{Name, RData, Record, RecordType};
use crate::serialize::binary::{tcp_frame, BinDecodable};
use crate::transport::{server_addr, Protocol, ServerList, TcpToken, Wire};

use self::handle::{HandleId, HandleState, QueryHandle, SubPurpose, Waiter};
use self::response::{scan_response, ScanOutcome, ScanVerdict};
use self::validate::validate_host_name;

static LOCALHOST_NAME: Lazy<Name> = Lazy::new(|| {
    Name::from_ascii("localhost.").expect("localhost is a well-formed name")
});

/// Where the next exchange of a query should go.
enum ServerChoice {
    /// Ask this server
    Send(SocketAddr),
    /// Parked on an in-flight nameserver lookup; nothing to send yet
    Wait,
    /// No server can be chosen
    Fail,
}

/// An asynchronous stub and recursive DNS resolver.
///
/// The resolver tracks every lookup as a handle keyed by `(type, target)`.
/// Identical lookups started while one is in flight share the same handle
/// and are answered together. Completed answers land in the record cache, so
/// repeated lookups settle without touching the wire.
///
/// All methods take `&mut self`; the engine is built to live on one thread
/// (or inside one task) with the host mediating every interaction.
pub struct Resolver<W> {
    config: ResolverConfig,
    opts: ResolverOpts,
    cache: RecordCache,
    servers: ServerList,
    wire: W,
    handles: HashMap<HandleId, QueryHandle<W>>,
    pending: HashMap<QueryKey, HandleId>,
    by_qid: HashMap<u16, HandleId>,
    by_tcp: HashMap<TcpToken, HandleId>,
    qid_counter: u16,
    udp_slot: usize,
    root_hint: usize,
    next_handle: u64,
    stopped: bool,
}

impl<W: Wire> Resolver<W> {
    /// Creates a resolver over the given wire.
    pub fn new(config: ResolverConfig, opts: ResolverOpts, wire: W) -> Self {
        let cache = RecordCache::new(&opts);
        let servers = ServerList::new(config.servers().to_vec());
        Self {
            config,
            opts,
            cache,
            servers,
            wire,
            handles: HashMap::new(),
            pending: HashMap::new(),
            by_qid: HashMap::new(),
            by_tcp: HashMap::new(),
            qid_counter: rand::random(),
            udp_slot: 0,
            root_hint: 0,
            next_handle: 0,
            stopped: false,
        }
    }

    /// The wire the resolver sends through, for hosts that buffer output.
    pub fn wire_mut(&mut self) -> &mut W {
        &mut self.wire
    }

    /// The active configuration.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// The active options.
    pub fn opts(&self) -> &ResolverOpts {
        &self.opts
    }

    /// The record cache.
    pub fn cache(&self) -> &RecordCache {
        &self.cache
    }

    /// Number of lookups currently in flight.
    pub fn outstanding(&self) -> usize {
        self.handles.len()
    }

    /// Whether [`Resolver::stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Replaces the upstream server set.
    ///
    /// Exchanges already in flight keep the server they were sent to; new
    /// exchanges use the new set.
    pub fn set_servers(&mut self, servers: Vec<SocketAddr>) {
        debug!(count = servers.len(), "replacing server set");
        self.config.set_servers(servers.clone());
        self.servers.set(servers);
    }

    /// Renders the cache contents for diagnostics.
    pub fn dump_cache(&self, now: Instant) -> String {
        let mut out = String::new();
        let _ = self.cache.dump(&mut out, now);
        out
    }

    /// Evicts expired cache entries, returning the count and a report of
    /// what was removed.
    pub fn prune_cache(&mut self, now: Instant) -> (usize, String) {
        let mut report = String::new();
        let removed = self.cache.prune(now, Some(&mut report));
        (removed, report)
    }

    /// Starts a lookup of `rtype` records for a host name.
    ///
    /// Returns `Some` when the lookup settles locally: IP address literals,
    /// names failing validation, `localhost`, cache hits, and lookups
    /// rejected after [`Resolver::stop`]. In those cases `caller` is never
    /// invoked. Returns `None` when the question goes to the wire; the
    /// answer is then delivered through `caller` from a later engine call.
    /// A `None` caller on the wire path makes the lookup a cache warmer.
    pub fn resolve(
        &mut self,
        host: &str,
        rtype: RecordType,
        options: LookupOptions,
        caller: Option<Caller<W>>,
        now: Instant,
    ) -> Option<Answer> {
        if !options.no_dotted_ip {
            if let Ok(addr) = host.parse::<IpAddr>() {
                let family_match = matches!(
                    (rtype, addr),
                    (RecordType::A, IpAddr::V4(_)) | (RecordType::AAAA, IpAddr::V6(_))
                );
                if family_match {
                    if let Ok(owner) = Name::from_ascii(host) {
                        let rdata = match addr {
                            IpAddr::V4(ip) => RData::A(ip),
                            IpAddr::V6(ip) => RData::AAAA(ip),
                        };
                        let record =
                            Record::from_rdata(owner.clone(), now + self.opts.max_ttl, rdata);
                        return Some(Answer::positive(
                            QueryKey::name(rtype, owner),
                            vec![record],
                            None,
                        ));
                    }
                }
            }
        }

        let must_have_dots = options.must_have_dots || self.opts.must_have_dots;
        if let Err(reason) = validate_host_name(host, rtype, must_have_dots) {
            trace!(host, reason, "rejected host name");
            let owner = Name::from_ascii(host).unwrap_or_else(|_| Name::root());
            return Some(Answer::negative(
                QueryKey::name(rtype, owner),
                ResolveStatus::BadName,
                None,
            ));
        }
        let owner = match Name::from_ascii(host) {
            Ok(owner) => owner,
            Err(_) => {
                return Some(Answer::negative(
                    QueryKey::name(rtype, Name::root()),
                    ResolveStatus::BadName,
                    None,
                ));
            }
        };
        let key = QueryKey::name(rtype, owner);
        if options.syntax_only {
            return Some(Answer::validated(key));
        }
        self.resolve_key(key, options, caller, now)
    }

    /// Starts a reverse lookup: the name of the host at an address.
    pub fn resolve_addr(
        &mut self,
        addr: IpAddr,
        options: LookupOptions,
        caller: Option<Caller<W>>,
        now: Instant,
    ) -> Option<Answer> {
        let key = QueryKey::addr(addr);
        if options.syntax_only {
            return Some(Answer::validated(key));
        }
        self.resolve_key(key, options, caller, now)
    }

    /// Looks up the IPv4 addresses of a host.
    pub fn resolve_host(
        &mut self,
        host: &str,
        options: LookupOptions,
        caller: Option<Caller<W>>,
        now: Instant,
    ) -> Option<Answer> {
        self.resolve(host, RecordType::A, options, caller, now)
    }

    /// Looks up the IPv6 addresses of a host.
    pub fn resolve_aaaa(
        &mut self,
        host: &str,
        options: LookupOptions,
        caller: Option<Caller<W>>,
        now: Instant,
    ) -> Option<Answer> {
        self.resolve(host, RecordType::AAAA, options, caller, now)
    }

    /// Looks up the mail exchangers of a domain.
    pub fn resolve_mail(
        &mut self,
        host: &str,
        options: LookupOptions,
        caller: Option<Caller<W>>,
        now: Instant,
    ) -> Option<Answer> {
        self.resolve(host, RecordType::MX, options, caller, now)
    }

    /// Looks up the nameservers of a zone.
    pub fn resolve_ns(
        &mut self,
        host: &str,
        options: LookupOptions,
        caller: Option<Caller<W>>,
        now: Instant,
    ) -> Option<Answer> {
        self.resolve(host, RecordType::NS, options, caller, now)
    }

    /// Looks up the start of authority of a zone.
    pub fn resolve_soa(
        &mut self,
        host: &str,
        options: LookupOptions,
        caller: Option<Caller<W>>,
        now: Instant,
    ) -> Option<Answer> {
        self.resolve(host, RecordType::SOA, options, caller, now)
    }

    /// Looks up the service records under a name.
    pub fn resolve_srv(
        &mut self,
        host: &str,
        options: LookupOptions,
        caller: Option<Caller<W>>,
        now: Instant,
    ) -> Option<Answer> {
        self.resolve(host, RecordType::SRV, options, caller, now)
    }

    /// Looks up the text records of a name.
    pub fn resolve_txt(
        &mut self,
        host: &str,
        options: LookupOptions,
        caller: Option<Caller<W>>,
        now: Instant,
    ) -> Option<Answer> {
        self.resolve(host, RecordType::TXT, options, caller, now)
    }

    /// Detaches every waiter registered under the caller id, returning how
    /// many were detached.
    ///
    /// The underlying queries keep running and still feed the cache; only
    /// the notifications are dropped.
    pub fn cancel(&mut self, caller: CallerId) -> usize {
        let mut detached = 0;
        for handle in self.handles.values_mut() {
            let before = handle.waiters.len();
            handle.waiters.retain(|waiter| waiter.caller_id() != Some(caller));
            detached += before - handle.waiters.len();
        }
        if detached > 0 {
            debug!(caller = caller.0, detached, "cancelled lookups");
        }
        detached
    }

    /// Tears down every in-flight lookup and refuses new ones.
    ///
    /// External callers are notified with [`ResolveStatus::Shutdown`]; the
    /// notifications run inside this call. The cache and diagnostics stay
    /// usable afterwards.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        debug!(outstanding = self.handles.len(), "stopping resolver");
        let ids: Vec<HandleId> = self.handles.keys().copied().collect();
        let mut callers: Vec<(Caller<W>, QueryKey)> = Vec::new();
        for id in ids {
            let Some(mut handle) = self.handles.remove(&id) else {
                continue;
            };
            if handle.qid != 0 {
                self.by_qid.remove(&handle.qid);
            }
            if let Some(token) = handle.tcp.take() {
                self.by_tcp.remove(&token);
                self.wire.close_tcp(token);
            }
            for waiter in handle.waiters.drain(..) {
                if let Waiter::Caller(caller) = waiter {
                    callers.push((caller, handle.key.clone()));
                }
            }
        }
        self.pending.clear();
        for (caller, key) in callers {
            let answer = Answer::negative(key, ResolveStatus::Shutdown, None);
            (caller.callback)(self, caller.token, answer);
        }
    }

    /// The earliest instant at which [`Resolver::process_timeouts`] has work
    /// to do, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.handles.values().filter_map(|handle| handle.deadline).min()
    }

    /// Runs every action whose deadline has passed: retransmissions, retry
    /// budget exhaustion, and deferred failures.
    ///
    /// Each due handle is processed once per call; a handle becoming due
    /// during processing shows up through [`Resolver::next_deadline`]
    /// immediately after.
    pub fn process_timeouts(&mut self, now: Instant) {
        let due: Vec<HandleId> = self
            .handles
            .iter()
            .filter(|(_, handle)| handle.deadline.is_some_and(|deadline| deadline <= now))
            .map(|(id, _)| *id)
            .collect();
        for id in due {
            self.handle_timeout(id, now);
        }
    }

    /// Feeds one inbound datagram to the engine.
    ///
    /// Datagrams that do not parse, do not match an outstanding query id, or
    /// arrive from an address other than the queried server are dropped
    /// without affecting the query they claim to answer.
    pub fn handle_udp(&mut self, source: SocketAddr, payload: &[u8], now: Instant) {
        if self.stopped {
            return;
        }
        let header = match Header::from_bytes(payload) {
            Ok(header) => header,
            Err(error) => {
                trace!(%source, %error, "undecodable datagram");
                return;
            }
        };
        if header.message_type() != MessageType::Response {
            return;
        }
        let Some(&id) = self.by_qid.get(&header.id()) else {
            trace!(%source, qid = header.id(), "datagram answers no outstanding query");
            return;
        };
        let Some(handle) = self.handles.get(&id) else {
            return;
        };
        if handle.state != HandleState::AwaitingResponse || handle.protocol != Protocol::Udp {
            return;
        }
        if handle.server.map(|server| server.ip()) != Some(source.ip()) {
            debug!(%source, handle = %id, "response from unexpected source");
            return;
        }
        self.process_response(id, payload, now);
    }

    /// Feeds one complete stream response, already stripped of its length
    /// prefix, to the engine.
    pub fn handle_tcp(&mut self, token: TcpToken, payload: &[u8], now: Instant) {
        if self.stopped {
            return;
        }
        let Some(&id) = self.by_tcp.get(&token) else {
            trace!(%token, "stream data for no outstanding query");
            return;
        };
        let Some(handle) = self.handles.get(&id) else {
            return;
        };
        if handle.state != HandleState::AwaitingResponse || handle.protocol != Protocol::Tcp {
            return;
        }
        self.process_response(id, payload, now);
    }

    /// Reports that a stream failed. The token is dead on entry; the engine
    /// will not ask the wire to close it again.
    pub fn handle_tcp_error(&mut self, token: TcpToken, now: Instant) {
        if self.stopped {
            return;
        }
        let Some(id) = self.by_tcp.remove(&token) else {
            return;
        };
        debug!(%token, handle = %id, "stream failed");
        if let Some(handle) = self.handles.get_mut(&id) {
            handle.tcp = None;
        }
        self.complete(id, ResolveStatus::Error, now);
    }

    fn resolve_key(
        &mut self,
        key: QueryKey,
        options: LookupOptions,
        caller: Option<Caller<W>>,
        now: Instant,
    ) -> Option<Answer> {
        if self.stopped {
            return Some(Answer::negative(key, ResolveStatus::Shutdown, None));
        }
        if let Some(answer) = self.well_known_answer(&key, now) {
            return Some(answer);
        }
        if let Some(answer) = self.cache_answer(&key, now) {
            return Some(answer);
        }
        if options.no_query {
            return Some(Answer::negative(key, ResolveStatus::NoDomain, None));
        }
        if let Some(&existing) = self.pending.get(&key) {
            trace!(%key, handle = %existing, "joined in-flight lookup");
            if let Some(caller) = caller {
                if let Some(handle) = self.handles.get_mut(&existing) {
                    handle.waiters.push(Waiter::Caller(caller));
                }
            }
            return None;
        }
        let id = self.create_handle(key.clone(), 0, caller);
        debug!(%key, handle = %id, "new lookup");
        self.issue(id, now);
        None
    }

    /// Starts or joins a sub-query on behalf of `parent`. Never invokes
    /// caller callbacks; a locally settled answer is returned instead.
    fn resolve_internal(
        &mut self,
        key: QueryKey,
        depth: usize,
        parent: (HandleId, SubPurpose),
        now: Instant,
    ) -> Option<Answer> {
        if self.stopped {
            return Some(Answer::negative(key, ResolveStatus::Shutdown, None));
        }
        if let Some(answer) = self.well_known_answer(&key, now) {
            return Some(answer);
        }
        if let Some(answer) = self.cache_answer(&key, now) {
            return Some(answer);
        }
        let (parent_id, purpose) = parent;
        if let Some(&existing) = self.pending.get(&key) {
            if existing == parent_id || self.would_deadlock(parent_id, existing) {
                debug!(%key, parent = %parent_id, "sub-query would deadlock");
                return Some(Answer::negative(key, ResolveStatus::Deadlock, None));
            }
            if let Some(handle) = self.handles.get_mut(&existing) {
                handle.waiters.push(Waiter::Parent { handle: parent_id, purpose });
            }
            return None;
        }
        if depth > self.opts.max_chain_depth {
            debug!(%key, depth, "sub-query chain too deep");
            return Some(Answer::negative(key, ResolveStatus::Error, None));
        }
        let id = self.create_handle(key, depth, None);
        if let Some(handle) = self.handles.get_mut(&id) {
            handle.waiters.push(Waiter::Parent { handle: parent_id, purpose });
        }
        trace!(handle = %id, parent = %parent_id, "new sub-query");
        self.issue(id, now);
        None
    }

    fn create_handle(
        &mut self,
        key: QueryKey,
        depth: usize,
        caller: Option<Caller<W>>,
    ) -> HandleId {
        self.next_handle += 1;
        let id = HandleId(self.next_handle);
        let mut handle = QueryHandle::new(id, key.clone(), depth);
        if self.opts.always_tcp {
            handle.protocol = Protocol::Tcp;
        }
        if let Some(caller) = caller {
            handle.waiters.push(Waiter::Caller(caller));
        }
        self.pending.insert(key, id);
        self.handles.insert(id, handle);
        id
    }

    /// Answers that never involve the cache or the wire.
    fn well_known_answer(&self, key: &QueryKey, now: Instant) -> Option<Answer> {
        let expires = now + self.opts.max_ttl;
        match &key.target {
            QueryTarget::Name(name) if name.is_localhost() => {
                let answer = match key.rtype {
                    RecordType::A => Answer::positive(
                        key.clone(),
                        vec![Record::from_rdata(
                            name.clone(),
                            expires,
                            RData::A(Ipv4Addr::LOCALHOST),
                        )],
                        None,
                    ),
                    RecordType::AAAA => Answer::positive(
                        key.clone(),
                        vec![Record::from_rdata(
                            name.clone(),
                            expires,
                            RData::AAAA(Ipv6Addr::LOCALHOST),
                        )],
                        None,
                    ),
                    _ => Answer::negative(key.clone(), ResolveStatus::NoDomain, None),
                };
                Some(answer)
            }
            QueryTarget::Addr(addr) if addr.is_loopback() => {
                let record = Record::from_rdata(
                    Name::from(*addr),
                    expires,
                    RData::PTR(LOCALHOST_NAME.clone()),
                );
                Some(Answer::positive(key.clone(), vec![record], None))
            }
            _ => None,
        }
    }

    /// Answers a lookup from cached records, chasing cached aliases for
    /// address questions.
    fn cache_answer(&self, key: &QueryKey, now: Instant) -> Option<Answer> {
        match self.cache.hit(key, now) {
            Some(CacheHit::Records(records)) => {
                let live: Vec<Record> =
                    records.iter().filter(|record| record.is_current(now)).cloned().collect();
                return Some(self.positive_from_cache(key.clone(), live));
            }
            Some(CacheHit::Negative(expires)) => {
                let mut answer = Answer::negative(key.clone(), ResolveStatus::NoDomain, None);
                answer.set_negative_ttl(Some(expires.saturating_duration_since(now)));
                return Some(answer);
            }
            None => {}
        }
        if !matches!(key.rtype, RecordType::A | RecordType::AAAA) {
            return None;
        }
        let mut name = key.target_name()?.clone();
        let mut chain: Vec<Record> = Vec::new();
        for _ in 0..self.opts.max_chain_depth {
            let link_key = QueryKey::name(RecordType::CNAME, name.clone());
            let link = self.cache.lookup(&link_key, now)?.clone();
            let target = link.target_name()?.clone();
            chain.push(link);
            let final_key = QueryKey::name(key.rtype, target.clone());
            match self.cache.hit(&final_key, now) {
                Some(CacheHit::Records(records)) => {
                    let mut live = chain;
                    live.extend(records.iter().filter(|record| record.is_current(now)).cloned());
                    return Some(self.positive_from_cache(key.clone(), live));
                }
                Some(CacheHit::Negative(expires)) => {
                    let mut answer = Answer::negative(key.clone(), ResolveStatus::NoDomain, None);
                    answer.set_negative_ttl(Some(expires.saturating_duration_since(now)));
                    return Some(answer);
                }
                None => name = target,
            }
        }
        None
    }

    fn positive_from_cache(&self, key: QueryKey, mut records: Vec<Record>) -> Answer {
        if !self.opts.preserve_intermediates {
            strip_intermediates(&mut records, key.rtype);
        }
        sort_use_order(&mut records);
        Answer::positive(key, records, None)
    }

    /// Picks a server and starts the exchange, or parks the handle.
    fn issue(&mut self, id: HandleId, now: Instant) {
        match self.select_server(id, now) {
            ServerChoice::Send(server) => {
                if let Some(handle) = self.handles.get_mut(&id) {
                    handle.server = Some(server);
                }
                self.start_exchange(id, now);
            }
            ServerChoice::Wait => {}
            ServerChoice::Fail => {
                debug!(handle = %id, "no server available");
                self.defer_failure(id, now);
            }
        }
    }

    /// Marks the handle failed without delivering anything yet. The next
    /// timeout pass turns it into an `Error` completion, keeping callbacks
    /// out of the call that hit the failure.
    fn defer_failure(&mut self, id: HandleId, now: Instant) {
        if let Some(handle) = self.handles.get_mut(&id) {
            handle.wire_error = true;
            handle.deadline = Some(now);
        }
    }

    fn select_server(&mut self, id: HandleId, now: Instant) -> ServerChoice {
        let question = {
            let Some(handle) = self.handles.get(&id) else {
                return ServerChoice::Fail;
            };
            if handle.ip_pinned {
                if let Some(server) = handle.server {
                    return ServerChoice::Send(server);
                }
            }
            handle.question.name().clone()
        };
        match self.config.mode() {
            ResolveMode::Forwarding => match self.servers.next_server() {
                Some(server) => ServerChoice::Send(server),
                None => ServerChoice::Fail,
            },
            ResolveMode::Recursive => self.select_authority(id, &question, now),
        }
    }

    /// Walks the question name towards the root looking for a usable
    /// cached nameserver, parking behind an in-flight NS lookup when one
    /// covers a zone on the way. Falls back to the root hints.
    fn select_authority(&mut self, id: HandleId, question: &Name, now: Instant) -> ServerChoice {
        let mut zone = question.clone();
        loop {
            match self.cache.lookup_name_server(&zone, now) {
                NsLookup::Addr(server) => return ServerChoice::Send(server),
                NsLookup::Unknown => {
                    let ns_key = QueryKey::name(RecordType::NS, zone.clone());
                    if let Some(&ns_id) = self.pending.get(&ns_key) {
                        if ns_id != id && !self.would_deadlock(id, ns_id) {
                            if let Some(ns_handle) = self.handles.get_mut(&ns_id) {
                                ns_handle.waiters.push(Waiter::Parent {
                                    handle: id,
                                    purpose: SubPurpose::NsWait,
                                });
                                trace!(handle = %id, on = %ns_id, "parked awaiting nameservers");
                                return ServerChoice::Wait;
                            }
                        }
                    }
                }
                NsLookup::Negative => {}
            }
            if zone.is_root() {
                break;
            }
            zone = zone.base_name();
        }
        match self.next_root_hint() {
            Some(server) => ServerChoice::Send(server),
            None => ServerChoice::Fail,
        }
    }

    fn next_root_hint(&mut self) -> Option<SocketAddr> {
        if !self.servers.is_empty() {
            return self.servers.next_server();
        }
        if ROOT_HINTS.is_empty() {
            return None;
        }
        let ip = ROOT_HINTS[self.root_hint % ROOT_HINTS.len()];
        self.root_hint += 1;
        Some(server_addr(ip, None))
    }

    /// Allocates a query id and transmits. With the id space exhausted the
    /// handle parks and retries after a delay.
    fn start_exchange(&mut self, id: HandleId, now: Instant) {
        match self.allocate_qid(id) {
            Some(qid) => {
                if let Some(handle) = self.handles.get_mut(&id) {
                    handle.qid = qid;
                    handle.state = HandleState::AwaitingResponse;
                }
                self.transmit(id, now);
            }
            None => {
                debug!(handle = %id, "query id space exhausted, parking");
                if let Some(handle) = self.handles.get_mut(&id) {
                    handle.state = HandleState::BlockedOnQid;
                    handle.deadline = Some(now + self.opts.qid_retry_delay);
                }
            }
        }
    }

    /// Finds a free nonzero query id, scanning at most the whole id space.
    fn allocate_qid(&mut self, id: HandleId) -> Option<u16> {
        for _ in 0..=u32::from(u16::MAX) {
            self.qid_counter = self.qid_counter.wrapping_add(1);
            if self.qid_counter == 0 {
                continue;
            }
            if let Entry::Vacant(slot) = self.by_qid.entry(self.qid_counter) {
                slot.insert(id);
                return Some(self.qid_counter);
            }
        }
        None
    }

    /// Sends the question to the handle's server and arms the deadline.
    /// Wire failures defer to the timeout pass instead of failing inline.
    fn transmit(&mut self, id: HandleId, now: Instant) {
        let Some(handle) = self.handles.get_mut(&id) else {
            return;
        };
        let Some(server) = handle.server else {
            handle.wire_error = true;
            handle.deadline = Some(now);
            return;
        };
        let recursion = self.config.mode() == ResolveMode::Forwarding;
        let message = Message::query(handle.qid, handle.question.clone(), recursion);
        let payload = match message.to_vec(now) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(handle = %id, %error, "failed to encode query");
                handle.wire_error = true;
                handle.deadline = Some(now);
                return;
            }
        };
        handle.attempt += 1;
        match handle.protocol {
            Protocol::Udp => {
                let backoff = self.opts.retry_backoff * (handle.attempt as u32 - 1);
                let jitter = Duration::from_millis(jitter_ms(self.opts.jitter_max));
                handle.deadline = Some(now + self.opts.retry_timeout + backoff + jitter);
                let slot = self.udp_slot;
                self.udp_slot = (self.udp_slot + 1) % self.opts.udp_send_slots.max(1);
                trace!(handle = %id, %server, slot, attempt = handle.attempt, "sending datagram");
                if let Err(error) = self.wire.send_udp(slot, server, &payload) {
                    debug!(handle = %id, %server, %error, "datagram send failed");
                    handle.wire_error = true;
                    handle.deadline = Some(now);
                }
            }
            Protocol::Tcp => {
                handle.deadline = Some(now + self.opts.tcp_timeout);
                let framed = match tcp_frame(&payload) {
                    Ok(framed) => framed,
                    Err(error) => {
                        debug!(handle = %id, %error, "query exceeds the stream frame limit");
                        handle.wire_error = true;
                        handle.deadline = Some(now);
                        return;
                    }
                };
                match self.wire.open_tcp(server) {
                    Ok(token) => {
                        handle.tcp = Some(token);
                        self.by_tcp.insert(token, id);
                        trace!(handle = %id, %server, %token, "sending over stream");
                        if let Err(error) = self.wire.send_tcp(token, &framed) {
                            debug!(handle = %id, %token, %error, "stream send failed");
                            handle.wire_error = true;
                            handle.deadline = Some(now);
                        }
                    }
                    Err(error) => {
                        debug!(handle = %id, %server, %error, "stream connect failed");
                        handle.wire_error = true;
                        handle.deadline = Some(now);
                    }
                }
            }
        }
    }

    /// Retransmits after re-selecting a server when none is held. Used for
    /// timeouts and for the second opinion on an empty answer.
    fn retry_transmit(&mut self, id: HandleId, now: Instant) {
        let needs_server = match self.handles.get(&id) {
            Some(handle) => handle.server.is_none(),
            None => return,
        };
        if needs_server {
            match self.select_server(id, now) {
                ServerChoice::Send(server) => {
                    if let Some(handle) = self.handles.get_mut(&id) {
                        handle.server = Some(server);
                    }
                }
                ServerChoice::Wait => {
                    self.release_exchange(id);
                    return;
                }
                ServerChoice::Fail => {
                    self.defer_failure(id, now);
                    return;
                }
            }
        }
        self.transmit(id, now);
    }

    fn handle_timeout(&mut self, id: HandleId, now: Instant) {
        let Some(handle) = self.handles.get_mut(&id) else {
            return;
        };
        match handle.deadline {
            Some(deadline) if deadline <= now => {}
            _ => return,
        }
        match handle.state {
            HandleState::BlockedOnQid => {
                handle.deadline = None;
                self.start_exchange(id, now);
            }
            HandleState::AwaitingResponse => match handle.protocol {
                Protocol::Udp => {
                    if handle.attempt >= self.opts.max_retries {
                        let status = if handle.nodomain_tentative {
                            ResolveStatus::NoDomain
                        } else if handle.wire_error {
                            ResolveStatus::Error
                        } else {
                            ResolveStatus::Timeout
                        };
                        debug!(handle = %id, ?status, "lookup ran out of retries");
                        self.complete(id, status, now);
                    } else {
                        if !handle.ip_pinned {
                            handle.server = None;
                        }
                        self.retry_transmit(id, now);
                    }
                }
                Protocol::Tcp => {
                    let status = if handle.wire_error {
                        ResolveStatus::Error
                    } else {
                        ResolveStatus::Timeout
                    };
                    self.complete(id, status, now);
                }
            },
            HandleState::Unissued | HandleState::ResolvingGlue => {
                handle.deadline = None;
                if handle.wire_error {
                    self.complete(id, ResolveStatus::Error, now);
                }
            }
        }
    }

    /// Frees the wire-facing resources of an exchange while keeping the
    /// handle, its records and its waiters.
    fn release_exchange(&mut self, id: HandleId) {
        let Some(handle) = self.handles.get_mut(&id) else {
            return;
        };
        if handle.qid != 0 {
            self.by_qid.remove(&handle.qid);
        }
        if let Some(token) = handle.tcp.take() {
            self.by_tcp.remove(&token);
            self.wire.close_tcp(token);
        }
        handle.reset_exchange();
    }

    fn process_response(&mut self, id: HandleId, payload: &[u8], now: Instant) {
        let (question, qid, protocol, quorum) = {
            let Some(handle) = self.handles.get(&id) else {
                return;
            };
            (
                handle.question.clone(),
                handle.qid,
                handle.protocol,
                self.answer_quorum(handle.key.rtype),
            )
        };
        let verdict = match scan_response(payload, &question, quorum, now, self.opts.ttl_floor) {
            Ok(verdict) => verdict,
            Err(error) => {
                debug!(handle = %id, %error, "malformed response");
                self.complete(id, ResolveStatus::BadResponse, now);
                return;
            }
        };
        let outcome = match verdict {
            ScanVerdict::Valid(outcome) => outcome,
            ScanVerdict::Mismatch(reason) => {
                trace!(handle = %id, reason, "response dropped");
                return;
            }
        };
        if outcome.header.id() != qid {
            trace!(handle = %id, "response query id mismatch");
            return;
        }
        if outcome.header.truncated() {
            match protocol {
                Protocol::Udp => {
                    debug!(handle = %id, "truncated response, retrying over stream");
                    self.promote_to_tcp(id, now);
                }
                // a stream answer has no excuse to truncate
                Protocol::Tcp => self.complete(id, ResolveStatus::BadResponse, now),
            }
            return;
        }
        match outcome.header.response_code() {
            ResponseCode::NoError => {
                if !outcome.answers.is_empty() {
                    self.enter_glue_phase(id, outcome, now);
                } else if outcome.soa.is_none() && !outcome.authority_ns.is_empty() {
                    self.follow_referral(id, outcome, now);
                } else {
                    self.handle_nodata(id, outcome, now);
                }
            }
            ResponseCode::NXDomain => {
                if let Some(ttl) = negative_ttl_of(outcome.soa.as_ref(), now) {
                    if let Some(handle) = self.handles.get_mut(&id) {
                        handle.negative_ttl = Some(ttl);
                    }
                }
                self.complete(id, ResolveStatus::NoDomain, now);
            }
            code => {
                debug!(handle = %id, %code, "server failure");
                self.complete(id, ResolveStatus::BadResponse, now);
            }
        }
    }

    /// One retry over the stream transport, against the same server.
    fn promote_to_tcp(&mut self, id: HandleId, now: Instant) {
        self.release_exchange(id);
        let Some(handle) = self.handles.get_mut(&id) else {
            return;
        };
        handle.protocol = Protocol::Tcp;
        handle.ip_pinned = true;
        self.start_exchange(id, now);
    }

    /// Absorbs a response carrying answers: caches its glue, attaches
    /// addresses to host-naming records, and spawns sub-queries for the
    /// targets still missing one.
    fn enter_glue_phase(&mut self, id: HandleId, outcome: ScanOutcome, now: Instant) {
        self.release_exchange(id);
        let cache_all = self.opts.cache_glue_all;
        let mut spawn: Vec<(Name, RecordType)> = Vec::new();
        let depth;
        {
            let Some(handle) = self.handles.get_mut(&id) else {
                return;
            };
            handle.state = HandleState::ResolvingGlue;
            handle.records = outcome.answers;
            let question_type = handle.key.rtype;
            depth = handle.depth + 1;

            let mut glue_targets: Vec<Name> = Vec::new();
            for record in handle.records.iter().chain(outcome.authority_ns.iter()) {
                if let Some(target) = record.target_name() {
                    if !glue_targets.contains(target) {
                        glue_targets.push(target.clone());
                    }
                }
            }
            for glue in &outcome.additionals {
                if cache_all || glue_targets.contains(glue.name()) {
                    self.cache.store_host_address(glue.clone(), now);
                }
            }

            for index in 0..handle.records.len() {
                if !handle.records[index].needs_address() {
                    continue;
                }
                let Some(target) = handle.records[index].target_name().cloned() else {
                    continue;
                };
                let found = outcome
                    .additionals
                    .iter()
                    .find(|glue| *glue.name() == target)
                    .and_then(|glue| glue.ip())
                    .or_else(|| {
                        handle
                            .records
                            .iter()
                            .find(|sibling| *sibling.name() == target)
                            .and_then(|sibling| sibling.ip())
                    })
                    .or_else(|| cached_ip(&self.cache, &target, now));
                match found {
                    Some(ip) => handle.records[index].set_target_ip(Some(ip)),
                    None if depth <= self.opts.max_chain_depth => {
                        let sub_type =
                            if handle.records[index].record_type() == RecordType::CNAME {
                                question_type
                            } else {
                                RecordType::A
                            };
                        if !spawn.iter().any(|(name, _)| *name == target) {
                            spawn.push((target, sub_type));
                        }
                    }
                    None => {
                        trace!(handle = %id, %target, "chain too deep, leaving target unresolved");
                    }
                }
            }
        }

        for (target, sub_type) in spawn {
            let key = QueryKey::name(sub_type, target.clone());
            match self.resolve_internal(key, depth, (id, SubPurpose::Glue { target: target.clone() }), now)
            {
                Some(answer) => self.apply_glue_answer(id, &target, &answer),
                None => {
                    if let Some(handle) = self.handles.get_mut(&id) {
                        handle.open_subqueries += 1;
                    }
                }
            }
        }
        self.maybe_partial_unblock(id, now);
        let finished = self.handles.get(&id).is_some_and(|handle| {
            handle.open_subqueries == 0 && !handle.awaiting_redirect
        });
        if finished {
            self.complete(id, ResolveStatus::Ok, now);
        }
    }

    /// Absorbs a delegation: caches the nameserver set and its glue, then
    /// re-aims the query at the delegated zone's servers.
    fn follow_referral(&mut self, id: HandleId, mut outcome: ScanOutcome, now: Instant) {
        self.release_exchange(id);
        for ns in &mut outcome.authority_ns {
            if ns.ip().is_some() {
                continue;
            }
            let Some(target) = ns.target_name().cloned() else {
                continue;
            };
            if let Some(ip) = outcome
                .additionals
                .iter()
                .find(|glue| *glue.name() == target)
                .and_then(|glue| glue.ip())
            {
                ns.set_target_ip(Some(ip));
            }
        }
        let glue_targets: Vec<Name> = outcome
            .authority_ns
            .iter()
            .filter_map(|ns| ns.target_name().cloned())
            .collect();
        for glue in &outcome.additionals {
            if self.opts.cache_glue_all || glue_targets.contains(glue.name()) {
                self.cache.store_host_address(glue.clone(), now);
            }
        }
        if let Some(owner) = outcome.authority_ns.first().map(|ns| ns.name().clone()) {
            let delegation = Answer::positive(
                QueryKey::name(RecordType::NS, owner),
                outcome.authority_ns.clone(),
                None,
            );
            self.cache.store_result(&delegation, now);
        }

        let (depth, budget_exceeded) = {
            let Some(handle) = self.handles.get_mut(&id) else {
                return;
            };
            handle.referrals += 1;
            let budget = self.opts.referral_budget(self.config.mode());
            (handle.depth + 1, handle.referrals > budget)
        };
        if budget_exceeded {
            debug!(handle = %id, "referral budget exhausted");
            self.complete(id, ResolveStatus::BadResponse, now);
            return;
        }
        if let Some(ip) = outcome.authority_ns.iter().find_map(|ns| ns.ip()) {
            self.redirect_to(id, server_addr(ip, None), now);
            return;
        }
        let Some(target) = outcome.authority_ns.iter().find_map(|ns| ns.target_name().cloned())
        else {
            self.complete(id, ResolveStatus::BadResponse, now);
            return;
        };
        debug!(handle = %id, %target, "unglued referral, resolving nameserver");
        let key = QueryKey::name(RecordType::A, target);
        match self.resolve_internal(key, depth, (id, SubPurpose::Referral), now) {
            Some(answer) => self.apply_referral_answer(id, &answer, now),
            None => {
                if let Some(handle) = self.handles.get_mut(&id) {
                    handle.open_subqueries += 1;
                    handle.awaiting_redirect = true;
                    handle.state = HandleState::ResolvingGlue;
                }
            }
        }
    }

    /// Re-issues the query at a specific server, as named by a delegation.
    fn redirect_to(&mut self, id: HandleId, server: SocketAddr, now: Instant) {
        self.release_exchange(id);
        let protocol = if self.opts.always_tcp { Protocol::Tcp } else { Protocol::Udp };
        let Some(handle) = self.handles.get_mut(&id) else {
            return;
        };
        debug!(handle = %id, %server, "following delegation");
        handle.server = Some(server);
        handle.ip_pinned = true;
        handle.awaiting_redirect = false;
        handle.protocol = protocol;
        self.start_exchange(id, now);
    }

    /// An empty NoError answer. The first one over datagram transport earns
    /// a second opinion; after that the lookup settles as `NoDomain`.
    fn handle_nodata(&mut self, id: HandleId, outcome: ScanOutcome, now: Instant) {
        let negative_ttl = negative_ttl_of(outcome.soa.as_ref(), now);
        let retry = {
            let Some(handle) = self.handles.get_mut(&id) else {
                return;
            };
            if negative_ttl.is_some() {
                handle.negative_ttl = negative_ttl;
            }
            let first = !handle.nodomain_tentative && handle.protocol == Protocol::Udp;
            if first {
                handle.nodomain_tentative = true;
                if !handle.ip_pinned {
                    handle.server = None;
                }
            }
            first && handle.attempt < self.opts.max_retries
        };
        if retry {
            trace!(handle = %id, "empty answer, asking once more");
            self.retry_transmit(id, now);
        } else {
            self.complete(id, ResolveStatus::NoDomain, now);
        }
    }

    /// A sub-query settled; fold its outcome into the parent.
    fn sub_query_done(
        &mut self,
        parent: HandleId,
        purpose: SubPurpose,
        answer: &Answer,
        now: Instant,
    ) {
        if !self.handles.contains_key(&parent) {
            return;
        }
        match purpose {
            SubPurpose::Glue { target } => {
                if let Some(handle) = self.handles.get_mut(&parent) {
                    handle.open_subqueries = handle.open_subqueries.saturating_sub(1);
                }
                self.apply_glue_answer(parent, &target, answer);
                self.maybe_partial_unblock(parent, now);
                let finished = self.handles.get(&parent).is_some_and(|handle| {
                    handle.state == HandleState::ResolvingGlue
                        && handle.open_subqueries == 0
                        && !handle.awaiting_redirect
                });
                if finished {
                    self.complete(parent, ResolveStatus::Ok, now);
                }
            }
            SubPurpose::Referral => {
                if let Some(handle) = self.handles.get_mut(&parent) {
                    handle.open_subqueries = handle.open_subqueries.saturating_sub(1);
                }
                self.apply_referral_answer(parent, answer, now);
            }
            SubPurpose::NsWait => {
                trace!(handle = %parent, "nameserver set settled, reissuing");
                self.issue(parent, now);
            }
        }
    }

    fn apply_glue_answer(&mut self, id: HandleId, target: &Name, answer: &Answer) {
        if !answer.is_ok() {
            return;
        }
        let Some(ip) = answer.ip() else {
            return;
        };
        let Some(handle) = self.handles.get_mut(&id) else {
            return;
        };
        for record in &mut handle.records {
            if record.target_name() == Some(target) && record.ip().is_none() {
                record.set_target_ip(Some(ip));
            }
        }
    }

    fn apply_referral_answer(&mut self, id: HandleId, answer: &Answer, now: Instant) {
        if !self.handles.contains_key(&id) {
            return;
        }
        match (answer.status(), answer.ip()) {
            (ResolveStatus::Ok, Some(ip)) => self.redirect_to(id, server_addr(ip, None), now),
            (ResolveStatus::Deadlock, _) => self.complete(id, ResolveStatus::Deadlock, now),
            _ => self.complete(id, ResolveStatus::BadResponse, now),
        }
    }

    /// Publishes the already-usable part of a nameserver answer so queries
    /// parked on it can move, while external callers wait for the full set.
    ///
    /// The partial set is cached before anyone is notified; a parked query
    /// reissued by the notification must find it.
    fn maybe_partial_unblock(&mut self, id: HandleId, now: Instant) {
        if !self.opts.partial_unblock {
            return;
        }
        let (answer, parents) = {
            let Some(handle) = self.handles.get_mut(&id) else {
                return;
            };
            if handle.key.rtype != RecordType::NS || handle.partial_notified {
                return;
            }
            if handle.open_subqueries == 0 {
                return;
            }
            if handle.resolved() == 0 || handle.unresolved() == 0 {
                return;
            }
            handle.partial_notified = true;
            let mut records: Vec<Record> = handle
                .records
                .iter()
                .filter(|record| !record.needs_address())
                .cloned()
                .collect();
            sort_use_order(&mut records);
            let server = handle.server.map(|server| server.ip());
            let answer = Answer::positive(handle.key.clone(), records, server);
            let mut parents = Vec::new();
            let mut kept: SmallVec<[Waiter<W>; 2]> = SmallVec::new();
            for waiter in mem::take(&mut handle.waiters) {
                match waiter {
                    Waiter::Parent { handle, purpose } => parents.push((handle, purpose)),
                    caller => kept.push(caller),
                }
            }
            handle.waiters = kept;
            (answer, parents)
        };
        debug!(handle = %id, "partial nameserver set available");
        self.cache.store_result(&answer, now);
        for (parent, purpose) in parents {
            self.sub_query_done(parent, purpose, &answer, now);
        }
    }

    /// Would linking `waiter` behind `target` close a waiting cycle?
    fn would_deadlock(&self, waiter: HandleId, target: HandleId) -> bool {
        if waiter == target {
            return true;
        }
        let mut stack = vec![target];
        let mut visited = vec![target];
        while let Some(current) = stack.pop() {
            for (owner, handle) in &self.handles {
                let links = handle.waiters.iter().any(|entry| {
                    matches!(entry, Waiter::Parent { handle: parent, .. } if *parent == current)
                });
                if !links {
                    continue;
                }
                if *owner == waiter {
                    return true;
                }
                if !visited.contains(owner) {
                    visited.push(*owner);
                    stack.push(*owner);
                }
            }
        }
        false
    }

    /// Settles a lookup: releases its resources, shapes and caches the
    /// answer, and notifies every waiter in attach order.
    fn complete(&mut self, id: HandleId, status: ResolveStatus, now: Instant) {
        let Some(mut handle) = self.handles.remove(&id) else {
            return;
        };
        if self.pending.get(&handle.key) == Some(&id) {
            self.pending.remove(&handle.key);
        }
        if handle.qid != 0 {
            self.by_qid.remove(&handle.qid);
        }
        if let Some(token) = handle.tcp.take() {
            self.by_tcp.remove(&token);
            self.wire.close_tcp(token);
        }

        let server = handle.server.map(|server| server.ip());
        let mut answer = match status {
            ResolveStatus::Ok => {
                let mut records = mem::take(&mut handle.records);
                records.retain(|record| !record.needs_address());
                if records.is_empty() {
                    Answer::negative(handle.key.clone(), ResolveStatus::NoDomain, server)
                } else {
                    sort_use_order(&mut records);
                    Answer::positive(handle.key.clone(), records, server)
                }
            }
            status => Answer::negative(handle.key.clone(), status, server),
        };
        if !answer.is_ok() {
            answer.set_negative_ttl(handle.negative_ttl);
        }
        debug!(handle = %id, key = %handle.key, status = ?answer.status(), "lookup complete");
        self.cache.store_result(&answer, now);

        // the cache keeps the whole chain; the delivered answer honors the
        // intermediate-record preference
        let answer = if self.opts.preserve_intermediates || !answer.is_ok() {
            answer
        } else {
            let mut records = answer.records().to_vec();
            strip_intermediates(&mut records, handle.key.rtype);
            Answer::positive(handle.key.clone(), records, server)
        };

        let waiters = mem::take(&mut handle.waiters);
        drop(handle);
        for waiter in waiters {
            match waiter {
                Waiter::Caller(caller) => (caller.callback)(self, caller.token, answer.clone()),
                Waiter::Parent { handle: parent, purpose } => {
                    self.sub_query_done(parent, purpose, &answer, now);
                }
            }
        }
    }

    fn answer_quorum(&self, rtype: RecordType) -> Option<usize> {
        let cap = match rtype {
            RecordType::NS => self.opts.max_rr_ns,
            RecordType::MX => self.opts.max_rr_mx,
            _ => return None,
        };
        (cap > 0).then_some(cap)
    }
}

fn jitter_ms(max: Duration) -> u64 {
    let cap = max.as_millis() as u64;
    if cap == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..=cap)
}

fn cached_ip(cache: &RecordCache, target: &Name, now: Instant) -> Option<IpAddr> {
    let forward = QueryKey::name(RecordType::A, target.clone());
    if let Some(ip) = cache.lookup(&forward, now).and_then(|record| record.ip()) {
        return Some(ip);
    }
    let forward = QueryKey::name(RecordType::AAAA, target.clone());
    cache.lookup(&forward, now).and_then(|record| record.ip())
}

/// Drops alias records when records of the asked-for type are present.
/// A chain whose tail was resolved out of band stays intact, since the
/// aliases are then the only carriers of the resolved addresses.
fn strip_intermediates(records: &mut Vec<Record>, rtype: RecordType) {
    if records.iter().any(|record| record.record_type() == rtype) {
        records.retain(|record| record.record_type() == rtype);
    }
}

fn negative_ttl_of(soa: Option<&Record>, now: Instant) -> Option<Duration> {
    let record = soa?;
    let minimum = Duration::from_secs(u64::from(record.data().as_soa()?.minimum()));
    Some(record.expires().saturating_duration_since(now).min(minimum))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::Query;
    use crate::rr::rdata::{MX, SOA, TXT};
    use std::io;
    use std::sync::{Arc, Mutex};

    const UPSTREAM: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)), 53);

    #[derive(Default)]
    struct MockWire {
        udp_sent: Vec<(usize, SocketAddr, Vec<u8>)>,
        tcp_opened: Vec<(TcpToken, SocketAddr)>,
        tcp_sent: Vec<(TcpToken, Vec<u8>)>,
        tcp_closed: Vec<TcpToken>,
        next_token: u64,
        fail_udp: bool,
    }

    impl Wire for MockWire {
        fn send_udp(&mut self, slot: usize, target: SocketAddr, payload: &[u8]) -> io::Result<()> {
            if self.fail_udp {
                return Err(io::Error::new(io::ErrorKind::Other, "interface down"));
            }
            self.udp_sent.push((slot, target, payload.to_vec()));
            Ok(())
        }

        fn open_tcp(&mut self, target: SocketAddr) -> io::Result<TcpToken> {
            self.next_token += 1;
            let token = TcpToken(self.next_token);
            self.tcp_opened.push((token, target));
            Ok(token)
        }

        fn send_tcp(&mut self, token: TcpToken, payload: &[u8]) -> io::Result<()> {
            self.tcp_sent.push((token, payload.to_vec()));
            Ok(())
        }

        fn close_tcp(&mut self, token: TcpToken) {
            self.tcp_closed.push(token);
        }
    }

    fn opts() -> ResolverOpts {
        ResolverOpts {
            jitter_max: Duration::ZERO,
            ..ResolverOpts::default()
        }
    }

    fn forwarding() -> Resolver<MockWire> {
        Resolver::new(ResolverConfig::forwarding(vec![UPSTREAM]), opts(), MockWire::default())
    }

    fn recursive() -> Resolver<MockWire> {
        Resolver::new(ResolverConfig::recursive(), opts(), MockWire::default())
    }

    type Inbox = Arc<Mutex<Vec<(u64, Answer)>>>;

    fn inbox() -> Inbox {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn on_answer(sink: &Inbox, caller: u64, token: u64) -> Option<Caller<MockWire>> {
        let sink = Arc::clone(sink);
        Some(Caller {
            id: CallerId(caller),
            token,
            callback: Box::new(move |_, token, answer| {
                sink.lock().unwrap().push((token, answer))
            }),
        })
    }

    fn name(ascii: &str) -> Name {
        Name::from_ascii(ascii).unwrap()
    }

    fn a_record(owner: &str, ip: [u8; 4], ttl: u64, now: Instant) -> Record {
        Record::from_rdata(
            name(owner),
            now + Duration::from_secs(ttl),
            RData::A(Ipv4Addr::from(ip)),
        )
    }

    fn ns_record(owner: &str, target: &str, now: Instant) -> Record {
        Record::from_rdata(name(owner), now + Duration::from_secs(300), RData::NS(name(target)))
    }

    fn mx_record(owner: &str, preference: u16, exchange: &str, now: Instant) -> Record {
        Record::from_rdata(
            name(owner),
            now + Duration::from_secs(300),
            RData::MX(MX::new(preference, name(exchange))),
        )
    }

    fn cname_record(owner: &str, target: &str, now: Instant) -> Record {
        Record::from_rdata(
            name(owner),
            now + Duration::from_secs(300),
            RData::CNAME(name(target)),
        )
    }

    fn soa_record(zone: &str, minimum: u32, ttl: u64, now: Instant) -> Record {
        Record::from_rdata(
            name(zone),
            now + Duration::from_secs(ttl),
            RData::SOA(SOA::new(
                name(&format!("ns1.{zone}")),
                name(&format!("hostmaster.{zone}")),
                1,
                7200,
                1800,
                1_209_600,
                minimum,
            )),
        )
    }

    /// Decodes the query most recently sent as datagram number `index`.
    fn sent_question(wire: &MockWire, index: usize, now: Instant) -> (u16, Query, SocketAddr) {
        let (_, target, payload) = &wire.udp_sent[index];
        let message = Message::read(payload, now, Duration::ZERO).unwrap();
        (message.header().id(), message.queries()[0].clone(), *target)
    }

    /// Builds a response to sent datagram `index` and feeds it back in.
    fn reply(
        resolver: &mut Resolver<MockWire>,
        index: usize,
        code: ResponseCode,
        now: Instant,
        build: impl FnOnce(&Query, &mut Message),
    ) {
        let (qid, query, target) = sent_question(&resolver.wire, index, now);
        let mut message = Message::response(qid, code);
        message.add_query(query.clone());
        build(&query, &mut message);
        let payload = message.to_vec(now).unwrap();
        resolver.handle_udp(target, &payload, now);
    }

    #[test]
    fn test_ip_literal_answers_synchronously() {
        let mut resolver = forwarding();
        let now = Instant::now();
        let answer = resolver
            .resolve("192.0.2.7", RecordType::A, LookupOptions::default(), None, now)
            .unwrap();
        assert!(answer.is_ok());
        assert_eq!(answer.ip(), Some(IpAddr::from([192, 0, 2, 7])));

        let answer = resolver
            .resolve("::1", RecordType::AAAA, LookupOptions::default(), None, now)
            .unwrap();
        assert_eq!(answer.ip(), Some(IpAddr::V6(Ipv6Addr::LOCALHOST)));

        // wrong family falls through to name validation, where the colons fail
        let answer = resolver
            .resolve("::1", RecordType::A, LookupOptions::default(), None, now)
            .unwrap();
        assert_eq!(answer.status(), ResolveStatus::BadName);
        assert!(resolver.wire.udp_sent.is_empty());
    }

    #[test]
    fn test_invalid_names_fail_fast() {
        let mut resolver = forwarding();
        let now = Instant::now();
        for bad in ["", "bad..name", "-leading.example.com", "under_score-.example.com"] {
            let answer = resolver
                .resolve(bad, RecordType::A, LookupOptions::default(), None, now)
                .unwrap();
            assert_eq!(answer.status(), ResolveStatus::BadName, "{bad:?}");
        }
        let dots = LookupOptions { must_have_dots: true, ..LookupOptions::default() };
        let answer = resolver.resolve("single", RecordType::A, dots, None, now).unwrap();
        assert_eq!(answer.status(), ResolveStatus::BadName);
        assert!(resolver.wire.udp_sent.is_empty());
    }

    #[test]
    fn test_syntax_only_validates_without_querying() {
        let mut resolver = forwarding();
        let now = Instant::now();
        let options = LookupOptions { syntax_only: true, ..LookupOptions::default() };
        let answer = resolver
            .resolve("www.example.com", RecordType::A, options, None, now)
            .unwrap();
        assert!(answer.is_ok());
        assert!(answer.records().is_empty());
        assert!(resolver.wire.udp_sent.is_empty());
    }

    #[test]
    fn test_localhost_never_queries() {
        let mut resolver = forwarding();
        let now = Instant::now();
        let answer = resolver
            .resolve("localhost", RecordType::A, LookupOptions::default(), None, now)
            .unwrap();
        assert_eq!(answer.ip(), Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));

        let answer = resolver
            .resolve("localhost", RecordType::AAAA, LookupOptions::default(), None, now)
            .unwrap();
        assert_eq!(answer.ip(), Some(IpAddr::V6(Ipv6Addr::LOCALHOST)));

        let answer = resolver
            .resolve("localhost", RecordType::MX, LookupOptions::default(), None, now)
            .unwrap();
        assert_eq!(answer.status(), ResolveStatus::NoDomain);

        let answer = resolver
            .resolve_addr(IpAddr::V4(Ipv4Addr::LOCALHOST), LookupOptions::default(), None, now)
            .unwrap();
        assert_eq!(answer.records()[0].data().as_ptr(), Some(&name("localhost")));
        assert!(resolver.wire.udp_sent.is_empty());
    }

    #[test]
    fn test_forwarded_lookup_round_trip() {
        let mut resolver = forwarding();
        let now = Instant::now();
        let sink = inbox();
        let pending = resolver.resolve(
            "www.example.com",
            RecordType::A,
            LookupOptions::default(),
            on_answer(&sink, 1, 7),
            now,
        );
        assert!(pending.is_none());
        assert_eq!(resolver.wire.udp_sent.len(), 1);
        let (_, query, target) = sent_question(&resolver.wire, 0, now);
        assert_eq!(target, UPSTREAM);
        assert_eq!(query.name(), &name("www.example.com"));
        let sent = Message::read(&resolver.wire.udp_sent[0].2, now, Duration::ZERO).unwrap();
        assert!(sent.header().recursion_desired());

        reply(&mut resolver, 0, ResponseCode::NoError, now, |_, message| {
            message.add_answer(a_record("www.example.com", [192, 0, 2, 10], 300, now));
        });
        {
            let delivered = sink.lock().unwrap();
            assert_eq!(delivered.len(), 1);
            let (token, answer) = &delivered[0];
            assert_eq!(*token, 7);
            assert!(answer.is_ok());
            assert_eq!(answer.ip(), Some(IpAddr::from([192, 0, 2, 10])));
            assert_eq!(answer.server(), Some(UPSTREAM.ip()));
        }
        assert_eq!(resolver.outstanding(), 0);

        // the answer is now cached and settles without the wire
        let cached = resolver
            .resolve("www.example.com", RecordType::A, LookupOptions::default(), None, now)
            .unwrap();
        assert!(cached.is_ok());
        assert_eq!(resolver.wire.udp_sent.len(), 1);
    }

    #[test]
    fn test_identical_lookups_coalesce() {
        let mut resolver = forwarding();
        let now = Instant::now();
        let sink = inbox();
        resolver.resolve(
            "www.example.com",
            RecordType::A,
            LookupOptions::default(),
            on_answer(&sink, 1, 1),
            now,
        );
        resolver.resolve(
            "WWW.EXAMPLE.COM",
            RecordType::A,
            LookupOptions::default(),
            on_answer(&sink, 1, 2),
            now,
        );
        assert_eq!(resolver.wire.udp_sent.len(), 1);
        assert_eq!(resolver.outstanding(), 1);

        reply(&mut resolver, 0, ResponseCode::NoError, now, |_, message| {
            message.add_answer(a_record("www.example.com", [192, 0, 2, 10], 300, now));
        });
        let delivered = sink.lock().unwrap();
        let tokens: Vec<u64> = delivered.iter().map(|(token, _)| *token).collect();
        assert_eq!(tokens, vec![1, 2]);
    }

    #[test]
    fn test_response_from_wrong_source_is_ignored() {
        let mut resolver = forwarding();
        let now = Instant::now();
        let sink = inbox();
        resolver.resolve(
            "www.example.com",
            RecordType::A,
            LookupOptions::default(),
            on_answer(&sink, 1, 1),
            now,
        );
        let (qid, query, target) = sent_question(&resolver.wire, 0, now);
        let mut message = Message::response(qid, ResponseCode::NoError);
        message.add_query(query);
        message.add_answer(a_record("www.example.com", [192, 0, 2, 10], 300, now));
        let payload = message.to_vec(now).unwrap();

        let spoofer = SocketAddr::new(IpAddr::from([198, 51, 100, 99]), 53);
        resolver.handle_udp(spoofer, &payload, now);
        assert!(sink.lock().unwrap().is_empty());
        assert_eq!(resolver.outstanding(), 1);

        resolver.handle_udp(target, &payload, now);
        assert_eq!(sink.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_query_id_is_ignored() {
        let mut resolver = forwarding();
        let now = Instant::now();
        let sink = inbox();
        resolver.resolve(
            "www.example.com",
            RecordType::A,
            LookupOptions::default(),
            on_answer(&sink, 1, 1),
            now,
        );
        let (qid, query, target) = sent_question(&resolver.wire, 0, now);
        let mut message = Message::response(qid.wrapping_add(1), ResponseCode::NoError);
        message.add_query(query);
        message.add_answer(a_record("www.example.com", [192, 0, 2, 10], 300, now));
        let payload = message.to_vec(now).unwrap();
        resolver.handle_udp(target, &payload, now);
        assert!(sink.lock().unwrap().is_empty());
        assert_eq!(resolver.outstanding(), 1);
    }

    #[test]
    fn test_retries_back_off_then_time_out() {
        let mut resolver = forwarding();
        let now = Instant::now();
        let sink = inbox();
        resolver.resolve(
            "www.example.com",
            RecordType::A,
            LookupOptions::default(),
            on_answer(&sink, 1, 1),
            now,
        );
        // first deadline: the base retry timeout
        assert_eq!(resolver.next_deadline(), Some(now + Duration::from_secs(5)));

        let first_retry = now + Duration::from_secs(5);
        resolver.process_timeouts(first_retry);
        assert_eq!(resolver.wire.udp_sent.len(), 2);
        // second deadline adds one backoff step
        assert_eq!(resolver.next_deadline(), Some(first_retry + Duration::from_secs(7)));

        let second_retry = first_retry + Duration::from_secs(7);
        resolver.process_timeouts(second_retry);
        assert_eq!(resolver.wire.udp_sent.len(), 3);

        let exhausted = second_retry + Duration::from_secs(9);
        resolver.process_timeouts(exhausted);
        assert_eq!(resolver.wire.udp_sent.len(), 3);
        assert_eq!(sink.lock().unwrap()[0].1.status(), ResolveStatus::Timeout);
        assert_eq!(resolver.outstanding(), 0);

        // every transmission reused the same query id
        let qids: Vec<u16> = (0..3).map(|i| sent_question(&resolver.wire, i, now).0).collect();
        assert!(qids.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[test]
    fn test_send_failure_reported_from_timeout_pass() {
        let mut resolver = forwarding();
        resolver.wire.fail_udp = true;
        let now = Instant::now();
        let sink = inbox();
        let pending = resolver.resolve(
            "www.example.com",
            RecordType::A,
            LookupOptions::default(),
            on_answer(&sink, 1, 1),
            now,
        );
        // a send failure never surfaces inside the resolve call itself
        assert!(pending.is_none());
        assert!(sink.lock().unwrap().is_empty());

        for _ in 0..3 {
            resolver.process_timeouts(now);
        }
        assert_eq!(sink.lock().unwrap().len(), 1);
        assert_eq!(sink.lock().unwrap()[0].1.status(), ResolveStatus::Error);
    }

    #[test]
    fn test_nxdomain_is_negatively_cached() {
        let mut resolver = forwarding();
        let now = Instant::now();
        let sink = inbox();
        resolver.resolve(
            "gone.example.com",
            RecordType::A,
            LookupOptions::default(),
            on_answer(&sink, 1, 1),
            now,
        );
        reply(&mut resolver, 0, ResponseCode::NXDomain, now, |_, message| {
            message.add_name_server(soa_record("example.com", 60, 600, now));
        });
        {
            let delivered = sink.lock().unwrap();
            assert_eq!(delivered[0].1.status(), ResolveStatus::NoDomain);
            assert_eq!(delivered[0].1.negative_ttl(), Some(Duration::from_secs(60)));
        }

        // within the negative window the answer is local
        let cached = resolver
            .resolve("gone.example.com", RecordType::A, LookupOptions::default(), None, now)
            .unwrap();
        assert_eq!(cached.status(), ResolveStatus::NoDomain);
        assert_eq!(resolver.wire.udp_sent.len(), 1);

        // after it expires the question goes back out
        let later = now + Duration::from_secs(61);
        let pending = resolver.resolve(
            "gone.example.com",
            RecordType::A,
            LookupOptions::default(),
            None,
            later,
        );
        assert!(pending.is_none());
        assert_eq!(resolver.wire.udp_sent.len(), 2);
    }

    #[test]
    fn test_empty_answer_gets_second_opinion() {
        let mut resolver = forwarding();
        let now = Instant::now();
        let sink = inbox();
        resolver.resolve(
            "www.example.com",
            RecordType::AAAA,
            LookupOptions::default(),
            on_answer(&sink, 1, 1),
            now,
        );
        reply(&mut resolver, 0, ResponseCode::NoError, now, |_, _| {});
        // not settled yet: the engine asked once more
        assert!(sink.lock().unwrap().is_empty());
        assert_eq!(resolver.wire.udp_sent.len(), 2);

        reply(&mut resolver, 1, ResponseCode::NoError, now, |_, _| {});
        assert_eq!(sink.lock().unwrap()[0].1.status(), ResolveStatus::NoDomain);
    }

    #[test]
    fn test_truncation_promotes_to_tcp() {
        let mut resolver = forwarding();
        let now = Instant::now();
        let sink = inbox();
        resolver.resolve(
            "big.example.com",
            RecordType::TXT,
            LookupOptions::default(),
            on_answer(&sink, 1, 1),
            now,
        );
        reply(&mut resolver, 0, ResponseCode::NoError, now, |_, message| {
            message.header_mut().set_truncated(true);
        });
        assert_eq!(resolver.wire.tcp_opened.len(), 1);
        let (token, target) = resolver.wire.tcp_opened[0];
        assert_eq!(target, UPSTREAM);

        // the stream payload carries the big-endian length prefix
        let (sent_token, framed) = resolver.wire.tcp_sent[0].clone();
        assert_eq!(sent_token, token);
        let length = u16::from_be_bytes([framed[0], framed[1]]) as usize;
        assert_eq!(length, framed.len() - 2);

        let sent = Message::read(&framed[2..], now, Duration::ZERO).unwrap();
        let mut message = Message::response(sent.header().id(), ResponseCode::NoError);
        message.add_query(sent.queries()[0].clone());
        message.add_answer(Record::from_rdata(
            name("big.example.com"),
            now + Duration::from_secs(300),
            RData::TXT(TXT::new(vec!["hello".into()])),
        ));
        let payload = message.to_vec(now).unwrap();
        resolver.handle_tcp(token, &payload, now);

        assert!(sink.lock().unwrap()[0].1.is_ok());
        // completion closed the stream
        assert_eq!(resolver.wire.tcp_closed, vec![token]);
    }

    #[test]
    fn test_stream_failure_is_an_error() {
        let mut resolver = forwarding();
        let now = Instant::now();
        let sink = inbox();
        resolver.resolve(
            "big.example.com",
            RecordType::TXT,
            LookupOptions::default(),
            on_answer(&sink, 1, 1),
            now,
        );
        reply(&mut resolver, 0, ResponseCode::NoError, now, |_, message| {
            message.header_mut().set_truncated(true);
        });
        let (token, _) = resolver.wire.tcp_opened[0];
        resolver.handle_tcp_error(token, now);
        assert_eq!(sink.lock().unwrap()[0].1.status(), ResolveStatus::Error);
        // the wire reported the stream dead; the engine must not close it again
        assert!(resolver.wire.tcp_closed.is_empty());
    }

    #[test]
    fn test_mail_lookup_spawns_glue_subquery() {
        let mut resolver = forwarding();
        let now = Instant::now();
        let sink = inbox();
        resolver.resolve(
            "example.com",
            RecordType::MX,
            LookupOptions::default(),
            on_answer(&sink, 1, 1),
            now,
        );
        reply(&mut resolver, 0, ResponseCode::NoError, now, |_, message| {
            message.add_answer(mx_record("example.com", 10, "mail.example.com", now));
        });
        // the exchanger needs an address, asked for on a second handle
        assert!(sink.lock().unwrap().is_empty());
        assert_eq!(resolver.wire.udp_sent.len(), 2);
        let (_, sub_question, _) = sent_question(&resolver.wire, 1, now);
        assert_eq!(sub_question.name(), &name("mail.example.com"));
        assert_eq!(sub_question.query_type(), RecordType::A);

        reply(&mut resolver, 1, ResponseCode::NoError, now, |_, message| {
            message.add_answer(a_record("mail.example.com", [192, 0, 2, 25], 300, now));
        });
        {
            let delivered = sink.lock().unwrap();
            assert_eq!(delivered.len(), 1);
            let answer = &delivered[0].1;
            assert!(answer.is_ok());
            assert_eq!(answer.ip(), Some(IpAddr::from([192, 0, 2, 25])));
        }
        // the sub-answer went through the cache on its own key
        let cached = resolver
            .resolve("mail.example.com", RecordType::A, LookupOptions::default(), None, now)
            .unwrap();
        assert!(cached.is_ok());
    }

    #[test]
    fn test_mail_answers_are_capped_and_sorted() {
        let mut resolver = forwarding();
        let now = Instant::now();
        let sink = inbox();
        resolver.resolve(
            "example.com",
            RecordType::MX,
            LookupOptions::default(),
            on_answer(&sink, 1, 1),
            now,
        );
        reply(&mut resolver, 0, ResponseCode::NoError, now, |_, message| {
            for i in 0..10u16 {
                // descending preference, so sorting is observable
                message.add_answer(mx_record(
                    "example.com",
                    100 - i * 10,
                    &format!("mx{i}.example.com"),
                    now,
                ));
            }
            for i in 0..10u16 {
                message.add_additional(a_record(
                    &format!("mx{i}.example.com"),
                    [192, 0, 2, 100 + i as u8],
                    300,
                    now,
                ));
            }
        });
        let delivered = sink.lock().unwrap();
        let answer = &delivered[0].1;
        assert!(answer.is_ok());
        assert_eq!(answer.records().len(), 8);
        let preferences: Vec<u16> = answer
            .records()
            .iter()
            .filter_map(|record| record.data().as_mx().map(MX::preference))
            .collect();
        let mut sorted = preferences.clone();
        sorted.sort_unstable();
        assert_eq!(preferences, sorted);
    }

    #[test]
    fn test_recursive_lookup_follows_referral() {
        let mut resolver = recursive();
        let now = Instant::now();
        let sink = inbox();
        resolver.resolve(
            "www.example.com",
            RecordType::A,
            LookupOptions::default(),
            on_answer(&sink, 1, 1),
            now,
        );
        let (_, _, hint) = sent_question(&resolver.wire, 0, now);
        assert!(ROOT_HINTS.contains(&hint.ip()));
        let sent = Message::read(&resolver.wire.udp_sent[0].2, now, Duration::ZERO).unwrap();
        assert!(!sent.header().recursion_desired());

        reply(&mut resolver, 0, ResponseCode::NoError, now, |_, message| {
            message.add_name_server(ns_record("example.com", "ns1.example.com", now));
            message.add_additional(a_record("ns1.example.com", [198, 51, 100, 53], 300, now));
        });
        assert_eq!(resolver.wire.udp_sent.len(), 2);
        let (_, question, delegated) = sent_question(&resolver.wire, 1, now);
        assert_eq!(delegated, SocketAddr::from(([198, 51, 100, 53], 53)));
        assert_eq!(question.name(), &name("www.example.com"));

        reply(&mut resolver, 1, ResponseCode::NoError, now, |_, message| {
            message.add_answer(a_record("www.example.com", [203, 0, 113, 80], 300, now));
        });
        assert!(sink.lock().unwrap()[0].1.is_ok());

        // the delegation is cached for later selections
        assert_eq!(
            resolver.cache().lookup_name_server(&name("example.com"), now),
            NsLookup::Addr(SocketAddr::from(([198, 51, 100, 53], 53)))
        );
    }

    #[test]
    fn test_referral_budget_bounds_delegation_chains() {
        // forwarding mode tolerates exactly one delegation by default
        let mut resolver = forwarding();
        let now = Instant::now();
        let sink = inbox();
        resolver.resolve(
            "www.example.com",
            RecordType::A,
            LookupOptions::default(),
            on_answer(&sink, 1, 1),
            now,
        );
        reply(&mut resolver, 0, ResponseCode::NoError, now, |_, message| {
            message.add_name_server(ns_record("example.com", "ns1.example.com", now));
            message.add_additional(a_record("ns1.example.com", [198, 51, 100, 53], 300, now));
        });
        assert_eq!(resolver.wire.udp_sent.len(), 2);

        reply(&mut resolver, 1, ResponseCode::NoError, now, |_, message| {
            message.add_name_server(ns_record("www.example.com", "ns2.example.com", now));
            message.add_additional(a_record("ns2.example.com", [198, 51, 100, 54], 300, now));
        });
        assert_eq!(sink.lock().unwrap()[0].1.status(), ResolveStatus::BadResponse);
    }

    #[test]
    fn test_unglued_referral_resolves_the_nameserver() {
        let mut resolver = forwarding();
        let now = Instant::now();
        let sink = inbox();
        resolver.resolve(
            "www.example.com",
            RecordType::A,
            LookupOptions::default(),
            on_answer(&sink, 1, 1),
            now,
        );
        reply(&mut resolver, 0, ResponseCode::NoError, now, |_, message| {
            message.add_name_server(ns_record("example.com", "ns1.example.com", now));
        });
        // no glue: the nameserver's own address is looked up first
        assert_eq!(resolver.wire.udp_sent.len(), 2);
        let (_, question, _) = sent_question(&resolver.wire, 1, now);
        assert_eq!(question.name(), &name("ns1.example.com"));

        reply(&mut resolver, 1, ResponseCode::NoError, now, |_, message| {
            message.add_answer(a_record("ns1.example.com", [203, 0, 113, 5], 300, now));
        });
        assert_eq!(resolver.wire.udp_sent.len(), 3);
        let (_, question, delegated) = sent_question(&resolver.wire, 2, now);
        assert_eq!(question.name(), &name("www.example.com"));
        assert_eq!(delegated, SocketAddr::from(([203, 0, 113, 5], 53)));

        reply(&mut resolver, 2, ResponseCode::NoError, now, |_, message| {
            message.add_answer(a_record("www.example.com", [203, 0, 113, 80], 300, now));
        });
        assert!(sink.lock().unwrap()[0].1.is_ok());
    }

    #[test]
    fn test_self_referral_deadlocks() {
        let mut resolver = forwarding();
        let now = Instant::now();
        let sink = inbox();
        resolver.resolve(
            "ns1.example.com",
            RecordType::A,
            LookupOptions::default(),
            on_answer(&sink, 1, 1),
            now,
        );
        // the delegation names the very host being resolved
        reply(&mut resolver, 0, ResponseCode::NoError, now, |_, message| {
            message.add_name_server(ns_record("example.com", "ns1.example.com", now));
        });
        assert_eq!(sink.lock().unwrap()[0].1.status(), ResolveStatus::Deadlock);
    }

    #[test]
    fn test_mutual_referral_deadlocks() {
        let mut resolver = forwarding();
        let now = Instant::now();
        let sink = inbox();
        resolver.resolve(
            "ns-a.zone-a.example",
            RecordType::A,
            LookupOptions::default(),
            on_answer(&sink, 1, 1),
            now,
        );
        reply(&mut resolver, 0, ResponseCode::NoError, now, |_, message| {
            message.add_name_server(ns_record("zone-a.example", "ns-b.zone-b.example", now));
        });
        // the nameserver lookup went out; answer it with the mirror delegation
        assert_eq!(resolver.wire.udp_sent.len(), 2);
        reply(&mut resolver, 1, ResponseCode::NoError, now, |_, message| {
            message.add_name_server(ns_record("zone-b.example", "ns-a.zone-a.example", now));
        });
        let delivered = sink.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].1.status(), ResolveStatus::Deadlock);
        drop(delivered);
        assert_eq!(resolver.outstanding(), 0);
    }

    #[test]
    fn test_lookup_parks_behind_inflight_ns_query() {
        let mut resolver = recursive();
        let now = Instant::now();
        let ns_sink = inbox();
        let www_sink = inbox();
        resolver.resolve(
            "example.com",
            RecordType::NS,
            LookupOptions::default(),
            on_answer(&ns_sink, 1, 1),
            now,
        );
        assert_eq!(resolver.wire.udp_sent.len(), 1);

        // the address lookup finds the NS query in flight and parks
        let pending = resolver.resolve(
            "www.example.com",
            RecordType::A,
            LookupOptions::default(),
            on_answer(&www_sink, 2, 2),
            now,
        );
        assert!(pending.is_none());
        assert_eq!(resolver.wire.udp_sent.len(), 1);

        reply(&mut resolver, 0, ResponseCode::NoError, now, |_, message| {
            message.add_answer(ns_record("example.com", "ns1.example.com", now));
            message.add_additional(a_record("ns1.example.com", [198, 51, 100, 10], 300, now));
        });
        assert!(ns_sink.lock().unwrap()[0].1.is_ok());
        // the parked query woke up aimed at the cached nameserver
        assert_eq!(resolver.wire.udp_sent.len(), 2);
        let (_, question, target) = sent_question(&resolver.wire, 1, now);
        assert_eq!(question.name(), &name("www.example.com"));
        assert_eq!(target, SocketAddr::from(([198, 51, 100, 10], 53)));

        reply(&mut resolver, 1, ResponseCode::NoError, now, |_, message| {
            message.add_answer(a_record("www.example.com", [203, 0, 113, 80], 300, now));
        });
        assert!(www_sink.lock().unwrap()[0].1.is_ok());
    }

    #[test]
    fn test_partial_nameserver_set_unblocks_parked_queries() {
        let mut resolver = recursive();
        let now = Instant::now();
        let ns_sink = inbox();
        let www_sink = inbox();
        resolver.resolve(
            "example.com",
            RecordType::NS,
            LookupOptions::default(),
            on_answer(&ns_sink, 1, 1),
            now,
        );
        resolver.resolve(
            "www.example.com",
            RecordType::A,
            LookupOptions::default(),
            on_answer(&www_sink, 2, 2),
            now,
        );
        assert_eq!(resolver.wire.udp_sent.len(), 1);

        // two nameservers, glue for only one
        reply(&mut resolver, 0, ResponseCode::NoError, now, |_, message| {
            message.add_answer(ns_record("example.com", "ns1.example.com", now));
            message.add_answer(ns_record("example.com", "ns2.example.com", now));
            message.add_additional(a_record("ns1.example.com", [198, 51, 100, 10], 300, now));
        });
        // the ns2 address is being fetched, and the parked query moved on ns1
        assert!(ns_sink.lock().unwrap().is_empty());
        assert_eq!(resolver.wire.udp_sent.len(), 3);
        let (_, sub_question, _) = sent_question(&resolver.wire, 1, now);
        assert_eq!(sub_question.name(), &name("ns2.example.com"));
        let (_, parked_question, parked_target) = sent_question(&resolver.wire, 2, now);
        assert_eq!(parked_question.name(), &name("www.example.com"));
        assert_eq!(parked_target, SocketAddr::from(([198, 51, 100, 10], 53)));

        reply(&mut resolver, 2, ResponseCode::NoError, now, |_, message| {
            message.add_answer(a_record("www.example.com", [203, 0, 113, 80], 300, now));
        });
        assert!(www_sink.lock().unwrap()[0].1.is_ok());

        // once the straggler answers, the external caller gets the full set
        reply(&mut resolver, 1, ResponseCode::NoError, now, |_, message| {
            message.add_answer(a_record("ns2.example.com", [198, 51, 100, 11], 300, now));
        });
        let delivered = ns_sink.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].1.is_ok());
        assert_eq!(delivered[0].1.records().len(), 2);
    }

    #[test]
    fn test_cancel_detaches_a_caller() {
        let mut resolver = forwarding();
        let now = Instant::now();
        let sink = inbox();
        resolver.resolve(
            "www.example.com",
            RecordType::A,
            LookupOptions::default(),
            on_answer(&sink, 1, 1),
            now,
        );
        resolver.resolve(
            "www.example.com",
            RecordType::A,
            LookupOptions::default(),
            on_answer(&sink, 2, 2),
            now,
        );
        assert_eq!(resolver.cancel(CallerId(1)), 1);
        assert_eq!(resolver.cancel(CallerId(9)), 0);
        // the query itself keeps running
        assert_eq!(resolver.outstanding(), 1);

        reply(&mut resolver, 0, ResponseCode::NoError, now, |_, message| {
            message.add_answer(a_record("www.example.com", [192, 0, 2, 10], 300, now));
        });
        let delivered = sink.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, 2);
    }

    #[test]
    fn test_stop_flushes_shutdown() {
        let mut resolver = forwarding();
        let now = Instant::now();
        let sink = inbox();
        resolver.resolve(
            "www.example.com",
            RecordType::A,
            LookupOptions::default(),
            on_answer(&sink, 1, 1),
            now,
        );
        resolver.resolve(
            "big.example.com",
            RecordType::TXT,
            LookupOptions::default(),
            on_answer(&sink, 1, 2),
            now,
        );
        // promote the second lookup so a stream is open at stop time
        reply(&mut resolver, 1, ResponseCode::NoError, now, |_, message| {
            message.header_mut().set_truncated(true);
        });
        let (token, _) = resolver.wire.tcp_opened[0];

        resolver.stop();
        let delivered = sink.lock().unwrap();
        assert_eq!(delivered.len(), 2);
        assert!(delivered.iter().all(|(_, answer)| answer.status() == ResolveStatus::Shutdown));
        drop(delivered);
        assert_eq!(resolver.outstanding(), 0);
        assert!(resolver.wire.tcp_closed.contains(&token));

        // later lookups refuse synchronously
        let refused = resolver
            .resolve("www.example.com", RecordType::A, LookupOptions::default(), None, now)
            .unwrap();
        assert_eq!(refused.status(), ResolveStatus::Shutdown);
    }

    #[test]
    fn test_query_id_exhaustion_parks_and_recovers() {
        let mut resolver = forwarding();
        let now = Instant::now();
        let sink = inbox();
        for qid in 1..=u16::MAX {
            resolver.by_qid.insert(qid, HandleId(u64::MAX));
        }
        let pending = resolver.resolve(
            "www.example.com",
            RecordType::A,
            LookupOptions::default(),
            on_answer(&sink, 1, 1),
            now,
        );
        assert!(pending.is_none());
        assert!(resolver.wire.udp_sent.is_empty());
        assert_eq!(resolver.next_deadline(), Some(now + Duration::from_millis(100)));

        resolver.by_qid.remove(&1234);
        let retry = now + Duration::from_millis(100);
        resolver.process_timeouts(retry);
        assert_eq!(resolver.wire.udp_sent.len(), 1);
        let (qid, _, _) = sent_question(&resolver.wire, 0, retry);
        assert_eq!(qid, 1234);
    }

    #[test]
    fn test_callback_may_start_new_lookups() {
        let mut resolver = forwarding();
        let now = Instant::now();
        let reentry = Caller {
            id: CallerId(1),
            token: 1,
            callback: Box::new(move |resolver: &mut Resolver<MockWire>, _, _| {
                let _ = resolver.resolve(
                    "other.example.com",
                    RecordType::A,
                    LookupOptions::default(),
                    None,
                    now,
                );
            }),
        };
        resolver.resolve(
            "www.example.com",
            RecordType::A,
            LookupOptions::default(),
            Some(reentry),
            now,
        );
        reply(&mut resolver, 0, ResponseCode::NoError, now, |_, message| {
            message.add_answer(a_record("www.example.com", [192, 0, 2, 10], 300, now));
        });
        assert_eq!(resolver.wire.udp_sent.len(), 2);
        let (_, question, _) = sent_question(&resolver.wire, 1, now);
        assert_eq!(question.name(), &name("other.example.com"));
    }

    #[test]
    fn test_cache_expiry_sends_again() {
        let mut resolver = forwarding();
        let now = Instant::now();
        resolver.resolve("www.example.com", RecordType::A, LookupOptions::default(), None, now);
        reply(&mut resolver, 0, ResponseCode::NoError, now, |_, message| {
            message.add_answer(a_record("www.example.com", [192, 0, 2, 10], 5, now));
        });

        let fresh = now + Duration::from_secs(4);
        assert!(resolver
            .resolve("www.example.com", RecordType::A, LookupOptions::default(), None, fresh)
            .is_some());
        assert_eq!(resolver.wire.udp_sent.len(), 1);

        let stale = now + Duration::from_secs(6);
        assert!(resolver
            .resolve("www.example.com", RecordType::A, LookupOptions::default(), None, stale)
            .is_none());
        assert_eq!(resolver.wire.udp_sent.len(), 2);
    }

    #[test]
    fn test_cache_only_lookup_never_queries() {
        let mut resolver = forwarding();
        let now = Instant::now();
        let answer = resolver
            .resolve("www.example.com", RecordType::A, LookupOptions::cache_only(), None, now)
            .unwrap();
        assert_eq!(answer.status(), ResolveStatus::NoDomain);
        assert!(resolver.wire.udp_sent.is_empty());
    }

    #[test]
    fn test_alias_chain_served_from_cache() {
        let mut resolver = forwarding();
        let now = Instant::now();
        resolver.resolve("www.example.com", RecordType::A, LookupOptions::default(), None, now);
        reply(&mut resolver, 0, ResponseCode::NoError, now, |_, message| {
            message.add_answer(cname_record("www.example.com", "host.example.com", now));
            message.add_answer(a_record("host.example.com", [192, 0, 2, 33], 300, now));
        });

        // the tail is cached under its own name
        let direct = resolver
            .resolve("host.example.com", RecordType::A, LookupOptions::default(), None, now)
            .unwrap();
        assert!(direct.is_ok());

        // the alias owner is answered by chasing the cached chain
        let chased = resolver
            .resolve("www.example.com", RecordType::A, LookupOptions::default(), None, now)
            .unwrap();
        assert!(chased.is_ok());
        assert_eq!(chased.ip(), Some(IpAddr::from([192, 0, 2, 33])));
        assert_eq!(resolver.wire.udp_sent.len(), 1);
    }

    #[test]
    fn test_intermediates_can_be_stripped() {
        let mut resolver = Resolver::new(
            ResolverConfig::forwarding(vec![UPSTREAM]),
            ResolverOpts { preserve_intermediates: false, ..opts() },
            MockWire::default(),
        );
        let now = Instant::now();
        let sink = inbox();
        resolver.resolve(
            "www.example.com",
            RecordType::A,
            LookupOptions::default(),
            on_answer(&sink, 1, 1),
            now,
        );
        reply(&mut resolver, 0, ResponseCode::NoError, now, |_, message| {
            message.add_answer(cname_record("www.example.com", "host.example.com", now));
            message.add_answer(a_record("host.example.com", [192, 0, 2, 33], 300, now));
        });
        let delivered = sink.lock().unwrap();
        let answer = &delivered[0].1;
        assert_eq!(answer.records().len(), 1);
        assert_eq!(answer.records()[0].record_type(), RecordType::A);
    }

    #[test]
    fn test_root_hints_rotate() {
        let mut resolver = recursive();
        let now = Instant::now();
        resolver.resolve("a.example", RecordType::A, LookupOptions::default(), None, now);
        resolver.resolve("b.example", RecordType::A, LookupOptions::default(), None, now);
        assert_eq!(resolver.wire.udp_sent.len(), 2);
        let first = resolver.wire.udp_sent[0].1;
        let second = resolver.wire.udp_sent[1].1;
        assert_ne!(first, second);
        assert!(ROOT_HINTS.contains(&first.ip()));
        assert!(ROOT_HINTS.contains(&second.ip()));
    }

    #[test]
    fn test_fire_and_forget_warms_the_cache() {
        let mut resolver = forwarding();
        let now = Instant::now();
        let pending =
            resolver.resolve("www.example.com", RecordType::A, LookupOptions::default(), None, now);
        assert!(pending.is_none());
        reply(&mut resolver, 0, ResponseCode::NoError, now, |_, message| {
            message.add_answer(a_record("www.example.com", [192, 0, 2, 10], 300, now));
        });
        let warmed = resolver
            .resolve("www.example.com", RecordType::A, LookupOptions::default(), None, now)
            .unwrap();
        assert!(warmed.is_ok());
    }

    #[test]
    fn test_waiting_cycles_are_detected() {
        let mut resolver = forwarding();
        let a = resolver.create_handle(QueryKey::name(RecordType::A, name("a.example")), 0, None);
        let b = resolver.create_handle(QueryKey::name(RecordType::A, name("b.example")), 0, None);
        let c = resolver.create_handle(QueryKey::name(RecordType::A, name("c.example")), 0, None);
        // b waits on a, c waits on b
        resolver
            .handles
            .get_mut(&a)
            .unwrap()
            .waiters
            .push(Waiter::Parent { handle: b, purpose: SubPurpose::NsWait });
        resolver
            .handles
            .get_mut(&b)
            .unwrap()
            .waiters
            .push(Waiter::Parent { handle: c, purpose: SubPurpose::NsWait });

        // a waiting on c would close the loop
        assert!(resolver.would_deadlock(a, c));
        // c already waits on a transitively; adding more of the same is fine
        assert!(!resolver.would_deadlock(c, a));
        assert!(resolver.would_deadlock(a, a));
    }
}
