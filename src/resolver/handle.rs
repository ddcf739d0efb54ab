// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! One in-flight exchange and the callers attached to it.

use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use smallvec::SmallVec;

use crate::lookup::{Answer, QueryKey};
use crate::op::Query;
use crate::rr::{Name, Record};
use crate::transport::{Protocol, TcpToken};

use super::Resolver;

/// Identifies one [`QueryHandle`] in the engine's maps for its lifetime.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) struct HandleId(pub(crate) u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q#{}", self.0)
    }
}

/// Identifies an external caller across requests, chosen by the host.
///
/// [`Resolver::cancel`] detaches every waiter registered under the id.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct CallerId(pub u64);

/// Delivered exactly once with the caller's token and the answer.
///
/// The callback runs on the thread driving the resolver and may re-enter it:
/// resolving again, cancelling, even stopping the whole engine.
pub type ResolveCallback<W> = Box<dyn FnOnce(&mut Resolver<W>, u64, Answer) + Send>;

/// An external party waiting on a lookup.
pub struct Caller<W> {
    /// Identity for [`Resolver::cancel`]; many requests may share one
    pub id: CallerId,
    /// Opaque per-request value handed back through the callback
    pub token: u64,
    /// Invoked exactly once when the lookup settles
    pub callback: ResolveCallback<W>,
}

impl<W> fmt::Debug for Caller<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Caller")
            .field("id", &self.id)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

/// Why a handle waits on another handle.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum SubPurpose {
    /// An address lookup for one of the parent's record targets
    Glue {
        /// the target name the addresses are for
        target: Name,
    },
    /// An address lookup for the nameserver a referral pointed at
    Referral,
    /// The parent cannot pick a server until this NS lookup settles
    NsWait,
}

/// One entry in a handle's FIFO waiter list.
pub(crate) enum Waiter<W> {
    /// An external caller
    Caller(Caller<W>),
    /// Another handle, waiting as part of its own resolution
    Parent {
        /// the waiting handle
        handle: HandleId,
        /// what the wait is for
        purpose: SubPurpose,
    },
}

impl<W> Waiter<W> {
    /// The caller id when the waiter is external
    pub(crate) fn caller_id(&self) -> Option<CallerId> {
        match self {
            Self::Caller(caller) => Some(caller.id),
            Self::Parent { .. } => None,
        }
    }
}

/// Where a handle stands between construction and release.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum HandleState {
    /// Constructed; nothing on the wire yet. Also the parked state while
    ///  waiting on another handle for a usable server.
    Unissued,
    /// Parked because every query id was in flight
    BlockedOnQid,
    /// Question sent, deadline armed
    AwaitingResponse,
    /// Response consumed; sub-queries are filling in addresses, or the
    ///  referral target is being resolved (`awaiting_redirect`)
    ResolvingGlue,
}

/// One in-flight DNS exchange plus its dependents.
///
/// The key is immutable for the handle's lifetime; it indexes the pending
/// map. Everything else is working state the engine drives through the
/// lifecycle: Unissued, optionally BlockedOnQid, AwaitingResponse,
/// optionally ResolvingGlue, then completed and removed from every map.
pub(crate) struct QueryHandle<W> {
    pub(crate) id: HandleId,
    pub(crate) key: QueryKey,
    pub(crate) question: Query,
    pub(crate) state: HandleState,
    /// 0 means unallocated
    pub(crate) qid: u16,
    pub(crate) protocol: Protocol,
    pub(crate) server: Option<SocketAddr>,
    /// once pinned, retries and reissues stay on `server`
    pub(crate) ip_pinned: bool,
    /// transmissions made so far
    pub(crate) attempt: usize,
    pub(crate) deadline: Option<Instant>,
    pub(crate) tcp: Option<TcpToken>,
    /// accumulated answer records; some may still be missing addresses
    pub(crate) records: Vec<Record>,
    pub(crate) open_subqueries: usize,
    /// notified exactly once each, in registration order
    pub(crate) waiters: SmallVec<[Waiter<W>; 2]>,
    /// sub-query chain depth, 0 for external requests
    pub(crate) depth: usize,
    /// referrals followed so far
    pub(crate) referrals: usize,
    /// the last transmission failed at the wire
    pub(crate) wire_error: bool,
    /// a NOERROR response with no usable records was seen; one more server
    ///  is tried before completing NoDomain
    pub(crate) nodomain_tentative: bool,
    /// parents were already notified with a partial answer
    pub(crate) partial_notified: bool,
    /// completion of the open sub-query reissues the question instead of
    ///  settling the handle
    pub(crate) awaiting_redirect: bool,
    /// authority-supplied negative lifetime, from a SOA
    pub(crate) negative_ttl: Option<Duration>,
}

impl<W> QueryHandle<W> {
    /// A fresh handle for the key, nothing allocated yet
    pub(crate) fn new(id: HandleId, key: QueryKey, depth: usize) -> Self {
        let question = Query::query(key.question_name(), key.rtype);
        Self {
            id,
            key,
            question,
            state: HandleState::Unissued,
            qid: 0,
            protocol: Protocol::Udp,
            server: None,
            ip_pinned: false,
            attempt: 0,
            deadline: None,
            tcp: None,
            records: Vec::new(),
            open_subqueries: 0,
            waiters: SmallVec::new(),
            depth,
            referrals: 0,
            wire_error: false,
            nodomain_tentative: false,
            partial_notified: false,
            awaiting_redirect: false,
            negative_ttl: None,
        }
    }

    /// Records still missing an address for their target
    pub(crate) fn unresolved(&self) -> usize {
        self.records
            .iter()
            .filter(|record| record.needs_address())
            .count()
    }

    /// Records that are usable as they stand
    pub(crate) fn resolved(&self) -> usize {
        self.records.len() - self.unresolved()
    }

    /// Resets the exchange for a reissue of the same question: fresh query
    ///  id, attempt budget restarted, nothing in flight. The accumulated
    ///  records, waiters and referral count stay.
    pub(crate) fn reset_exchange(&mut self) {
        self.qid = 0;
        self.attempt = 0;
        self.deadline = None;
        self.tcp = None;
        self.wire_error = false;
        self.state = HandleState::Unissued;
    }
}

impl<W> fmt::Debug for QueryHandle<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryHandle")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("state", &self.state)
            .field("qid", &self.qid)
            .field("protocol", &self.protocol)
            .field("server", &self.server)
            .field("attempt", &self.attempt)
            .field("records", &self.records.len())
            .field("open_subqueries", &self.open_subqueries)
            .field("waiters", &self.waiters.len())
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}
