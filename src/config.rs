// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Configuration for a resolver: where queries go and how hard they try.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::transport::{server_addr, DNS_PORT};

/// IP addresses of the IANA root name servers, a.root-servers.net through
/// m.root-servers.net, IPv4 first.
pub const ROOT_HINTS: &[IpAddr] = &[
    IpAddr::V4(Ipv4Addr::new(198, 41, 0, 4)),
    IpAddr::V4(Ipv4Addr::new(199, 9, 14, 201)),
    IpAddr::V4(Ipv4Addr::new(192, 33, 4, 12)),
    IpAddr::V4(Ipv4Addr::new(199, 7, 91, 13)),
    IpAddr::V4(Ipv4Addr::new(192, 203, 230, 10)),
    IpAddr::V4(Ipv4Addr::new(192, 5, 5, 241)),
    IpAddr::V4(Ipv4Addr::new(192, 112, 36, 4)),
    IpAddr::V4(Ipv4Addr::new(198, 97, 190, 53)),
    IpAddr::V4(Ipv4Addr::new(192, 36, 148, 17)),
    IpAddr::V4(Ipv4Addr::new(192, 58, 128, 30)),
    IpAddr::V4(Ipv4Addr::new(193, 0, 14, 129)),
    IpAddr::V4(Ipv4Addr::new(199, 7, 83, 42)),
    IpAddr::V4(Ipv4Addr::new(202, 12, 27, 33)),
    IpAddr::V6(Ipv6Addr::new(0x2001, 0x503, 0xba3e, 0, 0, 0, 0x2, 0x30)),
    IpAddr::V6(Ipv6Addr::new(0x2001, 0x500, 0x200, 0, 0, 0, 0, 0xb)),
    IpAddr::V6(Ipv6Addr::new(0x2001, 0x500, 0x2, 0, 0, 0, 0, 0xc)),
    IpAddr::V6(Ipv6Addr::new(0x2001, 0x500, 0x2d, 0, 0, 0, 0, 0xd)),
    IpAddr::V6(Ipv6Addr::new(0x2001, 0x500, 0xa8, 0, 0, 0, 0, 0xe)),
    IpAddr::V6(Ipv6Addr::new(0x2001, 0x500, 0x2f, 0, 0, 0, 0, 0xf)),
    IpAddr::V6(Ipv6Addr::new(0x2001, 0x500, 0x12, 0, 0, 0, 0, 0xd0d)),
    IpAddr::V6(Ipv6Addr::new(0x2001, 0x500, 0x1, 0, 0, 0, 0, 0x53)),
    IpAddr::V6(Ipv6Addr::new(0x2001, 0x7fe, 0, 0, 0, 0, 0, 0x53)),
    IpAddr::V6(Ipv6Addr::new(0x2001, 0x503, 0xc27, 0, 0, 0, 0x2, 0x30)),
    IpAddr::V6(Ipv6Addr::new(0x2001, 0x7fd, 0, 0, 0, 0, 0, 0x1)),
    IpAddr::V6(Ipv6Addr::new(0x2001, 0x500, 0x9f, 0, 0, 0, 0, 0x42)),
    IpAddr::V6(Ipv6Addr::new(0x2001, 0xdc3, 0, 0, 0, 0, 0, 0x35)),
];

/// How the resolver reaches the rest of the DNS.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ResolveMode {
    /// Hand every question to an upstream recursive server (RD set)
    Forwarding,
    /// Walk the delegation tree ourselves, starting from the hints (RD clear)
    Recursive,
}

/// Where queries are sent: the mode plus the server set it starts from.
///
/// In forwarding mode the servers are the upstream resolvers, round-robined.
/// In recursive mode they are the fallback floor when nothing closer to the
/// queried zone is cached; by default the IANA root hints.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResolverConfig {
    mode: ResolveMode,
    servers: Vec<SocketAddr>,
}

impl ResolverConfig {
    /// Creates a forwarding configuration over the given upstream servers
    pub fn forwarding(servers: Vec<SocketAddr>) -> Self {
        Self {
            mode: ResolveMode::Forwarding,
            servers,
        }
    }

    /// Creates a forwarding configuration from bare addresses, port 53
    pub fn forwarding_ips(ips: &[IpAddr]) -> Self {
        Self::forwarding(ips.iter().map(|ip| server_addr(*ip, None)).collect())
    }

    /// Creates a recursive configuration starting from the IANA root hints
    pub fn recursive() -> Self {
        Self {
            mode: ResolveMode::Recursive,
            servers: ROOT_HINTS
                .iter()
                .map(|ip| SocketAddr::new(*ip, DNS_PORT))
                .collect(),
        }
    }

    /// Creates a recursive configuration with an explicit hint set, e.g. a
    ///  host-supplied root hints file
    pub fn recursive_with_hints(servers: Vec<SocketAddr>) -> Self {
        Self {
            mode: ResolveMode::Recursive,
            servers,
        }
    }

    /// Returns the resolution mode
    pub fn mode(&self) -> ResolveMode {
        self.mode
    }

    /// Returns the configured server set
    pub fn servers(&self) -> &[SocketAddr] {
        &self.servers
    }

    /// Replaces the configured server set
    pub fn set_servers(&mut self, servers: Vec<SocketAddr>) {
        self.servers = servers;
    }
}

impl Default for ResolverConfig {
    /// Recursive resolution from the IANA roots; works with no host input
    fn default() -> Self {
        Self::recursive()
    }
}

/// Tuning knobs for the resolver.
///
/// Field layout mirrors the option surface the engine honors; everything has
/// a usable default.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(default, deny_unknown_fields)
)]
pub struct ResolverOpts {
    /// Base wait for a UDP response before the first retry. Defaults to 5 seconds
    pub retry_timeout: Duration,
    /// Added to the wait once per attempt, linear backoff. Defaults to 2 seconds
    pub retry_backoff: Duration,
    /// Upper bound of the random jitter added to every UDP deadline.
    ///  Defaults to 500 milliseconds
    pub jitter_max: Duration,
    /// Timeout for a whole TCP exchange. A single expiry is terminal; TCP
    ///  attempts are never retried. Defaults to 10 seconds
    pub tcp_timeout: Duration,
    /// Number of UDP transmissions before the lookup times out. Defaults to 3
    pub max_retries: usize,
    /// TTLs below this are raised to it before the expiry is computed,
    ///  so a zero-TTL record survives the transaction that carried it.
    ///  Defaults to 1 second
    pub ttl_floor: Duration,
    /// TTLs above this are clamped when the cache absorbs a result.
    ///  Defaults to 1 day
    pub max_ttl: Duration,
    /// Lifetime of a negative cache entry when the authority supplied no SOA
    ///  to derive one from. Defaults to 5 minutes
    pub negative_ttl: Duration,
    /// On a cache collision for the same key, keep the record expiring sooner
    ///  rather than later. Defaults to true
    pub prefer_shorter_ttl: bool,
    /// Quorum for NS answers: accumulation stops at this many records and
    ///  completion does not wait on glue beyond them. Defaults to 8
    pub max_rr_ns: usize,
    /// Quorum for MX answers, as for `max_rr_ns`. Defaults to 8
    pub max_rr_mx: usize,
    /// Cache every additional-section address record, not only those for
    ///  names the answer refers to. Defaults to false
    pub cache_glue_all: bool,
    /// Send every query over TCP from the start. Defaults to false
    pub always_tcp: bool,
    /// Number of UDP source sockets the host binds; transmissions rotate
    ///  over them for source-port diversity. Defaults to 4
    pub udp_send_slots: usize,
    /// Reject single-label names for every lookup, as if each caller passed
    ///  the equivalent per-request option. Defaults to false
    pub must_have_dots: bool,
    /// Referrals followed per request before BadResponse. Unset picks the
    ///  mode default: 1 forwarding, 8 recursive
    pub max_referrals: Option<usize>,
    /// Depth bound on sub-query chains; a glue target beyond it is dropped
    ///  as irrecoverable. Defaults to 8
    pub max_chain_depth: usize,
    /// Notify sub-query parents early when an NS lookup has its first
    ///  usable nameserver address, rather than waiting for the full set.
    ///  Defaults to true
    pub partial_unblock: bool,
    /// How long a query parks when every query ID is in flight before it
    ///  re-attempts allocation. Defaults to 100 milliseconds
    pub qid_retry_delay: Duration,
    /// Keep intermediate CNAME chain records in answers instead of only the
    ///  addresses they lead to. Defaults to true
    pub preserve_intermediates: bool,
}

impl Default for ResolverOpts {
    fn default() -> Self {
        Self {
            retry_timeout: Duration::from_secs(5),
            retry_backoff: Duration::from_secs(2),
            jitter_max: Duration::from_millis(500),
            tcp_timeout: Duration::from_secs(10),
            max_retries: 3,
            ttl_floor: Duration::from_secs(1),
            max_ttl: Duration::from_secs(86_400),
            negative_ttl: Duration::from_secs(300),
            prefer_shorter_ttl: true,
            max_rr_ns: 8,
            max_rr_mx: 8,
            cache_glue_all: false,
            always_tcp: false,
            udp_send_slots: 4,
            must_have_dots: false,
            max_referrals: None,
            max_chain_depth: 8,
            partial_unblock: true,
            qid_retry_delay: Duration::from_millis(100),
            preserve_intermediates: true,
        }
    }
}

impl ResolverOpts {
    /// The referral budget in effect for the given mode
    pub fn referral_budget(&self, mode: ResolveMode) -> usize {
        self.max_referrals.unwrap_or(match mode {
            ResolveMode::Forwarding => 1,
            ResolveMode::Recursive => 8,
        })
    }
}
