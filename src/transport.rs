// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The seam between the engine and the host's sockets.
//!
//! The engine never owns a socket. It asks the [`Wire`] for transmissions and
//! is handed inbound payloads through the resolver's `handle_*` entry points;
//! everything about polling, readiness and framing belongs to the host (or to
//! the bundled Tokio driver in [`crate::runtime`]).

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};

/// The IANA assigned port for DNS
pub const DNS_PORT: u16 = 53;

/// The transport an exchange runs over
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Protocol {
    /// Datagrams, ≤512-byte queries, subject to truncation
    Udp,
    /// A length-prefixed stream, one exchange per connection
    Tcp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Udp => write!(f, "udp"),
            Self::Tcp => write!(f, "tcp"),
        }
    }
}

/// A host-allocated identifier for one TCP connection.
///
/// Opaque to the engine; it only flows back into [`Wire::send_tcp`],
/// [`Wire::close_tcp`], and the resolver's `handle_tcp` entry points.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TcpToken(pub u64);

impl fmt::Display for TcpToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp#{}", self.0)
    }
}

/// Outbound transmissions, implemented by the host.
///
/// `send_udp` carries a whole query per call. A TCP connection serves exactly
/// one query-response exchange: the engine opens it, sends once, and closes it
/// as soon as the exchange settles, so implementations need no reuse logic.
/// TCP payloads are already length-prefixed when they reach `send_tcp`.
///
/// Errors reported here never fail the resolver call that triggered them; the
/// engine folds them into the affected query's retry budget.
pub trait Wire {
    /// Sends one UDP datagram from the given source slot
    fn send_udp(&mut self, slot: usize, target: SocketAddr, payload: &[u8]) -> io::Result<()>;

    /// Opens a TCP connection and returns its token.
    ///
    /// The host may connect lazily; delivery faults surface later through
    /// `handle_tcp_error` on the resolver.
    fn open_tcp(&mut self, target: SocketAddr) -> io::Result<TcpToken>;

    /// Sends one framed message on the connection
    fn send_tcp(&mut self, token: TcpToken, payload: &[u8]) -> io::Result<()>;

    /// Closes the connection; the token is dead afterwards
    fn close_tcp(&mut self, token: TcpToken);
}

/// Round-robin over a server set.
///
/// Forwarding mode rotates its upstream resolvers through this; recursive
/// mode keeps its hint set here as the fallback floor.
#[derive(Clone, Debug, Default)]
pub struct ServerList {
    servers: Vec<SocketAddr>,
    next: usize,
}

impl ServerList {
    /// Creates a list rotating over the given servers
    pub fn new(servers: Vec<SocketAddr>) -> Self {
        Self { servers, next: 0 }
    }

    /// Returns the next server in rotation, `None` if the list is empty
    pub fn next_server(&mut self) -> Option<SocketAddr> {
        if self.servers.is_empty() {
            return None;
        }
        let server = self.servers[self.next % self.servers.len()];
        self.next = self.next.wrapping_add(1);
        Some(server)
    }

    /// Replaces the servers and restarts the rotation
    pub fn set(&mut self, servers: Vec<SocketAddr>) {
        self.servers = servers;
        self.next = 0;
    }

    /// Returns the servers in configured order
    pub fn servers(&self) -> &[SocketAddr] {
        &self.servers
    }

    /// True when no server is configured
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

/// Constructs the transport address of a DNS server, port defaulting to 53
pub fn server_addr(ip: IpAddr, port: Option<u16>) -> SocketAddr {
    SocketAddr::new(ip, port.unwrap_or(DNS_PORT))
}
