// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Alder DNS, an embeddable asynchronous stub and recursive DNS resolver.
//!
//! The heart of the crate is [`Resolver`], a state machine that owns no
//! sockets, no threads and no clock. It tracks queries, retransmissions,
//! caching, negative caching, alias chains and the sub-queries that resolve
//! nameserver and mail-exchanger addresses; its host feeds it inbound
//! packets and the current time, and carries its outbound packets through a
//! [`Wire`] implementation. That makes the resolver embeddable in any event
//! loop, runtime or simulation, and makes every last behavior testable
//! without a network.
//!
//! The `tokio-runtime` feature (on by default) supplies that host:
//! [`AsyncResolver`] runs the state machine on a background Tokio task and
//! exposes the lookups as `async fn`s.
//!
//! # Resolving on Tokio
//!
//! ```no_run
//! use alder_dns::config::{ResolverConfig, ResolverOpts};
//! use alder_dns::runtime::AsyncResolver;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // a recursive resolver, starting from the root hints
//! let resolver =
//!     AsyncResolver::spawn(ResolverConfig::recursive(), ResolverOpts::default()).await?;
//!
//! let answer = resolver.lookup_host("www.example.com").await?;
//! for ip in answer.iter_ips() {
//!     println!("www.example.com has address {ip}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Forwarding to upstream servers instead of recursing works the same way
//! with [`ResolverConfig::forwarding`].
//!
//! # Embedding the state machine
//!
//! Hosts that bring their own event loop implement [`Wire`] and drive
//! [`Resolver`] directly: deliver datagrams to [`Resolver::handle_udp`] and
//! stream responses to [`Resolver::handle_tcp`], and whenever
//! [`Resolver::next_deadline`] falls due call [`Resolver::process_timeouts`].
//! Lookups settle either synchronously, when the answer is local, or through
//! the [`Caller`] callback attached to the lookup.

#![warn(
    clippy::default_trait_access,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::unimplemented,
    clippy::use_self,
    missing_copy_implementations,
    missing_docs,
    non_snake_case,
    non_upper_case_globals,
    rust_2018_idioms,
    unreachable_pub
)]
#![allow(
    clippy::needless_doctest_main,
    clippy::single_component_path_imports,
    clippy::upper_case_acronyms
)]
#![recursion_limit = "128"]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod cache;
pub mod config;
pub mod error;
pub mod lookup;
pub mod op;
pub mod resolver;
pub mod rr;
#[cfg(feature = "tokio-runtime")]
#[cfg_attr(docsrs, doc(cfg(feature = "tokio-runtime")))]
pub mod runtime;
pub mod serialize;
pub mod transport;

pub use crate::config::{ResolveMode, ResolverConfig, ResolverOpts};
pub use crate::error::{ProtoError, ResolveError};
pub use crate::lookup::{Answer, LookupOptions, QueryKey, ResolveStatus};
pub use crate::resolver::{Caller, CallerId, Resolver};
#[cfg(feature = "tokio-runtime")]
pub use crate::runtime::AsyncResolver;
pub use crate::transport::{Protocol, TcpToken, Wire};

/// Returns the current version of Alder DNS
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
