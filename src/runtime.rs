// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Tokio bindings for the resolver.
//!
//! [`AsyncResolver`] is a cheap-to-clone handle speaking to a background
//! task that owns a [`Resolver`] together with its clock, UDP sockets and
//! stream exchanges. The handle exposes the lookups as plain `async fn`s;
//! everything the core leaves to the host, the task supplies.
//!
//! Available with the `tokio-runtime` feature, which is on by default.

use std::collections::HashMap;
use std::io;
use std::mem;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures_util::future::{AbortHandle, Abortable};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tracing::{debug, trace};

use crate::config::{ResolverConfig, ResolverOpts};
use crate::error::ResolveError;
use crate::lookup::{Answer, LookupOptions};
use crate::resolver::{Caller, CallerId, Resolver};
use crate::rr::RecordType;
use crate::transport::{TcpToken, Wire};

/// Receive buffer size; generous next to the 512 octets a response without
/// extension mechanisms may carry
const MAX_DATAGRAM: usize = 4096;

const COMMAND_BACKLOG: usize = 32;
const PACKET_BACKLOG: usize = 64;
const EXCHANGE_BACKLOG: usize = 16;

/// One queued wire operation, replayed by the driver after each engine call.
#[derive(Debug)]
enum WireAction {
    Udp {
        slot: usize,
        target: SocketAddr,
        payload: Vec<u8>,
    },
    TcpOpen {
        token: TcpToken,
        target: SocketAddr,
    },
    TcpSend {
        token: TcpToken,
        payload: Vec<u8>,
    },
    TcpClose {
        token: TcpToken,
    },
}

/// A [`Wire`] that records operations instead of performing them.
///
/// The engine sees every send succeed; transport failures surface later as
/// lost exchanges, which the retry machinery already covers, or as stream
/// errors fed back through [`Resolver::handle_tcp_error`].
#[derive(Debug, Default)]
struct QueuedWire {
    actions: Vec<WireAction>,
    next_token: u64,
}

impl QueuedWire {
    fn drain(&mut self) -> Vec<WireAction> {
        mem::take(&mut self.actions)
    }
}

impl Wire for QueuedWire {
    fn send_udp(&mut self, slot: usize, target: SocketAddr, payload: &[u8]) -> io::Result<()> {
        self.actions.push(WireAction::Udp {
            slot,
            target,
            payload: payload.to_vec(),
        });
        Ok(())
    }

    fn open_tcp(&mut self, target: SocketAddr) -> io::Result<TcpToken> {
        self.next_token += 1;
        let token = TcpToken(self.next_token);
        self.actions.push(WireAction::TcpOpen { token, target });
        Ok(token)
    }

    fn send_tcp(&mut self, token: TcpToken, payload: &[u8]) -> io::Result<()> {
        self.actions.push(WireAction::TcpSend {
            token,
            payload: payload.to_vec(),
        });
        Ok(())
    }

    fn close_tcp(&mut self, token: TcpToken) {
        self.actions.push(WireAction::TcpClose { token });
    }
}

/// What a lookup command asks for.
enum Request {
    Name { host: String, rtype: RecordType },
    Addr(IpAddr),
}

enum Command {
    Resolve {
        request: Request,
        options: LookupOptions,
        reply: oneshot::Sender<Answer>,
    },
    DumpCache {
        reply: oneshot::Sender<String>,
    },
    PruneCache {
        reply: oneshot::Sender<(usize, String)>,
    },
    SetServers {
        servers: Vec<SocketAddr>,
    },
    Stop,
}

/// A handle to a resolver running on the Tokio runtime.
///
/// Cloning is cheap and every clone speaks to the same resolver, sharing
/// its cache and in-flight queries. The resolver stops when [`stop`] is
/// called or when the last handle is dropped.
///
/// ```no_run
/// use alder_dns::config::{ResolverConfig, ResolverOpts};
/// use alder_dns::runtime::AsyncResolver;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let resolver =
///     AsyncResolver::spawn(ResolverConfig::recursive(), ResolverOpts::default()).await?;
/// let answer = resolver.lookup_host("www.example.com").await?;
/// for ip in answer.iter_ips() {
///     println!("{ip}");
/// }
/// # Ok(())
/// # }
/// ```
///
/// [`stop`]: Self::stop
#[derive(Clone)]
pub struct AsyncResolver {
    commands: mpsc::Sender<Command>,
}

impl AsyncResolver {
    /// Binds the sockets and spawns the driver task.
    ///
    /// Must be called from within a Tokio runtime. One IPv4 socket is bound
    /// per configured send slot; IPv6 sockets are bound on a best-effort
    /// basis and queries to IPv6 servers are dropped without them.
    pub async fn spawn(config: ResolverConfig, opts: ResolverOpts) -> io::Result<Self> {
        let slots = opts.udp_send_slots.max(1);
        let mut v4 = Vec::with_capacity(slots);
        for _ in 0..slots {
            let bind = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
            v4.push(Arc::new(UdpSocket::bind(bind).await?));
        }
        let mut v6 = Vec::with_capacity(slots);
        for _ in 0..slots {
            let bind = SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0));
            match UdpSocket::bind(bind).await {
                Ok(sock) => v6.push(Arc::new(sock)),
                Err(error) => {
                    debug!(%error, "IPv6 unavailable, continuing with IPv4 only");
                    v6.clear();
                    break;
                }
            }
        }
        let (commands, command_rx) = mpsc::channel(COMMAND_BACKLOG);
        let resolver = Resolver::new(config, opts, QueuedWire::default());
        tokio::spawn(drive(resolver, command_rx, v4, v6));
        Ok(Self { commands })
    }

    /// Looks up `rtype` records for a host name.
    pub async fn lookup(
        &self,
        host: &str,
        rtype: RecordType,
        options: LookupOptions,
    ) -> Result<Answer, ResolveError> {
        let request = Request::Name {
            host: host.to_string(),
            rtype,
        };
        self.request(request, options).await
    }

    /// Looks up the IPv4 addresses of a host.
    pub async fn lookup_host(&self, host: &str) -> Result<Answer, ResolveError> {
        self.lookup(host, RecordType::A, LookupOptions::default()).await
    }

    /// Looks up the IPv6 addresses of a host.
    pub async fn lookup_aaaa(&self, host: &str) -> Result<Answer, ResolveError> {
        self.lookup(host, RecordType::AAAA, LookupOptions::default()).await
    }

    /// Looks up the name of the host at an address.
    pub async fn lookup_addr(&self, addr: IpAddr) -> Result<Answer, ResolveError> {
        self.request(Request::Addr(addr), LookupOptions::default()).await
    }

    /// Looks up the mail exchangers of a domain.
    pub async fn lookup_mail(&self, host: &str) -> Result<Answer, ResolveError> {
        self.lookup(host, RecordType::MX, LookupOptions::default()).await
    }

    /// Looks up the nameservers of a zone.
    pub async fn lookup_ns(&self, host: &str) -> Result<Answer, ResolveError> {
        self.lookup(host, RecordType::NS, LookupOptions::default()).await
    }

    /// Looks up the start of authority of a zone.
    pub async fn lookup_soa(&self, host: &str) -> Result<Answer, ResolveError> {
        self.lookup(host, RecordType::SOA, LookupOptions::default()).await
    }

    /// Looks up the service records under a name.
    pub async fn lookup_srv(&self, host: &str) -> Result<Answer, ResolveError> {
        self.lookup(host, RecordType::SRV, LookupOptions::default()).await
    }

    /// Looks up the text records of a name.
    pub async fn lookup_txt(&self, host: &str) -> Result<Answer, ResolveError> {
        self.lookup(host, RecordType::TXT, LookupOptions::default()).await
    }

    /// Renders the cache contents for diagnostics.
    pub async fn dump_cache(&self) -> Result<String, ResolveError> {
        let (reply, answer) = oneshot::channel();
        self.commands
            .send(Command::DumpCache { reply })
            .await
            .map_err(|_| ResolveError::Disconnected)?;
        answer.await.map_err(|_| ResolveError::Disconnected)
    }

    /// Evicts expired cache entries, returning the count and a report.
    pub async fn prune_cache(&self) -> Result<(usize, String), ResolveError> {
        let (reply, answer) = oneshot::channel();
        self.commands
            .send(Command::PruneCache { reply })
            .await
            .map_err(|_| ResolveError::Disconnected)?;
        answer.await.map_err(|_| ResolveError::Disconnected)
    }

    /// Replaces the upstream server set.
    pub async fn set_servers(&self, servers: Vec<SocketAddr>) -> Result<(), ResolveError> {
        self.commands
            .send(Command::SetServers { servers })
            .await
            .map_err(|_| ResolveError::Disconnected)
    }

    /// Stops the resolver. Lookups in flight settle with
    /// [`ResolveStatus::Shutdown`](crate::lookup::ResolveStatus::Shutdown);
    /// later lookups are refused the same way.
    pub async fn stop(&self) {
        let _ = self.commands.send(Command::Stop).await;
    }

    async fn request(
        &self,
        request: Request,
        options: LookupOptions,
    ) -> Result<Answer, ResolveError> {
        let (reply, answer) = oneshot::channel();
        self.commands
            .send(Command::Resolve {
                request,
                options,
                reply,
            })
            .await
            .map_err(|_| ResolveError::Disconnected)?;
        let answer = answer.await.map_err(|_| ResolveError::Disconnected)?;
        if answer.is_ok() {
            Ok(answer)
        } else {
            Err(ResolveError::Failed {
                status: answer.status(),
                key: answer.key().clone(),
            })
        }
    }
}

type ReplySlot = Arc<Mutex<Option<oneshot::Sender<Answer>>>>;

fn take_reply(slot: &ReplySlot) -> Option<oneshot::Sender<Answer>> {
    slot.lock().ok().and_then(|mut slot| slot.take())
}

/// The driver task: owns the engine, relays commands, sockets and timers.
async fn drive(
    mut resolver: Resolver<QueuedWire>,
    mut commands: mpsc::Receiver<Command>,
    v4: Vec<Arc<UdpSocket>>,
    v6: Vec<Arc<UdpSocket>>,
) {
    let (packet_tx, mut packets) = mpsc::channel::<(SocketAddr, Vec<u8>)>(PACKET_BACKLOG);
    for sock in v4.iter().chain(v6.iter()) {
        tokio::spawn(recv_loop(Arc::clone(sock), packet_tx.clone()));
    }
    drop(packet_tx);

    let (exchange_tx, mut exchange_events) =
        mpsc::channel::<(TcpToken, io::Result<Vec<u8>>)>(EXCHANGE_BACKLOG);
    let mut exchanges: HashMap<TcpToken, AbortHandle> = HashMap::new();
    let mut opening: HashMap<TcpToken, SocketAddr> = HashMap::new();
    let mut next_caller: u64 = 0;

    loop {
        let deadline = resolver.next_deadline();
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => handle_command(&mut resolver, command, &mut next_caller),
                // every handle is gone
                None => break,
            },
            Some((source, payload)) = packets.recv() => {
                resolver.handle_udp(source, &payload, Instant::now());
            }
            Some((token, result)) = exchange_events.recv() => {
                exchanges.remove(&token);
                match result {
                    Ok(payload) => resolver.handle_tcp(token, &payload, Instant::now()),
                    Err(error) => {
                        debug!(%token, %error, "stream exchange failed");
                        resolver.handle_tcp_error(token, Instant::now());
                    }
                }
            }
            () = wait_until(deadline) => resolver.process_timeouts(Instant::now()),
        }
        flush(&mut resolver, &v4, &v6, &exchange_tx, &mut exchanges, &mut opening).await;
    }

    resolver.stop();
    flush(&mut resolver, &v4, &v6, &exchange_tx, &mut exchanges, &mut opening).await;
}

fn handle_command(resolver: &mut Resolver<QueuedWire>, command: Command, next_caller: &mut u64) {
    let now = Instant::now();
    match command {
        Command::Resolve {
            request,
            options,
            reply,
        } => {
            *next_caller += 1;
            // the engine consumes the caller even when it settles the lookup
            // locally, so the reply channel lives in a shared slot reachable
            // from both delivery paths
            let slot: ReplySlot = Arc::new(Mutex::new(Some(reply)));
            let in_callback = Arc::clone(&slot);
            let caller = Caller {
                id: CallerId(*next_caller),
                token: *next_caller,
                callback: Box::new(move |_, _, answer| {
                    if let Some(reply) = take_reply(&in_callback) {
                        let _ = reply.send(answer);
                    }
                }),
            };
            let settled = match request {
                Request::Name { host, rtype } => {
                    resolver.resolve(&host, rtype, options, Some(caller), now)
                }
                Request::Addr(addr) => resolver.resolve_addr(addr, options, Some(caller), now),
            };
            if let Some(answer) = settled {
                if let Some(reply) = take_reply(&slot) {
                    let _ = reply.send(answer);
                }
            }
        }
        Command::DumpCache { reply } => {
            let _ = reply.send(resolver.dump_cache(now));
        }
        Command::PruneCache { reply } => {
            let _ = reply.send(resolver.prune_cache(now));
        }
        Command::SetServers { servers } => resolver.set_servers(servers),
        Command::Stop => resolver.stop(),
    }
}

/// Replays the engine's queued wire operations onto real sockets.
async fn flush(
    resolver: &mut Resolver<QueuedWire>,
    v4: &[Arc<UdpSocket>],
    v6: &[Arc<UdpSocket>],
    exchange_tx: &mpsc::Sender<(TcpToken, io::Result<Vec<u8>>)>,
    exchanges: &mut HashMap<TcpToken, AbortHandle>,
    opening: &mut HashMap<TcpToken, SocketAddr>,
) {
    for action in resolver.wire_mut().drain() {
        match action {
            WireAction::Udp {
                slot,
                target,
                payload,
            } => {
                let pool = if target.is_ipv4() { v4 } else { v6 };
                if pool.is_empty() {
                    debug!(%target, "no socket for the target's address family");
                    continue;
                }
                let sock = &pool[slot % pool.len()];
                if let Err(error) = sock.send_to(&payload, target).await {
                    // equivalent to a lost datagram; the retry timer covers it
                    debug!(%target, %error, "datagram send failed");
                }
            }
            WireAction::TcpOpen { token, target } => {
                opening.insert(token, target);
            }
            WireAction::TcpSend { token, payload } => {
                let Some(target) = opening.remove(&token) else {
                    continue;
                };
                let (abort, registration) = AbortHandle::new_pair();
                exchanges.insert(token, abort);
                let events = exchange_tx.clone();
                tokio::spawn(async move {
                    let exchange = Abortable::new(tcp_exchange(target, payload), registration);
                    if let Ok(result) = exchange.await {
                        let _ = events.send((token, result)).await;
                    }
                });
            }
            WireAction::TcpClose { token } => {
                opening.remove(&token);
                if let Some(abort) = exchanges.remove(&token) {
                    abort.abort();
                }
            }
        }
    }
}

/// One complete run of the stream protocol: connect, send the framed query,
/// read the length-prefixed response.
async fn tcp_exchange(target: SocketAddr, payload: Vec<u8>) -> io::Result<Vec<u8>> {
    let mut stream = TcpStream::connect(target).await?;
    stream.write_all(&payload).await?;
    let mut length = [0u8; 2];
    stream.read_exact(&mut length).await?;
    let mut body = vec![0u8; usize::from(u16::from_be_bytes(length))];
    stream.read_exact(&mut body).await?;
    Ok(body)
}

async fn recv_loop(sock: Arc<UdpSocket>, sink: mpsc::Sender<(SocketAddr, Vec<u8>)>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        match sock.recv_from(&mut buf).await {
            Ok((len, source)) => {
                if sink.send((source, buf[..len].to_vec())).await.is_err() {
                    return;
                }
            }
            Err(error) => {
                // some platforms surface ICMP unreachable as a recv error
                trace!(%error, "datagram receive failed");
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_actions_replay_in_order() {
        let mut wire = QueuedWire::default();
        let upstream = SocketAddr::from(([192, 0, 2, 1], 53));
        wire.send_udp(0, upstream, b"one").unwrap();
        let token = wire.open_tcp(upstream).unwrap();
        wire.send_tcp(token, b"two").unwrap();
        wire.close_tcp(token);

        let actions = wire.drain();
        assert_eq!(actions.len(), 4);
        assert!(matches!(&actions[0], WireAction::Udp { payload, .. } if payload == b"one"));
        assert!(matches!(&actions[1], WireAction::TcpOpen { token: t, .. } if *t == token));
        assert!(matches!(&actions[2], WireAction::TcpSend { payload, .. } if payload == b"two"));
        assert!(matches!(&actions[3], WireAction::TcpClose { token: t } if *t == token));
        assert!(wire.drain().is_empty());
    }

    #[test]
    fn test_tokens_are_unique() {
        let mut wire = QueuedWire::default();
        let upstream = SocketAddr::from(([192, 0, 2, 1], 53));
        let first = wire.open_tcp(upstream).unwrap();
        let second = wire.open_tcp(upstream).unwrap();
        assert_ne!(first, second);
    }
}
