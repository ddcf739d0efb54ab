// Copyright 2019-2025 The contributors to Alder DNS
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! End-to-end tests of the Tokio runtime against scripted loopback servers.

#![cfg(feature = "tokio-runtime")]

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};

use alder_dns::config::{ResolverConfig, ResolverOpts};
use alder_dns::op::{Message, Query, ResponseCode};
use alder_dns::rr::rdata::{SOA, TXT};
use alder_dns::rr::{Name, RData, Record, RecordType};
use alder_dns::runtime::AsyncResolver;
use alder_dns::serialize::binary::tcp_frame;
use alder_dns::ResolveStatus;

fn name(ascii: &str) -> Name {
    Name::from_ascii(ascii).unwrap()
}

/// Registers a global default tracing subscriber when called for the first time. This is intended
/// for use in tests.
fn subscribe() {
    static INSTALL_TRACING_SUBSCRIBER: Once = Once::new();
    INSTALL_TRACING_SUBSCRIBER.call_once(|| {
        let subscriber = tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .finish();
        tracing::subscriber::set_global_default(subscriber).unwrap();
    });
}

/// Runs a scripted DNS server on a loopback datagram socket. The builder
/// receives the query and produces the whole response message.
async fn scripted_udp<F>(respond: F) -> io::Result<(SocketAddr, Arc<AtomicUsize>)>
where
    F: Fn(u16, &Query) -> Message + Send + 'static,
{
    let sock = UdpSocket::bind("127.0.0.1:0").await?;
    let addr = sock.local_addr()?;
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    tokio::spawn(async move {
        let mut buf = vec![0u8; 1024];
        loop {
            let Ok((len, source)) = sock.recv_from(&mut buf).await else {
                return;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            let now = Instant::now();
            let Ok(query) = Message::read(&buf[..len], now, Duration::ZERO) else {
                continue;
            };
            let message = respond(query.header().id(), &query.queries()[0]);
            let Ok(payload) = message.to_vec(now) else {
                continue;
            };
            let _ = sock.send_to(&payload, source).await;
        }
    });
    Ok((addr, hits))
}

#[tokio::test]
async fn test_lookup_host_over_loopback() {
    subscribe();
    let (upstream, hits) = scripted_udp(|qid, query| {
        let mut message = Message::response(qid, ResponseCode::NoError);
        message.add_query(query.clone());
        message.add_answer(Record::from_rdata(
            query.name().clone(),
            Instant::now() + Duration::from_secs(300),
            RData::A([192, 0, 2, 80].into()),
        ));
        message
    })
    .await
    .unwrap();

    let resolver =
        AsyncResolver::spawn(ResolverConfig::forwarding(vec![upstream]), ResolverOpts::default())
            .await
            .unwrap();

    let answer = resolver.lookup_host("www.example.com").await.unwrap();
    assert_eq!(answer.iter_ips().next(), Some("192.0.2.80".parse().unwrap()));
    assert_eq!(answer.server(), Some(upstream.ip()));
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // the second lookup is served from the cache
    let again = resolver.lookup_host("www.example.com").await.unwrap();
    assert_eq!(again.iter_ips().next(), Some("192.0.2.80".parse().unwrap()));
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    resolver.stop().await;
}

#[tokio::test]
async fn test_nxdomain_surfaces_as_error() {
    subscribe();
    let (upstream, _) = scripted_udp(|qid, query| {
        let mut message = Message::response(qid, ResponseCode::NXDomain);
        message.add_query(query.clone());
        message.add_name_server(Record::from_rdata(
            name("example.com"),
            Instant::now() + Duration::from_secs(600),
            RData::SOA(SOA::new(
                name("ns1.example.com"),
                name("hostmaster.example.com"),
                1,
                7200,
                1800,
                1_209_600,
                60,
            )),
        ));
        message
    })
    .await
    .unwrap();

    let resolver =
        AsyncResolver::spawn(ResolverConfig::forwarding(vec![upstream]), ResolverOpts::default())
            .await
            .unwrap();

    let error = resolver.lookup_host("gone.example.com").await.unwrap_err();
    assert_eq!(error.status(), ResolveStatus::NoDomain);

    resolver.stop().await;
}

#[tokio::test]
async fn test_truncated_response_retried_over_tcp() {
    subscribe();
    // stream and datagram listeners share one loopback port
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream = listener.local_addr().unwrap();
    let udp = UdpSocket::bind(upstream).await.unwrap();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 1024];
        loop {
            let Ok((len, source)) = udp.recv_from(&mut buf).await else {
                return;
            };
            let now = Instant::now();
            let Ok(query) = Message::read(&buf[..len], now, Duration::ZERO) else {
                continue;
            };
            let mut message =
                Message::response(query.header().id(), ResponseCode::NoError);
            message.add_query(query.queries()[0].clone());
            message.header_mut().set_truncated(true);
            let Ok(payload) = message.to_vec(now) else {
                continue;
            };
            let _ = udp.send_to(&payload, source).await;
        }
    });

    tokio::spawn(async move {
        let Ok((mut stream, _)) = listener.accept().await else {
            return;
        };
        let mut length = [0u8; 2];
        if stream.read_exact(&mut length).await.is_err() {
            return;
        }
        let mut body = vec![0u8; usize::from(u16::from_be_bytes(length))];
        if stream.read_exact(&mut body).await.is_err() {
            return;
        }
        let now = Instant::now();
        let Ok(query) = Message::read(&body, now, Duration::ZERO) else {
            return;
        };
        let mut message = Message::response(query.header().id(), ResponseCode::NoError);
        message.add_query(query.queries()[0].clone());
        message.add_answer(Record::from_rdata(
            query.queries()[0].name().clone(),
            now + Duration::from_secs(300),
            RData::TXT(TXT::new(vec!["framed".to_string()])),
        ));
        let Ok(payload) = message.to_vec(now) else {
            return;
        };
        let Ok(framed) = tcp_frame(&payload) else {
            return;
        };
        let _ = stream.write_all(&framed).await;
    });

    let resolver =
        AsyncResolver::spawn(ResolverConfig::forwarding(vec![upstream]), ResolverOpts::default())
            .await
            .unwrap();

    let answer = resolver
        .lookup("big.example.com", RecordType::TXT, Default::default())
        .await
        .unwrap();
    assert_eq!(answer.records().len(), 1);
    assert_eq!(answer.records()[0].record_type(), RecordType::TXT);

    resolver.stop().await;
}
