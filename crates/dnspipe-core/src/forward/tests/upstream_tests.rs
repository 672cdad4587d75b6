use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use tokio::net::UdpSocket;

use crate::forward::upstream::{Exchanger as _, Scheme, Upstream, UpstreamAddr, UpstreamEntry};
use crate::forward::ForwardArgs;
use crate::handler::HandlerError;

#[test]
fn test_parse_scheme_and_default_port_table() {
    let cases = [
        ("8.8.8.8", Scheme::Udp, "8.8.8.8", 53),
        ("8.8.8.8:5353", Scheme::Udp, "8.8.8.8", 5353),
        ("udp://1.1.1.1", Scheme::Udp, "1.1.1.1", 53),
        ("tcp://9.9.9.9", Scheme::Tcp, "9.9.9.9", 53),
        ("tcp://9.9.9.9:10053", Scheme::Tcp, "9.9.9.9", 10053),
        ("tls://1.1.1.1", Scheme::Tls, "1.1.1.1", 853),
        ("tls://dns.example", Scheme::Tls, "dns.example", 853),
        ("https://dns.example", Scheme::Https, "dns.example", 443),
    ];

    for (raw, scheme, host, port) in cases {
        let parsed = UpstreamAddr::parse("fwd", raw).unwrap();
        assert_eq!(parsed.scheme, scheme, "addr: {raw}");
        assert_eq!(parsed.host, host, "addr: {raw}");
        assert_eq!(parsed.port, port, "addr: {raw}");
    }
}

#[test]
fn test_parse_doh_path_defaults() {
    let parsed = UpstreamAddr::parse("fwd", "https://dns.example").unwrap();
    assert_eq!(parsed.path, "/dns-query");

    let parsed = UpstreamAddr::parse("fwd", "https://dns.example/custom/endpoint").unwrap();
    assert_eq!(parsed.path, "/custom/endpoint");
}

#[test]
fn test_parse_ipv6_host() {
    let parsed = UpstreamAddr::parse("fwd", "udp://[2606:4700:4700::1111]:53").unwrap();
    assert_eq!(parsed.host, "2606:4700:4700::1111");
    assert_eq!(parsed.port, 53);
}

#[test]
fn test_parse_rejects_quic_and_unknown_schemes() {
    for raw in ["quic://1.1.1.1", "wss://dns.example", "ftp://dns.example"] {
        let err = UpstreamAddr::parse("fwd", raw).unwrap_err();
        assert!(
            matches!(&err, HandlerError::InvalidArgs { tag, .. } if tag == "fwd"),
            "addr {raw}: unexpected error {err}"
        );
    }
}

#[test]
fn test_parse_rejects_empty_host() {
    assert!(UpstreamAddr::parse("fwd", "udp://").is_err());
}

#[test]
fn test_build_rejects_bad_pinned_ip() {
    let entry = UpstreamEntry {
        addr: "tls://dns.example".to_string(),
        ip_addr: vec!["not_an_ip".to_string()],
    };
    let err = Upstream::build("fwd", &entry, &ForwardArgs::default()).unwrap_err();
    match err {
        HandlerError::InvalidArgs { message, .. } => {
            assert!(message.contains("not_an_ip"), "message: {message}");
        }
        other => panic!("expected InvalidArgs, got {other}"),
    }
}

#[test]
fn test_build_rejects_bad_bootstrap() {
    let entry = UpstreamEntry { addr: "udp://dns.example".to_string(), ip_addr: vec![] };
    let args = ForwardArgs {
        bootstrap: vec!["definitely not an address".to_string()],
        ..ForwardArgs::default()
    };
    assert!(Upstream::build("fwd", &entry, &args).is_err());
}

#[test]
fn test_build_accepts_bootstrap_with_and_without_port() {
    let entry = UpstreamEntry { addr: "udp://dns.example".to_string(), ip_addr: vec![] };
    let args = ForwardArgs {
        bootstrap: vec!["8.8.8.8:53".to_string(), "9.9.9.9".to_string()],
        ..ForwardArgs::default()
    };
    assert!(Upstream::build("fwd", &entry, &args).is_ok());
}

fn make_query(name: &str, id: u16) -> Message {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    msg.add_query(Query::query(Name::from_utf8(name).unwrap(), RecordType::A));
    msg
}

#[tokio::test]
async fn test_udp_exchange_roundtrip() {
    let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_addr = server.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 512];
        let (n, peer) = server.recv_from(&mut buf).await.unwrap();
        let query = Message::from_vec(&buf[..n]).unwrap();

        let mut reply = Message::new();
        reply.set_id(query.id());
        reply.set_message_type(MessageType::Response);
        reply.set_op_code(OpCode::Query);
        reply.set_response_code(ResponseCode::NoError);
        reply.add_queries(query.queries().to_vec());
        let name = query.queries()[0].name().clone();
        reply.add_answer(Record::from_rdata(name, 60, RData::A(A::new(9, 9, 9, 9))));
        server.send_to(&reply.to_vec().unwrap(), peer).await.unwrap();
    });

    let entry = UpstreamEntry { addr: format!("udp://{server_addr}"), ip_addr: vec![] };
    let upstream = Upstream::build("fwd", &entry, &ForwardArgs::default()).unwrap();

    let reply = upstream.exchange(&make_query("probe.test.", 0x5151)).await.unwrap();
    assert_eq!(reply.id(), 0x5151);
    assert_eq!(
        reply.answers()[0].data(),
        Some(&RData::A(A::new(9, 9, 9, 9))),
        "loopback upstream answer must come through"
    );
}

#[tokio::test]
async fn test_udp_exchange_ignores_mismatched_ids() {
    let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_addr = server.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 512];
        let (n, peer) = server.recv_from(&mut buf).await.unwrap();
        let query = Message::from_vec(&buf[..n]).unwrap();

        // A stray datagram with the wrong id, then the real reply.
        let mut stray = Message::new();
        stray.set_id(query.id().wrapping_add(1));
        stray.set_message_type(MessageType::Response);
        server.send_to(&stray.to_vec().unwrap(), peer).await.unwrap();

        let mut reply = Message::new();
        reply.set_id(query.id());
        reply.set_message_type(MessageType::Response);
        reply.add_queries(query.queries().to_vec());
        server.send_to(&reply.to_vec().unwrap(), peer).await.unwrap();
    });

    let entry = UpstreamEntry { addr: format!("udp://{server_addr}"), ip_addr: vec![] };
    let upstream = Upstream::build("fwd", &entry, &ForwardArgs::default()).unwrap();

    let reply = upstream.exchange(&make_query("probe.test.", 0x6161)).await.unwrap();
    assert_eq!(reply.id(), 0x6161);
}
