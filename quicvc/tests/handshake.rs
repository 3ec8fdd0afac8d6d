// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use quicvc::{
    ConnectionMeta, Error, Manager, Subscriber, VerifiedPeer, Verifier, COMMAND_STREAM_ID,
    DATA_STREAM_ID,
};
use quicvc_core::credentials::testing::Authority;
use std::{
    net::{IpAddr, Ipv4Addr},
    sync::Arc,
    time::Duration,
};
use tokio::{sync::mpsc, time::timeout};

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
const TRUST_ROOT: &str = "owner";

#[derive(Clone, Debug, PartialEq, Eq)]
enum Event {
    HandshakeComplete(String),
    Established { device_id: String, issuer: String },
    Closed { device_id: String, reason: String },
    Stream { device_id: String, stream_id: u8 },
    Command { device_id: String, kind: String },
}

struct Recorder {
    tx: mpsc::UnboundedSender<Event>,
}

impl Subscriber for Recorder {
    fn on_handshake_complete(&self, meta: &ConnectionMeta) {
        let _ = self
            .tx
            .send(Event::HandshakeComplete(meta.device_id.clone()));
    }

    fn on_connection_established(&self, meta: &ConnectionMeta, peer: &VerifiedPeer) {
        let _ = self.tx.send(Event::Established {
            device_id: meta.device_id.clone(),
            issuer: peer.issuer.clone(),
        });
    }

    fn on_connection_closed(&self, meta: &ConnectionMeta, reason: &str) {
        let _ = self.tx.send(Event::Closed {
            device_id: meta.device_id.clone(),
            reason: reason.to_string(),
        });
    }

    fn on_stream(&self, meta: &ConnectionMeta, stream_id: u8, _data: &[u8]) {
        let _ = self.tx.send(Event::Stream {
            device_id: meta.device_id.clone(),
            stream_id,
        });
    }

    fn on_command_response(&self, meta: &ConnectionMeta, kind: &str, _payload: &[u8]) {
        let _ = self.tx.send(Event::Command {
            device_id: meta.device_id.clone(),
            kind: kind.to_string(),
        });
    }
}

fn recorder() -> (Recorder, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Recorder { tx }, rx)
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("subscriber dropped")
}

#[tokio::test]
async fn connect_exchange_and_disconnect() {
    let authority = Arc::new(Authority::new(TRUST_ROOT));

    let (server_recorder, mut server_events) = recorder();
    let server = Manager::with_subscriber(
        TRUST_ROOT,
        authority.issue_device("lamp-1"),
        authority.clone() as Arc<dyn Verifier>,
        server_recorder,
    );
    let server_addr = server.listen(0).await.unwrap();

    let (data_tx, mut data_rx) = mpsc::unbounded_channel();
    server.register_stream_handler(DATA_STREAM_ID, move |data, meta| {
        let _ = data_tx.send((meta.device_id.clone(), data.to_vec()));
    });

    let (client_recorder, mut client_events) = recorder();
    let client = Manager::with_subscriber(
        TRUST_ROOT,
        authority.issue_device("host-1"),
        authority.clone() as Arc<dyn Verifier>,
        client_recorder,
    );

    client
        .connect("lamp-1", LOCALHOST, server_addr.port(), None)
        .await
        .unwrap();
    assert!(client.is_connected("lamp-1"));

    assert_eq!(
        next_event(&mut client_events).await,
        Event::HandshakeComplete("lamp-1".into())
    );
    assert_eq!(
        next_event(&mut client_events).await,
        Event::Established {
            device_id: "lamp-1".into(),
            issuer: TRUST_ROOT.into(),
        }
    );
    assert_eq!(
        next_event(&mut server_events).await,
        Event::HandshakeComplete("host-1".into())
    );
    assert_eq!(
        next_event(&mut server_events).await,
        Event::Established {
            device_id: "host-1".into(),
            issuer: TRUST_ROOT.into(),
        }
    );

    // connecting again is an idempotent no-op
    client
        .connect("lamp-1", LOCALHOST, server_addr.port(), None)
        .await
        .unwrap();

    // data flows to the registered handler
    client.send_data("lamp-1", b"toggle").await.unwrap();
    let (device_id, data) = timeout(Duration::from_secs(5), data_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(device_id, "host-1");
    assert_eq!(data, b"toggle");

    // a typed payload on the command stream is re-emitted as an event
    let command = quicvc_core::frame::encode_payload_frames(&[quicvc_core::frame::Frame::Stream(
        quicvc_core::frame::Stream {
            stream_id: COMMAND_STREAM_ID,
            data: br#"{"type": "led_response", "status": "on"}"#,
        },
    )]);
    server.send_protected_frame("host-1", &command).await.unwrap();

    assert_eq!(
        next_event(&mut client_events).await,
        Event::Command {
            device_id: "lamp-1".into(),
            kind: "led_response".into(),
        }
    );
    // no handler is registered on the client, so the frame also
    // surfaces as a stream event
    assert_eq!(
        next_event(&mut client_events).await,
        Event::Stream {
            device_id: "lamp-1".into(),
            stream_id: COMMAND_STREAM_ID,
        }
    );

    client.disconnect("lamp-1").await;
    assert!(!client.is_connected("lamp-1"));

    assert_eq!(
        next_event(&mut client_events).await,
        Event::Closed {
            device_id: "lamp-1".into(),
            reason: "user_requested".into(),
        }
    );

    match next_event(&mut server_events).await {
        Event::Closed { device_id, reason } => {
            assert_eq!(device_id, "host-1");
            assert!(reason.contains("user_requested"), "reason: {reason}");
        }
        other => panic!("expected a close event, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_connects_are_independent() {
    let authority = Arc::new(Authority::new(TRUST_ROOT));

    let lamp_1 = Manager::new(
        TRUST_ROOT,
        authority.issue_device("lamp-1"),
        authority.clone() as Arc<dyn Verifier>,
    );
    let lamp_1_addr = lamp_1.listen(0).await.unwrap();

    let lamp_2 = Manager::new(
        TRUST_ROOT,
        authority.issue_device("lamp-2"),
        authority.clone() as Arc<dyn Verifier>,
    );
    let lamp_2_addr = lamp_2.listen(0).await.unwrap();

    let client = Manager::new(
        TRUST_ROOT,
        authority.issue_device("host-1"),
        authority.clone() as Arc<dyn Verifier>,
    );

    let (first, second) = tokio::join!(
        client.connect("lamp-1", LOCALHOST, lamp_1_addr.port(), None),
        client.connect("lamp-2", LOCALHOST, lamp_2_addr.port(), None),
    );
    first.unwrap();
    second.unwrap();

    assert!(client.is_connected("lamp-1"));
    assert!(client.is_connected("lamp-2"));

    // closing one connection does not affect the other
    client.disconnect("lamp-1").await;
    assert!(!client.is_connected("lamp-1"));
    assert!(client.is_connected("lamp-2"));

    client.send_data("lamp-2", b"still alive").await.unwrap();
}

#[tokio::test]
async fn rejected_credential_times_out() {
    let client_authority = Arc::new(Authority::new(TRUST_ROOT));
    // same identity, different signing secret: the server rejects the
    // client's credential
    let server_authority = Arc::new(Authority::new(TRUST_ROOT));

    let server = Manager::new(
        TRUST_ROOT,
        server_authority.issue_device("lamp-1"),
        server_authority.clone() as Arc<dyn Verifier>,
    );
    let server_addr = server.listen(0).await.unwrap();

    let (client_recorder, mut client_events) = recorder();
    let client = Manager::with_subscriber(
        TRUST_ROOT,
        client_authority.issue_device("host-1"),
        client_authority.clone() as Arc<dyn Verifier>,
        client_recorder,
    );

    let started = std::time::Instant::now();
    let result = client
        .connect("lamp-1", LOCALHOST, server_addr.port(), None)
        .await;
    assert_eq!(result, Err(Error::HandshakeTimeout));

    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_secs(4) && elapsed < Duration::from_secs(10),
        "handshake gave up after {elapsed:?}"
    );

    assert_eq!(
        next_event(&mut client_events).await,
        Event::Closed {
            device_id: "lamp-1".into(),
            reason: "handshake_timeout".into(),
        }
    );
    assert!(!client.is_connected("lamp-1"));
}

#[tokio::test]
async fn send_requires_a_connection() {
    let authority = Arc::new(Authority::new(TRUST_ROOT));
    let manager = Manager::new(
        TRUST_ROOT,
        authority.issue_device("host-1"),
        authority.clone() as Arc<dyn Verifier>,
    );

    assert_eq!(
        manager.send_data("lamp-1", b"nope").await,
        Err(Error::NoConnection)
    );
}
