// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::credentials::testing::Authority;
use std::net::{IpAddr, Ipv4Addr};

const TRUST_ROOT: &str = "owner";
const CLIENT_DEVICE: &str = "host-1";
const SERVER_DEVICE: &str = "lamp-1";

fn addr(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

/// An in-memory client/server pair that moves datagrams between the
/// two connections the way the runtime layer would.
struct Pair {
    client: Connection,
    server: Option<Connection>,
    server_credential: Credential,
    server_verifier: Arc<dyn Verifier>,
    now: Instant,
    client_packet_numbers: Vec<u8>,
    server_packet_numbers: Vec<u8>,
}

impl Pair {
    fn new() -> Self {
        let authority = Arc::new(Authority::new(TRUST_ROOT));
        Self::with_verifiers(&authority, authority.clone(), None)
    }

    fn with_verifiers(
        client_authority: &Authority,
        server_verifier: Arc<dyn Verifier>,
        peer_credential_hint: Option<&Credential>,
    ) -> Self {
        let client_credential = client_authority.issue_device(CLIENT_DEVICE);
        let server_credential = client_authority.issue_device(SERVER_DEVICE);
        let now = Instant::now();

        let client = Connection::new_client(
            SERVER_DEVICE,
            addr(49497),
            client_credential,
            server_verifier.clone(),
            TRUST_ROOT,
            peer_credential_hint,
            now,
        );

        Self {
            client,
            server: None,
            server_credential,
            server_verifier,
            now,
            client_packet_numbers: Vec::new(),
            server_packet_numbers: Vec::new(),
        }
    }

    fn server(&mut self) -> &mut Connection {
        self.server.as_mut().expect("server connection exists")
    }

    /// Moves staged datagrams in both directions until the exchange
    /// quiesces.
    fn pump(&mut self) {
        loop {
            let client_out = self.client.take_transmissions();
            let server_out = self
                .server
                .as_mut()
                .map(Connection::take_transmissions)
                .unwrap_or_default();

            if client_out.is_empty() && server_out.is_empty() {
                break;
            }

            for mut datagram in client_out {
                let (header, header_len) = Header::parse(&datagram).unwrap();
                self.client_packet_numbers.push(header.packet_number_low);

                if self.server.is_none() {
                    assert_eq!(header.packet_type, PacketType::Initial);
                    self.server = Some(Connection::new_server(
                        header.destination_cid,
                        addr(40000),
                        self.server_credential.clone(),
                        self.server_verifier.clone(),
                        TRUST_ROOT,
                        self.now,
                    ));
                }

                let now = self.now;
                self.server()
                    .handle_packet(now, &header, header_len, &mut datagram);
            }

            for mut datagram in server_out {
                let (header, header_len) = Header::parse(&datagram).unwrap();
                self.server_packet_numbers.push(header.packet_number_low);
                self.client
                    .handle_packet(self.now, &header, header_len, &mut datagram);
            }
        }
    }

    fn establish(&mut self) {
        self.pump();
        assert!(self.client.is_established());
        assert!(self.server().is_established());
        // drain handshake events so tests observe only what follows
        self.client.take_events();
        self.server().take_events();
    }

    fn advance(&mut self, duration: Duration) {
        self.now += duration;
        self.client.on_timeout(self.now);
        if let Some(server) = self.server.as_mut() {
            server.on_timeout(self.now);
        }
    }
}

#[test]
fn happy_path_handshake() {
    let mut pair = Pair::new();
    pair.pump();

    assert!(pair.client.is_established());
    assert!(pair.server().is_established());

    let client_events = pair.client.take_events();
    assert_eq!(client_events.len(), 2);
    assert_eq!(client_events[0], ConnectionEvent::HandshakeComplete);
    match &client_events[1] {
        ConnectionEvent::Established(peer) => {
            assert_eq!(peer.issuer, TRUST_ROOT);
            assert_eq!(peer.device_id, SERVER_DEVICE);
        }
        other => panic!("expected established event, got {other:?}"),
    }

    let server_events = pair.server().take_events();
    assert_eq!(server_events[0], ConnectionEvent::HandshakeComplete);
    match &server_events[1] {
        ConnectionEvent::Established(peer) => {
            assert_eq!(peer.issuer, TRUST_ROOT);
            assert_eq!(peer.device_id, CLIENT_DEVICE);
        }
        other => panic!("expected established event, got {other:?}"),
    }

    assert_eq!(pair.client.device_id(), Some(SERVER_DEVICE));
    assert_eq!(pair.server().device_id(), Some(CLIENT_DEVICE));
}

#[test]
fn handshake_with_credential_hint() {
    let authority = Arc::new(Authority::new(TRUST_ROOT));
    let hint = authority.issue_device(SERVER_DEVICE);
    let mut pair = Pair::with_verifiers(&authority, authority.clone(), Some(&hint));

    pair.pump();
    assert!(pair.client.is_established());
    assert!(pair.server().is_established());
}

#[test]
fn handshake_completes_within_deadline() {
    let mut pair = Pair::new();
    let created = pair.client.created_at();
    pair.pump();

    assert!(pair.client.is_established());
    assert!(pair.now.duration_since(created) < HANDSHAKE_TIMEOUT);
}

#[test]
fn packet_numbers_are_strictly_increasing() {
    let mut pair = Pair::new();
    pair.establish();

    for turn in 0..8 {
        pair.client
            .send_data(format!("message {turn}").as_bytes())
            .unwrap();
        pair.pump();
    }

    for numbers in [&pair.client_packet_numbers, &pair.server_packet_numbers] {
        assert!(!numbers.is_empty());
        for window in numbers.windows(2) {
            assert!(window[0] < window[1], "packet numbers regressed: {numbers:?}");
        }
        assert_eq!(numbers[0], 0);
    }
}

#[test]
fn data_round_trip() {
    let mut pair = Pair::new();
    pair.establish();

    pair.client.send_data(b"toggle").unwrap();
    pair.pump();

    let events = pair.server().take_events();
    assert_eq!(
        events,
        vec![ConnectionEvent::Stream {
            stream_id: frame::stream::DATA_STREAM_ID,
            data: Bytes::from_static(b"toggle"),
        }]
    );

    pair.server().send_data(b"ok").unwrap();
    pair.pump();

    let events = pair.client.take_events();
    assert_eq!(
        events,
        vec![ConnectionEvent::Stream {
            stream_id: frame::stream::DATA_STREAM_ID,
            data: Bytes::from_static(b"ok"),
        }]
    );
}

#[test]
fn send_frame_carries_raw_frames() {
    let mut pair = Pair::new();
    pair.establish();

    let payload = frame::encode_payload_frames(&[Frame::Stream(Stream {
        stream_id: 0x07,
        data: b"raw",
    })]);

    pair.client.send_frame(&payload).unwrap();
    pair.pump();

    let events = pair.server().take_events();
    assert_eq!(
        events,
        vec![ConnectionEvent::Stream {
            stream_id: 0x07,
            data: Bytes::from_static(b"raw"),
        }]
    );

    // garbage is rejected before anything is transmitted
    assert_eq!(pair.client.send_frame(&[0xff, 0xff]), Err(Error::WireDecode));
}

#[test]
fn replayed_packet_is_dropped() {
    let mut pair = Pair::new();
    pair.establish();

    let now = pair.now;
    pair.client.send_data(b"once").unwrap();
    let mut datagrams = pair.client.take_transmissions();
    assert_eq!(datagrams.len(), 1);
    let original = datagrams.pop().unwrap();

    let mut first_copy = original.clone();
    let (header, header_len) = Header::parse(&first_copy).unwrap();
    pair.server()
        .handle_packet(now, &header, header_len, &mut first_copy);

    assert_eq!(pair.server().take_events().len(), 1);
    let highest = pair.server().replay_guard().highest_received();

    // replay one second later: no state change, no event, no delivery
    let replay_time = now + Duration::from_secs(1);
    let mut replay_copy = original.clone();
    let (header, header_len) = Header::parse(&replay_copy).unwrap();
    pair.server()
        .handle_packet(replay_time, &header, header_len, &mut replay_copy);

    assert!(pair.server().take_events().is_empty());
    assert_eq!(pair.server().replay_guard().highest_received(), highest);
    assert!(pair.server().is_established());
}

#[test]
fn invalid_credential_closes_silently_and_client_times_out() {
    // the server's verifier does not know the client's issuer
    let client_authority = Authority::new(TRUST_ROOT);
    let server_verifier = Arc::new(Authority::new(TRUST_ROOT));
    let mut pair = Pair::with_verifiers(&client_authority, server_verifier, None);

    pair.pump();

    // the server rejected the credential without anything visible to
    // its application
    let server = pair.server();
    assert!(server.state().is_closed());
    assert!(server.take_events().is_empty());
    assert!(server.device_id().is_none());

    // the client hears nothing and gives up at the handshake deadline
    assert!(!pair.client.is_established());
    pair.advance(HANDSHAKE_TIMEOUT);

    let events = pair.client.take_events();
    assert_eq!(
        events,
        vec![ConnectionEvent::Closed {
            reason: Error::HandshakeTimeout,
        }]
    );
    assert!(pair.client.state().is_closed());

    // the close event fires exactly once
    pair.advance(HANDSHAKE_TIMEOUT);
    assert!(pair.client.take_events().is_empty());
}

#[test]
fn challenge_mismatch_closes_the_connection() {
    let authority = Arc::new(Authority::new(TRUST_ROOT));
    let mut pair = Pair::with_verifiers(&authority, authority.clone(), None);

    let mut datagrams = pair.client.take_transmissions();
    let (initial_header, _) = Header::parse(&datagrams.pop().unwrap()).unwrap();

    // forge a VC_RESPONSE that echoes the wrong challenge
    let response = VcResponse {
        credential: pair.server_credential.clone(),
        challenge: vc::encode_challenge(&[0x11; CHALLENGE_LEN]),
        ack_challenge: vc::encode_challenge(&[0x22; CHALLENGE_LEN]),
        timestamp: unix_millis(),
    };
    let payload = frame::encode_payload_frames(&[Frame::VcResponse(response)]);

    let header = Header {
        packet_type: PacketType::Handshake,
        version: packet::VERSION,
        destination_cid: initial_header.destination_cid,
        source_cid: ConnectionId::generate(),
        packet_number_low: 0,
    };
    let header_len = header.encoding_size();
    let mut datagram = vec![0u8; header_len + payload.len()];
    let mut encoder = EncoderBuffer::new(&mut datagram);
    encoder.encode(&header);
    encoder.write_slice(&payload);

    let now = pair.now;
    pair.client.handle_packet(now, &header, header_len, &mut datagram);

    assert!(pair.client.state().is_closed());
    assert_eq!(
        pair.client.take_events(),
        vec![ConnectionEvent::Closed {
            reason: Error::ChallengeMismatch,
        }]
    );
}

#[test]
fn heartbeats_flow_and_carry_a_sequence() {
    let mut pair = Pair::new();
    pair.establish();

    pair.advance(HEARTBEAT_INTERVAL);
    pair.pump();
    assert_eq!(
        pair.server().take_events(),
        vec![ConnectionEvent::Heartbeat { sequence: 0 }]
    );

    pair.advance(HEARTBEAT_INTERVAL);
    pair.pump();
    assert_eq!(
        pair.server().take_events(),
        vec![ConnectionEvent::Heartbeat { sequence: 1 }]
    );

    // heartbeats from either side keep the connection alive
    assert!(pair.client.is_established());
    assert!(pair.server().is_established());
}

#[test]
fn idle_timeout_evicts_the_connection() {
    let mut pair = Pair::new();
    pair.establish();

    // the peer goes silent: the driver keeps waking at each heartbeat
    // deadline and heartbeats keep being emitted, but nothing inbound
    // arrives
    let mut elapsed = Duration::ZERO;
    while elapsed < IDLE_TIMEOUT {
        assert!(pair.client.is_established(), "evicted after {elapsed:?}");
        pair.now += HEARTBEAT_INTERVAL;
        elapsed += HEARTBEAT_INTERVAL;
        pair.client.on_timeout(pair.now);
    }

    // evicted at the idle deadline, not later
    assert_eq!(elapsed, IDLE_TIMEOUT);
    assert!(pair.client.state().is_closed());
    assert_eq!(
        pair.client.take_events(),
        vec![ConnectionEvent::Closed {
            reason: Error::IdleTimeout,
        }]
    );

    // exactly one close event
    pair.client.on_timeout(pair.now + IDLE_TIMEOUT);
    assert!(pair.client.take_events().is_empty());
}

#[test]
fn inbound_traffic_resets_the_idle_deadline() {
    let mut pair = Pair::new();
    pair.establish();

    // heartbeats keep flowing in both directions well past the idle
    // deadline
    for _ in 0..8 {
        pair.advance(HEARTBEAT_INTERVAL);
        pair.pump();
        pair.client.take_events();
        pair.server().take_events();
    }

    assert!(pair.client.is_established());
    assert!(pair.server().is_established());

    // outbound traffic alone does not hold a connection open: the
    // peer stays silent while we keep sending
    for _ in 0..4 {
        pair.client.send_data(b"anyone there?").unwrap();
        pair.client.take_transmissions();
        pair.now += HEARTBEAT_INTERVAL;
        pair.client.on_timeout(pair.now);
    }

    assert!(pair.client.state().is_closed());
    assert_eq!(
        pair.client.take_events(),
        vec![ConnectionEvent::Closed {
            reason: Error::IdleTimeout,
        }]
    );
}

#[test]
fn user_close_notifies_the_peer() {
    let mut pair = Pair::new();
    pair.establish();

    pair.client.close(Error::UserRequested);

    assert!(pair.client.state().is_closed());
    assert_eq!(
        pair.client.take_events(),
        vec![ConnectionEvent::Closed {
            reason: Error::UserRequested,
        }]
    );

    // the best-effort CONNECTION_CLOSE reaches the peer
    pair.pump();
    let server_events = pair.server().take_events();
    assert_eq!(server_events.len(), 1);
    match &server_events[0] {
        ConnectionEvent::Closed {
            reason: Error::PeerClose { reason },
        } => assert_eq!(reason, "user_requested"),
        other => panic!("expected peer close, got {other:?}"),
    }
    assert!(pair.server().state().is_closed());
}

#[test]
fn closed_connections_drop_all_input() {
    let mut pair = Pair::new();
    pair.establish();

    let now = pair.now;
    pair.server().send_data(b"late").unwrap();
    let mut datagrams = pair.server().take_transmissions();

    pair.client.close(Error::UserRequested);
    pair.client.take_events();
    pair.client.take_transmissions();

    let mut datagram = datagrams.pop().unwrap();
    let (header, header_len) = Header::parse(&datagram).unwrap();
    pair.client.handle_packet(now, &header, header_len, &mut datagram);

    assert!(pair.client.take_events().is_empty());
    assert!(pair.client.take_transmissions().is_empty());
}

#[test]
fn client_drops_initial_packets() {
    let mut pair = Pair::new();
    let mut datagrams = pair.client.take_transmissions();
    let mut datagram = datagrams.pop().unwrap();
    let (header, header_len) = Header::parse(&datagram).unwrap();

    // clients are not servers in v1
    pair.client.handle_packet(pair.now, &header, header_len, &mut datagram);

    assert!(pair.client.state().is_initial());
    assert!(pair.client.take_events().is_empty());
    assert!(pair.client.take_transmissions().is_empty());
}

#[test]
fn repeated_decrypt_failures_close_an_established_connection() {
    let mut pair = Pair::new();
    pair.establish();

    let now = pair.now;
    pair.client.send_data(b"corrupt me").unwrap();
    let original = pair.client.take_transmissions().pop().unwrap();
    let (header, header_len) = Header::parse(&original).unwrap();

    for attempt in 0..MAX_DECRYPT_FAILURES {
        let mut tampered = original.clone();
        // tamper with the ciphertext, bumping the packet number byte
        // past the replay guard each round
        let last = tampered.len() - 1;
        tampered[last] ^= 0xa5;
        tampered[header_len - 1] = header.packet_number_low + 1 + attempt as u8;
        let (tampered_header, _) = Header::parse(&tampered).unwrap();

        assert!(pair.server().is_established(), "closed after {attempt} failures");
        pair.server()
            .handle_packet(now, &tampered_header, header_len, &mut tampered);
    }

    let server = pair.server();
    assert!(server.state().is_closed());
    assert_eq!(
        server.take_events(),
        vec![ConnectionEvent::Closed {
            reason: Error::DecryptFailed,
        }]
    );
}

#[test]
fn key_set_installation_is_idempotent() {
    use crate::crypto::{open::Application as _, seal::Application as _, TAG_LEN};

    let first = schedule::derive(
        Phase::Application,
        endpoint::Type::Client,
        &schedule::application_info(b"key-a", b"key-b"),
    );
    let partner = schedule::derive(
        Phase::Application,
        endpoint::Type::Server,
        &schedule::application_info(b"key-a", b"key-b"),
    );
    let second = schedule::derive(
        Phase::Application,
        endpoint::Type::Client,
        &schedule::application_info(b"other-a", b"other-b"),
    );

    let mut keys = PhaseKeys::default();
    keys.install(Phase::Application, first);
    // installing again must not corrupt the existing set
    keys.install(Phase::Application, second);

    let mut buf = vec![0u8; 4 + TAG_LEN];
    buf[..4].copy_from_slice(b"ping");
    keys.get(Phase::Application)
        .unwrap()
        .sealer
        .seal(0, b"hdr", &mut buf);

    partner.opener.open(0, b"hdr", &mut buf).unwrap();
}
