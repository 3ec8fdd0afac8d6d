// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The per-connection state machine.
//!
//! A connection is sans-IO: it consumes parsed packets and timer
//! ticks, and stages outgoing datagrams and events. The runtime layer
//! drains [`Connection::take_transmissions`] onto the socket and
//! [`Connection::take_events`] into the application surface after
//! every call into the connection.

use crate::{
    credentials::{Credential, VerifiedPeer, Verifier},
    crypto::{
        open::Application as _,
        schedule::{self, Phase, PhaseSecret},
        seal::Application as _,
        TAG_LEN,
    },
    endpoint,
    frame::{
        self,
        stream::DATA_STREAM_ID,
        vc::{self, CHALLENGE_LEN},
        Ack, ConnectionClose, Frame, Heartbeat, Stream, VcAck, VcResponse,
    },
    packet::{self, number, number::ReplayGuard, Header, PacketType},
    time::{unix_millis, Timer},
};
use arrayvec::ArrayVec;
use bytes::Bytes;
use s2n_codec::{Encoder, EncoderBuffer, EncoderValue};
use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

pub mod error;
pub mod id;
pub mod state;

pub use error::Error;
pub use id::ConnectionId;
pub use state::State;

#[cfg(test)]
mod tests;

/// The handshake deadline, measured from connection birth
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// The heartbeat interval on established connections
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// The idle deadline, measured from the last successfully received
/// packet. Outbound traffic does not extend it: a peer that has gone
/// silent is evicted even while local heartbeats keep being emitted.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// AEAD failures tolerated within one idle interval on an established
/// connection
pub const MAX_DECRYPT_FAILURES: u32 = 16;

/// Bound on packet numbers awaiting acknowledgement
pub const ACK_QUEUE_LIMIT: usize = 32;

/// Events staged by a connection for the runtime layer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The connection reached the established state
    HandshakeComplete,
    /// Emitted at the same moment as [`ConnectionEvent::HandshakeComplete`],
    /// once, with the verified peer record
    Established(VerifiedPeer),
    /// The connection was destroyed
    Closed { reason: Error },
    /// A decrypted STREAM frame
    Stream { stream_id: u8, data: Bytes },
    /// An inbound HEARTBEAT frame
    Heartbeat { sequence: u64 },
}

/// Key sets installed as the handshake progresses.
///
/// A set that is already installed is never replaced; installing a
/// phase twice is a no-op.
#[derive(Debug, Default)]
struct PhaseKeys {
    initial: Option<PhaseSecret>,
    handshake: Option<PhaseSecret>,
    application: Option<PhaseSecret>,
}

impl PhaseKeys {
    fn install(&mut self, phase: Phase, secret: PhaseSecret) {
        let slot = match phase {
            Phase::Initial => &mut self.initial,
            Phase::Handshake => &mut self.handshake,
            Phase::Application => &mut self.application,
        };
        if slot.is_none() {
            *slot = Some(secret);
        }
    }

    fn get(&self, phase: Phase) -> Option<&PhaseSecret> {
        match phase {
            Phase::Initial => self.initial.as_ref(),
            Phase::Handshake => self.handshake.as_ref(),
            Phase::Application => self.application.as_ref(),
        }
    }
}

pub struct Connection {
    role: endpoint::Type,
    state: State,
    local_dcid: ConnectionId,
    local_scid: ConnectionId,
    peer_scid: Option<ConnectionId>,
    peer_addr: SocketAddr,
    device_id: Option<String>,
    trust_root: String,
    local_credential: Credential,
    verifier: Arc<dyn Verifier>,
    challenge: [u8; CHALLENGE_LEN],
    verified_peer: Option<VerifiedPeer>,
    keys: PhaseKeys,
    next_packet_number: u64,
    replay: ReplayGuard,
    ack_queue: ArrayVec<u64, ACK_QUEUE_LIMIT>,
    heartbeat_sequence: u64,
    decrypt_failures: u32,
    failure_window_start: Option<Instant>,
    handshake_timer: Timer,
    heartbeat_timer: Timer,
    idle_timer: Timer,
    created_at: Instant,
    last_activity_at: Instant,
    transmissions: Vec<Vec<u8>>,
    events: Vec<ConnectionEvent>,
}

impl core::fmt::Debug for Connection {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("Connection")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("local_dcid", &self.local_dcid)
            .field("peer_addr", &self.peer_addr)
            .field("device_id", &self.device_id)
            .finish()
    }
}

impl Connection {
    /// Opens a client-role connection and stages the INITIAL packet
    /// carrying VC_INIT.
    pub fn new_client(
        device_id: &str,
        peer_addr: SocketAddr,
        local_credential: Credential,
        verifier: Arc<dyn Verifier>,
        trust_root: &str,
        peer_credential_hint: Option<&Credential>,
        now: Instant,
    ) -> Self {
        let mut connection = Self::new(
            endpoint::Type::Client,
            ConnectionId::generate(),
            peer_addr,
            local_credential,
            verifier,
            trust_root,
            now,
        );
        connection.device_id = Some(device_id.to_string());

        // with a credential hint both ids are known up front
        if let Some(hint) = peer_credential_hint {
            connection.install_initial_keys(hint);
        }

        let vc_init = frame::VcInit {
            credential: connection.local_credential.clone(),
            challenge: vc::encode_challenge(&connection.challenge),
            timestamp: unix_millis(),
        };
        connection.transmit_clear(PacketType::Initial, &[Frame::VcInit(vc_init)]);

        connection
    }

    /// Accepts a server-role connection for an INITIAL packet whose
    /// DCID is not known. The client's DCID becomes this connection's
    /// id so both directions carry the same identifier on the wire.
    pub fn new_server(
        destination_cid: ConnectionId,
        peer_addr: SocketAddr,
        local_credential: Credential,
        verifier: Arc<dyn Verifier>,
        trust_root: &str,
        now: Instant,
    ) -> Self {
        Self::new(
            endpoint::Type::Server,
            destination_cid,
            peer_addr,
            local_credential,
            verifier,
            trust_root,
            now,
        )
    }

    fn new(
        role: endpoint::Type,
        local_dcid: ConnectionId,
        peer_addr: SocketAddr,
        local_credential: Credential,
        verifier: Arc<dyn Verifier>,
        trust_root: &str,
        now: Instant,
    ) -> Self {
        use rand::RngCore;

        let mut challenge = [0u8; CHALLENGE_LEN];
        rand::rng().fill_bytes(&mut challenge);

        let mut handshake_timer = Timer::default();
        handshake_timer.set(now + HANDSHAKE_TIMEOUT);

        Self {
            role,
            state: State::default(),
            local_dcid,
            local_scid: ConnectionId::generate(),
            peer_scid: None,
            peer_addr,
            device_id: None,
            trust_root: trust_root.to_string(),
            local_credential,
            verifier,
            challenge,
            verified_peer: None,
            keys: PhaseKeys::default(),
            next_packet_number: 0,
            replay: ReplayGuard::default(),
            ack_queue: ArrayVec::new(),
            heartbeat_sequence: 0,
            decrypt_failures: 0,
            failure_window_start: None,
            handshake_timer,
            heartbeat_timer: Timer::default(),
            idle_timer: Timer::default(),
            created_at: now,
            last_activity_at: now,
            transmissions: Vec::new(),
            events: Vec::new(),
        }
    }

    #[inline]
    pub fn role(&self) -> endpoint::Type {
        self.role
    }

    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    #[inline]
    pub fn is_established(&self) -> bool {
        self.state.is_established()
    }

    #[inline]
    pub fn local_dcid(&self) -> ConnectionId {
        self.local_dcid
    }

    /// The peer's source connection id, once a packet has been seen
    #[inline]
    pub fn peer_scid(&self) -> Option<ConnectionId> {
        self.peer_scid
    }

    #[inline]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    #[inline]
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    #[inline]
    pub fn verified_peer(&self) -> Option<&VerifiedPeer> {
        self.verified_peer.as_ref()
    }

    #[inline]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    #[inline]
    pub fn last_activity_at(&self) -> Instant {
        self.last_activity_at
    }

    /// The earliest armed timer, if any
    pub fn next_timeout(&self) -> Option<Instant> {
        [
            self.handshake_timer.expiration(),
            self.heartbeat_timer.expiration(),
            self.idle_timer.expiration(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Drains datagrams staged for the peer
    pub fn take_transmissions(&mut self) -> Vec<Vec<u8>> {
        core::mem::take(&mut self.transmissions)
    }

    /// Drains staged events
    pub fn take_events(&mut self) -> Vec<ConnectionEvent> {
        core::mem::take(&mut self.events)
    }

    /// Feeds a parsed packet into the state machine. `header_len` is
    /// the encoded header length; the remainder of `datagram` is the
    /// frame payload, decrypted in place for PROTECTED packets.
    pub fn handle_packet(
        &mut self,
        now: Instant,
        header: &Header,
        header_len: usize,
        datagram: &mut [u8],
    ) {
        if self.state.is_closed() {
            return;
        }

        self.last_activity_at = now;
        if self.peer_scid.is_none() {
            self.peer_scid = Some(header.source_cid);
        }

        match (self.role, header.packet_type) {
            (endpoint::Type::Server, PacketType::Initial) => {
                self.on_initial_packet(header_len, datagram)
            }
            (endpoint::Type::Client, PacketType::Handshake) => {
                self.on_handshake_packet(now, header_len, datagram)
            }
            (_, PacketType::Protected) => self.on_protected_packet(now, header, header_len, datagram),
            (role, packet_type) => {
                tracing::debug!(?role, ?packet_type, "dropping unexpected packet type");
            }
        }
    }

    /// Fires any expired timers
    pub fn on_timeout(&mut self, now: Instant) {
        if self.state.is_closed() {
            return;
        }

        if self.handshake_timer.poll_expiration(now).is_ready() && !self.state.is_established() {
            self.close(Error::HandshakeTimeout);
            return;
        }

        if self.idle_timer.poll_expiration(now).is_ready() {
            self.close(Error::IdleTimeout);
            return;
        }

        if self.heartbeat_timer.poll_expiration(now).is_ready() {
            let heartbeat = Heartbeat {
                timestamp: unix_millis(),
                sequence: self.heartbeat_sequence,
            };
            self.heartbeat_sequence += 1;

            if let Err(error) =
                self.transmit_protected(Phase::Application, vec![Frame::Heartbeat(heartbeat)])
            {
                tracing::debug!(%error, "failed to stage heartbeat");
            }
            self.heartbeat_timer.set(now + HEARTBEAT_INTERVAL);
        }
    }

    /// Submits application data as a single STREAM frame on the data
    /// stream
    pub fn send_data(&mut self, data: &[u8]) -> Result<(), Error> {
        if !self.state.is_established() {
            return Err(Error::NotEstablished);
        }
        let stream = Stream {
            stream_id: DATA_STREAM_ID,
            data,
        };
        self.transmit_protected(Phase::Application, vec![Frame::Stream(stream)])
    }

    /// Submits pre-encoded frames as the payload of one PROTECTED
    /// packet
    pub fn send_frame(&mut self, frame_bytes: &[u8]) -> Result<(), Error> {
        if !self.state.is_established() {
            return Err(Error::NotEstablished);
        }
        frame::decode_payload(frame_bytes).map_err(|_| Error::WireDecode)?;
        self.transmit_protected_payload(Phase::Application, frame_bytes)
    }

    /// Destroys the connection: cancels timers, emits a best-effort
    /// CONNECTION_CLOSE when application keys are installed, and
    /// stages the `Closed` event.
    pub fn close(&mut self, reason: Error) {
        self.close_inner(reason, true);
    }

    fn close_inner(&mut self, reason: Error, notify_peer: bool) {
        if self.state.is_closed() {
            return;
        }

        if notify_peer && self.keys.get(Phase::Application).is_some() {
            let reason_text = reason.to_string();
            let close = ConnectionClose {
                error_code: reason.wire_code(),
                reason: reason_text.as_bytes(),
            };
            let _ =
                self.transmit_protected(Phase::Application, vec![Frame::ConnectionClose(close)]);
        }

        self.handshake_timer.cancel();
        self.heartbeat_timer.cancel();
        self.idle_timer.cancel();

        let _ = self.state.on_closed();

        // a server-role connection that never identified its peer is
        // invisible to the application and closes silently
        if self.device_id.is_some() {
            self.events.push(ConnectionEvent::Closed { reason });
        } else {
            tracing::debug!(%reason, "closing unidentified connection");
        }
    }

    fn on_initial_packet(&mut self, header_len: usize, datagram: &[u8]) {
        if !self.state.is_initial() {
            tracing::debug!(state = ?self.state, "dropping duplicate INITIAL");
            return;
        }

        let frames = match frame::decode_payload(&datagram[header_len..]) {
            Ok(frames) => frames,
            Err(error) => {
                tracing::debug!(%error, "dropping malformed INITIAL payload");
                return;
            }
        };

        let [Frame::VcInit(vc_init)] = frames.as_slice() else {
            tracing::debug!("dropping INITIAL without a single VC_INIT frame");
            return;
        };

        let Some(peer_challenge) = vc_init.challenge_bytes() else {
            tracing::debug!("dropping VC_INIT with malformed challenge");
            return;
        };

        let peer = match self.verify_credential(&vc_init.credential, None) {
            Ok(peer) => peer,
            Err(error) => {
                tracing::warn!(%error, "rejecting client credential");
                self.close(error);
                return;
            }
        };

        self.device_id = Some(peer.device_id.clone());
        self.install_initial_keys(&vc_init.credential);

        let response = VcResponse {
            credential: self.local_credential.clone(),
            challenge: vc::encode_challenge(&self.challenge),
            ack_challenge: vc::encode_challenge(&peer_challenge),
            timestamp: unix_millis(),
        };

        let peer_signature = vc_init.credential.signature().to_vec();
        let peer_public_key = peer.public_key.clone();
        self.verified_peer = Some(peer);

        let _ = self.state.on_handshake();
        self.transmit_clear(PacketType::Handshake, &[Frame::VcResponse(response)]);

        // the server's own challenge is the one carried in VC_RESPONSE
        let server_challenge = self.challenge;
        self.install_handshake_keys(&server_challenge, &peer_signature);
        self.install_application_keys(&peer_public_key);
    }

    fn on_handshake_packet(&mut self, now: Instant, header_len: usize, datagram: &[u8]) {
        if !self.state.is_initial() {
            tracing::debug!(state = ?self.state, "dropping duplicate HANDSHAKE");
            return;
        }

        let frames = match frame::decode_payload(&datagram[header_len..]) {
            Ok(frames) => frames,
            Err(error) => {
                tracing::debug!(%error, "dropping malformed HANDSHAKE payload");
                return;
            }
        };

        let [Frame::VcResponse(response)] = frames.as_slice() else {
            tracing::debug!("dropping HANDSHAKE without a single VC_RESPONSE frame");
            return;
        };

        let Some(ack_challenge) = response.ack_challenge_bytes() else {
            tracing::debug!("dropping VC_RESPONSE with malformed ack_challenge");
            return;
        };

        if !constant_time_eq(&ack_challenge, &self.challenge) {
            self.close(Error::ChallengeMismatch);
            return;
        }

        let Some(server_challenge) = response.challenge_bytes() else {
            tracing::debug!("dropping VC_RESPONSE with malformed challenge");
            return;
        };

        let expected_subject = self.device_id.clone();
        let peer = match self.verify_credential(&response.credential, expected_subject.as_deref())
        {
            Ok(peer) => peer,
            Err(error) => {
                tracing::warn!(%error, "rejecting server credential");
                self.close(error);
                return;
            }
        };

        self.install_initial_keys(&response.credential);
        self.install_handshake_keys(&server_challenge, response.credential.signature());
        self.install_application_keys(&peer.public_key);
        self.verified_peer = Some(peer.clone());

        let vc_ack = VcAck {
            ack_challenge: vc::encode_challenge(&server_challenge),
            timestamp: unix_millis(),
        };

        let _ = self.state.on_handshake();
        if let Err(error) = self.transmit_protected(Phase::Handshake, vec![Frame::VcAck(vc_ack)]) {
            self.close(error);
            return;
        }

        self.enter_established(now, peer);
    }

    fn on_protected_packet(
        &mut self,
        now: Instant,
        header: &Header,
        header_len: usize,
        datagram: &mut [u8],
    ) {
        // the VC_ACK flight is sealed with the Handshake set; once
        // established the Application set is current
        let phase = match self.state {
            State::Handshake => Phase::Handshake,
            State::Established => Phase::Application,
            _ => {
                tracing::debug!("dropping PROTECTED packet before credential exchange");
                return;
            }
        };

        let packet_number = self.replay.expand(header.packet_number_low);
        if !self.replay.check(packet_number) {
            tracing::debug!(packet_number, "dropping replayed packet");
            return;
        }

        let (header_bytes, body) = datagram.split_at_mut(header_len);
        if body.len() < TAG_LEN {
            tracing::debug!("dropping PROTECTED packet shorter than an auth tag");
            return;
        }

        let Some(secret) = self.keys.get(phase) else {
            tracing::debug!(?phase, "dropping packet without installed keys");
            return;
        };

        let plaintext = match secret.opener.open(packet_number, header_bytes, body) {
            Ok(plaintext) => plaintext.to_vec(),
            Err(_) => {
                self.on_decrypt_failure(now);
                return;
            }
        };

        self.replay.on_accepted(packet_number);
        self.queue_ack(packet_number);

        match self.state {
            State::Handshake => self.on_handshake_completion(now, &plaintext),
            State::Established => self.on_application_payload(&plaintext),
            _ => {}
        }

        // each successfully received PROTECTED packet resets the idle
        // deadline
        if self.state.is_established() {
            self.idle_timer.set(now + IDLE_TIMEOUT);
        }
    }

    /// Server side: the first Handshake-sealed PROTECTED packet must
    /// open with VC_ACK echoing our challenge.
    fn on_handshake_completion(&mut self, now: Instant, payload: &[u8]) {
        let frames = match frame::decode_payload(payload) {
            Ok(frames) => frames,
            Err(error) => {
                tracing::debug!(%error, "dropping malformed VC_ACK payload");
                return;
            }
        };

        let Some(Frame::VcAck(vc_ack)) = frames.first() else {
            tracing::debug!("dropping PROTECTED packet without leading VC_ACK");
            return;
        };

        if !frames[1..].iter().all(|frame| matches!(frame, Frame::Ack(_))) {
            tracing::debug!("dropping VC_ACK packet with frames not admitted in handshake");
            return;
        }

        let Some(ack_challenge) = vc_ack.ack_challenge_bytes() else {
            tracing::debug!("dropping VC_ACK with malformed ack_challenge");
            return;
        };

        if !constant_time_eq(&ack_challenge, &self.challenge) {
            self.close(Error::ChallengeMismatch);
            return;
        }

        let peer = self
            .verified_peer
            .clone()
            .expect("peer was verified before entering the handshake state");
        self.enter_established(now, peer);
    }

    fn on_application_payload(&mut self, payload: &[u8]) {
        let frames = match frame::decode_payload(payload) {
            Ok(frames) => frames,
            Err(error) => {
                tracing::debug!(%error, "dropping malformed packet payload");
                return;
            }
        };

        let admitted = frames.iter().all(|frame| {
            matches!(
                frame,
                Frame::Stream(_) | Frame::Heartbeat(_) | Frame::Ack(_) | Frame::ConnectionClose(_)
            )
        });
        if !admitted {
            tracing::debug!("dropping packet with frames not admitted in established");
            return;
        }

        for frame in frames {
            match frame {
                Frame::Stream(stream) => self.events.push(ConnectionEvent::Stream {
                    stream_id: stream.stream_id,
                    data: Bytes::copy_from_slice(stream.data),
                }),
                Frame::Heartbeat(heartbeat) => self.events.push(ConnectionEvent::Heartbeat {
                    sequence: heartbeat.sequence,
                }),
                Frame::Ack(ack) => {
                    tracing::trace!(acknowledged = ?ack.packet_numbers(), "peer acknowledged packets");
                }
                Frame::ConnectionClose(close) => {
                    let reason = close.reason_utf8().into_owned();
                    self.close_inner(Error::PeerClose { reason }, false);
                    return;
                }
                _ => unreachable!("admission checked above"),
            }
        }
    }

    fn on_decrypt_failure(&mut self, now: Instant) {
        tracing::debug!("dropping packet that failed authentication");

        // reordered or stale packets never tear down a connection that
        // is still handshaking
        if !self.state.is_established() {
            return;
        }

        match self.failure_window_start {
            Some(start) if now.duration_since(start) <= IDLE_TIMEOUT => {
                self.decrypt_failures += 1;
            }
            _ => {
                self.failure_window_start = Some(now);
                self.decrypt_failures = 1;
            }
        }

        if self.decrypt_failures >= MAX_DECRYPT_FAILURES {
            self.close(Error::DecryptFailed);
        }
    }

    fn enter_established(&mut self, now: Instant, peer: VerifiedPeer) {
        let _ = self.state.on_established();
        self.handshake_timer.cancel();
        self.heartbeat_timer.set(now + HEARTBEAT_INTERVAL);
        self.idle_timer.set(now + IDLE_TIMEOUT);
        self.events.push(ConnectionEvent::HandshakeComplete);
        self.events.push(ConnectionEvent::Established(peer));
    }

    fn verify_credential(
        &self,
        credential: &Credential,
        expected_subject_id: Option<&str>,
    ) -> Result<VerifiedPeer, Error> {
        let bytes = serde_json::to_vec(credential).map_err(|_| Error::VerificationFailed)?;
        let peer = self
            .verifier
            .verify(&bytes, expected_subject_id)
            .ok_or(Error::VerificationFailed)?;

        // the verified subject must match the id embedded in the
        // credential, and the issuer must be this deployment's trust
        // root
        if peer.device_id != credential.subject_id() {
            return Err(Error::VerificationFailed);
        }
        if peer.issuer != self.trust_root {
            return Err(Error::VerificationFailed);
        }

        Ok(peer)
    }

    fn install_initial_keys(&mut self, peer_credential: &Credential) {
        let info = schedule::initial_info(self.local_credential.id(), peer_credential.id());
        self.keys
            .install(Phase::Initial, schedule::derive(Phase::Initial, self.role, &info));
    }

    fn install_handshake_keys(&mut self, server_challenge: &[u8], peer_signature: &[u8]) {
        let info = schedule::handshake_info(
            server_challenge,
            self.local_credential.signature(),
            peer_signature,
        );
        self.keys.install(
            Phase::Handshake,
            schedule::derive(Phase::Handshake, self.role, &info),
        );
    }

    fn install_application_keys(&mut self, peer_public_key: &[u8]) {
        let info = schedule::application_info(self.local_credential.public_key(), peer_public_key);
        self.keys.install(
            Phase::Application,
            schedule::derive(Phase::Application, self.role, &info),
        );
    }

    fn alloc_packet_number(&mut self) -> u64 {
        let packet_number = self.next_packet_number;
        self.next_packet_number += 1;
        packet_number
    }

    fn long_header(&self, packet_type: PacketType, packet_number: u64) -> Header {
        Header {
            packet_type,
            version: packet::VERSION,
            // both directions carry the connection's shared id; each
            // side contributes its own source id
            destination_cid: self.local_dcid,
            source_cid: self.local_scid,
            packet_number_low: number::truncate(packet_number),
        }
    }

    fn transmit_clear(&mut self, packet_type: PacketType, frames: &[Frame]) {
        let packet_number = self.alloc_packet_number();
        let header = self.long_header(packet_type, packet_number);
        let header_len = header.encoding_size();

        let payload = frame::encode_payload_frames(frames);
        debug_assert!(payload.len() <= packet::MAX_PAYLOAD_LEN);

        let mut datagram = vec![0u8; header_len + payload.len()];
        let mut encoder = EncoderBuffer::new(&mut datagram);
        encoder.encode(&header);
        encoder.write_slice(&payload);

        self.transmissions.push(datagram);
    }

    fn transmit_protected(&mut self, phase: Phase, mut frames: Vec<Frame>) -> Result<(), Error> {
        // pending acknowledgements piggyback on every outbound packet
        if !self.ack_queue.is_empty() {
            let packet_numbers: Vec<u64> = self.ack_queue.drain(..).collect();
            frames.insert(0, Frame::Ack(Ack::new(packet_numbers)));
        }

        let payload = frame::encode_payload_frames(&frames);
        self.transmit_protected_payload(phase, &payload)
    }

    fn transmit_protected_payload(&mut self, phase: Phase, payload: &[u8]) -> Result<(), Error> {
        if payload.len() > packet::MAX_PAYLOAD_LEN {
            return Err(Error::PacketTooLarge);
        }
        if self.keys.get(phase).is_none() {
            return Err(Error::NotEstablished);
        }

        let packet_number = self.alloc_packet_number();
        let header = self.long_header(PacketType::Protected, packet_number);
        let header_len = header.encoding_size();

        let mut datagram = vec![0u8; header_len + payload.len() + TAG_LEN];
        {
            let mut encoder = EncoderBuffer::new(&mut datagram);
            encoder.encode(&header);
            encoder.write_slice(payload);
        }
        debug_assert!(datagram.len() <= packet::MAX_DATAGRAM_LEN);

        let (header_bytes, body) = datagram.split_at_mut(header_len);
        let secret = self.keys.get(phase).expect("presence checked above");
        secret.sealer.seal(packet_number, header_bytes, body);

        self.transmissions.push(datagram);

        Ok(())
    }

    fn queue_ack(&mut self, packet_number: u64) {
        if self.ack_queue.is_full() {
            self.ack_queue.remove(0);
        }
        self.ack_queue.push(packet_number);
    }

    #[cfg(test)]
    pub(crate) fn replay_guard(&self) -> &ReplayGuard {
        &self.replay
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    aws_lc_rs::constant_time::verify_slices_are_equal(a, b).is_ok()
}
