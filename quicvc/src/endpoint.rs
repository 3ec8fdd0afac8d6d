// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The endpoint driver: receives datagrams, routes them to
//! connections, sweeps timers, and flushes staged output.
//!
//! All connection-table mutation happens inside one critical section.
//! Datagrams staged under the lock are flushed after release, and
//! events are delivered on the emitting task once the lock is
//! dropped.

use crate::service;
use hashbrown::HashMap;
use parking_lot::Mutex;
use quicvc_core::{
    connection::{Connection, ConnectionEvent, ConnectionId, Error},
    credentials::Credential,
    event::{ConnectionMeta, Subscriber},
    frame::stream::COMMAND_STREAM_ID,
    packet::{self, Header, PacketType},
    Verifier,
};
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering::Relaxed},
        Arc, OnceLock,
    },
    time::Instant,
};
use tokio::{
    net::UdpSocket,
    sync::{oneshot, Notify},
};

/// Point-in-time counters of datagrams dropped by the endpoint
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DropStats {
    /// Malformed packets
    pub decode: u64,
    /// Unsupported version field
    pub version: u64,
    /// No connection matched the DCID or address
    pub unknown_connection: u64,
    /// RETRY packets, which a receiver drops in v1
    pub retry: u64,
    /// STREAM frames with no registered handler
    pub unhandled_stream: u64,
}

#[derive(Default)]
pub(crate) struct DropCounters {
    decode: AtomicU64,
    version: AtomicU64,
    unknown_connection: AtomicU64,
    retry: AtomicU64,
    unhandled_stream: AtomicU64,
}

pub(crate) struct State {
    pub connections: HashMap<ConnectionId, Connection>,
    /// device id -> connection, maintained as peers are identified
    pub by_device: HashMap<String, ConnectionId>,
    /// secondary lookup for client-role connections whose peers echo
    /// connection ids inconsistently
    pub by_addr: HashMap<SocketAddr, ConnectionId>,
    /// the credential presented in future handshakes
    pub credential: Credential,
    pub pending_connects: HashMap<ConnectionId, Vec<oneshot::Sender<Result<(), Error>>>>,
}

pub(crate) struct Inner<S: Subscriber> {
    pub state: Mutex<State>,
    pub socket: OnceLock<Arc<UdpSocket>>,
    pub verifier: Arc<dyn Verifier>,
    pub local_identity: String,
    pub subscriber: S,
    pub handlers: service::Registry,
    pub timer_wake: Notify,
    pub drops: DropCounters,
}

/// Output staged under the state lock and applied after release
#[derive(Default)]
pub(crate) struct Output {
    pub datagrams: Vec<(SocketAddr, Vec<u8>)>,
    pub events: Vec<(ConnectionMeta, ConnectionEvent)>,
    pub resolutions: Vec<(oneshot::Sender<Result<(), Error>>, Result<(), Error>)>,
}

pub(crate) async fn drive<S: Subscriber>(inner: Arc<Inner<S>>, socket: Arc<UdpSocket>) {
    let mut buf = vec![0u8; 2048];

    loop {
        let deadline = inner.next_deadline();

        tokio::select! {
            result = socket.recv_from(&mut buf) => match result {
                Ok((len, peer_addr)) => {
                    let output = inner.on_datagram(&mut buf[..len], peer_addr);
                    inner.flush_logged(output).await;
                }
                Err(error) => {
                    tracing::debug!(%error, "udp receive failed");
                }
            },
            // an application operation re-armed a timer
            _ = inner.timer_wake.notified() => {}
            _ = sleep_until_deadline(deadline) => {
                let output = inner.on_timeout();
                inner.flush_logged(output).await;
            }
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => {
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await
        }
        None => std::future::pending::<()>().await,
    }
}

impl<S: Subscriber> Inner<S> {
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.state
            .lock()
            .connections
            .values()
            .filter_map(Connection::next_timeout)
            .min()
    }

    pub(crate) fn drop_stats(&self) -> DropStats {
        DropStats {
            decode: self.drops.decode.load(Relaxed),
            version: self.drops.version.load(Relaxed),
            unknown_connection: self.drops.unknown_connection.load(Relaxed),
            retry: self.drops.retry.load(Relaxed),
            unhandled_stream: self.drops.unhandled_stream.load(Relaxed),
        }
    }

    /// Classifies a datagram and routes it to a connection, creating
    /// a server-role connection for an INITIAL with an unknown DCID.
    pub(crate) fn on_datagram(&self, datagram: &mut [u8], peer_addr: SocketAddr) -> Output {
        let now = Instant::now();
        let mut output = Output::default();

        let (header, header_len) = match Header::parse(datagram) {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::debug!(%error, %peer_addr, "dropping undecodable datagram");
                self.drops.decode.fetch_add(1, Relaxed);
                return output;
            }
        };

        if header.version != packet::VERSION {
            tracing::debug!(version = header.version, "dropping unsupported version");
            self.drops.version.fetch_add(1, Relaxed);
            return output;
        }

        if header.packet_type == PacketType::Retry {
            self.drops.retry.fetch_add(1, Relaxed);
            return output;
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let cid = if state.connections.contains_key(&header.destination_cid) {
            Some(header.destination_cid)
        } else if header.packet_type == PacketType::Initial {
            if state.by_addr.contains_key(&peer_addr) {
                // a stray server probe toward an address we initiated to
                tracing::debug!(%peer_addr, "dropping stray INITIAL for a client connection");
                None
            } else {
                let connection = Connection::new_server(
                    header.destination_cid,
                    peer_addr,
                    state.credential.clone(),
                    self.verifier.clone(),
                    &self.local_identity,
                    now,
                );
                let cid = connection.local_dcid();
                state.connections.insert(cid, connection);
                Some(cid)
            }
        } else {
            state.by_addr.get(&peer_addr).copied()
        };

        let Some(cid) = cid else {
            self.drops.unknown_connection.fetch_add(1, Relaxed);
            return output;
        };

        if let Some(connection) = state.connections.get_mut(&cid) {
            connection.handle_packet(now, &header, header_len, datagram);
        }
        self.drain_connection(state, cid, &mut output);

        output
    }

    /// Fires expired connection timers
    pub(crate) fn on_timeout(&self) -> Output {
        let now = Instant::now();
        let mut output = Output::default();

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let expired: Vec<ConnectionId> = state
            .connections
            .iter()
            .filter(|(_, connection)| {
                connection
                    .next_timeout()
                    .is_some_and(|deadline| deadline <= now)
            })
            .map(|(cid, _)| *cid)
            .collect();

        for cid in expired {
            if let Some(connection) = state.connections.get_mut(&cid) {
                connection.on_timeout(now);
            }
            self.drain_connection(state, cid, &mut output);
        }

        output
    }

    /// Collects a connection's staged datagrams and events, keeps the
    /// lookup tables current, and removes the record on close.
    pub(crate) fn drain_connection(
        &self,
        state: &mut State,
        cid: ConnectionId,
        output: &mut Output,
    ) {
        let Some(connection) = state.connections.get_mut(&cid) else {
            return;
        };

        let peer_addr = connection.peer_addr();
        for datagram in connection.take_transmissions() {
            output.datagrams.push((peer_addr, datagram));
        }

        let device_id = connection.device_id().map(str::to_string);
        let events = connection.take_events();
        let closed = connection.state().is_closed();

        if let Some(device_id) = &device_id {
            state.by_device.entry(device_id.clone()).or_insert(cid);
        }

        let mut close_reason = None;
        for event in &events {
            match event {
                ConnectionEvent::Established(_) => {
                    if let Some(senders) = state.pending_connects.remove(&cid) {
                        for sender in senders {
                            output.resolutions.push((sender, Ok(())));
                        }
                    }
                }
                ConnectionEvent::Closed { reason } => close_reason = Some(reason.clone()),
                _ => {}
            }
        }

        if let Some(device_id) = device_id {
            let meta = ConnectionMeta { device_id };
            for event in events {
                output.events.push((meta.clone(), event));
            }
        }

        if closed {
            state.connections.remove(&cid);
            state.by_addr.retain(|_, value| *value != cid);
            state.by_device.retain(|_, value| *value != cid);

            if let Some(senders) = state.pending_connects.remove(&cid) {
                let reason = close_reason.unwrap_or(Error::UserRequested);
                for sender in senders {
                    output.resolutions.push((sender, Err(reason.clone())));
                }
            }
        }
    }

    /// Sends staged datagrams, surfacing the first socket error
    pub(crate) async fn send_datagrams(
        &self,
        datagrams: &[(SocketAddr, Vec<u8>)],
    ) -> Result<(), Error> {
        if datagrams.is_empty() {
            return Ok(());
        }

        let socket = self.socket.get().ok_or(Error::NotBound)?;
        for (peer_addr, datagram) in datagrams {
            if datagram.len() > packet::MAX_DATAGRAM_LEN {
                tracing::debug!(len = datagram.len(), "dropping oversized datagram");
                continue;
            }
            socket
                .send_to(datagram, *peer_addr)
                .await
                .map_err(|error| Error::SendFailed(error.to_string()))?;
        }
        Ok(())
    }

    /// Resolves connect futures and delivers events to the subscriber
    /// and stream handlers. Called with the state lock released.
    pub(crate) fn dispatch(&self, output: Output) {
        for (sender, result) in output.resolutions {
            let _ = sender.send(result);
        }

        for (meta, event) in output.events {
            match event {
                ConnectionEvent::HandshakeComplete => {
                    self.subscriber.on_handshake_complete(&meta);
                }
                ConnectionEvent::Established(peer) => {
                    self.subscriber.on_connection_established(&meta, &peer);
                }
                ConnectionEvent::Closed { reason } => {
                    self.subscriber.on_connection_closed(&meta, &reason.to_string());
                }
                ConnectionEvent::Heartbeat { sequence } => {
                    self.subscriber.on_heartbeat(&meta, sequence);
                }
                ConnectionEvent::Stream { stream_id, data } => {
                    if stream_id == COMMAND_STREAM_ID {
                        if let Some(kind) = service::command_kind(&data) {
                            self.subscriber.on_command_response(&meta, &kind, &data);
                        }
                    }
                    if !self.handlers.dispatch(stream_id, &data, &meta) {
                        self.drops.unhandled_stream.fetch_add(1, Relaxed);
                        self.subscriber.on_stream(&meta, stream_id, &data);
                    }
                }
            }
        }
    }

    /// Flushes and surfaces the first send error to the caller
    pub(crate) async fn flush_surfaced(&self, output: Output) -> Result<(), Error> {
        let Output {
            datagrams,
            events,
            resolutions,
        } = output;

        let result = self.send_datagrams(&datagrams).await;
        self.dispatch(Output {
            datagrams: Vec::new(),
            events,
            resolutions,
        });
        result
    }

    pub(crate) async fn flush_logged(&self, output: Output) {
        let Output {
            datagrams,
            events,
            resolutions,
        } = output;

        if let Err(error) = self.send_datagrams(&datagrams).await {
            tracing::debug!(%error, "failed to flush datagrams");
        }

        self.dispatch(Output {
            datagrams: Vec::new(),
            events,
            resolutions,
        });
    }
}
