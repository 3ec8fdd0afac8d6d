// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The public surface: one manager per local identity, multiplexing
//! many concurrent connections over one UDP socket.

use crate::{
    endpoint::{self, DropStats, Inner, Output, State},
    service,
};
use hashbrown::HashMap;
use parking_lot::Mutex;
use quicvc_core::{
    connection::{Connection, Error},
    credentials::Credential,
    event::{disabled, ConnectionMeta, Subscriber},
    Verifier,
};
use std::{
    net::{IpAddr, SocketAddr},
    sync::{Arc, OnceLock},
    time::Instant,
};
use tokio::{net::UdpSocket, sync::oneshot};

pub struct Manager<S: Subscriber = disabled::Subscriber> {
    inner: Arc<Inner<S>>,
    driver: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Manager<disabled::Subscriber> {
    /// Creates a manager that discards events. `local_identity` is the
    /// trust root of this deployment: only credentials issued by it
    /// are accepted.
    pub fn new(
        local_identity: &str,
        credential: Credential,
        verifier: Arc<dyn Verifier>,
    ) -> Self {
        Self::with_subscriber(
            local_identity,
            credential,
            verifier,
            disabled::Subscriber::default(),
        )
    }
}

impl<S: Subscriber> Manager<S> {
    pub fn with_subscriber(
        local_identity: &str,
        credential: Credential,
        verifier: Arc<dyn Verifier>,
        subscriber: S,
    ) -> Self {
        let inner = Inner {
            state: Mutex::new(State {
                connections: HashMap::new(),
                by_device: HashMap::new(),
                by_addr: HashMap::new(),
                credential,
                pending_connects: HashMap::new(),
            }),
            socket: OnceLock::new(),
            verifier,
            local_identity: local_identity.to_string(),
            subscriber,
            handlers: service::Registry::default(),
            timer_wake: tokio::sync::Notify::new(),
            drops: Default::default(),
        };

        Self {
            inner: Arc::new(inner),
            driver: Mutex::new(None),
        }
    }

    /// Binds `0.0.0.0:port` and starts accepting inbound connections.
    /// Returns the bound address; a port of zero picks an ephemeral
    /// one.
    pub async fn listen(&self, port: u16) -> std::io::Result<SocketAddr> {
        if let Some(socket) = self.inner.socket.get() {
            return socket.local_addr();
        }

        let socket = Arc::new(UdpSocket::bind(("0.0.0.0", port)).await?);

        if self.inner.socket.set(socket.clone()).is_err() {
            // lost the race against a concurrent bind; the first one wins
            return self
                .inner
                .socket
                .get()
                .expect("socket was just observed as set")
                .local_addr();
        }

        let handle = tokio::spawn(endpoint::drive(self.inner.clone(), socket.clone()));
        *self.driver.lock() = Some(handle);

        socket.local_addr()
    }

    /// Opens a client-role connection to a device and resolves once
    /// the connection is established. Returns immediately when the
    /// device is already connected.
    pub async fn connect(
        &self,
        device_id: &str,
        address: IpAddr,
        port: u16,
        peer_credential_hint: Option<&Credential>,
    ) -> Result<(), Error> {
        self.ensure_socket().await?;

        let peer_addr = SocketAddr::new(address, port);
        let (receiver, output) = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;

            let existing = state
                .by_device
                .get(device_id)
                .copied()
                .filter(|cid| state.connections.contains_key(cid));

            if let Some(cid) = existing {
                let connection = &state.connections[&cid];
                if connection.is_established() {
                    return Ok(());
                }

                // join the handshake already in flight
                let (sender, receiver) = oneshot::channel();
                state.pending_connects.entry(cid).or_default().push(sender);
                (receiver, Output::default())
            } else {
                let connection = Connection::new_client(
                    device_id,
                    peer_addr,
                    state.credential.clone(),
                    self.inner.verifier.clone(),
                    &self.inner.local_identity,
                    peer_credential_hint,
                    Instant::now(),
                );
                let cid = connection.local_dcid();
                state.connections.insert(cid, connection);
                state.by_device.insert(device_id.to_string(), cid);
                state.by_addr.insert(peer_addr, cid);

                let (sender, receiver) = oneshot::channel();
                state.pending_connects.entry(cid).or_default().push(sender);

                let mut output = Output::default();
                self.inner.drain_connection(state, cid, &mut output);
                (receiver, output)
            }
        };

        // new handshake deadline for the driver to pick up
        self.inner.timer_wake.notify_one();

        if let Err(error) = self.inner.flush_surfaced(output).await {
            // a send failure during the handshake closes the connection
            self.close_connection(device_id, error.clone()).await;
            return Err(error);
        }

        match receiver.await {
            Ok(result) => result,
            Err(_) => Err(Error::UserRequested),
        }
    }

    /// Sends application data to an established device connection as
    /// one STREAM frame, in order
    pub async fn send_data(&self, device_id: &str, data: &[u8]) -> Result<(), Error> {
        self.send_with(device_id, |connection| connection.send_data(data))
            .await
    }

    /// Sends pre-encoded frames inside one PROTECTED packet
    pub async fn send_protected_frame(
        &self,
        device_id: &str,
        frame_bytes: &[u8],
    ) -> Result<(), Error> {
        self.send_with(device_id, |connection| connection.send_frame(frame_bytes))
            .await
    }

    async fn send_with(
        &self,
        device_id: &str,
        submit: impl FnOnce(&mut Connection) -> Result<(), Error>,
    ) -> Result<(), Error> {
        let output = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;

            let cid = state
                .by_device
                .get(device_id)
                .copied()
                .ok_or(Error::NoConnection)?;
            let connection = state
                .connections
                .get_mut(&cid)
                .ok_or(Error::NoConnection)?;

            submit(connection)?;

            let mut output = Output::default();
            self.inner.drain_connection(state, cid, &mut output);
            output
        };

        // in established, a send failure surfaces to the caller and
        // does not close the connection
        self.inner.flush_surfaced(output).await
    }

    /// Cancels and removes the connection to a device. Any pending
    /// `connect` future resolves with `user_requested`.
    pub async fn disconnect(&self, device_id: &str) {
        self.close_connection(device_id, Error::UserRequested).await;
    }

    async fn close_connection(&self, device_id: &str, reason: Error) {
        let output = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;

            let Some(cid) = state.by_device.get(device_id).copied() else {
                return;
            };

            if let Some(connection) = state.connections.get_mut(&cid) {
                connection.close(reason);
            }

            let mut output = Output::default();
            self.inner.drain_connection(state, cid, &mut output);
            output
        };

        // best-effort CONNECTION_CLOSE
        self.inner.flush_logged(output).await;
    }

    pub fn is_connected(&self, device_id: &str) -> bool {
        let state = self.inner.state.lock();
        state
            .by_device
            .get(device_id)
            .and_then(|cid| state.connections.get(cid))
            .is_some_and(Connection::is_established)
    }

    /// Registers a stream handler, replacing any previous handler for
    /// the same stream id
    pub fn register_stream_handler(
        &self,
        stream_id: u8,
        handler: impl Fn(&[u8], &ConnectionMeta) + Send + Sync + 'static,
    ) {
        self.inner.handlers.register(stream_id, Box::new(handler));
    }

    /// Replaces the credential presented in future handshakes.
    /// Already-established connections are unaffected.
    pub fn set_credential(&self, credential: Credential) {
        self.inner.state.lock().credential = credential;
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.socket.get().and_then(|socket| socket.local_addr().ok())
    }

    /// Counters of datagrams the endpoint has dropped
    pub fn drop_stats(&self) -> DropStats {
        self.inner.drop_stats()
    }

    async fn ensure_socket(&self) -> Result<(), Error> {
        if self.inner.socket.get().is_some() {
            return Ok(());
        }
        // client-only processes get an ephemeral socket on first use
        self.listen(0)
            .await
            .map(|_| ())
            .map_err(|error| Error::SendFailed(error.to_string()))
    }
}

impl<S: Subscriber> Drop for Manager<S> {
    fn drop(&mut self) {
        if let Some(handle) = self.driver.lock().take() {
            handle.abort();
        }
    }
}
