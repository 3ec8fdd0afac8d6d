// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The outbound event surface.
//!
//! The manager delivers connection lifecycle and stream events to a
//! single [`Subscriber`]. All methods default to no-ops so
//! implementations only override what they observe. Events are
//! delivered on the emitting task, outside the connection table lock.

use crate::credentials::VerifiedPeer;

/// Identifies the connection an event belongs to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionMeta {
    pub device_id: String,
}

pub trait Subscriber: 'static + Send + Sync {
    /// The connection reached the established state
    fn on_handshake_complete(&self, meta: &ConnectionMeta) {
        let _ = meta;
    }

    /// Emitted at the same moment as `on_handshake_complete`, once,
    /// with the verified peer record
    fn on_connection_established(&self, meta: &ConnectionMeta, peer: &VerifiedPeer) {
        let _ = (meta, peer);
    }

    /// The connection was destroyed
    fn on_connection_closed(&self, meta: &ConnectionMeta, reason: &str) {
        let _ = (meta, reason);
    }

    /// A decrypted STREAM frame with no registered handler
    fn on_stream(&self, meta: &ConnectionMeta, stream_id: u8, data: &[u8]) {
        let _ = (meta, stream_id, data);
    }

    /// An inbound HEARTBEAT frame
    fn on_heartbeat(&self, meta: &ConnectionMeta, sequence: u64) {
        let _ = (meta, sequence);
    }

    /// A typed payload on the reserved command/response stream
    fn on_command_response(&self, meta: &ConnectionMeta, kind: &str, payload: &[u8]) {
        let _ = (meta, kind, payload);
    }
}

pub mod disabled {
    /// A subscriber that discards every event
    #[derive(Clone, Copy, Debug, Default)]
    pub struct Subscriber(());

    impl super::Subscriber for Subscriber {}
}
