// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The service demux: maps decrypted STREAM frames to registered
//! stream-id handlers.

use hashbrown::HashMap;
use parking_lot::RwLock;
use quicvc_core::event::ConnectionMeta;
use serde::Deserialize;

/// A callback invoked with the data of each STREAM frame on its
/// registered stream id
pub type StreamHandler = Box<dyn Fn(&[u8], &ConnectionMeta) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Registry {
    handlers: RwLock<HashMap<u8, StreamHandler>>,
}

impl Registry {
    /// Registers a handler, replacing any previously registered
    /// handler for the same stream id
    pub(crate) fn register(&self, stream_id: u8, handler: StreamHandler) {
        self.handlers.write().insert(stream_id, handler);
    }

    /// Routes a frame to its handler, returning false when no handler
    /// is registered for the stream id
    pub(crate) fn dispatch(&self, stream_id: u8, data: &[u8], meta: &ConnectionMeta) -> bool {
        let handlers = self.handlers.read();
        match handlers.get(&stream_id) {
            Some(handler) => {
                handler(data, meta);
                true
            }
            None => false,
        }
    }
}

#[derive(Deserialize)]
struct CommandEnvelope {
    #[serde(rename = "type")]
    kind: String,
}

/// Extracts the `type` discriminant from a command-stream JSON
/// payload, if it carries one
pub(crate) fn command_kind(payload: &[u8]) -> Option<String> {
    serde_json::from_slice::<CommandEnvelope>(payload)
        .ok()
        .map(|envelope| envelope.kind)
}
