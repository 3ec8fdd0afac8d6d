// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Credential-exchange frames.
//!
//! VC_INIT opens the handshake with the client's credential and a
//! fresh challenge. VC_RESPONSE answers with the server's credential,
//! a fresh server challenge, and an echo of the client's challenge.
//! VC_ACK completes the exchange by echoing the server's challenge
//! under the Handshake keys.
//!
//! Challenges are 32-byte random values, hex-encoded in the JSON
//! bodies, and are mixed into the Handshake key schedule.

use crate::credentials::{hex, Credential};
use serde::{Deserialize, Serialize};

pub const CHALLENGE_LEN: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcInit {
    pub credential: Credential,
    pub challenge: String,
    pub timestamp: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcResponse {
    pub credential: Credential,
    pub challenge: String,
    /// Echo of the peer's challenge
    pub ack_challenge: String,
    pub timestamp: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcAck {
    /// Echo of the peer's challenge
    pub ack_challenge: String,
    pub timestamp: u64,
}

pub fn encode_challenge(challenge: &[u8; CHALLENGE_LEN]) -> String {
    hex::encode(challenge)
}

pub fn decode_challenge(challenge: &str) -> Option<[u8; CHALLENGE_LEN]> {
    hex::decode(challenge)?.try_into().ok()
}

impl VcInit {
    pub fn challenge_bytes(&self) -> Option<[u8; CHALLENGE_LEN]> {
        decode_challenge(&self.challenge)
    }
}

impl VcResponse {
    pub fn challenge_bytes(&self) -> Option<[u8; CHALLENGE_LEN]> {
        decode_challenge(&self.challenge)
    }

    pub fn ack_challenge_bytes(&self) -> Option<[u8; CHALLENGE_LEN]> {
        decode_challenge(&self.ack_challenge)
    }
}

impl VcAck {
    pub fn ack_challenge_bytes(&self) -> Option<[u8; CHALLENGE_LEN]> {
        decode_challenge(&self.ack_challenge)
    }
}
