// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The per-phase key schedule.
//!
//! For each phase P, key material is produced as
//!
//! ```text
//! prk = HKDF-Extract(salt = "quicvc-<phase>-salt-v1", ikm = info_P)
//! K   = HKDF-Expand(prk, "quicvc key", 64)    // two 32-byte keys
//! IV  = HKDF-Expand(prk, "quicvc iv",  24)    // two 12-byte nonce seeds
//! ```
//!
//! The phase info strings are built from material both endpoints hold
//! once the credential exchange has progressed far enough, with byte
//! strings ordered lexicographically so both sides derive identical
//! output. The client seals with the first key/IV half and opens with
//! the second; the server mirrors.

use crate::{
    crypto::awslc::{open, seal},
    endpoint,
};
use aws_lc_rs::{
    aead::NONCE_LEN,
    hkdf::{self, Prk, Salt, HKDF_SHA256},
};
use zeroize::Zeroizing;

pub const KEY_LEN: usize = 32;

const KEY_LABEL: &[u8] = b"quicvc key";
const IV_LABEL: &[u8] = b"quicvc iv";

/// One of the three key phases of a connection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Initial,
    Handshake,
    Application,
}

impl Phase {
    #[inline]
    pub fn salt(self) -> &'static [u8] {
        match self {
            Self::Initial => b"quicvc-initial-salt-v1",
            Self::Handshake => b"quicvc-handshake-salt-v1",
            Self::Application => b"quicvc-application-salt-v1",
        }
    }
}

/// The sealer/opener pair installed for a phase
#[derive(Debug)]
pub struct PhaseSecret {
    pub sealer: seal::Application,
    pub opener: open::Application,
}

/// Initial phase info: both credential ids, lexicographically ordered
pub fn initial_info(local_credential_id: &str, peer_credential_id: &str) -> Vec<u8> {
    sorted_concat(
        &[],
        local_credential_id.as_bytes(),
        peer_credential_id.as_bytes(),
    )
}

/// Handshake phase info: the server's challenge followed by both
/// credential signatures, lexicographically ordered
pub fn handshake_info(
    server_challenge: &[u8],
    local_signature: &[u8],
    peer_signature: &[u8],
) -> Vec<u8> {
    sorted_concat(server_challenge, local_signature, peer_signature)
}

/// Application phase info: both subject public keys, lexicographically
/// ordered
pub fn application_info(local_public_key: &[u8], peer_public_key: &[u8]) -> Vec<u8> {
    sorted_concat(&[], local_public_key, peer_public_key)
}

fn sorted_concat(prefix: &[u8], a: &[u8], b: &[u8]) -> Vec<u8> {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    let mut out = Vec::with_capacity(prefix.len() + first.len() + second.len());
    out.extend_from_slice(prefix);
    out.extend_from_slice(first);
    out.extend_from_slice(second);
    out
}

/// Derives the sealer/opener pair for a phase
pub fn derive(phase: Phase, role: endpoint::Type, info: &[u8]) -> PhaseSecret {
    let prk = Salt::new(HKDF_SHA256, phase.salt()).extract(info);

    let mut keys = Zeroizing::new([0u8; KEY_LEN * 2]);
    expand_into(&prk, KEY_LABEL, &mut keys[..]);

    let mut ivs = Zeroizing::new([0u8; NONCE_LEN * 2]);
    expand_into(&prk, IV_LABEL, &mut ivs[..]);

    let (first_key, second_key) = keys.split_at(KEY_LEN);
    let (first_iv, second_iv) = ivs.split_at(NONCE_LEN);

    let (seal_key, seal_iv, open_key, open_iv) = match role {
        endpoint::Type::Client => (first_key, first_iv, second_key, second_iv),
        endpoint::Type::Server => (second_key, second_iv, first_key, first_iv),
    };

    PhaseSecret {
        sealer: seal::Application::new(seal_key, seal_iv.try_into().expect("iv half is 12 bytes")),
        opener: open::Application::new(open_key, open_iv.try_into().expect("iv half is 12 bytes")),
    }
}

fn expand_into(prk: &Prk, label: &'static [u8], out: &mut [u8]) {
    prk.expand(&[label], OutLen(out.len()))
        .unwrap()
        .fill(out)
        .unwrap();
}

#[derive(Clone, Copy)]
struct OutLen(usize);

impl hkdf::KeyType for OutLen {
    #[inline]
    fn len(&self) -> usize {
        self.0
    }
}
