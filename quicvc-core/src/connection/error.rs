// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Errors surfaced by connections and the manager.
//!
//! The display form of each kind is the reason string carried in
//! `connection_closed` events and CONNECTION_CLOSE frames.

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Malformed packet or frame; the packet is dropped
    #[error("wire_decode")]
    WireDecode,

    /// Unsupported version field; the packet is dropped silently
    #[error("version_mismatch")]
    VersionMismatch,

    /// No connection matches the packet's DCID
    #[error("unknown_connection")]
    UnknownConnection,

    /// The packet number was already seen
    #[error("replay")]
    Replay,

    /// AEAD tag mismatch
    #[error("decrypt_failed")]
    DecryptFailed,

    /// The peer credential was rejected
    #[error("verification_failed")]
    VerificationFailed,

    /// The peer's ack_challenge did not echo our challenge
    #[error("challenge_mismatch")]
    ChallengeMismatch,

    /// The handshake deadline elapsed before the connection was
    /// established
    #[error("handshake_timeout")]
    HandshakeTimeout,

    /// No activity within the idle deadline
    #[error("idle_timeout")]
    IdleTimeout,

    /// The application called disconnect
    #[error("user_requested")]
    UserRequested,

    /// A UDP send returned an error
    #[error("send_failed: {0}")]
    SendFailed(String),

    /// The peer sent CONNECTION_CLOSE
    #[error("closed_by_peer: {reason}")]
    PeerClose { reason: String },

    /// No connection exists for the device
    #[error("no_connection")]
    NoConnection,

    /// The connection has not reached the established state
    #[error("not_established")]
    NotEstablished,

    /// The payload does not fit in a single packet
    #[error("packet_too_large")]
    PacketTooLarge,

    /// The manager has no bound socket yet
    #[error("not_bound")]
    NotBound,
}

impl Error {
    /// The error code carried in CONNECTION_CLOSE frames
    pub fn wire_code(&self) -> u16 {
        match self {
            Self::UserRequested => 0x00,
            Self::WireDecode => 0x01,
            Self::VersionMismatch => 0x02,
            Self::UnknownConnection => 0x03,
            Self::Replay => 0x04,
            Self::DecryptFailed => 0x05,
            Self::VerificationFailed => 0x06,
            Self::ChallengeMismatch => 0x07,
            Self::HandshakeTimeout => 0x08,
            Self::IdleTimeout => 0x09,
            Self::SendFailed(_) => 0x0a,
            _ => 0xff,
        }
    }
}
