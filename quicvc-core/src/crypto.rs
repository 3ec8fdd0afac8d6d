// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Packet protection primitives.
//!
//! One AEAD is used: ChaCha20-Poly1305 with a 256-bit key and 96-bit
//! nonce. The per-packet nonce is the phase IV XORed with the 64-bit
//! packet number, left-padded to 12 bytes. The associated data is the
//! full packet header, including the truncated packet number byte.

use core::fmt;

pub mod awslc;
pub mod schedule;

/// Length of the appended authentication tag
pub const TAG_LEN: usize = 16;

pub mod seal {
    /// Seals protected packet payloads
    pub trait Application: Send {
        fn tag_len(&self) -> usize;

        /// Encrypts `payload_and_tag[..len - tag_len]` in place and
        /// writes the authentication tag into the trailing bytes.
        fn seal(&self, packet_number: u64, header: &[u8], payload_and_tag: &mut [u8]);
    }
}

pub mod open {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum Error {
        InvalidTag,
    }

    impl fmt::Display for Error {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            match self {
                Self::InvalidTag => "invalid tag".fmt(f),
            }
        }
    }

    impl std::error::Error for Error {}

    pub type Result<T = ()> = core::result::Result<T, Error>;

    /// Opens protected packet payloads
    pub trait Application: Send {
        fn tag_len(&self) -> usize;

        /// Decrypts `payload_and_tag` in place, returning the
        /// plaintext prefix on success.
        fn open<'a>(
            &self,
            packet_number: u64,
            header: &[u8],
            payload_and_tag: &'a mut [u8],
        ) -> Result<&'a mut [u8]>;
    }
}
