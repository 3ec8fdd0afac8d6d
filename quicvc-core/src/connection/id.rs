// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Defines the QUICVC connection ID

use s2n_codec::{decoder_invariant, decoder_value, Encoder, EncoderValue};

/// The maximum size of a connection ID the wire format can carry
pub const MAX_LEN: usize = 20;

/// The size of locally generated connection IDs
pub const LOCAL_LEN: usize = 16;

/// An opaque identifier chosen by each endpoint. The DCID is the id a
/// packet is addressed to, the SCID is the sender's id for replies.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId {
    bytes: [u8; MAX_LEN],
    len: u8,
}

impl ConnectionId {
    /// Generates a fresh 16-byte id from a cryptographic RNG
    pub fn generate() -> Self {
        use rand::RngCore;

        let mut bytes = [0u8; MAX_LEN];
        rand::rng().fill_bytes(&mut bytes[..LOCAL_LEN]);
        Self {
            bytes,
            len: LOCAL_LEN as u8,
        }
    }

    /// Creates a connection ID from a byte slice.
    ///
    /// Returns `None` if the slice exceeds the maximum allowed length
    /// (20 bytes). All other input values are valid, including empty.
    #[inline]
    pub fn try_from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() > MAX_LEN {
            return None;
        }
        let mut id = Self {
            bytes: [0; MAX_LEN],
            len: bytes.len() as u8,
        };
        id.bytes[..bytes.len()].copy_from_slice(bytes);
        Some(id)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl core::fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "ConnectionId({})", crate::credentials::hex::encode(self.as_bytes()))
    }
}

impl AsRef<[u8]> for ConnectionId {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

decoder_value!(
    impl<'a> ConnectionId {
        fn decode(buffer: Buffer) -> Result<Self> {
            let (len, buffer) = buffer.decode::<u8>()?;
            decoder_invariant!(
                len as usize <= MAX_LEN,
                "connection id exceeds max length"
            );
            let (bytes, buffer) = buffer.decode_slice(len as usize)?;
            let bytes = &bytes.into_less_safe_slice()[..];
            let id = ConnectionId::try_from_bytes(bytes).expect("length checked above");
            Ok((id, buffer))
        }
    }
);

impl EncoderValue for ConnectionId {
    #[inline]
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        encoder.encode(&self.len);
        encoder.write_slice(self.as_bytes());
    }
}
