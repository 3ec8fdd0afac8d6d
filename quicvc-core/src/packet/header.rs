// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Long header codec.
//!
//! ```text
//! Long Header Packet {
//!   Flags (8),            # bit 7 = 1 (long header), bits 1..0 = packet type
//!   Version (32),
//!   DCID Length (8),
//!   DCID (0..160),
//!   SCID Length (8),
//!   SCID (0..160),
//!   Packet Number (8),    # low 8 bits of the 64-bit packet number
//!   Payload (..),
//! }
//! ```
//!
//! The serialized header, including the truncated packet number byte,
//! is the associated data for AEAD protection of the payload.

use crate::{
    connection::id::ConnectionId,
    packet::{PacketType, LONG_HEADER_MASK},
};
use s2n_codec::{
    decoder_invariant, decoder_value, DecoderBuffer, DecoderError, Encoder, EncoderValue,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub packet_type: PacketType,
    pub version: u32,
    pub destination_cid: ConnectionId,
    pub source_cid: ConnectionId,
    /// Low 8 bits of the 64-bit packet number
    pub packet_number_low: u8,
}

impl Header {
    /// Parses the header off the front of a datagram, returning the
    /// header and its encoded length. The remainder of the datagram is
    /// the (possibly protected) frame payload.
    #[inline]
    pub fn parse(datagram: &[u8]) -> Result<(Self, usize), DecoderError> {
        let buffer = DecoderBuffer::new(datagram);
        let (header, remaining) = buffer.decode::<Header>()?;
        Ok((header, datagram.len() - remaining.len()))
    }
}

decoder_value!(
    impl<'a> Header {
        fn decode(buffer: Buffer) -> Result<Self> {
            let (flags, buffer) = buffer.decode::<u8>()?;
            decoder_invariant!(
                flags & LONG_HEADER_MASK != 0,
                "short header packets are not used"
            );
            // bits 6..2 are reserved: sent as zero, ignored on receive
            let packet_type = PacketType::from_bits(flags);

            let (version, buffer) = buffer.decode::<u32>()?;
            let (destination_cid, buffer) = buffer.decode::<ConnectionId>()?;
            let (source_cid, buffer) = buffer.decode::<ConnectionId>()?;
            let (packet_number_low, buffer) = buffer.decode::<u8>()?;

            let header = Header {
                packet_type,
                version,
                destination_cid,
                source_cid,
                packet_number_low,
            };

            Ok((header, buffer))
        }
    }
);

impl EncoderValue for Header {
    #[inline]
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        let flags = LONG_HEADER_MASK | self.packet_type.into_bits();
        encoder.encode(&flags);
        encoder.encode(&self.version);
        encoder.encode(&self.destination_cid);
        encoder.encode(&self.source_cid);
        encoder.encode(&self.packet_number_low);
    }
}
