// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! ACK frames carry the ascending list of packet numbers the sender
//! has accepted. v1 has no retransmission, so receivers treat them as
//! informational.

use s2n_codec::{decoder_invariant, DecoderError};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ack {
    packet_numbers: Vec<u64>,
}

impl Ack {
    /// Builds an ACK from an ascending list of packet numbers
    pub fn new(packet_numbers: Vec<u64>) -> Self {
        debug_assert!(packet_numbers.windows(2).all(|pair| pair[0] < pair[1]));
        Self { packet_numbers }
    }

    #[inline]
    pub fn packet_numbers(&self) -> &[u64] {
        &self.packet_numbers
    }

    pub(crate) fn parse(payload: &[u8]) -> Result<Self, DecoderError> {
        decoder_invariant!(payload.len() % 8 == 0, "ack payload is a list of u64");

        let packet_numbers: Vec<u64> = payload
            .chunks_exact(8)
            .map(|chunk| u64::from_be_bytes(chunk.try_into().expect("chunks are 8 bytes")))
            .collect();

        decoder_invariant!(
            packet_numbers.windows(2).all(|pair| pair[0] < pair[1]),
            "ack packet numbers are ascending"
        );

        Ok(Self { packet_numbers })
    }

    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.packet_numbers.len() * 8);
        for packet_number in &self.packet_numbers {
            out.extend_from_slice(&packet_number.to_be_bytes());
        }
        out
    }
}
