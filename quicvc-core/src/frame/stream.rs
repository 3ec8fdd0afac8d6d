// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! STREAM frames carry opaque application data labeled with a
//! single-byte, application-assigned stream id. Data is not
//! reassembled across packets; an application datagram must fit in
//! one STREAM frame in one PROTECTED packet.

use s2n_codec::DecoderError;

/// Reserved for command/response semantics whose payloads the manager
/// recognizes for event emission
pub const COMMAND_STREAM_ID: u8 = 0x01;

/// The stream id `send_data` submits on
pub const DATA_STREAM_ID: u8 = 0x02;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stream<'a> {
    pub stream_id: u8,
    pub data: &'a [u8],
}

impl<'a> Stream<'a> {
    pub(crate) fn parse(payload: &'a [u8]) -> Result<Self, DecoderError> {
        let (&stream_id, data) = payload
            .split_first()
            .ok_or(DecoderError::UnexpectedEof(1))?;
        Ok(Self { stream_id, data })
    }

    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.data.len());
        out.push(self.stream_id);
        out.extend_from_slice(self.data);
        out
    }
}
