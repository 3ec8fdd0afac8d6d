// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! CONNECTION_CLOSE notifies the peer that the connection is being
//! torn down. Payload is `error_code(2, big-endian) ||
//! reason_utf8(rest)`.

use s2n_codec::DecoderError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionClose<'a> {
    pub error_code: u16,
    /// A human-readable explanation for why the connection was closed
    pub reason: &'a [u8],
}

impl<'a> ConnectionClose<'a> {
    pub fn reason_utf8(&self) -> std::borrow::Cow<'a, str> {
        String::from_utf8_lossy(self.reason)
    }

    pub(crate) fn parse(payload: &'a [u8]) -> Result<Self, DecoderError> {
        if payload.len() < 2 {
            return Err(DecoderError::UnexpectedEof(2));
        }
        let (code, reason) = payload.split_at(2);
        let error_code = u16::from_be_bytes(code.try_into().expect("split at 2"));
        Ok(Self { error_code, reason })
    }

    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.reason.len());
        out.extend_from_slice(&self.error_code.to_be_bytes());
        out.extend_from_slice(self.reason);
        out
    }
}
