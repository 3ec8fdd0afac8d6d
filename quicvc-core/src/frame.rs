// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! QUICVC frames.
//!
//! Each frame is encoded as `type(1) || length(2, big-endian) ||
//! payload(length)`. A frame whose declared length exceeds the
//! remaining payload, and any frame with an unknown type, is a decode
//! error and drops the whole packet.

use s2n_codec::{decoder_value, DecoderBuffer, DecoderError, Encoder, EncoderValue};
use serde::Serialize;

pub mod ack;
pub mod connection_close;
pub mod heartbeat;
pub mod stream;
pub mod vc;

pub use ack::Ack;
pub use connection_close::ConnectionClose;
pub use heartbeat::Heartbeat;
pub use stream::Stream;
pub use vc::{VcAck, VcInit, VcResponse};

pub type Tag = u8;

pub const ACK: Tag = 0x02;
pub const STREAM: Tag = 0x08;
pub const VC_INIT: Tag = 0x10;
pub const VC_RESPONSE: Tag = 0x11;
pub const VC_ACK: Tag = 0x12;
pub const CONNECTION_CLOSE: Tag = 0x1c;
pub const HEARTBEAT: Tag = 0x20;
/// Reserved. Not carried inside an established connection in v1.
pub const DISCOVERY: Tag = 0x30;

#[derive(Debug, PartialEq, Eq)]
pub enum Frame<'a> {
    Ack(Ack),
    Stream(Stream<'a>),
    VcInit(VcInit),
    VcResponse(VcResponse),
    VcAck(VcAck),
    ConnectionClose(ConnectionClose<'a>),
    Heartbeat(Heartbeat),
    Discovery(&'a [u8]),
}

impl Frame<'_> {
    pub fn tag(&self) -> Tag {
        match self {
            Self::Ack(_) => ACK,
            Self::Stream(_) => STREAM,
            Self::VcInit(_) => VC_INIT,
            Self::VcResponse(_) => VC_RESPONSE,
            Self::VcAck(_) => VC_ACK,
            Self::ConnectionClose(_) => CONNECTION_CLOSE,
            Self::Heartbeat(_) => HEARTBEAT,
            Self::Discovery(_) => DISCOVERY,
        }
    }
}

decoder_value!(
    impl<'a> Frame<'a> {
        fn decode(buffer: Buffer) -> Result<Self> {
            let (tag, buffer) = buffer.decode::<Tag>()?;
            let (payload, buffer) = buffer.decode_slice_with_len_prefix::<u16>()?;
            let payload = &payload.into_less_safe_slice()[..];

            let frame = match tag {
                ACK => Frame::Ack(Ack::parse(payload)?),
                STREAM => Frame::Stream(Stream::parse(payload)?),
                VC_INIT => Frame::VcInit(parse_json(payload)?),
                VC_RESPONSE => Frame::VcResponse(parse_json(payload)?),
                VC_ACK => Frame::VcAck(parse_json(payload)?),
                CONNECTION_CLOSE => Frame::ConnectionClose(ConnectionClose::parse(payload)?),
                HEARTBEAT => Frame::Heartbeat(parse_json(payload)?),
                DISCOVERY => Frame::Discovery(payload),
                _ => return Err(DecoderError::InvariantViolation("unknown frame type")),
            };

            Ok((frame, buffer))
        }
    }
);

impl EncoderValue for Frame<'_> {
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        match self {
            Self::Ack(frame) => encode_payload(ACK, &frame.to_bytes(), encoder),
            Self::Stream(frame) => encode_payload(STREAM, &frame.to_bytes(), encoder),
            Self::VcInit(frame) => encode_json(VC_INIT, frame, encoder),
            Self::VcResponse(frame) => encode_json(VC_RESPONSE, frame, encoder),
            Self::VcAck(frame) => encode_json(VC_ACK, frame, encoder),
            Self::ConnectionClose(frame) => {
                encode_payload(CONNECTION_CLOSE, &frame.to_bytes(), encoder)
            }
            Self::Heartbeat(frame) => encode_json(HEARTBEAT, frame, encoder),
            Self::Discovery(payload) => encode_payload(DISCOVERY, payload, encoder),
        }
    }
}

fn encode_json<T: Serialize, E: Encoder>(tag: Tag, value: &T, encoder: &mut E) {
    let payload = serde_json::to_vec(value).expect("frame payloads serialize");
    encode_payload(tag, &payload, encoder);
}

fn encode_payload<E: Encoder>(tag: Tag, payload: &[u8], encoder: &mut E) {
    let len = u16::try_from(payload.len()).expect("frame payload fits a u16 length");
    encoder.encode(&tag);
    encoder.encode(&len);
    encoder.write_slice(payload);
}

fn parse_json<'de, T: serde::Deserialize<'de>>(payload: &'de [u8]) -> Result<T, DecoderError> {
    serde_json::from_slice(payload)
        .map_err(|_| DecoderError::InvariantViolation("malformed json frame payload"))
}

/// Decodes an entire packet payload into its frames
pub fn decode_payload(payload: &[u8]) -> Result<Vec<Frame>, DecoderError> {
    let mut frames = Vec::new();
    let mut buffer = DecoderBuffer::new(payload);
    while !buffer.is_empty() {
        let (frame, remaining) = buffer.decode::<Frame>()?;
        frames.push(frame);
        buffer = remaining;
    }
    Ok(frames)
}

/// Encodes a list of frames into a packet payload
pub fn encode_payload_frames(frames: &[Frame]) -> Vec<u8> {
    let len: usize = frames.iter().map(EncoderValue::encoding_size).sum();
    let mut out = vec![0u8; len];
    let mut encoder = s2n_codec::EncoderBuffer::new(&mut out);
    for frame in frames {
        encoder.encode(frame);
    }
    out
}
