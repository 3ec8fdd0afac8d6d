// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Core types for the QUICVC protocol: wire formats, the credential
//! exchange, key schedule, and the per-connection state machine.
//!
//! This crate is sans-IO. Connections consume parsed datagrams and
//! timer ticks, and stage outgoing datagrams and events for a runtime
//! layer (the `quicvc` crate) to flush.

pub mod connection;
pub mod credentials;
pub mod crypto;
pub mod endpoint;
pub mod event;
pub mod frame;
pub mod packet;
pub mod time;

pub use connection::{Connection, ConnectionEvent, Error};
pub use credentials::{Credential, VerifiedPeer, Verifier};
