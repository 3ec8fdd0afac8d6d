// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! QUICVC: a connection-oriented, datagram-based secure transport
//! that authenticates both endpoints with verifiable credentials
//! instead of a TLS handshake.
//!
//! A [`Manager`] owns one UDP socket per local identity and
//! multiplexes many concurrent connections over it:
//!
//! ```no_run
//! use quicvc::Manager;
//! use std::{net::{IpAddr, Ipv4Addr}, sync::Arc};
//!
//! # async fn example(
//! #     credential: quicvc::Credential,
//! #     verifier: Arc<dyn quicvc::Verifier>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let manager = Manager::new("owner", credential, verifier);
//! manager.listen(quicvc::WELL_KNOWN_PORT).await?;
//!
//! manager
//!     .connect("lamp-1", IpAddr::V4(Ipv4Addr::LOCALHOST), quicvc::WELL_KNOWN_PORT, None)
//!     .await?;
//! manager.send_data("lamp-1", b"{\"type\":\"led_command\"}").await?;
//! # Ok(())
//! # }
//! ```

mod endpoint;
mod manager;
mod service;

pub use endpoint::DropStats;
pub use manager::Manager;
pub use service::StreamHandler;

pub use quicvc_core::{
    connection::{Error, HANDSHAKE_TIMEOUT, HEARTBEAT_INTERVAL, IDLE_TIMEOUT},
    credentials::{Credential, VerifiedPeer, Verifier},
    event::{disabled, ConnectionMeta, Subscriber},
    frame::stream::{COMMAND_STREAM_ID, DATA_STREAM_ID},
};

/// The well-known UDP port for unsolicited connects
pub const WELL_KNOWN_PORT: u16 = 49497;
