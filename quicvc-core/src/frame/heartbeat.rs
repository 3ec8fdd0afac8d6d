// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! HEARTBEAT frames keep established connections alive and carry a
//! per-connection monotonically increasing sequence number.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Milliseconds since the unix epoch at send time
    pub timestamp: u64,
    pub sequence: u64,
}
