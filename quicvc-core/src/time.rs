// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::task::Poll;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// A timer that is owned by a single component and polled explicitly
/// against the current time.
///
/// Note: The timer doesn't implement Copy to ensure it isn't accidentally
///       moved and have the expiration discarded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Timer {
    expiration: Option<Instant>,
}

impl Timer {
    /// Sets the timer to expire at the given instant.
    /// Re-arming replaces any previous expiration.
    #[inline]
    pub fn set(&mut self, time: Instant) {
        self.expiration = Some(time);
    }

    /// Cancels the timer.
    /// After cancellation, a timer will no longer report as expired.
    #[inline]
    pub fn cancel(&mut self) {
        self.expiration = None;
    }

    /// Returns true if the timer has expired
    #[inline]
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.expiration {
            Some(expiration) => expiration <= now,
            None => false,
        }
    }

    /// Returns true if the timer is armed
    #[inline]
    pub fn is_armed(&self) -> bool {
        self.expiration.is_some()
    }

    /// Returns the armed expiration, if any
    #[inline]
    pub fn expiration(&self) -> Option<Instant> {
        self.expiration
    }

    /// Notifies the timer of the current time. An expired timer is
    /// cancelled and reports `Ready` exactly once.
    #[inline]
    pub fn poll_expiration(&mut self, now: Instant) -> Poll<()> {
        if self.is_expired(now) {
            self.cancel();
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

/// Milliseconds since the unix epoch, used for the timestamp fields
/// carried inside VC and HEARTBEAT frames.
#[inline]
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}
