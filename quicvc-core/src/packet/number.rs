// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Packet number truncation, expansion, and the receive-side replay
//! guard.
//!
//! Packet numbers are 64-bit per-connection monotonic counters,
//! transmitted truncated to their low 8 bits. The receiver
//! reconstructs the full number as the value closest to
//! `highest_received + 1` that matches the transmitted low byte.

/// The window covered by the 8-bit truncated encoding
const WINDOW: u64 = 1 << 8;
const HALF_WINDOW: u64 = WINDOW / 2;

/// Truncates a packet number to its wire form
#[inline]
pub fn truncate(packet_number: u64) -> u8 {
    packet_number as u8
}

/// Reconstructs a full packet number from its truncated wire form,
/// given the highest packet number accepted so far.
#[inline]
pub fn expand(packet_number_low: u8, highest_received: Option<u64>) -> u64 {
    let expected = match highest_received {
        Some(highest) => highest.saturating_add(1),
        // nothing received yet: the low byte is authoritative
        None => return packet_number_low as u64,
    };

    let candidate = (expected & !(WINDOW - 1)) | packet_number_low as u64;

    if candidate.saturating_add(HALF_WINDOW) <= expected && candidate <= u64::MAX - WINDOW {
        candidate + WINDOW
    } else if candidate > expected.saturating_add(HALF_WINDOW) && candidate >= WINDOW {
        candidate - WINDOW
    } else {
        candidate
    }
}

/// Tracks the highest packet number accepted on a connection and
/// rejects anything at or below it before AEAD work is attempted.
#[derive(Clone, Debug, Default)]
pub struct ReplayGuard {
    highest_received: Option<u64>,
}

impl ReplayGuard {
    /// Expands a truncated packet number against the current window
    #[inline]
    pub fn expand(&self, packet_number_low: u8) -> u64 {
        expand(packet_number_low, self.highest_received)
    }

    /// Returns true if the packet number is still acceptable.
    /// Accepted numbers are strictly increasing; anything at or below
    /// the highest accepted number is a replay.
    #[inline]
    pub fn check(&self, packet_number: u64) -> bool {
        match self.highest_received {
            Some(highest) => packet_number > highest,
            None => true,
        }
    }

    /// Records a packet number whose packet authenticated successfully
    #[inline]
    pub fn on_accepted(&mut self, packet_number: u64) {
        debug_assert!(self.check(packet_number));
        self.highest_received = Some(packet_number);
    }

    #[inline]
    pub fn highest_received(&self) -> Option<u64> {
        self.highest_received
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_examples() {
        // fresh connection: the low byte is the number
        assert_eq!(expand(0x00, None), 0);
        assert_eq!(expand(0x2a, None), 0x2a);

        // in-window continuation
        assert_eq!(expand(0x01, Some(0x00)), 0x01);
        assert_eq!(expand(0x00, Some(0xff)), 0x100);
        assert_eq!(expand(0x05, Some(0x1ff)), 0x205);

        // a stale low byte resolves to the closest candidate
        assert_eq!(expand(0xfe, Some(0x100)), 0xfe);
        assert_eq!(expand(0x80, Some(0x17f)), 0x180);
    }

    #[test]
    fn truncate_expand_round_trip() {
        bolero::check!()
            .with_type::<(u64, u8)>()
            .cloned()
            .for_each(|(highest, delta)| {
                // the next packet numbers within half a window of the
                // highest accepted value must reconstruct exactly
                let delta = (delta as u64 % HALF_WINDOW) + 1;
                let Some(packet_number) = highest.checked_add(delta) else {
                    return;
                };

                let expanded = expand(truncate(packet_number), Some(highest));
                assert_eq!(expanded, packet_number);
            });
    }

    #[test]
    fn replay_guard_rejects_old_numbers() {
        let mut guard = ReplayGuard::default();
        assert!(guard.check(0));

        guard.on_accepted(0);
        assert!(!guard.check(0));
        assert!(guard.check(1));

        guard.on_accepted(7);
        assert!(!guard.check(3));
        assert!(!guard.check(7));
        assert!(guard.check(8));
        assert_eq!(guard.highest_received(), Some(7));
    }

    #[test]
    fn replay_guard_is_strictly_increasing() {
        bolero::check!()
            .with_type::<Vec<u8>>()
            .for_each(|lows| {
                let mut guard = ReplayGuard::default();
                let mut accepted = Vec::new();

                for low in lows {
                    let packet_number = guard.expand(*low);
                    if guard.check(packet_number) {
                        guard.on_accepted(packet_number);
                        accepted.push(packet_number);
                    }
                }

                for pair in accepted.windows(2) {
                    assert!(pair[0] < pair[1]);
                }
            });
    }
}
