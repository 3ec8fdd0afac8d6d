// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Connection states advance monotonically through
//! `Initial → Handshake → Established → Closed` and never regress.
//! `Closed` is terminal: any further input for a closed connection is
//! discarded.

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum State {
    #[default]
    Initial,
    Handshake,
    Established,
    Closed,
}

/// Returned when an event is not valid in the current state
#[derive(Debug, PartialEq, Eq)]
pub struct InvalidTransition {
    pub current: State,
    pub event: &'static str,
}

impl State {
    #[inline]
    pub fn is_initial(self) -> bool {
        matches!(self, Self::Initial)
    }

    #[inline]
    pub fn is_handshake(self) -> bool {
        matches!(self, Self::Handshake)
    }

    #[inline]
    pub fn is_established(self) -> bool {
        matches!(self, Self::Established)
    }

    #[inline]
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// The credential exchange has produced a valid peer record
    #[inline]
    pub fn on_handshake(&mut self) -> Result<(), InvalidTransition> {
        self.transition("handshake", self.is_initial(), Self::Handshake)
    }

    /// The challenge echo has been validated on both sides
    #[inline]
    pub fn on_established(&mut self) -> Result<(), InvalidTransition> {
        self.transition(
            "established",
            self.is_initial() || self.is_handshake(),
            Self::Established,
        )
    }

    /// The connection is being destroyed
    #[inline]
    pub fn on_closed(&mut self) -> Result<(), InvalidTransition> {
        self.transition("closed", !self.is_closed(), Self::Closed)
    }

    fn transition(
        &mut self,
        event: &'static str,
        valid: bool,
        target: State,
    ) -> Result<(), InvalidTransition> {
        if valid {
            tracing::debug!(event, prev = ?self, next = ?target, "state transition");
            *self = target;
            Ok(())
        } else {
            Err(InvalidTransition {
                current: *self,
                event,
            })
        }
    }
}
