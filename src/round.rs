// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The contract every protocol round implements.
//!
//! A protocol is a chain of rounds. Each round owns the state accumulated so
//! far and hands it to its successor in [`Round::next_round`]; the last round
//! returns `None`. The [`Party`](crate::party::Party) engine drives the chain.

use crate::{
    errors::{InternalError, ProtocolFault, Result},
    messages::{Message, MessageContent},
    protocol::PartyId,
};
use tracing::debug;

/// One step of a protocol.
pub trait Round<C: MessageContent>: Send {
    /// Shared bookkeeping.
    fn base(&self) -> &RoundBase;

    /// One-time precomputation run by the engine before the first round's
    /// [`Round::start`].
    fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    /// Enter the round. Implementations call [`RoundBase::mark_started`]
    /// first and may emit messages.
    fn start(&mut self) -> Result<()>;

    /// Put an inbound message into the slot of its sender. Content that this
    /// protocol does not consume is ignored.
    fn store_message(&mut self, msg: Message<C>) -> Result<()>;

    /// Admission test for a message of this round.
    fn can_accept(&self, msg: &Message<C>) -> bool;

    /// Re-scan the stored messages, flip `ok` slots whose message is
    /// present and admissible, and report whether the round can proceed.
    fn update(&mut self) -> Result<bool>;

    /// Hand the accumulated state to the next round.
    fn next_round(self: Box<Self>) -> Option<Box<dyn Round<C>>>;

    /// This round's number.
    fn round_number(&self) -> u16 {
        self.base().number()
    }

    /// Started and every slot filled.
    fn can_proceed(&self) -> bool {
        self.base().can_proceed()
    }

    /// Parties whose contribution to this round is still missing.
    fn waiting_for(&self) -> Vec<PartyId> {
        self.base().waiting_for()
    }
}

/// Bookkeeping shared by every round.
#[derive(Debug, Clone)]
pub struct RoundBase {
    task: &'static str,
    number: u16,
    started: bool,
    ok: Vec<bool>,
    expected: Vec<PartyId>,
}

impl RoundBase {
    /// A round expecting one contribution from each party in `expected`.
    pub fn new(task: &'static str, number: u16, expected: Vec<PartyId>) -> Self {
        Self {
            task,
            number,
            started: false,
            ok: vec![false; expected.len()],
            expected,
        }
    }

    /// Round number.
    pub fn number(&self) -> u16 {
        self.number
    }

    /// Set at the top of [`Round::start`].
    pub fn mark_started(&mut self) -> Result<()> {
        if self.started {
            return Err(InternalError::InternalInvariantFailed);
        }
        debug!(task = self.task, round = self.number, "starting round");
        self.started = true;
        Ok(())
    }

    /// Mark slot `j`, typically the local party's own contribution.
    pub fn set_ok(&mut self, j: usize) {
        if let Some(slot) = self.ok.get_mut(j) {
            *slot = true;
        }
    }

    /// Whether slot `j` is filled.
    pub fn is_ok(&self, j: usize) -> bool {
        self.ok.get(j).copied().unwrap_or(false)
    }

    /// Number of slots.
    pub fn slot_count(&self) -> usize {
        self.ok.len()
    }

    /// Started and every slot filled.
    pub fn can_proceed(&self) -> bool {
        self.started && self.ok.iter().all(|ok| *ok)
    }

    /// Parties whose slot is still empty.
    pub fn waiting_for(&self) -> Vec<PartyId> {
        self.ok
            .iter()
            .zip(&self.expected)
            .filter(|(ok, _)| !**ok)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// A fault in this round blaming `culprits`.
    pub fn fault(&self, culprits: Vec<PartyId>, cause: impl Into<String>) -> InternalError {
        ProtocolFault::new(self.task, self.number, culprits, cause).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;

    #[test]
    fn round_base_tracks_slots() -> Result<()> {
        let ids: Vec<PartyId> = (1u32..4)
            .map(|k| PartyId::new(k.to_string(), "p", BigUint::from(k)))
            .collect();
        let mut base = RoundBase::new("test", 1, ids.clone());
        base.set_ok(0);
        base.set_ok(2);
        assert!(!base.can_proceed());
        assert_eq!(base.waiting_for(), vec![ids[1].clone()]);

        base.set_ok(1);
        // Not yet started
        assert!(!base.can_proceed());
        base.mark_started()?;
        assert!(base.can_proceed());
        assert!(base.mark_started().is_err());

        let err = base.fault(vec![ids[0].clone()], "bad");
        assert_eq!(err.culprits(), &ids[..1]);
        Ok(())
    }
}
