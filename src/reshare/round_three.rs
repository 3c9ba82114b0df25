// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Round 3: old committee members hand out the new shares and open their
//! commitments.

use super::{messages::ReshareContent, round_four::RoundFour, state::ReshareState, TASK_NAME};
use crate::{
    errors::{InternalError, Result},
    messages::{CommitteeScope, Message},
    round::{Round, RoundBase},
};
use rand::{CryptoRng, RngCore};

pub(super) struct RoundThree<R> {
    base: RoundBase,
    state: ReshareState<R>,
}

impl<R> RoundThree<R> {
    pub(super) fn new(state: ReshareState<R>) -> Self {
        let expected = if state.params.is_new_committee() {
            state.old_parties()
        } else {
            vec![]
        };
        let base = RoundBase::new(TASK_NAME, 3, expected);
        Self { base, state }
    }
}

impl<R: RngCore + CryptoRng + Send + 'static> Round<ReshareContent> for RoundThree<R> {
    fn base(&self) -> &RoundBase {
        &self.base
    }

    fn start(&mut self) -> Result<()> {
        self.base.mark_started()?;
        let Some(i) = self.state.old_index() else {
            return Ok(());
        };
        let me = self.state.party_id().clone();
        let own_new_index = self.state.new_index();

        for (j, party) in self.state.new_parties().iter().enumerate() {
            let share = self
                .state
                .temp
                .shares
                .get(j)
                .cloned()
                .ok_or(InternalError::InternalInvariantFailed)?;
            let msg = Message::direct(
                &me,
                party,
                CommitteeScope::New,
                ReshareContent::Round3Share { share },
            );
            if own_new_index == Some(j) {
                self.state.r3_share[i] = Some(msg);
            } else {
                self.state.send(msg)?;
            }
        }

        let decommitment = self
            .state
            .temp
            .decommitment
            .take()
            .ok_or(InternalError::InternalInvariantFailed)?;
        let msg = Message::broadcast(
            &me,
            CommitteeScope::New,
            ReshareContent::Round3Decommit { decommitment },
        );
        if own_new_index.is_some() {
            self.state.r3_decommit[i] = Some(msg.clone());
            self.base.set_ok(i);
        }
        self.state.send(msg)
    }

    fn store_message(&mut self, msg: Message<ReshareContent>) -> Result<()> {
        self.state.store(msg)
    }

    fn can_accept(&self, msg: &Message<ReshareContent>) -> bool {
        match msg.content() {
            ReshareContent::Round3Share { .. } => !msg.is_broadcast(),
            ReshareContent::Round3Decommit { .. } => msg.is_broadcast(),
            _ => false,
        }
    }

    fn update(&mut self) -> Result<bool> {
        for j in 0..self.base.slot_count() {
            if self.base.is_ok(j) {
                continue;
            }
            let share_ok = self.state.r3_share[j]
                .as_ref()
                .map_or(false, |m| self.can_accept(m));
            let decommit_ok = self.state.r3_decommit[j]
                .as_ref()
                .map_or(false, |m| self.can_accept(m));
            if share_ok && decommit_ok {
                self.base.set_ok(j);
            }
        }
        Ok(self.base.can_proceed())
    }

    fn next_round(self: Box<Self>) -> Option<Box<dyn Round<ReshareContent>>> {
        Some(Box::new(RoundFour::new(self.state)))
    }
}
