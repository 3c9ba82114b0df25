// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Round 2: new committee members acknowledge every commitment.

use super::{messages::ReshareContent, round_three::RoundThree, state::ReshareState, TASK_NAME};
use crate::{
    errors::{InternalError, Result},
    messages::{CommitteeScope, Message},
    round::{Round, RoundBase},
};
use rand::{CryptoRng, RngCore};

pub(super) struct RoundTwo<R> {
    base: RoundBase,
    state: ReshareState<R>,
}

impl<R> RoundTwo<R> {
    pub(super) fn new(state: ReshareState<R>) -> Self {
        // Old committee members wait for every new member's ack.
        let expected = if state.params.is_old_committee() {
            state.new_parties()
        } else {
            vec![]
        };
        let base = RoundBase::new(TASK_NAME, 2, expected);
        Self { base, state }
    }
}

impl<R: RngCore + CryptoRng + Send + 'static> Round<ReshareContent> for RoundTwo<R> {
    fn base(&self) -> &RoundBase {
        &self.base
    }

    fn start(&mut self) -> Result<()> {
        self.base.mark_started()?;
        let Some(i) = self.state.new_index() else {
            return Ok(());
        };
        let me = self
            .state
            .params
            .new_party_id()
            .ok_or(InternalError::InternalInvariantFailed)?;
        let msg = Message::broadcast(me, CommitteeScope::Old, ReshareContent::Round2Ack);
        if self.state.params.is_old_committee() {
            self.state.r2_ack[i] = Some(msg.clone());
            self.base.set_ok(i);
        }
        self.state.send(msg)
    }

    fn store_message(&mut self, msg: Message<ReshareContent>) -> Result<()> {
        self.state.store(msg)
    }

    fn can_accept(&self, msg: &Message<ReshareContent>) -> bool {
        matches!(msg.content(), ReshareContent::Round2Ack) && msg.is_broadcast()
    }

    fn update(&mut self) -> Result<bool> {
        for j in 0..self.base.slot_count() {
            if self.base.is_ok(j) {
                continue;
            }
            if let Some(msg) = &self.state.r2_ack[j] {
                if self.can_accept(msg) {
                    self.base.set_ok(j);
                }
            }
        }
        Ok(self.base.can_proceed())
    }

    fn next_round(self: Box<Self>) -> Option<Box<dyn Round<ReshareContent>>> {
        Some(Box::new(RoundThree::new(self.state)))
    }
}
