// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Round 1: old committee members deal their signing weight to the new
//! committee and commit to the coefficient points.

use super::{messages::ReshareContent, round_two::RoundTwo, state::ReshareState, TASK_NAME};
use crate::{
    commitment::{commit, flatten_points},
    errors::{InternalError, Result},
    messages::{CommitteeScope, Message},
    round::{Round, RoundBase},
    vss::{self, lagrange_coefficient},
};
use rand::{CryptoRng, RngCore};
use tracing::info;

pub(super) struct RoundOne<R> {
    base: RoundBase,
    state: ReshareState<R>,
}

impl<R> RoundOne<R> {
    pub(super) fn new(state: ReshareState<R>) -> Self {
        // New committee members wait for every old member's commitment.
        let expected = if state.params.is_new_committee() {
            state.old_parties()
        } else {
            vec![]
        };
        let base = RoundBase::new(TASK_NAME, 1, expected);
        Self { base, state }
    }
}

impl<R: RngCore + CryptoRng + Send + 'static> Round<ReshareContent> for RoundOne<R> {
    fn base(&self) -> &RoundBase {
        &self.base
    }

    fn start(&mut self) -> Result<()> {
        self.base.mark_started()?;
        let Some(i) = self.state.old_index() else {
            return Ok(());
        };

        let xi = *self
            .state
            .input
            .secret_share()
            .ok_or(InternalError::InternalInvariantFailed)?;
        let wi = lagrange_coefficient(&self.state.old_ks, i)? * xi;
        let (vs, shares) = vss::create(
            &mut self.state.rng,
            self.state.params.new_threshold(),
            &wi,
            &self.state.new_ks,
        )?;
        let (commitment, decommitment) = commit(&mut self.state.rng, &flatten_points(&vs)?);
        info!(party = %self.state.party_id(), "Dealt signing weight to the new committee");

        self.state.temp.vs = vs;
        self.state.temp.shares = shares;
        self.state.temp.decommitment = Some(decommitment);

        let msg = Message::broadcast(
            self.state.party_id(),
            CommitteeScope::New,
            ReshareContent::Round1Commit { commitment },
        );
        if self.state.params.is_new_committee() {
            self.state.r1_commit[i] = Some(msg.clone());
            self.base.set_ok(i);
        }
        self.state.send(msg)
    }

    fn store_message(&mut self, msg: Message<ReshareContent>) -> Result<()> {
        self.state.store(msg)
    }

    fn can_accept(&self, msg: &Message<ReshareContent>) -> bool {
        matches!(msg.content(), ReshareContent::Round1Commit { .. }) && msg.is_broadcast()
    }

    fn update(&mut self) -> Result<bool> {
        for j in 0..self.base.slot_count() {
            if self.base.is_ok(j) {
                continue;
            }
            if let Some(msg) = &self.state.r1_commit[j] {
                if self.can_accept(msg) {
                    self.base.set_ok(j);
                }
            }
        }
        Ok(self.base.can_proceed())
    }

    fn next_round(self: Box<Self>) -> Option<Box<dyn Round<ReshareContent>>> {
        Some(Box::new(RoundTwo::new(self.state)))
    }
}
