// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Round 1: deal a random secret and commit to the coefficient points.

use super::{
    messages::KeygenContent, round_two::RoundTwo, state::KeygenState, TASK_NAME,
};
use crate::{
    commitment::{commit, flatten_points},
    curve::random_nonzero_scalar,
    errors::Result,
    messages::{CommitteeScope, Message},
    round::{Round, RoundBase},
    vss,
};
use rand::{CryptoRng, RngCore};
use tracing::info;

pub(super) struct RoundOne<R> {
    base: RoundBase,
    state: KeygenState<R>,
}

impl<R> RoundOne<R> {
    pub(super) fn new(state: KeygenState<R>) -> Self {
        let base = RoundBase::new(TASK_NAME, 1, state.parties());
        Self { base, state }
    }
}

impl<R: RngCore + CryptoRng + Send + 'static> Round<KeygenContent> for RoundOne<R> {
    fn base(&self) -> &RoundBase {
        &self.base
    }

    fn start(&mut self) -> Result<()> {
        self.base.mark_started()?;
        let i = self.state.index();
        let threshold = self.state.params.threshold();

        let ui = random_nonzero_scalar(&mut self.state.rng);
        let (vs, shares) = vss::create(&mut self.state.rng, threshold, &ui, &self.state.ks)?;
        let (commitment, decommitment) = commit(&mut self.state.rng, &flatten_points(&vs)?);
        info!(party = %self.state.party_id(), "Dealt key share polynomial");

        self.state.temp.ui = Some(ui);
        self.state.temp.vs = vs;
        self.state.temp.shares = shares;
        self.state.temp.decommitment = Some(decommitment);

        let msg = Message::broadcast(
            self.state.party_id(),
            CommitteeScope::New,
            KeygenContent::Round1Commit { commitment },
        );
        self.state.r1_commit[i] = Some(msg.clone());
        self.base.set_ok(i);
        self.state.send(msg)
    }

    fn store_message(&mut self, msg: Message<KeygenContent>) -> Result<()> {
        self.state.store(msg)
    }

    fn can_accept(&self, msg: &Message<KeygenContent>) -> bool {
        matches!(msg.content(), KeygenContent::Round1Commit { .. }) && msg.is_broadcast()
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

    fn next_round(self: Box<Self>) -> Option<Box<dyn Round<KeygenContent>>> {
        Some(Box::new(RoundTwo::new(self.state)))
    }
}
