// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Round 2: hand out shares, open the commitment and prove knowledge of the
//! dealt secret.

use super::{
    messages::KeygenContent, round_three::RoundThree, state::KeygenState, TASK_NAME,
};
use crate::{
    errors::{InternalError, Result},
    messages::{CommitteeScope, Message},
    protocol::SessionContext,
    round::{Round, RoundBase},
    zkp::{
        pisch::{PiSchInput, PiSchProof, PiSchSecret},
        Proof,
    },
};
use rand::{CryptoRng, RngCore};
use tracing::error;

pub(super) struct RoundTwo<R> {
    base: RoundBase,
    state: KeygenState<R>,
}

impl<R> RoundTwo<R> {
    pub(super) fn new(state: KeygenState<R>) -> Self {
        let base = RoundBase::new(TASK_NAME, 2, state.parties());
        Self { base, state }
    }

    fn session(&self) -> Result<SessionContext> {
        let commitments = self
            .state
            .r1_commit
            .iter()
            .map(|slot| match slot.as_ref().map(Message::content) {
                Some(KeygenContent::Round1Commit { commitment }) => Ok(commitment.clone()),
                _ => {
                    error!("Round 2 entered without every round 1 commitment");
                    Err(InternalError::InternalInvariantFailed)
                }
            })
            .collect::<Result<Vec<_>>>()?;
        let params = &self.state.params;
        Ok(SessionContext::new(
            TASK_NAME,
            params.curve(),
            params.parties(),
            params.threshold(),
            &commitments,
        ))
    }
}

impl<R: RngCore + CryptoRng + Send + 'static> Round<KeygenContent> for RoundTwo<R> {
    fn base(&self) -> &RoundBase {
        &self.base
    }

    fn start(&mut self) -> Result<()> {
        self.base.mark_started()?;
        let i = self.state.index();
        let session = self.session()?;

        let ui = self
            .state
            .temp
            .ui
            .take()
            .ok_or(InternalError::InternalInvariantFailed)?;
        let big_ui = *self
            .state
            .temp
            .vs
            .first()
            .ok_or(InternalError::InternalInvariantFailed)?;
        let input = PiSchInput::new(
            self.state.params.curve(),
            &big_ui,
            self.state.params.version(),
        );
        let proof = PiSchProof::prove(
            &input,
            &PiSchSecret::new(&ui),
            &mut session.transcript_for(i),
            &mut self.state.rng,
        )?;
        self.state.temp.session = Some(session);

        let me = self.state.party_id().clone();
        let own_share = self.state.temp.shares[i].clone();
        self.state.r2_share[i] = Some(Message::direct(
            &me,
            &me,
            CommitteeScope::New,
            KeygenContent::Round2Share { share: own_share },
        ));
        for party in self.state.params.parties().exclude(i) {
            let j = party.index().ok_or(InternalError::InternalInvariantFailed)?;
            let share = self.state.temp.shares[j].clone();
            self.state.send(Message::direct(
                &me,
                &party,
                CommitteeScope::New,
                KeygenContent::Round2Share { share },
            ))?;
        }

        let decommitment = self
            .state
            .temp
            .decommitment
            .clone()
            .ok_or(InternalError::InternalInvariantFailed)?;
        let msg = Message::broadcast(
            &me,
            CommitteeScope::New,
            KeygenContent::Round2Decommit {
                decommitment,
                proof,
            },
        );
        self.state.r2_decommit[i] = Some(msg.clone());
        self.base.set_ok(i);
        self.state.send(msg)
    }

    fn store_message(&mut self, msg: Message<KeygenContent>) -> Result<()> {
        self.state.store(msg)
    }

    fn can_accept(&self, msg: &Message<KeygenContent>) -> bool {
        match msg.content() {
            KeygenContent::Round2Share { .. } => !msg.is_broadcast(),
            KeygenContent::Round2Decommit { .. } => msg.is_broadcast(),
            KeygenContent::Round1Commit { .. } => false,
        }
    }

    fn update(&mut self) -> Result<bool> {
        for j in 0..self.base.slot_count() {
            if self.base.is_ok(j) {
                continue;
            }
            let share_ok = self.state.r2_share[j]
                .as_ref()
                .map_or(false, |m| self.can_accept(m));
            let decommit_ok = self.state.r2_decommit[j]
                .as_ref()
                .map_or(false, |m| self.can_accept(m));
            if share_ok && decommit_ok {
                self.base.set_ok(j);
            }
        }
        Ok(self.base.can_proceed())
    }

    fn next_round(self: Box<Self>) -> Option<Box<dyn Round<KeygenContent>>> {
        Some(Box::new(RoundThree::new(self.state)))
    }
}
