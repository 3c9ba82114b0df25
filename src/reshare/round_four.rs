// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Round 4: new committee members check every old member's deal and
//! assemble their new key share.
//!
//! Each deal must open its commitment, match the new threshold, carry a share
//! consistent with the coefficient points, and have a constant term equal to
//! the dealer's weighted old public share. The last check pins every deal to
//! the existing key, so the summed constant terms always give back the old
//! public key.

use super::{
    messages::ReshareContent, output::ReshareOutput, state::ReshareState, TASK_NAME,
};
use crate::{
    commitment::{decommit, unflatten_points, HashCommitment, HashDeCommitment},
    curve::CurvePoint,
    errors::{InternalError, Result},
    keygen::KeygenOutput,
    messages::Message,
    protocol::PartyId,
    round::{Round, RoundBase},
    vss::{evaluate_commitments, lagrange_coefficient, Share, Vs},
};
use k256::Scalar;
use rand::{CryptoRng, RngCore};
use rayon::prelude::*;
use tracing::{error, info, warn};

pub(super) struct RoundFour<R> {
    base: RoundBase,
    state: ReshareState<R>,
}

impl<R> RoundFour<R> {
    pub(super) fn new(state: ReshareState<R>) -> Self {
        let base = RoundBase::new(TASK_NAME, 4, vec![]);
        Self { base, state }
    }
}

struct Deal<'a> {
    commitment: &'a HashCommitment,
    decommitment: &'a HashDeCommitment,
    share: &'a Share,
    /// `λ_j · X_j` over the old committee.
    expected_constant: CurvePoint,
}

fn check_deal(
    deal: &Deal<'_>,
    threshold: usize,
    own_point: &Scalar,
) -> std::result::Result<Vs, &'static str> {
    let values =
        decommit(deal.commitment, deal.decommitment).ok_or("decommitment does not open")?;
    let vs = unflatten_points(&values).map_err(|_| "committed points are not on the curve")?;
    if vs.len() != threshold + 1 {
        return Err("wrong number of coefficient commitments");
    }
    if vs[0] != deal.expected_constant {
        return Err("dealt secret is not the dealer's signing weight");
    }
    if &deal.share.id != own_point || !deal.share.verify(threshold, &vs) {
        return Err("share does not match the commitments");
    }
    Ok(vs)
}

impl<R: RngCore + CryptoRng + Send> RoundFour<R> {
    fn gather(&self) -> Result<Vec<Deal<'_>>> {
        let state = &self.state;
        let old_shares = state.input.old_public_shares();
        (0..state.params.old_party_count())
            .map(|j| {
                let commitment = match state.r1_commit[j].as_ref().map(Message::content) {
                    Some(ReshareContent::Round1Commit { commitment }) => commitment,
                    _ => return Err(InternalError::InternalInvariantFailed),
                };
                let share = match state.r3_share[j].as_ref().map(Message::content) {
                    Some(ReshareContent::Round3Share { share }) => share,
                    _ => return Err(InternalError::InternalInvariantFailed),
                };
                let decommitment = match state.r3_decommit[j].as_ref().map(Message::content) {
                    Some(ReshareContent::Round3Decommit { decommitment }) => decommitment,
                    _ => return Err(InternalError::InternalInvariantFailed),
                };
                let weight = lagrange_coefficient(&state.old_ks, j)?;
                Ok(Deal {
                    commitment,
                    decommitment,
                    share,
                    expected_constant: old_shares[j].multiply_by_scalar(&weight),
                })
            })
            .collect()
    }

    fn assemble(&self) -> Result<KeygenOutput> {
        let state = &self.state;
        let params = &state.params;
        let threshold = params.new_threshold();
        let i = state.new_index().ok_or(InternalError::InternalInvariantFailed)?;
        let own_point = state.new_ks[i];

        let deals = self.gather().map_err(|e| {
            error!("Round 4 entered with missing dealer messages");
            e
        })?;
        let results: Vec<std::result::Result<Vs, &'static str>> = deals
            .par_iter()
            .map(|deal| check_deal(deal, threshold, &own_point))
            .collect();

        let mut culprits: Vec<PartyId> = vec![];
        let mut all_vs: Vec<Vs> = Vec::with_capacity(results.len());
        for (j, result) in results.into_iter().enumerate() {
            match result {
                Ok(vs) => all_vs.push(vs),
                Err(cause) => {
                    let culprit = params
                        .old_parties()
                        .get(j)
                        .cloned()
                        .ok_or(InternalError::InternalInvariantFailed)?;
                    warn!(culprit = %culprit, cause, "Dealer failed verification");
                    culprits.push(culprit);
                }
            }
        }
        if !culprits.is_empty() {
            error!(count = culprits.len(), "Resharing aborted");
            return Err(self.base.fault(culprits, "dealer contribution failed verification"));
        }

        let xi: Scalar = deals.iter().map(|d| d.share.share).sum();
        let vc: Vs = (0..=threshold)
            .map(|c| all_vs.iter().map(|vs| vs[c]).sum())
            .collect();
        if &vc[0] != state.input.public_key() {
            error!("Reshared public key differs from the old one");
            return Err(InternalError::InternalInvariantFailed);
        }
        let big_xj: Vec<CurvePoint> = state
            .new_ks
            .iter()
            .map(|k| evaluate_commitments(&vc, k))
            .collect();
        KeygenOutput::new(
            threshold,
            params.new_parties().clone(),
            i,
            xi,
            big_xj,
            vc[0],
        )
    }
}

impl<R: RngCore + CryptoRng + Send + 'static> Round<ReshareContent> for RoundFour<R> {
    fn base(&self) -> &RoundBase {
        &self.base
    }

    fn start(&mut self) -> Result<()> {
        self.base.mark_started()?;
        if !self.state.params.is_new_committee() {
            info!(party = %self.state.party_id(), "Old key share retired");
            return self.state.finish(ReshareOutput::Retired);
        }
        let output = self.assemble()?;
        info!(party = %self.state.party_id(), "Resharing complete");
        self.state.finish(ReshareOutput::Share(output))
    }

    fn store_message(&mut self, msg: Message<ReshareContent>) -> Result<()> {
        self.state.store(msg)
    }

    fn can_accept(&self, _msg: &Message<ReshareContent>) -> bool {
        false
    }

    fn update(&mut self) -> Result<bool> {
        Ok(self.base.can_proceed())
    }

    fn next_round(self: Box<Self>) -> Option<Box<dyn Round<ReshareContent>>> {
        None
    }
}
