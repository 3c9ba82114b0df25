// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Round 3: check every peer's contribution and assemble the key share.
//!
//! Peers are checked in parallel. Every check runs to completion, and if any
//! fail the round reports all failing peers at once.

use super::{keyshare::KeygenOutput, messages::KeygenContent, state::KeygenState, TASK_NAME};
use crate::{
    commitment::{decommit, unflatten_points, HashCommitment},
    curve::{CurveParams, CurvePoint},
    errors::{InternalError, Result},
    messages::Message,
    parameters::ProtocolVersion,
    protocol::{PartyId, SessionContext},
    round::{Round, RoundBase},
    vss::{evaluate_commitments, Share, Vs},
    zkp::{
        pisch::{PiSchInput, PiSchProof},
        Proof,
    },
};
use k256::Scalar;
use rand::{CryptoRng, RngCore};
use rayon::prelude::*;
use tracing::{error, info, warn};

pub(super) struct RoundThree<R> {
    base: RoundBase,
    state: KeygenState<R>,
}

impl<R> RoundThree<R> {
    pub(super) fn new(state: KeygenState<R>) -> Self {
        // No messages are exchanged in this round.
        let base = RoundBase::new(TASK_NAME, 3, vec![]);
        Self { base, state }
    }
}

/// What one peer sent us, gathered from the message slots.
struct PeerContribution<'a> {
    commitment: &'a HashCommitment,
    decommitment: &'a crate::commitment::HashDeCommitment,
    proof: &'a PiSchProof,
    share: &'a Share,
}

fn gather<'a>(
    r1: &'a Option<Message<KeygenContent>>,
    r2_share: &'a Option<Message<KeygenContent>>,
    r2_decommit: &'a Option<Message<KeygenContent>>,
) -> Result<PeerContribution<'a>> {
    match (
        r1.as_ref().map(Message::content),
        r2_share.as_ref().map(Message::content),
        r2_decommit.as_ref().map(Message::content),
    ) {
        (
            Some(KeygenContent::Round1Commit { commitment }),
            Some(KeygenContent::Round2Share { share }),
            Some(KeygenContent::Round2Decommit {
                decommitment,
                proof,
            }),
        ) => Ok(PeerContribution {
            commitment,
            decommitment,
            proof,
            share,
        }),
        _ => {
            error!("Round 3 entered with missing peer messages");
            Err(InternalError::InternalInvariantFailed)
        }
    }
}

struct Verifier<'a> {
    curve: &'a CurveParams,
    version: ProtocolVersion,
    session: &'a SessionContext,
    threshold: usize,
    own_point: Scalar,
}

impl Verifier<'_> {
    /// Check peer `j` and return its coefficient commitments.
    fn check(&self, j: usize, peer: &PeerContribution<'_>) -> std::result::Result<Vs, &'static str> {
        let values =
            decommit(peer.commitment, peer.decommitment).ok_or("decommitment does not open")?;
        let vs = unflatten_points(&values).map_err(|_| "committed points are not on the curve")?;
        if vs.len() != self.threshold + 1 {
            return Err("wrong number of coefficient commitments");
        }
        let input = PiSchInput::new(self.curve, &vs[0], self.version);
        peer.proof
            .verify(&input, &mut self.session.transcript_for(j))
            .map_err(|_| "proof of knowledge does not verify")?;
        if peer.share.id != self.own_point || !peer.share.verify(self.threshold, &vs) {
            return Err("share does not match the commitments");
        }
        Ok(vs)
    }
}

impl<R: RngCore + CryptoRng + Send + 'static> Round<KeygenContent> for RoundThree<R> {
    fn base(&self) -> &RoundBase {
        &self.base
    }

    fn start(&mut self) -> Result<()> {
        self.base.mark_started()?;
        let state = &self.state;
        let params = &state.params;
        let i = state.index();
        let n = params.party_count();
        let threshold = params.threshold();

        let session = state
            .temp
            .session
            .as_ref()
            .ok_or(InternalError::InternalInvariantFailed)?;
        let contributions = (0..n)
            .map(|j| gather(&state.r1_commit[j], &state.r2_share[j], &state.r2_decommit[j]))
            .collect::<Result<Vec<_>>>()?;
        let verifier = Verifier {
            curve: params.curve(),
            version: params.version(),
            session,
            threshold,
            own_point: state.ks[i],
        };

        let results: Vec<(usize, std::result::Result<Vs, &'static str>)> = contributions
            .par_iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(j, peer)| (j, verifier.check(j, peer)))
            .collect();

        let mut culprits: Vec<PartyId> = vec![];
        let mut all_vs: Vec<Vs> = vec![vec![]; n];
        all_vs[i] = state.temp.vs.clone();
        for (j, result) in results {
            match result {
                Ok(vs) => all_vs[j] = vs,
                Err(cause) => {
                    let culprit = params
                        .parties()
                        .get(j)
                        .cloned()
                        .ok_or(InternalError::InternalInvariantFailed)?;
                    warn!(culprit = %culprit, cause, "Peer failed verification");
                    culprits.push(culprit);
                }
            }
        }
        if !culprits.is_empty() {
            error!(count = culprits.len(), "Key generation aborted");
            return Err(self.base.fault(culprits, "peer contribution failed verification"));
        }

        let xi: Scalar = contributions.iter().map(|c| c.share.share).sum();
        let vc: Vs = (0..=threshold)
            .map(|c| all_vs.iter().map(|vs| vs[c]).sum())
            .collect();
        let big_xj: Vec<CurvePoint> = state
            .ks
            .iter()
            .map(|k| evaluate_commitments(&vc, k))
            .collect();
        let public_key = vc[0];
        if public_key.is_identity() {
            error!("Group public key is the identity");
            return Err(InternalError::InternalInvariantFailed);
        }

        let output = KeygenOutput::new(
            threshold,
            params.parties().clone(),
            i,
            xi,
            big_xj,
            public_key,
        )?;
        info!(party = %state.party_id(), "Key generation complete");
        state.finish(output)
    }

    fn store_message(&mut self, msg: Message<KeygenContent>) -> Result<()> {
        self.state.store(msg)
    }

    fn can_accept(&self, _msg: &Message<KeygenContent>) -> bool {
        false
    }

    fn update(&mut self) -> Result<bool> {
        Ok(self.base.can_proceed())
    }

    fn next_round(self: Box<Self>) -> Option<Box<dyn Round<KeygenContent>>> {
        None
    }
}
