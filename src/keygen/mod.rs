// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Threshold key generation.
//!
//! Every party deals a random secret with Feldman VSS, so the group secret is
//! the sum of all dealt secrets and nobody learns it. The protocol runs in
//! three rounds:
//!
//! 1. Deal a degree-`t` polynomial and broadcast a hash commitment to its
//!    coefficient points.
//! 2. Send each peer its share, broadcast the opening of the commitment and a
//!    Schnorr proof of knowledge of the dealt secret. The proof is bound to a
//!    session covering every round 1 commitment and the dealer's index.
//! 3. Check every peer (opening, proof, share) in parallel, then sum the
//!    shares and commitments into a [`KeygenOutput`].
//!
//! Any failed check aborts the run with a fault naming every failing peer.

mod keyshare;
mod messages;
mod round_one;
mod round_three;
mod round_two;
mod state;

pub use keyshare::KeygenOutput;
pub use messages::KeygenContent;

use crate::{
    errors::Result, messages::Message, parameters::Parameters, party::Party,
};
use rand::{CryptoRng, RngCore};
use round_one::RoundOne;
use state::KeygenState;
use tokio::sync::mpsc::UnboundedSender;

pub(crate) const TASK_NAME: &str = "keygen";

/// Create the key generation party for `params`.
///
/// Outbound messages are sent on `out` and the finished [`KeygenOutput`] on
/// `end`.
pub fn new_party<R: RngCore + CryptoRng + Send + 'static>(
    params: Parameters,
    rng: R,
    out: UnboundedSender<Message<KeygenContent>>,
    end: UnboundedSender<KeygenOutput>,
) -> Result<Party<KeygenContent>> {
    let party_id = params.party_id().clone();
    let party_count = params.party_count();
    let state = KeygenState::new(params, rng, out, end)?;
    Ok(Party::new(
        TASK_NAME,
        party_id,
        party_count,
        Box::new(RoundOne::new(state)),
    ))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        curve::{CurveParams, CurvePoint},
        errors::InternalError,
        message_queue::OrderedParty,
        messages::MessageContent,
        parameters::ProtocolVersion,
        protocol::{PartyId, SortedPartyIds},
        utils::testing::{init_testing, run_network},
        vss::Share,
    };
    use k256::Scalar;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    pub(crate) struct KeygenHarness {
        pub parties: Vec<Party<KeygenContent>>,
        pub outboxes: Vec<UnboundedReceiver<Message<KeygenContent>>>,
        pub outputs: Vec<UnboundedReceiver<KeygenOutput>>,
    }

    pub(crate) fn setup(
        rng: &mut StdRng,
        n: usize,
        threshold: usize,
        version: ProtocolVersion,
    ) -> Result<KeygenHarness> {
        let ids = SortedPartyIds::from_unsorted(
            (0..n).map(|i| PartyId::random(&mut *rng, format!("party-{i}"))).collect(),
        )?;
        let curve = CurveParams::secp256k1();
        let mut harness = KeygenHarness {
            parties: vec![],
            outboxes: vec![],
            outputs: vec![],
        };
        for id in ids.iter() {
            let params = Parameters::new(&curve, ids.clone(), id, threshold, version)?;
            let (out_tx, out_rx) = unbounded_channel();
            let (end_tx, end_rx) = unbounded_channel();
            let party_rng = StdRng::from_seed(rng.gen());
            harness
                .parties
                .push(new_party(params, party_rng, out_tx, end_tx)?);
            harness.outboxes.push(out_rx);
            harness.outputs.push(end_rx);
        }
        Ok(harness)
    }

    /// Run key generation to completion and collect the outputs.
    pub(crate) fn run_keygen(
        rng: &mut StdRng,
        n: usize,
        threshold: usize,
    ) -> Result<Vec<KeygenOutput>> {
        let mut harness = setup(rng, n, threshold, ProtocolVersion::V2)?;
        for party in &harness.parties {
            party.start()?;
        }
        let errors = run_network(rng, &harness.parties, &mut harness.outboxes, |m| m);
        if let Some(e) = errors.into_iter().flatten().next() {
            return Err(e);
        }
        harness
            .outputs
            .iter_mut()
            .map(|rx| rx.try_recv().map_err(|_| InternalError::InternalInvariantFailed))
            .collect()
    }

    fn check_outputs(outputs: &[KeygenOutput], threshold: usize) -> Result<()> {
        let public_key = *outputs[0].public_key();
        for output in outputs {
            assert_eq!(output.public_key(), &public_key);
            assert_eq!(output.public_shares(), outputs[0].public_shares());
            assert_eq!(output.threshold(), threshold);
        }

        // Any quorum of t + 1 reconstructs the secret behind the public key.
        let n = outputs.len();
        let quorum_members: Vec<usize> = (n - threshold - 1..n).collect();
        let quorum = SortedPartyIds::from_unsorted(
            quorum_members
                .iter()
                .filter_map(|&i| outputs[i].party_id().cloned())
                .collect(),
        )?;
        let mut secret = Scalar::ZERO;
        let mut weighted = vec![];
        for &i in &quorum_members {
            let (w, big_ws) = outputs[i].signing_weight(&quorum)?;
            secret += w;
            weighted = big_ws;
        }
        assert_eq!(CurvePoint::scale_generator(&secret), public_key);
        assert_eq!(weighted.into_iter().sum::<CurvePoint>(), public_key);
        Ok(())
    }

    #[test]
    fn keygen_produces_consistent_shares() -> Result<()> {
        let mut rng = init_testing();
        let outputs = run_keygen(&mut rng, 4, 2)?;
        check_outputs(&outputs, 2)
    }

    #[test]
    fn keygen_works_under_both_versions_and_sizes() -> Result<()> {
        let mut rng = init_testing();
        for (n, t, version) in [
            (2, 1, ProtocolVersion::V1),
            (3, 1, ProtocolVersion::V2),
            (5, 3, ProtocolVersion::V1),
        ] {
            let mut harness = setup(&mut rng, n, t, version)?;
            for party in &harness.parties {
                party.start()?;
            }
            let errors = run_network(&mut rng, &harness.parties, &mut harness.outboxes, |m| m);
            assert!(errors.iter().all(Option::is_none));
            let outputs: Vec<KeygenOutput> = harness
                .outputs
                .iter_mut()
                .map(|rx| rx.try_recv().map_err(|_| InternalError::InternalInvariantFailed))
                .collect::<Result<_>>()?;
            check_outputs(&outputs, t)?;
        }
        Ok(())
    }

    #[test]
    fn keygen_over_wire_bytes() -> Result<()> {
        let mut rng = init_testing();
        let mut harness = setup(&mut rng, 3, 1, ProtocolVersion::V2)?;
        for party in &harness.parties {
            party.start()?;
        }
        // Deliver in send order, through the byte encoding
        loop {
            let mut pending = vec![];
            for outbox in harness.outboxes.iter_mut() {
                while let Ok(msg) = outbox.try_recv() {
                    pending.push(msg);
                }
            }
            if pending.is_empty() {
                break;
            }
            for msg in pending {
                let bytes = msg.to_wire_bytes()?;
                for party in &harness.parties {
                    let addressed = match &msg.routing().to {
                        None => !party.party_id().same_key(msg.from()),
                        Some(to) => to.iter().any(|p| p.same_key(party.party_id())),
                    };
                    if addressed {
                        let _ = party.update_from_bytes(&bytes, msg.from(), msg.is_broadcast())?;
                    }
                }
            }
        }
        for (party, output) in harness.parties.iter().zip(harness.outputs.iter_mut()) {
            assert!(party.is_finished()?);
            assert!(output.try_recv().is_ok());
        }

        // Garbage bytes are a caller error
        let from = harness.parties[1].party_id().clone();
        assert!(matches!(
            harness.parties[0].update_from_bytes(&[1, 2, 3], &from, true),
            Err(InternalError::CallingApplicationMistake(_))
        ));
        Ok(())
    }

    #[test]
    fn bad_share_blames_exactly_the_dealer() -> Result<()> {
        let mut rng = init_testing();
        let mut harness = setup(&mut rng, 4, 2, ProtocolVersion::V2)?;
        let cheater = harness.parties[1].party_id().clone();
        let victim = harness.parties[3].party_id().clone();
        for party in &harness.parties {
            party.start()?;
        }

        let errors = run_network(&mut rng, &harness.parties, &mut harness.outboxes, |msg| {
            let to_victim = msg
                .routing()
                .to
                .as_ref()
                .map_or(false, |to| to.iter().any(|p| p.same_key(&victim)));
            match msg.content() {
                KeygenContent::Round2Share { share } if msg.from() == &cheater && to_victim => {
                    let bad = Share {
                        threshold: share.threshold,
                        id: share.id,
                        share: share.share + Scalar::ONE,
                    };
                    Message::from_parts(
                        msg.routing().clone(),
                        KeygenContent::Round2Share { share: bad },
                    )
                }
                _ => msg,
            }
        });

        let err = errors[3].clone().ok_or(InternalError::InternalInvariantFailed)?;
        assert_eq!(err.culprits(), &[cheater]);
        assert!(matches!(err, InternalError::ProtocolError(ref f) if f.round == 3));
        assert!(harness.outputs[3].try_recv().is_err());
        assert!(!harness.parties[3].is_finished()?);
        // The failed party accepts nothing further
        assert!(harness.parties[3].round_number().is_err());
        Ok(())
    }

    #[test]
    fn misrouted_copy_is_replaced_by_the_broadcast() -> Result<()> {
        let mut rng = init_testing();
        let harness = setup(&mut rng, 3, 1, ProtocolVersion::V2)?;
        for party in &harness.parties {
            party.start()?;
        }
        let mut outboxes = harness.outboxes;
        let commit_from_1 = outboxes[1].try_recv().map_err(|_| InternalError::InternalInvariantFailed)?;
        let commit_from_2 = outboxes[2].try_recv().map_err(|_| InternalError::InternalInvariantFailed)?;
        assert_eq!(commit_from_1.round_number(), 1);

        // A commitment that arrives point-to-point is stored but not accepted
        let me = harness.parties[0].party_id().clone();
        let direct = Message::direct(
            commit_from_1.from(),
            &me,
            crate::messages::CommitteeScope::New,
            commit_from_1.content().clone(),
        );
        assert!(!harness.parties[0].update(direct)?);
        assert!(!harness.parties[0].update(commit_from_2)?);
        assert_eq!(
            harness.parties[0].waiting_for()?,
            vec![commit_from_1.from().clone()]
        );
        // The broadcast copy takes the slot and completes the round
        assert!(harness.parties[0].update(commit_from_1.clone())?);
        assert_eq!(harness.parties[0].round_number()?, 2);
        assert_eq!(harness.parties[0].waiting_for()?.len(), 2);
        // Once well-routed, a later misrouted copy does not displace it
        let late = Message::direct(
            commit_from_1.from(),
            &me,
            crate::messages::CommitteeScope::New,
            commit_from_1.content().clone(),
        );
        assert!(!harness.parties[0].update(late)?);
        assert_eq!(harness.parties[0].round_number()?, 2);
        Ok(())
    }

    #[test]
    fn concurrent_updates_finish_exactly_once() -> Result<()> {
        let mut rng = init_testing();
        let KeygenHarness {
            parties,
            mut outboxes,
            mut outputs,
        } = setup(&mut rng, 4, 1, ProtocolVersion::V2)?;
        for party in &parties {
            party.start()?;
        }

        // Party 0 takes each sender's messages on a separate thread
        loop {
            let mut to_first: Vec<Vec<Message<KeygenContent>>> = vec![vec![]; parties.len()];
            let mut to_rest = vec![];
            for (sender, outbox) in outboxes.iter_mut().enumerate() {
                while let Ok(msg) = outbox.try_recv() {
                    for (i, party) in parties.iter().enumerate() {
                        let addressed = match &msg.routing().to {
                            None => i != sender,
                            Some(to) => to.iter().any(|p| p.same_key(party.party_id())),
                        };
                        if !addressed {
                            continue;
                        }
                        if i == 0 {
                            to_first[sender].push(msg.clone());
                        } else {
                            to_rest.push((i, msg.clone()));
                        }
                    }
                }
            }
            if to_rest.is_empty() && to_first.iter().all(Vec::is_empty) {
                break;
            }

            let first = &parties[0];
            let results: Vec<Result<bool>> = std::thread::scope(|s| {
                let handles: Vec<_> = to_first
                    .into_iter()
                    .map(|batch| {
                        s.spawn(move || {
                            batch.into_iter().map(|m| first.update(m)).collect::<Vec<_>>()
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .flat_map(|h| h.join().expect("delivery thread panicked"))
                    .collect()
            });
            for result in results {
                result?;
            }
            for (i, msg) in to_rest {
                parties[i].update(msg)?;
            }
        }

        assert!(parties[0].is_finished()?);
        let mut finished = vec![];
        for (party, output) in parties.iter().zip(outputs.iter_mut()) {
            assert!(party.is_finished()?);
            finished.push(output.try_recv().map_err(|_| InternalError::InternalInvariantFailed)?);
            assert!(output.try_recv().is_err());
        }
        check_outputs(&finished, 1)
    }

    #[test]
    fn ordered_parties_complete_under_random_delivery() -> Result<()> {
        let mut rng = init_testing();
        let harness = setup(&mut rng, 4, 1, ProtocolVersion::V2)?;
        let KeygenHarness {
            parties,
            mut outboxes,
            mut outputs,
        } = harness;
        let ordered: Vec<OrderedParty<KeygenContent>> =
            parties.into_iter().map(OrderedParty::new).collect();
        for party in &ordered {
            party.start()?;
        }
        let errors = run_network(&mut rng, &ordered, &mut outboxes, |m| m);
        assert!(errors.iter().all(Option::is_none));
        for (party, output) in ordered.iter().zip(outputs.iter_mut()) {
            assert!(party.party().is_finished()?);
            assert_eq!(party.pending()?, 0);
            assert!(output.try_recv().is_ok());
            // Exactly one output
            assert!(output.try_recv().is_err());
        }
        Ok(())
    }

    #[test]
    fn early_messages_are_applied_once_after_their_round() -> Result<()> {
        let mut rng = init_testing();
        let harness = setup(&mut rng, 3, 1, ProtocolVersion::V2)?;
        let KeygenHarness {
            parties,
            mut outboxes,
            mut outputs,
        } = harness;
        let mut parties = parties.into_iter();
        let slow = OrderedParty::new(parties.next().ok_or(InternalError::InternalInvariantFailed)?);
        let fast: Vec<Party<KeygenContent>> = parties.collect();
        let slow_id = slow.party_id().clone();

        slow.start()?;
        for p in &fast {
            p.start()?;
        }
        let drain = |rx: &mut UnboundedReceiver<Message<KeygenContent>>| {
            std::iter::from_fn(|| rx.try_recv().ok()).collect::<Vec<_>>()
        };
        let slow_r1 = drain(&mut outboxes[0]);
        let fast_r1: Vec<_> = outboxes[1..].iter_mut().flat_map(drain).collect();

        // The fast parties finish round 1 among themselves and with the slow
        // party's commitment, then emit their round 2 messages.
        for msg in slow_r1.iter().chain(&fast_r1) {
            for p in &fast {
                if !p.party_id().same_key(msg.from()) {
                    let _ = p.update(msg.clone())?;
                }
            }
        }
        let fast_r2: Vec<_> = outboxes[1..].iter_mut().flat_map(drain).collect();
        assert!(fast_r2.iter().all(|m| m.round_number() == 2));

        // Round 2 reaches the slow party before round 1 does.
        for msg in fast_r2.iter().filter(|m| {
            m.routing()
                .to
                .as_ref()
                .map_or(true, |to| to.iter().any(|p| p.same_key(&slow_id)))
        }) {
            assert!(!slow.update_ordered(msg.clone())?);
        }
        assert_eq!(slow.pending()?, 4);
        assert_eq!(slow.party().round_number()?, 1);

        // The last round 1 message releases everything that was held
        let (last, rest) = fast_r1.split_last().ok_or(InternalError::InternalInvariantFailed)?;
        for msg in rest {
            assert!(!slow.update_ordered(msg.clone())?);
        }
        assert_eq!(slow.party().round_number()?, 1);
        assert!(slow.update_ordered(last.clone())?);
        assert_eq!(slow.pending()?, 0);
        assert!(slow.party().is_finished()?);
        assert!(outputs[0].try_recv().is_ok());
        assert!(outputs[0].try_recv().is_err());
        Ok(())
    }

    #[test]
    fn content_validation() {
        let bad = KeygenContent::Round2Share {
            share: Share {
                threshold: 0,
                id: Scalar::ONE,
                share: Scalar::ONE,
            },
        };
        assert!(!bad.validate_basic());
        assert_eq!(bad.round_number(), 2);
    }
}
