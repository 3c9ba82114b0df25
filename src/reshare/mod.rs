// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Moving a shared key from one committee to another.
//!
//! The old committee is a quorum of current key holders. Each old member
//! deals its signing weight `λ_i · x_i` to the new committee with Feldman
//! VSS, so the new shares sum to a sharing of the same secret under a
//! possibly different threshold. The public key does not change.
//!
//! A party may sit on either committee or on both. Messages carry a
//! [`CommitteeScope`](crate::messages::CommitteeScope) so the transport can
//! route them, and a party drops anything addressed to a committee it is
//! not on.

mod messages;
mod output;
mod round_four;
mod round_one;
mod round_three;
mod round_two;
mod state;

pub use messages::ReshareContent;
pub use output::{ReshareInput, ReshareOutput};

use crate::{
    errors::Result, messages::Message, parameters::ReSharingParameters, party::Party,
};
use rand::{CryptoRng, RngCore};
use round_one::RoundOne;
use state::ReshareState;
use tokio::sync::mpsc::UnboundedSender;

pub(crate) const TASK_NAME: &str = "reshare";

/// Create the resharing party for `params`.
///
/// Fails if `input` does not fit the committees: the old public shares must
/// interpolate to the public key, and an old member's secret share must
/// match its public share.
pub fn new_party<R: RngCore + CryptoRng + Send + 'static>(
    params: ReSharingParameters,
    input: ReshareInput,
    rng: R,
    out: UnboundedSender<Message<ReshareContent>>,
    end: UnboundedSender<ReshareOutput>,
) -> Result<Party<ReshareContent>> {
    let party_id = params.party_id().clone();
    let max_sender_count = params.old_party_count().max(params.new_party_count());
    let state = ReshareState::new(params, input, rng, out, end)?;
    Ok(Party::new(
        TASK_NAME,
        party_id,
        max_sender_count,
        Box::new(RoundOne::new(state)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        curve::{CurveParams, CurvePoint},
        errors::{CallerError, InternalError},
        keygen::{tests::run_keygen, KeygenOutput},
        messages::MessageRouting,
        parameters::ProtocolVersion,
        protocol::{PartyId, SortedPartyIds},
        utils::testing::{init_testing, run_network, Deliver},
        vss::Share,
    };
    use k256::Scalar;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    struct Committees {
        old: SortedPartyIds,
        new: SortedPartyIds,
        /// Everyone taking part, each once.
        everyone: Vec<PartyId>,
        public_key: CurvePoint,
        old_public_shares: Vec<CurvePoint>,
    }

    /// Old committee: the first `old_count` key holders. New committee: the
    /// last old member plus `fresh` newcomers.
    fn committees(
        rng: &mut StdRng,
        keys: &[KeygenOutput],
        old_count: usize,
        fresh: usize,
    ) -> Result<Committees> {
        let old_members: Vec<PartyId> = keys[..old_count]
            .iter()
            .filter_map(|k| k.party_id().cloned())
            .collect();
        let old = SortedPartyIds::from_unsorted(old_members)?;
        let mut new_members: Vec<PartyId> = (0..fresh)
            .map(|i| PartyId::random(&mut *rng, format!("fresh-{i}")))
            .collect();
        let dual = old.get(old.len() - 1).cloned().ok_or(InternalError::InternalInvariantFailed)?;
        new_members.push(dual);
        let new = SortedPartyIds::from_unsorted(new_members)?;

        let mut everyone: Vec<PartyId> = old.iter().cloned().collect();
        everyone.extend(new.iter().filter(|p| old.find(p).is_none()).cloned());
        let input = ReshareInput::from_keygen(&keys[0], &old)?;
        Ok(Committees {
            old,
            new,
            everyone,
            public_key: *input.public_key(),
            old_public_shares: input.old_public_shares().to_vec(),
        })
    }

    /// A party plus the committees it sits on, for scope-aware delivery.
    struct Member {
        party: Party<ReshareContent>,
        old: bool,
        new: bool,
    }

    impl Deliver<ReshareContent> for Member {
        fn id(&self) -> &PartyId {
            self.party.party_id()
        }

        fn deliver(&self, msg: Message<ReshareContent>) -> Result<bool> {
            self.party.update(msg)
        }

        fn in_scope(&self, routing: &MessageRouting) -> bool {
            (self.old && routing.is_to_old_committee()) || (self.new && routing.is_to_new_committee())
        }
    }

    struct Harness {
        parties: Vec<Member>,
        outboxes: Vec<UnboundedReceiver<Message<ReshareContent>>>,
        outputs: Vec<UnboundedReceiver<ReshareOutput>>,
    }

    fn setup(
        rng: &mut StdRng,
        keys: &[KeygenOutput],
        c: &Committees,
        old_threshold: usize,
        new_threshold: usize,
    ) -> Result<Harness> {
        let curve = CurveParams::secp256k1();
        let mut harness = Harness {
            parties: vec![],
            outboxes: vec![],
            outputs: vec![],
        };
        for id in &c.everyone {
            let params = ReSharingParameters::new(
                &curve,
                c.old.clone(),
                c.new.clone(),
                id,
                old_threshold,
                new_threshold,
                ProtocolVersion::V2,
            )?;
            let input = match keys.iter().find(|k| k.party_id().map_or(false, |p| p.same_key(id))) {
                Some(key) if params.is_old_committee() => ReshareInput::from_keygen(key, &c.old)?,
                _ => ReshareInput::for_new_member(c.public_key, c.old_public_shares.clone()),
            };
            let (out_tx, out_rx) = unbounded_channel();
            let (end_tx, end_rx) = unbounded_channel();
            let (old, new) = (params.is_old_committee(), params.is_new_committee());
            let party = new_party(params, input, StdRng::from_seed(rng.gen()), out_tx, end_tx)?;
            harness.parties.push(Member { party, old, new });
            harness.outboxes.push(out_rx);
            harness.outputs.push(end_rx);
        }
        Ok(harness)
    }

    #[test]
    fn reshare_keeps_the_public_key() -> Result<()> {
        let mut rng = init_testing();
        let keys = run_keygen(&mut rng, 4, 1)?;
        let c = committees(&mut rng, &keys, 3, 3)?;
        let mut harness = setup(&mut rng, &keys, &c, 1, 2)?;
        for member in &harness.parties {
            member.party.start()?;
        }
        let errors = run_network(&mut rng, &harness.parties, &mut harness.outboxes, |m| m);
        assert!(errors.iter().all(Option::is_none));

        let mut new_shares = vec![];
        for (id, output) in c.everyone.iter().zip(harness.outputs.iter_mut()) {
            let result = output.try_recv().map_err(|_| InternalError::InternalInvariantFailed)?;
            match (c.new.find(id), result.share()) {
                (Some(_), Some(share)) => new_shares.push(share.clone()),
                (None, None) => assert!(matches!(result, ReshareOutput::Retired)),
                _ => panic!("unexpected output {result:?} for {id}"),
            }
            assert!(output.try_recv().is_err());
        }
        assert_eq!(new_shares.len(), c.new.len());
        for share in &new_shares {
            assert_eq!(share.public_key(), &c.public_key);
            assert_eq!(share.threshold(), 2);
            assert_eq!(share.parties(), &c.new);
        }

        // Every new share is fresh
        let dual = c.old.get(c.old.len() - 1).ok_or(InternalError::InternalInvariantFailed)?;
        let old_dual_share = keys
            .iter()
            .find(|k| k.party_id().map_or(false, |p| p.same_key(dual)))
            .ok_or(InternalError::InternalInvariantFailed)?;
        let new_dual_share = new_shares
            .iter()
            .find(|k| k.party_id().map_or(false, |p| p.same_key(dual)))
            .ok_or(InternalError::InternalInvariantFailed)?;
        assert_ne!(old_dual_share.secret_share(), new_dual_share.secret_share());

        // Any three new members can sign
        let quorum = SortedPartyIds::from_unsorted(c.new.iter().take(3).cloned().collect())?;
        let mut secret = Scalar::ZERO;
        for share in new_shares.iter().filter(|s| {
            s.party_id().map_or(false, |p| quorum.find(p).is_some())
        }) {
            secret += share.signing_weight(&quorum)?.0;
        }
        assert_eq!(CurvePoint::scale_generator(&secret), c.public_key);
        Ok(())
    }

    #[test]
    fn bad_deal_blames_the_dealer() -> Result<()> {
        let mut rng = init_testing();
        let keys = run_keygen(&mut rng, 3, 1)?;
        let c = committees(&mut rng, &keys, 2, 2)?;
        let mut harness = setup(&mut rng, &keys, &c, 1, 1)?;
        let cheater = c.old.get(0).cloned().ok_or(InternalError::InternalInvariantFailed)?;
        let victim_position = c
            .everyone
            .iter()
            .position(|p| c.old.find(p).is_none())
            .ok_or(InternalError::InternalInvariantFailed)?;
        let victim = c.everyone[victim_position].clone();

        for member in &harness.parties {
            member.party.start()?;
        }
        let errors = run_network(&mut rng, &harness.parties, &mut harness.outboxes, |msg| {
            let to_victim = msg
                .routing()
                .to
                .as_ref()
                .map_or(false, |to| to.iter().any(|p| p.same_key(&victim)));
            match msg.content() {
                ReshareContent::Round3Share { share } if msg.from().same_key(&cheater) && to_victim => {
                    let bad = Share {
                        threshold: share.threshold,
                        id: share.id,
                        share: share.share + Scalar::ONE,
                    };
                    Message::from_parts(msg.routing().clone(), ReshareContent::Round3Share { share: bad })
                }
                _ => msg,
            }
        });

        let err = errors[victim_position]
            .clone()
            .ok_or(InternalError::InternalInvariantFailed)?;
        assert_eq!(err.culprits().len(), 1);
        assert!(err.culprits()[0].same_key(&cheater));
        assert!(harness.outputs[victim_position].try_recv().is_err());
        Ok(())
    }

    #[test]
    fn inputs_are_checked_against_the_committees() -> Result<()> {
        let mut rng = init_testing();
        let keys = run_keygen(&mut rng, 3, 1)?;
        let c = committees(&mut rng, &keys, 2, 2)?;
        let curve = CurveParams::secp256k1();
        let newcomer = c
            .everyone
            .iter()
            .find(|p| c.old.find(p).is_none())
            .ok_or(InternalError::InternalInvariantFailed)?;
        let old_member = c.old.get(0).ok_or(InternalError::InternalInvariantFailed)?;
        let params_for = |id: &PartyId| {
            ReSharingParameters::new(
                &curve,
                c.old.clone(),
                c.new.clone(),
                id,
                1,
                1,
                ProtocolVersion::V2,
            )
        };
        let is_bad_input = |r: Result<Party<ReshareContent>>| {
            matches!(
                r,
                Err(InternalError::CallingApplicationMistake(CallerError::BadInput(_)))
            )
        };

        // Public shares that do not interpolate to the key
        let mut shifted = c.old_public_shares.clone();
        shifted[0] = shifted[0] + CurvePoint::GENERATOR;
        let (out, _) = unbounded_channel();
        let (end, _) = unbounded_channel();
        assert!(is_bad_input(new_party(
            params_for(newcomer)?,
            ReshareInput::for_new_member(c.public_key, shifted),
            StdRng::from_seed(rng.gen()),
            out,
            end,
        )));

        // Wrong number of public shares
        let (out, _) = unbounded_channel();
        let (end, _) = unbounded_channel();
        assert!(is_bad_input(new_party(
            params_for(newcomer)?,
            ReshareInput::for_new_member(c.public_key, c.old_public_shares[..1].to_vec()),
            StdRng::from_seed(rng.gen()),
            out,
            end,
        )));

        // An old member without its secret share
        let (out, _) = unbounded_channel();
        let (end, _) = unbounded_channel();
        assert!(is_bad_input(new_party(
            params_for(old_member)?,
            ReshareInput::for_new_member(c.public_key, c.old_public_shares.clone()),
            StdRng::from_seed(rng.gen()),
            out,
            end,
        )));

        // Someone on neither committee
        let stranger = PartyId::random(&mut rng, "stranger");
        assert!(matches!(
            params_for(&stranger),
            Err(InternalError::CallingApplicationMistake(CallerError::BadInput(_)))
        ));
        Ok(())
    }

    #[test]
    fn messages_from_the_wrong_committee_are_faults() -> Result<()> {
        let mut rng = init_testing();
        let keys = run_keygen(&mut rng, 3, 1)?;
        let c = committees(&mut rng, &keys, 2, 2)?;
        let harness = setup(&mut rng, &keys, &c, 1, 1)?;
        let newcomer_position = c
            .everyone
            .iter()
            .position(|p| c.old.find(p).is_none())
            .ok_or(InternalError::InternalInvariantFailed)?;
        let other_newcomer = c
            .new
            .iter()
            .find(|p| c.old.find(p).is_none() && !p.same_key(&c.everyone[newcomer_position]))
            .ok_or(InternalError::InternalInvariantFailed)?;
        for member in &harness.parties {
            member.party.start()?;
        }

        // A newcomer cannot deal: it is not on the old committee.
        let forged = Message::broadcast(
            other_newcomer,
            crate::messages::CommitteeScope::New,
            ReshareContent::Round1Commit {
                commitment: crate::commitment::commit(&mut rng, &[]).0,
            },
        );
        let newcomer = &harness.parties[newcomer_position].party;
        // Acks are addressed to the old committee and are dropped here
        let ack = Message::broadcast(
            other_newcomer,
            crate::messages::CommitteeScope::Old,
            ReshareContent::Round2Ack,
        );
        assert!(!newcomer.update(ack)?);
        assert_eq!(newcomer.round_number()?, 1);

        let err = newcomer
            .update(forged)
            .err()
            .ok_or(InternalError::InternalInvariantFailed)?;
        assert_eq!(err.culprits(), &[other_newcomer.clone()]);
        Ok(())
    }
}
