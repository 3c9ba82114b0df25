// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use super::{
    messages::ReshareContent,
    output::{ReshareInput, ReshareOutput},
    TASK_NAME,
};
use crate::{
    commitment::HashDeCommitment,
    errors::{InternalError, ProtocolFault, Result},
    messages::{Message, MessageContent},
    parameters::ReSharingParameters,
    protocol::{PartyId, SortedPartyIds},
    vss::{Share, Vs},
};
use k256::Scalar;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, warn};

type Slots = Vec<Option<Message<ReshareContent>>>;

/// Dealer-side values of an old committee member.
#[derive(Default)]
pub(super) struct Temp {
    pub vs: Vs,
    pub shares: Vec<Share>,
    pub decommitment: Option<HashDeCommitment>,
}

pub(super) struct ReshareState<R> {
    pub params: ReSharingParameters,
    pub input: ReshareInput,
    pub old_ks: Vec<Scalar>,
    pub new_ks: Vec<Scalar>,
    pub rng: R,
    pub temp: Temp,
    /// Indexed by old committee position.
    pub r1_commit: Slots,
    /// Indexed by new committee position.
    pub r2_ack: Slots,
    /// Indexed by old committee position.
    pub r3_share: Slots,
    /// Indexed by old committee position.
    pub r3_decommit: Slots,
    out: UnboundedSender<Message<ReshareContent>>,
    end: UnboundedSender<ReshareOutput>,
}

/// Keep the first well-routed message per slot. A message that arrived
/// with the wrong routing never fills its slot, so it may be replaced.
fn store_once(slot: &mut Option<Message<ReshareContent>>, msg: Message<ReshareContent>) {
    let held_ok = slot
        .as_ref()
        .map_or(false, |held| held.is_broadcast() == held.content().expects_broadcast());
    if held_ok {
        warn!(
            from = %msg.from(),
            content = msg.content().type_name(),
            "Ignoring repeated message"
        );
        return;
    }
    if slot.is_some() {
        debug!(from = %msg.from(), "Replacing misrouted message");
    }
    *slot = Some(msg);
}

fn sender_index(committee: &SortedPartyIds, msg: &Message<ReshareContent>) -> Result<usize> {
    let from = msg.from();
    if !committee.is_member_at_index(from) {
        error!(from = %from, content = msg.content().type_name(), "Sender is not on the committee it speaks for");
        return Err(ProtocolFault::new(
            TASK_NAME,
            msg.round_number(),
            vec![from.clone()],
            "sender is not a member of the sending committee",
        )
        .into());
    }
    from.index().ok_or(InternalError::InternalInvariantFailed)
}

impl<R> ReshareState<R> {
    pub(super) fn new(
        params: ReSharingParameters,
        input: ReshareInput,
        rng: R,
        out: UnboundedSender<Message<ReshareContent>>,
        end: UnboundedSender<ReshareOutput>,
    ) -> Result<Self> {
        input.validate(&params)?;
        let old_n = params.old_party_count();
        let new_n = params.new_party_count();
        let old_ks = params.old_parties().keys()?;
        let new_ks = params.new_parties().keys()?;
        Ok(Self {
            params,
            input,
            old_ks,
            new_ks,
            rng,
            temp: Temp::default(),
            r1_commit: vec![None; old_n],
            r2_ack: vec![None; new_n],
            r3_share: vec![None; old_n],
            r3_decommit: vec![None; old_n],
            out,
            end,
        })
    }

    pub(super) fn party_id(&self) -> &PartyId {
        self.params.party_id()
    }

    /// Position in the old committee, if a member.
    pub(super) fn old_index(&self) -> Option<usize> {
        self.params.old_party_id().and_then(PartyId::index)
    }

    /// Position in the new committee, if a member.
    pub(super) fn new_index(&self) -> Option<usize> {
        self.params.new_party_id().and_then(PartyId::index)
    }

    pub(super) fn old_parties(&self) -> Vec<PartyId> {
        self.params.old_parties().iter().cloned().collect()
    }

    pub(super) fn new_parties(&self) -> Vec<PartyId> {
        self.params.new_parties().iter().cloned().collect()
    }

    /// Route a message to the slot of its sender. Messages for a committee
    /// this party is not on are dropped.
    pub(super) fn store(&mut self, msg: Message<ReshareContent>) -> Result<()> {
        let for_new = self.params.is_new_committee();
        let for_old = self.params.is_old_committee();
        match msg.content() {
            ReshareContent::Round1Commit { .. } if for_new => {
                let j = sender_index(self.params.old_parties(), &msg)?;
                store_once(&mut self.r1_commit[j], msg);
            }
            ReshareContent::Round2Ack if for_old => {
                let j = sender_index(self.params.new_parties(), &msg)?;
                store_once(&mut self.r2_ack[j], msg);
            }
            ReshareContent::Round3Share { .. } if for_new => {
                let j = sender_index(self.params.old_parties(), &msg)?;
                store_once(&mut self.r3_share[j], msg);
            }
            ReshareContent::Round3Decommit { .. } if for_new => {
                let j = sender_index(self.params.old_parties(), &msg)?;
                store_once(&mut self.r3_decommit[j], msg);
            }
            content => {
                debug!(
                    content = content.type_name(),
                    from = %msg.from(),
                    "Ignoring message for the other committee"
                );
            }
        }
        Ok(())
    }

    pub(super) fn send(&self, msg: Message<ReshareContent>) -> Result<()> {
        self.out.send(msg).map_err(|_| {
            error!("Outbound message channel is closed");
            InternalError::InternalInvariantFailed
        })
    }

    pub(super) fn finish(&self, output: ReshareOutput) -> Result<()> {
        self.end.send(output).map_err(|_| {
            error!("Output channel is closed");
            InternalError::InternalInvariantFailed
        })
    }
}
