// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use super::{keyshare::KeygenOutput, messages::KeygenContent, TASK_NAME};
use crate::{
    commitment::HashDeCommitment,
    errors::{InternalError, ProtocolFault, Result},
    messages::{Message, MessageContent},
    parameters::Parameters,
    protocol::{PartyId, SessionContext},
    vss::{Share, Vs},
};
use k256::Scalar;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, warn};

/// Values this party computes for itself along the way. Dropped with the
/// state when the protocol ends.
#[derive(Default)]
pub(super) struct Temp {
    pub ui: Option<Scalar>,
    pub vs: Vs,
    pub shares: Vec<Share>,
    pub decommitment: Option<HashDeCommitment>,
    pub session: Option<SessionContext>,
}

/// State handed from round to round.
pub(super) struct KeygenState<R> {
    pub params: Parameters,
    pub ks: Vec<Scalar>,
    pub rng: R,
    pub temp: Temp,
    pub r1_commit: Vec<Option<Message<KeygenContent>>>,
    pub r2_share: Vec<Option<Message<KeygenContent>>>,
    pub r2_decommit: Vec<Option<Message<KeygenContent>>>,
    out: UnboundedSender<Message<KeygenContent>>,
    end: UnboundedSender<KeygenOutput>,
}

/// Keep the first well-routed message per slot. A message that arrived
/// with the wrong routing never fills its slot, so it may be replaced.
fn store_once(slot: &mut Option<Message<KeygenContent>>, msg: Message<KeygenContent>) {
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

impl<R> KeygenState<R> {
    pub(super) fn new(
        params: Parameters,
        rng: R,
        out: UnboundedSender<Message<KeygenContent>>,
        end: UnboundedSender<KeygenOutput>,
    ) -> Result<Self> {
        let n = params.party_count();
        let ks = params.parties().keys()?;
        Ok(Self {
            params,
            ks,
            rng,
            temp: Temp::default(),
            r1_commit: vec![None; n],
            r2_share: vec![None; n],
            r2_decommit: vec![None; n],
            out,
            end,
        })
    }

    pub(super) fn index(&self) -> usize {
        self.params.index()
    }

    pub(super) fn party_id(&self) -> &PartyId {
        self.params.party_id()
    }

    /// All participants in index order.
    pub(super) fn parties(&self) -> Vec<PartyId> {
        self.params.parties().iter().cloned().collect()
    }

    /// Route a message to the slot of its sender.
    pub(super) fn store(&mut self, msg: Message<KeygenContent>) -> Result<()> {
        let from = msg.from();
        if !self.params.parties().is_member_at_index(from) {
            error!(from = %from, "Sender is not a participant of this run");
            return Err(ProtocolFault::new(
                TASK_NAME,
                msg.round_number(),
                vec![from.clone()],
                "sender is not a participant",
            )
            .into());
        }
        let j = from.index().ok_or(InternalError::InternalInvariantFailed)?;
        match msg.content() {
            KeygenContent::Round1Commit { .. } => store_once(&mut self.r1_commit[j], msg),
            KeygenContent::Round2Share { .. } => store_once(&mut self.r2_share[j], msg),
            KeygenContent::Round2Decommit { .. } => store_once(&mut self.r2_decommit[j], msg),
        }
        Ok(())
    }

    pub(super) fn send(&self, msg: Message<KeygenContent>) -> Result<()> {
        self.out.send(msg).map_err(|_| {
            error!("Outbound message channel is closed");
            InternalError::InternalInvariantFailed
        })
    }

    pub(super) fn finish(&self, output: KeygenOutput) -> Result<()> {
        self.end.send(output).map_err(|_| {
            error!("Output channel is closed");
            InternalError::InternalInvariantFailed
        })
    }
}
