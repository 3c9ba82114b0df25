// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The engine that drives one participant through a chain of rounds.
//!
//! A [`Party`] is passive. The host calls [`Party::start`] once and then
//! feeds every inbound message to [`Party::update`]. Outbound messages and
//! the final output are pushed by the rounds into the channels handed to the
//! protocol constructor, so the engine never blocks on a consumer.
//!
//! All mutable state sits behind one lock. A single delivery may complete
//! several rounds in a row; the engine handles this with a loop that takes
//! the lock once per round transition.

use crate::{
    errors::{CallerError, InternalError, ProtocolFault, Result},
    messages::{Message, MessageContent},
    protocol::PartyId,
    round::Round,
};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, instrument, warn};

enum Stage<C: MessageContent> {
    NotStarted(Box<dyn Round<C>>),
    Active(Box<dyn Round<C>>),
    Finished,
    Failed,
}

/// One participant of a protocol run.
pub struct Party<C: MessageContent> {
    task: &'static str,
    party_id: PartyId,
    max_sender_count: usize,
    stage: Mutex<Stage<C>>,
}

impl<C: MessageContent> Party<C> {
    /// Wrap the first round of a protocol.
    ///
    /// `max_sender_count` bounds the sender indices this party accepts: the
    /// size of the largest committee taking part.
    pub fn new(
        task: &'static str,
        party_id: PartyId,
        max_sender_count: usize,
        first_round: Box<dyn Round<C>>,
    ) -> Self {
        Self {
            task,
            party_id,
            max_sender_count,
            stage: Mutex::new(Stage::NotStarted(first_round)),
        }
    }

    /// This party's id.
    pub fn party_id(&self) -> &PartyId {
        &self.party_id
    }

    fn lock(&self) -> Result<MutexGuard<'_, Stage<C>>> {
        self.stage.lock().map_err(|_| {
            error!("Party state lock was poisoned");
            InternalError::InternalInvariantFailed
        })
    }

    /// Enter the first round.
    #[instrument(skip_all, fields(task = self.task, party = %self.party_id), err(Debug))]
    pub fn start(&self) -> Result<()> {
        {
            let mut stage = self.lock()?;
            let mut round = match std::mem::replace(&mut *stage, Stage::Failed) {
                Stage::NotStarted(round) => round,
                other => {
                    *stage = other;
                    error!("Tried to start a party twice");
                    Err(CallerError::AlreadyStarted)?
                }
            };
            info!("Starting protocol");
            round.prepare()?;
            round.start()?;
            *stage = Stage::Active(round);
        }
        // The first round may already be complete, e.g. when it expects no
        // messages.
        let _ = self.advance()?;
        Ok(())
    }

    /// Process one inbound message.
    ///
    /// Returns whether the message made the party advance at least one
    /// round. Messages for rounds that are not yet active are kept and used
    /// once their round is entered.
    #[instrument(skip_all, fields(task = self.task, party = %self.party_id), err(Debug))]
    pub fn update(&self, msg: Message<C>) -> Result<bool> {
        self.validate(&msg)?;
        self.store_message(msg)?;
        self.advance()
    }

    /// Parse wire bytes from `from` and process them as in [`Party::update`].
    pub fn update_from_bytes(&self, bytes: &[u8], from: &PartyId, is_broadcast: bool) -> Result<bool> {
        let to = if is_broadcast {
            None
        } else {
            Some(&self.party_id)
        };
        let msg = Message::from_wire_bytes(bytes, from, to, is_broadcast)?;
        self.update(msg)
    }

    /// Store a message in the active round without advancing.
    ///
    /// Lets a transport validate messages before calling
    /// [`Party::update`]. Storing is idempotent per sender and slot.
    pub fn store_message(&self, msg: Message<C>) -> Result<()> {
        let mut stage = self.lock()?;
        match &mut *stage {
            Stage::Active(round) => {
                debug!(
                    content = msg.content().type_name(),
                    from = %msg.from(),
                    "Storing message"
                );
                round.store_message(msg)
            }
            Stage::NotStarted(_) => Err(CallerError::NotStarted)?,
            Stage::Finished | Stage::Failed => Err(CallerError::ProtocolAlreadyTerminated)?,
        }
    }

    /// Parties whose messages the active round is still waiting for.
    pub fn waiting_for(&self) -> Result<Vec<PartyId>> {
        let stage = self.lock()?;
        Ok(match &*stage {
            Stage::Active(round) | Stage::NotStarted(round) => round.waiting_for(),
            Stage::Finished | Stage::Failed => vec![],
        })
    }

    /// Number of the active round.
    pub fn round_number(&self) -> Result<u16> {
        let stage = self.lock()?;
        match &*stage {
            Stage::Active(round) => Ok(round.round_number()),
            Stage::NotStarted(_) => Err(CallerError::NotStarted)?,
            Stage::Finished | Stage::Failed => Err(CallerError::ProtocolAlreadyTerminated)?,
        }
    }

    /// Whether the terminal round has completed.
    pub fn is_finished(&self) -> Result<bool> {
        Ok(matches!(&*self.lock()?, Stage::Finished))
    }

    fn validate(&self, msg: &Message<C>) -> Result<()> {
        let content = msg.content();
        if !content.validate_basic() {
            warn!(
                content = content.type_name(),
                from = %msg.from(),
                "Message failed basic validation"
            );
            Err(CallerError::InvalidMessage(content.type_name().to_string()))?
        }
        let from = msg.from();
        if !from.is_well_formed() {
            warn!(from = %from, "Message sender is malformed");
            Err(CallerError::MalformedPartyId(from.to_string()))?
        }
        if from.index().map_or(true, |i| i >= self.max_sender_count) {
            error!(from = %from, "Message sender index is out of range");
            Err(ProtocolFault::new(
                self.task,
                self.fault_round(msg)?,
                vec![from.clone()],
                "sender index out of range",
            ))?
        }
        if from.same_key(&self.party_id) {
            error!(from = %from, "Received a message from ourselves");
            Err(ProtocolFault::new(
                self.task,
                self.fault_round(msg)?,
                vec![from.clone()],
                "message appears to be sent by the receiving party",
            ))?
        }
        Ok(())
    }

    /// Round to blame a sender fault on: the active one, or the round the
    /// message claims once the run is over.
    fn fault_round(&self, msg: &Message<C>) -> Result<u16> {
        let stage = self.lock()?;
        Ok(match &*stage {
            Stage::Active(round) | Stage::NotStarted(round) => round.round_number(),
            Stage::Finished | Stage::Failed => msg.round_number(),
        })
    }

    /// Advance through every round that can proceed.
    fn advance(&self) -> Result<bool> {
        let mut advanced = false;
        loop {
            let mut stage = self.lock()?;
            let mut round = match std::mem::replace(&mut *stage, Stage::Failed) {
                Stage::Active(round) => round,
                other => {
                    *stage = other;
                    return Ok(advanced);
                }
            };
            // A failed round leaves the stage as `Failed`.
            if !round.update()? {
                *stage = Stage::Active(round);
                return Ok(advanced);
            }
            let finished = round.round_number();
            match round.next_round() {
                None => {
                    info!(round = finished, "Protocol finished");
                    *stage = Stage::Finished;
                    return Ok(true);
                }
                Some(mut next) => {
                    next.start()?;
                    *stage = Stage::Active(next);
                    advanced = true;
                }
            }
        }
    }
}
