// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The `MessageQueue` type for holding back messages from future rounds.
//!
//! [`MessageQueue`] keeps messages sorted by their declared round number.
//! [`OrderedParty`] puts one in front of a [`Party`] for protocols that must
//! only see messages of the round they are in: messages for later rounds are
//! held until the party gets there, messages for earlier rounds are dropped.

use crate::{
    errors::{InternalError, Result},
    messages::{Message, MessageContent},
    party::Party,
    protocol::PartyId,
};
use std::sync::Mutex;
use tracing::{debug, error};

/// Messages sorted by round number, oldest round first.
#[derive(Debug)]
pub(crate) struct MessageQueue<C>(Vec<Message<C>>);

impl<C: MessageContent> MessageQueue<C> {
    pub(crate) fn new() -> Self {
        Self(Vec::new())
    }

    /// Insert `message` after every message of the same or an earlier round.
    pub(crate) fn store(&mut self, message: Message<C>) {
        let round = message.round_number();
        let position = self
            .0
            .iter()
            .position(|m| m.round_number() > round)
            .unwrap_or(self.0.len());
        self.0.insert(position, message);
    }

    /// Round number of the head, if any.
    pub(crate) fn peek_round(&self) -> Option<u16> {
        self.0.first().map(Message::round_number)
    }

    /// Remove and return the head.
    pub(crate) fn pop(&mut self) -> Option<Message<C>> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.remove(0))
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}

/// A [`Party`] that only processes messages of its current round.
pub struct OrderedParty<C: MessageContent> {
    party: Party<C>,
    queue: Mutex<MessageQueue<C>>,
}

impl<C: MessageContent> OrderedParty<C> {
    /// Wrap `party`.
    pub fn new(party: Party<C>) -> Self {
        Self {
            party,
            queue: Mutex::new(MessageQueue::new()),
        }
    }

    /// The wrapped party.
    pub fn party(&self) -> &Party<C> {
        &self.party
    }

    /// This party's id.
    pub fn party_id(&self) -> &PartyId {
        self.party.party_id()
    }

    /// Start the wrapped party.
    pub fn start(&self) -> Result<()> {
        self.party.start()
    }

    /// Number of messages held back.
    pub fn pending(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MessageQueue<C>>> {
        self.queue.lock().map_err(|_| {
            error!("Message queue lock was poisoned");
            InternalError::InternalInvariantFailed
        })
    }

    /// Process `msg` if it belongs to the current round, hold it if it is
    /// early and drop it if it is late. After processing, any held messages
    /// that now match the current round are processed too.
    pub fn update_ordered(&self, msg: Message<C>) -> Result<bool> {
        let mut queue = self.lock()?;
        let expected = self.party.round_number()?;
        let round = msg.round_number();
        if round > expected {
            debug!(round, expected, "Holding back early message");
            queue.store(msg);
            return Ok(false);
        }
        if round < expected {
            debug!(round, expected, "Dropping stale message");
            return Ok(false);
        }

        let mut advanced = self.party.update(msg)?;
        while let Some(head) = queue.peek_round() {
            if self.party.is_finished()? {
                break;
            }
            let expected = self.party.round_number()?;
            if head > expected {
                break;
            }
            let Some(next) = queue.pop() else { break };
            if head < expected {
                debug!(round = head, expected, "Dropping stale message");
                continue;
            }
            advanced |= self.party.update(next)?;
        }
        Ok(advanced)
    }
}
