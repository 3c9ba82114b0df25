// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Addressed protocol messages.
//!
//! A [`Message`] pairs typed content with routing metadata. The routing is
//! filled in by the sender's engine (or by the transport for inbound bytes)
//! and decides delivery; the round number declared by the content is only
//! used to decide when a message may be admitted.

use crate::{errors::Result, protocol::PartyId};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt::Debug;

/// Content carried by the messages of one protocol.
///
/// Implemented by a closed enum per protocol, one variant per message kind.
pub trait MessageContent:
    Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Structural checks that do not depend on any round state, e.g. that
    /// byte strings and vectors are non-empty.
    fn validate_basic(&self) -> bool;

    /// The round whose bookkeeping this content belongs to.
    fn round_number(&self) -> u16;

    /// Name of the variant, for logs and errors.
    fn type_name(&self) -> &'static str;
}

/// Which committee a message is addressed to during resharing.
///
/// Single-committee protocols always use [`CommitteeScope::New`].
#[derive(
    displaydoc::Display, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum CommitteeScope {
    /// new committee
    #[default]
    New,
    /// old committee
    Old,
    /// old and new committees
    Both,
}

/// Routing metadata of a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRouting {
    /// The sender, with the index it holds in the committee it speaks for.
    pub from: PartyId,
    /// Recipients, or `None` for a broadcast.
    pub to: Option<Vec<PartyId>>,
    /// Whether the message was broadcast.
    pub is_broadcast: bool,
    /// Committee the message is addressed to.
    pub scope: CommitteeScope,
}

impl MessageRouting {
    /// Whether members of the old committee should receive the message.
    pub fn is_to_old_committee(&self) -> bool {
        matches!(self.scope, CommitteeScope::Old | CommitteeScope::Both)
    }

    /// Whether members of the new committee should receive the message.
    pub fn is_to_new_committee(&self) -> bool {
        matches!(self.scope, CommitteeScope::New | CommitteeScope::Both)
    }

    /// Whether the message is addressed to both committees.
    pub fn is_to_old_and_new_committees(&self) -> bool {
        self.scope == CommitteeScope::Both
    }
}

/// A routed protocol message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message<C> {
    routing: MessageRouting,
    content: C,
}

/// The part of a message that travels as bytes. Sender and broadcast flag
/// are supplied by the transport.
#[derive(Serialize, Deserialize)]
struct WireMessage<C> {
    scope: CommitteeScope,
    content: C,
}

impl<C: MessageContent> Message<C> {
    /// A broadcast to every party of `scope`.
    pub fn broadcast(from: &PartyId, scope: CommitteeScope, content: C) -> Self {
        Self {
            routing: MessageRouting {
                from: from.clone(),
                to: None,
                is_broadcast: true,
                scope,
            },
            content,
        }
    }

    /// A point-to-point message.
    pub fn direct(from: &PartyId, to: &PartyId, scope: CommitteeScope, content: C) -> Self {
        Self {
            routing: MessageRouting {
                from: from.clone(),
                to: Some(vec![to.clone()]),
                is_broadcast: false,
                scope,
            },
            content,
        }
    }

    /// Build a message from its parts.
    pub fn from_parts(routing: MessageRouting, content: C) -> Self {
        Self { routing, content }
    }

    /// Parse bytes produced by [`Message::to_wire_bytes`].
    ///
    /// `to` is `None` for broadcasts and the receiving party otherwise.
    pub fn from_wire_bytes(
        bytes: &[u8],
        from: &PartyId,
        to: Option<&PartyId>,
        is_broadcast: bool,
    ) -> Result<Self> {
        let wire: WireMessage<C> = deserialize!(bytes)?;
        Ok(Self {
            routing: MessageRouting {
                from: from.clone(),
                to: to.map(|p| vec![p.clone()]),
                is_broadcast,
                scope: wire.scope,
            },
            content: wire.content,
        })
    }

    /// Serialize the content and committee scope.
    pub fn to_wire_bytes(&self) -> Result<Vec<u8>> {
        serialize!(&WireMessage {
            scope: self.routing.scope,
            content: self.content.clone(),
        })
    }

    /// Routing metadata.
    pub fn routing(&self) -> &MessageRouting {
        &self.routing
    }

    /// The sender.
    pub fn from(&self) -> &PartyId {
        &self.routing.from
    }

    /// Whether the message was broadcast.
    pub fn is_broadcast(&self) -> bool {
        self.routing.is_broadcast
    }

    /// Typed content.
    pub fn content(&self) -> &C {
        &self.content
    }

    /// Round declared by the content.
    pub fn round_number(&self) -> u16 {
        self.content.round_number()
    }
}
