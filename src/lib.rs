// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Round-based building blocks for threshold signature protocols.
//!
//! In a threshold scheme, `n` parties each hold a share of a secret key such
//! that any `t + 1` of them can use it while any `t` learn nothing. This
//! crate provides the machinery such protocols are built from:
//!
//! - a [`Party`] engine that drives one participant through a chain of
//!   rounds, accepting messages in any order and advancing as soon as a
//!   round has everything it needs;
//! - an [`OrderedParty`] that holds back messages for future rounds;
//! - Feldman verifiable secret sharing ([`vss`]);
//! - hash commitments ([`commitment`]);
//! - a Schnorr proof of knowledge of a discrete logarithm ([`zkp::pisch`]),
//!   with two challenge derivations selected by [`ProtocolVersion`];
//! - two complete protocols: distributed key generation ([`keygen`]) and
//!   moving a key to a new committee ([`reshare`]).
//!
//! Communication is left to the caller. Each protocol constructor takes two
//! channel senders: outbound messages appear on one, the final output on the
//! other. The caller delivers every outbound message to the parties it is
//! addressed to by calling [`Party::update`] or [`Party::update_from_bytes`].
//! When a peer misbehaves, the protocol stops with an error that names it;
//! see [`errors::InternalError::culprits`].
//!
//! Everything runs over [secp256k1](https://en.bitcoin.it/wiki/Secp256k1).

#![allow(non_snake_case)]
#![warn(missing_docs)]

#[macro_use]
pub mod errors;

pub mod commitment;
pub mod curve;
pub mod keygen;
mod message_queue;
pub mod messages;
pub mod parameters;
pub mod party;
pub mod protocol;
pub mod reshare;
pub mod round;
mod utils;
pub mod vss;
pub mod zkp;

pub use curve::{default_registry, CurveParams, CurvePoint, CurveRegistry};
pub use message_queue::OrderedParty;
pub use messages::{CommitteeScope, Message, MessageContent, MessageRouting};
pub use parameters::{Parameters, ProtocolVersion, ReSharingParameters};
pub use party::Party;
pub use protocol::{PartyId, SessionContext, SortedPartyIds};
