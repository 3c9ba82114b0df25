// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Immutable per-run configuration.

use crate::{
    curve::CurveParams,
    errors::{CallerError, Result},
    protocol::{PartyId, SortedPartyIds},
};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Number of attempts made by rejection sampling before giving up.
pub(crate) const CRYPTOGRAPHIC_RETRY_MAX: usize = 500usize;

/// Selects how Fiat-Shamir challenges are derived.
///
/// Proof bytes do not record the version they were made under, so every
/// party in a run must be configured with the same one.
#[derive(
    displaydoc::Display, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum ProtocolVersion {
    /// v1 (single digest reduced modulo the group order)
    V1,
    /// v2 (digest rejection-sampled below the group order)
    #[default]
    V2,
}

/// Configuration shared by every round of a single-committee protocol.
#[derive(Clone, Debug)]
pub struct Parameters {
    curve: CurveParams,
    parties: SortedPartyIds,
    party_id: PartyId,
    party_count: usize,
    threshold: usize,
    version: ProtocolVersion,
}

impl Parameters {
    /// Build parameters for the party that carries the same key as
    /// `party_id`.
    ///
    /// Requires `0 < threshold < parties.len()`.
    pub fn new(
        curve: &CurveParams,
        parties: SortedPartyIds,
        party_id: &PartyId,
        threshold: usize,
        version: ProtocolVersion,
    ) -> Result<Self> {
        let party_count = parties.len();
        check_threshold(threshold, party_count)?;
        let party_id = parties.find(party_id).cloned().ok_or_else(|| {
            error!("Party {party_id} is not in the participant list");
            CallerError::BadInput(format!("party {party_id} is not a participant"))
        })?;
        Ok(Self {
            curve: curve.clone(),
            parties,
            party_id,
            party_count,
            threshold,
            version,
        })
    }

    /// The curve parameters.
    pub fn curve(&self) -> &CurveParams {
        &self.curve
    }

    /// All participants, sorted.
    pub fn parties(&self) -> &SortedPartyIds {
        &self.parties
    }

    /// This party, with its index assigned.
    pub fn party_id(&self) -> &PartyId {
        &self.party_id
    }

    /// `n`.
    pub fn party_count(&self) -> usize {
        self.party_count
    }

    /// `t`; reconstruction requires `t + 1` shares.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Challenge derivation version.
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub(crate) fn index(&self) -> usize {
        // Set by SortedPartyIds; `find` returns the sorted copy.
        self.party_id.index().unwrap_or_default()
    }
}

fn check_threshold(threshold: usize, party_count: usize) -> Result<()> {
    if threshold == 0 || threshold >= party_count {
        error!("Threshold {threshold} is invalid for {party_count} parties");
        Err(CallerError::BadInput(format!(
            "threshold must satisfy 0 < t < n, got t = {threshold}, n = {party_count}"
        )))?
    }
    Ok(())
}

/// Configuration for moving a shared secret from an old committee to a new
/// one.
///
/// This party may sit in either committee or in both. In each committee it
/// is identified by the same key but carries that committee's index.
#[derive(Clone, Debug)]
pub struct ReSharingParameters {
    curve: CurveParams,
    old_parties: SortedPartyIds,
    new_parties: SortedPartyIds,
    old_threshold: usize,
    new_threshold: usize,
    party_id: PartyId,
    old_party_id: Option<PartyId>,
    new_party_id: Option<PartyId>,
    version: ProtocolVersion,
}

impl ReSharingParameters {
    /// Build resharing parameters.
    ///
    /// The old committee is the quorum that holds the current secret and
    /// must have at least `old_threshold + 1` members. The new committee must
    /// satisfy `0 < new_threshold < new_parties.len()`.
    pub fn new(
        curve: &CurveParams,
        old_parties: SortedPartyIds,
        new_parties: SortedPartyIds,
        party_id: &PartyId,
        old_threshold: usize,
        new_threshold: usize,
        version: ProtocolVersion,
    ) -> Result<Self> {
        if old_parties.len() <= old_threshold {
            error!(
                "Old committee has {} members, needs at least {}",
                old_parties.len(),
                old_threshold + 1
            );
            Err(CallerError::BadInput(
                "old committee is smaller than its threshold quorum".into(),
            ))?
        }
        check_threshold(new_threshold, new_parties.len())?;

        let old_party_id = old_parties.find(party_id).cloned();
        let new_party_id = new_parties.find(party_id).cloned();
        let own_id = old_party_id
            .clone()
            .or_else(|| new_party_id.clone())
            .ok_or_else(|| {
                error!("Party {party_id} is in neither committee");
                CallerError::BadInput(format!("party {party_id} is in neither committee"))
            })?;
        Ok(Self {
            curve: curve.clone(),
            party_id: own_id,
            old_parties,
            new_parties,
            old_threshold,
            new_threshold,
            old_party_id,
            new_party_id,
            version,
        })
    }

    /// The curve parameters.
    pub fn curve(&self) -> &CurveParams {
        &self.curve
    }

    /// Current holders of the secret.
    pub fn old_parties(&self) -> &SortedPartyIds {
        &self.old_parties
    }

    /// Future holders of the secret.
    pub fn new_parties(&self) -> &SortedPartyIds {
        &self.new_parties
    }

    /// Size of the old committee.
    pub fn old_party_count(&self) -> usize {
        self.old_parties.len()
    }

    /// Size of the new committee.
    pub fn new_party_count(&self) -> usize {
        self.new_parties.len()
    }

    /// Threshold of the old sharing.
    pub fn old_threshold(&self) -> usize {
        self.old_threshold
    }

    /// Threshold of the new sharing.
    pub fn new_threshold(&self) -> usize {
        self.new_threshold
    }

    /// This party's id within the old committee.
    pub fn old_party_id(&self) -> Option<&PartyId> {
        self.old_party_id.as_ref()
    }

    /// This party's id within the new committee.
    pub fn new_party_id(&self) -> Option<&PartyId> {
        self.new_party_id.as_ref()
    }

    /// This party's id in whichever committee it belongs to, old first.
    pub fn party_id(&self) -> &PartyId {
        &self.party_id
    }

    /// Whether this party holds a share of the current secret.
    pub fn is_old_committee(&self) -> bool {
        self.old_party_id.is_some()
    }

    /// Whether this party receives a share of the new secret.
    pub fn is_new_committee(&self) -> bool {
        self.new_party_id.is_some()
    }

    /// Challenge derivation version.
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }
}
