// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    curve::CurvePoint,
    errors::{CallerError, InternalError, Result},
    protocol::{PartyId, SortedPartyIds},
    vss,
};
use k256::Scalar;
use serde::{Deserialize, Serialize};
use tracing::error;

/// The key-share bundle a party holds after key generation or resharing.
///
/// `xi` is this party's Shamir share of the group secret; `big_xj[j]` is
/// `g^{x_j}` for every participant `j` and `public_key` is the group key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeygenOutput {
    threshold: usize,
    parties: SortedPartyIds,
    index: usize,
    xi: Scalar,
    big_xj: Vec<CurvePoint>,
    public_key: CurvePoint,
}

impl std::fmt::Debug for KeygenOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeygenOutput")
            .field("threshold", &self.threshold)
            .field("parties", &self.parties)
            .field("index", &self.index)
            .field("xi", &"[redacted]")
            .field("big_xj", &self.big_xj)
            .field("public_key", &self.public_key)
            .finish()
    }
}

impl KeygenOutput {
    pub(crate) fn new(
        threshold: usize,
        parties: SortedPartyIds,
        index: usize,
        xi: Scalar,
        big_xj: Vec<CurvePoint>,
        public_key: CurvePoint,
    ) -> Result<Self> {
        if big_xj.len() != parties.len() || index >= parties.len() {
            error!("Key share bundle has inconsistent lengths");
            return Err(InternalError::InternalInvariantFailed);
        }
        if CurvePoint::scale_generator(&xi) != big_xj[index] {
            error!("Secret share does not match its public share");
            return Err(InternalError::InternalInvariantFailed);
        }
        Ok(Self {
            threshold,
            parties,
            index,
            xi,
            big_xj,
            public_key,
        })
    }

    /// Degree of the sharing.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Holders of the shares.
    pub fn parties(&self) -> &SortedPartyIds {
        &self.parties
    }

    /// This party's id.
    pub fn party_id(&self) -> Option<&PartyId> {
        self.parties.get(self.index)
    }

    /// This party's secret share.
    pub fn secret_share(&self) -> &Scalar {
        &self.xi
    }

    /// Public shares `g^{x_j}`, by index.
    pub fn public_shares(&self) -> &[CurvePoint] {
        &self.big_xj
    }

    /// The public share of `party`, matched by key.
    pub fn public_share_of(&self, party: &PartyId) -> Option<CurvePoint> {
        self.parties
            .find(party)
            .and_then(PartyId::index)
            .and_then(|j| self.big_xj.get(j).copied())
    }

    /// The group public key.
    pub fn public_key(&self) -> &CurvePoint {
        &self.public_key
    }

    /// Additive signing weight of this party within `quorum`, together with
    /// the weighted public shares of every quorum member in quorum order.
    ///
    /// The quorum must contain this party and at least `threshold + 1`
    /// members of the original participant set.
    pub fn signing_weight(&self, quorum: &SortedPartyIds) -> Result<(Scalar, Vec<CurvePoint>)> {
        if quorum.len() < self.threshold + 1 {
            return Err(InternalError::InsufficientShares {
                required: self.threshold + 1,
                got: quorum.len(),
            });
        }
        let own = self.parties.get(self.index).ok_or(InternalError::InternalInvariantFailed)?;
        let position = quorum
            .find(own)
            .and_then(PartyId::index)
            .ok_or_else(|| CallerError::BadInput("quorum does not contain this party".into()))?;
        let big_xs = quorum
            .iter()
            .map(|p| {
                self.public_share_of(p).ok_or_else(|| {
                    error!("Quorum member {p} did not take part in key generation");
                    InternalError::from(CallerError::BadInput(format!(
                        "{p} holds no share of this key"
                    )))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        vss::prepare_for_signing(position, &self.xi, &quorum.keys()?, &big_xs)
    }
}
