// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    curve::CurvePoint,
    errors::{CallerError, Result},
    keygen::KeygenOutput,
    parameters::ReSharingParameters,
    protocol::SortedPartyIds,
    vss::lagrange_coefficient,
};
use k256::Scalar;
use tracing::error;

/// What a party brings into a resharing run.
#[derive(Clone)]
pub struct ReshareInput {
    public_key: CurvePoint,
    old_public_shares: Vec<CurvePoint>,
    secret_share: Option<Scalar>,
}

impl std::fmt::Debug for ReshareInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReshareInput")
            .field("public_key", &self.public_key)
            .field("old_public_shares", &self.old_public_shares)
            .field("secret_share", &"[redacted]")
            .finish()
    }
}

impl ReshareInput {
    /// Input for an old committee member holding `output`.
    ///
    /// `old_committee` is the quorum of key holders that deals the new
    /// shares.
    pub fn from_keygen(output: &KeygenOutput, old_committee: &SortedPartyIds) -> Result<Self> {
        let old_public_shares = old_committee
            .iter()
            .map(|p| {
                output.public_share_of(p).ok_or_else(|| {
                    error!("Old committee member {p} does not hold a key share");
                    CallerError::BadInput(format!("{p} does not hold a key share"))
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            public_key: *output.public_key(),
            old_public_shares,
            secret_share: Some(*output.secret_share()),
        })
    }

    /// Input for a party that only joins the new committee.
    ///
    /// `old_public_shares` are the public shares of the old committee
    /// members, in old committee order.
    pub fn for_new_member(public_key: CurvePoint, old_public_shares: Vec<CurvePoint>) -> Self {
        Self {
            public_key,
            old_public_shares,
            secret_share: None,
        }
    }

    /// The group public key being reshared.
    pub fn public_key(&self) -> &CurvePoint {
        &self.public_key
    }

    /// Public shares of the old committee, in old committee order.
    pub fn old_public_shares(&self) -> &[CurvePoint] {
        &self.old_public_shares
    }

    pub(super) fn secret_share(&self) -> Option<&Scalar> {
        self.secret_share.as_ref()
    }

    /// Check the input against the committees of `params`.
    pub(super) fn validate(&self, params: &ReSharingParameters) -> Result<()> {
        let old = params.old_parties();
        if self.old_public_shares.len() != old.len() {
            error!(
                "Expected {} old public shares, got {}",
                old.len(),
                self.old_public_shares.len()
            );
            Err(CallerError::BadInput(
                "one public share per old committee member is required".into(),
            ))?
        }
        let ks = old.keys()?;
        let mut sum = CurvePoint::IDENTITY;
        for (j, share) in self.old_public_shares.iter().enumerate() {
            sum = sum + share.multiply_by_scalar(&lagrange_coefficient(&ks, j)?);
        }
        if sum != self.public_key {
            error!("Old public shares do not interpolate to the public key");
            Err(CallerError::BadInput(
                "old public shares do not match the public key".into(),
            ))?
        }

        if let Some(old_id) = params.old_party_id() {
            let index = old_id.index().ok_or_else(|| {
                CallerError::BadInput("old committee id carries no index".into())
            })?;
            let secret = self.secret_share.ok_or_else(|| {
                error!("Old committee member has no secret share");
                CallerError::BadInput("old committee members need a secret share".into())
            })?;
            if CurvePoint::scale_generator(&secret) != self.old_public_shares[index] {
                error!("Secret share does not match its public share");
                Err(CallerError::BadInput(
                    "secret share does not match its public share".into(),
                ))?
            }
        }
        Ok(())
    }
}

/// The result of a resharing run.
#[derive(Debug, Clone)]
pub enum ReshareOutput {
    /// A new key share, for members of the new committee.
    Share(KeygenOutput),
    /// The old share is no longer in use, for members that only sat on the
    /// old committee.
    Retired,
}

impl ReshareOutput {
    /// The new key share, if any.
    pub fn share(&self) -> Option<&KeygenOutput> {
        match self {
            ReshareOutput::Share(output) => Some(output),
            ReshareOutput::Retired => None,
        }
    }
}
