// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Hash-based commit/reveal over a sequence of integers.
//!
//! A commitment to `values` is `C = H(r, values...)` for a fresh 256-bit
//! blinding value `r`; the decommitment is `D = [r, values...]`. The hash is
//! SHA-256 under a domain-separation tag, with every element length-prefixed
//! so that distinct sequences never hash the same byte string.

use crate::{
    curve::CurvePoint,
    errors::{InternalError, Result},
};
use k256::elliptic_curve::subtle::ConstantTimeEq;
use num_bigint::BigUint;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::error;

const COMMITMENT_DOMAIN: &[u8] = b"tss-rounds hash commitment v1";

/// The commitment `C`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashCommitment([u8; 32]);

impl HashCommitment {
    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// The decommitment `D = [r, values...]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashDeCommitment(Vec<BigUint>);

impl HashDeCommitment {
    /// Number of committed values, excluding the blinding value.
    pub fn value_count(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    #[cfg(test)]
    pub(crate) fn values_mut(&mut self) -> &mut Vec<BigUint> {
        &mut self.0
    }
}

fn hash(elements: &[BigUint]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(COMMITMENT_DOMAIN);
    hasher.update((elements.len() as u64).to_be_bytes());
    for element in elements {
        let bytes = element.to_bytes_be();
        hasher.update((bytes.len() as u64).to_be_bytes());
        hasher.update(&bytes);
    }
    hasher.finalize().into()
}

/// Commit to `values`.
pub fn commit<R: RngCore + CryptoRng>(
    rng: &mut R,
    values: &[BigUint],
) -> (HashCommitment, HashDeCommitment) {
    let mut r = [0u8; 32];
    rng.fill_bytes(&mut r);
    let mut decommitment = Vec::with_capacity(values.len() + 1);
    decommitment.push(BigUint::from_bytes_be(&r));
    decommitment.extend_from_slice(values);
    let commitment = HashCommitment(hash(&decommitment));
    (commitment, HashDeCommitment(decommitment))
}

/// Open a commitment.
///
/// Returns the committed values if `decommitment` opens `commitment`, and
/// `None` otherwise. A `None` proves that whoever sent the pair misbehaved.
pub fn decommit(
    commitment: &HashCommitment,
    decommitment: &HashDeCommitment,
) -> Option<Vec<BigUint>> {
    if decommitment.0.is_empty() {
        return None;
    }
    let digest = hash(&decommitment.0);
    if bool::from(commitment.0[..].ct_eq(&digest[..])) {
        Some(decommitment.0[1..].to_vec())
    } else {
        None
    }
}

/// Flatten points into their affine coordinates `[x0, y0, x1, y1, ...]`.
pub(crate) fn flatten_points(points: &[CurvePoint]) -> Result<Vec<BigUint>> {
    let mut flat = Vec::with_capacity(points.len() * 2);
    for point in points {
        let (x, y) = point.coordinates().ok_or_else(|| {
            error!("Tried to commit to the point at infinity");
            InternalError::InternalInvariantFailed
        })?;
        flat.push(x);
        flat.push(y);
    }
    Ok(flat)
}

/// Inverse of [`flatten_points`]. Fails on odd length or off-curve points.
pub(crate) fn unflatten_points(flat: &[BigUint]) -> Result<Vec<CurvePoint>> {
    if flat.len() % 2 != 0 {
        return arg_err!("flattened point list has odd length");
    }
    flat.chunks(2)
        .map(|xy| CurvePoint::from_coordinates(&xy[0], &xy[1]))
        .collect()
}
