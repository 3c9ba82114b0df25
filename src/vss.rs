// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Feldman verifiable secret sharing.
//!
//! A dealer samples a degree-`t` polynomial `f` with `f(0) = secret` and hands
//! `f(k)` to the party whose evaluation point is `k`. The dealer also
//! publishes `vs[c] = g^{a_c}` for every coefficient `a_c`, which lets any
//! receiver check its share without learning anything about the others. Any
//! `t + 1` shares recover the secret by Lagrange interpolation at zero.

use crate::{
    curve::CurvePoint,
    errors::{InternalError, Result},
};
use k256::{elliptic_curve::Field, Scalar};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

/// Public commitments to the polynomial coefficients, constant term first.
pub type Vs = Vec<CurvePoint>;

/// A share `f(id)` of a degree-`threshold` polynomial.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    /// Degree of the sharing polynomial.
    pub threshold: usize,
    /// Evaluation point.
    pub id: Scalar,
    /// `f(id)`.
    pub share: Scalar,
}

impl std::fmt::Debug for Share {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Share")
            .field("threshold", &self.threshold)
            .field("id", &self.id)
            .field("share", &"[redacted]")
            .finish()
    }
}

impl Share {
    /// Check `g^share == Σ vs[c] · id^c`.
    ///
    /// Also fails when the share or the commitments are for a different
    /// threshold. A failing share is a dealer fault.
    pub fn verify(&self, threshold: usize, vs: &[CurvePoint]) -> bool {
        if self.threshold != threshold || vs.len() != threshold + 1 {
            return false;
        }
        CurvePoint::scale_generator(&self.share) == evaluate_commitments(vs, &self.id)
    }
}

/// Compute `Σ vs[c] · id^c`, the public image of the share at `id`.
pub fn evaluate_commitments(vs: &[CurvePoint], id: &Scalar) -> CurvePoint {
    // Horner's rule, highest coefficient first
    vs.iter()
        .rev()
        .fold(CurvePoint::IDENTITY, |acc, v| acc.multiply_by_scalar(id) + *v)
}

fn evaluate_polynomial(coefficients: &[Scalar], x: &Scalar) -> Scalar {
    coefficients
        .iter()
        .rev()
        .fold(Scalar::ZERO, |acc, c| acc * x + c)
}

fn check_distinct_nonzero(ids: &[Scalar]) -> Result<()> {
    for (i, id) in ids.iter().enumerate() {
        if bool::from(id.is_zero()) {
            return arg_err!("evaluation point is zero");
        }
        if ids[..i].contains(id) {
            error!("Evaluation point {i} appears more than once");
            return Err(InternalError::DuplicateEvaluator);
        }
    }
    Ok(())
}

/// Share `secret` among `ids` with threshold `t`.
///
/// Returns `t + 1` coefficient commitments and one share per id, in the order
/// of `ids`.
#[instrument(skip_all, err(Debug))]
pub fn create<R: RngCore + CryptoRng>(
    rng: &mut R,
    threshold: usize,
    secret: &Scalar,
    ids: &[Scalar],
) -> Result<(Vs, Vec<Share>)> {
    if threshold >= ids.len() {
        error!(
            "Cannot share with threshold {threshold} among {} parties",
            ids.len()
        );
        return arg_err!("threshold must be smaller than the number of evaluators");
    }
    check_distinct_nonzero(ids)?;

    let mut coefficients = Vec::with_capacity(threshold + 1);
    coefficients.push(*secret);
    for _ in 0..threshold {
        coefficients.push(Scalar::random(&mut *rng));
    }

    let vs = coefficients
        .iter()
        .map(CurvePoint::scale_generator)
        .collect();
    let shares = ids
        .iter()
        .map(|id| Share {
            threshold,
            id: *id,
            share: evaluate_polynomial(&coefficients, id),
        })
        .collect();
    Ok((vs, shares))
}

/// Lagrange coefficient of `ks[i]` for interpolation at zero:
/// `λ_i = Π_{j≠i} k_j / (k_j - k_i)`.
pub fn lagrange_coefficient(ks: &[Scalar], i: usize) -> Result<Scalar> {
    let k_i = ks.get(i).ok_or_else(|| {
        error!("Lagrange index {i} out of range for {} points", ks.len());
        InternalError::InvalidArgument("lagrange index out of range".into())
    })?;
    let mut numerator = Scalar::ONE;
    let mut denominator = Scalar::ONE;
    for (j, k_j) in ks.iter().enumerate() {
        if j == i {
            continue;
        }
        if k_j == k_i {
            error!("Evaluation points {i} and {j} coincide");
            return Err(InternalError::DuplicateEvaluator);
        }
        numerator *= k_j;
        denominator *= k_j - k_i;
    }
    let inverse: Option<Scalar> = denominator.invert().into();
    Ok(numerator * inverse.ok_or(InternalError::CouldNotInvertScalar)?)
}

/// Recover the constant term from at least `threshold + 1` shares.
pub fn reconstruct(shares: &[Share], threshold: usize) -> Result<Scalar> {
    if shares.len() < threshold + 1 {
        return Err(InternalError::InsufficientShares {
            required: threshold + 1,
            got: shares.len(),
        });
    }
    let ids: Vec<Scalar> = shares.iter().map(|s| s.id).collect();
    let mut secret = Scalar::ZERO;
    for (i, share) in shares.iter().enumerate() {
        secret += lagrange_coefficient(&ids, i)? * share.share;
    }
    Ok(secret)
}

/// Convert a raw share into an additive signing weight.
///
/// Given the evaluation points `ks` of the parties taking part and their
/// public share points `big_xs`, returns `w_i = λ_i · x_i` for the party at
/// position `i` together with `W_j = λ_j · X_j` for every party, so that
/// `Σ w_j` is the shared secret and `Σ W_j` is the group public key.
pub fn prepare_for_signing(
    i: usize,
    xi: &Scalar,
    ks: &[Scalar],
    big_xs: &[CurvePoint],
) -> Result<(Scalar, Vec<CurvePoint>)> {
    if ks.len() != big_xs.len() {
        error!(
            "Got {} evaluation points but {} public shares",
            ks.len(),
            big_xs.len()
        );
        return arg_err!("evaluation points and public shares differ in length");
    }
    check_distinct_nonzero(ks)?;
    let wi = lagrange_coefficient(ks, i)? * xi;
    let big_ws = big_xs
        .iter()
        .enumerate()
        .map(|(j, big_x)| Ok(big_x.multiply_by_scalar(&lagrange_coefficient(ks, j)?)))
        .collect::<Result<Vec<_>>>()?;
    Ok((wi, big_ws))
}
