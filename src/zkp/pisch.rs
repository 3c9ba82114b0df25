// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Schnorr proof of knowledge of a discrete logarithm.
//!
//! The prover knows `x` with `X = g^x`. It samples `α`, sends `A = g^α`,
//! derives `e` from the transcript and answers `z = α + e·x`. The verifier
//! re-derives `e` and checks `g^z == A + e·X`.

use super::{challenge_from_transcript, Proof};
use crate::{
    curve::{random_nonzero_scalar, CurveParams, CurvePoint},
    errors::*,
    parameters::ProtocolVersion,
};
use k256::Scalar;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

/// A Schnorr proof `(A, z)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiSchProof {
    A: CurvePoint,
    z: Scalar,
}

/// Public statement: `X` is `g^x` on `curve`.
pub struct PiSchInput {
    curve: CurveParams,
    X: CurvePoint,
    version: ProtocolVersion,
}

impl PiSchInput {
    /// Statement for the public point `X`.
    pub fn new(curve: &CurveParams, X: &CurvePoint, version: ProtocolVersion) -> Self {
        Self {
            curve: curve.clone(),
            X: *X,
            version,
        }
    }
}

/// The discrete logarithm `x`.
pub struct PiSchSecret {
    x: Scalar,
}

impl PiSchSecret {
    /// Wrap the witness.
    pub fn new(x: &Scalar) -> Self {
        Self { x: *x }
    }
}

impl std::fmt::Debug for PiSchSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PiSchSecret([redacted])")
    }
}

fn challenge(input: &PiSchInput, A: &CurvePoint, transcript: &mut Transcript) -> Result<Scalar> {
    transcript.append_message(b"PiSchProof", b"");
    transcript.append_message(b"curve", &input.curve.to_transcript_bytes());
    transcript.append_message(b"X", &input.X.to_bytes());
    transcript.append_message(b"g", &input.curve.generator().to_bytes());
    transcript.append_message(b"A", &A.to_bytes());
    challenge_from_transcript(transcript, input.version)
}

impl Proof for PiSchProof {
    type CommonInput = PiSchInput;
    type ProverSecret = PiSchSecret;

    fn prove<R: RngCore + CryptoRng>(
        input: &Self::CommonInput,
        secret: &Self::ProverSecret,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self> {
        let alpha = random_nonzero_scalar(rng);
        let A = input.curve.generator().multiply_by_scalar(&alpha);
        let e = challenge(input, &A, transcript)?;
        let z = alpha + e * secret.x;
        Ok(Self { A, z })
    }

    fn verify(&self, input: &Self::CommonInput, transcript: &mut Transcript) -> Result<()> {
        if input.X.is_identity() || self.A.is_identity() {
            return verify_err!("Schnorr statement or commitment is the identity");
        }
        let e = challenge(input, &self.A, transcript)?;
        let lhs = input.curve.generator().multiply_by_scalar(&self.z);
        let rhs = self.A + input.X.multiply_by_scalar(&e);
        if lhs != rhs {
            return verify_err!("Schnorr equality check failed");
        }
        Ok(())
    }
}
