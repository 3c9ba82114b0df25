// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Implements a trait for zero-knowledge proofs.
//!
//! In more detail, this module provides a trait [`Proof`] for constructing a
//! (non-interactive) zero knowledge proof. The trait provides two methods,
//! [`Proof::prove`] and [`Proof::verify`]. The former builds a proof and the
//! latter verifies the proof was constructed correctly.
//!
//! Proofs are made non-interactive with a [`Transcript`]. Callers seed the
//! transcript with the session the proof is bound to (see
//! [`SessionContext`](crate::protocol::SessionContext)); a proof only
//! verifies against a transcript seeded with the same session.

pub mod pisch;

use crate::{
    errors::Result,
    parameters::{ProtocolVersion, CRYPTOGRAPHIC_RETRY_MAX},
};
use k256::{elliptic_curve::PrimeField, FieldBytes, Scalar};
use merlin::Transcript;
use num_bigint::BigUint;
use rand::{CryptoRng, RngCore};
use serde::{de::DeserializeOwned, Serialize};
use tracing::error;

/// A trait for constructing zero knowledge proofs.
///
/// The associated type [`Proof::CommonInput`] denotes the data known the both
/// the prover and verifier, and the associated type [`Proof::ProverSecret`]
/// denotes the data known only to the prover.
pub trait Proof: Sized + Serialize + DeserializeOwned {
    /// Public statement.
    type CommonInput;
    /// Witness.
    type ProverSecret;
    /// Constructs a zero knowledge proof over [`Proof::ProverSecret`] and
    /// [`Proof::CommonInput`] using the provided [`Transcript`].
    fn prove<R: RngCore + CryptoRng>(
        input: &Self::CommonInput,
        secret: &Self::ProverSecret,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self>;
    /// Verifies a zero knowledge proof using the provided
    /// [`Proof::CommonInput`] and [`Transcript`].
    fn verify(&self, input: &Self::CommonInput, transcript: &mut Transcript) -> Result<()>;
}

/// Derive a challenge scalar from the transcript.
///
/// Under [`ProtocolVersion::V1`] a single 32-byte digest is reduced modulo
/// the group order, which slightly favors small values. Under
/// [`ProtocolVersion::V2`] the digest is re-drawn until it falls below the
/// order.
pub(crate) fn challenge_from_transcript(
    transcript: &mut Transcript,
    version: ProtocolVersion,
) -> Result<Scalar> {
    let mut bytes = [0u8; 32];
    match version {
        ProtocolVersion::V1 => {
            transcript.challenge_bytes(b"challenge", &mut bytes);
            crate::curve::biguint_to_scalar(&BigUint::from_bytes_be(&bytes))
        }
        ProtocolVersion::V2 => {
            for counter in 0..CRYPTOGRAPHIC_RETRY_MAX {
                transcript.append_u64(b"challenge counter", counter as u64);
                transcript.challenge_bytes(b"sampling randomness", &mut bytes);
                let candidate: Option<Scalar> =
                    Scalar::from_repr(FieldBytes::clone_from_slice(&bytes)).into();
                if let Some(e) = candidate {
                    return Ok(e);
                }
            }
            error!("Challenge sampling exceeded {CRYPTOGRAPHIC_RETRY_MAX} attempts");
            Err(crate::errors::InternalError::RetryFailed)
        }
    }
}
