// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Group arithmetic used by the protocols.
//!
//! All arithmetic is done on secp256k1 through the `k256` crate. This module
//! wraps it in a [`CurvePoint`] type with our own (de)serialization and
//! conversions between field elements and [`BigUint`]s, and provides a
//! [`CurveRegistry`] that maps curve names to their public parameters.

use crate::errors::{CallerError, InternalError, Result};
use generic_array::GenericArray;
use k256::{
    elliptic_curve::{
        bigint::Encoding,
        group::GroupEncoding,
        sec1::{FromEncodedPoint, ToEncodedPoint},
        Curve, Field, PrimeField,
    },
    AffinePoint, CompressedPoint, EncodedPoint, FieldBytes, ProjectivePoint, Scalar,
};
use lazy_static::lazy_static;
use num_bigint::BigUint;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use tracing::error;

/// Name under which secp256k1 is registered in the default registry.
pub const SECP256K1: &str = "secp256k1";

/// Wrapper around [`k256::ProjectivePoint`] so that we can define our own
/// serialization/deserialization for it
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct CurvePoint(pub ProjectivePoint);

impl CurvePoint {
    /// The group generator.
    pub const GENERATOR: Self = CurvePoint(ProjectivePoint::GENERATOR);
    /// The point at infinity.
    pub const IDENTITY: Self = CurvePoint(ProjectivePoint::IDENTITY);

    /// Computes `g^s`.
    pub fn scale_generator(s: &Scalar) -> Self {
        Self(ProjectivePoint::GENERATOR * s)
    }

    pub(crate) fn multiply_by_scalar(&self, s: &Scalar) -> Self {
        Self(self.0 * s)
    }

    /// Whether this is the point at infinity.
    pub fn is_identity(&self) -> bool {
        self.0 == ProjectivePoint::IDENTITY
    }

    /// Serialize the point as a compressed SEC1 byte array.
    pub fn to_bytes(self) -> Vec<u8> {
        AffinePoint::from(self.0).to_bytes().to_vec()
    }

    /// Parse a compressed SEC1 encoding.
    pub fn try_from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 33 {
            error!("Curve point encoding has length {}, expected 33", bytes.len());
            Err(CallerError::DeserializationFailed)?
        }
        let point: Option<AffinePoint> =
            AffinePoint::from_bytes(&CompressedPoint::clone_from_slice(bytes)).into();
        match point {
            Some(point) => Ok(Self(point.into())),
            None => {
                error!("Failed to encode bytes as a curve point");
                Err(CallerError::DeserializationFailed)?
            }
        }
    }

    /// The affine coordinates of the point, or `None` for the identity.
    pub fn coordinates(&self) -> Option<(BigUint, BigUint)> {
        let encoded = AffinePoint::from(self.0).to_encoded_point(false);
        let x = encoded.x()?;
        let y = encoded.y()?;
        Some((BigUint::from_bytes_be(x), BigUint::from_bytes_be(y)))
    }

    /// Build a point from affine coordinates.
    ///
    /// Fails if the coordinates do not describe a point on the curve. The
    /// identity has no affine form and can never be produced here.
    pub fn from_coordinates(x: &BigUint, y: &BigUint) -> Result<Self> {
        let x = biguint_to_field_bytes(x)?;
        let y = biguint_to_field_bytes(y)?;
        let encoded = EncodedPoint::from_affine_coordinates(&x, &y, false);
        let point: Option<AffinePoint> = AffinePoint::from_encoded_point(&encoded).into();
        point.map(|p| Self(p.into())).ok_or_else(|| {
            error!("Affine coordinates do not describe a point on the curve");
            InternalError::InternalInvariantFailed
        })
    }
}

impl std::ops::Add for CurvePoint {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl std::iter::Sum for CurvePoint {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(CurvePoint::IDENTITY, |acc, p| acc + p)
    }
}

impl From<ProjectivePoint> for CurvePoint {
    fn from(p: ProjectivePoint) -> Self {
        Self(p)
    }
}

impl Serialize for CurvePoint {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        AffinePoint::from(self.0).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CurvePoint {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let p = AffinePoint::deserialize(deserializer)?;
        Ok(Self(p.into()))
    }
}

/// The order `q` of the secp256k1 group.
pub fn k256_order() -> BigUint {
    let order_bytes: [u8; 32] = k256::Secp256k1::ORDER.to_be_bytes();
    BigUint::from_bytes_be(&order_bytes)
}

fn biguint_to_field_bytes(x: &BigUint) -> Result<FieldBytes> {
    let bytes = x.to_bytes_be();
    if bytes.len() > 32 {
        error!("Integer does not fit into 32 bytes");
        return Err(InternalError::InternalInvariantFailed);
    }
    let mut padded = vec![0u8; 32 - bytes.len()];
    padded.extend_from_slice(&bytes);
    Ok(GenericArray::clone_from_slice(&padded))
}

/// Reduce `x` modulo `q` and convert it to a [`Scalar`].
pub fn biguint_to_scalar(x: &BigUint) -> Result<Scalar> {
    let reduced = x % k256_order();
    let repr = biguint_to_field_bytes(&reduced)?;
    Option::from(Scalar::from_repr(repr)).ok_or_else(|| {
        error!("Failed to convert BigUint into k256::Scalar");
        InternalError::InternalInvariantFailed
    })
}

/// Convert a [`Scalar`] into its canonical integer in `[0, q)`.
pub fn scalar_to_biguint(s: &Scalar) -> BigUint {
    BigUint::from_bytes_be(&s.to_repr())
}

/// Sample a uniformly random non-zero scalar.
pub fn random_nonzero_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> Scalar {
    loop {
        let s = Scalar::random(&mut *rng);
        if !bool::from(s.is_zero()) {
            return s;
        }
    }
}

/// The public parameters of a curve, as bound into transcripts and sessions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurveParams {
    name: String,
    order: BigUint,
    generator: CurvePoint,
}

impl CurveParams {
    /// Parameters for secp256k1.
    pub fn secp256k1() -> Self {
        Self {
            name: SECP256K1.to_string(),
            order: k256_order(),
            generator: CurvePoint::GENERATOR,
        }
    }

    /// Register secp256k1 parameters under another name.
    pub fn secp256k1_alias(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::secp256k1()
        }
    }

    /// The registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The group order `q`.
    pub fn order(&self) -> &BigUint {
        &self.order
    }

    /// The group generator `g`.
    pub fn generator(&self) -> CurvePoint {
        self.generator
    }

    /// A canonical byte encoding for hashing.
    pub(crate) fn to_transcript_bytes(&self) -> Vec<u8> {
        [
            (self.name.len() as u64).to_be_bytes().to_vec(),
            self.name.as_bytes().to_vec(),
            self.order.to_bytes_be(),
            self.generator.to_bytes(),
        ]
        .concat()
    }
}

/// Maps curve names to [`CurveParams`].
///
/// Build one at process start and pass the looked-up parameters into
/// [`Parameters`](crate::parameters::Parameters). [`default_registry`]
/// returns a shared instance that only knows secp256k1.
#[derive(Clone, Debug, Default)]
pub struct CurveRegistry {
    curves: HashMap<String, CurveParams>,
}

impl CurveRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that knows secp256k1.
    pub fn with_defaults() -> Self {
        let mut curves = HashMap::new();
        let _ = curves.insert(SECP256K1.to_string(), CurveParams::secp256k1());
        Self { curves }
    }

    /// Add a curve.
    ///
    /// Arithmetic is always carried out on secp256k1, so the parameters must
    /// describe that group. Names must be unique.
    pub fn register(&mut self, params: CurveParams) -> Result<()> {
        if self.curves.contains_key(params.name()) {
            error!("Curve `{}` is already registered", params.name());
            Err(CallerError::BadInput(format!(
                "curve `{}` is already registered",
                params.name()
            )))?
        }
        if params.order != k256_order() || params.generator != CurvePoint::GENERATOR {
            error!("Curve `{}` does not match the secp256k1 group", params.name());
            Err(CallerError::BadInput(format!(
                "curve `{}` does not match the arithmetic backend",
                params.name()
            )))?
        }
        let _ = self.curves.insert(params.name.clone(), params);
        Ok(())
    }

    /// Look up a curve by name.
    pub fn get(&self, name: &str) -> Result<&CurveParams> {
        self.curves.get(name).ok_or_else(|| {
            error!("Curve `{name}` is not registered");
            CallerError::BadInput(format!("unknown curve `{name}`")).into()
        })
    }
}

lazy_static! {
    static ref DEFAULT_REGISTRY: CurveRegistry = CurveRegistry::with_defaults();
}

/// The process-wide registry, built once on first use.
pub fn default_registry() -> &'static CurveRegistry {
    &DEFAULT_REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::init_testing;

    #[test]
    fn curve_point_byte_conversion_works() -> Result<()> {
        let mut rng = init_testing();
        let point = CurvePoint::scale_generator(&random_nonzero_scalar(&mut rng));
        let reconstructed = CurvePoint::try_from_bytes(&point.to_bytes())?;
        assert_eq!(point, reconstructed);
        assert!(CurvePoint::try_from_bytes(&point.to_bytes()[1..]).is_err());
        Ok(())
    }

    #[test]
    fn affine_coordinates_are_validated() -> Result<()> {
        let mut rng = init_testing();
        let point = CurvePoint::scale_generator(&random_nonzero_scalar(&mut rng));
        let (x, y) = point.coordinates().ok_or(InternalError::InternalInvariantFailed)?;
        assert_eq!(CurvePoint::from_coordinates(&x, &y)?, point);

        // Off-curve point
        let bad_y = &y + 1u32;
        assert!(CurvePoint::from_coordinates(&x, &bad_y).is_err());

        assert!(CurvePoint::IDENTITY.coordinates().is_none());
        Ok(())
    }

    #[test]
    fn scalar_conversion_reduces_modulo_order() -> Result<()> {
        let q = k256_order();
        assert_eq!(biguint_to_scalar(&q)?, Scalar::ZERO);
        assert_eq!(biguint_to_scalar(&(&q + 5u32))?, Scalar::from(5u64));

        let mut rng = init_testing();
        let s = random_nonzero_scalar(&mut rng);
        assert_eq!(biguint_to_scalar(&scalar_to_biguint(&s))?, s);
        Ok(())
    }

    #[test]
    fn registry_lookup_and_registration() -> Result<()> {
        let registry = default_registry();
        assert_eq!(registry.get(SECP256K1)?, &CurveParams::secp256k1());
        assert!(registry.get("ed25519").is_err());

        let mut registry = CurveRegistry::new();
        registry.register(CurveParams::secp256k1_alias("k256"))?;
        assert_eq!(registry.get("k256")?.order(), &k256_order());

        // Duplicate names are refused
        assert!(registry
            .register(CurveParams::secp256k1_alias("k256"))
            .is_err());
        Ok(())
    }
}
