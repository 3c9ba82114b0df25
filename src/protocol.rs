// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Party identifiers and session binding.

use crate::{
    commitment::HashCommitment,
    curve::{biguint_to_scalar, CurveParams},
    errors::{CallerError, Result},
};
use k256::Scalar;
use merlin::Transcript;
use num_bigint::BigUint;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::{Display, Formatter};
use tracing::error;

/// Identifies one protocol participant.
///
/// The `key` is a unique integer derived from the participant's identity.
/// Reduced modulo the group order it is the point at which the participant's
/// secret shares are evaluated. The `index` is the participant's position in
/// the key-sorted list of all participants and is assigned by
/// [`SortedPartyIds::from_unsorted`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartyId {
    id: String,
    moniker: String,
    key: BigUint,
    index: Option<usize>,
}

impl PartyId {
    /// Create a new id. The index is unassigned until the id is sorted
    /// together with the rest of the participants.
    pub fn new(id: impl Into<String>, moniker: impl Into<String>, key: BigUint) -> Self {
        Self {
            id: id.into(),
            moniker: moniker.into(),
            key,
            index: None,
        }
    }

    /// Generate an id with a random 256-bit key.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R, moniker: impl Into<String>) -> Self {
        let mut key = [0u8; 32];
        rng.fill_bytes(&mut key);
        Self::new(hex::encode(&key[..8]), moniker, BigUint::from_bytes_be(&key))
    }

    /// Application-level identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human readable name.
    pub fn moniker(&self) -> &str {
        &self.moniker
    }

    /// The unique integer key.
    pub fn key(&self) -> &BigUint {
        &self.key
    }

    /// Position in the sorted participant list, if assigned.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// The scalar at which this party's shares are evaluated.
    pub fn evaluation_point(&self) -> Result<Scalar> {
        let point = biguint_to_scalar(&self.key)?;
        if bool::from(point.is_zero()) {
            error!("Party {self} has a key that is zero modulo the group order");
            Err(CallerError::MalformedPartyId(self.to_string()))?
        }
        Ok(point)
    }

    /// An id is well formed once its index is assigned and its key is a
    /// valid evaluation point.
    pub fn is_well_formed(&self) -> bool {
        self.index.is_some() && self.evaluation_point().is_ok()
    }

    /// Whether both ids carry the same key, regardless of index.
    pub fn same_key(&self, other: &PartyId) -> bool {
        self.key == other.key
    }
}

impl Display for PartyId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let key = hex::encode(self.key.to_bytes_be());
        let short = &key[..key.len().min(8)];
        match self.index {
            Some(index) => write!(f, "{{{},{},{}}}", index, self.moniker, short),
            None => write!(f, "{{-,{},{}}}", self.moniker, short),
        }
    }
}

/// The participants of one protocol run, sorted by key with dense indices.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortedPartyIds(Vec<PartyId>);

impl SortedPartyIds {
    /// Sort by key and assign indices `0..n`.
    ///
    /// Fails if the list is empty or if two keys coincide modulo the group
    /// order, since they would evaluate shares at the same point.
    pub fn from_unsorted(mut ids: Vec<PartyId>) -> Result<Self> {
        if ids.is_empty() {
            Err(CallerError::BadInput("empty participant list".into()))?
        }
        let mut points = Vec::with_capacity(ids.len());
        for id in &ids {
            points.push(id.evaluation_point()?);
        }
        for (i, p) in points.iter().enumerate() {
            if points[..i].contains(p) {
                error!("Participant list contains a duplicate key: {}", ids[i]);
                Err(CallerError::BadInput(format!("duplicate party key {}", ids[i])))?
            }
        }
        ids.sort_by(|a, b| a.key.cmp(&b.key));
        for (index, id) in ids.iter_mut().enumerate() {
            id.index = Some(index);
        }
        Ok(Self(ids))
    }

    /// Number of participants.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty. Never true for a constructed list.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Participant at `index`.
    pub fn get(&self, index: usize) -> Option<&PartyId> {
        self.0.get(index)
    }

    /// Iterate in sorted order.
    pub fn iter(&self) -> std::slice::Iter<'_, PartyId> {
        self.0.iter()
    }

    /// Look up the participant that carries the same key as `id`.
    pub fn find(&self, id: &PartyId) -> Option<&PartyId> {
        self.0.iter().find(|p| p.same_key(id))
    }

    /// Whether `id` sits at its claimed index in this list.
    pub(crate) fn is_member_at_index(&self, id: &PartyId) -> bool {
        id.index
            .and_then(|i| self.0.get(i))
            .map_or(false, |p| p.same_key(id))
    }

    /// Evaluation points of every participant, in order.
    pub fn keys(&self) -> Result<Vec<Scalar>> {
        self.0.iter().map(PartyId::evaluation_point).collect()
    }

    /// All participants except the one at `index`.
    pub fn exclude(&self, index: usize) -> Vec<PartyId> {
        self.0
            .iter()
            .filter(|p| p.index != Some(index))
            .cloned()
            .collect()
    }
}

/// Binds proofs to one protocol run.
///
/// The context digest covers the task name, the curve, every participant key,
/// the threshold and all commitments broadcast before the proofs are made.
/// Each sender then gets its own session by appending its index, so a proof
/// produced for one party or one run never verifies for another.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionContext {
    digest: [u8; 32],
}

impl SessionContext {
    /// Hash the run's public context.
    pub fn new(
        task: &str,
        curve: &CurveParams,
        parties: &SortedPartyIds,
        threshold: usize,
        commitments: &[HashCommitment],
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((task.len() as u64).to_be_bytes());
        hasher.update(task.as_bytes());
        hasher.update(curve.to_transcript_bytes());
        hasher.update((parties.len() as u64).to_be_bytes());
        for party in parties.iter() {
            let key = party.key.to_bytes_be();
            hasher.update((key.len() as u64).to_be_bytes());
            hasher.update(&key);
        }
        hasher.update((threshold as u64).to_be_bytes());
        for commitment in commitments {
            hasher.update(commitment.as_bytes());
        }
        Self {
            digest: hasher.finalize().into(),
        }
    }

    /// Session bytes for the party at `sender_index`.
    pub fn session_for(&self, sender_index: usize) -> Vec<u8> {
        [
            self.digest.to_vec(),
            (sender_index as u64).to_be_bytes().to_vec(),
        ]
        .concat()
    }

    /// A fresh transcript seeded with the session of `sender_index`.
    pub fn transcript_for(&self, sender_index: usize) -> Transcript {
        let mut transcript = Transcript::new(b"tss-rounds session");
        transcript.append_message(b"session", &self.session_for(sender_index));
        transcript
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{curve::k256_order, errors::InternalError, utils::testing::init_testing};

    #[test]
    fn sorting_assigns_dense_indices() -> Result<()> {
        let ids = vec![
            PartyId::new("c", "carol", BigUint::from(30u32)),
            PartyId::new("a", "alice", BigUint::from(10u32)),
            PartyId::new("b", "bob", BigUint::from(20u32)),
        ];
        let sorted = SortedPartyIds::from_unsorted(ids)?;
        let monikers: Vec<_> = sorted.iter().map(|p| p.moniker().to_string()).collect();
        assert_eq!(monikers, vec!["alice", "bob", "carol"]);
        for (i, p) in sorted.iter().enumerate() {
            assert_eq!(p.index(), Some(i));
            assert!(p.is_well_formed());
        }

        let others: Vec<_> = sorted.exclude(1).iter().map(|p| p.moniker().to_string()).collect();
        assert_eq!(others, vec!["alice", "carol"]);
        assert_eq!(sorted.exclude(7).len(), 3);
        Ok(())
    }

    #[test]
    fn duplicate_and_zero_keys_are_rejected() {
        let q = k256_order();
        let dup = vec![
            PartyId::new("a", "alice", BigUint::from(10u32)),
            PartyId::new("b", "bob", &q + 10u32),
        ];
        assert!(SortedPartyIds::from_unsorted(dup).is_err());

        let zero = vec![
            PartyId::new("a", "alice", BigUint::from(10u32)),
            PartyId::new("b", "bob", q),
        ];
        assert!(matches!(
            SortedPartyIds::from_unsorted(zero),
            Err(InternalError::CallingApplicationMistake(
                CallerError::MalformedPartyId(_)
            ))
        ));

        assert!(SortedPartyIds::from_unsorted(vec![]).is_err());
    }

    #[test]
    fn unsorted_ids_are_not_well_formed() {
        let mut rng = init_testing();
        let id = PartyId::random(&mut rng, "dave");
        assert!(!id.is_well_formed());
    }

    #[test]
    fn sessions_differ_per_sender_and_commitments() -> Result<()> {
        let mut rng = init_testing();
        let parties = SortedPartyIds::from_unsorted(
            (0..3).map(|i| PartyId::random(&mut rng, format!("p{i}"))).collect(),
        )?;
        let curve = CurveParams::secp256k1();
        let ctx = SessionContext::new("test", &curve, &parties, 1, &[]);
        assert_ne!(ctx.session_for(0), ctx.session_for(1));

        let (c, _) = crate::commitment::commit(&mut rng, &[BigUint::from(7u32)]);
        let other = SessionContext::new("test", &curve, &parties, 1, &[c]);
        assert_ne!(ctx.session_for(0), other.session_for(0));
        Ok(())
    }
}
