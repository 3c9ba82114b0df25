// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    commitment::{HashCommitment, HashDeCommitment},
    messages::MessageContent,
    vss::Share,
    zkp::pisch::PiSchProof,
};
use serde::{Deserialize, Serialize};

/// Messages of the key generation protocol.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum KeygenContent {
    /// Round 1 broadcast: commitment to the dealer's coefficient points.
    Round1Commit {
        /// `H(r, vs)`
        commitment: HashCommitment,
    },
    /// Round 2 point-to-point: the receiver's share.
    Round2Share {
        /// `f_i(k_j)`
        share: Share,
    },
    /// Round 2 broadcast: opening of the round 1 commitment and a proof of
    /// knowledge of the constant term.
    Round2Decommit {
        /// `[r, vs]` as affine coordinates
        decommitment: HashDeCommitment,
        /// Proof of knowledge of `log_g(vs[0])`
        proof: PiSchProof,
    },
}

impl KeygenContent {
    /// Whether this content travels as a broadcast.
    pub(crate) fn expects_broadcast(&self) -> bool {
        match self {
            KeygenContent::Round2Share { .. } => false,
            KeygenContent::Round1Commit { .. } | KeygenContent::Round2Decommit { .. } => true,
        }
    }
}

impl MessageContent for KeygenContent {
    fn validate_basic(&self) -> bool {
        match self {
            KeygenContent::Round1Commit { .. } => true,
            KeygenContent::Round2Share { share } => {
                share.threshold > 0 && !bool::from(share.id.is_zero())
            }
            KeygenContent::Round2Decommit { decommitment, .. } => {
                let count = decommitment.value_count();
                count > 0 && count % 2 == 0
            }
        }
    }

    fn round_number(&self) -> u16 {
        match self {
            KeygenContent::Round1Commit { .. } => 1,
            KeygenContent::Round2Share { .. } | KeygenContent::Round2Decommit { .. } => 2,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            KeygenContent::Round1Commit { .. } => "KeygenRound1Commit",
            KeygenContent::Round2Share { .. } => "KeygenRound2Share",
            KeygenContent::Round2Decommit { .. } => "KeygenRound2Decommit",
        }
    }
}
