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
};
use serde::{Deserialize, Serialize};

/// Messages of the resharing protocol.
///
/// Old committee members sign their messages with their old committee id,
/// new committee members with their new committee id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ReshareContent {
    /// Round 1, old to new, broadcast: commitment to the coefficient points
    /// of the sender's resharing polynomial.
    Round1Commit {
        /// `H(r, vs)`
        commitment: HashCommitment,
    },
    /// Round 2, new to old, broadcast: the sender holds every commitment.
    Round2Ack,
    /// Round 3, old to new, point-to-point: the receiver's new share.
    Round3Share {
        /// `f_i(k_j)` over the new committee
        share: Share,
    },
    /// Round 3, old to new, broadcast: opening of the round 1 commitment.
    Round3Decommit {
        /// `[r, vs]` as affine coordinates
        decommitment: HashDeCommitment,
    },
}

impl ReshareContent {
    /// Whether this content travels as a broadcast.
    pub(crate) fn expects_broadcast(&self) -> bool {
        match self {
            ReshareContent::Round3Share { .. } => false,
            ReshareContent::Round1Commit { .. }
            | ReshareContent::Round2Ack
            | ReshareContent::Round3Decommit { .. } => true,
        }
    }
}

impl MessageContent for ReshareContent {
    fn validate_basic(&self) -> bool {
        match self {
            ReshareContent::Round1Commit { .. } | ReshareContent::Round2Ack => true,
            ReshareContent::Round3Share { share } => {
                share.threshold > 0 && !bool::from(share.id.is_zero())
            }
            ReshareContent::Round3Decommit { decommitment } => {
                let count = decommitment.value_count();
                count > 0 && count % 2 == 0
            }
        }
    }

    fn round_number(&self) -> u16 {
        match self {
            ReshareContent::Round1Commit { .. } => 1,
            ReshareContent::Round2Ack => 2,
            ReshareContent::Round3Share { .. } | ReshareContent::Round3Decommit { .. } => 3,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            ReshareContent::Round1Commit { .. } => "ReshareRound1Commit",
            ReshareContent::Round2Ack => "ReshareRound2Ack",
            ReshareContent::Round3Share { .. } => "ReshareRound3Share",
            ReshareContent::Round3Decommit { .. } => "ReshareRound3Decommit",
        }
    }
}
