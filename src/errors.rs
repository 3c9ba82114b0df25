// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! A list of error types which are produced during an execution of a protocol.
//!
//! Errors fall into three groups:
//! - [`CallerError`]: the calling application (or its transport) used the API
//!   incorrectly. These are never the fault of another party.
//! - [`ProtocolFault`]: one or more peers misbehaved. The fault names the
//!   culprits so the caller can exclude them and re-run the protocol.
//! - Everything else in [`InternalError`]: a local invariant did not hold.
use crate::protocol::PartyId;
use core::fmt::Debug;
use thiserror::Error;

/// The default Result type used in this crate
pub type Result<T> = std::result::Result<T, InternalError>;

/// Represents an error in the execution of a protocol or in the manipulation
/// of internal cryptographic data
#[derive(Clone, Eq, PartialEq, Error, Debug)]
#[allow(missing_docs)]
pub enum InternalError {
    #[error("Calling application mistake: {0}")]
    CallingApplicationMistake(#[from] CallerError),
    #[error("Protocol fault: {0}")]
    ProtocolError(#[from] ProtocolFault),
    #[error("Serialization Error")]
    Serialization,
    #[error("Failed to verify proof: `{0}`")]
    FailedToVerifyProof(String),
    #[error("Represents some code assumption that was checked at runtime but failed to be true")]
    InternalInvariantFailed,
    #[error("Could not invert a Scalar")]
    CouldNotInvertScalar,
    #[error("Reached the maximum allowed number of retries")]
    RetryFailed,
    #[error("Function call contained invalid arguments: `{0}`")]
    InvalidArgument(String),
    #[error("Reconstruction needs at least {required} shares, got {got}")]
    InsufficientShares { required: usize, got: usize },
    #[error("Two shares were evaluated at the same point")]
    DuplicateEvaluator,
}

impl InternalError {
    /// The parties blamed by this error. Empty unless the error is a
    /// [`ProtocolFault`].
    pub fn culprits(&self) -> &[PartyId] {
        match self {
            InternalError::ProtocolError(fault) => &fault.culprits,
            _ => &[],
        }
    }
}

/// Errors caused by the calling application or its transport layer.
#[derive(Clone, Eq, PartialEq, Error, Debug)]
#[allow(missing_docs)]
pub enum CallerError {
    #[error("The party was already started")]
    AlreadyStarted,
    #[error("The party has not been started")]
    NotStarted,
    #[error("The protocol has already terminated for this party")]
    ProtocolAlreadyTerminated,
    #[error("Message failed basic validation: {0}")]
    InvalidMessage(String),
    #[error("Malformed party identifier: {0}")]
    MalformedPartyId(String),
    #[error("Bad input: {0}")]
    BadInput(String),
    #[error("Could not deserialize message bytes")]
    DeserializationFailed,
}

/// A peer misbehaved during a protocol run.
#[derive(Clone, Eq, PartialEq, Error, Debug)]
#[error("task `{task}`, round {round}, culprits {culprits:?}: {cause}")]
pub struct ProtocolFault {
    /// Name of the protocol that detected the fault.
    pub task: &'static str,
    /// Round in which the fault was detected.
    pub round: u16,
    /// The parties responsible.
    pub culprits: Vec<PartyId>,
    /// Human readable description.
    pub cause: String,
}

impl ProtocolFault {
    pub(crate) fn new(
        task: &'static str,
        round: u16,
        culprits: Vec<PartyId>,
        cause: impl Into<String>,
    ) -> Self {
        Self {
            task,
            round,
            culprits,
            cause: cause.into(),
        }
    }
}

macro_rules! serialize {
    ($x:expr) => {{
        bincode::serialize($x).or(Err(crate::errors::InternalError::Serialization))
    }};
}

macro_rules! deserialize {
    ($x:expr) => {{
        bincode::deserialize($x).or(Err(crate::errors::InternalError::CallingApplicationMistake(
            crate::errors::CallerError::DeserializationFailed,
        )))
    }};
}

macro_rules! verify_err {
    ($x:expr) => {{
        Err(crate::errors::InternalError::FailedToVerifyProof(
            String::from($x),
        ))
    }};
}

macro_rules! arg_err {
    ($x:expr) => {{
        Err(crate::errors::InternalError::InvalidArgument(String::from(
            $x,
        )))
    }};
}
