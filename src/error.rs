// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Escrow error taxonomy.
//!
//! Every failure the orchestrator surfaces is an [`EscrowError`]. Local
//! failures (validation, derivation, encoding, authorization, state) are
//! terminal and never reach the ledger. Network and simulation failures are
//! retryable and drive the submission fallback chain. A confirmation failure
//! always carries the transaction id, because the transaction may have landed.

use crate::blockchain::gateway::GatewayError;
use crate::blockchain::pda::DerivationError;
use crate::blockchain::pubkey::Pubkey;
use crate::blockchain::signing::SignerError;
use crate::escrow::codec::CodecError;
use crate::escrow::schema::SchemaLoadError;
use crate::escrow::state::{EscrowStatus, TransitionError};

/// Top-level error returned by every escrow operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EscrowError {
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("Address derivation failed: {0}")]
    Derivation(#[from] DerivationError),

    #[error("Encoding failed: {0}")]
    Encoding(#[from] CodecError),

    #[error("Not authorized: {0}")]
    Authorization(#[from] AuthorizationError),

    #[error("Invalid escrow state: {0}")]
    State(#[from] StateError),

    #[error("Network error: {0}")]
    Network(GatewayError),

    #[error("Simulation rejected: {reason}")]
    SimulationRejected { reason: String, logs: Vec<String> },

    #[error("Transaction {tx_id} submitted but not confirmed: {failure}")]
    Confirmation {
        tx_id: String,
        failure: ConfirmationFailure,
    },

    #[error("Signing failed: {0}")]
    Signer(#[from] SignerError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaLoadError),

    #[error("Escrow {0} not found")]
    NotFound(Pubkey),
}

impl EscrowError {
    /// Stable machine-readable category code.
    pub fn category(&self) -> &'static str {
        match self {
            EscrowError::Validation(_) => "validation_error",
            EscrowError::Derivation(_) => "derivation_error",
            EscrowError::Encoding(_) => "encoding_error",
            EscrowError::Authorization(_) => "authorization_error",
            EscrowError::State(_) => "state_error",
            EscrowError::Network(_) => "network_error",
            EscrowError::SimulationRejected { .. } => "simulation_rejected",
            EscrowError::Confirmation { .. } => "confirmation_error",
            EscrowError::Signer(_) => "signer_error",
            EscrowError::Schema(_) => "schema_error",
            EscrowError::NotFound(_) => "not_found",
        }
    }

    /// Whether trying again (or trying the next submission strategy) can
    /// succeed without the caller changing anything.
    pub fn is_retryable(&self) -> bool {
        match self {
            EscrowError::Network(_) | EscrowError::SimulationRejected { .. } => true,
            EscrowError::Encoding(e) => e.is_schema_fault(),
            _ => false,
        }
    }

    /// Transaction id, when the failure happened after submission.
    pub fn tx_id(&self) -> Option<&str> {
        match self {
            EscrowError::Confirmation { tx_id, .. } => Some(tx_id),
            _ => None,
        }
    }

    /// Program logs attached to the failure, if any.
    pub fn logs(&self) -> &[String] {
        match self {
            EscrowError::SimulationRejected { logs, .. } => logs,
            EscrowError::Network(e) => e.logs(),
            _ => &[],
        }
    }
}

impl From<TransitionError> for EscrowError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::NotAuthorizedSigner(signer) => {
                AuthorizationError::NotAuthorizedSigner(signer).into()
            }
            TransitionError::AlreadySigned(signer) => AuthorizationError::AlreadySigned(signer).into(),
            TransitionError::NotDepositor(caller) => AuthorizationError::NotDepositor(caller).into(),
            TransitionError::QuorumNotMet { have, need } => StateError::QuorumNotMet { have, need }.into(),
            TransitionError::AlreadyTerminal(status) => StateError::AlreadyTerminal(status).into(),
        }
    }
}

/// Input that is rejected before anything is encoded or submitted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("at least one signer is required")]
    NoSigners,

    #[error("{0} signers exceeds the maximum of 255")]
    TooManySigners(usize),

    #[error("signer {0} is listed more than once")]
    DuplicateSigner(Pubkey),

    #[error("required signatures must be at least 1")]
    ZeroRequiredSignatures,

    #[error("required signatures ({required}) cannot exceed number of signers ({signers})")]
    RequiredExceedsSigners { required: usize, signers: usize },

    #[error("recipient must differ from depositor")]
    RecipientIsDepositor,

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("malformed {field}: {reason}")]
    MalformedInput { field: &'static str, reason: String },

    #[error("token account {0} does not exist")]
    TokenAccountMissing(Pubkey),

    #[error("{0} is not an SPL Token account")]
    NotTokenAccount(Pubkey),

    #[error("{0} is not an SPL Token mint")]
    NotMint(Pubkey),

    #[error("depositor token account mint {actual} does not match {expected}")]
    TokenMintMismatch { expected: Pubkey, actual: Pubkey },

    #[error("depositor token account owner {actual} does not match {expected}")]
    TokenOwnerMismatch { expected: Pubkey, actual: Pubkey },

    #[error("insufficient token balance: have {available}, need {required}")]
    InsufficientBalance { available: u64, required: u64 },

    #[error("ledger reported insufficient funds")]
    FundsRejected,
}

/// The caller's identity is not allowed to perform the operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorizationError {
    #[error("{0} is not a listed signer")]
    NotAuthorizedSigner(Pubkey),

    #[error("{0} has already signed")]
    AlreadySigned(Pubkey),

    #[error("{0} is not the depositor")]
    NotDepositor(Pubkey),

    #[error("program rejected the signer: {0}")]
    RejectedByProgram(String),
}

/// The escrow is not in a state that admits the operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("an escrow already exists at {0} for this depositor and recipient")]
    EscrowExists(Pubkey),

    #[error("quorum not met: {have} of {need} signatures")]
    QuorumNotMet { have: usize, need: usize },

    #[error("escrow is already {0}")]
    AlreadyTerminal(EscrowStatus),
}

/// Why a submitted transaction could not be reported as confirmed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfirmationFailure {
    #[error("not confirmed within the polling window")]
    TimedOut,

    #[error("caller stopped waiting")]
    Cancelled,

    #[error("transaction failed on-chain: {0}")]
    Failed(String),

    #[error("status polling failed: {0}")]
    Poll(GatewayError),

    #[error("no reply to the submission and the transaction has not been seen yet: {0}")]
    Unsettled(GatewayError),
}

/// Program error names that mean the instruction bytes did not match what
/// the deployed program expects.
const ENCODING_MARKERS: &[&str] = &[
    "ZeroRequiredSignatures",
    "InstructionDidNotDeserialize",
    "InstructionFallbackNotFound",
    "AccountDidNotDeserialize",
];

const AUTHORIZATION_MARKERS: &[&str] = &["NotAuthorizedSigner", "ConstraintSigner"];

/// Classify a ledger failure for an operation on `escrow`.
///
/// This is the only place where program log text is inspected. Transport
/// failures stay [`EscrowError::Network`]; program failures are mapped from
/// their reason and logs to the most specific category.
pub fn classify(err: GatewayError, escrow: &Pubkey) -> EscrowError {
    match err {
        GatewayError::SimulationRejected { reason, logs } => {
            classify_program_failure(reason, logs, escrow)
        }
        GatewayError::Rpc { code, message, logs } => {
            match classify_known(&message, &logs, escrow) {
                Some(classified) => classified,
                None => EscrowError::Network(GatewayError::Rpc { code, message, logs }),
            }
        }
        other => EscrowError::Network(other),
    }
}

/// Classify a program-level failure reported by simulation or preflight.
pub fn classify_program_failure(reason: String, logs: Vec<String>, escrow: &Pubkey) -> EscrowError {
    classify_known(&reason, &logs, escrow)
        .unwrap_or(EscrowError::SimulationRejected { reason, logs })
}

fn classify_known(reason: &str, logs: &[String], escrow: &Pubkey) -> Option<EscrowError> {
    let mentions = |needle: &str| {
        reason.contains(needle) || logs.iter().any(|line| line.contains(needle))
    };

    if mentions("already in use") {
        return Some(StateError::EscrowExists(*escrow).into());
    }
    if mentions("insufficient funds") || mentions("InsufficientFunds") {
        return Some(ValidationError::FundsRejected.into());
    }
    if let Some(marker) = ENCODING_MARKERS.iter().find(|m| mentions(m)) {
        return Some(CodecError::ProgramRejected((*marker).to_string()).into());
    }
    if let Some(marker) = AUTHORIZATION_MARKERS.iter().find(|m| mentions(m)) {
        return Some(AuthorizationError::RejectedByProgram((*marker).to_string()).into());
    }
    None
}
