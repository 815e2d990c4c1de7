// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Escrow lifecycle state machine.
//!
//! ```text
//!   Open(sigs) --sign(s)--> Open(sigs + s) ... --> Executable
//!   Executable --execute--> Executed
//!   Open | Executable --cancel (depositor)--> Cancelled
//! ```
//!
//! Transitions are pure: they take a record snapshot and return the record
//! the ledger would hold afterwards, or the reason the transition is invalid.
//! Terminal states admit nothing.

use std::fmt;

use serde::Serialize;

use super::record::EscrowRecord;
use crate::blockchain::pubkey::Pubkey;

/// Lifecycle status derived from a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    /// Collecting signatures, quorum not yet met
    Open,
    /// Quorum met, awaiting execution
    Executable,
    Executed,
    Cancelled,
}

impl EscrowStatus {
    pub fn of(record: &EscrowRecord) -> Self {
        if record.is_executed {
            EscrowStatus::Executed
        } else if record.is_cancelled {
            EscrowStatus::Cancelled
        } else if quorum_met(record) {
            EscrowStatus::Executable
        } else {
            EscrowStatus::Open
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EscrowStatus::Executed | EscrowStatus::Cancelled)
    }
}

impl fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EscrowStatus::Open => "open",
            EscrowStatus::Executable => "executable",
            EscrowStatus::Executed => "executed",
            EscrowStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

// Quorum counts the signature set, never the cached byte
fn quorum_met(record: &EscrowRecord) -> bool {
    record.signature_count() >= usize::from(record.required_signatures)
}

fn ensure_live(record: &EscrowRecord) -> Result<EscrowStatus, TransitionError> {
    let status = EscrowStatus::of(record);
    if status.is_terminal() {
        return Err(TransitionError::AlreadyTerminal(status));
    }
    Ok(status)
}

/// Check that `signer` may sign.
pub fn check_sign(record: &EscrowRecord, signer: &Pubkey) -> Result<(), TransitionError> {
    ensure_live(record)?;
    if !record.signers.contains(signer) {
        return Err(TransitionError::NotAuthorizedSigner(*signer));
    }
    if record.has_signed(signer) {
        return Err(TransitionError::AlreadySigned(*signer));
    }
    Ok(())
}

/// Check that the escrow may be executed.
pub fn check_execute(record: &EscrowRecord) -> Result<(), TransitionError> {
    match ensure_live(record)? {
        EscrowStatus::Executable => Ok(()),
        _ => Err(TransitionError::QuorumNotMet {
            have: record.signature_count(),
            need: usize::from(record.required_signatures),
        }),
    }
}

/// Check that `caller` may cancel.
pub fn check_cancel(record: &EscrowRecord, caller: &Pubkey) -> Result<(), TransitionError> {
    ensure_live(record)?;
    if record.depositor != *caller {
        return Err(TransitionError::NotDepositor(*caller));
    }
    Ok(())
}

/// Record after `signer` signs.
pub fn sign(record: &EscrowRecord, signer: &Pubkey) -> Result<EscrowRecord, TransitionError> {
    check_sign(record, signer)?;
    let mut next = record.clone();
    next.signatures.push(*signer);
    next.current_signatures = u8::try_from(next.signatures.len()).unwrap_or(u8::MAX);
    Ok(next)
}

/// Record after execution.
pub fn execute(record: &EscrowRecord) -> Result<EscrowRecord, TransitionError> {
    check_execute(record)?;
    let mut next = record.clone();
    next.is_executed = true;
    Ok(next)
}

/// Record after `caller` cancels.
pub fn cancel(record: &EscrowRecord, caller: &Pubkey) -> Result<EscrowRecord, TransitionError> {
    check_cancel(record, caller)?;
    let mut next = record.clone();
    next.is_cancelled = true;
    Ok(next)
}

/// What a given viewer may do with an escrow right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub can_sign: bool,
    pub can_execute: bool,
    pub can_cancel: bool,
}

impl Capabilities {
    pub fn for_viewer(record: &EscrowRecord, viewer: &Pubkey) -> Self {
        Self {
            can_sign: check_sign(record, viewer).is_ok(),
            can_execute: check_execute(record).is_ok(),
            can_cancel: check_cancel(record, viewer).is_ok(),
        }
    }
}

/// Why a transition is not allowed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("{0} is not a listed signer")]
    NotAuthorizedSigner(Pubkey),

    #[error("{0} has already signed")]
    AlreadySigned(Pubkey),

    #[error("quorum not met: {have} of {need} signatures")]
    QuorumNotMet { have: usize, need: usize },

    #[error("{0} is not the depositor")]
    NotDepositor(Pubkey),

    #[error("escrow is already {0}")]
    AlreadyTerminal(EscrowStatus),
}
