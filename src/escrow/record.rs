// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Typed escrow records and instruction arguments.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::codec::{CodecError, FieldMap, RecordCodec, QUORUM_FIELD};
use super::schema::{ESCROW_ACCOUNT, INITIALIZE};
use crate::blockchain::pda::parse_identity;
use crate::blockchain::pubkey::{as_base58, as_base58_list, Pubkey};
use crate::error::{EscrowError, ValidationError};

/// Largest signer list a u8 quorum can address.
pub const MAX_SIGNERS: usize = u8::MAX as usize;

/// On-chain escrow record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowRecord {
    #[serde(serialize_with = "as_base58")]
    pub depositor: Pubkey,
    #[serde(serialize_with = "as_base58")]
    pub recipient: Pubkey,
    #[serde(serialize_with = "as_base58")]
    pub mint: Pubkey,
    /// Custodied amount in the mint's smallest unit
    pub amount: u64,
    pub required_signatures: u8,
    /// Count cached by the program; see [`EscrowRecord::signature_count`]
    pub current_signatures: u8,
    /// Fixed at creation
    #[serde(serialize_with = "as_base58_list")]
    pub signers: Vec<Pubkey>,
    /// Append-only subset of `signers`
    #[serde(serialize_with = "as_base58_list")]
    pub signatures: Vec<Pubkey>,
    /// Unix seconds
    pub created_at: i64,
    pub is_executed: bool,
    pub is_cancelled: bool,
    pub bump: u8,
}

impl EscrowRecord {
    /// Decode account bytes through the schema.
    pub fn decode(codec: &RecordCodec, bytes: &[u8]) -> Result<Self, CodecError> {
        Self::from_fields(&codec.decode_account(ESCROW_ACCOUNT, bytes)?)
    }

    pub fn encode(&self, codec: &RecordCodec) -> Result<Vec<u8>, CodecError> {
        codec.encode_account(ESCROW_ACCOUNT, &self.to_fields())
    }

    /// Build a record from decoded fields, checking the signature set.
    pub fn from_fields(fields: &FieldMap) -> Result<Self, CodecError> {
        let record = Self {
            depositor: fields.pubkey("depositor")?,
            recipient: fields.pubkey("recipient")?,
            mint: fields.pubkey("mint")?,
            amount: fields.unsigned("amount")?,
            required_signatures: fields.small("required_signatures")?,
            current_signatures: fields.small("current_signatures")?,
            signers: fields.pubkeys("signers")?,
            signatures: fields.pubkeys("signatures")?,
            created_at: fields.signed("created_at")?,
            is_executed: fields.boolean("is_executed")?,
            is_cancelled: fields.boolean("is_cancelled")?,
            bump: fields.small("bump")?,
        };

        if record.is_executed && record.is_cancelled {
            return Err(CodecError::ConflictingTerminalFlags);
        }
        let mut seen = HashSet::with_capacity(record.signatures.len());
        for signature in &record.signatures {
            if !seen.insert(signature) {
                return Err(CodecError::DuplicateSignature(*signature));
            }
            if !record.signers.contains(signature) {
                return Err(CodecError::ForeignSignature(*signature));
            }
        }
        Ok(record)
    }

    pub fn to_fields(&self) -> FieldMap {
        FieldMap::new()
            .with("depositor", self.depositor)
            .with("recipient", self.recipient)
            .with("mint", self.mint)
            .with("amount", self.amount)
            .with("required_signatures", self.required_signatures)
            .with("current_signatures", self.current_signatures)
            .with("signers", self.signers.as_slice())
            .with("signatures", self.signatures.as_slice())
            .with("created_at", self.created_at)
            .with("is_executed", self.is_executed)
            .with("is_cancelled", self.is_cancelled)
            .with("bump", self.bump)
    }

    /// Number of distinct signatures collected. Always derived from the set.
    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }

    /// Whether the program's cached count agrees with the signature set.
    pub fn signature_count_consistent(&self) -> bool {
        usize::from(self.current_signatures) == self.signatures.len()
    }

    /// Whether `identity` is the depositor, the recipient or a listed signer.
    pub fn involves(&self, identity: &Pubkey) -> bool {
        self.depositor == *identity || self.recipient == *identity || self.signers.contains(identity)
    }

    pub fn has_signed(&self, identity: &Pubkey) -> bool {
        self.signatures.contains(identity)
    }

    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.created_at, 0)
    }
}

/// Arguments of the `initialize` instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializeArgs {
    pub recipient: Pubkey,
    pub amount: u64,
    pub required_signatures: u8,
    pub signers: Vec<Pubkey>,
}

impl InitializeArgs {
    pub fn to_fields(&self) -> FieldMap {
        FieldMap::new()
            .with("recipient", self.recipient)
            .with("amount", self.amount)
            .with(QUORUM_FIELD, self.required_signatures)
            .with("signers", self.signers.as_slice())
    }

    pub fn from_fields(fields: &FieldMap) -> Result<Self, CodecError> {
        Ok(Self {
            recipient: fields.pubkey("recipient")?,
            amount: fields.unsigned("amount")?,
            required_signatures: fields.small(QUORUM_FIELD)?,
            signers: fields.pubkeys("signers")?,
        })
    }

    pub fn encode(&self, codec: &RecordCodec) -> Result<Vec<u8>, CodecError> {
        codec.encode_instruction(INITIALIZE, &self.to_fields())
    }
}

/// Caller input for creating an escrow. The depositor is the signing identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateEscrowParams {
    pub recipient: Pubkey,
    pub mint: Pubkey,
    pub amount: u64,
    /// Raw quorum as entered; narrowed only after validation
    pub required_signatures: usize,
    pub signers: Vec<Pubkey>,
}

impl CreateEscrowParams {
    /// Parse textual identities, naming the malformed field on failure.
    pub fn parse(
        recipient: &str,
        mint: &str,
        amount: u64,
        required_signatures: usize,
        signers: &[&str],
    ) -> Result<Self, EscrowError> {
        Ok(Self {
            recipient: parse_identity("recipient", recipient)?,
            mint: parse_identity("mint", mint)?,
            amount,
            required_signatures,
            signers: signers
                .iter()
                .map(|s| parse_identity("signers", s.trim()))
                .collect::<Result<_, _>>()?,
        })
    }

    /// Check every creation invariant and produce instruction arguments.
    pub fn validate(&self, depositor: &Pubkey) -> Result<InitializeArgs, ValidationError> {
        if self.signers.is_empty() {
            return Err(ValidationError::NoSigners);
        }
        if self.signers.len() > MAX_SIGNERS {
            return Err(ValidationError::TooManySigners(self.signers.len()));
        }
        let mut seen = HashSet::with_capacity(self.signers.len());
        if let Some(dup) = self.signers.iter().find(|s| !seen.insert(**s)) {
            return Err(ValidationError::DuplicateSigner(*dup));
        }
        if self.required_signatures == 0 {
            return Err(ValidationError::ZeroRequiredSignatures);
        }
        if self.required_signatures > self.signers.len() {
            return Err(ValidationError::RequiredExceedsSigners {
                required: self.required_signatures,
                signers: self.signers.len(),
            });
        }
        if self.recipient == *depositor {
            return Err(ValidationError::RecipientIsDepositor);
        }
        if self.amount == 0 {
            return Err(ValidationError::ZeroAmount);
        }

        let required_signatures = u8::try_from(self.required_signatures)
            .map_err(|_| ValidationError::TooManySigners(self.required_signatures))?;

        Ok(InitializeArgs {
            recipient: self.recipient,
            amount: self.amount,
            required_signatures,
            signers: self.signers.clone(),
        })
    }
}
