// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Escrow address derivation.
//!
//! Escrow records, their custody vaults and the depositor/recipient token
//! accounts all live at program-derived addresses. The bump search itself is
//! the SDK's; this module owns the seed layouts.

use solana_sdk::pubkey::{MAX_SEEDS, MAX_SEED_LEN};

use super::pubkey::{ParsePubkeyError, Pubkey};
use super::types::{ASSOCIATED_TOKEN_PROGRAM_ID, TOKEN_PROGRAM_ID};

/// Seed prefix for escrow records.
pub const ESCROW_SEED: &[u8] = b"escrow";

/// Seed prefix for the custody vault of an escrow.
pub const VAULT_SEED: &[u8] = b"vault";

/// Errors raised while deriving addresses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DerivationError {
    #[error("malformed identity for `{field}`: {source}")]
    MalformedIdentity {
        field: &'static str,
        #[source]
        source: ParsePubkeyError,
    },

    #[error("seed {0} exceeds 32 bytes")]
    SeedTooLong(usize),

    #[error("too many seeds ({0}, max 16)")]
    TooManySeeds(usize),

    #[error("no bump produced an off-curve address")]
    NoViableBump,
}

/// Parse a textual identity, naming the field on failure.
pub fn parse_identity(field: &'static str, raw: &str) -> Result<Pubkey, DerivationError> {
    raw.trim()
        .parse()
        .map_err(|source| DerivationError::MalformedIdentity { field, source })
}

/// Canonical `(address, bump)` for `seeds` under `program_id`.
///
/// Seed limits are checked up front so an oversized seed is reported as such
/// rather than as an exhausted bump search.
pub fn find_program_address(
    seeds: &[&[u8]],
    program_id: &Pubkey,
) -> Result<(Pubkey, u8), DerivationError> {
    // One slot is reserved for the bump
    if seeds.len() >= MAX_SEEDS {
        return Err(DerivationError::TooManySeeds(seeds.len() + 1));
    }
    if let Some(index) = seeds.iter().position(|seed| seed.len() > MAX_SEED_LEN) {
        return Err(DerivationError::SeedTooLong(index));
    }
    Pubkey::try_find_program_address(seeds, program_id).ok_or(DerivationError::NoViableBump)
}

/// Escrow record address: seeds `["escrow", recipient, depositor]`.
pub fn derive_escrow_address(
    recipient: &Pubkey,
    depositor: &Pubkey,
    program_id: &Pubkey,
) -> Result<(Pubkey, u8), DerivationError> {
    find_program_address(&[ESCROW_SEED, recipient.as_ref(), depositor.as_ref()], program_id)
}

/// Custody vault address: seeds `["vault", escrow]`.
pub fn derive_vault_address(
    escrow: &Pubkey,
    program_id: &Pubkey,
) -> Result<(Pubkey, u8), DerivationError> {
    find_program_address(&[VAULT_SEED, escrow.as_ref()], program_id)
}

/// Associated token account for a wallet + mint pair under the SPL Token program.
pub fn derive_associated_token_address(
    owner: &Pubkey,
    mint: &Pubkey,
) -> Result<Pubkey, DerivationError> {
    let (address, _) = find_program_address(
        &[owner.as_ref(), TOKEN_PROGRAM_ID.as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )?;
    Ok(address)
}

/// Textual front door: parse every identity, then derive the escrow address.
pub fn derive_escrow_address_from_str(
    recipient: &str,
    depositor: &str,
    program_id: &str,
) -> Result<Pubkey, DerivationError> {
    let recipient = parse_identity("recipient", recipient)?;
    let depositor = parse_identity("depositor", depositor)?;
    let program_id = parse_identity("program_id", program_id)?;
    derive_escrow_address(&recipient, &depositor, &program_id).map(|(address, _)| address)
}
