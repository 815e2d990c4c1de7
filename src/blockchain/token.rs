// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! SPL Token account views.
//!
//! Only the fixed prefix of the token and mint layouts is read:
//!
//! ```text
//! token account (165 bytes): mint[0..32] owner[32..64] amount u64 LE [64..72] ...
//! mint          (82 bytes):  authority option[0..36] supply u64 LE [36..44] decimals[44] ...
//! ```

use std::ops::Range;

use serde::Serialize;

use super::gateway::AccountData;
use super::pubkey::{as_base58, Pubkey};
use super::types::TOKEN_PROGRAM_ID;

/// Size of an SPL token account.
pub const TOKEN_ACCOUNT_LEN: u64 = 165;

/// Byte offset of the owner field in a token account.
pub const TOKEN_OWNER_OFFSET: usize = 32;

const MINT_RANGE: Range<usize> = 0..32;
const OWNER_RANGE: Range<usize> = TOKEN_OWNER_OFFSET..64;
const AMOUNT_RANGE: Range<usize> = 64..72;
const MINT_DECIMALS_OFFSET: usize = 44;
const MINT_LEN: usize = 82;

/// The fields of a token account the escrow flow cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAccount {
    pub mint: Pubkey,
    pub owner: Pubkey,
    /// Balance in the mint's smallest unit
    pub amount: u64,
}

impl TokenAccount {
    /// Read a token account. `None` when the account is not owned by the
    /// token program or is too short to be one.
    pub fn unpack(account: &AccountData) -> Option<Self> {
        if account.owner != TOKEN_PROGRAM_ID || account.data.len() < AMOUNT_RANGE.end {
            return None;
        }
        let data = &account.data;
        Some(Self {
            mint: Pubkey::try_from(&data[MINT_RANGE]).ok()?,
            owner: Pubkey::try_from(&data[OWNER_RANGE]).ok()?,
            amount: u64::from_le_bytes(data[AMOUNT_RANGE].try_into().ok()?),
        })
    }
}

/// Decimals of a mint account, if `account` is one.
pub fn mint_decimals(account: &AccountData) -> Option<u8> {
    if account.owner != TOKEN_PROGRAM_ID || account.data.len() != MINT_LEN {
        return None;
    }
    account.data.get(MINT_DECIMALS_OFFSET).copied()
}

/// Format a raw amount with `decimals` decimal places, trimming trailing zeros.
pub fn format_amount(amount: u64, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let amount = u128::from(amount);
    let (whole, remainder) = match 10u128.checked_pow(u32::from(decimals)) {
        Some(divisor) => (amount / divisor, amount % divisor),
        // Any u64 is below 10^39
        None => (0, amount),
    };
    if remainder == 0 {
        return whole.to_string();
    }
    let fraction = format!("{:0>width$}", remainder, width = decimals as usize);
    format!("{}.{}", whole, fraction.trim_end_matches('0'))
}

/// An identity's balance of one mint, held in its associated token account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    #[serde(serialize_with = "as_base58")]
    pub owner: Pubkey,
    #[serde(serialize_with = "as_base58")]
    pub mint: Pubkey,
    /// Associated token account holding the balance
    #[serde(serialize_with = "as_base58")]
    pub token_account: Pubkey,
    /// Balance in the mint's smallest unit
    pub amount: u64,
    pub decimals: u8,
    /// Balance formatted with decimals
    pub ui_amount: String,
}

/// One token account owned by an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenHolding {
    #[serde(serialize_with = "as_base58")]
    pub address: Pubkey,
    #[serde(serialize_with = "as_base58")]
    pub mint: Pubkey,
    pub amount: u64,
    /// Unknown when the mint account could not be read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_amount: Option<String>,
}
