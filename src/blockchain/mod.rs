// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger integration.
//!
//! This module provides functionality for:
//! - Escrow, vault and token account address derivation
//! - Single-instruction transaction assembly and signing
//! - SPL Token account and mint views
//! - Talking to the ledger over RPC through [`LedgerGateway`]

pub mod client;
pub mod gateway;
pub mod pda;
pub mod pubkey;
pub mod signing;
pub mod token;
pub mod transactions;
pub mod types;

pub use client::RpcGateway;
pub use gateway::{
    await_confirmation, AccountData, ConfirmPolicy, ConfirmWaitError, ConfirmationStatus,
    GatewayError, LedgerGateway, ScanFilter,
};
pub use pda::{
    derive_associated_token_address, derive_escrow_address, derive_escrow_address_from_str,
    derive_vault_address, DerivationError,
};
pub use pubkey::{ParsePubkeyError, Pubkey};
pub use signing::{KeypairSigner, SignerError, TransactionSigner};
pub use token::{TokenBalance, TokenHolding};
pub use types::*;
