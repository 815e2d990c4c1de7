// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transaction signing capability.
//!
//! Key custody lives outside this crate: the orchestrator only needs
//! something that can report its identity and turn an unsigned transaction
//! into a signed one. [`KeypairSigner`] is the local implementation used by
//! the CLI and tests; wallet adapters implement [`TransactionSigner`]
//! themselves.

use std::future::Future;
use std::path::Path;

use solana_sdk::signer::keypair::{keypair_from_seed, read_keypair, read_keypair_file, Keypair};
use solana_sdk::signer::Signer;

use super::pubkey::Pubkey;
use super::transactions::Transaction;

/// Anything that can sign ledger transactions for one identity.
pub trait TransactionSigner: Send + Sync {
    /// The identity whose signature this signer produces.
    fn pubkey(&self) -> Pubkey;

    /// Sign `tx`, filling this identity's signature slot.
    fn sign_transaction(
        &self,
        tx: Transaction,
    ) -> impl Future<Output = Result<Transaction, SignerError>> + Send;
}

/// In-process keypair signer.
pub struct KeypairSigner {
    keypair: Keypair,
}

impl KeypairSigner {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    /// Build a signer from a 32-byte secret seed.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, SignerError> {
        let keypair = keypair_from_seed(seed).map_err(|e| SignerError::InvalidKeypair(e.to_string()))?;
        Ok(Self::new(keypair))
    }

    /// Parse the JSON byte-array keypair format written by the ledger CLI.
    pub fn from_json(json: &str) -> Result<Self, SignerError> {
        let keypair = read_keypair(&mut json.as_bytes())
            .map_err(|e| SignerError::InvalidKeypair(format!("Invalid keypair JSON: {e}")))?;
        Ok(Self::new(keypair))
    }

    /// Load a keypair file from disk.
    pub fn from_file(path: &Path) -> Result<Self, SignerError> {
        let keypair = read_keypair_file(path).map_err(|e| {
            SignerError::InvalidKeypair(format!("Failed to read {}: {e}", path.display()))
        })?;
        Ok(Self::new(keypair))
    }
}

impl TransactionSigner for KeypairSigner {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign_transaction(&self, mut tx: Transaction) -> Result<Transaction, SignerError> {
        let blockhash = tx.message.recent_blockhash;
        tx.try_partial_sign(&[&self.keypair], blockhash)
            .map_err(|e| SignerError::NotRequired(e.to_string()))?;
        Ok(tx)
    }
}

/// Errors that can occur while signing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignerError {
    #[error("Invalid keypair: {0}")]
    InvalidKeypair(String),

    #[error("Signer is not required by this transaction: {0}")]
    NotRequired(String),

    #[error("Signing request was rejected: {0}")]
    Rejected(String),
}
