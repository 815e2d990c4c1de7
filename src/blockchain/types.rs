// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger network configuration and well-known program identities.

use solana_sdk::commitment_config::CommitmentConfig;

use super::pubkey::Pubkey;

/// Ledger network configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Network name for display
    pub name: String,
    /// JSON-RPC endpoint URL
    pub rpc_url: String,
    /// Block explorer URL
    pub explorer_url: String,
    /// Query suffix appended to explorer links (cluster selector)
    pub explorer_cluster: Option<String>,
}

impl NetworkConfig {
    /// Public devnet cluster.
    pub fn devnet() -> Self {
        Self {
            name: "devnet".to_string(),
            rpc_url: "https://api.devnet.solana.com".to_string(),
            explorer_url: "https://explorer.solana.com".to_string(),
            explorer_cluster: Some("devnet".to_string()),
        }
    }

    /// Public mainnet-beta cluster.
    pub fn mainnet() -> Self {
        Self {
            name: "mainnet-beta".to_string(),
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            explorer_url: "https://explorer.solana.com".to_string(),
            explorer_cluster: None,
        }
    }

    /// Local test validator.
    pub fn localnet() -> Self {
        Self {
            name: "localnet".to_string(),
            rpc_url: "http://127.0.0.1:8899".to_string(),
            explorer_url: "https://explorer.solana.com".to_string(),
            explorer_cluster: Some("custom".to_string()),
        }
    }

    /// Resolve a network by its short name.
    pub fn from_name(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "devnet" => Ok(Self::devnet()),
            "mainnet" | "mainnet-beta" => Ok(Self::mainnet()),
            "localnet" | "localhost" => Ok(Self::localnet()),
            other => Err(format!(
                "Unknown network `{other}` (expected devnet, mainnet or localnet)"
            )),
        }
    }

    /// Explorer link for a transaction id.
    pub fn explorer_tx_url(&self, tx_id: &str) -> String {
        match &self.explorer_cluster {
            Some(cluster) => format!("{}/tx/{}?cluster={}", self.explorer_url, tx_id, cluster),
            None => format!("{}/tx/{}", self.explorer_url, tx_id),
        }
    }
}

/// The system program.
pub const SYSTEM_PROGRAM_ID: Pubkey = solana_sdk::system_program::ID;

/// SPL Token program (`TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA`).
pub const TOKEN_PROGRAM_ID: Pubkey = Pubkey::new_from_array([
    6, 221, 246, 225, 215, 101, 161, 147, 217, 203, 225, 70, 206, 235, 121, 172, 28, 180, 133, 237,
    95, 91, 55, 145, 58, 140, 245, 133, 126, 255, 0, 169,
]);

/// Associated Token Account program (`ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJe1bTu`).
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey = Pubkey::new_from_array([
    140, 151, 37, 143, 78, 36, 137, 241, 187, 61, 16, 41, 20, 142, 13, 131, 11, 90, 19, 153, 218,
    255, 16, 132, 4, 142, 123, 216, 238, 183, 148, 144,
]);

/// Rent sysvar.
pub const RENT_SYSVAR_ID: Pubkey = solana_sdk::sysvar::rent::ID;

/// Deployed multisig escrow program (`HQwzh6fp5GmYvKyy9j9nNXBJWtZnkcNQqjbqaSAGPCnG`).
pub const DEFAULT_ESCROW_PROGRAM_ID: Pubkey = Pubkey::new_from_array([
    243, 221, 136, 56, 114, 228, 54, 230, 163, 48, 216, 102, 174, 50, 177, 231, 98, 45, 229, 196,
    16, 185, 148, 123, 68, 211, 27, 174, 46, 99, 115, 141,
]);

/// Commitment level used for reads, simulation and confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "processed" => Some(Commitment::Processed),
            "confirmed" => Some(Commitment::Confirmed),
            "finalized" => Some(Commitment::Finalized),
            _ => None,
        }
    }

    /// The SDK form, for RPC calls.
    pub fn config(&self) -> CommitmentConfig {
        match self {
            Commitment::Processed => CommitmentConfig::processed(),
            Commitment::Confirmed => CommitmentConfig::confirmed(),
            Commitment::Finalized => CommitmentConfig::finalized(),
        }
    }
}

impl Default for Commitment {
    fn default() -> Self {
        Self::Confirmed
    }
}
