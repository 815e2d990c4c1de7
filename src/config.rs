// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the [`ClientConfig`] built from
//! them. The configuration is constructed once per session and passed
//! explicitly to the gateway and orchestrator.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `ESCROW_NETWORK` | Network preset (`devnet`, `mainnet`, `localnet`) | `devnet` |
//! | `ESCROW_RPC_URL` | JSON-RPC endpoint, overrides the preset URL | Preset URL |
//! | `ESCROW_PROGRAM_ID` | Deployed escrow program | `HQwzh6fp5GmYvKyy9j9nNXBJWtZnkcNQqjbqaSAGPCnG` |
//! | `ESCROW_COMMITMENT` | `processed`, `confirmed` or `finalized` | `confirmed` |
//! | `ESCROW_CONFIRM_TIMEOUT_SECS` | Confirmation polling window | `60` |
//! | `ESCROW_POLL_INTERVAL_MS` | Delay between confirmation polls | `500` |
//! | `ESCROW_SKIP_PREFLIGHT` | Skip simulation before the first submission attempt | `false` |
//! | `ESCROW_IDL_PATH` | Schema file overriding the embedded one | Embedded |
//! | `ESCROW_KEYPAIR` | JSON keypair file used by write commands | Required for writes |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::path::PathBuf;
use std::time::Duration;

use crate::blockchain::gateway::ConfirmPolicy;
use crate::blockchain::pubkey::{ParsePubkeyError, Pubkey};
use crate::blockchain::types::{Commitment, NetworkConfig, DEFAULT_ESCROW_PROGRAM_ID};

/// Network preset name.
pub const NETWORK_ENV: &str = "ESCROW_NETWORK";

/// JSON-RPC endpoint override.
pub const RPC_URL_ENV: &str = "ESCROW_RPC_URL";

/// Escrow program identity (base58).
pub const PROGRAM_ID_ENV: &str = "ESCROW_PROGRAM_ID";

/// Commitment level for reads, preflight and confirmation.
pub const COMMITMENT_ENV: &str = "ESCROW_COMMITMENT";

/// Confirmation polling window in seconds.
pub const CONFIRM_TIMEOUT_ENV: &str = "ESCROW_CONFIRM_TIMEOUT_SECS";

/// Delay between confirmation polls in milliseconds.
pub const POLL_INTERVAL_ENV: &str = "ESCROW_POLL_INTERVAL_MS";

/// When truthy, the simulate-first submission strategy is skipped.
pub const SKIP_PREFLIGHT_ENV: &str = "ESCROW_SKIP_PREFLIGHT";

/// Path to a schema file that replaces the embedded one.
pub const IDL_PATH_ENV: &str = "ESCROW_IDL_PATH";

/// Path to the signer's JSON keypair file.
///
/// Only read by the CLI. Key material never passes through [`ClientConfig`].
pub const KEYPAIR_ENV: &str = "ESCROW_KEYPAIR";

/// Logging format (`json` or `pretty`).
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_CONFIRM_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Session configuration for the escrow client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Ledger network
    pub network: NetworkConfig,
    /// Deployed escrow program
    pub program_id: Pubkey,
    /// Commitment for reads and confirmation
    pub commitment: Commitment,
    /// How long to wait for confirmation
    pub confirm_timeout: Duration,
    /// Delay between confirmation polls
    pub poll_interval: Duration,
    /// Whether the first submission strategy simulates before sending
    pub simulate_before_send: bool,
    /// Schema file overriding the embedded schema
    pub idl_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::devnet(),
            program_id: DEFAULT_ESCROW_PROGRAM_ID,
            commitment: Commitment::default(),
            confirm_timeout: Duration::from_secs(DEFAULT_CONFIRM_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            simulate_before_send: true,
            idl_path: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup(NETWORK_ENV) {
            config.network = NetworkConfig::from_name(&name)
                .map_err(|reason| ConfigError::Invalid { var: NETWORK_ENV, reason })?;
        }
        if let Some(url) = lookup(RPC_URL_ENV).filter(|u| !u.trim().is_empty()) {
            config.network.rpc_url = url.trim().to_string();
        }
        if let Some(raw) = lookup(PROGRAM_ID_ENV) {
            config.program_id = raw.trim().parse().map_err(|e: ParsePubkeyError| ConfigError::Invalid {
                var: PROGRAM_ID_ENV,
                reason: e.to_string(),
            })?;
        }
        if let Some(raw) = lookup(COMMITMENT_ENV) {
            config.commitment = Commitment::parse(&raw).ok_or_else(|| ConfigError::Invalid {
                var: COMMITMENT_ENV,
                reason: format!("unknown commitment `{raw}`"),
            })?;
        }
        if let Some(secs) = parse_u64(&lookup, CONFIRM_TIMEOUT_ENV)? {
            config.confirm_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_u64(&lookup, POLL_INTERVAL_ENV)? {
            if ms == 0 {
                return Err(ConfigError::Invalid {
                    var: POLL_INTERVAL_ENV,
                    reason: "must be greater than zero".to_string(),
                });
            }
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup(SKIP_PREFLIGHT_ENV) {
            config.simulate_before_send = !parse_bool(&raw).ok_or_else(|| ConfigError::Invalid {
                var: SKIP_PREFLIGHT_ENV,
                reason: format!("expected a boolean, got `{raw}`"),
            })?;
        }
        config.idl_path = lookup(IDL_PATH_ENV)
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        Ok(config)
    }

    /// Confirmation polling policy derived from this configuration.
    pub fn confirm_policy(&self) -> ConfirmPolicy {
        ConfirmPolicy {
            timeout: self.confirm_timeout,
            poll_interval: self.poll_interval,
        }
    }
}

fn parse_u64<F>(lookup: &F, var: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .map(|raw| {
            raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                var,
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}
