// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The ledger boundary.
//!
//! [`LedgerGateway`] is the only seam between the escrow core and the
//! network. The core never retries or pools connections here; it only
//! decides how and in which order these primitives are used.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::pubkey::Pubkey;
use super::transactions::{Hash, Transaction};

/// Raw account state as stored on the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountData {
    /// Program that owns the account
    pub owner: Pubkey,
    /// Native balance
    pub lamports: u64,
    /// Account data bytes
    pub data: Vec<u8>,
}

/// Server-side filter for account scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanFilter {
    /// Account data at `offset` must equal `bytes`.
    Memcmp { offset: usize, bytes: Vec<u8> },
    /// Account data must be exactly this many bytes.
    DataSize(u64),
}

impl ScanFilter {
    /// Evaluate the filter locally (used by in-memory gateways).
    pub fn matches(&self, data: &[u8]) -> bool {
        match self {
            ScanFilter::Memcmp { offset, bytes } => data
                .get(*offset..offset.saturating_add(bytes.len()))
                .map(|window| window == bytes.as_slice())
                .unwrap_or(false),
            ScanFilter::DataSize(size) => data.len() as u64 == *size,
        }
    }
}

/// A recent blockhash and the last block height at which it is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blockhash {
    pub hash: Hash,
    pub last_valid_block_height: u64,
}

/// Result of a pre-submission simulation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SimulationOutcome {
    /// Program error, if the simulated transaction failed
    pub err: Option<String>,
    /// Program log lines
    pub logs: Vec<String>,
    /// Compute units consumed
    pub units_consumed: Option<u64>,
}

/// Status of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationStatus {
    /// Not yet seen at the requested commitment
    Pending,
    /// Landed successfully
    Confirmed { slot: u64 },
    /// Landed but the program returned an error
    Failed { reason: String },
}

/// Errors surfaced by the ledger boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,

    #[error("RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        logs: Vec<String>,
    },

    #[error("Simulation rejected: {reason}")]
    SimulationRejected { reason: String, logs: Vec<String> },

    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Whether a `submit` that failed this way may still have delivered the
    /// transaction. Only a missing reply is ambiguous; an RPC error or a
    /// preflight rejection is an answer.
    pub fn outcome_unknown(&self) -> bool {
        matches!(self, GatewayError::Timeout | GatewayError::Transport(_))
    }

    /// Program logs attached to the error, if any.
    pub fn logs(&self) -> &[String] {
        match self {
            GatewayError::Rpc { logs, .. } | GatewayError::SimulationRejected { logs, .. } => logs,
            _ => &[],
        }
    }
}

/// Consumed interface of the ledger RPC.
pub trait LedgerGateway: Send + Sync {
    /// Fetch one account. `Ok(None)` means the account does not exist.
    fn get_account(
        &self,
        address: &Pubkey,
    ) -> impl Future<Output = Result<Option<AccountData>, GatewayError>> + Send;

    /// List every account owned by `program_id` that passes all filters.
    fn scan_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[ScanFilter],
    ) -> impl Future<Output = Result<Vec<(Pubkey, AccountData)>, GatewayError>> + Send;

    /// Recent blockhash for building a transaction.
    fn latest_blockhash(&self) -> impl Future<Output = Result<Blockhash, GatewayError>> + Send;

    /// Simulate a signed transaction without landing it.
    fn simulate(
        &self,
        tx: &Transaction,
    ) -> impl Future<Output = Result<SimulationOutcome, GatewayError>> + Send;

    /// Submit a signed transaction and return its id.
    fn submit(
        &self,
        tx: &Transaction,
        skip_preflight: bool,
    ) -> impl Future<Output = Result<String, GatewayError>> + Send;

    /// One status poll for a submitted transaction.
    fn confirmation_status(
        &self,
        tx_id: &str,
    ) -> impl Future<Output = Result<ConfirmationStatus, GatewayError>> + Send;
}

/// How long and how often to poll for confirmation.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ConfirmPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Why a confirmation wait ended without a definitive answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmWaitError {
    /// The polling window elapsed
    TimedOut,
    /// The caller abandoned the wait
    Cancelled,
    /// Polling itself failed
    Gateway(GatewayError),
}

/// Poll until the transaction is confirmed, fails, times out, or the caller
/// cancels. Transient poll errors are retried until the window closes; if
/// the most recent poll failed, that error is reported instead of a timeout.
pub async fn await_confirmation<G: LedgerGateway>(
    gateway: &G,
    tx_id: &str,
    policy: ConfirmPolicy,
    cancel: &CancellationToken,
) -> Result<ConfirmationStatus, ConfirmWaitError> {
    let deadline = tokio::time::Instant::now() + policy.timeout;
    let mut last_error;

    loop {
        match gateway.confirmation_status(tx_id).await {
            Ok(ConfirmationStatus::Pending) => last_error = None,
            Ok(status) => return Ok(status),
            Err(e) => {
                tracing::debug!(tx_id = %tx_id, error = %e, "Confirmation poll failed, will retry");
                last_error = Some(e);
            }
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(match last_error {
                Some(e) => ConfirmWaitError::Gateway(e),
                None => ConfirmWaitError::TimedOut,
            });
        }

        tokio::select! {
            _ = tokio::time::sleep(policy.poll_interval) => {},
            _ = cancel.cancelled() => return Err(ConfirmWaitError::Cancelled),
        }
    }
}
