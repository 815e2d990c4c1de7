// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger RPC client.
//!
//! Implements [`LedgerGateway`] on top of the SDK's nonblocking
//! [`RpcClient`]. This layer only translates types and errors; request
//! encoding and transport belong to the SDK.

use std::time::Duration;

use solana_account_decoder_client_types::UiAccountEncoding;
use solana_rpc_client::nonblocking::rpc_client::RpcClient;
use solana_rpc_client_api::client_error::{Error as ClientError, ErrorKind as ClientErrorKind};
use solana_rpc_client_api::config::{
    RpcAccountInfoConfig, RpcProgramAccountsConfig, RpcSendTransactionConfig,
    RpcSimulateTransactionConfig,
};
use solana_rpc_client_api::filter::{Memcmp, RpcFilterType};
use solana_rpc_client_api::request::{RpcError, RpcResponseErrorData};
use solana_sdk::account::Account;

use super::gateway::{
    AccountData, Blockhash, ConfirmationStatus, GatewayError, LedgerGateway, ScanFilter,
    SimulationOutcome,
};
use super::pubkey::Pubkey;
use super::transactions::{Signature, Transaction};
use super::types::{Commitment, NetworkConfig};

/// Default per-request timeout.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON-RPC error code for "transaction simulation failed" during preflight.
const PREFLIGHT_FAILURE_CODE: i64 = -32002;

/// Resubmissions the RPC node may attempt on its own.
const NODE_MAX_RETRIES: usize = 3;

/// Ledger RPC client.
pub struct RpcGateway {
    /// Network configuration
    network: NetworkConfig,
    /// SDK RPC client
    rpc: RpcClient,
    /// Commitment used for reads, preflight and confirmation
    commitment: Commitment,
}

impl RpcGateway {
    /// Create a new client for the specified network.
    pub fn new(network: NetworkConfig, commitment: Commitment) -> Result<Self, GatewayError> {
        Self::with_timeout(network, commitment, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client with an explicit per-request timeout.
    pub fn with_timeout(
        network: NetworkConfig,
        commitment: Commitment,
        request_timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let url: url::Url = network
            .rpc_url
            .parse()
            .map_err(|e: url::ParseError| GatewayError::InvalidRpcUrl(e.to_string()))?;

        let rpc = RpcClient::new_with_timeout_and_commitment(
            url.to_string(),
            request_timeout,
            commitment.config(),
        );

        Ok(Self {
            network,
            rpc,
            commitment,
        })
    }

    /// Get the network configuration.
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    fn account_config(&self) -> RpcAccountInfoConfig {
        RpcAccountInfoConfig {
            encoding: Some(UiAccountEncoding::Base64),
            commitment: Some(self.commitment.config()),
            ..RpcAccountInfoConfig::default()
        }
    }
}

impl LedgerGateway for RpcGateway {
    async fn get_account(&self, address: &Pubkey) -> Result<Option<AccountData>, GatewayError> {
        let response = self
            .rpc
            .get_account_with_commitment(address, self.commitment.config())
            .await
            .map_err(map_client_error)?;
        Ok(response.value.map(account_data))
    }

    async fn scan_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[ScanFilter],
    ) -> Result<Vec<(Pubkey, AccountData)>, GatewayError> {
        let filters = filters
            .iter()
            .map(|f| match f {
                ScanFilter::Memcmp { offset, bytes } => {
                    RpcFilterType::Memcmp(Memcmp::new_raw_bytes(*offset, bytes.clone()))
                }
                ScanFilter::DataSize(size) => RpcFilterType::DataSize(*size),
            })
            .collect();

        let config = RpcProgramAccountsConfig {
            filters: Some(filters),
            account_config: self.account_config(),
            ..RpcProgramAccountsConfig::default()
        };

        tracing::trace!(program_id = %program_id, "Scanning program accounts");
        let accounts = self
            .rpc
            .get_program_accounts_with_config(program_id, config)
            .await
            .map_err(map_client_error)?;

        Ok(accounts
            .into_iter()
            .map(|(address, account)| (address, account_data(account)))
            .collect())
    }

    async fn latest_blockhash(&self) -> Result<Blockhash, GatewayError> {
        let (hash, last_valid_block_height) = self
            .rpc
            .get_latest_blockhash_with_commitment(self.commitment.config())
            .await
            .map_err(map_client_error)?;
        Ok(Blockhash {
            hash,
            last_valid_block_height,
        })
    }

    async fn simulate(&self, tx: &Transaction) -> Result<SimulationOutcome, GatewayError> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: true,
            commitment: Some(self.commitment.config()),
            ..RpcSimulateTransactionConfig::default()
        };
        let result = self
            .rpc
            .simulate_transaction_with_config(tx, config)
            .await
            .map_err(map_client_error)?
            .value;

        Ok(SimulationOutcome {
            err: result.err.map(|e| e.to_string()),
            logs: result.logs.unwrap_or_default(),
            units_consumed: result.units_consumed,
        })
    }

    async fn submit(&self, tx: &Transaction, skip_preflight: bool) -> Result<String, GatewayError> {
        let config = RpcSendTransactionConfig {
            skip_preflight,
            preflight_commitment: Some(self.commitment.config().commitment),
            max_retries: Some(NODE_MAX_RETRIES),
            ..RpcSendTransactionConfig::default()
        };
        let signature = self
            .rpc
            .send_transaction_with_config(tx, config)
            .await
            .map_err(map_client_error)?;
        Ok(signature.to_string())
    }

    async fn confirmation_status(&self, tx_id: &str) -> Result<ConfirmationStatus, GatewayError> {
        let signature: Signature = tx_id
            .parse()
            .map_err(|e| GatewayError::InvalidResponse(format!("transaction id `{tx_id}`: {e}")))?;

        let statuses = self
            .rpc
            .get_signature_statuses_with_history(&[signature])
            .await
            .map_err(map_client_error)?
            .value;

        let Some(status) = statuses.into_iter().next().flatten() else {
            return Ok(ConfirmationStatus::Pending);
        };

        if let Some(err) = &status.err {
            return Ok(ConfirmationStatus::Failed {
                reason: err.to_string(),
            });
        }

        Ok(if status.satisfies_commitment(self.commitment.config()) {
            ConfirmationStatus::Confirmed { slot: status.slot }
        } else {
            ConfirmationStatus::Pending
        })
    }
}

fn account_data(account: Account) -> AccountData {
    AccountData {
        owner: account.owner,
        lamports: account.lamports,
        data: account.data,
    }
}

/// Translate an SDK client error.
///
/// Preflight failures come back as an RPC error carrying the simulation
/// result; they become [`GatewayError::SimulationRejected`] with its logs.
fn map_client_error(e: ClientError) -> GatewayError {
    match e.kind() {
        ClientErrorKind::Reqwest(inner) if inner.is_timeout() => GatewayError::Timeout,
        ClientErrorKind::Reqwest(inner) => GatewayError::Transport(inner.to_string()),
        ClientErrorKind::Io(inner) => GatewayError::Transport(inner.to_string()),
        ClientErrorKind::RpcError(RpcError::RpcResponseError {
            code,
            message,
            data,
        }) => {
            let logs = match data {
                RpcResponseErrorData::SendTransactionPreflightFailure(result) => {
                    result.logs.clone().unwrap_or_default()
                }
                _ => Vec::new(),
            };
            if *code == PREFLIGHT_FAILURE_CODE {
                GatewayError::SimulationRejected {
                    reason: message.clone(),
                    logs,
                }
            } else {
                GatewayError::Rpc {
                    code: *code,
                    message: message.clone(),
                    logs,
                }
            }
        }
        ClientErrorKind::RpcError(RpcError::ParseError(message)) => {
            GatewayError::InvalidResponse(message.clone())
        }
        ClientErrorKind::SerdeJson(inner) => GatewayError::InvalidResponse(inner.to_string()),
        other => GatewayError::Transport(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpc_error(code: i64, message: &str) -> ClientError {
        ClientErrorKind::RpcError(RpcError::RpcResponseError {
            code,
            message: message.to_string(),
            data: RpcResponseErrorData::Empty,
        })
        .into()
    }

    #[test]
    fn rejects_invalid_rpc_url() {
        let mut network = NetworkConfig::devnet();
        network.rpc_url = "not a url".to_string();
        assert!(matches!(
            RpcGateway::new(network, Commitment::Confirmed),
            Err(GatewayError::InvalidRpcUrl(_))
        ));
    }

    #[test]
    fn builds_for_known_networks() {
        let gateway = RpcGateway::new(NetworkConfig::localnet(), Commitment::Finalized).unwrap();
        assert_eq!(gateway.network().name, "localnet");
        assert_eq!(
            gateway.account_config().encoding,
            Some(UiAccountEncoding::Base64)
        );
    }

    #[test]
    fn preflight_failure_is_a_simulation_rejection() {
        let err = map_client_error(rpc_error(
            PREFLIGHT_FAILURE_CODE,
            "Transaction simulation failed: Error processing Instruction 0",
        ));
        assert!(matches!(
            err,
            GatewayError::SimulationRejected { ref reason, .. } if reason.starts_with("Transaction simulation failed")
        ));
    }

    #[test]
    fn other_rpc_errors_keep_their_code() {
        let err = map_client_error(rpc_error(-32005, "Node is behind by 42 slots"));
        assert_eq!(
            err,
            GatewayError::Rpc {
                code: -32005,
                message: "Node is behind by 42 slots".into(),
                logs: vec![],
            }
        );
        assert!(!err.outcome_unknown());
    }

    #[test]
    fn unparseable_replies_are_invalid_responses() {
        let err = map_client_error(ClientErrorKind::RpcError(RpcError::ParseError("bad".into())).into());
        assert_eq!(err, GatewayError::InvalidResponse("bad".into()));

        let err = map_client_error(ClientErrorKind::Custom("socket closed".into()).into());
        assert!(err.outcome_unknown());
    }

    #[test]
    fn account_payload_is_carried_over() {
        let account = Account {
            lamports: 2_039_280,
            data: vec![1, 2, 3],
            owner: crate::blockchain::types::TOKEN_PROGRAM_ID,
            executable: false,
            rent_epoch: 0,
        };
        let data = account_data(account);
        assert_eq!(data.data, vec![1, 2, 3]);
        assert_eq!(data.lamports, 2_039_280);
        assert_eq!(data.owner.to_string(), "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
    }
}
