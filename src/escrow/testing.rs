// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory ledger for tests.
//!
//! Holds accounts in a map, answers scans with local filtering, and lets a
//! test script the next simulate / submit / confirmation outcomes. When bound
//! to a program it also applies accepted escrow instructions, so a test can
//! create, sign and execute against it end to end.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use super::codec::RecordCodec;
use super::record::{EscrowRecord, InitializeArgs};
use super::schema::{CANCEL, EXECUTE, INITIALIZE, SIGN};
use super::state;
use crate::blockchain::gateway::{
    AccountData, Blockhash, ConfirmationStatus, GatewayError, LedgerGateway, ScanFilter,
    SimulationOutcome,
};
use crate::blockchain::pubkey::Pubkey;
use crate::blockchain::token::TOKEN_ACCOUNT_LEN;
use crate::blockchain::transactions::{transaction_id, Hash, Transaction};
use crate::blockchain::types::TOKEN_PROGRAM_ID;

/// Scripted simulation outcome.
#[derive(Debug, Clone)]
pub(crate) enum Scripted {
    Pass,
    ProgramError { reason: String, logs: Vec<String> },
    Fail(GatewayError),
}

/// Scripted `submit` failure.
#[derive(Debug, Clone)]
pub(crate) enum SubmitReply {
    /// The node refuses the transaction; nothing lands.
    Reject(GatewayError),
    /// The transaction lands but the reply is lost and the caller sees this error.
    Lost(GatewayError),
}

/// A transaction handed to `submit`.
#[derive(Debug, Clone)]
pub(crate) struct Submission {
    pub tx: Transaction,
    pub skip_preflight: bool,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<Pubkey, AccountData>,
    simulations: VecDeque<Scripted>,
    submits: VecDeque<SubmitReply>,
    confirmations: VecDeque<Result<ConfirmationStatus, GatewayError>>,
    /// Answer to every confirmation poll once `confirmations` is drained
    stalled: Option<Result<ConfirmationStatus, GatewayError>>,
    submissions: Vec<Submission>,
    /// Transactions that landed successfully
    landed: HashSet<String>,
    /// Landed-but-failed transactions and their program error
    failed: HashMap<String, String>,
    blockhashes: u8,
    simulate_calls: usize,
    scan_calls: usize,
    program: Option<(RecordCodec, Pubkey)>,
}

pub(crate) struct MemoryLedger {
    inner: Mutex<Inner>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Apply accepted instructions for `program_id` to stored escrow records.
    pub fn with_program(codec: RecordCodec, program_id: Pubkey) -> Self {
        let ledger = Self::new();
        ledger.inner.lock().unwrap().program = Some((codec, program_id));
        ledger
    }

    pub fn script_simulation(&self, outcome: Scripted) {
        self.inner.lock().unwrap().simulations.push_back(outcome);
    }

    pub fn script_submit(&self, reply: SubmitReply) {
        self.inner.lock().unwrap().submits.push_back(reply);
    }

    pub fn script_confirmation(&self, outcome: Result<ConfirmationStatus, GatewayError>) {
        self.inner.lock().unwrap().confirmations.push_back(outcome);
    }

    /// Answer every later confirmation poll with `outcome`.
    pub fn stall_confirmations(&self, outcome: Result<ConfirmationStatus, GatewayError>) {
        self.inner.lock().unwrap().stalled = Some(outcome);
    }

    pub fn put_account(&self, address: Pubkey, account: AccountData) {
        self.inner.lock().unwrap().accounts.insert(address, account);
    }

    /// Store an escrow record owned by `program_id`.
    pub fn put_escrow(&self, codec: &RecordCodec, program_id: Pubkey, address: Pubkey, record: &EscrowRecord) {
        self.put_account(
            address,
            AccountData {
                owner: program_id,
                lamports: 1_000_000,
                data: record.encode(codec).unwrap(),
            },
        );
    }

    /// Store an SPL token account.
    pub fn put_token_account(&self, address: Pubkey, mint: Pubkey, owner: Pubkey, amount: u64) {
        let mut data = Vec::with_capacity(TOKEN_ACCOUNT_LEN as usize);
        data.extend_from_slice(mint.as_ref());
        data.extend_from_slice(owner.as_ref());
        data.extend_from_slice(&amount.to_le_bytes());
        data.resize(TOKEN_ACCOUNT_LEN as usize, 0);
        self.put_account(
            address,
            AccountData {
                owner: TOKEN_PROGRAM_ID,
                lamports: 2_039_280,
                data,
            },
        );
    }

    /// Store an SPL mint with `decimals`.
    pub fn put_mint(&self, address: Pubkey, decimals: u8) {
        let mut data = vec![0u8; 82];
        data[44] = decimals;
        // is_initialized
        data[45] = 1;
        self.put_account(
            address,
            AccountData {
                owner: TOKEN_PROGRAM_ID,
                lamports: 1_461_600,
                data,
            },
        );
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.inner.lock().unwrap().submissions.clone()
    }

    pub fn simulate_calls(&self) -> usize {
        self.inner.lock().unwrap().simulate_calls
    }

    pub fn scan_calls(&self) -> usize {
        self.inner.lock().unwrap().scan_calls
    }
}

impl Inner {
    /// Apply every escrow instruction in `tx`, as the program would.
    fn apply(&mut self, tx: &Transaction) -> Result<(), String> {
        let Some((codec, program_id)) = self.program.clone() else {
            return Ok(());
        };
        let keys = &tx.message.account_keys;
        for ix in &tx.message.instructions {
            if keys.get(ix.program_id_index as usize) != Some(&program_id) {
                continue;
            }
            let account = |i: usize| keys[ix.accounts[i] as usize];
            let (name, fields) = codec.decode_instruction(&ix.data).map_err(|e| e.to_string())?;
            let escrow = account(0);

            let next = if name == INITIALIZE {
                if self.accounts.contains_key(&escrow) {
                    return Err(format!("Allocate: account {escrow} already in use"));
                }
                let args = InitializeArgs::from_fields(&fields).map_err(|e| e.to_string())?;
                EscrowRecord {
                    depositor: account(1),
                    recipient: args.recipient,
                    mint: account(4),
                    amount: args.amount,
                    required_signatures: args.required_signatures,
                    current_signatures: 0,
                    signers: args.signers,
                    signatures: Vec::new(),
                    created_at: 1_700_000_000,
                    is_executed: false,
                    is_cancelled: false,
                    bump: 255,
                }
            } else {
                let current = self
                    .accounts
                    .get(&escrow)
                    .ok_or_else(|| "AccountNotInitialized".to_string())
                    .and_then(|acc| EscrowRecord::decode(&codec, &acc.data).map_err(|e| e.to_string()))?;
                let transition = match name.as_str() {
                    SIGN => state::sign(&current, &account(1)),
                    EXECUTE => state::execute(&current),
                    CANCEL => state::cancel(&current, &account(3)),
                    other => return Err(format!("InstructionFallbackNotFound: {other}")),
                };
                transition.map_err(|e| format!("Program log: Error: {e}"))?
            };

            let data = next.encode(&codec).map_err(|e| e.to_string())?;
            self.accounts.insert(
                escrow,
                AccountData {
                    owner: program_id,
                    lamports: 1_000_000,
                    data,
                },
            );
        }
        Ok(())
    }
}

impl LedgerGateway for MemoryLedger {
    async fn get_account(&self, address: &Pubkey) -> Result<Option<AccountData>, GatewayError> {
        Ok(self.inner.lock().unwrap().accounts.get(address).cloned())
    }

    async fn scan_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[ScanFilter],
    ) -> Result<Vec<(Pubkey, AccountData)>, GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        inner.scan_calls += 1;
        let mut found: Vec<(Pubkey, AccountData)> = inner
            .accounts
            .iter()
            .filter(|(_, acc)| acc.owner == *program_id)
            .filter(|(_, acc)| filters.iter().all(|f| f.matches(&acc.data)))
            .map(|(k, acc)| (*k, acc.clone()))
            .collect();
        found.sort_by_key(|(k, _)| *k);
        Ok(found)
    }

    async fn latest_blockhash(&self) -> Result<Blockhash, GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        inner.blockhashes = inner.blockhashes.wrapping_add(1);
        Ok(Blockhash {
            hash: Hash::new_from_array([inner.blockhashes; 32]),
            last_valid_block_height: 100 + u64::from(inner.blockhashes),
        })
    }

    async fn simulate(&self, tx: &Transaction) -> Result<SimulationOutcome, GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        inner.simulate_calls += 1;
        match inner.simulations.pop_front().unwrap_or(Scripted::Pass) {
            Scripted::Pass => {
                // Dry-run the effects on a copy of the ledger
                let mut dry = Inner {
                    accounts: inner.accounts.clone(),
                    program: inner.program.clone(),
                    ..Inner::default()
                };
                Ok(match dry.apply(tx) {
                    Ok(()) => SimulationOutcome {
                        err: None,
                        logs: vec!["Program log: ok".to_string()],
                        units_consumed: Some(5_000),
                    },
                    Err(reason) => SimulationOutcome {
                        err: Some("custom program error".to_string()),
                        logs: vec![reason],
                        units_consumed: Some(5_000),
                    },
                })
            }
            Scripted::ProgramError { reason, logs } => Ok(SimulationOutcome {
                err: Some(reason),
                logs,
                units_consumed: None,
            }),
            Scripted::Fail(e) => Err(e),
        }
    }

    async fn submit(&self, tx: &Transaction, skip_preflight: bool) -> Result<String, GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        let lost = match inner.submits.pop_front() {
            Some(SubmitReply::Reject(e)) => return Err(e),
            Some(SubmitReply::Lost(e)) => Some(e),
            None => None,
        };
        let tx_id = transaction_id(tx)
            .ok_or_else(|| GatewayError::InvalidResponse("unsigned transaction".to_string()))?;

        match inner.apply(tx) {
            Ok(()) => {
                inner.landed.insert(tx_id.clone());
            }
            Err(reason) if !skip_preflight => {
                return Err(GatewayError::SimulationRejected {
                    reason: "Transaction simulation failed".to_string(),
                    logs: vec![reason],
                });
            }
            // Without preflight the transaction lands and fails on-chain
            Err(reason) => {
                inner.failed.insert(tx_id.clone(), reason);
            }
        }
        inner.submissions.push(Submission {
            tx: tx.clone(),
            skip_preflight,
        });
        match lost {
            Some(e) => Err(e),
            None => Ok(tx_id),
        }
    }

    async fn confirmation_status(&self, tx_id: &str) -> Result<ConfirmationStatus, GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(scripted) = inner.confirmations.pop_front() {
            return scripted;
        }
        if let Some(stalled) = &inner.stalled {
            return stalled.clone();
        }
        Ok(if let Some(reason) = inner.failed.get(tx_id) {
            ConfirmationStatus::Failed {
                reason: reason.clone(),
            }
        } else if inner.landed.contains(tx_id) {
            ConfirmationStatus::Confirmed { slot: 1 }
        } else {
            ConfirmationStatus::Pending
        })
    }
}
