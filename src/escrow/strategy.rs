// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ordered submission fallback chain.
//!
//! A write is described once as an [`InstructionPlan`]. Each [`Strategy`]
//! turns that plan into a signed transaction and hands it to the ledger in
//! its own way. Strategies run in order; the chain moves on only when an
//! attempt fails with a retryable error, and stops at the first terminal one.
//! When every strategy fails, the most specific error seen is returned.
//!
//! A send whose reply never arrived may still land. Its transaction id is
//! kept, and before any further strategy re-signs, the ledger is asked
//! whether that transaction went through. If it did, it is the result. If
//! the chain ends while it is still unseen, the caller gets its id in a
//! [`EscrowError::Confirmation`] instead of an unrelated error.

use std::fmt;

use super::codec::{encode_initialize_manual, CodecError, FieldMap, RecordCodec};
use super::record::InitializeArgs;
use crate::blockchain::gateway::{ConfirmationStatus, GatewayError, LedgerGateway};
use crate::blockchain::pubkey::Pubkey;
use crate::blockchain::signing::{SignerError, TransactionSigner};
use crate::blockchain::transactions::{transaction_id, unsigned_transaction, AccountMeta, Instruction};
use crate::blockchain::types::{RENT_SYSVAR_ID, SYSTEM_PROGRAM_ID, TOKEN_PROGRAM_ID};
use crate::error::{classify, classify_program_failure, ConfirmationFailure, EscrowError};

/// One way of getting an instruction onto the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Schema-encoded, simulated before a preflighted send
    SchemaSimulated,
    /// Schema-encoded, sent without simulation or preflight
    SchemaDirect,
    /// Hand-encoded `initialize`, simulated after signing, then sent
    Manual,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::SchemaSimulated => "schema_simulated",
            Strategy::SchemaDirect => "schema_direct",
            Strategy::Manual => "manual",
        }
    }

    fn simulates(&self) -> bool {
        matches!(self, Strategy::SchemaSimulated | Strategy::Manual)
    }

    fn skip_preflight(&self) -> bool {
        matches!(self, Strategy::SchemaDirect)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Strategies for `initialize`.
pub fn create_chain(simulate_first: bool) -> Vec<Strategy> {
    let mut chain = Vec::with_capacity(3);
    if simulate_first {
        chain.push(Strategy::SchemaSimulated);
    }
    chain.push(Strategy::SchemaDirect);
    chain.push(Strategy::Manual);
    chain
}

/// Strategies for `sign`, `execute` and `cancel`.
pub fn single_chain(simulate_first: bool) -> Vec<Strategy> {
    if simulate_first {
        vec![Strategy::SchemaSimulated]
    } else {
        vec![Strategy::SchemaDirect]
    }
}

/// Accounts of `initialize`, for hand assembly.
#[derive(Debug, Clone)]
pub struct InitializeAccounts {
    pub escrow: Pubkey,
    pub depositor: Pubkey,
    pub depositor_token_account: Pubkey,
    pub escrow_vault: Pubkey,
    pub mint: Pubkey,
}

impl InitializeAccounts {
    /// Named accounts, for schema-driven assembly.
    pub fn named(&self) -> Vec<(&'static str, Pubkey)> {
        vec![
            ("escrow", self.escrow),
            ("depositor", self.depositor),
            ("depositor_token_account", self.depositor_token_account),
            ("escrow_vault", self.escrow_vault),
            ("mint", self.mint),
            ("token_program", TOKEN_PROGRAM_ID),
            ("system_program", SYSTEM_PROGRAM_ID),
            ("rent", RENT_SYSVAR_ID),
        ]
    }

    fn metas(&self) -> Vec<AccountMeta> {
        vec![
            AccountMeta::new(self.escrow, false),
            AccountMeta::new(self.depositor, true),
            AccountMeta::new(self.depositor_token_account, false),
            AccountMeta::new(self.escrow_vault, false),
            AccountMeta::new_readonly(self.mint, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            AccountMeta::new_readonly(RENT_SYSVAR_ID, false),
        ]
    }
}

/// Everything needed to build one escrow instruction, independent of strategy.
#[derive(Debug, Clone)]
pub struct InstructionPlan {
    /// Schema instruction name
    pub name: &'static str,
    /// Escrow the instruction targets
    pub escrow: Pubkey,
    pub args: FieldMap,
    pub accounts: Vec<(&'static str, Pubkey)>,
    /// Present only for `initialize`
    pub manual: Option<(InitializeArgs, InitializeAccounts)>,
}

impl InstructionPlan {
    /// Plan for an instruction without a hand-encoded alternative.
    pub fn new(name: &'static str, escrow: Pubkey, accounts: Vec<(&'static str, Pubkey)>) -> Self {
        Self {
            name,
            escrow,
            args: FieldMap::new(),
            accounts,
            manual: None,
        }
    }

    /// Plan for `initialize`.
    pub fn initialize(args: InitializeArgs, accounts: InitializeAccounts) -> Self {
        Self {
            name: super::schema::INITIALIZE,
            escrow: accounts.escrow,
            args: args.to_fields(),
            accounts: accounts.named(),
            manual: Some((args, accounts)),
        }
    }

    /// Build the instruction the way `strategy` does. `None` when the
    /// strategy has nothing to offer for this plan.
    pub fn build(
        &self,
        strategy: Strategy,
        codec: &RecordCodec,
        program_id: &Pubkey,
    ) -> Option<Result<Instruction, CodecError>> {
        match strategy {
            Strategy::SchemaSimulated | Strategy::SchemaDirect => {
                Some(self.build_from_schema(codec, program_id))
            }
            Strategy::Manual => self.manual.as_ref().map(|(args, accounts)| {
                let data = encode_initialize_manual(
                    &args.recipient,
                    args.amount,
                    args.required_signatures,
                    &args.signers,
                )?;
                Ok(Instruction {
                    program_id: *program_id,
                    accounts: accounts.metas(),
                    data,
                })
            }),
        }
    }

    fn build_from_schema(&self, codec: &RecordCodec, program_id: &Pubkey) -> Result<Instruction, CodecError> {
        let def = codec
            .schema()
            .instruction(self.name)
            .ok_or_else(|| CodecError::UnknownInstruction(self.name.to_string()))?;

        let accounts = def
            .accounts
            .iter()
            .map(|slot| {
                let pubkey = self
                    .accounts
                    .iter()
                    .find(|(name, _)| *name == slot.name)
                    .map(|(_, key)| *key)
                    .ok_or_else(|| CodecError::MissingAccount(slot.name.clone()))?;
                Ok(AccountMeta {
                    pubkey,
                    is_signer: slot.signer,
                    is_writable: slot.writable,
                })
            })
            .collect::<Result<Vec<_>, CodecError>>()?;

        Ok(Instruction {
            program_id: *program_id,
            accounts,
            data: codec.encode_instruction(self.name, &self.args)?,
        })
    }
}

/// A transaction accepted by the ledger, not yet confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub tx_id: String,
    pub strategy: Strategy,
}

/// A send that got no reply. The transaction may or may not have landed.
#[derive(Debug, Clone)]
struct Unsettled {
    submitted: Submitted,
    error: GatewayError,
}

/// Shared inputs of every attempt.
pub struct SubmitContext<'a, G, S> {
    pub gateway: &'a G,
    pub signer: &'a S,
    pub codec: &'a RecordCodec,
    pub program_id: &'a Pubkey,
}

impl<G: LedgerGateway, S: TransactionSigner> SubmitContext<'_, G, S> {
    /// Run `chain` for `plan` until one strategy gets the transaction accepted.
    pub async fn submit(&self, plan: &InstructionPlan, chain: &[Strategy]) -> Result<Submitted, EscrowError> {
        let mut best: Option<EscrowError> = None;
        let mut unsettled: Vec<Unsettled> = Vec::new();

        for &strategy in chain {
            let Some(instruction) = plan.build(strategy, self.codec, self.program_id) else {
                continue;
            };

            // Never re-sign while an earlier send may already have landed
            if let Some(landed) = self.find_landed(&unsettled).await {
                return Ok(landed);
            }

            let attempt = match instruction {
                Ok(instruction) => self.attempt(plan, strategy, instruction, &mut unsettled).await,
                Err(e) => Err(EscrowError::Encoding(e)),
            };

            match attempt {
                Ok(tx_id) => {
                    tracing::info!(
                        instruction = plan.name,
                        escrow = %plan.escrow,
                        strategy = %strategy,
                        tx_id = %tx_id,
                        "Transaction submitted"
                    );
                    return Ok(Submitted { tx_id, strategy });
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(
                        instruction = plan.name,
                        escrow = %plan.escrow,
                        strategy = %strategy,
                        error = %e,
                        "Submission attempt failed, trying next strategy"
                    );
                    best = Some(match best {
                        Some(previous) if specificity(&previous) > specificity(&e) => previous,
                        _ => e,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        instruction = plan.name,
                        escrow = %plan.escrow,
                        strategy = %strategy,
                        error = %e,
                        category = e.category(),
                        "Submission attempt failed terminally"
                    );
                    return self.settle(plan, unsettled, e).await;
                }
            }
        }

        let err = best.unwrap_or_else(|| {
            EscrowError::Encoding(CodecError::UnknownInstruction(plan.name.to_string()))
        });
        self.settle(plan, unsettled, err).await
    }

    async fn attempt(
        &self,
        plan: &InstructionPlan,
        strategy: Strategy,
        instruction: Instruction,
        unsettled: &mut Vec<Unsettled>,
    ) -> Result<String, EscrowError> {
        let payer = self.signer.pubkey();
        let blockhash = self
            .gateway
            .latest_blockhash()
            .await
            .map_err(|e| classify(e, &plan.escrow))?;

        let tx = self
            .signer
            .sign_transaction(unsigned_transaction(instruction, &payer, blockhash.hash))
            .await?;
        let tx_id = transaction_id(&tx)
            .ok_or_else(|| SignerError::Rejected(format!("fee payer {payer} did not sign")))?;

        if strategy.simulates() {
            let outcome = self
                .gateway
                .simulate(&tx)
                .await
                .map_err(|e| classify(e, &plan.escrow))?;
            if let Some(err) = outcome.err {
                tracing::debug!(
                    instruction = plan.name,
                    strategy = %strategy,
                    logs = ?outcome.logs,
                    "Simulation failed"
                );
                return Err(classify_program_failure(err, outcome.logs, &plan.escrow));
            }
            tracing::debug!(
                instruction = plan.name,
                strategy = %strategy,
                units = ?outcome.units_consumed,
                "Simulation passed"
            );
        }

        match self.gateway.submit(&tx, strategy.skip_preflight()).await {
            Ok(accepted) => Ok(accepted),
            Err(e) if e.outcome_unknown() => {
                tracing::warn!(
                    instruction = plan.name,
                    escrow = %plan.escrow,
                    strategy = %strategy,
                    tx_id = %tx_id,
                    error = %e,
                    "No reply to submission, checking whether the transaction landed"
                );
                if self.has_landed(&tx_id).await {
                    return Ok(tx_id);
                }
                unsettled.push(Unsettled {
                    submitted: Submitted { tx_id, strategy },
                    error: e.clone(),
                });
                Err(EscrowError::Network(e))
            }
            Err(e) => Err(classify(e, &plan.escrow)),
        }
    }

    /// Whether the ledger has seen `tx_id`, successful or not.
    async fn has_landed(&self, tx_id: &str) -> bool {
        matches!(
            self.gateway.confirmation_status(tx_id).await,
            Ok(ConfirmationStatus::Confirmed { .. } | ConfirmationStatus::Failed { .. })
        )
    }

    async fn find_landed(&self, unsettled: &[Unsettled]) -> Option<Submitted> {
        for pending in unsettled {
            if self.has_landed(&pending.submitted.tx_id).await {
                tracing::info!(
                    tx_id = %pending.submitted.tx_id,
                    strategy = %pending.submitted.strategy,
                    "Earlier submission landed after its reply was lost"
                );
                return Some(pending.submitted.clone());
            }
        }
        None
    }

    /// Final answer once the chain stops with `err`: an unanswered send that
    /// has since landed wins, one that is still unseen is reported with its id.
    async fn settle(
        &self,
        plan: &InstructionPlan,
        mut unsettled: Vec<Unsettled>,
        err: EscrowError,
    ) -> Result<Submitted, EscrowError> {
        if let Some(landed) = self.find_landed(&unsettled).await {
            return Ok(landed);
        }
        if unsettled.is_empty() {
            return Err(err);
        }
        let outstanding: Vec<&str> = unsettled.iter().map(|u| u.submitted.tx_id.as_str()).collect();
        tracing::warn!(
            instruction = plan.name,
            escrow = %plan.escrow,
            outstanding = ?outstanding,
            error = %err,
            "Chain ended with an unanswered submission outstanding"
        );

        let first = unsettled.swap_remove(0);
        Err(EscrowError::Confirmation {
            tx_id: first.submitted.tx_id,
            failure: ConfirmationFailure::Unsettled(first.error),
        })
    }
}

/// Rank retryable errors so the chain reports the one that says the most.
fn specificity(err: &EscrowError) -> u8 {
    match err {
        EscrowError::Network(_) => 0,
        EscrowError::SimulationRejected { .. } => 1,
        EscrowError::Encoding(CodecError::ProgramRejected(_)) => 3,
        _ => 2,
    }
}
