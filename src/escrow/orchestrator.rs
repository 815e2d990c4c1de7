// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Escrow orchestrator.
//!
//! Every write runs the same pipeline:
//!
//! ```text
//! validate -> derive -> encode -> submit (fallback chain) -> confirm
//! ```
//!
//! Local failures are returned before anything reaches the ledger. Once a
//! transaction has been accepted, any failure to confirm it is reported as
//! [`EscrowError::Confirmation`] carrying the transaction id, since the
//! transaction may still land.
//!
//! The orchestrator holds no mutable state. Each call reads the ledger
//! afresh, so the same instance can serve concurrent callers.

use std::collections::HashMap;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::codec::RecordCodec;
use super::record::{CreateEscrowParams, EscrowRecord};
use super::schema::{EscrowSchema, CANCEL, ESCROW_ACCOUNT, EXECUTE, SIGN};
use super::state::{self, Capabilities, EscrowStatus};
use super::strategy::{
    create_chain, single_chain, InitializeAccounts, InstructionPlan, Strategy, SubmitContext,
    Submitted,
};
use crate::blockchain::gateway::{
    await_confirmation, AccountData, ConfirmPolicy, ConfirmWaitError, ConfirmationStatus,
    LedgerGateway, ScanFilter,
};
use crate::blockchain::pda::{
    derive_associated_token_address, derive_escrow_address, derive_vault_address,
};
use crate::blockchain::pubkey::{as_base58, Pubkey};
use crate::blockchain::signing::TransactionSigner;
use crate::blockchain::token::{
    format_amount, mint_decimals, TokenAccount, TokenBalance, TokenHolding, TOKEN_ACCOUNT_LEN,
    TOKEN_OWNER_OFFSET,
};
use crate::blockchain::types::TOKEN_PROGRAM_ID;
use crate::config::ClientConfig;
use crate::error::{classify, ConfirmationFailure, EscrowError, StateError, ValidationError};

/// Outcome of a confirmed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteReceipt {
    /// Escrow the write targeted
    #[serde(serialize_with = "as_base58")]
    pub escrow: Pubkey,
    /// Ledger transaction id
    pub tx_id: String,
    /// Slot the transaction was confirmed in
    pub slot: u64,
    /// Submission strategy that got the transaction accepted
    #[serde(serialize_with = "serialize_strategy")]
    pub strategy: Strategy,
}

fn serialize_strategy<S: serde::Serializer>(strategy: &Strategy, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(strategy.name())
}

/// A decoded escrow and its address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EscrowEntry {
    #[serde(serialize_with = "as_base58")]
    pub address: Pubkey,
    pub record: EscrowRecord,
}

/// An escrow as seen by one identity: its status and what that identity
/// may do with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowView {
    #[serde(serialize_with = "as_base58")]
    pub address: Pubkey,
    pub record: EscrowRecord,
    pub status: EscrowStatus,
    pub can_sign: bool,
    pub can_execute: bool,
    pub can_cancel: bool,
}

impl EscrowView {
    pub fn project(entry: EscrowEntry, viewer: &Pubkey) -> Self {
        let Capabilities {
            can_sign,
            can_execute,
            can_cancel,
        } = Capabilities::for_viewer(&entry.record, viewer);
        Self {
            status: EscrowStatus::of(&entry.record),
            address: entry.address,
            record: entry.record,
            can_sign,
            can_execute,
            can_cancel,
        }
    }
}

/// Runs escrow operations against one ledger gateway and one program.
pub struct EscrowOrchestrator<G> {
    gateway: G,
    codec: RecordCodec,
    program_id: Pubkey,
    policy: ConfirmPolicy,
    simulate_before_send: bool,
}

impl<G: LedgerGateway> EscrowOrchestrator<G> {
    pub fn new(gateway: G, codec: RecordCodec, program_id: Pubkey, policy: ConfirmPolicy) -> Self {
        Self {
            gateway,
            codec,
            program_id,
            policy,
            simulate_before_send: true,
        }
    }

    /// Build from session configuration, loading the schema it names.
    pub fn from_config(gateway: G, config: &ClientConfig) -> Result<Self, EscrowError> {
        let schema = EscrowSchema::load(config.idl_path.as_deref())?;
        if let Some(address) = schema.address.filter(|a| *a != config.program_id) {
            tracing::warn!(
                schema_address = %address,
                program_id = %config.program_id,
                "Schema address differs from configured program id, using configured id"
            );
        }
        tracing::info!(
            schema = %schema.name,
            version = %schema.version,
            program_id = %config.program_id,
            "Escrow orchestrator ready"
        );
        Ok(Self::new(gateway, RecordCodec::new(schema), config.program_id, config.confirm_policy())
            .with_simulation(config.simulate_before_send))
    }

    /// Whether the first submission strategy simulates before sending.
    pub fn with_simulation(mut self, simulate_before_send: bool) -> Self {
        self.simulate_before_send = simulate_before_send;
        self
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn codec(&self) -> &RecordCodec {
        &self.codec
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    /// Escrow address for a `(recipient, depositor)` pair under this program.
    pub fn escrow_address(&self, recipient: &Pubkey, depositor: &Pubkey) -> Result<Pubkey, EscrowError> {
        let (address, _) = derive_escrow_address(recipient, depositor, &self.program_id)?;
        Ok(address)
    }

    //=========================================================================
    // Writes
    //=========================================================================

    /// Create and fund a new escrow. The signer is the depositor.
    pub async fn create<S: TransactionSigner>(
        &self,
        signer: &S,
        params: &CreateEscrowParams,
        cancel: &CancellationToken,
    ) -> Result<WriteReceipt, EscrowError> {
        let op_id = uuid::Uuid::new_v4().to_string();
        let depositor = signer.pubkey();

        let args = params.validate(&depositor)?;

        let (escrow, _) = derive_escrow_address(&params.recipient, &depositor, &self.program_id)?;
        let (escrow_vault, _) = derive_vault_address(&escrow, &self.program_id)?;
        let depositor_token_account = derive_associated_token_address(&depositor, &params.mint)?;

        tracing::info!(
            op_id = %op_id,
            escrow = %escrow,
            depositor = %depositor,
            recipient = %params.recipient,
            amount = params.amount,
            required = args.required_signatures,
            signers = args.signers.len(),
            "Creating escrow"
        );

        // Absence is the expected case here
        if self.fetch_account(&escrow).await?.is_some() {
            tracing::warn!(op_id = %op_id, escrow = %escrow, "Escrow already exists for this pair");
            return Err(StateError::EscrowExists(escrow).into());
        }

        self.check_funding(&depositor_token_account, &depositor, &params.mint, params.amount, &escrow)
            .await?;

        let plan = InstructionPlan::initialize(
            args,
            InitializeAccounts {
                escrow,
                depositor,
                depositor_token_account,
                escrow_vault,
                mint: params.mint,
            },
        );

        let submitted = self
            .submit_context(signer)
            .submit(&plan, &create_chain(self.simulate_before_send))
            .await?;
        self.confirm(&op_id, escrow, submitted, cancel).await
    }

    /// Add the signer's approval to an escrow.
    pub async fn sign<S: TransactionSigner>(
        &self,
        signer: &S,
        escrow: &Pubkey,
        cancel: &CancellationToken,
    ) -> Result<WriteReceipt, EscrowError> {
        let op_id = uuid::Uuid::new_v4().to_string();
        let me = signer.pubkey();
        let record = self.get(escrow).await?;

        state::check_sign(&record, &me)?;
        tracing::info!(
            op_id = %op_id,
            escrow = %escrow,
            signer = %me,
            have = record.signature_count(),
            need = record.required_signatures,
            "Signing escrow"
        );

        let plan = InstructionPlan::new(SIGN, *escrow, vec![("escrow", *escrow), ("signer", me)]);
        let submitted = self
            .submit_context(signer)
            .submit(&plan, &single_chain(self.simulate_before_send))
            .await?;
        self.confirm(&op_id, *escrow, submitted, cancel).await
    }

    /// Release the escrowed tokens to the recipient once quorum is met.
    pub async fn execute<S: TransactionSigner>(
        &self,
        signer: &S,
        escrow: &Pubkey,
        cancel: &CancellationToken,
    ) -> Result<WriteReceipt, EscrowError> {
        let op_id = uuid::Uuid::new_v4().to_string();
        let record = self.get(escrow).await?;

        state::check_execute(&record)?;

        let (escrow_vault, _) = derive_vault_address(escrow, &self.program_id)?;
        let recipient_token_account = derive_associated_token_address(&record.recipient, &record.mint)?;
        tracing::info!(
            op_id = %op_id,
            escrow = %escrow,
            recipient = %record.recipient,
            amount = record.amount,
            "Executing escrow"
        );

        let plan = InstructionPlan::new(
            EXECUTE,
            *escrow,
            vec![
                ("escrow", *escrow),
                ("escrow_vault", escrow_vault),
                ("recipient_token_account", recipient_token_account),
                ("token_program", TOKEN_PROGRAM_ID),
            ],
        );
        let submitted = self
            .submit_context(signer)
            .submit(&plan, &single_chain(self.simulate_before_send))
            .await?;
        self.confirm(&op_id, *escrow, submitted, cancel).await
    }

    /// Return the escrowed tokens to the depositor. Only the depositor may cancel.
    pub async fn cancel<S: TransactionSigner>(
        &self,
        signer: &S,
        escrow: &Pubkey,
        cancel: &CancellationToken,
    ) -> Result<WriteReceipt, EscrowError> {
        let op_id = uuid::Uuid::new_v4().to_string();
        let me = signer.pubkey();
        let record = self.get(escrow).await?;

        state::check_cancel(&record, &me)?;

        let (escrow_vault, _) = derive_vault_address(escrow, &self.program_id)?;
        let depositor_token_account = derive_associated_token_address(&record.depositor, &record.mint)?;
        tracing::info!(
            op_id = %op_id,
            escrow = %escrow,
            depositor = %me,
            amount = record.amount,
            "Cancelling escrow"
        );

        let plan = InstructionPlan::new(
            CANCEL,
            *escrow,
            vec![
                ("escrow", *escrow),
                ("escrow_vault", escrow_vault),
                ("depositor_token_account", depositor_token_account),
                ("depositor", me),
                ("token_program", TOKEN_PROGRAM_ID),
            ],
        );
        let submitted = self
            .submit_context(signer)
            .submit(&plan, &single_chain(self.simulate_before_send))
            .await?;
        self.confirm(&op_id, *escrow, submitted, cancel).await
    }

    //=========================================================================
    // Reads
    //=========================================================================

    /// Fetch and decode one escrow. A missing account is an error here.
    pub async fn get(&self, escrow: &Pubkey) -> Result<EscrowRecord, EscrowError> {
        let account = self
            .fetch_account(escrow)
            .await?
            .ok_or(EscrowError::NotFound(*escrow))?;
        let record = EscrowRecord::decode(&self.codec, &account.data)?;
        if !record.signature_count_consistent() {
            tracing::warn!(
                escrow = %escrow,
                cached = record.current_signatures,
                actual = record.signature_count(),
                "Cached signature count disagrees with signature set"
            );
        }
        Ok(record)
    }

    /// One escrow projected for `viewer`.
    pub async fn view(&self, escrow: &Pubkey, viewer: &Pubkey) -> Result<EscrowView, EscrowError> {
        let record = self.get(escrow).await?;
        Ok(EscrowView::project(
            EscrowEntry {
                address: *escrow,
                record,
            },
            viewer,
        ))
    }

    /// Every escrow where `identity` is the depositor, the recipient or a
    /// listed signer. Each call scans the ledger again; nothing is cached.
    ///
    /// The scan itself is one request. Records are decoded as the returned
    /// iterator is driven, and accounts that fail to decode are skipped.
    pub async fn list_for<'a>(
        &'a self,
        identity: &Pubkey,
    ) -> Result<impl Iterator<Item = EscrowEntry> + 'a, EscrowError> {
        let discriminator = self.codec.account_discriminator(ESCROW_ACCOUNT)?;
        let filters = [ScanFilter::Memcmp {
            offset: 0,
            bytes: discriminator.to_vec(),
        }];

        let accounts = self
            .gateway
            .scan_accounts(&self.program_id, &filters)
            .await
            .map_err(EscrowError::Network)?;
        tracing::debug!(identity = %identity, scanned = accounts.len(), "Scanned escrow accounts");

        let identity = *identity;
        Ok(accounts
            .into_iter()
            .filter_map(move |(address, account)| {
                match EscrowRecord::decode(&self.codec, &account.data) {
                    Ok(record) => Some(EscrowEntry { address, record }),
                    Err(e) => {
                        tracing::warn!(escrow = %address, error = %e, "Skipping undecodable escrow account");
                        None
                    }
                }
            })
            .filter(move |entry| entry.record.involves(&identity)))
    }

    /// [`list_for`](Self::list_for), projected for the same identity.
    pub async fn views_for(&self, identity: &Pubkey) -> Result<Vec<EscrowView>, EscrowError> {
        Ok(self
            .list_for(identity)
            .await?
            .map(|entry| EscrowView::project(entry, identity))
            .collect())
    }

    /// `owner`'s balance of `mint`, read from its associated token account.
    pub async fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Result<TokenBalance, EscrowError> {
        let token_account = derive_associated_token_address(owner, mint)?;
        let account = self
            .fetch_account(&token_account)
            .await?
            .ok_or(ValidationError::TokenAccountMissing(token_account))?;
        let holding =
            TokenAccount::unpack(&account).ok_or(ValidationError::NotTokenAccount(token_account))?;
        let decimals = self
            .fetch_account(mint)
            .await?
            .as_ref()
            .and_then(mint_decimals)
            .ok_or(ValidationError::NotMint(*mint))?;

        tracing::debug!(
            owner = %owner,
            mint = %mint,
            token_account = %token_account,
            amount = holding.amount,
            "Read token balance"
        );
        Ok(TokenBalance {
            owner: *owner,
            mint: *mint,
            token_account,
            amount: holding.amount,
            decimals,
            ui_amount: format_amount(holding.amount, decimals),
        })
    }

    /// Every SPL token account owned by `owner`, associated or not.
    ///
    /// Decimals are looked up once per distinct mint; a mint that cannot be
    /// read leaves them unset rather than failing the listing.
    pub async fn token_accounts(&self, owner: &Pubkey) -> Result<Vec<TokenHolding>, EscrowError> {
        let filters = [
            ScanFilter::DataSize(TOKEN_ACCOUNT_LEN),
            ScanFilter::Memcmp {
                offset: TOKEN_OWNER_OFFSET,
                bytes: owner.to_bytes().to_vec(),
            },
        ];
        let accounts = self
            .gateway
            .scan_accounts(&TOKEN_PROGRAM_ID, &filters)
            .await
            .map_err(EscrowError::Network)?;

        let mut decimals_by_mint: HashMap<Pubkey, Option<u8>> = HashMap::new();
        let mut holdings = Vec::with_capacity(accounts.len());
        for (address, account) in accounts {
            let Some(parsed) = TokenAccount::unpack(&account) else {
                tracing::warn!(address = %address, "Skipping unreadable token account");
                continue;
            };
            let decimals = match decimals_by_mint.get(&parsed.mint) {
                Some(known) => *known,
                None => {
                    let found = match self.gateway.get_account(&parsed.mint).await {
                        Ok(mint) => mint.as_ref().and_then(mint_decimals),
                        Err(e) => {
                            tracing::warn!(mint = %parsed.mint, error = %e, "Could not read mint decimals");
                            None
                        }
                    };
                    decimals_by_mint.insert(parsed.mint, found);
                    found
                }
            };
            holdings.push(TokenHolding {
                address,
                mint: parsed.mint,
                amount: parsed.amount,
                decimals,
                ui_amount: decimals.map(|d| format_amount(parsed.amount, d)),
            });
        }

        tracing::debug!(owner = %owner, accounts = holdings.len(), "Listed token accounts");
        Ok(holdings)
    }

    //=========================================================================
    // Internals
    //=========================================================================

    fn submit_context<'a, S>(&'a self, signer: &'a S) -> SubmitContext<'a, G, S> {
        SubmitContext {
            gateway: &self.gateway,
            signer,
            codec: &self.codec,
            program_id: &self.program_id,
        }
    }

    async fn fetch_account(&self, address: &Pubkey) -> Result<Option<AccountData>, EscrowError> {
        self.gateway
            .get_account(address)
            .await
            .map_err(|e| classify(e, address))
    }

    /// The depositor's token account must exist, hold `mint`, belong to the
    /// depositor and cover `amount`.
    async fn check_funding(
        &self,
        token_account: &Pubkey,
        depositor: &Pubkey,
        mint: &Pubkey,
        amount: u64,
        escrow: &Pubkey,
    ) -> Result<(), EscrowError> {
        let account = self
            .gateway
            .get_account(token_account)
            .await
            .map_err(|e| classify(e, escrow))?
            .ok_or(ValidationError::TokenAccountMissing(*token_account))?;

        let TokenAccount {
            mint: actual_mint,
            owner: actual_owner,
            amount: available,
        } = TokenAccount::unpack(&account).ok_or(ValidationError::NotTokenAccount(*token_account))?;

        if actual_mint != *mint {
            return Err(ValidationError::TokenMintMismatch {
                expected: *mint,
                actual: actual_mint,
            }
            .into());
        }
        if actual_owner != *depositor {
            return Err(ValidationError::TokenOwnerMismatch {
                expected: *depositor,
                actual: actual_owner,
            }
            .into());
        }
        if available < amount {
            return Err(ValidationError::InsufficientBalance {
                available,
                required: amount,
            }
            .into());
        }
        Ok(())
    }

    /// Wait for `submitted` to confirm. Every failure from here on carries
    /// the transaction id.
    async fn confirm(
        &self,
        op_id: &str,
        escrow: Pubkey,
        submitted: Submitted,
        cancel: &CancellationToken,
    ) -> Result<WriteReceipt, EscrowError> {
        let Submitted { tx_id, strategy } = submitted;

        let failure = match await_confirmation(&self.gateway, &tx_id, self.policy, cancel).await {
            Ok(ConfirmationStatus::Confirmed { slot }) => {
                tracing::info!(
                    op_id = %op_id,
                    escrow = %escrow,
                    tx_id = %tx_id,
                    slot,
                    strategy = %strategy,
                    "Transaction confirmed"
                );
                return Ok(WriteReceipt {
                    escrow,
                    tx_id,
                    slot,
                    strategy,
                });
            }
            Ok(ConfirmationStatus::Failed { reason }) => ConfirmationFailure::Failed(reason),
            Ok(ConfirmationStatus::Pending) | Err(ConfirmWaitError::TimedOut) => ConfirmationFailure::TimedOut,
            Err(ConfirmWaitError::Cancelled) => ConfirmationFailure::Cancelled,
            Err(ConfirmWaitError::Gateway(e)) => ConfirmationFailure::Poll(e),
        };

        tracing::warn!(
            op_id = %op_id,
            escrow = %escrow,
            tx_id = %tx_id,
            failure = %failure,
            "Transaction submitted but not confirmed"
        );
        Err(EscrowError::Confirmation { tx_id, failure })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::blockchain::gateway::GatewayError;
    use crate::blockchain::signing::KeypairSigner;
    use crate::blockchain::types::DEFAULT_ESCROW_PROGRAM_ID;
    use crate::error::AuthorizationError;
    use crate::escrow::record::tests::key;
    use crate::blockchain::transactions::transaction_id;
    use crate::escrow::testing::{MemoryLedger, Scripted, SubmitReply};

    const AMOUNT: u64 = 100_000_000;

    struct Harness {
        orchestrator: EscrowOrchestrator<MemoryLedger>,
        depositor: KeypairSigner,
        s1: KeypairSigner,
        s2: KeypairSigner,
        mint: Pubkey,
        recipient: Pubkey,
    }

    impl Harness {
        fn new() -> Self {
            let codec = RecordCodec::new(EscrowSchema::embedded().unwrap());
            let ledger = MemoryLedger::with_program(codec.clone(), DEFAULT_ESCROW_PROGRAM_ID);
            let depositor = KeypairSigner::from_seed(&[11u8; 32]).unwrap();
            let mint = key(3);
            let ata = derive_associated_token_address(&depositor.pubkey(), &mint).unwrap();
            ledger.put_token_account(ata, mint, depositor.pubkey(), AMOUNT * 10);

            let policy = ConfirmPolicy {
                timeout: Duration::from_millis(200),
                poll_interval: Duration::from_millis(5),
            };
            Self {
                orchestrator: EscrowOrchestrator::new(ledger, codec, DEFAULT_ESCROW_PROGRAM_ID, policy),
                depositor,
                s1: KeypairSigner::from_seed(&[12u8; 32]).unwrap(),
                s2: KeypairSigner::from_seed(&[13u8; 32]).unwrap(),
                mint,
                recipient: key(2),
            }
        }

        fn ledger(&self) -> &MemoryLedger {
            self.orchestrator.gateway()
        }

        fn params(&self, required: usize, signers: Vec<Pubkey>) -> CreateEscrowParams {
            CreateEscrowParams {
                recipient: self.recipient,
                mint: self.mint,
                amount: AMOUNT,
                required_signatures: required,
                signers,
            }
        }

        fn two_of_two(&self) -> CreateEscrowParams {
            self.params(2, vec![self.s1.pubkey(), self.s2.pubkey()])
        }

        fn escrow(&self) -> Pubkey {
            self.orchestrator
                .escrow_address(&self.recipient, &self.depositor.pubkey())
                .unwrap()
        }
    }

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn create_sign_execute_walkthrough() {
        let h = Harness::new();
        let o = &h.orchestrator;

        let created = o.create(&h.depositor, &h.two_of_two(), &token()).await.unwrap();
        assert_eq!(created.escrow, h.escrow());
        assert_eq!(created.strategy, Strategy::SchemaSimulated);

        let record = o.get(&created.escrow).await.unwrap();
        assert_eq!(record.depositor, h.depositor.pubkey());
        assert_eq!(record.amount, AMOUNT);
        assert_eq!(EscrowStatus::of(&record), EscrowStatus::Open);

        o.sign(&h.s1, &created.escrow, &token()).await.unwrap();
        let err = o.execute(&h.s1, &created.escrow, &token()).await.unwrap_err();
        assert_eq!(err, EscrowError::from(StateError::QuorumNotMet { have: 1, need: 2 }));

        o.sign(&h.s2, &created.escrow, &token()).await.unwrap();
        let view = o.view(&created.escrow, &h.s1.pubkey()).await.unwrap();
        assert_eq!(view.status, EscrowStatus::Executable);
        assert!(view.can_execute && !view.can_sign);

        o.execute(&h.s1, &created.escrow, &token()).await.unwrap();
        let err = o.sign(&h.s1, &created.escrow, &token()).await.unwrap_err();
        assert_eq!(err, EscrowError::from(StateError::AlreadyTerminal(EscrowStatus::Executed)));

        // create + 2 signs + execute reached the ledger
        assert_eq!(h.ledger().submissions().len(), 4);
    }

    #[tokio::test]
    async fn zero_quorum_is_rejected_before_any_ledger_call() {
        let h = Harness::new();
        let err = h
            .orchestrator
            .create(&h.depositor, &h.params(0, vec![h.s1.pubkey()]), &token())
            .await
            .unwrap_err();
        assert_eq!(err, EscrowError::from(ValidationError::ZeroRequiredSignatures));
        assert_eq!(err.category(), "validation_error");
        assert_eq!(h.ledger().simulate_calls(), 0);
        assert!(h.ledger().submissions().is_empty());
    }

    #[tokio::test]
    async fn quorum_above_signer_count_is_rejected() {
        let h = Harness::new();
        let err = h
            .orchestrator
            .create(&h.depositor, &h.params(3, vec![h.s1.pubkey(), h.s2.pubkey()]), &token())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EscrowError::from(ValidationError::RequiredExceedsSigners { required: 3, signers: 2 })
        );
        assert!(h.ledger().submissions().is_empty());
    }

    #[tokio::test]
    async fn second_escrow_for_same_pair_is_rejected_before_submission() {
        let h = Harness::new();
        h.orchestrator.create(&h.depositor, &h.two_of_two(), &token()).await.unwrap();
        let simulated = h.ledger().simulate_calls();

        let err = h
            .orchestrator
            .create(&h.depositor, &h.two_of_two(), &token())
            .await
            .unwrap_err();
        assert_eq!(err, EscrowError::from(StateError::EscrowExists(h.escrow())));
        assert_eq!(h.ledger().submissions().len(), 1);
        assert_eq!(h.ledger().simulate_calls(), simulated);
    }

    #[tokio::test]
    async fn existing_escrow_discovered_at_simulation_is_not_retried() {
        let h = Harness::new();
        h.ledger().script_simulation(Scripted::ProgramError {
            reason: "custom program error: 0x0".into(),
            logs: vec![format!("Allocate: account {} already in use", h.escrow())],
        });

        let err = h
            .orchestrator
            .create(&h.depositor, &h.two_of_two(), &token())
            .await
            .unwrap_err();
        assert_eq!(err, EscrowError::from(StateError::EscrowExists(h.escrow())));
        assert!(h.ledger().submissions().is_empty());
    }

    #[tokio::test]
    async fn funding_is_checked_before_submission() {
        let h = Harness::new();
        let ata = derive_associated_token_address(&h.depositor.pubkey(), &h.mint).unwrap();

        h.ledger().put_token_account(ata, h.mint, h.depositor.pubkey(), AMOUNT - 1);
        let err = h
            .orchestrator
            .create(&h.depositor, &h.two_of_two(), &token())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EscrowError::from(ValidationError::InsufficientBalance { available: AMOUNT - 1, required: AMOUNT })
        );

        h.ledger().put_token_account(ata, key(9), h.depositor.pubkey(), AMOUNT);
        let err = h
            .orchestrator
            .create(&h.depositor, &h.two_of_two(), &token())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EscrowError::from(ValidationError::TokenMintMismatch { expected: h.mint, actual: key(9) })
        );
        assert!(h.ledger().submissions().is_empty());
    }

    #[tokio::test]
    async fn missing_token_account_is_a_validation_error() {
        let h = Harness::new();
        let stranger = KeypairSigner::from_seed(&[40u8; 32]).unwrap();
        let err = h
            .orchestrator
            .create(&stranger, &h.two_of_two(), &token())
            .await
            .unwrap_err();
        let ata = derive_associated_token_address(&stranger.pubkey(), &h.mint).unwrap();
        assert_eq!(err, EscrowError::from(ValidationError::TokenAccountMissing(ata)));
    }

    #[tokio::test]
    async fn create_falls_back_when_program_rejects_encoding() {
        let h = Harness::new();
        h.ledger().script_simulation(Scripted::ProgramError {
            reason: "custom program error: 0x66".into(),
            logs: vec!["Program log: AnchorError occurred. Error Code: InstructionDidNotDeserialize".into()],
        });

        let receipt = h
            .orchestrator
            .create(&h.depositor, &h.two_of_two(), &token())
            .await
            .unwrap();
        assert_eq!(receipt.strategy, Strategy::SchemaDirect);
        assert!(h.ledger().submissions()[0].skip_preflight);
        assert!(h.orchestrator.get(&receipt.escrow).await.is_ok());
    }

    #[tokio::test]
    async fn cancel_by_non_depositor_leaves_escrow_unchanged() {
        let h = Harness::new();
        let created = h.orchestrator.create(&h.depositor, &h.two_of_two(), &token()).await.unwrap();
        let before = h.orchestrator.get(&created.escrow).await.unwrap();

        let err = h
            .orchestrator
            .cancel(&h.s1, &created.escrow, &token())
            .await
            .unwrap_err();
        assert_eq!(err, EscrowError::from(AuthorizationError::NotDepositor(h.s1.pubkey())));
        assert_eq!(h.orchestrator.get(&created.escrow).await.unwrap(), before);
        assert_eq!(h.ledger().submissions().len(), 1);

        h.orchestrator.cancel(&h.depositor, &created.escrow, &token()).await.unwrap();
        let view = h.orchestrator.view(&created.escrow, &h.depositor.pubkey()).await.unwrap();
        assert_eq!(view.status, EscrowStatus::Cancelled);
        assert!(!view.can_cancel);
    }

    #[tokio::test]
    async fn outsider_cannot_sign() {
        let h = Harness::new();
        let created = h.orchestrator.create(&h.depositor, &h.two_of_two(), &token()).await.unwrap();
        let outsider = KeypairSigner::from_seed(&[50u8; 32]).unwrap();
        let err = h
            .orchestrator
            .sign(&outsider, &created.escrow, &token())
            .await
            .unwrap_err();
        assert_eq!(err, EscrowError::from(AuthorizationError::NotAuthorizedSigner(outsider.pubkey())));
    }

    #[tokio::test]
    async fn list_filters_by_involvement_and_rescans() {
        let h = Harness::new();
        let codec = h.orchestrator.codec().clone();
        let program = DEFAULT_ESCROW_PROGRAM_ID;
        let me = key(20);

        let mut as_depositor = crate::escrow::record::tests::open_record(vec![key(4)], 1);
        as_depositor.depositor = me;
        let mut as_signer = crate::escrow::record::tests::open_record(vec![key(4), me], 1);
        as_signer.recipient = key(21);
        let unrelated = crate::escrow::record::tests::open_record(vec![key(4)], 1);

        h.ledger().put_escrow(&codec, program, key(30), &as_depositor);
        h.ledger().put_escrow(&codec, program, key(31), &as_signer);
        h.ledger().put_escrow(&codec, program, key(32), &unrelated);
        // Same owner, different account type
        h.ledger().put_account(
            key(33),
            AccountData {
                owner: program,
                lamports: 1,
                data: vec![0u8; 64],
            },
        );

        let mut found: Vec<Pubkey> = h
            .orchestrator
            .list_for(&me)
            .await
            .unwrap()
            .map(|e| e.address)
            .collect();
        found.sort();
        assert_eq!(found, vec![key(30), key(31)]);
        assert_eq!(h.ledger().scan_calls(), 1);

        assert!(h.orchestrator.list_for(&key(77)).await.unwrap().next().is_none());
        assert_eq!(h.ledger().scan_calls(), 2);

        let views = h.orchestrator.views_for(&me).await.unwrap();
        let signer_view = views.iter().find(|v| v.address == key(31)).unwrap();
        assert!(signer_view.can_sign && !signer_view.can_cancel);
    }

    #[tokio::test]
    async fn get_of_missing_escrow_is_not_found() {
        let h = Harness::new();
        let err = h.orchestrator.get(&key(44)).await.unwrap_err();
        assert_eq!(err, EscrowError::NotFound(key(44)));
        assert_eq!(err.category(), "not_found");
    }

    #[tokio::test]
    async fn confirmation_timeout_keeps_transaction_id() {
        let h = Harness::new();
        h.ledger().stall_confirmations(Ok(ConfirmationStatus::Pending));

        let err = h
            .orchestrator
            .create(&h.depositor, &h.two_of_two(), &token())
            .await
            .unwrap_err();
        let sent = h.ledger().submissions();
        assert_eq!(sent.len(), 1);
        assert_eq!(err.tx_id(), transaction_id(&sent[0].tx).as_deref());
        assert!(matches!(
            err,
            EscrowError::Confirmation { failure: ConfirmationFailure::TimedOut, .. }
        ));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn abandoned_wait_reports_cancelled_with_transaction_id() {
        let h = Harness::new();
        h.ledger().script_confirmation(Ok(ConfirmationStatus::Pending));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = h
            .orchestrator
            .create(&h.depositor, &h.two_of_two(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EscrowError::Confirmation { failure: ConfirmationFailure::Cancelled, .. }
        ));
        assert!(err.tx_id().is_some());
    }

    #[tokio::test]
    async fn on_chain_failure_is_a_confirmation_error() {
        let h = Harness::new();
        h.ledger().script_confirmation(Ok(ConfirmationStatus::Failed {
            reason: "InstructionError(0, Custom(6003))".into(),
        }));
        let err = h
            .orchestrator
            .create(&h.depositor, &h.two_of_two(), &token())
            .await
            .unwrap_err();
        assert_eq!(err.category(), "confirmation_error");
        assert!(matches!(
            err,
            EscrowError::Confirmation { failure: ConfirmationFailure::Failed(_), .. }
        ));
    }

    #[tokio::test]
    async fn failing_polls_report_the_poll_error_with_transaction_id() {
        let h = Harness::new();
        h.ledger().stall_confirmations(Err(GatewayError::Transport("connection refused".into())));

        let err = h
            .orchestrator
            .create(&h.depositor, &h.two_of_two(), &token())
            .await
            .unwrap_err();
        let sent = h.ledger().submissions();
        assert_eq!(err.tx_id(), transaction_id(&sent[0].tx).as_deref());
        assert_eq!(
            err,
            EscrowError::Confirmation {
                tx_id: transaction_id(&sent[0].tx).unwrap(),
                failure: ConfirmationFailure::Poll(GatewayError::Transport("connection refused".into())),
            }
        );
    }

    #[tokio::test]
    async fn network_failure_on_every_strategy_is_surfaced() {
        let h = Harness::new();
        h.ledger().script_simulation(Scripted::Fail(GatewayError::Timeout));
        h.ledger().script_submit(SubmitReply::Reject(GatewayError::Rpc {
            code: -32005,
            message: "Node is behind by 42 slots".into(),
            logs: vec![],
        }));
        h.ledger().script_simulation(Scripted::Fail(GatewayError::Timeout));

        let err = h
            .orchestrator
            .create(&h.depositor, &h.two_of_two(), &token())
            .await
            .unwrap_err();
        assert_eq!(err, EscrowError::Network(GatewayError::Timeout));
        assert!(err.is_retryable());
        assert!(h.ledger().submissions().is_empty());
    }

    #[tokio::test]
    async fn create_whose_reply_was_lost_is_not_sent_twice() {
        let h = Harness::new();
        // The ledger applies the create but the caller only sees a timeout
        h.ledger().script_submit(SubmitReply::Lost(GatewayError::Timeout));

        let receipt = h
            .orchestrator
            .create(&h.depositor, &h.two_of_two(), &token())
            .await
            .unwrap();

        let sent = h.ledger().submissions();
        assert_eq!(sent.len(), 1);
        assert_eq!(Some(receipt.tx_id), transaction_id(&sent[0].tx));
        assert_eq!(receipt.strategy, Strategy::SchemaSimulated);
        assert!(h.orchestrator.get(&h.escrow()).await.is_ok());
    }

    #[tokio::test]
    async fn unanswered_submissions_surface_the_first_transaction_id() {
        let h = Harness::new();
        h.ledger().script_submit(SubmitReply::Reject(GatewayError::Timeout));
        h.ledger().script_submit(SubmitReply::Reject(GatewayError::Timeout));
        h.ledger().script_submit(SubmitReply::Reject(GatewayError::Timeout));

        let err = h
            .orchestrator
            .create(&h.depositor, &h.two_of_two(), &token())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EscrowError::Confirmation {
                failure: ConfirmationFailure::Unsettled(GatewayError::Timeout),
                ..
            }
        ));
        assert_eq!(err.category(), "confirmation_error");
        assert!(err.tx_id().is_some());
        assert!(h.ledger().submissions().is_empty());
    }

    #[tokio::test]
    async fn token_balance_reads_the_associated_account() {
        let h = Harness::new();
        h.ledger().put_mint(h.mint, 6);

        let balance = h
            .orchestrator
            .token_balance(&h.depositor.pubkey(), &h.mint)
            .await
            .unwrap();
        assert_eq!(balance.amount, AMOUNT * 10);
        assert_eq!(balance.decimals, 6);
        assert_eq!(balance.ui_amount, "1000");
        assert_eq!(
            balance.token_account,
            derive_associated_token_address(&h.depositor.pubkey(), &h.mint).unwrap()
        );

        let json = serde_json::to_value(&balance).unwrap();
        assert_eq!(json["mint"], h.mint.to_string());
        assert_eq!(json["uiAmount"], "1000");
    }

    #[tokio::test]
    async fn token_balance_without_account_or_mint_fails() {
        let h = Harness::new();
        let err = h.orchestrator.token_balance(&h.s1.pubkey(), &h.mint).await.unwrap_err();
        let ata = derive_associated_token_address(&h.s1.pubkey(), &h.mint).unwrap();
        assert_eq!(err, EscrowError::from(ValidationError::TokenAccountMissing(ata)));

        // Depositor's account exists, but the mint was never stored
        let err = h
            .orchestrator
            .token_balance(&h.depositor.pubkey(), &h.mint)
            .await
            .unwrap_err();
        assert_eq!(err, EscrowError::from(ValidationError::NotMint(h.mint)));
    }

    #[tokio::test]
    async fn token_accounts_lists_every_account_of_the_owner() {
        let h = Harness::new();
        let owner = h.depositor.pubkey();
        h.ledger().put_mint(h.mint, 6);
        // A second, non-associated account for a mint with no account on the ledger
        h.ledger().put_token_account(key(60), key(61), owner, 7);
        h.ledger().put_token_account(key(62), h.mint, h.s1.pubkey(), 1);

        let mut holdings = h.orchestrator.token_accounts(&owner).await.unwrap();
        holdings.sort_by_key(|holding| holding.amount);
        assert_eq!(holdings.len(), 2);

        assert_eq!(holdings[0].address, key(60));
        assert_eq!(holdings[0].decimals, None);
        assert_eq!(holdings[0].ui_amount, None);

        assert_eq!(holdings[1].mint, h.mint);
        assert_eq!(holdings[1].amount, AMOUNT * 10);
        assert_eq!(holdings[1].ui_amount.as_deref(), Some("1000"));
    }
}
