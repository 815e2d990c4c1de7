// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! `escrow-cli` - command-line front end for the escrow orchestrator.
//!
//! ```text
//! escrow-cli list <identity>
//! escrow-cli show <escrow> [viewer]
//! escrow-cli create <recipient> <mint> <amount> <required> <signer,signer,...>
//! escrow-cli sign <escrow>
//! escrow-cli execute <escrow>
//! escrow-cli cancel <escrow>
//! escrow-cli balance <mint> [owner]
//! escrow-cli tokens [owner]
//! ```
//!
//! Results are printed to stdout as JSON; logs go to stderr. Write commands
//! sign with the keypair file named by `ESCROW_KEYPAIR`; read commands fall
//! back to that identity when no viewer or owner is given.

use std::path::PathBuf;
use std::process::ExitCode;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use multisig_escrow_client::blockchain::pda::parse_identity;
use multisig_escrow_client::blockchain::{
    GatewayError, KeypairSigner, NetworkConfig, Pubkey, RpcGateway, SignerError, TransactionSigner,
};
use multisig_escrow_client::config::{ConfigError, KEYPAIR_ENV, LOG_FORMAT_ENV};
use multisig_escrow_client::escrow::{CreateEscrowParams, WriteReceipt};
use multisig_escrow_client::{ClientConfig, EscrowError, EscrowOrchestrator};

const USAGE: &str = "\
usage:
  escrow-cli list <identity>
  escrow-cli show <escrow> [viewer]
  escrow-cli create <recipient> <mint> <amount> <required> <signer,signer,...>
  escrow-cli sign <escrow>
  escrow-cli execute <escrow>
  escrow-cli cancel <escrow>
  escrow-cli balance <mint> [owner]
  escrow-cli tokens [owner]";

#[derive(Debug)]
enum Command {
    List { identity: String },
    Show { escrow: String, viewer: Option<String> },
    Create {
        recipient: String,
        mint: String,
        amount: String,
        required: String,
        signers: String,
    },
    Sign { escrow: String },
    Execute { escrow: String },
    Cancel { escrow: String },
    Balance { mint: String, owner: Option<String> },
    Tokens { owner: Option<String> },
}

impl Command {
    fn parse(args: &[String]) -> Result<Self, CliError> {
        let arg = |i: usize| -> Result<String, CliError> {
            args.get(i)
                .cloned()
                .ok_or_else(|| CliError::Usage(format!("missing argument {i}")))
        };
        let command = match args.first().map(String::as_str) {
            Some("list") => Command::List { identity: arg(1)? },
            Some("show") => Command::Show {
                escrow: arg(1)?,
                viewer: args.get(2).cloned(),
            },
            Some("create") => Command::Create {
                recipient: arg(1)?,
                mint: arg(2)?,
                amount: arg(3)?,
                required: arg(4)?,
                signers: arg(5)?,
            },
            Some("sign") => Command::Sign { escrow: arg(1)? },
            Some("execute") => Command::Execute { escrow: arg(1)? },
            Some("cancel") => Command::Cancel { escrow: arg(1)? },
            Some("balance") => Command::Balance {
                mint: arg(1)?,
                owner: args.get(2).cloned(),
            },
            Some("tokens") => Command::Tokens {
                owner: args.get(1).cloned(),
            },
            Some(other) => return Err(CliError::Usage(format!("unknown command `{other}`"))),
            None => return Err(CliError::Usage("no command given".to_string())),
        };
        Ok(command)
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Gateway(#[from] GatewayError),

    #[error("keypair: {0}")]
    Signer(#[from] SignerError),

    #[error("{0}")]
    Escrow(#[from] EscrowError),

    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match std::env::var(LOG_FORMAT_ENV).as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.pretty().init(),
    }
}

fn load_signer() -> Result<KeypairSigner, CliError> {
    let path = std::env::var(KEYPAIR_ENV)
        .map(PathBuf::from)
        .map_err(|_| CliError::Usage(format!("{KEYPAIR_ENV} must name a keypair file for write commands")))?;
    Ok(KeypairSigner::from_file(&path)?)
}

fn identity(field: &'static str, raw: &str) -> Result<Pubkey, CliError> {
    parse_identity(field, raw).map_err(|e| CliError::Escrow(e.into()))
}

/// `raw` if given, otherwise the keypair identity.
fn identity_or_keypair(field: &'static str, raw: Option<String>) -> Result<Pubkey, CliError> {
    match raw {
        Some(raw) => identity(field, &raw),
        None => Ok(load_signer()?.pubkey()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_receipt(network: &NetworkConfig, receipt: &WriteReceipt) -> Result<(), CliError> {
    print_json(receipt)?;
    eprintln!("Explorer: {}", network.explorer_tx_url(&receipt.tx_id));
    Ok(())
}

async fn run(command: Command, cancel: CancellationToken) -> Result<(), CliError> {
    let config = ClientConfig::from_env()?;
    let network = config.network.clone();
    let gateway = RpcGateway::new(config.network.clone(), config.commitment)?;
    let orchestrator = EscrowOrchestrator::from_config(gateway, &config)?;

    tracing::info!(
        network = %network.name,
        rpc_url = %network.rpc_url,
        program_id = %config.program_id,
        "Escrow client configured"
    );

    match command {
        Command::List { identity: raw } => {
            let who = identity("identity", &raw)?;
            print_json(&orchestrator.views_for(&who).await?)
        }
        Command::Show { escrow, viewer } => {
            let escrow = identity("escrow", &escrow)?;
            let viewer = match viewer {
                Some(raw) => identity("viewer", &raw)?,
                None => match load_signer() {
                    Ok(signer) => signer.pubkey(),
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            "No viewer given and no keypair loaded, showing no capabilities"
                        );
                        Pubkey::default()
                    }
                },
            };
            print_json(&orchestrator.view(&escrow, &viewer).await?)
        }
        Command::Create {
            recipient,
            mint,
            amount,
            required,
            signers,
        } => {
            let amount: u64 = amount
                .parse()
                .map_err(|e| CliError::Usage(format!("amount: {e}")))?;
            let required: usize = required
                .parse()
                .map_err(|e| CliError::Usage(format!("required: {e}")))?;
            let signer_list: Vec<&str> = signers.split(',').filter(|s| !s.trim().is_empty()).collect();
            let params = CreateEscrowParams::parse(&recipient, &mint, amount, required, &signer_list)?;

            let signer = load_signer()?;
            let receipt = orchestrator.create(&signer, &params, &cancel).await?;
            print_receipt(&network, &receipt)
        }
        Command::Sign { escrow } => {
            let escrow = identity("escrow", &escrow)?;
            let signer = load_signer()?;
            let receipt = orchestrator.sign(&signer, &escrow, &cancel).await?;
            print_receipt(&network, &receipt)
        }
        Command::Execute { escrow } => {
            let escrow = identity("escrow", &escrow)?;
            let signer = load_signer()?;
            let receipt = orchestrator.execute(&signer, &escrow, &cancel).await?;
            print_receipt(&network, &receipt)
        }
        Command::Cancel { escrow } => {
            let escrow = identity("escrow", &escrow)?;
            let signer = load_signer()?;
            let receipt = orchestrator.cancel(&signer, &escrow, &cancel).await?;
            print_receipt(&network, &receipt)
        }
        Command::Balance { mint, owner } => {
            let mint = identity("mint", &mint)?;
            let owner = identity_or_keypair("owner", owner)?;
            print_json(&orchestrator.token_balance(&owner, &mint).await?)
        }
        Command::Tokens { owner } => {
            let owner = identity_or_keypair("owner", owner)?;
            print_json(&orchestrator.token_accounts(&owner).await?)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    // Ctrl-C abandons a pending confirmation wait; the transaction id is still reported
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, no longer waiting for confirmation");
            on_signal.cancel();
        }
    });

    match run(command, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Escrow(e)) => {
            tracing::error!(category = e.category(), error = %e, "Escrow operation failed");
            eprintln!("error[{}]: {e}", e.category());
            if let Some(tx_id) = e.tx_id() {
                eprintln!("transaction id: {tx_id}");
            }
            for line in e.logs() {
                eprintln!("  {line}");
            }
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
