// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Multisig Escrow Client - Quorum-Gated Token Escrow Orchestrator
//!
//! Client-side orchestration for an on-chain multisig escrow program. A
//! depositor locks tokens for a recipient; release requires a quorum of
//! listed signers, and the depositor may cancel until then.
//!
//! ## Modules
//!
//! - `blockchain` - ledger SDK types, derived addresses, token views, RPC gateway
//! - `config` - environment-driven session configuration
//! - `error` - error taxonomy shared by every operation
//! - `escrow` - schema, codec, state machine and orchestrator

pub mod blockchain;
pub mod config;
pub mod error;
pub mod escrow;

pub use config::ClientConfig;
pub use error::EscrowError;
pub use escrow::EscrowOrchestrator;
