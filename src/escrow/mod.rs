// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Multisig escrow domain.
//!
//! - `schema` - versioned program schema, loaded and validated up front
//! - `codec` - schema-driven encoding of instructions and records
//! - `record` - the on-chain escrow record and creation parameters
//! - `state` - lifecycle state machine and capability flags
//! - `strategy` - ordered submission fallback chain
//! - `orchestrator` - the operations callers use

pub mod codec;
pub mod orchestrator;
pub mod record;
pub mod schema;
pub mod state;
pub mod strategy;

#[cfg(test)]
pub(crate) mod testing;

pub use codec::{CodecError, RecordCodec};
pub use orchestrator::{EscrowEntry, EscrowOrchestrator, EscrowView, WriteReceipt};
pub use record::{CreateEscrowParams, EscrowRecord, InitializeArgs};
pub use schema::{EscrowSchema, SchemaLoadError};
pub use state::{Capabilities, EscrowStatus, TransitionError};
pub use strategy::Strategy;
