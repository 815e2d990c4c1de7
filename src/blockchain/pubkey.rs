// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity handles.
//!
//! Every party, mint, program and derived account is named by the ledger
//! SDK's 32-byte [`Pubkey`]. The SDK serializes keys as raw byte arrays; the
//! adapters here render them as base58 text in JSON output instead.

use serde::ser::SerializeSeq;
use serde::Serializer;

pub use solana_sdk::pubkey::{ParsePubkeyError, Pubkey};

/// `serialize_with` adapter: one key as base58 text.
pub fn as_base58<S: Serializer>(key: &Pubkey, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(key)
}

/// `serialize_with` adapter: a list of keys as base58 text.
pub fn as_base58_list<S: Serializer>(keys: &[Pubkey], serializer: S) -> Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(keys.len()))?;
    for key in keys {
        seq.serialize_element(&key.to_string())?;
    }
    seq.end()
}
