// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transaction assembly.
//!
//! Wire types come from the ledger SDK. Every escrow write is a single
//! instruction paid for by the signing identity, so assembly reduces to one
//! constructor plus a way to name the result before it is sent.

pub use solana_sdk::hash::Hash;
pub use solana_sdk::instruction::{AccountMeta, Instruction};
pub use solana_sdk::message::Message;
pub use solana_sdk::signature::{ParseSignatureError, Signature};
pub use solana_sdk::transaction::Transaction;

use super::pubkey::Pubkey;

/// Unsigned single-instruction transaction with `payer` as fee payer.
pub fn unsigned_transaction(instruction: Instruction, payer: &Pubkey, blockhash: Hash) -> Transaction {
    let message = Message::new_with_blockhash(&[instruction], Some(payer), &blockhash);
    Transaction::new_unsigned(message)
}

/// Ledger id of a transaction: its fee payer signature in base58.
///
/// `None` until the fee payer has signed. The id is known before the
/// transaction is sent, so it can be reported even when the send fails.
pub fn transaction_id(tx: &Transaction) -> Option<String> {
    tx.signatures
        .first()
        .filter(|signature| **signature != Signature::default())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> Pubkey {
        Pubkey::new_from_array([byte; 32])
    }

    #[test]
    fn payer_comes_first_and_program_last() {
        let payer = key(1);
        let ix = Instruction::new_with_bytes(
            key(9),
            &[1, 2, 3],
            vec![AccountMeta::new(key(4), false), AccountMeta::new_readonly(key(5), false)],
        );
        let tx = unsigned_transaction(ix, &payer, Hash::new_from_array([7u8; 32]));

        let keys = &tx.message.account_keys;
        assert_eq!(keys.first(), Some(&payer));
        assert_eq!(keys.last(), Some(&key(9)));
        assert_eq!(tx.message.header.num_required_signatures, 1);
        assert_eq!(tx.message.recent_blockhash, Hash::new_from_array([7u8; 32]));
        assert_eq!(tx.signatures.len(), 1);
    }

    #[test]
    fn unsigned_transaction_has_no_id() {
        let ix = Instruction::new_with_bytes(key(9), &[], vec![]);
        let tx = unsigned_transaction(ix, &key(1), Hash::default());
        assert_eq!(transaction_id(&tx), None);
    }
}
