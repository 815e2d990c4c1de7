// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Schema-driven binary codec for escrow instructions and accounts.
//!
//! Layout: 8-byte discriminator, then every field in schema order.
//! Integers are little-endian, identities are raw 32 bytes, booleans are one
//! byte (0 or 1) and vectors are a u32 little-endian length followed by the
//! elements.
//!
//! Unsigned arguments are supplied as [`Value::Unsigned`] and narrowed to the
//! declared width at encode time, so an oversized value is an
//! [`CodecError::OutOfRange`] rather than a silent wrap.

use std::collections::BTreeMap;

use super::schema::{EscrowSchema, FieldDef, FieldType, DISCRIMINATOR_LEN, INITIALIZE};
use crate::blockchain::pubkey::Pubkey;

/// Field that carries the signer quorum. Zero is never a valid quorum.
pub const QUORUM_FIELD: &str = "required_signatures";

/// A decoded or to-be-encoded field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Unsigned(u64),
    Signed(i64),
    Bool(bool),
    Pubkey(Pubkey),
    Vec(Vec<Value>),
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Unsigned(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Unsigned(u64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Signed(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Pubkey> for Value {
    fn from(v: Pubkey) -> Self {
        Value::Pubkey(v)
    }
}

impl From<&[Pubkey]> for Value {
    fn from(keys: &[Pubkey]) -> Self {
        Value::Vec(keys.iter().copied().map(Value::Pubkey).collect())
    }
}

/// Named field values, keyed by schema field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap(BTreeMap<String, Value>);

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<Value>) {
        self.0.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn require(&self, name: &str) -> Result<&Value, CodecError> {
        self.get(name)
            .ok_or_else(|| CodecError::MissingField(name.to_string()))
    }

    pub fn unsigned(&self, name: &str) -> Result<u64, CodecError> {
        match self.require(name)? {
            Value::Unsigned(v) => Ok(*v),
            _ => Err(type_mismatch(name, "unsigned integer")),
        }
    }

    pub fn signed(&self, name: &str) -> Result<i64, CodecError> {
        match self.require(name)? {
            Value::Signed(v) => Ok(*v),
            _ => Err(type_mismatch(name, "signed integer")),
        }
    }

    pub fn boolean(&self, name: &str) -> Result<bool, CodecError> {
        match self.require(name)? {
            Value::Bool(v) => Ok(*v),
            _ => Err(type_mismatch(name, "bool")),
        }
    }

    pub fn pubkey(&self, name: &str) -> Result<Pubkey, CodecError> {
        match self.require(name)? {
            Value::Pubkey(v) => Ok(*v),
            _ => Err(type_mismatch(name, "pubkey")),
        }
    }

    pub fn pubkeys(&self, name: &str) -> Result<Vec<Pubkey>, CodecError> {
        match self.require(name)? {
            Value::Vec(items) => items
                .iter()
                .map(|item| match item {
                    Value::Pubkey(k) => Ok(*k),
                    _ => Err(type_mismatch(name, "vec<pubkey>")),
                })
                .collect(),
            _ => Err(type_mismatch(name, "vec<pubkey>")),
        }
    }

    /// Unsigned field narrowed to u8.
    pub fn small(&self, name: &str) -> Result<u8, CodecError> {
        let value = self.unsigned(name)?;
        u8::try_from(value).map_err(|_| CodecError::OutOfRange {
            field: name.to_string(),
            value: value.into(),
            min: 0,
            max: u8::MAX.into(),
        })
    }
}

fn type_mismatch(field: &str, expected: &'static str) -> CodecError {
    CodecError::TypeMismatch {
        field: field.to_string(),
        expected,
    }
}

/// Encoder and decoder bound to one validated schema.
#[derive(Debug, Clone)]
pub struct RecordCodec {
    schema: EscrowSchema,
}

impl RecordCodec {
    pub fn new(schema: EscrowSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &EscrowSchema {
        &self.schema
    }

    /// Encode instruction data for `name` from named arguments.
    pub fn encode_instruction(&self, name: &str, args: &FieldMap) -> Result<Vec<u8>, CodecError> {
        let ix = self
            .schema
            .instruction(name)
            .ok_or_else(|| CodecError::UnknownInstruction(name.to_string()))?;

        let mut out = Vec::with_capacity(DISCRIMINATOR_LEN + 64);
        out.extend_from_slice(&ix.discriminator);
        write_fields(&mut out, &ix.args, args)?;
        Ok(out)
    }

    /// Decode instruction data, identifying the instruction by its discriminator.
    ///
    /// Instruction data has no padding, so trailing bytes are an error.
    pub fn decode_instruction(&self, bytes: &[u8]) -> Result<(String, FieldMap), CodecError> {
        let tag = discriminator_of(bytes)?;
        let ix = self
            .schema
            .instructions
            .iter()
            .find(|ix| ix.discriminator == tag)
            .ok_or_else(|| CodecError::SchemaMismatch {
                expected: "instruction".to_string(),
                found: tag,
            })?;

        let mut reader = Reader::new(&bytes[DISCRIMINATOR_LEN..]);
        let fields = read_fields(&mut reader, &ix.args)?;
        if reader.remaining() > 0 {
            return Err(CodecError::TrailingBytes(reader.remaining()));
        }
        Ok((ix.name.clone(), fields))
    }

    /// Decode account data after verifying it carries `name`'s discriminator.
    ///
    /// Accounts may be allocated larger than their contents, so trailing
    /// bytes are ignored.
    pub fn decode_account(&self, name: &str, bytes: &[u8]) -> Result<FieldMap, CodecError> {
        let def = self
            .schema
            .account(name)
            .ok_or_else(|| CodecError::UnknownAccount(name.to_string()))?;

        let tag = discriminator_of(bytes)?;
        if tag != def.discriminator {
            return Err(CodecError::SchemaMismatch {
                expected: name.to_string(),
                found: tag,
            });
        }

        let mut reader = Reader::new(&bytes[DISCRIMINATOR_LEN..]);
        read_fields(&mut reader, &def.fields)
    }

    /// Encode account data for `name`.
    pub fn encode_account(&self, name: &str, fields: &FieldMap) -> Result<Vec<u8>, CodecError> {
        let def = self
            .schema
            .account(name)
            .ok_or_else(|| CodecError::UnknownAccount(name.to_string()))?;

        let mut out = Vec::with_capacity(DISCRIMINATOR_LEN + 256);
        out.extend_from_slice(&def.discriminator);
        write_fields(&mut out, &def.fields, fields)?;
        Ok(out)
    }

    /// Discriminator of account `name`, used as the scan filter prefix.
    pub fn account_discriminator(&self, name: &str) -> Result<[u8; DISCRIMINATOR_LEN], CodecError> {
        self.schema
            .account(name)
            .map(|def| def.discriminator)
            .ok_or_else(|| CodecError::UnknownAccount(name.to_string()))
    }
}

//=============================================================================
// Manual initialize encoding
//=============================================================================

/// `initialize` discriminator of the deployed program.
pub const INITIALIZE_DISCRIMINATOR: [u8; DISCRIMINATOR_LEN] = [175, 175, 109, 31, 13, 152, 155, 237];

/// Encode `initialize` field by field, without consulting a schema.
///
/// Used as the last submission strategy when schema-driven encoding is the
/// suspected failure.
pub fn encode_initialize_manual(
    recipient: &Pubkey,
    amount: u64,
    required_signatures: u8,
    signers: &[Pubkey],
) -> Result<Vec<u8>, CodecError> {
    if required_signatures == 0 {
        return Err(CodecError::OutOfRange {
            field: QUORUM_FIELD.to_string(),
            value: 0,
            min: 1,
            max: u8::MAX.into(),
        });
    }
    let count = u32::try_from(signers.len()).map_err(|_| CodecError::LengthOverflow(INITIALIZE.to_string()))?;

    let mut out = Vec::with_capacity(DISCRIMINATOR_LEN + 32 + 8 + 1 + 4 + 32 * signers.len());
    out.extend_from_slice(&INITIALIZE_DISCRIMINATOR);
    out.extend_from_slice(recipient.as_ref());
    out.extend_from_slice(&amount.to_le_bytes());
    out.push(required_signatures);
    out.extend_from_slice(&count.to_le_bytes());
    for signer in signers {
        out.extend_from_slice(signer.as_ref());
    }
    Ok(out)
}

//=============================================================================
// Field encoding
//=============================================================================

fn discriminator_of(bytes: &[u8]) -> Result<[u8; DISCRIMINATOR_LEN], CodecError> {
    bytes
        .get(..DISCRIMINATOR_LEN)
        .and_then(|d| d.try_into().ok())
        .ok_or_else(|| CodecError::Truncated("discriminator".to_string()))
}

fn write_fields(out: &mut Vec<u8>, defs: &[FieldDef], values: &FieldMap) -> Result<(), CodecError> {
    for def in defs {
        let value = values.require(&def.name)?;
        write_value(out, &def.name, &def.ty, value)?;
    }
    Ok(())
}

fn write_value(out: &mut Vec<u8>, field: &str, ty: &FieldType, value: &Value) -> Result<(), CodecError> {
    let min = if field == QUORUM_FIELD { 1 } else { 0 };
    match (ty, value) {
        (FieldType::U8, Value::Unsigned(v)) => out.push(narrow(field, *v, min, u8::MAX.into())? as u8),
        (FieldType::U16, Value::Unsigned(v)) => {
            let v = narrow(field, *v, min, u16::MAX.into())? as u16;
            out.extend_from_slice(&v.to_le_bytes());
        }
        (FieldType::U32, Value::Unsigned(v)) => {
            let v = narrow(field, *v, min, u32::MAX.into())? as u32;
            out.extend_from_slice(&v.to_le_bytes());
        }
        (FieldType::U64, Value::Unsigned(v)) => {
            let v = narrow(field, *v, min, u64::MAX)?;
            out.extend_from_slice(&v.to_le_bytes());
        }
        (FieldType::I64, Value::Signed(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (FieldType::Bool, Value::Bool(v)) => out.push(u8::from(*v)),
        (FieldType::Pubkey, Value::Pubkey(k)) => out.extend_from_slice(k.as_ref()),
        (FieldType::Vec(inner), Value::Vec(items)) => {
            let len = u32::try_from(items.len()).map_err(|_| CodecError::LengthOverflow(field.to_string()))?;
            out.extend_from_slice(&len.to_le_bytes());
            for item in items {
                write_value(out, field, inner, item)?;
            }
        }
        (ty, _) => {
            return Err(CodecError::TypeMismatch {
                field: field.to_string(),
                expected: type_name(ty),
            })
        }
    }
    Ok(())
}

fn narrow(field: &str, value: u64, min: u64, max: u64) -> Result<u64, CodecError> {
    if value < min || value > max {
        return Err(CodecError::OutOfRange {
            field: field.to_string(),
            value: value.into(),
            min,
            max,
        });
    }
    Ok(value)
}

fn type_name(ty: &FieldType) -> &'static str {
    match ty {
        FieldType::U8 => "u8",
        FieldType::U16 => "u16",
        FieldType::U32 => "u32",
        FieldType::U64 => "u64",
        FieldType::I64 => "i64",
        FieldType::Bool => "bool",
        FieldType::Pubkey => "pubkey",
        FieldType::Vec(_) => "vec",
    }
}

fn read_fields(reader: &mut Reader<'_>, defs: &[FieldDef]) -> Result<FieldMap, CodecError> {
    let mut fields = FieldMap::new();
    for def in defs {
        let value = read_value(reader, &def.name, &def.ty)?;
        fields.0.insert(def.name.clone(), value);
    }
    Ok(fields)
}

fn read_value(reader: &mut Reader<'_>, field: &str, ty: &FieldType) -> Result<Value, CodecError> {
    Ok(match ty {
        FieldType::U8 => Value::Unsigned(reader.array::<1>(field)?[0].into()),
        FieldType::U16 => Value::Unsigned(u16::from_le_bytes(reader.array(field)?).into()),
        FieldType::U32 => Value::Unsigned(u32::from_le_bytes(reader.array(field)?).into()),
        FieldType::U64 => Value::Unsigned(u64::from_le_bytes(reader.array(field)?)),
        FieldType::I64 => Value::Signed(i64::from_le_bytes(reader.array(field)?)),
        FieldType::Bool => match reader.array::<1>(field)?[0] {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            other => {
                return Err(CodecError::InvalidBool {
                    field: field.to_string(),
                    byte: other,
                })
            }
        },
        FieldType::Pubkey => Value::Pubkey(Pubkey::new_from_array(reader.array(field)?)),
        FieldType::Vec(inner) => {
            let len = u32::from_le_bytes(reader.array(field)?) as usize;
            // Reject lengths the remaining bytes cannot possibly hold before allocating
            if len.saturating_mul(inner.min_size()) > reader.remaining() {
                return Err(CodecError::Truncated(field.to_string()));
            }
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                items.push(read_value(reader, field, inner)?);
            }
            Value::Vec(items)
        }
    })
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn array<const N: usize>(&mut self, field: &str) -> Result<[u8; N], CodecError> {
        let slice = self
            .bytes
            .get(self.pos..self.pos + N)
            .ok_or_else(|| CodecError::Truncated(field.to_string()))?;
        self.pos += N;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }
}

/// Errors raised while encoding or decoding escrow data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("data is not a `{expected}` (discriminator {found:?})")]
    SchemaMismatch {
        expected: String,
        found: [u8; DISCRIMINATOR_LEN],
    },

    #[error("`{field}` = {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: u128,
        min: u64,
        max: u64,
    },

    #[error("unknown instruction `{0}`")]
    UnknownInstruction(String),

    #[error("unknown account `{0}`")]
    UnknownAccount(String),

    #[error("missing field `{0}`")]
    MissingField(String),

    #[error("`{field}` is not a {expected}")]
    TypeMismatch { field: String, expected: &'static str },

    #[error("data ends inside `{0}`")]
    Truncated(String),

    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),

    #[error("`{field}` has invalid bool byte {byte}")]
    InvalidBool { field: String, byte: u8 },

    #[error("`{0}` is too long to encode")]
    LengthOverflow(String),

    #[error("signature from {0} appears more than once")]
    DuplicateSignature(Pubkey),

    #[error("signature from {0} who is not a listed signer")]
    ForeignSignature(Pubkey),

    #[error("record is both executed and cancelled")]
    ConflictingTerminalFlags,

    #[error("no address supplied for account `{0}`")]
    MissingAccount(String),

    #[error("program could not decode the request: {0}")]
    ProgramRejected(String),
}

impl CodecError {
    /// Whether the failure points at a client/program layout disagreement
    /// that a different encoding path may avoid.
    pub fn is_schema_fault(&self) -> bool {
        matches!(
            self,
            CodecError::ProgramRejected(_)
                | CodecError::UnknownInstruction(_)
                | CodecError::MissingField(_)
                | CodecError::MissingAccount(_)
                | CodecError::TypeMismatch { .. }
        )
    }
}
