// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Versioned escrow program schema.
//!
//! The schema names every instruction and account the client touches, with
//! its 8-byte discriminator and ordered field layout. It is validated once at
//! load time: a definition that the codec or orchestrator could not use is a
//! [`SchemaLoadError`], never a call-time surprise.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::blockchain::pubkey::Pubkey;

/// Schema shipped with the crate, matching the deployed program.
pub const EMBEDDED_IDL: &str = include_str!("../../idl/multisig_escrow.json");

/// Name of the on-chain escrow record.
pub const ESCROW_ACCOUNT: &str = "EscrowAccount";

pub const INITIALIZE: &str = "initialize";
pub const SIGN: &str = "sign";
pub const EXECUTE: &str = "execute";
pub const CANCEL: &str = "cancel";

pub const DISCRIMINATOR_LEN: usize = 8;

/// Instructions the orchestrator submits, with the accounts it resolves for each.
const REQUIRED_INSTRUCTIONS: &[(&str, &[&str])] = &[
    (
        INITIALIZE,
        &[
            "escrow",
            "depositor",
            "depositor_token_account",
            "escrow_vault",
            "mint",
            "token_program",
            "system_program",
            "rent",
        ],
    ),
    (SIGN, &["escrow", "signer"]),
    (
        EXECUTE,
        &["escrow", "escrow_vault", "recipient_token_account", "token_program"],
    ),
    (
        CANCEL,
        &[
            "escrow",
            "escrow_vault",
            "depositor_token_account",
            "depositor",
            "token_program",
        ],
    ),
];

/// Fields the escrow record needs, with their expected types.
fn required_escrow_fields() -> Vec<(&'static str, FieldType)> {
    vec![
        ("depositor", FieldType::Pubkey),
        ("recipient", FieldType::Pubkey),
        ("mint", FieldType::Pubkey),
        ("amount", FieldType::U64),
        ("required_signatures", FieldType::U8),
        ("current_signatures", FieldType::U8),
        ("signers", FieldType::Vec(Box::new(FieldType::Pubkey))),
        ("signatures", FieldType::Vec(Box::new(FieldType::Pubkey))),
        ("created_at", FieldType::I64),
        ("is_executed", FieldType::Bool),
        ("is_cancelled", FieldType::Bool),
        ("bump", FieldType::U8),
    ]
}

/// Arguments the `initialize` instruction must accept.
fn required_initialize_args() -> Vec<(&'static str, FieldType)> {
    vec![
        ("recipient", FieldType::Pubkey),
        ("amount", FieldType::U64),
        ("required_signatures", FieldType::U8),
        ("signers", FieldType::Vec(Box::new(FieldType::Pubkey))),
    ]
}

//=============================================================================
// Validated schema
//=============================================================================

/// Wire type of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    U8,
    U16,
    U32,
    U64,
    I64,
    Bool,
    Pubkey,
    /// u32 little-endian length followed by the elements
    Vec(Box<FieldType>),
}

impl FieldType {
    fn parse(raw: &RawType) -> Result<Self, String> {
        match raw {
            RawType::Named(name) => match name.as_str() {
                "u8" => Ok(FieldType::U8),
                "u16" => Ok(FieldType::U16),
                "u32" => Ok(FieldType::U32),
                "u64" => Ok(FieldType::U64),
                "i64" => Ok(FieldType::I64),
                "bool" => Ok(FieldType::Bool),
                // Older schema generations spell it `publicKey`
                "pubkey" | "publicKey" => Ok(FieldType::Pubkey),
                other => Err(other.to_string()),
            },
            RawType::Vec { vec } => Ok(FieldType::Vec(Box::new(FieldType::parse(vec)?))),
        }
    }

    /// Smallest number of bytes one value of this type occupies.
    pub fn min_size(&self) -> usize {
        match self {
            FieldType::U8 | FieldType::Bool => 1,
            FieldType::U16 => 2,
            FieldType::U32 => 4,
            FieldType::U64 | FieldType::I64 => 8,
            FieldType::Pubkey => 32,
            FieldType::Vec(_) => 4,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::U8 => write!(f, "u8"),
            FieldType::U16 => write!(f, "u16"),
            FieldType::U32 => write!(f, "u32"),
            FieldType::U64 => write!(f, "u64"),
            FieldType::I64 => write!(f, "i64"),
            FieldType::Bool => write!(f, "bool"),
            FieldType::Pubkey => write!(f, "pubkey"),
            FieldType::Vec(inner) => write!(f, "vec<{inner}>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub ty: FieldType,
}

/// Account slot of an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountSlot {
    pub name: String,
    #[serde(default)]
    pub writable: bool,
    #[serde(default)]
    pub signer: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionDef {
    pub name: String,
    pub discriminator: [u8; DISCRIMINATOR_LEN],
    pub accounts: Vec<AccountSlot>,
    pub args: Vec<FieldDef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountDef {
    pub name: String,
    pub discriminator: [u8; DISCRIMINATOR_LEN],
    pub fields: Vec<FieldDef>,
}

/// A loaded and validated program schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowSchema {
    pub version: String,
    pub name: String,
    /// Program address recorded in the schema, if any
    pub address: Option<Pubkey>,
    pub instructions: Vec<InstructionDef>,
    pub accounts: Vec<AccountDef>,
}

impl EscrowSchema {
    /// The schema shipped with the crate.
    pub fn embedded() -> Result<Self, SchemaLoadError> {
        Self::from_json(EMBEDDED_IDL)
    }

    /// Load from `path` when given, otherwise use the embedded schema.
    pub fn load(path: Option<&Path>) -> Result<Self, SchemaLoadError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::embedded(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, SchemaLoadError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| SchemaLoadError::Io(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    /// Parse and validate a JSON schema definition.
    pub fn from_json(json: &str) -> Result<Self, SchemaLoadError> {
        let raw: RawIdl =
            serde_json::from_str(json).map_err(|e| SchemaLoadError::Parse(e.to_string()))?;
        Self::validate(raw)
    }

    pub fn instruction(&self, name: &str) -> Option<&InstructionDef> {
        self.instructions.iter().find(|ix| ix.name == name)
    }

    pub fn account(&self, name: &str) -> Option<&AccountDef> {
        self.accounts.iter().find(|acc| acc.name == name)
    }

    /// The escrow record definition. Present in every validated schema.
    pub fn escrow_account(&self) -> Result<&AccountDef, SchemaLoadError> {
        self.account(ESCROW_ACCOUNT)
            .ok_or(SchemaLoadError::MissingAccount(ESCROW_ACCOUNT))
    }

    fn validate(raw: RawIdl) -> Result<Self, SchemaLoadError> {
        let address = raw
            .address
            .as_deref()
            .map(|a| a.parse::<Pubkey>())
            .transpose()
            .map_err(|e| SchemaLoadError::InvalidAddress(e.to_string()))?;

        let mut names = HashSet::new();
        let mut discriminators: Vec<([u8; DISCRIMINATOR_LEN], String)> = Vec::new();
        let mut seen_discriminator = |disc: [u8; DISCRIMINATOR_LEN], owner: &str| {
            if let Some((_, first)) = discriminators.iter().find(|(d, _)| *d == disc) {
                return Err(SchemaLoadError::DuplicateDiscriminator {
                    first: first.clone(),
                    second: owner.to_string(),
                });
            }
            discriminators.push((disc, owner.to_string()));
            Ok(())
        };

        let mut instructions = Vec::with_capacity(raw.instructions.len());
        for ix in raw.instructions {
            if !names.insert(format!("instruction:{}", ix.name)) {
                return Err(SchemaLoadError::DuplicateName(ix.name));
            }
            let discriminator = parse_discriminator(&ix.name, &ix.discriminator)?;
            seen_discriminator(discriminator, &ix.name)?;
            let args = parse_fields(&ix.name, &ix.args)?;
            instructions.push(InstructionDef {
                name: ix.name,
                discriminator,
                accounts: ix.accounts,
                args,
            });
        }

        let mut accounts = Vec::with_capacity(raw.accounts.len());
        for acc in raw.accounts {
            if !names.insert(format!("account:{}", acc.name)) {
                return Err(SchemaLoadError::DuplicateName(acc.name));
            }
            let discriminator = parse_discriminator(&acc.name, &acc.discriminator)?;
            seen_discriminator(discriminator, &acc.name)?;
            let fields = parse_fields(&acc.name, &acc.fields)?;
            accounts.push(AccountDef {
                name: acc.name,
                discriminator,
                fields,
            });
        }

        let schema = Self {
            version: raw.version,
            name: raw.name,
            address,
            instructions,
            accounts,
        };
        schema.check_required()?;
        Ok(schema)
    }

    fn check_required(&self) -> Result<(), SchemaLoadError> {
        for &(name, slots) in REQUIRED_INSTRUCTIONS {
            let ix = self
                .instruction(name)
                .ok_or(SchemaLoadError::MissingInstruction(name))?;
            for &slot in slots {
                if !ix.accounts.iter().any(|a| a.name == slot) {
                    return Err(SchemaLoadError::MissingInstructionAccount {
                        instruction: name,
                        account: slot,
                    });
                }
            }
        }

        let initialize = self
            .instruction(INITIALIZE)
            .ok_or(SchemaLoadError::MissingInstruction(INITIALIZE))?;
        require_fields(INITIALIZE, &initialize.args, &required_initialize_args())?;

        let escrow = self.escrow_account()?;
        require_fields(ESCROW_ACCOUNT, &escrow.fields, &required_escrow_fields())
    }
}

fn parse_discriminator(owner: &str, raw: &[u8]) -> Result<[u8; DISCRIMINATOR_LEN], SchemaLoadError> {
    raw.try_into().map_err(|_| SchemaLoadError::BadDiscriminator {
        owner: owner.to_string(),
        len: raw.len(),
    })
}

fn parse_fields(owner: &str, raw: &[RawField]) -> Result<Vec<FieldDef>, SchemaLoadError> {
    let mut seen = HashSet::new();
    raw.iter()
        .map(|field| {
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaLoadError::DuplicateName(format!("{owner}.{}", field.name)));
            }
            let ty = FieldType::parse(&field.ty).map_err(|ty| SchemaLoadError::UnknownType {
                field: format!("{owner}.{}", field.name),
                ty,
            })?;
            Ok(FieldDef {
                name: field.name.clone(),
                ty,
            })
        })
        .collect()
}

fn require_fields(
    owner: &'static str,
    fields: &[FieldDef],
    required: &[(&'static str, FieldType)],
) -> Result<(), SchemaLoadError> {
    for (name, ty) in required {
        let name = *name;
        match fields.iter().find(|f| f.name == name) {
            Some(field) if field.ty == *ty => {}
            Some(field) => {
                return Err(SchemaLoadError::FieldTypeMismatch {
                    owner,
                    field: name,
                    expected: ty.to_string(),
                    found: field.ty.to_string(),
                })
            }
            None => return Err(SchemaLoadError::MissingField { owner, field: name }),
        }
    }
    Ok(())
}

//=============================================================================
// Raw JSON shape
//=============================================================================

#[derive(Deserialize)]
struct RawIdl {
    version: String,
    name: String,
    #[serde(default)]
    address: Option<String>,
    instructions: Vec<RawInstruction>,
    #[serde(default)]
    accounts: Vec<RawAccount>,
}

#[derive(Deserialize)]
struct RawInstruction {
    name: String,
    discriminator: Vec<u8>,
    #[serde(default)]
    accounts: Vec<AccountSlot>,
    #[serde(default)]
    args: Vec<RawField>,
}

#[derive(Deserialize)]
struct RawAccount {
    name: String,
    discriminator: Vec<u8>,
    #[serde(default)]
    fields: Vec<RawField>,
}

#[derive(Deserialize)]
struct RawField {
    name: String,
    #[serde(rename = "type")]
    ty: RawType,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawType {
    Named(String),
    Vec { vec: Box<RawType> },
}

/// Errors raised while loading a schema definition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaLoadError {
    #[error("failed to read schema: {0}")]
    Io(String),

    #[error("schema is not valid JSON: {0}")]
    Parse(String),

    #[error("schema address is invalid: {0}")]
    InvalidAddress(String),

    #[error("unknown type `{ty}` for `{field}`")]
    UnknownType { field: String, ty: String },

    #[error("discriminator of `{owner}` must be 8 bytes, got {len}")]
    BadDiscriminator { owner: String, len: usize },

    #[error("duplicate name `{0}`")]
    DuplicateName(String),

    #[error("`{first}` and `{second}` share a discriminator")]
    DuplicateDiscriminator { first: String, second: String },

    #[error("instruction `{0}` is missing")]
    MissingInstruction(&'static str),

    #[error("instruction `{instruction}` has no `{account}` account")]
    MissingInstructionAccount {
        instruction: &'static str,
        account: &'static str,
    },

    #[error("account `{0}` is missing")]
    MissingAccount(&'static str),

    #[error("`{owner}` has no `{field}` field")]
    MissingField {
        owner: &'static str,
        field: &'static str,
    },

    #[error("`{owner}.{field}` is {found}, expected {expected}")]
    FieldTypeMismatch {
        owner: &'static str,
        field: &'static str,
        expected: String,
        found: String,
    },
}
