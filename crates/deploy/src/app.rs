//! Application specifications and observed on-chain state.
//!
//! An [`ApplicationSpec`] is the desired state for one deployment attempt;
//! an [`OnChainApplication`] is a read-only snapshot of what is currently
//! deployed. Comparison between the two is purely by content hash.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512_256};

use crate::abi::AbiMethod;

/// An account address on the network, treated as an opaque string.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, derive_more::Display,
)]
#[display("{_0}")]
pub struct Address(pub String);

impl Address {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Address {
    fn from(addr: &str) -> Self {
        Self(addr.to_string())
    }
}

/// An application id assigned by the network at creation time.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[display("{_0}")]
pub struct AppId(pub u64);

/// Declared storage slot counts for one scope (global or local).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSchema {
    /// Number of integer slots.
    pub uints: u64,
    /// Number of byte-slice slots.
    pub byte_slices: u64,
}

impl StateSchema {
    pub fn new(uints: u64, byte_slices: u64) -> Self {
        Self { uints, byte_slices }
    }
}

/// Global and local storage schema for an application.
///
/// Schema changes are not updatable in place on the network; they force a
/// delete-and-recreate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSchema {
    pub global: StateSchema,
    pub local: StateSchema,
}

/// A TEAL program: source to be compiled, or already compiled bytecode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TealProgram {
    /// Program source, possibly containing `TMPL_*` placeholders.
    Source(String),
    /// Compiled bytecode. Template substitution does not apply.
    Compiled(Vec<u8>),
}

/// Desired on-chain state for one deployment attempt.
///
/// Immutable once constructed for a given attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSpec {
    /// Human-readable application name, recorded in the transaction note.
    pub name: String,
    /// The approval program.
    pub approval: TealProgram,
    /// The clear-state program.
    pub clear: TealProgram,
    /// Global/local storage schema.
    pub schema: AppSchema,
    /// Extra program pages requested at creation.
    pub extra_pages: u32,
    /// ABI methods exposed by the application.
    pub methods: Vec<AbiMethod>,
    /// On-chain metadata note attached to deployment transactions.
    pub note: Option<Vec<u8>>,
}

/// 32-byte content hash of a compiled program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgramHash(pub [u8; 32]);

impl fmt::Display for ProgramHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Hash compiled program bytecode, domain-separated from other digests.
pub fn program_hash(bytecode: &[u8]) -> ProgramHash {
    let mut hasher = Sha512_256::new();
    hasher.update(b"Program");
    hasher.update(bytecode);
    ProgramHash(hasher.finalize().into())
}

/// An [`ApplicationSpec`] with both programs rendered and compiled.
///
/// Produced once per deployment attempt before comparison, since content
/// hashes are computed over compiled bytecode.
#[derive(Debug, Clone)]
pub struct CompiledSpec {
    pub approval: Vec<u8>,
    pub clear: Vec<u8>,
    pub schema: AppSchema,
    pub extra_pages: u32,
    pub note: Option<Vec<u8>>,
}

impl CompiledSpec {
    pub fn approval_hash(&self) -> ProgramHash {
        program_hash(&self.approval)
    }

    pub fn clear_hash(&self) -> ProgramHash {
        program_hash(&self.clear)
    }
}

/// Snapshot of a deployed application, fetched at comparison time.
///
/// Becomes stale as soon as the network advances; the comparator tolerates
/// this because any resulting submission failure discards the whole attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnChainApplication {
    pub app_id: AppId,
    pub approval_hash: ProgramHash,
    pub clear_hash: ProgramHash,
    pub schema: AppSchema,
    pub creator: Address,
    pub created_at_round: u64,
}
