//! Transaction variants, canonical encoding and identifiers.
//!
//! Transactions are closed tagged variants (one per transaction type) so the
//! builder and composer are exhaustively checked. A transaction id is a pure
//! function of the transaction's canonical bytes.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512_256};

use crate::app::{Address, AppId, AppSchema};

/// A transaction identifier: hex digest of the canonical bytes.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, derive_more::Display,
)]
#[display("{_0}")]
pub struct TransactionId(pub String);

/// Identifier shared by every transaction in an atomic group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub [u8; 32]);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Fields common to every transaction type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHeader {
    pub sender: Address,
    /// Fee in micro-units, taken from suggested params.
    pub fee: u64,
    /// First round this transaction is valid in.
    pub first_valid: u64,
    /// Last round this transaction is valid in.
    pub last_valid: u64,
    pub genesis_id: String,
    /// Base64 genesis hash, as served by the network.
    pub genesis_hash: String,
    pub note: Option<Vec<u8>>,
    /// Shared group id, assigned by the composer. `None` outside a group.
    pub group: Option<GroupId>,
}

/// Type-specific transaction payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionBody {
    AppCreate {
        approval: Vec<u8>,
        clear: Vec<u8>,
        schema: AppSchema,
        extra_pages: u32,
    },
    AppUpdate {
        app_id: AppId,
        approval: Vec<u8>,
        clear: Vec<u8>,
    },
    AppDelete {
        app_id: AppId,
    },
    AppCall {
        app_id: AppId,
        /// Encoded application arguments; for ABI calls the first entry is
        /// the method selector.
        app_args: Vec<Vec<u8>>,
    },
    Payment {
        receiver: Address,
        amount: u64,
    },
}

/// An unsigned transaction, owned by the builder until handed to the
/// composer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub header: TransactionHeader,
    pub body: TransactionBody,
}

impl UnsignedTransaction {
    /// Deterministic canonical encoding used for hashing and signing.
    ///
    /// Field order is fixed by the struct definitions, so identical
    /// transactions always produce identical bytes.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("transaction serialization cannot fail")
    }

    /// 32-byte digest of the canonical bytes, domain-separated as a
    /// transaction.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha512_256::new();
        hasher.update(b"TX");
        hasher.update(self.canonical_bytes());
        hasher.finalize().into()
    }

    /// The transaction id, a pure function of the transaction contents
    /// (including its group assignment).
    pub fn id(&self) -> TransactionId {
        TransactionId(hex::encode(self.digest()))
    }

    /// The application this transaction targets, if any.
    pub fn app_id(&self) -> Option<AppId> {
        match &self.body {
            TransactionBody::AppCreate { .. } | TransactionBody::Payment { .. } => None,
            TransactionBody::AppUpdate { app_id, .. }
            | TransactionBody::AppDelete { app_id }
            | TransactionBody::AppCall { app_id, .. } => Some(*app_id),
        }
    }
}

/// A signed transaction; immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub txn: UnsignedTransaction,
    /// Raw signature bytes bound to the sender.
    pub signature: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(sender: &str, receiver: &str, amount: u64) -> UnsignedTransaction {
        UnsignedTransaction {
            header: TransactionHeader {
                sender: Address::new(sender),
                fee: 1000,
                first_valid: 100,
                last_valid: 110,
                genesis_id: "testnet-v1.0".to_string(),
                genesis_hash: "SGO1GKSzyE7IEPItTxCByw9x8FmnrCDexi9/cOUJOiI=".to_string(),
                note: None,
                group: None,
            },
            body: TransactionBody::Payment {
                receiver: Address::new(receiver),
                amount,
            },
        }
    }

    #[test]
    fn test_id_deterministic() {
        let a = payment("alice", "bob", 5);
        let b = payment("alice", "bob", 5);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_id_changes_with_contents() {
        let a = payment("alice", "bob", 5);
        let b = payment("alice", "bob", 6);
        assert_ne!(a.id(), b.id());

        let mut c = payment("alice", "bob", 5);
        c.header.last_valid += 1;
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn test_id_covers_group_assignment() {
        let a = payment("alice", "bob", 5);
        let mut grouped = a.clone();
        grouped.header.group = Some(GroupId([7u8; 32]));
        assert_ne!(a.id(), grouped.id());
    }

    #[test]
    fn test_app_id_per_variant() {
        let pay = payment("alice", "bob", 5);
        assert_eq!(pay.app_id(), None);

        let mut delete = pay.clone();
        delete.body = TransactionBody::AppDelete {
            app_id: AppId(42),
        };
        assert_eq!(delete.app_id(), Some(AppId(42)));
    }
}
