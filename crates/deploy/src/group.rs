//! Atomic transaction group composition.
//!
//! Every transaction in a group carries the same group id, computed as a
//! hash over the ordered sequence. The network confirms or rejects the
//! group as a single unit.

use sha2::{Digest, Sha512_256};

use crate::error::DeployError;
use crate::transaction::{GroupId, TransactionId, UnsignedTransaction};

/// Maximum number of transactions the network accepts in one atomic group.
pub const MAX_GROUP_SIZE: usize = 16;

/// An ordered, finalized sequence of transactions sharing a group id.
///
/// Order is significant: a replace deployment requires delete-then-create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionGroup {
    txns: Vec<UnsignedTransaction>,
    group_id: Option<GroupId>,
}

impl TransactionGroup {
    /// The shared group id; `None` for single-transaction groups, which
    /// skip grouping.
    pub fn group_id(&self) -> Option<GroupId> {
        self.group_id
    }

    pub fn transactions(&self) -> &[UnsignedTransaction] {
        &self.txns
    }

    pub fn len(&self) -> usize {
        self.txns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txns.is_empty()
    }

    /// Transaction ids in group order.
    pub fn ids(&self) -> Vec<TransactionId> {
        self.txns.iter().map(|txn| txn.id()).collect()
    }
}

/// Assemble an ordered transaction sequence into a finalized group.
///
/// Fails with [`DeployError::GroupSizeExceeded`] before any network call if
/// the sequence exceeds [`MAX_GROUP_SIZE`]. Single-transaction sequences are
/// returned without a group id.
pub fn compose(mut txns: Vec<UnsignedTransaction>) -> Result<TransactionGroup, DeployError> {
    if txns.len() > MAX_GROUP_SIZE {
        return Err(DeployError::GroupSizeExceeded { len: txns.len() });
    }

    let group_id = if txns.len() > 1 {
        let gid = compute_group_id(&txns);
        for txn in &mut txns {
            txn.header.group = Some(gid);
        }
        Some(gid)
    } else {
        None
    };

    Ok(TransactionGroup { txns, group_id })
}

/// Compute the group id for an ordered sequence.
///
/// The id is a pure function of the sequence: it hashes each transaction's
/// digest with the group field cleared, in order, under a group domain
/// prefix. Reordering the sequence changes the id.
pub fn compute_group_id(txns: &[UnsignedTransaction]) -> GroupId {
    let mut hasher = Sha512_256::new();
    hasher.update(b"TG");
    for txn in txns {
        let mut ungrouped = txn.clone();
        ungrouped.header.group = None;
        hasher.update(ungrouped.digest());
    }
    GroupId(hasher.finalize().into())
}
