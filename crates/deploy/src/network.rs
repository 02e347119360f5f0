//! The network client capability consumed by the deployment pipeline.
//!
//! The pipeline never talks to a global client; an implementation of
//! [`NetworkClient`] is injected at construction so tests can substitute an
//! in-memory double. Implementations must be safe for concurrent use by
//! multiple in-flight deployment attempts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::app::{AppId, OnChainApplication};
use crate::transaction::{SignedTransaction, TransactionId};

/// Suggested transaction parameters from the network's status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedParams {
    /// Suggested fee in micro-units.
    pub fee: u64,
    /// Network-enforced minimum fee.
    pub min_fee: u64,
    /// The round the network most recently confirmed.
    pub last_round: u64,
    pub genesis_id: String,
    /// Base64 genesis hash.
    pub genesis_hash: String,
}

/// State of a submitted transaction as reported by the pending pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingTransaction {
    /// Round the transaction was confirmed in; `None` while pending.
    pub confirmed_round: Option<u64>,
    /// Non-empty when the pool rejected or evicted the transaction.
    pub pool_error: String,
    /// Application id assigned by a create transaction.
    pub application_id: Option<AppId>,
    /// Logs emitted during execution.
    pub logs: Vec<Vec<u8>>,
}

/// Errors surfaced by a network client implementation.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// The request never produced a usable response.
    #[error("network transport error: {0}")]
    Transport(String),

    /// The network answered with an error status.
    #[error("network API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The submit endpoint rejected the group. Never retried.
    #[error("submission rejected: {reason}")]
    Rejected { reason: String },

    /// The response could not be decoded.
    #[error("failed to decode network response: {0}")]
    Decode(String),
}

impl NetworkError {
    /// Whether a read-only request that failed this way may be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            NetworkError::Transport(_) => true,
            NetworkError::Api { status, .. } => *status >= 500,
            NetworkError::Rejected { .. } | NetworkError::Decode(_) => false,
        }
    }
}

/// Capability for talking to the network.
#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// Fetch suggested parameters for new transactions.
    async fn suggested_params(&self) -> Result<SuggestedParams, NetworkError>;

    /// Look up a deployed application. `Ok(None)` when no application with
    /// this id exists (or it has been deleted).
    async fn application_info(
        &self,
        app_id: AppId,
    ) -> Result<Option<OnChainApplication>, NetworkError>;

    /// Compile program source to bytecode.
    async fn compile_program(&self, source: &str) -> Result<Vec<u8>, NetworkError>;

    /// Broadcast a fully signed group as one atomic submission, returning
    /// the transaction ids in group order. Rejection is fatal and must not
    /// be retried by the implementation.
    async fn submit_group(
        &self,
        group: &[SignedTransaction],
    ) -> Result<Vec<TransactionId>, NetworkError>;

    /// Query the pending pool for a submitted transaction.
    async fn pending_transaction(
        &self,
        txid: &TransactionId,
    ) -> Result<PendingTransaction, NetworkError>;
}
