//! Error taxonomy for the deployment pipeline.
//!
//! Every component fails fast with a typed [`DeployError`]; the orchestrator
//! wraps it in a [`StageError`] recording which pipeline stage produced it.

use crate::app::{Address, AppId};
use crate::group::MAX_GROUP_SIZE;
use crate::network::NetworkError;
use crate::transaction::TransactionId;

/// Errors produced by the deployment components.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// A template placeholder was left unresolved after substitution.
    #[error("unresolved template variable `{variable}` in {program} program")]
    Template {
        program: &'static str,
        variable: String,
    },

    /// ABI arguments did not match the declared method signature.
    #[error("ABI encoding failed for method `{method}`: {reason}")]
    AbiEncoding { method: String, reason: String },

    /// More transactions than the network allows in one atomic group.
    #[error("transaction group of {len} exceeds the maximum of {MAX_GROUP_SIZE}")]
    GroupSizeExceeded { len: usize },

    /// A sender in the group has no bound signer.
    #[error("no signer registered for sender {sender}")]
    MissingSigner { sender: Address },

    /// A signer backend failed to produce a signature.
    #[error("signer failed for {sender}: {reason}")]
    Signing { sender: Address, reason: String },

    /// The network rejected the submitted group. Not retried automatically:
    /// resubmitting a rejected group without a change is futile.
    #[error("network rejected submission: {reason}")]
    Submission { reason: String },

    /// The polling bound elapsed before every transaction confirmed.
    /// The outcome is unknown; the caller must re-query, never resubmit.
    #[error("transactions not confirmed within {rounds} polling rounds")]
    ConfirmationTimeout {
        rounds: u64,
        pending: Vec<TransactionId>,
    },

    /// The transaction pool evicted one of the submitted transactions.
    /// Fatal for this attempt; a fresh pipeline run with a new round window
    /// is required.
    #[error("transaction {txid} was evicted from the pool: {pool_error}")]
    TransactionExpired {
        txid: TransactionId,
        pool_error: String,
    },

    /// The desired schema differs from the deployed one and the
    /// on-schema-break policy is `fail`.
    #[error("schema for application {app_id} has changed and on-schema-break policy is fail")]
    SchemaBreak { app_id: AppId },

    /// The desired programs differ from the deployed ones and the on-update
    /// policy is `fail`.
    #[error("programs for application {app_id} have changed and on-update policy is fail")]
    UpdateBlocked { app_id: AppId },

    /// A network call failed for reasons other than submission rejection.
    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// Pipeline stages of a deployment attempt, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum DeployStage {
    Comparing,
    Building,
    Composing,
    Signing,
    Submitting,
    Confirming,
}

/// A [`DeployError`] annotated with the pipeline stage that produced it.
#[derive(Debug, thiserror::Error)]
#[error("deployment failed during {stage}: {source}")]
pub struct StageError {
    pub stage: DeployStage,
    #[source]
    pub source: DeployError,
}

impl DeployError {
    /// Attach the pipeline stage this error originated from.
    pub fn at(self, stage: DeployStage) -> StageError {
        StageError {
            stage,
            source: self,
        }
    }
}
