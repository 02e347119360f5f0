//! algoforge-deploy - Idempotent application deployment for Algorand-style
//! networks.
//!
//! This crate compares a desired application spec against observed on-chain
//! state, derives the minimal set of transactions needed to reconcile them,
//! and drives those transactions through composition, signing, submission
//! and confirmation.

pub mod abi;
pub mod app;
pub mod builder;
pub mod compare;
pub mod confirm;
pub mod error;
pub mod group;
pub mod network;
pub mod params;
pub mod signing;
pub mod template;
pub mod transaction;

mod algod;
mod deployer;

pub use abi::{AbiMethod, AbiType, AbiValue};
pub use algod::AlgodClient;
pub use app::{
    Address, AppId, AppSchema, ApplicationSpec, CompiledSpec, OnChainApplication, ProgramHash,
    StateSchema, TealProgram,
};
pub use builder::MethodCall;
pub use compare::{DeploymentAction, OnSchemaBreak, OnUpdate};
pub use confirm::{ConfirmationWaiter, ConfirmedTransaction, Sleeper, TokioSleeper};
pub use deployer::{
    AppDeployer, DeployConfig, DeployStatus, DeploymentResult, MethodCallResult,
};
pub use error::{DeployError, DeployStage, StageError};
pub use group::{MAX_GROUP_SIZE, TransactionGroup};
pub use network::{NetworkClient, NetworkError, PendingTransaction, SuggestedParams};
pub use params::ParamsCache;
pub use signing::{LocalAccount, SignerRegistry, TransactionSigner};
pub use template::TemplateValue;
pub use transaction::{
    GroupId, SignedTransaction, TransactionBody, TransactionHeader, TransactionId,
    UnsignedTransaction,
};
