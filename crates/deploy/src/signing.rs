//! Transaction signing: the opaque signer capability, the sender→signer
//! registry, and a local ed25519 account for development and tests.
//!
//! Signer backends (hardware keys, remote services) are responsible for
//! their own internal concurrency safety; the pipeline only ever asks them
//! to sign bytes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey};
use rand::rngs::OsRng;

use crate::app::Address;
use crate::error::DeployError;
use crate::group::TransactionGroup;
use crate::transaction::SignedTransaction;

/// Capability to sign transaction bytes on behalf of one sender.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Sign the canonical bytes of a transaction.
    async fn sign(&self, bytes: &[u8]) -> Result<Vec<u8>, DeployError>;
}

/// Maps sender addresses to their bound signers.
#[derive(Clone, Default)]
pub struct SignerRegistry {
    default_signer: Option<Arc<dyn TransactionSigner>>,
    signers: HashMap<Address, Arc<dyn TransactionSigner>>,
}

impl SignerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a signer to a sender address.
    pub fn register(&mut self, sender: Address, signer: Arc<dyn TransactionSigner>) -> &mut Self {
        self.signers.insert(sender, signer);
        self
    }

    /// Set the signer used for senders with no explicit binding.
    pub fn set_default(&mut self, signer: Arc<dyn TransactionSigner>) -> &mut Self {
        self.default_signer = Some(signer);
        self
    }

    /// Resolve the signer for a sender, falling back to the default.
    pub fn signer_for(&self, sender: &Address) -> Result<Arc<dyn TransactionSigner>, DeployError> {
        self.signers
            .get(sender)
            .or(self.default_signer.as_ref())
            .cloned()
            .ok_or_else(|| DeployError::MissingSigner {
                sender: sender.clone(),
            })
    }
}

/// Sign every transaction in a group with the signer bound to its sender.
///
/// All signers are resolved up front, so a missing signer fails before any
/// signature is produced. Signatures are requested concurrently.
pub async fn sign_group(
    group: &TransactionGroup,
    registry: &SignerRegistry,
) -> Result<Vec<SignedTransaction>, DeployError> {
    let signers: Vec<Arc<dyn TransactionSigner>> = group
        .transactions()
        .iter()
        .map(|txn| registry.signer_for(&txn.header.sender))
        .collect::<Result<_, _>>()?;

    let signed = futures::future::try_join_all(group.transactions().iter().zip(signers).map(
        |(txn, signer)| async move {
            let signature = signer.sign(&txn.canonical_bytes()).await?;
            Ok::<_, DeployError>(SignedTransaction {
                txn: txn.clone(),
                signature,
            })
        },
    ))
    .await?;

    Ok(signed)
}

/// An in-process ed25519 account.
///
/// The address is the hex-encoded public key; network address encodings are
/// left to the underlying SDK.
pub struct LocalAccount {
    key: SigningKey,
    address: Address,
}

impl LocalAccount {
    /// Generate a fresh account from the system RNG.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    /// Restore an account from a 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(&seed))
    }

    fn from_signing_key(key: SigningKey) -> Self {
        let address = Address::new(hex::encode(key.verifying_key().to_bytes()));
        Self { key, address }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }
}

#[async_trait]
impl TransactionSigner for LocalAccount {
    async fn sign(&self, bytes: &[u8]) -> Result<Vec<u8>, DeployError> {
        Ok(self.key.sign(bytes).to_bytes().to_vec())
    }
}
