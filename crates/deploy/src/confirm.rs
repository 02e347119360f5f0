//! Bounded confirmation polling.
//!
//! The waiter polls the pending pool for each submitted transaction id,
//! sleeping between rounds, until everything confirms, the round bound
//! elapses, or the pool reports an eviction. The sleep is injectable so
//! tests run without real time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::app::AppId;
use crate::error::DeployError;
use crate::network::NetworkClient;
use crate::transaction::TransactionId;

/// Default bound on polling rounds.
pub const DEFAULT_MAX_CONFIRMATION_ROUNDS: u64 = 10;

/// Default interval between polling rounds.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Injectable sleep, so confirmation waits are deterministic under test.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// The production sleeper.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Per-transaction confirmation data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedTransaction {
    pub txid: TransactionId,
    pub confirmed_round: u64,
    /// Application id assigned by a create transaction.
    pub application_id: Option<AppId>,
    pub logs: Vec<Vec<u8>>,
}

/// Polls the network for inclusion of submitted transaction ids.
pub struct ConfirmationWaiter {
    max_rounds: u64,
    poll_interval: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl ConfirmationWaiter {
    pub fn new(max_rounds: u64, poll_interval: Duration) -> Self {
        Self::with_sleeper(max_rounds, poll_interval, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(
        max_rounds: u64,
        poll_interval: Duration,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            max_rounds,
            poll_interval,
            sleeper,
        }
    }

    /// Wait until every id confirms.
    ///
    /// Returns confirmations in the order the ids were given. With
    /// `max_rounds == 0` this returns [`DeployError::ConfirmationTimeout`]
    /// immediately without a single poll. A pool eviction is fatal for the
    /// attempt: the caller must rebuild and resubmit, never re-wait on the
    /// same id. Dropping the returned future aborts the wait without side
    /// effects; the transactions stay safe to re-query.
    pub async fn wait_for(
        &self,
        client: &dyn NetworkClient,
        txids: &[TransactionId],
    ) -> Result<Vec<ConfirmedTransaction>, DeployError> {
        let mut confirmed: HashMap<TransactionId, ConfirmedTransaction> = HashMap::new();

        for round in 0..self.max_rounds {
            if round > 0 {
                self.sleeper.sleep(self.poll_interval).await;
            }

            for txid in txids {
                if confirmed.contains_key(txid) {
                    continue;
                }
                let info = client.pending_transaction(txid).await?;

                if !info.pool_error.is_empty() {
                    return Err(DeployError::TransactionExpired {
                        txid: txid.clone(),
                        pool_error: info.pool_error,
                    });
                }

                if let Some(confirmed_round) = info.confirmed_round.filter(|r| *r > 0) {
                    tracing::debug!(%txid, confirmed_round, "Transaction confirmed");
                    confirmed.insert(
                        txid.clone(),
                        ConfirmedTransaction {
                            txid: txid.clone(),
                            confirmed_round,
                            application_id: info.application_id,
                            logs: info.logs,
                        },
                    );
                }
            }

            if confirmed.len() == txids.len() {
                return Ok(txids
                    .iter()
                    .map(|id| confirmed.remove(id).expect("confirmed above"))
                    .collect());
            }
        }

        let pending: Vec<TransactionId> = txids
            .iter()
            .filter(|id| !confirmed.contains_key(id))
            .cloned()
            .collect();
        tracing::warn!(
            rounds = self.max_rounds,
            pending = pending.len(),
            "Confirmation polling bound elapsed"
        );
        Err(DeployError::ConfirmationTimeout {
            rounds: self.max_rounds,
            pending,
        })
    }
}
