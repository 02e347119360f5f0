//! Caching for suggested transaction parameters.
//!
//! Suggested parameters change once per round at most, so a short-lived
//! cache keeps repeated transaction builds from hammering the node.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::network::{NetworkClient, NetworkError, SuggestedParams};

/// How long fetched parameters stay fresh.
pub const DEFAULT_PARAMS_TTL: Duration = Duration::from_secs(3);

/// Rounds a transaction stays valid after its first valid round.
pub const DEFAULT_VALIDITY_WINDOW: u64 = 10;

/// A time-bounded cache over [`NetworkClient::suggested_params`].
pub struct ParamsCache {
    ttl: Duration,
    cached: Mutex<Option<(SuggestedParams, Instant)>>,
}

impl Default for ParamsCache {
    fn default() -> Self {
        Self::new(DEFAULT_PARAMS_TTL)
    }
}

impl ParamsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cached: Mutex::new(None),
        }
    }

    /// Return cached parameters, fetching from the network when the cache is
    /// empty or stale.
    pub async fn get(&self, client: &dyn NetworkClient) -> Result<SuggestedParams, NetworkError> {
        let mut cached = self.cached.lock().await;
        if let Some((params, fetched_at)) = cached.as_ref() {
            if fetched_at.elapsed() < self.ttl {
                return Ok(params.clone());
            }
        }

        let params = client.suggested_params().await?;
        tracing::debug!(last_round = params.last_round, "Fetched suggested parameters");
        *cached = Some((params.clone(), Instant::now()));
        Ok(params)
    }

    /// Drop the cached value, forcing the next `get` to fetch.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}
