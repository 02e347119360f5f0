//! HTTP implementation of [`NetworkClient`] against a node's REST API.
//!
//! Read-only requests are retried with exponential backoff when the failure
//! is transient. Submissions are never retried: a rejected or ambiguous
//! submission discards the whole attempt.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::app::{Address, AppId, AppSchema, OnChainApplication, StateSchema, program_hash};
use crate::network::{
    NetworkClient, NetworkError, PendingTransaction, SuggestedParams,
};
use crate::transaction::{SignedTransaction, TransactionId};

/// Default timeout for a single HTTP request.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Retry attempts for transient failures of read-only requests.
const MAX_RETRIES: usize = 3;

/// API token header expected by the node.
const TOKEN_HEADER: &str = "X-Algo-API-Token";

/// A client for one node's REST endpoint.
pub struct AlgodClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl AlgodClient {
    pub fn new(base_url: Url, token: Option<String>) -> Result<Self, NetworkError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| NetworkError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    fn url(&self, path: &str) -> Result<Url, NetworkError> {
        self.base_url
            .join(path)
            .map_err(|e| NetworkError::Decode(format!("invalid request path {path}: {e}")))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header(TOKEN_HEADER, token),
            None => request,
        }
    }

    async fn read_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, NetworkError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(NetworkError::Api {
                status: status.as_u16(),
                message: api_message(&message),
            });
        }
        response
            .json()
            .await
            .map_err(|e| NetworkError::Decode(e.to_string()))
    }

    /// GET a JSON resource, retrying transient failures.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, NetworkError> {
        let url = self.url(path)?;
        let fetch = || async {
            let response = self
                .authorize(self.http.get(url.clone()))
                .send()
                .await
                .map_err(|e| NetworkError::Transport(e.to_string()))?;
            Self::read_response(response).await
        };

        fetch
            .retry(ExponentialBuilder::default().with_max_times(MAX_RETRIES))
            .when(NetworkError::is_transient)
            .notify(|err, backoff| {
                tracing::debug!(error = %err, ?backoff, path, "Retrying transient request failure");
            })
            .await
    }
}

/// Extract the `message` field from a node error body, falling back to the
/// raw body.
fn api_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }
    serde_json::from_str::<ErrorBody>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.to_string())
}

#[derive(Deserialize)]
struct ParamsResponse {
    fee: u64,
    #[serde(rename = "min-fee")]
    min_fee: u64,
    #[serde(rename = "last-round")]
    last_round: u64,
    #[serde(rename = "genesis-id")]
    genesis_id: String,
    #[serde(rename = "genesis-hash")]
    genesis_hash: String,
}

#[derive(Deserialize)]
struct ApplicationResponse {
    id: u64,
    params: ApplicationParams,
    #[serde(rename = "created-at-round", default)]
    created_at_round: u64,
}

#[derive(Deserialize)]
struct ApplicationParams {
    #[serde(rename = "approval-program")]
    approval_program: String,
    #[serde(rename = "clear-state-program")]
    clear_state_program: String,
    #[serde(rename = "global-state-schema", default)]
    global_state_schema: SchemaResponse,
    #[serde(rename = "local-state-schema", default)]
    local_state_schema: SchemaResponse,
    creator: String,
}

#[derive(Deserialize, Default)]
struct SchemaResponse {
    #[serde(rename = "num-uint", default)]
    num_uint: u64,
    #[serde(rename = "num-byte-slice", default)]
    num_byte_slice: u64,
}

impl From<SchemaResponse> for StateSchema {
    fn from(schema: SchemaResponse) -> Self {
        StateSchema::new(schema.num_uint, schema.num_byte_slice)
    }
}

#[derive(Deserialize)]
struct CompileResponse {
    /// Base64 compiled bytecode.
    result: String,
}

#[derive(Deserialize)]
struct PendingResponse {
    #[serde(rename = "confirmed-round", default)]
    confirmed_round: Option<u64>,
    #[serde(rename = "pool-error", default)]
    pool_error: String,
    #[serde(rename = "application-index", default)]
    application_index: Option<u64>,
    #[serde(default)]
    logs: Vec<String>,
}

fn decode_b64(field: &str, value: &str) -> Result<Vec<u8>, NetworkError> {
    BASE64
        .decode(value)
        .map_err(|e| NetworkError::Decode(format!("invalid base64 in {field}: {e}")))
}

#[async_trait]
impl NetworkClient for AlgodClient {
    async fn suggested_params(&self) -> Result<SuggestedParams, NetworkError> {
        let params: ParamsResponse = self.get_json("/v2/transactions/params").await?;
        Ok(SuggestedParams {
            fee: params.fee,
            min_fee: params.min_fee,
            last_round: params.last_round,
            genesis_id: params.genesis_id,
            genesis_hash: params.genesis_hash,
        })
    }

    async fn application_info(
        &self,
        app_id: AppId,
    ) -> Result<Option<OnChainApplication>, NetworkError> {
        let app: ApplicationResponse =
            match self.get_json(&format!("/v2/applications/{app_id}")).await {
                Ok(app) => app,
                Err(NetworkError::Api { status: 404, .. }) => return Ok(None),
                Err(e) => return Err(e),
            };

        let approval = decode_b64("approval-program", &app.params.approval_program)?;
        let clear = decode_b64("clear-state-program", &app.params.clear_state_program)?;
        Ok(Some(OnChainApplication {
            app_id: AppId(app.id),
            approval_hash: program_hash(&approval),
            clear_hash: program_hash(&clear),
            schema: AppSchema {
                global: app.params.global_state_schema.into(),
                local: app.params.local_state_schema.into(),
            },
            creator: Address::new(app.params.creator),
            created_at_round: app.created_at_round,
        }))
    }

    async fn compile_program(&self, source: &str) -> Result<Vec<u8>, NetworkError> {
        let url = self.url("/v2/teal/compile")?;
        let response = self
            .authorize(self.http.post(url))
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(source.to_string())
            .send()
            .await
            .map_err(|e| NetworkError::Transport(e.to_string()))?;
        let compiled: CompileResponse = Self::read_response(response).await?;
        decode_b64("compile result", &compiled.result)
    }

    async fn submit_group(
        &self,
        group: &[SignedTransaction],
    ) -> Result<Vec<TransactionId>, NetworkError> {
        let url = self.url("/v2/transactions")?;
        let response = self
            .authorize(self.http.post(url))
            .json(group)
            .send()
            .await
            .map_err(|e| NetworkError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            return Err(NetworkError::Rejected {
                reason: api_message(&body),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NetworkError::Api {
                status: status.as_u16(),
                message: api_message(&body),
            });
        }

        // The node acknowledges the group as a whole; ids are a pure
        // function of the transactions, so derive them in group order.
        Ok(group.iter().map(|signed| signed.txn.id()).collect())
    }

    async fn pending_transaction(
        &self,
        txid: &TransactionId,
    ) -> Result<PendingTransaction, NetworkError> {
        let pending: PendingResponse = self
            .get_json(&format!("/v2/transactions/pending/{txid}"))
            .await?;
        let logs = pending
            .logs
            .iter()
            .map(|log| decode_b64("logs", log))
            .collect::<Result<_, _>>()?;
        Ok(PendingTransaction {
            confirmed_round: pending.confirmed_round,
            pool_error: pending.pool_error,
            application_id: pending.application_index.map(AppId),
            logs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_response_field_names() {
        let json = r#"{
            "fee": 0,
            "min-fee": 1000,
            "last-round": 4242,
            "genesis-id": "testnet-v1.0",
            "genesis-hash": "SGO1GKSzyE7IEPItTxCByw9x8FmnrCDexi9/cOUJOiI="
        }"#;
        let params: ParamsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(params.min_fee, 1000);
        assert_eq!(params.last_round, 4242);
    }

    #[test]
    fn test_application_response_decodes_schema() {
        let json = r#"{
            "id": 42,
            "created-at-round": 100,
            "params": {
                "approval-program": "BoEB",
                "clear-state-program": "BoEB",
                "creator": "abcd",
                "global-state-schema": {"num-uint": 2, "num-byte-slice": 1},
                "local-state-schema": {}
            }
        }"#;
        let app: ApplicationResponse = serde_json::from_str(json).unwrap();
        assert_eq!(app.id, 42);
        let global: StateSchema = app.params.global_state_schema.into();
        assert_eq!(global, StateSchema::new(2, 1));
        let local: StateSchema = app.params.local_state_schema.into();
        assert_eq!(local, StateSchema::default());
    }

    #[test]
    fn test_pending_response_defaults() {
        let pending: PendingResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(pending.confirmed_round, None);
        assert!(pending.pool_error.is_empty());
        assert!(pending.logs.is_empty());
    }

    #[test]
    fn test_api_message_extraction() {
        assert_eq!(
            api_message(r#"{"message": "overspend"}"#),
            "overspend"
        );
        assert_eq!(api_message("plain text error"), "plain text error");
    }
}
