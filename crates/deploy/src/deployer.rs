//! The deployment orchestrator.
//!
//! Runs one idempotent attempt through the pipeline stages: compare the
//! desired spec against on-chain state, build the required transactions,
//! compose them into an atomic group, sign, submit and wait for
//! confirmation. Every failure is annotated with the stage it came from.
//! A confirmation timeout is not a failure: the outcome is unknown and the
//! result carries the still-pending ids so the caller can re-query.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::abi::AbiValue;
use crate::app::{Address, AppId, ApplicationSpec, CompiledSpec};
use crate::builder::{self, MethodCall};
use crate::compare::{self, DeploymentAction, OnSchemaBreak, OnUpdate};
use crate::confirm::{
    ConfirmationWaiter, ConfirmedTransaction, DEFAULT_MAX_CONFIRMATION_ROUNDS,
    DEFAULT_POLL_INTERVAL, Sleeper, TokioSleeper,
};
use crate::error::{DeployError, DeployStage, StageError};
use crate::group;
use crate::network::{NetworkClient, NetworkError, SuggestedParams};
use crate::params::{DEFAULT_VALIDITY_WINDOW, ParamsCache};
use crate::signing::{SignerRegistry, sign_group};
use crate::template::TemplateValue;
use crate::transaction::{TransactionId, UnsignedTransaction};

/// Per-attempt deployment configuration.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    /// Policy when the deployed schema is incompatible with the desired one.
    pub on_schema_break: OnSchemaBreak,
    /// Policy when only the programs differ.
    pub on_update: OnUpdate,
    /// Id of the previously deployed application, if any. Without it the
    /// attempt always creates.
    pub existing_app_id: Option<AppId>,
    /// Values substituted into `TMPL_*` placeholders before compilation.
    pub template_values: BTreeMap<String, TemplateValue>,
    /// Rounds each transaction stays valid from its first valid round.
    pub validity_window: u64,
    /// Bound on confirmation polling rounds.
    pub max_confirmation_rounds: u64,
    /// Interval between confirmation polls.
    pub poll_interval: Duration,
    /// Optional ABI call issued against the deployed application.
    pub call: Option<MethodCall>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            on_schema_break: OnSchemaBreak::default(),
            on_update: OnUpdate::default(),
            existing_app_id: None,
            template_values: BTreeMap::new(),
            validity_window: DEFAULT_VALIDITY_WINDOW,
            max_confirmation_rounds: DEFAULT_MAX_CONFIRMATION_ROUNDS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            call: None,
        }
    }
}

/// Terminal state of a deployment attempt that was not a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployStatus {
    /// Every submitted transaction confirmed.
    Success,
    /// The polling bound elapsed with transactions still pending. Their
    /// outcome is unknown; re-query the ids, never resubmit.
    TimedOut { pending: Vec<TransactionId> },
}

/// Outcome of one deployment attempt.
#[derive(Debug, Clone)]
pub struct DeploymentResult {
    /// The action the comparator chose.
    pub action: DeploymentAction,
    /// The deployed application id; `None` when a create attempt timed out
    /// before the id was assigned.
    pub app_id: Option<AppId>,
    /// Confirmations for the transactions that made it on chain.
    pub confirmations: Vec<ConfirmedTransaction>,
    /// Decoded ABI return value of the configured call, if any.
    pub return_value: Option<AbiValue>,
    pub status: DeployStatus,
}

/// Outcome of a standalone ABI method call.
#[derive(Debug, Clone)]
pub struct MethodCallResult {
    pub confirmation: ConfirmedTransaction,
    pub return_value: Option<AbiValue>,
}

/// Result of submitting one group and waiting for it.
enum GroupOutcome {
    Confirmed(Vec<ConfirmedTransaction>),
    TimedOut(Vec<TransactionId>),
}

/// Orchestrates idempotent application deployments.
pub struct AppDeployer {
    client: Arc<dyn NetworkClient>,
    signers: SignerRegistry,
    params: ParamsCache,
    sleeper: Arc<dyn Sleeper>,
}

impl AppDeployer {
    pub fn new(client: Arc<dyn NetworkClient>, signers: SignerRegistry) -> Self {
        Self::with_sleeper(client, signers, Arc::new(TokioSleeper))
    }

    /// Construct with a custom sleep implementation for confirmation polls.
    pub fn with_sleeper(
        client: Arc<dyn NetworkClient>,
        signers: SignerRegistry,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            client,
            signers,
            params: ParamsCache::default(),
            sleeper,
        }
    }

    /// Run one deployment attempt for `spec` from `sender`.
    ///
    /// The attempt is idempotent: re-running it against unchanged on-chain
    /// state submits nothing (unless a call is configured). On failure the
    /// whole attempt is discarded; the caller re-runs from the comparison
    /// stage, which re-observes on-chain state.
    pub async fn deploy(
        &self,
        spec: &ApplicationSpec,
        sender: &Address,
        config: &DeployConfig,
    ) -> Result<DeploymentResult, StageError> {
        let (compiled, action) = self.compare(spec, config).await?;
        tracing::info!(app = %spec.name, %action, "Deployment action computed");

        if config.call.is_none() {
            if let DeploymentAction::NoOp { app_id } = action {
                return Ok(DeploymentResult {
                    action,
                    app_id: Some(app_id),
                    confirmations: Vec::new(),
                    return_value: None,
                    status: DeployStatus::Success,
                });
            }
        }

        let params = self
            .params
            .get(self.client.as_ref())
            .await
            .map_err(|e| DeployError::from(e).at(DeployStage::Building))?;

        let mut txns =
            builder::build_transactions(action, &compiled, sender, &params, config.validity_window);

        // A call against an already-known app id rides in the same group.
        // After a create or replace the id only exists once the group
        // confirms, so the call goes out as a second submission.
        let known_app_id = match action {
            DeploymentAction::Update { app_id } | DeploymentAction::NoOp { app_id } => Some(app_id),
            DeploymentAction::Create | DeploymentAction::Replace { .. } => None,
        };
        if let (Some(call), Some(app_id)) = (&config.call, known_app_id) {
            let txn =
                builder::build_method_call(app_id, call, sender, &params, config.validity_window)
                    .map_err(|e| e.at(DeployStage::Building))?;
            txns.push(txn);
        }

        let outcome = self.run_group(txns, config).await?;
        let confirmations = match outcome {
            GroupOutcome::Confirmed(confirmations) => confirmations,
            GroupOutcome::TimedOut(pending) => {
                return Ok(DeploymentResult {
                    action,
                    app_id: known_app_id,
                    confirmations: Vec::new(),
                    return_value: None,
                    status: DeployStatus::TimedOut { pending },
                });
            }
        };

        let app_id = known_app_id.or_else(|| {
            confirmations
                .iter()
                .find_map(|confirmation| confirmation.application_id)
        });

        // Call after a create or replace, now that the id exists.
        if let (Some(call), None) = (&config.call, known_app_id) {
            let app_id = match app_id {
                Some(app_id) => app_id,
                None => {
                    return Err(DeployError::Submission {
                        reason: "create confirmation carried no application id".to_string(),
                    }
                    .at(DeployStage::Confirming));
                }
            };
            return self
                .call_after_deploy(action, app_id, confirmations, call, sender, &params, config)
                .await;
        }

        let return_value = match &config.call {
            Some(call) => decode_call_return(call, confirmations.last()),
            None => None,
        };

        tracing::info!(app = %spec.name, ?app_id, "Deployment confirmed");
        Ok(DeploymentResult {
            action,
            app_id,
            confirmations,
            return_value,
            status: DeployStatus::Success,
        })
    }

    /// Invoke an ABI method on an already deployed application.
    pub async fn call_method(
        &self,
        app_id: AppId,
        call: &MethodCall,
        sender: &Address,
        config: &DeployConfig,
    ) -> Result<MethodCallResult, StageError> {
        let params = self
            .params
            .get(self.client.as_ref())
            .await
            .map_err(|e| DeployError::from(e).at(DeployStage::Building))?;
        let txn = builder::build_method_call(app_id, call, sender, &params, config.validity_window)
            .map_err(|e| e.at(DeployStage::Building))?;

        match self.run_group(vec![txn], config).await? {
            GroupOutcome::Confirmed(mut confirmations) => {
                let confirmation = match confirmations.pop() {
                    Some(confirmation) => confirmation,
                    None => {
                        return Err(DeployError::Submission {
                            reason: "call confirmation missing".to_string(),
                        }
                        .at(DeployStage::Confirming));
                    }
                };
                let return_value = decode_call_return(call, Some(&confirmation));
                Ok(MethodCallResult {
                    confirmation,
                    return_value,
                })
            }
            GroupOutcome::TimedOut(pending) => Err(DeployError::ConfirmationTimeout {
                rounds: config.max_confirmation_rounds,
                pending,
            }
            .at(DeployStage::Confirming)),
        }
    }

    /// Comparing stage: render, compile and diff against on-chain state.
    async fn compare(
        &self,
        spec: &ApplicationSpec,
        config: &DeployConfig,
    ) -> Result<(CompiledSpec, DeploymentAction), StageError> {
        let stage = DeployStage::Comparing;

        let compiled = builder::compile_spec(self.client.as_ref(), spec, &config.template_values)
            .await
            .map_err(|e| e.at(stage))?;

        let existing = match config.existing_app_id {
            Some(app_id) => self
                .client
                .application_info(app_id)
                .await
                .map_err(|e| DeployError::from(e).at(stage))?,
            None => None,
        };

        let action = compare::required_action(
            &compiled,
            existing.as_ref(),
            config.on_schema_break,
            config.on_update,
        )
        .map_err(|e| e.at(stage))?;

        Ok((compiled, action))
    }

    /// Compose, sign, submit and wait for one transaction group.
    async fn run_group(
        &self,
        txns: Vec<UnsignedTransaction>,
        config: &DeployConfig,
    ) -> Result<GroupOutcome, StageError> {
        if txns.is_empty() {
            return Ok(GroupOutcome::Confirmed(Vec::new()));
        }

        let group = group::compose(txns).map_err(|e| e.at(DeployStage::Composing))?;

        let signed = sign_group(&group, &self.signers)
            .await
            .map_err(|e| e.at(DeployStage::Signing))?;

        let txids = self
            .client
            .submit_group(&signed)
            .await
            .map_err(|e| match e {
                NetworkError::Rejected { reason } => DeployError::Submission { reason },
                other => DeployError::from(other),
            })
            .map_err(|e| e.at(DeployStage::Submitting))?;
        tracing::debug!(txns = txids.len(), "Group submitted");

        let waiter = ConfirmationWaiter::with_sleeper(
            config.max_confirmation_rounds,
            config.poll_interval,
            self.sleeper.clone(),
        );
        match waiter.wait_for(self.client.as_ref(), &txids).await {
            Ok(confirmations) => Ok(GroupOutcome::Confirmed(confirmations)),
            Err(DeployError::ConfirmationTimeout { pending, .. }) => {
                Ok(GroupOutcome::TimedOut(pending))
            }
            Err(e) => Err(e.at(DeployStage::Confirming)),
        }
    }

    /// Issue the configured call as a second submission after a create or
    /// replace confirmed.
    #[allow(clippy::too_many_arguments)]
    async fn call_after_deploy(
        &self,
        action: DeploymentAction,
        app_id: AppId,
        mut confirmations: Vec<ConfirmedTransaction>,
        call: &MethodCall,
        sender: &Address,
        params: &SuggestedParams,
        config: &DeployConfig,
    ) -> Result<DeploymentResult, StageError> {
        let txn = builder::build_method_call(app_id, call, sender, params, config.validity_window)
            .map_err(|e| e.at(DeployStage::Building))?;

        match self.run_group(vec![txn], config).await? {
            GroupOutcome::Confirmed(call_confirmations) => {
                let return_value = decode_call_return(call, call_confirmations.last());
                confirmations.extend(call_confirmations);
                Ok(DeploymentResult {
                    action,
                    app_id: Some(app_id),
                    confirmations,
                    return_value,
                    status: DeployStatus::Success,
                })
            }
            GroupOutcome::TimedOut(pending) => Ok(DeploymentResult {
                action,
                app_id: Some(app_id),
                confirmations,
                return_value: None,
                status: DeployStatus::TimedOut { pending },
            }),
        }
    }
}

/// Decode the ABI return value from the call's confirmation logs.
///
/// A malformed return value does not fail an otherwise confirmed
/// deployment; it is logged and reported as absent.
fn decode_call_return(
    call: &MethodCall,
    confirmation: Option<&ConfirmedTransaction>,
) -> Option<AbiValue> {
    let confirmation = confirmation?;
    match call.method.decode_return(&confirmation.logs) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, txid = %confirmation.txid, "Failed to decode return value");
            None
        }
    }
}
