//! End-to-end pipeline tests against an in-memory network double.
//!
//! The mock network compiles deterministically, assigns application ids,
//! records every submitted group, and confirms transactions either
//! immediately or never, so each policy and failure path can be exercised
//! without a node. Run with: cargo test --test deploy_pipeline

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use algoforge_deploy::{
    AbiMethod, AbiValue, Address, AppDeployer, AppId, AppSchema, ApplicationSpec,
    ConfirmationWaiter, DeployConfig, DeployError, DeployStage, DeployStatus, DeploymentAction,
    LocalAccount, MethodCall, NetworkClient, NetworkError, OnChainApplication, OnSchemaBreak,
    OnUpdate, PendingTransaction, SignedTransaction, SignerRegistry, Sleeper, StateSchema,
    SuggestedParams, TealProgram, TemplateValue, TransactionBody, TransactionId,
    app::program_hash, builder, group, signing,
};

const RETURN_PREFIX: [u8; 4] = [0x15, 0x1f, 0x7c, 0x75];

/// Mutable world state behind the mock network.
#[derive(Default)]
struct MockState {
    apps: HashMap<AppId, OnChainApplication>,
    next_app_id: u64,
    /// Every group handed to `submit_group`, in order.
    submitted: Vec<Vec<SignedTransaction>>,
    /// txid -> pending pool entry.
    pool: HashMap<TransactionId, PendingTransaction>,
    polls: u64,
}

/// An in-memory network: compiles by prefixing, confirms on submit when
/// `auto_confirm` is set, and otherwise leaves transactions pending forever.
struct MockNetwork {
    state: Mutex<MockState>,
    auto_confirm: bool,
    pool_error: Option<String>,
    reject_submissions: Option<String>,
    /// Logs attached to confirmed app-call transactions.
    call_logs: Vec<Vec<u8>>,
}

impl MockNetwork {
    fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                next_app_id: 1000,
                ..MockState::default()
            }),
            auto_confirm: true,
            pool_error: None,
            reject_submissions: None,
            call_logs: Vec::new(),
        }
    }

    fn never_confirming() -> Self {
        Self {
            auto_confirm: false,
            ..Self::new()
        }
    }

    fn with_pool_error(error: &str) -> Self {
        Self {
            auto_confirm: false,
            pool_error: Some(error.to_string()),
            ..Self::new()
        }
    }

    fn rejecting(reason: &str) -> Self {
        Self {
            reject_submissions: Some(reason.to_string()),
            ..Self::new()
        }
    }

    fn with_call_logs(logs: Vec<Vec<u8>>) -> Self {
        Self {
            call_logs: logs,
            ..Self::new()
        }
    }

    /// Seed a deployed application built from compiled program sources.
    fn seed_app(&self, approval_source: &str, clear_source: &str, schema: AppSchema) -> AppId {
        let mut state = self.state.lock().unwrap();
        let app_id = AppId(state.next_app_id);
        state.next_app_id += 1;
        state.apps.insert(
            app_id,
            OnChainApplication {
                app_id,
                approval_hash: program_hash(&compile(approval_source)),
                clear_hash: program_hash(&compile(clear_source)),
                schema,
                creator: Address::new("creator"),
                created_at_round: 50,
            },
        );
        app_id
    }

    fn submission_count(&self) -> usize {
        self.state.lock().unwrap().submitted.len()
    }

    fn submitted_bodies(&self, group: usize) -> Vec<TransactionBody> {
        self.state.lock().unwrap().submitted[group]
            .iter()
            .map(|signed| signed.txn.body.clone())
            .collect()
    }
}

/// Deterministic stand-in for node compilation.
fn compile(source: &str) -> Vec<u8> {
    let mut bytecode = b"bytecode:".to_vec();
    bytecode.extend_from_slice(source.as_bytes());
    bytecode
}

#[async_trait]
impl NetworkClient for MockNetwork {
    async fn suggested_params(&self) -> Result<SuggestedParams, NetworkError> {
        Ok(SuggestedParams {
            fee: 0,
            min_fee: 1000,
            last_round: 4242,
            genesis_id: "mocknet-v1.0".to_string(),
            genesis_hash: "bW9ja25ldA==".to_string(),
        })
    }

    async fn application_info(
        &self,
        app_id: AppId,
    ) -> Result<Option<OnChainApplication>, NetworkError> {
        Ok(self.state.lock().unwrap().apps.get(&app_id).cloned())
    }

    async fn compile_program(&self, source: &str) -> Result<Vec<u8>, NetworkError> {
        Ok(compile(source))
    }

    async fn submit_group(
        &self,
        group: &[SignedTransaction],
    ) -> Result<Vec<TransactionId>, NetworkError> {
        if let Some(reason) = &self.reject_submissions {
            return Err(NetworkError::Rejected {
                reason: reason.clone(),
            });
        }

        let mut state = self.state.lock().unwrap();
        state.submitted.push(group.to_vec());

        let mut txids = Vec::new();
        for signed in group {
            let txid = signed.txn.id();
            let mut pending = PendingTransaction::default();

            if let Some(error) = &self.pool_error {
                pending.pool_error = error.clone();
            } else if self.auto_confirm {
                pending.confirmed_round = Some(4243);
                match &signed.txn.body {
                    TransactionBody::AppCreate { approval, clear, schema, .. } => {
                        let app_id = AppId(state.next_app_id);
                        state.next_app_id += 1;
                        pending.application_id = Some(app_id);
                        state.apps.insert(
                            app_id,
                            OnChainApplication {
                                app_id,
                                approval_hash: program_hash(approval),
                                clear_hash: program_hash(clear),
                                schema: *schema,
                                creator: signed.txn.header.sender.clone(),
                                created_at_round: 4243,
                            },
                        );
                    }
                    TransactionBody::AppDelete { app_id } => {
                        state.apps.remove(app_id);
                    }
                    TransactionBody::AppCall { .. } => {
                        pending.logs = self.call_logs.clone();
                    }
                    TransactionBody::AppUpdate { .. } | TransactionBody::Payment { .. } => {}
                }
            }

            state.pool.insert(txid.clone(), pending);
            txids.push(txid);
        }
        Ok(txids)
    }

    async fn pending_transaction(
        &self,
        txid: &TransactionId,
    ) -> Result<PendingTransaction, NetworkError> {
        let mut state = self.state.lock().unwrap();
        state.polls += 1;
        Ok(state.pool.get(txid).cloned().unwrap_or_default())
    }
}

/// A sleeper that never actually sleeps.
struct NoopSleeper;

#[async_trait]
impl Sleeper for NoopSleeper {
    async fn sleep(&self, _duration: Duration) {}
}

fn counter_spec() -> ApplicationSpec {
    ApplicationSpec {
        name: "counter".to_string(),
        approval: TealProgram::Source("int 1".to_string()),
        clear: TealProgram::Source("int 0".to_string()),
        schema: AppSchema {
            global: StateSchema::new(1, 0),
            local: StateSchema::default(),
        },
        extra_pages: 0,
        methods: vec![AbiMethod::parse("add(uint64)uint64").unwrap()],
        note: None,
    }
}

fn deployer_for(network: Arc<MockNetwork>) -> (AppDeployer, Address) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let account = LocalAccount::from_seed([3u8; 32]);
    let sender = account.address().clone();
    let mut registry = SignerRegistry::new();
    registry.register(sender.clone(), Arc::new(account));
    let deployer = AppDeployer::with_sleeper(network, registry, Arc::new(NoopSleeper));
    (deployer, sender)
}

#[tokio::test]
async fn test_fresh_deploy_creates_application() {
    let network = Arc::new(MockNetwork::new());
    let (deployer, sender) = deployer_for(network.clone());

    let result = deployer
        .deploy(&counter_spec(), &sender, &DeployConfig::default())
        .await
        .unwrap();

    assert_eq!(result.action, DeploymentAction::Create);
    assert_eq!(result.status, DeployStatus::Success);
    assert_eq!(result.app_id, Some(AppId(1000)));
    assert_eq!(result.confirmations.len(), 1);
    assert_eq!(network.submission_count(), 1);
}

#[tokio::test]
async fn test_redeploy_of_unchanged_spec_submits_nothing() {
    let network = Arc::new(MockNetwork::new());
    let spec = counter_spec();
    let app_id = network.seed_app("int 1", "int 0", spec.schema);
    let (deployer, sender) = deployer_for(network.clone());

    let config = DeployConfig {
        existing_app_id: Some(app_id),
        ..DeployConfig::default()
    };
    let result = deployer.deploy(&spec, &sender, &config).await.unwrap();

    assert_eq!(result.action, DeploymentAction::NoOp { app_id });
    assert_eq!(result.status, DeployStatus::Success);
    assert_eq!(result.app_id, Some(app_id));
    assert!(result.confirmations.is_empty());
    assert_eq!(network.submission_count(), 0);
}

#[tokio::test]
async fn test_program_change_updates_in_place() {
    let network = Arc::new(MockNetwork::new());
    let spec = counter_spec();
    let app_id = network.seed_app("int 2", "int 0", spec.schema);
    let (deployer, sender) = deployer_for(network.clone());

    let config = DeployConfig {
        existing_app_id: Some(app_id),
        ..DeployConfig::default()
    };
    let result = deployer.deploy(&spec, &sender, &config).await.unwrap();

    assert_eq!(result.action, DeploymentAction::Update { app_id });
    assert_eq!(result.app_id, Some(app_id));
    let bodies = network.submitted_bodies(0);
    assert_eq!(bodies.len(), 1);
    assert!(matches!(bodies[0], TransactionBody::AppUpdate { .. }));
}

#[tokio::test]
async fn test_schema_break_replaces_delete_then_create() {
    let network = Arc::new(MockNetwork::new());
    let spec = counter_spec();
    let old_schema = AppSchema {
        global: StateSchema::new(4, 2),
        local: StateSchema::default(),
    };
    let app_id = network.seed_app("int 1", "int 0", old_schema);
    let (deployer, sender) = deployer_for(network.clone());

    let config = DeployConfig {
        existing_app_id: Some(app_id),
        on_schema_break: OnSchemaBreak::Replace,
        ..DeployConfig::default()
    };
    let result = deployer.deploy(&spec, &sender, &config).await.unwrap();

    assert_eq!(result.action, DeploymentAction::Replace { app_id });
    assert_eq!(result.status, DeployStatus::Success);
    // New id, old app gone.
    assert_ne!(result.app_id, Some(app_id));
    let bodies = network.submitted_bodies(0);
    assert!(matches!(bodies[0], TransactionBody::AppDelete { .. }));
    assert!(matches!(bodies[1], TransactionBody::AppCreate { .. }));
}

#[tokio::test]
async fn test_schema_break_fail_policy_stops_before_submitting() {
    let network = Arc::new(MockNetwork::new());
    let spec = counter_spec();
    let old_schema = AppSchema {
        global: StateSchema::new(4, 2),
        local: StateSchema::default(),
    };
    let app_id = network.seed_app("int 1", "int 0", old_schema);
    let (deployer, sender) = deployer_for(network.clone());

    let config = DeployConfig {
        existing_app_id: Some(app_id),
        on_schema_break: OnSchemaBreak::Fail,
        ..DeployConfig::default()
    };
    let err = deployer.deploy(&spec, &sender, &config).await.unwrap_err();

    assert_eq!(err.stage, DeployStage::Comparing);
    assert!(matches!(err.source, DeployError::SchemaBreak { .. }));
    assert_eq!(network.submission_count(), 0);
}

#[tokio::test]
async fn test_update_fail_policy_blocks_program_change() {
    let network = Arc::new(MockNetwork::new());
    let spec = counter_spec();
    let app_id = network.seed_app("int 2", "int 0", spec.schema);
    let (deployer, sender) = deployer_for(network.clone());

    let config = DeployConfig {
        existing_app_id: Some(app_id),
        on_update: OnUpdate::Fail,
        ..DeployConfig::default()
    };
    let err = deployer.deploy(&spec, &sender, &config).await.unwrap_err();

    assert_eq!(err.stage, DeployStage::Comparing);
    assert!(matches!(err.source, DeployError::UpdateBlocked { .. }));
}

#[tokio::test]
async fn test_template_values_flow_into_compiled_program() {
    let network = Arc::new(MockNetwork::new());
    let (deployer, sender) = deployer_for(network.clone());

    let mut spec = counter_spec();
    spec.approval = TealProgram::Source("int TMPL_LIMIT".to_string());
    let config = DeployConfig {
        template_values: BTreeMap::from([("LIMIT".to_string(), TemplateValue::Int(500))]),
        ..DeployConfig::default()
    };
    deployer.deploy(&spec, &sender, &config).await.unwrap();

    let bodies = network.submitted_bodies(0);
    match &bodies[0] {
        TransactionBody::AppCreate { approval, .. } => {
            assert_eq!(approval, &compile("int 500"));
        }
        other => panic!("unexpected body: {other:?}"),
    }
}

#[tokio::test]
async fn test_unresolved_template_fails_in_comparing_stage() {
    let network = Arc::new(MockNetwork::new());
    let (deployer, sender) = deployer_for(network.clone());

    let mut spec = counter_spec();
    spec.approval = TealProgram::Source("int TMPL_LIMIT".to_string());
    let err = deployer
        .deploy(&spec, &sender, &DeployConfig::default())
        .await
        .unwrap_err();

    assert_eq!(err.stage, DeployStage::Comparing);
    assert!(matches!(err.source, DeployError::Template { .. }));
    assert_eq!(network.submission_count(), 0);
}

#[tokio::test]
async fn test_missing_signer_fails_before_submission() {
    let network = Arc::new(MockNetwork::new());
    let deployer =
        AppDeployer::with_sleeper(network.clone(), SignerRegistry::new(), Arc::new(NoopSleeper));

    let err = deployer
        .deploy(
            &counter_spec(),
            &Address::new("nobody"),
            &DeployConfig::default(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.stage, DeployStage::Signing);
    assert!(matches!(err.source, DeployError::MissingSigner { .. }));
    assert_eq!(network.submission_count(), 0);
}

#[tokio::test]
async fn test_rejected_submission_is_a_submitting_failure() {
    let network = Arc::new(MockNetwork::rejecting("overspend"));
    let (deployer, sender) = deployer_for(network.clone());

    let err = deployer
        .deploy(&counter_spec(), &sender, &DeployConfig::default())
        .await
        .unwrap_err();

    assert_eq!(err.stage, DeployStage::Submitting);
    match err.source {
        DeployError::Submission { reason } => assert_eq!(reason, "overspend"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_zero_polling_rounds_times_out_without_polling() {
    let network = Arc::new(MockNetwork::never_confirming());
    let (deployer, sender) = deployer_for(network.clone());

    let config = DeployConfig {
        max_confirmation_rounds: 0,
        ..DeployConfig::default()
    };
    let result = deployer
        .deploy(&counter_spec(), &sender, &config)
        .await
        .unwrap();

    match result.status {
        DeployStatus::TimedOut { pending } => assert_eq!(pending.len(), 1),
        other => panic!("unexpected status: {other:?}"),
    }
    // The create never confirmed, so no id is known.
    assert_eq!(result.app_id, None);
    assert_eq!(network.state.lock().unwrap().polls, 0);
}

#[tokio::test]
async fn test_pool_eviction_fails_in_confirming_stage() {
    let network = Arc::new(MockNetwork::with_pool_error("txn dead"));
    let (deployer, sender) = deployer_for(network.clone());

    let err = deployer
        .deploy(&counter_spec(), &sender, &DeployConfig::default())
        .await
        .unwrap_err();

    assert_eq!(err.stage, DeployStage::Confirming);
    assert!(matches!(err.source, DeployError::TransactionExpired { .. }));
}

#[tokio::test]
async fn test_fund_then_create_composes_a_multi_sender_group() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let network = Arc::new(MockNetwork::new());
    let funder = Arc::new(LocalAccount::from_seed([5u8; 32]));
    let creator = Arc::new(LocalAccount::from_seed([6u8; 32]));
    let mut registry = SignerRegistry::new();
    registry.register(funder.address().clone(), funder.clone());
    registry.register(creator.address().clone(), creator.clone());

    let params = network.suggested_params().await.unwrap();
    let compiled = builder::compile_spec(network.as_ref(), &counter_spec(), &BTreeMap::new())
        .await
        .unwrap();

    // The funder seeds the creator's account in the same atomic group as
    // the creation itself.
    let mut txns = vec![builder::build_payment(
        funder.address(),
        creator.address().clone(),
        1_000_000,
        &params,
        10,
    )];
    txns.extend(builder::build_transactions(
        DeploymentAction::Create,
        &compiled,
        creator.address(),
        &params,
        10,
    ));

    let grouped = group::compose(txns).unwrap();
    let gid = grouped.group_id().expect("multi-transaction group id");
    for txn in grouped.transactions() {
        assert_eq!(txn.header.group, Some(gid));
    }

    let signed = signing::sign_group(&grouped, &registry).await.unwrap();
    let txids = network.submit_group(&signed).await.unwrap();
    let waiter = ConfirmationWaiter::with_sleeper(5, Duration::ZERO, Arc::new(NoopSleeper));
    let confirmations = waiter.wait_for(network.as_ref(), &txids).await.unwrap();

    assert_eq!(confirmations.len(), 2);
    assert_eq!(confirmations[1].application_id, Some(AppId(1000)));
    let bodies = network.submitted_bodies(0);
    assert!(matches!(
        bodies[0],
        TransactionBody::Payment {
            amount: 1_000_000,
            ..
        }
    ));
    assert!(matches!(bodies[1], TransactionBody::AppCreate { .. }));
}

#[tokio::test]
async fn test_call_rides_in_update_group_and_decodes_return() {
    let mut logs_payload = RETURN_PREFIX.to_vec();
    logs_payload.extend_from_slice(&12u64.to_be_bytes());
    let network = Arc::new(MockNetwork::with_call_logs(vec![logs_payload]));

    let spec = counter_spec();
    let app_id = network.seed_app("int 2", "int 0", spec.schema);
    let (deployer, sender) = deployer_for(network.clone());

    let config = DeployConfig {
        existing_app_id: Some(app_id),
        call: Some(MethodCall {
            method: AbiMethod::parse("add(uint64)uint64").unwrap(),
            args: vec![AbiValue::Uint(5)],
        }),
        ..DeployConfig::default()
    };
    let result = deployer.deploy(&spec, &sender, &config).await.unwrap();

    assert_eq!(result.return_value, Some(AbiValue::Uint(12)));
    // One group: update plus the call.
    assert_eq!(network.submission_count(), 1);
    let bodies = network.submitted_bodies(0);
    assert_eq!(bodies.len(), 2);
    assert!(matches!(bodies[1], TransactionBody::AppCall { .. }));
}

#[tokio::test]
async fn test_call_after_create_is_a_second_submission() {
    let mut logs_payload = RETURN_PREFIX.to_vec();
    logs_payload.extend_from_slice(&7u64.to_be_bytes());
    let network = Arc::new(MockNetwork::with_call_logs(vec![logs_payload]));
    let (deployer, sender) = deployer_for(network.clone());

    let config = DeployConfig {
        call: Some(MethodCall {
            method: AbiMethod::parse("add(uint64)uint64").unwrap(),
            args: vec![AbiValue::Uint(3)],
        }),
        ..DeployConfig::default()
    };
    let result = deployer
        .deploy(&counter_spec(), &sender, &config)
        .await
        .unwrap();

    assert_eq!(result.status, DeployStatus::Success);
    assert_eq!(result.return_value, Some(AbiValue::Uint(7)));
    // Create first, then the call against the fresh id.
    assert_eq!(network.submission_count(), 2);
    match &network.submitted_bodies(1)[0] {
        TransactionBody::AppCall { app_id, .. } => assert_eq!(*app_id, AppId(1000)),
        other => panic!("unexpected body: {other:?}"),
    }
}

#[tokio::test]
async fn test_call_method_against_deployed_app() {
    let mut logs_payload = RETURN_PREFIX.to_vec();
    logs_payload.extend_from_slice(&42u64.to_be_bytes());
    let network = Arc::new(MockNetwork::with_call_logs(vec![logs_payload]));
    let app_id = network.seed_app("int 1", "int 0", AppSchema::default());
    let (deployer, sender) = deployer_for(network.clone());

    let call = MethodCall {
        method: AbiMethod::parse("add(uint64)uint64").unwrap(),
        args: vec![AbiValue::Uint(40)],
    };
    let result = deployer
        .call_method(app_id, &call, &sender, &DeployConfig::default())
        .await
        .unwrap();

    assert_eq!(result.return_value, Some(AbiValue::Uint(42)));
    assert_eq!(result.confirmation.confirmed_round, 4243);
}

#[tokio::test]
async fn test_malformed_return_value_does_not_fail_deploy() {
    // Prefix present but payload truncated.
    let mut logs_payload = RETURN_PREFIX.to_vec();
    logs_payload.extend_from_slice(&[0, 0, 0]);
    let network = Arc::new(MockNetwork::with_call_logs(vec![logs_payload]));
    let spec = counter_spec();
    let app_id = network.seed_app("int 1", "int 0", spec.schema);
    let (deployer, sender) = deployer_for(network.clone());

    let config = DeployConfig {
        existing_app_id: Some(app_id),
        call: Some(MethodCall {
            method: AbiMethod::parse("add(uint64)uint64").unwrap(),
            args: vec![AbiValue::Uint(1)],
        }),
        ..DeployConfig::default()
    };
    let result = deployer.deploy(&spec, &sender, &config).await.unwrap();

    assert_eq!(result.status, DeployStatus::Success);
    assert_eq!(result.return_value, None);
}
