//! Building unsigned transactions from a computed deployment action.
//!
//! The builder is pure: it takes a compiled spec, suggested parameters and
//! the action the comparator chose, and emits the ordered transactions the
//! composer will group. Rendering and compilation happen up front in
//! [`compile_spec`] so every later stage works with bytecode.

use std::collections::BTreeMap;

use crate::abi::{AbiMethod, AbiValue};
use crate::app::{Address, AppId, ApplicationSpec, CompiledSpec, TealProgram};
use crate::compare::DeploymentAction;
use crate::error::DeployError;
use crate::network::{NetworkClient, SuggestedParams};
use crate::template::{self, TemplateValue};
use crate::transaction::{TransactionBody, TransactionHeader, UnsignedTransaction};

/// An ABI method invocation with its typed arguments.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: AbiMethod,
    pub args: Vec<AbiValue>,
}

/// Render templates and compile both programs of a spec.
///
/// Source programs go through template substitution and node compilation;
/// precompiled programs pass through untouched. Any unresolved `TMPL_*`
/// placeholder fails here, before the network sees the program.
pub async fn compile_spec(
    client: &dyn NetworkClient,
    spec: &ApplicationSpec,
    template_values: &BTreeMap<String, TemplateValue>,
) -> Result<CompiledSpec, DeployError> {
    let approval = compile_program(client, &spec.approval, template_values, "approval").await?;
    let clear = compile_program(client, &spec.clear, template_values, "clear").await?;
    Ok(CompiledSpec {
        approval,
        clear,
        schema: spec.schema,
        extra_pages: spec.extra_pages,
        note: spec.note.clone(),
    })
}

async fn compile_program(
    client: &dyn NetworkClient,
    program: &TealProgram,
    template_values: &BTreeMap<String, TemplateValue>,
    name: &'static str,
) -> Result<Vec<u8>, DeployError> {
    match program {
        TealProgram::Source(source) => {
            let rendered = template::render(source, template_values, name)?;
            Ok(client.compile_program(&rendered).await?)
        }
        TealProgram::Compiled(bytecode) => Ok(bytecode.clone()),
    }
}

/// Build the ordered deployment transactions for an action.
///
/// `Replace` emits delete-then-create; the pair must stay in this order when
/// grouped. `NoOp` emits nothing. A method call against an app whose id is
/// only known after creation is built separately once the id exists.
pub fn build_transactions(
    action: DeploymentAction,
    spec: &CompiledSpec,
    sender: &Address,
    params: &SuggestedParams,
    validity_window: u64,
) -> Vec<UnsignedTransaction> {
    let header = || header(sender, params, validity_window, spec.note.clone());

    match action {
        DeploymentAction::Create => vec![create_txn(spec, header())],
        DeploymentAction::Update { app_id } => vec![UnsignedTransaction {
            header: header(),
            body: TransactionBody::AppUpdate {
                app_id,
                approval: spec.approval.clone(),
                clear: spec.clear.clone(),
            },
        }],
        DeploymentAction::Replace { app_id } => vec![
            UnsignedTransaction {
                header: header(),
                body: TransactionBody::AppDelete { app_id },
            },
            create_txn(spec, header()),
        ],
        DeploymentAction::NoOp { .. } => Vec::new(),
    }
}

/// Build an ABI method call transaction.
pub fn build_method_call(
    app_id: AppId,
    call: &MethodCall,
    sender: &Address,
    params: &SuggestedParams,
    validity_window: u64,
) -> Result<UnsignedTransaction, DeployError> {
    let app_args = call.method.encode_call(&call.args)?;
    Ok(UnsignedTransaction {
        header: header(sender, params, validity_window, None),
        body: TransactionBody::AppCall { app_id, app_args },
    })
}

/// Build a plain payment transaction.
pub fn build_payment(
    sender: &Address,
    receiver: Address,
    amount: u64,
    params: &SuggestedParams,
    validity_window: u64,
) -> UnsignedTransaction {
    UnsignedTransaction {
        header: header(sender, params, validity_window, None),
        body: TransactionBody::Payment { receiver, amount },
    }
}

fn create_txn(spec: &CompiledSpec, header: TransactionHeader) -> UnsignedTransaction {
    UnsignedTransaction {
        header,
        body: TransactionBody::AppCreate {
            approval: spec.approval.clone(),
            clear: spec.clear.clone(),
            schema: spec.schema,
            extra_pages: spec.extra_pages,
        },
    }
}

fn header(
    sender: &Address,
    params: &SuggestedParams,
    validity_window: u64,
    note: Option<Vec<u8>>,
) -> TransactionHeader {
    TransactionHeader {
        sender: sender.clone(),
        // The suggested fee can be below the enforced minimum on quiet
        // networks.
        fee: params.fee.max(params.min_fee),
        first_valid: params.last_round,
        last_valid: params.last_round + validity_window,
        genesis_id: params.genesis_id.clone(),
        genesis_hash: params.genesis_hash.clone(),
        note,
        group: None,
    }
}
