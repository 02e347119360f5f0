//! State comparison: desired spec against observed on-chain application.
//!
//! Comparison is purely by content hash of the compiled programs and by
//! schema equality, never by version strings, so metadata-only edits cannot
//! produce false differences.

use serde::{Deserialize, Serialize};

use crate::app::{AppId, AppSchema, CompiledSpec, OnChainApplication};
use crate::error::DeployError;

/// Policy when the desired schema is incompatible with the deployed one.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum OnSchemaBreak {
    /// Delete the deployed application and recreate it.
    #[default]
    Replace,
    /// Surface an error instead of touching the deployed application.
    Fail,
}

/// Policy when only the programs differ from the deployed ones.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum OnUpdate {
    /// Update the programs in place.
    #[default]
    Update,
    /// Delete and recreate instead of updating.
    Replace,
    /// Surface an error instead of touching the deployed application.
    Fail,
}

/// The action required to make on-chain state match the desired spec.
///
/// Computed once per deployment attempt, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum DeploymentAction {
    /// No deployed application exists; create one.
    Create,
    /// Programs differ; update them in place.
    Update { app_id: AppId },
    /// Schema or policy requires delete-then-create.
    Replace { app_id: AppId },
    /// Deployed state already matches the spec exactly.
    NoOp { app_id: AppId },
}

/// Compute the required deployment action.
///
/// Schema-break detection takes precedence over update-only detection: a
/// simultaneous schema and program change is treated as a schema break.
pub fn required_action(
    desired: &CompiledSpec,
    existing: Option<&OnChainApplication>,
    on_schema_break: OnSchemaBreak,
    on_update: OnUpdate,
) -> Result<DeploymentAction, DeployError> {
    let Some(existing) = existing else {
        return Ok(DeploymentAction::Create);
    };
    let app_id = existing.app_id;

    if !schema_compatible(&desired.schema, &existing.schema) {
        return match on_schema_break {
            OnSchemaBreak::Replace => {
                tracing::warn!(
                    %app_id,
                    "Schema has changed; deployed application will be replaced"
                );
                Ok(DeploymentAction::Replace { app_id })
            }
            OnSchemaBreak::Fail => Err(DeployError::SchemaBreak { app_id }),
        };
    }

    let programs_match = desired.approval_hash() == existing.approval_hash
        && desired.clear_hash() == existing.clear_hash;
    if programs_match {
        return Ok(DeploymentAction::NoOp { app_id });
    }

    match on_update {
        OnUpdate::Update => Ok(DeploymentAction::Update { app_id }),
        OnUpdate::Replace => Ok(DeploymentAction::Replace { app_id }),
        OnUpdate::Fail => Err(DeployError::UpdateBlocked { app_id }),
    }
}

/// Whether a deployed application's schema can hold the desired one.
///
/// Slot counts are compared exactly; the network does not allow any in-place
/// schema change, growing or shrinking.
fn schema_compatible(desired: &AppSchema, existing: &AppSchema) -> bool {
    desired == existing
}
