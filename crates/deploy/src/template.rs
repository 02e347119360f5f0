//! Deploy-time template substitution for TEAL source programs.
//!
//! Placeholders use the `TMPL_NAME` convention. Substitution happens before
//! compilation; any placeholder still present afterwards is a fatal error
//! rather than being silently compiled into the program.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DeployError;

/// Prefix marking a template placeholder in program source.
pub const TEMPLATE_PREFIX: &str = "TMPL_";

/// A value substituted into a template placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateValue {
    /// Rendered as a decimal literal.
    Int(u64),
    /// Rendered as a quoted string literal.
    Str(String),
    /// Rendered as a `0x`-prefixed hex literal.
    Bytes(Vec<u8>),
}

impl TemplateValue {
    fn render(&self) -> String {
        match self {
            TemplateValue::Int(v) => v.to_string(),
            TemplateValue::Str(s) => format!("\"{s}\""),
            TemplateValue::Bytes(b) => format!("0x{}", hex::encode(b)),
        }
    }
}

/// Substitute the given values into `source`.
///
/// Keys may be supplied with or without the `TMPL_` prefix. Substitution
/// works on whole placeholder tokens, so a supplied `TMPL_FEE` never
/// clobbers part of an unsupplied `TMPL_FEE_CAP`; the longer token stays
/// intact for [`check_resolved`] to catch. Substituting into a source with
/// no matching placeholders is a no-op, which makes substitution idempotent.
pub fn substitute(source: &str, values: &BTreeMap<String, TemplateValue>) -> String {
    let qualified: BTreeMap<String, &TemplateValue> = values
        .iter()
        .map(|(name, value)| (qualify(name), value))
        .collect();

    let mut rendered = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find(TEMPLATE_PREFIX) {
        rendered.push_str(&rest[..start]);
        let token = token_at(&rest[start..]);
        match qualified.get(token) {
            Some(value) => rendered.push_str(&value.render()),
            None => rendered.push_str(token),
        }
        rest = &rest[start + token.len()..];
    }
    rendered.push_str(rest);
    rendered
}

/// Fail if any `TMPL_*` placeholder is still present in `source`.
///
/// `program` names the program for the error message ("approval"/"clear").
pub fn check_resolved(source: &str, program: &'static str) -> Result<(), DeployError> {
    if let Some(variable) = first_placeholder(source) {
        return Err(DeployError::Template { program, variable });
    }
    Ok(())
}

/// Substitute values and verify nothing was left unresolved.
pub fn render(
    source: &str,
    values: &BTreeMap<String, TemplateValue>,
    program: &'static str,
) -> Result<String, DeployError> {
    let rendered = substitute(source, values);
    check_resolved(&rendered, program)?;
    Ok(rendered)
}

/// Normalize a template key to its full `TMPL_NAME` form.
fn qualify(name: &str) -> String {
    if name.starts_with(TEMPLATE_PREFIX) {
        name.to_string()
    } else {
        format!("{TEMPLATE_PREFIX}{name}")
    }
}

/// Find the first remaining placeholder token, if any.
fn first_placeholder(source: &str) -> Option<String> {
    let start = source.find(TEMPLATE_PREFIX)?;
    Some(token_at(&source[start..]).to_string())
}

/// The full placeholder token at the start of `source`, which must begin
/// with the template prefix.
fn token_at(source: &str) -> &str {
    let len = source
        .find(|c: char| !c.is_ascii_uppercase() && !c.is_ascii_digit() && c != '_')
        .unwrap_or(source.len());
    &source[..len]
}
