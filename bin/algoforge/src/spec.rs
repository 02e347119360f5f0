//! Loading application specs from TOML files.
//!
//! A spec file names the two programs (paths are resolved relative to the
//! spec file), declares the storage schema and the ABI surface, and may
//! carry default template values:
//!
//! ```toml
//! name = "counter"
//! approval = "approval.teal"
//! clear = "clear.teal"
//! methods = ["add(uint64)uint64"]
//!
//! [schema.global]
//! uints = 1
//!
//! [template-values]
//! LIMIT = 500
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use algoforge_deploy::{
    AbiMethod, AppSchema, ApplicationSpec, StateSchema, TealProgram, TemplateValue,
};
use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct SpecFile {
    name: String,
    /// Path to the approval program, relative to the spec file.
    approval: String,
    /// Path to the clear-state program, relative to the spec file.
    clear: String,
    #[serde(default)]
    extra_pages: u32,
    #[serde(default)]
    methods: Vec<String>,
    note: Option<String>,
    #[serde(default)]
    schema: SchemaFile,
    #[serde(default)]
    template_values: toml::Table,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaFile {
    #[serde(default)]
    global: SlotsFile,
    #[serde(default)]
    local: SlotsFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct SlotsFile {
    #[serde(default)]
    uints: u64,
    #[serde(default)]
    byte_slices: u64,
}

/// A parsed spec file: the application spec plus its default template
/// values.
pub struct LoadedSpec {
    pub spec: ApplicationSpec,
    pub template_values: BTreeMap<String, TemplateValue>,
}

/// Load and validate a spec file.
pub fn load(path: &Path) -> Result<LoadedSpec> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read spec file {}", path.display()))?;
    let file: SpecFile = toml::from_str(&raw)
        .with_context(|| format!("Failed to parse spec file {}", path.display()))?;

    let base = path.parent().unwrap_or(Path::new("."));
    let approval = load_program(&base.join(&file.approval))?;
    let clear = load_program(&base.join(&file.clear))?;

    let methods = file
        .methods
        .iter()
        .map(|signature| {
            AbiMethod::parse(signature)
                .with_context(|| format!("Invalid method signature `{signature}`"))
        })
        .collect::<Result<Vec<_>>>()?;

    let template_values = file
        .template_values
        .iter()
        .map(|(key, value)| Ok((key.clone(), convert_template_value(key, value)?)))
        .collect::<Result<BTreeMap<_, _>>>()?;

    Ok(LoadedSpec {
        spec: ApplicationSpec {
            name: file.name,
            approval,
            clear,
            schema: AppSchema {
                global: StateSchema::new(file.schema.global.uints, file.schema.global.byte_slices),
                local: StateSchema::new(file.schema.local.uints, file.schema.local.byte_slices),
            },
            extra_pages: file.extra_pages,
            methods,
            note: file.note.map(String::into_bytes),
        },
        template_values,
    })
}

/// Read a program file: `.teal` files are source to be compiled, anything
/// else is taken as precompiled bytecode.
fn load_program(path: &Path) -> Result<TealProgram> {
    let is_source = path.extension().is_some_and(|ext| ext == "teal");
    if is_source {
        let source = fs::read_to_string(path)
            .with_context(|| format!("Failed to read program source {}", path.display()))?;
        Ok(TealProgram::Source(source))
    } else {
        let bytecode = fs::read(path)
            .with_context(|| format!("Failed to read program bytecode {}", path.display()))?;
        Ok(TealProgram::Compiled(bytecode))
    }
}

fn convert_template_value(key: &str, value: &toml::Value) -> Result<TemplateValue> {
    match value {
        toml::Value::Integer(int) => {
            let int = u64::try_from(*int)
                .with_context(|| format!("Template value `{key}` must be non-negative"))?;
            Ok(TemplateValue::Int(int))
        }
        toml::Value::String(s) => match s.strip_prefix("0x") {
            Some(hex_str) => {
                let bytes = hex::decode(hex_str)
                    .with_context(|| format!("Template value `{key}` is not valid hex"))?;
                Ok(TemplateValue::Bytes(bytes))
            }
            None => Ok(TemplateValue::Str(s.clone())),
        },
        other => anyhow::bail!(
            "Template value `{key}` has unsupported type {}",
            other.type_str()
        ),
    }
}
