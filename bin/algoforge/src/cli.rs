use algoforge_deploy::{OnSchemaBreak, OnUpdate, TemplateValue};
use clap::Parser;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "algoforge")]
#[command(
    author,
    version,
    about = "Idempotently deploy an application spec to an Algorand-style network"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "ALGOFORGE_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to the application spec file (TOML).
    #[arg(env = "ALGOFORGE_SPEC")]
    pub spec: String,

    /// The node REST endpoint.
    ///
    /// Falls back to the `algod_url` key of the config file.
    #[arg(long, env = "ALGOFORGE_ALGOD_URL")]
    pub algod_url: Option<String>,

    /// API token for the node endpoint.
    #[arg(long, env = "ALGOFORGE_ALGOD_TOKEN")]
    pub algod_token: Option<String>,

    /// Hex-encoded 32-byte signing seed of the deploying account.
    #[arg(long, env = "ALGOFORGE_SIGNER_SEED")]
    pub signer_seed: Option<String>,

    /// Id of a previously deployed application to reconcile against.
    ///
    /// Without it the deployment always creates a fresh application.
    #[arg(long, alias = "app", env = "ALGOFORGE_APP_ID")]
    pub app_id: Option<u64>,

    /// Policy when the deployed schema is incompatible with the spec.
    #[arg(long, env = "ALGOFORGE_ON_SCHEMA_BREAK", default_value_t = OnSchemaBreak::default())]
    pub on_schema_break: OnSchemaBreak,

    /// Policy when only the programs differ from the deployed ones.
    #[arg(long, env = "ALGOFORGE_ON_UPDATE", default_value_t = OnUpdate::default())]
    pub on_update: OnUpdate,

    /// Maximum confirmation polling rounds before giving up.
    #[arg(long, env = "ALGOFORGE_MAX_ROUNDS", default_value_t = 10)]
    pub max_rounds: u64,

    /// Interval between confirmation polls, in milliseconds.
    #[arg(long, env = "ALGOFORGE_POLL_INTERVAL_MS", default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// Template value overrides, e.g. `--template FEE=1000`.
    ///
    /// Integers become int literals, `0x`-prefixed values become byte
    /// literals, anything else becomes a string literal. Overrides values
    /// from the spec file.
    #[arg(long = "template", value_name = "KEY=VALUE")]
    pub templates: Vec<String>,

    /// Path to an `Algoforge.toml` config file.
    #[arg(long, alias = "conf", env = "ALGOFORGE_CONFIG")]
    pub config: Option<String>,
}

/// Parse a `KEY=VALUE` template override.
pub fn parse_template(arg: &str) -> anyhow::Result<(String, TemplateValue)> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("template override `{arg}` is not KEY=VALUE"))?;
    if key.is_empty() {
        anyhow::bail!("template override `{arg}` has an empty key");
    }
    Ok((key.to_string(), parse_template_value(value)?))
}

fn parse_template_value(value: &str) -> anyhow::Result<TemplateValue> {
    if let Ok(int) = value.parse::<u64>() {
        return Ok(TemplateValue::Int(int));
    }
    if let Some(hex_str) = value.strip_prefix("0x") {
        let bytes = hex::decode(hex_str)
            .map_err(|e| anyhow::anyhow!("invalid hex template value `{value}`: {e}"))?;
        return Ok(TemplateValue::Bytes(bytes));
    }
    Ok(TemplateValue::Str(value.to_string()))
}
