//! algoforge is a CLI tool to idempotently deploy applications to an
//! Algorand-style network from a declarative spec file.

mod cli;
mod spec;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::Table;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Deserialize;
use url::Url;

use algoforge_deploy::{
    AlgodClient, AppDeployer, AppId, DeployConfig, DeployStatus, DeploymentResult, LocalAccount,
    SignerRegistry,
};
use cli::Cli;

/// The default name for the algoforge configuration file.
const CONFIG_FILENAME: &str = "Algoforge.toml";

/// Connection settings resolvable from the config file or environment.
#[derive(Debug, Default, Deserialize)]
struct Settings {
    algod_url: Option<String>,
    algod_token: Option<String>,
    signer_seed: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    // CLI arguments take precedence over the config file and environment.
    let config_path = cli.config.as_deref().unwrap_or(CONFIG_FILENAME);
    let settings: Settings = Figment::new()
        .merge(Toml::file(config_path))
        .merge(Env::prefixed("ALGOFORGE_"))
        .extract()
        .with_context(|| format!("Failed to load configuration from {config_path}"))?;

    let algod_url = cli
        .algod_url
        .or(settings.algod_url)
        .context("No node endpoint; pass --algod-url or set it in the config file")?;
    let algod_url = Url::parse(&algod_url)
        .with_context(|| format!("Invalid node endpoint URL {algod_url}"))?;
    let algod_token = cli.algod_token.or(settings.algod_token);

    let seed_hex = cli
        .signer_seed
        .or(settings.signer_seed)
        .context("No signing seed; pass --signer-seed or set it in the config file")?;
    let account = account_from_seed(&seed_hex)?;
    let sender = account.address().clone();

    let loaded = spec::load(Path::new(&cli.spec))?;

    let mut template_values = loaded.template_values;
    for arg in &cli.templates {
        let (key, value) = cli::parse_template(arg)?;
        template_values.insert(key, value);
    }

    let config = DeployConfig {
        on_schema_break: cli.on_schema_break,
        on_update: cli.on_update,
        existing_app_id: cli.app_id.map(AppId),
        template_values,
        max_confirmation_rounds: cli.max_rounds,
        poll_interval: Duration::from_millis(cli.poll_interval_ms),
        ..DeployConfig::default()
    };

    tracing::info!(
        app = %loaded.spec.name,
        node = %algod_url,
        sender = %sender,
        "Starting deployment"
    );

    let client = Arc::new(AlgodClient::new(algod_url, algod_token)?);
    let mut signers = SignerRegistry::new();
    signers.register(sender.clone(), Arc::new(account));

    let deployer = AppDeployer::new(client, signers);
    let result = deployer.deploy(&loaded.spec, &sender, &config).await?;

    print_result(&loaded.spec.name, &result);
    Ok(())
}

fn account_from_seed(seed_hex: &str) -> Result<LocalAccount> {
    let bytes = hex::decode(seed_hex).context("Signing seed is not valid hex")?;
    let seed: [u8; 32] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("Signing seed must be exactly 32 bytes"))?;
    Ok(LocalAccount::from_seed(seed))
}

/// Print a deployment summary table.
fn print_result(app_name: &str, result: &DeploymentResult) {
    let mut table = Table::new();
    table.set_header(vec!["field", "value"]);
    table.add_row(vec!["application".to_string(), app_name.to_string()]);
    table.add_row(vec!["action".to_string(), result.action.to_string()]);
    table.add_row(vec![
        "app id".to_string(),
        result
            .app_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    ]);

    match &result.status {
        DeployStatus::Success => {
            table.add_row(vec!["status".to_string(), "success".to_string()]);
            for confirmation in &result.confirmations {
                table.add_row(vec![
                    "confirmed".to_string(),
                    format!("{} (round {})", confirmation.txid, confirmation.confirmed_round),
                ]);
            }
            if let Some(value) = &result.return_value {
                table.add_row(vec!["return value".to_string(), format!("{value:?}")]);
            }
        }
        DeployStatus::TimedOut { pending } => {
            table.add_row(vec!["status".to_string(), "timed out".to_string()]);
            for txid in pending {
                table.add_row(vec!["pending".to_string(), txid.to_string()]);
            }
        }
    }

    println!("{table}");
}
