use anyhow::{bail, Result};
use colored::Colorize;
use request_history::{ConfigPatch, RequestHistory};
use tracing::info;

/// Execute the config show command
///
/// Displays the stored runtime configuration as TOML
pub fn show(history: &RequestHistory) -> Result<()> {
    let config = history.config.current();

    println!("{}", "Request History Configuration:".green().bold());
    println!();
    println!("{}", toml::to_string_pretty(config.as_ref())?);

    Ok(())
}

/// Execute the config set command
///
/// Fields that fail validation are skipped (a warning is logged); the
/// remaining fields are applied and persisted.
pub async fn set(history: &RequestHistory, patch: ConfigPatch) -> Result<()> {
    if patch.is_empty() {
        bail!("Nothing to update, pass at least one field");
    }

    info!(?patch, "Updating request history configuration");

    if !history.config.update(patch).await {
        bail!("Configuration applied in memory but could not be persisted");
    }

    println!("{}", "✓ Configuration updated".green());
    show(history)
}
