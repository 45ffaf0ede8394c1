use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

mod cli;
mod commands;

use request_history::config::load_settings;
use request_history::{init_tracing, ConfigPatch, HistoryFilter, RequestHistory, SqliteHistoryStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = cli::Cli::parse();

    let mut settings = load_settings(&args.config)?;
    if let Some(database) = args.database.clone() {
        settings.database_path = database;
    }

    init_tracing(&settings.log_level, &settings.log_format);

    let store = SqliteHistoryStore::connect(&settings.database_path, &settings.database)
        .await
        .with_context(|| format!("Failed to open history database {}", settings.database_path))?;

    let history = RequestHistory::new(Arc::new(store.clone())).await;

    // Dispatch to appropriate command handler
    let result = match args.command {
        cli::Commands::List {
            owner,
            model,
            status,
            hours,
            limit,
            offset,
            json,
        } => {
            let filter = HistoryFilter {
                owner_key: owner,
                model,
                status,
                limit: Some(limit),
                offset: Some(offset),
                ..Default::default()
            };
            commands::records::list(&history, filter, hours, json).await
        }
        cli::Commands::Show { request_id } => commands::records::show(&history, &request_id).await,
        cli::Commands::Stats { owner, hours, json } => {
            commands::stats::execute(&history, &owner, hours, json).await
        }
        cli::Commands::Delete { request_id } => commands::records::delete(&history, &request_id).await,
        cli::Commands::Clear {
            owner,
            older_than_days,
            yes,
        } => commands::records::clear(&history, owner, older_than_days, yes).await,
        cli::Commands::Cleanup { max_age_days, watch } => {
            commands::cleanup::execute(&history, &settings, max_age_days, watch).await
        }
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => commands::config::show(&history),
            cli::ConfigCommands::Set {
                logging_enabled,
                max_records_per_key,
                max_request_body_size,
                max_response_body_size,
            } => {
                let patch = ConfigPatch {
                    logging_enabled,
                    max_records_per_key,
                    max_request_body_size,
                    max_response_body_size,
                };
                commands::config::set(&history, patch).await
            }
        },
    };

    store.close().await;
    result
}
