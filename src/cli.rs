use clap::{Parser, Subcommand};
use request_history::RecordStatus;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "request-history", version, about = "Request lifecycle history administration")]
pub struct Cli {
    /// Settings file path
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: PathBuf,

    /// Override the SQLite database path from settings
    #[arg(long, global = true, env = "REQUEST_HISTORY_DATABASE")]
    pub database: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List history records, newest first
    List {
        /// Only records of this owner key
        #[arg(short, long)]
        owner: Option<String>,

        /// Only records of this model
        #[arg(short, long)]
        model: Option<String>,

        /// pending, success or error
        #[arg(short, long)]
        status: Option<RecordStatus>,

        /// Only records started within the last N hours
        #[arg(short = 'n', long)]
        hours: Option<u32>,

        /// Page size
        #[arg(short, long, default_value = "20")]
        limit: u32,

        /// Records to skip
        #[arg(long, default_value = "0")]
        offset: u32,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show one record in full
    Show {
        request_id: String,
    },

    /// Aggregate statistics for an owner key
    Stats {
        /// Owner key to aggregate
        #[arg(short, long)]
        owner: String,

        /// Only records started within the last N hours
        #[arg(short = 'n', long)]
        hours: Option<u32>,

        /// Print JSON instead of tables
        #[arg(long)]
        json: bool,
    },

    /// Delete one record
    Delete {
        request_id: String,
    },

    /// Bulk delete records
    Clear {
        /// Only records of this owner key
        #[arg(short, long)]
        owner: Option<String>,

        /// Only records older than N days
        #[arg(long)]
        older_than_days: Option<u32>,

        /// Required when neither --owner nor --older-than-days is given
        #[arg(short, long)]
        yes: bool,
    },

    /// Purge records older than the retention age
    Cleanup {
        /// Overrides retention.max_age_days from settings
        #[arg(long)]
        max_age_days: Option<u32>,

        /// Keep running and purge every retention.cleanup_interval_secs
        #[arg(short, long)]
        watch: bool,
    },

    /// Runtime configuration stored in the database
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Show the stored configuration
    Show,

    /// Update one or more fields; invalid values are ignored
    Set {
        #[arg(long)]
        logging_enabled: Option<bool>,

        #[arg(long, allow_negative_numbers = true)]
        max_records_per_key: Option<i64>,

        #[arg(long, allow_negative_numbers = true)]
        max_request_body_size: Option<i64>,

        #[arg(long, allow_negative_numbers = true)]
        max_response_body_size: Option<i64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing_list() {
        let args = vec!["request-history", "list", "--owner", "cr_1", "--status", "error"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.command {
            Commands::List {
                owner,
                status,
                limit,
                ..
            } => {
                assert_eq!(owner.as_deref(), Some("cr_1"));
                assert_eq!(status, Some(RecordStatus::Error));
                assert_eq!(limit, 20);
            }
            _ => panic!("Expected List command"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_status() {
        let args = vec!["request-history", "list", "--status", "done"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_cli_parsing_config_set_negative() {
        let args = vec![
            "request-history",
            "config",
            "set",
            "--max-records-per-key",
            "-5",
            "--logging-enabled",
            "false",
        ];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.command {
            Commands::Config {
                action:
                    ConfigCommands::Set {
                        max_records_per_key,
                        logging_enabled,
                        ..
                    },
            } => {
                assert_eq!(max_records_per_key, Some(-5));
                assert_eq!(logging_enabled, Some(false));
            }
            _ => panic!("Expected Config Set command"),
        }
    }

    #[test]
    fn test_global_database_override() {
        let args = vec!["request-history", "show", "req-1", "--database", "/tmp/h.db"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.database.as_deref(), Some("/tmp/h.db"));
    }
}
