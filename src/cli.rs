use clap::{Parser, Subcommand};

use crate::types::*;

#[derive(Parser, Debug)]
#[command(
    name = "ksef-sync",
    version,
    about = "Sync KSeF e-invoice headers into per-client reports"
)]
pub struct Cli {
    /// JSON file listing the tenants to sync
    #[arg(long, env = "KSEF_TENANTS_FILE", default_value = "tenants.json")]
    pub tenants_file: String,

    /// JSON file mapping secret names to KSeF tokens; KSEF_TOKEN_<NIP>
    /// environment variables take precedence
    #[arg(long, env = "KSEF_SECRETS_FILE")]
    pub secrets_file: Option<String>,

    /// Directory holding the CSV reports
    #[arg(long, env = "KSEF_REPORT_DIRECTORY", default_value = "reports")]
    pub report_directory: String,

    /// Directory for the state database and lock files
    #[arg(long, env = "KSEF_STATE_DIRECTORY", default_value = "~/.ksef-sync")]
    pub state_directory: String,

    /// KSeF gateway environment
    #[arg(long, value_enum, env = "KSEF_ENVIRONMENT", default_value = "test")]
    pub environment: Environment,

    /// Explicit gateway base URL, overrides --environment
    #[arg(long, env = "KSEF_GATEWAY_URL")]
    pub gateway_url: Option<String>,

    /// Log level (RUST_LOG overrides)
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Records requested per page
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub page_size: u32,

    /// Pause before every page request, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub throttle_ms: u64,

    /// Ceiling on records fetched for one query window
    #[arg(long, default_value_t = 10_000)]
    pub max_results: u64,

    /// Size of each backfill chunk in days
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..))]
    pub chunk_days: u32,

    /// Oldest date a backfill reaches (ISO date, datetime, or interval such as 400d)
    #[arg(long, default_value = "2022-01-01")]
    pub history_start: String,

    /// Days covered by a daily sync window
    #[arg(long, default_value_t = 31)]
    pub lookback_days: u32,

    /// Query as seller (subject1) or buyer (subject2)
    #[arg(long, value_enum, default_value = "subject1")]
    pub subject_type: SubjectType,

    /// Stop a backfill after this many consecutive empty chunks
    #[arg(long)]
    pub empty_chunk_limit: Option<u32>,

    /// Attempts at redeeming the session token
    #[arg(long, default_value_t = 5)]
    pub redeem_max_attempts: u32,

    /// Base delay between redeem attempts in seconds (doubles each retry)
    #[arg(long, default_value_t = 2)]
    pub redeem_delay_secs: u64,

    /// Authentication status polls before giving up
    #[arg(long, default_value_t = 10)]
    pub status_poll_attempts: u32,

    /// Delay between authentication status polls in seconds
    #[arg(long, default_value_t = 2)]
    pub status_poll_delay_secs: u64,

    /// Wait before retrying a first query page rejected with 401/403
    #[arg(long, default_value_t = 5)]
    pub first_page_auth_delay_secs: u64,

    /// Omit per-month summary rows from reports
    #[arg(long)]
    pub no_summary_rows: bool,

    /// Discard backfill checkpoints and walk the full history again
    #[arg(long)]
    pub restart_backfill: bool,

    /// Run continuously, waiting N seconds between sync passes
    #[arg(long)]
    pub watch_with_interval: Option<u64>,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub request_timeout_secs: u64,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch new invoices for every tenant and update their reports (default)
    Sync,

    /// Show checkpoints and the last run of every tenant
    Status,

    /// Forget a tenant's backfill checkpoint
    ResetCheckpoint {
        /// Tenant id as listed in the tenants file
        tenant: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["ksef-sync"]).unwrap();
        assert_eq!(cli.page_size, 100);
        assert_eq!(cli.throttle_ms, 1000);
        assert_eq!(cli.max_results, 10_000);
        assert_eq!(cli.chunk_days, 30);
        assert_eq!(cli.history_start, "2022-01-01");
        assert_eq!(cli.lookback_days, 31);
        assert_eq!(cli.redeem_max_attempts, 5);
        assert_eq!(cli.status_poll_attempts, 10);
        assert_eq!(cli.subject_type, SubjectType::Subject1);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_subcommands() {
        let cli = Cli::try_parse_from(["ksef-sync", "status"]).unwrap();
        assert_eq!(cli.command, Some(Command::Status));

        let cli = Cli::try_parse_from(["ksef-sync", "reset-checkpoint", "acme"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Command::ResetCheckpoint {
                tenant: "acme".into()
            })
        );
    }

    #[test]
    fn test_rejects_zero_page_size() {
        assert!(Cli::try_parse_from(["ksef-sync", "--page-size", "0"]).is_err());
        assert!(Cli::try_parse_from(["ksef-sync", "--chunk-days", "0"]).is_err());
    }

    #[test]
    fn test_environment_values() {
        let cli = Cli::try_parse_from(["ksef-sync", "--environment", "prod"]).unwrap();
        assert_eq!(cli.environment, Environment::Prod);
        assert!(Cli::try_parse_from(["ksef-sync", "--environment", "staging"]).is_err());
    }
}
