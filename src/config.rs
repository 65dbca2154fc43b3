use crate::auth::endpoints::Endpoints;
use crate::auth::AuthConfig;
use crate::ksef::{EmptyStreakPolicy, RetrieverConfig};
use crate::retry::RetryConfig;
use crate::types::Environment;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration resolved from the command line.
pub struct Config {
    pub tenants_file: PathBuf,
    pub secrets_file: Option<PathBuf>,
    pub report_directory: PathBuf,
    pub state_directory: PathBuf,
    pub endpoints: Endpoints,

    pub history_start: DateTime<Utc>,

    pub watch_with_interval: Option<u64>,
    pub request_timeout: Duration,

    pub auth: AuthConfig,
    pub retriever: RetrieverConfig,

    pub chunk_days: u32,
    pub lookback_days: u32,
    pub empty_chunk_limit: Option<u32>,

    pub environment: Environment,

    pub summary_rows: bool,
    pub restart_backfill: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("tenants_file", &self.tenants_file)
            .field("report_directory", &self.report_directory)
            .field("state_directory", &self.state_directory)
            .field("gateway", &self.endpoints.base_url)
            .field("history_start", &self.history_start)
            .field("chunk_days", &self.chunk_days)
            .field("lookback_days", &self.lookback_days)
            .finish_non_exhaustive()
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Config {
    pub fn from_cli(cli: &crate::cli::Cli) -> anyhow::Result<Self> {
        let history_start = parse_date_or_interval(&cli.history_start)?;
        if history_start >= Utc::now() {
            anyhow::bail!(
                "--history-start '{}' lies in the future",
                cli.history_start
            );
        }

        let auth = AuthConfig {
            status_poll_attempts: cli.status_poll_attempts.max(1),
            status_poll_delay: Duration::from_secs(cli.status_poll_delay_secs),
            redeem_retry: RetryConfig {
                max_attempts: cli.redeem_max_attempts.max(1),
                base_delay: Duration::from_secs(cli.redeem_delay_secs),
                ..RetryConfig::default()
            },
        };

        let retriever = RetrieverConfig {
            page_size: cli.page_size,
            throttle: Duration::from_millis(cli.throttle_ms),
            max_results: cli.max_results,
            first_page_auth_delay: Duration::from_secs(cli.first_page_auth_delay_secs),
            subject_type: cli.subject_type,
        };

        Ok(Self {
            tenants_file: expand_tilde(&cli.tenants_file),
            secrets_file: cli.secrets_file.as_deref().map(expand_tilde),
            report_directory: expand_tilde(&cli.report_directory),
            state_directory: expand_tilde(&cli.state_directory),
            endpoints: Endpoints::for_environment(cli.environment, cli.gateway_url.as_deref()),
            history_start,
            watch_with_interval: cli.watch_with_interval,
            request_timeout: Duration::from_secs(cli.request_timeout_secs.max(1)),
            auth,
            retriever,
            chunk_days: cli.chunk_days,
            lookback_days: cli.lookback_days.max(1),
            empty_chunk_limit: cli.empty_chunk_limit,
            environment: cli.environment,
            summary_rows: !cli.no_summary_rows,
            restart_backfill: cli.restart_backfill,
        })
    }

    pub fn state_db_path(&self) -> PathBuf {
        self.state_directory.join("state.db")
    }

    pub fn lock_directory(&self) -> PathBuf {
        self.state_directory.join("locks")
    }

    /// Backfill walks stop early only when a limit was configured.
    pub fn empty_streak_policy(&self) -> EmptyStreakPolicy {
        match self.empty_chunk_limit {
            Some(after) => EmptyStreakPolicy::Abort { after },
            None => EmptyStreakPolicy::Continue,
        }
    }
}

/// Parse a human-friendly date into a UTC timestamp.
///
/// - Relative interval: `"400d"` (400 days before now)
/// - ISO date: `"2022-01-01"` (midnight UTC)
/// - ISO datetime: `"2022-01-01T06:00:00"` (UTC) or a full RFC 3339 value
pub(crate) fn parse_date_or_interval(s: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Some(days_str) = s.strip_suffix('d') {
        if let Ok(days) = days_str.parse::<i64>() {
            return Ok(Utc::now() - chrono::Duration::days(days));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(naive_dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive_dt.and_utc());
        }
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt.and_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    anyhow::bail!(
        "Cannot parse '{}' as a date. Expected ISO date (2022-01-01), \
         datetime (2022-01-01T06:00:00), or interval (400d)",
        s
    )
}
