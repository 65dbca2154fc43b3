//! ksef-sync pulls invoice headers from KSeF, the Polish National
//! e-Invoice System (API v2), into one month-grouped report per client.
//!
//! Each tenant authenticates with its long-lived KSeF token through the
//! challenge / RSA-OAEP / redeem handshake. Invoice metadata is fetched page
//! by page under a throttle, merged into the tenant's CSV report without
//! touching operator-entered columns, and regrouped by month. Backfill
//! tenants walk their history backward in chunks with a resumable checkpoint.

#![warn(clippy::all)]

mod auth;
mod cli;
mod config;
mod ksef;
mod report;
pub mod retry;
mod secrets;
mod shutdown;
mod state;
mod sync;
mod tenants;
mod types;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Command;
use config::Config;
use state::StateDb;

/// Print checkpoints and the latest run of every tenant.
async fn run_status(config: &Config) -> anyhow::Result<()> {
    let db_path = config.state_db_path();
    if !db_path.exists() {
        println!("No state database found at {}", db_path.display());
        println!("Run a sync first to create the database.");
        return Ok(());
    }

    let db = state::SqliteStateDb::open(&db_path).await?;
    println!("State Database: {}", db.path().display());
    println!();

    let runs = db.latest_runs().await?;
    if runs.is_empty() {
        println!("No sync runs recorded.");
    } else {
        println!("Last runs:");
        for run in &runs {
            let outcome = run
                .outcome
                .map(|o| o.as_str())
                .unwrap_or("in progress");
            println!(
                "  {:<20} {}  {:<11} fetched {:>5}  duplicates {:>5}  written {:>5}",
                run.tenant_id,
                run.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
                outcome,
                run.fetched,
                run.skipped_duplicates,
                run.written
            );
            if let Some(error) = &run.error {
                println!("  {:<20} {}", "", error);
            }
        }
    }

    let checkpoints = db.list_checkpoints().await?;
    if !checkpoints.is_empty() {
        println!();
        println!("Backfill checkpoints:");
        for cp in &checkpoints {
            println!(
                "  {:<20} {}  (updated {})",
                cp.tenant_id,
                state::format_checkpoint(cp.boundary),
                cp.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
    }

    Ok(())
}

/// Forget a tenant's backfill checkpoint so the next run walks from the top.
async fn run_reset_checkpoint(config: &Config, tenant: &str) -> anyhow::Result<()> {
    let db_path = config.state_db_path();
    if !db_path.exists() {
        println!("No state database found at {}", db_path.display());
        return Ok(());
    }

    let db = state::SqliteStateDb::open(&db_path).await?;
    if db.clear_checkpoint(tenant).await? {
        println!("Checkpoint for '{tenant}' deleted.");
    } else {
        println!("No checkpoint stored for '{tenant}'.");
    }
    Ok(())
}

async fn run_sync_loop(config: Config) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.state_directory)?;
    let state_db: Arc<dyn StateDb> =
        Arc::new(state::SqliteStateDb::open(&config.state_db_path()).await?);
    tracing::debug!(path = %config.state_db_path().display(), "State database opened");

    let registry = Arc::new(tenants::JsonTenantRegistry::new(&config.tenants_file));
    let secrets = Arc::new(secrets::EnvSecretStore::load(config.secrets_file.as_deref()).await?);
    let reports = Arc::new(report::CsvReportBackend::new(&config.report_directory));
    let transport = Arc::new(ksef::HttpTransport::new(
        &config.endpoints.base_url,
        config.request_timeout,
    )?);

    tracing::info!(
        environment = config.environment.as_str(),
        gateway = %config.endpoints.base_url,
        tenants_file = %config.tenants_file.display(),
        "Starting ksef-sync"
    );

    let watch_interval = config.watch_with_interval;
    let runner = sync::SyncRunner::new(
        registry,
        secrets,
        reports,
        state_db,
        transport,
        sync::SyncOptions {
            empty_streak: config.empty_streak_policy(),
            lock_directory: config.lock_directory(),
            auth: config.auth,
            retriever: config.retriever,
            chunk_days: config.chunk_days,
            lookback_days: config.lookback_days,
            history_start: config.history_start,
            summary_rows: config.summary_rows,
            restart_backfill: config.restart_backfill,
        },
    );

    let shutdown_token = shutdown::install_signal_handler()?;

    loop {
        if shutdown_token.is_cancelled() {
            tracing::info!("Shutdown requested, exiting...");
            break;
        }

        let report = match runner.run_sync().await {
            Ok(report) => report,
            Err(e) => {
                if let Some(aborted) = e.downcast_ref::<sync::BatchAborted>() {
                    aborted.report.log_summary();
                }
                return Err(e);
            }
        };
        report.log_summary();
        tracing::info!(
            tenants = report.tenants.len(),
            failed = report.failed(),
            written = report.written(),
            "Sync pass complete"
        );

        let Some(interval) = watch_interval else {
            if report.failed() > 0 {
                anyhow::bail!("{} tenant(s) failed to sync", report.failed());
            }
            break;
        };

        tracing::info!("Waiting {} seconds...", interval);
        if !shutdown::wait_for_next_pass(&shutdown_token, std::time::Duration::from_secs(interval))
            .await
        {
            tracing::info!("Shutdown during wait, exiting...");
            break;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    let filter = match cli.log_level {
        types::LogLevel::Debug => "debug",
        types::LogLevel::Info => "info",
        types::LogLevel::Warn => "warn",
        types::LogLevel::Error => "error",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let config = Config::from_cli(&cli)?;
    tracing::debug!(?config, "Resolved configuration");

    match cli.command.unwrap_or(Command::Sync) {
        Command::Status => run_status(&config).await,
        Command::ResetCheckpoint { tenant } => run_reset_checkpoint(&config, &tenant).await,
        Command::Sync => run_sync_loop(config).await,
    }
}
