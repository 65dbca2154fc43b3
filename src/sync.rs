//! Client loop: one pass over every tenant.
//!
//! Tenants run one after another. A tenant-scoped failure is logged and
//! recorded, then the loop moves on. A batch-fatal gateway error (rate limit,
//! credential revocation risk) stops the pass before any other tenant is
//! contacted and is returned to the caller as [`BatchAborted`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use thiserror::Error;
use tracing::Instrument;

use crate::auth::{AuthConfig, Authenticator};
use crate::ksef::{
    EmptyStreakPolicy, GatewayTransport, KsefError, RawRecord, Retriever, RetrieverConfig,
};
use crate::report::{merge, MergeOptions, ReportBackend};
use crate::secrets::SecretStore;
use crate::state::{
    CheckpointStore, RunOutcome, StateDb, SyncRunStats, TenantCheckpoint, TenantLock,
};
use crate::tenants::{Tenant, TenantRegistry};
use crate::types::ExecutionMode;

pub struct SyncOptions {
    pub auth: AuthConfig,
    pub retriever: RetrieverConfig,
    pub chunk_days: u32,
    pub lookback_days: u32,
    pub history_start: DateTime<Utc>,
    pub empty_streak: EmptyStreakPolicy,
    pub summary_rows: bool,
    /// Clear backfill checkpoints on the first pass only.
    pub restart_backfill: bool,
    pub lock_directory: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantOutcome {
    Synced,
    Skipped { reason: String },
    Failed { error: String },
    /// This tenant hit a batch-fatal error.
    Aborted { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantSummary {
    pub tenant_id: String,
    pub display_name: String,
    pub fetched: u64,
    pub skipped_duplicates: u64,
    pub written: u64,
    pub outcome: TenantOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub tenants: Vec<TenantSummary>,
}

impl SyncReport {
    pub fn failed(&self) -> usize {
        self.tenants
            .iter()
            .filter(|t| matches!(t.outcome, TenantOutcome::Failed { .. }))
            .count()
    }

    pub fn written(&self) -> u64 {
        self.tenants.iter().map(|t| t.written).sum()
    }

    pub fn log_summary(&self) {
        for t in &self.tenants {
            match &t.outcome {
                TenantOutcome::Synced => tracing::info!(
                    tenant = %t.tenant_id,
                    fetched = t.fetched,
                    duplicates = t.skipped_duplicates,
                    written = t.written,
                    "Tenant synced"
                ),
                TenantOutcome::Skipped { reason } => {
                    tracing::info!(tenant = %t.tenant_id, %reason, "Tenant skipped")
                }
                TenantOutcome::Failed { error } | TenantOutcome::Aborted { error } => {
                    tracing::warn!(tenant = %t.tenant_id, %error, "Tenant failed")
                }
            }
        }
    }
}

/// A batch-fatal error stopped the pass. Carries what was done before it.
#[derive(Debug, Error)]
#[error("Sync aborted at tenant '{tenant_id}': {source}")]
pub struct BatchAborted {
    pub tenant_id: String,
    pub report: SyncReport,
    pub source: KsefError,
}

#[derive(Default)]
struct TenantStats {
    fetched: u64,
    skipped_duplicates: u64,
    written: u64,
    /// The backward walk failed after its completed chunks were written.
    interrupted: Option<anyhow::Error>,
}

pub struct SyncRunner {
    registry: Arc<dyn TenantRegistry>,
    secrets: Arc<dyn SecretStore>,
    reports: Arc<dyn ReportBackend>,
    state: Arc<dyn StateDb>,
    transport: Arc<dyn GatewayTransport>,
    options: SyncOptions,
    restart_pending: AtomicBool,
}

impl SyncRunner {
    pub fn new(
        registry: Arc<dyn TenantRegistry>,
        secrets: Arc<dyn SecretStore>,
        reports: Arc<dyn ReportBackend>,
        state: Arc<dyn StateDb>,
        transport: Arc<dyn GatewayTransport>,
        options: SyncOptions,
    ) -> Self {
        Self {
            registry,
            secrets,
            reports,
            state,
            transport,
            restart_pending: AtomicBool::new(options.restart_backfill),
            options,
        }
    }

    /// Sync every registered tenant once.
    pub async fn run_sync(&self) -> anyhow::Result<SyncReport> {
        let tenants = self.registry.list_tenants().await?;
        tracing::info!(count = tenants.len(), "Starting sync pass");
        let restart_backfill = self.restart_pending.swap(false, Ordering::SeqCst);
        if restart_backfill {
            tracing::info!("Backfill checkpoints will be cleared for this pass");
        }

        let mut report = SyncReport::default();
        for tenant in &tenants {
            let span = tracing::info_span!("tenant", tenant = %tenant.id);
            let (summary, fatal) = self
                .process_tenant(tenant, restart_backfill)
                .instrument(span)
                .await;
            report.tenants.push(summary);

            if let Some(source) = fatal {
                return Err(BatchAborted {
                    tenant_id: tenant.id.clone(),
                    report,
                    source,
                }
                .into());
            }
        }

        Ok(report)
    }

    /// Returns the tenant's summary plus the error that must stop the pass, if any.
    async fn process_tenant(
        &self,
        tenant: &Tenant,
        restart_backfill: bool,
    ) -> (TenantSummary, Option<KsefError>) {
        let _lock = match TenantLock::try_acquire(&self.options.lock_directory, &tenant.id).await {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                tracing::warn!("Another run holds this tenant's lock; skipping");
                return (skipped(tenant, "locked by another run".into()), None);
            }
            Err(e) => {
                tracing::error!(error = %e, "Cannot take tenant lock");
                let summary = empty_summary(tenant, TenantOutcome::Failed { error: e.to_string() });
                let run_id = self.start_run(tenant).await;
                self.finish_run(run_id, &summary).await;
                return (summary, None);
            }
        };
        let run_id = self.start_run(tenant).await;

        let secret_name = tenant.secret_name();
        let Some(token) = self.secrets.get_secret(&secret_name).await else {
            tracing::warn!(secret = %secret_name, "No KSeF token configured; skipping");
            let summary = skipped(tenant, format!("missing secret {secret_name}"));
            self.finish_run(run_id, &summary).await;
            return (summary, None);
        };

        let (stats, failure) = match self.sync_tenant(tenant, &token, restart_backfill).await {
            Ok(mut stats) => {
                let failure = stats.interrupted.take();
                (stats, failure)
            }
            Err(e) => (TenantStats::default(), Some(e)),
        };

        let (outcome, fatal) = match failure {
            None => (TenantOutcome::Synced, None),
            Some(e) => {
                let error = format!("{e:#}");
                match e.downcast::<KsefError>() {
                    Ok(ksef) if ksef.is_batch_fatal() => {
                        tracing::error!(%error, "Batch-fatal gateway error; stopping all tenants");
                        (TenantOutcome::Aborted { error }, Some(ksef))
                    }
                    _ => {
                        tracing::error!(%error, "Tenant sync failed; continuing with next tenant");
                        (TenantOutcome::Failed { error }, None)
                    }
                }
            }
        };
        let summary = TenantSummary {
            tenant_id: tenant.id.clone(),
            display_name: tenant.display_name.clone(),
            fetched: stats.fetched,
            skipped_duplicates: stats.skipped_duplicates,
            written: stats.written,
            outcome,
        };

        self.finish_run(run_id, &summary).await;
        (summary, fatal)
    }

    async fn sync_tenant(
        &self,
        tenant: &Tenant,
        token: &str,
        restart_backfill: bool,
    ) -> anyhow::Result<TenantStats> {
        let transport = self.transport.as_ref();
        let mut authenticator = Authenticator::new(transport, self.options.auth.clone());
        let session = authenticator
            .authenticate(&tenant.tax_identifier, token)
            .await?;

        let report = self.reports.open_or_create(&tenant.report_target).await?;
        let existing = report.read_all().await?;

        let retriever = Retriever::new(transport, self.options.retriever.clone());
        let now = Utc::now();
        let (records, interrupted): (Vec<RawRecord>, _) = match tenant.execution_mode {
            ExecutionMode::Daily => {
                let from = now - chrono::Duration::days(i64::from(self.options.lookback_days));
                let records = retriever
                    .fetch(&session, from, now, self.options.retriever.page_size)
                    .await?;
                (records, None)
            }
            ExecutionMode::Backfill => {
                let checkpoint = TenantCheckpoint::new(self.state.clone(), tenant.id.clone());
                if restart_backfill {
                    checkpoint.clear().await?;
                }
                let walk = retriever
                    .fetch_chunked(
                        &session,
                        self.options.history_start,
                        now,
                        self.options.chunk_days,
                        &checkpoint,
                        &self.options.empty_streak,
                    )
                    .await?;
                tracing::info!(
                    chunks = walk.chunks,
                    resumed = walk.resumed_from.is_some(),
                    halted_early = walk.halted_early,
                    failed = walk.error.is_some(),
                    "Backward walk finished"
                );
                (walk.records, walk.error)
            }
        };

        let outcome = merge(
            &existing,
            &records,
            &MergeOptions {
                today: Local::now().date_naive(),
                summary_rows: self.options.summary_rows,
                now_millis: now.timestamp_millis(),
            },
        );
        // Rewritten even with nothing new so the layout reflects the current month.
        report.write_all(&outcome.layout).await?;
        if interrupted.is_some() {
            tracing::warn!(
                written = outcome.accepted,
                "Kept the records of completed chunks before the walk failed"
            );
        }

        Ok(TenantStats {
            fetched: records.len() as u64,
            skipped_duplicates: outcome.skipped_duplicates as u64,
            written: outcome.accepted as u64,
            interrupted,
        })
    }

    /// Run history is best effort; a state database hiccup never fails a tenant.
    async fn start_run(&self, tenant: &Tenant) -> Option<i64> {
        match self.state.start_sync_run(&tenant.id).await {
            Ok(run_id) => Some(run_id),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to record sync run start");
                None
            }
        }
    }

    async fn finish_run(&self, run_id: Option<i64>, summary: &TenantSummary) {
        let Some(run_id) = run_id else {
            return;
        };
        let (outcome, error) = match &summary.outcome {
            TenantOutcome::Synced => (RunOutcome::Success, None),
            TenantOutcome::Skipped { reason } => (RunOutcome::Skipped, Some(reason.clone())),
            TenantOutcome::Failed { error } => (RunOutcome::Failed, Some(error.clone())),
            TenantOutcome::Aborted { error } => (RunOutcome::Aborted, Some(error.clone())),
        };
        let stats = SyncRunStats {
            fetched: summary.fetched,
            skipped_duplicates: summary.skipped_duplicates,
            written: summary.written,
            outcome,
            error,
        };
        if let Err(e) = self.state.complete_sync_run(run_id, &stats).await {
            tracing::warn!(run_id, error = %e, "Failed to record sync run result");
        }
    }
}

fn skipped(tenant: &Tenant, reason: String) -> TenantSummary {
    empty_summary(tenant, TenantOutcome::Skipped { reason })
}

fn empty_summary(tenant: &Tenant, outcome: TenantOutcome) -> TenantSummary {
    TenantSummary {
        tenant_id: tenant.id.clone(),
        display_name: tenant.display_name.clone(),
        fetched: 0,
        skipped_duplicates: 0,
        written: 0,
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::auth::endpoints;
    use crate::auth::tests::{handshake, instant_config};
    use crate::ksef::transport::mock::{respond, ScriptedTransport};
    use crate::report::CsvReportBackend;
    use crate::secrets::tests::MapSecretStore;
    use crate::state::SqliteStateDb;
    use crate::tenants::tests::{tenant, StaticRegistry};

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("ksef-sync-tests")
            .join("sync")
            .join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn options(dir: &std::path::Path) -> SyncOptions {
        SyncOptions {
            auth: instant_config(),
            retriever: RetrieverConfig {
                page_size: 10,
                throttle: Duration::ZERO,
                first_page_auth_delay: Duration::ZERO,
                ..RetrieverConfig::default()
            },
            chunk_days: 30,
            lookback_days: 31,
            history_start: Utc::now() - chrono::Duration::days(75),
            empty_streak: EmptyStreakPolicy::Continue,
            summary_rows: true,
            restart_backfill: false,
            lock_directory: dir.join("locks"),
        }
    }

    struct Harness {
        runner: SyncRunner,
        transport: Arc<ScriptedTransport>,
        state: Arc<SqliteStateDb>,
        dir: PathBuf,
    }

    fn harness(
        name: &str,
        tenants: Vec<Tenant>,
        secrets: &[(&str, &str)],
        transport: ScriptedTransport,
        tweak: impl FnOnce(&mut SyncOptions),
    ) -> Harness {
        let state = Arc::new(SqliteStateDb::open_in_memory().unwrap());
        harness_with_state(name, tenants, secrets, transport, state, tweak)
    }

    fn harness_with_state(
        name: &str,
        tenants: Vec<Tenant>,
        secrets: &[(&str, &str)],
        transport: ScriptedTransport,
        state: Arc<SqliteStateDb>,
        tweak: impl FnOnce(&mut SyncOptions),
    ) -> Harness {
        let dir = test_dir(name);
        let transport = Arc::new(transport);
        let mut opts = options(&dir);
        tweak(&mut opts);
        let runner = SyncRunner::new(
            Arc::new(StaticRegistry(tenants)),
            Arc::new(MapSecretStore::with(secrets)),
            Arc::new(CsvReportBackend::new(dir.join("reports"))),
            state.clone(),
            transport.clone(),
            opts,
        );
        Harness {
            runner,
            transport,
            state,
            dir,
        }
    }

    fn invoice(id: &str) -> serde_json::Value {
        json!({
            "ksefNumber": id,
            "invoiceNumber": format!("FV/{id}"),
            "invoicingDate": Utc::now().format("%Y-%m-%d").to_string(),
            "seller": {"name": "ACME", "nip": "111"},
            "netAmount": 100.0,
            "grossAmount": 123.0
        })
    }

    /// Handshake, redeem, then a single page of `invoices` for every query.
    fn gateway(invoices: Vec<serde_json::Value>) -> ScriptedTransport {
        ScriptedTransport::new(move |req, _| {
            handshake(req).unwrap_or_else(|| match req.route() {
                endpoints::REDEEM_TOKEN => {
                    respond(200, json!({"accessToken": {"token": "access-tok"}}))
                }
                endpoints::QUERY_METADATA => respond(200, json!({"invoices": invoices})),
                other => panic!("unexpected route {other}"),
            })
        })
    }

    #[tokio::test]
    async fn test_daily_sync_writes_report_and_records_run() {
        let h = harness(
            "daily",
            vec![tenant("acme", "1111111111", ExecutionMode::Daily)],
            &[("ksef-token-1111111111", "tok")],
            gateway(vec![invoice("K-1"), invoice("K-2")]),
            |_| {},
        );

        let report = h.runner.run_sync().await.unwrap();
        assert_eq!(report.tenants.len(), 1);
        let acme = &report.tenants[0];
        assert_eq!(acme.outcome, TenantOutcome::Synced);
        assert_eq!((acme.fetched, acme.skipped_duplicates, acme.written), (2, 0, 2));
        assert!(h.dir.join("reports").join("KSeF acme.csv").exists());

        let query = h
            .transport
            .requests()
            .into_iter()
            .find(|r| r.route() == endpoints::QUERY_METADATA)
            .unwrap();
        assert_eq!(query.bearer.as_deref(), Some("access-tok"));

        let runs = h.state.latest_runs().await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].outcome, Some(RunOutcome::Success));
        assert_eq!(runs[0].written, 2);

        // Second pass sees everything as a duplicate.
        let again = h.runner.run_sync().await.unwrap();
        assert_eq!(again.tenants[0].written, 0);
        assert_eq!(again.tenants[0].skipped_duplicates, 2);
    }

    #[tokio::test]
    async fn test_missing_secret_skips_tenant() {
        let h = harness(
            "missing_secret",
            vec![
                tenant("nosecret", "9999999999", ExecutionMode::Daily),
                tenant("acme", "1111111111", ExecutionMode::Daily),
            ],
            &[("ksef-token-1111111111", "tok")],
            gateway(vec![invoice("K-1")]),
            |_| {},
        );

        let report = h.runner.run_sync().await.unwrap();
        assert!(matches!(
            report.tenants[0].outcome,
            TenantOutcome::Skipped { .. }
        ));
        assert_eq!(report.tenants[1].outcome, TenantOutcome::Synced);
        assert_eq!(h.transport.calls_to(endpoints::CHALLENGE), 1);
    }

    #[tokio::test]
    async fn test_tenant_failure_does_not_stop_batch() {
        // First tenant's challenge fails with 500, second goes through.
        let transport = ScriptedTransport::new(|req, prior| {
            if req.route() == endpoints::CHALLENGE && prior == 0 {
                return respond(500, json!({"error": "boom"}));
            }
            handshake(req).unwrap_or_else(|| match req.route() {
                endpoints::REDEEM_TOKEN => {
                    respond(200, json!({"accessToken": {"token": "access-tok"}}))
                }
                endpoints::QUERY_METADATA => respond(200, json!({"invoices": []})),
                other => panic!("unexpected route {other}"),
            })
        });
        let h = harness(
            "isolation",
            vec![
                tenant("broken", "1111111111", ExecutionMode::Daily),
                tenant("fine", "2222222222", ExecutionMode::Daily),
            ],
            &[("ksef-token-1111111111", "a"), ("ksef-token-2222222222", "b")],
            transport,
            |_| {},
        );

        let report = h.runner.run_sync().await.unwrap();
        assert!(matches!(report.tenants[0].outcome, TenantOutcome::Failed { .. }));
        assert_eq!(report.tenants[1].outcome, TenantOutcome::Synced);
        assert_eq!(report.failed(), 1);

        let runs = h.state.latest_runs().await.unwrap();
        let broken = runs.iter().find(|r| r.tenant_id == "broken").unwrap();
        assert_eq!(broken.outcome, Some(RunOutcome::Failed));
        assert!(broken.error.as_deref().unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_forbidden_aborts_before_next_tenant() {
        let transport = ScriptedTransport::new(|req, _| {
            handshake(req).unwrap_or_else(|| match req.route() {
                endpoints::REDEEM_TOKEN => respond(403, json!({"error": "forbidden"})),
                other => panic!("unexpected route {other}"),
            })
        });
        let h = harness(
            "fatal",
            vec![
                tenant("a", "1111111111", ExecutionMode::Daily),
                tenant("b", "2222222222", ExecutionMode::Daily),
            ],
            &[("ksef-token-1111111111", "a"), ("ksef-token-2222222222", "b")],
            transport,
            |_| {},
        );

        let err = h.runner.run_sync().await.unwrap_err();
        let aborted = err.downcast_ref::<BatchAborted>().unwrap();
        assert_eq!(aborted.tenant_id, "a");
        assert!(matches!(
            aborted.source,
            KsefError::CredentialRevocationRisk { status: 403, .. }
        ));
        assert_eq!(aborted.report.tenants.len(), 1);

        // Nothing was sent on behalf of tenant b.
        let challenges: Vec<_> = h
            .transport
            .requests()
            .into_iter()
            .filter(|r| r.route() == endpoints::CHALLENGE)
            .collect();
        assert_eq!(challenges.len(), 1);
        assert_eq!(
            challenges[0].body.as_ref().unwrap()["contextIdentifier"]["identifier"],
            "1111111111"
        );

        let runs = h.state.latest_runs().await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].outcome, Some(RunOutcome::Aborted));
    }

    #[tokio::test]
    async fn test_rate_limit_on_query_aborts_batch() {
        let transport = ScriptedTransport::new(|req, _| {
            handshake(req).unwrap_or_else(|| match req.route() {
                endpoints::REDEEM_TOKEN => {
                    respond(200, json!({"accessToken": {"token": "access-tok"}}))
                }
                endpoints::QUERY_METADATA => respond(429, json!({})),
                other => panic!("unexpected route {other}"),
            })
        });
        let h = harness(
            "rate_limit",
            vec![
                tenant("a", "1111111111", ExecutionMode::Daily),
                tenant("b", "2222222222", ExecutionMode::Daily),
            ],
            &[("ksef-token-1111111111", "a"), ("ksef-token-2222222222", "b")],
            transport,
            |_| {},
        );

        let err = h.runner.run_sync().await.unwrap_err();
        let aborted = err.downcast_ref::<BatchAborted>().unwrap();
        assert!(matches!(aborted.source, KsefError::RateLimited { .. }));
        assert_eq!(h.transport.calls_to(endpoints::CHALLENGE), 1);
    }

    #[tokio::test]
    async fn test_backfill_saves_checkpoint_and_restart_clears_it() {
        let h = harness(
            "backfill",
            vec![tenant("acme", "1111111111", ExecutionMode::Backfill)],
            &[("ksef-token-1111111111", "tok")],
            gateway(vec![invoice("K-1")]),
            |_| {},
        );

        let report = h.runner.run_sync().await.unwrap();
        // 75 days of history in 30-day chunks; the same invoice comes back
        // from every chunk but is kept once.
        assert_eq!(h.transport.calls_to(endpoints::QUERY_METADATA), 3);
        assert_eq!(report.tenants[0].fetched, 1);
        assert_eq!(report.tenants[0].written, 1);

        let boundary = h.state.load_checkpoint("acme").await.unwrap().unwrap();
        // Stored with whole-second precision.
        assert_eq!(boundary.timestamp(), h.runner.options.history_start.timestamp());

        // A checkpoint mid-range would normally be resumed from.
        let midpoint = Utc::now() - chrono::Duration::days(20);
        h.state.save_checkpoint("acme", midpoint).await.unwrap();
        let resume = harness_with_state(
            "backfill_resume",
            vec![tenant("acme", "1111111111", ExecutionMode::Backfill)],
            &[("ksef-token-1111111111", "tok")],
            gateway(vec![]),
            h.state.clone(),
            |_| {},
        );
        resume.runner.run_sync().await.unwrap();
        assert_eq!(resume.transport.calls_to(endpoints::QUERY_METADATA), 2);

        h.state.save_checkpoint("acme", midpoint).await.unwrap();
        let restart = harness_with_state(
            "backfill_restart",
            vec![tenant("acme", "1111111111", ExecutionMode::Backfill)],
            &[("ksef-token-1111111111", "tok")],
            gateway(vec![]),
            h.state.clone(),
            |o| o.restart_backfill = true,
        );
        restart.runner.run_sync().await.unwrap();
        // Restarted from the top rather than resuming at the midpoint.
        assert_eq!(restart.transport.calls_to(endpoints::QUERY_METADATA), 3);
    }

    #[tokio::test]
    async fn test_failed_chunk_keeps_records_of_checkpointed_chunks() {
        let healthy = Arc::new(AtomicBool::new(false));
        let healthy_in = healthy.clone();
        let transport = ScriptedTransport::new(move |req, prior| {
            handshake(req).unwrap_or_else(|| match req.route() {
                endpoints::REDEEM_TOKEN => {
                    respond(200, json!({"accessToken": {"token": "access-tok"}}))
                }
                endpoints::QUERY_METADATA if healthy_in.load(Ordering::SeqCst) => {
                    respond(200, json!({"invoices": []}))
                }
                endpoints::QUERY_METADATA if prior == 0 => {
                    respond(200, json!({"invoices": [invoice("NEWEST")]}))
                }
                endpoints::QUERY_METADATA => respond(500, json!({"error": "boom"})),
                other => panic!("unexpected route {other}"),
            })
        });
        let h = harness(
            "chunk_failure",
            vec![tenant("acme", "1111111111", ExecutionMode::Backfill)],
            &[("ksef-token-1111111111", "tok")],
            transport,
            |_| {},
        );
        let report_file = h.dir.join("reports").join("KSeF acme.csv");

        let first = h.runner.run_sync().await.unwrap();
        let acme = &first.tenants[0];
        assert!(matches!(acme.outcome, TenantOutcome::Failed { .. }));
        assert_eq!(acme.written, 1);
        assert!(h.state.load_checkpoint("acme").await.unwrap().is_some());
        assert!(std::fs::read_to_string(&report_file)
            .unwrap()
            .contains("NEWEST"));

        // The next pass resumes below the checkpoint; the record stays put.
        healthy.store(true, Ordering::SeqCst);
        let second = h.runner.run_sync().await.unwrap();
        assert_eq!(second.tenants[0].outcome, TenantOutcome::Synced);
        assert!(std::fs::read_to_string(&report_file)
            .unwrap()
            .contains("NEWEST"));
        let runs = h.state.latest_runs().await.unwrap();
        assert_eq!(runs[0].outcome, Some(RunOutcome::Success));
    }

    #[tokio::test]
    async fn test_restart_backfill_clears_checkpoint_once() {
        let h = harness(
            "restart_once",
            vec![tenant("acme", "1111111111", ExecutionMode::Backfill)],
            &[("ksef-token-1111111111", "tok")],
            gateway(vec![]),
            |o| {
                o.restart_backfill = true;
                o.empty_streak = EmptyStreakPolicy::Abort { after: 1 };
            },
        );
        let age = |boundary: DateTime<Utc>| (Utc::now() - boundary).num_days();
        h.state
            .save_checkpoint("acme", Utc::now() - chrono::Duration::days(20))
            .await
            .unwrap();

        // First pass starts over from now, one chunk down.
        h.runner.run_sync().await.unwrap();
        let after_first = h.state.load_checkpoint("acme").await.unwrap().unwrap();
        assert_eq!(age(after_first), 30);

        // Second pass of the same runner resumes instead of restarting.
        h.runner.run_sync().await.unwrap();
        let after_second = h.state.load_checkpoint("acme").await.unwrap().unwrap();
        assert_eq!(age(after_second), 60);
    }

    #[tokio::test]
    async fn test_locked_tenant_is_skipped() {
        let h = harness(
            "locked",
            vec![tenant("acme", "1111111111", ExecutionMode::Daily)],
            &[("ksef-token-1111111111", "tok")],
            gateway(vec![]),
            |_| {},
        );
        let _held = TenantLock::try_acquire(&h.dir.join("locks"), "acme")
            .await
            .unwrap()
            .unwrap();

        let report = h.runner.run_sync().await.unwrap();
        assert!(matches!(
            report.tenants[0].outcome,
            TenantOutcome::Skipped { .. }
        ));
        assert!(h.transport.requests().is_empty());
    }
}
