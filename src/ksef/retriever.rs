//! Paginated invoice metadata retrieval.
//!
//! [`Retriever::fetch`] pages through one date window. [`Retriever::fetch_chunked`]
//! walks a long range backward in fixed-size chunks, saving a checkpoint after
//! every chunk so an interrupted walk resumes where it stopped. A failed walk
//! still hands back the records of its completed chunks.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::auth::endpoints;
use crate::auth::session::SessionCredential;
use crate::state::CheckpointStore;
use crate::types::SubjectType;

use super::error::KsefError;
use super::query::{extract_records, query_body};
use super::record::RawRecord;
use super::transport::{GatewayRequest, GatewayTransport};

#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    pub page_size: u32,
    /// Pause before every page request.
    pub throttle: Duration,
    /// Hard ceiling on records per query window.
    pub max_results: u64,
    /// Grace period before retrying a first page rejected with 401/403.
    pub first_page_auth_delay: Duration,
    pub subject_type: SubjectType,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            throttle: Duration::from_millis(1000),
            max_results: 10_000,
            first_page_auth_delay: Duration::from_secs(5),
            subject_type: SubjectType::Subject1,
        }
    }
}

/// What to do after a run of consecutive chunks returned nothing.
pub enum EmptyStreakPolicy {
    Continue,
    Abort { after: u32 },
    /// Called with the streak length and the oldest boundary reached;
    /// returns whether to keep walking.
    Callback(Box<dyn Fn(u32, DateTime<Utc>) -> bool + Send + Sync>),
}

impl EmptyStreakPolicy {
    fn should_continue(&self, streak: u32, boundary: DateTime<Utc>) -> bool {
        match self {
            EmptyStreakPolicy::Continue => true,
            EmptyStreakPolicy::Abort { after } => streak < *after,
            EmptyStreakPolicy::Callback(decide) => decide(streak, boundary),
        }
    }
}

impl std::fmt::Debug for EmptyStreakPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmptyStreakPolicy::Continue => f.write_str("Continue"),
            EmptyStreakPolicy::Abort { after } => write!(f, "Abort {{ after: {after} }}"),
            EmptyStreakPolicy::Callback(_) => f.write_str("Callback"),
        }
    }
}

/// Result of a backward walk.
#[derive(Debug)]
pub struct ChunkedFetch {
    /// Deduplicated by record id within the walk, newest chunk first.
    pub records: Vec<RawRecord>,
    pub chunks: u32,
    /// Checkpoint the walk resumed from, if any.
    pub resumed_from: Option<DateTime<Utc>>,
    /// The empty-streak policy ended the walk before reaching `from`.
    pub halted_early: bool,
    /// Failure that ended the walk. `records` still holds every chunk
    /// completed before it, and those chunks are already checkpointed.
    pub error: Option<anyhow::Error>,
}

pub struct Retriever<'a> {
    transport: &'a dyn GatewayTransport,
    config: RetrieverConfig,
}

impl<'a> Retriever<'a> {
    pub fn new(transport: &'a dyn GatewayTransport, config: RetrieverConfig) -> Self {
        Self { transport, config }
    }

    /// Fetch every record of one date window, page by page.
    pub async fn fetch(
        &self,
        session: &SessionCredential,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        page_size: u32,
    ) -> Result<Vec<RawRecord>, KsefError> {
        let bearer = session.require_bearer()?;
        let page_size = page_size.max(1);
        let body = query_body(self.config.subject_type, from, to);
        let mut records = Vec::new();
        let mut offset: u64 = 0;

        loop {
            if offset * u64::from(page_size) >= self.config.max_results {
                tracing::warn!(
                    %from,
                    %to,
                    max_results = self.config.max_results,
                    "Result ceiling reached; the range may be incomplete"
                );
                break;
            }

            tokio::time::sleep(self.config.throttle).await;
            let request =
                GatewayRequest::post(endpoints::query_page(page_size, offset), body.clone())
                    .with_bearer(bearer);
            let mut response = self.transport.send(&request).await?;

            if offset == 0 && matches!(response.status, 401 | 403) {
                tracing::warn!(
                    status = response.status,
                    "First page rejected; retrying once after {}s",
                    self.config.first_page_auth_delay.as_secs()
                );
                tokio::time::sleep(self.config.first_page_auth_delay).await;
                response = self.transport.send(&request).await?;
            }

            if !response.is_success() {
                return Err(KsefError::from_authenticated_status(
                    response.status,
                    "invoice query",
                    &response.text,
                ));
            }

            let page = extract_records(&response.body);
            let count = page.len();
            tracing::debug!(offset, count, "Fetched page");
            records.extend(page.into_iter().map(RawRecord::from_value));

            if count < page_size as usize {
                break;
            }
            offset += 1;
        }

        tracing::info!(%from, %to, count = records.len(), "Fetched window");
        Ok(records)
    }

    /// Walk `[from, to]` backward in `chunk_days` chunks.
    ///
    /// Resumes from the stored checkpoint when it lies strictly inside the
    /// range. A fetch or checkpoint failure stops the walk and is returned in
    /// [`ChunkedFetch::error`] next to the records gathered so far; the last
    /// saved checkpoint stays in place. Only a failure to read the stored
    /// checkpoint is returned as `Err`.
    pub async fn fetch_chunked(
        &self,
        session: &SessionCredential,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        chunk_days: u32,
        checkpoint: &dyn CheckpointStore,
        policy: &EmptyStreakPolicy,
    ) -> anyhow::Result<ChunkedFetch> {
        let chunk = chrono::Duration::days(i64::from(chunk_days.max(1)));
        let overlap = chrono::Duration::days(1);

        let mut pointer = to;
        let mut resumed_from = None;
        match checkpoint.load().await? {
            Some(stored) if stored > from && stored < to => {
                tracing::info!(checkpoint = %stored, "Resuming backward walk from checkpoint");
                pointer = stored;
                resumed_from = Some(stored);
            }
            Some(stored) => {
                tracing::debug!(checkpoint = %stored, "Checkpoint outside the range; starting from the top");
            }
            None => {}
        }

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        let mut chunks = 0;
        let mut empty_streak = 0;
        let mut halted_early = false;
        let mut error = None;

        while pointer > from {
            let lower = (pointer - chunk).max(from);
            let upper = (pointer + overlap).min(to);

            let batch = match self
                .fetch(session, lower, upper, self.config.page_size)
                .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        %lower,
                        %upper,
                        kept = records.len(),
                        "Chunk fetch failed; stopping backward walk"
                    );
                    error = Some(anyhow::Error::from(e));
                    break;
                }
            };
            let fetched = batch.len();
            for record in batch {
                let is_new = match record.record_id() {
                    Some(id) => seen.insert(id),
                    None => true,
                };
                if is_new {
                    records.push(record);
                }
            }

            if let Err(e) = checkpoint.save(lower).await {
                error = Some(
                    anyhow::Error::new(e).context(format!("saving checkpoint {lower}")),
                );
                break;
            }
            pointer = lower;
            chunks += 1;

            if fetched == 0 {
                empty_streak += 1;
                if !policy.should_continue(empty_streak, lower) {
                    tracing::info!(
                        empty_streak,
                        boundary = %lower,
                        "Stopping backward walk after consecutive empty chunks"
                    );
                    halted_early = pointer > from;
                    break;
                }
            } else {
                empty_streak = 0;
            }
        }

        Ok(ChunkedFetch {
            records,
            chunks,
            resumed_from,
            halted_early,
            error,
        })
    }
}
