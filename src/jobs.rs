//! Background job queue.
//!
//! Side effects that should not block a request (re-indexing a document,
//! purging a removed one, generating a digest) are sent to a bounded tokio
//! channel and executed by a single worker task. Every handler is
//! idempotent, so a failed job is simply retried with exponential backoff
//! until `max_attempts` is reached, then logged and dropped.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::engine::Engine;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum Job {
    IngestDocument {
        document_id: String,
    },
    RemoveDocument {
        document_id: String,
        company_id: String,
    },
    GenerateDigest {
        user_id: String,
        date: NaiveDate,
    },
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::IngestDocument { .. } => "ingest_document",
            Job::RemoveDocument { .. } => "remove_document",
            Job::GenerateDigest { .. } => "generate_digest",
        }
    }
}

/// Executes one job. Must be safe to call again for the same job.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<()>;
}

#[async_trait]
impl JobHandler for Engine {
    async fn handle(&self, job: &Job) -> Result<()> {
        match job {
            Job::IngestDocument { document_id } => {
                self.ingest(document_id).await?;
            }
            Job::RemoveDocument {
                document_id,
                company_id,
            } => {
                self.remove_document(document_id, company_id).await?;
            }
            Job::GenerateDigest { user_id, date } => {
                self.generate_digest(user_id, *date, Utc::now().timestamp())
                    .await?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles on every further one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    fn delay_before(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << (attempt.saturating_sub(2)).min(5))
    }
}

/// What the worker did before its queue closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub succeeded: usize,
    pub failed: usize,
    pub retries: usize,
}

/// Sending half of the queue. Cheap to clone.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
}

impl JobQueue {
    /// Enqueue a job, waiting for room if the queue is full.
    pub async fn enqueue(&self, job: Job) -> Result<()> {
        self.tx
            .send(job)
            .await
            .map_err(|e| anyhow::anyhow!("job queue closed; dropped {}", e.0.name()))
    }
}

/// Start the worker. It runs until every [`JobQueue`] clone is dropped,
/// then returns its counters.
pub fn spawn_worker(
    handler: Arc<dyn JobHandler>,
    capacity: usize,
    policy: RetryPolicy,
) -> (JobQueue, JoinHandle<WorkerStats>) {
    let (tx, mut rx) = mpsc::channel::<Job>(capacity.max(1));

    let handle = tokio::spawn(async move {
        let mut stats = WorkerStats::default();
        while let Some(job) = rx.recv().await {
            run_job(handler.as_ref(), &job, &policy, &mut stats).await;
        }
        info!(
            succeeded = stats.succeeded,
            failed = stats.failed,
            retries = stats.retries,
            "job worker stopped"
        );
        stats
    });

    (JobQueue { tx }, handle)
}

async fn run_job(
    handler: &dyn JobHandler,
    job: &Job,
    policy: &RetryPolicy,
    stats: &mut WorkerStats,
) {
    let max_attempts = policy.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        if attempt > 1 {
            stats.retries += 1;
            tokio::time::sleep(policy.delay_before(attempt)).await;
        }
        match handler.handle(job).await {
            Ok(()) => {
                stats.succeeded += 1;
                return;
            }
            Err(e) if attempt < max_attempts => {
                warn!(job = job.name(), attempt, error = %e, "job failed; retrying");
            }
            Err(e) => {
                warn!(job = job.name(), attempt, error = %e, "job failed; giving up");
            }
        }
    }
    stats.failed += 1;
}

/// Parse a `YYYY-MM-DD` date argument.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid date (expected YYYY-MM-DD): {}", s))
}
