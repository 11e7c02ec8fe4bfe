//! The build job descriptor and its durable queue.
//!
//! Jobs are pushed to a single Postgres-backed apalis queue; the build
//! worker tier runs its own apalis workers against the same storage. The
//! ingress side only ever publishes. Delivery is at-least-once end to end
//! (the source host redelivers failed webhook deliveries), so workers must
//! tolerate duplicate descriptors for the same commit.

use anyhow::{Context, Result};
use apalis::prelude::Storage;
use apalis_sql::{Config, postgres::PostgresStorage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;

/// Namespace of the single queue all CI build jobs go to.
pub const BUILD_QUEUE: &str = "gantry::builds";

/// Everything the build worker needs to check out and build one commit.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildJob {
    pub repo_url: String,
    pub branch: String,
    pub head_sha: String,
    pub login: String,
    pub access_token: String,
    pub repo_id: i64,
}

impl std::fmt::Debug for BuildJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildJob")
            .field("repo_url", &self.repo_url)
            .field("branch", &self.branch)
            .field("head_sha", &self.head_sha)
            .field("login", &self.login)
            .field("access_token", &"[REDACTED]")
            .field("repo_id", &self.repo_id)
            .finish()
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("build job is missing `{0}`")]
pub struct IncompleteJob(pub &'static str);

impl BuildJob {
    /// Every field is mandatory at publish time. A job with an empty branch
    /// or SHA would make the worker build the wrong thing silently, so an
    /// incomplete descriptor is refused instead of published.
    pub fn ensure_complete(&self) -> Result<(), IncompleteJob> {
        if self.repo_url.is_empty() {
            return Err(IncompleteJob("repo_url"));
        }
        if self.branch.is_empty() {
            return Err(IncompleteJob("branch"));
        }
        if self.head_sha.is_empty() {
            return Err(IncompleteJob("head_sha"));
        }
        if self.login.is_empty() {
            return Err(IncompleteJob("login"));
        }
        if self.access_token.is_empty() {
            return Err(IncompleteJob("access_token"));
        }
        Ok(())
    }
}

/// Where the pipeline hands off jobs. A trait so tests can count publishes
/// without a broker.
#[async_trait]
pub trait JobSink: Send + Sync {
    async fn publish(&self, job: BuildJob) -> Result<()>;
}

/// Handle to the build queue, created once at startup and shared by all
/// in-flight requests.
#[derive(Clone)]
pub struct JobQueue {
    builds: PostgresStorage<BuildJob>,
}

impl JobQueue {
    /// Set up queue storage tables and create the storage handle. Failure is
    /// fatal at startup: a webhook endpoint that cannot publish must refuse
    /// to serve.
    pub async fn setup(pool: &PgPool) -> Result<Self> {
        PostgresStorage::setup(pool).await.context("Failed to set up job queue storage")?;
        let config = Config::new(BUILD_QUEUE);
        Ok(Self { builds: PostgresStorage::new_with_config(pool.clone(), config) })
    }

    /// Get a clone of the build storage for pushing jobs.
    pub fn builds(&self) -> PostgresStorage<BuildJob> { self.builds.clone() }
}

#[async_trait]
impl JobSink for JobQueue {
    /// One synchronous publish per job, no batching, no in-process retry.
    /// On failure the error propagates to the webhook endpoint, which
    /// answers 5xx and leaves redelivery to the source host.
    async fn publish(&self, job: BuildJob) -> Result<()> {
        job.ensure_complete()?;
        let mut storage = self.builds.clone();
        storage.push(job).await.context("Failed to publish build job")?;
        tracing::debug!("Published build job to `{BUILD_QUEUE}`");
        Ok(())
    }
}
