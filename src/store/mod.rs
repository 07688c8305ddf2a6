//! Job store interface
//!
//! The durable job/result store is an external collaborator; the crawler
//! only issues the typed operations defined here. [`PgJobStore`] backs
//! production over Postgres with LISTEN/NOTIFY change notifications;
//! [`InMemoryJobStore`] backs the test suite and any polling substitute.

mod memory;
mod postgres;

pub use memory::InMemoryJobStore;
pub use postgres::PgJobStore;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::CrawlSettings;
use crate::types::{
    AiSearchAudit, CrawlJob, CrawlProgress, IssueDefinition, JobResults, JobStatus, PageRecord,
    PerformanceAudit, Project,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store error: {0}")]
    Backend(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

/// A change notification from the store.
#[derive(Debug, Clone)]
pub enum JobNotification {
    /// A job row was inserted (the trigger to start when pending).
    Inserted(CrawlJob),
    /// A job row was updated externally (cancel / user-completed flips).
    Updated(CrawlJob),
}

/// Typed operations the crawler issues against the store.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Subscribe to job change notifications.
    async fn subscribe(&self) -> Result<mpsc::Receiver<JobNotification>, StoreError>;

    async fn get_job(&self, id: Uuid) -> Result<Option<CrawlJob>, StoreError>;
    async fn get_project(&self, id: Uuid) -> Result<Option<Project>, StoreError>;

    /// Oldest job still in `pending`.
    async fn oldest_pending_job(&self) -> Result<Option<CrawlJob>, StoreError>;

    /// Compare-and-set `pending -> processing`, stamping `started_at`.
    /// Returns false when the job was no longer pending.
    async fn claim_job(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Flip abandoned `processing` jobs (started before `cutoff`) back to
    /// `pending` with an explanatory message. Returns the affected ids.
    async fn requeue_stale_jobs(
        &self,
        cutoff: DateTime<Utc>,
        message: &str,
    ) -> Result<Vec<Uuid>, StoreError>;

    /// Most recent `failed` jobs since `since` with more than `min_pages`
    /// crawled, newest first, capped at `limit`.
    async fn recent_failed_jobs(
        &self,
        since: DateTime<Utc>,
        min_pages: u64,
        limit: usize,
    ) -> Result<Vec<CrawlJob>, StoreError>;

    async fn project_has_active_job(&self, project_id: Uuid) -> Result<bool, StoreError>;

    /// URLs of pages already written for a crawl (resume skip list).
    async fn crawled_urls(&self, crawl_id: Uuid) -> Result<Vec<String>, StoreError>;

    /// Create a new pending job with the given settings snapshot. The
    /// snapshot is validated first; a policy that fails its bounds checks
    /// is rejected with [`StoreError::InvalidSettings`].
    async fn create_job(
        &self,
        project_id: Uuid,
        settings: &CrawlSettings,
    ) -> Result<Uuid, StoreError>;

    /// The issue catalogue, loaded once per job.
    async fn issue_definitions(&self) -> Result<Vec<IssueDefinition>, StoreError>;

    /// Upsert one page keyed by `(crawl_id, url_hash)`; returns the
    /// persistent page id.
    async fn upsert_page(&self, crawl_id: Uuid, page: &PageRecord) -> Result<Uuid, StoreError>;

    /// Upsert the per-job aggregate for this code and link the page to it.
    /// Duplicate page links are absorbed silently.
    async fn record_issue(
        &self,
        crawl_id: Uuid,
        page_id: Uuid,
        definition: &IssueDefinition,
        details: &Value,
    ) -> Result<(), StoreError>;

    /// Update the job's live progress row.
    async fn update_progress(
        &self,
        job_id: Uuid,
        progress: &CrawlProgress,
    ) -> Result<(), StoreError>;

    /// All pages written for a crawl, with their persistent ids.
    async fn crawl_pages(&self, crawl_id: Uuid) -> Result<Vec<(Uuid, PageRecord)>, StoreError>;

    /// Flush incoming-link counts, keyed by page URL, batched by URL hash.
    async fn set_incoming_links(
        &self,
        crawl_id: Uuid,
        counts: &HashMap<String, u32>,
    ) -> Result<(), StoreError>;

    /// Aggregate rows joined with their definitions.
    async fn issue_totals(
        &self,
        crawl_id: Uuid,
    ) -> Result<Vec<(IssueDefinition, u64)>, StoreError>;

    /// Distinct pages linked to at least one error-severity issue.
    async fn error_page_count(&self, crawl_id: Uuid) -> Result<u64, StoreError>;

    /// Write finalize aggregates. Never touches `status`.
    async fn update_job_results(
        &self,
        job_id: Uuid,
        results: &JobResults,
    ) -> Result<(), StoreError>;

    /// Compare-and-set a terminal status: refuses to overwrite an existing
    /// terminal state. Returns whether this call performed the write.
    async fn finish_job(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<bool, StoreError>;

    async fn save_performance_audit(
        &self,
        crawl_id: Uuid,
        audit: &PerformanceAudit,
    ) -> Result<(), StoreError>;

    async fn save_ai_search_audit(
        &self,
        crawl_id: Uuid,
        audit: &AiSearchAudit,
    ) -> Result<(), StoreError>;
}
