//! Postgres job store
//!
//! Thin sqlx glue over the external store schema. Change notifications ride
//! LISTEN/NOTIFY on the `crawl_jobs_events` channel, whose payload is
//! `{"op": "INSERT"|"UPDATE", "id": "<job uuid>"}`; the listener task
//! re-reads the row and forwards a typed notification. The full page
//! analysis travels in a `record` JSONB column beside the indexed columns.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgListener, PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::CrawlSettings;
use crate::types::{
    AiSearchAudit, CrawlJob, CrawlProgress, IssueDefinition, IssueSeverity, JobResults,
    JobStatus, PageRecord, PerformanceAudit, Project,
};

use super::{JobNotification, JobStore, StoreError};

const NOTIFY_CHANNEL: &str = "crawl_jobs_events";

const JOB_COLUMNS: &str = "id, project_id, status, started_at, completed_at, \
     pages_discovered, pages_crawled, pages_failed, error_message, settings, created_at";

/// sqlx-backed implementation of [`JobStore`].
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    /// Connect to the store. The service credential is applied as the
    /// connection password on top of the base URL.
    pub async fn connect(database_url: &str, service_key: &str) -> Result<Self, StoreError> {
        let options = database_url
            .parse::<PgConnectOptions>()?
            .password(service_key);
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn job_from_row(row: &PgRow) -> Result<CrawlJob, StoreError> {
        let settings_json: Value = row.try_get("settings")?;
        let settings: CrawlSettings = serde_json::from_value(settings_json)
            .map_err(|e| StoreError::Backend(format!("bad settings snapshot: {}", e)))?;
        let status: String = row.try_get("status")?;
        Ok(CrawlJob {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            status: parse_status(&status)?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            pages_discovered: row.try_get::<i64, _>("pages_discovered")? as u64,
            pages_crawled: row.try_get::<i64, _>("pages_crawled")? as u64,
            pages_failed: row.try_get::<i64, _>("pages_failed")? as u64,
            error_message: row.try_get("error_message")?,
            settings,
            created_at: row.try_get("created_at")?,
        })
    }

    fn definition_from_row(row: &PgRow) -> Result<IssueDefinition, StoreError> {
        let severity: String = row.try_get("severity")?;
        Ok(IssueDefinition {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            category: row.try_get("category")?,
            severity: parse_severity(&severity)?,
            active: row.try_get("active")?,
        })
    }
}

fn parse_status(raw: &str) -> Result<JobStatus, StoreError> {
    match raw {
        "pending" => Ok(JobStatus::Pending),
        "processing" => Ok(JobStatus::Processing),
        "completed" => Ok(JobStatus::Completed),
        "failed" => Ok(JobStatus::Failed),
        "cancelled" => Ok(JobStatus::Cancelled),
        other => Err(StoreError::Backend(format!("unknown job status '{}'", other))),
    }
}

fn parse_severity(raw: &str) -> Result<IssueSeverity, StoreError> {
    match raw {
        "error" => Ok(IssueSeverity::Error),
        "warning" => Ok(IssueSeverity::Warning),
        "notice" => Ok(IssueSeverity::Notice),
        other => Err(StoreError::Backend(format!("unknown severity '{}'", other))),
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn subscribe(&self) -> Result<mpsc::Receiver<JobNotification>, StoreError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(NOTIFY_CHANNEL).await?;

        let (tx, rx) = mpsc::channel(64);
        let pool = self.pool.clone();

        tokio::spawn(async move {
            loop {
                let notification = match listener.recv().await {
                    Ok(n) => n,
                    Err(e) => {
                        warn!("job notification stream ended: {}", e);
                        break;
                    }
                };

                let payload: Value = match serde_json::from_str(notification.payload()) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("ignoring malformed notification payload: {}", e);
                        continue;
                    }
                };
                let Some(id) = payload
                    .get("id")
                    .and_then(|v| v.as_str())
                    .and_then(|s| Uuid::parse_str(s).ok())
                else {
                    continue;
                };
                let op = payload.get("op").and_then(|v| v.as_str()).unwrap_or("");

                let query =
                    format!("SELECT {} FROM crawl_jobs WHERE id = $1", JOB_COLUMNS);
                let row = match sqlx::query(&query).bind(id).fetch_optional(&pool).await {
                    Ok(Some(row)) => row,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("failed to load notified job {}: {}", id, e);
                        continue;
                    }
                };
                let job = match Self::job_from_row(&row) {
                    Ok(job) => job,
                    Err(e) => {
                        warn!("failed to decode notified job {}: {}", id, e);
                        continue;
                    }
                };

                let message = match op {
                    "INSERT" => JobNotification::Inserted(job),
                    _ => JobNotification::Updated(job),
                };
                if tx.send(message).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<CrawlJob>, StoreError> {
        let query = format!("SELECT {} FROM crawl_jobs WHERE id = $1", JOB_COLUMNS);
        let row = sqlx::query(&query).bind(id).fetch_optional(&self.pool).await?;
        row.map(|r| Self::job_from_row(&r)).transpose()
    }

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>, StoreError> {
        let row = sqlx::query("SELECT id, domain FROM projects WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => Some(Project {
                id: row.try_get("id")?,
                domain: row.try_get("domain")?,
            }),
            None => None,
        })
    }

    async fn oldest_pending_job(&self) -> Result<Option<CrawlJob>, StoreError> {
        let query = format!(
            "SELECT {} FROM crawl_jobs WHERE status = 'pending' ORDER BY created_at ASC LIMIT 1",
            JOB_COLUMNS
        );
        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.map(|r| Self::job_from_row(&r)).transpose()
    }

    async fn claim_job(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE crawl_jobs SET status = 'processing', started_at = now() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn requeue_stale_jobs(
        &self,
        cutoff: DateTime<Utc>,
        message: &str,
    ) -> Result<Vec<Uuid>, StoreError> {
        let rows = sqlx::query(
            "UPDATE crawl_jobs SET status = 'pending', started_at = NULL, error_message = $2 \
             WHERE status = 'processing' AND started_at < $1 RETURNING id",
        )
        .bind(cutoff)
        .bind(message)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| row.try_get("id").map_err(StoreError::from))
            .collect()
    }

    async fn recent_failed_jobs(
        &self,
        since: DateTime<Utc>,
        min_pages: u64,
        limit: usize,
    ) -> Result<Vec<CrawlJob>, StoreError> {
        let query = format!(
            "SELECT {} FROM crawl_jobs \
             WHERE status = 'failed' AND completed_at >= $1 AND pages_crawled > $2 \
             ORDER BY completed_at DESC LIMIT $3",
            JOB_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(since)
            .bind(min_pages as i64)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::job_from_row).collect()
    }

    async fn project_has_active_job(&self, project_id: Uuid) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM crawl_jobs \
             WHERE project_id = $1 AND status IN ('pending', 'processing')) AS present",
        )
        .bind(project_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("present")?)
    }

    async fn crawled_urls(&self, crawl_id: Uuid) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT url FROM crawled_pages WHERE crawl_id = $1")
            .bind(crawl_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get("url").map_err(StoreError::from))
            .collect()
    }

    async fn create_job(
        &self,
        project_id: Uuid,
        settings: &CrawlSettings,
    ) -> Result<Uuid, StoreError> {
        settings
            .validate()
            .map_err(|e| StoreError::InvalidSettings(e.to_string()))?;
        let id = Uuid::new_v4();
        let snapshot = serde_json::to_value(settings)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        sqlx::query(
            "INSERT INTO crawl_jobs (id, project_id, status, settings, created_at) \
             VALUES ($1, $2, 'pending', $3, now())",
        )
        .bind(id)
        .bind(project_id)
        .bind(snapshot)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn issue_definitions(&self) -> Result<Vec<IssueDefinition>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, code, name, category, severity, active FROM issue_definitions \
             WHERE active",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::definition_from_row).collect()
    }

    async fn upsert_page(&self, crawl_id: Uuid, page: &PageRecord) -> Result<Uuid, StoreError> {
        let record = serde_json::to_value(page)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let row = sqlx::query(
            "INSERT INTO crawled_pages \
               (id, crawl_id, url, url_hash, path, status_code, page_depth, discovered_via, \
                is_indexable, word_count, internal_links_count, internal_links_received, record) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 0, $12) \
             ON CONFLICT (crawl_id, url_hash) DO UPDATE SET \
               status_code = EXCLUDED.status_code, \
               page_depth = EXCLUDED.page_depth, \
               discovered_via = EXCLUDED.discovered_via, \
               is_indexable = EXCLUDED.is_indexable, \
               word_count = EXCLUDED.word_count, \
               internal_links_count = EXCLUDED.internal_links_count, \
               record = EXCLUDED.record \
             RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(crawl_id)
        .bind(&page.url)
        .bind(&page.url_hash)
        .bind(&page.path)
        .bind(page.status_code as i32)
        .bind(page.page_depth as i32)
        .bind(page.discovered_via.as_str())
        .bind(page.is_indexable)
        .bind(page.word_count as i32)
        .bind(page.internal_links_count() as i32)
        .bind(record)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn record_issue(
        &self,
        crawl_id: Uuid,
        page_id: Uuid,
        definition: &IssueDefinition,
        details: &Value,
    ) -> Result<(), StoreError> {
        // Aggregate row first, then the page link; the count only moves when
        // the link insert was not a duplicate.
        let aggregate_row = sqlx::query(
            "INSERT INTO crawl_issues (id, crawl_id, issue_id, affected_pages_count) \
             VALUES ($1, $2, $3, 0) \
             ON CONFLICT (crawl_id, issue_id) DO UPDATE SET issue_id = EXCLUDED.issue_id \
             RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(crawl_id)
        .bind(definition.id)
        .fetch_one(&self.pool)
        .await?;
        let aggregate_id: Uuid = aggregate_row.try_get("id")?;

        let inserted = sqlx::query(
            "INSERT INTO page_issues (page_id, crawl_issue_id, details) VALUES ($1, $2, $3) \
             ON CONFLICT (page_id, crawl_issue_id) DO NOTHING",
        )
        .bind(page_id)
        .bind(aggregate_id)
        .bind(details)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() > 0 {
            sqlx::query(
                "UPDATE crawl_issues SET affected_pages_count = affected_pages_count + 1 \
                 WHERE id = $1",
            )
            .bind(aggregate_id)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn update_progress(
        &self,
        job_id: Uuid,
        progress: &CrawlProgress,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE crawl_jobs SET pages_discovered = $2, pages_crawled = $3, \
             pages_failed = $4, current_url = $5 WHERE id = $1",
        )
        .bind(job_id)
        .bind(progress.pages_discovered as i64)
        .bind(progress.pages_crawled as i64)
        .bind(progress.pages_failed as i64)
        .bind(&progress.current_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn crawl_pages(&self, crawl_id: Uuid) -> Result<Vec<(Uuid, PageRecord)>, StoreError> {
        let rows = sqlx::query("SELECT id, record FROM crawled_pages WHERE crawl_id = $1")
            .bind(crawl_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                let id: Uuid = row.try_get("id")?;
                let record: Value = row.try_get("record")?;
                let page: PageRecord = serde_json::from_value(record)
                    .map_err(|e| StoreError::Backend(format!("bad page record: {}", e)))?;
                Ok((id, page))
            })
            .collect()
    }

    async fn set_incoming_links(
        &self,
        crawl_id: Uuid,
        counts: &HashMap<String, u32>,
    ) -> Result<(), StoreError> {
        for (url, count) in counts {
            let url_hash = crate::types::sha256_hex(url);
            sqlx::query(
                "UPDATE crawled_pages SET internal_links_received = $3, \
                 record = jsonb_set(record, '{internal_links_received}', to_jsonb($3::int)) \
                 WHERE crawl_id = $1 AND url_hash = $2",
            )
            .bind(crawl_id)
            .bind(url_hash)
            .bind(*count as i32)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn issue_totals(
        &self,
        crawl_id: Uuid,
    ) -> Result<Vec<(IssueDefinition, u64)>, StoreError> {
        let rows = sqlx::query(
            "SELECT d.id, d.code, d.name, d.category, d.severity, d.active, \
                    a.affected_pages_count \
             FROM crawl_issues a JOIN issue_definitions d ON a.issue_id = d.id \
             WHERE a.crawl_id = $1",
        )
        .bind(crawl_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                let definition = Self::definition_from_row(row)?;
                let count: i64 = row.try_get("affected_pages_count")?;
                Ok((definition, count as u64))
            })
            .collect()
    }

    async fn error_page_count(&self, crawl_id: Uuid) -> Result<u64, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(DISTINCT pi.page_id) AS pages \
             FROM page_issues pi \
             JOIN crawl_issues a ON pi.crawl_issue_id = a.id \
             JOIN issue_definitions d ON a.issue_id = d.id \
             WHERE a.crawl_id = $1 AND d.severity = 'error'",
        )
        .bind(crawl_id)
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.try_get("pages")?;
        Ok(count as u64)
    }

    async fn update_job_results(
        &self,
        job_id: Uuid,
        results: &JobResults,
    ) -> Result<(), StoreError> {
        let category_scores = serde_json::to_value(&results.category_scores)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        sqlx::query(
            "UPDATE crawl_jobs SET \
               pages_discovered = $2, pages_crawled = $3, pages_failed = $4, \
               progress_percentage = $5, duration_seconds = $6, health_score = $7, \
               total_issues = $8, errors_count = $9, warnings_count = $10, \
               notices_count = $11, passed_count = $12, category_scores = $13 \
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(results.pages_discovered as i64)
        .bind(results.pages_crawled as i64)
        .bind(results.pages_failed as i64)
        .bind(results.progress_percentage)
        .bind(results.duration_seconds)
        .bind(results.health_score as i32)
        .bind(results.total_issues as i64)
        .bind(results.errors_count as i64)
        .bind(results.warnings_count as i64)
        .bind(results.notices_count as i64)
        .bind(results.passed_count as i64)
        .bind(category_scores)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finish_job(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE crawl_jobs SET status = $2, completed_at = now(), \
             error_message = COALESCE($3, error_message) \
             WHERE id = $1 AND status NOT IN ('completed', 'failed', 'cancelled')",
        )
        .bind(job_id)
        .bind(status.as_str())
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_performance_audit(
        &self,
        crawl_id: Uuid,
        audit: &PerformanceAudit,
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_value(audit)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        sqlx::query(
            "INSERT INTO performance_audits (crawl_id, audit, created_at) \
             VALUES ($1, $2, now()) \
             ON CONFLICT (crawl_id) DO UPDATE SET audit = EXCLUDED.audit, created_at = now()",
        )
        .bind(crawl_id)
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_ai_search_audit(
        &self,
        crawl_id: Uuid,
        audit: &AiSearchAudit,
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_value(audit)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        sqlx::query(
            "INSERT INTO ai_search_audits (crawl_id, audit, created_at) \
             VALUES ($1, $2, now()) \
             ON CONFLICT (crawl_id) DO UPDATE SET audit = EXCLUDED.audit, created_at = now()",
        )
        .bind(crawl_id)
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
