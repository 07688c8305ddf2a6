//! In-memory job store
//!
//! Backs the test suite and doubles as a polling substitute when no
//! notifying database is available. State lives behind one mutex; the
//! semantics (upsert keys, CAS terminal writes, duplicate absorption) match
//! the Postgres implementation.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::CrawlSettings;
use crate::issues::default_definitions;
use crate::types::{
    sha256_hex, AiSearchAudit, CrawlJob, CrawlProgress, IssueDefinition, JobResults, JobStatus,
    PageRecord, PerformanceAudit, Project,
};

use super::{JobNotification, JobStore, StoreError};

#[derive(Default)]
struct Inner {
    projects: HashMap<Uuid, Project>,
    jobs: HashMap<Uuid, CrawlJob>,
    definitions: Vec<IssueDefinition>,
    /// (crawl_id, url_hash) -> page id
    page_ids: HashMap<(Uuid, String), Uuid>,
    pages: HashMap<Uuid, (Uuid, PageRecord)>,
    /// (crawl_id, issue_id) -> aggregate count
    aggregates: HashMap<(Uuid, Uuid), u64>,
    /// absorbed duplicates: (page_id, issue_id)
    page_issues: HashSet<(Uuid, Uuid)>,
    results: HashMap<Uuid, JobResults>,
    performance_audits: HashMap<Uuid, PerformanceAudit>,
    ai_audits: HashMap<Uuid, AiSearchAudit>,
    subscribers: Vec<mpsc::Sender<JobNotification>>,
}

/// Mutex-backed store used in tests.
#[derive(Default)]
pub struct InMemoryJobStore {
    inner: Mutex<Inner>,
}

impl InMemoryJobStore {
    /// Empty store pre-seeded with the built-in issue catalogue.
    pub fn new() -> Self {
        let store = Self::default();
        store.inner.lock().unwrap().definitions = default_definitions();
        store
    }

    pub fn insert_project(&self, project: Project) {
        self.inner
            .lock()
            .unwrap()
            .projects
            .insert(project.id, project);
    }

    /// Insert a job row and broadcast the insert notification, as the
    /// database trigger would.
    pub fn insert_job(&self, job: CrawlJob) {
        let subscribers = {
            let mut inner = self.inner.lock().unwrap();
            inner.jobs.insert(job.id, job.clone());
            inner.subscribers.clone()
        };
        for tx in subscribers {
            let _ = tx.try_send(JobNotification::Inserted(job.clone()));
        }
    }

    /// Insert a job row without notifying (pre-existing state at boot).
    pub fn insert_job_silent(&self, job: CrawlJob) {
        self.inner.lock().unwrap().jobs.insert(job.id, job);
    }

    /// Externally flip a job's status (the "user cancelled/saved" path) and
    /// broadcast the update notification.
    pub fn set_status_external(&self, job_id: Uuid, status: JobStatus) {
        let (subscribers, job) = {
            let mut inner = self.inner.lock().unwrap();
            let Some(job) = inner.jobs.get_mut(&job_id) else {
                return;
            };
            job.status = status;
            if status.is_terminal() {
                job.completed_at = Some(Utc::now());
            }
            (inner.subscribers.clone(), inner.jobs[&job_id].clone())
        };
        for tx in subscribers {
            let _ = tx.try_send(JobNotification::Updated(job.clone()));
        }
    }

    pub fn job(&self, id: Uuid) -> Option<CrawlJob> {
        self.inner.lock().unwrap().jobs.get(&id).cloned()
    }

    pub fn all_jobs(&self) -> Vec<CrawlJob> {
        self.inner.lock().unwrap().jobs.values().cloned().collect()
    }

    pub fn results(&self, job_id: Uuid) -> Option<JobResults> {
        self.inner.lock().unwrap().results.get(&job_id).cloned()
    }

    pub fn ai_audit(&self, crawl_id: Uuid) -> Option<AiSearchAudit> {
        self.inner.lock().unwrap().ai_audits.get(&crawl_id).cloned()
    }

    pub fn page_count(&self, crawl_id: Uuid) -> usize {
        self.inner
            .lock()
            .unwrap()
            .pages
            .values()
            .filter(|(c, _)| *c == crawl_id)
            .count()
    }

    /// Aggregate count for one code, if any page tripped it.
    pub fn aggregate_count(&self, crawl_id: Uuid, code: &str) -> Option<u64> {
        let inner = self.inner.lock().unwrap();
        let definition = inner.definitions.iter().find(|d| d.code == code)?;
        inner.aggregates.get(&(crawl_id, definition.id)).copied()
    }

    /// Issue codes linked to the page at `url`.
    pub fn page_issue_codes(&self, crawl_id: Uuid, url: &str) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        let Some(page_id) = inner.page_ids.get(&(crawl_id, sha256_hex(url))) else {
            return Vec::new();
        };
        inner
            .page_issues
            .iter()
            .filter(|(pid, _)| pid == page_id)
            .filter_map(|(_, issue_id)| {
                inner
                    .definitions
                    .iter()
                    .find(|d| d.id == *issue_id)
                    .map(|d| d.code.clone())
            })
            .collect()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn subscribe(&self) -> Result<mpsc::Receiver<JobNotification>, StoreError> {
        let (tx, rx) = mpsc::channel(64);
        self.inner.lock().unwrap().subscribers.push(tx);
        Ok(rx)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<CrawlJob>, StoreError> {
        Ok(self.inner.lock().unwrap().jobs.get(&id).cloned())
    }

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>, StoreError> {
        Ok(self.inner.lock().unwrap().projects.get(&id).cloned())
    }

    async fn oldest_pending_job(&self) -> Result<Option<CrawlJob>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .min_by_key(|j| j.created_at)
            .cloned())
    }

    async fn claim_job(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.status = JobStatus::Processing;
                job.started_at = Some(Utc::now());
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(format!("job {}", id))),
        }
    }

    async fn requeue_stale_jobs(
        &self,
        cutoff: DateTime<Utc>,
        message: &str,
    ) -> Result<Vec<Uuid>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let mut requeued = Vec::new();
        for job in inner.jobs.values_mut() {
            if job.status == JobStatus::Processing
                && job.started_at.map(|t| t < cutoff).unwrap_or(true)
            {
                job.status = JobStatus::Pending;
                job.started_at = None;
                job.error_message = Some(message.to_string());
                requeued.push(job.id);
            }
        }
        Ok(requeued)
    }

    async fn recent_failed_jobs(
        &self,
        since: DateTime<Utc>,
        min_pages: u64,
        limit: usize,
    ) -> Result<Vec<CrawlJob>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut failed: Vec<CrawlJob> = inner
            .jobs
            .values()
            .filter(|j| {
                j.status == JobStatus::Failed
                    && j.completed_at.map(|t| t >= since).unwrap_or(false)
                    && j.pages_crawled > min_pages
            })
            .cloned()
            .collect();
        failed.sort_by_key(|j| std::cmp::Reverse(j.completed_at));
        failed.truncate(limit);
        Ok(failed)
    }

    async fn project_has_active_job(&self, project_id: Uuid) -> Result<bool, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .jobs
            .values()
            .any(|j| j.project_id == project_id && j.status.is_active()))
    }

    async fn crawled_urls(&self, crawl_id: Uuid) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .pages
            .values()
            .filter(|(c, _)| *c == crawl_id)
            .map(|(_, p)| p.url.clone())
            .collect())
    }

    async fn create_job(
        &self,
        project_id: Uuid,
        settings: &CrawlSettings,
    ) -> Result<Uuid, StoreError> {
        settings
            .validate()
            .map_err(|e| StoreError::InvalidSettings(e.to_string()))?;
        let job = CrawlJob {
            id: Uuid::new_v4(),
            project_id,
            status: JobStatus::Pending,
            started_at: None,
            completed_at: None,
            pages_discovered: 0,
            pages_crawled: 0,
            pages_failed: 0,
            error_message: None,
            settings: settings.clone(),
            created_at: Utc::now(),
        };
        let id = job.id;
        let subscribers = {
            let mut inner = self.inner.lock().unwrap();
            inner.jobs.insert(id, job.clone());
            inner.subscribers.clone()
        };
        for tx in subscribers {
            let _ = tx.try_send(JobNotification::Inserted(job.clone()));
        }
        Ok(id)
    }

    async fn issue_definitions(&self) -> Result<Vec<IssueDefinition>, StoreError> {
        Ok(self.inner.lock().unwrap().definitions.clone())
    }

    async fn upsert_page(&self, crawl_id: Uuid, page: &PageRecord) -> Result<Uuid, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let key = (crawl_id, page.url_hash.clone());
        let id = *inner.page_ids.entry(key).or_insert_with(Uuid::new_v4);
        inner.pages.insert(id, (crawl_id, page.clone()));
        Ok(id)
    }

    async fn record_issue(
        &self,
        crawl_id: Uuid,
        page_id: Uuid,
        definition: &IssueDefinition,
        _details: &Value,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        // The uniqueness constraint on (page, issue) absorbs duplicates; the
        // aggregate counts distinct pages only.
        if inner.page_issues.insert((page_id, definition.id)) {
            *inner.aggregates.entry((crawl_id, definition.id)).or_insert(0) += 1;
        }
        Ok(())
    }

    async fn update_progress(
        &self,
        job_id: Uuid,
        progress: &CrawlProgress,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.jobs.get_mut(&job_id) {
            job.pages_discovered = progress.pages_discovered;
            job.pages_crawled = progress.pages_crawled;
            job.pages_failed = progress.pages_failed;
        }
        Ok(())
    }

    async fn crawl_pages(&self, crawl_id: Uuid) -> Result<Vec<(Uuid, PageRecord)>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .pages
            .iter()
            .filter(|(_, (c, _))| *c == crawl_id)
            .map(|(id, (_, p))| (*id, p.clone()))
            .collect())
    }

    async fn set_incoming_links(
        &self,
        crawl_id: Uuid,
        counts: &HashMap<String, u32>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        // Batched by URL hash in the real store; the map lookup here mirrors
        // the same keying.
        let wanted: HashMap<String, u32> = counts
            .iter()
            .map(|(url, count)| (sha256_hex(url), *count))
            .collect();
        for (crawl, page) in inner.pages.values_mut() {
            if *crawl != crawl_id {
                continue;
            }
            if let Some(count) = wanted.get(&page.url_hash) {
                page.internal_links_received = *count;
            }
        }
        Ok(())
    }

    async fn issue_totals(
        &self,
        crawl_id: Uuid,
    ) -> Result<Vec<(IssueDefinition, u64)>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .aggregates
            .iter()
            .filter(|((c, _), _)| *c == crawl_id)
            .filter_map(|((_, issue_id), count)| {
                inner
                    .definitions
                    .iter()
                    .find(|d| d.id == *issue_id)
                    .map(|d| (d.clone(), *count))
            })
            .collect())
    }

    async fn error_page_count(&self, crawl_id: Uuid) -> Result<u64, StoreError> {
        let inner = self.inner.lock().unwrap();
        let error_ids: HashSet<Uuid> = inner
            .definitions
            .iter()
            .filter(|d| d.severity == crate::types::IssueSeverity::Error)
            .map(|d| d.id)
            .collect();
        let pages: HashSet<Uuid> = inner
            .page_issues
            .iter()
            .filter(|(page_id, issue_id)| {
                error_ids.contains(issue_id)
                    && inner
                        .pages
                        .get(page_id)
                        .map(|(c, _)| *c == crawl_id)
                        .unwrap_or(false)
            })
            .map(|(page_id, _)| *page_id)
            .collect();
        Ok(pages.len() as u64)
    }

    async fn update_job_results(
        &self,
        job_id: Uuid,
        results: &JobResults,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.jobs.get_mut(&job_id) {
            job.pages_discovered = results.pages_discovered;
            job.pages_crawled = results.pages_crawled;
            job.pages_failed = results.pages_failed;
        }
        inner.results.insert(job_id, results.clone());
        Ok(())
    }

    async fn finish_job(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(job) = inner.jobs.get_mut(&job_id) else {
            return Err(StoreError::NotFound(format!("job {}", job_id)));
        };
        if job.status.is_terminal() {
            return Ok(false);
        }
        job.status = status;
        job.completed_at = Some(Utc::now());
        if let Some(message) = error {
            job.error_message = Some(message.to_string());
        }
        Ok(true)
    }

    async fn save_performance_audit(
        &self,
        crawl_id: Uuid,
        audit: &PerformanceAudit,
    ) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .performance_audits
            .insert(crawl_id, audit.clone());
        Ok(())
    }

    async fn save_ai_search_audit(
        &self,
        crawl_id: Uuid,
        audit: &AiSearchAudit,
    ) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .ai_audits
            .insert(crawl_id, audit.clone());
        Ok(())
    }
}
