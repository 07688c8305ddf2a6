//! Job lifecycle controller
//!
//! Waits for job notifications, reconciles stale jobs at boot, auto-resumes
//! failed jobs with substantial progress, and dispatches one job at a time
//! to the orchestrator. Polling backstops cover missed notifications. A
//! shutdown signal cancels the in-flight job and marks it failed so the
//! next boot recovers it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{Config, ResumeInfo};
use crate::crawl::browser::BrowserContext;
use crate::crawl::orchestrator::{CrawlOrchestrator, CrawlOutcome};
use crate::store::{JobNotification, JobStore};
use crate::types::{CrawlJob, JobStatus};

/// Auto-resume looks this far back for failed jobs.
const RESUME_WINDOW_SECS: i64 = 3600;
/// Failed jobs need more than this many crawled pages to be worth resuming.
const RESUME_MIN_PAGES: u64 = 10;
/// At most this many failed jobs are resumed per sweep.
const RESUME_BATCH: usize = 5;

const SHUTDOWN_MESSAGE: &str = "Worker shutdown during crawl";

/// Customization applied to each orchestrator before it runs (test seam for
/// offline collaborator outputs).
pub type OrchestratorSetup =
    Box<dyn Fn(CrawlOrchestrator) -> CrawlOrchestrator + Send + Sync>;

struct ActiveJob {
    id: Uuid,
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<Result<CrawlOutcome>>,
}

/// Single-flight dispatcher between the job store and the orchestrator.
pub struct JobController {
    store: Arc<dyn JobStore>,
    browser: Arc<dyn BrowserContext>,
    config: Config,
    shutdown_rx: broadcast::Receiver<()>,
    setup: Option<OrchestratorSetup>,
}

impl JobController {
    pub fn new(
        store: Arc<dyn JobStore>,
        browser: Arc<dyn BrowserContext>,
        config: Config,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            store,
            browser,
            config,
            shutdown_rx,
            setup: None,
        }
    }

    pub fn with_orchestrator_setup(mut self, setup: OrchestratorSetup) -> Self {
        self.setup = Some(setup);
        self
    }

    /// Run until shutdown. Performs start-up reconciliation, then drains
    /// pending jobs one at a time while listening for notifications.
    pub async fn run(mut self) -> Result<()> {
        self.recover_stale_jobs().await;
        self.auto_resume_failed_jobs().await;

        let mut notifications = self
            .store
            .subscribe()
            .await
            .map_err(|e| anyhow!("failed to subscribe to job notifications: {}", e))?;

        let mut pending_poll =
            tokio::time::interval(Duration::from_secs(self.config.crawler.pending_poll_secs));
        let mut resume_poll =
            tokio::time::interval(Duration::from_secs(self.config.crawler.resume_retry_secs));
        // Both intervals fire immediately; the start-up passes above already
        // covered that work.
        pending_poll.tick().await;
        resume_poll.tick().await;

        let mut active: Option<ActiveJob> = None;

        loop {
            if active.is_none() {
                active = self.start_next_pending().await;
            }

            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("shutdown signal received");
                    if let Some(job) = active.take() {
                        job.cancel.store(true, Ordering::Relaxed);
                        let _ = (job.handle).await;
                        match self
                            .store
                            .finish_job(job.id, JobStatus::Failed, Some(SHUTDOWN_MESSAGE))
                            .await
                        {
                            Ok(_) => info!("job {} marked failed for later recovery", job.id),
                            Err(e) => error!("failed to mark job {} at shutdown: {}", job.id, e),
                        }
                    }
                    return Ok(());
                }

                result = async {
                    match active.as_mut() {
                        Some(job) => (&mut job.handle).await,
                        None => std::future::pending().await,
                    }
                } => {
                    let job = active.take().expect("job future only completes when active");
                    self.handle_job_result(job.id, result).await;
                }

                notification = notifications.recv() => {
                    match notification {
                        Some(JobNotification::Inserted(job)) => {
                            if job.status == JobStatus::Pending {
                                if active.is_some() {
                                    debug!("job {} queued behind the active crawl", job.id);
                                }
                                // The idle check at the top of the loop picks
                                // it up in creation order.
                            }
                        }
                        Some(JobNotification::Updated(job)) => {
                            if let Some(current) = &active {
                                if current.id == job.id
                                    && matches!(
                                        job.status,
                                        JobStatus::Cancelled | JobStatus::Completed
                                    )
                                {
                                    info!(
                                        "active job {} flipped to {} externally, cancelling",
                                        job.id,
                                        job.status.as_str()
                                    );
                                    current.cancel.store(true, Ordering::Relaxed);
                                }
                            }
                        }
                        None => {
                            warn!("notification stream closed; relying on polling");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }

                _ = pending_poll.tick() => {
                    // Poll backstop: the idle check at the loop top drains.
                }

                _ = resume_poll.tick() => {
                    self.auto_resume_failed_jobs().await;
                }
            }
        }
    }

    /// Flip abandoned `processing` jobs back to `pending`.
    async fn recover_stale_jobs(&self) {
        let cutoff =
            Utc::now() - chrono::Duration::seconds(self.config.crawler.stale_job_threshold_secs);
        match self
            .store
            .requeue_stale_jobs(cutoff, "Recovered after worker restart")
            .await
        {
            Ok(requeued) if !requeued.is_empty() => {
                info!("requeued {} stale jobs: {:?}", requeued.len(), requeued)
            }
            Ok(_) => {}
            Err(e) => error!("stale job recovery failed: {}", e),
        }
    }

    /// Create resume jobs for recently failed runs with substantial
    /// progress. Resume jobs cannot themselves be resumed.
    async fn auto_resume_failed_jobs(&self) {
        let since = Utc::now() - chrono::Duration::seconds(RESUME_WINDOW_SECS);
        let failed = match self
            .store
            .recent_failed_jobs(since, RESUME_MIN_PAGES, RESUME_BATCH)
            .await
        {
            Ok(jobs) => jobs,
            Err(e) => {
                error!("auto-resume sweep failed: {}", e);
                return;
            }
        };

        for job in failed {
            if job.is_resume() {
                debug!("job {} is itself a resume, not chaining", job.id);
                continue;
            }
            match self.store.project_has_active_job(job.project_id).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    warn!("active-job check failed for project {}: {}", job.project_id, e);
                    continue;
                }
            }
            let skip_urls = match self.store.crawled_urls(job.id).await {
                Ok(urls) => urls,
                Err(e) => {
                    warn!("could not load crawled URLs for job {}: {}", job.id, e);
                    continue;
                }
            };

            let mut settings = job.settings.clone();
            settings.resume_info = Some(ResumeInfo {
                resumed_from: job.id,
                skip_urls,
                original_pages_crawled: job.pages_crawled,
                original_pages_failed: job.pages_failed,
                original_pages_discovered: job.pages_discovered,
            });

            match self.store.create_job(job.project_id, &settings).await {
                Ok(new_id) => info!("created resume job {} for failed job {}", new_id, job.id),
                Err(e) => error!("failed to create resume job for {}: {}", job.id, e),
            }
        }
    }

    /// Claim and launch the oldest pending job, if any.
    async fn start_next_pending(&self) -> Option<ActiveJob> {
        let job = match self.store.oldest_pending_job().await {
            Ok(Some(job)) => job,
            Ok(None) => return None,
            Err(e) => {
                error!("pending job lookup failed: {}", e);
                return None;
            }
        };

        match self.store.claim_job(job.id).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("job {} was claimed elsewhere", job.id);
                return None;
            }
            Err(e) => {
                error!("failed to claim job {}: {}", job.id, e);
                return None;
            }
        }

        let project = match self.store.get_project(job.project_id).await {
            Ok(Some(project)) => project,
            Ok(None) => {
                let message = format!("project {} not found", job.project_id);
                error!("job {}: {}", job.id, message);
                let _ = self
                    .store
                    .finish_job(job.id, JobStatus::Failed, Some(&message))
                    .await;
                return None;
            }
            Err(e) => {
                error!("project lookup failed for job {}: {}", job.id, e);
                let _ = self
                    .store
                    .finish_job(job.id, JobStatus::Failed, Some(&e.to_string()))
                    .await;
                return None;
            }
        };

        info!("starting job {} for {}", job.id, project.domain);
        self.launch(job, project)
    }

    fn launch(&self, job: CrawlJob, project: crate::types::Project) -> Option<ActiveJob> {
        let job_id = job.id;
        let mut orchestrator = CrawlOrchestrator::new(
            job,
            project,
            Arc::clone(&self.store),
            Arc::clone(&self.browser),
            self.config.clone(),
        );
        if let Some(setup) = &self.setup {
            orchestrator = setup(orchestrator);
        }
        let cancel = orchestrator.cancel_flag();
        let handle = tokio::spawn(async move { orchestrator.run().await });
        Some(ActiveJob {
            id: job_id,
            cancel,
            handle,
        })
    }

    async fn handle_job_result(
        &self,
        job_id: Uuid,
        result: std::result::Result<Result<CrawlOutcome>, tokio::task::JoinError>,
    ) {
        match result {
            Ok(Ok(CrawlOutcome::Completed)) => {
                info!("job {} completed", job_id);
            }
            Ok(Ok(CrawlOutcome::Cancelled)) => {
                // The terminal status was written by whoever requested the
                // cancel; nothing to add here.
                info!("job {} stopped after cooperative cancel", job_id);
            }
            Ok(Err(e)) => {
                error!("job {} failed: {:#}", job_id, e);
                let _ = self
                    .store
                    .finish_job(job_id, JobStatus::Failed, Some(&format!("{:#}", e)))
                    .await;
            }
            Err(join_error) => {
                error!("job {} crawl task aborted: {}", job_id, join_error);
                let _ = self
                    .store
                    .finish_job(job_id, JobStatus::Failed, Some("crawl task aborted"))
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::ai_search::GuidanceProbe;
    use crate::config::{CrawlSettings, CrawlerConfig, LoggingConfig, OracleConfig, StoreConfig};
    use crate::crawl::browser::{StaticBrowser, StaticPage};
    use crate::crawl::robots::RobotsPolicy;
    use crate::store::InMemoryJobStore;

    fn test_config() -> Config {
        Config {
            store: StoreConfig {
                url: "memory://".to_string(),
                service_key: "test".to_string(),
            },
            oracle: OracleConfig::default(),
            crawler: CrawlerConfig {
                retry_base_delay_ms: 1,
                pending_poll_secs: 1,
                resume_retry_secs: 3600,
                ..Default::default()
            },
            logging: LoggingConfig::default(),
        }
    }

    fn offline_setup() -> OrchestratorSetup {
        Box::new(|orchestrator| {
            orchestrator
                .with_robots_policy(RobotsPolicy::permissive())
                .with_sitemap_entries(Vec::new())
                .with_guidance_probe(GuidanceProbe::default())
        })
    }

    fn site_browser() -> StaticBrowser {
        StaticBrowser::new()
            .with_page(
                "https://ex.test/",
                StaticPage::html(
                    r#"<html><head><title>Example home page title</title></head>
                       <body><h1>Home</h1><a href="/about">About</a></body></html>"#,
                ),
            )
            .with_page(
                "https://ex.test/about",
                StaticPage::html("<html><head><title>About</title></head><body><h1>About</h1></body></html>"),
            )
    }

    fn job_row(project_id: Uuid, status: JobStatus) -> CrawlJob {
        CrawlJob {
            id: Uuid::new_v4(),
            project_id,
            status,
            started_at: None,
            completed_at: None,
            pages_discovered: 0,
            pages_crawled: 0,
            pages_failed: 0,
            error_message: None,
            settings: CrawlSettings {
                max_pages: 10,
                max_depth: 2,
                crawl_delay_ms: 1,
                ..CrawlSettings::default()
            },
            created_at: Utc::now(),
        }
    }

    fn controller(
        store: &Arc<InMemoryJobStore>,
        browser: StaticBrowser,
    ) -> (JobController, broadcast::Sender<()>) {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let controller = JobController::new(
            store.clone() as Arc<dyn JobStore>,
            Arc::new(browser),
            test_config(),
            shutdown_rx,
        )
        .with_orchestrator_setup(offline_setup());
        (controller, shutdown_tx)
    }

    async fn wait_for<F: Fn() -> bool>(condition: F, timeout_ms: u64) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
        while tokio::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    #[tokio::test]
    async fn stale_processing_job_is_recovered_and_rerun() {
        let store = Arc::new(InMemoryJobStore::new());
        let project = crate::types::Project {
            id: Uuid::new_v4(),
            domain: "ex.test".to_string(),
        };
        store.insert_project(project.clone());

        // A job abandoned mid-crawl ten minutes ago
        let mut stale = job_row(project.id, JobStatus::Processing);
        stale.started_at = Some(Utc::now() - chrono::Duration::minutes(10));
        let stale_id = stale.id;
        store.insert_job_silent(stale);

        let (controller, shutdown_tx) = controller(&store, site_browser());
        let handle = tokio::spawn(controller.run());

        let completed = wait_for(
            || {
                store
                    .job(stale_id)
                    .map(|j| j.status == JobStatus::Completed)
                    .unwrap_or(false)
            },
            5000,
        )
        .await;
        assert!(completed, "recovered job did not complete");
        assert!(store.job(stale_id).unwrap().pages_crawled >= 2);

        let _ = shutdown_tx.send(());
        let _ = handle.await;
    }

    #[tokio::test]
    async fn pending_notification_starts_job() {
        let store = Arc::new(InMemoryJobStore::new());
        let project = crate::types::Project {
            id: Uuid::new_v4(),
            domain: "ex.test".to_string(),
        };
        store.insert_project(project.clone());

        let (controller, shutdown_tx) = controller(&store, site_browser());
        let handle = tokio::spawn(controller.run());
        tokio::time::sleep(Duration::from_millis(50)).await;

        let job = job_row(project.id, JobStatus::Pending);
        let job_id = job.id;
        store.insert_job(job);

        let completed = wait_for(
            || {
                store
                    .job(job_id)
                    .map(|j| j.status == JobStatus::Completed)
                    .unwrap_or(false)
            },
            5000,
        )
        .await;
        assert!(completed, "notified job did not run to completion");

        let _ = shutdown_tx.send(());
        let _ = handle.await;
    }

    #[tokio::test]
    async fn external_cancel_stops_active_job() {
        let store = Arc::new(InMemoryJobStore::new());
        let project = crate::types::Project {
            id: Uuid::new_v4(),
            domain: "ex.test".to_string(),
        };
        store.insert_project(project.clone());

        // Slow crawl so the cancel lands mid-run
        let mut job = job_row(project.id, JobStatus::Pending);
        job.settings.crawl_delay_ms = 200;
        let job_id = job.id;
        store.insert_job_silent(job);

        let (controller, shutdown_tx) = controller(&store, site_browser());
        let handle = tokio::spawn(controller.run());

        assert!(
            wait_for(
                || store
                    .job(job_id)
                    .map(|j| j.status == JobStatus::Processing)
                    .unwrap_or(false),
                2000,
            )
            .await,
            "job never started"
        );

        store.set_status_external(job_id, JobStatus::Cancelled);

        assert!(
            wait_for(
                || store.job(job_id).map(|j| j.status == JobStatus::Cancelled).unwrap_or(false),
                3000,
            )
            .await
        );
        // The orchestrator never overwrites the user's terminal status
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(store.job(job_id).unwrap().status, JobStatus::Cancelled);

        let _ = shutdown_tx.send(());
        let _ = handle.await;
    }

    #[tokio::test]
    async fn failed_job_with_progress_is_resumed() {
        let store = Arc::new(InMemoryJobStore::new());
        let project = crate::types::Project {
            id: Uuid::new_v4(),
            domain: "ex.test".to_string(),
        };
        store.insert_project(project.clone());

        // Failed 10 minutes ago with 12 pages crawled
        let mut failed = job_row(project.id, JobStatus::Failed);
        failed.pages_crawled = 12;
        failed.pages_discovered = 20;
        failed.completed_at = Some(Utc::now() - chrono::Duration::minutes(10));
        let failed_id = failed.id;
        store.insert_job_silent(failed);

        // Pages the failed run already wrote
        let done = crate::types::PageRecord::error_record(
            "https://ex.test/already-done",
            200,
            Some("text/html".to_string()),
            10,
            "",
        );
        store.upsert_page(failed_id, &done).await.unwrap();

        let (controller, shutdown_tx) = controller(&store, site_browser());
        let handle = tokio::spawn(controller.run());

        // The resume job is created at start-up and then drained
        let resumed = wait_for(|| resume_job_of(&store, failed_id).is_some(), 3000).await;
        assert!(resumed, "no resume job was created");

        let resume_job_id = resume_job_of(&store, failed_id).unwrap();
        let completed = wait_for(
            || {
                store
                    .job(resume_job_id)
                    .map(|j| j.status == JobStatus::Completed)
                    .unwrap_or(false)
            },
            5000,
        )
        .await;
        assert!(completed, "resume job did not complete");

        // The skip URL was never re-fetched
        let urls = store.crawled_urls(resume_job_id).await.unwrap();
        assert!(!urls.iter().any(|u| u.contains("already-done")));

        let _ = shutdown_tx.send(());
        let _ = handle.await;
    }

    fn resume_job_of(store: &InMemoryJobStore, resumed_from: Uuid) -> Option<Uuid> {
        store
            .all_jobs()
            .into_iter()
            .find(|j| {
                j.settings
                    .resume_info
                    .as_ref()
                    .map(|r| r.resumed_from == resumed_from)
                    .unwrap_or(false)
            })
            .map(|j| j.id)
    }

    #[tokio::test]
    async fn shutdown_marks_active_job_failed() {
        let store = Arc::new(InMemoryJobStore::new());
        let project = crate::types::Project {
            id: Uuid::new_v4(),
            domain: "ex.test".to_string(),
        };
        store.insert_project(project.clone());

        let mut job = job_row(project.id, JobStatus::Pending);
        job.settings.crawl_delay_ms = 300;
        let job_id = job.id;
        store.insert_job_silent(job);

        let (controller, shutdown_tx) = controller(&store, site_browser());
        let handle = tokio::spawn(controller.run());

        assert!(
            wait_for(
                || store
                    .job(job_id)
                    .map(|j| j.status == JobStatus::Processing)
                    .unwrap_or(false),
                2000,
            )
            .await
        );

        let _ = shutdown_tx.send(());
        let _ = handle.await;

        let job = store.job(job_id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some(SHUTDOWN_MESSAGE));
    }
}
