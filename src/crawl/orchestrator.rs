//! Crawl orchestration
//!
//! Owns the frontier, visited set, and backref table for one job and runs
//! the discovery -> fetch -> extract -> detect pipeline serially under the
//! politeness delay. The orchestrator publishes progress after every page
//! and honors cooperative cancellation: the in-flight fetch finishes, the
//! loop exits before finalization, and cleanup still runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::{debug, info, warn};
use url::Url;

use crate::analyze::ai_search::{AiSearchAnalyzer, GuidanceProbe};
use crate::analyze::oracle::PerformanceOracle;
use crate::analyze::PostCrawlAnalyzer;
use crate::config::Config;
use crate::extract::Extractor;
use crate::issues::{IssueCatalogue, IssueDetector};
use crate::store::JobStore;
use crate::types::{CrawlJob, CrawlProgress, DiscoverySource, JobStatus, Project};

use super::browser::BrowserContext;
use super::fetcher::PageFetcher;
use super::frontier::{Frontier, FrontierEntry};
use super::robots::RobotsPolicy;
use super::sitemap::{SitemapEntry, SitemapReader};
use super::url::{host_in_scope, normalize, seo_skip_reason};

/// How a finished run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlOutcome {
    Completed,
    Cancelled,
}

/// Orchestrates one crawl job end to end.
pub struct CrawlOrchestrator {
    job: CrawlJob,
    project: Project,
    store: Arc<dyn JobStore>,
    browser: Arc<dyn BrowserContext>,
    config: Config,
    cancelled: Arc<AtomicBool>,

    frontier: Frontier,
    incoming_links: HashMap<String, u32>,
    pages_discovered: u64,
    pages_crawled: u64,
    pages_failed: u64,

    robots: RobotsPolicy,

    // Test seams: pre-supplied collaborator outputs skip the network.
    robots_override: Option<RobotsPolicy>,
    sitemap_override: Option<Vec<SitemapEntry>>,
    guidance_override: Option<GuidanceProbe>,
}

impl CrawlOrchestrator {
    pub fn new(
        job: CrawlJob,
        project: Project,
        store: Arc<dyn JobStore>,
        browser: Arc<dyn BrowserContext>,
        config: Config,
    ) -> Self {
        Self {
            job,
            project,
            store,
            browser,
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
            frontier: Frontier::new(),
            incoming_links: HashMap::new(),
            pages_discovered: 0,
            pages_crawled: 0,
            pages_failed: 0,
            robots: RobotsPolicy::permissive(),
            robots_override: None,
            sitemap_override: None,
            guidance_override: None,
        }
    }

    /// Handle the controller flips to request cooperative cancellation.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn with_robots_policy(mut self, policy: RobotsPolicy) -> Self {
        self.robots_override = Some(policy);
        self
    }

    pub fn with_sitemap_entries(mut self, entries: Vec<SitemapEntry>) -> Self {
        self.sitemap_override = Some(entries);
        self
    }

    pub fn with_guidance_probe(mut self, probe: GuidanceProbe) -> Self {
        self.guidance_override = Some(probe);
        self
    }

    fn user_agent(&self) -> String {
        self.job
            .settings
            .user_agent
            .clone()
            .unwrap_or_else(|| self.config.crawler.user_agent.clone())
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Admission filter, applied in a fixed order. Returns whether the URL
    /// entered the frontier.
    fn admit(
        &mut self,
        raw_url: &str,
        depth: u32,
        parent: Option<&str>,
        source: DiscoverySource,
    ) -> bool {
        let Some(normalized) = normalize(raw_url) else {
            return false;
        };
        if self.frontier.is_seen(&normalized) {
            return false;
        }
        let settings = &self.job.settings;
        if depth > settings.max_depth {
            return false;
        }
        if self.frontier.discovered_count() >= settings.max_pages as usize {
            return false;
        }
        let Ok(parsed) = Url::parse(&normalized) else {
            return false;
        };
        if settings.respect_robots_txt && !self.robots.is_allowed(&parsed) {
            debug!("robots disallows {}", normalized);
            return false;
        }
        if !settings.include_patterns.is_empty()
            && !settings
                .include_patterns
                .iter()
                .any(|p| normalized.contains(p.as_str()))
        {
            return false;
        }
        if settings
            .exclude_patterns
            .iter()
            .any(|p| normalized.contains(p.as_str()))
        {
            return false;
        }
        let Some(host) = parsed.host_str() else {
            return false;
        };
        if !host_in_scope(host, &self.project.domain, settings.follow_subdomains) {
            return false;
        }
        if let Some(reason) = seo_skip_reason(&parsed) {
            debug!("skipping {}: {}", normalized, reason);
            return false;
        }

        let accepted = self.frontier.push(FrontierEntry {
            url: normalized,
            depth,
            parent: parent.map(|p| p.to_string()),
            source,
        });
        if accepted {
            self.pages_discovered += 1;
        }
        accepted
    }

    /// Run the job to completion or cancellation.
    pub async fn run(&mut self) -> Result<CrawlOutcome> {
        let user_agent = self.user_agent();
        let http = reqwest::Client::builder()
            .user_agent(&user_agent)
            .build()
            .map_err(|e| anyhow!("failed to build HTTP client: {}", e))?;

        let definitions = self
            .store
            .issue_definitions()
            .await
            .map_err(|e| anyhow!("failed to load issue catalogue: {}", e))?;
        if definitions.is_empty() {
            return Err(anyhow!("issue catalogue is empty"));
        }
        let catalogue = IssueCatalogue::from_definitions(definitions);
        let detector = IssueDetector::new(catalogue.clone());

        let fetcher = PageFetcher::new(
            Arc::clone(&self.browser),
            Extractor::new(&self.project.domain),
            self.job.settings.render_javascript,
            Duration::from_secs(self.config.crawler.navigation_timeout_secs),
            Duration::from_millis(self.config.crawler.retry_base_delay_ms),
            self.config.crawler.max_retries,
        );

        // Resume: skip URLs enter both sets so they are never re-fetched.
        if let Some(resume) = self.job.settings.resume_info.clone() {
            let skip: Vec<String> = resume
                .skip_urls
                .iter()
                .filter_map(|u| normalize(u))
                .collect();
            info!(
                "resuming job {} from {}: {} URLs pre-visited",
                self.job.id,
                resume.resumed_from,
                skip.len()
            );
            self.frontier.preload_visited(&skip);
            self.pages_discovered = resume.original_pages_discovered;
        }

        // Seed before discovery sources so BFS starts at the root.
        let seed_url = format!("https://{}/", self.project.domain);
        self.admit(&seed_url, 0, None, DiscoverySource::Seed);

        self.robots = match self.robots_override.take() {
            Some(policy) => policy,
            None => RobotsPolicy::fetch(&http, &self.project.domain, &user_agent).await,
        };

        let sitemap_entries = match self.sitemap_override.take() {
            Some(entries) => entries,
            None => {
                let reader = SitemapReader::new(
                    http.clone(),
                    &self.project.domain,
                    self.config.crawler.sitemap_url_cap,
                    Duration::from_secs(self.config.crawler.sitemap_timeout_secs),
                );
                reader.collect(self.robots.sitemaps()).await
            }
        };
        for entry in &sitemap_entries {
            self.admit(&entry.loc, 1, None, DiscoverySource::Sitemap);
        }
        info!(
            "job {} seeded: {} in frontier ({} from sitemaps)",
            self.job.id,
            self.frontier.pending_count(),
            sitemap_entries.len()
        );

        let delay = self.effective_delay();

        while let Some(entry) = self.frontier.pop() {
            if self.is_cancelled() {
                info!("job {} cancelled, stopping before next fetch", self.job.id);
                return Ok(CrawlOutcome::Cancelled);
            }
            // Admission race: an entry queued twice is fetched once.
            if !self.frontier.mark_visited(&entry.url) {
                continue;
            }

            let Ok(url) = Url::parse(&entry.url) else {
                continue;
            };
            let mut record = fetcher.crawl(&url).await;
            record.page_depth = entry.depth;
            record.discovered_via = entry.source;

            if record.is_fetch_error() {
                self.pages_failed += 1;
            } else {
                self.pages_crawled += 1;
            }

            match self.store.upsert_page(self.job.id, &record).await {
                Ok(page_id) => {
                    for link in &record.internal_links {
                        if let Some(normalized) = normalize(link) {
                            *self.incoming_links.entry(normalized).or_insert(0) += 1;
                        }
                    }
                    let links: Vec<String> = record.internal_links.clone();
                    for link in links {
                        self.admit(&link, entry.depth + 1, Some(&entry.url), DiscoverySource::Crawl);
                    }

                    for issue in detector.detect(&record) {
                        if let Err(e) = self
                            .store
                            .record_issue(self.job.id, page_id, &issue.definition, &issue.details)
                            .await
                        {
                            warn!(
                                "failed to record issue {} on {}: {}",
                                issue.definition.code, record.url, e
                            );
                        }
                    }
                }
                Err(e) => {
                    warn!("failed to persist page {}: {}", record.url, e);
                }
            }

            let progress = CrawlProgress {
                pages_discovered: self.pages_discovered,
                pages_crawled: self.pages_crawled,
                pages_failed: self.pages_failed,
                current_url: Some(entry.url.clone()),
            };
            if let Err(e) = self.store.update_progress(self.job.id, &progress).await {
                warn!("failed to update progress for job {}: {}", self.job.id, e);
            }

            if !self.frontier.is_empty() {
                tokio::time::sleep(delay).await;
            }
        }

        if self.is_cancelled() {
            return Ok(CrawlOutcome::Cancelled);
        }

        self.finalize(&http, catalogue).await?;
        Ok(CrawlOutcome::Completed)
    }

    /// `max(robots crawl-delay, configured delay)`.
    fn effective_delay(&self) -> Duration {
        let configured = Duration::from_millis(self.job.settings.crawl_delay_ms);
        match self.robots.crawl_delay() {
            Some(declared) if declared > configured => declared,
            _ => configured,
        }
    }

    /// Post-crawl analyses and the finalize writes. Sub-analyzer failures
    /// are logged and skipped; the terminal status is a CAS that loses to
    /// any status the user already wrote.
    async fn finalize(&mut self, http: &reqwest::Client, catalogue: IssueCatalogue) -> Result<()> {
        let analyzer = PostCrawlAnalyzer::new(Arc::clone(&self.store), catalogue);

        if let Err(e) = analyzer.run(self.job.id, &self.incoming_links).await {
            warn!("post-crawl analysis failed for job {}: {}", self.job.id, e);
        }

        if let Some(api_key) = self.config.oracle.api_key.clone() {
            let oracle = PerformanceOracle::new(
                http.clone(),
                api_key,
                Duration::from_secs(self.config.oracle.timeout_secs),
            );
            let homepage = format!("https://{}/", self.project.domain);
            if let Some(audit) = oracle.audit(&homepage).await {
                if let Err(e) = self.store.save_performance_audit(self.job.id, &audit).await {
                    warn!("failed to save performance audit: {}", e);
                }
            }
        }

        match self.store.crawl_pages(self.job.id).await {
            Ok(pages) => {
                let ai = AiSearchAnalyzer::new(
                    http.clone(),
                    Duration::from_secs(self.config.crawler.probe_timeout_secs),
                );
                let probe = match self.guidance_override.take() {
                    Some(probe) => probe,
                    None => ai.probe(&self.project.domain).await,
                };
                let records: Vec<_> = pages.into_iter().map(|(_, p)| p).collect();
                let audit = AiSearchAnalyzer::evaluate(probe, &self.robots, &records);
                if let Err(e) = self.store.save_ai_search_audit(self.job.id, &audit).await {
                    warn!("failed to save AI search audit: {}", e);
                }
            }
            Err(e) => warn!("skipping AI search analysis: {}", e),
        }

        let results = analyzer
            .finalize(
                &self.job,
                self.pages_discovered,
                self.pages_crawled,
                self.pages_failed,
            )
            .await
            .map_err(|e| anyhow!("failed to compute job results: {}", e))?;

        self.store
            .update_job_results(self.job.id, &results)
            .await
            .map_err(|e| anyhow!("failed to write job results: {}", e))?;

        let wrote = self
            .store
            .finish_job(self.job.id, JobStatus::Completed, None)
            .await
            .map_err(|e| anyhow!("failed to write terminal status: {}", e))?;
        if !wrote {
            info!(
                "job {} already carried a terminal status; counters updated only",
                self.job.id
            );
        }

        Ok(())
    }
}
