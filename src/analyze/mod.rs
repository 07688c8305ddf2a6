//! Post-crawl analysis
//!
//! Runs after the frontier drains: flushes the backref table, applies the
//! graph-wide checks (orphans, depth outliers, dead ends, excessive
//! outbound), and computes the health score and category scores written to
//! the job. Sub-analyzer failures are logged and skipped; they never change
//! the job's terminal status.

pub mod ai_search;
pub mod health;
pub mod oracle;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::issues::IssueCatalogue;
use crate::store::JobStore;
use crate::types::{CrawlJob, DiscoverySource, JobResults, PageRecord};

/// Depth beyond which a page is hard to reach.
const TOO_DEEP: u32 = 4;
/// Depth beyond which a page is practically unreachable.
const VERY_DEEP: u32 = 7;
/// Outbound internal links beyond which a page dilutes link equity.
const HIGH_OUTBOUND: usize = 150;

pub struct PostCrawlAnalyzer {
    store: Arc<dyn JobStore>,
    catalogue: IssueCatalogue,
}

impl PostCrawlAnalyzer {
    pub fn new(store: Arc<dyn JobStore>, catalogue: IssueCatalogue) -> Self {
        Self { store, catalogue }
    }

    /// Flush incoming-link counts and apply the graph-wide page checks.
    pub async fn run(
        &self,
        crawl_id: Uuid,
        incoming_links: &HashMap<String, u32>,
    ) -> Result<(), crate::store::StoreError> {
        self.store
            .set_incoming_links(crawl_id, incoming_links)
            .await?;

        let pages = self.store.crawl_pages(crawl_id).await?;
        info!("post-crawl analysis over {} pages", pages.len());

        for (page_id, page) in &pages {
            if page.is_fetch_error() {
                continue;
            }
            self.apply_depth_and_link_checks(crawl_id, *page_id, page).await;
            self.apply_orphan_check(crawl_id, *page_id, page, incoming_links)
                .await;
        }

        Ok(())
    }

    async fn apply_depth_and_link_checks(&self, crawl_id: Uuid, page_id: Uuid, page: &PageRecord) {
        if page.page_depth > VERY_DEEP {
            self.emit(crawl_id, page_id, "page_very_deep", json!({ "depth": page.page_depth }))
                .await;
        } else if page.page_depth > TOO_DEEP {
            self.emit(crawl_id, page_id, "page_too_deep", json!({ "depth": page.page_depth }))
                .await;
        }

        if page.internal_links.is_empty() {
            self.emit(crawl_id, page_id, "dead_end_page", json!({})).await;
        }
        if page.internal_links_count() > HIGH_OUTBOUND {
            self.emit(
                crawl_id,
                page_id,
                "high_outbound_links",
                json!({ "count": page.internal_links_count() }),
            )
            .await;
        }
    }

    /// Orphans: zero incoming internal links, not the root, indexable
    /// status. Sitemap-discovered pages get the softer notice.
    async fn apply_orphan_check(
        &self,
        crawl_id: Uuid,
        page_id: Uuid,
        page: &PageRecord,
        incoming_links: &HashMap<String, u32>,
    ) {
        let received = incoming_links.get(&page.url).copied().unwrap_or(0);
        if received > 0
            || page.page_depth == 0
            || !(200..400).contains(&page.status_code)
        {
            return;
        }

        match page.discovered_via {
            DiscoverySource::Sitemap => {
                self.emit(crawl_id, page_id, "sitemap_only_page", json!({})).await
            }
            DiscoverySource::Crawl => {
                self.emit(crawl_id, page_id, "orphan_page", json!({})).await
            }
            DiscoverySource::Seed => {}
        }
    }

    async fn emit(&self, crawl_id: Uuid, page_id: Uuid, code: &str, details: serde_json::Value) {
        let Some(definition) = self.catalogue.resolve(code) else {
            debug!("post-crawl code {} absent from catalogue, dropped", code);
            return;
        };
        if let Err(e) = self
            .store
            .record_issue(crawl_id, page_id, definition, &details)
            .await
        {
            warn!("failed to record {} for page {}: {}", code, page_id, e);
        }
    }

    /// Compute the finalize aggregates for the job row.
    pub async fn finalize(
        &self,
        job: &CrawlJob,
        pages_discovered: u64,
        pages_crawled: u64,
        pages_failed: u64,
    ) -> Result<JobResults, crate::store::StoreError> {
        let aggregates = self.store.issue_totals(job.id).await?;
        let totals = health::severity_totals(&aggregates);
        let category_scores = health::category_scores(&aggregates);
        let health_score = health::score(totals);

        let error_pages = self.store.error_page_count(job.id).await?;
        let passed_count = pages_crawled.saturating_sub(error_pages);

        let progress_percentage = if pages_discovered == 0 {
            100.0
        } else {
            ((pages_crawled + pages_failed) as f64 / pages_discovered as f64 * 100.0).min(100.0)
        };

        let duration_seconds = job
            .started_at
            .map(|start| (Utc::now() - start).num_seconds().max(0))
            .unwrap_or(0);

        Ok(JobResults {
            pages_discovered,
            pages_crawled,
            pages_failed,
            progress_percentage,
            duration_seconds,
            health_score,
            total_issues: totals.total(),
            errors_count: totals.errors,
            warnings_count: totals.warnings,
            notices_count: totals.notices,
            passed_count,
            category_scores,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issues::default_definitions;
    use crate::store::InMemoryJobStore;

    fn page(url: &str, depth: u32, via: DiscoverySource) -> PageRecord {
        let mut page = PageRecord::error_record(url, 200, None, 10, "");
        page.content_type = Some("text/html".to_string());
        page.is_indexable = true;
        page.indexability_reason = None;
        page.page_depth = depth;
        page.discovered_via = via;
        page.internal_links = vec!["https://ex.test/".to_string()];
        page
    }

    async fn run_analyzer(
        pages: Vec<PageRecord>,
        incoming: HashMap<String, u32>,
    ) -> (Arc<InMemoryJobStore>, Uuid) {
        let store = Arc::new(InMemoryJobStore::new());
        let crawl_id = Uuid::new_v4();
        for p in &pages {
            store.upsert_page(crawl_id, p).await.unwrap();
        }
        let catalogue =
            IssueCatalogue::from_definitions(store.issue_definitions().await.unwrap());
        let analyzer = PostCrawlAnalyzer::new(store.clone(), catalogue);
        analyzer.run(crawl_id, &incoming).await.unwrap();
        (store, crawl_id)
    }

    #[tokio::test]
    async fn depth_flags() {
        let pages = vec![
            page("https://ex.test/shallow", 2, DiscoverySource::Crawl),
            page("https://ex.test/deep", 6, DiscoverySource::Crawl),
            page("https://ex.test/abyss", 9, DiscoverySource::Crawl),
        ];
        let incoming: HashMap<String, u32> = pages
            .iter()
            .map(|p| (p.url.clone(), 1u32))
            .collect();
        let (store, crawl_id) = run_analyzer(pages, incoming).await;

        assert!(store
            .page_issue_codes(crawl_id, "https://ex.test/deep")
            .contains(&"page_too_deep".to_string()));
        assert!(store
            .page_issue_codes(crawl_id, "https://ex.test/abyss")
            .contains(&"page_very_deep".to_string()));
        assert!(store
            .page_issue_codes(crawl_id, "https://ex.test/shallow")
            .is_empty());
    }

    #[tokio::test]
    async fn dead_end_and_high_outbound() {
        let mut dead_end = page("https://ex.test/dead", 1, DiscoverySource::Crawl);
        dead_end.internal_links.clear();
        let mut hub = page("https://ex.test/hub", 1, DiscoverySource::Crawl);
        hub.internal_links = (0..200)
            .map(|i| format!("https://ex.test/p{}", i))
            .collect();
        let incoming: HashMap<String, u32> = [
            ("https://ex.test/dead".to_string(), 1u32),
            ("https://ex.test/hub".to_string(), 1u32),
        ]
        .into_iter()
        .collect();
        let (store, crawl_id) = run_analyzer(vec![dead_end, hub], incoming).await;

        assert!(store
            .page_issue_codes(crawl_id, "https://ex.test/dead")
            .contains(&"dead_end_page".to_string()));
        assert!(store
            .page_issue_codes(crawl_id, "https://ex.test/hub")
            .contains(&"high_outbound_links".to_string()));
    }

    #[tokio::test]
    async fn orphan_split_by_discovery_source() {
        let sitemap_orphan = page("https://ex.test/orphan-sm", 1, DiscoverySource::Sitemap);
        let crawl_orphan = page("https://ex.test/orphan-cr", 1, DiscoverySource::Crawl);
        let seed = page("https://ex.test/", 0, DiscoverySource::Seed);
        let (store, crawl_id) =
            run_analyzer(vec![sitemap_orphan, crawl_orphan, seed], HashMap::new()).await;

        let sitemap_codes = store.page_issue_codes(crawl_id, "https://ex.test/orphan-sm");
        assert!(sitemap_codes.contains(&"sitemap_only_page".to_string()));
        assert!(!sitemap_codes.contains(&"orphan_page".to_string()));

        let crawl_codes = store.page_issue_codes(crawl_id, "https://ex.test/orphan-cr");
        assert!(crawl_codes.contains(&"orphan_page".to_string()));

        assert!(store
            .page_issue_codes(crawl_id, "https://ex.test/")
            .is_empty());
    }

    #[tokio::test]
    async fn linked_pages_are_not_orphans() {
        let linked = page("https://ex.test/linked", 1, DiscoverySource::Sitemap);
        let incoming: HashMap<String, u32> =
            [("https://ex.test/linked".to_string(), 3u32)].into_iter().collect();
        let (store, crawl_id) = run_analyzer(vec![linked], incoming).await;
        assert!(store
            .page_issue_codes(crawl_id, "https://ex.test/linked")
            .is_empty());
    }

    #[tokio::test]
    async fn finalize_computes_scores() {
        let store = Arc::new(InMemoryJobStore::new());
        let crawl_id = Uuid::new_v4();
        let job = CrawlJob {
            id: crawl_id,
            project_id: Uuid::new_v4(),
            status: crate::types::JobStatus::Processing,
            started_at: Some(Utc::now()),
            completed_at: None,
            pages_discovered: 0,
            pages_crawled: 0,
            pages_failed: 0,
            error_message: None,
            settings: crate::config::CrawlSettings::default(),
            created_at: Utc::now(),
        };
        store.insert_job_silent(job.clone());

        let p = page("https://ex.test/a", 1, DiscoverySource::Crawl);
        let page_id = store.upsert_page(crawl_id, &p).await.unwrap();
        let definitions = store.issue_definitions().await.unwrap();
        let warning = definitions
            .iter()
            .find(|d| d.code == "CONTENT_TITLE_TOO_SHORT")
            .unwrap();
        store
            .record_issue(crawl_id, page_id, warning, &json!({}))
            .await
            .unwrap();

        let catalogue = IssueCatalogue::from_definitions(definitions);
        let analyzer = PostCrawlAnalyzer::new(store.clone(), catalogue);
        let results = analyzer.finalize(&job, 2, 1, 0).await.unwrap();

        assert_eq!(results.health_score, 98);
        assert_eq!(results.total_issues, 1);
        assert_eq!(results.warnings_count, 1);
        assert_eq!(results.passed_count, 1);
        assert_eq!(results.category_scores["content"], 98);
        assert!(results.progress_percentage > 0.0);
    }
}
