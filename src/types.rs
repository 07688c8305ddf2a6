//! Core data model shared across the crawl pipeline and the job store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::CrawlSettings;

/// Lifecycle state of a crawl job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal states are written at most once.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

/// One audit run for one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlJob {
    pub id: Uuid,
    pub project_id: Uuid,
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub pages_discovered: u64,
    pub pages_crawled: u64,
    pub pages_failed: u64,
    pub error_message: Option<String>,
    /// Policy snapshot taken when the job was created.
    pub settings: CrawlSettings,
    pub created_at: DateTime<Utc>,
}

impl CrawlJob {
    /// True when this job was created as the resume of a failed predecessor.
    pub fn is_resume(&self) -> bool {
        self.settings.resume_info.is_some()
    }
}

/// The site being audited. Read-only to the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    /// Host without a leading `www.`.
    pub domain: String,
}

/// How a URL entered the frontier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    Seed,
    Sitemap,
    Crawl,
}

impl DiscoverySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seed => "seed",
            Self::Sitemap => "sitemap",
            Self::Crawl => "crawl",
        }
    }
}

/// One hop in a redirect chain, recorded from 3xx responses on the
/// navigation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectHop {
    pub url: String,
    pub status_code: u16,
}

/// Best-effort in-page performance timings. Missing metrics are absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreWebVitals {
    pub lcp_ms: Option<f64>,
    pub fcp_ms: Option<f64>,
    pub ttfb_ms: Option<f64>,
    pub cls: Option<f64>,
    pub inp_ms: Option<f64>,
}

/// Aggregate `<img>` statistics for a page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageStats {
    pub total: u32,
    /// `alt` attribute absent entirely.
    pub without_alt: u32,
    /// `alt` present but empty.
    pub with_empty_alt: u32,
}

/// One keyword with its per-mille density over the page body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordDensity {
    pub word: String,
    pub count: u32,
    /// Per-mille density rounded to one decimal (e.g. 12.3 = 1.23%).
    pub density: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingBucket {
    Basic,
    Intermediate,
    Advanced,
    Complex,
}

/// Flesch-Kincaid grade estimate for the page body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingLevel {
    pub grade: i32,
    pub bucket: ReadingBucket,
}

/// One `<link rel="alternate" hreflang>` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HreflangTag {
    pub lang: String,
    pub href: String,
}

/// Hreflang tags plus their validation findings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HreflangAnalysis {
    pub tags: Vec<HreflangTag>,
    pub invalid_lang_codes: Vec<String>,
    pub invalid_region_codes: Vec<String>,
    pub duplicate_langs: Vec<String>,
    pub has_self_reference: bool,
}

/// Article schema extracted from JSON-LD.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArticleData {
    pub headline: Option<String>,
    pub description: Option<String>,
    pub date_published: Option<String>,
    pub date_modified: Option<String>,
    pub image: Option<String>,
    pub author: Option<String>,
    pub author_url: Option<String>,
    pub publisher: Option<String>,
    pub word_count: Option<u64>,
    pub in_language: Option<String>,
    pub main_entity_of_page: Option<String>,
    pub has_body: bool,
}

/// One offer attached to a product schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductOffer {
    pub price: Option<f64>,
    pub currency: Option<String>,
    /// Short form, `schema.org/` prefix stripped.
    pub availability: Option<String>,
    pub price_valid_until: Option<String>,
}

/// Product schema extracted from JSON-LD.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductData {
    pub name: Option<String>,
    pub description: Option<String>,
    pub sku: Option<String>,
    pub brand: Option<String>,
    pub image: Option<String>,
    pub rating_value: Option<f64>,
    pub review_count: Option<u64>,
    pub condition: Option<String>,
    pub offers: Vec<ProductOffer>,
}

/// Mobile-friendliness signals derived from the rendered DOM.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MobileAnalysis {
    pub has_viewport: bool,
    pub viewport_content: Option<String>,
    pub is_zoom_disabled: bool,
    pub initial_scale_not_one: bool,
    pub has_apple_touch_icon: bool,
    pub has_manifest: bool,
    pub has_theme_color: bool,
    pub non_responsive_images: u32,
    pub tables_without_wrapper: u32,
    pub fixed_elements: u32,
    pub has_tel_links: bool,
    pub phone_numbers_in_body: u32,
    pub lcp_candidate_lazy_loaded: bool,
    pub uses_media_queries: bool,
    pub small_text_elements: u32,
}

impl MobileAnalysis {
    /// Coarse verdict used for the persisted `is_mobile_friendly` flag.
    pub fn is_mobile_friendly(&self) -> bool {
        self.has_viewport && !self.is_zoom_disabled && self.uses_media_queries
    }
}

/// One crawled page: transport metadata plus every extracted signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub url: String,
    /// SHA-256 hex of `url`; the upsert key together with the crawl id.
    pub url_hash: String,
    pub path: String,
    pub query_string: Option<String>,
    pub status_code: u16,
    pub redirect_url: Option<String>,
    pub redirect_chain: Vec<RedirectHop>,
    pub content_type: Option<String>,
    pub response_time_ms: u64,
    pub page_size_bytes: u64,
    pub page_depth: u32,
    pub discovered_via: DiscoverySource,

    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub robots_meta: Option<String>,
    pub canonical_url: Option<String>,
    pub is_self_canonical: Option<bool>,
    pub rel_prev: Option<String>,
    pub rel_next: Option<String>,
    pub html_lang: Option<String>,
    pub viewport: Option<String>,

    pub is_indexable: bool,
    pub indexability_reason: Option<String>,

    pub h1_tags: Vec<String>,
    pub h2_tags: Vec<String>,
    /// Heading tag names in document order, for hierarchy checks.
    pub heading_sequence: Vec<String>,

    pub internal_links: Vec<String>,
    pub external_links: Vec<String>,
    /// Incoming internal link count, flushed at finalize.
    pub internal_links_received: u32,

    pub images: ImageStats,

    pub word_count: u32,
    /// Rounded percentage of visible text over raw HTML length.
    pub text_html_ratio: u32,
    pub keyword_density: Vec<KeywordDensity>,
    pub reading_level: Option<ReadingLevel>,
    /// SHA-256 hex of the collapsed body text.
    pub content_hash: String,
    /// Markdown-formatted body view.
    pub body_text: String,

    pub schema_types: Vec<String>,
    pub article: Option<ArticleData>,
    pub article_issues: Vec<String>,
    pub product: Option<ProductData>,
    pub product_issues: Vec<String>,
    pub hreflang: HreflangAnalysis,
    pub mobile: Option<MobileAnalysis>,

    pub og_title: Option<String>,
    pub og_description: Option<String>,
    pub og_image: Option<String>,
    pub twitter_card: Option<String>,

    pub is_https: bool,
    pub has_mixed_content: bool,

    pub core_web_vitals: Option<CoreWebVitals>,

    /// Non-fatal parse warnings (bad JSON-LD, malformed hreflang, ...).
    pub diagnostics: Vec<String>,
}

impl PageRecord {
    /// Minimal record for a URL that could not be fetched or was not HTML.
    pub fn error_record(
        url: &str,
        status_code: u16,
        content_type: Option<String>,
        response_time_ms: u64,
        reason: impl Into<String>,
    ) -> Self {
        let parsed_path = url::Url::parse(url)
            .map(|u| (u.path().to_string(), u.query().map(|q| q.to_string())))
            .unwrap_or_else(|_| (String::from("/"), None));
        Self {
            url: url.to_string(),
            url_hash: sha256_hex(url),
            path: parsed_path.0,
            query_string: parsed_path.1,
            status_code,
            redirect_url: None,
            redirect_chain: Vec::new(),
            content_type,
            response_time_ms,
            page_size_bytes: 0,
            page_depth: 0,
            discovered_via: DiscoverySource::Crawl,
            title: None,
            meta_description: None,
            robots_meta: None,
            canonical_url: None,
            is_self_canonical: None,
            rel_prev: None,
            rel_next: None,
            html_lang: None,
            viewport: None,
            is_indexable: false,
            indexability_reason: Some(reason.into()),
            h1_tags: Vec::new(),
            h2_tags: Vec::new(),
            heading_sequence: Vec::new(),
            internal_links: Vec::new(),
            external_links: Vec::new(),
            internal_links_received: 0,
            images: ImageStats::default(),
            word_count: 0,
            text_html_ratio: 0,
            keyword_density: Vec::new(),
            reading_level: None,
            content_hash: sha256_hex(""),
            body_text: String::new(),
            schema_types: Vec::new(),
            article: None,
            article_issues: Vec::new(),
            product: None,
            product_issues: Vec::new(),
            hreflang: HreflangAnalysis::default(),
            mobile: None,
            og_title: None,
            og_description: None,
            og_image: None,
            twitter_card: None,
            is_https: url.starts_with("https://"),
            has_mixed_content: false,
            core_web_vitals: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn title_length(&self) -> usize {
        self.title.as_deref().map(|t| t.chars().count()).unwrap_or(0)
    }

    pub fn meta_description_length(&self) -> usize {
        self.meta_description
            .as_deref()
            .map(|d| d.chars().count())
            .unwrap_or(0)
    }

    pub fn h1_count(&self) -> usize {
        self.h1_tags.len()
    }

    pub fn h2_count(&self) -> usize {
        self.h2_tags.len()
    }

    pub fn internal_links_count(&self) -> usize {
        self.internal_links.len()
    }

    pub fn external_links_count(&self) -> usize {
        self.external_links.len()
    }

    pub fn has_schema(&self) -> bool {
        !self.schema_types.is_empty()
    }

    /// True when the fetch itself failed (no response at all).
    pub fn is_fetch_error(&self) -> bool {
        self.status_code == 0
    }
}

/// Issue severity from the catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Error,
    Warning,
    Notice,
}

impl IssueSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Notice => "notice",
        }
    }
}

/// Catalogue entry. Only codes present (and active) in the catalogue may be
/// attached to pages; detections for unknown codes are dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueDefinition {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub category: String,
    pub severity: IssueSeverity,
    pub active: bool,
}

/// Per-job, per-code roll-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueAggregate {
    pub id: Uuid,
    pub crawl_id: Uuid,
    pub issue_id: Uuid,
    pub code: String,
    pub affected_pages_count: u64,
}

/// Progress snapshot written to the job row after each page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlProgress {
    pub pages_discovered: u64,
    pub pages_crawled: u64,
    pub pages_failed: u64,
    pub current_url: Option<String>,
}

/// Aggregates written to the job at finalize. Never carries a status: the
/// terminal status is written separately, at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResults {
    pub pages_discovered: u64,
    pub pages_crawled: u64,
    pub pages_failed: u64,
    pub progress_percentage: f64,
    pub duration_seconds: i64,
    pub health_score: u32,
    pub total_issues: u64,
    pub errors_count: u64,
    pub warnings_count: u64,
    pub notices_count: u64,
    /// Pages with no error-severity issue.
    pub passed_count: u64,
    pub category_scores: HashMap<String, u32>,
}

/// Mobile + desktop oracle scores for the homepage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceAudit {
    pub url: String,
    pub mobile_score: Option<u32>,
    pub desktop_score: Option<u32>,
    pub field_lcp_ms: Option<f64>,
    pub field_cls: Option<f64>,
    pub field_inp_ms: Option<f64>,
    pub opportunities: Vec<String>,
    pub diagnostics: Vec<String>,
}

/// Outcome of the AI-search readiness analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiSearchAudit {
    pub score: u32,
    pub has_llms_txt: bool,
    pub has_ai_txt: bool,
    pub blocked_ai_bots: Vec<String>,
    pub optimized_page_ratio: f64,
    pub faq_schema_count: u32,
    pub howto_schema_count: u32,
    pub speakable_schema_count: u32,
}

/// SHA-256 of a string, hex-encoded. Used for `url_hash` and `content_hash`.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{:02x}", byte);
    }
    out
}
