//! Crawl engine for one audit job
//!
//! Key components:
//! - `url`: normalization and the SEO relevance filter
//! - `robots`: robots.txt policy, crawl-delay, and AI-bot access flags
//! - `sitemap`: breadth-first sitemap and sitemap-index reader
//! - `browser`: the rendering-engine contract plus the HTTP implementation
//! - `fetcher`: navigation, retry with backoff, and outcome classification
//! - `frontier`: the BFS FIFO with discovered/visited deduplication
//! - `orchestrator`: the per-job pipeline tying everything together

pub mod browser;
pub mod fetcher;
pub mod frontier;
pub mod orchestrator;
pub mod robots;
pub mod sitemap;
pub mod url;

pub use browser::{BrowserContext, HttpBrowser};
pub use fetcher::PageFetcher;
pub use frontier::Frontier;
pub use orchestrator::{CrawlOrchestrator, CrawlOutcome};
pub use robots::RobotsPolicy;
pub use sitemap::SitemapReader;
