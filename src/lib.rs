//! Siteaudit: a site-auditing web crawler worker
//!
//! Given a seed domain and crawl policies, the worker discovers, fetches,
//! and analyzes a site's HTML pages, derives SEO-quality signals per page,
//! detects issues against a catalogue, and writes per-page records plus
//! site-wide aggregates to the job store. Jobs arrive through store change
//! notifications; crashed runs are recovered and failed runs with enough
//! progress are resumed automatically.

pub mod analyze;
pub mod config;
pub mod controller;
pub mod crawl;
pub mod extract;
pub mod issues;
pub mod store;
pub mod types;

pub use config::Config;
pub use types::*;
