//! Per-job crawl policy, snapshotted onto the job row at creation

use anyhow::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on pages a single job may admit.
const MAX_PAGES_CEILING: u64 = 100_000;
/// Upper bound on crawl depth; anything deeper is a runaway snapshot.
const MAX_DEPTH_CEILING: u32 = 50;
/// Upper bound on the politeness delay (five minutes).
const MAX_CRAWL_DELAY_MS: u64 = 300_000;

/// Crawl policy for one job. Deserialized from the job's settings snapshot;
/// every field has a default so partial snapshots stay readable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSettings {
    /// Maximum pages admitted into the frontier
    #[serde(default = "default_max_pages")]
    pub max_pages: u64,
    /// Maximum link depth from the seed
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    /// Lower bound for the politeness delay between fetches (milliseconds)
    #[serde(default = "default_crawl_delay_ms")]
    pub crawl_delay_ms: u64,
    /// Honor robots.txt disallow rules during admission
    #[serde(default = "default_true")]
    pub respect_robots_txt: bool,
    /// Treat subdomains of the project domain as in-scope
    #[serde(default)]
    pub follow_subdomains: bool,
    /// Wait for network idle (JS rendering) instead of DOM content loaded
    #[serde(default)]
    pub render_javascript: bool,
    /// Override for the worker's user agent
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Substring filters; empty list accepts all URLs
    #[serde(default)]
    pub include_patterns: Vec<String>,
    /// Substring filters; any match rejects the URL
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    /// Carry-over block when this job resumes a failed predecessor
    #[serde(default)]
    pub resume_info: Option<ResumeInfo>,
}

/// URLs the predecessor already fetched, admitted pre-visited so they are
/// never re-fetched, plus the prior run's counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeInfo {
    pub resumed_from: Uuid,
    pub skip_urls: Vec<String>,
    #[serde(default)]
    pub original_pages_crawled: u64,
    #[serde(default)]
    pub original_pages_failed: u64,
    #[serde(default)]
    pub original_pages_discovered: u64,
}

impl CrawlSettings {
    /// Validate the policy snapshot, collecting every error so a bad job
    /// row reports all of its problems at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.max_pages == 0 {
            errors.push("max_pages must be positive".to_string());
        }
        if self.max_pages > MAX_PAGES_CEILING {
            errors.push(format!("max_pages must be <= {}", MAX_PAGES_CEILING));
        }
        if self.max_depth == 0 {
            errors.push("max_depth must be positive".to_string());
        }
        if self.max_depth > MAX_DEPTH_CEILING {
            errors.push(format!("max_depth must be <= {}", MAX_DEPTH_CEILING));
        }
        if self.crawl_delay_ms == 0 {
            errors.push("crawl_delay_ms must be positive".to_string());
        }
        if self.crawl_delay_ms > MAX_CRAWL_DELAY_MS {
            errors.push(format!("crawl_delay_ms must be <= {}", MAX_CRAWL_DELAY_MS));
        }
        if let Some(agent) = &self.user_agent {
            if agent.trim().is_empty() {
                errors.push("user_agent override must not be blank".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Crawl settings validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}

fn default_max_pages() -> u64 {
    100
}

fn default_max_depth() -> u32 {
    5
}

fn default_crawl_delay_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            max_depth: default_max_depth(),
            crawl_delay_ms: default_crawl_delay_ms(),
            respect_robots_txt: true,
            follow_subdomains: false,
            render_javascript: false,
            user_agent: None,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            resume_info: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_pass_validation() {
        assert!(CrawlSettings::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_max_pages() {
        let settings = CrawlSettings {
            max_pages: 0,
            ..CrawlSettings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("max_pages must be positive"));
    }

    #[test]
    fn validate_rejects_oversized_max_pages() {
        let settings = CrawlSettings {
            max_pages: 1_000_000,
            ..CrawlSettings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("max_pages must be <="));
    }

    #[test]
    fn validate_rejects_zero_max_depth() {
        let settings = CrawlSettings {
            max_depth: 0,
            ..CrawlSettings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("max_depth must be positive"));
    }

    #[test]
    fn validate_rejects_oversized_max_depth() {
        let settings = CrawlSettings {
            max_depth: 80,
            ..CrawlSettings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("max_depth must be <="));
    }

    #[test]
    fn validate_rejects_zero_crawl_delay() {
        let settings = CrawlSettings {
            crawl_delay_ms: 0,
            ..CrawlSettings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("crawl_delay_ms must be positive"));
    }

    #[test]
    fn validate_rejects_excessive_crawl_delay() {
        let settings = CrawlSettings {
            crawl_delay_ms: 600_000,
            ..CrawlSettings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("crawl_delay_ms must be <="));
    }

    #[test]
    fn validate_rejects_blank_user_agent_override() {
        let settings = CrawlSettings {
            user_agent: Some("   ".to_string()),
            ..CrawlSettings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("user_agent override"));
    }

    #[test]
    fn validate_collects_multiple_errors() {
        let settings = CrawlSettings {
            max_pages: 0,
            max_depth: 0,
            crawl_delay_ms: 0,
            ..CrawlSettings::default()
        };
        let msg = settings.validate().unwrap_err().to_string();
        assert!(msg.contains("max_pages must be positive"));
        assert!(msg.contains("max_depth must be positive"));
        assert!(msg.contains("crawl_delay_ms must be positive"));
    }

    #[test]
    fn validate_accepts_ceiling_values() {
        let settings = CrawlSettings {
            max_pages: MAX_PAGES_CEILING,
            max_depth: MAX_DEPTH_CEILING,
            crawl_delay_ms: MAX_CRAWL_DELAY_MS,
            ..CrawlSettings::default()
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn partial_snapshot_fills_defaults() {
        let settings: CrawlSettings = serde_json::from_str(r#"{"max_pages": 25}"#).unwrap();
        assert_eq!(settings.max_pages, 25);
        assert_eq!(settings.max_depth, 5);
        assert!(settings.respect_robots_txt);
        assert!(settings.resume_info.is_none());
    }

    #[test]
    fn resume_info_round_trips() {
        let settings = CrawlSettings {
            resume_info: Some(ResumeInfo {
                resumed_from: Uuid::new_v4(),
                skip_urls: vec!["https://ex.test/a".to_string()],
                original_pages_crawled: 12,
                original_pages_failed: 1,
                original_pages_discovered: 30,
            }),
            ..CrawlSettings::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        let back: CrawlSettings = serde_json::from_str(&json).unwrap();
        let info = back.resume_info.unwrap();
        assert_eq!(info.skip_urls.len(), 1);
        assert_eq!(info.original_pages_crawled, 12);
    }
}
