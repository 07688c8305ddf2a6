//! Worker configuration

mod logging;
mod settings;

pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use settings::{CrawlSettings, ResumeInfo};

use anyhow::Result;

/// Default user agent for all HTTP requests (crawling, robots, probes)
pub const DEFAULT_USER_AGENT: &str = "SiteauditBot/1.0 (+https://siteaudit.dev/bot)";

/// Main configuration for the audit worker, assembled from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Job store connection
    pub store: StoreConfig,
    /// Performance oracle (optional; absent key skips the oracle step)
    pub oracle: OracleConfig,
    /// Crawl engine timeouts and retry policy
    pub crawler: CrawlerConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Connection settings for the job/result store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base URL of the relational store
    pub url: String,
    /// Service credential presented to the store
    pub service_key: String,
}

/// Performance oracle settings.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// API key; `None` disables the oracle step entirely
    pub api_key: Option<String>,
    /// Per-strategy request timeout (seconds)
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            timeout_secs: 60,
        }
    }
}

/// Engine-level knobs that are not per-job policy.
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// User agent used when a job does not override it
    pub user_agent: String,
    /// Page navigation timeout (seconds)
    pub navigation_timeout_secs: u64,
    /// Base delay for fetch retries (milliseconds); doubles per attempt
    pub retry_base_delay_ms: u64,
    /// Maximum fetch retries for transient network errors
    pub max_retries: u32,
    /// Timeout for small probes: llms.txt, ai.txt, sitemap existence (seconds)
    pub probe_timeout_secs: u64,
    /// Timeout for sitemap body fetches (seconds)
    pub sitemap_timeout_secs: u64,
    /// Hard cap on URLs yielded by the sitemap reader per job
    pub sitemap_url_cap: usize,
    /// A `processing` job older than this is considered abandoned (seconds)
    pub stale_job_threshold_secs: i64,
    /// Poll backstop for pending jobs (seconds)
    pub pending_poll_secs: u64,
    /// Retry interval for the auto-resume sweep (seconds)
    pub resume_retry_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            navigation_timeout_secs: 30,
            retry_base_delay_ms: 1000,
            max_retries: 2,
            probe_timeout_secs: 10,
            sitemap_timeout_secs: 30,
            sitemap_url_cap: 5000,
            stale_job_threshold_secs: 300,
            pending_poll_secs: 30,
            resume_retry_secs: 300,
        }
    }
}

impl Config {
    /// Assemble configuration from the environment.
    ///
    /// Required: `AUDIT_STORE_URL`, `AUDIT_STORE_KEY`. Everything else has a
    /// default. Validation errors are collected and reported together.
    pub fn from_env() -> Result<Self> {
        let store = StoreConfig {
            url: std::env::var("AUDIT_STORE_URL").unwrap_or_default(),
            service_key: std::env::var("AUDIT_STORE_KEY").unwrap_or_default(),
        };

        let oracle = OracleConfig {
            api_key: std::env::var("AUDIT_ORACLE_API_KEY").ok().filter(|k| !k.is_empty()),
            ..OracleConfig::default()
        };

        let mut crawler = CrawlerConfig::default();
        if let Ok(ua) = std::env::var("AUDIT_USER_AGENT") {
            if !ua.is_empty() {
                crawler.user_agent = ua;
            }
        }

        let logging = LoggingConfig {
            level: std::env::var("AUDIT_LOG_LEVEL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(LogLevel::Info),
            format: std::env::var("AUDIT_LOG_FORMAT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(LogFormat::Text),
        };

        let config = Self {
            store,
            oracle,
            crawler,
            logging,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate all fields, collecting every error so the operator can fix
    /// the whole environment in one pass.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.store.url.is_empty() {
            errors.push("AUDIT_STORE_URL must be set".to_string());
        }
        if self.store.service_key.is_empty() {
            errors.push("AUDIT_STORE_KEY must be set".to_string());
        }
        if self.crawler.navigation_timeout_secs == 0 {
            errors.push("navigation timeout must be positive".to_string());
        }
        if self.crawler.user_agent.is_empty() {
            errors.push("user agent must not be empty".to_string());
        }
        if self.crawler.sitemap_url_cap == 0 {
            errors.push("sitemap URL cap must be positive".to_string());
        }
        if self.crawler.stale_job_threshold_secs <= 0 {
            errors.push("stale job threshold must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            store: StoreConfig {
                url: "postgres://localhost/audit".to_string(),
                service_key: "secret".to_string(),
            },
            oracle: OracleConfig::default(),
            crawler: CrawlerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_store_url() {
        let mut cfg = valid_config();
        cfg.store.url.clear();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("AUDIT_STORE_URL"));
    }

    #[test]
    fn validate_collects_multiple_errors() {
        let mut cfg = valid_config();
        cfg.store.url.clear();
        cfg.store.service_key.clear();
        cfg.crawler.user_agent.clear();
        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("AUDIT_STORE_URL"));
        assert!(msg.contains("AUDIT_STORE_KEY"));
        assert!(msg.contains("user agent"));
    }

    #[test]
    fn oracle_disabled_without_key() {
        let cfg = valid_config();
        assert!(cfg.oracle.api_key.is_none());
    }
}
