//! Page fetch engine
//!
//! Drives a [`BrowserContext`] to navigate one URL, classifies the outcome,
//! and retries transient network failures with exponential backoff. Success
//! runs the extractor on the final HTML and returns the resulting
//! [`PageRecord`]; failures return error-shaped records that count toward
//! `pages_failed`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use url::Url;

use crate::extract::Extractor;
use crate::types::{CoreWebVitals, PageRecord};

use super::browser::{BrowserContext, BrowserError, WaitCondition};

/// Error substrings that mark a transient network failure worth retrying.
const RETRYABLE_PATTERNS: &[&str] = &[
    "ECONNRESET",
    "ETIMEDOUT",
    "EPIPE",
    "socket hang up",
    "aborted",
    "ERR_CONNECTION_",
    "ERR_NETWORK_CHANGED",
    "ERR_TIMED_OUT",
    "connection reset",
    "connection closed before",
];

/// Whether a navigation error message matches the retry whitelist.
pub fn is_retryable_error(message: &str) -> bool {
    RETRYABLE_PATTERNS.iter().any(|p| message.contains(p))
}

/// Fetches one page at a time through the shared browser context.
pub struct PageFetcher {
    browser: Arc<dyn BrowserContext>,
    extractor: Extractor,
    render_javascript: bool,
    navigation_timeout: Duration,
    retry_base_delay: Duration,
    max_retries: u32,
}

impl PageFetcher {
    pub fn new(
        browser: Arc<dyn BrowserContext>,
        extractor: Extractor,
        render_javascript: bool,
        navigation_timeout: Duration,
        retry_base_delay: Duration,
        max_retries: u32,
    ) -> Self {
        Self {
            browser,
            extractor,
            render_javascript,
            navigation_timeout,
            retry_base_delay,
            max_retries,
        }
    }

    fn wait_condition(&self) -> WaitCondition {
        if self.render_javascript {
            WaitCondition::NetworkIdle
        } else {
            WaitCondition::DomContentLoaded
        }
    }

    /// Navigate `url` and produce a [`PageRecord`]. Never returns an error:
    /// permanent failures yield an error-shaped record.
    pub async fn crawl(&self, url: &Url) -> PageRecord {
        let mut attempt = 0u32;
        let response = loop {
            match self
                .browser
                .open_page(url, self.wait_condition(), self.navigation_timeout)
                .await
            {
                Ok(response) => break response,
                Err(error) => {
                    let message = error.to_string();
                    let retryable = match &error {
                        BrowserError::Timeout(_) => true,
                        BrowserError::TooManyRedirects => false,
                        BrowserError::Navigation(msg) => is_retryable_error(msg),
                    };
                    if retryable && attempt < self.max_retries {
                        let delay = self.retry_base_delay * 2u32.pow(attempt);
                        debug!(
                            "retrying {} after {:?} (attempt {}): {}",
                            url, delay, attempt + 1, message
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    warn!("fetch failed for {}: {}", url, message);
                    return PageRecord::error_record(url.as_str(), 0, None, 0, message);
                }
            }
        };

        let is_html = response.content_type.contains("text/html")
            || response.content_type.contains("application/xhtml");
        if !is_html {
            let mut record = PageRecord::error_record(
                response.final_url.as_str(),
                response.status,
                Some(response.content_type.clone()),
                response.response_time.as_millis() as u64,
                "Not HTML content",
            );
            record.redirect_chain = response.redirect_chain;
            return record;
        }

        let mut record = self.extractor.extract(
            &response.body,
            &response.final_url,
            response.status,
            &response.content_type,
            response.response_time.as_millis() as u64,
        );

        if !response.redirect_chain.is_empty() {
            record.redirect_url = Some(response.final_url.as_str().to_string());
            record.redirect_chain = response.redirect_chain;
        }

        if self.render_javascript {
            record.core_web_vitals = merge_vitals(record.core_web_vitals.take(), response.performance);
        }

        record
    }
}

/// Overlay engine-reported timings onto any extractor-derived vitals,
/// preferring measured values.
fn merge_vitals(
    base: Option<CoreWebVitals>,
    measured: Option<CoreWebVitals>,
) -> Option<CoreWebVitals> {
    match (base, measured) {
        (None, None) => None,
        (Some(v), None) | (None, Some(v)) => Some(v),
        (Some(base), Some(measured)) => Some(CoreWebVitals {
            lcp_ms: measured.lcp_ms.or(base.lcp_ms),
            fcp_ms: measured.fcp_ms.or(base.fcp_ms),
            ttfb_ms: measured.ttfb_ms.or(base.ttfb_ms),
            cls: measured.cls.or(base.cls),
            inp_ms: measured.inp_ms.or(base.inp_ms),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::browser::{StaticBrowser, StaticPage};

    fn fetcher(browser: StaticBrowser) -> PageFetcher {
        PageFetcher::new(
            Arc::new(browser),
            Extractor::new("ex.test"),
            false,
            Duration::from_secs(5),
            Duration::from_millis(1),
            2,
        )
    }

    #[test]
    fn retry_whitelist_matches_network_errors() {
        assert!(is_retryable_error("read ECONNRESET"));
        assert!(is_retryable_error("socket hang up"));
        assert!(is_retryable_error("net::ERR_CONNECTION_REFUSED"));
        assert!(!is_retryable_error("ENOTFOUND ex.test"));
        assert!(!is_retryable_error("certificate has expired"));
    }

    #[tokio::test]
    async fn html_page_produces_full_record() {
        let browser = StaticBrowser::new().with_page(
            "https://ex.test/",
            StaticPage::html(
                "<html><head><title>Home</title></head><body><h1>Welcome</h1>\
                 <p>Plenty of body text here.</p></body></html>",
            ),
        );
        let record = fetcher(browser)
            .crawl(&Url::parse("https://ex.test/").unwrap())
            .await;
        assert_eq!(record.status_code, 200);
        assert!(record.is_indexable);
        assert_eq!(record.title.as_deref(), Some("Home"));
    }

    #[tokio::test]
    async fn non_html_yields_minimal_record() {
        let browser = StaticBrowser::new().with_page(
            "https://ex.test/report.pdf",
            StaticPage {
                status: 200,
                content_type: "application/pdf".to_string(),
                body: String::new(),
                redirect_to: None,
            },
        );
        let record = fetcher(browser)
            .crawl(&Url::parse("https://ex.test/report.pdf").unwrap())
            .await;
        assert!(!record.is_indexable);
        assert_eq!(record.indexability_reason.as_deref(), Some("Not HTML content"));
        assert_eq!(record.content_type.as_deref(), Some("application/pdf"));
    }

    #[tokio::test]
    async fn exhausted_retries_yield_error_record() {
        // Unknown URL in the static browser raises ERR_CONNECTION_REFUSED,
        // which is retryable; after retries the error record is returned.
        let record = fetcher(StaticBrowser::new())
            .crawl(&Url::parse("https://ex.test/missing").unwrap())
            .await;
        assert!(record.is_fetch_error());
        assert!(!record.is_indexable);
        assert!(record
            .indexability_reason
            .as_deref()
            .unwrap()
            .contains("ERR_CONNECTION_REFUSED"));
    }

    #[tokio::test]
    async fn redirect_chain_lands_on_record() {
        let browser = StaticBrowser::new()
            .with_page("https://ex.test/old", StaticPage::redirect(301, "/new"))
            .with_page(
                "https://ex.test/new",
                StaticPage::html("<html><head><title>New</title></head><body>ok</body></html>"),
            );
        let record = fetcher(browser)
            .crawl(&Url::parse("https://ex.test/old").unwrap())
            .await;
        assert_eq!(record.url, "https://ex.test/new");
        assert_eq!(record.redirect_chain.len(), 1);
        assert_eq!(record.redirect_url.as_deref(), Some("https://ex.test/new"));
    }
}
