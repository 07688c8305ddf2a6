//! Browser contract for page navigation
//!
//! The rendering engine is an external collaborator: anything that can
//! navigate a URL and report the final URL, status, redirect chain, and body
//! satisfies [`BrowserContext`]. Production uses [`HttpBrowser`], which walks
//! redirects manually over reqwest so every 3xx hop is recorded.
//! [`StaticBrowser`] serves canned responses for tests.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::types::{CoreWebVitals, RedirectHop};

/// Wait condition for navigation. `NetworkIdle` is selected when the job
/// renders JavaScript, `DomContentLoaded` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    DomContentLoaded,
    NetworkIdle,
}

/// Outcome of one navigation.
#[derive(Debug, Clone)]
pub struct PageResponse {
    pub final_url: Url,
    pub status: u16,
    pub content_type: String,
    pub body: String,
    /// 3xx hops observed on the navigation request, in order.
    pub redirect_chain: Vec<RedirectHop>,
    pub response_time: Duration,
    /// Best-effort performance entries; present only when the engine
    /// measured them.
    pub performance: Option<CoreWebVitals>,
}

/// Errors surfaced by a browser engine.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("navigation timed out after {0:?}")]
    Timeout(Duration),
    #[error("too many redirects")]
    TooManyRedirects,
}

/// Contract every rendering engine implements.
#[async_trait]
pub trait BrowserContext: Send + Sync {
    /// Navigate one URL in a fresh page and report the outcome.
    async fn open_page(
        &self,
        url: &Url,
        wait: WaitCondition,
        timeout: Duration,
    ) -> Result<PageResponse, BrowserError>;
}

/// Maximum redirect hops followed before giving up.
const MAX_REDIRECT_HOPS: usize = 10;

/// HTTP-backed browser. Redirects are disabled on the client and followed
/// manually so the chain is observable.
pub struct HttpBrowser {
    client: reqwest::Client,
}

impl HttpBrowser {
    pub fn new(user_agent: &str) -> Result<Self, BrowserError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(user_agent)
            .gzip(true)
            .build()
            .map_err(|e| BrowserError::Navigation(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BrowserContext for HttpBrowser {
    async fn open_page(
        &self,
        url: &Url,
        wait: WaitCondition,
        timeout: Duration,
    ) -> Result<PageResponse, BrowserError> {
        let start = Instant::now();
        let mut current = url.clone();
        let mut redirect_chain: Vec<RedirectHop> = Vec::new();

        loop {
            if redirect_chain.len() > MAX_REDIRECT_HOPS {
                return Err(BrowserError::TooManyRedirects);
            }
            let remaining = timeout
                .checked_sub(start.elapsed())
                .ok_or(BrowserError::Timeout(timeout))?;

            let response = self
                .client
                .get(current.as_str())
                .timeout(remaining)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        BrowserError::Timeout(timeout)
                    } else {
                        BrowserError::Navigation(e.to_string())
                    }
                })?;

            let status = response.status().as_u16();

            if (300..400).contains(&status) {
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.to_string());
                match location.and_then(|loc| current.join(&loc).ok()) {
                    Some(next) => {
                        redirect_chain.push(RedirectHop {
                            url: current.as_str().to_string(),
                            status_code: status,
                        });
                        current = next;
                        continue;
                    }
                    // 3xx without a usable Location terminates navigation
                    None => {
                        return Ok(PageResponse {
                            final_url: current,
                            status,
                            content_type: String::new(),
                            body: String::new(),
                            redirect_chain,
                            response_time: start.elapsed(),
                            performance: None,
                        });
                    }
                }
            }

            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("text/html")
                .to_string();

            let ttfb = start.elapsed();
            let body = response
                .text()
                .await
                .map_err(|e| BrowserError::Navigation(e.to_string()))?;
            let response_time = start.elapsed();

            // Without a real rendering engine only TTFB is measurable; the
            // remaining vitals stay absent.
            let performance = if wait == WaitCondition::NetworkIdle {
                Some(CoreWebVitals {
                    ttfb_ms: Some(ttfb.as_secs_f64() * 1000.0),
                    ..CoreWebVitals::default()
                })
            } else {
                None
            };

            return Ok(PageResponse {
                final_url: current,
                status,
                content_type,
                body,
                redirect_chain,
                response_time,
                performance,
            });
        }
    }
}

/// A canned response served by [`StaticBrowser`].
#[derive(Debug, Clone)]
pub struct StaticPage {
    pub status: u16,
    pub content_type: String,
    pub body: String,
    pub redirect_to: Option<String>,
}

impl StaticPage {
    pub fn html(body: &str) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8".to_string(),
            body: body.to_string(),
            redirect_to: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: "text/html".to_string(),
            body: String::new(),
            redirect_to: None,
        }
    }

    pub fn redirect(status: u16, to: &str) -> Self {
        Self {
            status,
            content_type: "text/html".to_string(),
            body: String::new(),
            redirect_to: Some(to.to_string()),
        }
    }
}

/// In-memory browser over a fixed URL → response map. Unknown URLs fail
/// navigation with a connection-refused style message, which the fetcher
/// treats as retryable and then permanent.
#[derive(Default)]
pub struct StaticBrowser {
    pages: HashMap<String, StaticPage>,
}

impl StaticBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, page: StaticPage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    pub fn insert(&mut self, url: &str, page: StaticPage) {
        self.pages.insert(url.to_string(), page);
    }
}

#[async_trait]
impl BrowserContext for StaticBrowser {
    async fn open_page(
        &self,
        url: &Url,
        _wait: WaitCondition,
        _timeout: Duration,
    ) -> Result<PageResponse, BrowserError> {
        let mut current = url.clone();
        let mut redirect_chain = Vec::new();

        loop {
            if redirect_chain.len() > MAX_REDIRECT_HOPS {
                return Err(BrowserError::TooManyRedirects);
            }
            let page = self
                .pages
                .get(current.as_str())
                .or_else(|| self.pages.get(current.as_str().trim_end_matches('/')))
                .ok_or_else(|| {
                    BrowserError::Navigation(format!("ERR_CONNECTION_REFUSED at {}", current))
                })?;

            if let Some(target) = &page.redirect_to {
                redirect_chain.push(RedirectHop {
                    url: current.as_str().to_string(),
                    status_code: page.status,
                });
                current = current
                    .join(target)
                    .map_err(|e| BrowserError::Navigation(e.to_string()))?;
                continue;
            }

            return Ok(PageResponse {
                final_url: current,
                status: page.status,
                content_type: page.content_type.clone(),
                body: page.body.clone(),
                redirect_chain,
                response_time: Duration::from_millis(5),
                performance: None,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_browser_serves_canned_pages() {
        let browser = StaticBrowser::new()
            .with_page("https://ex.test/", StaticPage::html("<html><body>hi</body></html>"));
        let url = Url::parse("https://ex.test/").unwrap();
        let response = browser
            .open_page(&url, WaitCondition::DomContentLoaded, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert!(response.body.contains("hi"));
        assert!(response.redirect_chain.is_empty());
    }

    #[tokio::test]
    async fn static_browser_follows_redirects_and_records_chain() {
        let browser = StaticBrowser::new()
            .with_page("https://ex.test/old", StaticPage::redirect(301, "/new"))
            .with_page("https://ex.test/new", StaticPage::html("<html>new</html>"));
        let url = Url::parse("https://ex.test/old").unwrap();
        let response = browser
            .open_page(&url, WaitCondition::DomContentLoaded, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(response.final_url.as_str(), "https://ex.test/new");
        assert_eq!(response.redirect_chain.len(), 1);
        assert_eq!(response.redirect_chain[0].status_code, 301);
    }

    #[tokio::test]
    async fn static_browser_unknown_url_is_connection_error() {
        let browser = StaticBrowser::new();
        let url = Url::parse("https://ex.test/missing").unwrap();
        let err = browser
            .open_page(&url, WaitCondition::DomContentLoaded, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ERR_CONNECTION_REFUSED"));
    }
}
