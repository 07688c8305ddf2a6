//! Crawlability, indexability, and transport-security rules

use serde_json::json;

use crate::issues::Emission;
use crate::types::PageRecord;

/// Response time above which a page counts as slow to crawl.
const SLOW_RESPONSE_MS: u64 = 3000;

pub fn detect(page: &PageRecord) -> Vec<Emission> {
    let mut out = Vec::new();

    match page.status_code {
        400..=499 => out.push(Emission::new(
            "CRAWL_4XX_ERROR",
            json!({ "status": page.status_code }),
        )),
        500..=599 => out.push(Emission::new(
            "CRAWL_5XX_ERROR",
            json!({ "status": page.status_code }),
        )),
        _ => {}
    }

    if page.redirect_chain.len() > 1 {
        out.push(Emission::new(
            "CRAWL_REDIRECT_CHAIN",
            json!({
                "hops": page.redirect_chain.len(),
                "chain": page.redirect_chain.iter().map(|h| h.url.clone()).collect::<Vec<_>>(),
            }),
        ));
    }

    if page
        .redirect_chain
        .iter()
        .any(|hop| matches!(hop.status_code, 302 | 307))
    {
        out.push(Emission::new("CRAWL_TEMP_REDIRECT", json!({})));
    }

    if page.response_time_ms > SLOW_RESPONSE_MS {
        out.push(Emission::new(
            "CRAWL_SLOW_RESPONSE",
            json!({ "response_time_ms": page.response_time_ms }),
        ));
    }

    if page.indexability_reason.as_deref() == Some("noindex directive") {
        out.push(Emission::new(
            "INDEX_NOINDEX",
            json!({ "robots": page.robots_meta }),
        ));
    }

    if !page.is_fetch_error() {
        if !page.is_https {
            out.push(Emission::new("SECURITY_NOT_HTTPS", json!({})));
        }
        if page.has_mixed_content {
            out.push(Emission::new("SECURITY_MIXED_CONTENT", json!({})));
        }
    }

    out
}
