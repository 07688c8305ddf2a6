//! Performance rules: document weight and Core Web Vitals thresholds

use serde_json::json;

use crate::issues::Emission;
use crate::types::PageRecord;

use super::is_content_page;

const PAGE_TOO_LARGE_BYTES: u64 = 3 * 1024 * 1024;
const HTML_TOO_LARGE_BYTES: u64 = 100 * 1024;
const LCP_SLOW_MS: f64 = 4000.0;
const CLS_HIGH: f64 = 0.25;
const TTFB_SLOW_MS: f64 = 800.0;
const INP_SLOW_MS: f64 = 500.0;

pub fn detect(page: &PageRecord) -> Vec<Emission> {
    if !is_content_page(page) {
        return Vec::new();
    }

    let mut out = Vec::new();

    if page.page_size_bytes > PAGE_TOO_LARGE_BYTES {
        out.push(Emission::new(
            "PERF_PAGE_TOO_LARGE",
            json!({ "bytes": page.page_size_bytes }),
        ));
    } else if page.page_size_bytes > HTML_TOO_LARGE_BYTES {
        out.push(Emission::new(
            "PERF_HTML_TOO_LARGE",
            json!({ "bytes": page.page_size_bytes }),
        ));
    }

    if let Some(vitals) = &page.core_web_vitals {
        if vitals.lcp_ms.map(|v| v > LCP_SLOW_MS).unwrap_or(false) {
            out.push(Emission::new("PERF_LCP_SLOW", json!({ "lcp_ms": vitals.lcp_ms })));
        }
        if vitals.cls.map(|v| v > CLS_HIGH).unwrap_or(false) {
            out.push(Emission::new("PERF_CLS_HIGH", json!({ "cls": vitals.cls })));
        }
        if vitals.ttfb_ms.map(|v| v > TTFB_SLOW_MS).unwrap_or(false) {
            out.push(Emission::new("PERF_TTFB_SLOW", json!({ "ttfb_ms": vitals.ttfb_ms })));
        }
        if vitals.inp_ms.map(|v| v > INP_SLOW_MS).unwrap_or(false) {
            out.push(Emission::new("PERF_INP_SLOW", json!({ "inp_ms": vitals.inp_ms })));
        }
    }

    out
}
