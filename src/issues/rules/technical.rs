//! Technical SEO rules: pagination, URL parameters, canonicals

use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;

use crate::issues::Emission;
use crate::types::PageRecord;

use super::is_content_page;

const MAX_URL_PARAMETERS: usize = 3;

/// Query keys marking session, sort, or filter variants.
const SESSION_SORT_KEYS: &[&str] = &[
    "sessionid", "session_id", "phpsessid", "sid", "sort", "order", "orderby", "filter",
];

/// Query keys typical of faceted navigation.
const FACET_KEYS: &[&str] = &[
    "color", "size", "brand", "price", "material", "rating", "category", "availability",
];

static PAGINATED_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/page/\d+(/|$)").unwrap());

fn query_keys(page: &PageRecord) -> Vec<String> {
    page.query_string
        .as_deref()
        .map(|q| {
            q.split('&')
                .filter(|p| !p.is_empty())
                .map(|p| p.split('=').next().unwrap_or("").to_ascii_lowercase())
                .collect()
        })
        .unwrap_or_default()
}

fn is_paginated(page: &PageRecord, keys: &[String]) -> bool {
    keys.iter().any(|k| matches!(k.as_str(), "page" | "p" | "offset"))
        || PAGINATED_PATH.is_match(&page.path)
}

pub fn detect(page: &PageRecord) -> Vec<Emission> {
    if !is_content_page(page) {
        return Vec::new();
    }

    let mut out = Vec::new();
    let keys = query_keys(page);
    let paginated = is_paginated(page, &keys);

    if paginated {
        if page.rel_prev.is_none() && page.rel_next.is_none() {
            out.push(Emission::new("pagination_missing_rel_links", json!({})));
        }
        if page.canonical_url.is_some() && page.is_self_canonical == Some(false) {
            out.push(Emission::new(
                "pagination_canonical_mismatch",
                json!({ "canonical": page.canonical_url }),
            ));
        }
        if page
            .robots_meta
            .as_deref()
            .map(|r| r.to_ascii_lowercase().contains("noindex"))
            .unwrap_or(false)
        {
            out.push(Emission::new("pagination_noindex", json!({})));
        }
    }

    if keys.len() >= MAX_URL_PARAMETERS {
        out.push(Emission::new(
            "excessive_url_parameters",
            json!({ "count": keys.len() }),
        ));
    }

    if keys.iter().any(|k| SESSION_SORT_KEYS.contains(&k.as_str())) {
        out.push(Emission::new(
            "url_session_parameters",
            json!({ "keys": keys }),
        ));
    }

    let facet_count = keys.iter().filter(|k| FACET_KEYS.contains(&k.as_str())).count();
    if page.is_indexable && facet_count >= 2 {
        out.push(Emission::new(
            "faceted_navigation_indexable",
            json!({ "facets": facet_count }),
        ));
    }

    if page.is_indexable && page.status_code == 200 && page.canonical_url.is_none() {
        out.push(Emission::new("missing_canonical", json!({})));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(page: &PageRecord) -> Vec<String> {
        detect(page).into_iter().map(|e| e.code).collect()
    }

    fn page_at(url: &str) -> PageRecord {
        let parsed = url::Url::parse(url).unwrap();
        let mut page = PageRecord::error_record(url, 200, None, 100, "");
        page.content_type = Some("text/html".to_string());
        page.is_indexable = true;
        page.indexability_reason = None;
        page.path = parsed.path().to_string();
        page.query_string = parsed.query().map(|q| q.to_string());
        page.canonical_url = Some(url.to_string());
        page.is_self_canonical = Some(true);
        page
    }

    #[test]
    fn clean_page_is_quiet() {
        assert!(codes(&page_at("https://ex.test/about")).is_empty());
    }

    #[test]
    fn pagination_rules() {
        let mut page = page_at("https://ex.test/blog?page=3");
        let found = codes(&page);
        assert!(found.contains(&"pagination_missing_rel_links".to_string()));

        page.rel_next = Some("https://ex.test/blog?page=4".to_string());
        assert!(!codes(&page).contains(&"pagination_missing_rel_links".to_string()));

        page.is_self_canonical = Some(false);
        page.canonical_url = Some("https://ex.test/blog".to_string());
        assert!(codes(&page).contains(&"pagination_canonical_mismatch".to_string()));

        page.robots_meta = Some("noindex".to_string());
        assert!(codes(&page).contains(&"pagination_noindex".to_string()));
    }

    #[test]
    fn path_based_pagination_detected() {
        let page = page_at("https://ex.test/blog/page/2");
        assert!(codes(&page).contains(&"pagination_missing_rel_links".to_string()));
    }

    #[test]
    fn parameter_rules() {
        let page = page_at("https://ex.test/list?a=1&b=2&c=3");
        assert!(codes(&page).contains(&"excessive_url_parameters".to_string()));

        let page = page_at("https://ex.test/list?sort=price");
        assert!(codes(&page).contains(&"url_session_parameters".to_string()));

        let page = page_at("https://ex.test/shop?color=red&size=xl");
        assert!(codes(&page).contains(&"faceted_navigation_indexable".to_string()));
    }

    #[test]
    fn missing_canonical_on_indexable_200() {
        let mut page = page_at("https://ex.test/about");
        page.canonical_url = None;
        page.is_self_canonical = None;
        assert!(codes(&page).contains(&"missing_canonical".to_string()));

        page.is_indexable = false;
        assert!(!codes(&page).contains(&"missing_canonical".to_string()));
    }
}
