//! Structured-data, hreflang, article, and product rules
//!
//! Article and product validation happens during extraction; this rule
//! forwards those slugs so they pass through the same catalogue gate as
//! everything else.

use serde_json::json;

use crate::issues::Emission;
use crate::types::PageRecord;

use super::is_content_page;

pub fn detect(page: &PageRecord) -> Vec<Emission> {
    if !is_content_page(page) {
        return Vec::new();
    }

    let mut out = Vec::new();

    if !page.diagnostics.is_empty() {
        out.push(Emission::new(
            "SCHEMA_PARSE_ERROR",
            json!({ "diagnostics": page.diagnostics }),
        ));
    }
    if page.schema_types.is_empty() {
        out.push(Emission::new("SCHEMA_NONE", json!({})));
    }

    let hreflang = &page.hreflang;
    if !hreflang.invalid_lang_codes.is_empty() {
        out.push(Emission::new(
            "HREFLANG_INVALID_LANG",
            json!({ "codes": hreflang.invalid_lang_codes }),
        ));
    }
    if !hreflang.invalid_region_codes.is_empty() {
        out.push(Emission::new(
            "HREFLANG_INVALID_REGION",
            json!({ "codes": hreflang.invalid_region_codes }),
        ));
    }
    if !hreflang.duplicate_langs.is_empty() {
        out.push(Emission::new(
            "HREFLANG_DUPLICATE",
            json!({ "langs": hreflang.duplicate_langs }),
        ));
    }
    if !hreflang.tags.is_empty() && !hreflang.has_self_reference {
        out.push(Emission::new("HREFLANG_NO_SELF_REFERENCE", json!({})));
    }

    for code in &page.article_issues {
        out.push(Emission::new(
            code.clone(),
            json!({ "headline": page.article.as_ref().and_then(|a| a.headline.clone()) }),
        ));
    }
    for code in &page.product_issues {
        out.push(Emission::new(
            code.clone(),
            json!({ "product": page.product.as_ref().and_then(|p| p.name.clone()) }),
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HreflangTag, ProductData};

    fn codes(page: &PageRecord) -> Vec<String> {
        detect(page).into_iter().map(|e| e.code).collect()
    }

    fn page() -> PageRecord {
        let mut page = PageRecord::error_record("https://ex.test/p", 200, None, 100, "");
        page.content_type = Some("text/html".to_string());
        page.schema_types = vec!["WebSite".to_string()];
        page
    }

    #[test]
    fn parse_errors_and_absence() {
        let mut p = page();
        p.diagnostics = vec!["JSON-LD block 1 failed to parse: trailing comma".to_string()];
        assert!(codes(&p).contains(&"SCHEMA_PARSE_ERROR".to_string()));

        let mut p = page();
        p.schema_types.clear();
        assert!(codes(&p).contains(&"SCHEMA_NONE".to_string()));
    }

    #[test]
    fn hreflang_findings_map_to_codes() {
        let mut p = page();
        p.hreflang.tags = vec![HreflangTag {
            lang: "en".to_string(),
            href: "https://ex.test/en".to_string(),
        }];
        p.hreflang.invalid_lang_codes = vec!["zz".to_string()];
        p.hreflang.duplicate_langs = vec!["en".to_string()];
        p.hreflang.has_self_reference = false;
        let found = codes(&p);
        assert!(found.contains(&"HREFLANG_INVALID_LANG".to_string()));
        assert!(found.contains(&"HREFLANG_DUPLICATE".to_string()));
        assert!(found.contains(&"HREFLANG_NO_SELF_REFERENCE".to_string()));
    }

    #[test]
    fn no_hreflang_means_no_self_reference_issue() {
        let p = page();
        assert!(!codes(&p).contains(&"HREFLANG_NO_SELF_REFERENCE".to_string()));
    }

    #[test]
    fn extraction_slugs_are_forwarded() {
        let mut p = page();
        p.product = Some(ProductData {
            name: Some("Widget".to_string()),
            ..ProductData::default()
        });
        p.product_issues = vec![
            "product_invalid_price".to_string(),
            "product_missing_brand".to_string(),
        ];
        p.article_issues = vec!["article_outdated".to_string()];
        let found = codes(&p);
        assert!(found.contains(&"product_invalid_price".to_string()));
        assert!(found.contains(&"product_missing_brand".to_string()));
        assert!(found.contains(&"article_outdated".to_string()));
    }
}
