//! Issue catalogue
//!
//! The catalogue loaded from the store is authoritative: a rule emission
//! whose code has no active catalogue entry is silently dropped. The
//! built-in definitions seed fresh stores and back the test suite.

use std::collections::HashMap;

use uuid::Uuid;

use crate::types::{IssueDefinition, IssueSeverity};

/// Code-indexed view over the active issue definitions for one job.
#[derive(Debug, Clone, Default)]
pub struct IssueCatalogue {
    by_code: HashMap<String, IssueDefinition>,
}

impl IssueCatalogue {
    /// Index the active definitions. Inactive entries are dropped here so
    /// detection never has to re-check the flag.
    pub fn from_definitions(definitions: Vec<IssueDefinition>) -> Self {
        let by_code = definitions
            .into_iter()
            .filter(|def| def.active)
            .map(|def| (def.code.clone(), def))
            .collect();
        Self { by_code }
    }

    /// Look up a code; `None` means the emission must be dropped.
    pub fn resolve(&self, code: &str) -> Option<&IssueDefinition> {
        self.by_code.get(code)
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

fn def(code: &str, name: &str, category: &str, severity: IssueSeverity) -> IssueDefinition {
    IssueDefinition {
        id: Uuid::new_v4(),
        code: code.to_string(),
        name: name.to_string(),
        category: category.to_string(),
        severity,
        active: true,
    }
}

/// The built-in issue definitions, one entry per code any rule can emit.
pub fn default_definitions() -> Vec<IssueDefinition> {
    use IssueSeverity::{Error, Notice, Warning};

    vec![
        // crawlability
        def("CRAWL_4XX_ERROR", "Client error status", "crawlability", Error),
        def("CRAWL_5XX_ERROR", "Server error status", "crawlability", Error),
        def("CRAWL_REDIRECT_CHAIN", "Redirect chain", "crawlability", Warning),
        def("CRAWL_TEMP_REDIRECT", "Temporary redirect", "crawlability", Notice),
        def("CRAWL_SLOW_RESPONSE", "Slow server response", "crawlability", Warning),
        // indexability
        def("INDEX_NOINDEX", "Excluded by noindex", "indexability", Warning),
        // content
        def("CONTENT_NO_TITLE", "Missing title", "content", Error),
        def("CONTENT_TITLE_TOO_SHORT", "Title too short", "content", Warning),
        def("CONTENT_TITLE_TOO_LONG", "Title too long", "content", Warning),
        def("CONTENT_NO_META_DESCRIPTION", "Missing meta description", "content", Warning),
        def("CONTENT_META_DESC_TOO_SHORT", "Meta description too short", "content", Notice),
        def("CONTENT_META_DESC_TOO_LONG", "Meta description too long", "content", Notice),
        def("CONTENT_NO_H1", "Missing H1", "content", Error),
        def("CONTENT_MULTIPLE_H1", "Multiple H1 headings", "content", Warning),
        def("CONTENT_NO_BODY_TEXT", "No body text", "content", Error),
        def("CONTENT_VERY_THIN", "Very thin content", "content", Warning),
        def("CONTENT_LOW_WORD_COUNT", "Low word count", "content", Notice),
        def("CONTENT_KEYWORD_STUFFING", "Keyword stuffing", "content", Warning),
        def("CONTENT_LOW_TEXT_HTML_RATIO", "Low text to HTML ratio", "content", Notice),
        def("CONTENT_READING_COMPLEX", "Reading level too complex", "content", Notice),
        def("CONTENT_HEADING_SKIP", "Heading hierarchy skip", "content", Notice),
        def("CONTENT_TITLE_NOT_IN_BODY", "Title keywords missing from body", "content", Notice),
        // performance
        def("PERF_PAGE_TOO_LARGE", "Page too large", "performance", Warning),
        def("PERF_HTML_TOO_LARGE", "HTML document too large", "performance", Notice),
        def("PERF_LCP_SLOW", "Largest Contentful Paint slow", "performance", Warning),
        def("PERF_CLS_HIGH", "Cumulative Layout Shift high", "performance", Warning),
        def("PERF_TTFB_SLOW", "Time to first byte slow", "performance", Warning),
        def("PERF_INP_SLOW", "Interaction to Next Paint slow", "performance", Warning),
        // security
        def("SECURITY_NOT_HTTPS", "Page served over HTTP", "security", Error),
        def("SECURITY_MIXED_CONTENT", "Mixed content", "security", Error),
        // images
        def("IMAGES_MISSING_ALT", "Images without alt text", "images", Warning),
        def("IMAGES_EMPTY_ALT", "Images with empty alt text", "images", Notice),
        // structured data
        def("SCHEMA_NONE", "No structured data", "structured-data", Notice),
        def("SCHEMA_PARSE_ERROR", "Invalid structured data", "structured-data", Warning),
        // social
        def("SOCIAL_NO_OG", "Missing Open Graph tags", "social", Notice),
        def("SOCIAL_NO_TWITTER_CARD", "Missing Twitter card", "social", Notice),
        // international
        def("HREFLANG_INVALID_LANG", "Invalid hreflang language", "international", Warning),
        def("HREFLANG_INVALID_REGION", "Invalid hreflang region", "international", Warning),
        def("HREFLANG_DUPLICATE", "Duplicate hreflang entries", "international", Notice),
        def("HREFLANG_NO_SELF_REFERENCE", "Hreflang set lacks self-reference", "international", Notice),
        // mobile
        def("mobile_missing_viewport", "Missing viewport meta", "mobile", Error),
        def("mobile_zoom_disabled", "Zoom disabled", "mobile", Warning),
        def("mobile_initial_scale", "Initial scale not 1", "mobile", Notice),
        def("mobile_images_not_responsive", "Images not responsive", "mobile", Warning),
        def("mobile_tables_not_responsive", "Tables not responsive", "mobile", Notice),
        def("mobile_excessive_fixed_elements", "Excessive fixed elements", "mobile", Notice),
        def("mobile_small_font", "Font size below 12px", "mobile", Warning),
        def("mobile_no_touch_icon", "Missing apple-touch-icon", "mobile", Notice),
        def("mobile_no_manifest", "Missing web app manifest", "mobile", Notice),
        def("mobile_no_theme_color", "Missing theme color", "mobile", Notice),
        def("mobile_no_tel_links", "Phone numbers without tel links", "mobile", Notice),
        def("mobile_lcp_lazy_loaded", "Hero image lazy-loaded", "mobile", Warning),
        def("mobile_no_media_queries", "No media queries detected", "mobile", Warning),
        // technical SEO
        def("pagination_missing_rel_links", "Paginated page missing rel prev/next", "technical", Notice),
        def("pagination_canonical_mismatch", "Paginated canonical to non-paginated URL", "technical", Warning),
        def("pagination_noindex", "Paginated page with noindex", "technical", Warning),
        def("excessive_url_parameters", "Excessive URL parameters", "technical", Notice),
        def("url_session_parameters", "Session or filter parameters in URL", "technical", Warning),
        def("faceted_navigation_indexable", "Indexable faceted navigation", "technical", Warning),
        def("missing_canonical", "Indexable page without canonical", "technical", Notice),
        // article
        def("article_missing_headline", "Article missing headline", "article", Warning),
        def("article_headline_too_short", "Article headline too short", "article", Notice),
        def("article_headline_too_long", "Article headline too long", "article", Notice),
        def("article_missing_description", "Article missing description", "article", Notice),
        def("article_missing_author", "Article missing author", "article", Notice),
        def("article_missing_image", "Article missing image", "article", Notice),
        def("article_missing_date", "Article missing publish date", "article", Notice),
        def("article_invalid_date", "Article date invalid", "article", Warning),
        def("article_future_date", "Article dated in the future", "article", Warning),
        def("article_outdated", "Article outdated", "article", Notice),
        def("article_multiple", "Multiple article schemas", "article", Notice),
        def("article_missing_word_count", "Article body without word count", "article", Notice),
        // e-commerce
        def("product_missing_name", "Product missing name", "ecommerce", Error),
        def("product_missing_description", "Product missing description", "ecommerce", Warning),
        def("product_missing_sku", "Product missing SKU", "ecommerce", Notice),
        def("product_missing_brand", "Product missing brand", "ecommerce", Notice),
        def("product_missing_image", "Product missing image", "ecommerce", Warning),
        def("product_missing_offer", "Product missing offer", "ecommerce", Warning),
        def("product_missing_price", "Offer missing price", "ecommerce", Warning),
        def("product_missing_currency", "Offer missing currency", "ecommerce", Warning),
        def("product_missing_availability", "Offer missing availability", "ecommerce", Notice),
        def("product_invalid_price", "Offer price invalid", "ecommerce", Error),
        def("product_price_expired", "Offer price validity expired", "ecommerce", Warning),
        def("product_out_of_stock", "Product out of stock", "ecommerce", Notice),
        def("product_multiple", "Multiple product schemas", "ecommerce", Notice),
        // site graph (post-crawl)
        def("orphan_page", "Orphan page", "links", Warning),
        def("sitemap_only_page", "Sitemap-only page", "links", Notice),
        def("dead_end_page", "Dead-end page", "links", Notice),
        def("high_outbound_links", "Excessive outbound links", "links", Notice),
        def("page_too_deep", "Page too deep", "architecture", Notice),
        def("page_very_deep", "Page very deep", "architecture", Warning),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_indexes_active_codes() {
        let catalogue = IssueCatalogue::from_definitions(default_definitions());
        assert!(catalogue.resolve("CONTENT_NO_TITLE").is_some());
        assert!(catalogue.resolve("orphan_page").is_some());
        assert!(catalogue.resolve("made_up_code").is_none());
    }

    #[test]
    fn inactive_definitions_are_dropped() {
        let mut defs = default_definitions();
        for def in &mut defs {
            if def.code == "CONTENT_NO_TITLE" {
                def.active = false;
            }
        }
        let catalogue = IssueCatalogue::from_definitions(defs);
        assert!(catalogue.resolve("CONTENT_NO_TITLE").is_none());
    }

    #[test]
    fn codes_are_unique() {
        let defs = default_definitions();
        let mut codes: Vec<&str> = defs.iter().map(|d| d.code.as_str()).collect();
        let total = codes.len();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), total, "duplicate issue codes in catalogue");
    }
}
