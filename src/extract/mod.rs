//! Page extraction
//!
//! Turns rendered HTML plus transport metadata into a [`PageRecord`]. The
//! extraction is deterministic and pure: the DOM is parsed once and every
//! sub-extractor works off that document. Parse problems become diagnostics
//! on the record, never failures.

pub mod article;
pub mod content;
pub mod head;
pub mod hreflang;
pub mod images;
pub mod links;
pub mod markdown;
pub mod mobile;
pub mod product;
pub mod schema;

use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

use crate::types::{sha256_hex, DiscoverySource, PageRecord};

static SRC_ELEMENTS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[src]").expect("static selector must parse"));
static STYLESHEETS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("link[rel='stylesheet'][href]").expect("static selector must parse")
});

/// Extracts a [`PageRecord`] from one page of the configured project.
#[derive(Debug, Clone)]
pub struct Extractor {
    domain: String,
}

impl Extractor {
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
        }
    }

    /// Run every sub-extractor over the final HTML.
    pub fn extract(
        &self,
        html: &str,
        url: &Url,
        status: u16,
        content_type: &str,
        response_time_ms: u64,
    ) -> PageRecord {
        let document = Html::parse_document(html);

        let head = head::extract_head(&document);
        let (is_indexable, indexability_reason) =
            head::indexability(status, head.robots_meta.as_deref());

        let is_self_canonical = head
            .canonical_url
            .as_deref()
            .and_then(|canonical| head::is_self_canonical(canonical, url));

        let page_links = links::extract_links(&document, url, &self.domain);
        let image_stats = images::extract_images(&document);

        let plain_text = content::plain_body_text(&document);
        let word_count = content::word_count(&plain_text);
        let text_html_ratio = content::text_html_ratio(&plain_text, html);
        let keyword_density = content::keyword_density(&plain_text);
        let reading_level = content::reading_level(&plain_text);
        let content_hash = sha256_hex(&plain_text);
        let body_text = markdown::markdown_body(&document);

        let structured = schema::extract_structured_data(&document);
        let (article, article_issues) = article::extract_article(&structured);
        let (product, product_issues) = product::extract_product(&structured);
        let hreflang = hreflang::extract_hreflang(&document, url);
        let mobile = mobile::analyze_mobile(&document, html, &head, &plain_text);

        let is_https = url.scheme() == "https";
        let has_mixed_content = is_https && Self::detect_mixed_content(&document);

        PageRecord {
            url: url.as_str().to_string(),
            url_hash: sha256_hex(url.as_str()),
            path: url.path().to_string(),
            query_string: url.query().map(|q| q.to_string()),
            status_code: status,
            redirect_url: None,
            redirect_chain: Vec::new(),
            content_type: Some(content_type.to_string()),
            response_time_ms,
            page_size_bytes: html.len() as u64,
            page_depth: 0,
            discovered_via: DiscoverySource::Crawl,
            title: head.title,
            meta_description: head.meta_description,
            robots_meta: head.robots_meta,
            canonical_url: head
                .canonical_url
                .as_deref()
                .and_then(|c| url.join(c).ok())
                .map(|u| u.to_string()),
            is_self_canonical,
            rel_prev: head.rel_prev,
            rel_next: head.rel_next,
            html_lang: head.html_lang,
            viewport: head.viewport,
            is_indexable,
            indexability_reason,
            h1_tags: head.h1_tags,
            h2_tags: head.h2_tags,
            heading_sequence: head.heading_sequence,
            internal_links: page_links.internal,
            external_links: page_links.external,
            internal_links_received: 0,
            images: image_stats,
            word_count,
            text_html_ratio,
            keyword_density,
            reading_level,
            content_hash,
            body_text,
            schema_types: structured.types,
            article,
            article_issues,
            product,
            product_issues,
            hreflang,
            mobile: Some(mobile),
            og_title: head.og_title,
            og_description: head.og_description,
            og_image: head.og_image,
            twitter_card: head.twitter_card,
            is_https,
            has_mixed_content,
            core_web_vitals: None,
            diagnostics: structured.diagnostics,
        }
    }

    /// Any `src` (or stylesheet `href`) loaded over plain HTTP on an HTTPS
    /// page.
    fn detect_mixed_content(document: &Html) -> bool {
        for element in document.select(&SRC_ELEMENTS) {
            if let Some(src) = element.value().attr("src") {
                if src.trim_start().starts_with("http://") {
                    return true;
                }
            }
        }
        for sheet in document.select(&STYLESHEETS) {
            if let Some(href) = sheet.value().attr("href") {
                if href.trim_start().starts_with("http://") {
                    return true;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"<html lang="en">
<head>
    <title>Widget Guide</title>
    <meta name="description" content="Everything about widgets and their maintenance routines.">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <link rel="canonical" href="https://ex.test/guide">
    <script type="application/ld+json">{"@type": "Article", "headline": "A widget guide headline of proper length", "datePublished": "2024-01-01"}</script>
</head>
<body>
    <h1>Widget Guide</h1>
    <h2>Maintenance</h2>
    <p>Widgets need regular care and attention to work well over time.</p>
    <a href="/parts">Parts</a>
    <a href="https://other.test/ref">Reference</a>
    <img src="/diagram.png" alt="Diagram">
</body>
</html>"#;

    #[test]
    fn full_extraction_produces_consistent_record() {
        let extractor = Extractor::new("ex.test");
        let url = Url::parse("https://ex.test/guide").unwrap();
        let record = extractor.extract(FIXTURE, &url, 200, "text/html", 150);

        assert_eq!(record.title.as_deref(), Some("Widget Guide"));
        assert!(record.is_indexable);
        assert_eq!(record.is_self_canonical, Some(true));
        assert_eq!(record.h1_count(), 1);
        assert_eq!(record.internal_links, vec!["https://ex.test/parts".to_string()]);
        assert_eq!(record.external_links, vec!["https://other.test/ref".to_string()]);
        assert_eq!(record.images.total, 1);
        assert!(record.word_count > 0);
        assert_eq!(record.schema_types, vec!["Article".to_string()]);
        assert!(record.article.is_some());
        assert!(record.product.is_none());
        assert!(record.is_https);
        assert!(!record.has_mixed_content);
        assert_eq!(record.url_hash.len(), 64);
        assert!(record.body_text.contains("# Widget Guide"));
    }

    #[test]
    fn extraction_is_deterministic() {
        let extractor = Extractor::new("ex.test");
        let url = Url::parse("https://ex.test/guide").unwrap();
        let a = extractor.extract(FIXTURE, &url, 200, "text/html", 150);
        let b = extractor.extract(FIXTURE, &url, 200, "text/html", 150);
        assert_eq!(a.content_hash, b.content_hash);
        assert_eq!(a.word_count, b.word_count);
        assert_eq!(a.body_text, b.body_text);
    }

    #[test]
    fn markdown_word_count_round_trip() {
        // Tokens counted from the markdown view match the tokens the plain
        // text produced for word_count on a simple page.
        let html = "<html><body><p>alpha beta gamma delta</p></body></html>";
        let extractor = Extractor::new("ex.test");
        let url = Url::parse("https://ex.test/").unwrap();
        let record = extractor.extract(html, &url, 200, "text/html", 1);
        let md_words = record.body_text.split_whitespace().count() as u32;
        assert_eq!(md_words, record.word_count);
    }

    #[test]
    fn mixed_content_detection() {
        let html = r#"<html><body><img src="http://cdn.ex.test/x.png"></body></html>"#;
        let extractor = Extractor::new("ex.test");
        let url = Url::parse("https://ex.test/").unwrap();
        let record = extractor.extract(html, &url, 200, "text/html", 1);
        assert!(record.has_mixed_content);
    }

    #[test]
    fn status_drives_indexability() {
        let extractor = Extractor::new("ex.test");
        let url = Url::parse("https://ex.test/gone").unwrap();
        let record = extractor.extract("<html></html>", &url, 404, "text/html", 1);
        assert!(!record.is_indexable);
        assert_eq!(record.indexability_reason.as_deref(), Some("HTTP 404 error"));
    }
}
