//! Link extraction and internal/external classification

use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

use crate::crawl::url::is_internal_host;

static ANCHORS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("static selector must parse"));

/// Outbound links on a page, classified against the project domain.
#[derive(Debug, Clone, Default)]
pub struct PageLinks {
    pub internal: Vec<String>,
    pub external: Vec<String>,
}

/// Resolve every `<a href>` against the base URL. Hosts equal to or under
/// the project domain are internal. Non-HTTP schemes are discarded. Each
/// list is de-duplicated preserving first-seen order.
pub fn extract_links(document: &Html, base: &Url, project_domain: &str) -> PageLinks {
    let mut internal = Vec::new();
    let mut external = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for anchor in document.select(&ANCHORS) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = base.join(href.trim()) else {
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }
        let Some(host) = resolved.host_str().map(|h| h.to_string()) else {
            continue;
        };

        let mut resolved = resolved;
        resolved.set_fragment(None);
        let as_string = resolved.to_string();
        if !seen.insert(as_string.clone()) {
            continue;
        }

        if is_internal_host(&host, project_domain) {
            internal.push(as_string);
        } else {
            external.push(as_string);
        }
    }

    PageLinks { internal, external }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_and_deduplicates() {
        let html = r#"<html><body>
            <a href="/about">About</a>
            <a href="https://ex.test/about">About again</a>
            <a href="https://blog.ex.test/post">Blog</a>
            <a href="https://other.test/x">Out</a>
            <a href="mailto:hi@ex.test">Mail</a>
            <a href="tel:+15555550100">Call</a>
            <a href="/about#team">Fragment dupe</a>
        </body></html>"#;
        let doc = Html::parse_document(html);
        let base = Url::parse("https://ex.test/").unwrap();
        let links = extract_links(&doc, &base, "ex.test");

        assert_eq!(
            links.internal,
            vec![
                "https://ex.test/about".to_string(),
                "https://blog.ex.test/post".to_string(),
            ]
        );
        assert_eq!(links.external, vec!["https://other.test/x".to_string()]);
    }

    #[test]
    fn relative_links_resolve_against_base() {
        let html = r#"<a href="../up">Up</a><a href="sibling">Side</a>"#;
        let doc = Html::parse_document(html);
        let base = Url::parse("https://ex.test/blog/post/").unwrap();
        let links = extract_links(&doc, &base, "ex.test");
        assert_eq!(
            links.internal,
            vec![
                "https://ex.test/blog/up".to_string(),
                "https://ex.test/blog/post/sibling".to_string(),
            ]
        );
    }

    #[test]
    fn www_host_counts_as_internal() {
        let html = r#"<a href="https://www.ex.test/page">W</a>"#;
        let doc = Html::parse_document(html);
        let base = Url::parse("https://ex.test/").unwrap();
        let links = extract_links(&doc, &base, "ex.test");
        assert_eq!(links.internal.len(), 1);
        assert!(links.external.is_empty());
    }
}
